use super::{error_time, explain, fetch_all, format_millis, plan, QueryError};
use crate::connection::ShardSet;
use crate::models::{DiscoveredSchema, ForeignKeyRelationship, JoinVerdict, RelationshipBenchmark};
use crate::sql::{quote_ident, suggested_index_name};
use itertools::Itertools;
use sqlx::{Pool, Sqlite};
use std::time::Duration;
use tracing::{info, warn};

/// Runs a sample join per foreign key and judges its plan and index support.
pub async fn analyze(
    shards: &ShardSet,
    schema: &DiscoveredSchema,
    timeout: Duration,
) -> Vec<RelationshipBenchmark> {
    let mut results = Vec::with_capacity(schema.relationships.len());

    for relationship in &schema.relationships {
        let Some(shard) = shards.get(&relationship.shard) else {
            continue;
        };

        let source_indexed = schema
            .table(&relationship.shard, &relationship.from_table)
            .is_some_and(|t| t.has_covering_index(&relationship.from_columns));
        let target_unique = schema
            .table(&relationship.shard, &relationship.to_table)
            .is_some_and(|t| t.has_unique_key_on(&relationship.to_columns));

        let sql = join_query(relationship);
        let result = match probe_join(shard.pool(), &sql, timeout).await {
            Ok((plan_text, time)) => {
                let (verdict, assessment) = judge(&plan_text, source_indexed, relationship);
                RelationshipBenchmark {
                    relationship: relationship.label(),
                    shard: relationship.shard.clone(),
                    message: format!(
                        "{}: source indexed: {}, target unique: {}, {} ms. {}",
                        relationship.label(),
                        yes_no(source_indexed),
                        yes_no(target_unique),
                        time,
                        assessment
                    ),
                    sql,
                    source_indexed,
                    target_unique,
                    plan: plan_text,
                    time,
                    verdict,
                }
            }
            Err(err) => {
                warn!("Join analysis failed for {}: {err}", relationship.label());
                RelationshipBenchmark {
                    relationship: relationship.label(),
                    shard: relationship.shard.clone(),
                    message: format!("Error analyzing {}: {}", relationship.label(), err),
                    sql,
                    source_indexed,
                    target_unique,
                    plan: String::new(),
                    time: error_time(&err),
                    verdict: JoinVerdict::Error,
                }
            }
        };
        results.push(result);
    }

    info!("Analyzed {} relationship join(s)", results.len());
    results
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Both sides are aliased so self-referencing keys join a table to itself
fn join_query(relationship: &ForeignKeyRelationship) -> String {
    let on = relationship
        .from_columns
        .iter()
        .zip(&relationship.to_columns)
        .map(|(from, to)| format!("child.{} = parent.{}", quote_ident(from), quote_ident(to)))
        .join(" AND ");
    format!(
        "SELECT * FROM {} AS child JOIN {} AS parent ON {on} LIMIT 10",
        quote_ident(&relationship.from_table),
        quote_ident(&relationship.to_table)
    )
}

async fn probe_join(
    pool: &Pool<Sqlite>,
    sql: &str,
    timeout: Duration,
) -> Result<(String, String), QueryError> {
    let plan_text = explain(pool, sql, timeout).await?;
    let (_, elapsed) = fetch_all(pool, sql, timeout).await?;
    Ok((plan_text, format_millis(elapsed)))
}

fn judge(
    plan_text: &str,
    source_indexed: bool,
    relationship: &ForeignKeyRelationship,
) -> (JoinVerdict, String) {
    let full_scan = plan::has_full_scan(plan_text);
    let indexed = plan::uses_index(plan_text);

    if full_scan && !indexed {
        (
            JoinVerdict::Warning,
            "Warning: the join performs a full table scan without index support.".to_string(),
        )
    } else if full_scan {
        (
            JoinVerdict::Acceptable,
            "Plan is reasonable: one side is scanned and the other is looked up by index."
                .to_string(),
        )
    } else if !source_indexed {
        (
            JoinVerdict::Suggestion,
            format!(
                "Suggestion: add index {} on {}({}) to support joins from the child side.",
                suggested_index_name(&relationship.from_table, &relationship.from_columns),
                relationship.from_table,
                relationship.from_columns.join(", ")
            ),
        )
    } else {
        (
            JoinVerdict::Acceptable,
            "Plan is acceptable: both sides are index-supported.".to_string(),
        )
    }
}
