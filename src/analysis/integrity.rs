use super::{fetch_all, QueryError};
use crate::connection::ShardSet;
use crate::models::{DiscoveredSchema, ForeignKeyRelationship};
use crate::sql::{column_list, not_null_predicate, quote_ident, row_value};
use crate::value::render_row;
use itertools::Itertools;
use sqlx::{Pool, Row, Sqlite};
use std::time::Duration;
use tracing::{debug, info, warn};

const TABLE_EXISTS_QUERY: &str =
    "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1";

/// Reports orphaned foreign-key rows and duplicate unique-key groups.
///
/// Each relationship or constraint is checked independently; a failing query
/// turns into an `Error ...` issue and the pass continues.
pub async fn analyze(
    shards: &ShardSet,
    schema: &DiscoveredSchema,
    timeout: Duration,
) -> Vec<String> {
    let mut issues = Vec::new();

    for relationship in &schema.relationships {
        let Some(shard) = shards.get(&relationship.shard) else {
            continue;
        };
        match check_orphans(shard.pool(), relationship, timeout).await {
            Ok(Some(issue)) => issues.push(issue),
            Ok(None) => {}
            Err(err) => {
                warn!("Orphan check failed for {}: {err}", relationship.label());
                issues.push(format!(
                    "Error checking orphans for {}: {}",
                    relationship.label(),
                    err
                ));
            }
        }
    }

    for (shard_id, table_name, table) in schema.tables() {
        let Some(shard) = shards.get(shard_id) else {
            continue;
        };
        for columns in &table.unique_constraints {
            match check_duplicates(shard.pool(), shard_id, table_name, columns, timeout).await {
                Ok(found) => issues.extend(found),
                Err(err) => {
                    warn!("Duplicate check failed for {table_name} ({shard_id}): {err}");
                    issues.push(format!(
                        "Error checking unique constraint ({}) on {} ({}): {}",
                        columns.join(", "),
                        table_name,
                        shard_id,
                        err
                    ));
                }
            }
        }
    }

    info!("Integrity check produced {} issue(s)", issues.len());
    issues
}

async fn table_exists(pool: &Pool<Sqlite>, table: &str) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(TABLE_EXISTS_QUERY)
        .bind(table)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

fn orphan_query(relationship: &ForeignKeyRelationship) -> String {
    format!(
        "SELECT * FROM {child} WHERE {child_not_null} AND {child_key} NOT IN \
         (SELECT {parent_cols} FROM {parent} WHERE {parent_not_null})",
        child = quote_ident(&relationship.from_table),
        child_not_null = not_null_predicate(&relationship.from_columns),
        child_key = row_value(&relationship.from_columns),
        parent_cols = column_list(&relationship.to_columns),
        parent = quote_ident(&relationship.to_table),
        parent_not_null = not_null_predicate(&relationship.to_columns),
    )
}

async fn check_orphans(
    pool: &Pool<Sqlite>,
    relationship: &ForeignKeyRelationship,
    timeout: Duration,
) -> Result<Option<String>, QueryError> {
    if !table_exists(pool, &relationship.from_table).await?
        || !table_exists(pool, &relationship.to_table).await?
    {
        debug!("Skipping {}: endpoint table missing", relationship.label());
        return Ok(None);
    }

    let (rows, _) = fetch_all(pool, &orphan_query(relationship), timeout).await?;
    if rows.is_empty() {
        return Ok(None);
    }

    let rendered = rows
        .iter()
        .map(render_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(format!(
        "Orphaned records in {} ({}): {} reference {}.{} but no matching row exists; {} row(s): {}",
        relationship.from_table,
        relationship.shard,
        relationship.from_columns.join(", "),
        relationship.to_table,
        relationship.to_columns.join(", "),
        rows.len(),
        rendered.iter().map(|row| format!("[{row}]")).join(" ")
    )))
}

fn duplicate_query(table: &str, columns: &[String]) -> String {
    let columns_sql = column_list(columns);
    format!(
        "SELECT {columns_sql}, COUNT(*) AS duplicate_count FROM {table} \
         WHERE {not_null} GROUP BY {columns_sql} HAVING COUNT(*) > 1",
        table = quote_ident(table),
        not_null = not_null_predicate(columns),
    )
}

async fn check_duplicates(
    pool: &Pool<Sqlite>,
    shard_id: &str,
    table: &str,
    columns: &[String],
    timeout: Duration,
) -> Result<Vec<String>, QueryError> {
    let (rows, _) = fetch_all(pool, &duplicate_query(table, columns), timeout).await?;

    let mut issues = Vec::with_capacity(rows.len());
    for row in &rows {
        let count: i64 = row.try_get("duplicate_count")?;
        issues.push(format!(
            "Duplicate values in {} ({}) for unique columns ({}): [{}] appears {} times",
            table,
            shard_id,
            columns.join(", "),
            render_row(row)?,
            count
        ));
    }
    Ok(issues)
}
