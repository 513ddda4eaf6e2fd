use super::{error_time, explain, fetch_all, format_millis, plan};
use crate::connection::ShardSet;
use crate::models::{DiscoveredSchema, ProbeKind, QueryPerformanceResult, TableInfo};
use crate::sql::quote_ident;
use sqlx::{Pool, Sqlite};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Probe {
    kind: ProbeKind,
    sql: String,
}

/// Runs the probe battery against every table of every shard.
pub async fn analyze(
    shards: &ShardSet,
    schema: &DiscoveredSchema,
    timeout: Duration,
) -> Vec<QueryPerformanceResult> {
    let mut results = Vec::new();

    for (shard_id, table_name, table) in schema.tables() {
        let Some(shard) = shards.get(shard_id) else {
            warn!("No open connection for {shard_id}; skipping {table_name}");
            continue;
        };

        debug!("Probing {table_name} ({shard_id})");
        for probe in build_probes(table_name, table) {
            let result = run_probe(shard.pool(), shard_id, table_name, probe, timeout).await;
            results.push(result);
        }
    }

    info!("Ran {} performance probes", results.len());
    results
}

fn build_probes(table_name: &str, table: &TableInfo) -> Vec<Probe> {
    let table_sql = quote_ident(table_name);
    let mut probes = vec![
        Probe {
            kind: ProbeKind::SampleRows,
            sql: format!("SELECT * FROM {table_sql} LIMIT 10"),
        },
        Probe {
            kind: ProbeKind::CountRows,
            sql: format!("SELECT COUNT(*) FROM {table_sql}"),
        },
    ];

    if let Some(column) = table.columns.iter().find(|c| c.is_text()) {
        probes.push(Probe {
            kind: ProbeKind::TextFilter,
            sql: format!(
                "SELECT * FROM {table_sql} WHERE {} LIKE '%test%' LIMIT 5",
                quote_ident(&column.name)
            ),
        });
    }

    if let Some(column) = table.columns.iter().find(|c| c.is_numeric()) {
        probes.push(Probe {
            kind: ProbeKind::NumericRange,
            sql: format!(
                "SELECT * FROM {table_sql} WHERE {} > 100 LIMIT 5",
                quote_ident(&column.name)
            ),
        });
    }

    probes
}

async fn run_probe(
    pool: &Pool<Sqlite>,
    shard_id: &str,
    table_name: &str,
    probe: Probe,
    timeout: Duration,
) -> QueryPerformanceResult {
    let label = format!("{} ({}) - {}", table_name, shard_id, probe.kind.as_str());

    let plan_text = match explain(pool, &probe.sql, timeout).await {
        Ok(text) => Some(text),
        Err(err) => {
            warn!("Could not explain {label}: {err}");
            None
        }
    };

    let (time, optimized) = match fetch_all(pool, &probe.sql, timeout).await {
        Ok((_, elapsed)) => (format_millis(elapsed), plan_is_optimized(plan_text.as_deref())),
        Err(err) => {
            warn!("Probe {label} failed: {err}");
            (error_time(&err), false)
        }
    };

    QueryPerformanceResult {
        query: label,
        kind: probe.kind,
        sql: probe.sql,
        time,
        optimized,
        suggestion: probe.kind.suggestion().to_string(),
        plan: plan_text.unwrap_or_default(),
    }
}

/// A probe without a captured plan is never counted as optimized
fn plan_is_optimized(plan_text: Option<&str>) -> bool {
    plan_text
        .filter(|text| !text.trim().is_empty())
        .is_some_and(plan::is_optimized)
}
