use super::synthetic::{generate_rows, insertable_columns};
use super::{arm_deadline, disarm_deadline, fetch_all_on, format_millis, plan, timed, QueryError};
use crate::connection::ShardSet;
use crate::models::{
    BenchmarkOutcome, DiscoveredSchema, ShardInfo, TableInfo, TriggerBenchmark, TriggerInfo,
};
use crate::sql::{column_list, quote_ident};
use crate::value::SqlValue;
use itertools::Itertools;
use sqlx::sqlite::SqliteConnection;
use sqlx::{Connection, Pool, Row, Sqlite};
use std::time::Duration;
use tracing::{debug, info, warn};

const AUDIT_TABLE_HINT: &str = "audit";

/// Load-tests every `AFTER INSERT` trigger with a batch of synthetic rows.
///
/// Each batch commits as one transaction with foreign-key enforcement
/// suspended; enforcement is switched back on whether the batch commits or
/// rolls back.
pub async fn analyze(
    shards: &ShardSet,
    schema: &DiscoveredSchema,
    batch_size: usize,
    timeout: Duration,
) -> Vec<TriggerBenchmark> {
    let mut results = Vec::with_capacity(schema.all_triggers.len());

    for trigger in &schema.all_triggers {
        let result = match (shards.get(&trigger.shard), schema.shards.get(&trigger.shard)) {
            (Some(shard), Some(shard_info)) => {
                benchmark_trigger(shard.pool(), shard_info, trigger, batch_size, timeout).await
            }
            _ => skipped(trigger, "its shard is not open"),
        };
        results.push(result);
    }

    info!("Benchmarked {} trigger(s)", results.len());
    results
}

fn skipped(trigger: &TriggerInfo, reason: &str) -> TriggerBenchmark {
    TriggerBenchmark {
        shard: trigger.shard.clone(),
        trigger: trigger.name.clone(),
        table: trigger.table.clone(),
        outcome: BenchmarkOutcome::Skipped,
        rows: 0,
        elapsed_ms: None,
        message: format!(
            "Skipped trigger {} on {} ({}): {}",
            trigger.name, trigger.table, trigger.shard, reason
        ),
        notes: Vec::new(),
    }
}

async fn benchmark_trigger(
    pool: &Pool<Sqlite>,
    shard_info: &ShardInfo,
    trigger: &TriggerInfo,
    batch_size: usize,
    timeout: Duration,
) -> TriggerBenchmark {
    if !plan::is_after_insert_trigger(&trigger.sql) {
        return skipped(trigger, "not an AFTER INSERT trigger");
    }
    let Some(table) = shard_info.tables.get(&trigger.table) else {
        return skipped(trigger, "its table is not in the schema snapshot");
    };

    let mut result = TriggerBenchmark {
        shard: trigger.shard.clone(),
        trigger: trigger.name.clone(),
        table: trigger.table.clone(),
        outcome: BenchmarkOutcome::Failed,
        rows: batch_size,
        elapsed_ms: None,
        message: String::new(),
        notes: Vec::new(),
    };

    let mut conn = match pool.acquire().await {
        Ok(conn) => conn,
        Err(err) => {
            result.message = failure_message(trigger, &QueryError::from(err));
            return result;
        }
    };

    match run_batch(&mut conn, &trigger.table, table, batch_size, timeout).await {
        Ok(elapsed) => {
            let millis = elapsed.as_secs_f64() * 1000.0;
            result.outcome = BenchmarkOutcome::Completed;
            result.elapsed_ms = Some(millis);
            result.message = format!(
                "Trigger {} on {} ({}): inserted {} rows in {} ms ({:.3} ms/row)",
                trigger.name,
                trigger.table,
                trigger.shard,
                batch_size,
                format_millis(elapsed),
                millis / batch_size as f64
            );
            result.notes = audit_notes(&mut conn, shard_info, timeout).await;
        }
        Err(err) => {
            warn!("Trigger benchmark for {} failed: {err}", trigger.name);
            result.message = failure_message(trigger, &err);
        }
    }

    result
}

fn failure_message(trigger: &TriggerInfo, err: &QueryError) -> String {
    format!(
        "Trigger {} on {} ({}): benchmark failed and was rolled back: {}",
        trigger.name, trigger.table, trigger.shard, err
    )
}

/// Suspends foreign keys, inserts the batch, then restores enforcement.
async fn run_batch(
    conn: &mut SqliteConnection,
    table_name: &str,
    table: &TableInfo,
    batch_size: usize,
    timeout: Duration,
) -> Result<Duration, QueryError> {
    arm_deadline(conn, timeout).await?;
    if let Err(err) = set_foreign_keys(conn, false).await {
        disarm_deadline(conn).await;
        return Err(err);
    }

    let inserted = timed(timeout, insert_batch(conn, table_name, table, batch_size)).await;
    disarm_deadline(conn).await;

    // Restore even after a rollback; PRAGMA foreign_keys is a no-op inside a transaction
    let restored = set_foreign_keys(conn, true).await;

    let (_, elapsed) = inserted?;
    restored?;
    Ok(elapsed)
}

async fn insert_batch(
    conn: &mut SqliteConnection,
    table_name: &str,
    table: &TableInfo,
    batch_size: usize,
) -> Result<(), sqlx::Error> {
    let columns = insertable_columns(table);
    let sql = insert_statement(table_name, &columns.iter().map(|c| c.name.clone()).collect_vec());
    let rows = generate_rows(&columns, batch_size);

    let mut tx = conn.begin().await?;
    for row in rows {
        let query = row
            .into_iter()
            .fold(sqlx::query(&sql), |query, value: SqlValue| value.bind_to(query));
        if let Err(err) = query.execute(&mut *tx).await {
            debug!("Insert into {table_name} failed, rolling back: {err}");
            // An interrupted statement may already have rolled the transaction back
            if let Err(rollback_err) = tx.rollback().await {
                debug!("Rollback of {table_name} batch reported: {rollback_err}");
            }
            return Err(err);
        }
    }
    tx.commit().await
}

fn insert_statement(table_name: &str, columns: &[String]) -> String {
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table_name));
    }
    let placeholders = (1..=columns.len()).map(|i| format!("?{i}")).join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table_name),
        column_list(columns),
        placeholders
    )
}

async fn set_foreign_keys(conn: &mut SqliteConnection, enabled: bool) -> Result<(), QueryError> {
    let sql = if enabled {
        "PRAGMA foreign_keys = ON"
    } else {
        "PRAGMA foreign_keys = OFF"
    };
    sqlx::query(sql).execute(&mut *conn).await?;
    Ok(())
}

pub async fn foreign_keys_enabled(conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
        .fetch_one(&mut *conn)
        .await?;
    Ok(enabled != 0)
}

/// Row counts of audit-style tables after the batch; failures are only logged
async fn audit_notes(
    conn: &mut SqliteConnection,
    shard_info: &ShardInfo,
    timeout: Duration,
) -> Vec<String> {
    let mut notes = Vec::new();
    let audit_tables = shard_info
        .tables
        .keys()
        .filter(|name| name.to_lowercase().contains(AUDIT_TABLE_HINT));

    for name in audit_tables {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(name));
        match fetch_all_on(conn, &sql, timeout).await {
            Ok((rows, _)) => match rows.first().map(|row| row.try_get::<i64, _>(0)) {
                Some(Ok(count)) => notes.push(format!("Audit table {name} now holds {count} rows")),
                _ => debug!("Could not read the row count of {name}"),
            },
            Err(err) => debug!("Could not count {name}: {err}"),
        }
    }
    notes
}
