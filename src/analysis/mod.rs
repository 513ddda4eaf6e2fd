pub mod index_advisor;
pub mod integrity;
pub mod plan;
pub mod query_perf;
pub mod relationships;
pub mod security;
pub mod synthetic;
pub mod trigger_bench;

use itertools::Itertools;
use snafu::Snafu;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

/// Virtual machine steps between deadline checks
const DEADLINE_CHECK_OPS: i32 = 1_000;

/// Primary result code of a statement aborted by the progress handler
const SQLITE_INTERRUPT: &str = "9";

/// Failure of a single generated query. Always captured into the item's result.
#[derive(Debug, Snafu)]
pub enum QueryError {
    #[snafu(display("{}", source))]
    Execution { source: sqlx::Error },

    #[snafu(display("query timed out after {} ms", millis))]
    Timeout { millis: u128 },
}

impl From<sqlx::Error> for QueryError {
    fn from(source: sqlx::Error) -> Self {
        QueryError::Execution { source }
    }
}

/// Awaits `fut` with an upper bound, reporting the elapsed wall-clock time
pub(crate) async fn timed<T, F>(
    limit: Duration,
    fut: F,
) -> Result<(T, Duration), QueryError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    let started = Instant::now();
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok((value, started.elapsed())),
        Ok(Err(source)) if is_interrupted(&source) => Err(QueryError::Timeout {
            millis: limit.as_millis(),
        }),
        Ok(Err(source)) => Err(QueryError::Execution { source }),
        Err(_) => Err(QueryError::Timeout {
            millis: limit.as_millis(),
        }),
    }
}

fn is_interrupted(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == SQLITE_INTERRUPT)
}

/// Makes SQLite abort whatever statement is still running on `conn` once
/// `limit` has elapsed.
///
/// Dropping a timed-out future does not stop the statement inside the
/// connection worker, and a shard has only one connection.
pub(crate) async fn arm_deadline(
    conn: &mut SqliteConnection,
    limit: Duration,
) -> Result<(), sqlx::Error> {
    let deadline = Instant::now() + limit;
    conn.lock_handle()
        .await?
        .set_progress_handler(DEADLINE_CHECK_OPS, move || Instant::now() < deadline);
    Ok(())
}

pub(crate) async fn disarm_deadline(conn: &mut SqliteConnection) {
    match conn.lock_handle().await {
        Ok(mut handle) => handle.remove_progress_handler(),
        Err(err) => debug!("Could not clear the query deadline: {err}"),
    }
}

/// Runs `sql` on `conn` under a deadline enforced both here and inside SQLite
pub(crate) async fn fetch_all_on(
    conn: &mut SqliteConnection,
    sql: &str,
    limit: Duration,
) -> Result<(Vec<SqliteRow>, Duration), QueryError> {
    arm_deadline(conn, limit).await?;
    let outcome = timed(limit, sqlx::query(sql).fetch_all(&mut *conn)).await;
    disarm_deadline(conn).await;
    outcome
}

pub(crate) async fn fetch_all(
    pool: &Pool<Sqlite>,
    sql: &str,
    limit: Duration,
) -> Result<(Vec<SqliteRow>, Duration), QueryError> {
    let mut conn = pool.acquire().await?;
    fetch_all_on(&mut conn, sql, limit).await
}

/// Runs `EXPLAIN QUERY PLAN` and joins the detail column of every plan row
pub(crate) async fn explain(
    pool: &Pool<Sqlite>,
    sql: &str,
    limit: Duration,
) -> Result<String, QueryError> {
    let (rows, _) = fetch_all(pool, &format!("EXPLAIN QUERY PLAN {sql}"), limit).await?;
    let details = rows
        .iter()
        .map(|row| row.try_get::<String, _>("detail"))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(details.into_iter().join("\n"))
}

pub(crate) fn format_millis(elapsed: Duration) -> String {
    format!("{:.3}", elapsed.as_secs_f64() * 1000.0)
}

pub(crate) fn error_time(err: &QueryError) -> String {
    format!("Error: {err}")
}
