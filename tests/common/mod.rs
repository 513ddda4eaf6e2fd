#![allow(dead_code)]

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Creates `name` inside `dir` and runs `script` against it
pub async fn create_db(dir: &TempDir, name: &str, script: &str) -> PathBuf {
    let path = dir.path().join(name);
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("create fixture database");
    sqlx::raw_sql(script)
        .execute(&pool)
        .await
        .expect("run fixture script");
    pool.close().await;
    path
}

pub async fn count_rows(path: &Path, table: &str) -> i64 {
    let options = SqliteConnectOptions::new().filename(path);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("reopen fixture database");
    let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{table}\""))
        .fetch_one(&pool)
        .await
        .expect("count rows");
    pool.close().await;
    count
}

pub const USERS: &str = r#"
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    email TEXT,
    password TEXT
);
INSERT INTO users (email, password) VALUES ('alice@example.com', 'abc123');
"#;

pub const SHOP: &str = r#"
CREATE TABLE customers (
    id INTEGER PRIMARY KEY
);
CREATE TABLE orders (
    id INTEGER PRIMARY KEY,
    customer_id INTEGER REFERENCES customers(id)
);
INSERT INTO customers (id) VALUES (1), (2);
PRAGMA foreign_keys = OFF;
INSERT INTO orders (id, customer_id) VALUES (10, 1), (11, 99), (12, NULL);
"#;
