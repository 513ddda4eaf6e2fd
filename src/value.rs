use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};
use std::fmt;

/// A single SQLite cell, tagged by storage class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Reads column `index` of `row`, dispatching on the stored value's class
    pub fn from_row(row: &SqliteRow, index: usize) -> Result<Self, sqlx::Error> {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }

        let class = raw.type_info().name().to_ascii_uppercase();
        let value = match class.as_str() {
            "INTEGER" | "BOOLEAN" => SqlValue::Integer(row.try_get(index)?),
            "REAL" => SqlValue::Real(row.try_get(index)?),
            "BLOB" => SqlValue::Blob(row.try_get(index)?),
            _ => SqlValue::Text(row.try_get(index)?),
        };
        Ok(value)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Attaches this value as the next positional parameter
    pub fn bind_to<'q>(
        self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        match self {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Integer(value) => query.bind(value),
            SqlValue::Real(value) => query.bind(value),
            SqlValue::Text(value) => query.bind(value),
            SqlValue::Blob(value) => query.bind(value),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Integer(value) => write!(f, "{}", value),
            SqlValue::Real(value) => write!(f, "{}", value),
            SqlValue::Text(value) => write!(f, "{}", value),
            SqlValue::Blob(bytes) => {
                write!(f, "x'")?;
                for byte in bytes {
                    write!(f, "{:02x}", byte)?;
                }
                write!(f, "'")
            }
        }
    }
}

/// Renders every cell of a row as `name=value, ...`
pub fn render_row(row: &SqliteRow) -> Result<String, sqlx::Error> {
    let mut cells = Vec::with_capacity(row.len());
    for column in row.columns() {
        let value = SqlValue::from_row(row, column.ordinal())?;
        cells.push(format!("{}={}", column.name(), value));
    }
    Ok(cells.into_iter().join(", "))
}
