//! Synthetic rows for trigger load tests.

use crate::models::{ColumnInfo, TableInfo, TypeAffinity};
use crate::value::SqlValue;

/// Dates cycle through this many consecutive days
const DATE_CYCLE_DAYS: usize = 28;

/// Columns to fill, skipping identity keys SQLite assigns itself
pub fn insertable_columns(table: &TableInfo) -> Vec<&ColumnInfo> {
    table
        .columns
        .iter()
        .filter(|column| !table.is_identity_column(column))
        .collect()
}

/// `count` rows of values for `columns`, in column order
pub fn generate_rows(columns: &[&ColumnInfo], count: usize) -> Vec<Vec<SqlValue>> {
    (0..count)
        .map(|i| columns.iter().map(|column| value_for(column, i)).collect())
        .collect()
}

pub fn value_for(column: &ColumnInfo, i: usize) -> SqlValue {
    let name = column.name.to_lowercase();
    let upper = column.data_type.to_ascii_uppercase();

    if column.has_temporal_type() {
        return SqlValue::Text(synthetic_date(i, upper.contains("TIME")));
    }

    match column.affinity() {
        TypeAffinity::Integer if upper.contains("BOOL") => SqlValue::Integer((i % 2) as i64),
        TypeAffinity::Integer => SqlValue::Integer(i as i64 + 1),
        TypeAffinity::Real => SqlValue::Real(i as f64 + 0.5),
        TypeAffinity::Numeric if column.is_numeric() => SqlValue::Real(i as f64 + 0.5),
        TypeAffinity::Numeric if upper.contains("BOOL") => SqlValue::Integer((i % 2) as i64),
        _ if name.contains("email") => SqlValue::Text(format!("user{}@example.com", i + 1)),
        _ if name.contains("name") => SqlValue::Text(format!("Synthetic {} {}", column.name, i + 1)),
        _ => SqlValue::Text(format!("synthetic_{}_{}", column.name, i + 1)),
    }
}

fn synthetic_date(i: usize, with_time: bool) -> String {
    let day = i % DATE_CYCLE_DAYS + 1;
    if with_time {
        format!("2024-02-{day:02} 12:00:00")
    } else {
        format!("2024-02-{day:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn column(name: &str, data_type: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
        }
    }

    #[test]
    fn skips_integer_primary_key() {
        let table = TableInfo {
            columns: vec![column("id", "INTEGER"), column("email", "TEXT")],
            primary_key: vec!["id".into()],
            ..Default::default()
        };
        let names: Vec<_> = insertable_columns(&table)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["email"]);
    }

    #[test]
    fn keeps_text_primary_key() {
        let table = TableInfo {
            columns: vec![column("code", "TEXT")],
            primary_key: vec!["code".into()],
            ..Default::default()
        };
        assert_eq!(insertable_columns(&table).len(), 1);
    }

    #[rstest]
    #[case(column("qty", "INTEGER"), 4, SqlValue::Integer(5))]
    #[case(column("price", "DECIMAL(10,2)"), 2, SqlValue::Real(2.5))]
    #[case(column("ratio", "REAL"), 0, SqlValue::Real(0.5))]
    #[case(column("active", "BOOLEAN"), 3, SqlValue::Integer(1))]
    #[case(column("born", "DATE"), 0, SqlValue::Text("2024-02-01".into()))]
    #[case(column("born", "DATE"), 28, SqlValue::Text("2024-02-01".into()))]
    #[case(column("seen", "DATETIME"), 27, SqlValue::Text("2024-02-28 12:00:00".into()))]
    #[case(column("email", "TEXT"), 0, SqlValue::Text("user1@example.com".into()))]
    #[case(column("full_name", "VARCHAR(40)"), 1, SqlValue::Text("Synthetic full_name 2".into()))]
    #[case(column("notes", "TEXT"), 9, SqlValue::Text("synthetic_notes_10".into()))]
    fn values_follow_declared_type(
        #[case] column: ColumnInfo,
        #[case] i: usize,
        #[case] expected: SqlValue,
    ) {
        assert_eq!(value_for(&column, i), expected);
    }

    #[test]
    fn generates_requested_row_count() {
        let a = column("a", "INTEGER");
        let b = column("b", "TEXT");
        let rows = generate_rows(&[&a, &b], 100);
        assert_eq!(rows.len(), 100);
        assert!(rows.iter().all(|row| row.len() == 2));
        assert_eq!(rows[99][0], SqlValue::Integer(100));
    }
}
