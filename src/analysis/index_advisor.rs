use crate::models::{ColumnInfo, DiscoveredSchema, IndexAdvice, TableInfo};
use crate::sql::{create_index_statement, drop_index_statement};
use std::collections::HashSet;
use tracing::info;

const ID_HINT: &str = "id";
const TEMPORAL_NAME_HINTS: [&str; 3] = ["date", "time", "timestamp"];
const TEMPORAL_NAME_SUFFIXES: [&str; 2] = ["_at", "_on"];
const LOOKUP_NAME_HINTS: [&str; 3] = ["name", "email", "username"];

/// Detects missing and redundant indexes across every table of the schema.
///
/// Heuristics run per table in a fixed order (foreign keys, ID-like columns,
/// date/time columns, lookup columns, redundant indexes). Once a column has a
/// pending `CREATE INDEX` suggestion it counts as indexed for later heuristics.
pub fn analyze(schema: &DiscoveredSchema) -> IndexAdvice {
    let mut advice = IndexAdvice::default();

    for (shard_id, table_name, table) in schema.tables() {
        let mut advisor = TableAdvisor {
            shard: shard_id,
            table_name,
            table,
            suggested: HashSet::new(),
            advice: &mut advice,
        };
        advisor.foreign_keys();
        advisor.columns_matching("ID-like column", is_id_like);
        advisor.columns_matching("date/time column", is_temporal);
        advisor.columns_matching("lookup column (name/email)", is_lookup);
        advisor.redundant_indexes();
    }

    info!("Index advisor produced {} finding(s)", advice.len());
    advice
}

struct TableAdvisor<'a> {
    shard: &'a str,
    table_name: &'a str,
    table: &'a TableInfo,
    suggested: HashSet<String>,
    advice: &'a mut IndexAdvice,
}

impl TableAdvisor<'_> {
    fn foreign_keys(&mut self) {
        for fk in &self.table.foreign_keys {
            if self.table.has_covering_index(&fk.columns)
                || fk.columns.iter().all(|c| self.suggested.contains(c))
            {
                continue;
            }

            let issue = format!(
                "[{}] {}.{}: foreign key to {}({}) has no supporting index",
                self.shard,
                self.table_name,
                fk.columns.join(","),
                fk.referred_table,
                fk.referred_columns.join(",")
            );
            if self
                .advice
                .push(issue, create_index_statement(self.table_name, &fk.columns))
            {
                self.suggested.extend(fk.columns.iter().cloned());
            }
        }
    }

    fn columns_matching(&mut self, reason: &str, matches: fn(&ColumnInfo) -> bool) {
        for column in &self.table.columns {
            if self.table.is_primary_key(&column.name)
                || self.table.is_indexed(&column.name)
                || self.suggested.contains(&column.name)
                || !matches(column)
            {
                continue;
            }

            let issue = format!(
                "[{}] {}.{}: {} is not indexed",
                self.shard, self.table_name, column.name, reason
            );
            let columns = vec![column.name.clone()];
            if self
                .advice
                .push(issue, create_index_statement(self.table_name, &columns))
            {
                self.suggested.insert(column.name.clone());
            }
        }
    }

    fn redundant_indexes(&mut self) {
        let indexes = &self.table.indexes;
        for narrow in indexes {
            // Constraint-backing indexes cannot be dropped without losing the constraint
            if narrow.unique || narrow.is_auto_index() {
                continue;
            }
            let wider_indexes = indexes
                .iter()
                .filter(|other| other.name != narrow.name && narrow.is_strict_subset_of(other));
            for wider in wider_indexes {
                let issue = format!(
                    "[{}] {}: index {} ({}) is redundant, covered by {} ({})",
                    self.shard,
                    self.table_name,
                    narrow.name,
                    narrow.columns.join(","),
                    wider.name,
                    wider.columns.join(",")
                );
                self.advice.push(issue, drop_index_statement(&narrow.name));
            }
        }
    }
}

fn is_id_like(column: &ColumnInfo) -> bool {
    column.name.to_lowercase().contains(ID_HINT)
}

fn is_temporal(column: &ColumnInfo) -> bool {
    let name = column.name.to_lowercase();
    column.has_temporal_type()
        || TEMPORAL_NAME_HINTS.iter().any(|hint| name.contains(hint))
        || TEMPORAL_NAME_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

fn is_lookup(column: &ColumnInfo) -> bool {
    let name = column.name.to_lowercase();
    LOOKUP_NAME_HINTS.iter().any(|hint| name.contains(hint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ForeignKeyConstraint, IndexInfo, ShardInfo};
    use rstest::rstest;

    fn column(name: &str, data_type: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
        }
    }

    fn index(name: &str, columns: &[&str]) -> IndexInfo {
        IndexInfo {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
        }
    }

    fn schema_with(tables: Vec<(&str, TableInfo)>) -> DiscoveredSchema {
        let mut shard = ShardInfo::default();
        for (name, table) in tables {
            shard.tables.insert(name.to_string(), table);
        }
        let mut schema = DiscoveredSchema::default();
        schema.shards.insert("shard_1".into(), shard);
        schema
    }

    #[test]
    fn users_table_only_flags_email() {
        let schema = schema_with(vec![(
            "users",
            TableInfo {
                columns: vec![
                    column("id", "INTEGER"),
                    column("email", "TEXT"),
                    column("password", "TEXT"),
                ],
                primary_key: vec!["id".into()],
                ..Default::default()
            },
        )]);

        let advice = analyze(&schema);
        insta::assert_debug_snapshot!(advice, @r###"
        IndexAdvice {
            issues: [
                "[shard_1] users.email: lookup column (name/email) is not indexed",
            ],
            suggestions: [
                "CREATE INDEX \"idx_users_email\" ON \"users\" (\"email\");",
            ],
        }
        "###);
    }

    #[test]
    fn foreign_key_column_is_flagged_once() {
        let schema = schema_with(vec![(
            "orders",
            TableInfo {
                columns: vec![column("id", "INTEGER"), column("customer_id", "INTEGER")],
                primary_key: vec!["id".into()],
                foreign_keys: vec![ForeignKeyConstraint {
                    columns: vec!["customer_id".into()],
                    referred_table: "customers".into(),
                    referred_columns: vec!["id".into()],
                }],
                ..Default::default()
            },
        )]);

        let advice = analyze(&schema);
        assert_eq!(advice.len(), 1);
        assert!(advice.issues[0].contains("foreign key to customers(id)"));
        assert_eq!(
            advice.suggestions[0],
            "CREATE INDEX \"idx_orders_customer_id\" ON \"orders\" (\"customer_id\");"
        );
    }

    #[test]
    fn covered_foreign_key_is_not_flagged() {
        let schema = schema_with(vec![(
            "orders",
            TableInfo {
                columns: vec![column("customer_id", "INTEGER"), column("placed", "INTEGER")],
                foreign_keys: vec![ForeignKeyConstraint {
                    columns: vec!["customer_id".into()],
                    referred_table: "customers".into(),
                    referred_columns: vec!["id".into()],
                }],
                indexes: vec![index("idx_orders_placed_customer", &["placed", "customer_id"])],
                ..Default::default()
            },
        )]);

        assert!(analyze(&schema).is_empty());
    }

    #[test]
    fn narrower_index_is_redundant_but_not_the_reverse() {
        let schema = schema_with(vec![(
            "t",
            TableInfo {
                columns: vec![column("col1", "BLOB"), column("col2", "BLOB")],
                indexes: vec![index("a", &["col1"]), index("b", &["col1", "col2"])],
                ..Default::default()
            },
        )]);

        let advice = analyze(&schema);
        assert_eq!(advice.len(), 1);
        assert!(advice.issues[0].contains("index a (col1) is redundant, covered by b"));
        assert_eq!(advice.suggestions[0], "DROP INDEX \"a\";");
    }

    #[test]
    fn every_wider_index_is_reported() {
        let schema = schema_with(vec![(
            "t",
            TableInfo {
                columns: vec![column("a", "BLOB"), column("b", "BLOB"), column("c", "BLOB")],
                indexes: vec![
                    index("i1", &["a"]),
                    index("i2", &["a", "b"]),
                    index("i3", &["a", "b", "c"]),
                ],
                ..Default::default()
            },
        )]);

        let advice = analyze(&schema);
        assert_eq!(
            advice.issues,
            vec![
                "[shard_1] t: index i1 (a) is redundant, covered by i2 (a,b)",
                "[shard_1] t: index i1 (a) is redundant, covered by i3 (a,b,c)",
                "[shard_1] t: index i2 (a,b) is redundant, covered by i3 (a,b,c)",
            ]
        );
        assert_eq!(
            advice.suggestions,
            vec!["DROP INDEX \"i1\";", "DROP INDEX \"i1\";", "DROP INDEX \"i2\";"]
        );
    }

    #[test]
    fn unique_indexes_are_never_dropped() {
        let mut unique = index("sqlite_autoindex_t_1", &["col1"]);
        unique.unique = true;
        let schema = schema_with(vec![(
            "t",
            TableInfo {
                columns: vec![column("col1", "BLOB"), column("col2", "BLOB")],
                indexes: vec![unique, index("b", &["col1", "col2"])],
                ..Default::default()
            },
        )]);

        assert!(analyze(&schema).is_empty());
    }

    #[test]
    fn advice_is_idempotent() {
        let schema = schema_with(vec![
            (
                "events",
                TableInfo {
                    columns: vec![
                        column("id", "INTEGER"),
                        column("happened_at", "TEXT"),
                        column("device_id", "INTEGER"),
                        column("display_name", "TEXT"),
                    ],
                    primary_key: vec!["id".into()],
                    ..Default::default()
                },
            ),
            (
                "audit",
                TableInfo {
                    columns: vec![column("created", "DATETIME")],
                    ..Default::default()
                },
            ),
        ]);

        let first = analyze(&schema);
        let second = analyze(&schema);
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
        assert_eq!(first.issues.len(), first.suggestions.len());
    }

    #[rstest]
    #[case("created_at", "TEXT", true)]
    #[case("birth_date", "TEXT", true)]
    #[case("created", "TIMESTAMP", true)]
    #[case("published_on", "TEXT", true)]
    #[case("title", "TEXT", false)]
    fn temporal_columns(#[case] name: &str, #[case] data_type: &str, #[case] expected: bool) {
        assert_eq!(is_temporal(&column(name, data_type)), expected);
    }
}
