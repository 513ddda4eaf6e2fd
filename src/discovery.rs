use crate::connection::{Shard, ShardSet};
use crate::models::{
    ColumnInfo, DiscoveredSchema, ForeignKeyConstraint, ForeignKeyRelationship, IndexInfo,
    ShardInfo, TableInfo, TriggerInfo,
};
use snafu::{ResultExt, Snafu};
use sqlx::{Pool, Row, Sqlite};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Snafu)]
pub enum DiscoveryError {
    #[snafu(display(
        "Schema discovery failed for {} ({}) while reading {}: {}",
        shard,
        path.display(),
        step,
        source
    ))]
    SchemaDiscoveryFailed {
        shard: String,
        path: PathBuf,
        step: String,
        source: sqlx::Error,
    },
}

type Result<T, E = DiscoveryError> = std::result::Result<T, E>;

const TABLES_QUERY: &str = r#"
    SELECT name
    FROM sqlite_master
    WHERE type = 'table'
      AND name NOT LIKE 'sqlite_%'
    ORDER BY name
"#;

const COLUMNS_QUERY: &str = r#"
    SELECT name, type, "notnull", pk
    FROM pragma_table_info(?1)
    ORDER BY cid
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT id, seq, "table", "from", "to"
    FROM pragma_foreign_key_list(?1)
    ORDER BY id, seq
"#;

const INDEXES_QUERY: &str = r#"
    SELECT name, "unique"
    FROM pragma_index_list(?1)
    ORDER BY seq DESC
"#;

const INDEX_COLUMNS_QUERY: &str = r#"
    SELECT name
    FROM pragma_index_info(?1)
    ORDER BY seqno
"#;

const TRIGGERS_QUERY: &str = r#"
    SELECT name, tbl_name, sql
    FROM sqlite_master
    WHERE type = 'trigger'
    ORDER BY name
"#;

/// Builds the schema snapshot for every shard, in shard order.
pub async fn discover_schema(shards: &ShardSet) -> Result<DiscoveredSchema> {
    let mut schema = DiscoveredSchema::default();

    for shard in shards.iter() {
        info!("Discovering schema for {} ({})", shard.id, shard.path.display());
        let reader = CatalogReader { shard };
        let info = reader.read_shard().await?;

        for (table_name, table) in &info.tables {
            for fk in &table.foreign_keys {
                schema.relationships.push(ForeignKeyRelationship {
                    shard: shard.id.clone(),
                    from_table: table_name.clone(),
                    from_columns: fk.columns.clone(),
                    to_table: fk.referred_table.clone(),
                    to_columns: fk.referred_columns.clone(),
                });
            }
        }
        schema.all_triggers.extend(info.triggers.iter().cloned());

        debug!(
            "{}: {} tables, {} triggers",
            shard.id,
            info.tables.len(),
            info.triggers.len()
        );
        schema.shards.insert(shard.id.clone(), info);
    }

    Ok(schema)
}

struct CatalogReader<'a> {
    shard: &'a Shard,
}

#[derive(Debug)]
struct RawForeignKey {
    id: i64,
    table: String,
    from: String,
    to: Option<String>,
}

impl CatalogReader<'_> {
    fn pool(&self) -> &Pool<Sqlite> {
        self.shard.pool()
    }

    fn failed(&self, step: impl Into<String>) -> SchemaDiscoveryFailedSnafu<String, PathBuf, String> {
        SchemaDiscoveryFailedSnafu {
            shard: self.shard.id.clone(),
            path: self.shard.path.clone(),
            step: step.into(),
        }
    }

    async fn read_shard(&self) -> Result<ShardInfo> {
        let mut tables = BTreeMap::new();
        for name in self.table_names().await? {
            let table = self.read_table(&name).await?;
            tables.insert(name, table);
        }

        resolve_implicit_references(&mut tables);

        let triggers = self.read_triggers().await?;

        Ok(ShardInfo {
            path: self.shard.path.display().to_string(),
            tables,
            triggers,
        })
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(TABLES_QUERY)
            .fetch_all(self.pool())
            .await
            .context(self.failed("table list"))?;

        rows.iter()
            .map(|row| row.try_get("name"))
            .collect::<Result<Vec<String>, _>>()
            .context(self.failed("table list"))
    }

    async fn read_table(&self, table: &str) -> Result<TableInfo> {
        let mut info = TableInfo::default();

        let rows = sqlx::query(COLUMNS_QUERY)
            .bind(table)
            .fetch_all(self.pool())
            .await
            .context(self.failed(format!("columns of {table}")))?;

        let mut key_positions = Vec::new();
        for row in &rows {
            let column = read_column(row).context(self.failed(format!("columns of {table}")))?;
            let pk_position: i64 = row
                .try_get("pk")
                .context(self.failed(format!("columns of {table}")))?;
            if pk_position > 0 {
                key_positions.push((pk_position, column.name.clone()));
            }
            info.columns.push(column);
        }
        key_positions.sort();
        info.primary_key = key_positions.into_iter().map(|(_, name)| name).collect();

        info.foreign_keys = self.read_foreign_keys(table).await?;

        for (name, unique) in self.index_list(table).await? {
            let columns = self.index_columns(&name).await?;
            if unique && !columns.is_empty() {
                info.unique_constraints.push(columns.clone());
            }
            info.indexes.push(IndexInfo {
                name,
                columns,
                unique,
            });
        }

        Ok(info)
    }

    async fn read_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyConstraint>> {
        let step = format!("foreign keys of {table}");
        let rows = sqlx::query(FOREIGN_KEYS_QUERY)
            .bind(table)
            .fetch_all(self.pool())
            .await
            .context(self.failed(step.clone()))?;

        let mut raw = Vec::with_capacity(rows.len());
        for row in &rows {
            raw.push(RawForeignKey {
                id: row.try_get("id").context(self.failed(step.clone()))?,
                table: row.try_get("table").context(self.failed(step.clone()))?,
                from: row.try_get("from").context(self.failed(step.clone()))?,
                to: row.try_get("to").context(self.failed(step.clone()))?,
            });
        }

        Ok(group_foreign_keys(raw))
    }

    async fn index_list(&self, table: &str) -> Result<Vec<(String, bool)>> {
        let step = format!("indexes of {table}");
        let rows = sqlx::query(INDEXES_QUERY)
            .bind(table)
            .fetch_all(self.pool())
            .await
            .context(self.failed(step.clone()))?;

        let mut indexes = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("name").context(self.failed(step.clone()))?;
            let unique: i64 = row.try_get("unique").context(self.failed(step.clone()))?;
            indexes.push((name, unique != 0));
        }
        Ok(indexes)
    }

    async fn index_columns(&self, index: &str) -> Result<Vec<String>> {
        let step = format!("columns of index {index}");
        let rows = sqlx::query(INDEX_COLUMNS_QUERY)
            .bind(index)
            .fetch_all(self.pool())
            .await
            .context(self.failed(step.clone()))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            // Expression and rowid entries have no name and are not table columns
            let name: Option<String> = row.try_get("name").context(self.failed(step.clone()))?;
            columns.extend(name);
        }
        Ok(columns)
    }

    async fn read_triggers(&self) -> Result<Vec<TriggerInfo>> {
        let rows = sqlx::query(TRIGGERS_QUERY)
            .fetch_all(self.pool())
            .await
            .context(self.failed("triggers"))?;

        let mut triggers = Vec::with_capacity(rows.len());
        for row in &rows {
            let sql: Option<String> = row.try_get("sql").context(self.failed("triggers"))?;
            triggers.push(TriggerInfo {
                name: row.try_get("name").context(self.failed("triggers"))?,
                table: row.try_get("tbl_name").context(self.failed("triggers"))?,
                sql: sql.unwrap_or_default(),
                shard: self.shard.id.clone(),
            });
        }
        Ok(triggers)
    }
}

fn read_column(row: &sqlx::sqlite::SqliteRow) -> Result<ColumnInfo, sqlx::Error> {
    let not_null: i64 = row.try_get("notnull")?;
    Ok(ColumnInfo {
        name: row.try_get("name")?,
        data_type: row.try_get("type")?,
        nullable: not_null == 0,
    })
}

/// Collapses per-column catalog rows into one constraint per foreign key id
fn group_foreign_keys(raw: Vec<RawForeignKey>) -> Vec<ForeignKeyConstraint> {
    let mut grouped: Vec<(i64, ForeignKeyConstraint)> = Vec::new();
    for entry in raw {
        match grouped.iter_mut().find(|(id, _)| *id == entry.id) {
            Some((_, fk)) => {
                fk.columns.push(entry.from);
                fk.referred_columns.extend(entry.to);
            }
            None => grouped.push((
                entry.id,
                ForeignKeyConstraint {
                    columns: vec![entry.from],
                    referred_table: entry.table,
                    referred_columns: entry.to.into_iter().collect(),
                },
            )),
        }
    }

    // The catalog lists the most recently declared key first
    grouped.sort_by_key(|(id, _)| std::cmp::Reverse(*id));
    grouped.into_iter().map(|(_, fk)| fk).collect()
}

/// `REFERENCES parent` without a column list targets the parent's primary key
fn resolve_implicit_references(tables: &mut BTreeMap<String, TableInfo>) {
    let primary_keys: BTreeMap<String, Vec<String>> = tables
        .iter()
        .map(|(name, table)| (name.clone(), table.primary_key.clone()))
        .collect();

    for table in tables.values_mut() {
        for fk in &mut table.foreign_keys {
            if fk.referred_columns.len() == fk.columns.len() {
                continue;
            }
            fk.referred_columns = match primary_keys.get(&fk.referred_table) {
                Some(pk) if pk.len() == fk.columns.len() => pk.clone(),
                _ => vec!["rowid".to_string(); fk.columns.len()],
            };
        }
    }
}
