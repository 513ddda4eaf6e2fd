use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Storage affinity SQLite derives from a declared column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeAffinity {
    Integer,
    Text,
    Blob,
    Real,
    Numeric,
}

impl TypeAffinity {
    /// Applies the affinity rules from the SQLite documentation, in their documented order.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            TypeAffinity::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            TypeAffinity::Text
        } else if upper.contains("BLOB") || upper.trim().is_empty() {
            TypeAffinity::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            TypeAffinity::Real
        } else {
            TypeAffinity::Numeric
        }
    }
}

/// A single column as declared in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type exactly as written in the DDL, e.g. `VARCHAR(255)`
    pub data_type: String,
    pub nullable: bool,
}

impl ColumnInfo {
    pub fn affinity(&self) -> TypeAffinity {
        TypeAffinity::from_declared(&self.data_type)
    }

    pub fn is_text(&self) -> bool {
        self.affinity() == TypeAffinity::Text
    }

    pub fn is_integer(&self) -> bool {
        self.affinity() == TypeAffinity::Integer
    }

    /// Integer, real and decimal declarations. Temporal NUMERIC types are excluded.
    pub fn is_numeric(&self) -> bool {
        let upper = self.data_type.to_ascii_uppercase();
        match self.affinity() {
            TypeAffinity::Integer | TypeAffinity::Real => true,
            TypeAffinity::Numeric => upper.contains("DEC") || upper.contains("NUM"),
            _ => false,
        }
    }

    pub fn has_temporal_type(&self) -> bool {
        let upper = self.data_type.to_ascii_uppercase();
        upper.contains("DATE") || upper.contains("TIME")
    }
}

/// Foreign key as seen from the owning table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyConstraint {
    pub columns: Vec<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
}

/// Foreign key flattened into the schema-wide relationship list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRelationship {
    pub shard: String,
    pub from_table: String,
    pub from_columns: Vec<String>,
    pub to_table: String,
    pub to_columns: Vec<String>,
}

impl ForeignKeyRelationship {
    pub fn label(&self) -> String {
        format!(
            "{}.{} -> {}.{} ({})",
            self.from_table,
            self.from_columns.join(","),
            self.to_table,
            self.to_columns.join(","),
            self.shard
        )
    }

    pub fn matches(&self, shard: &str, table: &str, fk: &ForeignKeyConstraint) -> bool {
        self.shard == shard
            && self.from_table == table
            && self.from_columns == fk.columns
            && self.to_table == fk.referred_table
            && self.to_columns == fk.referred_columns
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexInfo {
    pub fn covers(&self, columns: &[String]) -> bool {
        columns.iter().all(|column| self.columns.contains(column))
    }

    /// Strict set inclusion, ignoring column order
    pub fn is_strict_subset_of(&self, other: &IndexInfo) -> bool {
        other.covers(&self.columns) && !self.covers(&other.columns)
    }

    /// Indexes SQLite creates for UNIQUE/PRIMARY KEY clauses cannot be dropped
    pub fn is_auto_index(&self) -> bool {
        self.name.starts_with("sqlite_autoindex_")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub name: String,
    pub table: String,
    pub sql: String,
    pub shard: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub columns: Vec<ColumnInfo>,
    /// Ordered by key position; empty for rowid-only tables
    pub primary_key: Vec<String>,
    pub unique_constraints: Vec<Vec<String>>,
    pub foreign_keys: Vec<ForeignKeyConstraint>,
    pub indexes: Vec<IndexInfo>,
}

impl TableInfo {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_key.iter().any(|pk| pk == column)
    }

    /// Column appears in any index, at any position
    pub fn is_indexed(&self, column: &str) -> bool {
        self.indexes
            .iter()
            .any(|index| index.columns.iter().any(|c| c == column))
    }

    /// True when an index (or the primary key) contains every given column
    pub fn has_covering_index(&self, columns: &[String]) -> bool {
        let pk_covers =
            !self.primary_key.is_empty() && columns.iter().all(|c| self.is_primary_key(c));
        pk_covers || self.indexes.iter().any(|index| index.covers(columns))
    }

    /// True when a unique index (or the primary key) is contained in the given columns
    pub fn has_unique_key_on(&self, columns: &[String]) -> bool {
        let pk_unique =
            !self.primary_key.is_empty() && self.primary_key.iter().all(|pk| columns.contains(pk));
        pk_unique
            || self.indexes.iter().any(|index| {
                index.unique
                    && !index.columns.is_empty()
                    && index.columns.iter().all(|c| columns.contains(c))
            })
    }

    /// INTEGER PRIMARY KEY columns alias the rowid and are assigned automatically
    pub fn is_identity_column(&self, column: &ColumnInfo) -> bool {
        column.is_integer() && self.primary_key.len() == 1 && self.is_primary_key(&column.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    pub path: String,
    pub tables: BTreeMap<String, TableInfo>,
    pub triggers: Vec<TriggerInfo>,
}

/// Immutable schema snapshot built once per run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredSchema {
    pub shards: BTreeMap<String, ShardInfo>,
    pub relationships: Vec<ForeignKeyRelationship>,
    pub all_triggers: Vec<TriggerInfo>,
}

impl DiscoveredSchema {
    pub fn table(&self, shard: &str, table: &str) -> Option<&TableInfo> {
        self.shards.get(shard)?.tables.get(table)
    }

    /// Iterates every table in shard then table-name order
    pub fn tables(&self) -> impl Iterator<Item = (&str, &str, &TableInfo)> {
        self.shards.iter().flat_map(|(shard_id, shard)| {
            shard
                .tables
                .iter()
                .map(move |(name, table)| (shard_id.as_str(), name.as_str(), table))
        })
    }

    pub fn table_count(&self) -> usize {
        self.shards.values().map(|shard| shard.tables.len()).sum()
    }
}

/// Severity attached to findings, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuggestionLevel {
    /// Critical issues that need immediate attention
    Critical,
    /// Problems that should be addressed
    Warning,
    /// Informational notes or confirmations of good practice
    Info,
}

impl SuggestionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionLevel::Critical => "CRITICAL",
            SuggestionLevel::Warning => "WARNING",
            SuggestionLevel::Info => "INFO",
        }
    }
}

/// The fixed battery of probe queries run against every table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    SampleRows,
    CountRows,
    TextFilter,
    NumericRange,
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::SampleRows => "Sample rows",
            ProbeKind::CountRows => "Count rows",
            ProbeKind::TextFilter => "Text filter",
            ProbeKind::NumericRange => "Numeric range filter",
        }
    }

    pub fn suggestion(&self) -> &'static str {
        match self {
            ProbeKind::SampleRows => {
                "Select only the columns the caller needs instead of SELECT *."
            }
            ProbeKind::CountRows => {
                "Exact counts walk the whole table; keep a maintained counter if this runs often."
            }
            ProbeKind::TextFilter => {
                "A leading-wildcard LIKE cannot use a B-tree index; consider an FTS5 table for substring search."
            }
            ProbeKind::NumericRange => {
                "Index the filtered column so range predicates can seek instead of scanning."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPerformanceResult {
    /// Table, shard and probe kind, e.g. `users (shard_1) - Count rows`
    pub query: String,
    pub kind: ProbeKind,
    pub sql: String,
    /// Elapsed milliseconds with three decimals, or `Error: ...`
    pub time: String,
    pub optimized: bool,
    pub suggestion: String,
    pub plan: String,
}

/// Paired issue/suggestion lists; position `i` of each belongs together
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexAdvice {
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

impl IndexAdvice {
    /// Records the pair unless the same issue text was already recorded
    pub fn push(&mut self, issue: String, suggestion: String) -> bool {
        if self.issues.contains(&issue) {
            return false;
        }
        self.issues.push(issue);
        self.suggestions.push(suggestion);
        true
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitiveCategory {
    Password,
    Email,
    Ssn,
    CreditCard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityFinding {
    pub level: SuggestionLevel,
    pub category: SensitiveCategory,
    pub shard: String,
    pub table: String,
    pub column: String,
    pub message: String,
}

impl fmt::Display for SecurityFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level.as_str(), self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkOutcome {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerBenchmark {
    pub shard: String,
    pub trigger: String,
    pub table: String,
    pub outcome: BenchmarkOutcome,
    pub rows: usize,
    pub elapsed_ms: Option<f64>,
    pub message: String,
    /// Best-effort extras such as audit table row counts
    pub notes: Vec<String>,
}

impl fmt::Display for TriggerBenchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for note in &self.notes {
            write!(f, "\n  {}", note)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinVerdict {
    Warning,
    Suggestion,
    Acceptable,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipBenchmark {
    pub relationship: String,
    pub shard: String,
    pub sql: String,
    pub source_indexed: bool,
    pub target_unique: bool,
    pub plan: String,
    pub time: String,
    pub verdict: JoinVerdict,
    pub message: String,
}

impl fmt::Display for RelationshipBenchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Everything one analysis run produces
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResults {
    pub schema: DiscoveredSchema,
    pub query_performance: Vec<QueryPerformanceResult>,
    pub index_advice: IndexAdvice,
    pub integrity_issues: Vec<String>,
    pub security_findings: Vec<SecurityFinding>,
    pub trigger_benchmarks: Vec<TriggerBenchmark>,
    pub relationship_benchmarks: Vec<RelationshipBenchmark>,
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

    #[rstest]
    #[case("INTEGER", TypeAffinity::Integer)]
    #[case("BIGINT", TypeAffinity::Integer)]
    #[case("VARCHAR(255)", TypeAffinity::Text)]
    #[case("CLOB", TypeAffinity::Text)]
    #[case("", TypeAffinity::Blob)]
    #[case("DOUBLE PRECISION", TypeAffinity::Real)]
    #[case("DECIMAL(10,2)", TypeAffinity::Numeric)]
    #[case("DATETIME", TypeAffinity::Numeric)]
    fn affinity_follows_sqlite_rules(#[case] declared: &str, #[case] expected: TypeAffinity) {
        assert_eq!(TypeAffinity::from_declared(declared), expected);
    }

    #[test]
    fn temporal_numeric_types_are_not_numeric() {
        assert!(!column("created", "DATETIME").is_numeric());
        assert!(column("price", "DECIMAL(10,2)").is_numeric());
        assert!(column("created", "DATETIME").has_temporal_type());
    }

    #[test]
    fn subset_ignores_column_order() {
        let narrow = IndexInfo {
            name: "a".into(),
            columns: vec!["col2".into()],
            unique: false,
        };
        let wide = IndexInfo {
            name: "b".into(),
            columns: vec!["col1".into(), "col2".into()],
            unique: false,
        };
        assert!(narrow.is_strict_subset_of(&wide));
        assert!(!wide.is_strict_subset_of(&narrow));
        assert!(!wide.is_strict_subset_of(&wide));
    }

    #[test]
    fn advice_deduplicates_by_issue_text() {
        let mut advice = IndexAdvice::default();
        assert!(advice.push("issue".into(), "CREATE INDEX a".into()));
        assert!(!advice.push("issue".into(), "CREATE INDEX b".into()));
        assert_eq!(advice.len(), 1);
        assert_eq!(advice.suggestions, vec!["CREATE INDEX a".to_string()]);
    }

    #[test]
    fn analysis_results_are_serializable() {
        let mut results = AnalysisResults::default();
        results.security_findings.push(SecurityFinding {
            level: SuggestionLevel::Critical,
            category: SensitiveCategory::Password,
            shard: "shard_1".into(),
            table: "users".into(),
            column: "password".into(),
            message: "test".into(),
        });

        serde_json::to_string(&results).expect("AnalysisResults should serialize");
    }
}
