use super::{fetch_all, QueryError};
use crate::connection::ShardSet;
use crate::models::{DiscoveredSchema, SecurityFinding, SensitiveCategory, SuggestionLevel};
use crate::sql::quote_ident;
use crate::value::SqlValue;
use regex::Regex;
use sqlx::{Pool, Sqlite};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{info, warn};

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

static SSN_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{3}-\d{2}-\d{4}$").unwrap());

static SHA256_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{64}$").unwrap());

static WEAK_SECRET_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\w+$").unwrap());

// Visa, Mastercard, Amex, Discover
static CARD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:4\d{12}(?:\d{3})?|5[1-5]\d{14}|3[47]\d{13}|6(?:011|5\d{2})\d{12})$").unwrap()
});

/// Password samples shorter than this without separators look like plaintext
const WEAK_SECRET_MAX_LEN: usize = 32;

const CARD_NAME_HINTS: [&str; 3] = ["credit_card", "card_number", "cc_num"];
const SSN_NAME_HINTS: [&str; 2] = ["ssn", "social_security"];

/// Samples one value per text column and flags sensitive or weakly protected data.
pub async fn analyze(
    shards: &ShardSet,
    schema: &DiscoveredSchema,
    timeout: Duration,
) -> Vec<SecurityFinding> {
    let mut findings = Vec::new();

    for (shard_id, table_name, table) in schema.tables() {
        let Some(shard) = shards.get(shard_id) else {
            continue;
        };

        for column in table.columns.iter().filter(|c| c.is_text()) {
            let Some(category) = categorize(&column.name) else {
                continue;
            };

            let location = Location {
                shard: shard_id,
                table: table_name,
                column: &column.name,
            };
            match sample_value(shard.pool(), table_name, &column.name, timeout).await {
                Ok(sample) => findings.extend(classify(category, sample.as_deref(), &location)),
                Err(err) => {
                    warn!("Could not sample {table_name}.{} ({shard_id}): {err}", column.name);
                    findings.push(sampling_failed(category, &location, &err));
                }
            }
        }
    }

    info!("Security scan produced {} finding(s)", findings.len());
    findings
}

struct Location<'a> {
    shard: &'a str,
    table: &'a str,
    column: &'a str,
}

impl Location<'_> {
    fn finding(
        &self,
        level: SuggestionLevel,
        category: SensitiveCategory,
        detail: &str,
    ) -> SecurityFinding {
        SecurityFinding {
            level,
            category,
            shard: self.shard.to_string(),
            table: self.table.to_string(),
            column: self.column.to_string(),
            message: format!("{}.{} ({}): {}", self.table, self.column, self.shard, detail),
        }
    }
}

fn sampling_failed(
    category: SensitiveCategory,
    location: &Location<'_>,
    err: &QueryError,
) -> SecurityFinding {
    location.finding(
        SuggestionLevel::Warning,
        category,
        &format!("Error sampling values: {err}"),
    )
}

/// First matching name rule wins
fn categorize(column: &str) -> Option<SensitiveCategory> {
    let name = column.to_lowercase();
    if name.contains("password") {
        Some(SensitiveCategory::Password)
    } else if name.contains("email") {
        Some(SensitiveCategory::Email)
    } else if SSN_NAME_HINTS.iter().any(|hint| name.contains(hint)) {
        Some(SensitiveCategory::Ssn)
    } else if CARD_NAME_HINTS.iter().any(|hint| name.contains(hint)) {
        Some(SensitiveCategory::CreditCard)
    } else {
        None
    }
}

async fn sample_value(
    pool: &Pool<Sqlite>,
    table: &str,
    column: &str,
    timeout: Duration,
) -> Result<Option<String>, QueryError> {
    let sql = format!(
        "SELECT {col} FROM {table} WHERE {col} IS NOT NULL LIMIT 1",
        col = quote_ident(column),
        table = quote_ident(table)
    );
    let (rows, _) = fetch_all(pool, &sql, timeout).await?;
    match rows.first() {
        Some(row) => {
            let value = SqlValue::from_row(row, 0)?;
            Ok((!value.is_null()).then(|| value.to_string()))
        }
        None => Ok(None),
    }
}

fn classify(
    category: SensitiveCategory,
    sample: Option<&str>,
    location: &Location<'_>,
) -> Option<SecurityFinding> {
    match category {
        SensitiveCategory::Password => Some(classify_password(sample, location)),
        SensitiveCategory::Email => {
            let sample = sample?;
            EMAIL_PATTERN.is_match(sample).then(|| {
                location.finding(
                    SuggestionLevel::Warning,
                    category,
                    "contains email addresses (PII); restrict access and consider encryption at rest",
                )
            })
        }
        SensitiveCategory::Ssn => {
            let sample = sample?;
            SSN_PATTERN.is_match(sample.trim()).then(|| {
                location.finding(
                    SuggestionLevel::Critical,
                    category,
                    "contains Social Security numbers (highly sensitive PII); encrypt or tokenize this column",
                )
            })
        }
        SensitiveCategory::CreditCard => {
            let digits: String = sample?
                .chars()
                .filter(|c| *c != ' ' && *c != '-')
                .collect();
            CARD_PATTERN.is_match(&digits).then(|| {
                location.finding(
                    SuggestionLevel::Critical,
                    category,
                    "contains credit card numbers (PCI DSS scope); store tokens instead of raw card numbers",
                )
            })
        }
    }
}

fn classify_password(sample: Option<&str>, location: &Location<'_>) -> SecurityFinding {
    let category = SensitiveCategory::Password;
    let Some(sample) = sample else {
        return location.finding(
            SuggestionLevel::Info,
            category,
            "password column has no data to inspect",
        );
    };

    if SHA256_PATTERN.is_match(sample) {
        location.finding(
            SuggestionLevel::Info,
            category,
            "password values appear hashed (SHA-256 shaped); prefer a salted KDF such as argon2 or bcrypt",
        )
    } else if sample.len() < WEAK_SECRET_MAX_LEN && WEAK_SECRET_PATTERN.is_match(sample) {
        location.finding(
            SuggestionLevel::Critical,
            category,
            "password values look like plaintext or a weak hash; hash them with a salted KDF",
        )
    } else {
        location.finding(
            SuggestionLevel::Warning,
            category,
            "password values are in an unknown format; verify they are hashed",
        )
    }
}
