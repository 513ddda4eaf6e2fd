//! Vocabulary the heuristics match against plan and trigger text.
//!
//! SQLite's `EXPLAIN QUERY PLAN` wording changed in 3.36 (`SCAN TABLE users`
//! became `SCAN users`), so both spellings are recognised.

/// Substring marking a full table scan in older plan wording
pub const FULL_SCAN_MARKER: &str = "SCAN TABLE";

/// Prefix of a plan line that scans rather than searches
pub const SCAN_LINE_PREFIX: &str = "SCAN ";

/// Any of these in a plan line means an index drives the lookup
pub const INDEX_USAGE_MARKERS: [&str; 4] = [
    "USING INDEX",
    "USING COVERING INDEX",
    "USING INTEGER PRIMARY KEY",
    "USING PRIMARY KEY",
];

/// Matched against whitespace-normalised, upper-cased trigger SQL
pub const AFTER_INSERT_MARKER: &str = "AFTER INSERT";

pub fn has_full_scan(plan: &str) -> bool {
    plan.lines().any(|line| {
        let line = line.trim_start();
        line.contains(FULL_SCAN_MARKER) || line.starts_with(SCAN_LINE_PREFIX)
    })
}

pub fn uses_index(plan: &str) -> bool {
    INDEX_USAGE_MARKERS
        .iter()
        .any(|marker| plan.contains(marker))
}

/// Optimized unless the plan scans a table without any index involvement
pub fn is_optimized(plan: &str) -> bool {
    !has_full_scan(plan) || uses_index(plan)
}

pub fn is_after_insert_trigger(sql: &str) -> bool {
    let normalized = sql
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase();
    normalized.contains(AFTER_INSERT_MARKER)
}
