//! Helpers for building the SQL text the analyzers generate.

use itertools::Itertools;

/// Wraps an identifier in double quotes, doubling embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `"a", "b"` for use in column lists
pub fn column_list(columns: &[String]) -> String {
    columns.iter().map(|c| quote_ident(c)).join(", ")
}

/// `"t"."a", "t"."b"`
pub fn qualified_column_list(table: &str, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| format!("{}.{}", quote_ident(table), quote_ident(c)))
        .join(", ")
}

/// `"a" IS NOT NULL AND "b" IS NOT NULL`
pub fn not_null_predicate(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| format!("{} IS NOT NULL", quote_ident(c)))
        .join(" AND ")
}

/// Row-value expression, parenthesised only for composite keys
pub fn row_value(columns: &[String]) -> String {
    if columns.len() == 1 {
        quote_ident(&columns[0])
    } else {
        format!("({})", column_list(columns))
    }
}

/// Deterministic index name for a suggested `CREATE INDEX`
pub fn suggested_index_name(table: &str, columns: &[String]) -> String {
    let raw = format!("idx_{}_{}", table, columns.join("_"));
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

pub fn create_index_statement(table: &str, columns: &[String]) -> String {
    format!(
        "CREATE INDEX {} ON {} ({});",
        quote_ident(&suggested_index_name(table, columns)),
        quote_ident(table),
        column_list(columns)
    )
}

pub fn drop_index_statement(index: &str) -> String {
    format!("DROP INDEX {};", quote_ident(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_embedded_quotes() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn builds_create_index_for_composite_columns() {
        let columns = vec!["tenant id".to_string(), "email".to_string()];
        assert_eq!(
            create_index_statement("users", &columns),
            "CREATE INDEX \"idx_users_tenant_id_email\" ON \"users\" (\"tenant id\", \"email\");"
        );
    }

    #[test]
    fn row_value_wraps_composites_only() {
        assert_eq!(row_value(&["a".to_string()]), "\"a\"");
        assert_eq!(row_value(&["a".to_string(), "b".to_string()]), "(\"a\", \"b\")");
    }
}
