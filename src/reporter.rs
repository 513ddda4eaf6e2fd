use crate::models::{AnalysisResults, DiscoveredSchema, JoinVerdict};
use clap::ValueEnum;
use snafu::{ResultExt, Snafu};
use std::io::Write;

#[derive(Debug, Snafu)]
pub enum ReporterError {
    #[snafu(display("Failed to write output: {}", source))]
    OutputError { source: std::io::Error },

    #[snafu(display("Failed to serialize results: {}", source))]
    SerializeError { source: serde_json::Error },
}

type Result<T, E = ReporterError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReportFormat {
    /// Plain text summary
    Text,
    /// JSON document of the full result aggregate
    Json,
}

pub struct Reporter {
    format: ReportFormat,
}

impl Reporter {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    pub fn report<W: Write>(&self, out: &mut W, results: &AnalysisResults) -> Result<()> {
        match self.format {
            ReportFormat::Text => self.report_text(out, results),
            ReportFormat::Json => write_json(out, results),
        }
    }

    pub fn report_schema<W: Write>(&self, out: &mut W, schema: &DiscoveredSchema) -> Result<()> {
        match self.format {
            ReportFormat::Text => write_schema_text(out, schema),
            ReportFormat::Json => write_json(out, schema),
        }
    }

    fn report_text<W: Write>(&self, out: &mut W, results: &AnalysisResults) -> Result<()> {
        writeln!(out, "SQLite Shard Analysis Report").context(OutputSnafu)?;
        writeln!(out, "============================\n").context(OutputSnafu)?;

        let slow = results
            .query_performance
            .iter()
            .filter(|r| !r.optimized)
            .count();
        let join_warnings = results
            .relationship_benchmarks
            .iter()
            .filter(|r| matches!(r.verdict, JoinVerdict::Warning | JoinVerdict::Error))
            .count();

        writeln!(out, "Summary:").context(OutputSnafu)?;
        writeln!(out, "  Shards:                 {}", results.schema.shards.len())
            .context(OutputSnafu)?;
        writeln!(out, "  Tables:                 {}", results.schema.table_count())
            .context(OutputSnafu)?;
        writeln!(
            out,
            "  Unoptimized probes:     {} of {}",
            slow,
            results.query_performance.len()
        )
        .context(OutputSnafu)?;
        writeln!(out, "  Index findings:         {}", results.index_advice.len())
            .context(OutputSnafu)?;
        writeln!(out, "  Integrity issues:       {}", results.integrity_issues.len())
            .context(OutputSnafu)?;
        writeln!(out, "  Security findings:      {}", results.security_findings.len())
            .context(OutputSnafu)?;
        writeln!(out, "  Trigger benchmarks:     {}", results.trigger_benchmarks.len())
            .context(OutputSnafu)?;
        writeln!(out, "  Join warnings:          {}", join_warnings).context(OutputSnafu)?;
        writeln!(out).context(OutputSnafu)?;

        if !results.query_performance.is_empty() {
            heading(out, "Query Performance")?;
            for result in &results.query_performance {
                let marker = if result.optimized { "OK  " } else { "SLOW" };
                writeln!(out, "  [{}] {}: {}", marker, result.query, result.time)
                    .context(OutputSnafu)?;
                if !result.optimized {
                    writeln!(out, "         {}", result.suggestion).context(OutputSnafu)?;
                }
            }
            writeln!(out).context(OutputSnafu)?;
        }

        if !results.index_advice.is_empty() {
            heading(out, "Index Advice")?;
            for (issue, suggestion) in results
                .index_advice
                .issues
                .iter()
                .zip(&results.index_advice.suggestions)
            {
                writeln!(out, "  {}", issue).context(OutputSnafu)?;
                writeln!(out, "    {}", suggestion).context(OutputSnafu)?;
            }
            writeln!(out).context(OutputSnafu)?;
        }

        write_lines(out, "Integrity", results.integrity_issues.iter())?;
        write_lines(out, "Security", results.security_findings.iter())?;
        write_lines(out, "Trigger Benchmarks", results.trigger_benchmarks.iter())?;
        write_lines(out, "Relationship Joins", results.relationship_benchmarks.iter())?;

        Ok(())
    }
}

fn heading<W: Write>(out: &mut W, title: &str) -> Result<()> {
    writeln!(out, "{}", title).context(OutputSnafu)?;
    writeln!(out, "{}", "=".repeat(title.len())).context(OutputSnafu)?;
    Ok(())
}

fn write_lines<W, I, T>(out: &mut W, title: &str, items: I) -> Result<()>
where
    W: Write,
    I: ExactSizeIterator<Item = T>,
    T: std::fmt::Display,
{
    if items.len() == 0 {
        return Ok(());
    }
    heading(out, title)?;
    for item in items {
        writeln!(out, "  {}", item).context(OutputSnafu)?;
    }
    writeln!(out).context(OutputSnafu)?;
    Ok(())
}

fn write_json<W: Write, T: serde::Serialize>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context(SerializeSnafu)?;
    writeln!(out).context(OutputSnafu)?;
    Ok(())
}

fn write_schema_text<W: Write>(out: &mut W, schema: &DiscoveredSchema) -> Result<()> {
    for (shard_id, shard) in &schema.shards {
        writeln!(out, "{} ({})", shard_id, shard.path).context(OutputSnafu)?;
        for (name, table) in &shard.tables {
            writeln!(out, "  table {}", name).context(OutputSnafu)?;
            for column in &table.columns {
                let pk = if table.is_primary_key(&column.name) {
                    " PRIMARY KEY"
                } else {
                    ""
                };
                let null = if column.nullable { "" } else { " NOT NULL" };
                writeln!(out, "    {} {}{}{}", column.name, column.data_type, null, pk)
                    .context(OutputSnafu)?;
            }
            for fk in &table.foreign_keys {
                writeln!(
                    out,
                    "    FOREIGN KEY ({}) REFERENCES {}({})",
                    fk.columns.join(", "),
                    fk.referred_table,
                    fk.referred_columns.join(", ")
                )
                .context(OutputSnafu)?;
            }
            for index in &table.indexes {
                let unique = if index.unique { "UNIQUE " } else { "" };
                writeln!(
                    out,
                    "    {}INDEX {} ({})",
                    unique,
                    index.name,
                    index.columns.join(", ")
                )
                .context(OutputSnafu)?;
            }
        }
        for trigger in &shard.triggers {
            writeln!(out, "  trigger {} on {}", trigger.name, trigger.table)
                .context(OutputSnafu)?;
        }
    }
    Ok(())
}
