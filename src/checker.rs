use crate::analysis::{
    index_advisor, integrity, query_perf, relationships, security, trigger_bench,
};
use crate::config::{AnalyzerConfig, Phase};
use crate::connection::{ConnectionError, ShardSet};
use crate::discovery::{discover_schema, DiscoveryError};
use crate::models::{AnalysisResults, DiscoveredSchema};
use snafu::{ResultExt, Snafu};
use tracing::info;

#[derive(Debug, Snafu)]
pub enum CheckerError {
    #[snafu(display("{}", source))]
    Connection { source: ConnectionError },

    #[snafu(display("{}", source))]
    Discovery { source: DiscoveryError },
}

type Result<T, E = CheckerError> = std::result::Result<T, E>;

/// Holds the open shards and their schema snapshot for one analysis run
pub struct ShardChecker {
    config: AnalyzerConfig,
    shards: ShardSet,
    schema: DiscoveredSchema,
}

impl ShardChecker {
    /// Opens every configured database and discovers its schema; any failure is fatal.
    pub async fn new(config: AnalyzerConfig) -> Result<Self> {
        info!("Opening {} database file(s)", config.databases.len());
        let shards = ShardSet::open(&config.databases)
            .await
            .context(ConnectionSnafu)?;

        let schema = match discover_schema(&shards).await {
            Ok(schema) => schema,
            Err(err) => {
                shards.close().await;
                return Err(CheckerError::Discovery { source: err });
            }
        };

        info!(
            "Discovered {} table(s), {} relationship(s), {} trigger(s)",
            schema.table_count(),
            schema.relationships.len(),
            schema.all_triggers.len()
        );

        Ok(Self {
            config,
            shards,
            schema,
        })
    }

    pub fn schema(&self) -> &DiscoveredSchema {
        &self.schema
    }

    pub fn shards(&self) -> &ShardSet {
        &self.shards
    }

    /// Runs every selected phase. Phases only read the snapshot and live shards.
    pub async fn analyze(&self) -> AnalysisResults {
        let timeout = self.config.query_timeout();
        let mut results = AnalysisResults {
            schema: self.schema.clone(),
            ..Default::default()
        };

        if self.config.runs(Phase::QueryPerformance) {
            info!("Running query performance probes...");
            results.query_performance =
                query_perf::analyze(&self.shards, &self.schema, timeout).await;
        }

        if self.config.runs(Phase::Indexes) {
            info!("Running index analysis...");
            results.index_advice = index_advisor::analyze(&self.schema);
        }

        if self.config.runs(Phase::Integrity) {
            info!("Running integrity checks...");
            results.integrity_issues =
                integrity::analyze(&self.shards, &self.schema, timeout).await;
        }

        if self.config.runs(Phase::Security) {
            info!("Running security scan...");
            results.security_findings =
                security::analyze(&self.shards, &self.schema, timeout).await;
        }

        if self.config.runs(Phase::Triggers) {
            info!("Running trigger benchmarks...");
            results.trigger_benchmarks = trigger_bench::analyze(
                &self.shards,
                &self.schema,
                self.config.trigger_batch_size,
                timeout,
            )
            .await;
        }

        if self.config.runs(Phase::Relationships) {
            info!("Running relationship join analysis...");
            results.relationship_benchmarks =
                relationships::analyze(&self.shards, &self.schema, timeout).await;
        }

        results
    }

    pub async fn close(self) {
        self.shards.close().await;
    }
}
