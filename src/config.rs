use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_TRIGGER_BATCH_SIZE: usize = 100;

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Failed to read config file: {}", source))]
    FileRead { source: std::io::Error },

    #[snafu(display("Failed to parse YAML config: {}", source))]
    YamlParse { source: serde_yaml::Error },

    #[snafu(display("Analysis run has no database files"))]
    NoDatabases,

    #[snafu(display("Invalid setting {}: {}", setting, reason))]
    InvalidSetting { setting: String, reason: String },
}

type Result<T, E = ConfigError> = std::result::Result<T, E>;

/// Analysis phases that run after schema discovery
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    QueryPerformance,
    Indexes,
    Integrity,
    Security,
    Triggers,
    Relationships,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Database files; shard ids follow this order
    pub databases: Vec<PathBuf>,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_trigger_batch_size")]
    pub trigger_batch_size: usize,
    #[serde(default = "default_true")]
    pub run_trigger_benchmarks: bool,
    /// Empty selects every phase
    #[serde(default)]
    pub phases: Vec<Phase>,
}

fn default_query_timeout_ms() -> u64 {
    DEFAULT_QUERY_TIMEOUT_MS
}

fn default_trigger_batch_size() -> usize {
    DEFAULT_TRIGGER_BATCH_SIZE
}

fn default_true() -> bool {
    true
}

impl AnalyzerConfig {
    pub fn new(databases: Vec<PathBuf>) -> Self {
        Self {
            databases,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            trigger_batch_size: DEFAULT_TRIGGER_BATCH_SIZE,
            run_trigger_benchmarks: true,
            phases: Vec::new(),
        }
    }

    pub fn from_config_file(path: &str) -> Result<Vec<Self>> {
        let content = fs::read_to_string(path).context(FileReadSnafu)?;
        let configs: Vec<AnalyzerConfig> =
            serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        for config in &configs {
            config.validate()?;
        }
        Ok(configs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.databases.is_empty() {
            return NoDatabasesSnafu.fail();
        }
        if self.query_timeout_ms == 0 {
            return InvalidSettingSnafu {
                setting: "query_timeout_ms",
                reason: "must be greater than zero",
            }
            .fail();
        }
        if self.trigger_batch_size == 0 {
            return InvalidSettingSnafu {
                setting: "trigger_batch_size",
                reason: "must be greater than zero",
            }
            .fail();
        }
        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn runs(&self, phase: Phase) -> bool {
        let selected = self.phases.is_empty() || self.phases.contains(&phase);
        match phase {
            Phase::Triggers => selected && self.run_trigger_benchmarks,
            _ => selected,
        }
    }
}
