use clap::{Args, Parser, Subcommand};
use shardscope::checker::ShardChecker;
use shardscope::config::{AnalyzerConfig, Phase, DEFAULT_TRIGGER_BATCH_SIZE};
use shardscope::reporter::{ReportFormat, Reporter};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// SQLite shard analyzer - discovers schemas and reports index, integrity, security and performance findings
#[derive(Parser, Debug)]
#[command(name = "shardscope")]
#[command(version = "0.1.0")]
#[command(about = "SQLite schema and data analyzer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value = "text", global = true)]
    format: ReportFormat,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze one or more SQLite database files as shards
    Analyze {
        /// Database files; shard ids follow this order
        #[arg(required = true)]
        databases: Vec<PathBuf>,

        #[command(flatten)]
        options: AnalyzeOptions,
    },
    /// Run every analysis listed in a YAML config file
    Config {
        /// Path to YAML config file
        #[arg(short = 'c', long = "config")]
        config_path: String,
    },
    /// Print the discovered schema without running any analysis
    Schema {
        /// Database files; shard ids follow this order
        #[arg(required = true)]
        databases: Vec<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct AnalyzeOptions {
    /// Upper bound for every generated query, in milliseconds
    #[arg(
        long = "timeout-ms",
        env = "SHARDSCOPE_QUERY_TIMEOUT_MS",
        default_value = "5000"
    )]
    timeout_ms: u64,

    /// Synthetic rows inserted per AFTER INSERT trigger
    #[arg(long = "batch-size", default_value_t = DEFAULT_TRIGGER_BATCH_SIZE)]
    batch_size: usize,

    /// Do not run trigger benchmarks (they commit synthetic rows)
    #[arg(long = "skip-trigger-benchmarks", default_value_t = false)]
    skip_trigger_benchmarks: bool,

    /// Restrict the run to these phases (repeatable)
    #[arg(long = "phase", value_enum)]
    phases: Vec<Phase>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let reporter = Reporter::new(cli.format);
    let stdout = std::io::stdout();

    match cli.command {
        Commands::Analyze { databases, options } => {
            let config = AnalyzerConfig {
                databases,
                query_timeout_ms: options.timeout_ms,
                trigger_batch_size: options.batch_size,
                run_trigger_benchmarks: !options.skip_trigger_benchmarks,
                phases: options.phases,
            };
            config.validate()?;
            run(config, &reporter, &mut stdout.lock()).await?;
        }
        Commands::Config { config_path } => {
            info!("Loading config from: {}", config_path);
            let configs = AnalyzerConfig::from_config_file(&config_path)?;

            for config in configs {
                run(config, &reporter, &mut stdout.lock()).await?;
            }
        }
        Commands::Schema { databases } => {
            let checker = ShardChecker::new(AnalyzerConfig::new(databases)).await?;
            reporter.report_schema(&mut stdout.lock(), checker.schema())?;
            checker.close().await;
        }
    }

    Ok(())
}

async fn run(
    config: AnalyzerConfig,
    reporter: &Reporter,
    out: &mut impl std::io::Write,
) -> anyhow::Result<()> {
    info!("Analyzing {} database file(s)", config.databases.len());
    let checker = ShardChecker::new(config).await?;
    let results = checker.analyze().await;
    reporter.report(out, &results)?;
    checker.close().await;
    Ok(())
}
