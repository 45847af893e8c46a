mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "autograder")]
#[command(about = "Autograder CLI - Grade submissions against a code-execution sandbox", long_about = None)]
struct Cli {
    /// Log output format (logs go to stderr)
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a submission and print the result as JSON
    Grade {
        /// Language name (e.g., python, java, cpp, rust, javascript)
        #[arg(short, long)]
        language: String,

        /// Path to the student's source file
        #[arg(short, long)]
        source: PathBuf,

        /// Path to a JSON array of test cases
        #[arg(short, long)]
        tests: PathBuf,

        /// Show hidden tests (instructor view)
        #[arg(long, default_value = "false")]
        instructor: bool,

        /// Run timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Print Prometheus metrics to stderr afterwards
        #[arg(long, default_value = "false")]
        metrics: bool,
    },

    /// Print the generated harness without running it
    Harness {
        #[arg(short, long)]
        language: String,

        #[arg(short, long)]
        source: PathBuf,

        #[arg(short, long)]
        tests: PathBuf,
    },

    /// List runtimes installed in the sandbox
    Runtimes,

    /// Show which sandbox version a language resolves to
    Resolve {
        #[arg(short, long)]
        language: String,

        /// Preferred version or prefix (e.g., 3.10, 17.x)
        #[arg(short, long)]
        version: Option<String>,
    },

    /// Install sandbox packages for languages that have none
    Install {
        /// Languages to install (defaults to all supported)
        languages: Vec<String>,
    },

    /// Probe the sandbox and show circuit breaker state
    Status,
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match cli.command {
        Commands::Grade {
            language,
            source,
            tests,
            instructor,
            timeout_ms,
            metrics,
        } => {
            commands::grade(&language, &source, &tests, instructor, timeout_ms, metrics).await?;
        }
        Commands::Harness { language, source, tests } => {
            commands::print_harness(&language, &source, &tests)?;
        }
        Commands::Runtimes => {
            commands::list_runtimes().await?;
        }
        Commands::Resolve { language, version } => {
            commands::resolve(&language, version.as_deref()).await?;
        }
        Commands::Install { languages } => {
            commands::install(&languages).await?;
        }
        Commands::Status => {
            commands::status().await?;
        }
    }

    Ok(())
}
