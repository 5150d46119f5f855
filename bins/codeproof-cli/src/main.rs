mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "codeproof")]
#[command(about = "Verify generated code against unit tests in disposable containers", long_about = None)]
struct Cli {
    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported languages
    ListLangs,

    /// List supported versions of a language
    Versions {
        /// Language name (e.g., python, java)
        #[arg(short, long)]
        name: String,
    },

    /// Run an implementation against tests once, without generation
    Run {
        /// File with the implementation
        #[arg(short, long)]
        code: PathBuf,

        /// File with the unit tests
        #[arg(short, long)]
        tests: PathBuf,

        /// Language name
        #[arg(short, long)]
        lang: String,

        /// Language version (defaults to the runtime's default)
        #[arg(short, long)]
        version: Option<String>,
    },

    /// Generate an implementation for the tests and repair it until it passes
    Verify {
        /// File with the unit tests
        #[arg(short, long)]
        tests: PathBuf,

        /// Language name
        #[arg(short, long)]
        lang: String,

        /// Language version (defaults to the runtime's default)
        #[arg(short, long)]
        version: Option<String>,

        /// Round budget (overrides MAX_ROUNDS)
        #[arg(long)]
        max_rounds: Option<u32>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("CODEPROOF_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // Results go to stdout; logs stay on stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = codeproof_common::Config::from_env();

    let succeeded = match cli.command {
        Commands::ListLangs => commands::list_languages(&config, cli.json)?,
        Commands::Versions { name } => commands::list_versions(&config, &name, cli.json)?,
        Commands::Run {
            code,
            tests,
            lang,
            version,
        } => commands::run(&config, &code, &tests, &lang, version.as_deref()).await?,
        Commands::Verify {
            tests,
            lang,
            version,
            max_rounds,
        } => {
            let config = match max_rounds {
                Some(rounds) => config.with_max_rounds(rounds),
                None => config,
            };
            commands::verify(&config, &tests, &lang, version.as_deref()).await?
        }
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
