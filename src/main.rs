use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use visit_counter::{CliArgs, Config, SimulateOptions};

#[derive(Parser)]
#[command(name = "visit-counter")]
#[command(about = "Buffered page visit counter in front of a shared counter store")]
struct Cli {
    #[arg(short, long, help = "Increase verbosity")]
    verbose: bool,

    #[arg(short, long, env = "VISIT_COUNTER_CONFIG", help = "Path to a TOML or JSON config file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Counter store URL (memory:// for an in-process store)")]
    store_url: Option<String>,

    #[arg(long, help = "Seconds a computed total is served from cache")]
    cache_ttl: Option<u64>,

    #[arg(long, help = "Seconds between flushes to the store")]
    flush_interval: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record visits to a page and print the persisted total
    Hit {
        page: String,
        #[arg(short = 'n', long, default_value_t = 1)]
        times: u64,
    },
    /// Print the current total for a page
    Count { page: String },
    /// Run concurrent writers and readers and print final totals
    Simulate {
        #[arg(long, default_value_t = 8)]
        pages: usize,
        #[arg(long, default_value_t = 4)]
        writers: usize,
        #[arg(long, default_value_t = 1000)]
        visits: u64,
        #[arg(long, default_value_t = 2)]
        readers: usize,
        #[arg(long, default_value_t = 5)]
        duration_secs: u64,
    },
}

fn init_logging(level: &str) -> Result<()> {
    let level = level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        store_url: cli.store_url.clone(),
        config_file: cli.config.clone(),
        cache_ttl_secs: cli.cache_ttl,
        flush_interval_secs: cli.flush_interval,
        verbose: cli.verbose,
    };
    let config = Config::load_with_cli(&args).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    init_logging(&config.logging.level)?;
    tracing::debug!(store_url = %config.store.url, counter = ?config.counter, "Configuration loaded");

    match cli.command {
        Command::Hit { page, times } => {
            let count = visit_counter::hit(config, &page, times).await?;
            println!("{}", serde_json::to_string(&count)?);
        }
        Command::Count { page } => {
            let count = visit_counter::count(config, &page).await?;
            println!("{}", serde_json::to_string(&count)?);
        }
        Command::Simulate {
            pages,
            writers,
            visits,
            readers,
            duration_secs,
        } => {
            let options = SimulateOptions {
                pages,
                writers,
                visits_per_writer: visits,
                readers,
                duration: Duration::from_secs(duration_secs),
            };
            let summary = visit_counter::simulate(config, options).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
