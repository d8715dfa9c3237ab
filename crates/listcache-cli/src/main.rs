//! listcache - command line front end for the list cache.
//!
//! Loads the configuration, runs the preload cycle and prints statistics,
//! samples, single records or site users. A failed preload is fatal.

use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use listcache_core::{AppConfig, CacheStats, ListService, PreloadSummary};

/// Log file name prefix inside `--log-dir`.
const LOG_FILE_PREFIX: &str = "listcache.log";

/// Records printed by `sample` when `-n` is not given.
const DEFAULT_SAMPLE_SIZE: usize = 5;

#[derive(Parser, Debug)]
#[command(name = "listcache")]
#[command(about = "Preload and inspect cached list data")]
#[command(version)]
struct Args {
    /// Path to config file (default: $XDG_CONFIG_HOME/listcache/config.json)
    #[arg(short, long, global = true, env = "LISTCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Read only from fallback snapshots, never from the live backend
    #[arg(long, global = true)]
    offline: bool,

    /// Also write logs to daily files in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the preload cycle and print cache statistics
    Preload,
    /// Print the first records of a list slot as JSON
    Sample {
        alias: String,
        #[arg(short = 'n', long, default_value_t = DEFAULT_SAMPLE_SIZE)]
        count: usize,
    },
    /// Print one record of a list slot, with its requirements when it is a parent
    Item { alias: String, id: i64 },
    /// Print one site user
    User { id: i64 },
}

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let _log_guard = init_tracing(args.log_dir.as_ref());
    info!("listcache starting");

    let mut config = AppConfig::load(args.config.as_deref())?;
    if args.offline {
        config.use_fallback_data = true;
    }

    let service = ListService::new(config).context("Failed to create list service")?;
    let summary = service.preload().await.context("Preload failed")?;

    match args.command {
        Command::Preload => print_preload(&summary, &service.stats()),
        Command::Sample { alias, count } => {
            ensure_alias(&service, &alias)?;
            print_json(&service.sample(&alias, count))?;
        }
        Command::Item { alias, id } => {
            ensure_alias(&service, &alias)?;
            let Some(record) = service.find_by_id(&alias, id) else {
                bail!("No item {} in {}", id, alias);
            };
            if alias == service.config().relationships.parent_list {
                let requirements = service.requirements_for(id);
                print_json(&json!({ "item": record, "requirements": requirements }))?;
            } else {
                print_json(&record)?;
            }
        }
        Command::User { id } => match service.user_by_id(id) {
            Some(user) => print_json(&user)?,
            None => bail!("No site user with id {}", id),
        },
    }

    Ok(())
}

fn ensure_alias(service: &ListService, alias: &str) -> Result<()> {
    if !service.config().lists.contains_key(alias) {
        let known: Vec<&str> = service.config().lists.keys().map(String::as_str).collect();
        bail!("Unknown list alias '{}' (configured: {})", alias, known.join(", "));
    }
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

fn print_preload(summary: &PreloadSummary, stats: &CacheStats) {
    println!(
        "Preloaded {} lists in {} ms",
        summary.list_counts.len(),
        summary.elapsed.as_millis()
    );
    for (alias, count) in &summary.list_counts {
        println!("  {:<24} {:>6} records", alias, count);
    }
    println!("  {:<24} {:>6} records", "site users", summary.site_user_count);
    if let Some(user) = &summary.current_user {
        println!("Current user: {}", user);
    }
    println!(
        "Requirements: {} linked, {} unlinked",
        summary.linked_requirements, summary.unlinked_requirements
    );
    println!(
        "Cache: {} entries, {} loads, {} hits, {} misses, {} coalesced, hit rate {}",
        stats.cached_entry_count,
        stats.load_count,
        stats.hits,
        stats.misses,
        stats.coalesced,
        stats.hit_rate_display()
    );
}
