// src/main.rs

//! mangawatch: Manga Update Notification CLI
//!
//! Polls tracked series on their sources, detects new chapters and fans
//! notifications out to the registered webhooks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use env_logger::Env;

use mangawatch::config::load_config;
use mangawatch::error::{AppError, Result, fingerprint};
use mangawatch::fetch::FetchExecutor;
use mangawatch::models::{Config, Endpoint, Series, SeriesStatus};
use mangawatch::pipeline::{NotificationDispatcher, PollScheduler, WebhookTransport};
use mangawatch::sources::SourceRegistry;
use mangawatch::storage::LocalStore;

#[derive(Parser, Debug)]
#[command(
    name = "mangawatch",
    version,
    about = "Manga update detection and webhook notification"
)]
struct Cli {
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single polling cycle and exit
    Check,
    /// Poll continuously until interrupted
    Run {
        /// Seconds between cycles
        #[arg(long, default_value_t = 300)]
        every: u64,
    },
    /// Start tracking a series
    Add {
        /// Source key (e.g. manganato)
        source: String,
        /// Source-local series identifier
        series_id: String,
        /// Webhook URL to notify on new chapters
        #[arg(long)]
        webhook: Option<String>,
    },
    /// Validate configuration and exit
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    env_logger::Builder::from_env(Env::default().default_filter_or(&config.logging.level)).init();

    match cli.command {
        Command::Check => {
            let scheduler = build_scheduler(&config).await?;
            scheduler.run_cycle().await?;
        }
        Command::Run { every } => {
            let scheduler = build_scheduler(&config).await?;
            run_loop(&scheduler, Duration::from_secs(every)).await;
        }
        Command::Add {
            source,
            series_id,
            webhook,
        } => add_series(&config, source, series_id, webhook).await?,
        Command::Validate => {
            log::info!("Configuration OK ({:?})", cli.config);
        }
    }

    Ok(())
}

/// Resolve a series' metadata on its source and add it to the watchlist.
/// The first polling cycle baselines its chapter state.
async fn add_series(
    config: &Config,
    source: String,
    series_id: String,
    webhook: Option<String>,
) -> Result<()> {
    let registry = SourceRegistry::with_defaults();
    let adapter = registry.get(&source).ok_or_else(|| {
        AppError::validation(format!(
            "unknown source '{}'; known sources: {}",
            source,
            registry.keys().join(", ")
        ))
    })?;

    let fetch = FetchExecutor::with_client(config.fetch.clone())?;
    let store = LocalStore::open(&config.storage.data_dir, config.poll.clone()).await?;

    let id = format!("{source}:{series_id}");
    let mut series = Series {
        id: id.clone(),
        source,
        source_id: series_id,
        title: String::new(),
        status: SeriesStatus::Ongoing,
        last_chapter: None,
        last_chapter_label: None,
        last_checked: None,
    };

    let metadata = adapter.fetch_series_metadata(&fetch, &series).await?;
    series.title = metadata.title;
    if metadata.completed {
        series.status = SeriesStatus::Completed;
        log::warn!("'{}' is already completed on its source", series.title);
    }

    log::info!("Tracking '{}' as {}", series.title, id);
    store.insert_series(series).await?;

    if let Some(url) = webhook {
        let endpoint_id = format!("hook:{}", fingerprint(&url));
        store
            .insert_endpoint(Endpoint {
                id: endpoint_id.clone(),
                url,
                mention: None,
            })
            .await?;
        store.subscribe(&id, &endpoint_id).await?;
        log::info!("Registered endpoint {} for {}", endpoint_id, id);
    }

    Ok(())
}

async fn build_scheduler(config: &Config) -> Result<PollScheduler> {
    let store = Arc::new(LocalStore::open(&config.storage.data_dir, config.poll.clone()).await?);
    let registry = Arc::new(SourceRegistry::with_defaults());
    let fetch = Arc::new(FetchExecutor::with_client(config.fetch.clone())?);
    let transport = Arc::new(WebhookTransport::new(&config.fetch)?);
    let dispatcher = NotificationDispatcher::new(transport, config.dispatch.clone());

    Ok(PollScheduler::new(
        store,
        registry,
        fetch,
        dispatcher,
        Arc::new(config.clone()),
    ))
}

/// Poll until ctrl-c. A cancellation mid-cycle discards the in-flight
/// cycle's partial work; committed series state is always consistent.
async fn run_loop(scheduler: &PollScheduler, every: Duration) {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, shutting down");
                break;
            }
            result = scheduler.run_cycle() => {
                if let Err(e) = result {
                    log::error!("Cycle aborted: {e}; retrying next cycle");
                }
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, shutting down");
                break;
            }
            _ = tokio::time::sleep(every) => {}
        }
    }
}
