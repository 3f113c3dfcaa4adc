//! nkeep-vault entry point
//!
//! `serve` (default) runs the HTTP API; `sync` reconciles a listing file
//! from the command line; `stats` prints library counters.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nkeep_common::config::{self, RootFolderInitializer, RootFolderResolver, TomlConfig};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nkeep_vault::models::RemoteListing;
use nkeep_vault::reconciler::SyncSettings;
use nkeep_vault::services::{HttpMediaDownloader, HttpNoteSource, MediaDownloader, NoteSource};
use nkeep_vault::{AppState, Library};

/// Command-line arguments for nkeep-vault
#[derive(Parser, Debug)]
#[command(name = "nkeep-vault")]
#[command(about = "Local vault for collected notes")]
#[command(version)]
struct Args {
    /// Root folder holding the library, listing snapshot and database
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file (default: ~/.config/nkeep/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve {
        /// Listen address, overrides bind_address from the config file
        #[arg(long)]
        bind: Option<String>,
    },
    /// Download new notes from a listing file
    Sync {
        /// Listing JSON as written by the listing scraper
        #[arg(long)]
        listing: PathBuf,
        /// Also re-download missing media of stored notes
        #[arg(long)]
        repair: bool,
        /// Detail-fetch endpoint, overrides sync.detail_endpoint
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// Print library statistics as JSON
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(config::default_config_path);
    let mut toml_config = config::load_or_default(config_path.as_deref());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                let level = &toml_config.logging.level;
                format!("nkeep_vault={level},nkeep_common={level},tower_http=info").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let root = RootFolderResolver::new(args.root.clone(), &toml_config).resolve();
    let initializer = RootFolderInitializer::new(root);
    info!("Root folder: {}", initializer.root().display());

    match args.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => serve(&initializer, &toml_config, bind).await,
        Command::Sync {
            listing,
            repair,
            endpoint,
        } => {
            if endpoint.is_some() {
                toml_config.sync.detail_endpoint = endpoint;
            }
            sync(&initializer, &toml_config, &listing, repair).await
        }
        Command::Stats => {
            let library = open_library(&initializer, &toml_config).await?;
            let stats = library.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}

async fn open_library(
    initializer: &RootFolderInitializer,
    toml_config: &TomlConfig,
) -> Result<Library> {
    Library::open(initializer, SyncSettings::from_config(&toml_config.sync))
        .await
        .context("Failed to open library")
}

fn collaborators(
    toml_config: &TomlConfig,
) -> Result<(Option<Arc<dyn NoteSource>>, Arc<dyn MediaDownloader>)> {
    let source = HttpNoteSource::from_config(&toml_config.sync)?
        .map(|s| Arc::new(s) as Arc<dyn NoteSource>);
    let downloader: Arc<dyn MediaDownloader> =
        Arc::new(HttpMediaDownloader::from_config(&toml_config.sync)?);
    Ok((source, downloader))
}

async fn serve(
    initializer: &RootFolderInitializer,
    toml_config: &TomlConfig,
    bind: Option<String>,
) -> Result<()> {
    info!("Starting nkeep-vault {}", env!("CARGO_PKG_VERSION"));

    let library = Arc::new(open_library(initializer, toml_config).await?);
    let (source, downloader) = collaborators(toml_config)?;
    if source.is_none() {
        info!("No detail endpoint configured; sync endpoints are disabled");
    }

    let app = nkeep_vault::build_router(AppState::new(library, source, downloader));

    let bind = bind.unwrap_or_else(|| toml_config.bind_address.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn sync(
    initializer: &RootFolderInitializer,
    toml_config: &TomlConfig,
    listing_path: &Path,
    repair: bool,
) -> Result<()> {
    let bytes = std::fs::read(listing_path)
        .with_context(|| format!("Failed to read listing {}", listing_path.display()))?;
    let listing: RemoteListing = serde_json::from_slice(&bytes)
        .with_context(|| format!("Invalid listing {}", listing_path.display()))?;

    let library = open_library(initializer, toml_config).await?;
    let (source, downloader) = collaborators(toml_config)?;
    let source = source
        .context("No detail endpoint configured; pass --endpoint or set sync.detail_endpoint")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Cancelling sync after notes in flight");
        on_signal.cancel();
    });

    let summary = library
        .sync_listing(
            &listing,
            source.as_ref(),
            downloader.as_ref(),
            &cancel,
            None,
            repair,
        )
        .await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
