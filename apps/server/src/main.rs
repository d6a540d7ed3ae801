//! Stagehand server: session-scoped, multi-stage, resumable pipelines
//! behind a small HTTP surface.

mod offline;
mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::info;

use stagehand_core::{CachedSearch, PipelineOrchestrator};
use stagehand_pipelines::{Collaborators, registry};
use stagehand_shared::{AppConfig, init_config, load_config, load_config_from};
use stagehand_store::{ResultCache, SessionStore};

use offline::{MarkdownRenderer, OfflineGenerator, OfflineSearch};
use routes::AppState;

/// Resumable pipeline orchestration service.
#[derive(Parser)]
#[command(
    name = "stagehand-server",
    version,
    about = "Run session-scoped, multi-stage, resumable pipelines over HTTP.",
    long_about = None,
)]
struct Args {
    /// Config file path (defaults to ~/.stagehand/stagehand.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write a default config file to the default location and exit.
    #[arg(long)]
    init_config: bool,

    /// Listen address, overriding the config file.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_tracing(&args);

    if args.init_config {
        let path = init_config()?;
        println!("wrote default config to {}", path.display());
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    let listen: SocketAddr = match args.listen {
        Some(addr) => addr,
        None => config.server.listen.parse()?,
    };

    let state = build_state(&config)?;
    spawn_sweeper(&config, state.engine.clone());

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(%listen, "stagehand-server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_state(config: &AppConfig) -> Result<AppState> {
    let cache = Arc::new(ResultCache::new(config.cache.ttl()));
    let search = Arc::new(CachedSearch::new(Arc::new(OfflineSearch), cache));

    // Offline stand-ins until real service clients are wired in.
    let collab = Collaborators {
        search,
        generator: Arc::new(OfflineGenerator),
        renderer: Arc::new(MarkdownRenderer),
    };

    let specs = registry(&collab)?;
    let sessions = Arc::new(SessionStore::new(config.session.ttl()));
    let engine = Arc::new(PipelineOrchestrator::new(
        specs,
        sessions,
        config.execution.clone(),
    ));

    Ok(AppState { engine })
}

/// Periodic TTL sweep, in addition to the sweep at the start of every
/// generate call. Also reclaims idle run-lock entries.
fn spawn_sweeper(config: &AppConfig, engine: Arc<PipelineOrchestrator>) {
    let interval = config.session.sweep_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = engine.sweep().await;
            if removed > 0 {
                info!(removed, "swept expired sessions");
            }
        }
    });
}

fn init_tracing(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match args.verbose {
        0 => "stagehand=info",
        1 => "stagehand=debug",
        _ => "stagehand=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match args.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}
