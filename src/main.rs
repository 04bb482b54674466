use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use module_progression::{
    BehaviorRegistry, ContentLoader, ContentWatcher, EngineConfig, HotReloadEvent,
    InMemoryProgressStore, LogErrorHandler, ProgressionEngine, ProgressionEvent, Result,
};

// ============================================================================
// Arguments
// ============================================================================

struct Args {
    config_path: PathBuf,
    watch: bool,
}

impl Args {
    fn parse() -> Self {
        let mut config_path = PathBuf::from("config.toml");
        let mut watch = false;
        for arg in std::env::args().skip(1) {
            match arg.as_str() {
                "--watch" => watch = true,
                other => config_path = PathBuf::from(other),
            }
        }
        Self { config_path, watch }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match EngineConfig::load(&args.config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config {:?}: {}", args.config_path, e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .init();

    let watch = args.watch || config.content.hot_reload;
    if let Err(e) = run(config, watch).await {
        error!("Progression server failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: EngineConfig, watch: bool) -> Result<()> {
    let data_dir = config.content.data_dir.clone();
    let content = Arc::new(ContentLoader::load_directory(&data_dir)?);

    let mut engine = ProgressionEngine::new(
        config,
        content,
        Arc::new(InMemoryProgressStore::new()),
        Arc::new(BehaviorRegistry::new()),
        Arc::new(LogErrorHandler),
    );
    log_events(&engine.initialize().await?);
    print_worldmap(&engine)?;

    if !watch {
        return Ok(());
    }

    let mut rx = ContentWatcher::start(&data_dir)?;
    info!("Content hot-reload enabled, press Ctrl+C to stop");

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    warn!("Content watcher stopped");
                    break;
                };
                match event {
                    HotReloadEvent::Reloaded { path, registry } => {
                        info!("Content hot-reload: {:?}", path);
                        engine = engine.with_content(registry);
                        log_events(&engine.initialize().await?);
                        print_worldmap(&engine)?;
                    }
                    HotReloadEvent::Error(e) => {
                        error!("Content hot-reload error: {}", e);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn log_events(events: &[ProgressionEvent]) {
    for event in events {
        info!("{} for module '{}'", event.event_type(), event.module_id());
    }
}

fn print_worldmap(engine: &ProgressionEngine) -> Result<()> {
    let json = serde_json::to_string_pretty(&engine.worldmap())?;
    println!("{}", json);
    Ok(())
}
