use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use lunahost::console::{execute, parse_command};
use lunahost::{Config, LoaderTick, StandaloneHost, SupervisorBuilder};

const CONFIG_PATH: &str = "config.toml";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Load configuration
    let config = match Config::load(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {CONFIG_PATH}: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };

    // Initialize logging
    if let Err(e) = lunahost::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        lunahost::logging::init_console_only(&config.logging.level);
    }

    info!("lunahost {}", env!("CARGO_PKG_VERSION"));

    // Plugins the standalone host reports as present
    let plugins: Vec<String> = std::env::var("LUNAHOST_PLUGINS")
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let tick_millis = config.scripts.tick_millis.max(1);
    let supervisor = SupervisorBuilder::new(config, Arc::new(StandaloneHost::with_plugins(plugins)))
        .config_path(CONFIG_PATH)
        .build();

    let mut loader = supervisor.start();
    let mut ticker = tokio::time::interval(Duration::from_millis(tick_millis));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(active) = loader.as_mut() {
                    match active.tick(&supervisor) {
                        LoaderTick::Finished | LoaderTick::Cancelled => loader = None,
                        LoaderTick::Waiting | LoaderTick::Loaded { .. } => {}
                    }
                }
                supervisor.tick();
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        for output in execute(&supervisor, &parse_command(&line)) {
                            println!("{output}");
                        }
                    }
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        warn!("Failed to read console input: {e}");
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    supervisor.shutdown();
}
