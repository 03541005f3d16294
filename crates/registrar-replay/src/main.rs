//! Replay binary for the Registrar service registry.
//!
//! Feeds a scripted sequence of registrations, unregistrations, and source
//! evictions through a [`SourcedRegistry`] and prints every resulting
//! change notification as one JSON object per line on stdout.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `$REGISTRAR_CONFIG` or `registrar.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Load the script named by the first argument (default `replay.yaml`)
//! 4. Subscribe a printer task to the registry's notifications
//! 5. Apply the script
//! 6. Log a summary of the surviving entities and per-origin counters

mod error;
mod script;

use std::path::PathBuf;
use std::sync::Arc;

use registrar_holder::OriginCounters;
use registrar_registry::{RegistryConfig, SourcedRegistry};
use registrar_types::{ChangeNotification, InstanceInfo, Origin};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::ReplayError;
use crate::script::Script;

/// Environment variable naming the config file.
const CONFIG_ENV: &str = "REGISTRAR_CONFIG";

/// Config file used when `REGISTRAR_CONFIG` is unset.
const DEFAULT_CONFIG: &str = "registrar.yaml";

/// Script used when no argument is given.
const DEFAULT_SCRIPT: &str = "replay.yaml";

/// Application entry point for the replay binary.
///
/// # Errors
///
/// Returns an error if the config or script cannot be loaded, or if a
/// registry operation fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Logging is not up yet, so remember where it came from.
    let (config, config_path) = load_config()?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("registrar-replay starting");
    let config_source = config_path
        .as_ref()
        .map_or_else(|| "defaults".to_owned(), |path| path.display().to_string());
    info!(
        source = %config_source,
        notification_buffer = config.notifications.buffer,
        log_level = %config.logging.level,
        "Configuration loaded"
    );

    // 3. Load the script.
    let script_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_SCRIPT), PathBuf::from);
    let script = Script::from_file(&script_path)?;
    info!(path = %script_path.display(), steps = script.steps.len(), "Script loaded");

    // 4. Subscribe the printer before the first write.
    let metrics = Arc::new(OriginCounters::new());
    let registry = SourcedRegistry::new(&config, metrics.clone());
    let printer = spawn_printer(registry.subscribe());

    // 5. Apply the script.
    let report = script.apply(&registry)?;
    info!(
        steps = report.steps,
        entities_removed = report.entities_removed,
        copies_evicted = report.copies_evicted,
        "Script applied"
    );

    // 6. Summarize.
    let remaining = registry.for_snapshot()?;
    info!(entities = remaining.len(), "Replay finished");
    for notification in &remaining {
        if let Some(summary) = registry.describe(notification.data().id())? {
            info!("{summary}");
        }
    }
    for origin in Origin::ALL {
        info!(
            %origin,
            registrations = metrics.registrations(origin),
            unregistrations = metrics.unregistrations(origin),
            "Origin counters"
        );
    }

    // Dropping the registry closes the channel, which ends the printer.
    drop(registry);
    let printed = printer.await.map_err(|e| ReplayError::Printer {
        message: e.to_string(),
    })?;
    info!(printed, "Notifications printed");

    Ok(())
}

/// Load configuration from `$REGISTRAR_CONFIG` or `registrar.yaml`.
///
/// Returns the config and the path it was read from, or `None` when no
/// file exists and defaults are used.
fn load_config() -> Result<(RegistryConfig, Option<PathBuf>), ReplayError> {
    let path = std::env::var(CONFIG_ENV)
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG), PathBuf::from);
    if path.exists() {
        let config = RegistryConfig::from_file(&path)?;
        Ok((config, Some(path)))
    } else {
        let mut config = RegistryConfig::default();
        config.apply_env_overrides();
        Ok((config, None))
    }
}

/// Print every notification as a JSON line until the channel closes.
///
/// Resolves to the number of notifications printed.
fn spawn_printer(
    mut rx: broadcast::Receiver<ChangeNotification<InstanceInfo>>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut printed: usize = 0;
        loop {
            match rx.recv().await {
                Ok(notification) => {
                    let json = match serde_json::to_string(&notification) {
                        Ok(j) => j,
                        Err(e) => {
                            warn!("Failed to serialize notification: {e}");
                            continue;
                        }
                    };
                    println!("{json}");
                    printed = printed.saturating_add(1);
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Printer lagged, notifications dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("Notification channel closed");
                    break;
                }
            }
        }
        printed
    })
}
