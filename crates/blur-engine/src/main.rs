//! Server binary for the Blur session framework.
//!
//! Loads configuration, builds the session tree with the configured root
//! modules and runs the real-time tick loop until the tick limit, the root
//! session stopping, or Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `blur-config.yaml` (or `BLUR_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Build the root modules from their data
//! 4. Create the session tree and start the root session
//! 5. Connect demo bots, if configured
//! 6. Run the tick loop
//! 7. Log the run summary

mod config;
mod demo;
mod error;

use std::path::PathBuf;

use blur_core::{MemoryHost, SessionTree, run_session_tree};
use blur_modules::build_modules;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{CONFIG_PATH, EngineConfig};
use crate::demo::DemoBots;
use crate::error::EngineError;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, module construction or starting the
/// root session fails.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration. Logging is not up yet, so the file's level
    //    can seed the filter.
    let config_path =
        std::env::var("BLUR_CONFIG").map_or_else(|_| PathBuf::from(CONFIG_PATH), PathBuf::from);
    let config = EngineConfig::load(&config_path)?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!(
        config = %config_path.display(),
        ticks_per_second = config.server.ticks_per_second,
        max_ticks = config.server.max_ticks,
        seed = config.server.seed,
        root_modules = config.modules.len(),
        "blur-engine starting"
    );

    // 3. Build root modules.
    let modules = build_modules(&config.modules)?;

    // 4. Create the tree and start the root session.
    let mut tree = SessionTree::new(MemoryHost::new(), config.server.seed);
    let root = tree.root();
    for module in modules {
        tree.register_module(root, module)?;
    }
    tree.start_session(root)?;
    info!(session = %root, "Root session started");

    // 5. Demo bots.
    let mut bots = DemoBots::new(&config.demo, config.server.seed);
    if config.demo.bots > 0 {
        bots.connect_all(&mut tree, config.demo.bots);
    }

    // 6. Run.
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C, running until stopped");
            core::future::pending::<()>().await;
        }
        info!("Shutdown requested");
    };
    let result = run_session_tree(&mut tree, &config.server, &mut bots, shutdown).await;

    // 7. Log results.
    let summary = serde_json::to_string(&result)?;
    info!(summary = %summary, "Run summary");
    info!(
        end_reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        "blur-engine shutdown complete"
    );

    Ok(())
}
