//! Real-time tick loop.
//!
//! [`run_session_tree`] drives a [`SessionTree`] at the configured tick rate
//! until one of the following happens:
//!
//! - **Tick limit**: `max_ticks` ticks have run (when non-zero)
//! - **Root stopped**: a module stopped the root session
//! - **Shutdown**: the supplied shutdown future resolved
//!
//! On shutdown the root session is stopped with [`StopReason::Shutdown`] so
//! every module gets its disable/unload calls.

use core::future::Future;

use blur_types::StopReason;
use serde::Serialize;
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::host::Host;
use crate::tree::{SessionTree, TickSummary};

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEndReason {
    /// `max_ticks` reached.
    MaxTicks,
    /// The root session no longer exists.
    RootStopped,
    /// The shutdown signal fired.
    Shutdown,
}

/// Result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Why the loop ended.
    pub end_reason: RunEndReason,
    /// The last tick summary, if any tick completed.
    pub final_summary: Option<TickSummary>,
    /// Total number of ticks executed.
    pub total_ticks: u64,
}

/// Callback invoked after each tick completes.
///
/// The engine uses this to drive its demo host; tests use it to inject
/// host events at precise ticks.
pub trait TickCallback<H: Host> {
    /// Called after a tick completes.
    fn on_tick(&mut self, summary: &TickSummary, tree: &mut SessionTree<H>);
}

/// A no-op tick callback.
pub struct NoOpCallback;

impl<H: Host> TickCallback<H> for NoOpCallback {
    fn on_tick(&mut self, _summary: &TickSummary, _tree: &mut SessionTree<H>) {}
}

/// Run the tick loop until a termination condition is met.
pub async fn run_session_tree<H: Host>(
    tree: &mut SessionTree<H>,
    config: &ServerConfig,
    callback: &mut dyn TickCallback<H>,
    shutdown: impl Future<Output = ()>,
) -> RunResult {
    let mut interval = tokio::time::interval(Duration::from_millis(config.tick_interval_ms()));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut final_summary = None;
    let mut total_ticks: u64 = 0;

    info!(
        ticks_per_second = config.ticks_per_second,
        max_ticks = config.max_ticks,
        "Tick loop starting"
    );

    let end_reason = loop {
        if !tree.is_running() {
            break RunEndReason::RootStopped;
        }
        if config.max_ticks > 0 && total_ticks >= config.max_ticks {
            break RunEndReason::MaxTicks;
        }

        tokio::select! {
            biased;
            () = &mut shutdown => break RunEndReason::Shutdown,
            _ = interval.tick() => {}
        }

        let summary = tree.tick();
        total_ticks = total_ticks.saturating_add(1);
        callback.on_tick(&summary, tree);
        final_summary = Some(summary);
    };

    if end_reason == RunEndReason::Shutdown && tree.is_running() {
        let root = tree.root();
        if let Err(e) = tree.stop_session(root, StopReason::Shutdown) {
            warn!(error = %e, "Failed to stop root session on shutdown");
        }
    }

    info!(reason = ?end_reason, total_ticks, "Tick loop ended");
    RunResult {
        end_reason,
        final_summary,
        total_ticks,
    }
}
