//! Session tree, module framework, event bus and tick loop for Blur.
//!
//! A game server is organised as a tree of sessions (root, lobby, match).
//! Each session owns a list of modules with a load/enable/disable/unload
//! lifecycle. Modules tick, subscribe to session-scoped events and schedule
//! tasks; the tree routes everything on a single logical thread.
//!
//! # Modules
//!
//! - [`config`] -- `ServerConfig`/`LoggingConfig` and YAML loading.
//! - [`error`] -- [`SessionError`], [`ModuleError`] and [`HostError`].
//! - [`events`] -- [`SessionEvent`], subscriptions and the priority-ordered
//!   [`EventBus`].
//! - [`host`] -- The [`Host`] trait the framework drives, host events, and
//!   the in-memory [`MemoryHost`].
//! - [`module`] -- The [`Module`] trait, its capabilities and
//!   [`ModuleContext`].
//! - [`players`] -- Connected players and their leaf sessions.
//! - [`runner`] -- The async real-time tick loop.
//! - [`scheduler`] -- Delayed and repeating tasks owned by modules.
//! - [`session`] -- A single node of the tree.
//! - [`tree`] -- [`SessionTree`], the owner of all of the above.

pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod module;
pub mod players;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod tree;

pub use config::{ConfigError, LoggingConfig, ServerConfig};
pub use error::{HostError, ModuleError, SessionError};
pub use events::{EventBus, EventKind, SessionEvent, Subscription};
pub use host::{Host, HostEvent, HostOutcome, MemoryHost};
pub use module::{EventSubscriber, Module, ModuleContext, ModuleKey, Tickable};
pub use players::{PlayerRecord, PlayerRegistry};
pub use runner::{NoOpCallback, RunEndReason, RunResult, TickCallback, run_session_tree};
pub use scheduler::{Scheduler, TaskHandle};
pub use session::Session;
pub use tree::{SessionTree, TickSummary};
