//! Error types for the `blur-core` crate.
//!
//! - [`SessionError`] covers session-tree invariant violations and invalid
//!   lifecycle transitions.
//! - [`ModuleError`] is what module constructors and lifecycle hooks return;
//!   configuration problems surface as [`ModuleError::Parse`].
//! - [`HostError`] reports failures of the host platform's blocking
//!   operations (world preparation and cleanup).

use blur_types::{LifecycleState, PlayerId, SessionId};
use blur_world::WorldError;

use crate::module::ModuleKey;

/// Errors raised by the session tree.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session with this id exists.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The session already has a parent.
    #[error("session {child} is already a child of {parent}")]
    AlreadyParented {
        /// The session being attached.
        child: SessionId,
        /// Its existing parent.
        parent: SessionId,
    },

    /// A session was asked to make an illegal lifecycle transition.
    #[error("session {session} cannot go from {from} to {to}")]
    InvalidTransition {
        /// The session.
        session: SessionId,
        /// Current state.
        from: LifecycleState,
        /// Requested state.
        to: LifecycleState,
    },

    /// A module was asked to make an illegal lifecycle transition.
    #[error("module {module} cannot go from {from} to {to}")]
    ModuleTransition {
        /// Module name.
        module: &'static str,
        /// Current state.
        from: LifecycleState,
        /// Requested state.
        to: LifecycleState,
    },

    /// A module cannot be enabled while its session is not enabled.
    #[error("session {0} is not enabled")]
    SessionNotEnabled(SessionId),

    /// No module is registered under this key.
    #[error("module not found: {0}")]
    ModuleNotFound(ModuleKey),

    /// Modules can only be registered before the session is loaded.
    #[error("session {0} is already loaded; modules are fixed at construction")]
    ModulesSealed(SessionId),

    /// The player is not connected.
    #[error("player not connected: {0}")]
    PlayerNotConnected(PlayerId),

    /// A module failed during a lifecycle hook.
    #[error("module {module} failed: {source}")]
    Module {
        /// Module name.
        module: &'static str,
        /// The underlying module error.
        source: ModuleError,
    },
}

/// Errors returned by modules.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// Module data is missing or invalid.
    #[error("invalid {module} data: {reason}")]
    Parse {
        /// Module type name.
        module: &'static str,
        /// What is wrong.
        reason: String,
    },

    /// A world/team operation failed.
    #[error("world error: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: WorldError,
    },

    /// The host could not complete an operation.
    #[error("host error: {source}")]
    Host {
        /// The underlying host error.
        #[from]
        source: HostError,
    },
}

impl ModuleError {
    /// Shorthand for a [`ModuleError::Parse`].
    pub fn parse(module: &'static str, reason: impl Into<String>) -> Self {
        Self::Parse {
            module,
            reason: reason.into(),
        }
    }
}

/// Failures of blocking host operations.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The map world could not be copied or loaded.
    #[error("failed to load world for map '{map}': {reason}")]
    WorldLoad {
        /// Map directory name.
        map: String,
        /// Host-provided description.
        reason: String,
    },

    /// The world could not be unloaded or deleted.
    #[error("failed to unload world '{world}': {reason}")]
    WorldUnload {
        /// World name.
        world: String,
        /// Host-provided description.
        reason: String,
    },
}
