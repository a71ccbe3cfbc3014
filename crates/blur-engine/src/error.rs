//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure that can abort startup, so `main`
//! can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: blur_core::ConfigError,
    },

    /// A root module could not be built from its data.
    #[error("module error: {source}")]
    Module {
        /// The underlying module error.
        #[from]
        source: blur_core::ModuleError,
    },

    /// Registering or starting the root session failed.
    #[error("session error: {source}")]
    Session {
        /// The underlying session error.
        #[from]
        source: blur_core::SessionError,
    },

    /// The run summary could not be serialized.
    #[error("summary error: {source}")]
    Summary {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}
