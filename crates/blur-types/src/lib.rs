//! Shared type definitions for the Blur session framework.
//!
//! Everything that crosses a crate boundary lives here: identifiers,
//! lifecycle and rule enums, world coordinates, tick durations and the
//! effect payloads modules hand to the host.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers plus the string-keyed [`TeamId`]
//! - [`enums`] -- Lifecycle states, capture rules, stop reasons, winners, priorities
//! - [`geometry`] -- Continuous points and block positions
//! - [`time`] -- Tick-counted durations with human-readable parsing
//! - [`effects`] -- Status effects and progress bars

pub mod effects;
pub mod enums;
pub mod geometry;
pub mod ids;
pub mod time;

// Re-export all public types at crate root for convenience.
pub use effects::{PotionEffect, ProgressBar};
pub use enums::{
    BarColor, CaptureRule, EffectKind, LifecycleState, Priority, StopReason, Winner,
};
pub use geometry::{BlockPos, Point};
pub use ids::{EntityId, PlayerId, SessionId, TeamId};
pub use time::{MILLIS_PER_TICK, TICKS_PER_SECOND, TickDuration};
