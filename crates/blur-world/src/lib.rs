//! Geometry and team bookkeeping for the Blur session framework.
//!
//! # Modules
//!
//! - [`extent`] -- [`Extent`] regions: cuboid, cylinder, block and union,
//!   with containment, random points and block iteration.
//! - [`teams`] -- [`Team`] definitions and the per-session [`TeamRegistry`]
//!   with balanced assignment.
//! - [`error`] -- Error types for extent validation and team operations.

pub mod error;
pub mod extent;
pub mod teams;

// Re-export primary types at crate root.
pub use error::WorldError;
pub use extent::Extent;
pub use teams::{Team, TeamRegistry};
