//! Error types for the `blur-world` crate.
//!
//! All fallible operations in this crate return [`WorldError`] through the
//! standard [`Result`] type alias.

use blur_types::TeamId;

/// Errors that can occur during extent validation and team bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// A team with this id is already registered.
    #[error("duplicate team id: {0}")]
    DuplicateTeam(TeamId),

    /// The referenced team does not exist.
    #[error("team not found: {0}")]
    TeamNotFound(TeamId),

    /// The team has reached its configured player limit.
    #[error("team {team} is full ({capacity} players)")]
    TeamFull {
        /// The full team.
        team: TeamId,
        /// Maximum players.
        capacity: usize,
    },

    /// An extent's geometry is unusable.
    #[error("invalid extent: {reason}")]
    InvalidExtent {
        /// What is wrong with it.
        reason: String,
    },
}
