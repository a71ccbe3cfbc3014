//! Enumeration types shared across the session framework.

use serde::{Deserialize, Serialize};

use crate::ids::{PlayerId, TeamId};

/// Lifecycle state shared by sessions and modules.
///
/// The main path is `Unloaded -> Loaded -> Enabled -> Disabled -> Unloaded`.
/// Two shortcuts are also legal: a disabled unit may be re-enabled, and a
/// loaded unit that never got enabled may be unloaded directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Constructed but not yet loaded.
    #[default]
    Unloaded,
    /// Resources acquired, not yet receiving ticks or events.
    Loaded,
    /// Active: ticking and subscribed.
    Enabled,
    /// Temporarily inactive; may be re-enabled or unloaded.
    Disabled,
}

impl LifecycleState {
    /// Whether moving from `self` to `to` is a legal transition.
    pub const fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Unloaded, Self::Loaded)
                | (Self::Loaded | Self::Disabled, Self::Enabled | Self::Unloaded)
                | (Self::Enabled, Self::Disabled)
        )
    }
}

impl core::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Unloaded => write!(f, "unloaded"),
            Self::Loaded => write!(f, "loaded"),
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Policy deciding which team, if any, captures a contested control point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureRule {
    /// Only a team standing alone on the point captures.
    #[default]
    #[serde(alias = "EXCLUSIVE")]
    Exclusive,
    /// A team captures when it outnumbers all other teams combined.
    #[serde(alias = "MAJORITY")]
    Majority,
    /// The team with the strictly largest head-count captures.
    #[serde(alias = "LEAD")]
    Lead,
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The objective of the match was completed.
    ObjectiveSuccess,
    /// The objective of the match can no longer be completed.
    ObjectiveFailed,
    /// A configured time limit ran out.
    TimeLimit,
    /// A module requested the stop.
    ModuleTriggered,
    /// The server is shutting down.
    Shutdown,
    /// The map world could not be prepared.
    MapLoadFailure,
    /// No reason was given.
    Unknown,
}

impl core::fmt::Display for StopReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ObjectiveSuccess => write!(f, "objective_success"),
            Self::ObjectiveFailed => write!(f, "objective_failed"),
            Self::TimeLimit => write!(f, "time_limit"),
            Self::ModuleTriggered => write!(f, "module_triggered"),
            Self::Shutdown => write!(f, "shutdown"),
            Self::MapLoadFailure => write!(f, "map_load_failure"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Who won a session's goal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    /// A single player.
    Player(PlayerId),
    /// A whole team.
    Team(TeamId),
}

impl core::fmt::Display for Winner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Player(player) => write!(f, "player {player}"),
            Self::Team(team) => write!(f, "team {team}"),
        }
    }
}

/// Ordering of event subscribers. Lower priorities run first; `Monitor`
/// runs last and should only observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Runs first.
    Lowest,
    /// Runs before normal handlers.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Runs after normal handlers.
    High,
    /// Runs after high handlers.
    Highest,
    /// Runs last; observes the final cancellation state.
    Monitor,
}

/// Colour of a player progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarColor {
    /// Plenty of time left.
    Green,
    /// About half way.
    Yellow,
    /// Nearly done.
    Red,
}

/// Kind of status effect the host can apply to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum EffectKind {
    Speed,
    Slowness,
    Haste,
    MiningFatigue,
    Strength,
    InstantHealth,
    InstantDamage,
    JumpBoost,
    Nausea,
    Regeneration,
    Resistance,
    FireResistance,
    WaterBreathing,
    Invisibility,
    Blindness,
    NightVision,
    Hunger,
    Weakness,
    Poison,
    Wither,
    HealthBoost,
    Absorption,
    Saturation,
    Glowing,
    Levitation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_allows_main_path() {
        use LifecycleState::{Disabled, Enabled, Loaded, Unloaded};
        assert!(Unloaded.can_transition(Loaded));
        assert!(Loaded.can_transition(Enabled));
        assert!(Enabled.can_transition(Disabled));
        assert!(Disabled.can_transition(Unloaded));
    }

    #[test]
    fn lifecycle_rejects_skips() {
        use LifecycleState::{Disabled, Enabled, Loaded, Unloaded};
        assert!(!Unloaded.can_transition(Enabled));
        assert!(!Enabled.can_transition(Unloaded));
        assert!(!Unloaded.can_transition(Disabled));
        assert!(!Loaded.can_transition(Disabled));
        assert!(!Enabled.can_transition(Enabled));
    }

    #[test]
    fn lifecycle_allows_toggle_and_early_unload() {
        assert!(LifecycleState::Disabled.can_transition(LifecycleState::Enabled));
        assert!(LifecycleState::Loaded.can_transition(LifecycleState::Unloaded));
    }

    #[test]
    fn priorities_order_lowest_first() {
        assert!(Priority::Lowest < Priority::Normal);
        assert!(Priority::Highest < Priority::Monitor);
    }

    #[test]
    fn capture_rule_accepts_upper_case_alias() {
        let rule: Result<CaptureRule, _> = serde_json::from_str("\"MAJORITY\"");
        assert_eq!(rule.ok(), Some(CaptureRule::Majority));
        let rule: Result<CaptureRule, _> = serde_json::from_str("\"lead\"");
        assert_eq!(rule.ok(), Some(CaptureRule::Lead));
    }
}
