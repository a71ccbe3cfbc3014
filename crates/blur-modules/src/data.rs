//! Declarative module data as written in map and server configuration.
//!
//! Each entry of a `modules:` list is tagged with its `type`:
//!
//! ```yaml
//! modules:
//!   - type: teams
//!     teams: [{ id: red }, { id: blue }]
//!   - type: staggered_respawns
//!     min_timer: 5s
//!     max_timer: 20s
//! ```

use serde::{Deserialize, Serialize};

use crate::checkpoints::CheckpointsData;
use crate::controlpoints::ControlPointsData;
use crate::cooldowns::CooldownsData;
use crate::goal::GoalData;
use crate::lobby::LobbyData;
use crate::potions::PotionEffectsData;
use crate::respawns::StaggeredRespawnsData;
use crate::spawns::SpawnsData;
use crate::stages::StagesData;
use crate::teams::TeamsData;

/// Configuration of one module, tagged by type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModuleData {
    /// Team declarations and balancing.
    Teams(TeamsData),
    /// Spawn regions.
    Spawns(SpawnsData),
    /// Capturable control points.
    ControlPoints(ControlPointsData),
    /// Grouped respawns.
    StaggeredRespawns(StaggeredRespawnsData),
    /// Ordered checkpoints.
    Checkpoints(CheckpointsData),
    /// Per-player cooldowns.
    Cooldowns(CooldownsData),
    /// Status effect tracking.
    PotionEffects(PotionEffectsData),
    /// Lobby and map rotation.
    Lobby(LobbyData),
    /// Stages played in order.
    Stages(StagesData),
    /// Time limit, lives and score.
    Goal(GoalData),
    /// The last team with living players wins.
    LastTeamAlive,
    /// The last living player wins.
    LastPlayerAlive,
}

impl ModuleData {
    /// The `type` tag of this entry.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Teams(_) => "teams",
            Self::Spawns(_) => "spawns",
            Self::ControlPoints(_) => "control_points",
            Self::StaggeredRespawns(_) => "staggered_respawns",
            Self::Checkpoints(_) => "checkpoints",
            Self::Cooldowns(_) => "cooldowns",
            Self::PotionEffects(_) => "potion_effects",
            Self::Lobby(_) => "lobby",
            Self::Stages(_) => "stages",
            Self::Goal(_) => "goal",
            Self::LastTeamAlive => "last_team_alive",
            Self::LastPlayerAlive => "last_player_alive",
        }
    }
}
