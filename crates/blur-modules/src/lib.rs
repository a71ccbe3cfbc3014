//! Gameplay modules for the Blur session framework.
//!
//! Every module here is configured from declarative data ([`ModuleData`])
//! and built through the [`factory`], which validates the data before any
//! session sees the module.
//!
//! # Modules
//!
//! - [`checkpoints`] -- Ordered checkpoints ending the stage on completion.
//! - [`controlpoints`] -- Capturable points and their capture rules.
//! - [`cooldowns`] -- Per-player cooldowns.
//! - [`data`] -- The tagged [`ModuleData`] enum.
//! - [`expiring`] -- Tick-counted entries shared by cooldowns and effects.
//! - [`factory`] -- [`build_module`] / [`build_modules`].
//! - [`goal`] -- Time limits, lives, scores and last-alive winners.
//! - [`lobby`] -- Countdown, map rotation and match orchestration.
//! - [`potions`] -- Status effects mirrored onto the host.
//! - [`respawns`] -- Staggered group respawns.
//! - [`spawns`] -- Spawn regions.
//! - [`stages`] -- Stages played in order, each with its own modules.
//! - [`teams`] -- Team registration and balancing.

pub mod checkpoints;
pub mod controlpoints;
pub mod cooldowns;
pub mod data;
pub mod expiring;
pub mod factory;
pub mod goal;
pub mod lobby;
pub mod potions;
pub mod respawns;
pub mod spawns;
pub mod stages;
pub mod teams;

pub use checkpoints::{CheckpointsData, CheckpointsModule};
pub use controlpoints::{
    ControlPoint, ControlPointEntry, ControlPointsData, ControlPointsModule, PointOverrides,
    PointStatus,
};
pub use cooldowns::{Cooldowns, CooldownsData, CooldownsModule};
pub use data::ModuleData;
pub use expiring::ExpiringEntries;
pub use factory::{build_module, build_modules};
pub use goal::{GoalData, GoalModule, LastPlayerAliveModule, LastTeamAliveModule};
pub use lobby::{LobbyData, LobbyModule, MapConfig, Rotation};
pub use potions::{PotionEffects, PotionEffectsData, PotionEffectsModule};
pub use respawns::{StaggeredRespawnsData, StaggeredRespawnsModule};
pub use spawns::{SpawnEntry, SpawnsData, SpawnsModule};
pub use stages::{StageConfig, StagesData, StagesModule, end_stage};
pub use teams::{TeamsData, TeamsModule};
