//! Spawn points: where players appear on join and respawn.

use std::any::Any;

use blur_core::{
    EventKind, EventSubscriber, Module, ModuleContext, ModuleError, SessionEvent, Subscription,
};
use blur_types::{EntityId, PlayerId, PotionEffect, TeamId};
use blur_world::{Extent, WorldError};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::potions::PotionEffectsModule;

const MODULE: &str = "spawns";

/// One spawn region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnEntry {
    /// Where players appear.
    pub region: Extent,
    /// Only players of this team use it; `None` serves everyone.
    #[serde(default)]
    pub team: Option<TeamId>,
    /// Effects given on spawning here.
    #[serde(default)]
    pub effects: Vec<PotionEffect>,
}

/// Module data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpawnsData {
    /// Spawn regions.
    #[serde(default)]
    pub spawns: Vec<SpawnEntry>,
    /// Also spawn players when they join (or fall back into) the session.
    #[serde(default = "default_spawn_on_join")]
    pub spawn_on_join: bool,
}

const fn default_spawn_on_join() -> bool {
    true
}

/// Teleports players to spawns.
#[derive(Debug)]
pub struct SpawnsModule {
    data: SpawnsData,
}

impl SpawnsModule {
    /// Validate data and build the module.
    pub fn from_data(data: SpawnsData) -> Result<Self, ModuleError> {
        if data.spawns.is_empty() {
            return Err(ModuleError::parse(MODULE, "at least one spawn must be declared"));
        }
        for entry in &data.spawns {
            entry
                .region
                .validate()
                .map_err(|e| ModuleError::parse(MODULE, e.to_string()))?;
        }
        Ok(Self { data })
    }

    /// Spawns usable by a team.
    pub fn spawns_for(&self, team: Option<&TeamId>) -> Vec<&SpawnEntry> {
        self.data
            .spawns
            .iter()
            .filter(|s| s.team.is_none() || s.team.as_ref() == team)
            .collect()
    }

    fn spawn(&self, ctx: &mut ModuleContext<'_>, player: PlayerId) {
        let team = ctx.teams().and_then(|t| t.team_of(player)).cloned();
        let candidates = self.spawns_for(team.as_ref());
        let Some(entry) = candidates.choose(ctx.rng()).copied() else {
            warn!(player = %player, team = ?team, "No spawn for player");
            return;
        };
        let Some(at) = entry.region.random_point(ctx.rng()) else {
            return;
        };
        ctx.host().teleport(player.into(), at);
        debug!(player = %player, at = %at, "Player spawned");

        let entity = EntityId::from(player);
        for effect in &entry.effects {
            if let Some((potions, host)) = ctx.module_and_host::<PotionEffectsModule>() {
                potions.apply(host, entity, effect.clone());
            } else {
                ctx.host().apply_effect(entity, effect);
            }
        }
    }
}

impl Module for SpawnsModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn enable(&mut self, ctx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        if let Some(registry) = ctx.teams() {
            for team in self.data.spawns.iter().filter_map(|s| s.team.as_ref()) {
                if registry.get(team).is_none() {
                    return Err(WorldError::TeamNotFound(team.clone()).into());
                }
            }
        }
        if self.data.spawn_on_join {
            for player in ctx.leaf_members() {
                self.spawn(ctx, player);
            }
        }
        Ok(())
    }

    fn as_subscriber(&mut self) -> Option<&mut dyn EventSubscriber> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl EventSubscriber for SpawnsModule {
    fn subscriptions(&self) -> Vec<Subscription> {
        vec![
            Subscription::to(EventKind::PlayerJoinSession),
            Subscription::to(EventKind::PlayerRespawn),
        ]
    }

    fn on_event(&mut self, ctx: &mut ModuleContext<'_>, event: &mut SessionEvent) {
        let own = ctx.session_id();
        match event {
            SessionEvent::PlayerJoinSession { session, player, .. }
                if *session == own && self.data.spawn_on_join =>
            {
                let player = *player;
                self.spawn(ctx, player);
            }
            SessionEvent::PlayerRespawn { session, player } if *session == own => {
                let player = *player;
                self.spawn(ctx, player);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use blur_types::BlockPos;

    use super::*;

    fn entry(team: Option<&str>) -> SpawnEntry {
        SpawnEntry {
            region: Extent::Block {
                pos: BlockPos::new(0, 64, 0),
            },
            team: team.map(TeamId::new),
            effects: Vec::new(),
        }
    }

    #[test]
    fn empty_spawn_list_is_rejected() {
        assert!(SpawnsModule::from_data(SpawnsData::default()).is_err());
    }

    #[test]
    fn team_spawns_are_filtered() {
        let data = SpawnsData {
            spawns: vec![entry(Some("red")), entry(Some("blue")), entry(None)],
            spawn_on_join: true,
        };
        let module = SpawnsModule::from_data(data).ok();
        let red = TeamId::new("red");
        let counts = module.map(|m| (m.spawns_for(Some(&red)).len(), m.spawns_for(None).len()));
        assert_eq!(counts, Some((2, 1)));
    }
}
