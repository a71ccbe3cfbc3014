//! The boundary between the framework and the game server it runs inside.
//!
//! The framework never touches the world directly. Everything it needs from
//! the host (positions, teleports, messages, effects, world directories) goes
//! through the [`Host`] trait, and everything the host reports (connections,
//! movement, deaths) comes in as a [`HostEvent`].
//!
//! [`MemoryHost`] is a complete in-memory implementation used by the headless
//! engine and by tests.

use std::collections::{BTreeMap, BTreeSet};

use blur_types::{EffectKind, EntityId, PlayerId, Point, PotionEffect, ProgressBar};
use tracing::debug;

use crate::error::HostError;

/// Operations the framework needs from the host platform.
pub trait Host {
    /// Current position of an entity, if it exists.
    fn position(&self, entity: EntityId) -> Option<Point>;

    /// Move an entity.
    fn teleport(&mut self, entity: EntityId, to: Point);

    /// Send a chat message to a player.
    fn send_message(&mut self, player: PlayerId, message: &str);

    /// Show or clear a player's progress bar.
    fn set_progress_bar(&mut self, player: PlayerId, bar: Option<ProgressBar>);

    /// Whether the entity is currently present in a loaded world.
    fn entity_exists(&self, entity: EntityId) -> bool;

    /// Whether the entity currently shows an effect of this kind.
    fn has_effect(&self, entity: EntityId, kind: EffectKind) -> bool;

    /// Apply (or overwrite) an effect on an entity.
    fn apply_effect(&mut self, entity: EntityId, effect: &PotionEffect);

    /// Remove an effect from an entity.
    fn remove_effect(&mut self, entity: EntityId, kind: EffectKind);

    /// Put a player in or out of the dead/spectating state.
    fn set_spectating(&mut self, player: PlayerId, spectating: bool);

    /// Prepare the world for a map (copy its directory and load it).
    /// Blocks until done. Returns the loaded world's name.
    fn load_world(&mut self, map: &str) -> Result<String, HostError>;

    /// Unload and delete a world created by [`Host::load_world`].
    fn unload_world(&mut self, world: &str) -> Result<(), HostError>;
}

/// Something the host reports to the session tree.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// A player connected.
    Connect {
        /// The player.
        player: PlayerId,
        /// Display name.
        name: String,
    },
    /// A player disconnected.
    Disconnect {
        /// The player.
        player: PlayerId,
    },
    /// A player is moving. The outcome says whether to undo it.
    Move {
        /// The player.
        player: PlayerId,
        /// Old position.
        from: Point,
        /// New position.
        to: Point,
    },
    /// A player died.
    Death {
        /// The player.
        player: PlayerId,
    },
    /// A non-player entity died or despawned.
    EntityDeath {
        /// The entity.
        entity: EntityId,
    },
}

/// How the host should treat the action behind a [`HostEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostOutcome {
    /// The action must be undone.
    pub cancelled: bool,
}

/// In-memory host: tracks positions, effects, messages and bars.
#[derive(Debug, Default)]
pub struct MemoryHost {
    positions: BTreeMap<EntityId, Point>,
    effects: BTreeMap<EntityId, BTreeMap<EffectKind, PotionEffect>>,
    messages: BTreeMap<PlayerId, Vec<String>>,
    bars: BTreeMap<PlayerId, ProgressBar>,
    spectating: BTreeSet<PlayerId>,
    worlds: BTreeSet<String>,
    broken_maps: BTreeSet<String>,
    teleports: u64,
    effect_applications: u64,
}

impl MemoryHost {
    /// An empty host with no entities.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place (or spawn) an entity without counting it as a teleport.
    pub fn set_position(&mut self, entity: impl Into<EntityId>, at: Point) {
        self.positions.insert(entity.into(), at);
    }

    /// Despawn an entity.
    pub fn despawn(&mut self, entity: impl Into<EntityId>) {
        let entity = entity.into();
        self.positions.remove(&entity);
        self.effects.remove(&entity);
    }

    /// Make [`Host::load_world`] fail for a map.
    pub fn break_map(&mut self, map: impl Into<String>) {
        self.broken_maps.insert(map.into());
    }

    /// Messages sent to a player, oldest first.
    pub fn messages(&self, player: PlayerId) -> &[String] {
        self.messages
            .get(&player)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// A player's current progress bar.
    pub fn progress_bar(&self, player: PlayerId) -> Option<&ProgressBar> {
        self.bars.get(&player)
    }

    /// An entity's active effect of a kind.
    pub fn effect(&self, entity: impl Into<EntityId>, kind: EffectKind) -> Option<&PotionEffect> {
        self.effects.get(&entity.into()).and_then(|e| e.get(&kind))
    }

    /// Whether a player is in the spectating state.
    pub fn is_spectating(&self, player: PlayerId) -> bool {
        self.spectating.contains(&player)
    }

    /// Worlds currently loaded.
    pub fn worlds(&self) -> &BTreeSet<String> {
        &self.worlds
    }

    /// Number of teleports performed.
    pub const fn teleports(&self) -> u64 {
        self.teleports
    }

    /// Number of effect applications sent.
    pub const fn effect_applications(&self) -> u64 {
        self.effect_applications
    }
}

impl Host for MemoryHost {
    fn position(&self, entity: EntityId) -> Option<Point> {
        self.positions.get(&entity).copied()
    }

    fn teleport(&mut self, entity: EntityId, to: Point) {
        self.positions.insert(entity, to);
        self.teleports = self.teleports.saturating_add(1);
    }

    fn send_message(&mut self, player: PlayerId, message: &str) {
        debug!(player = %player, text = message, "Message sent");
        self.messages
            .entry(player)
            .or_default()
            .push(message.to_owned());
    }

    fn set_progress_bar(&mut self, player: PlayerId, bar: Option<ProgressBar>) {
        match bar {
            Some(bar) => {
                self.bars.insert(player, bar);
            }
            None => {
                self.bars.remove(&player);
            }
        }
    }

    fn entity_exists(&self, entity: EntityId) -> bool {
        self.positions.contains_key(&entity)
    }

    fn has_effect(&self, entity: EntityId, kind: EffectKind) -> bool {
        self.effects
            .get(&entity)
            .is_some_and(|e| e.contains_key(&kind))
    }

    fn apply_effect(&mut self, entity: EntityId, effect: &PotionEffect) {
        self.effects
            .entry(entity)
            .or_default()
            .insert(effect.kind, effect.clone());
        self.effect_applications = self.effect_applications.saturating_add(1);
    }

    fn remove_effect(&mut self, entity: EntityId, kind: EffectKind) {
        if let Some(effects) = self.effects.get_mut(&entity) {
            effects.remove(&kind);
        }
    }

    fn set_spectating(&mut self, player: PlayerId, spectating: bool) {
        if spectating {
            self.spectating.insert(player);
        } else {
            self.spectating.remove(&player);
        }
    }

    fn load_world(&mut self, map: &str) -> Result<String, HostError> {
        if self.broken_maps.contains(map) {
            return Err(HostError::WorldLoad {
                map: map.to_owned(),
                reason: "map directory missing".to_owned(),
            });
        }
        let mut world = format!("{map}-{}", self.worlds.len());
        while self.worlds.contains(&world) {
            world.push('_');
        }
        self.worlds.insert(world.clone());
        Ok(world)
    }

    fn unload_world(&mut self, world: &str) -> Result<(), HostError> {
        if self.worlds.remove(world) {
            Ok(())
        } else {
            Err(HostError::WorldUnload {
                world: world.to_owned(),
                reason: "world not loaded".to_owned(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use blur_types::TickDuration;

    use super::*;

    #[test]
    fn teleport_moves_and_counts() {
        let mut host = MemoryHost::new();
        let player = PlayerId::new();
        host.set_position(player, Point::default());
        host.teleport(player.into(), Point::new(1.0, 2.0, 3.0));
        assert_eq!(host.position(player.into()), Some(Point::new(1.0, 2.0, 3.0)));
        assert_eq!(host.teleports(), 1);
    }

    #[test]
    fn effects_apply_and_remove() {
        let mut host = MemoryHost::new();
        let entity = EntityId::new();
        let effect = PotionEffect::new(EffectKind::Speed, 1, TickDuration::from_secs(5));
        host.apply_effect(entity, &effect);
        assert!(host.has_effect(entity, EffectKind::Speed));
        host.remove_effect(entity, EffectKind::Speed);
        assert!(!host.has_effect(entity, EffectKind::Speed));
    }

    #[test]
    fn broken_map_fails_to_load() {
        let mut host = MemoryHost::new();
        host.break_map("ruins");
        assert!(matches!(host.load_world("ruins"), Err(HostError::WorldLoad { .. })));
        let world = host.load_world("castle");
        assert!(world.is_ok());
        let world = world.unwrap_or_default();
        assert!(host.unload_world(&world).is_ok());
        assert!(host.unload_world(&world).is_err());
    }
}
