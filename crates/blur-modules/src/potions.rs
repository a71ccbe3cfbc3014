//! Status effects tracked per entity and mirrored onto the host.
//!
//! Reapplying an effect merges with the active one: the higher amplifier
//! wins regardless of duration, and at equal amplifier the longer remaining
//! time wins. The host only hears about an application when the merge
//! changed something.
//!
//! Each tick the module expires effects, drops the ones whose entity is
//! gone (unless session-persistent) and re-sends any effect the host lost.

use std::any::Any;

use blur_core::{
    EventKind, EventSubscriber, Host, Module, ModuleContext, SessionEvent, Subscription, Tickable,
};
use blur_types::{EffectKind, EntityId, PotionEffect, TickDuration};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::expiring::{Entry, ExpiringEntries};

/// The effect as the host should see it, with its remaining time.
fn current(entry: &Entry<PotionEffect>) -> PotionEffect {
    let mut effect = entry.value.clone();
    if let Some(left) = entry.remaining {
        effect.duration = TickDuration::from_ticks(left);
    }
    effect
}

/// Active effects of every entity.
#[derive(Debug, Default)]
pub struct PotionEffects {
    entries: ExpiringEntries<EntityId, EffectKind, PotionEffect>,
}

impl PotionEffects {
    /// No effects.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an effect into the entity's active set. Returns the effect to
    /// send to the host when the merge changed anything.
    pub fn apply(&mut self, entity: EntityId, effect: PotionEffect) -> Option<PotionEffect> {
        let kind = effect.kind;
        let candidate = Entry {
            remaining: (!effect.hide_duration).then(|| effect.duration.ticks()),
            value: effect,
        };
        if let Some(active) = self.entries.get(entity, &kind) {
            let stronger = candidate.value.amplifier > active.value.amplifier;
            let longer = candidate.value.amplifier == active.value.amplifier
                && candidate.outlasts(active.remaining);
            if !stronger && !longer {
                return None;
            }
        }
        let sent = current(&candidate);
        self.entries
            .insert(entity, kind, candidate.value, candidate.remaining);
        Some(sent)
    }

    /// The active effect of a kind, with its remaining time.
    pub fn get(&self, entity: EntityId, kind: EffectKind) -> Option<PotionEffect> {
        self.entries.get(entity, &kind).map(current)
    }

    /// Every active effect of an entity.
    pub fn effects_of(&self, entity: EntityId) -> Vec<PotionEffect> {
        self.entries.entries_of(entity).map(|(_, e)| current(e)).collect()
    }

    /// Remove one effect.
    pub fn remove(&mut self, entity: EntityId, kind: EffectKind) -> Option<PotionEffect> {
        self.entries.remove(entity, &kind).map(|e| e.value)
    }

    /// Remove every effect of an entity.
    pub fn clear(&mut self, entity: EntityId) -> Vec<EffectKind> {
        self.entries
            .remove_subject(entity)
            .into_iter()
            .map(|(kind, _)| kind)
            .collect()
    }

    /// Remove an entity's effects for which `keep` is false.
    pub fn retain(&mut self, entity: EntityId, keep: impl Fn(&PotionEffect) -> bool) -> Vec<EffectKind> {
        self.entries
            .retain(entity, |_, e| keep(&e.value))
            .into_iter()
            .map(|(kind, _)| kind)
            .collect()
    }

    /// Entities with at least one effect.
    pub fn entities(&self) -> Vec<EntityId> {
        self.entries.subjects()
    }

    /// Total number of active effects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no effect is active.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Advance one tick, reporting each expired effect.
    pub fn tick(&mut self, mut on_expire: impl FnMut(EntityId, EffectKind)) {
        self.entries.tick(|entity, kind, _| on_expire(entity, kind));
    }
}

/// Module data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotionEffectsData {
    /// Effects given to every player joining the session.
    #[serde(default)]
    pub effects: Vec<PotionEffect>,
}

/// Owns a session's effects and keeps the host in sync.
#[derive(Debug, Default)]
pub struct PotionEffectsModule {
    data: PotionEffectsData,
    effects: PotionEffects,
}

impl PotionEffectsModule {
    /// Build from data.
    pub fn new(data: PotionEffectsData) -> Self {
        Self {
            data,
            effects: PotionEffects::new(),
        }
    }

    /// The registry.
    pub const fn effects(&self) -> &PotionEffects {
        &self.effects
    }

    /// Apply an effect, sending it to the host if the merge changed it.
    /// Returns whether the host was updated.
    pub fn apply(&mut self, host: &mut dyn Host, entity: EntityId, effect: PotionEffect) -> bool {
        let kind = effect.kind;
        let Some(sent) = self.effects.apply(entity, effect) else {
            trace!(entity = %entity, kind = ?kind, "Weaker effect ignored");
            return false;
        };
        debug!(entity = %entity, kind = ?kind, amplifier = sent.amplifier, "Effect applied");
        host.apply_effect(entity, &sent);
        true
    }

    /// Remove an effect from the registry and the host.
    pub fn remove(&mut self, host: &mut dyn Host, entity: EntityId, kind: EffectKind) -> bool {
        let removed = self.effects.remove(entity, kind).is_some();
        if removed {
            host.remove_effect(entity, kind);
        }
        removed
    }

    fn strip(&mut self, host: &mut dyn Host, entity: EntityId, keep: impl Fn(&PotionEffect) -> bool) {
        for kind in self.effects.retain(entity, keep) {
            host.remove_effect(entity, kind);
        }
    }
}

impl Module for PotionEffectsModule {
    fn name(&self) -> &'static str {
        "potion_effects"
    }

    fn unload(&mut self, ctx: &mut ModuleContext<'_>) {
        for entity in self.effects.entities() {
            for kind in self.effects.clear(entity) {
                ctx.host().remove_effect(entity, kind);
            }
        }
    }

    fn as_tickable(&mut self) -> Option<&mut dyn Tickable> {
        Some(self)
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

impl Tickable for PotionEffectsModule {
    fn tick(&mut self, ctx: &mut ModuleContext<'_>) {
        let host = ctx.host();
        let mut expired = Vec::new();
        self.effects.tick(|entity, kind| expired.push((entity, kind)));
        for (entity, kind) in expired {
            trace!(entity = %entity, kind = ?kind, "Effect expired");
            host.remove_effect(entity, kind);
        }

        for entity in self.effects.entities() {
            if !host.entity_exists(entity) {
                self.effects.retain(entity, |e| e.session_persistent);
                continue;
            }
            for effect in self.effects.effects_of(entity) {
                if !host.has_effect(entity, effect.kind) {
                    debug!(entity = %entity, kind = ?effect.kind, "Re-sending lost effect");
                    host.apply_effect(entity, &effect);
                }
            }
        }
    }
}

impl EventSubscriber for PotionEffectsModule {
    fn subscriptions(&self) -> Vec<Subscription> {
        vec![
            Subscription::to(EventKind::PlayerJoinSession),
            Subscription::to(EventKind::PlayerLeaveSession),
            Subscription::to(EventKind::PlayerDeath),
            Subscription::to(EventKind::EntityDeath),
        ]
    }

    fn on_event(&mut self, ctx: &mut ModuleContext<'_>, event: &mut SessionEvent) {
        match event {
            SessionEvent::PlayerJoinSession {
                session,
                player,
                rejoined: false,
            } if *session == ctx.session_id() => {
                let entity = EntityId::from(*player);
                for effect in self.data.effects.clone() {
                    self.apply(ctx.host(), entity, effect);
                }
            }
            SessionEvent::PlayerLeaveSession { session, player } if *session == ctx.session_id() => {
                self.strip(ctx.host(), EntityId::from(*player), |e| e.session_persistent);
            }
            SessionEvent::PlayerDeath { player, .. } => {
                self.strip(ctx.host(), EntityId::from(*player), |e| e.death_persistent);
            }
            SessionEvent::EntityDeath { entity } => {
                self.effects.clear(*entity);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use blur_core::MemoryHost;

    use super::*;

    fn effect(amplifier: u8, secs: u64) -> PotionEffect {
        PotionEffect::new(EffectKind::Speed, amplifier, TickDuration::from_secs(secs))
    }

    #[test]
    fn higher_amplifier_wins_even_if_shorter() {
        let mut effects = PotionEffects::new();
        let entity = EntityId::new();
        assert!(effects.apply(entity, effect(1, 10)).is_some());
        assert!(effects.apply(entity, effect(2, 5)).is_some());
        let active = effects.get(entity, EffectKind::Speed);
        assert_eq!(active.map(|e| (e.amplifier, e.duration)), Some((2, TickDuration::from_secs(5))));
    }

    #[test]
    fn weaker_effect_is_ignored() {
        let mut effects = PotionEffects::new();
        let entity = EntityId::new();
        effects.apply(entity, effect(2, 5));
        assert!(effects.apply(entity, effect(1, 60)).is_none());
        assert_eq!(effects.get(entity, EffectKind::Speed).map(|e| e.amplifier), Some(2));
    }

    #[test]
    fn equal_amplifier_keeps_longer_remaining() {
        let mut effects = PotionEffects::new();
        let entity = EntityId::new();
        effects.apply(entity, effect(1, 10));
        assert!(effects.apply(entity, effect(1, 5)).is_none());
        assert!(effects.apply(entity, effect(1, 10)).is_none());
        assert!(effects.apply(entity, effect(1, 20)).is_some());
        assert_eq!(
            effects.get(entity, EffectKind::Speed).map(|e| e.duration),
            Some(TickDuration::from_secs(20))
        );
    }

    #[test]
    fn hidden_duration_never_expires() {
        let mut effects = PotionEffects::new();
        let entity = EntityId::new();
        let mut endless = effect(0, 1);
        endless.hide_duration = true;
        effects.apply(entity, endless);
        for _ in 0..100 {
            effects.tick(|_, _| {});
        }
        assert_eq!(effects.len(), 1);
        assert!(effects.apply(entity, effect(0, 3600)).is_none());
    }

    #[test]
    fn module_only_sends_changes_to_host() {
        let mut host = MemoryHost::new();
        let mut module = PotionEffectsModule::new(PotionEffectsData::default());
        let entity = EntityId::new();
        assert!(module.apply(&mut host, entity, effect(1, 10)));
        assert!(!module.apply(&mut host, entity, effect(0, 10)));
        assert!(module.apply(&mut host, entity, effect(2, 5)));
        assert_eq!(host.effect_applications(), 2);
        assert_eq!(host.effect(entity, EffectKind::Speed).map(|e| e.amplifier), Some(2));
        assert!(module.remove(&mut host, entity, EffectKind::Speed));
        assert!(host.effect(entity, EffectKind::Speed).is_none());
    }

    #[test]
    fn retain_reports_dropped_kinds() {
        let mut effects = PotionEffects::new();
        let entity = EntityId::new();
        let mut kept = PotionEffect::new(EffectKind::Glowing, 0, TickDuration::from_secs(5));
        kept.death_persistent = true;
        effects.apply(entity, kept);
        effects.apply(entity, effect(0, 5));
        assert_eq!(effects.retain(entity, |e| e.death_persistent), vec![EffectKind::Speed]);
        assert_eq!(effects.effects_of(entity).len(), 1);
    }
}
