//! Per-player cooldowns.
//!
//! A cooldown is keyed by (player, kind). Starting a kind that is already
//! cooling replaces it. Expiry raises `CooldownExpired`; leaving the
//! session clears every cooldown the player had there.

use std::any::Any;

use blur_core::{
    EventKind, EventSubscriber, Module, ModuleContext, SessionEvent, Subscription, Tickable,
};
use blur_types::{PlayerId, TickDuration};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::expiring::ExpiringEntries;

/// Cooldown bookkeeping, independent of any session.
#[derive(Debug, Default)]
pub struct Cooldowns {
    entries: ExpiringEntries<PlayerId, String, ()>,
}

impl Cooldowns {
    /// No cooldowns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) a cooldown.
    pub fn start(&mut self, player: PlayerId, kind: impl Into<String>, duration: TickDuration) {
        self.entries
            .insert(player, kind.into(), (), Some(duration.ticks()));
    }

    /// Whether a cooldown is running.
    pub fn is_cooling(&self, player: PlayerId, kind: &str) -> bool {
        self.entries.get(player, &kind.to_owned()).is_some()
    }

    /// Time left on a cooldown.
    pub fn remaining(&self, player: PlayerId, kind: &str) -> Option<TickDuration> {
        self.entries
            .get(player, &kind.to_owned())
            .and_then(|e| e.remaining)
            .map(TickDuration::from_ticks)
    }

    /// Cancel one cooldown without firing its completion.
    pub fn cancel(&mut self, player: PlayerId, kind: &str) -> bool {
        self.entries.remove(player, &kind.to_owned()).is_some()
    }

    /// Drop all of a player's cooldowns.
    pub fn clear(&mut self, player: PlayerId) -> usize {
        self.entries.remove_subject(player).len()
    }

    /// Number of running cooldowns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cooling.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Advance one tick, reporting each expired (player, kind).
    pub fn tick(&mut self, mut on_expire: impl FnMut(PlayerId, String)) {
        self.entries.tick(|player, kind, ()| on_expire(player, kind));
    }
}

/// Module data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownsData {
    /// Tell the player when a cooldown finishes.
    #[serde(default)]
    pub notify: bool,
}

/// Owns a session's cooldowns.
#[derive(Debug, Default)]
pub struct CooldownsModule {
    data: CooldownsData,
    cooldowns: Cooldowns,
}

impl CooldownsModule {
    /// Build from data.
    pub fn new(data: CooldownsData) -> Self {
        Self {
            data,
            cooldowns: Cooldowns::new(),
        }
    }

    /// The registry.
    pub const fn cooldowns(&self) -> &Cooldowns {
        &self.cooldowns
    }

    /// The registry, mutably.
    pub const fn cooldowns_mut(&mut self) -> &mut Cooldowns {
        &mut self.cooldowns
    }
}

impl Module for CooldownsModule {
    fn name(&self) -> &'static str {
        "cooldowns"
    }

    fn disable(&mut self, _ctx: &mut ModuleContext<'_>) {
        self.cooldowns = Cooldowns::new();
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

impl Tickable for CooldownsModule {
    fn tick(&mut self, ctx: &mut ModuleContext<'_>) {
        let mut expired = Vec::new();
        self.cooldowns.tick(|player, kind| expired.push((player, kind)));
        let session = ctx.session_id();
        for (player, kind) in expired {
            debug!(player = %player, kind = %kind, "Cooldown expired");
            if self.data.notify {
                ctx.message(player, &format!("{kind} is ready"));
            }
            ctx.emit(SessionEvent::CooldownExpired {
                session,
                player,
                kind,
            });
        }
    }
}

impl EventSubscriber for CooldownsModule {
    fn subscriptions(&self) -> Vec<Subscription> {
        vec![Subscription::to(EventKind::PlayerLeaveSession)]
    }

    fn on_event(&mut self, ctx: &mut ModuleContext<'_>, event: &mut SessionEvent) {
        if let SessionEvent::PlayerLeaveSession { session, player } = event {
            if *session == ctx.session_id() {
                self.cooldowns.clear(*player);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_tick_cooldown_fires_once() {
        let mut cooldowns = Cooldowns::new();
        let player = PlayerId::new();
        cooldowns.start(player, "dash", TickDuration::from_ticks(1));
        let mut fired: u32 = 0;
        cooldowns.tick(|_, _| fired = fired.saturating_add(1));
        cooldowns.tick(|_, _| fired = fired.saturating_add(1));
        assert_eq!(fired, 1);
        assert!(!cooldowns.is_cooling(player, "dash"));
    }

    #[test]
    fn restarting_replaces() {
        let mut cooldowns = Cooldowns::new();
        let player = PlayerId::new();
        cooldowns.start(player, "dash", TickDuration::from_ticks(10));
        cooldowns.tick(|_, _| {});
        cooldowns.start(player, "dash", TickDuration::from_ticks(3));
        assert_eq!(cooldowns.remaining(player, "dash"), Some(TickDuration::from_ticks(3)));
        assert_eq!(cooldowns.len(), 1);
    }

    #[test]
    fn clear_removes_every_kind() {
        let mut cooldowns = Cooldowns::new();
        let player = PlayerId::new();
        cooldowns.start(player, "dash", TickDuration::from_secs(1));
        cooldowns.start(player, "heal", TickDuration::from_secs(1));
        cooldowns.start(PlayerId::new(), "heal", TickDuration::from_secs(1));
        assert_eq!(cooldowns.clear(player), 2);
        assert_eq!(cooldowns.len(), 1);
        assert!(!cooldowns.cancel(PlayerId::new(), "heal"));
    }
}
