//! The lobby: gathers players, counts down and runs matches one at a time.
//!
//! When enough players are waiting a countdown starts. On expiry the lobby
//! picks the next map of its rotation, has the host prepare the world,
//! builds the map's modules and starts a child match session holding every
//! lobby player. When the match stops its players fall back into the lobby,
//! the world is unloaded and the countdown starts over.

use std::any::Any;

use blur_core::{
    EventKind, EventSubscriber, Module, ModuleContext, ModuleError, Session, SessionEvent,
    Subscription, TaskHandle,
};
use blur_types::{SessionId, StopReason, TICKS_PER_SECOND, TickDuration};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::data::ModuleData;
use crate::factory::build_modules;

const MODULE: &str = "lobby";

/// How the next map is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    /// In declaration order, wrapping around.
    #[default]
    Sequential,
    /// Uniformly at random.
    Random,
}

/// A playable map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    /// Name used for the match session.
    pub name: String,
    /// Map directory the host copies the world from; defaults to the name.
    #[serde(default)]
    pub world: Option<String>,
    /// Modules of the match session.
    #[serde(default)]
    pub modules: Vec<ModuleData>,
}

impl MapConfig {
    /// Directory the host loads.
    pub fn world_dir(&self) -> &str {
        self.world.as_deref().unwrap_or(&self.name)
    }
}

/// Module data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyData {
    /// Players needed before the countdown starts.
    #[serde(default = "default_required_players")]
    pub required_players: usize,
    /// Countdown length.
    #[serde(default = "default_countdown")]
    pub countdown: TickDuration,
    /// Wait between creating a match and starting it.
    #[serde(default)]
    pub delay_start: TickDuration,
    /// Map order.
    #[serde(default)]
    pub rotation: Rotation,
    /// Maps to play.
    #[serde(default)]
    pub maps: Vec<MapConfig>,
}

const fn default_required_players() -> usize {
    1
}

const fn default_countdown() -> TickDuration {
    TickDuration::from_secs(15)
}

impl Default for LobbyData {
    fn default() -> Self {
        Self {
            required_players: default_required_players(),
            countdown: default_countdown(),
            delay_start: TickDuration::ZERO,
            rotation: Rotation::default(),
            maps: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Countdown {
    task: TaskHandle,
    seconds_left: u64,
}

#[derive(Debug, Clone)]
struct Match {
    session: SessionId,
    map: String,
    world: String,
    start_task: Option<TaskHandle>,
}

/// Runs the lobby of its session.
#[derive(Debug)]
pub struct LobbyModule {
    data: LobbyData,
    countdown: Option<Countdown>,
    current: Option<Match>,
    retry: Option<TaskHandle>,
    next_map: usize,
    matches_started: u64,
}

/// Countdown announcement for `seconds` left, if one is due.
pub fn countdown_message(seconds: u64) -> Option<String> {
    let plural = |n: u64, unit: &str| {
        if n == 1 {
            format!("{n} {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };
    let minutes = seconds.checked_div(60).unwrap_or_default();
    let left = if seconds > 0 && seconds.checked_rem(60) == Some(0) {
        plural(minutes, "minute")
    } else if seconds <= 10 || (seconds <= 30 && seconds.checked_rem(10) == Some(0)) {
        plural(seconds, "second")
    } else {
        return None;
    };
    Some(format!("Next match will start in {left}."))
}

impl LobbyModule {
    /// Validate data and build the module.
    pub fn from_data(data: LobbyData) -> Result<Self, ModuleError> {
        if data.maps.is_empty() {
            return Err(ModuleError::parse(MODULE, "at least one map must be listed"));
        }
        if data.required_players == 0 {
            return Err(ModuleError::parse(MODULE, "required_players must be at least 1"));
        }
        if let Some(map) = data.maps.iter().find(|m| m.name.trim().is_empty()) {
            return Err(ModuleError::parse(
                MODULE,
                format!("map with world '{}' needs a name", map.world_dir()),
            ));
        }
        for map in &data.maps {
            build_modules(&map.modules)
                .map_err(|e| ModuleError::parse(MODULE, format!("map '{}': {e}", map.name)))?;
        }
        Ok(Self {
            data,
            countdown: None,
            current: None,
            retry: None,
            next_map: 0,
            matches_started: 0,
        })
    }

    /// The running match session, if any.
    pub fn match_session(&self) -> Option<SessionId> {
        self.current.as_ref().map(|m| m.session)
    }

    /// Name of the map being played.
    pub fn current_map(&self) -> Option<&str> {
        self.current.as_ref().map(|m| m.map.as_str())
    }

    /// Whether the countdown is running.
    pub const fn is_counting_down(&self) -> bool {
        self.countdown.is_some()
    }

    /// Seconds left on the countdown.
    pub fn seconds_left(&self) -> Option<u64> {
        self.countdown.map(|c| c.seconds_left)
    }

    /// Matches started so far.
    pub const fn matches_started(&self) -> u64 {
        self.matches_started
    }

    fn criteria_met(&self, ctx: &ModuleContext<'_>) -> bool {
        ctx.members().len() >= self.data.required_players
    }

    fn check_and_start(&mut self, ctx: &mut ModuleContext<'_>) {
        if self.current.is_some() || self.countdown.is_some() || self.retry.is_some() {
            return;
        }
        if ctx.session().is_some_and(Session::is_stopping) || !self.criteria_met(ctx) {
            return;
        }
        let seconds = self.data.countdown.secs_ceil();
        if seconds == 0 {
            self.start_next(ctx);
            return;
        }
        let task = ctx.schedule(TICKS_PER_SECOND, Some(TICKS_PER_SECOND));
        self.countdown = Some(Countdown {
            task,
            seconds_left: seconds,
        });
        info!(seconds, "Lobby countdown started");
        if let Some(text) = countdown_message(seconds) {
            ctx.broadcast(&text);
        }
    }

    fn cancel_countdown(&mut self, ctx: &mut ModuleContext<'_>) {
        if let Some(countdown) = self.countdown.take() {
            ctx.cancel_task(countdown.task);
            info!("Lobby countdown cancelled");
            ctx.broadcast("Not enough players, countdown cancelled.");
        }
    }

    fn countdown_step(&mut self, ctx: &mut ModuleContext<'_>) {
        let Some(countdown) = self.countdown.as_mut() else {
            return;
        };
        countdown.seconds_left = countdown.seconds_left.saturating_sub(1);
        let seconds = countdown.seconds_left;
        if seconds > 0 {
            if let Some(text) = countdown_message(seconds) {
                ctx.broadcast(&text);
            }
            return;
        }
        let task = countdown.task;
        self.countdown = None;
        ctx.cancel_task(task);
        self.start_next(ctx);
    }

    fn pick_map(&mut self, ctx: &mut ModuleContext<'_>) -> Option<MapConfig> {
        let count = self.data.maps.len();
        let index = match self.data.rotation {
            Rotation::Sequential => {
                let index = self.next_map.checked_rem(count)?;
                self.next_map = index.saturating_add(1);
                index
            }
            Rotation::Random => ctx.rng().random_range(0..count.max(1)),
        };
        self.data.maps.get(index).cloned()
    }

    fn start_next(&mut self, ctx: &mut ModuleContext<'_>) {
        let Some(map) = self.pick_map(ctx) else {
            return;
        };
        let own = ctx.session_id();

        let world = match ctx.host().load_world(map.world_dir()) {
            Ok(world) => world,
            Err(e) => {
                error!(map = %map.name, error = %e, "Map world failed to load");
                ctx.stop_session(own, StopReason::MapLoadFailure);
                return;
            }
        };

        let modules = match build_modules(&map.modules) {
            Ok(modules) => modules,
            Err(e) => {
                error!(map = %map.name, error = %e, "Map modules are misconfigured, skipping map");
                if let Err(e) = ctx.host().unload_world(&world) {
                    warn!(world = %world, error = %e, "Failed to unload world");
                }
                self.retry = Some(ctx.schedule(TICKS_PER_SECOND, None));
                return;
            }
        };

        let players = ctx.leaf_members();
        let session = ctx.create_child_session(map.name.clone(), Some(world.clone()), modules);
        for player in &players {
            ctx.add_player(session, *player);
        }
        let start_task = if self.data.delay_start.is_zero() {
            ctx.start_session(session);
            None
        } else {
            Some(ctx.schedule(self.data.delay_start.ticks(), None))
        };
        self.matches_started = self.matches_started.saturating_add(1);
        info!(
            map = %map.name,
            world = %world,
            session = %session,
            players = players.len(),
            "Match created"
        );
        ctx.broadcast(&format!("Now playing {}.", map.name));
        self.current = Some(Match {
            session,
            map: map.name,
            world,
            start_task,
        });
    }

    fn match_stopped(&mut self, ctx: &mut ModuleContext<'_>, reason: StopReason) {
        let Some(finished) = self.current.take() else {
            return;
        };
        if let Some(task) = finished.start_task {
            ctx.cancel_task(task);
        }
        info!(map = %finished.map, reason = %reason, "Match over");
        if let Err(e) = ctx.host().unload_world(&finished.world) {
            warn!(world = %finished.world, error = %e, "Failed to unload world");
        }
        self.check_and_start(ctx);
    }
}

impl Module for LobbyModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn enable(&mut self, ctx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        self.check_and_start(ctx);
        Ok(())
    }

    fn disable(&mut self, _ctx: &mut ModuleContext<'_>) {
        self.countdown = None;
        self.retry = None;
    }

    fn on_task(&mut self, ctx: &mut ModuleContext<'_>, task: TaskHandle) {
        if self.countdown.is_some_and(|c| c.task == task) {
            self.countdown_step(ctx);
            return;
        }
        if self.retry == Some(task) {
            self.retry = None;
            self.check_and_start(ctx);
            return;
        }
        let Some(current) = self.current.as_mut() else {
            return;
        };
        if current.start_task == Some(task) {
            current.start_task = None;
            let session = current.session;
            info!(session = %session, "Delayed match start");
            ctx.start_session(session);
        }
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

impl EventSubscriber for LobbyModule {
    fn subscriptions(&self) -> Vec<Subscription> {
        vec![
            Subscription::to(EventKind::PlayerJoinSession),
            Subscription::to(EventKind::PlayerLeaveSession),
            Subscription::to(EventKind::SessionStopped),
        ]
    }

    fn on_event(&mut self, ctx: &mut ModuleContext<'_>, event: &mut SessionEvent) {
        let own = ctx.session_id();
        match event {
            SessionEvent::PlayerJoinSession {
                session,
                player,
                rejoined,
            } if *session == own => {
                let (player, rejoined) = (*player, *rejoined);
                match self.match_session() {
                    Some(running) if !rejoined => {
                        if ctx.session_by_id(running).is_some_and(Session::is_started) {
                            ctx.add_player(running, player);
                        }
                    }
                    Some(_) => {}
                    None => self.check_and_start(ctx),
                }
            }
            SessionEvent::PlayerLeaveSession { session, .. } if *session == own => {
                if self.countdown.is_some() && !self.criteria_met(ctx) {
                    self.cancel_countdown(ctx);
                }
            }
            SessionEvent::SessionStopped {
                session,
                parent: Some(parent),
                reason,
            } if *parent == own && self.match_session() == Some(*session) => {
                let reason = *reason;
                self.match_stopped(ctx, reason);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(name: &str) -> MapConfig {
        MapConfig {
            name: name.to_owned(),
            world: None,
            modules: Vec::new(),
        }
    }

    #[test]
    fn countdown_announcements() {
        assert_eq!(countdown_message(120).as_deref(), Some("Next match will start in 2 minutes."));
        assert_eq!(countdown_message(60).as_deref(), Some("Next match will start in 1 minute."));
        assert_eq!(countdown_message(45), None);
        assert_eq!(countdown_message(30).as_deref(), Some("Next match will start in 30 seconds."));
        assert_eq!(countdown_message(15), None);
        assert_eq!(countdown_message(7).as_deref(), Some("Next match will start in 7 seconds."));
        assert_eq!(countdown_message(1).as_deref(), Some("Next match will start in 1 second."));
    }

    #[test]
    fn lobby_needs_maps() {
        assert!(LobbyModule::from_data(LobbyData::default()).is_err());
        let data = LobbyData {
            maps: vec![map("castle")],
            ..LobbyData::default()
        };
        assert!(LobbyModule::from_data(data).is_ok());
    }

    #[test]
    fn lobby_rejects_maps_with_broken_modules() {
        let mut broken = map("castle");
        broken.modules = vec![ModuleData::Checkpoints(crate::CheckpointsData::default())];
        let data = LobbyData {
            countdown: TickDuration::ZERO,
            maps: vec![map("ruins"), broken],
            ..LobbyData::default()
        };
        let err = LobbyModule::from_data(data).err().map(|e| e.to_string());
        assert!(err.is_some_and(|e| e.contains("castle")));
    }

    #[test]
    fn world_defaults_to_map_name() {
        let mut castle = map("castle");
        assert_eq!(castle.world_dir(), "castle");
        castle.world = Some("castle_v2".to_owned());
        assert_eq!(castle.world_dir(), "castle_v2");
    }

    #[test]
    fn lobby_data_defaults() {
        let data: Option<LobbyData> = serde_yml::from_str("maps:\n  - name: castle\n").ok();
        let data = data.unwrap_or_default();
        assert_eq!(data.required_players, 1);
        assert_eq!(data.countdown, TickDuration::from_secs(15));
        assert!(data.delay_start.is_zero());
        assert_eq!(data.rotation, Rotation::Sequential);
        assert_eq!(data.maps.len(), 1);
    }
}
