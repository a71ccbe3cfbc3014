//! Staggered group respawns.
//!
//! Dead players wait in a holding area and come back in groups: once enough
//! teammates have waited the minimum time they respawn together, and anyone
//! left waiting for the maximum time respawns alone.

use std::any::Any;
use std::collections::BTreeMap;

use blur_core::{
    EventKind, EventSubscriber, Module, ModuleContext, ModuleError, SessionEvent, Subscription,
    Tickable,
};
use blur_types::{BarColor, PlayerId, Priority, ProgressBar, TeamId, TickDuration, TICKS_PER_SECOND};
use blur_world::Extent;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

const MODULE: &str = "staggered_respawns";

/// Module data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaggeredRespawnsData {
    /// Time every member of a group must have waited.
    pub min_timer: TickDuration,
    /// Time after which a player respawns alone.
    pub max_timer: TickDuration,
    /// Players of one team needed to form a group.
    #[serde(default = "default_min_players")]
    pub min_players: usize,
    /// Region dead players must stay in.
    #[serde(default)]
    pub deathbox: Option<Extent>,
    /// Where dead players are sent.
    #[serde(default)]
    pub teleport_to: Option<Extent>,
    /// Show each dead player a countdown bar.
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

const fn default_min_players() -> usize {
    1
}

const fn default_show_progress() -> bool {
    true
}

/// Holds dead players and respawns them in groups.
#[derive(Debug)]
pub struct StaggeredRespawnsModule {
    data: StaggeredRespawnsData,
    dead: BTreeMap<PlayerId, u64>,
}

impl StaggeredRespawnsModule {
    /// Validate data and build the module.
    pub fn from_data(data: StaggeredRespawnsData) -> Result<Self, ModuleError> {
        if data.min_timer.is_zero() {
            return Err(ModuleError::parse(MODULE, "min_timer must be positive"));
        }
        if data.max_timer.is_zero() {
            return Err(ModuleError::parse(MODULE, "max_timer must be positive"));
        }
        if data.min_players == 0 {
            return Err(ModuleError::parse(MODULE, "min_players must be greater than 0"));
        }
        for extent in [&data.deathbox, &data.teleport_to].into_iter().flatten() {
            extent
                .validate()
                .map_err(|e| ModuleError::parse(MODULE, e.to_string()))?;
        }
        Ok(Self {
            data,
            dead: BTreeMap::new(),
        })
    }

    /// Players currently waiting, with the tick they died.
    pub const fn waiting(&self) -> &BTreeMap<PlayerId, u64> {
        &self.dead
    }

    fn send_to_holding(&self, ctx: &mut ModuleContext<'_>, player: PlayerId) {
        let target = self.data.teleport_to.as_ref().or(self.data.deathbox.as_ref());
        if let Some(at) = target.and_then(|e| e.random_point(ctx.rng())) {
            ctx.host().teleport(player.into(), at);
        }
    }

    fn forget(&mut self, ctx: &mut ModuleContext<'_>, player: PlayerId) {
        if self.dead.remove(&player).is_some() && self.data.show_progress {
            ctx.host().set_progress_bar(player, None);
        }
    }

    fn outside_deathbox(&self, ctx: &ModuleContext<'_>, player: PlayerId) -> bool {
        self.data
            .deathbox
            .as_ref()
            .is_some_and(|b| ctx.position(player).is_some_and(|at| !b.contains(at)))
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn progress_bar(&self, waited: u64) -> ProgressBar {
        let max = self.data.max_timer.ticks();
        let fraction = (1.0 - waited as f64 / max as f64).clamp(0.0, 1.0);
        let (color, label) = if fraction > 2.0 / 3.0 {
            (BarColor::Green, "Respawning soon...")
        } else if fraction > 1.0 / 3.0 {
            (BarColor::Yellow, "Waiting for respawn group...")
        } else {
            (BarColor::Red, "Respawn imminent!")
        };
        let left = max.saturating_sub(waited) as f64 / TICKS_PER_SECOND as f64;
        ProgressBar {
            title: format!("{label}    {left:.1}s"),
            progress: fraction as f32,
            color,
        }
    }
}

impl Module for StaggeredRespawnsModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn disable(&mut self, ctx: &mut ModuleContext<'_>) {
        let players: Vec<PlayerId> = self.dead.keys().copied().collect();
        for player in players {
            self.forget(ctx, player);
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

impl Tickable for StaggeredRespawnsModule {
    fn tick(&mut self, ctx: &mut ModuleContext<'_>) {
        if self.dead.is_empty() {
            return;
        }
        let now = ctx.tick();

        let stale: Vec<PlayerId> = self
            .dead
            .keys()
            .copied()
            .filter(|p| !ctx.is_online(*p) || !ctx.is_member(*p) || ctx.is_alive(*p))
            .collect();
        for player in stale {
            self.forget(ctx, player);
        }

        let mut teams: BTreeMap<Option<TeamId>, Vec<(PlayerId, u64)>> = BTreeMap::new();
        for (player, died) in &self.dead {
            if self.outside_deathbox(ctx, *player) {
                self.send_to_holding(ctx, *player);
            }
            let team = ctx.teams().and_then(|t| t.team_of(*player)).cloned();
            teams
                .entry(team)
                .or_default()
                .push((*player, now.saturating_sub(*died)));
        }

        let min = self.data.min_timer.ticks();
        let max = self.data.max_timer.ticks();
        for (team, players) in teams {
            let ready: Vec<(PlayerId, u64)> = players.into_iter().filter(|(_, w)| *w >= min).collect();
            let group = if ready.len() >= self.data.min_players {
                debug!(team = ?team, players = ready.len(), "Respawning group");
                ready
            } else {
                ready.into_iter().filter(|(_, w)| *w >= max).collect()
            };
            for (player, waited) in group {
                debug!(player = %player, waited, "Respawning");
                self.forget(ctx, player);
                ctx.respawn(player);
            }
        }

        if self.data.show_progress {
            for (player, died) in &self.dead {
                let bar = self.progress_bar(now.saturating_sub(*died));
                trace!(player = %player, progress = bar.progress, "Respawn bar");
                ctx.host().set_progress_bar(*player, Some(bar));
            }
        }
    }
}

impl EventSubscriber for StaggeredRespawnsModule {
    fn subscriptions(&self) -> Vec<Subscription> {
        vec![
            Subscription::to(EventKind::PlayerDeath).at(Priority::Low),
            Subscription::to(EventKind::PlayerMove).at(Priority::Low),
            Subscription::to(EventKind::PlayerRespawn),
            Subscription::to(EventKind::PlayerLeaveSession),
        ]
    }

    fn on_event(&mut self, ctx: &mut ModuleContext<'_>, event: &mut SessionEvent) {
        let own = ctx.session_id();
        match event {
            SessionEvent::PlayerDeath { session, player, .. } if *session == own => {
                let player = *player;
                self.dead.insert(player, ctx.tick());
                self.send_to_holding(ctx, player);
                if self.data.show_progress {
                    let bar = self.progress_bar(0);
                    ctx.host().set_progress_bar(player, Some(bar));
                }
                debug!(player = %player, tick = ctx.tick(), "Player waiting to respawn");
            }
            SessionEvent::PlayerMove {
                player,
                to,
                cancelled,
                ..
            } if self.dead.contains_key(player) => {
                if self.data.deathbox.as_ref().is_some_and(|b| !b.contains(*to)) {
                    *cancelled = true;
                }
            }
            SessionEvent::PlayerRespawn { player, .. } => {
                let player = *player;
                self.forget(ctx, player);
            }
            SessionEvent::PlayerLeaveSession { session, player } if *session == own => {
                let player = *player;
                self.forget(ctx, player);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> StaggeredRespawnsData {
        StaggeredRespawnsData {
            min_timer: TickDuration::from_ticks(5),
            max_timer: TickDuration::from_ticks(20),
            min_players: 2,
            deathbox: None,
            teleport_to: None,
            show_progress: true,
        }
    }

    #[test]
    fn timers_and_group_size_must_be_positive() {
        assert!(StaggeredRespawnsModule::from_data(data()).is_ok());
        let mut bad = data();
        bad.min_timer = TickDuration::ZERO;
        assert!(StaggeredRespawnsModule::from_data(bad).is_err());
        let mut bad = data();
        bad.max_timer = TickDuration::ZERO;
        assert!(StaggeredRespawnsModule::from_data(bad).is_err());
        let mut bad = data();
        bad.min_players = 0;
        assert!(StaggeredRespawnsModule::from_data(bad).is_err());
    }

    #[test]
    fn bar_changes_colour_by_thirds() {
        let module = StaggeredRespawnsModule::from_data(data()).ok();
        let module = module.map(|m| {
            (
                m.progress_bar(0).color,
                m.progress_bar(10).color,
                m.progress_bar(18).color,
            )
        });
        assert_eq!(module, Some((BarColor::Green, BarColor::Yellow, BarColor::Red)));
    }

    #[test]
    fn bar_title_shows_seconds_left() {
        let module = StaggeredRespawnsModule::from_data(data()).ok();
        let bar = module.map(|m| m.progress_bar(10));
        assert_eq!(
            bar.map(|b| b.title),
            Some("Waiting for respawn group...    0.5s".to_owned())
        );
    }

    #[test]
    fn data_parses_human_durations() {
        let yaml = "min_timer: 5s\nmax_timer: 20s\nmin_players: 2\n";
        let parsed: Option<StaggeredRespawnsData> = serde_yml::from_str(yaml).ok();
        assert_eq!(
            parsed.map(|d| (d.min_timer.ticks(), d.max_timer.ticks(), d.show_progress)),
            Some((100, 400, true))
        );
    }
}
