//! Goals: how a stage is won or runs out.
//!
//! - [`GoalModule`] ends the stage when its time limit expires, knocks out
//!   players who used up their lives and keeps team scores from held
//!   control points, declaring the first team to reach the score limit the
//!   winner.
//! - [`LastTeamAliveModule`] declares a team the winner once every living
//!   member belongs to it.
//! - [`LastPlayerAliveModule`] declares the last living player the winner.
//!
//! Winners are announced with [`SessionEvent::GoalWinners`] and the stage
//! ends through [`end_stage`].

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};

use blur_core::{
    EventKind, EventSubscriber, Module, ModuleContext, ModuleError, SessionEvent, Subscription,
    TaskHandle, Tickable,
};
use blur_types::{PlayerId, StopReason, TeamId, TickDuration, Winner};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::controlpoints::ControlPointsModule;
use crate::stages::end_stage;

const GOAL: &str = "goal";
const LAST_TEAM_ALIVE: &str = "last_team_alive";
const LAST_PLAYER_ALIVE: &str = "last_player_alive";

/// Module data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalData {
    /// Stage length; zero means no limit.
    #[serde(default)]
    pub time_limit: TickDuration,
    /// Deaths a player may suffer before being knocked out; zero means
    /// unlimited.
    #[serde(default)]
    pub lives: u32,
    /// Score a team must reach to win. Teams score every tick for each
    /// control point they own, by the point's value.
    #[serde(default)]
    pub score_limit: Option<f64>,
}

/// Time limit, lives and score.
#[derive(Debug)]
pub struct GoalModule {
    data: GoalData,
    timer: Option<TaskHandle>,
    deaths: BTreeMap<PlayerId, u32>,
    knocked_out: BTreeSet<PlayerId>,
    scores: BTreeMap<TeamId, f64>,
    decided: bool,
}

fn announce(ctx: &mut ModuleContext<'_>, winners: Vec<Winner>) {
    let names: Vec<String> = winners
        .iter()
        .map(|w| match w {
            Winner::Player(player) => ctx
                .player_name(*player)
                .map_or_else(|| player.to_string(), str::to_owned),
            Winner::Team(team) => ctx
                .teams()
                .and_then(|t| t.get(team))
                .map_or_else(|| team.to_string(), |t| t.display_name().to_owned()),
        })
        .collect();
    info!(winners = ?winners, "Goal decided");
    ctx.broadcast(&format!("{} won!", names.join(", ")));
    let session = ctx.session_id();
    ctx.emit(SessionEvent::GoalWinners { session, winners });
}

impl GoalModule {
    /// Validate data and build the module.
    pub fn from_data(data: GoalData) -> Result<Self, ModuleError> {
        if data
            .score_limit
            .is_some_and(|limit| !(limit.is_finite() && limit > 0.0))
        {
            return Err(ModuleError::parse(GOAL, "score_limit must be a positive number"));
        }
        Ok(Self {
            data,
            timer: None,
            deaths: BTreeMap::new(),
            knocked_out: BTreeSet::new(),
            scores: BTreeMap::new(),
            decided: false,
        })
    }

    /// A team's score.
    pub fn score(&self, team: &TeamId) -> f64 {
        self.scores.get(team).copied().unwrap_or(0.0)
    }

    /// Every team that has scored.
    pub const fn scores(&self) -> &BTreeMap<TeamId, f64> {
        &self.scores
    }

    /// Deaths a player has suffered.
    pub fn deaths(&self, player: PlayerId) -> u32 {
        self.deaths.get(&player).copied().unwrap_or(0)
    }

    /// Whether a player ran out of lives.
    pub fn is_knocked_out(&self, player: PlayerId) -> bool {
        self.knocked_out.contains(&player)
    }

    /// Whether the goal has been decided.
    pub const fn is_decided(&self) -> bool {
        self.decided
    }

    /// Add `held` to the owners' scores. Returns the teams at or above the
    /// limit, best first.
    fn add_scores(&mut self, held: &[(TeamId, f64)]) -> Vec<TeamId> {
        for (team, points) in held {
            let score = self.scores.entry(team.clone()).or_insert(0.0);
            *score += points;
        }
        let Some(limit) = self.data.score_limit else {
            return Vec::new();
        };
        let mut reached: Vec<(&TeamId, f64)> = self
            .scores
            .iter()
            .filter(|(_, score)| **score >= limit)
            .map(|(team, score)| (team, *score))
            .collect();
        reached.sort_by(|a, b| b.1.total_cmp(&a.1));
        reached.into_iter().map(|(team, _)| team.clone()).collect()
    }

    fn player_died(&mut self, ctx: &mut ModuleContext<'_>, player: PlayerId) {
        let deaths = self.deaths.entry(player).or_insert(0);
        *deaths = deaths.saturating_add(1);
        let deaths = *deaths;
        debug!(player = %player, deaths, "Death counted");
        if self.data.lives == 0 || deaths < self.data.lives {
            return;
        }
        if self.knocked_out.insert(player) {
            info!(player = %player, lives = self.data.lives, "Player out of lives");
            ctx.message(player, "You are out of lives.");
            let own = ctx.session_id();
            ctx.remove_player(own, player, false);
        }
    }
}

impl Module for GoalModule {
    fn name(&self) -> &'static str {
        GOAL
    }

    fn enable(&mut self, ctx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        if !self.data.time_limit.is_zero() && !self.decided {
            self.timer = Some(ctx.schedule(self.data.time_limit.ticks(), None));
        }
        Ok(())
    }

    fn disable(&mut self, _ctx: &mut ModuleContext<'_>) {
        self.timer = None;
    }

    fn on_task(&mut self, ctx: &mut ModuleContext<'_>, task: TaskHandle) {
        if self.timer != Some(task) {
            return;
        }
        self.timer = None;
        if self.decided {
            return;
        }
        self.decided = true;
        info!(time_limit = %self.data.time_limit, "Time limit reached");
        ctx.broadcast("Time is up!");
        end_stage(ctx, StopReason::TimeLimit);
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

impl Tickable for GoalModule {
    fn tick(&mut self, ctx: &mut ModuleContext<'_>) {
        if self.decided {
            return;
        }
        let held: Vec<(TeamId, f64)> = ctx
            .find_module_mut::<ControlPointsModule>()
            .map(|cp| {
                cp.points()
                    .iter()
                    .filter_map(|p| p.owner().map(|owner| (owner.clone(), p.settings().points)))
                    .collect()
            })
            .unwrap_or_default();
        if held.is_empty() {
            return;
        }
        let reached = self.add_scores(&held);
        if reached.is_empty() {
            return;
        }
        self.decided = true;
        announce(ctx, reached.into_iter().map(Winner::Team).collect());
        end_stage(ctx, StopReason::ObjectiveSuccess);
    }
}

impl EventSubscriber for GoalModule {
    fn subscriptions(&self) -> Vec<Subscription> {
        vec![
            Subscription::to(EventKind::PlayerDeath),
            Subscription::to(EventKind::PlayerLeaveSession),
        ]
    }

    fn on_event(&mut self, ctx: &mut ModuleContext<'_>, event: &mut SessionEvent) {
        let own = ctx.session_id();
        match event {
            SessionEvent::PlayerDeath { player, .. } if ctx.is_member(*player) => {
                let player = *player;
                self.player_died(ctx, player);
            }
            SessionEvent::PlayerLeaveSession { session, player } if *session == own => {
                self.deaths.remove(player);
            }
            _ => {}
        }
    }
}

/// Living members of the session.
fn alive_members(ctx: &ModuleContext<'_>) -> Vec<PlayerId> {
    ctx.members()
        .into_iter()
        .filter(|p| ctx.is_alive(*p))
        .collect()
}

/// Wins for the last team standing.
#[derive(Debug, Default)]
pub struct LastTeamAliveModule {
    decided: bool,
}

impl LastTeamAliveModule {
    /// A fresh module.
    pub const fn new() -> Self {
        Self { decided: false }
    }

    /// Whether a team has won.
    pub const fn is_decided(&self) -> bool {
        self.decided
    }

    fn check(&mut self, ctx: &mut ModuleContext<'_>) {
        let alive = alive_members(ctx);
        let Some(teams) = ctx.teams() else {
            return;
        };
        let mut alive_teams = alive.iter().map(|p| teams.team_of(*p));
        let Some(Some(first)) = alive_teams.next() else {
            return;
        };
        let first = first.clone();
        if !alive_teams.all(|t| t == Some(&first)) {
            return;
        }
        self.decided = true;
        announce(ctx, vec![Winner::Team(first)]);
        end_stage(ctx, StopReason::ObjectiveSuccess);
    }
}

impl Module for LastTeamAliveModule {
    fn name(&self) -> &'static str {
        LAST_TEAM_ALIVE
    }

    fn enable(&mut self, ctx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let teams = ctx.teams().map_or(0, |t| t.teams().len());
        if teams < 2 {
            return Err(ModuleError::parse(
                LAST_TEAM_ALIVE,
                format!("needs at least two teams, found {teams}"),
            ));
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

impl EventSubscriber for LastTeamAliveModule {
    fn subscriptions(&self) -> Vec<Subscription> {
        vec![
            Subscription::to(EventKind::PlayerDeath),
            Subscription::to(EventKind::PlayerLeaveSession),
        ]
    }

    fn on_event(&mut self, ctx: &mut ModuleContext<'_>, event: &mut SessionEvent) {
        if self.decided {
            return;
        }
        let own = ctx.session_id();
        match event {
            SessionEvent::PlayerDeath { player, .. } if ctx.is_member(*player) => self.check(ctx),
            SessionEvent::PlayerLeaveSession { session, .. } if *session == own => self.check(ctx),
            _ => {}
        }
    }
}

/// Wins for the last player standing.
#[derive(Debug, Default)]
pub struct LastPlayerAliveModule {
    winner: Option<PlayerId>,
}

impl LastPlayerAliveModule {
    /// A fresh module.
    pub const fn new() -> Self {
        Self { winner: None }
    }

    /// The winner, once decided.
    pub const fn winner(&self) -> Option<PlayerId> {
        self.winner
    }

    fn check(&mut self, ctx: &mut ModuleContext<'_>) {
        let alive = alive_members(ctx);
        let [last] = alive.as_slice() else {
            return;
        };
        self.winner = Some(*last);
        announce(ctx, vec![Winner::Player(*last)]);
        end_stage(ctx, StopReason::ObjectiveSuccess);
    }
}

impl Module for LastPlayerAliveModule {
    fn name(&self) -> &'static str {
        LAST_PLAYER_ALIVE
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

impl EventSubscriber for LastPlayerAliveModule {
    fn subscriptions(&self) -> Vec<Subscription> {
        vec![
            Subscription::to(EventKind::PlayerDeath),
            Subscription::to(EventKind::PlayerLeaveSession),
        ]
    }

    fn on_event(&mut self, ctx: &mut ModuleContext<'_>, event: &mut SessionEvent) {
        if self.winner.is_some() {
            return;
        }
        let own = ctx.session_id();
        match event {
            SessionEvent::PlayerDeath { player, .. } if ctx.is_member(*player) => self.check(ctx),
            SessionEvent::PlayerLeaveSession { session, .. } if *session == own => self.check(ctx),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red() -> TeamId {
        TeamId::new("red")
    }

    fn blue() -> TeamId {
        TeamId::new("blue")
    }

    fn goal(score_limit: Option<f64>) -> GoalModule {
        let data = GoalData {
            score_limit,
            ..GoalData::default()
        };
        GoalModule::from_data(data).unwrap_or_else(|_| GoalModule {
            data: GoalData::default(),
            timer: None,
            deaths: BTreeMap::new(),
            knocked_out: BTreeSet::new(),
            scores: BTreeMap::new(),
            decided: false,
        })
    }

    #[test]
    fn score_limit_must_be_positive() {
        for limit in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            let data = GoalData {
                score_limit: Some(limit),
                ..GoalData::default()
            };
            assert!(GoalModule::from_data(data).is_err());
        }
    }

    #[test]
    fn held_points_accumulate_per_team() {
        let mut module = goal(None);
        let held = [(red(), 2.0), (blue(), 1.0), (red(), 0.5)];
        assert!(module.add_scores(&held).is_empty());
        assert!(module.add_scores(&held).is_empty());
        assert!((module.score(&red()) - 5.0).abs() < f64::EPSILON);
        assert!((module.score(&blue()) - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn teams_at_the_limit_win_best_first() {
        let mut module = goal(Some(4.0));
        assert!(module.add_scores(&[(red(), 3.0), (blue(), 2.0)]).is_empty());
        let reached = module.add_scores(&[(red(), 1.0), (blue(), 3.0)]);
        assert_eq!(reached, vec![blue(), red()]);
    }

    #[test]
    fn goal_data_parses_from_yaml() {
        let data: Option<GoalData> =
            serde_yml::from_str("time_limit: 2m\nlives: 3\nscore_limit: 100\n").ok();
        let data = data.unwrap_or_default();
        assert_eq!(data.time_limit, TickDuration::from_secs(120));
        assert_eq!(data.lives, 3);
        assert!(data.score_limit.is_some_and(|l| (l - 100.0).abs() < f64::EPSILON));
    }
}
