//! Control points: capturable regions with team ownership.
//!
//! Presence is tracked from player movement (and re-checked every tick so
//! teleports count); each tick every point runs its capture state machine
//! over the head counts of the teams standing on it. Transitions surface as
//! session events:
//!
//! - `ControlPointEnter` / `ControlPointExit` when a player steps on or off
//! - `ControlPointProgressReset` when an opposing team drains the progress
//! - `ControlPointLost` when the owner loses the point
//! - `ControlPointCaptured` when a team completes a capture
//!
//! # Submodules
//!
//! - [`rule`] -- Capture rules over per-team head counts.
//! - [`point`] -- A single point's settings and state machine.

pub mod point;
pub mod rule;

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};

use blur_core::{
    EventKind, EventSubscriber, Module, ModuleContext, ModuleError, SessionEvent, Subscription,
    Tickable,
};
use blur_types::{CaptureRule, PlayerId, Point, Priority, TeamId, TickDuration};
use blur_world::Extent;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

pub use point::{ControlPoint, PointChange, PointSettings, PointStatus};
pub use rule::{Captor, capturing_team};

const MODULE: &str = "control_points";

/// Settings shared by the module defaults and each entry. Unset entry
/// fields fall back to the module defaults, then to built-in values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointOverrides {
    /// Score value of holding the point.
    #[serde(default)]
    pub points: Option<f64>,
    /// Time for one player to capture from neutral.
    #[serde(default)]
    pub capture_time: Option<TickDuration>,
    /// Multiplies the capture time.
    #[serde(default)]
    pub time_multiplier: Option<f64>,
    /// Rule deciding who captures when several teams are present.
    #[serde(default)]
    pub capture_rule: Option<CaptureRule>,
    /// Keep partial progress when nobody is capturing.
    #[serde(default)]
    pub incremental: Option<bool>,
    /// Can only be captured once.
    #[serde(default)]
    pub permanent: Option<bool>,
    /// Owner at load.
    #[serde(default)]
    pub initial_owner: Option<TeamId>,
    /// Capture time factor per effective player beyond the first.
    #[serde(default)]
    pub time_modifier_per_player: Option<f64>,
    /// Lower bound on the capture time.
    #[serde(default)]
    pub min_capture_time: Option<TickDuration>,
}

/// One declared control point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPointEntry {
    /// Unique id.
    pub id: String,
    /// Display name; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
    /// Region players stand in to capture.
    #[serde(default)]
    pub capture: Option<Extent>,
    /// Per-point settings.
    #[serde(flatten)]
    pub overrides: PointOverrides,
}

/// Module data: defaults plus the list of points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlPointsData {
    /// Defaults applied to every point.
    #[serde(flatten)]
    pub defaults: PointOverrides,
    /// The points, in declaration order.
    #[serde(default)]
    pub control_points: Vec<ControlPointEntry>,
}

impl PointOverrides {
    fn resolve(&self, defaults: &Self) -> PointSettings {
        PointSettings {
            points: self.points.or(defaults.points).unwrap_or(0.0),
            capture_ticks: self
                .capture_time
                .or(defaults.capture_time)
                .map_or(0, TickDuration::ticks),
            time_multiplier: self.time_multiplier.or(defaults.time_multiplier).unwrap_or(1.0),
            capture_rule: self.capture_rule.or(defaults.capture_rule).unwrap_or_default(),
            incremental: self.incremental.or(defaults.incremental).unwrap_or(false),
            permanent: self.permanent.or(defaults.permanent).unwrap_or(false),
            initial_owner: self
                .initial_owner
                .clone()
                .or_else(|| defaults.initial_owner.clone()),
            time_modifier_per_player: self
                .time_modifier_per_player
                .or(defaults.time_modifier_per_player)
                .unwrap_or(1.0),
            min_capture_ticks: self
                .min_capture_time
                .or(defaults.min_capture_time)
                .map_or(0, TickDuration::ticks),
        }
    }
}

/// Runs every control point of a session.
#[derive(Debug)]
pub struct ControlPointsModule {
    points: Vec<ControlPoint>,
    player_points: BTreeMap<PlayerId, usize>,
}

impl ControlPointsModule {
    /// Validate data and build the points.
    pub fn from_data(data: &ControlPointsData) -> Result<Self, ModuleError> {
        if data.control_points.is_empty() {
            return Err(ModuleError::parse(MODULE, "at least one control point must be specified"));
        }
        let mut seen = BTreeSet::new();
        let mut points = Vec::with_capacity(data.control_points.len());
        for entry in &data.control_points {
            if entry.id.trim().is_empty() {
                return Err(ModuleError::parse(MODULE, "all control points need an id"));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(ModuleError::parse(
                    MODULE,
                    format!("duplicate control point id '{}'", entry.id),
                ));
            }
            let capture = entry.capture.clone().ok_or_else(|| {
                ModuleError::parse(MODULE, format!("{} must specify a capture extent", entry.id))
            })?;
            capture
                .validate()
                .map_err(|e| ModuleError::parse(MODULE, format!("{}: {e}", entry.id)))?;
            let settings = entry.overrides.resolve(&data.defaults);
            if settings.capture_ticks == 0 {
                return Err(ModuleError::parse(
                    MODULE,
                    format!("{} must have a capture time above zero", entry.id),
                ));
            }
            let name = entry
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| entry.id.clone());
            points.push(ControlPoint::new(entry.id.clone(), name, capture, settings));
        }
        Ok(Self {
            points,
            player_points: BTreeMap::new(),
        })
    }

    /// All points in declaration order.
    pub fn points(&self) -> &[ControlPoint] {
        &self.points
    }

    /// A point by id.
    pub fn point(&self, id: &str) -> Option<&ControlPoint> {
        self.points.iter().find(|p| p.id() == id)
    }

    /// The point whose capture extent contains `position`.
    pub fn point_at(&self, position: Point) -> Option<&ControlPoint> {
        self.points.iter().find(|p| p.capture().contains(position))
    }

    /// The point a player is standing on.
    pub fn point_of(&self, player: PlayerId) -> Option<&ControlPoint> {
        self.player_points
            .get(&player)
            .and_then(|i| self.points.get(*i))
    }

    /// Snapshots of every point.
    pub fn statuses(&self) -> Vec<PointStatus> {
        self.points.iter().map(ControlPoint::status).collect()
    }

    /// Make a point neutral, by id or display name. Returns whether a point
    /// matched.
    pub fn neutralise(&mut self, id_or_name: &str) -> bool {
        let Some(point) = self
            .points
            .iter_mut()
            .find(|p| p.id() == id_or_name || p.name() == id_or_name)
        else {
            return false;
        };
        point.neutralise();
        info!(point = point.id(), "Control point neutralised");
        true
    }

    /// Move a player's presence to the point containing `position`
    /// (`None` takes them off every point).
    fn relocate(&mut self, ctx: &mut ModuleContext<'_>, player: PlayerId, position: Option<Point>) {
        let current = self.player_points.get(&player).copied();
        let target = position.and_then(|at| self.points.iter().position(|p| p.capture().contains(at)));
        if current == target {
            return;
        }
        let session = ctx.session_id();
        if let Some(index) = current {
            self.player_points.remove(&player);
            if let Some(point) = self.points.get_mut(index) {
                point.remove_player(player);
                debug!(point = point.id(), player = %player, "Left control point");
                ctx.emit(SessionEvent::ControlPointExit {
                    session,
                    point: point.id().to_owned(),
                    player,
                });
            }
        }
        if let Some(index) = target {
            if let Some(point) = self.points.get_mut(index) {
                point.add_player(player);
                self.player_points.insert(player, index);
                debug!(point = point.id(), player = %player, "Entered control point");
                ctx.emit(SessionEvent::ControlPointEnter {
                    session,
                    point: point.id().to_owned(),
                    player,
                });
            }
        }
    }

    fn refresh_presence(&mut self, ctx: &mut ModuleContext<'_>) {
        let members = ctx.members();
        let gone: Vec<PlayerId> = self
            .player_points
            .keys()
            .copied()
            .filter(|p| !members.contains(p))
            .collect();
        for player in gone {
            self.relocate(ctx, player, None);
        }
        for player in members {
            let position = if ctx.is_alive(player) {
                ctx.position(player)
            } else {
                None
            };
            self.relocate(ctx, player, position);
        }
    }
}

impl Module for ControlPointsModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn disable(&mut self, _ctx: &mut ModuleContext<'_>) {
        for point in &mut self.points {
            for player in point.players().clone() {
                point.remove_player(player);
            }
        }
        self.player_points.clear();
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

impl Tickable for ControlPointsModule {
    fn tick(&mut self, ctx: &mut ModuleContext<'_>) {
        self.refresh_presence(ctx);
        let session = ctx.session_id();
        for point in &mut self.points {
            let mut counts: BTreeMap<TeamId, usize> = BTreeMap::new();
            if let Some(teams) = ctx.teams() {
                for player in point.players() {
                    if let Some(team) = teams.team_of(*player) {
                        let n = counts.entry(team.clone()).or_insert(0);
                        *n = n.saturating_add(1);
                    }
                }
            }
            for change in point.step(&counts) {
                let id = point.id().to_owned();
                let event = match change {
                    PointChange::ProgressReset { team } => {
                        debug!(point = %id, "Control point progress reset");
                        SessionEvent::ControlPointProgressReset {
                            session,
                            point: id,
                            team,
                        }
                    }
                    PointChange::Lost { team } => {
                        info!(point = %id, team = %team, "Control point lost");
                        SessionEvent::ControlPointLost {
                            session,
                            point: id,
                            team,
                        }
                    }
                    PointChange::Captured { team } => {
                        info!(point = %id, team = %team, "Control point captured");
                        SessionEvent::ControlPointCaptured {
                            session,
                            point: id,
                            team,
                        }
                    }
                };
                ctx.emit(event);
            }
            trace!(
                point = point.id(),
                progress = point.progress(),
                capturing = point.is_capturing(),
                "Control point ticked"
            );
        }
    }
}

impl EventSubscriber for ControlPointsModule {
    fn subscriptions(&self) -> Vec<Subscription> {
        vec![
            Subscription::to(EventKind::PlayerMove)
                .at(Priority::Monitor)
                .ignoring_cancelled(),
            Subscription::to(EventKind::PlayerLeaveSession),
            Subscription::to(EventKind::PlayerDeath),
        ]
    }

    fn on_event(&mut self, ctx: &mut ModuleContext<'_>, event: &mut SessionEvent) {
        match event {
            SessionEvent::PlayerMove { player, to, .. } => {
                let (player, to) = (*player, *to);
                if ctx.is_member(player) && ctx.is_alive(player) {
                    self.relocate(ctx, player, Some(to));
                }
            }
            SessionEvent::PlayerLeaveSession { session, player } if *session == ctx.session_id() => {
                let player = *player;
                self.relocate(ctx, player, None);
            }
            SessionEvent::PlayerDeath { player, .. } => {
                let player = *player;
                self.relocate(ctx, player, None);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use blur_types::BlockPos;

    use super::*;

    fn entry(id: &str) -> ControlPointEntry {
        ControlPointEntry {
            id: id.to_owned(),
            name: None,
            capture: Some(Extent::cuboid(BlockPos::new(0, 0, 0), BlockPos::new(2, 2, 2))),
            overrides: PointOverrides::default(),
        }
    }

    fn data(entries: Vec<ControlPointEntry>) -> ControlPointsData {
        ControlPointsData {
            defaults: PointOverrides {
                capture_time: Some(TickDuration::from_secs(5)),
                ..PointOverrides::default()
            },
            control_points: entries,
        }
    }

    #[test]
    fn empty_list_is_rejected() {
        let result = ControlPointsModule::from_data(&data(Vec::new()));
        assert!(matches!(result, Err(ModuleError::Parse { .. })));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let result = ControlPointsModule::from_data(&data(vec![entry("a"), entry("a")]));
        assert!(matches!(result, Err(ModuleError::Parse { .. })));
    }

    #[test]
    fn missing_extent_is_rejected() {
        let mut bad = entry("a");
        bad.capture = None;
        assert!(ControlPointsModule::from_data(&data(vec![bad])).is_err());
    }

    #[test]
    fn zero_capture_time_is_rejected() {
        let mut no_time = data(vec![entry("a")]);
        no_time.defaults.capture_time = None;
        assert!(ControlPointsModule::from_data(&no_time).is_err());
    }

    #[test]
    fn entry_overrides_win_over_defaults() {
        let mut fast = entry("fast");
        fast.overrides.capture_time = Some(TickDuration::from_ticks(20));
        fast.overrides.capture_rule = Some(CaptureRule::Lead);
        let module = ControlPointsModule::from_data(&data(vec![fast, entry("slow")]));
        let module = module.ok();
        let fast = module.as_ref().and_then(|m| m.point("fast")).map(|p| p.settings().clone());
        let slow = module.as_ref().and_then(|m| m.point("slow")).map(|p| p.settings().clone());
        assert_eq!(fast.as_ref().map(|s| s.capture_ticks), Some(20));
        assert_eq!(fast.map(|s| s.capture_rule), Some(CaptureRule::Lead));
        assert_eq!(slow.as_ref().map(|s| s.capture_ticks), Some(100));
        assert_eq!(slow.map(|s| s.capture_rule), Some(CaptureRule::Exclusive));
    }

    #[test]
    fn name_defaults_to_id_and_neutralise_matches_either() {
        let mut named = entry("b");
        named.name = Some("Bridge".to_owned());
        named.overrides.initial_owner = Some(TeamId::new("red"));
        let module = ControlPointsModule::from_data(&data(vec![entry("a"), named]));
        assert!(module.is_ok());
        let Ok(mut module) = module else { return };
        assert_eq!(module.point("a").map(ControlPoint::name), Some("a"));
        assert!(module.neutralise("Bridge"));
        assert!(module.point("b").and_then(ControlPoint::owner).is_none());
        assert!(!module.neutralise("nowhere"));
    }

    #[test]
    fn yaml_with_defaults_and_entries() {
        let yaml = r"
capture_time: 10s
capture_rule: majority
control_points:
  - id: mid
    capture:
      type: cylinder
      base: { x: 0.0, y: 64.0, z: 0.0 }
      radius: 3.0
      height: 4.0
    incremental: true
";
        let parsed: Result<ControlPointsData, _> = serde_yml::from_str(yaml);
        assert!(parsed.is_ok());
        let Ok(parsed) = parsed else { return };
        assert_eq!(parsed.defaults.capture_rule, Some(CaptureRule::Majority));
        let module = ControlPointsModule::from_data(&parsed);
        let settings = module.ok().and_then(|m| m.point("mid").map(|p| p.settings().clone()));
        assert_eq!(settings.as_ref().map(|s| s.capture_ticks), Some(200));
        assert_eq!(settings.map(|s| s.incremental), Some(true));
    }
}
