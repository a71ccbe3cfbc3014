//! A single control point: resolved settings plus capture state.
//!
//! [`ControlPoint::step`] advances the capture state machine by one tick
//! given the head counts on the point and reports what changed. It has no
//! access to the session; the module turns [`PointChange`]s into events.

use std::collections::{BTreeMap, BTreeSet};

use blur_types::{CaptureRule, PlayerId, TeamId};
use blur_world::Extent;
use serde::{Deserialize, Serialize};

use super::rule::{Captor, capturing_team, effective_players};

/// Values within this distance of 0 or 1 snap to the bound.
const EPSILON: f64 = 1e-5;

/// Fully resolved settings of one point (entry overrides applied on top of
/// module defaults).
#[derive(Debug, Clone, PartialEq)]
pub struct PointSettings {
    /// Score value of holding the point.
    pub points: f64,
    /// Ticks for a single player to capture from neutral.
    pub capture_ticks: u64,
    /// Multiplies the capture time.
    pub time_multiplier: f64,
    /// Which teams may capture when several are present.
    pub capture_rule: CaptureRule,
    /// Keep partial progress when nobody is capturing.
    pub incremental: bool,
    /// Can only be captured once.
    pub permanent: bool,
    /// Owner at load.
    pub initial_owner: Option<TeamId>,
    /// Capture time factor per effective player beyond the first.
    pub time_modifier_per_player: f64,
    /// Lower bound on the capture time, in ticks.
    pub min_capture_ticks: u64,
}

/// Something that happened to a point during a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointChange {
    /// Progress drained to zero.
    ProgressReset {
        /// Team whose progress was lost.
        team: Option<TeamId>,
    },
    /// The owner lost the point.
    Lost {
        /// Previous owner.
        team: TeamId,
    },
    /// A team completed the capture.
    Captured {
        /// New owner.
        team: TeamId,
    },
}

/// Observable snapshot of a point, for logs and the engine summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointStatus {
    /// Point id.
    pub id: String,
    /// Current owner.
    pub owner: Option<TeamId>,
    /// Progress of `progress_team`.
    pub progress: f32,
    /// Team currently capturing.
    pub capturing_team: Option<TeamId>,
    /// Completed captures.
    pub times_captured: u32,
    /// Players on the point.
    pub players: usize,
}

/// A capturable region.
#[derive(Debug, Clone)]
pub struct ControlPoint {
    id: String,
    name: String,
    capture: Extent,
    settings: PointSettings,
    owner: Option<TeamId>,
    progress: f32,
    capturing_team: Option<TeamId>,
    progress_team: Option<TeamId>,
    times_captured: u32,
    players: BTreeSet<PlayerId>,
}

impl ControlPoint {
    /// A point in its initial state: owned by `initial_owner` at full
    /// progress, or neutral at zero.
    pub fn new(id: String, name: String, capture: Extent, settings: PointSettings) -> Self {
        let owner = settings.initial_owner.clone();
        let progress = if owner.is_some() { 1.0 } else { 0.0 };
        Self {
            id,
            name,
            capture,
            settings,
            owner,
            progress,
            capturing_team: None,
            progress_team: None,
            times_captured: 0,
            players: BTreeSet::new(),
        }
    }

    /// Configured id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capture region.
    pub const fn capture(&self) -> &Extent {
        &self.capture
    }

    /// Resolved settings.
    pub const fn settings(&self) -> &PointSettings {
        &self.settings
    }

    /// Current owner.
    pub const fn owner(&self) -> Option<&TeamId> {
        self.owner.as_ref()
    }

    /// Progress of the progress team, in `[0, 1]`.
    pub const fn progress(&self) -> f32 {
        self.progress
    }

    /// Team the rule currently favours.
    pub const fn capturing_team(&self) -> Option<&TeamId> {
        self.capturing_team.as_ref()
    }

    /// Whether any team is capturing.
    pub const fn is_capturing(&self) -> bool {
        self.capturing_team.is_some()
    }

    /// Team whose progress `progress` measures.
    pub const fn progress_team(&self) -> Option<&TeamId> {
        self.progress_team.as_ref()
    }

    /// Completed captures.
    pub const fn times_captured(&self) -> u32 {
        self.times_captured
    }

    /// Players standing on the point.
    pub const fn players(&self) -> &BTreeSet<PlayerId> {
        &self.players
    }

    /// Record a player entering. Returns `false` if already present.
    pub fn add_player(&mut self, player: PlayerId) -> bool {
        self.players.insert(player)
    }

    /// Record a player leaving. Returns `false` if absent.
    pub fn remove_player(&mut self, player: PlayerId) -> bool {
        self.players.remove(&player)
    }

    /// Drop ownership and progress.
    pub fn neutralise(&mut self) {
        self.owner = None;
        self.progress = 0.0;
        self.progress_team = None;
        self.capturing_team = None;
    }

    /// Snapshot for reporting.
    pub fn status(&self) -> PointStatus {
        PointStatus {
            id: self.id.clone(),
            owner: self.owner.clone(),
            progress: self.progress,
            capturing_team: self.capturing_team.clone(),
            times_captured: self.times_captured,
            players: self.players.len(),
        }
    }

    /// Advance one tick. `counts` holds team head counts on the point;
    /// players recorded with [`Self::add_player`] but missing from `counts`
    /// are teamless and slow the capture down.
    pub fn step(&mut self, counts: &BTreeMap<TeamId, usize>) -> Vec<PointChange> {
        let locked = self.settings.permanent && self.times_captured > 0;
        let captor = if locked {
            Captor::Nobody
        } else {
            capturing_team(self.settings.capture_rule, counts)
        };
        self.capturing_team = captor.team().cloned();

        let team = match captor {
            Captor::Team(team) => team,
            Captor::Halted => return Vec::new(),
            Captor::Nobody => {
                if !self.settings.incremental {
                    self.progress = if self.owner.is_some() { 1.0 } else { 0.0 };
                    self.progress_team.clone_from(&self.owner);
                }
                return Vec::new();
            }
        };

        let mut changes = Vec::new();
        let opposing_owner = self.owner.as_ref().is_some_and(|o| *o != team);
        let opposing_progress = self.progress_team.as_ref().is_some_and(|p| *p != team);

        if opposing_owner || opposing_progress {
            let rate = 1.0 / self.base_ticks();
            self.set_progress(f64::from(self.progress) - rate);
            if self.progress <= 0.0 {
                changes.push(PointChange::ProgressReset {
                    team: self.progress_team.take(),
                });
                if let Some(previous) = self.owner.take() {
                    changes.push(PointChange::Lost { team: previous });
                }
            }
            return changes;
        }

        self.progress_team = Some(team.clone());
        let effective = effective_players(&team, counts, self.players.len());
        let rate = 1.0 / self.capture_time(effective);
        self.set_progress(f64::from(self.progress) + rate);
        if self.progress >= 1.0 && self.owner.as_ref() != Some(&team) {
            self.owner = Some(team.clone());
            self.times_captured = self.times_captured.saturating_add(1);
            changes.push(PointChange::Captured { team });
        }
        changes
    }

    #[allow(clippy::cast_precision_loss)]
    fn base_ticks(&self) -> f64 {
        self.settings.capture_ticks.max(1) as f64
    }

    /// Ticks to capture from neutral with `players` effective players.
    #[allow(clippy::cast_precision_loss)]
    fn capture_time(&self, players: usize) -> f64 {
        let extra = i32::try_from(players.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled = self.base_ticks()
            * self.settings.time_multiplier
            * self.settings.time_modifier_per_player.powi(extra);
        let floor = self.settings.min_capture_ticks.max(1) as f64;
        if scaled.is_finite() { scaled.max(floor) } else { floor }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn set_progress(&mut self, value: f64) {
        let clamped = if value <= EPSILON {
            0.0
        } else if value >= 1.0 - EPSILON {
            1.0
        } else {
            value
        };
        self.progress = clamped as f32;
    }
}

#[cfg(test)]
mod tests {
    use blur_types::BlockPos;
    use proptest::prelude::*;

    use super::*;

    fn settings(capture_ticks: u64) -> PointSettings {
        PointSettings {
            points: 1.0,
            capture_ticks,
            time_multiplier: 1.0,
            capture_rule: CaptureRule::Exclusive,
            incremental: false,
            permanent: false,
            initial_owner: None,
            time_modifier_per_player: 1.0,
            min_capture_ticks: 0,
        }
    }

    fn point(settings: PointSettings) -> ControlPoint {
        let extent = Extent::cuboid(BlockPos::new(0, 0, 0), BlockPos::new(4, 2, 4));
        ControlPoint::new("mid".to_owned(), "Middle".to_owned(), extent, settings)
    }

    fn on_point(pairs: &[(&str, usize)]) -> BTreeMap<TeamId, usize> {
        pairs.iter().map(|(t, n)| (TeamId::new(*t), *n)).collect()
    }

    fn red() -> TeamId {
        TeamId::new("red")
    }

    #[test]
    fn single_player_captures_in_capture_time() {
        let mut cp = point(settings(10));
        let counts = on_point(&[("red", 1)]);
        let mut captured = Vec::new();
        for _ in 0..10 {
            captured.extend(cp.step(&counts));
        }
        assert_eq!(captured, vec![PointChange::Captured { team: red() }]);
        assert_eq!(cp.owner(), Some(&red()));
        assert!((cp.progress() - 1.0).abs() < f32::EPSILON);
        assert_eq!(cp.times_captured(), 1);
    }

    #[test]
    fn not_captured_one_tick_early() {
        let mut cp = point(settings(10));
        let counts = on_point(&[("red", 1)]);
        for _ in 0..9 {
            assert!(cp.step(&counts).is_empty());
        }
        assert!(cp.owner().is_none());
    }

    #[test]
    fn non_incremental_owner_snaps_back_to_full() {
        let mut s = settings(10);
        s.initial_owner = Some(red());
        let mut cp = point(s);
        let blue = on_point(&[("blue", 1)]);
        for _ in 0..4 {
            cp.step(&blue);
        }
        assert!(cp.progress() < 1.0);
        cp.step(&BTreeMap::new());
        assert!((cp.progress() - 1.0).abs() < f32::EPSILON);
        assert_eq!(cp.owner(), Some(&red()));
        assert!(!cp.is_capturing());
    }

    #[test]
    fn non_incremental_neutral_resets_to_zero() {
        let mut cp = point(settings(10));
        let counts = on_point(&[("red", 1)]);
        for _ in 0..5 {
            cp.step(&counts);
        }
        cp.step(&BTreeMap::new());
        assert!(cp.progress().abs() < f32::EPSILON);
    }

    #[test]
    fn incremental_holds_progress() {
        let mut s = settings(10);
        s.incremental = true;
        let mut cp = point(s);
        let counts = on_point(&[("red", 1)]);
        for _ in 0..5 {
            cp.step(&counts);
        }
        let held = cp.progress();
        cp.step(&BTreeMap::new());
        assert!((cp.progress() - held).abs() < f32::EPSILON);
        assert_eq!(cp.progress_team(), Some(&red()));
    }

    #[test]
    fn opposing_team_drains_then_loses_owner() {
        let mut s = settings(4);
        s.initial_owner = Some(red());
        let mut cp = point(s);
        let blue = on_point(&[("blue", 1)]);
        let mut changes = Vec::new();
        for _ in 0..4 {
            changes.extend(cp.step(&blue));
        }
        assert_eq!(
            changes,
            vec![
                PointChange::ProgressReset { team: None },
                PointChange::Lost { team: red() },
            ]
        );
        assert!(cp.owner().is_none());
        for _ in 0..4 {
            changes.extend(cp.step(&blue));
        }
        assert_eq!(cp.owner(), Some(&TeamId::new("blue")));
    }

    #[test]
    fn owner_defending_restores_progress_without_recapture() {
        let mut s = settings(4);
        s.initial_owner = Some(red());
        s.incremental = true;
        let mut cp = point(s);
        cp.step(&on_point(&[("blue", 1)]));
        assert!(cp.progress() < 1.0);
        let changes = cp.step(&on_point(&[("red", 1)]));
        assert!(changes.is_empty());
        assert!((cp.progress() - 1.0).abs() < f32::EPSILON);
        assert_eq!(cp.times_captured(), 0);
    }

    #[test]
    fn extra_players_speed_up_capture() {
        let mut s = settings(20);
        s.time_modifier_per_player = 0.5;
        let mut cp = point(s);
        let counts = on_point(&[("red", 2)]);
        for _ in 0..10 {
            cp.step(&counts);
        }
        assert_eq!(cp.owner(), Some(&red()));
    }

    #[test]
    fn min_capture_time_bounds_speed() {
        let mut s = settings(20);
        s.time_modifier_per_player = 0.1;
        s.min_capture_ticks = 15;
        let mut cp = point(s);
        let counts = on_point(&[("red", 5)]);
        for _ in 0..14 {
            cp.step(&counts);
        }
        assert!(cp.owner().is_none());
        cp.step(&counts);
        assert_eq!(cp.owner(), Some(&red()));
    }

    #[test]
    fn permanent_point_locks_after_first_capture() {
        let mut s = settings(2);
        s.permanent = true;
        let mut cp = point(s);
        let red_counts = on_point(&[("red", 1)]);
        cp.step(&red_counts);
        cp.step(&red_counts);
        assert_eq!(cp.owner(), Some(&red()));
        let blue = on_point(&[("blue", 3)]);
        for _ in 0..10 {
            assert!(cp.step(&blue).is_empty());
        }
        assert_eq!(cp.owner(), Some(&red()));
        assert!(!cp.is_capturing());
    }

    #[test]
    fn contested_exclusive_point_does_not_capture() {
        let mut s = settings(2);
        s.incremental = true;
        let mut cp = point(s);
        let counts = on_point(&[("red", 1), ("blue", 1)]);
        for _ in 0..5 {
            cp.step(&counts);
        }
        assert!(cp.owner().is_none());
        assert!(cp.progress().abs() < f32::EPSILON);
    }

    #[test]
    fn exclusive_contest_freezes_non_incremental_progress() {
        let mut cp = point(settings(10));
        let red_only = on_point(&[("red", 1)]);
        for _ in 0..5 {
            cp.step(&red_only);
        }
        let before = cp.progress();
        assert!((before - 0.5).abs() < 1e-4);

        let contested = on_point(&[("red", 1), ("blue", 1)]);
        for _ in 0..3 {
            assert!(cp.step(&contested).is_empty());
        }
        assert!((cp.progress() - before).abs() < f32::EPSILON);
        assert_eq!(cp.progress_team(), Some(&red()));
        assert!(!cp.is_capturing());

        let mut changes = Vec::new();
        for _ in 0..5 {
            changes.extend(cp.step(&red_only));
        }
        assert_eq!(changes, vec![PointChange::Captured { team: red() }]);
    }

    #[test]
    fn majority_captures_with_more_than_everyone_else() {
        let mut s = settings(10);
        s.capture_rule = CaptureRule::Majority;
        let mut cp = point(s);
        let counts = on_point(&[("red", 2), ("blue", 1)]);
        for _ in 0..9 {
            cp.step(&counts);
        }
        assert!(cp.owner().is_none());
        assert!(cp.is_capturing());
        cp.step(&counts);
        assert_eq!(cp.owner(), Some(&red()));
    }

    #[test]
    fn majority_tie_snaps_non_incremental_progress() {
        let mut s = settings(10);
        s.capture_rule = CaptureRule::Majority;
        let mut cp = point(s);
        for _ in 0..5 {
            cp.step(&on_point(&[("red", 1)]));
        }
        assert!(cp.progress() > 0.0);
        assert!(cp.step(&on_point(&[("red", 1), ("blue", 1)])).is_empty());
        assert!(cp.progress().abs() < f32::EPSILON);
        assert!(cp.progress_team().is_none());
        assert!(!cp.is_capturing());
    }

    #[test]
    fn lead_captures_for_strict_leader_only() {
        let mut s = settings(4);
        s.capture_rule = CaptureRule::Lead;
        s.incremental = true;
        let mut cp = point(s);
        let tied = on_point(&[("red", 2), ("blue", 2)]);
        for _ in 0..6 {
            cp.step(&tied);
        }
        assert!(cp.owner().is_none());
        assert!(!cp.is_capturing());

        let leading = on_point(&[("red", 2), ("blue", 1), ("green", 1)]);
        for _ in 0..4 {
            cp.step(&leading);
        }
        assert_eq!(cp.owner(), Some(&red()));
    }

    #[test]
    fn teamless_players_slow_the_capture() {
        let mut s = settings(20);
        s.time_modifier_per_player = 0.5;
        let mut cp = point(s);
        for _ in 0..3 {
            cp.add_player(PlayerId::new());
        }
        let counts = on_point(&[("red", 2)]);
        for _ in 0..10 {
            cp.step(&counts);
        }
        assert!(cp.owner().is_none());
        for _ in 0..10 {
            cp.step(&counts);
        }
        assert_eq!(cp.owner(), Some(&red()));
    }

    #[test]
    fn neutralise_clears_owner() {
        let mut s = settings(2);
        s.initial_owner = Some(red());
        let mut cp = point(s);
        cp.neutralise();
        assert!(cp.owner().is_none());
        assert!(cp.progress().abs() < f32::EPSILON);
    }

    proptest! {
        #[test]
        fn progress_stays_in_unit_range(
            steps in prop::collection::vec((0_usize..4, 0_usize..4), 1..80),
            capture_ticks in 1_u64..30,
            incremental in any::<bool>(),
        ) {
            let mut s = settings(capture_ticks);
            s.incremental = incremental;
            s.capture_rule = CaptureRule::Lead;
            let mut cp = point(s);
            for (r, b) in steps {
                cp.step(&on_point(&[("red", r), ("blue", b)]));
                prop_assert!((0.0..=1.0).contains(&cp.progress()));
            }
        }
    }
}
