//! Ordered checkpoints: the first player through all of them ends the
//! stage.

use std::any::Any;
use std::collections::BTreeMap;

use blur_core::{
    EventKind, EventSubscriber, Module, ModuleContext, ModuleError, SessionEvent, Subscription,
};
use blur_types::{PlayerId, Point, StopReason};
use blur_world::Extent;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::stages::end_stage;

const MODULE: &str = "checkpoints";

/// Module data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointsData {
    /// Checkpoints in the order they must be reached.
    #[serde(default)]
    pub points: Vec<Extent>,
}

/// Tracks every player's next checkpoint.
#[derive(Debug)]
pub struct CheckpointsModule {
    points: Vec<Extent>,
    progress: BTreeMap<PlayerId, usize>,
    completed: bool,
}

impl CheckpointsModule {
    /// Validate data and build the module.
    pub fn from_data(data: CheckpointsData) -> Result<Self, ModuleError> {
        if data.points.is_empty() {
            return Err(ModuleError::parse(MODULE, "at least one checkpoint must be defined"));
        }
        for (index, extent) in data.points.iter().enumerate() {
            extent
                .validate()
                .map_err(|e| ModuleError::parse(MODULE, format!("checkpoint {index}: {e}")))?;
        }
        Ok(Self {
            points: data.points,
            progress: BTreeMap::new(),
            completed: false,
        })
    }

    /// Checkpoints a player has reached.
    pub fn reached(&self, player: PlayerId) -> usize {
        self.progress.get(&player).copied().unwrap_or(0)
    }

    /// Number of checkpoints.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether there are no checkpoints.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Advance a player standing at `at`. Returns the index reached, if any.
    fn advance(&mut self, player: PlayerId, at: Point) -> Option<usize> {
        let index = self.reached(player);
        if !self.points.get(index)?.contains(at) {
            return None;
        }
        self.progress.insert(player, index.saturating_add(1));
        Some(index)
    }
}

impl Module for CheckpointsModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn disable(&mut self, _ctx: &mut ModuleContext<'_>) {
        self.progress.clear();
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

impl EventSubscriber for CheckpointsModule {
    fn subscriptions(&self) -> Vec<Subscription> {
        vec![
            Subscription::to(EventKind::PlayerMove).ignoring_cancelled(),
            Subscription::to(EventKind::PlayerLeaveSession),
        ]
    }

    fn on_event(&mut self, ctx: &mut ModuleContext<'_>, event: &mut SessionEvent) {
        let own = ctx.session_id();
        match event {
            SessionEvent::PlayerMove { player, to, .. } => {
                let (player, to) = (*player, *to);
                if self.completed || !ctx.is_member(player) || !ctx.is_alive(player) {
                    return;
                }
                let Some(index) = self.advance(player, to) else {
                    return;
                };
                let remaining = self.points.len().saturating_sub(index.saturating_add(1));
                debug!(player = %player, index, remaining, "Checkpoint reached");
                ctx.message(player, &format!("Checkpoint reached, {remaining} left"));
                ctx.emit(SessionEvent::CheckpointReached {
                    session: own,
                    player,
                    index,
                    remaining,
                });
                if remaining == 0 {
                    self.completed = true;
                    info!(player = %player, "Course completed");
                    ctx.emit(SessionEvent::ObjectiveCompleted {
                        session: own,
                        player: Some(player),
                    });
                    end_stage(ctx, StopReason::ObjectiveSuccess);
                }
            }
            SessionEvent::PlayerLeaveSession { session, player } if *session == own => {
                self.progress.remove(player);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use blur_types::BlockPos;

    use super::*;

    fn course() -> CheckpointsModule {
        let points = [0, 10, 20]
            .into_iter()
            .map(|x| Extent::Block {
                pos: BlockPos::new(x, 64, 0),
            })
            .collect();
        CheckpointsModule::from_data(CheckpointsData { points })
            .unwrap_or_else(|_| CheckpointsModule {
                points: Vec::new(),
                progress: BTreeMap::new(),
                completed: false,
            })
    }

    #[test]
    fn empty_course_is_rejected() {
        assert!(CheckpointsModule::from_data(CheckpointsData::default()).is_err());
    }

    #[test]
    fn checkpoints_must_be_taken_in_order() {
        let mut module = course();
        let player = PlayerId::new();
        let second = BlockPos::new(10, 64, 0).center();
        let first = BlockPos::new(0, 64, 0).center();
        assert_eq!(module.advance(player, second), None);
        assert_eq!(module.advance(player, first), Some(0));
        assert_eq!(module.advance(player, first), None);
        assert_eq!(module.advance(player, second), Some(1));
        assert_eq!(module.reached(player), 2);
    }

    #[test]
    fn finished_player_advances_no_further() {
        let mut module = course();
        let player = PlayerId::new();
        for x in [0, 10, 20] {
            assert!(module.advance(player, BlockPos::new(x, 64, 0).center()).is_some());
        }
        assert_eq!(module.advance(player, BlockPos::new(0, 64, 0).center()), None);
        assert_eq!(module.reached(player), module.len());
    }
}
