//! Stages: a session played as a sequence of phases.
//!
//! Each stage lists modules of its own. When a stage begins its modules are
//! attached to the session; when it ends they are detached and the next
//! stage's modules take their place. Any module ends the current stage with
//! [`end_stage`]. After the last stage the session stops with the reason the
//! last stage ended for.
//!
//! A session without a stages module has a single implicit stage, so
//! [`end_stage`] stops it directly.

use std::any::Any;

use blur_core::{
    EventKind, EventSubscriber, Module, ModuleContext, ModuleError, ModuleKey, SessionEvent,
    Subscription,
};
use blur_types::StopReason;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::data::ModuleData;
use crate::factory::build_modules;

const MODULE: &str = "stages";

/// One phase of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Display name.
    pub name: String,
    /// Modules active only during this stage.
    #[serde(default)]
    pub modules: Vec<ModuleData>,
}

/// Module data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagesData {
    /// Stages in play order. Empty means one stage with no modules.
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

/// Runs the session's stages in order.
#[derive(Debug)]
pub struct StagesModule {
    stages: Vec<StageConfig>,
    current: Option<usize>,
    attached: Vec<ModuleKey>,
    changed_at: Option<u64>,
    complete: bool,
}

/// End the calling module's current stage. Without a stages module in the
/// session this stops the session.
pub fn end_stage(ctx: &mut ModuleContext<'_>, reason: StopReason) {
    let session = ctx.session_id();
    if ctx.has_module::<StagesModule>() {
        ctx.emit(SessionEvent::StageEnded { session, reason });
    } else {
        ctx.stop_session(session, reason);
    }
}

impl StagesModule {
    /// Validate data and build the module.
    pub fn from_data(data: StagesData) -> Result<Self, ModuleError> {
        let stages = if data.stages.is_empty() {
            vec![StageConfig {
                name: "default".to_owned(),
                modules: Vec::new(),
            }]
        } else {
            data.stages
        };
        for (index, stage) in stages.iter().enumerate() {
            if stage.name.trim().is_empty() {
                return Err(ModuleError::parse(MODULE, format!("stage {index} needs a name")));
            }
            build_modules(&stage.modules)
                .map_err(|e| ModuleError::parse(MODULE, format!("stage '{}': {e}", stage.name)))?;
        }
        Ok(Self {
            stages,
            current: None,
            attached: Vec::new(),
            changed_at: None,
            complete: false,
        })
    }

    /// Index of the running stage.
    pub const fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Name of the running stage.
    pub fn current_stage(&self) -> Option<&str> {
        self.stages.get(self.current?).map(|s| s.name.as_str())
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether no stages are configured. Never true once built.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Whether the last stage has ended.
    pub const fn is_complete(&self) -> bool {
        self.complete
    }

    fn begin(&mut self, ctx: &mut ModuleContext<'_>, index: usize, reason: Option<StopReason>) {
        let own = ctx.session_id();
        let Some(stage) = self.stages.get(index) else {
            return;
        };
        let modules = match build_modules(&stage.modules) {
            Ok(modules) => modules,
            Err(e) => {
                error!(stage = %stage.name, error = %e, "Stage modules failed to build");
                ctx.stop_session(own, StopReason::ModuleTriggered);
                return;
            }
        };
        let name = stage.name.clone();
        for module in modules {
            if let Some(key) = ctx.attach_module(module) {
                self.attached.push(key);
            }
        }
        let previous = self.current_stage().map(str::to_owned);
        self.current = Some(index);
        info!(stage = %name, index, modules = self.attached.len(), "Stage started");
        ctx.broadcast(&format!("Stage: {name}"));
        ctx.emit(SessionEvent::StageChanged {
            session: own,
            index,
            stage: name,
            previous,
            reason,
        });
    }

    fn next_stage(&mut self, ctx: &mut ModuleContext<'_>, reason: StopReason) {
        let Some(index) = self.current else {
            return;
        };
        if self.complete {
            return;
        }
        // One advance per tick; later requests belong to the stage that just ended.
        if self.changed_at == Some(ctx.tick()) {
            debug!(index, "Stage already changed this tick");
            return;
        }
        self.changed_at = Some(ctx.tick());
        for key in self.attached.drain(..) {
            ctx.detach_module(key);
        }
        let next = index.saturating_add(1);
        if next < self.stages.len() {
            self.begin(ctx, next, Some(reason));
            return;
        }
        self.complete = true;
        let own = ctx.session_id();
        let stage = self.current_stage().unwrap_or_default().to_owned();
        info!(stage = %stage, reason = %reason, "Stages complete");
        ctx.emit(SessionEvent::StagesComplete {
            session: own,
            stage,
            reason,
        });
        ctx.stop_session(own, reason);
    }
}

impl Module for StagesModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn enable(&mut self, ctx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        if self.current.is_none() && !self.complete {
            self.begin(ctx, 0, None);
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

impl EventSubscriber for StagesModule {
    fn subscriptions(&self) -> Vec<Subscription> {
        vec![Subscription::to(EventKind::StageEnded)]
    }

    fn on_event(&mut self, ctx: &mut ModuleContext<'_>, event: &mut SessionEvent) {
        match event {
            SessionEvent::StageEnded { session, reason } if *session == ctx.session_id() => {
                let reason = *reason;
                self.next_stage(ctx, reason);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoints::CheckpointsData;

    fn stage(name: &str) -> StageConfig {
        StageConfig {
            name: name.to_owned(),
            modules: Vec::new(),
        }
    }

    #[test]
    fn missing_stages_get_a_default_one() {
        let module = StagesModule::from_data(StagesData::default()).ok();
        assert_eq!(module.as_ref().map(StagesModule::len), Some(1));
        assert!(module.is_some_and(|m| m.current_stage().is_none()));
    }

    #[test]
    fn stage_modules_are_validated_up_front() {
        let mut broken = stage("fight");
        broken.modules = vec![ModuleData::Checkpoints(CheckpointsData::default())];
        let data = StagesData {
            stages: vec![stage("warmup"), broken],
        };
        let err = StagesModule::from_data(data).err().map(|e| e.to_string());
        assert!(err.is_some_and(|e| e.contains("fight")));
    }

    #[test]
    fn blank_stage_names_are_rejected() {
        let data = StagesData {
            stages: vec![stage(" ")],
        };
        assert!(StagesModule::from_data(data).is_err());
    }

    #[test]
    fn stages_parse_from_yaml() {
        let yaml = r"
stages:
  - name: warmup
    modules:
      - type: goal
        time_limit: 30s
  - name: fight
";
        let data: Option<StagesData> = serde_yml::from_str(yaml).ok();
        let names: Vec<String> = data
            .map(|d| d.stages.into_iter().map(|s| s.name).collect())
            .unwrap_or_default();
        assert_eq!(names, vec!["warmup", "fight"]);
    }
}
