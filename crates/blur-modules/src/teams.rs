//! Teams: registers the map's teams and balances joining players.

use std::any::Any;

use blur_core::{
    EventKind, EventSubscriber, Module, ModuleContext, ModuleError, SessionEvent, Subscription,
};
use blur_types::{PlayerId, Priority};
use blur_world::Team;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const MODULE: &str = "teams";

/// Module data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamsData {
    /// Teams in declaration order.
    #[serde(default)]
    pub teams: Vec<Team>,
}

/// Owns the session's team registry contents.
#[derive(Debug)]
pub struct TeamsModule {
    teams: Vec<Team>,
}

impl TeamsModule {
    /// Validate data and build the module.
    pub fn from_data(data: TeamsData) -> Result<Self, ModuleError> {
        if data.teams.is_empty() {
            return Err(ModuleError::parse(MODULE, "at least one team must be declared"));
        }
        if let Some(blank) = data.teams.iter().find(|t| t.id.as_str().trim().is_empty()) {
            return Err(ModuleError::parse(
                MODULE,
                format!("team '{}' needs a non-empty id", blank.display_name()),
            ));
        }
        Ok(Self { teams: data.teams })
    }

    /// Declared teams.
    pub fn teams(&self) -> &[Team] {
        &self.teams
    }
}

fn assign(ctx: &mut ModuleContext<'_>, player: PlayerId) {
    if ctx.teams().is_some_and(|t| t.team_of(player).is_some()) {
        return;
    }
    let Some(team) = ctx.teams_mut().and_then(|t| t.assign_balanced(player)) else {
        warn!(player = %player, "Every team is full");
        return;
    };
    let display = ctx
        .teams()
        .and_then(|t| t.get(&team))
        .map_or_else(|| team.to_string(), |t| t.display_name().to_owned());
    debug!(player = %player, team = %team, "Team assigned");
    ctx.message(player, &format!("You joined {display}"));
    let session = ctx.session_id();
    ctx.emit(SessionEvent::TeamAssigned {
        session,
        player,
        team,
    });
}

impl Module for TeamsModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn load(&mut self, ctx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let Some(registry) = ctx.teams_mut() else {
            return Ok(());
        };
        for team in &self.teams {
            registry.register(team.clone())?;
        }
        info!(teams = self.teams.len(), "Teams registered");
        Ok(())
    }

    fn enable(&mut self, ctx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        // Players added before the session started never saw a join.
        for player in ctx.members() {
            assign(ctx, player);
        }
        Ok(())
    }

    fn unload(&mut self, ctx: &mut ModuleContext<'_>) {
        if let Some(registry) = ctx.teams_mut() {
            registry.clear();
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

impl EventSubscriber for TeamsModule {
    fn subscriptions(&self) -> Vec<Subscription> {
        vec![
            Subscription::to(EventKind::PlayerJoinSession).at(Priority::Low),
            Subscription::to(EventKind::PlayerLeaveSession),
        ]
    }

    fn on_event(&mut self, ctx: &mut ModuleContext<'_>, event: &mut SessionEvent) {
        let own = ctx.session_id();
        match event {
            SessionEvent::PlayerJoinSession { session, player, .. } if *session == own => {
                assign(ctx, *player);
            }
            SessionEvent::PlayerLeaveSession { session, player } if *session == own => {
                let player = *player;
                if let Some(team) = ctx.teams_mut().and_then(|t| t.remove_player(player)) {
                    debug!(player = %player, team = %team, "Left team");
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_team_list_is_rejected() {
        assert!(TeamsModule::from_data(TeamsData::default()).is_err());
    }

    #[test]
    fn teams_parse_from_yaml() {
        let yaml = "teams:\n  - id: red\n    max_players: 4\n  - id: blue\n    name: Blue Team\n";
        let data: Option<TeamsData> = serde_yml::from_str(yaml).ok();
        let module = data.and_then(|d| TeamsModule::from_data(d).ok());
        let names: Vec<String> = module
            .map(|m| m.teams().iter().map(|t| t.display_name().to_owned()).collect())
            .unwrap_or_default();
        assert_eq!(names, vec!["red".to_owned(), "Blue Team".to_owned()]);
    }

    #[test]
    fn blank_team_id_is_rejected() {
        let data = TeamsData {
            teams: vec![Team::new("  ")],
        };
        assert!(TeamsModule::from_data(data).is_err());
    }
}
