//! Team definitions and the per-session team registry.
//!
//! The registry keeps teams in declaration order (ties in balancing go to
//! the earlier team) and a player-to-team map. Counts are derived from the
//! map on demand; a player is on at most one team.

use std::collections::BTreeMap;

use blur_types::{PlayerId, TeamId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::WorldError;

/// A team as declared in map data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Key referenced by other module data.
    pub id: TeamId,

    /// Display name; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,

    /// Chat colour name, passed through to the host untouched.
    #[serde(default)]
    pub color: Option<String>,

    /// Maximum members; `None` means unlimited.
    #[serde(default)]
    pub max_players: Option<usize>,
}

impl Team {
    /// An unlimited team whose display name is its id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: TeamId::new(id),
            name: None,
            color: None,
            max_players: None,
        }
    }

    /// Name to show players.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.id.as_str())
    }

    fn has_room(&self, members: usize) -> bool {
        self.max_players.is_none_or(|max| members < max)
    }
}

/// Team membership for one session.
#[derive(Debug, Clone, Default)]
pub struct TeamRegistry {
    teams: Vec<Team>,
    members: BTreeMap<PlayerId, TeamId>,
}

impl TeamRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a team. Registering the same id twice is a programming
    /// error in the composing module and is rejected.
    pub fn register(&mut self, team: Team) -> Result<(), WorldError> {
        if self.get(&team.id).is_some() {
            return Err(WorldError::DuplicateTeam(team.id));
        }
        debug!(team = %team.id, "Team registered");
        self.teams.push(team);
        Ok(())
    }

    /// Look up a team by id.
    pub fn get(&self, id: &TeamId) -> Option<&Team> {
        self.teams.iter().find(|t| &t.id == id)
    }

    /// All teams in declaration order.
    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    /// Whether no teams are registered.
    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    /// The team a player is on.
    pub fn team_of(&self, player: PlayerId) -> Option<&TeamId> {
        self.members.get(&player)
    }

    /// Put a player on a team, leaving any previous team.
    pub fn set_team(&mut self, player: PlayerId, team: &TeamId) -> Result<(), WorldError> {
        let target = self
            .get(team)
            .ok_or_else(|| WorldError::TeamNotFound(team.clone()))?;
        let current = self.count(team);
        let already_member = self.members.get(&player) == Some(team);
        if !already_member && !target.has_room(current) {
            return Err(WorldError::TeamFull {
                team: team.clone(),
                capacity: target.max_players.unwrap_or(current),
            });
        }
        self.members.insert(player, team.clone());
        Ok(())
    }

    /// Remove a player from their team, returning it.
    pub fn remove_player(&mut self, player: PlayerId) -> Option<TeamId> {
        self.members.remove(&player)
    }

    /// Number of players on a team.
    pub fn count(&self, team: &TeamId) -> usize {
        self.members.values().filter(|t| *t == team).count()
    }

    /// Player count for every registered team, including empty ones.
    pub fn counts(&self) -> BTreeMap<TeamId, usize> {
        let mut counts: BTreeMap<TeamId, usize> =
            self.teams.iter().map(|t| (t.id.clone(), 0)).collect();
        for team in self.members.values() {
            if let Some(n) = counts.get_mut(team) {
                *n = n.saturating_add(1);
            }
        }
        counts
    }

    /// Members of a team.
    pub fn players_on(&self, team: &TeamId) -> Vec<PlayerId> {
        self.members
            .iter()
            .filter(|(_, t)| *t == team)
            .map(|(p, _)| *p)
            .collect()
    }

    /// Assign a player to the smallest team with room. Ties go to the team
    /// declared first. Returns the existing team if the player has one.
    pub fn assign_balanced(&mut self, player: PlayerId) -> Option<TeamId> {
        if let Some(team) = self.members.get(&player) {
            return Some(team.clone());
        }
        let counts = self.counts();
        let chosen = self
            .teams
            .iter()
            .filter(|t| t.has_room(counts.get(&t.id).copied().unwrap_or(0)))
            .min_by_key(|t| counts.get(&t.id).copied().unwrap_or(0))?
            .id
            .clone();
        self.members.insert(player, chosen.clone());
        Some(chosen)
    }

    /// Drop every team and membership.
    pub fn clear(&mut self) {
        self.teams.clear();
        self.members.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red_blue() -> TeamRegistry {
        let mut registry = TeamRegistry::new();
        assert!(registry.register(Team::new("red")).is_ok());
        assert!(registry.register(Team::new("blue")).is_ok());
        registry
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = red_blue();
        let result = registry.register(Team::new("red"));
        assert!(matches!(result, Err(WorldError::DuplicateTeam(_))));
    }

    #[test]
    fn balanced_assignment_alternates() {
        let mut registry = red_blue();
        let first = registry.assign_balanced(PlayerId::new());
        let second = registry.assign_balanced(PlayerId::new());
        let third = registry.assign_balanced(PlayerId::new());
        assert_eq!(first, Some(TeamId::from("red")));
        assert_eq!(second, Some(TeamId::from("blue")));
        assert_eq!(third, Some(TeamId::from("red")));
        assert_eq!(registry.count(&TeamId::from("red")), 2);
    }

    #[test]
    fn assignment_is_stable_for_existing_member() {
        let mut registry = red_blue();
        let player = PlayerId::new();
        let first = registry.assign_balanced(player);
        assert_eq!(registry.assign_balanced(player), first);
        assert_eq!(registry.counts().values().sum::<usize>(), 1);
    }

    #[test]
    fn full_teams_are_skipped() {
        let mut registry = TeamRegistry::new();
        let mut small = Team::new("small");
        small.max_players = Some(1);
        assert!(registry.register(small).is_ok());
        assert!(registry.register(Team::new("big")).is_ok());

        assert_eq!(registry.assign_balanced(PlayerId::new()), Some(TeamId::from("small")));
        assert_eq!(registry.assign_balanced(PlayerId::new()), Some(TeamId::from("big")));
        assert_eq!(registry.assign_balanced(PlayerId::new()), Some(TeamId::from("big")));

        let result = registry.set_team(PlayerId::new(), &TeamId::from("small"));
        assert!(matches!(result, Err(WorldError::TeamFull { capacity: 1, .. })));
    }

    #[test]
    fn set_team_moves_player() {
        let mut registry = red_blue();
        let player = PlayerId::new();
        assert!(registry.set_team(player, &TeamId::from("red")).is_ok());
        assert!(registry.set_team(player, &TeamId::from("blue")).is_ok());
        assert_eq!(registry.team_of(player), Some(&TeamId::from("blue")));
        assert_eq!(registry.count(&TeamId::from("red")), 0);
        assert_eq!(registry.players_on(&TeamId::from("blue")), vec![player]);
    }

    #[test]
    fn unknown_team_is_an_error() {
        let mut registry = red_blue();
        let result = registry.set_team(PlayerId::new(), &TeamId::from("green"));
        assert!(matches!(result, Err(WorldError::TeamNotFound(_))));
    }

    #[test]
    fn no_teams_means_no_assignment() {
        let mut registry = TeamRegistry::new();
        assert!(registry.assign_balanced(PlayerId::new()).is_none());
    }
}
