//! Connected players and where they are in the session tree.
//!
//! Each record stores the player's leaf session; membership of ancestor
//! sessions is implied by the tree. Records are removed explicitly when the
//! host reports a disconnect, so nothing outlives the connection.

use std::collections::BTreeMap;

use blur_types::{PlayerId, SessionId};

/// What the tree knows about one connected player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    /// Display name.
    pub name: String,
    /// Deepest session the player is a member of.
    pub session: Option<SessionId>,
    /// Whether the player is alive (not waiting to respawn).
    pub alive: bool,
}

/// All connected players.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: BTreeMap<PlayerId, PlayerRecord>,
}

impl PlayerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection. Returns `false` if the player was already known.
    pub fn connect(&mut self, player: PlayerId, name: impl Into<String>) -> bool {
        if self.players.contains_key(&player) {
            return false;
        }
        self.players.insert(
            player,
            PlayerRecord {
                name: name.into(),
                session: None,
                alive: true,
            },
        );
        true
    }

    /// Forget a player.
    pub fn disconnect(&mut self, player: PlayerId) -> Option<PlayerRecord> {
        self.players.remove(&player)
    }

    /// Look up a player.
    pub fn get(&self, player: PlayerId) -> Option<&PlayerRecord> {
        self.players.get(&player)
    }

    /// Whether the player is connected.
    pub fn is_online(&self, player: PlayerId) -> bool {
        self.players.contains_key(&player)
    }

    /// Whether the player is connected and alive.
    pub fn is_alive(&self, player: PlayerId) -> bool {
        self.players.get(&player).is_some_and(|p| p.alive)
    }

    /// The player's leaf session.
    pub fn leaf(&self, player: PlayerId) -> Option<SessionId> {
        self.players.get(&player).and_then(|p| p.session)
    }

    /// The player's display name.
    pub fn name(&self, player: PlayerId) -> Option<&str> {
        self.players.get(&player).map(|p| p.name.as_str())
    }

    /// Number of connected players.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Iterate over connected players.
    pub fn iter(&self) -> impl Iterator<Item = (&PlayerId, &PlayerRecord)> {
        self.players.iter()
    }

    pub(crate) fn set_leaf(&mut self, player: PlayerId, session: Option<SessionId>) {
        if let Some(record) = self.players.get_mut(&player) {
            record.session = session;
        }
    }

    /// Flip the alive flag. Returns `true` if it changed.
    pub(crate) fn set_alive(&mut self, player: PlayerId, alive: bool) -> bool {
        match self.players.get_mut(&player) {
            Some(record) if record.alive != alive => {
                record.alive = alive;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_is_idempotent() {
        let mut registry = PlayerRegistry::new();
        let player = PlayerId::new();
        assert!(registry.connect(player, "alex"));
        assert!(!registry.connect(player, "alex"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.name(player), Some("alex"));
        assert!(registry.is_alive(player));
    }

    #[test]
    fn alive_flag_reports_changes_only() {
        let mut registry = PlayerRegistry::new();
        let player = PlayerId::new();
        registry.connect(player, "sam");
        assert!(registry.set_alive(player, false));
        assert!(!registry.set_alive(player, false));
        assert!(registry.set_alive(player, true));
        assert!(!registry.set_alive(PlayerId::new(), false));
    }

    #[test]
    fn disconnect_forgets_player() {
        let mut registry = PlayerRegistry::new();
        let player = PlayerId::new();
        registry.connect(player, "kim");
        registry.set_leaf(player, Some(SessionId::new()));
        assert!(registry.disconnect(player).is_some());
        assert!(!registry.is_online(player));
        assert!(registry.leaf(player).is_none());
    }
}
