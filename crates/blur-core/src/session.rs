//! A single node of the session tree.
//!
//! Sessions are plain data owned by the [`SessionTree`]; every mutation goes
//! through the tree so lifecycle, membership and event rules stay in one
//! place. The parent link is an id, never an owning reference.
//!
//! [`SessionTree`]: crate::tree::SessionTree

use std::collections::BTreeSet;

use blur_types::{LifecycleState, PlayerId, SessionId};
use blur_world::TeamRegistry;

use crate::module::Module;

/// One registered module and its lifecycle state.
pub(crate) struct ModuleSlot {
    pub(crate) name: &'static str,
    pub(crate) state: LifecycleState,
    /// Empty while the module is executing a callback, and for good once
    /// it has been detached.
    pub(crate) module: Option<Box<dyn Module>>,
    /// Detached slots keep their index so other keys stay valid.
    pub(crate) detached: bool,
}

impl ModuleSlot {
    pub(crate) fn new(module: Box<dyn Module>) -> Self {
        Self {
            name: module.name(),
            state: LifecycleState::Unloaded,
            module: Some(module),
            detached: false,
        }
    }
}

impl core::fmt::Debug for ModuleSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModuleSlot")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("detached", &self.detached)
            .finish_non_exhaustive()
    }
}

/// A game instance: the root, a lobby, a match.
#[derive(Debug)]
pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) name: String,
    pub(crate) parent: Option<SessionId>,
    pub(crate) children: Vec<SessionId>,
    pub(crate) players: BTreeSet<PlayerId>,
    pub(crate) modules: Vec<ModuleSlot>,
    pub(crate) teams: TeamRegistry,
    pub(crate) world: Option<String>,
    pub(crate) state: LifecycleState,
    pub(crate) started: bool,
    pub(crate) paused: bool,
    pub(crate) stopping: bool,
    pub(crate) ticks_played: u64,
}

impl Session {
    pub(crate) fn new(id: SessionId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            parent: None,
            children: Vec::new(),
            players: BTreeSet::new(),
            modules: Vec::new(),
            teams: TeamRegistry::new(),
            world: None,
            state: LifecycleState::Unloaded,
            started: false,
            paused: false,
            stopping: false,
            ticks_played: 0,
        }
    }

    /// Session id.
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent session, `None` for the root or a detached session.
    pub const fn parent(&self) -> Option<SessionId> {
        self.parent
    }

    /// Child sessions in creation order.
    pub fn children(&self) -> &[SessionId] {
        &self.children
    }

    /// Every member, including players whose leaf is a descendant.
    pub const fn players(&self) -> &BTreeSet<PlayerId> {
        &self.players
    }

    /// Whether the player is a member.
    pub fn contains(&self, player: PlayerId) -> bool {
        self.players.contains(&player)
    }

    /// Team registry.
    pub const fn teams(&self) -> &TeamRegistry {
        &self.teams
    }

    /// World this session plays in, if it has its own.
    pub fn world(&self) -> Option<&str> {
        self.world.as_deref()
    }

    /// Lifecycle state.
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Whether the session has been started.
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// Whether ticking is paused.
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether the session is being torn down. Set before its children
    /// stop, so modules hearing a child stop can tell the difference.
    pub const fn is_stopping(&self) -> bool {
        self.stopping
    }

    /// Whether modules of this session are ticked.
    pub fn is_running(&self) -> bool {
        self.state == LifecycleState::Enabled && self.started && !self.paused
    }

    /// Ticks this session has been running.
    pub const fn ticks_played(&self) -> u64 {
        self.ticks_played
    }

    /// Registered module names with their states, in registration order.
    /// Detached modules are left out.
    pub fn modules(&self) -> Vec<(&'static str, LifecycleState)> {
        self.modules
            .iter()
            .filter(|s| !s.detached)
            .map(|s| (s.name, s.state))
            .collect()
    }
}
