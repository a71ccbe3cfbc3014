//! The module framework: pluggable behaviour attached to a session.
//!
//! A [`Module`] has a lifecycle (load, enable, disable, unload) and may opt
//! into two capabilities:
//!
//! - [`Tickable`]: called once per tick while its session runs.
//! - [`EventSubscriber`]: receives [`SessionEvent`]s it subscribed to.
//!
//! Every callback gets a [`ModuleContext`]: the module's view of the tree
//! for the duration of the call. Reads happen immediately; anything that
//! changes the tree (moving players, respawning, starting or stopping
//! sessions, emitting events) is queued and applied by the tree as soon as
//! the callback returns, so no callback ever re-enters another module.

use std::any::Any;
use std::collections::{BTreeMap, VecDeque};

use blur_types::{PlayerId, Point, SessionId, StopReason};
use blur_world::TeamRegistry;
use rand::rngs::StdRng;

use crate::error::ModuleError;
use crate::events::{SessionEvent, Subscription};
use crate::host::Host;
use crate::players::PlayerRegistry;
use crate::scheduler::{Scheduler, TaskHandle};
use crate::session::{ModuleSlot, Session};

/// Address of a module: its session and registration index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleKey {
    /// Owning session.
    pub session: SessionId,
    /// Position in the session's registration order.
    pub index: usize,
}

impl core::fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}#{}", self.session, self.index)
    }
}

/// A unit of behaviour owned by one session.
///
/// All lifecycle hooks default to no-ops. `as_any`/`as_any_mut` let the
/// tree and sibling modules reach the concrete type.
pub trait Module: Any {
    /// Short type name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Acquire resources. Failing aborts the session's load.
    fn load(&mut self, _ctx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Start participating. Failing leaves only this module inactive.
    fn enable(&mut self, _ctx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Stop participating; subscriptions and tasks are already gone.
    fn disable(&mut self, _ctx: &mut ModuleContext<'_>) {}

    /// Release resources.
    fn unload(&mut self, _ctx: &mut ModuleContext<'_>) {}

    /// A task scheduled by this module came due.
    fn on_task(&mut self, _ctx: &mut ModuleContext<'_>, _task: TaskHandle) {}

    /// Tick capability.
    fn as_tickable(&mut self) -> Option<&mut dyn Tickable> {
        None
    }

    /// Event capability.
    fn as_subscriber(&mut self) -> Option<&mut dyn EventSubscriber> {
        None
    }

    /// Upcast for downcasting to the concrete module type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete module type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A module that runs every tick.
pub trait Tickable {
    /// One tick of work. Must not block.
    fn tick(&mut self, ctx: &mut ModuleContext<'_>);
}

/// A module that reacts to session events.
pub trait EventSubscriber {
    /// Registered when the module is enabled, dropped when disabled.
    fn subscriptions(&self) -> Vec<Subscription>;

    /// Handle one event. Cancellable events may be cancelled in place.
    fn on_event(&mut self, ctx: &mut ModuleContext<'_>, event: &mut SessionEvent);
}

/// Deferred tree mutation requested by a module.
pub(crate) enum Command {
    AddPlayer {
        session: SessionId,
        player: PlayerId,
    },
    RemovePlayer {
        session: SessionId,
        player: PlayerId,
        propagate: bool,
    },
    Respawn {
        player: PlayerId,
    },
    Start {
        session: SessionId,
    },
    Stop {
        session: SessionId,
        reason: StopReason,
    },
    CreateSession {
        id: SessionId,
        parent: SessionId,
        name: String,
        world: Option<String>,
        modules: Vec<Box<dyn Module>>,
    },
    ActivateModule {
        key: ModuleKey,
    },
    DetachModule {
        key: ModuleKey,
    },
}

/// A module's view of the tree during one callback.
pub struct ModuleContext<'a> {
    pub(crate) key: ModuleKey,
    pub(crate) tick: u64,
    pub(crate) sessions: &'a mut BTreeMap<SessionId, Session>,
    pub(crate) players: &'a PlayerRegistry,
    pub(crate) scheduler: &'a mut Scheduler,
    pub(crate) host: &'a mut dyn Host,
    pub(crate) rng: &'a mut StdRng,
    pub(crate) outbox: &'a mut VecDeque<SessionEvent>,
    pub(crate) commands: &'a mut VecDeque<Command>,
}

impl ModuleContext<'_> {
    /// The calling module's session.
    pub const fn session_id(&self) -> SessionId {
        self.key.session
    }

    /// The calling module's key.
    pub const fn module_key(&self) -> ModuleKey {
        self.key
    }

    /// Current tree tick.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// The calling module's session.
    pub fn session(&self) -> Option<&Session> {
        self.sessions.get(&self.key.session)
    }

    /// Any session by id.
    pub fn session_by_id(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// World of the calling module's session.
    pub fn world(&self) -> Option<&str> {
        self.session().and_then(Session::world)
    }

    /// Team registry of the calling module's session.
    pub fn teams(&self) -> Option<&TeamRegistry> {
        self.session().map(Session::teams)
    }

    /// Mutable team registry of the calling module's session.
    pub fn teams_mut(&mut self) -> Option<&mut TeamRegistry> {
        self.sessions.get_mut(&self.key.session).map(|s| &mut s.teams)
    }

    /// Every member of the session, including players in child sessions.
    pub fn members(&self) -> Vec<PlayerId> {
        self.session()
            .map(|s| s.players.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Members whose deepest session is this one.
    pub fn leaf_members(&self) -> Vec<PlayerId> {
        let session = self.key.session;
        self.members()
            .into_iter()
            .filter(|p| self.players.leaf(*p) == Some(session))
            .collect()
    }

    /// Whether the player is a member of the session.
    pub fn is_member(&self, player: PlayerId) -> bool {
        self.session().is_some_and(|s| s.contains(player))
    }

    /// Whether the player is connected.
    pub fn is_online(&self, player: PlayerId) -> bool {
        self.players.is_online(player)
    }

    /// Whether the player is connected and alive.
    pub fn is_alive(&self, player: PlayerId) -> bool {
        self.players.is_alive(player)
    }

    /// The player's deepest session.
    pub fn leaf_of(&self, player: PlayerId) -> Option<SessionId> {
        self.players.leaf(player)
    }

    /// The player's display name.
    pub fn player_name(&self, player: PlayerId) -> Option<&str> {
        self.players.name(player)
    }

    /// Where the host says the player is.
    pub fn position(&self, player: PlayerId) -> Option<Point> {
        self.host.position(player.into())
    }

    /// Direct access to the host.
    pub fn host(&mut self) -> &mut dyn Host {
        &mut *self.host
    }

    /// The tree's seeded random generator.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut *self.rng
    }

    /// Send a message to one player.
    pub fn message(&mut self, player: PlayerId, text: &str) {
        self.host.send_message(player, text);
    }

    /// Send a message to every member of the session.
    pub fn broadcast(&mut self, text: &str) {
        for player in self.members() {
            self.host.send_message(player, text);
        }
    }

    /// Queue an event; it is dispatched after the current callback returns.
    pub fn emit(&mut self, event: SessionEvent) {
        self.outbox.push_back(event);
    }

    /// Schedule a task owned by the calling module.
    pub fn schedule(&mut self, delay: u64, interval: Option<u64>) -> TaskHandle {
        self.scheduler.schedule(self.key, self.tick, delay, interval)
    }

    /// Cancel a task. Returns whether it was pending.
    pub fn cancel_task(&mut self, task: TaskHandle) -> bool {
        self.scheduler.cancel(task)
    }

    /// Queue adding a player to a session.
    pub fn add_player(&mut self, session: SessionId, player: PlayerId) {
        self.commands.push_back(Command::AddPlayer { session, player });
    }

    /// Queue removing a player from a session.
    pub fn remove_player(&mut self, session: SessionId, player: PlayerId, propagate: bool) {
        self.commands.push_back(Command::RemovePlayer {
            session,
            player,
            propagate,
        });
    }

    /// Queue a respawn. Respawning a living player does nothing.
    pub fn respawn(&mut self, player: PlayerId) {
        self.commands.push_back(Command::Respawn { player });
    }

    /// Queue starting a session.
    pub fn start_session(&mut self, session: SessionId) {
        self.commands.push_back(Command::Start { session });
    }

    /// Queue stopping a session.
    pub fn stop_session(&mut self, session: SessionId, reason: StopReason) {
        self.commands.push_back(Command::Stop { session, reason });
    }

    /// Queue creating a child of the calling module's session. The child is
    /// loaded and enabled when the command runs; it is started separately.
    pub fn create_child_session(
        &mut self,
        name: impl Into<String>,
        world: Option<String>,
        modules: Vec<Box<dyn Module>>,
    ) -> SessionId {
        let id = SessionId::new();
        self.commands.push_back(Command::CreateSession {
            id,
            parent: self.key.session,
            name: name.into(),
            world,
            modules,
        });
        id
    }

    /// Add a module to the calling module's session while it runs. The
    /// module is loaded (and enabled, if the session is) when the queued
    /// activation runs.
    pub fn attach_module(&mut self, module: Box<dyn Module>) -> Option<ModuleKey> {
        let session = self.key.session;
        let node = self.sessions.get_mut(&session)?;
        let key = ModuleKey {
            session,
            index: node.modules.len(),
        };
        node.modules.push(ModuleSlot::new(module));
        self.commands.push_back(Command::ActivateModule { key });
        Some(key)
    }

    /// Queue disabling, unloading and dropping a module.
    pub fn detach_module(&mut self, key: ModuleKey) {
        self.commands.push_back(Command::DetachModule { key });
    }

    /// Whether the calling module's session holds a module of type `T`.
    pub fn has_module<T: Module>(&self) -> bool {
        self.sessions.get(&self.key.session).is_some_and(|node| {
            node.modules
                .iter()
                .filter_map(|slot| slot.module.as_ref())
                .any(|m| m.as_any().is::<T>())
        })
    }

    /// A sibling module of the given type in the same session.
    pub fn find_module_mut<T: Module>(&mut self) -> Option<&mut T> {
        self.sessions
            .get_mut(&self.key.session)?
            .modules
            .iter_mut()
            .filter_map(|slot| slot.module.as_mut())
            .find_map(|m| m.as_any_mut().downcast_mut::<T>())
    }

    /// A sibling module together with the host, for modules that forward
    /// work to the host on another module's behalf.
    pub fn module_and_host<T: Module>(&mut self) -> Option<(&mut T, &mut dyn Host)> {
        let module = self
            .sessions
            .get_mut(&self.key.session)?
            .modules
            .iter_mut()
            .filter_map(|slot| slot.module.as_mut())
            .find_map(|m| m.as_any_mut().downcast_mut::<T>())?;
        Some((module, &mut *self.host))
    }
}
