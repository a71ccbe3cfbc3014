//! The session tree: sessions, players, modules, events and tasks.
//!
//! [`SessionTree`] owns every session in an arena keyed by [`SessionId`],
//! with parent links as ids and child lists in creation order. It is the
//! only place that mutates membership or lifecycle state.
//!
//! # Execution model
//!
//! Everything runs on one logical thread. [`SessionTree::tick`] advances the
//! clock, fires due tasks, then ticks every module of every running session
//! in session-creation order and registration order. Host events and tree
//! operations dispatch their own events synchronously (so cancellation can
//! be read back); events and commands produced *inside* module callbacks are
//! queued and drained right after the callback returns.
//!
//! # Membership
//!
//! A player's record stores their leaf session. Membership propagates
//! upward: the player is also a member of every ancestor. Moving to another
//! branch raises a cancellable [`SessionEvent::PlayerSwitchSession`], then
//! leaves the old branch (deepest first) and joins the new one (root
//! first).

use std::collections::{BTreeMap, VecDeque};

use blur_types::{LifecycleState, PlayerId, SessionId, StopReason};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{ModuleError, SessionError};
use crate::events::{EventBus, SessionEvent, Subscription};
use crate::host::{Host, HostEvent, HostOutcome};
use crate::module::{Command, Module, ModuleContext, ModuleKey};
use crate::players::PlayerRegistry;
use crate::scheduler::Scheduler;
use crate::session::{ModuleSlot, Session};

/// What happened during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    /// The tick just processed.
    pub tick: u64,
    /// Sessions in the tree.
    pub sessions: usize,
    /// Connected players.
    pub players: usize,
    /// Scheduled tasks that fired.
    pub tasks_fired: usize,
    /// Tickable modules that ran.
    pub modules_ticked: usize,
    /// Events dispatched since the tree was created.
    pub events_dispatched: u64,
}

/// Hierarchy of sessions plus everything they share.
pub struct SessionTree<H: Host> {
    host: H,
    sessions: BTreeMap<SessionId, Session>,
    order: Vec<SessionId>,
    root: SessionId,
    players: PlayerRegistry,
    bus: EventBus,
    scheduler: Scheduler,
    rng: StdRng,
    tick: u64,
    outbox: VecDeque<SessionEvent>,
    commands: VecDeque<Command>,
    events_dispatched: u64,
    recorded: Option<Vec<SessionEvent>>,
}

impl<H: Host> SessionTree<H> {
    /// A tree with an unloaded root session named `root`.
    pub fn new(host: H, seed: u64) -> Self {
        let root = SessionId::new();
        let mut sessions = BTreeMap::new();
        sessions.insert(root, Session::new(root, "root"));
        Self {
            host,
            sessions,
            order: vec![root],
            root,
            players: PlayerRegistry::new(),
            bus: EventBus::new(),
            scheduler: Scheduler::new(),
            rng: StdRng::seed_from_u64(seed),
            tick: 0,
            outbox: VecDeque::new(),
            commands: VecDeque::new(),
            events_dispatched: 0,
            recorded: None,
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// The root session id.
    pub const fn root(&self) -> SessionId {
        self.root
    }

    /// Whether the root session still exists.
    pub fn is_running(&self) -> bool {
        self.sessions.contains_key(&self.root)
    }

    /// Ticks processed so far.
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// The host.
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// The host, mutably.
    pub const fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Connected players.
    pub const fn players(&self) -> &PlayerRegistry {
        &self.players
    }

    /// A session by id.
    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// All sessions in creation order.
    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.order.iter().filter_map(|id| self.sessions.get(id))
    }

    /// Pending scheduled tasks.
    pub fn scheduled_tasks(&self) -> usize {
        self.scheduler.len()
    }

    /// Registered event subscriptions.
    pub fn subscriptions(&self) -> usize {
        self.bus.len()
    }

    /// Keys of a session's modules in registration order.
    pub fn module_keys(&self, session: SessionId) -> Vec<ModuleKey> {
        self.sessions
            .get(&session)
            .map(|s| {
                s.modules
                    .iter()
                    .enumerate()
                    .filter(|(_, slot)| !slot.detached)
                    .map(|(index, _)| ModuleKey { session, index })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Lifecycle state of a module.
    pub fn module_state(&self, key: ModuleKey) -> Option<LifecycleState> {
        self.slot(key).map(|s| s.state)
    }

    /// The first module of type `T` in a session.
    pub fn module<T: Module>(&self, session: SessionId) -> Option<&T> {
        self.sessions
            .get(&session)?
            .modules
            .iter()
            .filter_map(|slot| slot.module.as_ref())
            .find_map(|m| m.as_any().downcast_ref::<T>())
    }

    /// The first module of type `T` in a session, mutably.
    pub fn module_mut<T: Module>(&mut self, session: SessionId) -> Option<&mut T> {
        self.sessions
            .get_mut(&session)?
            .modules
            .iter_mut()
            .filter_map(|slot| slot.module.as_mut())
            .find_map(|m| m.as_any_mut().downcast_mut::<T>())
    }

    /// Start keeping a copy of every dispatched event.
    pub fn record_events(&mut self) {
        self.recorded.get_or_insert_with(Vec::new);
    }

    /// Take the events recorded since the last call.
    pub fn drain_recorded(&mut self) -> Vec<SessionEvent> {
        self.recorded.as_mut().map(std::mem::take).unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    /// Create a session with no parent. Attach it with
    /// [`SessionTree::add_child_session`].
    pub fn create_detached_session(&mut self, name: impl Into<String>) -> SessionId {
        let id = SessionId::new();
        self.insert_session(Session::new(id, name));
        id
    }

    /// Create a session as the last child of `parent`.
    pub fn create_session(
        &mut self,
        parent: SessionId,
        name: impl Into<String>,
    ) -> Result<SessionId, SessionError> {
        if !self.sessions.contains_key(&parent) {
            return Err(SessionError::SessionNotFound(parent));
        }
        let id = self.create_detached_session(name);
        self.add_child_session(parent, id)?;
        Ok(id)
    }

    /// Append `child` to `parent`'s children. A session can be attached
    /// once; re-parenting is an invariant violation.
    pub fn add_child_session(
        &mut self,
        parent: SessionId,
        child: SessionId,
    ) -> Result<(), SessionError> {
        if !self.sessions.contains_key(&parent) {
            return Err(SessionError::SessionNotFound(parent));
        }
        let existing = self
            .sessions
            .get(&child)
            .ok_or(SessionError::SessionNotFound(child))?
            .parent;
        if let Some(existing) = existing {
            return Err(SessionError::AlreadyParented {
                child,
                parent: existing,
            });
        }
        if child == self.root || self.path_to_root(parent).contains(&child) {
            return Err(SessionError::AlreadyParented { child, parent });
        }
        if let Some(node) = self.sessions.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(parent_node) = self.sessions.get_mut(&parent) {
            parent_node.children.push(child);
        }
        debug!(parent = %parent, child = %child, "Child session attached");
        Ok(())
    }

    /// Give a session its own world.
    pub fn set_world(
        &mut self,
        session: SessionId,
        world: Option<String>,
    ) -> Result<(), SessionError> {
        let node = self
            .sessions
            .get_mut(&session)
            .ok_or(SessionError::SessionNotFound(session))?;
        node.world = world;
        Ok(())
    }

    /// Register a module. Only allowed before the session is loaded.
    pub fn register_module(
        &mut self,
        session: SessionId,
        module: Box<dyn Module>,
    ) -> Result<ModuleKey, SessionError> {
        let node = self
            .sessions
            .get_mut(&session)
            .ok_or(SessionError::SessionNotFound(session))?;
        if node.state != LifecycleState::Unloaded {
            return Err(SessionError::ModulesSealed(session));
        }
        let key = ModuleKey {
            session,
            index: node.modules.len(),
        };
        debug!(session = %session, module = module.name(), "Module registered");
        node.modules.push(ModuleSlot::new(module));
        Ok(key)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Load a session and its modules. If any module fails, the ones
    /// already loaded are unloaded again and the session stays unloaded.
    pub fn load_session(&mut self, id: SessionId) -> Result<(), SessionError> {
        let result = self.load_session_now(id);
        self.pump();
        result
    }

    /// Enable a loaded or disabled session and its modules.
    pub fn enable_session(&mut self, id: SessionId) -> Result<(), SessionError> {
        let result = self.enable_session_now(id);
        self.pump();
        result
    }

    /// Disable an enabled session and its modules (reverse order).
    pub fn disable_session(&mut self, id: SessionId) -> Result<(), SessionError> {
        let result = self.disable_session_now(id);
        self.pump();
        result
    }

    /// Unload a loaded or disabled session and its modules (reverse order).
    pub fn unload_session(&mut self, id: SessionId) -> Result<(), SessionError> {
        let result = self.unload_session_now(id);
        self.pump();
        result
    }

    /// Load and enable as needed, then mark the session started.
    pub fn start_session(&mut self, id: SessionId) -> Result<(), SessionError> {
        let result = self.start_session_now(id);
        self.pump();
        result
    }

    /// Stop a session: children first, then its modules in reverse order,
    /// then move its players to the parent and detach it.
    pub fn stop_session(&mut self, id: SessionId, reason: StopReason) -> Result<(), SessionError> {
        let result = self.stop_session_now(id, reason);
        self.pump();
        result
    }

    /// Pause or resume ticking of a session.
    pub fn set_paused(&mut self, id: SessionId, paused: bool) -> Result<(), SessionError> {
        let node = self
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::SessionNotFound(id))?;
        node.paused = paused;
        info!(session = %id, paused, "Session pause toggled");
        Ok(())
    }

    /// Enable a single module. Its session must be enabled.
    pub fn enable_module(&mut self, key: ModuleKey) -> Result<(), SessionError> {
        let result = self.enable_module_now(key);
        self.pump();
        result
    }

    /// Disable a single module without touching its session.
    pub fn disable_module(&mut self, key: ModuleKey) -> Result<(), SessionError> {
        let result = self.disable_module_now(key);
        self.pump();
        result
    }

    // ------------------------------------------------------------------
    // Players
    // ------------------------------------------------------------------

    /// Make `player` a member of `session` (and its ancestors). Returns
    /// `false` when a handler cancelled the switch.
    pub fn add_player(&mut self, session: SessionId, player: PlayerId) -> Result<bool, SessionError> {
        let result = self.add_player_now(session, player);
        self.pump();
        result
    }

    /// Remove `player` from `session` and its descendants. Without
    /// propagation the player falls back to the parent; with it they leave
    /// every ancestor too.
    pub fn remove_player(
        &mut self,
        session: SessionId,
        player: PlayerId,
        propagate: bool,
    ) -> Result<(), SessionError> {
        let result = self.remove_player_now(session, player, propagate);
        self.pump();
        result
    }

    /// Bring a dead player back. Returns `false` (and does nothing) if the
    /// player is already alive or offline.
    pub fn respawn(&mut self, player: PlayerId) -> bool {
        let respawned = self.respawn_now(player);
        self.pump();
        respawned
    }

    /// Feed a host event into the tree.
    pub fn handle(&mut self, event: HostEvent) -> HostOutcome {
        let outcome = self.handle_now(event);
        self.pump();
        outcome
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance one tick: due tasks first, then every running module.
    pub fn tick(&mut self) -> TickSummary {
        self.tick = self.tick.saturating_add(1);

        let due = self.scheduler.take_due(self.tick);
        let tasks_fired = due.len();
        for (task, owner) in due {
            if self.module_state(owner) == Some(LifecycleState::Enabled) {
                self.with_module(owner, |module, ctx| module.on_task(ctx, task));
            }
            self.pump();
        }

        let running: Vec<SessionId> = self
            .order
            .iter()
            .copied()
            .filter(|id| self.sessions.get(id).is_some_and(Session::is_running))
            .collect();
        let mut keys = Vec::new();
        for id in &running {
            if let Some(node) = self.sessions.get_mut(id) {
                node.ticks_played = node.ticks_played.saturating_add(1);
            }
            keys.extend(self.module_keys(*id));
        }

        let mut modules_ticked: usize = 0;
        for key in keys {
            if self.module_state(key) != Some(LifecycleState::Enabled) {
                continue;
            }
            let ticked = self.with_module(key, |module, ctx| {
                module.as_tickable().map(|t| t.tick(ctx)).is_some()
            });
            if ticked == Some(true) {
                modules_ticked = modules_ticked.saturating_add(1);
            }
            self.pump();
        }

        TickSummary {
            tick: self.tick,
            sessions: self.sessions.len(),
            players: self.players.len(),
            tasks_fired,
            modules_ticked,
            events_dispatched: self.events_dispatched,
        }
    }

    // ------------------------------------------------------------------
    // Internals: dispatch
    // ------------------------------------------------------------------

    fn slot(&self, key: ModuleKey) -> Option<&ModuleSlot> {
        self.sessions.get(&key.session)?.modules.get(key.index)
    }

    fn slot_mut(&mut self, key: ModuleKey) -> Option<&mut ModuleSlot> {
        self.sessions.get_mut(&key.session)?.modules.get_mut(key.index)
    }

    fn insert_session(&mut self, session: Session) {
        self.order.push(session.id);
        self.sessions.insert(session.id, session);
    }

    /// `id` followed by its ancestors up to the root.
    fn path_to_root(&self, id: SessionId) -> Vec<SessionId> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            let Some(node) = self.sessions.get(&cur) else {
                break;
            };
            if path.contains(&cur) {
                break;
            }
            path.push(cur);
            current = node.parent;
        }
        path
    }

    /// Run `f` with the module temporarily taken out of its slot.
    fn with_module<R>(
        &mut self,
        key: ModuleKey,
        f: impl FnOnce(&mut dyn Module, &mut ModuleContext<'_>) -> R,
    ) -> Option<R> {
        let mut module = self.slot_mut(key)?.module.take()?;
        let result = {
            let mut ctx = ModuleContext {
                key,
                tick: self.tick,
                sessions: &mut self.sessions,
                players: &self.players,
                scheduler: &mut self.scheduler,
                host: &mut self.host,
                rng: &mut self.rng,
                outbox: &mut self.outbox,
                commands: &mut self.commands,
            };
            f(&mut *module, &mut ctx)
        };
        if let Some(slot) = self.slot_mut(key) {
            slot.module = Some(module);
        }
        Some(result)
    }

    /// Deliver an event to every eligible subscriber, in priority order.
    fn dispatch(&mut self, event: &mut SessionEvent) {
        let chain = event.scope().map(|s| self.path_to_root(s));
        for listener in self.bus.listeners(event.kind()) {
            if chain
                .as_ref()
                .is_some_and(|c| !c.contains(&listener.owner.session))
            {
                continue;
            }
            if listener.ignore_cancelled && event.is_cancelled() {
                continue;
            }
            if self.module_state(listener.owner) != Some(LifecycleState::Enabled) {
                continue;
            }
            self.with_module(listener.owner, |module, ctx| {
                if let Some(subscriber) = module.as_subscriber() {
                    subscriber.on_event(ctx, event);
                }
            });
        }
        self.events_dispatched = self.events_dispatched.saturating_add(1);
        if let Some(log) = self.recorded.as_mut() {
            log.push(event.clone());
        }
    }

    fn emit_now(&mut self, mut event: SessionEvent) {
        self.dispatch(&mut event);
    }

    /// Drain queued commands and events until both queues are empty.
    fn pump(&mut self) {
        loop {
            if let Some(command) = self.commands.pop_front() {
                self.apply(command);
            } else if let Some(mut event) = self.outbox.pop_front() {
                self.dispatch(&mut event);
            } else {
                break;
            }
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::AddPlayer { session, player } => {
                if let Err(e) = self.add_player_now(session, player) {
                    warn!(session = %session, player = %player, error = %e, "Queued player add failed");
                }
            }
            Command::RemovePlayer {
                session,
                player,
                propagate,
            } => {
                if let Err(e) = self.remove_player_now(session, player, propagate) {
                    warn!(session = %session, player = %player, error = %e, "Queued player removal failed");
                }
            }
            Command::Respawn { player } => {
                self.respawn_now(player);
            }
            Command::Start { session } => {
                if let Err(e) = self.start_session_now(session) {
                    warn!(session = %session, error = %e, "Queued session start failed");
                }
            }
            Command::Stop { session, reason } => {
                if let Err(e) = self.stop_session_now(session, reason) {
                    debug!(session = %session, error = %e, "Queued session stop skipped");
                }
            }
            Command::CreateSession {
                id,
                parent,
                name,
                world,
                modules,
            } => self.spawn_session(id, parent, name, world, modules),
            Command::ActivateModule { key } => {
                if let Err(e) = self.activate_module_now(key) {
                    warn!(module = %key, error = %e, "Attached module failed to activate");
                }
            }
            Command::DetachModule { key } => {
                if let Err(e) = self.detach_module_now(key) {
                    warn!(module = %key, error = %e, "Module detach failed");
                }
            }
        }
    }

    /// Bring a module attached at runtime up to its session's state.
    fn activate_module_now(&mut self, key: ModuleKey) -> Result<(), SessionError> {
        let session = self.session_state(key.session)?;
        if session == LifecycleState::Unloaded {
            return Ok(());
        }
        if self.module_state(key) == Some(LifecycleState::Unloaded) {
            self.load_module_now(key)?;
        }
        if session == LifecycleState::Enabled {
            self.enable_module_now(key)?;
        }
        Ok(())
    }

    /// Wind a module down and drop it. Its slot stays behind, empty.
    fn detach_module_now(&mut self, key: ModuleKey) -> Result<(), SessionError> {
        if self.slot(key).is_none_or(|slot| slot.detached) {
            return Err(SessionError::ModuleNotFound(key));
        }
        if self.module_state(key) == Some(LifecycleState::Enabled) {
            self.disable_module_now(key)?;
        }
        if matches!(
            self.module_state(key),
            Some(LifecycleState::Loaded | LifecycleState::Disabled)
        ) {
            self.unload_module_now(key)?;
        }
        let name = self.module_name(key);
        if let Some(slot) = self.slot_mut(key) {
            slot.module = None;
            slot.detached = true;
        }
        debug!(module = name, session = %key.session, "Module detached");
        Ok(())
    }

    /// Create, attach, populate, load and enable a session requested by a
    /// module. A load failure stops only the new session.
    fn spawn_session(
        &mut self,
        id: SessionId,
        parent: SessionId,
        name: String,
        world: Option<String>,
        modules: Vec<Box<dyn Module>>,
    ) {
        let mut session = Session::new(id, name);
        session.world = world;
        self.insert_session(session);
        if let Err(e) = self.add_child_session(parent, id) {
            error!(session = %id, error = %e, "Failed to attach new session");
            self.sessions.remove(&id);
            self.order.retain(|s| *s != id);
            return;
        }
        for module in modules {
            if let Err(e) = self.register_module(id, module) {
                error!(session = %id, error = %e, "Failed to register module");
            }
        }
        let activated = self
            .load_session_now(id)
            .and_then(|()| self.enable_session_now(id));
        if let Err(e) = activated {
            error!(session = %id, error = %e, "Session failed to activate, stopping it");
            if let Err(e) = self.stop_session_now(id, StopReason::ModuleTriggered) {
                warn!(session = %id, error = %e, "Failed to stop broken session");
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals: lifecycle
    // ------------------------------------------------------------------

    fn session_state(&self, id: SessionId) -> Result<LifecycleState, SessionError> {
        self.sessions
            .get(&id)
            .map(Session::state)
            .ok_or(SessionError::SessionNotFound(id))
    }

    fn set_session_state(&mut self, id: SessionId, to: LifecycleState) -> Result<(), SessionError> {
        let from = self.session_state(id)?;
        if !from.can_transition(to) {
            return Err(SessionError::InvalidTransition {
                session: id,
                from,
                to,
            });
        }
        if let Some(node) = self.sessions.get_mut(&id) {
            node.state = to;
        }
        Ok(())
    }

    fn check_module_transition(&self, key: ModuleKey, to: LifecycleState) -> Result<(), SessionError> {
        let slot = self.slot(key).ok_or(SessionError::ModuleNotFound(key))?;
        if slot.state.can_transition(to) {
            Ok(())
        } else {
            Err(SessionError::ModuleTransition {
                module: slot.name,
                from: slot.state,
                to,
            })
        }
    }

    fn set_module_state(&mut self, key: ModuleKey, to: LifecycleState) {
        if let Some(slot) = self.slot_mut(key) {
            slot.state = to;
        }
    }

    fn module_name(&self, key: ModuleKey) -> &'static str {
        self.slot(key).map_or("unknown", |s| s.name)
    }

    fn load_module_now(&mut self, key: ModuleKey) -> Result<(), SessionError> {
        self.check_module_transition(key, LifecycleState::Loaded)?;
        let name = self.module_name(key);
        let result = self
            .with_module(key, |module, ctx| module.load(ctx))
            .ok_or(SessionError::ModuleNotFound(key))?;
        result.map_err(|source| SessionError::Module { module: name, source })?;
        self.set_module_state(key, LifecycleState::Loaded);
        debug!(module = name, session = %key.session, "Module loaded");
        Ok(())
    }

    fn enable_module_now(&mut self, key: ModuleKey) -> Result<(), SessionError> {
        if self.session_state(key.session)? != LifecycleState::Enabled {
            return Err(SessionError::SessionNotEnabled(key.session));
        }
        self.check_module_transition(key, LifecycleState::Enabled)?;
        let name = self.module_name(key);
        let result = self
            .with_module(key, |module, ctx| -> Result<Vec<Subscription>, ModuleError> {
                module.enable(ctx)?;
                Ok(module.as_subscriber().map(|s| s.subscriptions()).unwrap_or_default())
            })
            .ok_or(SessionError::ModuleNotFound(key))?;
        let subscriptions = result.map_err(|source| SessionError::Module { module: name, source })?;
        self.bus.subscribe(key, &subscriptions);
        self.set_module_state(key, LifecycleState::Enabled);
        debug!(module = name, session = %key.session, subscriptions = subscriptions.len(), "Module enabled");
        Ok(())
    }

    fn disable_module_now(&mut self, key: ModuleKey) -> Result<(), SessionError> {
        self.check_module_transition(key, LifecycleState::Disabled)?;
        self.bus.unsubscribe(key);
        let cancelled = self.scheduler.cancel_owned_by(key);
        self.with_module(key, |module, ctx| module.disable(ctx));
        self.set_module_state(key, LifecycleState::Disabled);
        debug!(module = self.module_name(key), session = %key.session, cancelled_tasks = cancelled, "Module disabled");
        Ok(())
    }

    fn unload_module_now(&mut self, key: ModuleKey) -> Result<(), SessionError> {
        self.check_module_transition(key, LifecycleState::Unloaded)?;
        self.with_module(key, |module, ctx| module.unload(ctx));
        self.set_module_state(key, LifecycleState::Unloaded);
        debug!(module = self.module_name(key), session = %key.session, "Module unloaded");
        Ok(())
    }

    fn load_session_now(&mut self, id: SessionId) -> Result<(), SessionError> {
        let from = self.session_state(id)?;
        if !from.can_transition(LifecycleState::Loaded) {
            return Err(SessionError::InvalidTransition {
                session: id,
                from,
                to: LifecycleState::Loaded,
            });
        }
        let keys = self.module_keys(id);
        for (position, key) in keys.iter().enumerate() {
            if let Err(e) = self.load_module_now(*key) {
                for loaded in keys.iter().take(position).rev() {
                    if let Err(undo) = self.unload_module_now(*loaded) {
                        warn!(session = %id, error = %undo, "Failed to roll back module load");
                    }
                }
                return Err(e);
            }
        }
        self.set_session_state(id, LifecycleState::Loaded)?;
        info!(session = %id, modules = keys.len(), "Session loaded");
        Ok(())
    }

    fn enable_session_now(&mut self, id: SessionId) -> Result<(), SessionError> {
        self.set_session_state(id, LifecycleState::Enabled)?;
        for key in self.module_keys(id) {
            let state = self.module_state(key);
            if !matches!(state, Some(LifecycleState::Loaded | LifecycleState::Disabled)) {
                continue;
            }
            if let Err(e) = self.enable_module_now(key) {
                warn!(session = %id, error = %e, "Module failed to enable");
            }
        }
        info!(session = %id, "Session enabled");
        Ok(())
    }

    fn disable_session_now(&mut self, id: SessionId) -> Result<(), SessionError> {
        self.set_session_state(id, LifecycleState::Disabled)?;
        for key in self.module_keys(id).into_iter().rev() {
            if self.module_state(key) == Some(LifecycleState::Enabled) {
                self.disable_module_now(key)?;
            }
        }
        info!(session = %id, "Session disabled");
        Ok(())
    }

    fn unload_session_now(&mut self, id: SessionId) -> Result<(), SessionError> {
        self.set_session_state(id, LifecycleState::Unloaded)?;
        for key in self.module_keys(id).into_iter().rev() {
            if matches!(
                self.module_state(key),
                Some(LifecycleState::Loaded | LifecycleState::Disabled)
            ) {
                self.unload_module_now(key)?;
            }
        }
        info!(session = %id, "Session unloaded");
        Ok(())
    }

    fn start_session_now(&mut self, id: SessionId) -> Result<(), SessionError> {
        if self.session_state(id)? == LifecycleState::Unloaded {
            self.load_session_now(id)?;
        }
        if matches!(
            self.session_state(id)?,
            LifecycleState::Loaded | LifecycleState::Disabled
        ) {
            self.enable_session_now(id)?;
        }
        let Some(node) = self.sessions.get_mut(&id) else {
            return Err(SessionError::SessionNotFound(id));
        };
        if node.started {
            return Ok(());
        }
        node.started = true;
        info!(session = %id, name = %node.name, "Session started");
        self.emit_now(SessionEvent::SessionStarted { session: id });
        Ok(())
    }

    fn stop_session_now(&mut self, id: SessionId, reason: StopReason) -> Result<(), SessionError> {
        let node = self
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::SessionNotFound(id))?;
        node.stopping = true;
        let children = node.children.clone();
        let parent = node.parent;

        for child in children.into_iter().rev() {
            if let Err(e) = self.stop_session_now(child, reason) {
                warn!(session = %child, error = %e, "Failed to stop child session");
            }
        }

        self.emit_now(SessionEvent::SessionStopping { session: id, reason });

        if self.session_state(id)? == LifecycleState::Enabled {
            self.disable_session_now(id)?;
        }
        if matches!(
            self.session_state(id)?,
            LifecycleState::Loaded | LifecycleState::Disabled
        ) {
            self.unload_session_now(id)?;
        }

        let members: Vec<PlayerId> = self
            .sessions
            .get(&id)
            .map(|s| s.players.iter().copied().collect())
            .unwrap_or_default();
        for player in members {
            self.remove_player_now(id, player, false)?;
        }

        self.scheduler.cancel_session(id);
        self.bus.unsubscribe_session(id);
        if let Some(parent_node) = parent.and_then(|p| self.sessions.get_mut(&p)) {
            parent_node.children.retain(|c| *c != id);
        }
        self.sessions.remove(&id);
        self.order.retain(|s| *s != id);
        info!(session = %id, reason = %reason, "Session stopped");

        self.emit_now(SessionEvent::SessionStopped {
            session: id,
            parent,
            reason,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals: players
    // ------------------------------------------------------------------

    fn add_player_now(&mut self, target: SessionId, player: PlayerId) -> Result<bool, SessionError> {
        if !self.sessions.contains_key(&target) {
            return Err(SessionError::SessionNotFound(target));
        }
        if !self.players.is_online(player) {
            return Err(SessionError::PlayerNotConnected(player));
        }
        let old = self.players.leaf(player);
        if old == Some(target) {
            return Ok(true);
        }

        if old.is_some() {
            let mut switch = SessionEvent::PlayerSwitchSession {
                from: old,
                to: target,
                player,
                cancelled: false,
            };
            self.dispatch(&mut switch);
            if switch.is_cancelled() {
                debug!(player = %player, to = %target, "Session switch cancelled");
                return Ok(false);
            }
        }

        let new_path = self.path_to_root(target);
        let left: Vec<SessionId> = old
            .map(|from| {
                self.path_to_root(from)
                    .into_iter()
                    .take_while(|s| !new_path.contains(s))
                    .collect()
            })
            .unwrap_or_default();
        let rejoined = self
            .sessions
            .get(&target)
            .is_some_and(|s| s.contains(player));

        for session in &left {
            if let Some(node) = self.sessions.get_mut(session) {
                node.players.remove(&player);
            }
        }
        let mut joined = Vec::new();
        for session in new_path.iter().rev() {
            if let Some(node) = self.sessions.get_mut(session) {
                if node.players.insert(player) {
                    joined.push(*session);
                }
            }
        }
        self.players.set_leaf(player, Some(target));

        for session in left {
            self.emit_now(SessionEvent::PlayerLeaveSession { session, player });
        }
        for session in joined {
            self.emit_now(SessionEvent::PlayerJoinSession {
                session,
                player,
                rejoined: false,
            });
        }
        if rejoined {
            self.emit_now(SessionEvent::PlayerJoinSession {
                session: target,
                player,
                rejoined: true,
            });
        }
        debug!(player = %player, session = %target, "Player added to session");
        Ok(true)
    }

    fn remove_player_now(
        &mut self,
        session: SessionId,
        player: PlayerId,
        propagate: bool,
    ) -> Result<(), SessionError> {
        let node = self
            .sessions
            .get(&session)
            .ok_or(SessionError::SessionNotFound(session))?;
        if !node.contains(player) {
            return Ok(());
        }
        let parent = node.parent;

        let mut leaving = Vec::new();
        match self.players.leaf(player) {
            Some(leaf) => {
                for s in self.path_to_root(leaf) {
                    leaving.push(s);
                    if s == session {
                        break;
                    }
                }
            }
            None => leaving.push(session),
        }
        if propagate {
            leaving.extend(self.path_to_root(session).into_iter().skip(1));
        }

        for s in &leaving {
            if let Some(node) = self.sessions.get_mut(s) {
                node.players.remove(&player);
            }
        }
        let fallback = if propagate { None } else { parent };
        self.players.set_leaf(player, fallback);

        for s in leaving {
            self.emit_now(SessionEvent::PlayerLeaveSession { session: s, player });
        }
        if let Some(parent) = fallback {
            self.emit_now(SessionEvent::PlayerJoinSession {
                session: parent,
                player,
                rejoined: true,
            });
        }
        debug!(player = %player, session = %session, propagate, "Player removed from session");
        Ok(())
    }

    fn respawn_now(&mut self, player: PlayerId) -> bool {
        if !self.players.set_alive(player, true) {
            return false;
        }
        self.host.set_spectating(player, false);
        if let Some(session) = self.players.leaf(player) {
            self.emit_now(SessionEvent::PlayerRespawn { session, player });
        }
        debug!(player = %player, "Player respawned");
        true
    }

    fn handle_now(&mut self, event: HostEvent) -> HostOutcome {
        match event {
            HostEvent::Connect { player, name } => {
                if self.players.connect(player, name) {
                    info!(player = %player, "Player connected");
                    if let Err(e) = self.add_player_now(self.root, player) {
                        warn!(player = %player, error = %e, "Could not place connecting player");
                    }
                }
                HostOutcome::default()
            }
            HostEvent::Disconnect { player } => {
                if let Some(leaf) = self.players.leaf(player) {
                    if let Err(e) = self.remove_player_now(leaf, player, true) {
                        warn!(player = %player, error = %e, "Failed to remove disconnecting player");
                    }
                }
                if self.players.disconnect(player).is_some() {
                    self.host.set_progress_bar(player, None);
                    info!(player = %player, "Player disconnected");
                }
                HostOutcome::default()
            }
            HostEvent::Move { player, from, to } => {
                let Some(session) = self.players.leaf(player) else {
                    return HostOutcome::default();
                };
                let mut event = SessionEvent::PlayerMove {
                    session,
                    player,
                    from,
                    to,
                    cancelled: false,
                };
                self.dispatch(&mut event);
                HostOutcome {
                    cancelled: event.is_cancelled(),
                }
            }
            HostEvent::Death { player } => {
                if self.players.set_alive(player, false) {
                    self.host.set_spectating(player, true);
                    if let Some(session) = self.players.leaf(player) {
                        let position = self.host.position(player.into());
                        self.emit_now(SessionEvent::PlayerDeath {
                            session,
                            player,
                            position,
                        });
                    }
                    debug!(player = %player, "Player died");
                }
                HostOutcome::default()
            }
            HostEvent::EntityDeath { entity } => {
                self.emit_now(SessionEvent::EntityDeath { entity });
                HostOutcome::default()
            }
        }
    }
}
