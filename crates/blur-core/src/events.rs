//! Typed publish/subscribe inside the session tree.
//!
//! Every event is a [`SessionEvent`] variant. Modules declare
//! [`Subscription`]s (event kind, [`Priority`], whether to skip cancelled
//! events) when they are enabled; the [`EventBus`] keeps them sorted by
//! priority and then registration order.
//!
//! Events are scoped to a session. A subscriber receives an event when its
//! own session is the event's scope or an ancestor of it, so a lobby hears
//! about its matches but a match never hears about its siblings. Events
//! without a scope (entity deaths) reach every subscriber.

use blur_types::{EntityId, PlayerId, Point, Priority, SessionId, StopReason, TeamId, Winner};

use crate::module::ModuleKey;

/// Something that happened in a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A player became a member of `session`. `rejoined` is set when the
    /// player fell back into it from a stopped or left child.
    PlayerJoinSession {
        /// Session joined.
        session: SessionId,
        /// The player.
        player: PlayerId,
        /// Returned from a child rather than newly joined.
        rejoined: bool,
    },
    /// A player stopped being a member of `session`.
    PlayerLeaveSession {
        /// Session left.
        session: SessionId,
        /// The player.
        player: PlayerId,
    },
    /// A player is about to move to another branch of the tree.
    /// Cancelling keeps them where they are.
    PlayerSwitchSession {
        /// Current leaf session, if any.
        from: Option<SessionId>,
        /// Target session.
        to: SessionId,
        /// The player.
        player: PlayerId,
        /// Cancellation flag.
        cancelled: bool,
    },
    /// A player is moving. Cancelling tells the host to undo the move.
    PlayerMove {
        /// The player's leaf session.
        session: SessionId,
        /// The player.
        player: PlayerId,
        /// Old position.
        from: Point,
        /// New position.
        to: Point,
        /// Cancellation flag.
        cancelled: bool,
    },
    /// A player died.
    PlayerDeath {
        /// The player's leaf session.
        session: SessionId,
        /// The player.
        player: PlayerId,
        /// Where they died, if the host knows.
        position: Option<Point>,
    },
    /// A dead player was brought back.
    PlayerRespawn {
        /// The player's leaf session.
        session: SessionId,
        /// The player.
        player: PlayerId,
    },
    /// A non-player entity died or despawned.
    EntityDeath {
        /// The entity.
        entity: EntityId,
    },
    /// A session started running.
    SessionStarted {
        /// The session.
        session: SessionId,
    },
    /// A session is about to stop; its modules are still enabled.
    SessionStopping {
        /// The session.
        session: SessionId,
        /// Why.
        reason: StopReason,
    },
    /// A session has stopped and been detached. Scoped to the parent.
    SessionStopped {
        /// The stopped session.
        session: SessionId,
        /// Its former parent.
        parent: Option<SessionId>,
        /// Why.
        reason: StopReason,
    },
    /// A player was placed on a team.
    TeamAssigned {
        /// Session owning the team registry.
        session: SessionId,
        /// The player.
        player: PlayerId,
        /// The team.
        team: TeamId,
    },
    /// A player walked onto a control point.
    ControlPointEnter {
        /// Session.
        session: SessionId,
        /// Control point id.
        point: String,
        /// The player.
        player: PlayerId,
    },
    /// A player left a control point.
    ControlPointExit {
        /// Session.
        session: SessionId,
        /// Control point id.
        point: String,
        /// The player.
        player: PlayerId,
    },
    /// A control point's progress drained to zero.
    ControlPointProgressReset {
        /// Session.
        session: SessionId,
        /// Control point id.
        point: String,
        /// Team whose progress was lost, if any.
        team: Option<TeamId>,
    },
    /// A team captured a control point.
    ControlPointCaptured {
        /// Session.
        session: SessionId,
        /// Control point id.
        point: String,
        /// New owner.
        team: TeamId,
    },
    /// A team lost ownership of a control point.
    ControlPointLost {
        /// Session.
        session: SessionId,
        /// Control point id.
        point: String,
        /// Former owner.
        team: TeamId,
    },
    /// A player reached their next checkpoint.
    CheckpointReached {
        /// Session.
        session: SessionId,
        /// The player.
        player: PlayerId,
        /// Zero-based index of the checkpoint reached.
        index: usize,
        /// Checkpoints still ahead.
        remaining: usize,
    },
    /// The session's objective was completed.
    ObjectiveCompleted {
        /// Session.
        session: SessionId,
        /// Player who completed it, if one did.
        player: Option<PlayerId>,
    },
    /// A player's cooldown ran out.
    CooldownExpired {
        /// Session.
        session: SessionId,
        /// The player.
        player: PlayerId,
        /// Cooldown key.
        kind: String,
    },    /// A stage began.
    StageChanged {
        /// Session.
        session: SessionId,
        /// Zero-based stage index.
        index: usize,
        /// Name of the new stage.
        stage: String,
        /// Name of the stage that ended, if any.
        previous: Option<String>,
        /// Why the previous stage ended; `None` when stages first start.
        reason: Option<StopReason>,
    },
    /// The last stage ended. The session stops next.
    StagesComplete {
        /// Session.
        session: SessionId,
        /// Name of the last stage.
        stage: String,
        /// Why it ended.
        reason: StopReason,
    },
    /// A module declared the current stage over.
    StageEnded {
        /// Session.
        session: SessionId,
        /// Why.
        reason: StopReason,
    },
    /// The session's goal has been decided.
    GoalWinners {
        /// Session.
        session: SessionId,
        /// Who won.
        winners: Vec<Winner>,
    },
}

/// Discriminant of [`SessionEvent`] used for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(missing_docs)]
pub enum EventKind {
    PlayerJoinSession,
    PlayerLeaveSession,
    PlayerSwitchSession,
    PlayerMove,
    PlayerDeath,
    PlayerRespawn,
    EntityDeath,
    SessionStarted,
    SessionStopping,
    SessionStopped,
    TeamAssigned,
    ControlPointEnter,
    ControlPointExit,
    ControlPointProgressReset,
    ControlPointCaptured,
    ControlPointLost,
    CheckpointReached,
    ObjectiveCompleted,
    CooldownExpired,
    StageChanged,
    StagesComplete,
    StageEnded,
    GoalWinners,
}

impl SessionEvent {
    /// The subscription key of this event.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::PlayerJoinSession { .. } => EventKind::PlayerJoinSession,
            Self::PlayerLeaveSession { .. } => EventKind::PlayerLeaveSession,
            Self::PlayerSwitchSession { .. } => EventKind::PlayerSwitchSession,
            Self::PlayerMove { .. } => EventKind::PlayerMove,
            Self::PlayerDeath { .. } => EventKind::PlayerDeath,
            Self::PlayerRespawn { .. } => EventKind::PlayerRespawn,
            Self::EntityDeath { .. } => EventKind::EntityDeath,
            Self::SessionStarted { .. } => EventKind::SessionStarted,
            Self::SessionStopping { .. } => EventKind::SessionStopping,
            Self::SessionStopped { .. } => EventKind::SessionStopped,
            Self::TeamAssigned { .. } => EventKind::TeamAssigned,
            Self::ControlPointEnter { .. } => EventKind::ControlPointEnter,
            Self::ControlPointExit { .. } => EventKind::ControlPointExit,
            Self::ControlPointProgressReset { .. } => EventKind::ControlPointProgressReset,
            Self::ControlPointCaptured { .. } => EventKind::ControlPointCaptured,
            Self::ControlPointLost { .. } => EventKind::ControlPointLost,
            Self::CheckpointReached { .. } => EventKind::CheckpointReached,
            Self::ObjectiveCompleted { .. } => EventKind::ObjectiveCompleted,
            Self::CooldownExpired { .. } => EventKind::CooldownExpired,
            Self::StageChanged { .. } => EventKind::StageChanged,
            Self::StagesComplete { .. } => EventKind::StagesComplete,
            Self::StageEnded { .. } => EventKind::StageEnded,
            Self::GoalWinners { .. } => EventKind::GoalWinners,
        }
    }

    /// Session this event belongs to; `None` for global events.
    pub const fn scope(&self) -> Option<SessionId> {
        match self {
            Self::EntityDeath { .. } => None,
            Self::SessionStopped { parent, .. } => *parent,
            Self::PlayerSwitchSession { to, .. } => Some(*to),
            Self::PlayerJoinSession { session, .. }
            | Self::PlayerLeaveSession { session, .. }
            | Self::PlayerMove { session, .. }
            | Self::PlayerDeath { session, .. }
            | Self::PlayerRespawn { session, .. }
            | Self::SessionStarted { session }
            | Self::SessionStopping { session, .. }
            | Self::TeamAssigned { session, .. }
            | Self::ControlPointEnter { session, .. }
            | Self::ControlPointExit { session, .. }
            | Self::ControlPointProgressReset { session, .. }
            | Self::ControlPointCaptured { session, .. }
            | Self::ControlPointLost { session, .. }
            | Self::CheckpointReached { session, .. }
            | Self::ObjectiveCompleted { session, .. }
            | Self::CooldownExpired { session, .. }
            | Self::StageChanged { session, .. }
            | Self::StagesComplete { session, .. }
            | Self::StageEnded { session, .. }
            | Self::GoalWinners { session, .. } => Some(*session),
        }
    }

    /// Whether a handler may cancel this event.
    pub const fn is_cancellable(&self) -> bool {
        matches!(self, Self::PlayerSwitchSession { .. } | Self::PlayerMove { .. })
    }

    /// Whether a handler has cancelled this event.
    pub const fn is_cancelled(&self) -> bool {
        match self {
            Self::PlayerSwitchSession { cancelled, .. } | Self::PlayerMove { cancelled, .. } => {
                *cancelled
            }
            _ => false,
        }
    }

    /// Set the cancellation flag. Ignored for non-cancellable events.
    pub const fn set_cancelled(&mut self, value: bool) {
        match self {
            Self::PlayerSwitchSession { cancelled, .. } | Self::PlayerMove { cancelled, .. } => {
                *cancelled = value;
            }
            _ => {}
        }
    }
}

/// What a module wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    /// Event kind.
    pub kind: EventKind,
    /// Dispatch order among subscribers of the same kind.
    pub priority: Priority,
    /// Skip the event when an earlier handler already cancelled it.
    pub ignore_cancelled: bool,
}

impl Subscription {
    /// Subscribe at normal priority, receiving cancelled events too.
    pub const fn to(kind: EventKind) -> Self {
        Self {
            kind,
            priority: Priority::Normal,
            ignore_cancelled: false,
        }
    }

    /// Override the priority.
    pub const fn at(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Skip events already cancelled by an earlier handler.
    pub const fn ignoring_cancelled(mut self) -> Self {
        self.ignore_cancelled = true;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Registered {
    subscription: Subscription,
    owner: ModuleKey,
    seq: u64,
}

/// Registry of module subscriptions.
#[derive(Debug, Default)]
pub struct EventBus {
    entries: Vec<Registered>,
    next_seq: u64,
}

/// A subscriber selected for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Listener {
    /// The subscribing module.
    pub owner: ModuleKey,
    /// Skip when already cancelled.
    pub ignore_cancelled: bool,
}

impl EventBus {
    /// An empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register subscriptions for a module.
    pub fn subscribe(&mut self, owner: ModuleKey, subscriptions: &[Subscription]) {
        for subscription in subscriptions {
            self.entries.push(Registered {
                subscription: *subscription,
                owner,
                seq: self.next_seq,
            });
            self.next_seq = self.next_seq.saturating_add(1);
        }
        self.entries
            .sort_by_key(|e| (e.subscription.priority, e.seq));
    }

    /// Drop every subscription owned by a module. Returns how many.
    pub fn unsubscribe(&mut self, owner: ModuleKey) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.owner != owner);
        before.saturating_sub(self.entries.len())
    }

    /// Drop every subscription owned by a session's modules.
    pub fn unsubscribe_session(&mut self, session: SessionId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.owner.session != session);
        before.saturating_sub(self.entries.len())
    }

    /// Subscribers of `kind` in dispatch order.
    pub fn listeners(&self, kind: EventKind) -> Vec<Listener> {
        self.entries
            .iter()
            .filter(|e| e.subscription.kind == kind)
            .map(|e| Listener {
                owner: e.owner,
                ignore_cancelled: e.subscription.ignore_cancelled,
            })
            .collect()
    }

    /// Total number of registered subscriptions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no subscriptions are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
