//! Type-safe identifier wrappers.
//!
//! Players, entities and sessions get strongly-typed UUID wrappers so the
//! compiler rejects accidental mixing. All UUID-backed IDs use v7
//! (time-ordered), which keeps `BTreeMap` iteration close to creation order.
//!
//! Teams are identified by the short string keys operators write in map
//! data (`red`, `blue`), so [`TeamId`] wraps a `String` instead.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a connected player.
    PlayerId
}

define_id! {
    /// Unique identifier for any host entity (players included).
    EntityId
}

define_id! {
    /// Unique identifier for a session node in the session tree.
    SessionId
}

impl From<PlayerId> for EntityId {
    fn from(id: PlayerId) -> Self {
        Self(id.0)
    }
}

/// Identifier of a team as declared in map data.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(String);

impl TeamId {
    /// Create a team identifier from its configured key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the configured key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TeamId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TeamId {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}
