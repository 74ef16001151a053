//! Identifier types used across the control plane
//!
//! Users, tags, communication identifiers and message identifiers are opaque
//! strings supplied by the request layer. Reservations are minted locally.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string-like value
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the inner string
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume into the inner string
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Owner of robots, containers and their interfaces
    UserId
);

string_id!(
    /// Name of an entity within its owning scope
    ///
    /// Container tags and robot ids are scoped per user; interface, node and
    /// parameter tags are scoped per endpoint.
    Tag
);

string_id!(
    /// Communication identifier of a node reachable through the transport
    CommId
);

string_id!(
    /// Token linking a request message to its eventual response
    MessageId
);

impl CommId {
    /// Mint a fresh communication identifier
    ///
    /// Comm ids are 32 lowercase hex characters so they can be embedded in
    /// routing headers without escaping.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

impl MessageId {
    /// Mint a fresh message identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Identifier of a provisional placement slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReservationId(pub Uuid);

impl ReservationId {
    /// Create a new random reservation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reservation-{}", self.0)
    }
}

/// User-scoped key of a container or robot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub user: UserId,
    pub tag: Tag,
}

impl EntityKey {
    pub fn new(user: impl Into<UserId>, tag: impl Into<Tag>) -> Self {
        Self {
            user: user.into(),
            tag: tag.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user, self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_comm_ids_are_unique_hex() {
        let a = CommId::generate();
        let b = CommId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_string_ids_serialize_transparently() {
        let tag = Tag::new("camera");
        assert_eq!(serde_json::to_string(&tag).unwrap(), "\"camera\"");
        let back: Tag = serde_json::from_str("\"camera\"").unwrap();
        assert_eq!(back, tag);
    }

    #[test]
    fn test_entity_key_display() {
        let key = EntityKey::new("alice", "c1");
        assert_eq!(key.to_string(), "alice/c1");
    }
}
