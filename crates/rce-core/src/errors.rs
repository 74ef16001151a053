//! Unified error system for the control plane
//!
//! Every component reports failures through [`RceError`]. Variants carry the
//! identifiers needed to act on the failure; constructor helpers keep call
//! sites short.

use serde::{Deserialize, Serialize};

/// Type or value mismatch while converting a ROS message to or from its field
/// mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ConversionError {
    /// A field holds a value of the wrong shape for the schema
    #[error("type error in field '{field}': expected {expected}, found {found}")]
    Type {
        /// Dotted path of the offending field
        field: String,
        /// Shape required by the schema
        expected: String,
        /// Shape that was supplied
        found: String,
    },

    /// A field name or value is not acceptable for the schema
    #[error("value error in field '{field}': {message}")]
    Value {
        /// Dotted path of the offending field
        field: String,
        /// What was wrong with it
        message: String,
    },
}

impl ConversionError {
    /// Create a type mismatch error
    pub fn type_mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::Type {
            field: field.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a value error
    pub fn value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Value {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Prefix the field path with the name of the enclosing field
    pub fn nested(self, parent: &str) -> Self {
        let join = |field: String| {
            if field.is_empty() {
                parent.to_string()
            } else {
                format!("{parent}.{field}")
            }
        };
        match self {
            Self::Type {
                field,
                expected,
                found,
            } => Self::Type {
                field: join(field),
                expected,
                found,
            },
            Self::Value { field, message } => Self::Value {
                field: join(field),
                message,
            },
        }
    }
}

/// Unified error type for all control plane operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum RceError {
    /// A machine with this IP is already registered
    #[error("Machine already registered: {ip}")]
    DuplicateMachine {
        /// IP address of the machine
        ip: String,
    },

    /// No machine with this IP is registered
    #[error("Unknown machine: {ip}")]
    UnknownMachine {
        /// IP address of the machine
        ip: String,
    },

    /// The machine still hosts containers or holds reservations
    #[error("Machine {ip} is busy: {hosted} hosted, {reserved} reserved")]
    MachineBusy {
        /// IP address of the machine
        ip: String,
        /// Containers currently hosted
        hosted: usize,
        /// Slots currently reserved
        reserved: usize,
    },

    /// Every registered machine is at capacity, or none is registered
    #[error("No machine available for container placement")]
    NoMachineAvailable,

    /// The reservation was never issued, or was already committed, released or expired
    #[error("Unknown reservation: {reservation}")]
    UnknownReservation {
        /// Reservation identifier
        reservation: String,
    },

    /// No handler registered for the identifier
    #[error("No handler registered for '{identifier}'")]
    NoHandler {
        /// Dispatch identifier
        identifier: String,
    },

    /// The target interface does not accept messages from this sender
    #[error("Unknown destination {comm_id}/{tag} for sender '{sender}'")]
    UnknownDestination {
        /// Communication identifier of the destination
        comm_id: String,
        /// Interface tag at the destination
        tag: String,
        /// Sending interface tag
        sender: String,
    },

    /// A response referenced an unknown or expired message identifier
    #[error("Stale correlation for message {msg_id}")]
    StaleCorrelation {
        /// Message identifier carried by the response
        msg_id: String,
    },

    /// The entity is not in the active state
    #[error("Unknown {kind}: {tag}")]
    UnknownEntity {
        /// Kind of entity (container, robot, interface, node, parameter)
        kind: String,
        /// Tag or identifier of the entity
        tag: String,
    },

    /// An entity with this tag is already live in the owning scope
    #[error("Duplicate {kind}: {tag}")]
    DuplicateEntity {
        /// Kind of entity
        kind: String,
        /// Tag or identifier of the entity
        tag: String,
    },

    /// The interface still has live connections
    #[error("Interface {tag} has {connections} live connections")]
    InterfaceBusy {
        /// Interface tag
        tag: String,
        /// Number of live connections
        connections: usize,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// ROS message conversion error
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// Invalid configuration or input
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message describing the invalid setting
        message: String,
    },

    /// Hand-off to a communication proxy failed
    #[error("Delivery to {comm_id} failed: {message}")]
    Delivery {
        /// Communication identifier of the proxy
        comm_id: String,
        /// Error message from the proxy
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl RceError {
    /// Create a duplicate machine error
    pub fn duplicate_machine(ip: impl Into<String>) -> Self {
        Self::DuplicateMachine { ip: ip.into() }
    }

    /// Create an unknown machine error
    pub fn unknown_machine(ip: impl Into<String>) -> Self {
        Self::UnknownMachine { ip: ip.into() }
    }

    /// Create an unknown reservation error
    pub fn unknown_reservation(reservation: impl ToString) -> Self {
        Self::UnknownReservation {
            reservation: reservation.to_string(),
        }
    }

    /// Create a missing handler error
    pub fn no_handler(identifier: impl Into<String>) -> Self {
        Self::NoHandler {
            identifier: identifier.into(),
        }
    }

    /// Create an unknown destination error
    pub fn unknown_destination(
        comm_id: impl ToString,
        tag: impl ToString,
        sender: impl ToString,
    ) -> Self {
        Self::UnknownDestination {
            comm_id: comm_id.to_string(),
            tag: tag.to_string(),
            sender: sender.to_string(),
        }
    }

    /// Create a stale correlation error
    pub fn stale_correlation(msg_id: impl ToString) -> Self {
        Self::StaleCorrelation {
            msg_id: msg_id.to_string(),
        }
    }

    /// Create an unknown entity error
    pub fn unknown_entity(kind: impl Into<String>, tag: impl ToString) -> Self {
        Self::UnknownEntity {
            kind: kind.into(),
            tag: tag.to_string(),
        }
    }

    /// Create a duplicate entity error
    pub fn duplicate_entity(kind: impl Into<String>, tag: impl ToString) -> Self {
        Self::DuplicateEntity {
            kind: kind.into(),
            tag: tag.to_string(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a delivery error
    pub fn delivery(comm_id: impl ToString, message: impl Into<String>) -> Self {
        Self::Delivery {
            comm_id: comm_id.to_string(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Local, expected failures that callers may log and move past.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::UnknownEntity { .. } | Self::StaleCorrelation { .. } | Self::NoHandler { .. }
        )
    }
}

/// Standard Result type for control plane operations
pub type Result<T> = std::result::Result<T, RceError>;

impl From<serde_json::Error> for RceError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<serde_cbor::Error> for RceError {
    fn from(err: serde_cbor::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<toml::de::Error> for RceError {
    fn from(err: toml::de::Error) -> Self {
        Self::invalid_config(err.to_string())
    }
}

impl From<std::io::Error> for RceError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RceError::unknown_entity("container", "c1");
        assert_eq!(err.to_string(), "Unknown container: c1");

        let err = RceError::MachineBusy {
            ip: "10.0.0.1".into(),
            hosted: 2,
            reserved: 1,
        };
        assert_eq!(
            err.to_string(),
            "Machine 10.0.0.1 is busy: 2 hosted, 1 reserved"
        );
    }

    #[test]
    fn test_soft_classification() {
        assert!(RceError::stale_correlation("m1").is_soft());
        assert!(RceError::unknown_entity("node", "n").is_soft());
        assert!(!RceError::NoMachineAvailable.is_soft());
        assert!(!RceError::serialization("bad").is_soft());
    }

    #[test]
    fn test_conversion_error_nesting() {
        let err = ConversionError::value("stamp", "missing").nested("header");
        assert_eq!(
            err,
            ConversionError::Value {
                field: "header.stamp".into(),
                message: "missing".into()
            }
        );

        let wrapped: RceError = err.into();
        assert!(matches!(wrapped, RceError::Conversion(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(matches!(
            RceError::from(json_err),
            RceError::Serialization { .. }
        ));
    }
}
