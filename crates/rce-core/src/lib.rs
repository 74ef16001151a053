//! RCE Core - shared vocabulary of the control plane
//!
//! Identifiers, descriptor records, the request and envelope shapes, the
//! communication proxy contract, configuration and the unified error type.
//! Contains no registry state; the component crates own that.

#![forbid(unsafe_code)]

/// Unified error handling
pub mod errors;

/// User, tag, communication and message identifiers
pub mod identifiers;

/// Robot, container, node, parameter and interface descriptors
pub mod descriptors;

/// Request shape and command classification
pub mod request;

/// Message envelopes and ROS field mappings
pub mod messages;

/// Communication proxy contract
pub mod proxy;

/// Configuration loading and validation
pub mod config;

/// Clock abstraction for expiry decisions
pub mod time;

pub use config::{BalancerConfig, LoggingConfig, MessengerConfig, RceConfig};
pub use descriptors::{
    ContainerDescriptor, Descriptor, InterfaceDescriptor, InterfaceKind, NodeDescriptor,
    ParameterDescriptor, ParameterValue, RobotDescriptor,
};
pub use errors::{ConversionError, RceError, Result};
pub use identifiers::{CommId, EntityKey, MessageId, ReservationId, Tag, UserId};
pub use messages::{Envelope, EnvelopeKind, FieldMap, FieldValue, Payload};
pub use proxy::{CommProxy, Outbound, ProxyProvider, SharedProxy, SharedProxyProvider};
pub use request::{CommandClass, Request};
pub use time::{system_clock, Clock, SharedClock, SystemClock};
