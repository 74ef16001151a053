//! RCE Serialization - identifier-keyed frames and ROS message conversion
//!
//! Commands cross the control plane boundary as [`Frame`]s whose identifier
//! selects a decoder from the [`DecoderRegistry`]. ROS messages are exchanged
//! with endpoints as field mappings produced by the [`ConverterRegistry`].

#![forbid(unsafe_code)]

/// Control commands and their identifiers
pub mod commands;

/// `Serializable` contract and frames
pub mod frame;

/// Gateway bundling both registries
pub mod gateway;

/// Identifier to decoder registry
pub mod registry;

/// ROS message schemas and converters
pub mod ros;

pub use commands::{ids, ControlCommand, COMMAND_IDENTIFIERS};
pub use frame::{Frame, Serializable};
pub use gateway::SerializationGateway;
pub use registry::{DecodeFn, DecoderRegistry};
pub use ros::{ConverterRegistry, RosConverter, RosMessage, RosValue};
