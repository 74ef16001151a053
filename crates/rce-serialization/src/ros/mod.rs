//! ROS message conversion
//!
//! Structured messages ([`RosMessage`]) are exchanged with endpoints as flat
//! field mappings ([`rce_core::FieldMap`]). Binary payloads stay raw byte
//! streams on both sides.

pub mod converter;
pub mod message;
pub mod schema;

pub use converter::{ConverterRegistry, ImageConverter, RosConverter};
pub use message::{RosMessage, RosValue};
pub use schema::{builtin_schemas, FieldSpec, FieldType, MessageSchema};
