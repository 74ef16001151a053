//! Message envelopes routed between interfaces
//!
//! Logical shape only; byte encoding belongs to the transport.

use crate::identifiers::{CommId, MessageId, Tag, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Flat field-name to value mapping of a ROS message
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Value of a single field in a [`FieldMap`]
///
/// Binary payloads stay raw byte streams; they are never re-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    Array(Vec<FieldValue>),
    Map(FieldMap),
}

impl FieldValue {
    /// Shape name used in conversion errors
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
        }
    }
}

/// Message body as carried in an [`Envelope`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// Serialized ROS message, forwarded untouched
    Raw(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Field mapping produced by a converter interface
    Fields(FieldMap),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Self::Raw(bytes) => bytes.len(),
            Self::Fields(fields) => fields.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Role of an envelope in a request/response exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// Topic message, no reply expected
    Message,
    /// Service request, a response may follow with the same message id
    Request,
    /// Service response referencing an earlier request's message id
    Response,
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message => f.write_str("message"),
            Self::Request => f.write_str("request"),
            Self::Response => f.write_str("response"),
        }
    }
}

/// Message routed from a sending interface to a destination interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Owner of the destination interface
    pub user: UserId,
    /// Interface tag at the destination
    pub tag: Tag,
    /// Communication identifier of the destination
    pub comm_id: CommId,
    /// Communication identifier of the sender
    pub sender_comm_id: CommId,
    /// Interface tag of the sender
    pub sender_tag: Tag,
    /// ROS message or service type of the payload
    pub message_type: String,
    pub kind: EnvelopeKind,
    pub msg_id: MessageId,
    pub payload: Payload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_shapes() {
        assert_eq!(FieldValue::Bytes(vec![1]).shape(), "bytes");
        assert_eq!(FieldValue::Map(FieldMap::new()).shape(), "map");
    }

    #[test]
    fn test_payload_len() {
        assert_eq!(Payload::Raw(vec![1, 2, 3]).len(), 3);
        assert!(Payload::Fields(FieldMap::new()).is_empty());
    }
}
