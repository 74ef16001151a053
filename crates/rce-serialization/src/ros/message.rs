//! Structured ROS message values

use serde::{Deserialize, Serialize};

/// Typed value of a message field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RosValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    Time { secs: u32, nsecs: u32 },
    Array(Vec<RosValue>),
    Message(RosMessage),
}

/// Message instance with fields in schema declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosMessage {
    pub message_type: String,
    pub fields: Vec<(String, RosValue)>,
}

impl RosMessage {
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field
    pub fn with(mut self, name: impl Into<String>, value: RosValue) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&RosValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}
