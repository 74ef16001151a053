//! Message schemas
//!
//! A schema lists the fields of a ROS message type in declaration order
//! together with the shape each field must have.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of a single field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    /// `uint8[]` payloads carried as a raw byte stream
    Bytes,
    /// `time`: seconds and nanoseconds
    Time,
    Array(Box<FieldType>),
    /// Nested message of the named type
    Message(std::string::String),
}

impl FieldType {
    /// Inclusive range accepted by integer fields
    pub fn integer_bounds(&self) -> Option<(i128, i128)> {
        let bounds = match self {
            Self::Int8 => (i8::MIN as i128, i8::MAX as i128),
            Self::Int16 => (i16::MIN as i128, i16::MAX as i128),
            Self::Int32 => (i32::MIN as i128, i32::MAX as i128),
            Self::Int64 => (i64::MIN as i128, i64::MAX as i128),
            Self::UInt8 => (0, u8::MAX as i128),
            Self::UInt16 => (0, u16::MAX as i128),
            Self::UInt32 => (0, u32::MAX as i128),
            Self::UInt64 => (0, u64::MAX as i128),
            _ => return None,
        };
        Some(bounds)
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int8 => f.write_str("int8"),
            Self::Int16 => f.write_str("int16"),
            Self::Int32 => f.write_str("int32"),
            Self::Int64 => f.write_str("int64"),
            Self::UInt8 => f.write_str("uint8"),
            Self::UInt16 => f.write_str("uint16"),
            Self::UInt32 => f.write_str("uint32"),
            Self::UInt64 => f.write_str("uint64"),
            Self::Float32 => f.write_str("float32"),
            Self::Float64 => f.write_str("float64"),
            Self::String => f.write_str("string"),
            Self::Bytes => f.write_str("uint8[]"),
            Self::Time => f.write_str("time"),
            Self::Array(inner) => write!(f, "{inner}[]"),
            Self::Message(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Field layout of one message type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSchema {
    pub message_type: String,
    pub fields: Vec<FieldSpec>,
}

impl MessageSchema {
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec::new(name, field_type));
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }
}

/// Schemas for the message types every deployment can convert
pub fn builtin_schemas() -> Vec<MessageSchema> {
    vec![
        MessageSchema::new("std_msgs/Bool").field("data", FieldType::Bool),
        MessageSchema::new("std_msgs/Int32").field("data", FieldType::Int32),
        MessageSchema::new("std_msgs/Int64").field("data", FieldType::Int64),
        MessageSchema::new("std_msgs/Float64").field("data", FieldType::Float64),
        MessageSchema::new("std_msgs/String").field("data", FieldType::String),
        MessageSchema::new("std_msgs/Header")
            .field("seq", FieldType::UInt32)
            .field("stamp", FieldType::Time)
            .field("frame_id", FieldType::String),
        MessageSchema::new("sensor_msgs/Image")
            .field("header", FieldType::Message("std_msgs/Header".into()))
            .field("height", FieldType::UInt32)
            .field("width", FieldType::UInt32)
            .field("encoding", FieldType::String)
            .field("is_bigendian", FieldType::UInt8)
            .field("step", FieldType::UInt32)
            .field("data", FieldType::Bytes),
        MessageSchema::new("geometry_msgs/Vector3")
            .field("x", FieldType::Float64)
            .field("y", FieldType::Float64)
            .field("z", FieldType::Float64),
        MessageSchema::new("geometry_msgs/Twist")
            .field("linear", FieldType::Message("geometry_msgs/Vector3".into()))
            .field("angular", FieldType::Message("geometry_msgs/Vector3".into())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_display() {
        assert_eq!(FieldType::Array(Box::new(FieldType::Float32)).to_string(), "float32[]");
        assert_eq!(FieldType::Message("std_msgs/Header".into()).to_string(), "std_msgs/Header");
    }

    #[test]
    fn test_integer_bounds() {
        assert_eq!(FieldType::UInt8.integer_bounds(), Some((0, 255)));
        assert_eq!(FieldType::Int8.integer_bounds(), Some((-128, 127)));
        assert_eq!(FieldType::String.integer_bounds(), None);
    }

    #[test]
    fn test_builtin_schema_lookup() {
        let schemas = builtin_schemas();
        let image = schemas
            .iter()
            .find(|s| s.message_type == "sensor_msgs/Image")
            .unwrap();
        assert_eq!(image.get("data").unwrap().field_type, FieldType::Bytes);
        assert!(image.get("pixels").is_none());
    }
}
