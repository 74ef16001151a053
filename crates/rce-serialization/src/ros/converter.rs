//! ROS message converters
//!
//! `encode` flattens a [`RosMessage`] into a [`FieldMap`]; `decode` rebuilds a
//! message of a named type from such a map. Conversion is schema driven; a
//! type may register a specialized [`RosConverter`] that wraps the schema
//! conversion with extra checks.

use super::message::{RosMessage, RosValue};
use super::schema::{builtin_schemas, FieldType, MessageSchema};
use rce_core::{ConversionError, FieldMap, FieldValue};
use std::collections::HashMap;
use std::sync::Arc;

type ConversionResult<T> = std::result::Result<T, ConversionError>;

/// Converter for one message type
pub trait RosConverter: Send + Sync {
    /// Message type this converter handles, e.g. `sensor_msgs/Image`
    fn message_type(&self) -> &str;

    /// Flatten a message into its field mapping
    fn encode(&self, msg: &RosMessage, registry: &ConverterRegistry) -> ConversionResult<FieldMap>;

    /// Rebuild a message from its field mapping
    fn decode(&self, data: &FieldMap, registry: &ConverterRegistry) -> ConversionResult<RosMessage>;
}

/// Image converter
///
/// Keeps pixel data as a raw byte stream and checks that its length matches
/// `step * height`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageConverter;

impl ImageConverter {
    pub const MESSAGE_TYPE: &'static str = "sensor_msgs/Image";

    fn check_layout(step: u64, height: u64, data_len: usize) -> ConversionResult<()> {
        let expected = step.saturating_mul(height);
        if expected != data_len as u64 {
            return Err(ConversionError::value(
                "data",
                format!("expected {expected} bytes (step * height), found {data_len}"),
            ));
        }
        Ok(())
    }
}

impl RosConverter for ImageConverter {
    fn message_type(&self) -> &str {
        Self::MESSAGE_TYPE
    }

    fn encode(&self, msg: &RosMessage, registry: &ConverterRegistry) -> ConversionResult<FieldMap> {
        let map = registry.encode_with_schema(msg)?;
        if let (Some(FieldValue::UInt(step)), Some(FieldValue::UInt(height)), Some(FieldValue::Bytes(data))) =
            (map.get("step"), map.get("height"), map.get("data"))
        {
            Self::check_layout(*step, *height, data.len())?;
        }
        Ok(map)
    }

    fn decode(&self, data: &FieldMap, registry: &ConverterRegistry) -> ConversionResult<RosMessage> {
        let msg = registry.decode_with_schema(Self::MESSAGE_TYPE, data)?;
        if let (Some(RosValue::UInt(step)), Some(RosValue::UInt(height)), Some(RosValue::Bytes(pixels))) =
            (msg.get("step"), msg.get("height"), msg.get("data"))
        {
            Self::check_layout(*step, *height, pixels.len())?;
        }
        Ok(msg)
    }
}

/// Schemas and specialized converters keyed by message type
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    schemas: HashMap<String, MessageSchema>,
    converters: HashMap<String, Arc<dyn RosConverter>>,
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("schemas", &self.schemas.len())
            .field("converters", &self.converters.len())
            .finish()
    }
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the builtin schemas and the image converter
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for schema in builtin_schemas() {
            registry.add_schema(schema);
        }
        registry.add_converter(Arc::new(ImageConverter));
        registry
    }

    /// Register or replace the schema of a message type
    pub fn add_schema(&mut self, schema: MessageSchema) {
        self.schemas.insert(schema.message_type.clone(), schema);
    }

    /// Register or replace the specialized converter of a message type
    pub fn add_converter(&mut self, converter: Arc<dyn RosConverter>) {
        self.converters
            .insert(converter.message_type().to_string(), converter);
    }

    pub fn schema(&self, message_type: &str) -> Option<&MessageSchema> {
        self.schemas.get(message_type)
    }

    pub fn supports(&self, message_type: &str) -> bool {
        self.schemas.contains_key(message_type)
    }

    /// Flatten a message, using its specialized converter if one is registered
    pub fn encode(&self, msg: &RosMessage) -> ConversionResult<FieldMap> {
        match self.converters.get(&msg.message_type) {
            Some(converter) => converter.encode(msg, self),
            None => self.encode_with_schema(msg),
        }
    }

    /// Rebuild a message of `message_type`, using its specialized converter if
    /// one is registered
    pub fn decode(&self, message_type: &str, data: &FieldMap) -> ConversionResult<RosMessage> {
        match self.converters.get(message_type) {
            Some(converter) => converter.decode(data, self),
            None => self.decode_with_schema(message_type, data),
        }
    }

    /// Schema-only encoding, bypassing specialized converters at the top level
    pub fn encode_with_schema(&self, msg: &RosMessage) -> ConversionResult<FieldMap> {
        let schema = self.require_schema(&msg.message_type)?;

        // Fields must follow schema order without repeats
        let mut next = 0;
        for (name, _) in &msg.fields {
            let Some(position) = schema.fields.iter().position(|spec| &spec.name == name) else {
                return Err(ConversionError::value(
                    name.as_str(),
                    format!("not a field of {}", schema.message_type),
                ));
            };
            if msg.fields.iter().filter(|(other, _)| other == name).count() > 1 {
                return Err(ConversionError::value(name.as_str(), "duplicate field"));
            }
            if position < next {
                return Err(ConversionError::value(
                    name.as_str(),
                    format!("out of {} field order", schema.message_type),
                ));
            }
            next = position + 1;
        }

        let mut map = FieldMap::new();
        for spec in &schema.fields {
            let value = msg
                .get(&spec.name)
                .ok_or_else(|| ConversionError::value(spec.name.as_str(), "missing field"))?;
            let encoded = self
                .encode_value(&spec.field_type, value)
                .map_err(|e| e.nested(&spec.name))?;
            map.insert(spec.name.clone(), encoded);
        }
        Ok(map)
    }

    /// Schema-only decoding, bypassing specialized converters at the top level
    pub fn decode_with_schema(
        &self,
        message_type: &str,
        data: &FieldMap,
    ) -> ConversionResult<RosMessage> {
        let schema = self.require_schema(message_type)?;

        for name in data.keys() {
            if schema.get(name).is_none() {
                return Err(ConversionError::value(
                    name.as_str(),
                    format!("not a field of {message_type}"),
                ));
            }
        }

        let mut msg = RosMessage::new(message_type);
        for spec in &schema.fields {
            let value = data
                .get(&spec.name)
                .ok_or_else(|| ConversionError::value(spec.name.as_str(), "missing field"))?;
            let decoded = self
                .decode_value(&spec.field_type, value)
                .map_err(|e| e.nested(&spec.name))?;
            msg.fields.push((spec.name.clone(), decoded));
        }
        Ok(msg)
    }

    fn require_schema(&self, message_type: &str) -> ConversionResult<&MessageSchema> {
        self.schemas.get(message_type).ok_or_else(|| {
            ConversionError::value(message_type, "unknown message type")
        })
    }

    fn encode_value(&self, field_type: &FieldType, value: &RosValue) -> ConversionResult<FieldValue> {
        let encoded = match (field_type, value) {
            (FieldType::Bool, RosValue::Bool(b)) => FieldValue::Bool(*b),
            (ft, RosValue::Int(i)) if ft.integer_bounds().is_some() && !ft.is_unsigned() => {
                check_bounds(ft, *i as i128)?;
                FieldValue::Int(*i)
            }
            (ft, RosValue::UInt(u)) if ft.is_unsigned() => {
                check_bounds(ft, *u as i128)?;
                FieldValue::UInt(*u)
            }
            (FieldType::Float32 | FieldType::Float64, RosValue::Float(f)) => FieldValue::Float(*f),
            (FieldType::String, RosValue::String(s)) => FieldValue::String(s.clone()),
            (FieldType::Bytes, RosValue::Bytes(bytes)) => FieldValue::Bytes(bytes.clone()),
            (FieldType::Time, RosValue::Time { secs, nsecs }) => {
                check_nsecs(*nsecs)?;
                let mut map = FieldMap::new();
                map.insert("secs".into(), FieldValue::UInt(u64::from(*secs)));
                map.insert("nsecs".into(), FieldValue::UInt(u64::from(*nsecs)));
                FieldValue::Map(map)
            }
            (FieldType::Array(inner), RosValue::Array(items)) => FieldValue::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        self.encode_value(inner, item)
                            .map_err(|e| e.nested(&i.to_string()))
                    })
                    .collect::<ConversionResult<_>>()?,
            ),
            (FieldType::Message(expected), RosValue::Message(nested)) => {
                if &nested.message_type != expected {
                    return Err(ConversionError::type_mismatch(
                        "",
                        expected.as_str(),
                        nested.message_type.as_str(),
                    ));
                }
                FieldValue::Map(self.encode(nested)?)
            }
            (ft, other) => {
                return Err(ConversionError::type_mismatch(
                    "",
                    ft.to_string(),
                    ros_shape(other),
                ))
            }
        };
        Ok(encoded)
    }

    fn decode_value(&self, field_type: &FieldType, value: &FieldValue) -> ConversionResult<RosValue> {
        let decoded = match (field_type, value) {
            (FieldType::Bool, FieldValue::Bool(b)) => RosValue::Bool(*b),
            (ft, FieldValue::Int(_) | FieldValue::UInt(_)) if ft.integer_bounds().is_some() => {
                let raw = integer_of(value).unwrap_or_default();
                check_bounds(ft, raw)?;
                if ft.is_unsigned() {
                    RosValue::UInt(raw as u64)
                } else {
                    RosValue::Int(raw as i64)
                }
            }
            (FieldType::Float32 | FieldType::Float64, FieldValue::Float(f)) => RosValue::Float(*f),
            (FieldType::Float32 | FieldType::Float64, FieldValue::Int(i)) => RosValue::Float(*i as f64),
            (FieldType::Float32 | FieldType::Float64, FieldValue::UInt(u)) => RosValue::Float(*u as f64),
            (FieldType::String, FieldValue::String(s)) => RosValue::String(s.clone()),
            (FieldType::Bytes, FieldValue::Bytes(bytes)) => RosValue::Bytes(bytes.clone()),
            (FieldType::Time, FieldValue::Map(map)) => {
                let secs = time_component(map, "secs")?;
                let nsecs = time_component(map, "nsecs")?;
                if map.len() != 2 {
                    return Err(ConversionError::value("", "time takes only secs and nsecs"));
                }
                check_nsecs(nsecs)?;
                RosValue::Time { secs, nsecs }
            }
            (FieldType::Array(inner), FieldValue::Array(items)) => RosValue::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        self.decode_value(inner, item)
                            .map_err(|e| e.nested(&i.to_string()))
                    })
                    .collect::<ConversionResult<_>>()?,
            ),
            (FieldType::Message(nested_type), FieldValue::Map(map)) => {
                RosValue::Message(self.decode(nested_type, map)?)
            }
            (ft, other) => {
                return Err(ConversionError::type_mismatch(
                    "",
                    ft.to_string(),
                    other.shape(),
                ))
            }
        };
        Ok(decoded)
    }
}

fn integer_of(value: &FieldValue) -> Option<i128> {
    match value {
        FieldValue::Int(i) => Some(i128::from(*i)),
        FieldValue::UInt(u) => Some(i128::from(*u)),
        _ => None,
    }
}

fn check_bounds(field_type: &FieldType, raw: i128) -> ConversionResult<()> {
    if let Some((min, max)) = field_type.integer_bounds() {
        if raw < min || raw > max {
            return Err(ConversionError::value(
                "",
                format!("{raw} out of range for {field_type}"),
            ));
        }
    }
    Ok(())
}

fn check_nsecs(nsecs: u32) -> ConversionResult<()> {
    if nsecs >= 1_000_000_000 {
        return Err(ConversionError::value(
            "nsecs",
            format!("{nsecs} is not below one second"),
        ));
    }
    Ok(())
}

fn time_component(map: &FieldMap, name: &str) -> ConversionResult<u32> {
    let raw = match map.get(name) {
        Some(FieldValue::UInt(u)) => *u as i128,
        Some(FieldValue::Int(i)) => *i as i128,
        Some(other) => return Err(ConversionError::type_mismatch(name, "uint32", other.shape())),
        None => return Err(ConversionError::value(name, "missing field")),
    };
    u32::try_from(raw).map_err(|_| ConversionError::value(name, format!("{raw} out of range for uint32")))
}

fn ros_shape(value: &RosValue) -> &'static str {
    match value {
        RosValue::Bool(_) => "bool",
        RosValue::Int(_) => "int",
        RosValue::UInt(_) => "uint",
        RosValue::Float(_) => "float",
        RosValue::String(_) => "string",
        RosValue::Bytes(_) => "bytes",
        RosValue::Time { .. } => "time",
        RosValue::Array(_) => "array",
        RosValue::Message(_) => "message",
    }
}
