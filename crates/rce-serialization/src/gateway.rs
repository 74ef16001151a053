//! Serialization gateway
//!
//! Bundles the command decoder registry and the ROS converter registry so the
//! control plane hands a single shared object to its components.

use crate::commands::ControlCommand;
use crate::registry::DecoderRegistry;
use crate::ros::{ConverterRegistry, RosMessage};
use rce_core::{Payload, RceError, Result};

#[derive(Debug, Clone)]
pub struct SerializationGateway {
    decoders: DecoderRegistry,
    converters: ConverterRegistry,
}

impl SerializationGateway {
    pub fn new(decoders: DecoderRegistry, converters: ConverterRegistry) -> Self {
        Self {
            decoders,
            converters,
        }
    }

    /// Gateway with every command decoder and the builtin message schemas
    pub fn standard() -> Self {
        Self::new(DecoderRegistry::standard(), ConverterRegistry::standard())
    }

    pub fn decoders(&self) -> &DecoderRegistry {
        &self.decoders
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    pub fn converters_mut(&mut self) -> &mut ConverterRegistry {
        &mut self.converters
    }

    /// Decode a command frame received from the transport
    pub fn decode_command(&self, bytes: &[u8]) -> Result<ControlCommand> {
        self.decoders.decode_bytes(bytes)
    }

    /// Flatten a message into an envelope payload
    pub fn encode_message(&self, msg: &RosMessage) -> Result<Payload> {
        Ok(Payload::Fields(self.converters.encode(msg)?))
    }

    /// Rebuild a message of `message_type` from an envelope payload
    pub fn decode_message(&self, message_type: &str, payload: &Payload) -> Result<RosMessage> {
        match payload {
            Payload::Fields(fields) => Ok(self.converters.decode(message_type, fields)?),
            Payload::Raw(_) => Err(RceError::serialization(format!(
                "raw payload cannot be decoded as {message_type}"
            ))),
        }
    }
}

impl Default for SerializationGateway {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ros::RosValue;

    #[test]
    fn test_message_payload_round_trip() {
        let gateway = SerializationGateway::standard();
        let msg = RosMessage::new("std_msgs/String").with("data", RosValue::String("hello".into()));

        let payload = gateway.encode_message(&msg).unwrap();
        assert_eq!(gateway.decode_message("std_msgs/String", &payload).unwrap(), msg);
    }

    #[test]
    fn test_raw_payload_not_decodable() {
        let gateway = SerializationGateway::standard();
        let err = gateway
            .decode_message("std_msgs/String", &Payload::Raw(vec![1, 2]))
            .unwrap_err();
        assert!(matches!(err, RceError::Serialization { .. }));
    }

    #[test]
    fn test_conversion_failure_wrapped() {
        let gateway = SerializationGateway::standard();
        let msg = RosMessage::new("std_msgs/Int32").with("data", RosValue::String("x".into()));
        assert!(matches!(
            gateway.encode_message(&msg),
            Err(RceError::Conversion(_))
        ));
    }
}
