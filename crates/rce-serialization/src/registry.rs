//! Identifier-keyed decoder registry
//!
//! Maps frame identifiers to factory functions producing a [`ControlCommand`].
//! Built once at start; lookups never reflect on types at call time.

use crate::commands::*;
use crate::frame::{Frame, Serializable};
use rce_core::{RceError, Result};
use std::collections::HashMap;

/// Factory turning a frame body into a command
pub type DecodeFn = fn(&[u8]) -> Result<ControlCommand>;

/// Registry of command decoders
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: HashMap<&'static str, DecodeFn>,
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut identifiers: Vec<_> = self.decoders.keys().collect();
        identifiers.sort();
        f.debug_struct("DecoderRegistry")
            .field("identifiers", &identifiers)
            .finish()
    }
}

fn decode_as<T>(body: &[u8]) -> Result<ControlCommand>
where
    T: Serializable + Into<ControlCommand>,
{
    T::decode_body(body).map(Into::into)
}

impl DecoderRegistry {
    /// Registry without any decoders
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registry covering every [`ControlCommand`] variant
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register::<CreateContainer>();
        registry.register::<DestroyContainer>();
        registry.register::<CreateRobot>();
        registry.register::<DestroyRobot>();
        registry.register::<AddNode>();
        registry.register::<RemoveNode>();
        registry.register::<AddParameter>();
        registry.register::<RemoveParameter>();
        registry.register::<AddInterface>();
        registry.register::<RemoveInterface>();
        registry.register::<RegisterConnection>();
        registry.register::<UnregisterConnection>();
        registry
    }

    /// Register the decoder for `T` under its identifier
    pub fn register<T>(&mut self)
    where
        T: Serializable + Into<ControlCommand>,
    {
        self.decoders.insert(T::IDENTIFIER, decode_as::<T>);
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.decoders.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Decode a frame with the decoder registered for its identifier
    pub fn decode(&self, frame: &Frame) -> Result<ControlCommand> {
        let Some(decoder) = self.decoders.get(frame.identifier.as_str()) else {
            tracing::debug!(identifier = %frame.identifier, "No decoder registered");
            return Err(RceError::serialization(format!(
                "no decoder for '{}'",
                frame.identifier
            )));
        };
        decoder(&frame.body)
    }

    /// Decode raw transport bytes holding a frame
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<ControlCommand> {
        self.decode(&Frame::from_bytes(bytes)?)
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
