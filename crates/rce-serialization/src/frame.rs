//! Serializable contract and transport-neutral frames
//!
//! A [`Frame`] pairs the body of a serialized value with the identifier of its
//! type so the receiving side can pick the right decoder. Bodies are CBOR.

use rce_core::{RceError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Types that cross the control plane boundary as frames
///
/// `from_frame(&to_frame(x)) == x` holds for every valid `x`.
pub trait Serializable: Serialize + DeserializeOwned {
    /// Stable identifier selecting the decoder on the receiving side
    const IDENTIFIER: &'static str;

    /// Encode into a frame tagged with [`Self::IDENTIFIER`]
    fn to_frame(&self) -> Result<Frame> {
        Ok(Frame {
            identifier: Self::IDENTIFIER.to_string(),
            body: serde_cbor::to_vec(self)?,
        })
    }

    /// Decode a new value from a frame carrying [`Self::IDENTIFIER`]
    fn from_frame(frame: &Frame) -> Result<Self> {
        if frame.identifier != Self::IDENTIFIER {
            return Err(RceError::serialization(format!(
                "expected '{}' frame, found '{}'",
                Self::IDENTIFIER,
                frame.identifier
            )));
        }
        Self::decode_body(&frame.body)
    }

    /// Decode a frame body without checking the identifier
    fn decode_body(body: &[u8]) -> Result<Self> {
        serde_cbor::from_slice(body).map_err(|e| {
            RceError::serialization(format!("corrupt '{}' body: {e}", Self::IDENTIFIER))
        })
    }
}

/// Identifier-tagged serialized value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub identifier: String,
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
}

impl Frame {
    /// Encode the whole frame for the transport
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_cbor::to_vec(self)?)
    }

    /// Decode a frame received from the transport
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_cbor::from_slice(bytes)
            .map_err(|e| RceError::serialization(format!("corrupt frame: {e}")))
    }
}
