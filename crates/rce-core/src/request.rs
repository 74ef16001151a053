//! Request shape consumed from the request layer

use crate::errors::{RceError, Result};
use crate::identifiers::UserId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Command as delivered by the request layer: `{user, type, args}`
///
/// The control plane routes on `kind` and decodes `args` positionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub user: UserId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

impl Request {
    pub fn new(user: impl Into<UserId>, kind: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            kind: kind.into(),
            args: Vec::new(),
        }
    }

    /// Append a positional argument
    pub fn with_arg(mut self, arg: impl Serialize) -> Result<Self> {
        self.args.push(serde_json::to_value(arg)?);
        Ok(self)
    }

    /// Decode the positional argument at `index`
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let value = self.args.get(index).ok_or_else(|| {
            RceError::serialization(format!(
                "request '{}' is missing argument {index}",
                self.kind
            ))
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            RceError::serialization(format!(
                "request '{}' argument {index}: {e}",
                self.kind
            ))
        })
    }

    /// Fail unless exactly `expected` arguments were supplied
    pub fn expect_arity(&self, expected: usize) -> Result<()> {
        if self.args.len() != expected {
            return Err(RceError::serialization(format!(
                "request '{}' takes {expected} arguments, got {}",
                self.kind,
                self.args.len()
            )));
        }
        Ok(())
    }
}

/// Structural classification of command payloads
///
/// Carries no data; used to group commands when routing and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandClass {
    /// Creates or destroys robots, containers, nodes or parameters
    Lifecycle,
    /// Manages a plain interface or its connections
    EndpointInterface,
    /// Manages a converter interface
    EndpointConverter,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::Tag;

    #[test]
    fn test_request_wire_shape() {
        let req: Request = serde_json::from_value(serde_json::json!({
            "user": "alice",
            "type": "DestroyContainer",
            "args": ["c1"]
        }))
        .unwrap();
        assert_eq!(req.kind, "DestroyContainer");
        assert_eq!(req.arg::<Tag>(0).unwrap(), Tag::new("c1"));
    }

    #[test]
    fn test_missing_argument() {
        let req = Request::new("alice", "RemoveNode").with_arg("c1").unwrap();
        assert!(matches!(
            req.arg::<String>(1),
            Err(RceError::Serialization { .. })
        ));
        assert!(req.expect_arity(2).is_err());
        assert!(req.expect_arity(1).is_ok());
    }
}
