//! RCE Testing Infrastructure
//!
//! Fixtures shared by the integration tests of every control plane crate.
//!
//! ```toml
//! [dev-dependencies]
//! rce-testkit = { path = "../rce-testkit" }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod clock;
pub mod fixtures;
pub mod network;
pub mod proxy;
pub mod strategies;

pub use clock::ManualClock;
pub use fixtures::*;
pub use network::RecordingNetwork;
pub use proxy::RecordingProxy;
