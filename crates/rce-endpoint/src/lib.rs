//! RCE Endpoint - lifecycle of robots, containers and their interfaces
//!
//! [`EndpointManager`] owns the state machines of every endpoint
//! (`creating → active → removed`), the interfaces each exposes, the remote
//! connections registered on those interfaces, and container-scoped nodes
//! and parameters. Destroying an endpoint cascades through all of them.

#![forbid(unsafe_code)]

mod endpoint;
mod manager;

pub use endpoint::{
    Connection, Endpoint, EndpointKind, InterfaceSnapshot, LifecycleState, TeardownReport,
};
pub use manager::{Creation, EndpointManager, Teardown};
