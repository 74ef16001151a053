//! RCE Control - control factory and control plane
//!
//! [`ControlFactory`] hands out controls bound to one user and one comm id.
//! [`ControlPlane`] wires the balancer, the endpoint manager, the
//! serialization gateway and the messenger together and turns incoming
//! requests into control operations.

#![forbid(unsafe_code)]

mod controls;
mod factory;
mod plane;

/// Tracing subscriber setup
pub mod telemetry;

pub use controls::{
    ContainerControl, Control, EndpointControl, NodeControl, ParameterControl, RobotControl,
};
pub use factory::ControlFactory;
pub use plane::ControlPlane;
