//! RCE Balancer - container placement
//!
//! Tracks the machines able to host containers and decides where the next
//! container goes. Placement is reserve-then-commit: a slot is held from the
//! placement query until the caller reports success or failure.

#![forbid(unsafe_code)]

mod balancer;
mod machine;

pub use balancer::{LoadBalancer, Placement};
pub use machine::{MachineSnapshot, MachineSpec};
