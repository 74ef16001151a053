//! Machine records

use rce_core::{CommId, EntityKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Registration input for a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSpec {
    pub ip: String,
    /// Maximum number of containers hosted at once
    pub capacity: usize,
    /// Comm id of the machine's container node
    pub comm_id: CommId,
}

impl MachineSpec {
    pub fn new(ip: impl Into<String>, capacity: usize, comm_id: impl Into<CommId>) -> Self {
        Self {
            ip: ip.into(),
            capacity,
            comm_id: comm_id.into(),
        }
    }
}

/// Point-in-time view of a machine's load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub ip: String,
    pub comm_id: CommId,
    pub capacity: usize,
    pub hosted: usize,
    pub reserved: usize,
}

impl MachineSnapshot {
    /// Slots taken by hosted containers and pending reservations
    pub fn load(&self) -> usize {
        self.hosted + self.reserved
    }
}

#[derive(Debug)]
pub(crate) struct Machine {
    pub(crate) comm_id: CommId,
    pub(crate) capacity: usize,
    pub(crate) hosted: HashSet<EntityKey>,
    pub(crate) reserved: usize,
}

impl Machine {
    pub(crate) fn new(spec: &MachineSpec) -> Self {
        Self {
            comm_id: spec.comm_id.clone(),
            capacity: spec.capacity,
            hosted: HashSet::new(),
            reserved: 0,
        }
    }

    pub(crate) fn load(&self) -> usize {
        self.hosted.len() + self.reserved
    }

    pub(crate) fn has_room(&self) -> bool {
        self.load() < self.capacity
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.hosted.is_empty() && self.reserved == 0
    }

    /// `self.load / self.capacity < other.load / other.capacity`, compared
    /// exactly by cross-multiplying
    pub(crate) fn less_loaded_than(&self, other: &Machine) -> bool {
        (self.load() as u128) * (other.capacity as u128)
            < (other.load() as u128) * (self.capacity as u128)
    }

    pub(crate) fn snapshot(&self, ip: &str) -> MachineSnapshot {
        MachineSnapshot {
            ip: ip.to_string(),
            comm_id: self.comm_id.clone(),
            capacity: self.capacity,
            hosted: self.hosted.len(),
            reserved: self.reserved,
        }
    }
}
