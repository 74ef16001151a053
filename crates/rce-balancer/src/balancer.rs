//! Least-loaded placement with reservations
//!
//! ## Lock Usage
//!
//! One `parking_lot::Mutex` guards the machine table, the pending
//! reservations and the container index together, so a placement decision
//! and its reservation are a single atomic step. The lock is never held
//! across `.await`.

use crate::machine::{Machine, MachineSnapshot, MachineSpec};
use indexmap::IndexMap;
use parking_lot::Mutex;
use rce_core::{
    system_clock, BalancerConfig, CommId, EntityKey, RceError, ReservationId, Result, SharedClock,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Outcome of a placement query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Slot held until [`LoadBalancer::commit`] or [`LoadBalancer::release`]
    pub reservation: ReservationId,
    pub ip: String,
    /// Comm id of the chosen machine's container node
    pub comm_id: CommId,
}

#[derive(Debug)]
struct PendingReservation {
    ip: String,
    created_at: Instant,
}

#[derive(Debug, Default)]
struct BalancerState {
    /// Registration order is the placement tie-break
    machines: IndexMap<String, Machine>,
    reservations: HashMap<ReservationId, PendingReservation>,
    /// Hosting machine of every committed container
    containers: HashMap<EntityKey, String>,
}

impl BalancerState {
    fn release_reservation(&mut self, reservation: &ReservationId) -> Option<String> {
        let pending = self.reservations.remove(reservation)?;
        if let Some(machine) = self.machines.get_mut(&pending.ip) {
            machine.reserved = machine.reserved.saturating_sub(1);
        }
        Some(pending.ip)
    }
}

/// Machine registry answering "where should the next container go"
pub struct LoadBalancer {
    state: Mutex<BalancerState>,
    clock: SharedClock,
    reservation_timeout: Duration,
}

impl std::fmt::Debug for LoadBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LoadBalancer")
            .field("machines", &state.machines.len())
            .field("reservations", &state.reservations.len())
            .field("containers", &state.containers.len())
            .finish()
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new(&BalancerConfig::default(), system_clock())
    }
}

impl LoadBalancer {
    pub fn new(config: &BalancerConfig, clock: SharedClock) -> Self {
        Self {
            state: Mutex::new(BalancerState::default()),
            clock,
            reservation_timeout: config.reservation_timeout(),
        }
    }

    /// Add a machine able to host containers
    pub fn register_machine(&self, spec: MachineSpec) -> Result<()> {
        if spec.capacity == 0 {
            return Err(RceError::invalid_config(format!(
                "machine {} registered with capacity 0",
                spec.ip
            )));
        }

        let mut state = self.state.lock();
        if state.machines.contains_key(&spec.ip) {
            return Err(RceError::duplicate_machine(spec.ip));
        }
        state.machines.insert(spec.ip.clone(), Machine::new(&spec));
        drop(state);

        tracing::info!(
            ip = %spec.ip,
            capacity = spec.capacity,
            comm_id = %spec.comm_id,
            "Machine registered"
        );
        Ok(())
    }

    /// Remove a machine that hosts nothing and holds no reservations
    pub fn unregister_machine(&self, ip: &str) -> Result<()> {
        let mut state = self.state.lock();
        let machine = state
            .machines
            .get(ip)
            .ok_or_else(|| RceError::unknown_machine(ip))?;

        if !machine.is_idle() {
            let err = RceError::MachineBusy {
                ip: ip.to_string(),
                hosted: machine.hosted.len(),
                reserved: machine.reserved,
            };
            drop(state);
            tracing::warn!(ip = %ip, error = %err, "Machine unregistration rejected");
            return Err(err);
        }

        state.machines.shift_remove(ip);
        drop(state);

        tracing::info!(ip = %ip, "Machine unregistered");
        Ok(())
    }

    /// Pick the least-loaded machine and reserve one of its slots
    ///
    /// Load is `(hosted + reserved) / capacity`; ties go to the machine
    /// registered first.
    pub fn get_next_container_location(&self) -> Result<Placement> {
        let mut state = self.state.lock();

        let mut chosen: Option<(&String, &Machine)> = None;
        for (ip, machine) in state.machines.iter().filter(|(_, m)| m.has_room()) {
            match chosen {
                Some((_, best)) if !machine.less_loaded_than(best) => {}
                _ => chosen = Some((ip, machine)),
            }
        }
        let Some((ip, _)) = chosen else {
            tracing::warn!("No machine available for placement");
            return Err(RceError::NoMachineAvailable);
        };
        let ip = ip.clone();

        let machine = state
            .machines
            .get_mut(&ip)
            .ok_or_else(|| RceError::internal("chosen machine vanished"))?;
        machine.reserved += 1;
        let comm_id = machine.comm_id.clone();

        let reservation = ReservationId::new();
        state.reservations.insert(
            reservation,
            PendingReservation {
                ip: ip.clone(),
                created_at: self.clock.now(),
            },
        );
        drop(state);

        tracing::debug!(ip = %ip, reservation = %reservation, "Placement slot reserved");
        Ok(Placement {
            reservation,
            ip,
            comm_id,
        })
    }

    /// Turn a reservation into a hosted container
    pub fn commit(&self, reservation: ReservationId, container: EntityKey) -> Result<()> {
        let mut state = self.state.lock();

        let ip = match state.reservations.get(&reservation) {
            Some(pending) => pending.ip.clone(),
            None => return Err(RceError::unknown_reservation(reservation)),
        };
        if state.containers.contains_key(&container) {
            return Err(RceError::duplicate_entity("container", &container));
        }

        state.reservations.remove(&reservation);
        let machine = state
            .machines
            .get_mut(&ip)
            .ok_or_else(|| RceError::unknown_machine(&ip))?;
        machine.reserved = machine.reserved.saturating_sub(1);
        machine.hosted.insert(container.clone());
        state.containers.insert(container.clone(), ip.clone());
        drop(state);

        tracing::debug!(ip = %ip, container = %container, "Reservation committed");
        Ok(())
    }

    /// Drop a pending reservation; no-op if it is not pending
    pub fn release(&self, reservation: ReservationId) {
        let released = self.state.lock().release_reservation(&reservation);
        if let Some(ip) = released {
            tracing::debug!(ip = %ip, reservation = %reservation, "Reservation released");
        }
    }

    /// Free the slot of a destroyed container; no-op if it is not hosted
    pub fn release_container(&self, container: &EntityKey) {
        let mut state = self.state.lock();
        let Some(ip) = state.containers.remove(container) else {
            return;
        };
        if let Some(machine) = state.machines.get_mut(&ip) {
            machine.hosted.remove(container);
        }
        drop(state);

        tracing::debug!(ip = %ip, container = %container, "Container slot freed");
    }

    /// Release reservations older than the reservation timeout
    pub fn expire_reservations(&self, now: Instant) -> Vec<ReservationId> {
        let mut state = self.state.lock();
        let expired: Vec<ReservationId> = state
            .reservations
            .iter()
            .filter(|(_, pending)| {
                now.saturating_duration_since(pending.created_at) >= self.reservation_timeout
            })
            .map(|(id, _)| *id)
            .collect();

        for reservation in &expired {
            if let Some(ip) = state.release_reservation(reservation) {
                tracing::warn!(ip = %ip, reservation = %reservation, "Reservation expired");
            }
        }
        expired
    }

    /// [`Self::expire_reservations`] at the current clock reading
    pub fn expire_stale_reservations(&self) -> Vec<ReservationId> {
        self.expire_reservations(self.clock.now())
    }

    /// Machine hosting a committed container
    pub fn machine_of(&self, container: &EntityKey) -> Option<String> {
        self.state.lock().containers.get(container).cloned()
    }

    /// Comm id of the container node hosting a committed container
    pub fn host_comm_id(&self, container: &EntityKey) -> Option<CommId> {
        let state = self.state.lock();
        let ip = state.containers.get(container)?;
        state.machines.get(ip).map(|machine| machine.comm_id.clone())
    }

    /// Whether a registered machine is reached through `comm_id`
    pub fn serves_comm_id(&self, comm_id: &CommId) -> bool {
        self.state
            .lock()
            .machines
            .values()
            .any(|machine| &machine.comm_id == comm_id)
    }

    /// Load of every machine in registration order
    pub fn machines(&self) -> Vec<MachineSnapshot> {
        self.state
            .lock()
            .machines
            .iter()
            .map(|(ip, machine)| machine.snapshot(ip))
            .collect()
    }

    pub fn pending_reservations(&self) -> usize {
        self.state.lock().reservations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balancer() -> LoadBalancer {
        LoadBalancer::default()
    }

    #[test]
    fn test_duplicate_and_zero_capacity_rejected() {
        let lb = balancer();
        lb.register_machine(MachineSpec::new("10.0.0.1", 2, "m1")).unwrap();
        assert!(matches!(
            lb.register_machine(MachineSpec::new("10.0.0.1", 4, "m1b")),
            Err(RceError::DuplicateMachine { .. })
        ));
        assert!(matches!(
            lb.register_machine(MachineSpec::new("10.0.0.2", 0, "m2")),
            Err(RceError::InvalidConfiguration { .. })
        ));
        assert_eq!(lb.machines().len(), 1);
    }

    #[test]
    fn test_empty_registry_has_no_placement() {
        assert_eq!(
            balancer().get_next_container_location(),
            Err(RceError::NoMachineAvailable)
        );
    }

    #[test]
    fn test_tie_goes_to_first_registered() {
        let lb = balancer();
        lb.register_machine(MachineSpec::new("10.0.0.1", 2, "m1")).unwrap();
        lb.register_machine(MachineSpec::new("10.0.0.2", 2, "m2")).unwrap();

        let first = lb.get_next_container_location().unwrap();
        let second = lb.get_next_container_location().unwrap();
        assert_eq!(first.comm_id, CommId::new("m1"));
        assert_eq!(second.comm_id, CommId::new("m2"));
    }

    #[test]
    fn test_full_machines_are_skipped() {
        let lb = balancer();
        lb.register_machine(MachineSpec::new("10.0.0.1", 1, "m1")).unwrap();
        let placement = lb.get_next_container_location().unwrap();
        assert_eq!(
            lb.get_next_container_location(),
            Err(RceError::NoMachineAvailable)
        );

        lb.release(placement.reservation);
        assert!(lb.get_next_container_location().is_ok());
    }

    #[test]
    fn test_commit_moves_reservation_to_hosted() {
        let lb = balancer();
        lb.register_machine(MachineSpec::new("10.0.0.1", 2, "m1")).unwrap();
        let placement = lb.get_next_container_location().unwrap();
        let key = EntityKey::new("alice", "c1");

        lb.commit(placement.reservation, key.clone()).unwrap();
        let snapshot = &lb.machines()[0];
        assert_eq!((snapshot.hosted, snapshot.reserved), (1, 0));
        assert_eq!(lb.machine_of(&key).as_deref(), Some("10.0.0.1"));
        assert_eq!(lb.host_comm_id(&key), Some(CommId::new("m1")));
        assert!(lb.serves_comm_id(&CommId::new("m1")));
        assert!(!lb.serves_comm_id(&CommId::new("m2")));

        assert!(matches!(
            lb.commit(placement.reservation, EntityKey::new("alice", "c2")),
            Err(RceError::UnknownReservation { .. })
        ));
    }

    #[test]
    fn test_busy_machine_not_unregistered() {
        let lb = balancer();
        lb.register_machine(MachineSpec::new("10.0.0.1", 2, "m1")).unwrap();
        let placement = lb.get_next_container_location().unwrap();
        lb.commit(placement.reservation, EntityKey::new("alice", "c1"))
            .unwrap();

        let before = lb.machines();
        assert!(matches!(
            lb.unregister_machine("10.0.0.1"),
            Err(RceError::MachineBusy { hosted: 1, .. })
        ));
        assert_eq!(lb.machines(), before);

        lb.release_container(&EntityKey::new("alice", "c1"));
        lb.unregister_machine("10.0.0.1").unwrap();
        assert!(lb.machines().is_empty());
    }

    #[test]
    fn test_unknown_machine() {
        assert!(matches!(
            balancer().unregister_machine("10.9.9.9"),
            Err(RceError::UnknownMachine { .. })
        ));
    }
}
