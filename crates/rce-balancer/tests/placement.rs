//! Placement behavior under load, reservations and expiry

use proptest::prelude::*;
use rce_balancer::{LoadBalancer, MachineSpec};
use rce_core::{BalancerConfig, EntityKey, RceError};
use rce_testkit::strategies::{arb_capacities, arb_uniform_cluster};
use rce_testkit::ManualClock;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

fn cluster(capacities: &[usize]) -> LoadBalancer {
    let lb = LoadBalancer::default();
    for (i, capacity) in capacities.iter().enumerate() {
        lb.register_machine(MachineSpec::new(format!("10.0.0.{i}"), *capacity, format!("m{i}")))
            .unwrap();
    }
    lb
}

fn place_and_commit(lb: &LoadBalancer, n: usize) -> HashMap<String, usize> {
    let mut per_machine = HashMap::new();
    for i in 0..n {
        let placement = lb.get_next_container_location().unwrap();
        lb.commit(placement.reservation, EntityKey::new("alice", format!("c{i}")))
            .unwrap();
        *per_machine.entry(placement.ip).or_insert(0) += 1;
    }
    per_machine
}

#[test]
fn least_loaded_ratio_wins_over_absolute_count() {
    let lb = cluster(&[2, 10]);
    // The small machine is at 1/2 after one container; the big one wins until 5/10
    let per_machine = place_and_commit(&lb, 6);
    assert_eq!(per_machine.get("10.0.0.0"), Some(&1));
    assert_eq!(per_machine.get("10.0.0.1"), Some(&5));
}

#[test]
fn release_frees_capacity_for_next_placement() {
    let lb = cluster(&[1]);
    let placement = lb.get_next_container_location().unwrap();
    assert_eq!(lb.get_next_container_location(), Err(RceError::NoMachineAvailable));

    lb.release(placement.reservation);
    lb.release(placement.reservation);
    let again = lb.get_next_container_location().unwrap();
    assert_eq!(again.ip, "10.0.0.0");
}

#[test]
fn destroyed_container_frees_its_slot() {
    let lb = cluster(&[1]);
    let key = EntityKey::new("bob", "c1");
    let placement = lb.get_next_container_location().unwrap();
    lb.commit(placement.reservation, key.clone()).unwrap();
    assert!(lb.get_next_container_location().is_err());

    lb.release_container(&key);
    lb.release_container(&key);
    assert!(lb.get_next_container_location().is_ok());
}

#[test]
fn stale_reservations_expire() {
    let clock = ManualClock::shared();
    let config = BalancerConfig {
        reservation_timeout_ms: 1_000,
    };
    let lb = LoadBalancer::new(&config, clock.clone());
    lb.register_machine(MachineSpec::new("10.0.0.1", 1, "m1")).unwrap();

    let placement = lb.get_next_container_location().unwrap();
    clock.advance_ms(999);
    assert!(lb.expire_stale_reservations().is_empty());

    clock.advance_ms(1);
    assert_eq!(lb.expire_stale_reservations(), vec![placement.reservation]);
    assert_eq!(lb.pending_reservations(), 0);
    assert!(matches!(
        lb.commit(placement.reservation, EntityKey::new("alice", "late")),
        Err(RceError::UnknownReservation { .. })
    ));
}

#[test]
fn concurrent_placements_never_overcommit() {
    let lb = Arc::new(cluster(&[3, 3, 2]));
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let lb = Arc::clone(&lb);
            thread::spawn(move || lb.get_next_container_location().is_ok())
        })
        .collect();
    let granted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(granted, 8);
    for machine in lb.machines() {
        assert!(machine.load() <= machine.capacity);
    }
}

proptest! {
    #[test]
    fn equal_capacity_machines_stay_balanced((machines, capacity) in arb_uniform_cluster(), fill in 0.0f64..=1.0) {
        let lb = cluster(&vec![capacity; machines]);
        let placements = ((machines * capacity) as f64 * fill) as usize;
        place_and_commit(&lb, placements);

        let loads: Vec<usize> = lb.machines().iter().map(|m| m.load()).collect();
        let max = loads.iter().copied().max().unwrap_or(0);
        let min = loads.iter().copied().min().unwrap_or(0);
        prop_assert!(max - min <= 1, "loads {:?}", loads);
    }

    #[test]
    fn placements_fill_exactly_total_capacity(capacities in arb_capacities()) {
        let lb = cluster(&capacities);
        let total: usize = capacities.iter().sum();
        place_and_commit(&lb, total);
        prop_assert_eq!(lb.get_next_container_location(), Err(RceError::NoMachineAvailable));
        for machine in lb.machines() {
            prop_assert_eq!(machine.hosted, machine.capacity);
        }
    }
}
