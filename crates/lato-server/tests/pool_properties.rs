//! Property tests for address pool and session registry invariants.
//!
//! - An address is never held by two owners at once
//! - Every released address becomes available again
//! - Tearing a session down twice is the same as once

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;

use lato_server::config::ClientSettings;
use lato_server::{AddressPool, SessionRegistry};

fn pool(size: u8) -> AddressPool {
    AddressPool::new(
        Ipv4Addr::new(10, 8, 0, 2),
        Ipv4Addr::new(10, 8, 0, 1 + size),
        &[],
    )
    .unwrap()
}

fn peer(port: u16) -> SocketAddr {
    SocketAddr::from(([192, 0, 2, 10], port))
}

#[derive(Debug, Clone)]
enum RegistryOp {
    Create(u16),
    Destroy(u16),
}

fn registry_op() -> impl Strategy<Value = RegistryOp> {
    prop_oneof![
        (0u16..6).prop_map(RegistryOp::Create),
        (0u16..6).prop_map(RegistryOp::Destroy),
    ]
}

#[test]
fn prop_concurrent_allocate_release_never_double_assigns() {
    proptest!(ProptestConfig::with_cases(32), |(
        size in 1u8..16,
        threads in 2usize..6,
        rounds in prop::collection::vec(1usize..40, 6)
    )| {
        let pool = Arc::new(pool(size));
        let held: Arc<Mutex<HashSet<Ipv4Addr>>> = Arc::default();

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let pool = Arc::clone(&pool);
                let held = Arc::clone(&held);
                let rounds = rounds[t];
                std::thread::spawn(move || {
                    let mut mine = Vec::new();
                    for i in 0..rounds {
                        if let Ok(ip) = pool.allocate() {
                            assert!(held.lock().insert(ip), "{ip} handed out twice");
                            mine.push(ip);
                        }
                        if i % 2 == 1 {
                            if let Some(ip) = mine.pop() {
                                held.lock().remove(&ip);
                                assert!(pool.release(ip));
                            }
                        }
                    }
                    for ip in mine {
                        held.lock().remove(&ip);
                        assert!(pool.release(ip));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        prop_assert_eq!(pool.allocated_count(), 0);
        prop_assert_eq!(pool.available_count(), pool.capacity());
    });
}

#[test]
fn prop_pool_of_n_rejects_the_next() {
    proptest!(|(size in 1u8..32)| {
        let pool = pool(size);
        let mut seen = HashSet::new();
        for _ in 0..size {
            prop_assert!(seen.insert(pool.allocate().unwrap()));
        }
        prop_assert!(pool.allocate().is_err());

        let freed = *seen.iter().next().unwrap();
        prop_assert!(pool.release(freed));
        prop_assert_eq!(pool.allocate().unwrap(), freed);
    });
}

#[test]
fn prop_registry_matches_model() {
    proptest!(|(ops in prop::collection::vec(registry_op(), 1..64))| {
        let registry = SessionRegistry::new(Arc::new(pool(4)), ClientSettings::default(), 8);
        let mut live: HashSet<u16> = HashSet::new();

        for op in ops {
            match op {
                RegistryOp::Create(port) => {
                    let result = registry.create(peer(port));
                    if live.contains(&port) || live.len() == 4 {
                        prop_assert!(result.is_err());
                    } else {
                        prop_assert!(result.is_ok());
                        live.insert(port);
                    }
                }
                RegistryOp::Destroy(port) => {
                    let id = lato_common::SessionId::from_endpoint(&peer(port));
                    prop_assert_eq!(registry.destroy(&id), live.remove(&port));
                    // Second teardown is a no-op
                    prop_assert!(!registry.destroy(&id));
                }
            }

            prop_assert_eq!(registry.count(), live.len());
            prop_assert_eq!(registry.pool().allocated_count(), live.len());

            let addresses: HashSet<Ipv4Addr> =
                registry.all_sessions().iter().map(|s| s.address).collect();
            prop_assert_eq!(addresses.len(), live.len());
            for address in addresses {
                prop_assert!(registry.pool().is_assigned(address));
            }
        }
    });
}
