// ============================================
// File: crates/lato-server/src/services/address_pool.rs
// ============================================
//! # Address Pool Service
//!
//! ## Creation Reason
//! Manages allocation of private tunnel addresses for connected clients,
//! ensuring each live session holds a unique address from the configured
//! range.
//!
//! ## Main Functionality
//! - `AddressPool`: Allocation and release of addresses
//! - Construction from the `[pool]` config section
//! - Reserved addresses (the gateway) are never handed out
//!
//! ## Allocation Strategy
//! - Available addresses kept in an ordered set: first-fit in O(log n)
//! - Assigned addresses kept in a hash set: O(1) release and lookup
//! - Both sets live behind ONE lock so an address is always in exactly
//!   one of them
//!
//! ## Example
//! ```
//! use lato_server::services::AddressPool;
//! use std::net::Ipv4Addr;
//!
//! let pool = AddressPool::new(
//!     Ipv4Addr::new(10, 8, 0, 2),
//!     Ipv4Addr::new(10, 8, 0, 3),
//!     &[],
//! ).unwrap();
//!
//! let ip = pool.allocate().unwrap();
//! assert_eq!(ip, Ipv4Addr::new(10, 8, 0, 2));
//!
//! assert!(pool.release(ip));
//! assert!(!pool.is_assigned(ip));
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Exhaustion is a per-connection rejection, never fatal
//! - Releasing an unassigned address is a bug upstream; it is logged and
//!   ignored
//!
//! ## Last Modified
//! v0.1.0 - Range-based address pool

use std::collections::{BTreeSet, HashSet};
use std::net::Ipv4Addr;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::error::{Result, ServerError};

/// Largest range the pool will materialize (a /12).
pub const MAX_POOL_ADDRESSES: u64 = 1 << 20;

#[derive(Default)]
struct PoolState {
    available: BTreeSet<Ipv4Addr>,
    assigned: HashSet<Ipv4Addr>,
}

// ============================================
// AddressPool
// ============================================

/// Private address pool.
///
/// # Thread Safety
/// Uses internal locking for thread-safe operations.
pub struct AddressPool {
    first: Ipv4Addr,
    last: Ipv4Addr,
    reserved: Vec<Ipv4Addr>,
    capacity: usize,
    state: Mutex<PoolState>,
}

impl AddressPool {
    /// Creates a pool over the inclusive range `first..=last`.
    ///
    /// # Arguments
    /// * `first` - First address in the range
    /// * `last` - Last address in the range
    /// * `reserved` - Addresses inside the range that must never be assigned
    ///
    /// # Errors
    /// Returns `ConfigInvalid` if the range is reversed, too large, or
    /// leaves no assignable address.
    pub fn new(first: Ipv4Addr, last: Ipv4Addr, reserved: &[Ipv4Addr]) -> Result<Self> {
        let (start, end) = (u32::from(first), u32::from(last));
        if start > end {
            return Err(ServerError::config_invalid(
                "pool.address_range",
                format!("start {first} is after end {last}"),
            ));
        }

        let span = u64::from(end - start) + 1;
        if span > MAX_POOL_ADDRESSES {
            return Err(ServerError::config_invalid(
                "pool.address_range",
                format!("{span} addresses exceeds the limit of {MAX_POOL_ADDRESSES}"),
            ));
        }

        let reserved: Vec<Ipv4Addr> = reserved.to_vec();
        let available: BTreeSet<Ipv4Addr> = (start..=end)
            .map(Ipv4Addr::from)
            .filter(|ip| !reserved.contains(ip))
            .collect();

        if available.is_empty() {
            return Err(ServerError::config_invalid(
                "pool.address_range",
                "range contains no assignable address",
            ));
        }

        let capacity = available.len();
        debug!(
            first = %first,
            last = %last,
            capacity,
            "Address pool initialized"
        );

        Ok(Self {
            first,
            last,
            reserved,
            capacity,
            state: Mutex::new(PoolState {
                available,
                assigned: HashSet::with_capacity(capacity),
            }),
        })
    }

    /// Creates a pool from the `[pool]` config section, reserving the gateway.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` if the range is invalid.
    pub fn from_config(config: &PoolConfig) -> Result<Self> {
        let (first, last) = config.bounds()?;
        Self::new(first, last, &[config.gateway])
    }

    /// Assigns the lowest available address.
    ///
    /// # Errors
    /// Returns `PoolExhausted` if every address is assigned.
    pub fn allocate(&self) -> Result<Ipv4Addr> {
        let mut state = self.state.lock();

        let Some(ip) = state.available.pop_first() else {
            warn!(in_use = state.assigned.len(), "Address pool exhausted");
            return Err(ServerError::PoolExhausted);
        };

        state.assigned.insert(ip);
        debug!(address = %ip, in_use = state.assigned.len(), "Allocated address");
        Ok(ip)
    }

    /// Returns an address to the pool.
    ///
    /// # Returns
    /// `true` if the address was released, `false` if it wasn't assigned.
    pub fn release(&self, ip: Ipv4Addr) -> bool {
        let mut state = self.state.lock();

        if state.assigned.remove(&ip) {
            state.available.insert(ip);
            debug!(address = %ip, in_use = state.assigned.len(), "Released address");
            true
        } else {
            warn!(address = %ip, "Attempted to release unassigned address");
            false
        }
    }

    /// Checks if an address is currently assigned.
    #[must_use]
    pub fn is_assigned(&self, ip: Ipv4Addr) -> bool {
        self.state.lock().assigned.contains(&ip)
    }

    /// Returns the number of assigned addresses.
    #[must_use]
    pub fn allocated_count(&self) -> usize {
        self.state.lock().assigned.len()
    }

    /// Returns the number of available addresses.
    #[must_use]
    pub fn available_count(&self) -> usize {
        self.state.lock().available.len()
    }

    /// Returns the number of assignable addresses.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Checks if an address is assignable by this pool.
    #[must_use]
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        ip >= self.first && ip <= self.last && !self.reserved.contains(&ip)
    }
}

impl std::fmt::Debug for AddressPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressPool")
            .field("range", &format!("{}-{}", self.first, self.last))
            .field("reserved", &self.reserved)
            .field("allocated", &self.allocated_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn default_pool() -> AddressPool {
        AddressPool::from_config(&PoolConfig::default()).unwrap()
    }

    #[test]
    fn test_pool_creation() {
        let pool = default_pool();
        assert_eq!(pool.capacity(), 253);
        assert_eq!(pool.allocated_count(), 0);
        assert_eq!(pool.available_count(), 253);
    }

    #[test]
    fn test_allocate_first_fit() {
        let pool = default_pool();

        assert_eq!(pool.allocate().unwrap(), Ipv4Addr::new(10, 8, 0, 2));
        assert_eq!(pool.allocate().unwrap(), Ipv4Addr::new(10, 8, 0, 3));
        assert_eq!(pool.allocate().unwrap(), Ipv4Addr::new(10, 8, 0, 4));
        assert_eq!(pool.allocated_count(), 3);
        assert!(pool.is_assigned(Ipv4Addr::new(10, 8, 0, 3)));
    }

    #[test]
    fn test_release_and_reuse() {
        let pool = default_pool();

        let ip1 = pool.allocate().unwrap();
        let _ip2 = pool.allocate().unwrap();

        assert!(pool.release(ip1));
        assert!(!pool.is_assigned(ip1));
        assert_eq!(pool.allocate().unwrap(), ip1);
    }

    #[test]
    fn test_release_unassigned_is_noop() {
        let pool = default_pool();
        let before = pool.available_count();

        assert!(!pool.release(Ipv4Addr::new(10, 8, 0, 100)));
        assert!(!pool.release(Ipv4Addr::new(192, 168, 0, 1)));
        assert_eq!(pool.available_count(), before);
    }

    #[test]
    fn test_double_release() {
        let pool = default_pool();
        let ip = pool.allocate().unwrap();

        assert!(pool.release(ip));
        assert!(!pool.release(ip));
        assert_eq!(pool.available_count(), pool.capacity());
    }

    #[test]
    fn test_exhaustion() {
        let pool = AddressPool::new(
            Ipv4Addr::new(10, 8, 0, 2),
            Ipv4Addr::new(10, 8, 0, 3),
            &[],
        )
        .unwrap();

        pool.allocate().unwrap();
        pool.allocate().unwrap();
        assert!(matches!(pool.allocate(), Err(ServerError::PoolExhausted)));

        assert!(pool.release(Ipv4Addr::new(10, 8, 0, 3)));
        assert_eq!(pool.allocate().unwrap(), Ipv4Addr::new(10, 8, 0, 3));
    }

    #[test]
    fn test_gateway_reserved() {
        let config = PoolConfig {
            address_range: "10.8.0.0/29".into(),
            gateway: Ipv4Addr::new(10, 8, 0, 1),
        };
        let pool = AddressPool::from_config(&config).unwrap();

        // .1-.6 minus the gateway
        assert_eq!(pool.capacity(), 5);
        assert!(!pool.contains(Ipv4Addr::new(10, 8, 0, 1)));
        assert!(pool.contains(Ipv4Addr::new(10, 8, 0, 6)));
        assert!(!pool.contains(Ipv4Addr::new(10, 8, 0, 7)));
        assert_eq!(pool.allocate().unwrap(), Ipv4Addr::new(10, 8, 0, 2));
    }

    #[test]
    fn test_invalid_ranges() {
        let only_gateway = AddressPool::new(
            Ipv4Addr::new(10, 8, 0, 1),
            Ipv4Addr::new(10, 8, 0, 1),
            &[Ipv4Addr::new(10, 8, 0, 1)],
        );
        assert!(only_gateway.is_err());

        let reversed = AddressPool::new(Ipv4Addr::new(10, 8, 0, 9), Ipv4Addr::new(10, 8, 0, 2), &[]);
        assert!(reversed.is_err());

        let huge = AddressPool::new(Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(10, 255, 255, 255), &[]);
        assert!(huge.is_err());
    }
}
