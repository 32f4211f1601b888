// ============================================
// File: crates/lato-server/src/services/session.rs
// ============================================
//! # Session Registry
//!
//! ## Creation Reason
//! Single source of truth for which clients are live: maps each session id
//! to its address, key and connection handle, and guarantees the address
//! pool and the registry never disagree.
//!
//! ## Main Functionality
//! - `Session`: Per-connection state (address, key, peer, stats, close signal)
//! - `SessionRegistry`: create / lookup / destroy with per-key serialization
//! - `SessionStats`: Frame and byte counters reported at teardown
//!
//! ## Session Lifecycle
//! ```text
//! ┌──────────┐   create: allocate address, mint key   ┌──────────┐
//! │  (none)  │ ─────────────────────────────────────► │   Live   │
//! └──────────┘                                        └────┬─────┘
//!      ▲                                                   │
//!      │   destroy: remove entry, release address,         │
//!      └────────────── key zeroized on last drop ◄─────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `create` holds the DashMap entry lock while allocating, so two creates
//!   for the same id cannot both allocate
//! - Never call `self.sessions.len()` while holding an entry guard (it
//!   read-locks every shard); the live count is tracked separately
//! - Lock order is always map shard → pool, never the reverse
//! - `destroy` is idempotent
//!
//! ## Last Modified
//! v0.1.0 - Endpoint-keyed session registry

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use lato_common::time::AtomicInstant;
use lato_common::types::SessionId;
use lato_core::crypto::SessionKey;
use lato_core::protocol::ClientConfig;

use crate::config::ClientSettings;
use crate::error::{Result, ServerError};
use crate::services::address_pool::AddressPool;

// ============================================
// Session Statistics
// ============================================

/// Session statistics.
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Frames that decrypted and reached the processor.
    pub frames_rx: AtomicU64,
    /// Plaintext bytes of those frames.
    pub bytes_rx: AtomicU64,
    /// Frames the processor failed on.
    pub frames_dropped: AtomicU64,
}

impl SessionStats {
    /// Counts one accepted frame of `bytes` plaintext bytes.
    pub fn record_rx(&self, bytes: u64) {
        self.bytes_rx.fetch_add(bytes, Ordering::Relaxed);
        self.frames_rx.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one frame the processor failed on.
    pub fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_rx: self.frames_rx.load(Ordering::Relaxed),
            bytes_rx: self.bytes_rx.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SessionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Frames decrypted.
    pub frames_rx: u64,
    /// Plaintext bytes decrypted.
    pub bytes_rx: u64,
    /// Frames the processor failed on.
    pub frames_dropped: u64,
}

// ============================================
// Session
// ============================================

/// A live client session.
pub struct Session {
    /// Registry key, derived from `peer`.
    pub id: SessionId,
    /// Address assigned from the pool.
    pub address: Ipv4Addr,
    /// Remote endpoint of the connection.
    pub peer: SocketAddr,
    key: SessionKey,
    client_config: ClientConfig,
    /// Creation time.
    pub created_at: Instant,
    /// Time of the last accepted frame.
    pub last_activity: AtomicInstant,
    /// Traffic counters.
    pub stats: SessionStats,
    close_tx: watch::Sender<bool>,
}

impl Session {
    fn new(
        id: SessionId,
        peer: SocketAddr,
        key: SessionKey,
        client_config: ClientConfig,
    ) -> Self {
        let now = Instant::now();
        let (close_tx, _) = watch::channel(false);
        Self {
            id,
            address: client_config.address,
            peer,
            key,
            client_config,
            created_at: now,
            last_activity: AtomicInstant::from_instant(now),
            stats: SessionStats::default(),
            close_tx,
        }
    }

    /// Returns the session key.
    #[must_use]
    pub const fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Returns the configuration computed for this client at creation.
    #[must_use]
    pub const fn client_config(&self) -> &ClientConfig {
        &self.client_config
    }

    /// Records activity now.
    pub fn touch(&self) {
        self.last_activity.touch();
    }

    /// Time since the last frame.
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Asks the owning connection handler to close.
    pub fn request_close(&self) {
        self.close_tx.send_replace(true);
    }

    /// Returns `true` once `request_close` has been called.
    #[must_use]
    pub fn close_requested(&self) -> bool {
        *self.close_tx.borrow()
    }

    /// Resolves once [`Session::request_close`] has been called.
    pub async fn closed(&self) {
        let mut rx = self.close_tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            // The sender lives as long as `self`
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("peer", &self.peer)
            .field("idle_time", &self.idle_time())
            .field("close_requested", &self.close_requested())
            .finish_non_exhaustive()
    }
}

// ============================================
// SessionRegistry
// ============================================

/// Registry of all live sessions.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
    pool: Arc<AddressPool>,
    client: ClientSettings,
    live: AtomicUsize,
    max_sessions: usize,
}

impl SessionRegistry {
    /// Creates an empty registry that allocates from `pool`.
    #[must_use]
    pub fn new(pool: Arc<AddressPool>, client: ClientSettings, max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            pool,
            client,
            live: AtomicUsize::new(0),
            max_sessions,
        }
    }

    /// Creates a session for a newly accepted connection.
    ///
    /// Derives the id from `peer`, allocates an address and mints a key.
    ///
    /// # Errors
    /// - `SessionExists` if a session for this endpoint is live (nothing is allocated)
    /// - `SessionLimitReached` if `max_sessions` are live
    /// - `PoolExhausted` if no address is free
    pub fn create(&self, peer: SocketAddr) -> Result<Arc<Session>> {
        let id = SessionId::from_endpoint(&peer);

        let slot = match self.sessions.entry(id) {
            Entry::Occupied(_) => {
                warn!(session_id = %id, peer = %peer, "Session already exists");
                return Err(ServerError::SessionExists);
            }
            Entry::Vacant(slot) => slot,
        };

        self.reserve_slot()?;

        let address = match self.pool.allocate() {
            Ok(address) => address,
            Err(e) => {
                self.live.fetch_sub(1, Ordering::AcqRel);
                return Err(e);
            }
        };

        let key = match SessionKey::generate() {
            Ok(key) => key,
            Err(e) => {
                self.pool.release(address);
                self.live.fetch_sub(1, Ordering::AcqRel);
                return Err(e.into());
            }
        };

        let config = ClientConfig::new(address, self.client.dns.clone(), self.client.routes.clone());
        let session = Arc::new(Session::new(id, peer, key, config));
        slot.insert(Arc::clone(&session));

        info!(
            session_id = %id,
            address = %address,
            peer = %peer,
            "Session created"
        );

        Ok(session)
    }

    fn reserve_slot(&self) -> Result<()> {
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < self.max_sessions).then_some(live + 1)
            })
            .map(|_| ())
            .map_err(|_| ServerError::SessionLimitReached {
                limit: self.max_sessions,
            })
    }

    /// Returns the live session with `id`, if any.
    #[must_use]
    pub fn lookup(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|r| Arc::clone(r.value()))
    }

    /// Destroys a session: removes the entry, releases its address and
    /// signals its handler to close.
    ///
    /// # Returns
    /// `true` if a session was removed, `false` if none was live.
    pub fn destroy(&self, id: &SessionId) -> bool {
        match self.sessions.remove(id) {
            Some((_, session)) => {
                self.finish(&session);
                true
            }
            None => {
                debug!(session_id = %id, "Destroy for unknown session ignored");
                false
            }
        }
    }

    /// Destroys `session` only if it is still the registered entry for its id.
    ///
    /// Used by connection teardown so a late teardown never removes a newer
    /// session for the same endpoint.
    pub fn destroy_session(&self, session: &Arc<Session>) -> bool {
        let removed = self
            .sessions
            .remove_if(&session.id, |_, live| Arc::ptr_eq(live, session));

        match removed {
            Some((_, session)) => {
                self.finish(&session);
                true
            }
            None => false,
        }
    }

    fn finish(&self, session: &Session) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        session.request_close();
        self.pool.release(session.address);

        let stats = session.stats.snapshot();
        info!(
            session_id = %session.id,
            address = %session.address,
            peer = %session.peer,
            frames_rx = stats.frames_rx,
            bytes_rx = stats.bytes_rx,
            frames_dropped = stats.frames_dropped,
            duration_ms = u64::try_from(session.created_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Session destroyed"
        );
    }

    /// Signals every live session to close. Returns how many were signalled.
    pub fn close_all(&self) -> usize {
        let mut signalled = 0;
        for entry in &self.sessions {
            entry.value().request_close();
            signalled += 1;
        }
        if signalled > 0 {
            info!(sessions = signalled, "Signalled all sessions to close");
        }
        signalled
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Returns `true` if no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Returns a snapshot of every live session.
    #[must_use]
    pub fn all_sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|r| Arc::clone(r.value())).collect()
    }

    /// Returns the address pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<AddressPool> {
        &self.pool
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.count())
            .field("max_sessions", &self.max_sessions)
            .field("pool", &self.pool)
            .finish()
    }
}

// ============================================
// Tests
// ============================================
