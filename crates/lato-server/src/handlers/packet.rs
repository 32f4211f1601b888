// ============================================
// File: crates/lato-server/src/handlers/packet.rs
// ============================================
//! # Packet Processor
//!
//! ## Creation Reason
//! Decrypted client payloads have to go somewhere. Where exactly (a TUN
//! device, a userspace stack, a test recorder) is not the connection
//! handler's business, so it hands each payload to a `PacketProcessor`.
//!
//! ## Main Functionality
//! - `PacketProcessor`: async sink for decrypted payloads
//! - `LoggingProcessor`: default sink that logs and acknowledges
//!
//! ## Processing Contract
//! ```text
//! ┌──────────────┐  plaintext  ┌──────────────────┐
//! │  Connection  │ ──────────► │ PacketProcessor  │
//! │  Handler     │ ◄────────── │  .process()      │
//! └──────────────┘  Ok / Err   └──────────────────┘
//!        │
//!        └─ Err: log, count as dropped, keep the session
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `process` is awaited inline; frames of one session are processed in order
//! - A slow processor backs up only its own connection
//! - Never called with unauthenticated data
//!
//! ## Last Modified
//! v0.1.0 - Processor seam with logging default

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::Result;
use crate::services::Session;

/// Consumes decrypted client payloads.
#[async_trait]
pub trait PacketProcessor: Send + Sync {
    /// Processes one payload from `session`.
    ///
    /// # Errors
    /// An error drops this payload only; the session stays open.
    async fn process(&self, session: &Session, packet: Bytes) -> Result<()>;
}

/// Logs every payload and acknowledges it.
#[derive(Debug, Default)]
pub struct LoggingProcessor {
    processed: AtomicU64,
}

impl LoggingProcessor {
    /// Creates a processor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payloads processed so far.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PacketProcessor for LoggingProcessor {
    async fn process(&self, session: &Session, packet: Bytes) -> Result<()> {
        self.processed.fetch_add(1, Ordering::Relaxed);
        debug!(
            session_id = %session.id,
            address = %session.address,
            len = packet.len(),
            "Packet processed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientSettings;
    use crate::services::{AddressPool, SessionRegistry};
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_logging_processor_counts() {
        let pool = AddressPool::new(Ipv4Addr::new(10, 8, 0, 2), Ipv4Addr::new(10, 8, 0, 2), &[]).unwrap();
        let registry = SessionRegistry::new(Arc::new(pool), ClientSettings::default(), 1);
        let session = registry.create("192.0.2.4:5000".parse().unwrap()).unwrap();

        let processor = LoggingProcessor::new();
        processor.process(&session, Bytes::from_static(b"ping")).await.unwrap();
        processor.process(&session, Bytes::new()).await.unwrap();

        assert_eq!(processor.processed(), 2);
    }
}
