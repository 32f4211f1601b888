// ============================================
// File: crates/lato-transport/src/framing.rs
// ============================================
//! # Record Framing
//!
//! ## Creation Reason
//! TCP is a byte stream; the tunnel exchanges discrete records (the setup
//! record, then encrypted frames). This module restores record boundaries.
//!
//! ## Wire Format
//! ```text
//! +----------------+---------------------------+
//! | Length (u32 BE)| Body (Length bytes)       |
//! +----------------+---------------------------+
//! ```
//!
//! ## Main Functionality
//! - `FramedStream`: Reads and writes length-delimited records
//! - Configurable maximum record size, checked before buffering the body
//!
//! ## ⚠️ Important Note for Next Developer
//! - `read_frame` is cancel-safe: partial data stays in the internal
//!   buffer, so it may be raced in `tokio::select!`
//! - `write_frame` is NOT cancel-safe
//!
//! ## Last Modified
//! v0.1.0 - Length-delimited records

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{Result, TransportError};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum record body size.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 65535;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

// ============================================
// FramedStream
// ============================================

/// A byte stream carrying length-delimited records.
pub struct FramedStream<S> {
    stream: S,
    read_buf: BytesMut,
    max_frame_size: usize,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a stream with the default maximum record size.
    pub fn new(stream: S) -> Self {
        Self::with_max_frame_size(stream, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Wraps a stream with a custom maximum record size.
    pub fn with_max_frame_size(stream: S, max_frame_size: usize) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_frame_size,
        }
    }

    /// Returns the maximum record body size.
    pub const fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Reads the next record.
    ///
    /// # Returns
    /// - `Ok(Some(body))` - A complete record
    /// - `Ok(None)` - Peer closed the stream at a record boundary
    ///
    /// # Errors
    /// - `FrameTooLarge`: Length prefix exceeds the maximum
    /// - `UnexpectedEof`: Stream closed mid-record
    /// - `Io`: Read failure
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(body) = self.parse_frame()? {
                return Ok(Some(body));
            }

            let read = self
                .stream
                .read_buf(&mut self.read_buf)
                .await
                .map_err(|e| TransportError::io("reading record", e))?;

            if read == 0 {
                return if self.read_buf.is_empty() {
                    Ok(None)
                } else {
                    Err(TransportError::UnexpectedEof {
                        buffered: self.read_buf.len(),
                    })
                };
            }
        }
    }

    fn parse_frame(&mut self) -> Result<Option<Bytes>> {
        if self.read_buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&self.read_buf[..LENGTH_PREFIX_SIZE]);
        let len = u32::from_be_bytes(prefix) as usize;

        if len > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                max: self.max_frame_size,
                actual: len,
            });
        }

        let total = LENGTH_PREFIX_SIZE + len;
        if self.read_buf.len() < total {
            self.read_buf.reserve(total - self.read_buf.len());
            return Ok(None);
        }

        self.read_buf.advance(LENGTH_PREFIX_SIZE);
        let body = self.read_buf.split_to(len).freeze();
        trace!(len, "Read record");
        Ok(Some(body))
    }

    /// Writes one record and flushes the stream.
    ///
    /// # Errors
    /// - `FrameTooLarge`: Body exceeds the maximum
    /// - `SendFailed`: Write failure
    pub async fn write_frame(&mut self, body: &[u8]) -> Result<()> {
        if body.len() > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                max: self.max_frame_size,
                actual: body.len(),
            });
        }

        let mut record = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body.len());
        #[allow(clippy::cast_possible_truncation)]
        record.put_u32(body.len() as u32);
        record.put_slice(body);

        self.stream
            .write_all(&record)
            .await
            .map_err(|e| TransportError::SendFailed {
                reason: e.to_string(),
            })?;
        self.stream
            .flush()
            .await
            .map_err(|e| TransportError::SendFailed {
                reason: e.to_string(),
            })?;

        trace!(len = body.len(), "Wrote record");
        Ok(())
    }

    /// Shuts down the write half of the stream.
    ///
    /// # Errors
    /// Returns `Io` if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| TransportError::io("shutting down stream", e))
    }

    /// Returns a reference to the underlying stream.
    pub const fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Consumes the wrapper, returning the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> std::fmt::Debug for FramedStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedStream")
            .field("buffered", &self.read_buf.len())
            .field("max_frame_size", &self.max_frame_size)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_records_keep_boundaries() {
        let (a, b) = duplex(1024);
        let mut writer = FramedStream::new(a);
        let mut reader = FramedStream::new(b);

        writer.write_frame(b"first").await.unwrap();
        writer.write_frame(b"").await.unwrap();
        writer.write_frame(b"third record").await.unwrap();

        assert_eq!(reader.read_frame().await.unwrap().unwrap(), &b"first"[..]);
        assert!(reader.read_frame().await.unwrap().unwrap().is_empty());
        assert_eq!(
            reader.read_frame().await.unwrap().unwrap(),
            &b"third record"[..]
        );
    }

    #[tokio::test]
    async fn test_clean_eof_returns_none() {
        let (a, b) = duplex(64);
        let mut writer = FramedStream::new(a);
        let mut reader = FramedStream::new(b);

        writer.write_frame(b"bye").await.unwrap();
        drop(writer);

        assert!(reader.read_frame().await.unwrap().is_some());
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_mid_record() {
        let (mut a, b) = duplex(64);
        let mut reader = FramedStream::new(b);

        a.write_all(&[0, 0, 0, 10, 1, 2, 3]).await.unwrap();
        drop(a);

        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, TransportError::UnexpectedEof { buffered: 7 }));
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_oversize_prefix_rejected() {
        let (mut a, b) = duplex(64);
        let mut reader = FramedStream::with_max_frame_size(b, 16);

        a.write_all(&17u32.to_be_bytes()).await.unwrap();

        assert!(matches!(
            reader.read_frame().await,
            Err(TransportError::FrameTooLarge { max: 16, actual: 17 })
        ));
    }

    #[tokio::test]
    async fn test_oversize_write_rejected() {
        let (a, _b) = duplex(64);
        let mut writer = FramedStream::with_max_frame_size(a, 4);
        assert!(matches!(
            writer.write_frame(b"12345").await,
            Err(TransportError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_is_cancel_safe() {
        let (mut a, b) = duplex(64);
        let mut reader = FramedStream::new(b);

        // Half a record, then a timed-out read
        a.write_all(&[0, 0, 0, 4, b'p', b'i']).await.unwrap();
        let timed_out = tokio::time::timeout(Duration::from_millis(20), reader.read_frame()).await;
        assert!(timed_out.is_err());

        a.write_all(b"ng").await.unwrap();
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), &b"ping"[..]);
    }
}
