//! Transport session abstraction and its scoped-release guard.

use std::io;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Default per-call response timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Largest single read issued while streaming a response. Rigol scopes transfer the
/// display dump fastest with reads of one Ethernet payload.
pub const DEFAULT_CHUNK_SIZE: usize = 1420;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid instrument resource '{0}'")]
    InvalidResource(String),
    #[error("Failed to connect to {resource}: {source}")]
    Connect {
        resource: String,
        #[source]
        source: io::Error,
    },
    #[error("Timed out after {timeout_ms} ms waiting for {resource}")]
    Timeout { resource: String, timeout_ms: u64 },
    #[error("I/O error on {resource}: {source}")]
    Io {
        resource: String,
        #[source]
        source: io::Error,
    },
    #[error("{0} closed the connection")]
    Closed(String),
    #[error("Protocol error from {resource}: {detail}")]
    Protocol { resource: String, detail: String },
    #[error("Session for {0} is not open")]
    NotOpen(String),
}

/// Timeout and read sizing applied to every call on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    pub timeout: Duration,
    pub chunk_size: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// A blocking connection to one instrument.
///
/// Every call is bounded by the session's timeout on its own; a chain of queries can
/// therefore take several timeouts in total.
pub trait Session {
    /// Resource name the session was opened with, used in error messages.
    fn resource(&self) -> &str;

    /// Sends a command without waiting for a reply.
    fn write(&mut self, command: &str) -> Result<(), TransportError>;

    /// Sends a command and reads one line of reply, without the terminator.
    fn query(&mut self, command: &str) -> Result<String, TransportError>;

    /// Reads one complete raw response (e.g. a definite-length binary block).
    fn read_raw(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Releases the connection. Closing twice is a no-op.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Owns a session and closes it when dropped, on success and error paths alike.
pub struct SessionGuard<S: Session> {
    session: S,
}

impl<S: Session> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        debug!(resource = %session.resource(), "Instrument session opened");
        Self { session }
    }
}

impl<S: Session> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: Session> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: Session> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        match self.session.close() {
            Ok(()) => debug!(resource = %self.session.resource(), "Instrument session closed"),
            Err(e) => {
                warn!(resource = %self.session.resource(), error = %e, "Failed to close instrument session")
            }
        }
    }
}
