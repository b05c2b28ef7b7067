//! Instrument-control link: transport sessions and the scope command set.

#[cfg(test)]
pub(crate) mod mock;
pub mod scope;
mod session;
mod tcp;

pub use session::{
    Session, SessionGuard, TransportError, TransportSettings, DEFAULT_CHUNK_SIZE,
    DEFAULT_TIMEOUT_MS,
};
pub use tcp::{ResourceAddr, TcpSession, DEFAULT_SCPI_PORT};
