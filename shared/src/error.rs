//! Error types for the transport layer.
//!
//! Protocol code never sees these: per-packet failures are reported as a
//! boolean or `Option` plus a log line. `NetError` is reserved for the
//! conditions that must stop a caller before it enters its update loop.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetError {
    /// The listening socket could not be opened
    #[error("failed to listen on port {port}: {source}")]
    Listen {
        port: u16,
        #[source]
        source: io::Error,
    },
    /// An outgoing connection could not be established
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// A payload could not be encoded or decoded
    #[error("malformed payload: {0}")]
    Wire(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, NetError>;
