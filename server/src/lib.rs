//! # Identity Server Library
//!
//! Server side of the connection lifecycle: accepting peers, buffering their
//! traffic, and handing out the small numeric identities they are known by.
//!
//! ## Module Organization
//!
//! ### Server Provider (`server_provider`)
//! A `ConnectionProvider` over every accepted stream connection:
//! - one `ConnectionBuffer` (and two worker threads) per peer, keyed by address
//! - a new connection from a known address replaces the old buffer
//! - receives rotate across peers; sends to unknown peers fail softly
//!
//! ### Protocol (`ghastly_server`)
//! The identity state machine, driven once per tick by `update`:
//! - identity requests are granted from a fixed pool or explicitly rejected
//! - disconnects return the identity to the pool
//! - dropping the server tells every connected peer it is going away
//!
//! ### Sessions (`host_info`)
//! Per-peer session records with activity tracking for optional timeouts.
//!
//! ## Threading
//!
//! All protocol state lives on the thread that calls `update`. Only the
//! per-connection workers and the accept thread run elsewhere, and they talk
//! to the protocol thread exclusively through bounded queues and a channel.
//! Thread count grows linearly with the number of connections.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::{GhastlyServer, ServerProvider};
//! use shared::BufferConfig;
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = ServerProvider::new(8080, BufferConfig::default())?;
//!     let mut server = GhastlyServer::new(provider, 32);
//!
//!     loop {
//!         server.update(Duration::from_millis(16));
//!         std::thread::sleep(Duration::from_millis(16));
//!     }
//! }
//! ```

pub mod ghastly_server;
pub mod host_info;
pub mod server_provider;

pub use ghastly_server::GhastlyServer;
pub use host_info::HostInfo;
pub use server_provider::ServerProvider;
