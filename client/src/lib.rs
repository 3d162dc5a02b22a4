//! # Identity Client Library
//!
//! Peer side of the connection lifecycle: connecting to a server, obtaining
//! an identity, and giving it back.
//!
//! ## Module Organization
//!
//! ### Client Provider (`client_provider`)
//! A `ConnectionProvider` over a single stream connection to the server,
//! buffered by one `ConnectionBuffer`. Packets addressed anywhere but the
//! server are refused.
//!
//! ### Protocol (`ghastly_client`)
//! The peer's view of the identity handshake:
//! - `Idle` → `Requesting` on `request_identity`, re-sent until answered
//! - `Requesting` → `Connected(id)` or `Rejected` once the server replies
//! - `Connected` → `Disconnected` on either side's disconnect
//!
//! Like the server, the client is polled: `update` drains whatever has
//! arrived and returns immediately.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::{ClientProvider, GhastlyClient};
//! use shared::BufferConfig;
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server_addr = "127.0.0.1:8080".parse()?;
//!     let provider = ClientProvider::connect(server_addr, BufferConfig::default())?;
//!     let mut client = GhastlyClient::new(provider, server_addr);
//!
//!     client.request_identity();
//!     while !client.is_connected() {
//!         client.update(Duration::from_millis(16));
//!         std::thread::sleep(Duration::from_millis(16));
//!     }
//!     println!("Assigned ID {:?}", client.id());
//!
//!     client.disconnect();
//!     Ok(())
//! }
//! ```

pub mod client_provider;
pub mod ghastly_client;

pub use client_provider::ClientProvider;
pub use ghastly_client::{ClientState, GhastlyClient};
