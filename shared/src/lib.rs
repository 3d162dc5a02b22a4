//! # Shared Networking Library
//!
//! Transport building blocks used by both the server and its peers.
//!
//! ## Layers
//!
//! ### Packets (`packet`, `payload`)
//! A `Packet` is an addressed, timestamped byte buffer that it exclusively
//! owns. `Payload` is the small set of protocol messages carried inside.
//!
//! ### Connection buffering (`connection_buffer`, `transport`)
//! A `ConnectionBuffer` runs one worker thread per direction between a
//! transport binding and two bounded queues. The transport supplies a single
//! receive or send step through the `InboundIo` / `OutboundIo` traits; TCP and
//! UDP bindings are provided.
//!
//! ### Providers (`provider`, `host`)
//! `ConnectionProvider` is the non-blocking send/receive surface polled once
//! per tick. `GhastlyHost` sits on top of a provider and speaks `Payload`s.
//!
//! ### Identities (`index_pool`)
//! `IndexPool` hands out the small integer identities the server assigns.

pub mod config;
pub mod connection_buffer;
pub mod error;
pub mod host;
pub mod index_pool;
pub mod packet;
pub mod payload;
pub mod provider;
pub mod transport;

pub use config::BufferConfig;
pub use connection_buffer::{BufferState, BufferStatistics, ConnectionBuffer};
pub use error::{NetError, Result};
pub use host::GhastlyHost;
pub use index_pool::IndexPool;
pub use packet::{NetAddress, Packet};
pub use payload::{HostId, Payload, SERVER_ID};
pub use provider::{ConnectionProvider, DatagramProvider};
