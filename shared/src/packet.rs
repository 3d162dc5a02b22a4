//! The unit of transport: an addressed, owned, timestamped byte payload
//!
//! A `Packet` exclusively owns its bytes. Cloning always allocates a fresh
//! buffer, so two live packets never alias the same memory and a packet can be
//! handed to another thread without any further synchronization.

use crate::error::Result;
use crate::payload::Payload;
use std::cmp::Ordering;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Network endpoint of a peer
pub type NetAddress = SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Destination for outgoing packets, source for incoming ones
    pub addr: NetAddress,
    data: Box<[u8]>,
    timestamp: Instant,
}

impl Packet {
    /// Copies `data` into a freshly owned buffer and stamps the monotonic clock
    pub fn new(addr: NetAddress, data: &[u8]) -> Self {
        Self {
            addr,
            data: data.into(),
            timestamp: Instant::now(),
        }
    }

    /// Takes ownership of an already allocated buffer without copying it
    pub fn from_vec(addr: NetAddress, data: Vec<u8>) -> Self {
        Self {
            addr,
            data: data.into_boxed_slice(),
            timestamp: Instant::now(),
        }
    }

    /// Encodes a protocol payload addressed to `addr`
    pub fn from_payload(addr: NetAddress, payload: &Payload) -> Result<Self> {
        Ok(Self::from_vec(addr, payload.encode()?))
    }

    /// Decodes the protocol payload carried by this packet
    pub fn payload(&self) -> Result<Payload> {
        Payload::decode(&self.data)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// When the packet was created (or received)
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Time spent since the packet was stamped
    pub fn age(&self) -> Duration {
        self.timestamp.elapsed()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data.into_vec()
    }
}

// Older packets compare greater so a max-heap yields them first.
impl Ord for Packet {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| self.addr.cmp(&other.addr))
            .then_with(|| self.data.cmp(&other.data))
    }
}

impl PartialOrd for Packet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
