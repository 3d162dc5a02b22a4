//! Wire messages understood by the identity protocol
//!
//! Every message starts with a 4-byte little-endian discriminator followed by
//! the fixed-layout fields of that variant, so the type can be read before the
//! rest of the payload is interpreted.

use crate::error::Result;
use bincode::{deserialize, serialize};
use serde::{Deserialize, Serialize};

/// Small integer identifying a connected peer
pub type HostId = u32;

/// Identity the server uses for itself
pub const SERVER_ID: HostId = HostId::MAX;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// Peer asks the server for an identity
    IdentityRequest,
    /// Server granted an identity
    IdentityAssign { id: HostId },
    /// Server has no identity left to give
    IdentityReject,
    /// Ends a session, sent by either side
    Disconnect,
}

impl Payload {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serialize(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(deserialize(data)?)
    }
}
