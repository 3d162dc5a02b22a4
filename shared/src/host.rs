//! Protocol endpoint common to the server and its peers

use crate::packet::{NetAddress, Packet};
use crate::payload::{HostId, Payload};
use crate::provider::ConnectionProvider;
use log::{error, trace, warn};

/// Owns a provider and the identity this endpoint goes by
///
/// Protocol code talks in `Payload`s; the host encodes them into packets on
/// the way out and decodes them on the way in.
pub struct GhastlyHost<P> {
    provider: P,
    id: Option<HostId>,
}

impl<P: ConnectionProvider> GhastlyHost<P> {
    pub fn new(provider: P, id: Option<HostId>) -> Self {
        Self { provider, id }
    }

    pub fn id(&self) -> Option<HostId> {
        self.id
    }

    pub fn set_id(&mut self, id: Option<HostId>) {
        self.id = id;
    }

    /// Encodes and queues a payload; false if it could not be queued
    pub fn send_payload(&mut self, addr: NetAddress, payload: Payload) -> bool {
        match Packet::from_payload(addr, &payload) {
            Ok(packet) => self.provider.send_packet(packet),
            Err(e) => {
                error!("Failed to encode {:?} for {}: {}", payload, addr, e);
                false
            }
        }
    }

    /// Next received packet with its decoded payload
    ///
    /// Packets that do not decode are logged and skipped.
    pub fn recv_payload(&mut self) -> Option<(Packet, Payload)> {
        while let Some(packet) = self.provider.recv_packet() {
            match packet.payload() {
                Ok(payload) => {
                    trace!(
                        "{:?} from {} waited {:?} before being handled",
                        payload,
                        packet.addr,
                        packet.age()
                    );
                    return Some((packet, payload));
                }
                Err(e) => warn!(
                    "Discarding {} byte packet from {}: {}",
                    packet.size(),
                    packet.addr,
                    e
                ),
            }
        }
        None
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }
}
