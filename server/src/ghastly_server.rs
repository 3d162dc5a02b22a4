//! Server side of the identity protocol
//!
//! Peers start out unknown. An identity request from an unknown address either
//! assigns the lowest free `HostId` or is answered with a rejection when every
//! identity is taken. A disconnect, or the peer's connection going away,
//! returns the identity to the pool. The
//! address→id and id→info tables are always updated together, so each holds
//! exactly the inverse of the other.

use crate::host_info::HostInfo;
use log::{debug, info, warn};
use shared::{ConnectionProvider, GhastlyHost, HostId, IndexPool, NetAddress, Payload, SERVER_ID};
use std::collections::HashMap;
use std::time::Duration;

/// How much `update` time passes between host timeout sweeps
const TIMEOUT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub struct GhastlyServer<P: ConnectionProvider> {
    host: GhastlyHost<P>,
    id_pool: IndexPool,
    /// Session records indexed by identity
    hosts: HashMap<HostId, HostInfo>,
    /// Identity held by each connected address
    ids: HashMap<NetAddress, HostId>,
    host_timeout: Option<Duration>,
    since_sweep: Duration,
}

impl<P: ConnectionProvider> GhastlyServer<P> {
    /// Creates a server handing out at most `max_clients` identities
    pub fn new(provider: P, max_clients: u32) -> Self {
        Self {
            host: GhastlyHost::new(provider, Some(SERVER_ID)),
            id_pool: IndexPool::new(max_clients),
            hosts: HashMap::new(),
            ids: HashMap::new(),
            host_timeout: None,
            since_sweep: Duration::ZERO,
        }
    }

    /// Disconnects hosts that stay silent for longer than `timeout`
    pub fn with_host_timeout(mut self, timeout: Duration) -> Self {
        self.host_timeout = Some(timeout);
        self
    }

    /// Handles every packet that is currently available
    ///
    /// Never waits for new input. Returns the number of payloads handled.
    pub fn update(&mut self, elapsed: Duration) -> usize {
        let mut handled = 0;
        while let Some((packet, payload)) = self.host.recv_payload() {
            self.on_packet_receive(packet.addr, payload);
            handled += 1;
        }

        while let Some(addr) = self.host.provider_mut().poll_closed() {
            self.handle_connection_lost(addr);
        }

        if let Some(timeout) = self.host_timeout {
            self.since_sweep += elapsed;
            if self.since_sweep >= TIMEOUT_SWEEP_INTERVAL {
                self.since_sweep = Duration::ZERO;
                self.drop_silent_hosts(timeout);
            }
        }

        handled
    }

    /// Dispatches one decoded payload received from `from`
    pub fn on_packet_receive(&mut self, from: NetAddress, payload: Payload) {
        if let Some(info) = self.ids.get(&from).and_then(|id| self.hosts.get_mut(id)) {
            info.refresh_last_received();
        }

        match payload {
            Payload::IdentityRequest => self.handle_identity_request(from),
            Payload::Disconnect => self.handle_disconnect(from),
            other => warn!("Ignoring unexpected {:?} from {}", other, from),
        }
    }

    fn handle_identity_request(&mut self, from: NetAddress) {
        if let Some(&id) = self.ids.get(&from) {
            debug!("Client {} asked again, resending ID {}", from, id);
            self.host.send_payload(from, Payload::IdentityAssign { id });
            return;
        }

        match self.id_pool.allocate() {
            Some(id) => {
                info!("Client connecting, associated ID {} with address {}", id, from);
                self.host.send_payload(from, Payload::IdentityAssign { id });
                self.ids.insert(from, id);
                self.hosts.insert(id, HostInfo::new(from, id));
            }
            None => {
                warn!("All IDs allocated, client {} will be rejected", from);
                self.host.send_payload(from, Payload::IdentityReject);
            }
        }
    }

    fn handle_disconnect(&mut self, from: NetAddress) {
        match self.ids.remove(&from) {
            Some(id) => {
                self.hosts.remove(&id);
                self.id_pool.free(id);
                info!("Client disconnected, dissociating ID {} from address {}", id, from);
            }
            None => warn!("Disconnect from unregistered address {}, ignoring", from),
        }
    }

    fn handle_connection_lost(&mut self, addr: NetAddress) {
        match self.ids.remove(&addr) {
            Some(id) => {
                self.hosts.remove(&id);
                self.id_pool.free(id);
                info!("Lost connection to client {}, releasing ID {}", addr, id);
            }
            None => debug!("Connection from {} closed without an identity", addr),
        }
    }

    fn drop_silent_hosts(&mut self, timeout: Duration) {
        let silent: Vec<HostInfo> = self
            .hosts
            .values()
            .filter(|info| info.is_timed_out(timeout))
            .cloned()
            .collect();

        for info in silent {
            info!("Client {} with ID {} timed out", info.addr, info.id);
            self.host.send_payload(info.addr, Payload::Disconnect);
            self.ids.remove(&info.addr);
            self.hosts.remove(&info.id);
            self.id_pool.free(info.id);
        }
    }

    pub fn id(&self) -> HostId {
        SERVER_ID
    }

    pub fn host_info(&self, id: HostId) -> Option<&HostInfo> {
        self.hosts.get(&id)
    }

    pub fn host_id(&self, addr: &NetAddress) -> Option<HostId> {
        self.ids.get(addr).copied()
    }

    pub fn hosts(&self) -> impl Iterator<Item = &HostInfo> {
        self.hosts.values()
    }

    pub fn connected_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn max_clients(&self) -> u32 {
        self.id_pool.capacity()
    }

    pub fn provider(&self) -> &P {
        self.host.provider()
    }

    pub fn provider_mut(&mut self) -> &mut P {
        self.host.provider_mut()
    }
}

impl<P: ConnectionProvider> Drop for GhastlyServer<P> {
    fn drop(&mut self) {
        // Best effort; nobody waits for an acknowledgement
        for info in self.hosts.values() {
            self.host.send_payload(info.addr, Payload::Disconnect);
        }
        if !self.hosts.is_empty() {
            info!("Server shutting down, disconnected {} clients", self.hosts.len());
        }
    }
}
