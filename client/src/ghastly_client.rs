//! Peer side of the identity protocol

use log::{debug, info, warn};
use shared::{ConnectionProvider, GhastlyHost, HostId, NetAddress, Payload};
use std::time::Duration;

/// How long to wait for an answer before asking the server again
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No identity requested yet
    Idle,
    /// Waiting for the server to answer an identity request
    Requesting,
    Connected(HostId),
    /// The server had no identity left
    Rejected,
    /// The session ended, from either side
    Disconnected,
}

pub struct GhastlyClient<P: ConnectionProvider> {
    host: GhastlyHost<P>,
    server_addr: NetAddress,
    state: ClientState,
    retry_interval: Duration,
    since_request: Duration,
}

impl<P: ConnectionProvider> GhastlyClient<P> {
    pub fn new(provider: P, server_addr: NetAddress) -> Self {
        Self {
            host: GhastlyHost::new(provider, None),
            server_addr,
            state: ClientState::Idle,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            since_request: Duration::ZERO,
        }
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Asks the server for an identity
    ///
    /// The request is repeated by `update` until the server answers.
    pub fn request_identity(&mut self) -> bool {
        if let ClientState::Connected(id) = self.state {
            debug!("Already connected with ID {}", id);
            return true;
        }

        self.state = ClientState::Requesting;
        self.since_request = Duration::ZERO;
        self.host.send_payload(self.server_addr, Payload::IdentityRequest)
    }

    /// Ends the session; false if there was none
    pub fn disconnect(&mut self) -> bool {
        let ClientState::Connected(id) = self.state else {
            return false;
        };

        info!("Disconnecting, releasing ID {}", id);
        self.state = ClientState::Disconnected;
        self.host.set_id(None);
        self.host.send_payload(self.server_addr, Payload::Disconnect)
    }

    /// Handles every reply that is currently available
    ///
    /// Never waits for new input. Returns the number of payloads handled.
    pub fn update(&mut self, elapsed: Duration) -> usize {
        let mut handled = 0;
        while let Some((packet, payload)) = self.host.recv_payload() {
            if packet.addr != self.server_addr {
                warn!("Ignoring {:?} from unknown host {}", payload, packet.addr);
                continue;
            }
            self.on_packet_receive(payload);
            handled += 1;
        }

        while let Some(addr) = self.host.provider_mut().poll_closed() {
            if addr == self.server_addr {
                self.on_connection_lost();
            }
        }

        if self.state == ClientState::Requesting {
            self.since_request += elapsed;
            if self.since_request >= self.retry_interval {
                debug!("No answer from {}, asking again", self.server_addr);
                self.since_request = Duration::ZERO;
                self.host.send_payload(self.server_addr, Payload::IdentityRequest);
            }
        }

        handled
    }

    fn on_packet_receive(&mut self, payload: Payload) {
        match (payload, self.state) {
            (Payload::IdentityAssign { id }, ClientState::Requesting | ClientState::Connected(_)) => {
                if self.state != ClientState::Connected(id) {
                    info!("Connected to {} with ID {}", self.server_addr, id);
                }
                self.state = ClientState::Connected(id);
                self.host.set_id(Some(id));
            }
            (Payload::IdentityReject, ClientState::Requesting) => {
                warn!("Server {} is full, identity request rejected", self.server_addr);
                self.state = ClientState::Rejected;
            }
            (Payload::Disconnect, ClientState::Connected(id)) => {
                info!("Server {} ended the session for ID {}", self.server_addr, id);
                self.state = ClientState::Disconnected;
                self.host.set_id(None);
            }
            (payload, state) => debug!("Ignoring {:?} while {:?}", payload, state),
        }
    }

    fn on_connection_lost(&mut self) {
        match self.state {
            ClientState::Connected(_) | ClientState::Requesting => {
                warn!("Lost connection to {}", self.server_addr);
                self.state = ClientState::Disconnected;
                self.host.set_id(None);
            }
            _ => debug!("Connection to {} closed", self.server_addr),
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn id(&self) -> Option<HostId> {
        self.host.id()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ClientState::Connected(_))
    }

    pub fn server_addr(&self) -> NetAddress {
        self.server_addr
    }

    pub fn provider(&self) -> &P {
        self.host.provider()
    }

    pub fn provider_mut(&mut self) -> &mut P {
        self.host.provider_mut()
    }
}

impl<P: ConnectionProvider> Drop for GhastlyClient<P> {
    fn drop(&mut self) {
        if self.is_connected() {
            self.disconnect();
        }
    }
}
