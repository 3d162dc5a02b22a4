//! Connection provider multiplexing one buffer per accepted peer
//!
//! The listening socket accepts connections on its own thread and forwards
//! them over a channel. The provider applies them the next time its owner
//! polls it, so the address-keyed buffer table is only ever touched by the
//! owning thread.

use log::{debug, info, warn};
use shared::transport::tcp::{self, ListenSocket};
use shared::{
    BufferConfig, BufferState, ConnectionBuffer, ConnectionProvider, NetAddress, Packet, Result,
};
use std::collections::{BTreeMap, VecDeque};
use std::net::{SocketAddr, TcpStream};
use std::ops::Bound;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

/// A connection handed over by the accept thread
struct AcceptEvent {
    addr: NetAddress,
    stream: TcpStream,
}

pub struct ServerProvider {
    config: BufferConfig,
    buffers: BTreeMap<NetAddress, ConnectionBuffer>,
    accepts: UnboundedReceiver<AcceptEvent>,
    listen_socket: ListenSocket,
    /// Buffer that delivered the last packet, for round-robin receives
    last_recv: Option<NetAddress>,
    /// Reaped connections not yet reported through `poll_closed`
    closed: VecDeque<NetAddress>,
}

impl ServerProvider {
    /// Listens on `port` on every local interface
    pub fn new(port: u16, config: BufferConfig) -> Result<Self> {
        Self::bind(SocketAddr::from(([0, 0, 0, 0], port)), config)
    }

    pub fn bind(addr: SocketAddr, config: BufferConfig) -> Result<Self> {
        let (accept_tx, accepts) = unbounded_channel();
        let listen_socket = ListenSocket::start_listening(addr, config.poll_interval, move |addr, stream| {
            if accept_tx.send(AcceptEvent { addr, stream }).is_err() {
                debug!("Provider is gone, dropping connection from {}", addr);
            }
        })?;

        Ok(Self {
            config,
            buffers: BTreeMap::new(),
            accepts,
            listen_socket,
            last_recv: None,
            closed: VecDeque::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listen_socket.local_addr()
    }

    pub fn local_port(&self) -> u16 {
        self.listen_socket.local_port()
    }

    /// Installs a buffer for a freshly accepted connection
    ///
    /// A live buffer for the same address is stopped and released first. Every
    /// connection is accepted; returns false only if the stream could not be
    /// set up for buffering.
    pub fn on_socket_creation(&mut self, addr: NetAddress, stream: TcpStream) -> bool {
        if let Some(mut previous) = self.buffers.remove(&addr) {
            info!("Replacing existing connection from {}", addr);
            previous.stop_buffering();
        }

        let (inbound, outbound) = match tcp::split(addr, stream, &self.config) {
            Ok(halves) => halves,
            Err(e) => {
                warn!("Unable to set up connection from {}: {}", addr, e);
                return false;
            }
        };

        let mut buffer = ConnectionBuffer::with_config(addr, self.config, inbound, outbound);
        if let Err(e) = buffer.start_buffering() {
            warn!("Unable to start buffering for {}: {}", addr, e);
            return false;
        }

        info!("Connection established with {}", addr);
        self.buffers.insert(addr, buffer);
        true
    }

    /// Applies pending accept events and releases closed connections
    ///
    /// Called implicitly by `send_packet` and `recv_packet`.
    pub fn poll_accepts(&mut self) -> usize {
        let mut accepted = 0;
        while let Ok(event) = self.accepts.try_recv() {
            if self.on_socket_creation(event.addr, event.stream) {
                accepted += 1;
            }
        }
        self.reap_closed();
        accepted
    }

    pub fn connection_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn connection_state(&self, addr: &NetAddress) -> Option<BufferState> {
        self.buffers.get(addr).map(ConnectionBuffer::state)
    }

    pub fn buffer(&self, addr: &NetAddress) -> Option<&ConnectionBuffer> {
        self.buffers.get(addr)
    }

    pub fn connections(&self) -> impl Iterator<Item = NetAddress> + '_ {
        self.buffers.keys().copied()
    }

    // Closed connections are kept until everything they received is consumed
    fn reap_closed(&mut self) {
        let reaped = &mut self.closed;
        self.buffers.retain(|addr, buffer| {
            let closed = buffer.state() == BufferState::TornDown && !buffer.has_inbound();
            if closed {
                info!("Releasing closed connection {}", addr);
                reaped.push_back(*addr);
            }
            !closed
        });
    }

    fn first_packet<'a>(
        mut buffers: impl Iterator<Item = (&'a NetAddress, &'a ConnectionBuffer)>,
    ) -> Option<Packet> {
        buffers.find_map(|(_, buffer)| buffer.consume_packet())
    }
}

impl ConnectionProvider for ServerProvider {
    fn send_packet(&mut self, packet: Packet) -> bool {
        self.poll_accepts();

        match self.buffers.get(&packet.addr) {
            Some(buffer) => buffer.provide_packet(packet),
            None => {
                warn!("Unable to send packet: unknown host {}", packet.addr);
                false
            }
        }
    }

    fn recv_packet(&mut self) -> Option<Packet> {
        self.poll_accepts();

        let packet = match self.last_recv {
            Some(last) => Self::first_packet(
                self.buffers
                    .range((Bound::Excluded(last), Bound::Unbounded))
                    .chain(self.buffers.range(..=last)),
            ),
            None => Self::first_packet(self.buffers.iter()),
        }?;

        self.last_recv = Some(packet.addr);
        Some(packet)
    }

    fn poll_closed(&mut self) -> Option<NetAddress> {
        self.poll_accepts();
        self.closed.pop_front()
    }

    fn log_statistics(&self) {
        info!("{} connections open", self.buffers.len());
        for buffer in self.buffers.values() {
            buffer.log_statistics();
        }
    }
}

impl Drop for ServerProvider {
    fn drop(&mut self) {
        for buffer in self.buffers.values_mut() {
            buffer.stop_buffering();
        }
        self.buffers.clear();
        debug!("Server provider on {} shut down", self.local_addr());
    }
}
