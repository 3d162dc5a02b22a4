//! Synchronous packet send/receive surface used by protocol code

use crate::config::BufferConfig;
use crate::connection_buffer::ConnectionBuffer;
use crate::error::Result;
use crate::packet::{NetAddress, Packet};
use crate::transport::udp;
use std::net::SocketAddr;

/// Polled once per tick by the protocol layer; neither call may block
pub trait ConnectionProvider {
    /// Hands a packet to the transport, false if it cannot be queued
    fn send_packet(&mut self, packet: Packet) -> bool;

    /// Next received packet, if any
    fn recv_packet(&mut self) -> Option<Packet>;

    /// Next peer whose connection went away, once everything it sent has
    /// been received
    ///
    /// Connectionless providers never report anything.
    fn poll_closed(&mut self) -> Option<NetAddress> {
        None
    }

    /// Reports per-connection counters through the log
    fn log_statistics(&self) {}
}

impl<P: ConnectionProvider + ?Sized> ConnectionProvider for Box<P> {
    fn send_packet(&mut self, packet: Packet) -> bool {
        (**self).send_packet(packet)
    }

    fn recv_packet(&mut self) -> Option<Packet> {
        (**self).recv_packet()
    }

    fn poll_closed(&mut self) -> Option<NetAddress> {
        (**self).poll_closed()
    }

    fn log_statistics(&self) {
        (**self).log_statistics()
    }
}

/// Provider over a single datagram socket; any peer address can be sent to
pub struct DatagramProvider {
    local_addr: SocketAddr,
    buffer: ConnectionBuffer,
}

impl DatagramProvider {
    pub fn open(addr: SocketAddr, config: BufferConfig) -> Result<Self> {
        let (inbound, outbound) = udp::open(addr, &config)?;
        let local_addr = inbound.local_addr()?;

        let mut buffer = ConnectionBuffer::with_config(local_addr, config, inbound, outbound);
        buffer.start_buffering()?;

        Ok(Self { local_addr, buffer })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn buffer(&self) -> &ConnectionBuffer {
        &self.buffer
    }
}

impl ConnectionProvider for DatagramProvider {
    fn send_packet(&mut self, packet: Packet) -> bool {
        self.buffer.provide_packet(packet)
    }

    fn recv_packet(&mut self) -> Option<Packet> {
        self.buffer.consume_packet()
    }

    fn log_statistics(&self) {
        self.buffer.log_statistics();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn local() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn test_datagram_providers_exchange_packets() {
        let mut sender = DatagramProvider::open(local(), BufferConfig::default()).unwrap();
        let receiver = DatagramProvider::open(local(), BufferConfig::default()).unwrap();
        let receiver_addr = receiver.local_addr();
        let mut receiver: Box<dyn ConnectionProvider> = Box::new(receiver);

        assert!(sender.send_packet(Packet::new(receiver_addr, b"ghost")));

        let deadline = Instant::now() + Duration::from_secs(2);
        let packet = loop {
            if let Some(packet) = receiver.recv_packet() {
                break packet;
            }
            assert!(Instant::now() < deadline, "datagram never arrived");
            std::thread::sleep(Duration::from_millis(1));
        };

        assert_eq!(packet.data(), b"ghost");
        assert_eq!(packet.addr.port(), sender.local_addr().port());
        assert!(sender.recv_packet().is_none());
        assert!(receiver.poll_closed().is_none());
    }
}
