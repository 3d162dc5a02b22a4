//! Connection provider for a peer talking to a single server

use log::{info, warn};
use shared::transport::tcp;
use shared::{
    BufferConfig, BufferState, ConnectionBuffer, ConnectionProvider, NetAddress, NetError, Packet,
    Result,
};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ClientProvider {
    server_addr: SocketAddr,
    local_addr: SocketAddr,
    buffer: ConnectionBuffer,
    closed_reported: bool,
}

impl ClientProvider {
    /// Opens a stream connection to the server and starts buffering it
    pub fn connect(server_addr: SocketAddr, config: BufferConfig) -> Result<Self> {
        let stream = TcpStream::connect_timeout(&server_addr, CONNECT_TIMEOUT).map_err(|source| {
            NetError::Connect {
                addr: server_addr,
                source,
            }
        })?;
        let local_addr = stream.local_addr()?;

        let (inbound, outbound) = tcp::split(server_addr, stream, &config)?;
        let mut buffer = ConnectionBuffer::with_config(server_addr, config, inbound, outbound);
        buffer.start_buffering()?;

        info!("Connected to {} from {}", server_addr, local_addr);
        Ok(Self {
            server_addr,
            local_addr,
            buffer,
            closed_reported: false,
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Address the server sees this peer as
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> BufferState {
        self.buffer.state()
    }

    pub fn buffer(&self) -> &ConnectionBuffer {
        &self.buffer
    }
}

impl ConnectionProvider for ClientProvider {
    fn send_packet(&mut self, packet: Packet) -> bool {
        if packet.addr != self.server_addr {
            warn!("Unable to send packet: unknown host {}", packet.addr);
            return false;
        }
        self.buffer.provide_packet(packet)
    }

    fn recv_packet(&mut self) -> Option<Packet> {
        self.buffer.consume_packet()
    }

    fn poll_closed(&mut self) -> Option<NetAddress> {
        if self.closed_reported
            || self.buffer.state() != BufferState::TornDown
            || self.buffer.has_inbound()
        {
            return None;
        }
        info!("Connection to {} lost", self.server_addr);
        self.closed_reported = true;
        Some(self.server_addr)
    }

    fn log_statistics(&self) {
        self.buffer.log_statistics();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::time::Instant;

    #[test]
    fn test_connect_to_closed_port_fails() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let result = ClientProvider::connect(addr, BufferConfig::default());
        assert!(matches!(result, Err(NetError::Connect { .. })));
    }

    #[test]
    fn test_exchange_with_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let server_addr = listener.local_addr().unwrap();
        let mut provider = ClientProvider::connect(server_addr, BufferConfig::default()).unwrap();
        let (mut server_side, seen_as) = listener.accept().unwrap();
        assert_eq!(seen_as, provider.local_addr());

        assert!(provider.send_packet(Packet::new(server_addr, b"hi")));
        let mut frame = [0u8; 6];
        server_side.read_exact(&mut frame).unwrap();
        assert_eq!(frame, [0, 0, 0, 2, b'h', b'i']);

        server_side.write_all(&[0, 0, 0, 1, b'!']).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        let packet = loop {
            if let Some(packet) = provider.recv_packet() {
                break packet;
            }
            assert!(Instant::now() < deadline, "reply never arrived");
            std::thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(packet.data(), b"!");
        assert_eq!(packet.addr, server_addr);
    }

    #[test]
    fn test_server_close_reported_after_drain() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let server_addr = listener.local_addr().unwrap();
        let mut provider = ClientProvider::connect(server_addr, BufferConfig::default()).unwrap();
        let (mut server_side, _) = listener.accept().unwrap();
        server_side.write_all(&[0, 0, 0, 1, b'x']).unwrap();
        drop(server_side);

        let deadline = Instant::now() + Duration::from_secs(2);
        while provider.state() != BufferState::TornDown {
            assert!(Instant::now() < deadline, "close never noticed");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(provider.poll_closed().is_none());

        assert_eq!(provider.recv_packet().unwrap().data(), b"x");
        assert_eq!(provider.poll_closed(), Some(server_addr));
        assert!(provider.poll_closed().is_none());
    }

    #[test]
    fn test_send_to_other_host_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut provider =
            ClientProvider::connect(listener.local_addr().unwrap(), BufferConfig::default()).unwrap();

        let elsewhere: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert!(!provider.send_packet(Packet::new(elsewhere, b"lost")));
        assert_eq!(provider.state(), BufferState::Active);
    }
}
