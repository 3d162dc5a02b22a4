//! Datagram transport: one packet per datagram, any peer reachable
//! through a single socket

use super::{is_timeout, Inbound, InboundIo, OutboundIo};
use crate::config::BufferConfig;
use crate::error::{NetError, Result};
use crate::packet::Packet;
use log::debug;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Binds a datagram socket and splits it into buffer halves
pub fn open(addr: SocketAddr, config: &BufferConfig) -> Result<(UdpInbound, UdpOutbound)> {
    let port = addr.port();
    let socket = UdpSocket::bind(addr).map_err(|source| NetError::Listen { port, source })?;
    socket.set_read_timeout(Some(config.poll_interval.max(MIN_POLL_INTERVAL)))?;
    socket.set_write_timeout(Some(config.write_timeout.max(MIN_POLL_INTERVAL)))?;
    let writer = socket.try_clone()?;

    Ok((UdpInbound { socket }, UdpOutbound { socket: writer }))
}

pub struct UdpInbound {
    socket: UdpSocket,
}

impl UdpInbound {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl InboundIo for UdpInbound {
    fn do_inbound(&mut self, buffer: &mut [u8]) -> io::Result<Inbound> {
        match self.socket.recv_from(buffer) {
            Ok((len, from)) => Ok(Inbound::Packet(Packet::new(from, &buffer[..len]))),
            Err(e) if is_timeout(&e) => Ok(Inbound::Idle),
            // ICMP port unreachable from an earlier send; the socket itself is fine
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                debug!("Ignoring connection reset on datagram socket");
                Ok(Inbound::Idle)
            }
            Err(e) => Err(e),
        }
    }
}

pub struct UdpOutbound {
    socket: UdpSocket,
}

impl OutboundIo for UdpOutbound {
    fn do_outbound(&mut self, packet: &Packet) -> io::Result<()> {
        self.socket.send_to(packet.data(), packet.addr)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_datagram_exchange() {
        let config = BufferConfig::default();
        let (mut inbound_a, mut outbound_a) = open("127.0.0.1:0".parse().unwrap(), &config).unwrap();
        let (mut inbound_b, _outbound_b) = open("127.0.0.1:0".parse().unwrap(), &config).unwrap();
        let addr_a = inbound_a.local_addr().unwrap();
        let addr_b = inbound_b.local_addr().unwrap();

        outbound_a
            .do_outbound(&Packet::new(addr_b, b"boo"))
            .unwrap();

        let mut buffer = vec![0u8; 64];
        let deadline = Instant::now() + Duration::from_secs(2);
        let packet = loop {
            match inbound_b.do_inbound(&mut buffer).unwrap() {
                Inbound::Packet(packet) => break packet,
                _ if Instant::now() < deadline => continue,
                _ => panic!("datagram never arrived"),
            }
        };

        assert_eq!(packet.data(), b"boo");
        assert_eq!(packet.addr, addr_a);
        assert!(matches!(inbound_a.do_inbound(&mut buffer).unwrap(), Inbound::Idle));
    }
}
