//! Transport bindings plugged into a `ConnectionBuffer`
//!
//! A binding is split into an inbound and an outbound half so that each
//! worker thread owns exactly one of them. Each half performs a single,
//! possibly blocking, I/O step per call; the buffer owns the loops around them.

pub mod tcp;
pub mod udp;

use crate::packet::Packet;
use std::io;

/// Outcome of a single receive step
#[derive(Debug)]
pub enum Inbound {
    Packet(Packet),
    /// Nothing arrived before the transport's poll interval expired
    Idle,
    /// The remote end closed the connection
    Closed,
}

/// Receive half of a transport binding
pub trait InboundIo: Send + 'static {
    /// Waits for at most one poll interval for the next packet
    ///
    /// `buffer` is the raw receive buffer, sized to the connection's maximum
    /// packet size.
    fn do_inbound(&mut self, buffer: &mut [u8]) -> io::Result<Inbound>;
}

/// Send half of a transport binding
pub trait OutboundIo: Send + 'static {
    fn do_outbound(&mut self, packet: &Packet) -> io::Result<()>;
}

/// Read timeouts surface as `WouldBlock` on unix and `TimedOut` on windows
pub(crate) fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
