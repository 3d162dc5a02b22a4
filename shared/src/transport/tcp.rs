//! Stream transport: a listening socket that reports accepted connections,
//! and a framed stream binding for `ConnectionBuffer`
//!
//! Each packet travels as a 4-byte big-endian length followed by its bytes.

use super::{is_timeout, Inbound, InboundIo, OutboundIo};
use crate::config::BufferConfig;
use crate::error::{NetError, Result};
use crate::packet::{NetAddress, Packet};
use log::{debug, info, warn};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const FRAME_HEADER_LEN: usize = 4;
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Accepts stream connections on a background thread
///
/// The registered callback runs on the accept thread, once per connection,
/// with the peer's address and the connected stream.
pub struct ListenSocket {
    local_addr: SocketAddr,
    should_die: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

impl ListenSocket {
    pub fn start_listening<F>(addr: SocketAddr, poll_interval: Duration, mut on_accept: F) -> Result<Self>
    where
        F: FnMut(NetAddress, TcpStream) + Send + 'static,
    {
        let port = addr.port();
        let listener = TcpListener::bind(addr).map_err(|source| NetError::Listen { port, source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| NetError::Listen { port, source })?;
        let local_addr = listener.local_addr()?;

        let should_die = Arc::new(AtomicBool::new(false));
        let die = Arc::clone(&should_die);
        let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        let accept_thread = thread::Builder::new()
            .name(format!("accept {}", local_addr))
            .spawn(move || {
                while !die.load(Ordering::Acquire) {
                    match listener.accept() {
                        Ok((stream, peer)) => {
                            debug!("Accepted connection from {}", peer);
                            on_accept(peer, stream);
                        }
                        Err(e) if is_timeout(&e) => thread::sleep(poll_interval),
                        Err(e) => {
                            warn!("Accept failed: {}", e);
                            thread::sleep(poll_interval);
                        }
                    }
                }
            })?;

        info!("Listening on {}", local_addr);
        Ok(Self {
            local_addr,
            should_die,
            accept_thread: Some(accept_thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }
}

impl Drop for ListenSocket {
    fn drop(&mut self) {
        self.should_die.store(true, Ordering::Release);
        if let Some(handle) = self.accept_thread.take() {
            if handle.join().is_err() {
                warn!("Accept thread for {} panicked", self.local_addr);
            }
        }
    }
}

/// Splits a connected stream into buffer halves
///
/// Reads wait at most `poll_interval` so the inbound worker can observe
/// shutdown; writes give up after `write_timeout`.
pub fn split(peer: NetAddress, stream: TcpStream, config: &BufferConfig) -> io::Result<(TcpInbound, TcpOutbound)> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(config.poll_interval.max(MIN_POLL_INTERVAL)))?;
    stream.set_write_timeout(Some(config.write_timeout.max(MIN_POLL_INTERVAL)))?;
    let writer = stream.try_clone()?;

    Ok((
        TcpInbound {
            peer,
            stream,
            pending: Vec::new(),
        },
        TcpOutbound { stream: writer },
    ))
}

pub struct TcpInbound {
    peer: NetAddress,
    stream: TcpStream,
    /// Bytes read but not yet assembled into a whole frame
    pending: Vec<u8>,
}

impl TcpInbound {
    fn take_frame(&mut self, max_packet_size: usize) -> io::Result<Option<Packet>> {
        if self.pending.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&self.pending[..FRAME_HEADER_LEN]);
        let len = u32::from_be_bytes(header) as usize;
        if len > max_packet_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {} bytes exceeds limit of {}", len, max_packet_size),
            ));
        }

        let end = FRAME_HEADER_LEN + len;
        if self.pending.len() < end {
            return Ok(None);
        }

        let packet = Packet::new(self.peer, &self.pending[FRAME_HEADER_LEN..end]);
        self.pending.drain(..end);
        Ok(Some(packet))
    }
}

impl InboundIo for TcpInbound {
    fn do_inbound(&mut self, buffer: &mut [u8]) -> io::Result<Inbound> {
        if let Some(packet) = self.take_frame(buffer.len())? {
            return Ok(Inbound::Packet(packet));
        }

        match self.stream.read(buffer) {
            Ok(0) => Ok(Inbound::Closed),
            Ok(n) => {
                self.pending.extend_from_slice(&buffer[..n]);
                Ok(self
                    .take_frame(buffer.len())?
                    .map_or(Inbound::Idle, Inbound::Packet))
            }
            Err(e) if is_timeout(&e) => Ok(Inbound::Idle),
            Err(e) => Err(e),
        }
    }
}

pub struct TcpOutbound {
    stream: TcpStream,
}

impl OutboundIo for TcpOutbound {
    fn do_outbound(&mut self, packet: &Packet) -> io::Result<()> {
        let len = u32::try_from(packet.size())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "packet too large to frame"))?;

        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + packet.size());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(packet.data());
        self.stream.write_all(&frame)?;
        self.stream.flush()
    }
}
