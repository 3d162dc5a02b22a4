//! Per-connection packet staging between a transport and its owner
//!
//! A `ConnectionBuffer` moves potentially blocking socket I/O off the owning
//! thread. Two worker threads, one per direction, shuttle packets between the
//! transport and two bounded FIFO queues:
//! - the inbound worker receives from the transport and fills the inbound queue
//! - the outbound worker drains the outbound queue into the transport
//!
//! Each queue has its own lock and neither worker ever touches the other's
//! queue, so the two locks are never held together. A full queue drops the new
//! packet and counts it; the owner is never blocked.

use crate::config::BufferConfig;
use crate::packet::{NetAddress, Packet};
use crate::transport::{Inbound, InboundIo, OutboundIo};
use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Lifecycle of a buffer as seen by its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Workers are not running (never started, or stopped)
    Idle,
    /// Both workers are running
    Active,
    /// The transport closed or failed; the buffer will not carry traffic again
    TornDown,
}

/// Snapshot of a buffer's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStatistics {
    pub sent: u64,
    pub received: u64,
    pub dropped: u64,
    /// Packets waiting to be consumed by the owner
    pub inbound: usize,
    /// Packets waiting to be written to the transport
    pub outbound: usize,
}

/// State shared between the owner and both workers
struct Shared {
    inbound: Mutex<VecDeque<Packet>>,
    outbound: Mutex<VecDeque<Packet>>,
    outbound_ready: Condvar,
    should_die: AtomicBool,
    torn_down: AtomicBool,
    sent: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            inbound: Mutex::new(VecDeque::new()),
            outbound: Mutex::new(VecDeque::new()),
            outbound_ready: Condvar::new(),
            should_die: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }
}

pub struct ConnectionBuffer {
    peer: NetAddress,
    config: BufferConfig,
    shared: Arc<Shared>,
    // Each transport half lives here while idle and inside its worker while active
    inbound_io: Option<Box<dyn InboundIo>>,
    outbound_io: Option<Box<dyn OutboundIo>>,
    inbound_thread: Option<JoinHandle<Box<dyn InboundIo>>>,
    outbound_thread: Option<JoinHandle<Box<dyn OutboundIo>>>,
}

impl ConnectionBuffer {
    /// Creates an idle buffer with the default configuration
    pub fn new(peer: NetAddress, inbound: impl InboundIo, outbound: impl OutboundIo) -> Self {
        Self::with_config(peer, BufferConfig::default(), inbound, outbound)
    }

    pub fn with_config(
        peer: NetAddress,
        config: BufferConfig,
        inbound: impl InboundIo,
        outbound: impl OutboundIo,
    ) -> Self {
        Self {
            peer,
            config,
            shared: Arc::new(Shared::new()),
            inbound_io: Some(Box::new(inbound)),
            outbound_io: Some(Box::new(outbound)),
            inbound_thread: None,
            outbound_thread: None,
        }
    }

    /// Remote endpoint this buffer talks to
    pub fn peer(&self) -> NetAddress {
        self.peer
    }

    /// Must be called before `start_buffering`
    pub fn set_max_buffer_size(&mut self, max_packets: usize) {
        self.config.max_buffer_size = max_packets;
    }

    pub fn max_buffer_size(&self) -> usize {
        self.config.max_buffer_size
    }

    /// Must be called before `start_buffering`
    pub fn set_max_packet_size(&mut self, max_size: usize) {
        self.config.max_packet_size = max_size;
    }

    pub fn max_packet_size(&self) -> usize {
        self.config.max_packet_size
    }

    /// Launches the inbound and outbound workers
    ///
    /// Starting an active buffer is a no-op. A buffer whose transport has been
    /// torn down cannot be restarted.
    pub fn start_buffering(&mut self) -> io::Result<()> {
        if self.is_running() {
            debug!("Buffering for {} already started", self.peer);
            return Ok(());
        }
        if self.shared.torn_down.load(Ordering::Acquire) {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("transport for {} was torn down", self.peer),
            ));
        }
        let (Some(inbound_io), Some(outbound_io)) = (self.inbound_io.take(), self.outbound_io.take())
        else {
            self.shared.torn_down.store(true, Ordering::Release);
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("transport for {} is gone", self.peer),
            ));
        };

        self.shared.should_die.store(false, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let (max_buffer_size, max_packet_size) =
            (self.config.max_buffer_size, self.config.max_packet_size);
        let peer = self.peer;
        let inbound = thread::Builder::new()
            .name(format!("inbound {}", peer))
            .spawn(move || inbound_loop(peer, inbound_io, shared, max_buffer_size, max_packet_size));
        match inbound {
            Ok(handle) => self.inbound_thread = Some(handle),
            Err(e) => {
                self.shared.torn_down.store(true, Ordering::Release);
                return Err(e);
            }
        }

        let shared = Arc::clone(&self.shared);
        let poll_interval = self.config.poll_interval;
        let outbound = thread::Builder::new()
            .name(format!("outbound {}", peer))
            .spawn(move || outbound_loop(outbound_io, shared, poll_interval));
        match outbound {
            Ok(handle) => self.outbound_thread = Some(handle),
            Err(e) => {
                self.stop_buffering();
                self.shared.torn_down.store(true, Ordering::Release);
                return Err(e);
            }
        }

        debug!("Started buffering for {}", self.peer);
        Ok(())
    }

    /// Signals both workers to exit and joins them
    ///
    /// Packets already queued for sending are flushed first. May block for up
    /// to one in-flight transport call. Safe to call repeatedly, or on a buffer
    /// that was never started.
    pub fn stop_buffering(&mut self) {
        if !self.is_running() {
            return;
        }

        self.shared.should_die.store(true, Ordering::Release);
        {
            // Hold the lock so the outbound worker cannot miss the wakeup
            let _outbound = self.shared.outbound.lock();
            self.shared.outbound_ready.notify_all();
        }

        if let Some(handle) = self.inbound_thread.take() {
            match handle.join() {
                Ok(io) => self.inbound_io = Some(io),
                Err(_) => {
                    error!("Inbound worker for {} panicked", self.peer);
                    self.shared.torn_down.store(true, Ordering::Release);
                }
            }
        }
        if let Some(handle) = self.outbound_thread.take() {
            match handle.join() {
                Ok(io) => self.outbound_io = Some(io),
                Err(_) => {
                    error!("Outbound worker for {} panicked", self.peer);
                    self.shared.torn_down.store(true, Ordering::Release);
                }
            }
        }

        debug!("Stopped buffering for {}", self.peer);
    }

    /// Queues a packet for sending
    ///
    /// Returns false and counts a drop if the outbound queue is full or the
    /// transport has been torn down.
    pub fn provide_packet(&self, packet: Packet) -> bool {
        if self.shared.torn_down.load(Ordering::Acquire) {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let mut outbound = self.shared.outbound.lock();
        if outbound.len() >= self.config.max_buffer_size {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        outbound.push_back(packet);
        self.shared.outbound_ready.notify_one();
        true
    }

    /// Takes the oldest received packet, if any
    pub fn consume_packet(&self) -> Option<Packet> {
        self.shared.inbound.lock().pop_front()
    }

    pub fn has_inbound(&self) -> bool {
        !self.shared.inbound.lock().is_empty()
    }

    pub fn state(&self) -> BufferState {
        if self.shared.torn_down.load(Ordering::Acquire) {
            BufferState::TornDown
        } else if self.is_running() {
            BufferState::Active
        } else {
            BufferState::Idle
        }
    }

    pub fn statistics(&self) -> BufferStatistics {
        let inbound = self.shared.inbound.lock().len();
        let outbound = self.shared.outbound.lock().len();
        BufferStatistics {
            sent: self.shared.sent.load(Ordering::Relaxed),
            received: self.shared.received.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            inbound,
            outbound,
        }
    }

    pub fn log_statistics(&self) {
        let stats = self.statistics();
        info!(
            "Connection {}: {} sent, {} received, {} dropped, {} inbound / {} outbound in flight",
            self.peer, stats.sent, stats.received, stats.dropped, stats.inbound, stats.outbound
        );
    }

    fn is_running(&self) -> bool {
        self.inbound_thread.is_some() || self.outbound_thread.is_some()
    }
}

impl Drop for ConnectionBuffer {
    fn drop(&mut self) {
        self.stop_buffering();
    }
}

fn inbound_loop(
    peer: NetAddress,
    mut io: Box<dyn InboundIo>,
    shared: Arc<Shared>,
    max_buffer_size: usize,
    max_packet_size: usize,
) -> Box<dyn InboundIo> {
    let mut buffer = vec![0u8; max_packet_size];

    while !shared.should_die.load(Ordering::Acquire) {
        match io.do_inbound(&mut buffer) {
            Ok(Inbound::Packet(packet)) => {
                shared.received.fetch_add(1, Ordering::Relaxed);
                let mut inbound = shared.inbound.lock();
                if inbound.len() >= max_buffer_size {
                    shared.dropped.fetch_add(1, Ordering::Relaxed);
                } else {
                    inbound.push_back(packet);
                }
            }
            Ok(Inbound::Idle) => {}
            Ok(Inbound::Closed) => {
                info!("Connection to {} closed by remote end", peer);
                shared.torn_down.store(true, Ordering::Release);
                break;
            }
            Err(e) => {
                warn!("Receive from {} failed, tearing connection down: {}", peer, e);
                shared.torn_down.store(true, Ordering::Release);
                break;
            }
        }
    }

    io
}

fn outbound_loop(
    mut io: Box<dyn OutboundIo>,
    shared: Arc<Shared>,
    poll_interval: Duration,
) -> Box<dyn OutboundIo> {
    loop {
        let packet = {
            let mut outbound = shared.outbound.lock();
            loop {
                if let Some(packet) = outbound.pop_front() {
                    break Some(packet);
                }
                if shared.should_die.load(Ordering::Acquire) {
                    break None;
                }
                shared.outbound_ready.wait_for(&mut outbound, poll_interval);
            }
        };

        let Some(packet) = packet else {
            break;
        };

        match io.do_outbound(&packet) {
            Ok(()) => {
                shared.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("Send to {} failed, tearing connection down: {}", packet.addr, e);
                shared.torn_down.store(true, Ordering::Release);
                break;
            }
        }
    }

    io
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn test_addr() -> NetAddress {
        "127.0.0.1:8080".parse().unwrap()
    }

    /// Hands out scripted receive results, idling once the script runs out
    struct ScriptedInbound {
        script: Arc<Mutex<VecDeque<Inbound>>>,
    }

    impl InboundIo for ScriptedInbound {
        fn do_inbound(&mut self, _buffer: &mut [u8]) -> io::Result<Inbound> {
            match self.script.lock().pop_front() {
                Some(step) => Ok(step),
                None => {
                    thread::sleep(Duration::from_millis(1));
                    Ok(Inbound::Idle)
                }
            }
        }
    }

    /// Records every packet written to it
    struct RecordingOutbound {
        sent: Arc<Mutex<Vec<Packet>>>,
        fail: bool,
    }

    impl OutboundIo for RecordingOutbound {
        fn do_outbound(&mut self, packet: &Packet) -> io::Result<()> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"));
            }
            self.sent.lock().push(packet.clone());
            Ok(())
        }
    }

    struct Harness {
        buffer: ConnectionBuffer,
        script: Arc<Mutex<VecDeque<Inbound>>>,
        sent: Arc<Mutex<Vec<Packet>>>,
    }

    fn harness(max_buffer_size: usize, fail_sends: bool) -> Harness {
        let script = Arc::new(Mutex::new(VecDeque::new()));
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut buffer = ConnectionBuffer::new(
            test_addr(),
            ScriptedInbound {
                script: Arc::clone(&script),
            },
            RecordingOutbound {
                sent: Arc::clone(&sent),
                fail: fail_sends,
            },
        );
        buffer.set_max_buffer_size(max_buffer_size);
        Harness {
            buffer,
            script,
            sent,
        }
    }

    fn wait_until(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    fn numbered(n: u8) -> Packet {
        Packet::new(test_addr(), &[n])
    }

    #[test]
    fn test_overflow_drops_and_counts() {
        let h = harness(4, false);

        let accepted = (0..10).filter(|n| h.buffer.provide_packet(numbered(*n))).count();

        let stats = h.buffer.statistics();
        assert_eq!(accepted, 4);
        assert_eq!(stats.outbound, 4);
        assert_eq!(stats.dropped, 6);
    }

    #[test]
    fn test_stop_without_start_is_safe() {
        let mut h = harness(4, false);
        h.buffer.stop_buffering();
        h.buffer.stop_buffering();
        assert_eq!(h.buffer.state(), BufferState::Idle);
    }

    #[test]
    fn test_consume_on_empty_queue() {
        let h = harness(4, false);
        assert!(h.buffer.consume_packet().is_none());
        assert!(!h.buffer.has_inbound());
    }

    #[test]
    fn test_inbound_preserves_receipt_order() {
        let mut h = harness(16, false);
        h.script
            .lock()
            .extend((0..5).map(|n| Inbound::Packet(numbered(n))));

        h.buffer.start_buffering().unwrap();
        assert_eq!(h.buffer.state(), BufferState::Active);
        assert!(wait_until(|| h.buffer.statistics().inbound == 5));

        for n in 0..5 {
            assert_eq!(h.buffer.consume_packet().unwrap().data(), &[n]);
        }
        assert!(h.buffer.consume_packet().is_none());

        h.buffer.stop_buffering();
        assert_eq!(h.buffer.state(), BufferState::Idle);
    }

    #[test]
    fn test_inbound_overflow_is_dropped() {
        let mut h = harness(2, false);
        h.script
            .lock()
            .extend((0..5).map(|n| Inbound::Packet(numbered(n))));

        h.buffer.start_buffering().unwrap();
        assert!(wait_until(|| h.buffer.statistics().received == 5));

        let stats = h.buffer.statistics();
        assert_eq!(stats.inbound, 2);
        assert_eq!(stats.dropped, 3);
        assert_eq!(h.buffer.consume_packet().unwrap().data(), &[0]);
        assert_eq!(h.buffer.consume_packet().unwrap().data(), &[1]);
    }

    #[test]
    fn test_outbound_reaches_transport_in_order() {
        let mut h = harness(16, false);
        h.buffer.start_buffering().unwrap();

        for n in 0..8 {
            assert!(h.buffer.provide_packet(numbered(n)));
        }
        assert!(wait_until(|| h.sent.lock().len() == 8));

        let sent: Vec<u8> = h.sent.lock().iter().map(|p| p.data()[0]).collect();
        assert_eq!(sent, (0..8).collect::<Vec<u8>>());
        assert_eq!(h.buffer.statistics().sent, 8);
    }

    #[test]
    fn test_stop_flushes_queued_packets() {
        let mut h = harness(16, false);
        for n in 0..3 {
            assert!(h.buffer.provide_packet(numbered(n)));
        }

        h.buffer.start_buffering().unwrap();
        h.buffer.stop_buffering();

        assert_eq!(h.sent.lock().len(), 3);
        assert_eq!(h.buffer.statistics().outbound, 0);
    }

    #[test]
    fn test_remote_close_tears_down() {
        let mut h = harness(16, false);
        h.script.lock().push_back(Inbound::Packet(numbered(1)));
        h.script.lock().push_back(Inbound::Closed);

        h.buffer.start_buffering().unwrap();
        assert!(wait_until(|| h.buffer.state() == BufferState::TornDown));

        // Already received packets can still be drained
        assert_eq!(h.buffer.consume_packet().unwrap().data(), &[1]);
        assert!(!h.buffer.provide_packet(numbered(2)));

        h.buffer.stop_buffering();
        assert_eq!(h.buffer.state(), BufferState::TornDown);
        assert!(h.buffer.start_buffering().is_err());
    }

    #[test]
    fn test_send_failure_tears_down() {
        let mut h = harness(16, true);
        h.buffer.start_buffering().unwrap();

        assert!(h.buffer.provide_packet(numbered(1)));
        assert!(wait_until(|| h.buffer.state() == BufferState::TornDown));
        assert_eq!(h.buffer.statistics().sent, 0);
    }

    #[test]
    fn test_restart_after_stop() {
        let mut h = harness(16, false);
        h.buffer.start_buffering().unwrap();
        h.buffer.stop_buffering();

        h.buffer.start_buffering().unwrap();
        assert_eq!(h.buffer.state(), BufferState::Active);
        h.script.lock().push_back(Inbound::Packet(numbered(9)));
        assert!(wait_until(|| h.buffer.has_inbound()));
        assert_eq!(h.buffer.consume_packet().unwrap().data(), &[9]);
    }

    #[test]
    fn test_drop_joins_workers() {
        let mut h = harness(16, false);
        h.buffer.start_buffering().unwrap();
        let sent = Arc::clone(&h.sent);
        assert!(h.buffer.provide_packet(numbered(4)));

        drop(h);
        assert_eq!(sent.lock().len(), 1);
    }
}
