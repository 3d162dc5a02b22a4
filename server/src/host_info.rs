//! Per-peer session bookkeeping kept by the server

use shared::{HostId, NetAddress};
use std::time::{Duration, Instant};

/// Session record for a peer that holds an identity
#[derive(Debug, Clone)]
pub struct HostInfo {
    /// Network address replies are sent to
    pub addr: NetAddress,
    pub id: HostId,
    /// Last time any packet arrived from this peer
    pub last_received: Instant,
    /// Measured round-trip latency; nothing measures it yet
    pub latency: Duration,
}

impl HostInfo {
    pub fn new(addr: NetAddress, id: HostId) -> Self {
        Self {
            addr,
            id,
            last_received: Instant::now(),
            latency: Duration::ZERO,
        }
    }

    pub fn refresh_last_received(&mut self) {
        self.last_received = Instant::now();
    }

    /// True if nothing has arrived from the peer within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_received.elapsed() > timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> NetAddress {
        "127.0.0.1:8080".parse().unwrap()
    }

    #[test]
    fn test_host_info_creation() {
        let info = HostInfo::new(test_addr(), 3);

        assert_eq!(info.addr, test_addr());
        assert_eq!(info.id, 3);
        assert_eq!(info.latency, Duration::ZERO);
        assert!(info.last_received.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_host_timeout() {
        let mut info = HostInfo::new(test_addr(), 1);
        assert!(!info.is_timed_out(Duration::from_secs(1)));

        info.last_received = Instant::now() - Duration::from_secs(2);
        assert!(info.is_timed_out(Duration::from_secs(1)));

        info.refresh_last_received();
        assert!(!info.is_timed_out(Duration::from_secs(1)));
    }
}
