use std::time::Duration;

/// Packets buffered per direction before new ones start being dropped
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 256;
/// Largest payload a connection will receive
pub const DEFAULT_MAX_PACKET_SIZE: usize = 2048;
/// How long a worker waits on an idle transport before rechecking for shutdown
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Upper bound on a single blocking write
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Tuning shared by every connection buffer and transport binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
    pub max_buffer_size: usize,
    pub max_packet_size: usize,
    pub poll_interval: Duration,
    pub write_timeout: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl BufferConfig {
    pub fn with_max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.max_buffer_size = max_buffer_size;
        self
    }

    pub fn with_max_packet_size(mut self, max_packet_size: usize) -> Self {
        self.max_packet_size = max_packet_size;
        self
    }
}
