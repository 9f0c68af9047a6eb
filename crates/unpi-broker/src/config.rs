use std::time::Duration;

/// Default per-attempt timeout for typed synchronous commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default bound of the raw receive queue.
pub const DEFAULT_RAW_CAPACITY: usize = 256;

/// Controls broker behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerConfig {
    /// When true, every decoded frame and decode error is also queued for
    /// `Broker::receive`.
    pub passthrough: bool,
    /// Most items the raw queue holds. Once full, the oldest is dropped.
    pub raw_capacity: usize,
    /// Initial capacity of the incoming byte buffer.
    pub read_buffer_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            passthrough: true,
            raw_capacity: DEFAULT_RAW_CAPACITY,
            read_buffer_capacity: 1024,
        }
    }
}

/// Timeout and retry bounds applied by `RequestResponder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deadline for each individual attempt.
    pub timeout: Duration,
    /// Attempts made after the first one times out.
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Total number of attempts this policy allows.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_RETRIES,
        }
    }
}
