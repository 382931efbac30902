//! Timing knobs for a single fetch.

use std::time::Duration;

/// How long a fetch may wait for the server to answer the connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a fetch waits for the first report once connected.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(1);

/// Configuration bundle for the fetch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Upper bound on TCP connect and, separately, on the cookie exchange.
    pub connect_timeout: Duration,
    /// Upper bound on waiting for a report after the handshake.
    pub deadline: Duration,
}

impl FetchConfig {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            deadline: DEFAULT_DEADLINE,
        }
    }
}
