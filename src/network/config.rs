//! Tunables for one network session

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::frame::DEFAULT_MAX_FRAME_SIZE;

/// Which application channels the coordinator services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// Broadcast outgoing payloads and deliver incoming ones
    #[default]
    Both,
    /// Broadcast only; payloads received from peers are discarded
    SendOnly,
    /// Deliver only; the outgoing channel is never drained
    ReceiveOnly,
}

impl Direction {
    pub fn sends(&self) -> bool {
        !matches!(self, Direction::ReceiveOnly)
    }

    pub fn receives(&self) -> bool {
        !matches!(self, Direction::SendOnly)
    }
}

/// Network session configuration
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Interface to bind the listener on
    pub bind_host: String,

    /// Largest accepted frame payload in bytes
    pub max_frame_size: u32,

    /// Timeout for one outbound connect attempt
    pub connect_timeout: Duration,

    /// Timeout for the identity exchange on a fresh connection
    pub handshake_timeout: Duration,

    /// First dialer retry delay
    pub initial_backoff: Duration,

    /// Upper bound of the dialer retry delay
    pub max_backoff: Duration,

    /// Capacity of each link's outbound queue
    pub outbound_queue_capacity: usize,

    /// How long a closing link may keep flushing queued frames
    pub drain_timeout: Duration,

    /// Traffic direction serviced by the coordinator
    pub direction: Direction,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(10),
            outbound_queue_capacity: 256,
            drain_timeout: Duration::from_millis(500),
            direction: Direction::Both,
        }
    }
}
