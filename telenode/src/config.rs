//! Node configuration and fixed capacities

use crate::time::Duration;

/// Outbound queue depth in frames
pub const TX_QUEUE_CAPACITY: usize = 64;

/// Largest stored transfer payload; longer inbound transfers are truncated to this extent
pub const ARENA_BLOCK_SIZE: usize = 256;

/// Concurrent inbound multi-frame reassemblies
pub const SESSION_COUNT: usize = 8;

/// Each session holds at most one block, plus one completed transfer being routed.
pub const ARENA_BLOCK_COUNT: usize = SESSION_COUNT + 1;

/// Inbound ports the node listens on: the allocation subject plus bridge services
pub const ROUTE_CAPACITY: usize = 8;

/// Port registers exposed through the configuration bridge
pub const REGISTER_CAPACITY: usize = 4;

const _: () = core::assert!(ARENA_BLOCK_COUNT > SESSION_COUNT);
const _: () = core::assert!(ROUTE_CAPACITY >= 1 + REGISTER_CAPACITY);

/// Length of the hardware unique identifier
pub const UNIQUE_ID_LENGTH: usize = 16;

/// Node task configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct Config {
    /// Transceiver device name passed to `Interface::open`
    pub device: &'static str,
    /// Pump wait while negotiating the node address
    pub negotiation_wait: Duration,
    /// Pump wait in steady state
    pub steady_wait: Duration,
    /// Transmission deadline of telemetry records, relative to enqueue time
    pub telemetry_deadline: Duration,
    /// Transmission deadline of allocation requests
    pub allocation_deadline: Duration,
    /// Transmission deadline of bridge responses
    pub response_deadline: Duration,
    /// Duplicate transfer suppression window of inbound sessions
    pub transfer_id_timeout: Duration,
    /// Hardware identifier used to correlate allocation responses
    pub unique_id: [u8; UNIQUE_ID_LENGTH],
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: "can0",
            negotiation_wait: Duration::from_millis(10),
            steady_wait: Duration::from_millis(4000),
            telemetry_deadline: Duration::from_millis(10),
            allocation_deadline: Duration::from_secs(1),
            response_deadline: Duration::from_secs(1),
            transfer_id_timeout: Duration::from_secs(2),
            unique_id: [0; UNIQUE_ID_LENGTH],
        }
    }
}

impl Config {
    pub fn with_unique_id(mut self, unique_id: [u8; UNIQUE_ID_LENGTH]) -> Self {
        self.unique_id = unique_id;
        self
    }

    pub fn with_device(mut self, device: &'static str) -> Self {
        self.device = device;
        self
    }
}
