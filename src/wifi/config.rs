
use crate::Ts;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Backoff slot duration in time units
    pub slot_time: Ts,

    /// Maximum backoff exponent
    ///
    /// The backoff window is 2^min(collisions, max_backoff_exponent) slots,
    /// so every collision count at or above this value shares the largest window
    pub max_backoff_exponent: u8,

    /// Number of collisions at which a frame is dropped rather than retried
    pub max_collisions: u8,

    /// Verify the checksum of received frames before dispatching them
    pub verify_rx_checksum: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slot_time: 40,
            max_backoff_exponent: 10,
            max_collisions: 16,
            verify_rx_checksum: false,
        }
    }
}
