
use rand_core::RngCore;

use crate::Ts;
use super::config::Config;

/// Binary exponential backoff policy.
///
/// Owns the random source for a station. The source is supplied once and
/// only ever advanced, never reseeded per decision.
#[derive(Debug, Clone)]
pub struct Backoff<R> {
    rng: R,
    slot_time: Ts,
    max_exponent: u8,
    max_collisions: u8,
}

impl <R: RngCore> Backoff<R> {
    pub fn new(rng: R, config: &Config) -> Self {
        Self {
            rng,
            slot_time: config.slot_time,
            // Keep the window within u64 range
            max_exponent: config.max_backoff_exponent.min(63),
            max_collisions: config.max_collisions,
        }
    }

    /// Number of slots in the backoff window for a collision count,
    /// `None` once the frame should be abandoned
    pub fn window(&self, collisions: u8) -> Option<u64> {
        if collisions >= self.max_collisions {
            return None
        }

        let exp = collisions.min(self.max_exponent);

        Some(1u64 << exp)
    }

    /// Draw a backoff delay for a collision count.
    ///
    /// Returns `slot_time * r` with `r` uniform over `[0, 2^min(collisions, max_exponent))`,
    /// or `None` when `collisions` has reached the drop threshold.
    pub fn delay(&mut self, collisions: u8) -> Option<Ts> {
        let window = self.window(collisions)?;

        // Windows are powers of two so the modulus is unbiased
        let r = self.rng.next_u64() % window;

        // Saturates for oversized slot times
        Some(self.slot_time.saturating_mul(r))
    }
}
