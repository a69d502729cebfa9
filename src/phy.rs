//! Physical layer API
//!
//! [`Phy`] is the narrow interface a station uses to sense and write to its
//! link. [`RadioPhy`] adapts any `radio` HAL device to it.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use radio::{Busy, Rssi, Transmit};

use crate::log::{trace, debug};
use crate::{FmtError, LinkId};

/// Physical layer interface, keyed by link
pub trait Phy {
    type Error: FmtError;

    /// Check whether the medium on `link` is currently occupied
    fn carrier_sense(&mut self, link: LinkId) -> Result<bool, Self::Error>;

    /// Write a complete frame to `link`, only `data.len()` bytes are transmitted
    fn write_physical(&mut self, link: LinkId, data: &[u8]) -> Result<(), Self::Error>;
}

impl <P: Phy + ?Sized> Phy for &mut P {
    type Error = P::Error;

    fn carrier_sense(&mut self, link: LinkId) -> Result<bool, Self::Error> {
        (**self).carrier_sense(link)
    }

    fn write_physical(&mut self, link: LinkId, data: &[u8]) -> Result<(), Self::Error> {
        (**self).write_physical(link, data)
    }
}

/// Configuration for radio backed links
#[derive(Clone, PartialEq, Debug)]
pub struct RadioPhyConfig {
    /// RSSI threshold for a channel to be determined to be clear
    pub channel_clear_threshold: i16,
}

impl Default for RadioPhyConfig {
    fn default() -> Self {
        Self {
            channel_clear_threshold: -90,
        }
    }
}

/// [`Phy`] implementation over a single `radio` device serving one link
#[derive(Debug, Clone, PartialEq)]
pub struct RadioPhy<R> {
    radio: R,
    config: RadioPhyConfig,
}

impl <R> RadioPhy<R> {
    pub fn new(radio: R, config: RadioPhyConfig) -> Self {
        Self{ radio, config }
    }

    /// Release the underlying radio
    pub fn free(self) -> R {
        self.radio
    }
}

impl <R, E> Phy for RadioPhy<R>
where
    R: Busy<Error=E> + Rssi<Error=E> + Transmit<Error=E>,
    E: FmtError,
{
    type Error = E;

    fn carrier_sense(&mut self, link: LinkId) -> Result<bool, Self::Error> {
        // A radio that is mid-receive has found a carrier already
        if self.radio.is_busy()? {
            debug!("Link {} radio busy", link);
            return Ok(true)
        }

        // Otherwise check that we can't hear anyone else using the channel
        let rssi = self.radio.poll_rssi()?;
        let busy = rssi > self.config.channel_clear_threshold;

        trace!("Link {} rssi: {} busy: {}", link, rssi, busy);

        Ok(busy)
    }

    fn write_physical(&mut self, link: LinkId, data: &[u8]) -> Result<(), Self::Error> {
        debug!("Link {} start transmit ({} bytes)", link, data.len());

        self.radio.start_transmit(data)
    }
}

#[cfg(any(test, feature="mocks"))]
pub mod mock {
    use std::vec::Vec;
    use std::sync::{Arc, Mutex};

    use crate::LinkId;
    use super::Phy;

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum MockPhyError {
        SenseFailed,
        WriteFailed,
    }

    #[derive(Debug, Default)]
    struct Inner {
        busy: bool,
        busy_count: usize,
        senses: usize,
        fail_sense: bool,
        fail_write: bool,
        writes: Vec<(LinkId, Vec<u8>)>,
    }

    /// Mock physical layer to assist with testing.
    ///
    /// Clones share state. Records every write and answers carrier sense
    /// from a scripted busy count and a fallback busy flag.
    #[derive(Clone, Debug)]
    pub struct MockPhy(Arc<Mutex<Inner>>);

    impl MockPhy {
        pub fn new() -> Self {
            Self(Arc::new(Mutex::new(Inner::default())))
        }

        /// Report the medium busy (or free) until changed
        pub fn set_busy(&mut self, busy: bool) {
            self.0.lock().unwrap().busy = busy;
        }

        /// Report the medium busy for the next `n` senses, ahead of the busy flag
        pub fn busy_for(&mut self, n: usize) {
            self.0.lock().unwrap().busy_count = n;
        }

        pub fn fail_sense(&mut self, fail: bool) {
            self.0.lock().unwrap().fail_sense = fail;
        }

        pub fn fail_write(&mut self, fail: bool) {
            self.0.lock().unwrap().fail_write = fail;
        }

        /// Number of carrier sense queries
        pub fn senses(&self) -> usize {
            self.0.lock().unwrap().senses
        }

        /// Frames written to the medium
        pub fn writes(&self) -> Vec<(LinkId, Vec<u8>)> {
            self.0.lock().unwrap().writes.clone()
        }
    }

    impl Phy for MockPhy {
        type Error = MockPhyError;

        fn carrier_sense(&mut self, _link: LinkId) -> Result<bool, Self::Error> {
            let mut inner = self.0.lock().unwrap();
            inner.senses += 1;

            if inner.fail_sense {
                return Err(MockPhyError::SenseFailed)
            }

            if inner.busy_count > 0 {
                inner.busy_count -= 1;
                return Ok(true)
            }

            Ok(inner.busy)
        }

        fn write_physical(&mut self, link: LinkId, data: &[u8]) -> Result<(), Self::Error> {
            let mut inner = self.0.lock().unwrap();

            if inner.fail_write {
                return Err(MockPhyError::WriteFailed)
            }

            inner.writes.push((link, data.to_vec()));

            Ok(())
        }
    }
}
