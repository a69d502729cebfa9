//! WiFi data link layer for simulated wireless networks.
//!
//! Provides CSMA/CA channel access with binary exponential backoff, the
//! on-wire frame format and receive-side filtering for stations attached
//! to a shared wireless link. The physical layer, timers, carrier sense
//! and the node's link table are supplied by the caller through the
//! [`phy::Phy`], [`timer::Scheduler`] and [`link::Directory`] traits.

#![no_std]

#[cfg(any(test, feature="std"))]
extern crate std;

mod log;
pub use crate::log::FmtError;

pub mod timer;

pub mod link;

pub mod checksum;

pub mod phy;

pub mod wifi;

pub mod error;

pub mod prelude;


/// Timestamps and durations, in simulation time units
pub type Ts = u64;

/// Index of a link on the local node
pub type LinkId = u8;

/// Upper layer interface, receives payloads from the data link layer
pub trait Upper {
    /// Called with the link and payload of each accepted frame
    fn up_from_dll(&mut self, link: LinkId, data: &[u8]);
}

/// Closures are accepted as upper layers
impl <F> Upper for F
where
    F: FnMut(LinkId, &[u8]),
{
    fn up_from_dll(&mut self, link: LinkId, data: &[u8]) {
        (self)(link, data)
    }
}
