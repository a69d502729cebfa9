//! Node link table types

use core::fmt;

use strum::{Display, EnumString};

use crate::LinkId;

/// Hardware (NIC) address length in bytes
pub const NIC_ADDR_LEN: usize = 6;

/// Hardware address of a network interface
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NicAddr(pub [u8; NIC_ADDR_LEN]);

impl NicAddr {
    pub const BROADCAST: NicAddr = NicAddr([0xff; NIC_ADDR_LEN]);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; NIC_ADDR_LEN]> for NicAddr {
    fn from(a: [u8; NIC_ADDR_LEN]) -> Self {
        NicAddr(a)
    }
}

impl fmt::Debug for NicAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a[0], a[1], a[2], a[3], a[4], a[5])
    }
}

/// Physical link types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkKind {
    Loopback,
    Wan,
    Lan,
    Wlan,
}

/// Link table entry
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkInfo {
    pub kind: LinkKind,
    pub address: NicAddr,
}

impl LinkInfo {
    pub fn new(kind: LinkKind, address: NicAddr) -> Self {
        Self{ kind, address }
    }

    pub fn is_wireless(&self) -> bool {
        self.kind == LinkKind::Wlan
    }
}

/// Directory of the links available on the local node
pub trait Directory {
    /// Fetch link information, `None` if the link does not exist
    fn link_info(&self, link: LinkId) -> Option<LinkInfo>;
}

/// Link tables indexed by link id
impl Directory for [LinkInfo] {
    fn link_info(&self, link: LinkId) -> Option<LinkInfo> {
        self.get(link as usize).copied()
    }
}

impl <const N: usize> Directory for [LinkInfo; N] {
    fn link_info(&self, link: LinkId) -> Option<LinkInfo> {
        self[..].link_info(link)
    }
}

impl <D: Directory + ?Sized> Directory for &D {
    fn link_info(&self, link: LinkId) -> Option<LinkInfo> {
        (**self).link_info(link)
    }
}
