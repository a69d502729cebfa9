//! Frame checksum API

/// Checksum trait computes frame check values
pub trait Checksum {
    /// Compute the CRC-32 of the provided data
    fn crc32(&self, data: &[u8]) -> u32;
}

/// IEEE 802.3 CRC-32
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Crc32;

impl Checksum for Crc32 {
    fn crc32(&self, data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }
}

impl <C: Checksum + ?Sized> Checksum for &C {
    fn crc32(&self, data: &[u8]) -> u32 {
        (**self).crc32(data)
    }
}
