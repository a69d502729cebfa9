
use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};
use heapless::Vec;

use crate::checksum::Checksum;
use crate::link::{NicAddr, NIC_ADDR_LEN};

/// Maximum payload length
pub const WIFI_MAXDATA: usize = 2312;

/// Length of the frame header (all fields preceding the payload)
pub const HEADER_LEN: usize = 20;

/// Maximum length of an encoded frame
pub const MAX_FRAME_LEN: usize = HEADER_LEN + WIFI_MAXDATA;

const CONTROL_OFFSET: usize = 0;
const LENGTH_OFFSET: usize = 1;
const DEST_OFFSET: usize = 3;
const SRC_OFFSET: usize = DEST_OFFSET + NIC_ADDR_LEN;
const CHECKSUM_OFFSET: usize = SRC_OFFSET + NIC_ADDR_LEN;
const COLLISIONS_OFFSET: usize = CHECKSUM_OFFSET + 4;

bitflags! {
    /// Frame control flags
    pub struct Control: u8 {
        /// Sent by a member of the distribution system (an access point)
        const FROM_DS = 0b0000_0001;
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Payload is empty
    Empty,
    /// Payload or frame exceeds the maximum length
    TooLong(usize),
    /// Not enough bytes for a frame header
    NotEnoughBytes,
    /// Header declares an invalid payload length
    InvalidLength(u16),
    /// Header declares more payload than was received
    Truncated{ expected: usize, actual: usize },
    /// Output buffer too small for the encoded frame
    BufferTooSmall,
}

/// WiFi frame with owned payload storage.
///
/// Wire layout (little endian, packed):
///
/// | offset | size | field      |
/// |--------|------|------------|
/// | 0      | 1    | control    |
/// | 1      | 2    | length     |
/// | 3      | 6    | dest       |
/// | 9      | 6    | src        |
/// | 15     | 4    | checksum   |
/// | 19     | 1    | collisions |
/// | 20     | ..   | payload    |
///
/// Only `HEADER_LEN + length` bytes are ever encoded.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub control: Control,

    /// Address of the receiver
    pub dest: NicAddr,

    /// Address of the transmitter
    pub src: NicAddr,

    /// CRC-32 over the header (with this field zeroed) and payload
    pub checksum: u32,

    /// Number of collisions this frame has experienced
    pub collisions: u8,

    payload: Vec<u8, WIFI_MAXDATA>,
}

impl Frame {
    /// Create a new frame, the checksum is left unset until [`Frame::seal`]
    pub fn new(dest: NicAddr, src: NicAddr, from_ds: bool, data: &[u8]) -> Result<Self, FrameError> {
        if data.is_empty() {
            return Err(FrameError::Empty)
        }

        let payload = Vec::from_slice(data).map_err(|_e| FrameError::TooLong(data.len()))?;

        let mut control = Control::empty();
        control.set(Control::FROM_DS, from_ds);

        Ok(Frame {
            control,
            dest,
            src,
            checksum: 0,
            collisions: 0,
            payload,
        })
    }

    /// Fixed size of the frame header
    pub const fn header_len() -> usize {
        HEADER_LEN
    }

    /// Number of bytes placed on the wire for this frame
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    pub fn from_ds(&self) -> bool {
        self.control.contains(Control::FROM_DS)
    }

    /// Payload length
    pub fn length(&self) -> u16 {
        self.payload.len() as u16
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Compute the frame checksum
    pub fn compute_checksum<C: Checksum>(&self, crc: &C) -> u32 {
        let mut buff = [0u8; MAX_FRAME_LEN];
        let n = self.write(&mut buff, 0);

        crc.crc32(&buff[..n])
    }

    /// Compute and store the frame checksum
    pub fn seal<C: Checksum>(&mut self, crc: &C) {
        self.checksum = self.compute_checksum(crc);
    }

    /// Check the stored checksum against the frame contents
    pub fn verify<C: Checksum>(&self, crc: &C) -> bool {
        self.checksum == self.compute_checksum(crc)
    }

    /// Encode the frame, returning the number of bytes written
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, FrameError> {
        if buf.len() < self.wire_len() {
            return Err(FrameError::BufferTooSmall)
        }

        Ok(self.write(buf, self.checksum))
    }

    /// Decode a frame from received bytes.
    ///
    /// The checksum is not verified, see [`Frame::verify`].
    /// Bytes beyond the declared payload length are ignored.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() > MAX_FRAME_LEN {
            return Err(FrameError::TooLong(buf.len()))
        }
        if buf.len() < HEADER_LEN {
            return Err(FrameError::NotEnoughBytes)
        }

        let length = LittleEndian::read_u16(&buf[LENGTH_OFFSET..]);
        if length == 0 || length as usize > WIFI_MAXDATA {
            return Err(FrameError::InvalidLength(length))
        }

        let end = HEADER_LEN + length as usize;
        if buf.len() < end {
            return Err(FrameError::Truncated{ expected: end, actual: buf.len() })
        }

        let mut dest = NicAddr::default();
        dest.0.copy_from_slice(&buf[DEST_OFFSET..][..NIC_ADDR_LEN]);

        let mut src = NicAddr::default();
        src.0.copy_from_slice(&buf[SRC_OFFSET..][..NIC_ADDR_LEN]);

        let payload = Vec::from_slice(&buf[HEADER_LEN..end])
            .map_err(|_e| FrameError::TooLong(length as usize))?;

        Ok(Frame {
            control: Control::from_bits_truncate(buf[CONTROL_OFFSET]),
            dest,
            src,
            checksum: LittleEndian::read_u32(&buf[CHECKSUM_OFFSET..]),
            collisions: buf[COLLISIONS_OFFSET],
            payload,
        })
    }

    // Caller ensures `buf` holds at least `wire_len()` bytes
    fn write(&self, buf: &mut [u8], checksum: u32) -> usize {
        buf[CONTROL_OFFSET] = self.control.bits();
        LittleEndian::write_u16(&mut buf[LENGTH_OFFSET..], self.length());
        buf[DEST_OFFSET..][..NIC_ADDR_LEN].copy_from_slice(&self.dest.0);
        buf[SRC_OFFSET..][..NIC_ADDR_LEN].copy_from_slice(&self.src.0);
        LittleEndian::write_u32(&mut buf[CHECKSUM_OFFSET..], checksum);
        buf[COLLISIONS_OFFSET] = self.collisions;

        let n = self.wire_len();
        buf[HEADER_LEN..n].copy_from_slice(&self.payload);

        n
    }
}
