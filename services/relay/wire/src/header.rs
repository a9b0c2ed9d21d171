//! Fixed 8-byte CTMP header.
//!
//! The header is parsed without judgement here: every byte pattern decodes
//! into a [`FrameHeader`]. Deciding whether the fields are acceptable is the
//! job of [`crate::validate`].

use bitflags::bitflags;
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// Magic sentinel carried in byte 0 of every frame
pub const MAGIC: u8 = 0xCC;

/// Header size in bytes
pub const HEADER_LEN: usize = 8;

/// Largest body a frame may declare
pub const MAX_BODY_LEN: usize = 65535;

/// Byte offset of the checksum field within the header
pub const CHECKSUM_OFFSET: usize = 4;

/// Value the checksum field holds while the checksum is being computed
pub const CHECKSUM_SENTINEL: [u8; 2] = [MAGIC, MAGIC];

bitflags! {
    /// Options byte. Bits other than the ones named here are carried through untouched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Options: u8 {
        /// Checksum is enforced for this frame
        const SENSITIVE = 0x40;
    }
}

/// Decoded CTMP header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// Must equal [`MAGIC`]
    pub magic: u8,
    /// Option bits
    pub options: Options,
    /// Number of body bytes following the header
    pub length: u16,
    /// One's-complement checksum, meaningful only for sensitive frames
    pub checksum: u16,
    /// Must be zero
    pub padding: u16,
}

impl FrameHeader {
    /// Create a well-formed header for a body of `length` bytes
    pub fn new(length: u16) -> Self {
        Self {
            magic: MAGIC,
            options: Options::empty(),
            length,
            checksum: 0,
            padding: 0,
        }
    }

    /// Whether the checksum must be verified
    pub fn is_sensitive(&self) -> bool {
        self.options.contains(Options::SENSITIVE)
    }

    /// Declared body length in bytes
    pub fn body_len(&self) -> usize {
        self.length as usize
    }

    /// Encode the header to bytes (big-endian)
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.magic);
        buf.put_u8(self.options.bits());
        buf.put_u16(self.length);
        buf.put_u16(self.checksum);
        buf.put_u16(self.padding);
    }

    /// Decode the header from its raw bytes (big-endian)
    pub fn decode(raw: &[u8; HEADER_LEN]) -> Self {
        let mut buf = &raw[..];
        let magic = buf.get_u8();
        let options = Options::from_bits_retain(buf.get_u8());
        let length = buf.get_u16();
        let checksum = buf.get_u16();
        let padding = buf.get_u16();

        Self {
            magic,
            options,
            length,
            checksum,
            padding,
        }
    }
}
