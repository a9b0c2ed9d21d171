//! Encoding for the wire protocol.
//!
//! [`FrameBuilder`] is the producer-side counterpart of
//! [`crate::FrameReader`]: it lays out the header, seals sensitive frames, and
//! lets tests deliberately break individual fields.

use crate::checksum;
use crate::error::FrameError;
use crate::header::{FrameHeader, Options, HEADER_LEN, MAX_BODY_LEN};
use bytes::{BufMut, Bytes, BytesMut};

/// Frame builder for constructing wire frames
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    header: FrameHeader,
    checksum_override: Option<u16>,
    payload: Bytes,
}

impl FrameBuilder {
    /// Create a new frame builder for `payload`
    pub fn new(payload: Bytes) -> Self {
        Self {
            header: FrameHeader::new(0),
            checksum_override: None,
            payload,
        }
    }

    /// Replace the whole options byte
    pub fn options(mut self, options: Options) -> Self {
        self.header.options = options;
        self
    }

    /// Set or clear the sensitive bit
    pub fn sensitive(mut self, sensitive: bool) -> Self {
        self.header.options.set(Options::SENSITIVE, sensitive);
        self
    }

    /// Write `value` into the checksum field instead of sealing
    pub fn checksum(mut self, value: u16) -> Self {
        self.checksum_override = Some(value);
        self
    }

    /// Set the padding field
    pub fn padding(mut self, padding: u16) -> Self {
        self.header.padding = padding;
        self
    }

    /// Set the magic byte
    pub fn magic(mut self, magic: u8) -> Self {
        self.header.magic = magic;
        self
    }

    /// Build the frame
    pub fn build(mut self) -> Result<Bytes, FrameError> {
        if self.payload.len() > MAX_BODY_LEN {
            return Err(FrameError::Size(self.payload.len()));
        }
        self.header.length = self.payload.len() as u16;

        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        self.header.encode(&mut buf);
        buf.put_slice(&self.payload);

        match self.checksum_override {
            Some(value) => {
                buf[4..6].copy_from_slice(&value.to_be_bytes());
            }
            None if self.header.is_sensitive() => {
                checksum::seal(&mut buf);
            }
            None => {}
        }

        Ok(buf.freeze())
    }
}
