//! Structural and integrity checks for CTMP frames.
//!
//! Checks short-circuit in a fixed order: magic, padding, length, then the
//! checksum for sensitive frames. Only a checksum failure leaves the stream
//! usable; see [`crate::FrameError::is_connection_fatal`].

use crate::checksum;
use crate::error::FrameError;
use crate::frame::Frame;
use crate::header::{FrameHeader, HEADER_LEN, MAGIC, MAX_BODY_LEN};
use bytes::{BufMut, Bytes, BytesMut};

/// Header-only checks that can run before any body byte is read
pub fn check_header(header: &FrameHeader, max_body_len: usize) -> Result<(), FrameError> {
    if header.magic != MAGIC {
        return Err(FrameError::Magic(header.magic));
    }

    if header.padding != 0 {
        return Err(FrameError::Padding(header.padding));
    }

    let limit = max_body_len.min(MAX_BODY_LEN);
    if header.body_len() > limit {
        return Err(FrameError::Size(header.body_len()));
    }

    Ok(())
}

/// Validate a raw header and the body read for it
pub fn validate(raw_header: [u8; HEADER_LEN], body: Bytes) -> Result<Frame, FrameError> {
    let header = FrameHeader::decode(&raw_header);
    check_header(&header, MAX_BODY_LEN)?;

    if body.len() != header.body_len() {
        return Err(FrameError::Length {
            declared: header.body_len(),
            actual: body.len(),
        });
    }

    let mut raw = BytesMut::with_capacity(HEADER_LEN + body.len());
    raw.put_slice(&raw_header);
    raw.put_slice(&body);
    let raw = raw.freeze();

    if header.is_sensitive() {
        let computed = checksum::frame_checksum(&raw);
        if computed != header.checksum {
            return Err(FrameError::Checksum {
                expected: header.checksum,
                computed,
            });
        }
    }

    Ok(Frame::from_parts(header, raw))
}
