//! 16-bit one's-complement checksum.
//!
//! The sum runs over big-endian 16-bit words with end-around carry; an odd
//! trailing byte is padded with a low zero byte. A producer computes the
//! checksum with the header's checksum field set to [`CHECKSUM_SENTINEL`] and
//! then stores the result in that field. Verification repeats the same
//! computation and compares.

use crate::header::{CHECKSUM_OFFSET, CHECKSUM_SENTINEL};

/// Folded one's-complement sum of `bytes`
pub fn folded_sum(bytes: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = bytes.chunks_exact(2);

    for word in &mut words {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
        if sum > 0xFFFF {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }
    }

    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
        if sum > 0xFFFF {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }
    }

    sum as u16
}

/// One's complement of the folded sum. Empty input yields `0xFFFF`.
pub fn checksum(bytes: &[u8]) -> u16 {
    !folded_sum(bytes)
}

/// Checksum of a frame with its checksum field forced to the sentinel
pub fn frame_checksum(frame: &[u8]) -> u16 {
    let mut copy = frame.to_vec();
    if let Some(field) = copy.get_mut(CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2) {
        field.copy_from_slice(&CHECKSUM_SENTINEL);
    }
    checksum(&copy)
}

/// Verify a frame (header followed by body) against `expected`
pub fn verify(frame: &[u8], expected: u16) -> bool {
    frame_checksum(frame) == expected
}

/// Compute the checksum for `frame` and store it in the checksum field
pub fn seal(frame: &mut [u8]) -> u16 {
    let value = frame_checksum(frame);
    if let Some(field) = frame.get_mut(CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2) {
        field.copy_from_slice(&value.to_be_bytes());
    }
    value
}
