//! CTMP wire framing, validation, and checksums for the relay.
//!
//! This crate holds everything the relay needs to decide whether a run of
//! bytes from the producer is a deliverable message: the fixed header layout,
//! the one's-complement checksum, a frame reader with full-read semantics, and
//! a builder for producing frames.
//!
//! ## Wire Format
//!
//! ```text
//! +--------+------+----------+--------------------------------------+
//! | offset | size | field    | notes                                |
//! +--------+------+----------+--------------------------------------+
//! | 0      | 1    | magic    | must equal 0xCC                      |
//! | 1      | 1    | options  | bit 0x40 set => checksum enforced    |
//! | 2-3    | 2    | length   | big-endian body length, max 65535    |
//! | 4-5    | 2    | checksum | big-endian, checked if sensitive     |
//! | 6-7    | 2    | padding  | must be 0x00 0x00                    |
//! | 8..    | len  | body     | opaque payload                       |
//! +--------+------+----------+--------------------------------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checksum;
pub mod codec;
pub mod error;
pub mod frame;
pub mod header;
pub mod validate;

// Re-export main types
pub use codec::FrameBuilder;
pub use error::{ErrorKind, FrameError};
pub use frame::{Frame, FrameReader};
pub use header::{
    FrameHeader, Options, CHECKSUM_OFFSET, CHECKSUM_SENTINEL, HEADER_LEN, MAGIC, MAX_BODY_LEN,
};
pub use validate::{check_header, validate};
