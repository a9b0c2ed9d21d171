//! Message framing for the wire protocol.
//!
//! A [`Frame`] only exists once it has passed every check in
//! [`crate::validate`]; it keeps the exact bytes that arrived so the relay can
//! forward them without re-encoding.

use crate::error::FrameError;
use crate::header::{FrameHeader, HEADER_LEN, MAX_BODY_LEN};
use crate::validate::{check_header, validate};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Validated wire frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded header
    pub header: FrameHeader,
    /// Header followed by body, exactly as received
    raw: Bytes,
}

impl Frame {
    pub(crate) fn from_parts(header: FrameHeader, raw: Bytes) -> Self {
        Self { header, raw }
    }

    /// Header and body bytes as received
    pub fn as_bytes(&self) -> &Bytes {
        &self.raw
    }

    /// Consume the frame, returning its wire bytes
    pub fn into_bytes(self) -> Bytes {
        self.raw
    }

    /// Body bytes
    pub fn body(&self) -> &[u8] {
        &self.raw[HEADER_LEN..]
    }

    /// Encoded size including the header
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Always false: a frame carries at least its header
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Reads validated frames from a byte stream
#[derive(Debug, Clone)]
pub struct FrameReader {
    max_body_len: usize,
}

impl FrameReader {
    /// Create a reader enforcing the protocol body limit
    pub fn new() -> Self {
        Self {
            max_body_len: MAX_BODY_LEN,
        }
    }

    /// Tighten the body limit. Values above [`MAX_BODY_LEN`] are clamped.
    pub fn with_max_body_len(mut self, max_body_len: usize) -> Self {
        self.max_body_len = max_body_len.min(MAX_BODY_LEN);
        self
    }

    /// Body limit currently enforced
    pub fn max_body_len(&self) -> usize {
        self.max_body_len
    }

    /// Read exactly one frame from `reader`.
    ///
    /// Header checks run before the body is read, so an oversized or
    /// malformed header never causes a body allocation.
    pub async fn read_frame<R>(&self, reader: &mut R) -> Result<Frame, FrameError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut raw_header = [0u8; HEADER_LEN];
        read_full(reader, &mut raw_header).await?;

        let header = FrameHeader::decode(&raw_header);
        check_header(&header, self.max_body_len)?;

        let mut body = BytesMut::zeroed(header.body_len());
        read_full(reader, &mut body).await?;
        trace!("Read frame header {:?} with {} body bytes", header, body.len());

        validate(raw_header, body.freeze())
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Fill `buf` completely, retrying short reads until end-of-stream.
///
/// Unlike `AsyncReadExt::read_exact`, end-of-stream reports how many bytes
/// arrived in [`FrameError::Eof`].
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(FrameError::Eof {
                needed: buf.len(),
                got: filled,
            });
        }
        filled += n;
    }
    Ok(())
}
