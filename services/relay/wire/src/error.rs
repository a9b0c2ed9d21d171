//! Wire protocol error types.

use thiserror::Error;

/// How far the damage from a [`FrameError`] reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Short read, I/O error, or disconnect. The connection is gone.
    Stream,
    /// Bad magic, bad padding, or bad length. Framing can no longer be trusted.
    Structural,
    /// Checksum mismatch on an otherwise well-framed message. Only that message is lost.
    Integrity,
}

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum FrameError {
    /// Stream ended before a full header or body arrived
    #[error("stream ended after {got} of {needed} bytes")]
    Eof {
        /// Bytes the read required
        needed: usize,
        /// Bytes that arrived before end-of-stream
        got: usize,
    },

    /// Underlying I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Magic byte is not the protocol sentinel
    #[error("bad magic {0:#04x}")]
    Magic(u8),

    /// Padding bytes nonzero
    #[error("padding nonzero: {0:#06x}")]
    Padding(u16),

    /// Size limit exceeded
    #[error("size limit exceeded: {0}")]
    Size(usize),

    /// Declared length disagrees with the body that was read
    #[error("length mismatch: header declares {declared}, body has {actual}")]
    Length {
        /// Length field from the header
        declared: usize,
        /// Bytes actually present
        actual: usize,
    },

    /// Checksum mismatch on a sensitive frame
    #[error("checksum mismatch: header {expected:#06x}, computed {computed:#06x}")]
    Checksum {
        /// Value carried in the header
        expected: u16,
        /// Value recomputed over the frame
        computed: u16,
    },
}

impl FrameError {
    /// Classify this error into the relay's recovery scopes
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrameError::Eof { .. } | FrameError::Io(_) => ErrorKind::Stream,
            FrameError::Magic(_)
            | FrameError::Padding(_)
            | FrameError::Size(_)
            | FrameError::Length { .. } => ErrorKind::Structural,
            FrameError::Checksum { .. } => ErrorKind::Integrity,
        }
    }

    /// Whether the connection that produced this error must be dropped
    pub fn is_connection_fatal(&self) -> bool {
        self.kind() != ErrorKind::Integrity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let eof = FrameError::Eof { needed: 8, got: 3 };
        assert_eq!(eof.kind(), ErrorKind::Stream);
        assert!(eof.is_connection_fatal());

        assert_eq!(FrameError::Magic(0xAB).kind(), ErrorKind::Structural);
        assert_eq!(FrameError::Padding(1).kind(), ErrorKind::Structural);
        assert!(FrameError::Size(70_000).is_connection_fatal());

        let csum = FrameError::Checksum {
            expected: 1,
            computed: 2,
        };
        assert_eq!(csum.kind(), ErrorKind::Integrity);
        assert!(!csum.is_connection_fatal());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(FrameError::Magic(0xAB).to_string(), "bad magic 0xab");
        assert_eq!(
            FrameError::Eof { needed: 8, got: 3 }.to_string(),
            "stream ended after 3 of 8 bytes"
        );
    }
}
