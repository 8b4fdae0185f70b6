//! Error types for the protocol layer.
//!
//! Every variant except `Encode`/`Decode` is a framing error: the byte
//! stream no longer lines up with frame boundaries, so the connection that
//! produced it cannot be trusted for further reads.

/// Errors that can occur while framing or parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Fewer than the 24 header bytes were available.
    #[error("truncated frame header: need 24 bytes, got {got}")]
    TruncatedHeader { got: usize },

    /// The header announced more body bytes than were available.
    #[error("truncated frame body: need {need} bytes, got {got}")]
    TruncatedBody { need: usize, got: usize },

    /// The little-endian size prefix decoded to a negative number.
    #[error("negative body size {0}")]
    NegativeBodySize(i32),

    /// The body exceeds the configured (or representable) maximum.
    #[error("frame body of {size} bytes exceeds limit of {limit}")]
    BodyTooLarge { size: usize, limit: usize },

    /// The underlying stream failed while reading or writing a frame.
    #[error("frame I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing an envelope failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The body is not a valid command envelope.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}

impl ProtocolError {
    /// Returns `true` for errors that leave the stream out of sync.
    pub fn is_framing(&self) -> bool {
        !matches!(self, Self::Encode(_) | Self::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_framing_classifies_variants() {
        assert!(ProtocolError::TruncatedHeader { got: 3 }.is_framing());
        assert!(ProtocolError::NegativeBodySize(-1).is_framing());
        let decode = serde_json::from_slice::<serde_json::Value>(b"{")
            .map_err(ProtocolError::Decode)
            .unwrap_err();
        assert!(!decode.is_framing());
    }

    #[test]
    fn test_display_mentions_sizes() {
        let err = ProtocolError::TruncatedBody { need: 10, got: 4 };
        assert_eq!(
            err.to_string(),
            "truncated frame body: need 10 bytes, got 4"
        );
    }
}
