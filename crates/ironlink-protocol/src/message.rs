//! The frame header and the [`Message`] value it describes.
//!
//! Wire layout of one frame:
//!
//! ```text
//! offset 0   : body size     i32, little-endian
//! offset 4   : version       4 bytes
//! offset 8   : compress flag 1 byte
//! offset 9   : client type   1 byte
//! offset 10  : service code  14 bytes
//! offset 24  : body          <body size> bytes
//! ```
//!
//! Only the size prefix is little-endian. The remaining header fields are
//! raw bytes written as-is.

use bytes::{Buf, BufMut, Bytes};

use crate::ProtocolError;

/// Fixed length of every frame header.
pub const HEADER_LEN: usize = 24;

/// Length of the version field.
pub const VERSION_LEN: usize = 4;

/// Length of the service-code field.
pub const SERVICE_CODE_LEN: usize = 14;

/// Version stamped on frames the server originates.
pub const DEFAULT_VERSION: [u8; VERSION_LEN] = *b"2001";

/// Service code stamped on frames the server originates (`"iot"`, NUL padded).
pub const DEFAULT_SERVICE_CODE: [u8; SERVICE_CODE_LEN] =
    *b"iot\0\0\0\0\0\0\0\0\0\0\0";

/// The fixed-width metadata carried in every frame header.
///
/// The core never interprets these fields; they are passed through to
/// handlers untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHeader {
    pub version: [u8; VERSION_LEN],
    pub compress: u8,
    pub client_type: u8,
    pub service_code: [u8; SERVICE_CODE_LEN],
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION,
            compress: 0,
            client_type: 0,
            service_code: DEFAULT_SERVICE_CODE,
        }
    }
}

impl FrameHeader {
    /// Parses the 24 header bytes into the announced body size and the
    /// metadata fields.
    ///
    /// # Errors
    /// - [`ProtocolError::TruncatedHeader`] if `buf` is shorter than
    ///   [`HEADER_LEN`].
    /// - [`ProtocolError::NegativeBodySize`] if the size prefix is negative.
    pub fn parse(buf: &[u8]) -> Result<(usize, Self), ProtocolError> {
        if buf.len() < HEADER_LEN {
            return Err(ProtocolError::TruncatedHeader { got: buf.len() });
        }
        let mut cur = &buf[..HEADER_LEN];

        let raw_size = cur.get_i32_le();
        let body_size = usize::try_from(raw_size)
            .map_err(|_| ProtocolError::NegativeBodySize(raw_size))?;

        let mut header = Self::default();
        cur.copy_to_slice(&mut header.version);
        header.compress = cur.get_u8();
        header.client_type = cur.get_u8();
        cur.copy_to_slice(&mut header.service_code);

        Ok((body_size, header))
    }

    /// Writes the header, size prefix first, into `buf`.
    pub(crate) fn write_to(&self, body_size: i32, buf: &mut impl BufMut) {
        buf.put_i32_le(body_size);
        buf.put_slice(&self.version);
        buf.put_u8(self.compress);
        buf.put_u8(self.client_type);
        buf.put_slice(&self.service_code);
    }
}

/// One decoded frame: header metadata plus body bytes.
///
/// Immutable once built. The body size is always derived from the body,
/// so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: FrameHeader,
    body: Bytes,
}

impl Message {
    /// Builds a message with the default server header.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self::with_header(FrameHeader::default(), body)
    }

    /// Builds a message with explicit header metadata.
    pub fn with_header(header: FrameHeader, body: impl Into<Bytes>) -> Self {
        Self {
            header,
            body: body.into(),
        }
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn version(&self) -> [u8; VERSION_LEN] {
        self.header.version
    }

    pub fn compress(&self) -> u8 {
        self.header.compress
    }

    pub fn client_type(&self) -> u8 {
        self.header.client_type
    }

    pub fn service_code(&self) -> [u8; SERVICE_CODE_LEN] {
        self.header.service_code
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Length of the body in bytes.
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Total encoded length: header plus body.
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.body.len()
    }
}
