//! Codec trait for the structured payload inside a frame body.
//!
//! The frame layer ([`crate::pack`], [`crate::unpack`]) only moves bytes.
//! Turning those bytes into an [`Envelope`](crate::Envelope) and back is
//! the job of a [`Codec`], so the body format can be swapped without
//! touching framing, connections or dispatch.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Encodes values into frame bodies and decodes them back.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` → one codec instance is shared by every connection
///   task, and Tokio may poll those tasks on any thread of its pool.
/// - `'static` → the codec owns everything it needs. It lives inside the
///   server state for as long as the server runs, so it can't borrow
///   anything shorter-lived.
///
/// ## Generic methods
///
/// `encode` and `decode` are generic over the payload type, so the same
/// codec handles [`Envelope`](crate::Envelope) and any handler-defined
/// `data` shape:
/// - `encode<T: Serialize>` → `T` can be turned into body bytes
/// - `decode<T: DeserializeOwned>` → `T` can be built from body bytes
///
/// `DeserializeOwned` (rather than `Deserialize<'de>`) means the decoded
/// value owns its data. The reader drops or reuses the frame buffer right
/// after decoding, so nothing may borrow from it.
///
/// Because of those generic methods the trait is not object-safe. Code
/// that needs a codec takes it as a type parameter or uses a concrete
/// type such as [`JsonCodec`].
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into body bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T)
    -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes body bytes into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected shape.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`), the body format every
/// existing gateway client speaks.
///
/// ```rust
/// use ironlink_protocol::{Codec, Envelope, JsonCodec};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&Envelope::ok("pong", "42")).unwrap();
/// let back: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(back.cmd, "pong");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
