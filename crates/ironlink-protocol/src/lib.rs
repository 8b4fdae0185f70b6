//! Wire protocol for ironlink.
//!
//! - **Frames** ([`Message`], [`FrameHeader`], [`pack`], [`unpack`],
//!   [`read_frame`]): a fixed 24-byte header followed by a body.
//! - **Envelopes** ([`Envelope`]): the JSON command structure carried in
//!   the body.
//! - **Codec** ([`Codec`], [`JsonCodec`]): how envelopes become body bytes.
//!
//! ```text
//! socket bytes → read_frame → Message → Codec::decode → Envelope
//! ```

mod codec;
mod envelope;
mod error;
mod frame;
mod message;

pub use codec::{Codec, JsonCodec};
pub use envelope::{Envelope, STATUS_ERROR, STATUS_OK, UNKNOWN_ACTION};
pub use error::ProtocolError;
pub use frame::{pack, read_frame, unpack, write_frame};
pub use message::{
    DEFAULT_SERVICE_CODE, DEFAULT_VERSION, FrameHeader, HEADER_LEN, Message,
    SERVICE_CODE_LEN, VERSION_LEN,
};
