//! A decoded inbound frame, tied to the connection it arrived on.

use std::sync::Arc;

use ironlink_protocol::{Codec, Envelope, JsonCodec, Message};
use ironlink_session::Connection;

use crate::HandlerError;

/// One request, owned by whichever worker processes it.
#[derive(Debug, Clone)]
pub struct Request {
    connection: Arc<Connection>,
    message: Message,
    envelope: Envelope,
}

impl Request {
    pub fn new(
        connection: Arc<Connection>,
        message: Message,
        envelope: Envelope,
    ) -> Self {
        Self {
            connection,
            message,
            envelope,
        }
    }

    /// The connection to reply on.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// The raw frame, header included.
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// The routing key.
    pub fn command(&self) -> &str {
        &self.envelope.cmd
    }

    pub fn seqno(&self) -> &str {
        &self.envelope.seqno
    }

    /// Encodes `envelope` as JSON and sends it on the priority path.
    pub async fn reply(&self, envelope: &Envelope) -> Result<(), HandlerError> {
        let body = JsonCodec.encode(envelope)?;
        self.connection.send_msg(body).await?;
        Ok(())
    }
}
