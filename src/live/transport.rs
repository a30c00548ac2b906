use async_trait::async_trait;
use std::sync::Arc;

use super::messages::{ClientMessage, ServerMessage, SetupRequest};
use crate::error::AgentError;

/// Receives everything the remote side sends after the session is open
pub trait TransportListener: Send + Sync {
    fn on_message(&self, message: ServerMessage);

    /// The connection failed. No further callbacks follow.
    fn on_error(&self, error: String);

    /// The remote side closed the connection. No further callbacks follow.
    fn on_close(&self, reason: Option<String>);
}

/// An open live session
pub trait LiveConnection: Send {
    /// Queue a message for sending. Never blocks.
    fn send(&self, message: ClientMessage) -> Result<(), AgentError>;

    /// Close the session. Closing twice is not an error.
    fn close(&mut self) -> Result<(), AgentError>;
}

/// Opens live sessions
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Connect, send `setup`, and resolve once the service confirms it.
    async fn open(
        &self,
        api_key: &str,
        setup: SetupRequest,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Box<dyn LiveConnection>, AgentError>;
}
