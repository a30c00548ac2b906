pub mod client;
pub mod messages;
pub mod transport;

pub use client::{LiveClient, DEFAULT_ENDPOINT};
pub use messages::{
    ClientMessage, FunctionCall, FunctionResponse, FunctionResult, ServerContent, ServerMessage,
    SetupRequest, Transcription,
};
pub use transport::{LiveConnection, LiveTransport, TransportListener};
