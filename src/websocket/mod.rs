//! Single-session WebSocket layer: the socket client, stream options, and
//! wire message types.

pub mod client;
pub mod messages;
pub mod options;

pub use client::{
    CloseHandler, DeepgramSocket, ErrorHandler, OpenHandler, RawMessageHandler, TranscriptHandler,
};
pub use messages::{
    Alternative, Channel, ControlMessage, Metadata, ModelInfo, TranscriptMessage,
    TranscriptResponse, Word,
};
pub use options::AudioStreamOptions;
