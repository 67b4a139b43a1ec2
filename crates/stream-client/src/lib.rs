mod client;
mod decode;
pub mod error;
mod lock;
mod transport;

pub use client::{
    ChatTurn, ClientConfig, FALLBACK_MESSAGE, STREAM_TIMEOUT, StreamingClient, TurnEvent,
    TurnStream,
};
pub use decode::Utf8Decoder;
pub use lock::{StreamLock, StreamPermit};
pub use transport::{ByteStream, HttpTransport, Transport, TransportResponse};
