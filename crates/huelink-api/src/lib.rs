//! Async client for the Hue bridge CLIP v2 API.
//!
//! Wire models, a pluggable [`HttpTransport`] with a `reqwest`
//! implementation, the typed [`BridgeClient`], and server-sent event
//! framing for `/eventstream/clip/v2`. No domain logic lives here.

pub mod client;
pub mod error;
pub mod eventstream;
pub mod models;
pub mod transport;

pub use client::{APPLICATION_KEY_HEADER, BridgeClient, ResourceSnapshot};
pub use error::Error;
pub use eventstream::{Event, EventResource, FrameAssembler};
pub use transport::{
    ByteStream, HttpResponse, HttpTransport, ReqwestTransport, TlsMode, TransportConfig,
};

pub use reqwest::header::HeaderMap;
