//! Synchronous client engine for a media-asset-management REST service.
//!
//! # Overview
//! Hides Basic authentication, URL construction, the service's XML fault
//! documents, transient-failure recovery and chunked upload behind two
//! primitives on `VsApi`: `request` (one authenticated request, parsed
//! content or a typed error) and `chunked_upload`.
//!
//! # Design
//! - `request` builds wire requests without I/O; `response` classifies them.
//! - `connection` owns the single live `Transport` and replaces it on reset;
//!   `transport` provides the ureq implementation.
//! - `retry` runs reuse-failure recovery inside 503 backoff. Sleeping and
//!   logging are injected so tests never wait on the clock.
//! - `upload` drives chunk sequences through the single-request primitive.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod logging;
pub mod request;
pub mod response;
pub mod retry;
pub mod transport;
pub mod upload;

pub use client::VsApi;
pub use config::ClientConfig;
pub use connection::{ConnectionId, ConnectionManager, Connector, Transport, TransportError};
pub use error::{ApiError, ServiceFault, NO_EXPLANATION};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use logging::{Level, Logger, MemoryLogger, TracingLogger};
pub use request::{
    escape_for_query, param_list, Body, Credentials, Endpoint, ParamValue, Params, Protocol,
    RequestBuilder, RequestSpec,
};
pub use response::{classify, ExceptionDocument, XmlDocument, VS_NAMESPACE};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use transport::{UreqConnector, UreqTransport};
pub use upload::{ChunkRange, TransferSession, UploadOptions};
