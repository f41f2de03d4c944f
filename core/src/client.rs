//! Authenticated, retrying client for the service.
//!
//! # Design
//! `VsApi` wires the pieces in a fixed order for every attempt: the
//! `RequestBuilder` produces the wire request, busy backoff wraps reuse
//! recovery around the `ConnectionManager`, and the response classifier
//! turns the final response into content or an `ApiError`.
//!
//! Higher-level resource helpers are expected to call only `request`,
//! `raw_request` and `chunked_upload`.
//!
//! The client holds one logical connection and takes `&mut self` for every
//! operation; callers sharing a client across threads must serialise access
//! themselves.

use std::io::{Read, Seek};
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::connection::{ConnectionId, ConnectionManager, Connector, TransportError};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::logging::{Logger, TracingLogger};
use crate::request::{Body, Credentials, Endpoint, RequestBuilder, RequestSpec};
use crate::response::{self, XmlDocument};
use crate::retry::{self, RetryPolicy, Sleeper, ThreadSleeper};
use crate::transport::UreqConnector;
use crate::upload::{self, TransferSession, UploadOptions};

pub struct VsApi<C: Connector = UreqConnector> {
    builder: RequestBuilder,
    connection: ConnectionManager<C>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    logger: Arc<dyn Logger>,
}

impl VsApi<UreqConnector> {
    /// Client over HTTP(S) using ureq.
    pub fn new(endpoint: Endpoint, credentials: Credentials) -> Self {
        Self::with_connector(endpoint, credentials, UreqConnector)
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.endpoint(), config.credentials()).with_retry_policy(config.retry_policy())
    }
}

impl<C: Connector> VsApi<C> {
    pub fn with_connector(endpoint: Endpoint, credentials: Credentials, connector: C) -> Self {
        Self::with_connection(
            RequestBuilder::new(endpoint.clone(), credentials),
            ConnectionManager::new(endpoint, connector),
        )
    }

    /// Client over an existing connection manager.
    pub fn with_connection(builder: RequestBuilder, connection: ConnectionManager<C>) -> Self {
        Self {
            builder,
            connection,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(ThreadSleeper),
            logger: Arc::new(TracingLogger),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn builder(&self) -> &RequestBuilder {
        &self.builder
    }

    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.connection
    }

    /// Close the current connection and open a new one.
    pub fn reset_connection(&mut self) -> ConnectionId {
        self.connection.reset()
    }

    /// Send a request with only the Authorization header added.
    ///
    /// `target` is sent as-is (no API prefix). Text bodies are encoded as
    /// UTF-8. Reuse failures are recovered; 503 is not, and the response is
    /// returned unclassified.
    pub fn send_authorized(
        &mut self,
        method: HttpMethod,
        target: &str,
        body: Option<Body>,
        headers: Vec<(String, String)>,
    ) -> Result<HttpResponse, TransportError> {
        let mut headers = headers;
        headers.retain(|(k, _)| !k.eq_ignore_ascii_case("Authorization"));
        headers.push((
            "Authorization".to_string(),
            self.builder.credentials().authorization(),
        ));
        let request = HttpRequest {
            method,
            path: target.to_string(),
            headers,
            body: body.map(Body::into_bytes),
        };
        self.send_once(&request)
    }

    /// Perform one request and return the checked response without parsing
    /// its body.
    pub fn raw_request(&mut self, spec: &RequestSpec) -> Result<HttpResponse, ApiError> {
        let request = self.builder.build(spec)?;
        self.logger
            .debug(&format!("{} {}", request.method, request.path));
        let response = self.send_with_backoff(&request)?;
        response::check(response)
    }

    /// Perform one request and parse the response as XML. An empty 2xx body
    /// yields `None`.
    pub fn request(&mut self, spec: &RequestSpec) -> Result<Option<XmlDocument>, ApiError> {
        let response = self.raw_request(spec)?;
        response::classify(response)
    }

    /// Upload `total_size` bytes of `source` to `path` in `chunk_size` pieces.
    ///
    /// Returns the service's response to the final chunk, `None` when
    /// `total_size` is zero. The first failing chunk aborts the upload.
    pub fn chunked_upload<R: Read + Seek>(
        &mut self,
        source: &mut R,
        total_size: u64,
        chunk_size: u64,
        path: &str,
        options: &UploadOptions,
    ) -> Result<Option<HttpResponse>, ApiError> {
        let mut session = TransferSession::new(total_size, chunk_size)?;
        let logger = Arc::clone(&self.logger);
        logger.debug(&format!(
            "starting chunked upload {} of {total_size} bytes in {} chunks to {path}",
            session.transfer_id(),
            session.chunk_count()
        ));
        upload::upload_chunks(source, &mut session, path, options, logger.as_ref(), |spec| {
            self.raw_request(&spec)
        })
    }

    fn send_once(&mut self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        retry::send_with_reuse_recovery(
            &mut self.connection,
            request,
            &self.policy,
            self.sleeper.as_ref(),
            self.logger.as_ref(),
        )
    }

    fn send_with_backoff(&mut self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let policy = self.policy;
        let sleeper = self.sleeper.as_ref();
        let logger = self.logger.as_ref();
        let connection = &mut self.connection;
        retry::with_busy_backoff(&policy, sleeper, logger, || {
            retry::send_with_reuse_recovery(connection, request, &policy, sleeper, logger)
                .map_err(ApiError::from)
        })
    }
}
