//! `Transport` over ureq.
//!
//! Status codes are returned as data (`http_status_as_error(false)`), so the
//! classifier sees every 4xx/5xx. I/O errors that indicate the pooled
//! connection was half-closed map to `TransportError::CannotSend`, which the
//! retry engine answers with a reset; a reset builds a new agent, dropping
//! the old connection pool.

use std::io;

use ureq::http::Request;
use ureq::Agent;

use crate::connection::{Connector, Transport, TransportError};
use crate::http::{HttpRequest, HttpResponse};
use crate::request::Endpoint;

#[derive(Debug, Clone, Copy, Default)]
pub struct UreqConnector;

impl Connector for UreqConnector {
    type Conn = UreqTransport;

    fn connect(&self, endpoint: &Endpoint) -> UreqTransport {
        UreqTransport::new(endpoint)
    }
}

pub struct UreqTransport {
    agent: Option<Agent>,
    base_url: String,
}

impl UreqTransport {
    pub fn new(endpoint: &Endpoint) -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self {
            agent: Some(agent),
            base_url: endpoint.base_url(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.agent.is_none()
    }
}

impl Transport for UreqTransport {
    fn send(&mut self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let agent = self
            .agent
            .as_ref()
            .ok_or_else(|| TransportError::CannotSend("connection closed".to_string()))?;

        let url = format!("{}{}", self.base_url, request.path);
        tracing::debug!(target: "vsapi", method = %request.method, %url, "sending request");

        let mut builder = Request::builder().method(request.method.as_str()).uri(&url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let result = match &request.body {
            Some(body) => {
                let req = builder
                    .body(body.as_slice())
                    .map_err(|e| TransportError::Failed(e.to_string()))?;
                agent.run(req)
            }
            None => {
                let req = builder
                    .body(())
                    .map_err(|e| TransportError::Failed(e.to_string()))?;
                agent.run(req)
            }
        };
        let mut response = result.map_err(map_error)?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()
            .map_err(map_error)?;

        tracing::debug!(target: "vsapi", status = status.as_u16(), %url, "received response");
        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }

    fn close(&mut self) {
        self.agent = None;
    }
}

fn map_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Io(ref io) if is_stale_connection(io.kind()) => {
            TransportError::CannotSend(err.to_string())
        }
        other => TransportError::Failed(other.to_string()),
    }
}

fn is_stale_connection(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
