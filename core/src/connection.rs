//! Connection management over an injectable transport.
//!
//! # Design
//! `ConnectionManager` owns exactly one live `Transport`. A reset closes the
//! current transport and swaps in a freshly connected one; the old object is
//! never reused. Each connection gets a new `ConnectionId`, so callers can
//! tell a replaced connection from the one they captured earlier.

use thiserror::Error;

use crate::http::{HttpRequest, HttpResponse};
use crate::request::Endpoint;

/// Errors raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection cannot take a new request because a previous exchange
    /// never completed. Recoverable by resetting the connection.
    #[error("cannot send request: {0}")]
    CannotSend(String),

    /// Any other transport failure. Not retried.
    #[error("transport failure: {0}")]
    Failed(String),
}

impl TransportError {
    pub fn is_reuse_failure(&self) -> bool {
        matches!(self, TransportError::CannotSend(_))
    }
}

/// One logical connection to the service.
pub trait Transport {
    fn send(&mut self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Release the underlying connection. Called once, right before the
    /// transport is replaced.
    fn close(&mut self);
}

/// Opens new transports for an endpoint.
pub trait Connector {
    type Conn: Transport;

    fn connect(&self, endpoint: &Endpoint) -> Self::Conn;
}

impl<F, T> Connector for F
where
    F: Fn(&Endpoint) -> T,
    T: Transport,
{
    type Conn = T;

    fn connect(&self, endpoint: &Endpoint) -> T {
        self(endpoint)
    }
}

/// Identity of a connection, unique within one manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

pub struct ConnectionManager<C: Connector> {
    endpoint: Endpoint,
    connector: C,
    current: C::Conn,
    id: ConnectionId,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(endpoint: Endpoint, connector: C) -> Self {
        let current = connector.connect(&endpoint);
        Self {
            endpoint,
            connector,
            current,
            id: ConnectionId(0),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn current_id(&self) -> ConnectionId {
        self.id
    }

    pub fn transport(&self) -> &C::Conn {
        &self.current
    }

    /// Send `request` over the current connection.
    pub fn send(&mut self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.current.send(request)
    }

    /// Close the current connection and replace it with a new one to the
    /// same endpoint. Returns the new connection's id.
    pub fn reset(&mut self) -> ConnectionId {
        self.current.close();
        self.current = self.connector.connect(&self.endpoint);
        self.id = ConnectionId(self.id.0 + 1);
        tracing::debug!(target: "vsapi", connection = self.id.0, "connection reset");
        self.id
    }
}
