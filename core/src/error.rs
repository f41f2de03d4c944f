//! Error taxonomy for the service client.
//!
//! # Design
//! Semantic faults (404/400/409) each get a dedicated variant carrying the
//! parsed `ServiceFault`, because callers routinely branch on "does not
//! exist" versus "rejected input" versus "already exists". Transient
//! conditions only show up here once the retry engine has given up on them.
//! Every other non-2xx response lands in `Http` with the raw status, reason
//! and body.

use thiserror::Error;

use crate::connection::TransportError;

/// Explanation used when the service's fault document does not carry one.
pub const NO_EXPLANATION: &str = "no explanation provided";

/// Fault details extracted from the service's exception document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFault {
    /// Tag of the fault element, e.g. `notFound`, `invalidInput`, `conflict`.
    pub kind: String,
    /// Identifier of the affected entity. Empty when the document has none.
    pub id: String,
    /// Entity type (`<type>`), when present.
    pub entity_type: Option<String>,
    /// Context (`<context>`), when present.
    pub context: Option<String>,
    /// Human explanation, `NO_EXPLANATION` when absent.
    pub explanation: String,
}

/// Errors returned by `VsApi` operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The service returned 404.
    #[error("not found: {} {} ({})", .0.kind, .0.id, .0.explanation)]
    NotFound(ServiceFault),

    /// The service returned 400, typically for a document in the wrong
    /// namespace or failing schema validation.
    #[error("bad request: {} {} ({})", .0.kind, .0.id, .0.explanation)]
    BadRequest(ServiceFault),

    /// The service returned 409.
    #[error("conflict: {} {} ({})", .0.kind, .0.id, .0.explanation)]
    Conflict(ServiceFault),

    /// The service kept answering 503 after every configured retry.
    #[error("HTTP 503: server busy after {attempts} retries")]
    ServerBusy { attempts: u32 },

    /// Any other non-2xx response.
    #[error("HTTP {status}: {reason}")]
    Http {
        status: u16,
        reason: String,
        body: Vec<u8>,
    },

    /// The transport failed and could not be recovered.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A 2xx response carried a body that is not well-formed XML.
    #[error("malformed XML in response: {0}")]
    Xml(String),

    /// Reading the upload source failed.
    #[error("upload source: {0}")]
    Io(#[from] std::io::Error),

    /// Client configuration could not be loaded.
    #[error("configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// HTTP status behind this error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotFound(_) => Some(404),
            ApiError::BadRequest(_) => Some(400),
            ApiError::Conflict(_) => Some(409),
            ApiError::ServerBusy { .. } => Some(503),
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Fault document details for the semantic variants.
    pub fn fault(&self) -> Option<&ServiceFault> {
        match self {
            ApiError::NotFound(f) | ApiError::BadRequest(f) | ApiError::Conflict(f) => Some(f),
            _ => None,
        }
    }
}
