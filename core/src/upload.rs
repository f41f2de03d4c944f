//! Chunked upload of large payloads.
//!
//! # Design
//! A `TransferSession` owns one fresh transfer id and walks `[0, total_size)`
//! in `chunk_size` steps; the last chunk carries the remainder. Every chunk is
//! sent through the caller-supplied single-request primitive, strictly in
//! offset order and one at a time, because the service assembles chunks by
//! transfer id and offset. The first failing chunk aborts the upload; there is
//! no resume, a retry starts again from offset zero with a new session.

use std::io::{Read, Seek, SeekFrom};

use uuid::Uuid;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpResponse};
use crate::logging::Logger;
use crate::request::{Params, RequestSpec, CONTENT_TYPE_OCTET_STREAM};

pub const DEFAULT_TRANSFER_PRIORITY: u32 = 100;

/// Byte range of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub start: u64,
    pub len: u64,
}

/// State of one chunked upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSession {
    transfer_id: String,
    total_size: u64,
    chunk_size: u64,
    offset: u64,
}

impl TransferSession {
    /// Start a session with a newly generated transfer id.
    pub fn new(total_size: u64, chunk_size: u64) -> Result<Self, ApiError> {
        Self::with_transfer_id(Uuid::new_v4().simple().to_string(), total_size, chunk_size)
    }

    pub fn with_transfer_id(
        transfer_id: impl Into<String>,
        total_size: u64,
        chunk_size: u64,
    ) -> Result<Self, ApiError> {
        if chunk_size == 0 {
            return Err(ApiError::InvalidRequest(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            transfer_id: transfer_id.into(),
            total_size,
            chunk_size,
            offset: 0,
        })
    }

    pub fn transfer_id(&self) -> &str {
        &self.transfer_id
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn chunk_count(&self) -> u64 {
        self.total_size.div_ceil(self.chunk_size)
    }

    pub fn is_finished(&self) -> bool {
        self.offset >= self.total_size
    }

    /// Claim the next chunk and advance the offset past it.
    pub fn next_chunk(&mut self) -> Option<ChunkRange> {
        if self.is_finished() {
            return None;
        }
        let len = self.chunk_size.min(self.total_size - self.offset);
        let range = ChunkRange {
            start: self.offset,
            len,
        };
        self.offset += len;
        Some(range)
    }
}

/// Per-upload request settings, constant across chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub method: HttpMethod,
    pub filename: String,
    pub transfer_priority: u32,
    pub throttle: bool,
    pub matrix: Params,
}

impl UploadOptions {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            filename: filename.into(),
            transfer_priority: DEFAULT_TRANSFER_PRIORITY,
            throttle: false,
            matrix: Params::new(),
        }
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn transfer_priority(mut self, priority: u32) -> Self {
        self.transfer_priority = priority;
        self
    }

    pub fn throttle(mut self, throttle: bool) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn matrix(mut self, matrix: Params) -> Self {
        self.matrix = matrix;
        self
    }
}

/// Request for one chunk of `session`.
pub fn chunk_request(
    path: &str,
    session: &TransferSession,
    options: &UploadOptions,
    range: ChunkRange,
    bytes: Vec<u8>,
) -> RequestSpec {
    RequestSpec::new(options.method, path)
        .query("transferId", session.transfer_id())
        .query("transferPriority", options.transfer_priority)
        .query("throttle", options.throttle)
        .query("filename", options.filename.as_str())
        .matrix_params(options.matrix.clone())
        .header("index", range.start.to_string())
        .header("size", session.total_size().to_string())
        .content_type(CONTENT_TYPE_OCTET_STREAM)
        .body(bytes)
}

/// Send every remaining chunk of `session` from `source` through `send`.
///
/// Returns the response to the final chunk, or `None` for an empty payload.
pub fn upload_chunks<R, F>(
    source: &mut R,
    session: &mut TransferSession,
    path: &str,
    options: &UploadOptions,
    logger: &dyn Logger,
    mut send: F,
) -> Result<Option<HttpResponse>, ApiError>
where
    R: Read + Seek,
    F: FnMut(RequestSpec) -> Result<HttpResponse, ApiError>,
{
    let mut last = None;
    while let Some(range) = session.next_chunk() {
        source.seek(SeekFrom::Start(range.start))?;
        let len = usize::try_from(range.len).map_err(|_| {
            ApiError::InvalidRequest(format!("chunk of {} bytes does not fit in memory", range.len))
        })?;
        let mut bytes = vec![0u8; len];
        source.read_exact(&mut bytes)?;

        logger.debug(&format!(
            "uploading chunk {}..{} of {} for transfer {}",
            range.start,
            range.start + range.len,
            session.total_size(),
            session.transfer_id()
        ));
        let spec = chunk_request(path, session, options, range, bytes);
        last = Some(send(spec)?);
    }
    Ok(last)
}
