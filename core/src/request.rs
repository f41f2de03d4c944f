//! Request construction: endpoint, credentials, parameter encoding.
//!
//! # Design
//! `RequestBuilder` turns a `RequestSpec` into the exact `HttpRequest` that
//! goes on the wire. It performs no I/O, so everything here is testable
//! without a connection. Multi-valued query and matrix parameters always
//! expand to repeated `key=value` entries; distinct keys keep the order the
//! caller inserted them in.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest};

pub const CONTENT_TYPE_XML: &str = "application/xml";
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";
pub const DEFAULT_API_PREFIX: &str = "/API";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

/// Where the service lives and which API root every path sits under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    prefix: String,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        Self {
            host: host.into(),
            port,
            protocol,
            prefix: DEFAULT_API_PREFIX.to_string(),
        }
    }

    /// Replace the API prefix. Leading and trailing slashes are normalised.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim_matches('/');
        self.prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        };
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `scheme://host:port`, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port)
    }

    /// Prefix the caller's path exactly once, whether or not it starts with `/`.
    pub fn api_path(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            if self.prefix.is_empty() {
                "/".to_string()
            } else {
                self.prefix.clone()
            }
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::new("localhost", 8080, Protocol::Http)
    }
}

/// Username and password for Basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `Basic base64(username:password)`. Recomputed on every call.
    pub fn authorization(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(raw.as_bytes()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A parameter value rendered to its wire string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamValue(String);

impl ParamValue {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue(v)
    }
}

impl From<&String> for ParamValue {
    fn from(v: &String) -> Self {
        ParamValue(v.clone())
    }
}

impl From<&[u8]> for ParamValue {
    fn from(v: &[u8]) -> Self {
        ParamValue(String::from_utf8_lossy(v).into_owned())
    }
}

// The service spells booleans `True` and `False`.
impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue(if v { "True" } else { "False" }.to_string())
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue(v.to_string())
    }
}

macro_rules! int_param_value {
    ($($t:ty),*) => {
        $(impl From<$t> for ParamValue {
            fn from(v: $t) -> Self {
                ParamValue(v.to_string())
            }
        })*
    };
}

int_param_value!(i32, i64, u16, u32, u64, usize);

/// Ordered multimap of parameters.
///
/// Keys keep first-insertion order; values under one key keep the order they
/// were added in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, Vec<String>)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one value under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> &mut Self {
        let key = key.into();
        let value = value.into().0;
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
        self
    }

    /// Append every value in `values` under `key`.
    pub fn insert_all<I, V>(&mut self, key: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        let key = key.into();
        for value in values {
            self.insert(key.clone(), value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Escaped `key=value` pairs, repeated keys for multi-valued entries.
    fn pairs(&self) -> Vec<String> {
        self.iter()
            .flat_map(|(key, values)| param_list(key, values.iter().map(String::as_str)))
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Percent-encode `text` for use in a query or matrix parameter.
///
/// Text is encoded as UTF-8; only `A-Z a-z 0-9 - _ . ~` pass through. Never
/// fails, whatever the input.
pub fn escape_for_query(text: &str) -> String {
    urlencoding::encode(text).into_owned()
}

/// Render `key=value` for each value, both sides escaped.
pub fn param_list<'a>(key: &str, values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let key = escape_for_query(key);
    values
        .into_iter()
        .map(|v| format!("{key}={}", escape_for_query(v)))
        .collect()
}

/// Request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Bytes(Vec<u8>),
}

impl Body {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Body::Text(s) => s.into_bytes(),
            Body::Bytes(b) => b,
        }
    }
}

impl From<&str> for Body {
    fn from(v: &str) -> Self {
        Body::Text(v.to_string())
    }
}

impl From<String> for Body {
    fn from(v: String) -> Self {
        Body::Text(v)
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Body::Bytes(v)
    }
}

impl From<&[u8]> for Body {
    fn from(v: &[u8]) -> Self {
        Body::Bytes(v.to_vec())
    }
}

/// Everything a caller specifies about one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Body>,
    pub query: Params,
    pub matrix: Params,
    pub headers: Vec<(String, String)>,
    pub content_type: Option<String>,
}

impl RequestSpec {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            query: Params::new(),
            matrix: Params::new(),
            headers: Vec::new(),
            content_type: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.query.insert(key, value);
        self
    }

    pub fn query_params(mut self, params: Params) -> Self {
        self.query = params;
        self
    }

    pub fn matrix(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.matrix.insert(key, value);
        self
    }

    pub fn matrix_params(mut self, params: Params) -> Self {
        self.matrix = params;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    fn validate(&self) -> Result<(), ApiError> {
        if has_line_break(&self.path) {
            return Err(ApiError::InvalidRequest(format!(
                "path contains a line break: {:?}",
                self.path
            )));
        }
        for (name, value) in &self.headers {
            if name.is_empty() || !name.bytes().all(is_token_byte) {
                return Err(ApiError::InvalidRequest(format!(
                    "invalid header name: {name:?}"
                )));
            }
            if has_line_break(value) {
                return Err(ApiError::InvalidRequest(format!(
                    "header {name} contains a line break"
                )));
            }
        }
        if let Some(ct) = &self.content_type {
            if has_line_break(ct) {
                return Err(ApiError::InvalidRequest(
                    "content type contains a line break".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn has_line_break(s: &str) -> bool {
    s.contains(['\r', '\n'])
}

// RFC 9110 token characters.
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Builds authenticated wire requests for one endpoint.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    endpoint: Endpoint,
    credentials: Credentials,
}

impl RequestBuilder {
    pub fn new(endpoint: Endpoint, credentials: Credentials) -> Self {
        Self {
            endpoint,
            credentials,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Prefixed path followed by matrix segments and the query string.
    pub fn target(&self, path: &str, matrix: &Params, query: &Params) -> String {
        let mut target = self.endpoint.api_path(path);
        for segment in matrix.pairs() {
            target.push(';');
            target.push_str(&segment);
        }
        if !query.is_empty() {
            target.push('?');
            target.push_str(&query.pairs().join("&"));
        }
        target
    }

    pub fn build(&self, spec: &RequestSpec) -> Result<HttpRequest, ApiError> {
        spec.validate()?;

        let mut headers = vec![
            ("Accept".to_string(), CONTENT_TYPE_XML.to_string()),
            ("Authorization".to_string(), self.credentials.authorization()),
        ];
        if spec.body.is_some() {
            let content_type = spec.content_type.as_deref().unwrap_or(CONTENT_TYPE_XML);
            headers.push(("Content-Type".to_string(), content_type.to_string()));
        }
        for (name, value) in &spec.headers {
            match headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
                Some(existing) => existing.1 = value.clone(),
                None => headers.push((name.clone(), value.clone())),
            }
        }

        Ok(HttpRequest {
            method: spec.method,
            path: self.target(&spec.path, &spec.matrix, &spec.query),
            headers,
            body: spec.body.clone().map(Body::into_bytes),
        })
    }
}
