use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::{
    body::Bytes,
    extract::{Path, Query, RawQuery, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::{de, Deserialize, Deserializer};
use tokio::{net::TcpListener, sync::RwLock};

pub const NAMESPACE: &str = "http://xml.vidispine.com/schema/vidispine";

/// `Basic base64("admin:admin")`.
pub const EXPECTED_AUTH: &str = "Basic YWRtaW46YWRtaW4=";

/// A chunked upload being assembled.
#[derive(Clone, Debug, Default)]
pub struct Upload {
    pub filename: String,
    pub size: u64,
    pub data: Vec<u8>,
    pub chunks: u32,
    pub job_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct Store {
    pub items: HashMap<String, String>,
    pub collections: HashSet<String>,
    pub uploads: HashMap<String, Upload>,
    pub busy_hits: u32,
    /// 503 responses `/API/flaky` still has to give before answering 200.
    pub flaky_remaining: u32,
    next_job: u32,
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    app_with_state(Db::default())
}

pub fn app_with_state(db: Db) -> Router {
    let api = Router::new()
        .route("/item/{id}", get(get_item).delete(delete_item))
        .route(
            "/item/{id}/metadata",
            get(get_metadata).put(put_metadata),
        )
        .route("/collection/{id}", put(create_collection))
        .route("/busy", get(busy))
        .route("/flaky", get(flaky))
        .route("/echo", get(echo))
        .route("/import/raw", post(import_chunk))
        .layer(middleware::from_fn(require_auth));
    Router::new().nest("/API", api).with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_state(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(db)).await
}

async fn require_auth(request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(EXPECTED_AUTH);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    next.run(request).await
}

fn xml(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

fn exception(status: StatusCode, kind: &str, fields: &[(&str, &str)]) -> Response {
    let inner: String = fields
        .iter()
        .map(|(k, v)| format!("<{k}>{}</{k}>", escape(v)))
        .collect();
    xml(
        status,
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><ExceptionDocument xmlns="{NAMESPACE}"><{kind}>{inner}</{kind}></ExceptionDocument>"#
        ),
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

async fn get_item(State(db): State<Db>, Path(id): Path<String>) -> Response {
    let store = db.read().await;
    if store.items.contains_key(&id) {
        xml(
            StatusCode::OK,
            format!(r#"<ItemDocument xmlns="{NAMESPACE}" id="{id}"><id>{id}</id></ItemDocument>"#),
        )
    } else {
        exception(StatusCode::NOT_FOUND, "notFound", &[("type", "Item"), ("id", &id)])
    }
}

async fn delete_item(State(db): State<Db>, Path(id): Path<String>) -> Response {
    match db.write().await.items.remove(&id) {
        Some(_) => StatusCode::OK.into_response(),
        None => exception(StatusCode::NOT_FOUND, "notFound", &[("type", "Item"), ("id", &id)]),
    }
}

async fn get_metadata(State(db): State<Db>, Path(id): Path<String>) -> Response {
    match db.read().await.items.get(&id) {
        Some(doc) => xml(StatusCode::OK, doc.clone()),
        None => exception(StatusCode::NOT_FOUND, "notFound", &[("type", "Item"), ("id", &id)]),
    }
}

async fn put_metadata(State(db): State<Db>, Path(id): Path<String>, body: Bytes) -> Response {
    let Ok(doc) = String::from_utf8(body.to_vec()) else {
        return exception(
            StatusCode::BAD_REQUEST,
            "invalidInput",
            &[("context", "metadata"), ("id", &id), ("explanation", "Body is not UTF-8.")],
        );
    };
    if !doc.contains(&format!(r#"xmlns="{NAMESPACE}""#)) {
        return exception(
            StatusCode::BAD_REQUEST,
            "invalidInput",
            &[
                ("context", "metadata"),
                ("id", &id),
                (
                    "explanation",
                    "Couldn't transform the input according to the projection.",
                ),
            ],
        );
    }
    db.write().await.items.insert(id, doc.clone());
    xml(StatusCode::OK, doc)
}

async fn create_collection(State(db): State<Db>, Path(id): Path<String>) -> Response {
    let mut store = db.write().await;
    if store.collections.contains(&id) {
        return exception(StatusCode::CONFLICT, "conflict", &[("type", "Collection"), ("id", &id)]);
    }
    store.collections.insert(id);
    StatusCode::CREATED.into_response()
}

async fn busy(State(db): State<Db>) -> Response {
    db.write().await.busy_hits += 1;
    (StatusCode::SERVICE_UNAVAILABLE, "No server available").into_response()
}

async fn flaky(State(db): State<Db>) -> Response {
    let mut store = db.write().await;
    if store.flaky_remaining > 0 {
        store.flaky_remaining -= 1;
        return (StatusCode::SERVICE_UNAVAILABLE, "No server available").into_response();
    }
    xml(
        StatusCode::OK,
        format!(r#"<VersionDocument xmlns="{NAMESPACE}"><version>1.0</version></VersionDocument>"#),
    )
}

/// Echo the raw query string and the decoded parameters.
async fn echo(RawQuery(raw): RawQuery, Query(params): Query<Vec<(String, String)>>) -> Response {
    let params: String = params
        .iter()
        .map(|(k, v)| {
            format!(
                "<param><key>{}</key><value>{}</value></param>",
                escape(k),
                escape(v)
            )
        })
        .collect();
    xml(
        StatusCode::OK,
        format!(
            r#"<EchoDocument xmlns="{NAMESPACE}"><raw>{}</raw>{params}</EchoDocument>"#,
            escape(raw.as_deref().unwrap_or_default())
        ),
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkQuery {
    pub transfer_id: String,
    pub filename: String,
    #[serde(default)]
    pub transfer_priority: Option<u32>,
    #[serde(default, deserialize_with = "service_bool")]
    pub throttle: Option<bool>,
}

/// The service spells booleans `True` and `False`.
fn service_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    match Option::<String>::deserialize(deserializer)?.as_deref() {
        None => Ok(None),
        Some("True") => Ok(Some(true)),
        Some("False") => Ok(Some(false)),
        Some(other) => Err(de::Error::custom(format!("not a service boolean: {other}"))),
    }
}

async fn import_chunk(
    State(db): State<Db>,
    Query(query): Query<ChunkQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header_u64 = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
    };
    let (Some(index), Some(size)) = (header_u64("index"), header_u64("size")) else {
        return exception(
            StatusCode::BAD_REQUEST,
            "invalidInput",
            &[("context", "upload"), ("id", &query.transfer_id), ("explanation", "Missing index or size header.")],
        );
    };

    let mut store = db.write().await;
    store.next_job += 1;
    let job_number = store.next_job;
    let upload = store
        .uploads
        .entry(query.transfer_id.clone())
        .or_insert_with(|| Upload {
            filename: query.filename.clone(),
            size,
            ..Upload::default()
        });

    if index != upload.data.len() as u64 || upload.size != size {
        return exception(
            StatusCode::BAD_REQUEST,
            "invalidInput",
            &[
                ("context", "upload"),
                ("id", &query.transfer_id),
                ("explanation", "Chunk does not continue the transfer."),
            ],
        );
    }
    upload.data.extend_from_slice(&body);
    upload.chunks += 1;

    if (upload.data.len() as u64) < upload.size {
        return StatusCode::OK.into_response();
    }
    let job_id = format!("VX-{job_number}");
    upload.job_id = Some(job_id.clone());
    tracing::info!(transfer_id = %query.transfer_id, %job_id, chunks = upload.chunks, "upload assembled");
    xml(
        StatusCode::OK,
        format!(
            r#"<JobDocument xmlns="{NAMESPACE}"><jobId>{job_id}</jobId><status>READY</status><type>RAW_IMPORT</type></JobDocument>"#
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_covers_markup() {
        assert_eq!(escape(r#"<a href="x">&</a>"#), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn chunk_query_uses_service_parameter_names() {
        let q: ChunkQuery = serde_json::from_str(
            r#"{"transferId":"abc","filename":"f.dat","transferPriority":100,"throttle":"False"}"#,
        )
        .unwrap();
        assert_eq!(q.transfer_id, "abc");
        assert_eq!(q.transfer_priority, Some(100));
        assert_eq!(q.throttle, Some(false));
    }

    #[test]
    fn lowercase_throttle_is_rejected() {
        let q = serde_json::from_str::<ChunkQuery>(
            r#"{"transferId":"abc","filename":"f.dat","throttle":"false"}"#,
        );
        assert!(q.is_err());
    }

    #[test]
    fn store_starts_empty() {
        let store = Store::default();
        assert!(store.items.is_empty());
        assert!(store.uploads.is_empty());
        assert_eq!(store.busy_hits, 0);
    }
}
