//! End-to-end tests against the mock service.
//!
//! # Design
//! Starts the mock server on a random port, then drives `VsApi` over real
//! HTTP through the ureq transport. Server state is inspected directly
//! through the shared `Db` handle.

use std::io::Cursor;
use std::time::{Duration, Instant};

use mock_server::Db;
use vsapi_core::{
    ApiError, Credentials, Endpoint, HttpMethod, Level, MemoryLogger, Params, Protocol,
    RequestSpec, RetryPolicy, TransportError, UploadOptions, VsApi, XmlDocument,
};

const METADATA: &str = r#"<MetadataDocument xmlns="http://xml.vidispine.com/schema/vidispine"><timespan start="-INF" end="+INF"><field><name>title</name><value>Thousands take to streets – video</value></field></timespan></MetadataDocument>"#;

fn start_server() -> (u16, Db) {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = std_listener.local_addr().unwrap().port();
    std_listener.set_nonblocking(true).unwrap();
    let db = Db::default();
    let state = db.clone();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run_with_state(listener, state).await
        })
        .unwrap();
    });

    (port, db)
}

fn client(port: u16) -> VsApi {
    VsApi::new(
        Endpoint::new("127.0.0.1", port, Protocol::Http),
        Credentials::new("admin", "admin"),
    )
}

#[test]
fn metadata_round_trip_and_faults() {
    let (port, _db) = start_server();
    let mut api = client(port);

    // unknown item: 404 with the fault document's id and kind
    let err = api
        .request(&RequestSpec::get("/item/VX-1/metadata"))
        .unwrap_err();
    let fault = err.fault().expect("fault details");
    assert!(matches!(err, ApiError::NotFound(_)));
    assert_eq!(fault.id, "VX-1");
    assert_eq!(fault.kind, "notFound");
    assert_eq!(fault.explanation, "no explanation provided");

    // wrong namespace: 400 with explanation
    let wrong_ns = METADATA.replace("http://xml.vidispine.com/schema/vidispine", "http://xml.vidispine.com/");
    let err = api
        .request(&RequestSpec::put("/item/VX-1/metadata").body(wrong_ns))
        .unwrap_err();
    let fault = err.fault().expect("fault details");
    assert!(matches!(err, ApiError::BadRequest(_)));
    assert_eq!(fault.kind, "invalidInput");
    assert_eq!(
        fault.explanation,
        "Couldn't transform the input according to the projection."
    );

    // valid document is stored and read back
    let stored = api
        .request(&RequestSpec::put("item/VX-1/metadata").body(METADATA))
        .unwrap()
        .expect("echoed document");
    assert_eq!(stored.root_name(), "MetadataDocument");

    let fetched = api
        .request(&RequestSpec::get("/item/VX-1/metadata"))
        .unwrap()
        .expect("metadata document");
    assert_eq!(
        fetched.find_text("timespan/field/value").as_deref(),
        Some("Thousands take to streets – video")
    );

    // delete answers with an empty body
    let deleted = api.request(&RequestSpec::delete("/item/VX-1")).unwrap();
    assert!(deleted.is_none());
}

#[test]
fn duplicate_collection_is_a_conflict() {
    let (port, _db) = start_server();
    let mut api = client(port);
    assert!(api.request(&RequestSpec::put("/collection/VX-7")).unwrap().is_none());
    let err = api.request(&RequestSpec::put("/collection/VX-7")).unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
    assert_eq!(err.fault().unwrap().id, "VX-7");
}

#[test]
fn busy_service_backs_off_then_gives_up() {
    let (port, db) = start_server();
    let logger = MemoryLogger::new();
    let policy = RetryPolicy {
        retry_attempts: 3,
        retry_delay: Duration::from_millis(20),
        ..RetryPolicy::default()
    };
    let mut api = client(port).with_retry_policy(policy).with_logger(logger.clone());

    let started = Instant::now();
    let err = api.request(&RequestSpec::get("/busy")).unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, ApiError::ServerBusy { attempts: 3 }));
    assert_eq!(err.status(), Some(503));
    assert!(elapsed >= policy.retry_delay * policy.retry_attempts);
    assert_eq!(db.blocking_read().busy_hits, 4);
    assert_eq!(logger.count(Level::Warning), 4);
    assert_eq!(
        logger.messages(Level::Error),
        vec!["Did not work after 3 retries, giving up".to_string()]
    );
}

#[test]
fn busy_service_recovers_within_budget() {
    let (port, db) = start_server();
    db.blocking_write().flaky_remaining = 2;
    let mut api = client(port).with_retry_policy(RetryPolicy {
        retry_attempts: 5,
        retry_delay: Duration::from_millis(10),
        ..RetryPolicy::default()
    });
    let doc = api.request(&RequestSpec::get("/flaky")).unwrap().unwrap();
    assert_eq!(doc.find_text("version").as_deref(), Some("1.0"));
}

#[test]
fn unicode_query_survives_the_wire() {
    let (port, _db) = start_server();
    let mut api = client(port);
    let path = "/srv/Media Production/ES_Colored Spirals 4 - Johannes Bornlöf/STEMS DRUMS.mp3";
    let mut query = Params::new();
    query
        .insert("uri", path)
        .insert_all("tag", ["Häppy", "hølidåys"]);

    let doc: XmlDocument = api
        .request(&RequestSpec::get("/echo").query_params(query))
        .unwrap()
        .unwrap();

    let params = doc.find_all("param");
    let pairs: Vec<(String, String)> = params
        .iter()
        .map(|p| {
            let text = |name: &str| {
                p.get_child(name)
                    .and_then(|c| c.get_text())
                    .map(|t| t.into_owned())
                    .unwrap_or_default()
            };
            (text("key"), text("value"))
        })
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("uri".to_string(), path.to_string()),
            ("tag".to_string(), "Häppy".to_string()),
            ("tag".to_string(), "hølidåys".to_string()),
        ]
    );
}

#[test]
fn chunked_upload_assembles_on_the_server() {
    let (port, db) = start_server();
    let mut api = client(port);
    let data: Vec<u8> = (0..10_500u32).map(|i| (i % 253) as u8).collect();

    let last = api
        .chunked_upload(
            &mut Cursor::new(data.clone()),
            data.len() as u64,
            1000,
            "/import/raw",
            &UploadOptions::new("fakefile.dat"),
        )
        .unwrap()
        .expect("final chunk response");

    let job = vsapi_core::classify(last).unwrap().expect("job document");
    let job_id = job.find_text("jobId").expect("job id");

    let store = db.blocking_read();
    assert_eq!(store.uploads.len(), 1);
    let upload = store.uploads.values().next().unwrap();
    assert_eq!(upload.chunks, 11);
    assert_eq!(upload.filename, "fakefile.dat");
    assert_eq!(upload.data, data);
    assert_eq!(upload.job_id.as_deref(), Some(job_id.as_str()));
}

#[test]
fn wrong_credentials_surface_as_http_error() {
    let (port, _db) = start_server();
    let mut api = VsApi::new(
        Endpoint::new("127.0.0.1", port, Protocol::Http),
        Credentials::new("admin", "wrong"),
    );
    let err = api.request(&RequestSpec::get("/item/VX-1")).unwrap_err();
    match err {
        ApiError::Http { status, reason, .. } => {
            assert_eq!(status, 401);
            assert_eq!(reason, "Unauthorized");
        }
        other => panic!("expected Http error, got {other:?}"),
    }
}

#[test]
fn send_authorized_bypasses_prefix_and_classification() {
    let (port, _db) = start_server();
    let mut api = client(port);
    let response = api
        .send_authorized(HttpMethod::Get, "/API/busy", None, Vec::new())
        .unwrap();
    assert_eq!(response.status, 503);
}

#[test]
fn refused_connection_is_a_transport_failure() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut api = client(port);
    let err = api.request(&RequestSpec::get("/item/VX-1")).unwrap_err();
    assert!(matches!(err, ApiError::Transport(TransportError::Failed(_))));
}
