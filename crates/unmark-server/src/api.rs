use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Path, Query, State,
    },
    http::{header, Method},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use unmark_core::{HistoryReader, Processor, SharePublisher, Transformer};
use unmark_shared::constants::{DEFAULT_HISTORY_PAGE, MAX_REQUEST_BODY};
use unmark_shared::protocol::{
    ApiResponse, EntriesData, EntryView, HistoryQuery, ProcessData, ProcessRequest, SessionData,
    SessionRequest, ShareData, ShareRequest,
};
use unmark_shared::validation::decode_upload;
use unmark_shared::{Clock, EntryId, Identity, UnmarkError};
use unmark_store::{object_store, ServerBackend, StoreError};

use crate::config::ServerConfig;
use crate::error::ServerError;

/// Source reference recorded when the client does not send one.
const DEFAULT_SOURCE_REFERENCE: &str = "upload";

#[derive(Clone)]
pub struct AppState {
    pub processor: Processor<ServerBackend>,
    pub reader: HistoryReader<ServerBackend>,
    pub publisher: SharePublisher<ServerBackend>,
    pub backend: Arc<ServerBackend>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        backend: Arc<ServerBackend>,
        transformer: Arc<dyn Transformer>,
        clock: Arc<dyn Clock>,
        config: ServerConfig,
    ) -> Self {
        Self {
            processor: Processor::new(backend.clone(), transformer, clock.clone()),
            reader: HistoryReader::new(backend.clone(), clock),
            publisher: SharePublisher::new(backend.clone(), &config.site_url),
            backend,
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/session", post(open_session))
        .route("/process", post(process_image))
        .route("/history", get(list_history))
        .route("/share", post(share_entry))
        .route("/public-feed", get(public_feed))
        .route("/s/:slug", get(shared_entry))
        .route("/objects/:key", get(serve_object))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ServerError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

/// Unwrap a JSON body, turning extractor failures into the error envelope.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServerError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ServerError::BadRequest(rejection.body_text()))
}

fn require_identity(raw: Option<&str>) -> Result<Identity, ServerError> {
    raw.and_then(Identity::parse)
        .ok_or_else(|| ServerError::BadRequest("Missing identity".to_string()))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn open_session(
    State(state): State<AppState>,
    payload: Result<Json<SessionRequest>, JsonRejection>,
) -> ApiResult<SessionData> {
    let request = body(payload)?;
    let identity = require_identity(request.identity.as_deref())?;

    let snapshot = state.reader.get_history(&identity).await?;

    debug!(identity = %identity.short(), remaining = snapshot.remaining_today, "Session opened");

    ok(SessionData {
        identity: identity.to_string(),
        remaining_today: snapshot.remaining_today,
        history: snapshot.entries.iter().map(EntryView::from).collect(),
    })
}

async fn process_image(
    State(state): State<AppState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> ApiResult<ProcessData> {
    let request = body(payload)?;
    let identity = require_identity(request.identity.as_deref())?;
    let image = request
        .image_base64
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServerError::BadRequest("Missing image".to_string()))?;

    let upload = decode_upload(image)?;
    let source_reference = request
        .source_reference
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SOURCE_REFERENCE);

    let processed = state
        .processor
        .process(&identity, &upload, source_reference)
        .await?;

    let result_url = processed
        .entry
        .result
        .url()
        .ok_or_else(|| ServerError::Internal("result was not hosted".to_string()))?
        .to_string();

    ok(ProcessData {
        result_url,
        entry_id: processed.entry.id,
        remaining_today: processed.remaining_today,
    })
}

async fn list_history(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<EntriesData> {
    let Query(query) = query.map_err(|rejection| ServerError::BadRequest(rejection.body_text()))?;
    let identity = require_identity(query.identity.as_deref())?;

    let entries = state
        .reader
        .list(
            &identity,
            query.limit.unwrap_or(DEFAULT_HISTORY_PAGE),
            query.offset.unwrap_or(0),
        )
        .await?;

    ok(EntriesData {
        entries: entries.iter().map(EntryView::from).collect(),
    })
}

async fn share_entry(
    State(state): State<AppState>,
    payload: Result<Json<ShareRequest>, JsonRejection>,
) -> ApiResult<ShareData> {
    let request = body(payload)?;
    let identity = require_identity(request.identity.as_deref())?;
    let raw_id = request
        .entry_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServerError::BadRequest("Missing entry id".to_string()))?;

    // Anything that is not an entry id cannot name an entry.
    let id = EntryId::parse(raw_id).map_err(|_| UnmarkError::NotFound)?;

    let published = state.publisher.publish(id, &identity).await?;

    ok(ShareData {
        share_url: published.share_url,
        share_slug: published.share_slug.as_str().to_string(),
    })
}

async fn public_feed(State(state): State<AppState>) -> ApiResult<EntriesData> {
    let entries = state.reader.public_feed().await?;
    ok(EntriesData {
        entries: entries.iter().map(EntryView::from).collect(),
    })
}

async fn shared_entry(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<EntryView> {
    let entry = state.reader.get_shared(&slug).await?;
    ok(EntryView::from(&entry))
}

async fn serve_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let data = state.backend.objects().get(&key).await.map_err(|e| match e {
        StoreError::NotFound | StoreError::InvalidKey(_) => ServerError::from(UnmarkError::NotFound),
        other => ServerError::from(UnmarkError::Store(other.to_string())),
    })?;

    Ok(([(header::CONTENT_TYPE, object_store::content_type(&key))], data))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use base64::{engine::general_purpose::STANDARD, Engine};
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;
    use unmark_core::TransformError;
    use unmark_shared::validation::ImageUpload;
    use unmark_store::{Database, ObjectStore};

    const PNG_INPUT: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDRinput";
    const WEBP_OUTPUT: &[u8] = b"RIFF\x24\0\0\0WEBPVP8 cleaned";

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2026, 6, 15, 10, 0, 0).unwrap()
        }
    }

    #[derive(Default)]
    struct CountingTransformer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transformer for CountingTransformer {
        async fn transform(&self, _upload: &ImageUpload) -> Result<Vec<u8>, TransformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(WEBP_OUTPUT.to_vec())
        }
    }

    struct Harness {
        router: Router,
        transformer: Arc<CountingTransformer>,
        dir: TempDir,
    }

    async fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig {
            database_path: dir.path().join("unmark.db"),
            object_storage_path: dir.path().join("objects"),
            site_url: "https://unmark.test".to_string(),
            ..ServerConfig::default()
        };
        let db = Database::open_at(&config.database_path).unwrap();
        let objects = ObjectStore::new(config.object_storage_path.clone(), &config.site_url)
            .await
            .unwrap();
        let backend = Arc::new(ServerBackend::new(db, objects));
        let transformer = Arc::new(CountingTransformer::default());
        let state = AppState::new(backend, transformer.clone(), Arc::new(FixedClock), config);

        Harness {
            router: build_router(state),
            transformer,
            dir,
        }
    }

    impl Harness {
        async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value)
        }

        async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            self.call(
                Request::post(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
        }

        async fn get(&self, uri: &str) -> (StatusCode, Value) {
            self.call(Request::get(uri).body(Body::empty()).unwrap()).await
        }

        async fn process(&self, identity: &str) -> (StatusCode, Value) {
            self.post(
                "/process",
                json!({
                    "identity": identity,
                    "imageBase64": STANDARD.encode(PNG_INPUT),
                    "sourceReference": "photo.png",
                }),
            )
            .await
        }
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let h = harness().await;
        let (status, body) = h.get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn fresh_session_has_full_quota() {
        let h = harness().await;
        let (status, body) = h.post("/session", json!({ "identity": "u2" })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["identity"], "u2");
        assert_eq!(body["data"]["remainingToday"], 5);
        assert_eq!(body["data"]["history"], json!([]));
    }

    #[tokio::test]
    async fn missing_identity_is_rejected() {
        let h = harness().await;

        let (status, body) = h.post("/session", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Missing identity");

        let (status, _) = h.get("/history").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_uses_the_envelope() {
        let h = harness().await;
        let (status, body) = h
            .call(
                Request::post("/session")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn unregistered_identity_cannot_process() {
        let h = harness().await;
        let (status, body) = h.process("stranger").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(h.transformer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn process_hosts_the_result() {
        let h = harness().await;
        h.post("/session", json!({ "identity": "u1" })).await;

        let (status, body) = h.process("u1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["remainingToday"], 4);

        let url = body["data"]["resultUrl"].as_str().unwrap();
        let key = url.strip_prefix("https://unmark.test/objects/").unwrap();
        assert!(key.ends_with(".webp"));

        let response = h
            .router
            .clone()
            .oneshot(Request::get(format!("/objects/{key}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/webp");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], WEBP_OUTPUT);

        let (_, history) = h.get("/history?identity=u1").await;
        let entries = history["data"]["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["sourceReference"], "photo.png");
        assert_eq!(entries[0]["resultUrl"], url);
        assert_eq!(entries[0]["isPublic"], false);
    }

    #[tokio::test]
    async fn invalid_upload_leaves_quota_untouched() {
        let h = harness().await;
        h.post("/session", json!({ "identity": "u1" })).await;

        let (status, body) = h
            .post(
                "/process",
                json!({ "identity": "u1", "imageBase64": STANDARD.encode(b"GIF89a not allowed") }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, _) = h
            .post("/process", json!({ "identity": "u1", "imageBase64": "%%%" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, session) = h.post("/session", json!({ "identity": "u1" })).await;
        assert_eq!(session["data"]["remainingToday"], 5);
        assert_eq!(session["data"]["history"], json!([]));
        assert_eq!(h.transformer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_object_write_is_a_server_error() {
        let h = harness().await;
        h.post("/session", json!({ "identity": "u1" })).await;

        // A plain file where the object directory should be.
        let objects = h.dir.path().join("objects");
        std::fs::remove_dir_all(&objects).unwrap();
        std::fs::write(&objects, b"not a directory").unwrap();

        let (status, body) = h.process("u1").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Image was processed but could not be saved");
        assert_eq!(h.transformer.calls.load(Ordering::SeqCst), 1);

        let (_, session) = h.post("/session", json!({ "identity": "u1" })).await;
        assert_eq!(session["data"]["remainingToday"], 5);
        assert_eq!(session["data"]["history"], json!([]));
    }

    #[tokio::test]
    async fn sixth_attempt_is_rate_limited() {
        let h = harness().await;
        h.post("/session", json!({ "identity": "u1" })).await;

        for expected in (0..5).rev() {
            let (status, body) = h.process("u1").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["data"]["remainingToday"], expected);
        }

        let (status, body) = h.process("u1").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["success"], false);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Daily limit reached"));
        assert_eq!(h.transformer.calls.load(Ordering::SeqCst), 5);

        let (_, session) = h.post("/session", json!({ "identity": "u1" })).await;
        assert_eq!(session["data"]["remainingToday"], 0);
    }

    #[tokio::test]
    async fn share_is_idempotent_and_owner_only() {
        let h = harness().await;
        h.post("/session", json!({ "identity": "owner" })).await;
        let (_, processed) = h.process("owner").await;
        let entry_id = processed["data"]["entryId"].as_str().unwrap().to_string();

        let (status, first) = h
            .post("/share", json!({ "entryId": entry_id, "identity": "owner" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        let slug = first["data"]["shareSlug"].as_str().unwrap().to_string();
        assert_eq!(slug.len(), 8);
        assert_eq!(
            first["data"]["shareUrl"],
            format!("https://unmark.test/s/{slug}")
        );

        let (_, second) = h
            .post("/share", json!({ "entryId": entry_id, "identity": "owner" }))
            .await;
        assert_eq!(second["data"]["shareSlug"], slug);

        let (status, body) = h
            .post("/share", json!({ "entryId": entry_id, "identity": "intruder" }))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Image not found");

        let (status, _) = h
            .post("/share", json!({ "entryId": "not-a-uuid", "identity": "owner" }))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = h.post("/share", json!({ "identity": "owner" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn public_feed_and_short_links() {
        let h = harness().await;
        h.post("/session", json!({ "identity": "u1" })).await;
        let (_, private) = h.process("u1").await;
        let (_, shared) = h.process("u1").await;
        let shared_id = shared["data"]["entryId"].as_str().unwrap();

        let (_, feed) = h.get("/public-feed").await;
        assert_eq!(feed["data"]["entries"], json!([]));

        let (_, share) = h
            .post("/share", json!({ "entryId": shared_id, "identity": "u1" }))
            .await;
        let slug = share["data"]["shareSlug"].as_str().unwrap();

        let (status, feed) = h.get("/public-feed").await;
        assert_eq!(status, StatusCode::OK);
        let entries = feed["data"]["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["id"], shared_id);
        assert_ne!(entries[0]["id"], private["data"]["entryId"]);

        let (status, entry) = h.get(&format!("/s/{slug}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(entry["data"]["id"], shared_id);
        assert_eq!(entry["data"]["isPublic"], true);

        let (status, _) = h.get("/s/missing1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn object_keys_are_validated() {
        let h = harness().await;
        let (status, _) = h.get("/objects/..%2Funmark.db").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = h
            .get("/objects/6f9619ff-8b86-d011-b42d-00cf4fc964ff.webp")
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
