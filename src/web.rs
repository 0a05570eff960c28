//! HTTP endpoint layer: thin request/response mapping over the pipeline.
//!
//! Every endpoint is stateless apart from reading or writing the caller's
//! session (an opaque cookie-carried id); all business logic lives in the
//! normalizer, credential store, factory, and pipeline modules.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::credentials::CredentialStore;
use crate::error::ServiceError;
use crate::normalize;
use crate::pipeline;
use crate::prompt::MEDICAL_ANALYSIS_QUERY;
use crate::provider::ProviderFactory;

/// Maximum request body size (16 MiB), enforced before handler logic runs.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

const SESSION_COOKIE: &str = "medilens_session";

const INDEX_HTML: &str = include_str!("index.html");

/// Shared state passed to every handler.
pub struct AppState {
    pub credentials: CredentialStore,
    pub factory: Arc<dyn ProviderFactory>,
    pub upload_dir: PathBuf,
}

/// Build the axum Router with all endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/configure_api_key", post(configure_api_key))
        .route("/reset_api_key", post(reset_api_key))
        .route("/upload_image", post(upload_image))
        .route("/analyze_image", post(analyze_image))
        .nest_service("/uploads", ServeDir::new(state.upload_dir.clone()))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

// ── Session handling ────────────────────────────────────────────

/// The caller's session identity, read from (or minted for) the request.
struct Session {
    id: String,
    minted: bool,
}

fn session_from_headers(headers: &HeaderMap) -> Session {
    if let Some(id) = cookie_value(headers, SESSION_COOKIE) {
        return Session { id, minted: false };
    }
    Session {
        id: uuid::Uuid::new_v4().to_string(),
        minted: true,
    }
}

/// Extract a cookie value from the `Cookie` header, if present.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    for cookie in raw.split(';') {
        if let Some((key, value)) = cookie.trim().split_once('=') {
            if key == name && !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Attach a `Set-Cookie` header when the session id was minted this request.
fn with_session(session: &Session, mut response: Response) -> Response {
    if session.minted {
        let cookie = format!(
            "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
            session.id
        );
        if let Ok(value) = header::HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

// ── Handlers ────────────────────────────────────────────────────

/// Serve the embedded entry page with the configured-credential flag.
async fn index(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let session = session_from_headers(&headers);
    let configured = state.credentials.is_configured(&session.id);
    let page = INDEX_HTML.replace(
        "__API_KEY_CONFIGURED__",
        if configured { "true" } else { "false" },
    );
    with_session(&session, Html(page).into_response())
}

#[derive(Deserialize)]
struct ConfigureForm {
    #[serde(default)]
    api_key: String,
}

async fn configure_api_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<ConfigureForm>,
) -> Response {
    let session = session_from_headers(&headers);
    let response = match state.credentials.set(&session.id, &form.api_key) {
        Ok(()) => {
            tracing::info!("API key configured");
            Json(json!({ "success": true, "message": "API key saved." })).into_response()
        }
        Err(e) => {
            tracing::warn!("API key configuration rejected: {e}");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "message": "API key cannot be empty." })),
            )
                .into_response()
        }
    };
    with_session(&session, response)
}

async fn reset_api_key(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let session = session_from_headers(&headers);
    state.credentials.clear(&session.id);
    tracing::info!("API key reset");
    with_session(
        &session,
        Json(json!({ "success": true, "message": "API key reset." })).into_response(),
    )
}

async fn upload_image(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let session = session_from_headers(&headers);
    if !state.credentials.is_configured(&session.id) {
        tracing::warn!("Upload rejected: API key not configured");
        return with_session(&session, ServiceError::MissingCredential.into_response());
    }

    let response = match read_upload_field(multipart).await {
        Ok((name, bytes)) => {
            tracing::info!("Upload received: '{}' ({} bytes)", name, bytes.len());
            match normalize::normalize_upload(&bytes, &name, &state.upload_dir) {
                Ok(img) => {
                    let file_name = img
                        .path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or_default();
                    Json(json!({
                        "success": true,
                        "image_url": format!("/uploads/{file_name}"),
                        "image_path": img.path.display().to_string(),
                    }))
                    .into_response()
                }
                Err(e) => {
                    tracing::error!("Error processing upload '{name}': {e}");
                    e.into_response()
                }
            }
        }
        Err(e) => {
            tracing::warn!("Upload rejected: {e}");
            e.into_response()
        }
    };
    with_session(&session, response)
}

/// Pull the `file` part out of a multipart request body.
async fn read_upload_field(mut multipart: Multipart) -> Result<(String, Vec<u8>), ServiceError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::Validation(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        if name.is_empty() {
            return Err(ServiceError::Validation("No selected file".into()));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServiceError::Validation(format!("failed to read upload: {e}")))?;
        return Ok((name, bytes.to_vec()));
    }
    Err(ServiceError::Validation("No file part".into()))
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    image_path: String,
}

async fn analyze_image(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AnalyzeRequest>,
) -> Response {
    let session = session_from_headers(&headers);
    if !state.credentials.is_configured(&session.id) {
        tracing::warn!("Analysis rejected: API key not configured");
        return with_session(&session, ServiceError::MissingCredential.into_response());
    }

    let response = match checked_scratch_path(&req.image_path, &state.upload_dir) {
        Ok(path) => {
            let key = state.credentials.get(&session.id);
            match pipeline::run_analysis(
                state.factory.as_ref(),
                key,
                &path,
                MEDICAL_ANALYSIS_QUERY,
            )
            .await
            {
                Ok(analysis) => {
                    Json(json!({ "success": true, "analysis": analysis })).into_response()
                }
                Err(e) => e.into_response(),
            }
        }
        Err(e) => {
            tracing::warn!("Analysis rejected: {e}");
            e.into_response()
        }
    };
    with_session(&session, response)
}

/// Validate a client-supplied image path: non-empty, pointing at an existing
/// file, resolving inside the scratch directory. The pipeline deletes the
/// file it is handed, so a path outside the scratch directory would turn
/// this endpoint into an arbitrary-file-delete primitive.
fn checked_scratch_path(raw: &str, upload_dir: &Path) -> Result<PathBuf, ServiceError> {
    if raw.trim().is_empty() {
        return Err(ServiceError::Validation("Image path is missing".into()));
    }
    let path = Path::new(raw);
    if !path.is_file() {
        return Err(ServiceError::Validation(
            "Image path is invalid or file does not exist".into(),
        ));
    }
    let resolved = path.canonicalize().map_err(|_| {
        ServiceError::Validation("Image path is invalid or file does not exist".into())
    })?;
    let scratch = upload_dir.canonicalize().map_err(|_| {
        ServiceError::Validation("Image path is invalid or file does not exist".into())
    })?;
    if !resolved.starts_with(&scratch) {
        return Err(ServiceError::Validation(
            "Image path is outside the upload directory".into(),
        ));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_value_parses_multi_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            "theme=dark; medilens_session=abc-123; other=1".parse().unwrap(),
        );
        assert_eq!(
            cookie_value(&headers, SESSION_COOKIE).as_deref(),
            Some("abc-123")
        );
        assert!(cookie_value(&headers, "missing").is_none());
    }

    #[test]
    fn session_is_minted_only_without_cookie() {
        let headers = HeaderMap::new();
        assert!(session_from_headers(&headers).minted);

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "medilens_session=xyz".parse().unwrap());
        let session = session_from_headers(&headers);
        assert!(!session.minted);
        assert_eq!(session.id, "xyz");
    }

    #[test]
    fn scratch_path_rejects_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::NamedTempFile::new().unwrap();

        let err = checked_scratch_path(outside.path().to_str().unwrap(), dir.path()).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(outside.path().exists());

        assert!(checked_scratch_path("", dir.path()).is_err());
        assert!(checked_scratch_path("does/not/exist.png", dir.path()).is_err());

        let inside = dir.path().join("resized_ok.png");
        std::fs::write(&inside, b"x").unwrap();
        assert!(checked_scratch_path(inside.to_str().unwrap(), dir.path()).is_ok());
    }
}
