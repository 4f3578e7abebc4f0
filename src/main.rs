//! Apprehension Import - spreadsheet import gateway for the records backend.

mod api_client;
mod apprehension;
mod config;
mod error;
mod normalizer;
mod session;
mod session_store;
mod sheet_parser;

use api_client::{ApiClient, ApprehensionSink};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use config::AppConfig;
use error::ImportError;
use normalizer::fields::CanonicalField;
use normalizer::mapping::HeaderTable;
use session::{ImportSession, RecordsPage, SessionSnapshot};
use session_store::SessionStore;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    sessions: SessionStore,
    sink: Arc<dyn ApprehensionSink>,
    headers: Arc<HeaderTable>,
}

type ApiError = (StatusCode, String);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "apprehension_import=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let headers = config.header_table()?;

    let client = ApiClient::from_config(&config).await?;
    info!("Records API client initialized for {}", client.base_url());

    let state = AppState {
        sessions: SessionStore::new(),
        sink: Arc::new(client),
        headers: Arc::new(headers),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/fields", get(list_fields))
        .route("/imports", post(create_import))
        .route("/imports/:id", get(get_import).delete(discard_import))
        .route("/imports/:id/records", get(get_records))
        .route("/imports/:id/submit", post(submit_import))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

#[derive(serde::Serialize)]
struct FieldInfo {
    path: &'static str,
    required: bool,
    date: bool,
}

/// List the canonical fields an upload can map to.
async fn list_fields() -> Json<Vec<FieldInfo>> {
    Json(
        CanonicalField::ALL
            .iter()
            .map(|f| FieldInfo {
                path: f.path(),
                required: f.is_required(),
                date: f.is_date(),
            })
            .collect(),
    )
}

/// Upload a workbook and open an import session in preview.
async fn create_import(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    let mut filename = String::new();
    let mut file_data = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        if field.name() == Some("file") {
            filename = field.file_name().unwrap_or("upload").to_string();
            file_data = field.bytes().await.map_err(|e| {
                (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
            })?.to_vec();
            break;
        }
    }

    if file_data.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No file uploaded".to_string()));
    }

    info!("Received file: {} ({} bytes)", filename, file_data.len());

    let mut session = ImportSession::new();
    session
        .load(&filename, &file_data, &state.headers)
        .map_err(import_error)?;

    let snapshot_session = session.clone();
    let id = state.sessions.insert(session);
    info!("Import session {} opened ({} live)", id, state.sessions.len());

    Ok((StatusCode::CREATED, Json(snapshot_session.snapshot(&id))))
}

async fn get_import(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, StatusCode> {
    state
        .sessions
        .get(&id)
        .map(|s| Json(s.snapshot(&id)))
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(serde::Deserialize)]
struct RecordsQuery {
    offset: Option<usize>,
    limit: Option<usize>,
}

/// Paginated view of the normalized records.
async fn get_records(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<RecordsPage>, StatusCode> {
    state
        .sessions
        .get(&id)
        .map(|s| Json(s.preview(query.offset.unwrap_or(0), query.limit)))
        .ok_or(StatusCode::NOT_FOUND)
}

/// Submit the previewed records to the records backend.
async fn submit_import(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    state
        .sessions
        .submit(&id, state.sink.clone())
        .await
        .ok_or_else(not_found)?
        .map(Json)
        .map_err(import_error)
}

/// Discard a session. Refused while its import is running.
async fn discard_import(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .update(&id, |s| s.reset())
        .ok_or_else(not_found)?
        .map_err(import_error)?;
    state.sessions.remove(&id);
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Helper functions
// ============================================================================

fn import_error(e: ImportError) -> ApiError {
    if e.is_parse_failure() {
        info!("Upload rejected: {:?}", e);
    } else {
        warn!("Import request refused: {}", e);
    }
    (e.status_code(), e.to_string())
}

fn not_found() -> ApiError {
    (StatusCode::NOT_FOUND, "Import session not found".to_string())
}
