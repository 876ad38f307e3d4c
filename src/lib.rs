use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod moderation;
pub mod repository;
pub mod uploads;

pub mod routes;
use auth::AuthUser;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use repository::{Repository, RepositoryState, SqliteRepository};
pub use uploads::{LocalUploadStore, UploadState, UploadStore};

/// ApiDoc
///
/// OpenAPI document for every handler annotated with `#[utoipa::path]`, served at
/// `/api-docs/openapi.json` and browsable at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::verify,
        handlers::get_posts, handlers::get_post, handlers::create_post, handlers::delete_post,
        handlers::get_updates, handlers::get_update, handlers::create_update, handlers::delete_update,
        handlers::get_downloads, handlers::get_download, handlers::create_download,
        handlers::delete_download,
        handlers::get_comments, handlers::create_comment, handlers::delete_comment
    ),
    components(
        schemas(
            models::Article, models::Download, models::Comment, models::ItemType,
            models::LoginRequest, models::LoginResponse, models::VerifyResponse,
            models::UserIdentity, models::CreatedResponse, models::CreateCommentRequest,
            models::CommentCreatedResponse, models::MessageResponse,
            models::ArticleUpload, models::DownloadUpload,
        )
    ),
    tags(
        (name = "nexo-cms", description = "Posts, updates, downloads and comments API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Everything a request may touch, constructed once in `main` (or per test) and
/// cloned cheaply into each handler. There is no global database handle.
#[derive(Clone)]
pub struct AppState {
    /// Persistence layer.
    pub repo: RepositoryState,
    /// Attachment storage.
    pub uploads: UploadState,
    /// Immutable configuration, including the token signing secret.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for UploadState {
    fn from_ref(app_state: &AppState) -> UploadState {
        app_state.uploads.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Guards the authenticated router. Extracting `AuthUser` verifies the bearer token;
/// on failure the extractor's `AppError` becomes the response and the handler never
/// runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the dispatch table, the static file services and the observability
/// layers around the shared state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let uploads_dir = ServeDir::new(&state.config.upload_dir);
    let public_dir = ServeDir::new(&state.config.public_dir);

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Stored attachments, then the landing page and other static assets for
        // anything no API route claimed.
        .nest_service("/uploads", uploads_dir)
        .fallback_service(public_dir)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer`: method, URI and the `x-request-id` set by the layer above,
/// so all log lines of one request correlate.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
