use crate::{AppState, handlers, uploads::MAX_FORM_BYTES};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};

/// Authenticated Router Module
///
/// Every route here is wrapped by the auth middleware in `create_router`, and each
/// handler additionally takes the `AuthUser` extractor. A missing or expired token
/// yields 401, a forged one 403.
///
/// Create routes accept multipart bodies carrying one attachment, so the default
/// 2 MB body limit is raised to the upload limit plus form overhead.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/auth/verify
        // Echoes the identity of a still-valid token.
        .route("/api/auth/verify", get(handlers::verify))
        // --- Posts ---
        .route("/api/posts", post(handlers::create_post))
        .route("/api/posts/{id}", delete(handlers::delete_post))
        // --- Updates ---
        .route("/api/atualizacoes", post(handlers::create_update))
        .route("/api/atualizacoes/{id}", delete(handlers::delete_update))
        // --- Downloads ---
        // Require either an uploaded file or an external link.
        .route("/api/downloads", post(handlers::create_download))
        .route("/api/downloads/{id}", delete(handlers::delete_download))
        // --- Comment moderation ---
        .route("/api/comentarios/{id}", delete(handlers::delete_comment))
        .layer(DefaultBodyLimit::max(MAX_FORM_BYTES))
}
