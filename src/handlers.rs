use crate::{
    AppState,
    auth::{self, AuthUser},
    error::{ApiJson, ApiPath, AppError, AppResult},
    models::{
        Article, ArticleKind, ArticleUpload, Attachment, Comment, CommentCreatedResponse,
        CreateCommentRequest, CreatedResponse, Download, DownloadSource, DownloadUpload,
        ItemType, LoginRequest, LoginResponse, MessageResponse, NewArticle, NewComment,
        NewDownload, UserIdentity, VerifyResponse,
    },
    moderation::ModerationPolicy,
    uploads::UploadForm,
};
use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;

/// Display date stamped on new records (`dd/mm/YYYY`, UTC).
fn today() -> String {
    Utc::now().format("%d/%m/%Y").to_string()
}

/// Removes an attachment whose record never made it (or no longer exists) in storage.
/// Failures are logged only: the response already reflects the database outcome.
async fn discard_attachment(state: &AppState, path: Option<&str>) {
    if let Some(path) = path {
        if let Err(e) = state.uploads.discard(path).await {
            tracing::warn!(path, error = %e, "failed to discard attachment");
        }
    }
}

// --- Auth ---

/// login
///
/// [Public Route] Exchanges the admin credentials for a 24h bearer token.
/// Unknown user and wrong password produce the same 401.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 400, description = "Missing fields"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let username = payload.username.trim();
    if username.is_empty() || payload.password.is_empty() {
        return Err(AppError::validation("username and password are required"));
    }

    let invalid = || AppError::Unauthenticated("invalid credentials".into());

    let user = state
        .repo
        .find_user_by_username(username)
        .await?
        .ok_or_else(invalid)?;

    let stored_hash = user.password_hash.clone();
    let password = payload.password;
    let matches =
        tokio::task::spawn_blocking(move || auth::verify_password(&password, &stored_hash))
            .await?;
    if !matches {
        tracing::warn!(username, "rejected login attempt");
        return Err(invalid());
    }

    let identity = UserIdentity {
        id: user.id,
        username: user.username,
    };
    let token = auth::issue_token(&state.config.jwt_secret, &identity)?;
    tracing::info!(user_id = identity.id, "login succeeded");

    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        token,
        user: identity,
    }))
}

/// verify
///
/// [Authenticated Route] Confirms the presented token is still valid.
#[utoipa::path(
    get,
    path = "/api/auth/verify",
    responses(
        (status = 200, description = "Token valid", body = VerifyResponse),
        (status = 401, description = "Missing or expired token"),
        (status = 403, description = "Invalid token")
    )
)]
pub async fn verify(user: AuthUser) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        valid: true,
        user: user.into(),
    })
}

// --- Posts & Updates (shared implementation) ---

async fn list_articles(state: &AppState, kind: ArticleKind) -> AppResult<Json<Vec<Article>>> {
    Ok(Json(state.repo.list_articles(kind).await?))
}

async fn get_article(state: &AppState, kind: ArticleKind, id: i64) -> AppResult<Json<Article>> {
    state
        .repo
        .get_article(kind, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("{} not found", kind.label())))
}

async fn create_article(
    state: &AppState,
    kind: ArticleKind,
    form: UploadForm,
) -> AppResult<(StatusCode, Json<CreatedResponse>)> {
    let title = form.required(&["title", "titulo"])?;
    let body = form.required(&["body", "conteudo"])?;

    let attachment = match form.file {
        Some(file) => Some(state.uploads.store(file).await?),
        None => None,
    };
    let attachment_path = attachment.as_ref().map(|a| a.path.clone());

    let new = NewArticle {
        title,
        body,
        date: today(),
        attachment,
    };
    let id = match state.repo.create_article(kind, new).await {
        Ok(id) => id,
        Err(e) => {
            discard_attachment(state, attachment_path.as_deref()).await;
            return Err(e.into());
        }
    };

    tracing::info!(id, kind = kind.label(), attachment = ?attachment_path, "created article");
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            id,
            message: format!("{} created", capitalize(kind.label())),
            attachment_path,
        }),
    ))
}

async fn delete_article(
    state: &AppState,
    kind: ArticleKind,
    id: i64,
) -> AppResult<Json<MessageResponse>> {
    let not_found = || AppError::not_found(format!("{} not found", kind.label()));

    let existing = state.repo.get_article(kind, id).await?.ok_or_else(not_found)?;
    if state.repo.delete_article(kind, id).await? == 0 {
        return Err(not_found());
    }
    discard_attachment(state, existing.attachment_path.as_deref()).await;

    tracing::info!(id, kind = kind.label(), "deleted article");
    Ok(Json(MessageResponse::new(format!(
        "{} deleted",
        capitalize(kind.label())
    ))))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// get_posts
///
/// [Public Route] Lists every post, newest first.
#[utoipa::path(
    get,
    path = "/api/posts",
    responses((status = 200, description = "All posts", body = [Article]))
)]
pub async fn get_posts(State(state): State<AppState>) -> AppResult<Json<Vec<Article>>> {
    list_articles(&state, ArticleKind::Post).await
}

#[utoipa::path(
    get,
    path = "/api/posts/{id}",
    params(("id" = i64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Found", body = Article),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_post(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<Article>> {
    get_article(&state, ArticleKind::Post, id).await
}

/// create_post
///
/// [Authenticated Route] Multipart (`title`, `body`, optional `file`) or JSON body.
#[utoipa::path(
    post,
    path = "/api/posts",
    request_body(
        content = ArticleUpload,
        content_type = "multipart/form-data",
        description = "Multipart form; a JSON object with the same text fields is also accepted"
    ),
    responses(
        (status = 201, description = "Created", body = CreatedResponse),
        (status = 400, description = "Missing fields or rejected file")
    )
)]
pub async fn create_post(
    _user: AuthUser,
    State(state): State<AppState>,
    form: UploadForm,
) -> AppResult<(StatusCode, Json<CreatedResponse>)> {
    create_article(&state, ArticleKind::Post, form).await
}

#[utoipa::path(
    delete,
    path = "/api/posts/{id}",
    params(("id" = i64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_post(
    _user: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<MessageResponse>> {
    delete_article(&state, ArticleKind::Post, id).await
}

/// get_updates
///
/// [Public Route] Lists every update, newest first.
#[utoipa::path(
    get,
    path = "/api/atualizacoes",
    responses((status = 200, description = "All updates", body = [Article]))
)]
pub async fn get_updates(State(state): State<AppState>) -> AppResult<Json<Vec<Article>>> {
    list_articles(&state, ArticleKind::Update).await
}

#[utoipa::path(
    get,
    path = "/api/atualizacoes/{id}",
    params(("id" = i64, Path, description = "Update ID")),
    responses(
        (status = 200, description = "Found", body = Article),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_update(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<Article>> {
    get_article(&state, ArticleKind::Update, id).await
}

#[utoipa::path(
    post,
    path = "/api/atualizacoes",
    request_body(
        content = ArticleUpload,
        content_type = "multipart/form-data",
        description = "Multipart form; a JSON object with the same text fields is also accepted"
    ),
    responses(
        (status = 201, description = "Created", body = CreatedResponse),
        (status = 400, description = "Missing fields or rejected file")
    )
)]
pub async fn create_update(
    _user: AuthUser,
    State(state): State<AppState>,
    form: UploadForm,
) -> AppResult<(StatusCode, Json<CreatedResponse>)> {
    create_article(&state, ArticleKind::Update, form).await
}

#[utoipa::path(
    delete,
    path = "/api/atualizacoes/{id}",
    params(("id" = i64, Path, description = "Update ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_update(
    _user: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<MessageResponse>> {
    delete_article(&state, ArticleKind::Update, id).await
}

// --- Downloads ---

#[utoipa::path(
    get,
    path = "/api/downloads",
    responses((status = 200, description = "All downloads", body = [Download]))
)]
pub async fn get_downloads(State(state): State<AppState>) -> AppResult<Json<Vec<Download>>> {
    Ok(Json(state.repo.list_downloads().await?))
}

#[utoipa::path(
    get,
    path = "/api/downloads/{id}",
    params(("id" = i64, Path, description = "Download ID")),
    responses(
        (status = 200, description = "Found", body = Download),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_download(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<Download>> {
    state
        .repo
        .get_download(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("download not found"))
}

/// create_download
///
/// [Authenticated Route] Requires `name`, `version`, `description` and exactly one of an
/// uploaded `file` or an `externalLink`. The source rule is checked before anything is
/// written to disk.
#[utoipa::path(
    post,
    path = "/api/downloads",
    request_body(
        content = DownloadUpload,
        content_type = "multipart/form-data",
        description = "Multipart form; a JSON object with the same text fields is also accepted"
    ),
    responses(
        (status = 201, description = "Created", body = CreatedResponse),
        (status = 400, description = "Missing fields, no file or link, or rejected file")
    )
)]
pub async fn create_download(
    _user: AuthUser,
    State(state): State<AppState>,
    form: UploadForm,
) -> AppResult<(StatusCode, Json<CreatedResponse>)> {
    let name = form.required(&["name", "nome"])?;
    let version = form.required(&["version", "versao"])?;
    let description = form.required(&["description", "descricao"])?;
    let link = form.text(&["externalLink", "link"]);

    let source = match (form.file, link) {
        (Some(_), Some(_)) => {
            return Err(AppError::validation(
                "provide either a file or an external link, not both",
            ));
        }
        (None, None) => {
            return Err(AppError::validation(
                "a file or an external link is required",
            ));
        }
        (None, Some(link)) => DownloadSource::Link(link),
        (Some(file), None) => DownloadSource::File(state.uploads.store(file).await?),
    };

    let attachment_path = match &source {
        DownloadSource::File(Attachment { path, .. }) => Some(path.clone()),
        DownloadSource::Link(_) => None,
    };

    let new = NewDownload {
        name,
        version,
        description,
        date: today(),
        source,
    };
    let id = match state.repo.create_download(new).await {
        Ok(id) => id,
        Err(e) => {
            discard_attachment(&state, attachment_path.as_deref()).await;
            return Err(e.into());
        }
    };

    tracing::info!(id, attachment = ?attachment_path, "created download");
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            id,
            message: "Download created".to_string(),
            attachment_path,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/downloads/{id}",
    params(("id" = i64, Path, description = "Download ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_download(
    _user: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<MessageResponse>> {
    let not_found = || AppError::not_found("download not found");

    let existing = state.repo.get_download(id).await?.ok_or_else(not_found)?;
    if state.repo.delete_download(id).await? == 0 {
        return Err(not_found());
    }
    discard_attachment(&state, existing.attachment_path.as_deref()).await;

    tracing::info!(id, "deleted download");
    Ok(Json(MessageResponse::new("Download deleted")))
}

// --- Comments ---

/// get_comments
///
/// [Public Route] Approved comments for one item, newest first.
#[utoipa::path(
    get,
    path = "/api/comentarios/{item_type}/{item_id}",
    params(
        ("item_type" = String, Path, description = "post, update or download"),
        ("item_id" = i64, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Comments", body = [Comment]),
        (status = 400, description = "Unknown item type")
    )
)]
pub async fn get_comments(
    State(state): State<AppState>,
    ApiPath((item_type, item_id)): ApiPath<(String, i64)>,
) -> AppResult<Json<Vec<Comment>>> {
    let item_type: ItemType = item_type.parse().map_err(AppError::Validation)?;
    Ok(Json(state.repo.list_comments(item_type, item_id).await?))
}

/// create_comment
///
/// [Public Route] Anyone may comment. Fields are validated and the moderation policy
/// decides whether the comment is visible right away.
#[utoipa::path(
    post,
    path = "/api/comentarios",
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment stored", body = CommentCreatedResponse),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Target item not found")
    )
)]
pub async fn create_comment(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<CommentCreatedResponse>)> {
    let reviewed =
        ModerationPolicy::from(&state.config).review(&payload.author_name, &payload.body)?;

    let verdict = reviewed.verdict;
    let id = state
        .repo
        .create_comment(NewComment {
            item_type: payload.item_type,
            item_id: payload.item_id,
            author_name: reviewed.author_name,
            body: reviewed.body,
            date: today(),
            approved: verdict.approved(),
        })
        .await?
        .ok_or_else(|| AppError::not_found(format!("{} not found", payload.item_type)))?;

    tracing::info!(
        id,
        item_type = %payload.item_type,
        item_id = payload.item_id,
        approved = verdict.approved(),
        "created comment"
    );
    Ok((
        StatusCode::CREATED,
        Json(CommentCreatedResponse {
            id,
            pending: !verdict.approved(),
            message: verdict.message().to_string(),
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/comentarios/{id}",
    params(("id" = i64, Path, description = "Comment ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_comment(
    _user: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<MessageResponse>> {
    if state.repo.delete_comment(id).await? == 0 {
        return Err(AppError::not_found("comment not found"));
    }
    tracing::info!(id, "deleted comment");
    Ok(Json(MessageResponse::new("Comment deleted")))
}
