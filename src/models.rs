use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// The administrative account. Seeded at startup and never exposed through the API
/// beyond its public identity (`UserIdentity`).
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Article
///
/// Row shape shared by the `posts` and `updates` tables. Which table a record lives in
/// is carried by `ArticleKind`, not by the record itself.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub body: String,
    /// Display date (`dd/mm/YYYY`).
    pub date: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub attachment_path: Option<String>,
    pub attachment_mime_type: Option<String>,
}

/// Download
///
/// A downloadable release. Exactly one of `attachment_path` / `external_link` is set.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Download {
    pub id: i64,
    pub name: String,
    pub version: String,
    pub description: String,
    pub date: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub attachment_path: Option<String>,
    pub external_link: Option<String>,
    pub attachment_mime_type: Option<String>,
}

/// Comment
///
/// A visitor comment attached to a post, update or download.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    pub item_type: ItemType,
    pub item_id: i64,
    pub author_name: String,
    pub body: String,
    pub date: String,
    pub approved: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// ArticleKind
///
/// Selects between the two article tables. Posts and updates are independent entities
/// with identical shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleKind {
    Post,
    Update,
}

impl ArticleKind {
    pub fn table(self) -> &'static str {
        match self {
            ArticleKind::Post => "posts",
            ArticleKind::Update => "updates",
        }
    }

    /// Human label used in response and log messages.
    pub fn label(self) -> &'static str {
        match self {
            ArticleKind::Post => "post",
            ArticleKind::Update => "update",
        }
    }

    pub fn item_type(self) -> ItemType {
        match self {
            ArticleKind::Post => ItemType::Post,
            ArticleKind::Update => ItemType::Update,
        }
    }
}

/// ItemType
///
/// The kind of record a comment belongs to. Stored and serialized in lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
#[ts(export)]
pub enum ItemType {
    Post,
    Update,
    Download,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Post => "post",
            ItemType::Update => "update",
            ItemType::Download => "download",
        }
    }

    /// Table holding the records this item type refers to.
    pub fn table(self) -> &'static str {
        match self {
            ItemType::Post => "posts",
            ItemType::Update => "updates",
            ItemType::Download => "downloads",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(ItemType::Post),
            "update" => Ok(ItemType::Update),
            "download" => Ok(ItemType::Download),
            other => Err(format!(
                "unknown item type '{other}', expected post, update or download"
            )),
        }
    }
}

// --- Repository Inputs ---

/// Attachment
///
/// Reference to a stored upload, as returned by the upload store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Public-relative path, e.g. `/uploads/1700000000000-ab12.png`.
    pub path: String,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub body: String,
    pub date: String,
    pub attachment: Option<Attachment>,
}

/// DownloadSource
///
/// Where a download is fetched from. Encodes the "file or link, never neither" rule in
/// the type.
#[derive(Debug, Clone)]
pub enum DownloadSource {
    File(Attachment),
    Link(String),
}

#[derive(Debug, Clone)]
pub struct NewDownload {
    pub name: String,
    pub version: String,
    pub description: String,
    pub date: String,
    pub source: DownloadSource,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub item_type: ItemType,
    pub item_id: i64,
    pub author_name: String,
    pub body: String,
    pub date: String,
    pub approved: bool,
}

// --- Request Payloads (Input Schemas) ---

/// ArticleUpload
///
/// OpenAPI description of the create form for posts and updates. The handlers read
/// it through `UploadForm`, which also accepts the legacy names `titulo`/`conteudo`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ArticleUpload {
    pub title: String,
    pub body: String,
    /// Optional attachment (image, audio or archive, up to 50 MiB).
    #[schema(value_type = Option<String>, format = Binary)]
    pub file: Option<Vec<u8>>,
}

/// DownloadUpload
///
/// OpenAPI description of the create form for downloads. Exactly one of `file` and
/// `externalLink` must be present.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUpload {
    pub name: String,
    pub version: String,
    pub description: String,
    pub external_link: Option<String>,
    #[schema(value_type = Option<String>, format = Binary)]
    pub file: Option<Vec<u8>>,
}

/// LoginRequest
///
/// Missing fields deserialize as empty strings so the handler can answer with a
/// field-level validation message instead of a JSON parse error.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// CreateCommentRequest
///
/// Public payload for POST /api/comentarios.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateCommentRequest {
    pub item_type: ItemType,
    pub item_id: i64,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub body: String,
}

// --- Responses (Output Schemas) ---

/// UserIdentity
///
/// The public identity carried in tokens and returned by login/verify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserIdentity {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub user: UserIdentity,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct VerifyResponse {
    pub valid: bool,
    pub user: UserIdentity,
}

/// CreatedResponse
///
/// Returned by every protected create route. `attachmentPath` is `null` when the
/// record carries no uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreatedResponse {
    pub id: i64,
    pub message: String,
    pub attachment_path: Option<String>,
}

/// CommentCreatedResponse
///
/// `pending` tells the client whether the comment is already visible.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CommentCreatedResponse {
    pub id: i64,
    pub pending: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
