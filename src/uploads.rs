use async_trait::async_trait;
use axum::{
    Json,
    extract::{FromRequest, Multipart, Request},
    http::header,
};
use chrono::Utc;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::Attachment,
};

/// Multipart field name carrying the attachment.
pub const FILE_FIELD: &str = "file";

/// Largest accepted attachment (50 MiB).
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Request body limit for create routes: the file plus room for the text fields and
/// multipart framing.
pub const MAX_FORM_BYTES: usize = MAX_UPLOAD_BYTES + 1024 * 1024;

/// Accepted attachment types, each with the file extensions it may be stored under.
/// `/uploads` is served with a Content-Type guessed from the extension, so a file is
/// only kept under an extension that maps back to its declared type. The first entry
/// is used when the client's filename has no extension.
pub const ALLOWED_TYPES: &[(&str, &[&str])] = &[
    ("image/jpeg", &["jpg", "jpeg"]),
    ("image/png", &["png"]),
    ("image/gif", &["gif"]),
    ("image/webp", &["webp"]),
    ("audio/mpeg", &["mp3"]),
    ("audio/wav", &["wav"]),
    ("audio/ogg", &["ogg"]),
    ("application/zip", &["zip"]),
    ("application/x-zip-compressed", &["zip"]),
    ("application/x-rar-compressed", &["rar"]),
    ("application/vnd.rar", &["rar"]),
];

/// IncomingFile
///
/// An attachment read out of a multipart body, not yet validated or stored.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// validate
///
/// Rejects files whose declared type is outside the allow-list, whose filename
/// extension belongs to a different type, or whose size exceeds `MAX_UPLOAD_BYTES`.
/// Returns the extension the file is stored under.
pub fn validate(file: &IncomingFile) -> AppResult<&'static str> {
    let Some((_, extensions)) = ALLOWED_TYPES
        .iter()
        .find(|(mime, _)| *mime == file.content_type)
    else {
        return Err(AppError::validation(format!(
            "file type '{}' is not allowed; accepted: images (jpeg, png, gif, webp), \
             audio (mpeg, wav, ogg) and archives (zip, rar)",
            file.content_type
        )));
    };
    if file.data.len() > MAX_UPLOAD_BYTES {
        return Err(too_large());
    }

    match client_extension(file.file_name.as_deref()) {
        None => Ok(extensions[0]),
        Some(ext) => extensions
            .iter()
            .find(|allowed| **allowed == ext)
            .copied()
            .ok_or_else(|| {
                AppError::validation(format!(
                    "file extension '.{ext}' does not match its type '{}'",
                    file.content_type
                ))
            }),
    }
}

fn too_large() -> AppError {
    AppError::validation(format!(
        "file exceeds the maximum size of {} MiB",
        MAX_UPLOAD_BYTES / (1024 * 1024)
    ))
}

/// Extension of the client's filename, lowercased and stripped to ASCII alphanumerics.
fn client_extension(original: Option<&str>) -> Option<String> {
    original
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ext.chars()
                .filter(char::is_ascii_alphanumeric)
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|ext| !ext.is_empty())
}

/// `<unix millis>-<random hex>.<extension>`. Nothing of the client's filename reaches
/// the filesystem.
pub fn stored_file_name(extension: &str) -> String {
    format!(
        "{}-{}.{extension}",
        Utc::now().timestamp_millis(),
        &Uuid::new_v4().simple().to_string()[..12]
    )
}

/// write_new
///
/// Creates `target` and writes `data` with an fsync. An existing file at `target` is
/// an error and is left untouched.
pub async fn write_new(target: &Path, data: &[u8]) -> AppResult<()> {
    let mut out = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
        .await?;
    out.write_all(data).await?;
    out.sync_all().await?;
    Ok(())
}

// 1. UploadStore Contract
/// UploadStore
///
/// Where accepted attachments end up. Handlers only see `Attachment` references, so
/// the backing location can change without touching them.
#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Validates and durably writes `file`, returning its public reference.
    async fn store(&self, file: IncomingFile) -> AppResult<Attachment>;

    /// Removes a previously stored file. Missing files are not an error.
    async fn discard(&self, public_path: &str) -> AppResult<()>;
}

/// UploadState
///
/// The concrete type used to share the upload store across the application state.
pub type UploadState = Arc<dyn UploadStore>;

// 2. Local disk implementation
/// LocalUploadStore
///
/// Writes attachments into `root`, which the router serves under `public_prefix`.
#[derive(Clone, Debug)]
pub struct LocalUploadStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalUploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_prefix: "/uploads".to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a public path back to a file under `root`, refusing anything that is not
    /// a bare file name below the prefix.
    fn resolve(&self, public_path: &str) -> Option<PathBuf> {
        let name = public_path
            .strip_prefix(&self.public_prefix)?
            .strip_prefix('/')?;
        let valid = !name.is_empty()
            && !name.contains(['/', '\\'])
            && name != "."
            && name != "..";
        valid.then(|| self.root.join(name))
    }
}

#[async_trait]
impl UploadStore for LocalUploadStore {
    async fn store(&self, file: IncomingFile) -> AppResult<Attachment> {
        let extension = validate(&file)?;

        fs::create_dir_all(&self.root).await?;
        let name = stored_file_name(extension);
        write_new(&self.root.join(&name), &file.data).await?;

        tracing::info!(file = %name, bytes = file.data.len(), mime = %file.content_type, "stored upload");

        Ok(Attachment {
            path: format!("{}/{}", self.public_prefix, name),
            mime_type: file.content_type,
        })
    }

    async fn discard(&self, public_path: &str) -> AppResult<()> {
        let Some(target) = self.resolve(public_path) else {
            tracing::warn!(path = public_path, "refusing to discard a path outside the upload dir");
            return Ok(());
        };
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// 3. Create-form extractor
/// UploadForm
///
/// Body of a create request: text fields plus at most one file. Accepts
/// `multipart/form-data` (the only way to attach a file) and plain JSON objects.
/// The file is size-checked while streaming so an oversize part is rejected before it
/// is fully buffered.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub fields: HashMap<String, String>,
    pub file: Option<IncomingFile>,
}

impl UploadForm {
    /// First non-blank value among `names`, trimmed.
    pub fn text(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .filter_map(|name| self.fields.get(*name))
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
            .map(str::to_string)
    }

    /// Like `text`, but a missing value is a validation error naming the field.
    pub fn required(&self, names: &[&str]) -> AppResult<String> {
        self.text(names)
            .ok_or_else(|| AppError::validation(format!("field '{}' is required", names[0])))
    }

    async fn from_multipart(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = UploadForm::default();

        while let Some(mut field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            if name != FILE_FIELD {
                let value = field.text().await?;
                form.fields.insert(name, value);
                continue;
            }

            let file_name = field.file_name().map(str::to_string);
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();

            let mut data = Vec::new();
            while let Some(chunk) = field.chunk().await? {
                if data.len() + chunk.len() > MAX_UPLOAD_BYTES {
                    return Err(too_large());
                }
                data.extend_from_slice(&chunk);
            }

            // Browsers submit an empty part when no file was chosen.
            if data.is_empty() && file_name.as_deref().is_none_or(str::is_empty) {
                continue;
            }
            if form.file.is_some() {
                return Err(AppError::validation("only one file may be uploaded per request"));
            }
            form.file = Some(IncomingFile {
                file_name,
                content_type,
                data,
            });
        }

        Ok(form)
    }

    fn from_json(object: HashMap<String, serde_json::Value>) -> Self {
        let fields = object
            .into_iter()
            .filter_map(|(key, value)| match value {
                serde_json::Value::String(s) => Some((key, s)),
                serde_json::Value::Null => None,
                other => Some((key, other.to_string())),
            })
            .collect();
        UploadForm { fields, file: None }
    }
}

impl<S> FromRequest<S> for UploadForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state).await?;
            Self::from_multipart(multipart).await
        } else {
            let Json(object) =
                Json::<HashMap<String, serde_json::Value>>::from_request(req, state).await?;
            Ok(Self::from_json(object))
        }
    }
}
