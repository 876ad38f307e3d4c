use async_trait::async_trait;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use nexo_cms::{
    AppError, AppState,
    auth::AuthUser,
    config::AppConfig,
    error::{ApiJson, ApiPath},
    handlers,
    models::{
        Article, ArticleKind, Comment, CreateCommentRequest, Download, ItemType, NewArticle,
        NewComment, NewDownload, User,
    },
    repository::{RepoResult, Repository},
    uploads::{IncomingFile, LocalUploadStore, UploadForm},
};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use tempfile::TempDir;

// --- MOCK REPOSITORY IMPLEMENTATION ---

// Central control point for handler tests: canned outputs plus a record of the
// writes the handler attempted.
#[derive(Default)]
struct MockRepoControl {
    article_result: Option<Article>,
    delete_result: u64,
    item_exists: bool,
    fail_reads: bool,
    fail_writes: bool,

    create_calls: AtomicUsize,
    last_comment: Mutex<Option<NewComment>>,
}

fn storage_down() -> sqlx::Error {
    sqlx::Error::PoolTimedOut
}

#[async_trait]
impl Repository for MockRepoControl {
    async fn find_user_by_username(&self, _username: &str) -> RepoResult<Option<User>> {
        Ok(None)
    }
    async fn create_user(&self, _username: &str, _password_hash: &str) -> RepoResult<i64> {
        Ok(1)
    }

    async fn list_articles(&self, _kind: ArticleKind) -> RepoResult<Vec<Article>> {
        if self.fail_reads {
            return Err(storage_down());
        }
        Ok(self.article_result.clone().into_iter().collect())
    }
    async fn get_article(&self, _kind: ArticleKind, _id: i64) -> RepoResult<Option<Article>> {
        Ok(self.article_result.clone())
    }
    async fn create_article(&self, _kind: ArticleKind, _article: NewArticle) -> RepoResult<i64> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(storage_down());
        }
        Ok(42)
    }
    async fn delete_article(&self, _kind: ArticleKind, _id: i64) -> RepoResult<u64> {
        Ok(self.delete_result)
    }

    async fn list_downloads(&self) -> RepoResult<Vec<Download>> {
        Ok(vec![])
    }
    async fn get_download(&self, _id: i64) -> RepoResult<Option<Download>> {
        Ok(None)
    }
    async fn create_download(&self, _download: NewDownload) -> RepoResult<i64> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(storage_down());
        }
        Ok(7)
    }
    async fn delete_download(&self, _id: i64) -> RepoResult<u64> {
        Ok(self.delete_result)
    }

    async fn list_comments(&self, _item_type: ItemType, _item_id: i64) -> RepoResult<Vec<Comment>> {
        Ok(vec![])
    }
    async fn get_comment(&self, _id: i64) -> RepoResult<Option<Comment>> {
        Ok(None)
    }
    async fn create_comment(&self, comment: NewComment) -> RepoResult<Option<i64>> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if !self.item_exists {
            return Ok(None);
        }
        *self.last_comment.lock().unwrap() = Some(comment);
        Ok(Some(9))
    }
    async fn delete_comment(&self, _id: i64) -> RepoResult<u64> {
        Ok(self.delete_result)
    }
}

// --- TEST UTILITIES ---

fn create_test_state(repo: Arc<MockRepoControl>, upload_dir: &TempDir) -> AppState {
    AppState {
        repo,
        uploads: Arc::new(LocalUploadStore::new(upload_dir.path())),
        config: AppConfig::default(),
    }
}

fn admin() -> AuthUser {
    AuthUser {
        id: 1,
        username: "admin".to_string(),
    }
}

fn sample_article(attachment_path: Option<&str>) -> Article {
    Article {
        id: 3,
        title: "Release notes".to_string(),
        body: "Fixed the launcher".to_string(),
        date: "01/02/2025".to_string(),
        created_at: Utc::now(),
        attachment_path: attachment_path.map(str::to_string),
        attachment_mime_type: attachment_path.map(|_| "image/png".to_string()),
    }
}

fn form(fields: &[(&str, &str)], file: Option<IncomingFile>) -> UploadForm {
    UploadForm {
        fields: fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
        file,
    }
}

fn file(content_type: &str, name: &str) -> IncomingFile {
    IncomingFile {
        file_name: Some(name.to_string()),
        content_type: content_type.to_string(),
        data: b"payload".to_vec(),
    }
}

fn files_in(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path()).map(|d| d.count()).unwrap_or(0)
}

// --- HANDLER TESTS ---

#[tokio::test]
async fn test_get_post_not_found() {
    let dir = TempDir::new().unwrap();
    let state = create_test_state(Arc::new(MockRepoControl::default()), &dir);

    let result = handlers::get_post(State(state), ApiPath(99)).await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_get_post_success() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(MockRepoControl {
        article_result: Some(sample_article(None)),
        ..Default::default()
    });
    let state = create_test_state(repo, &dir);

    let Json(article) = handlers::get_post(State(state), ApiPath(3)).await.unwrap();

    assert_eq!(article.id, 3);
    assert_eq!(article.title, "Release notes");
}

#[tokio::test]
async fn test_delete_post_nonexistent_is_not_found() {
    let dir = TempDir::new().unwrap();
    let state = create_test_state(Arc::new(MockRepoControl::default()), &dir);

    let result = handlers::delete_post(admin(), State(state), ApiPath(12345)).await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_delete_post_with_zero_rows_removed_is_not_found() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(MockRepoControl {
        article_result: Some(sample_article(None)),
        delete_result: 0,
        ..Default::default()
    });
    let state = create_test_state(repo, &dir);

    let result = handlers::delete_post(admin(), State(state), ApiPath(3)).await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_delete_post_discards_attachment() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("old.png"), b"png").unwrap();
    let repo = Arc::new(MockRepoControl {
        article_result: Some(sample_article(Some("/uploads/old.png"))),
        delete_result: 1,
        ..Default::default()
    });
    let state = create_test_state(repo, &dir);

    let Json(message) = handlers::delete_post(admin(), State(state), ApiPath(3))
        .await
        .unwrap();

    assert_eq!(message.message, "Post deleted");
    assert!(!dir.path().join("old.png").exists());
}

#[tokio::test]
async fn test_create_post_missing_title_is_rejected() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(MockRepoControl::default());
    let state = create_test_state(repo.clone(), &dir);

    let result = handlers::create_post(admin(), State(state), form(&[("body", "text")], None)).await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(repo.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_create_post_accepts_legacy_field_names() {
    let dir = TempDir::new().unwrap();
    let state = create_test_state(Arc::new(MockRepoControl::default()), &dir);

    let (status, Json(created)) = handlers::create_post(
        admin(),
        State(state),
        form(&[("titulo", "Olá"), ("conteudo", "Primeiro post")], None),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.id, 42);
    assert!(created.attachment_path.is_none());
}

#[tokio::test]
async fn test_create_post_with_disallowed_mime_never_reaches_repository() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(MockRepoControl::default());
    let state = create_test_state(repo.clone(), &dir);

    let result = handlers::create_post(
        admin(),
        State(state),
        form(
            &[("title", "Manual"), ("body", "See attached")],
            Some(file("application/pdf", "manual.pdf")),
        ),
    )
    .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(repo.create_calls.load(Ordering::SeqCst), 0);
    assert_eq!(files_in(&dir), 0);
}

#[tokio::test]
async fn test_create_update_with_image_returns_attachment_path() {
    let dir = TempDir::new().unwrap();
    let state = create_test_state(Arc::new(MockRepoControl::default()), &dir);

    let (status, Json(created)) = handlers::create_update(
        admin(),
        State(state),
        form(
            &[("title", "Patch 1.2"), ("body", "New map")],
            Some(file("image/png", "Map.PNG")),
        ),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    let path = created.attachment_path.expect("attachment path");
    assert!(path.starts_with("/uploads/"));
    assert!(path.ends_with(".png"));
    assert_eq!(files_in(&dir), 1);
}

#[tokio::test]
async fn test_failed_insert_discards_uploaded_file() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(MockRepoControl {
        fail_writes: true,
        ..Default::default()
    });
    let state = create_test_state(repo.clone(), &dir);

    let result = handlers::create_post(
        admin(),
        State(state),
        form(
            &[("title", "Cover"), ("body", "Artwork")],
            Some(file("image/jpeg", "cover.jpg")),
        ),
    )
    .await;

    assert!(matches!(result, Err(AppError::Internal(_))));
    assert_eq!(repo.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(files_in(&dir), 0);
}

#[tokio::test]
async fn test_create_download_without_file_or_link_is_rejected() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(MockRepoControl::default());
    let state = create_test_state(repo.clone(), &dir);

    let result = handlers::create_download(
        admin(),
        State(state),
        form(
            &[("name", "Launcher"), ("version", "1.0"), ("description", "Windows build")],
            None,
        ),
    )
    .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(repo.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_create_download_with_file_and_link_is_rejected_before_writing() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(MockRepoControl::default());
    let state = create_test_state(repo.clone(), &dir);

    let result = handlers::create_download(
        admin(),
        State(state),
        form(
            &[
                ("name", "Launcher"),
                ("version", "1.0"),
                ("description", "Windows build"),
                ("externalLink", "https://example.com/launcher.zip"),
            ],
            Some(file("application/zip", "launcher.zip")),
        ),
    )
    .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(repo.create_calls.load(Ordering::SeqCst), 0);
    assert_eq!(files_in(&dir), 0);
}

#[tokio::test]
async fn test_create_download_with_link_only_succeeds() {
    let dir = TempDir::new().unwrap();
    let state = create_test_state(Arc::new(MockRepoControl::default()), &dir);

    let (status, Json(created)) = handlers::create_download(
        admin(),
        State(state),
        form(
            &[
                ("nome", "Launcher"),
                ("versao", "1.0"),
                ("descricao", "Windows build"),
                ("link", "https://example.com/launcher.zip"),
            ],
            None,
        ),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.id, 7);
    assert!(created.attachment_path.is_none());
}

#[tokio::test]
async fn test_create_comment_on_missing_item_is_not_found() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(MockRepoControl {
        item_exists: false,
        ..Default::default()
    });
    let state = create_test_state(repo.clone(), &dir);

    let result = handlers::create_comment(
        State(state),
        ApiJson(CreateCommentRequest {
            item_type: ItemType::Post,
            item_id: 404,
            author_name: "Ana".to_string(),
            body: "Great post".to_string(),
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert!(repo.last_comment.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_create_comment_rejects_invalid_author_before_insert() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(MockRepoControl {
        item_exists: true,
        ..Default::default()
    });
    let state = create_test_state(repo.clone(), &dir);

    let result = handlers::create_comment(
        State(state),
        ApiJson(CreateCommentRequest {
            item_type: ItemType::Post,
            item_id: 1,
            author_name: "A".to_string(),
            body: "Great post".to_string(),
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(repo.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_create_comment_held_when_auto_approve_disabled() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(MockRepoControl {
        item_exists: true,
        ..Default::default()
    });
    let mut state = create_test_state(repo.clone(), &dir);
    state.config.comments_auto_approve = false;

    let (status, Json(created)) = handlers::create_comment(
        State(state),
        ApiJson(CreateCommentRequest {
            item_type: ItemType::Download,
            item_id: 1,
            author_name: "  Bruno  ".to_string(),
            body: "Link works".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert!(created.pending);

    let stored = repo.last_comment.lock().unwrap().clone().unwrap();
    assert!(!stored.approved);
    assert_eq!(stored.author_name, "Bruno");
}

#[tokio::test]
async fn test_delete_comment_nonexistent_is_not_found() {
    let dir = TempDir::new().unwrap();
    let state = create_test_state(Arc::new(MockRepoControl::default()), &dir);

    let result = handlers::delete_comment(admin(), State(state), ApiPath(5)).await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_storage_failure_returns_generic_500() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(MockRepoControl {
        fail_reads: true,
        ..Default::default()
    });
    let state = create_test_state(repo, &dir);

    let err = handlers::get_posts(State(state)).await.unwrap_err();
    let response = err.into_response();
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(parts.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "internal server error");
    assert!(!bytes.windows(4).any(|w| w == b"pool"));
}
