use crate::models::{
    Article, ArticleKind, Comment, Download, DownloadSource, ItemType, NewArticle, NewComment,
    NewDownload, User,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};
use std::{str::FromStr, sync::Arc};

pub type RepoResult<T> = Result<T, sqlx::Error>;

/// Repository Trait
///
/// Abstract contract for all persistence operations. Every entity follows the same
/// shape: list (newest first), fetch by id, create (returns the new id) and delete
/// (returns rows removed). There is no update operation.
///
/// **Send + Sync + async_trait** make `Arc<dyn Repository>` shareable across Axum's
/// task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    async fn create_user(&self, username: &str, password_hash: &str) -> RepoResult<i64>;

    // --- Posts & Updates ---
    async fn list_articles(&self, kind: ArticleKind) -> RepoResult<Vec<Article>>;
    async fn get_article(&self, kind: ArticleKind, id: i64) -> RepoResult<Option<Article>>;
    async fn create_article(&self, kind: ArticleKind, article: NewArticle) -> RepoResult<i64>;
    /// Removes the article and its comments in one transaction.
    async fn delete_article(&self, kind: ArticleKind, id: i64) -> RepoResult<u64>;

    // --- Downloads ---
    async fn list_downloads(&self) -> RepoResult<Vec<Download>>;
    async fn get_download(&self, id: i64) -> RepoResult<Option<Download>>;
    async fn create_download(&self, download: NewDownload) -> RepoResult<i64>;
    async fn delete_download(&self, id: i64) -> RepoResult<u64>;

    // --- Comments ---
    /// Approved comments only; pending ones stay hidden from visitors.
    async fn list_comments(&self, item_type: ItemType, item_id: i64) -> RepoResult<Vec<Comment>>;
    async fn get_comment(&self, id: i64) -> RepoResult<Option<Comment>>;
    /// Inserts the comment only if its target item exists, in one statement, so a
    /// concurrent delete of the item cannot leave it orphaned. `None` when the target
    /// is missing.
    async fn create_comment(&self, comment: NewComment) -> RepoResult<Option<i64>>;
    async fn delete_comment(&self, id: i64) -> RepoResult<u64>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// SqliteRepository
///
/// `Repository` backed by SQLite. Every statement runs in autocommit (or an explicit
/// transaction for cascading deletes) with `synchronous=FULL`, so a mutation is on disk
/// before the call returns.
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Opens (creating if missing) the database at `url` and applies migrations.
    pub async fn connect(url: &str) -> RepoResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database. A single never-expiring connection keeps the data
    /// alive for the lifetime of the repository.
    pub async fn in_memory() -> RepoResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> RepoResult<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Deletes `id` from `table` together with the comments pointing at it.
    async fn delete_item_cascade(&self, item_type: ItemType, id: i64) -> RepoResult<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM comments WHERE item_type = ? AND item_id = ?")
            .bind(item_type)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let removed = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", item_type.table()))
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(removed)
    }
}

const ARTICLE_COLUMNS: &str =
    "id, title, body, date, created_at, attachment_path, attachment_mime_type";

const DOWNLOAD_COLUMNS: &str = "id, name, version, description, date, created_at, \
     attachment_path, external_link, attachment_mime_type";

const COMMENT_COLUMNS: &str =
    "id, item_type, item_id, author_name, body, date, approved, created_at";

#[async_trait]
impl Repository for SqliteRepository {
    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> RepoResult<i64> {
        let res = sqlx::query(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?)",
        )
        .bind(username)
        .bind(password_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    async fn list_articles(&self, kind: ArticleKind) -> RepoResult<Vec<Article>> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM {} ORDER BY created_at DESC, id DESC",
            kind.table()
        );
        sqlx::query_as::<_, Article>(&sql).fetch_all(&self.pool).await
    }

    async fn get_article(&self, kind: ArticleKind, id: i64) -> RepoResult<Option<Article>> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM {} WHERE id = ?", kind.table());
        sqlx::query_as::<_, Article>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create_article(&self, kind: ArticleKind, article: NewArticle) -> RepoResult<i64> {
        let sql = format!(
            "INSERT INTO {} (title, body, date, created_at, attachment_path, attachment_mime_type) \
             VALUES (?, ?, ?, ?, ?, ?)",
            kind.table()
        );
        let (path, mime) = match article.attachment {
            Some(a) => (Some(a.path), Some(a.mime_type)),
            None => (None, None),
        };
        let res = sqlx::query(&sql)
            .bind(article.title)
            .bind(article.body)
            .bind(article.date)
            .bind(Utc::now())
            .bind(path)
            .bind(mime)
            .execute(&self.pool)
            .await?;
        Ok(res.last_insert_rowid())
    }

    async fn delete_article(&self, kind: ArticleKind, id: i64) -> RepoResult<u64> {
        self.delete_item_cascade(kind.item_type(), id).await
    }

    async fn list_downloads(&self) -> RepoResult<Vec<Download>> {
        let sql =
            format!("SELECT {DOWNLOAD_COLUMNS} FROM downloads ORDER BY created_at DESC, id DESC");
        sqlx::query_as::<_, Download>(&sql).fetch_all(&self.pool).await
    }

    async fn get_download(&self, id: i64) -> RepoResult<Option<Download>> {
        let sql = format!("SELECT {DOWNLOAD_COLUMNS} FROM downloads WHERE id = ?");
        sqlx::query_as::<_, Download>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create_download(&self, download: NewDownload) -> RepoResult<i64> {
        let (path, link, mime) = match download.source {
            DownloadSource::File(a) => (Some(a.path), None, Some(a.mime_type)),
            DownloadSource::Link(link) => (None, Some(link), None),
        };
        let res = sqlx::query(
            "INSERT INTO downloads \
             (name, version, description, date, created_at, attachment_path, external_link, attachment_mime_type) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(download.name)
        .bind(download.version)
        .bind(download.description)
        .bind(download.date)
        .bind(Utc::now())
        .bind(path)
        .bind(link)
        .bind(mime)
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    async fn delete_download(&self, id: i64) -> RepoResult<u64> {
        self.delete_item_cascade(ItemType::Download, id).await
    }

    async fn list_comments(&self, item_type: ItemType, item_id: i64) -> RepoResult<Vec<Comment>> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments \
             WHERE item_type = ? AND item_id = ? AND approved = 1 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Comment>(&sql)
            .bind(item_type)
            .bind(item_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn get_comment(&self, id: i64) -> RepoResult<Option<Comment>> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?");
        sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create_comment(&self, comment: NewComment) -> RepoResult<Option<i64>> {
        let sql = format!(
            "INSERT INTO comments (item_type, item_id, author_name, body, date, approved, created_at) \
             SELECT ?, ?, ?, ?, ?, ?, ? \
             WHERE EXISTS (SELECT 1 FROM {} WHERE id = ?)",
            comment.item_type.table()
        );
        let res = sqlx::query(&sql)
            .bind(comment.item_type)
            .bind(comment.item_id)
            .bind(comment.author_name)
            .bind(comment.body)
            .bind(comment.date)
            .bind(comment.approved)
            .bind(Utc::now())
            .bind(comment.item_id)
            .execute(&self.pool)
            .await?;
        Ok((res.rows_affected() == 1).then(|| res.last_insert_rowid()))
    }

    async fn delete_comment(&self, id: i64) -> RepoResult<u64> {
        let res = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}
