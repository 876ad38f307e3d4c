use std::env;

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once at startup and
/// shared read-only with every request through `FromRef`, so handlers and the auth
/// extractor all see the same signing secret and storage locations.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls which secrets must be provided explicitly.
    pub env: Env,
    // SQLite connection string (e.g. `sqlite://nexo.db`).
    pub database_url: String,
    // Secret used to sign and verify bearer tokens (HS256).
    pub jwt_secret: String,
    // Address the HTTP listener binds to.
    pub bind_addr: String,
    // Directory served at `/` (landing page and other static assets).
    pub public_dir: String,
    // Directory uploaded attachments are written to, served at `/uploads`.
    pub upload_dir: String,
    // Credentials of the seeded administrative account.
    pub admin_username: String,
    pub admin_password: String,
    // Moderation flag: when false, new comments are held pending approval.
    pub comments_auto_approve: bool,
}

/// Env
///
/// Defines the runtime context. `Production` refuses to start with the development
/// fallbacks for the token secret and admin password.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

const LOCAL_JWT_SECRET: &str = "nexo-local-dev-secret";
const LOCAL_ADMIN_PASSWORD: &str = "nexo2024";

impl Default for AppConfig {
    /// default
    ///
    /// Non-panicking configuration for test setup: in-memory database and the
    /// local development fallbacks.
    fn default() -> Self {
        Self {
            env: Env::Local,
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            bind_addr: "127.0.0.1:3000".to_string(),
            public_dir: "public".to_string(),
            upload_dir: "public/uploads".to_string(),
            admin_username: "admin".to_string(),
            admin_password: LOCAL_ADMIN_PASSWORD.to_string(),
            comments_auto_approve: true,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads all parameters from environment variables and fails fast.
    ///
    /// # Panics
    /// Panics in `Env::Production` when `JWT_SECRET` or `ADMIN_PASSWORD` is missing, so
    /// the server never runs with the well-known development values.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let (jwt_secret, admin_password) = match env {
            Env::Production => (
                env::var("JWT_SECRET").expect("FATAL: JWT_SECRET must be set in production."),
                env::var("ADMIN_PASSWORD")
                    .expect("FATAL: ADMIN_PASSWORD must be set in production."),
            ),
            Env::Local => (
                env::var("JWT_SECRET").unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string()),
                env::var("ADMIN_PASSWORD").unwrap_or_else(|_| LOCAL_ADMIN_PASSWORD.to_string()),
            ),
        };

        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);

        Self {
            env,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://nexo.db".to_string()),
            jwt_secret,
            bind_addr: format!("0.0.0.0:{}", port),
            public_dir: env::var("PUBLIC_DIR").unwrap_or_else(|_| "public".to_string()),
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "public/uploads".to_string()),
            admin_username: env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string()),
            admin_password,
            comments_auto_approve: env::var("COMMENTS_AUTO_APPROVE")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
