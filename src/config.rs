use std::env;

/// AppConfig
///
/// Holds the application's entire configuration state. Immutable once loaded and
/// pulled into handlers and extractors via `FromRef`, as part of the unified `AppState`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls which collaborators are allowed to fall back.
    pub env: Env,
    // Postgres connection string. `None` only in local mode, where the in-memory store is used.
    pub db_url: Option<String>,
    // Address the HTTP listener binds to.
    pub bind_addr: String,
    // HMAC secret used to sign and verify access tokens.
    pub jwt_secret: String,
    // Lifetime of an issued access token, in seconds.
    pub access_token_ttl_secs: i64,
    // Lifetime of a mailed confirmation code, in seconds.
    pub confirmation_code_ttl_secs: i64,
    // Sender address stamped on outgoing confirmation mail.
    pub mail_from: String,
    // HTTP mail relay endpoint. Without it, local runs log codes instead of sending them.
    pub mail_relay_url: Option<String>,
    // Optional superuser created at startup if it does not exist yet.
    pub admin_bootstrap: Option<AdminBootstrap>,
}

/// Env
///
/// Defines the runtime context, used to switch between development conveniences
/// (in-memory store, log mailer) and the production infrastructure.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// Credentials for the superuser seeded at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct AdminBootstrap {
    pub username: String,
    pub email: String,
}

const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";
const DEFAULT_TTL_SECS: i64 = 24 * 60 * 60;

impl Default for AppConfig {
    /// default
    ///
    /// Safe, non-panicking values for test state scaffolding. No database URL and
    /// no relay, so nothing here reaches out of the process.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            bind_addr: "127.0.0.1:3000".to_string(),
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            access_token_ttl_secs: DEFAULT_TTL_SECS,
            confirmation_code_ttl_secs: DEFAULT_TTL_SECS,
            mail_from: "noreply@review-catalog.local".to_string(),
            mail_relay_url: None,
            admin_bootstrap: None,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads all parameters from environment variables and implements the **fail-fast**
    /// principle.
    ///
    /// # Panics
    /// Panics if a variable required for the current environment is missing or a numeric
    /// variable cannot be parsed. Production requires `DATABASE_URL`, `JWT_SECRET` and
    /// `MAIL_RELAY_URL`.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let (db_url, jwt_secret, mail_relay_url) = match env {
            Env::Production => (
                Some(env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod")),
                env::var("JWT_SECRET").expect("FATAL: JWT_SECRET must be set in production."),
                Some(env::var("MAIL_RELAY_URL").expect("FATAL: MAIL_RELAY_URL required in prod")),
            ),
            Env::Local => (
                env::var("DATABASE_URL").ok(),
                env::var("JWT_SECRET").unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string()),
                env::var("MAIL_RELAY_URL").ok(),
            ),
        };

        let admin_bootstrap = match (env::var("ADMIN_USERNAME"), env::var("ADMIN_EMAIL")) {
            (Ok(username), Ok(email)) => Some(AdminBootstrap { username, email }),
            _ => None,
        };

        Self {
            env,
            db_url,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            jwt_secret,
            access_token_ttl_secs: secs_var("ACCESS_TOKEN_TTL_SECS"),
            confirmation_code_ttl_secs: secs_var("CONFIRMATION_CODE_TTL_SECS"),
            mail_from: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "noreply@review-catalog.local".to_string()),
            mail_relay_url,
            admin_bootstrap,
        }
    }
}

fn secs_var(name: &str) -> i64 {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("FATAL: {name} must be an integer number of seconds")),
        Err(_) => DEFAULT_TTL_SECS,
    }
}
