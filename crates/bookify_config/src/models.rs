// --- File: crates/bookify_config/src/models.rs ---

use serde::{Deserialize, Serialize};

// --- General Server Config ---
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

// --- Database Config ---
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String, // e.g. DATABASE_URL loaded via BOOKIFY_DATABASE__URL
}

// --- Google Calendar Config ---
// Holds non-secret OAuth client settings. The client secret is expected to be
// injected through the environment (BOOKIFY_GOOGLE__CLIENT_SECRET).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    /// OAuth token endpoint. Defaults to Google's production endpoint.
    pub token_uri: Option<String>,
    /// Calendar API base. Overridable so tests can point at a local stub.
    pub api_base: Option<String>,
    /// Per-account deadline for free/busy fan-out requests, in seconds.
    pub busy_fetch_timeout_secs: Option<u64>,
}

impl GoogleConfig {
    pub fn token_uri(&self) -> &str {
        self.token_uri
            .as_deref()
            .unwrap_or("https://oauth2.googleapis.com/token")
    }

    pub fn api_base(&self) -> &str {
        self.api_base
            .as_deref()
            .unwrap_or("https://www.googleapis.com/calendar/v3")
    }

    pub fn busy_fetch_timeout_secs(&self) -> u64 {
        self.busy_fetch_timeout_secs.unwrap_or(5)
    }
}

// --- Mailer Config ---
// Non-secret mailer settings; the API key arrives via BOOKIFY_MAILER__API_KEY.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MailerConfig {
    pub api_url: String,
    pub api_key: String,
    pub from_address: String,
    pub from_name: Option<String>,
}

// --- Unified App Configuration ---
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    // Server config is mandatory
    pub server: ServerConfig,

    // --- Runtime Flags (optional in config file, default to false) ---
    #[serde(default)]
    pub use_gcal: bool,
    #[serde(default)]
    pub use_mailer: bool,

    // --- Optional Feature Configurations ---
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub google: Option<GoogleConfig>,
    #[serde(default)]
    pub mailer: Option<MailerConfig>,
}
