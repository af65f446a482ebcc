use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
    /// Base URL prepended to relative asset links in responses. Empty means
    /// links are returned as stored.
    pub public_base_url: String,
    /// Switches the log subscriber to debug verbosity.
    pub debug: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Secret used to sign the session cookie JWT.
    pub session_secret: String,
    /// OAuth client id the Google ID token must be issued for.
    pub google_client_id: String,
    /// Email domains allowed to sign in (compared case-insensitively).
    pub allowed_email_domains: Vec<String>,
    /// Set the `Secure` attribute on the session cookie.
    pub secure_cookies: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GoogleConfig {
    /// Service-account email used for Sheets and Drive access.
    pub service_account_email: String,
    /// PEM private key; `\n` escapes are normalized on load.
    pub service_account_private_key: String,
    /// Spreadsheet holding the six taxonomy tabs.
    pub taxonomy_sheet_id: String,
    /// Spreadsheet holding the email→role directory.
    pub roles_sheet_id: String,
    /// Range of the role directory (email column, role column).
    pub roles_range: String,
    /// Drive folder all asset folders are created under.
    pub drive_root_folder_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub role_ttl_secs: u64,
    pub taxonomy_ttl_secs: u64,
    pub sheet_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub google: GoogleConfig,
    pub cache: CacheConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 4000)?
            .set_default("server.cors.allow_origins", vec!["http://localhost:5173".to_string()])?
            .set_default("server.cors.max_age", 3600)?
            .set_default("server.public_base_url", "")?
            .set_default("server.debug", false)?
            .set_default("auth.allowed_email_domains", vec!["pw.live".to_string()])?
            .set_default("auth.secure_cookies", false)?
            .set_default("google.roles_range", "Roles!A2:B")?
            .set_default("cache.role_ttl_secs", 300)?
            .set_default("cache.taxonomy_ttl_secs", 60)?
            .set_default("cache.sheet_ttl_secs", 60)?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., CREATIVEHUB__AUTH__SESSION_SECRET)
            .add_source(Environment::with_prefix("CREATIVEHUB").separator("__"))
            .build()?;

        let mut cfg: AppConfig = s.try_deserialize()?;
        // Keys pasted into env vars usually arrive with literal backslash-n.
        cfg.google.service_account_private_key =
            cfg.google.service_account_private_key.replace("\\n", "\n");
        Ok(cfg)
    }
}
