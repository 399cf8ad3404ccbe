use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

const DEFAULT_PORT: &str = "5432";

/// Connection settings. Every field is optional: missing values are not
/// validated here and only surface when the store is first queried.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub db_host: Option<String>,
    pub db_port: Option<String>,
    pub db_name: Option<String>,
    /// Full connection string; takes precedence over the `db_*` parts.
    pub database_url: Option<String>,
}

impl Settings {
    /// Load `.env`, then `quarantine.toml` (optional), then the environment.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        Config::builder()
            .add_source(File::with_name("quarantine").required(false))
            .add_source(Environment::default())
            .build()
            .and_then(|c| c.try_deserialize())
            .context("Failed to load configuration")
    }

    pub fn port(&self) -> &str {
        match self.db_port.as_deref() {
            Some(p) if !p.trim().is_empty() => p,
            _ => DEFAULT_PORT,
        }
    }

    pub fn connection_url(&self) -> String {
        if let Some(url) = self.database_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return url.to_string();
        }
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.db_user.as_deref().unwrap_or_default(),
            self.db_password.as_deref().unwrap_or_default(),
            self.db_host.as_deref().unwrap_or_default(),
            self.port(),
            self.db_name.as_deref().unwrap_or_default(),
        )
    }
}
