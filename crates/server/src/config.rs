use anyhow::Context;
use config::{Config, Environment, File};
use serde::Deserialize;

pub const DEFAULT_SERVER_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./data/review.db";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: DEFAULT_SERVER_BIND.into(),
            database_url: DEFAULT_DATABASE_URL.into(),
            log_filter: DEFAULT_LOG_FILTER.into(),
        }
    }
}

/// Defaults, then `server.toml`, then `APP__*` variables, then the plain
/// `PORT` / `SERVER_BIND` / `DATABASE_URL` variables.
pub fn load_settings() -> anyhow::Result<Settings> {
    let mut settings: Settings = Config::builder()
        .set_default("server_bind", DEFAULT_SERVER_BIND)?
        .set_default("database_url", DEFAULT_DATABASE_URL)?
        .set_default("log_filter", DEFAULT_LOG_FILTER)?
        .add_source(File::with_name("server").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()
        .context("failed to read configuration")?
        .try_deserialize()
        .context("invalid configuration")?;

    apply_plain_env(&mut settings, |key| std::env::var(key).ok());
    settings.database_url = normalize_database_url(&settings.database_url);
    Ok(settings)
}

fn apply_plain_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(port) = lookup("PORT").filter(|v| !v.trim().is_empty()) {
        settings.server_bind = format!("0.0.0.0:{}", port.trim());
    }
    if let Some(bind) = lookup("SERVER_BIND") {
        settings.server_bind = bind;
    }
    if let Some(url) = lookup("DATABASE_URL") {
        settings.database_url = url;
    }
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return DEFAULT_DATABASE_URL.to_string();
    }

    if raw_database_url.starts_with("sqlite:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
