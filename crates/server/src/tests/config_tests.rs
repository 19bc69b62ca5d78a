use std::collections::HashMap;

use super::{apply_plain_env, normalize_database_url, Settings};

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
}

#[test]
fn keeps_sqlite_and_memory_urls() {
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(
        normalize_database_url("sqlite://./review.db?mode=rwc"),
        "sqlite://./review.db?mode=rwc"
    );
}

#[test]
fn blank_database_url_falls_back_to_default() {
    assert_eq!(normalize_database_url("  "), Settings::default().database_url);
}

#[test]
fn port_binds_every_interface() {
    let mut settings = Settings::default();
    apply_plain_env(&mut settings, env(&[("PORT", "9090")]));
    assert_eq!(settings.server_bind, "0.0.0.0:9090");
}

#[test]
fn server_bind_wins_over_port() {
    let mut settings = Settings::default();
    apply_plain_env(
        &mut settings,
        env(&[("PORT", "9090"), ("SERVER_BIND", "127.0.0.1:7000")]),
    );
    assert_eq!(settings.server_bind, "127.0.0.1:7000");
}

#[test]
fn database_url_override_replaces_default() {
    let mut settings = Settings::default();
    apply_plain_env(&mut settings, env(&[("DATABASE_URL", "sqlite::memory:")]));
    assert_eq!(settings.database_url, "sqlite::memory:");
    assert_eq!(settings.log_filter, "info");
}

#[test]
fn no_plain_variables_keeps_settings() {
    let mut settings = Settings::default();
    apply_plain_env(&mut settings, env(&[]));
    assert_eq!(settings, Settings::default());
}
