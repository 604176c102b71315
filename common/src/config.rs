use serde::{Deserialize, Serialize};
use std::fs;
use anyhow::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub elasticsearch: EsConfig,
    pub reports: ReportsConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    pub collector: CollectorConfig,
    pub notifier: NotifierConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsConfig {
    #[serde(default = "default_es_url")]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    #[serde(default = "default_reports_url")]
    pub base_url: String,
    pub api_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "default_event_prefix")]
    pub index_prefix: String,
    #[serde(default = "default_historic_window")]
    pub historic_window_minutes: i64,
    #[serde(default = "default_lag")]
    pub lag_minutes: i64,
    #[serde(default = "default_run_every")]
    pub run_every_minutes: i64,
    #[serde(default = "default_scopes_file")]
    pub scopes_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default = "default_event_prefix")]
    pub data_index_prefix: String,
    #[serde(default = "default_state_prefix")]
    pub state_index_prefix: String,
    #[serde(default = "default_lookback")]
    pub lookback_hours: i64,
    #[serde(default = "default_run_every")]
    pub run_every_minutes: i64,
    #[serde(default = "default_scopes_file")]
    pub scopes_file: String,
    #[serde(default = "default_whitelist_file")]
    pub whitelist_file: String,
    #[serde(default = "default_blacklist_file")]
    pub blacklist_file: String,
    #[serde(default = "default_template_file")]
    pub template_file: String,
    #[serde(default = "default_blacklist_template_file")]
    pub blacklist_template_file: String,
    pub audit_recipient: String,
    pub sender_email: String,
    #[serde(default = "default_sender_name")]
    pub sender_name: String,
}

fn default_es_url() -> String { "http://localhost:9200".to_string() }
fn default_reports_url() -> String { "https://admin.googleapis.com".to_string() }
fn default_smtp_host() -> String { "localhost".to_string() }
fn default_smtp_port() -> u16 { 25 }
fn default_event_prefix() -> String { "grant-events".to_string() }
fn default_state_prefix() -> String { "grant-notify-state".to_string() }
fn default_historic_window() -> i64 { 600 }
fn default_lag() -> i64 { 0 }
fn default_run_every() -> i64 { 5 }
fn default_lookback() -> i64 { 48 }
fn default_scopes_file() -> String { "./config/scopes.json".to_string() }
fn default_whitelist_file() -> String { "./config/appwhitelist".to_string() }
fn default_blacklist_file() -> String { "./config/appblacklist".to_string() }
fn default_template_file() -> String { "./config/templates/notification.html".to_string() }
fn default_blacklist_template_file() -> String { "./config/templates/blacklist.html".to_string() }
fn default_sender_name() -> String { "Workspace Security Notification".to_string() }

impl Default for SmtpConfig {
    fn default() -> Self {
        SmtpConfig {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_path() -> String {
        std::env::var("GRANTWATCH_CONFIG")
            .unwrap_or_else(|_| "./config/default.toml".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let raw = r#"
            [elasticsearch]

            [reports]
            api_token = "tok"

            [collector]

            [notifier]
            audit_recipient = "secops@example.com"
            sender_email = "no-reply@example.com"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.elasticsearch.url, "http://localhost:9200");
        assert_eq!(config.smtp.port, 25);
        assert_eq!(config.collector.historic_window_minutes, 600);
        assert_eq!(config.collector.lag_minutes, 0);
        assert_eq!(config.notifier.lookback_hours, 48);
        assert_eq!(config.notifier.state_index_prefix, "grant-notify-state");
        assert_eq!(config.notifier.sender_name, "Workspace Security Notification");
    }

    #[test]
    fn explicit_values_override_defaults() {
        let raw = r#"
            [elasticsearch]
            url = "http://es.internal:9200"

            [reports]
            api_token = "tok"

            [smtp]
            host = "mail.internal"
            port = 587
            username = "svc"
            password = "secret"

            [collector]
            historic_window_minutes = 2880
            lag_minutes = 30

            [notifier]
            audit_recipient = "secops@example.com"
            sender_email = "no-reply@example.com"
            lookback_hours = 72
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.elasticsearch.url, "http://es.internal:9200");
        assert_eq!(config.smtp.username.as_deref(), Some("svc"));
        assert_eq!(config.collector.historic_window_minutes, 2880);
        assert_eq!(config.collector.lag_minutes, 30);
        assert_eq!(config.notifier.lookback_hours, 72);
    }
}
