use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ai: AiConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Server-side proxy endpoint that forwards generateContent calls and
    /// keeps the credential off the clients.
    pub proxy_url: String,

    /// Credential for the direct fallback path. Absent means the fallback is
    /// disabled at startup.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_model() -> String {
    "gemini-1.5-flash-002".to_string()
}

fn default_max_attempts() -> u32 {
    4
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_path() -> String {
    "phytoscan.db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn minimal_config_fills_defaults() {
        let yaml = r#"
ai:
  proxy_url: "https://example.com/api/analyze"
server: {}
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.ai.api_key, None);
        assert_eq!(config.ai.model, "gemini-1.5-flash-002");
        assert_eq!(config.ai.max_attempts, 4);
        assert_eq!(config.ai.retry_delay_ms, 2000);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.logs.level, "info");
        assert_eq!(config.server.database_path, "phytoscan.db");
    }

    #[test]
    fn explicit_values_override_defaults() {
        let yaml = r#"
ai:
  proxy_url: "http://localhost:3000/api/analyze"
  api_key: "secret"
  max_attempts: 2
  retry_delay_ms: 100
server:
  host: "127.0.0.1"
  port: 9090
  logs:
    level: debug
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.ai.api_key.as_deref(), Some("secret"));
        assert_eq!(config.ai.max_attempts, 2);
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.logs.level, "debug");
    }
}
