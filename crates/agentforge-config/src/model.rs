use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration. Every section has defaults so an empty file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub database: DatabaseConfig,
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Browser origins allowed by the CORS layer.
    pub cors_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:3001".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://localhost:8000".to_string(),
                "http://127.0.0.1:8000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("chat_history.db"),
        }
    }
}

/// Upstream providers. Credentials are never stored here, only the names of
/// the environment variables that hold them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub together_base_url: String,
    pub openai_base_url: String,
    pub together_key_env: String,
    pub openai_key_env: String,
    pub chat_timeout_secs: u64,
    pub image_timeout_secs: u64,
    pub naming_timeout_secs: u64,
    pub naming_model: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            together_base_url: "https://api.together.xyz/v1".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            together_key_env: "TOGETHER_API_KEY".to_string(),
            openai_key_env: "OPENAI_API_KEY".to_string(),
            chat_timeout_secs: 120,
            image_timeout_secs: 90,
            naming_timeout_secs: 30,
            naming_model: "mistralai/Mistral-7B-Instruct-v0.2".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.upstream.together_key_env, "TOGETHER_API_KEY");
        assert_eq!(config.upstream.chat_timeout_secs, 120);
        assert_eq!(config.database.path, PathBuf::from("chat_history.db"));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let yaml = "gateway:\n  port: 9100\nupstream:\n  naming_timeout_secs: 5\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.gateway.port, 9100);
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.upstream.naming_timeout_secs, 5);
        assert_eq!(config.upstream.image_timeout_secs, 90);
    }
}
