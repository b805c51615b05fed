use agentforge_common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::model::AppConfig;

const CONFIG_FILE_NAME: &str = "config.yml";

/// Loads [`AppConfig`] from a YAML file, `.env`, and environment overrides,
/// in that order of increasing precedence.
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { path: None }
    }

    /// Use an explicit config file instead of `~/.agentforge/config.yml`.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".agentforge")
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(CONFIG_FILE_NAME)
    }

    pub fn load(&self) -> Result<AppConfig> {
        if let Ok(env_path) = dotenvy::dotenv() {
            debug!("loaded environment from {}", env_path.display());
        }

        let explicit = self.path.is_some();
        let path = self.path.clone().unwrap_or_else(Self::default_config_path);

        let mut config = if path.is_file() {
            info!("loading config from {}", path.display());
            Self::read_file(&path)?
        } else if explicit {
            return Err(Error::Configuration(format!(
                "config file not found: {}",
                path.display()
            )));
        } else {
            debug!("no config file at {}, using defaults", path.display());
            AppConfig::default()
        };

        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<AppConfig> {
        let raw = std::fs::read_to_string(path)?;
        if raw.trim().is_empty() {
            return Ok(AppConfig::default());
        }
        serde_yaml::from_str(&raw).map_err(|e| {
            Error::Configuration(format!("invalid config file {}: {e}", path.display()))
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `AGENTFORGE_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("AGENTFORGE_HOST").filter(|v| !v.trim().is_empty()) {
        config.gateway.host = host.trim().to_string();
    }
    if let Some(port) = lookup("AGENTFORGE_PORT") {
        match port.trim().parse::<u16>() {
            Ok(port) => config.gateway.port = port,
            Err(_) => warn!("ignoring invalid AGENTFORGE_PORT value '{port}'"),
        }
    }
    if let Some(db) = lookup("AGENTFORGE_DB").filter(|v| !v.trim().is_empty()) {
        config.database.path = PathBuf::from(db.trim());
    }
    if let Some(url) = lookup("AGENTFORGE_TOGETHER_BASE_URL").filter(|v| !v.trim().is_empty()) {
        config.upstream.together_base_url = url.trim().trim_end_matches('/').to_string();
    }
    if let Some(url) = lookup("AGENTFORGE_OPENAI_BASE_URL").filter(|v| !v.trim().is_empty()) {
        config.upstream.openai_base_url = url.trim().trim_end_matches('/').to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config = AppConfig::default();
        apply_env_overrides(
            &mut config,
            lookup_from(&[
                ("AGENTFORGE_HOST", "0.0.0.0"),
                ("AGENTFORGE_PORT", "9000"),
                ("AGENTFORGE_DB", "/tmp/agents.db"),
                ("AGENTFORGE_TOGETHER_BASE_URL", "http://localhost:4010/v1/"),
            ]),
        );
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.database.path, PathBuf::from("/tmp/agents.db"));
        assert_eq!(config.upstream.together_base_url, "http://localhost:4010/v1");
    }

    #[test]
    fn invalid_port_is_ignored() {
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, lookup_from(&[("AGENTFORGE_PORT", "eighty")]));
        assert_eq!(config.gateway.port, 8000);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let loader = ConfigLoader::with_path("/definitely/not/here/config.yml");
        assert!(matches!(loader.load(), Err(Error::Configuration(_))));
    }

    #[test]
    fn reads_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "gateway:\n  port: 8123\ndatabase:\n  path: agents.sqlite").unwrap();

        let config = ConfigLoader::read_file(file.path()).unwrap();
        assert_eq!(config.gateway.port, 8123);
        assert_eq!(config.database.path, PathBuf::from("agents.sqlite"));
    }

    #[test]
    fn malformed_yaml_is_a_configuration_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "gateway: [not, a, map").unwrap();
        assert!(matches!(
            ConfigLoader::read_file(file.path()),
            Err(Error::Configuration(_))
        ));
    }
}
