//! `askdb.toml` loading.
//!
//! Precedence everywhere: CLI flag > environment > askdb.toml > built-in
//! default. The file holds no secrets; passwords and API keys come from
//! the environment only and are never written back.

use std::path::Path;

use serde::Deserialize;

use crate::connect::BackendKind;
use crate::error::AskdbError;
use crate::execute::ExecutionPolicy;
use crate::model::ModelChoice;

pub const CONFIG_FILE: &str = "askdb.toml";

/// Environment variable consulted for the database password.
pub const DB_PASSWORD_ENV: &str = "ASKDB_DB_PASSWORD";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Non-secret connection defaults. There is deliberately no password slot.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    pub backend: Option<BackendKind>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub database: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ModelConfig {
    pub backend: Option<ModelChoice>,
    pub timeout_secs: u64,
    pub ollama_url: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: None,
            timeout_secs: 30,
            ollama_url: "http://localhost:11434".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExecutionConfig {
    pub read_only: bool,
    pub max_rows: usize,
    pub timeout_secs: u64,
    pub write_keywords: Option<Vec<String>>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            read_only: true,
            max_rows: 500,
            timeout_secs: 30,
            write_keywords: None,
        }
    }
}

impl Config {
    /// Load `askdb.toml` from the working directory; defaults when absent.
    pub fn load() -> Result<Self, AskdbError> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self, AskdbError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| AskdbError::Config(format!("{}: {e}", path.display())))
    }

    /// Build the execution policy the file describes.
    pub fn policy(&self) -> ExecutionPolicy {
        let mut policy = ExecutionPolicy::default();
        policy.read_only = self.execution.read_only;
        if let Some(keywords) = &self.execution.write_keywords {
            policy.write_keywords = keywords.iter().map(|k| k.to_ascii_uppercase()).collect();
        }
        policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load_from(Path::new("definitely-not-here.toml")).unwrap();
        assert!(config.execution.read_only);
        assert_eq!(config.execution.max_rows, 500);
        assert_eq!(config.model.ollama_url, "http://localhost:11434");
    }

    #[test]
    fn test_round_trip_through_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[connection]\nbackend = \"postgres\"\nhost = \"db.internal\"\n\n\
             [model]\nbackend = \"sqlcoder\"\n\n\
             [execution]\nread_only = false\nmax_rows = 50\n\
             write_keywords = [\"insert\", \"delete\", \"create\"]\n"
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.connection.backend, Some(BackendKind::Postgres));
        assert_eq!(config.connection.host.as_deref(), Some("db.internal"));
        assert_eq!(config.model.backend, Some(ModelChoice::Sqlcoder));
        assert_eq!(config.execution.max_rows, 50);

        let policy = config.policy();
        assert!(!policy.read_only);
        assert!(policy.write_keywords.contains("CREATE"));
        assert!(policy.write_keywords.contains("INSERT"));
        assert!(!policy.write_keywords.contains("UPDATE"));
    }

    #[test]
    fn test_password_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[connection]\npassword = \"hunter2\"\n").unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }
}
