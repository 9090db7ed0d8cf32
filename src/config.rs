//! Configuration, defaults and the TOML config file

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

/// All configurable names, endpoints and limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Display name of the bot account, used for group mentions
    pub bot_name: String,
    /// Prefix a message must carry to reach the bot (empty = every private message)
    pub trigger_keyword: String,
    pub completion_url: String,
    pub conversation_id: String,
    pub redemption_url: String,
    /// Leading token that turns a message into a redemption request
    pub redemption_marker: String,
    /// Requests added to today's quota per accepted code
    pub redemption_credit: u32,
    pub daily_free_quota: u32,
    /// Let a user with no record today ask one question before being gated
    pub free_question_on_first_contact: bool,
    /// Who to contact for more quota (shown in the informational reply)
    pub contact_hint: String,
    /// Max characters per outbound chat message
    pub max_chunk_size: usize,
    /// Appended to every reply
    pub signature: String,
    pub request_timeout_secs: u64,
    pub quota_db: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quota-relay");

        Self {
            bot_name: "Chopin".to_string(),
            trigger_keyword: String::new(),
            completion_url: "http://127.0.0.1:8080/api".to_string(),
            conversation_id: DEFAULT_CONVERSATION_ID.to_string(),
            redemption_url: "https://www.shaobingriyu.com/api/user/openai/ticket/consume"
                .to_string(),
            redemption_marker: "兑换码".to_string(),
            redemption_credit: 3,
            daily_free_quota: 1,
            free_question_on_first_contact: false,
            contact_hint: "我是DJ".to_string(),
            max_chunk_size: SINGLE_MESSAGE_MAX_SIZE,
            signature: "\n----------\n我是Chopin, 提问请看群公告.".to_string(),
            request_timeout_secs: 60,
            quota_db: data_dir.join("quota.db"),
        }
    }
}

impl Config {
    /// Create config for testing with custom paths
    pub fn for_test(temp_dir: &Path) -> Self {
        Self {
            bot_name: "bot".to_string(),
            trigger_keyword: String::new(),
            completion_url: "http://127.0.0.1:9/api".to_string(),
            redemption_url: "http://127.0.0.1:9/redeem".to_string(),
            signature: "\n--\nsig".to_string(),
            request_timeout_secs: 5,
            quota_db: temp_dir.join("quota.db"),
            ..Self::default()
        }
    }

    /// Default config file location (~/.config/quota-relay/config.toml on Linux)
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quota-relay/config.toml")
    }

    /// Load config from `path` (or the default location). A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let config = if path.exists() {
            let content = fs::read_to_string(&path)?;
            toml::from_str::<Config>(&content)?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Config::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Save config to disk atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut temp = NamedTempFile::new_in(parent)?;

        let body = toml::to_string_pretty(self)?;
        temp.write_all(body.as_bytes())?;
        temp.as_file().sync_all()?;

        temp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.bot_name.trim().is_empty() {
            return Err(Error::Config("bot_name must not be empty".to_string()));
        }
        if self.max_chunk_size == 0 {
            return Err(Error::Config("max_chunk_size must be at least 1".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.redemption_credit == 0 {
            return Err(Error::Config(
                "redemption_credit must be at least 1".to_string(),
            ));
        }
        for (name, url) in [
            ("completion_url", &self.completion_url),
            ("redemption_url", &self.redemption_url),
        ] {
            reqwest::Url::parse(url)
                .map_err(|e| Error::Config(format!("{} '{}': {}", name, url, e)))?;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Message size for a single reply chunk
pub const SINGLE_MESSAGE_MAX_SIZE: usize = 500;

/// Conversation the completion backend keeps context under
pub const DEFAULT_CONVERSATION_ID: &str = "06f4614e-5bb7-4ba6-968a-cbd0a44cafbb";

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_chunk_size, 500);
        assert_eq!(config.redemption_credit, 3);
        assert!(config.trigger_keyword.is_empty());
        assert!(config.quota_db.to_string_lossy().contains("quota.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_test_config() {
        let temp = std::env::temp_dir();
        let config = Config::for_test(&temp);
        assert_eq!(config.quota_db, temp.join("quota.db"));
        assert_eq!(config.bot_name, "bot");
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(Some(&temp_dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "bot_name = \"helper\"\ntrigger_keyword = \"ask:\"\nmax_chunk_size = 200\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.bot_name, "helper");
        assert_eq!(config.trigger_keyword, "ask:");
        assert_eq!(config.max_chunk_size, 200);
        // Untouched fields keep their defaults
        assert_eq!(config.redemption_marker, "兑换码");
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/config.toml");
        let mut config = Config::for_test(temp_dir.path());
        config.contact_hint = "admin".to_string();

        config.save(&path).unwrap();
        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let temp = std::env::temp_dir();

        let mut config = Config::for_test(&temp);
        config.max_chunk_size = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::for_test(&temp);
        config.bot_name = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::for_test(&temp);
        config.completion_url = "not a url".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("completion_url"));
    }

    #[test]
    fn test_load_rejects_malformed_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "bot_name = [").unwrap();
        assert!(matches!(Config::load(Some(&path)), Err(Error::TomlDe(_))));
    }
}
