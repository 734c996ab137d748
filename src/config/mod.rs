//! Settings and the persisted config record.
//!
//! `Settings` is built once in `main` (CLI flags + environment) and handed to
//! every command. `ConfigRecord` is `<home>/config.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alias::{Alias, AliasTable};
use crate::error::{AiError, Result};
use crate::provider::{http, subprocess};
use crate::utils::write_atomic;

/// Directory name under the user's home when no override is given.
pub const DEFAULT_HOME_DIR: &str = ".ai-cli";
pub const HOME_ENV: &str = "AI_DISPATCH_HOME";
const CONFIG_FILE: &str = "config.json";
const CHATS_DIR: &str = "chats";

/// Sliding-window bounds for chat history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLimits {
    pub max_chars: usize,
    pub max_messages: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            max_chars: 4000,
            max_messages: 10,
        }
    }
}

/// Process-wide settings threaded into every entry point.
#[derive(Debug, Clone)]
pub struct Settings {
    pub home: PathBuf,
    pub limits: HistoryLimits,
    pub subprocess_timeout: Duration,
    pub http_timeout: Duration,
}

impl Settings {
    pub fn for_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            limits: HistoryLimits::default(),
            subprocess_timeout: subprocess::DEFAULT_TIMEOUT,
            http_timeout: http::DEFAULT_TIMEOUT,
        }
    }

    /// Explicit home (flag or `AI_DISPATCH_HOME`, already merged by clap), else `~/.ai-cli`.
    pub fn resolve(home: Option<PathBuf>) -> Result<Self> {
        let home = match home.filter(|p| !p.as_os_str().is_empty()) {
            Some(p) => p,
            None => dirs::home_dir()
                .map(|h| h.join(DEFAULT_HOME_DIR))
                .ok_or_else(|| {
                    AiError::Config(format!(
                        "cannot determine home directory; set {HOME_ENV} or pass --home"
                    ))
                })?,
        };
        Ok(Self::for_home(home))
    }

    pub fn config_path(&self) -> PathBuf {
        self.home.join(CONFIG_FILE)
    }

    pub fn chats_dir(&self) -> PathBuf {
        self.home.join(CHATS_DIR)
    }

    /// Apply overrides stored in the config record.
    pub fn apply(&mut self, record: &ConfigRecord) {
        if let Some(limits) = record.limits {
            self.limits = limits;
        }
    }
}

/// On-disk shape of `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRecord {
    #[serde(default)]
    pub installed_tools: Vec<String>,
    #[serde(default)]
    pub models: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub aliases: BTreeMap<String, Alias>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<HistoryLimits>,
}

impl ConfigRecord {
    /// Missing file -> empty record; malformed file -> `AiError::Config`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw)
            .map_err(|e| AiError::Config(format!("malformed config {}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_string_pretty(self)
            .map_err(|e| AiError::Config(format!("cannot serialize config: {e}")))?;
        write_atomic(path, body.as_bytes())?;
        tracing::debug!(path = %path.display(), "config saved");
        Ok(())
    }

    /// Alias table described by this record (built-ins when none were saved).
    pub fn alias_table(&self) -> Result<AliasTable> {
        if self.aliases.is_empty() {
            let mut table = AliasTable::builtin();
            table.set_default(self.default_alias.as_deref())?;
            return Ok(table);
        }
        AliasTable::from_parts(self.aliases.clone(), self.default_alias.clone())
    }

    pub fn set_alias_table(&mut self, table: &AliasTable) {
        self.aliases = table.entries().clone();
        self.default_alias = table.default_alias().map(str::to_string);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_builtin_table() {
        let dir = TempDir::new().unwrap();
        let record = ConfigRecord::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(record, ConfigRecord::default());
        let table = record.alias_table().unwrap();
        assert!(table.contains("sonnet"));
        assert_eq!(table.default_alias(), None);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = ConfigRecord::load(&path).unwrap_err();
        assert!(matches!(err, AiError::Config(_)));
    }

    #[test]
    fn save_then_load_keeps_aliases_and_default() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::for_home(dir.path().join("home"));
        let mut table = AliasTable::builtin();
        table.insert("mine", "ollama", "llama3:8b").unwrap();
        table.set_default(Some("mine")).unwrap();

        let mut record = ConfigRecord {
            installed_tools: vec!["ollama".into()],
            limits: Some(HistoryLimits {
                max_chars: 100,
                max_messages: 4,
            }),
            ..Default::default()
        };
        record.set_alias_table(&table);
        record.save(&settings.config_path()).unwrap();

        let raw = std::fs::read_to_string(settings.config_path()).unwrap();
        assert!(raw.contains(r#""mine": ["#));

        let back = ConfigRecord::load(&settings.config_path()).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.alias_table().unwrap(), table);

        let mut s = settings.clone();
        s.apply(&back);
        assert_eq!(s.limits.max_messages, 4);
    }

    #[test]
    fn stale_default_is_rejected() {
        let mut record = ConfigRecord::default();
        record.aliases.insert("x".into(), Alias::new("claude", "sonnet"));
        record.default_alias = Some("gone".into());
        assert!(record.alias_table().is_err());
    }

    #[test]
    fn explicit_home_wins() {
        let s = Settings::resolve(Some(PathBuf::from("/tmp/ai-home"))).unwrap();
        assert_eq!(s.config_path(), PathBuf::from("/tmp/ai-home/config.json"));
        assert_eq!(s.chats_dir(), PathBuf::from("/tmp/ai-home/chats"));
        assert_eq!(s.limits, HistoryLimits::default());
    }
}
