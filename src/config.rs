use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::expansion_store::default_state_path;
use crate::message::labels;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub accounts: Vec<AccountConfig>,
    /// Rows requested per page fetch.
    pub page_size: usize,
    /// Start in thread view rather than flat view.
    pub threaded: bool,
    pub status_timeout_secs: u64,
    /// JSON mailbox file the local provider serves.
    pub mailbox: Option<String>,
    /// Where thread expansion state is kept. Absent means the default
    /// state path.
    pub expansion_state: Option<String>,
    /// Keep expansion state in memory only.
    pub ephemeral_expansion: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            page_size: 50,
            threaded: true,
            status_timeout_secs: 3,
            mailbox: None,
            expansion_state: None,
            ephemeral_expansion: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct AccountConfig {
    pub name: String,
    pub email: String,
    /// Mark this account as the default (first with default=true wins).
    #[serde(default)]
    pub default: bool,
    /// Label shown on startup and by `g i`.
    #[serde(default = "default_inbox_label")]
    pub inbox_label: String,
}

fn default_inbox_label() -> String {
    labels::INBOX.to_string()
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Return the index of the default account: first with `default = true`, or 0.
    pub fn default_account_index(&self) -> usize {
        self.accounts.iter().position(|a| a.default).unwrap_or(0)
    }

    pub fn account(&self, idx: usize) -> Option<&AccountConfig> {
        self.accounts.get(idx)
    }

    /// Name used to key per-account state. Falls back to "default" when no
    /// accounts are configured.
    pub fn account_name(&self, idx: usize) -> String {
        self.account(idx)
            .map(|a| a.name.clone())
            .unwrap_or_else(|| "default".to_string())
    }

    pub fn inbox_label(&self, idx: usize) -> String {
        self.account(idx)
            .map(|a| a.inbox_label.clone())
            .unwrap_or_else(default_inbox_label)
    }

    pub fn mailbox_path(&self) -> Option<PathBuf> {
        self.mailbox.as_deref().map(|m| PathBuf::from(expand_tilde(m)))
    }

    pub fn expansion_state_path(&self) -> PathBuf {
        match &self.expansion_state {
            Some(p) => PathBuf::from(expand_tilde(p)),
            None => default_state_path(),
        }
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    /// Reject settings the rest of the program cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            bail!("page_size must be at least 1");
        }
        if self.accounts.iter().filter(|a| a.default).count() > 1 {
            bail!("more than one account is marked default");
        }
        Ok(())
    }

    /// Try to load the configuration file from, in order:
    ///
    /// 1. `$GMTUI_CONFIG`
    /// 2. `$XDG_CONFIG_HOME/gmtui/config.toml`
    /// 3. `~/.config/gmtui/config.toml`
    ///
    /// If none of these paths exist, return a default `Config`.
    pub fn load() -> Result<Self> {
        let config = if let Some(path) = Self::locate() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        } else {
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Return the first config path that actually exists on disk, or `None`.
    fn locate() -> Option<PathBuf> {
        Self::candidate_paths().into_iter().find(|p| p.is_file())
    }

    /// Ordered list of paths we check for a config file.
    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(p) = std::env::var("GMTUI_CONFIG") {
            paths.push(PathBuf::from(p));
        }
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("gmtui").join("config.toml"));
        }
        if let Ok(home) = std::env::var("HOME") {
            paths.push(
                PathBuf::from(home)
                    .join(".config")
                    .join("gmtui")
                    .join("config.toml"),
            );
        }

        paths
    }
}

/// Expand `~/` prefix in a path string.
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        format!("{}/{}", home, rest)
    } else {
        path.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.page_size, 50);
        assert!(cfg.threaded);
        assert!(cfg.accounts.is_empty());
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.account_name(0), "default");
        assert_eq!(cfg.inbox_label(0), "INBOX");
    }

    #[test]
    fn parse_minimal_toml() {
        let toml_str = r#"
            page_size = 25
            threaded = false
        "#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.page_size, 25);
        assert!(!cfg.threaded);
        assert_eq!(cfg.status_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn parse_accounts() {
        let toml_str = r#"
            mailbox = "/tmp/mail.json"

            [[accounts]]
            name = "personal"
            email = "me@example.org"

            [[accounts]]
            name = "work"
            email = "me@example.com"
            default = true
            inbox_label = "Label_9"
        "#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.accounts.len(), 2);
        assert_eq!(cfg.default_account_index(), 1);
        assert_eq!(cfg.account_name(1), "work");
        assert_eq!(cfg.inbox_label(1), "Label_9");
        assert_eq!(cfg.inbox_label(0), "INBOX");
        assert_eq!(cfg.mailbox_path(), Some(PathBuf::from("/tmp/mail.json")));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let cfg: Config = toml::from_str("page_size = 0").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn two_defaults_are_rejected() {
        let toml_str = r#"
            [[accounts]]
            name = "a"
            email = "a@example.com"
            default = true

            [[accounts]]
            name = "b"
            email = "b@example.com"
            default = true
        "#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn expand_tilde_uses_home() {
        let home = std::env::var("HOME").unwrap_or_default();
        assert_eq!(expand_tilde("~/mail.json"), format!("{}/mail.json", home));
        assert_eq!(expand_tilde("/abs/path"), "/abs/path");
    }

    #[test]
    fn explicit_expansion_state_path() {
        let cfg: Config = toml::from_str(r#"expansion_state = "/var/tmp/threads.toml""#).unwrap();
        assert_eq!(
            cfg.expansion_state_path(),
            PathBuf::from("/var/tmp/threads.toml")
        );
    }
}
