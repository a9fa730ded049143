//! Vault configuration consumed by the watcher, scanner, and classifier.
//!
//! Loading this from disk is the binary's job; the library only needs the
//! deserialized values.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Error type for configuration problems.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] ignore::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which files to index and how to classify them.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Root directory of the vault.
    pub root: PathBuf,
    /// Gitignore-style patterns a file must match to be indexed. Empty means all.
    pub include: Vec<String>,
    /// Gitignore-style patterns excluded from indexing and watching.
    pub exclude: Vec<String>,
    /// Extensions classified as Markdown notes.
    pub markdown_extensions: Vec<String>,
    /// Extensions classified as assets.
    pub asset_extensions: Vec<String>,
    /// Extensions classified as code. Empty means every extension the
    /// language table knows.
    pub code_extensions: Vec<String>,
    /// Quiet period before a changed path is processed.
    pub debounce_ms: u64,
    /// Whether `.gitignore` at the vault root adds exclude patterns.
    pub respect_gitignore: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            include: Vec::new(),
            exclude: vec![
                "target".to_string(),
                "node_modules".to_string(),
                "__pycache__".to_string(),
                "*.pyc".to_string(),
            ],
            markdown_extensions: vec!["md".to_string(), "markdown".to_string()],
            asset_extensions: ["png", "jpg", "jpeg", "gif", "svg", "pdf", "webp"]
                .into_iter()
                .map(String::from)
                .collect(),
            code_extensions: Vec::new(),
            debounce_ms: 500,
            respect_gitignore: true,
        }
    }
}

impl VaultConfig {
    /// Create a config rooted at `root` with default rules.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// The debounce interval as a [`Duration`].
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Check for values that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let overlap = self
            .markdown_extensions
            .iter()
            .find(|ext| self.asset_extensions.contains(ext));
        if let Some(ext) = overlap {
            return Err(ConfigError::Invalid(format!(
                "extension '{}' is classified as both markdown and asset",
                ext
            )));
        }
        if self.markdown_extensions.iter().any(|e| e.starts_with('.')) {
            return Err(ConfigError::Invalid(
                "markdown_extensions must not include the leading dot".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VaultConfig::default();
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert!(config.markdown_extensions.contains(&"md".to_string()));
        assert!(config.respect_gitignore);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overlapping_extensions_rejected() {
        let config = VaultConfig {
            asset_extensions: vec!["md".to_string()],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: VaultConfig =
            serde_json::from_str(r#"{"root": "/vault", "debounce_ms": 50}"#).unwrap();
        assert_eq!(config.root, PathBuf::from("/vault"));
        assert_eq!(config.debounce_ms, 50);
        assert!(config.exclude.contains(&"node_modules".to_string()));
    }
}
