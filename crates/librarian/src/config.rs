//! Configuration file support for the librarian.
//!
//! All librarian data lives in a `.librarian/` directory next to the vault:
//! - `.librarian/config.toml` - Configuration file
//! - `.librarian/logs/` - Log files written by `watch`
//!
//! Config discovery searches for `.librarian/config.toml` starting from the
//! current directory and walking up to parent directories.

use std::path::{Path, PathBuf};

/// The librarian data directory name.
pub const LIBRARIAN_DIR: &str = ".librarian";
/// The config file name within the librarian directory.
pub const CONFIG_FILE: &str = "config.toml";

use anyhow::{Context, Result};
use librarian_graph::{Detail, ExportOptions, Filter, GraphAddress, VaultConfig};
use serde::{Deserialize, Serialize};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// What to index.
    pub vault: VaultConfig,
    /// Graph server settings.
    pub graph: GraphConfig,
    /// Full scan settings.
    pub scan: ScanConfig,
    /// Diagram export settings.
    pub export: ExportConfig,
}

/// Graph server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GraphConfig {
    pub host: String,
    pub port: u16,
    /// Graph key on the server.
    pub name: String,
    /// Server password (or use LIBRARIAN_GRAPH_PASSWORD env var).
    pub password: Option<String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            name: "vault".to_string(),
            password: None,
        }
    }
}

impl GraphConfig {
    pub fn address(&self) -> GraphAddress {
        let mut address = GraphAddress::new(self.host.clone(), self.port);
        address.password = self
            .password
            .clone()
            .or_else(|| std::env::var("LIBRARIAN_GRAPH_PASSWORD").ok());
        address
    }
}

/// Full scan configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Worker threads. 0 uses the logical CPU count.
    pub workers: usize,
    /// Whether `watch` runs a full scan before watching.
    pub on_start: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            on_start: true,
        }
    }
}

/// Export configuration.
///
/// `detail` and `filter` stay strings here so a bad value is reported by
/// [`Config::validate`] instead of failing the whole file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Output directory, relative to the vault root unless absolute.
    pub out_dir: PathBuf,
    pub detail: String,
    pub filter: String,
    pub depth: usize,
    pub focus: Option<String>,
    pub node_types: Vec<String>,
    pub rel_types: Vec<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        let options = ExportOptions::default();
        Self {
            out_dir: PathBuf::from("diagrams"),
            detail: options.detail.to_string(),
            filter: options.filter.to_string(),
            depth: options.depth,
            focus: None,
            node_types: Vec::new(),
            rel_types: Vec::new(),
        }
    }
}

impl ExportConfig {
    /// Build exporter options from this section.
    pub fn options(&self) -> Result<ExportOptions> {
        let detail: Detail = self
            .detail
            .parse()
            .map_err(|e: String| anyhow::anyhow!("export.detail: {}", e))?;
        let filter: Filter = self
            .filter
            .parse()
            .map_err(|e: String| anyhow::anyhow!("export.filter: {}", e))?;
        Ok(ExportOptions {
            filter,
            detail,
            depth: self.depth,
            focus: self.focus.clone(),
            node_types: self.node_types.clone(),
            rel_types: self.rel_types.clone(),
        })
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Find and load configuration from current or parent directories.
    pub fn find_and_load() -> Result<Option<(Self, PathBuf)>> {
        let current = std::env::current_dir()?;
        Self::find_and_load_from(&current)
    }

    /// Find and load configuration starting from a specific directory.
    ///
    /// Looks for `.librarian/config.toml` in the directory and its parents.
    /// Returns the `.librarian` directory alongside the config.
    pub fn find_and_load_from(start: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start.to_path_buf();

        loop {
            let librarian_dir = dir.join(LIBRARIAN_DIR);
            let config_path = librarian_dir.join(CONFIG_FILE);
            if config_path.exists() {
                let config = Self::from_file(&config_path)?;
                return Ok(Some((config, librarian_dir)));
            }

            if !dir.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Resolve the vault root relative to the .librarian directory.
    pub fn resolve_vault_root(&self, librarian_dir: Option<&Path>) -> PathBuf {
        let root = &self.vault.root;
        if root.is_absolute() {
            root.clone()
        } else if let Some(dir) = librarian_dir {
            dir.join(root)
        } else {
            root.clone()
        }
    }

    /// Resolve the export directory relative to the vault root.
    pub fn resolve_out_dir(&self, vault_root: &Path) -> PathBuf {
        if self.export.out_dir.is_absolute() {
            self.export.out_dir.clone()
        } else {
            vault_root.join(&self.export.out_dir)
        }
    }

    /// The default config written by `librarian init`.
    pub fn default_toml() -> &'static str {
        DEFAULT_CONFIG
    }
}

const DEFAULT_CONFIG: &str = r#"# Librarian configuration
# Paths are relative to this .librarian/ directory unless absolute

[vault]
root = ".."  # Parent directory (the vault itself)
exclude = ["target", "node_modules", "__pycache__", "*.pyc"]
include = []
markdown_extensions = ["md", "markdown"]
asset_extensions = ["png", "jpg", "jpeg", "gif", "svg", "pdf", "webp"]
code_extensions = []  # Empty: every extension in the language table
debounce_ms = 500
respect_gitignore = true

[graph]
host = "127.0.0.1"
port = 6379
name = "vault"
# password = "..."  # Or use LIBRARIAN_GRAPH_PASSWORD env var

[scan]
workers = 0     # 0: logical CPU count
on_start = true # `watch` runs a full scan first

[export]
out_dir = "diagrams"  # Relative to the vault root
detail = "medium"     # Options: "low", "medium", "high"
filter = "all"        # Options: "all", "internal", "external"
depth = 2
node_types = []
rel_types = []
"#;

/// Configuration validation error.
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigValidationError {}

impl Config {
    /// Validate the configuration.
    ///
    /// Returns a list of validation errors if any are found.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = self.vault.validate() {
            errors.push(ConfigValidationError {
                field: "vault".to_string(),
                message: e.to_string(),
            });
        }

        if self.graph.port == 0 {
            errors.push(ConfigValidationError {
                field: "graph.port".to_string(),
                message: "Port cannot be 0.".to_string(),
            });
        }

        if self.graph.name.trim().is_empty() {
            errors.push(ConfigValidationError {
                field: "graph.name".to_string(),
                message: "Graph name cannot be empty.".to_string(),
            });
        }

        if let Err(e) = self.export.detail.parse::<Detail>() {
            errors.push(ConfigValidationError {
                field: "export.detail".to_string(),
                message: e,
            });
        }

        if let Err(e) = self.export.filter.parse::<Filter>() {
            errors.push(ConfigValidationError {
                field: "export.filter".to_string(),
                message: e,
            });
        }

        if let Ok(options) = self.export.options() {
            if let Err(e) = options.validate() {
                errors.push(ConfigValidationError {
                    field: "export".to_string(),
                    message: e.to_string(),
                });
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.graph.port, 6379);
        assert_eq!(config.graph.name, "vault");
        assert_eq!(config.scan.workers, 0);
        assert!(config.scan.on_start);
        assert_eq!(config.export.detail, "medium");
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_default_toml_parses_and_validates() {
        let config: Config = toml::from_str(Config::default_toml()).unwrap();
        assert_eq!(config.vault.root, PathBuf::from(".."));
        assert_eq!(config.vault.debounce_ms, 500);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
[graph]
port = 6380
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.graph.port, 6380);
        // Defaults should still apply
        assert_eq!(config.graph.host, "127.0.0.1");
        assert!(config.vault.markdown_extensions.contains(&"md".to_string()));
    }

    #[test]
    fn test_export_options_from_config() {
        let toml = r#"
[export]
detail = "high"
filter = "external"
focus = "src"
rel_types = ["IMPORTS"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let options = config.export.options().unwrap();
        assert_eq!(options.detail, Detail::High);
        assert_eq!(options.filter, Filter::External);
        assert_eq!(options.focus.as_deref(), Some("src"));
        assert_eq!(options.depth, 2);
    }

    #[test]
    fn test_validate_reports_bad_values() {
        let mut config = Config::default();
        config.graph.port = 0;
        config.graph.name = " ".to_string();
        config.export.detail = "extreme".to_string();
        config.export.filter = "some".to_string();

        let errors = config.validate();
        for field in ["graph.port", "graph.name", "export.detail", "export.filter"] {
            assert!(errors.iter().any(|e| e.field == field), "missing {}", field);
        }
    }

    #[test]
    fn test_find_and_load_walks_up() {
        let dir = tempdir().unwrap();
        let librarian_dir = dir.path().join(LIBRARIAN_DIR);
        std::fs::create_dir_all(&librarian_dir).unwrap();
        std::fs::write(librarian_dir.join(CONFIG_FILE), "[graph]\nname = \"notes\"\n").unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let (config, found) = Config::find_and_load_from(&nested).unwrap().unwrap();
        assert_eq!(config.graph.name, "notes");
        assert_eq!(found, librarian_dir);
        assert_eq!(
            config.resolve_vault_root(Some(&found)),
            librarian_dir.join(".")
        );
    }

    #[test]
    fn test_resolve_paths() {
        let mut config = Config::default();
        config.vault.root = PathBuf::from("..");
        let root = config.resolve_vault_root(Some(Path::new("/vault/.librarian")));
        assert_eq!(root, PathBuf::from("/vault/.librarian/.."));
        assert_eq!(
            config.resolve_out_dir(Path::new("/vault")),
            PathBuf::from("/vault/diagrams")
        );
    }
}
