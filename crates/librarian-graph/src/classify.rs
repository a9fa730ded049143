//! Path classification and exclusion rules shared by the watcher and scanner.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::config::{ConfigError, VaultConfig};
use crate::metadata::FileKind;
use crate::parser::Language;

/// Decides which paths are indexed and as what.
///
/// All matching happens on vault-relative paths so that the same rules apply
/// whether a path came from a directory walk or from an OS event.
#[derive(Debug, Clone)]
pub struct Classifier {
    root: PathBuf,
    exclude: Gitignore,
    include: Option<Gitignore>,
    markdown: HashSet<String>,
    assets: HashSet<String>,
    code: HashSet<String>,
}

impl Classifier {
    /// Build the matchers for `config`.
    pub fn new(config: &VaultConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let root = std::fs::canonicalize(&config.root).unwrap_or_else(|_| config.root.clone());

        let mut builder = GitignoreBuilder::new(&root);
        if config.respect_gitignore {
            for name in [".gitignore", ".librarianignore"] {
                let file = root.join(name);
                if file.is_file() {
                    if let Some(e) = builder.add(&file) {
                        tracing::warn!("Skipping unreadable ignore file {}: {}", file.display(), e);
                    }
                }
            }
        }
        for pattern in &config.exclude {
            builder.add_line(None, pattern)?;
        }
        let exclude = builder.build()?;

        let include = if config.include.is_empty() {
            None
        } else {
            let mut builder = GitignoreBuilder::new(&root);
            for pattern in &config.include {
                builder.add_line(None, pattern)?;
            }
            Some(builder.build()?)
        };

        let lower = |exts: &[String]| -> HashSet<String> {
            exts.iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect()
        };

        Ok(Self {
            root,
            exclude,
            include,
            markdown: lower(&config.markdown_extensions),
            assets: lower(&config.asset_extensions),
            code: lower(&config.code_extensions),
        })
    }

    /// The (canonicalized when possible) vault root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Vault-relative form of `path`, or `None` if it lies outside the root.
    pub fn relativize(&self, path: &Path) -> Option<PathBuf> {
        if path.is_relative() {
            return Some(path.to_path_buf());
        }
        if let Ok(rel) = path.strip_prefix(&self.root) {
            return Some(rel.to_path_buf());
        }
        // Event paths may arrive through a symlinked prefix. Resolve the
        // parent since the file itself may already be gone.
        let parent = path.parent()?;
        let resolved = std::fs::canonicalize(parent).ok()?;
        let rel = resolved.strip_prefix(&self.root).ok()?;
        Some(match path.file_name() {
            Some(name) => rel.join(name),
            None => rel.to_path_buf(),
        })
    }

    /// The key stored in the graph: vault-relative with `/` separators.
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        let rel = self.relativize(path)?;
        let parts: Vec<_> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        (!parts.is_empty()).then(|| parts.join("/"))
    }

    /// Returns true if the path, or any directory above it, is hidden or
    /// matches an exclude pattern. The vault root itself is never excluded.
    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        let Some(rel) = self.relativize(path) else {
            return true;
        };
        if rel.as_os_str().is_empty() {
            return false;
        }
        if is_hidden(&rel) {
            return true;
        }
        self.exclude
            .matched_path_or_any_parents(&rel, is_dir)
            .is_ignore()
    }

    /// Classify a file path. Anything not indexed is [`FileKind::Ignore`].
    pub fn classify(&self, path: &Path) -> FileKind {
        if self.is_excluded(path, false) {
            return FileKind::Ignore;
        }
        if let Some(include) = &self.include {
            let Some(rel) = self.relativize(path) else {
                return FileKind::Ignore;
            };
            if !include.matched_path_or_any_parents(&rel, false).is_ignore() {
                return FileKind::Ignore;
            }
        }

        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return FileKind::Ignore;
        };
        let ext = ext.to_lowercase();
        if self.markdown.contains(&ext) {
            FileKind::Markdown
        } else if self.assets.contains(&ext) {
            FileKind::Asset
        } else if self.is_code_extension(&ext) {
            FileKind::Code
        } else {
            FileKind::Ignore
        }
    }

    fn is_code_extension(&self, ext: &str) -> bool {
        if self.code.is_empty() {
            Language::is_known_extension(ext)
        } else {
            self.code.contains(ext)
        }
    }
}

fn is_hidden(rel: &Path) -> bool {
    rel.components().any(|c| match c {
        Component::Normal(s) => s.to_string_lossy().starts_with('.'),
        _ => false,
    })
}
