//! Parse-and-sync of a single path.
//!
//! The watcher and the full scanner both funnel every file through
//! [`Indexer::sync_path`], so a path is classified, parsed, and written the
//! same way no matter how it was discovered.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::classify::Classifier;
use crate::metadata::{CodeMetadata, FileKind, FileMetadata};
use crate::parser::{Language, ParseError, Parser};
use crate::store::{GraphStore, ImportTarget, StoreError};

/// Error type for syncing one path.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Path is outside the vault: {0}")]
    OutsideVault(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Parsed and written.
    Synced(FileKind),
    /// The path no longer exists and its nodes were removed.
    Deleted,
    /// Not indexed: excluded, unclassified, or a directory.
    Skipped,
}

/// Shared parse-and-write step.
pub struct Indexer {
    store: Arc<GraphStore>,
    classifier: Classifier,
    parser: Parser,
}

impl Indexer {
    pub fn new(store: Arc<GraphStore>, classifier: Classifier) -> Self {
        Self {
            store,
            classifier,
            parser: Parser::new(),
        }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Bring the graph in line with whatever is at `path` now.
    ///
    /// A path that no longer exists is deleted from the graph regardless of
    /// what kind of file it used to be.
    pub fn sync_path(&self, path: &Path) -> Result<SyncOutcome> {
        let rel = self
            .classifier
            .relative_path(path)
            .ok_or_else(|| IndexError::OutsideVault(path.display().to_string()))?;

        if !path.exists() {
            self.store.delete_path(&rel)?;
            tracing::debug!("Removed {}", rel);
            return Ok(SyncOutcome::Deleted);
        }
        if path.is_dir() {
            return Ok(SyncOutcome::Skipped);
        }

        let kind = self.classifier.classify(path);
        if !kind.is_tracked() {
            return Ok(SyncOutcome::Skipped);
        }
        self.sync_file(path, &rel, kind)
    }

    /// Parse and write a file that has already been classified.
    pub fn sync_file(&self, path: &Path, rel_path: &str, kind: FileKind) -> Result<SyncOutcome> {
        let metadata = self.parser.parse_file(path, rel_path, kind)?;
        self.write(&metadata)?;
        tracing::debug!("Synced {} ({})", rel_path, kind.as_str());
        Ok(SyncOutcome::Synced(kind))
    }

    /// Write parsed metadata to the store.
    pub fn write(&self, metadata: &FileMetadata) -> Result<()> {
        match metadata {
            FileMetadata::Note(note) => self.store.upsert_note(note)?,
            FileMetadata::Code(code) => {
                let imports = self.resolve_imports(code);
                self.store.upsert_code(code, &imports)?;
            }
            FileMetadata::Asset(asset) => self.store.upsert_asset(asset)?,
        }
        Ok(())
    }

    /// Remove every node under a directory that was deleted.
    pub fn remove_dir(&self, path: &Path) -> Result<()> {
        let rel = self
            .classifier
            .relative_path(path)
            .ok_or_else(|| IndexError::OutsideVault(path.display().to_string()))?;
        self.store.delete_under(&rel)?;
        tracing::debug!("Removed everything under {}/", rel);
        Ok(())
    }

    /// Point each import at a vault file when one exists, otherwise at an
    /// external module. Unresolvable relative imports are dropped.
    pub fn resolve_imports(&self, code: &CodeMetadata) -> Vec<ImportTarget> {
        let rel = Path::new(&code.path);
        let language = Language::from_path(rel);
        let dir = rel.parent().unwrap_or_else(|| Path::new(""));

        let mut targets = Vec::new();
        for spec in &code.imports {
            let local = candidate_paths(spec, language, rel, dir)
                .into_iter()
                .filter_map(|candidate| normalize(&candidate))
                .find(|candidate| self.is_indexed_code(candidate));

            let target = match local {
                Some(candidate) => ImportTarget::Code(slash_path(&candidate)),
                None if is_local_spec(spec, language) => continue,
                None => {
                    let module = module_root(spec, language);
                    if module.is_empty() {
                        continue;
                    }
                    ImportTarget::Module(module)
                }
            };
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        targets
    }

    fn is_indexed_code(&self, rel: &Path) -> bool {
        let abs = self.classifier.root().join(rel);
        abs.is_file() && self.classifier.classify(&abs) == FileKind::Code
    }
}

/// Vault-relative files an import specifier might refer to, most specific
/// first.
fn candidate_paths(spec: &str, language: Language, file: &Path, dir: &Path) -> Vec<PathBuf> {
    let spec = spec.trim();
    match language {
        Language::Python => {
            let dots = spec.chars().take_while(|c| *c == '.').count();
            let rest = &spec[dots..];
            if rest.is_empty() {
                return Vec::new();
            }
            let module = rest.replace('.', "/");
            let bases = if dots > 0 {
                let mut base = dir.to_path_buf();
                for _ in 1..dots {
                    base.push("..");
                }
                vec![base]
            } else {
                vec![PathBuf::new(), dir.to_path_buf()]
            };
            bases
                .iter()
                .flat_map(|base| {
                    [
                        base.join(format!("{}.py", module)),
                        base.join(&module).join("__init__.py"),
                    ]
                })
                .collect()
        }
        Language::JavaScript | Language::TypeScript => {
            if !spec.starts_with('.') {
                return Vec::new();
            }
            let base = dir.join(spec);
            let mut candidates = vec![base.clone()];
            for ext in ["ts", "tsx", "js", "jsx", "mjs", "cjs"] {
                candidates.push(PathBuf::from(format!("{}.{}", base.display(), ext)));
            }
            for index in ["index.ts", "index.tsx", "index.js"] {
                candidates.push(base.join(index));
            }
            candidates
        }
        Language::C | Language::Cpp => vec![
            dir.join(spec),
            PathBuf::from(spec),
            Path::new("include").join(spec),
        ],
        Language::Rust => {
            let mut segments: Vec<&str> = spec.split("::").filter(|s| !s.is_empty()).collect();
            let mut base = match segments.first().copied() {
                Some("crate") => crate_src_dir(dir),
                Some("self") => rust_module_dir(file, dir),
                Some("super") => {
                    let mut base = rust_module_dir(file, dir);
                    base.push("..");
                    base
                }
                _ => return Vec::new(),
            };
            segments.remove(0);
            while segments.first() == Some(&"super") {
                base.push("..");
                segments.remove(0);
            }
            let mut candidates = Vec::new();
            for len in (1..=segments.len()).rev() {
                let module: PathBuf = segments[..len].iter().collect();
                let module = base.join(module);
                candidates.push(module.with_extension("rs"));
                candidates.push(module.join("mod.rs"));
            }
            candidates
        }
        _ => {
            if !(spec.starts_with("./") || spec.starts_with("../")) {
                return Vec::new();
            }
            let base = dir.join(spec);
            let mut candidates = vec![base.clone()];
            if let Some(ext) = file.extension().and_then(|e| e.to_str()) {
                candidates.push(PathBuf::from(format!("{}.{}", base.display(), ext)));
            }
            candidates
        }
    }
}

/// Nearest enclosing `src` directory, or the file's own directory.
fn crate_src_dir(dir: &Path) -> PathBuf {
    dir.ancestors()
        .find(|a| a.file_name().is_some_and(|n| n == "src"))
        .unwrap_or(dir)
        .to_path_buf()
}

/// Directory holding the children of the module defined by `file`.
fn rust_module_dir(file: &Path, dir: &Path) -> PathBuf {
    match file.file_stem().and_then(|s| s.to_str()) {
        Some("mod" | "lib" | "main") | None => dir.to_path_buf(),
        Some(stem) => dir.join(stem),
    }
}

/// Returns true for specifiers that can only refer to project files.
fn is_local_spec(spec: &str, language: Language) -> bool {
    match language {
        Language::Python => spec.starts_with('.'),
        Language::Rust => {
            let first = spec.split("::").next().unwrap_or("");
            matches!(first, "crate" | "self" | "super")
        }
        _ => spec.starts_with("./") || spec.starts_with("../") || spec.starts_with('/'),
    }
}

/// Root package of an import specifier.
///
/// `os.path` is `os`, `std::collections` is `std`, `@scope/pkg/sub` is
/// `@scope/pkg`, `lodash/fp` is `lodash`, `github.com/a/b/c` is
/// `github.com/a/b`.
pub fn module_root(spec: &str, language: Language) -> String {
    let spec = spec.trim().trim_matches(|c| c == '"' || c == '\'' || c == '<' || c == '>');
    let first_of = |sep: &[char]| {
        spec.split(sep)
            .find(|s| !s.is_empty())
            .unwrap_or("")
            .to_string()
    };
    match language {
        Language::Rust => spec
            .split("::")
            .find(|s| !s.is_empty())
            .unwrap_or("")
            .to_string(),
        Language::JavaScript | Language::TypeScript => {
            let mut parts = spec.split('/');
            match parts.next() {
                Some(scope) if scope.starts_with('@') => match parts.next() {
                    Some(pkg) => format!("{}/{}", scope, pkg),
                    None => scope.to_string(),
                },
                Some(pkg) => pkg.to_string(),
                None => String::new(),
            }
        }
        Language::Go => {
            let parts: Vec<&str> = spec.split('/').collect();
            if parts.first().is_some_and(|p| p.contains('.')) {
                parts.iter().take(3).copied().collect::<Vec<_>>().join("/")
            } else {
                parts.first().copied().unwrap_or("").to_string()
            }
        }
        Language::C | Language::Cpp | Language::Shell => first_of(&['/']),
        Language::Php => first_of(&['\\', '/']),
        _ => first_of(&['.', '/', ':']),
    }
}

/// Collapse `.` and `..`. Returns `None` if the path climbs above the root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VaultConfig;
    use crate::store::RecordingExecutor;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn indexer(dir: &TempDir) -> (Indexer, Arc<RecordingExecutor>) {
        let executor = Arc::new(RecordingExecutor::new());
        let store = Arc::new(GraphStore::new(executor.clone(), "test"));
        let classifier = Classifier::new(&VaultConfig::new(dir.path())).unwrap();
        (Indexer::new(store, classifier), executor)
    }

    #[test]
    fn test_sync_markdown() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "# A\n[[B]] #tag\n").unwrap();
        let (indexer, executor) = indexer(&dir);

        let outcome = indexer.sync_path(&dir.path().join("a.md")).unwrap();
        assert_eq!(outcome, SyncOutcome::Synced(FileKind::Markdown));
        assert_eq!(executor.matching("MERGE (n:Note {path: $path})").len(), 1);
        assert!(executor.statements()[0].contains("path='a.md'"));
    }

    #[test]
    fn test_missing_path_is_deleted() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("notes")).unwrap();
        let (indexer, executor) = indexer(&dir);

        let outcome = indexer.sync_path(&dir.path().join("notes/gone.md")).unwrap();
        assert_eq!(outcome, SyncOutcome::Deleted);
        assert!(executor.statements().iter().any(|s| s.contains("path='notes/gone.md'")));
        assert_eq!(executor.matching("DETACH DELETE").len(), 2);
    }

    #[test]
    fn test_unclassified_and_directories_are_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "plain").unwrap();
        fs::create_dir(dir.path().join("sub.md")).unwrap();
        let (indexer, executor) = indexer(&dir);

        assert_eq!(indexer.sync_path(&dir.path().join("notes.txt")).unwrap(), SyncOutcome::Skipped);
        assert_eq!(indexer.sync_path(&dir.path().join("sub.md")).unwrap(), SyncOutcome::Skipped);
        assert!(executor.statements().is_empty());
    }

    #[test]
    fn test_outside_vault_is_an_error() {
        let dir = tempdir().unwrap();
        let other = tempdir().unwrap();
        let (indexer, _) = indexer(&dir);
        let err = indexer.sync_path(&other.path().join("x.md")).unwrap_err();
        assert!(matches!(err, IndexError::OutsideVault(_)));
    }

    #[test]
    fn test_python_imports_resolve_to_files() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/util.py"), "def helper():\n    pass\n").unwrap();
        fs::write(dir.path().join("pkg/__init__.py"), "").unwrap();
        fs::write(
            dir.path().join("app.py"),
            "import os.path\nimport pkg.util\nfrom . import missing\nfrom .pkg import util\n",
        )
        .unwrap();
        let (indexer, executor) = indexer(&dir);

        indexer.sync_path(&dir.path().join("app.py")).unwrap();
        let imports = executor.matching("MERGE (d:Code {path: t.path})");
        assert_eq!(imports.len(), 1);
        assert!(imports[0].contains("path: 'pkg/util.py'"));
        assert!(imports[0].contains("path: 'pkg/__init__.py'"));
        assert_eq!(executor.matching("modules=['os']").len(), 1);
    }

    #[test]
    fn test_rust_crate_paths_resolve() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/store")).unwrap();
        fs::write(dir.path().join("src/store/mod.rs"), "pub struct Store;\n").unwrap();
        fs::write(
            dir.path().join("src/lib.rs"),
            "use crate::store::Store;\nuse serde::Serialize;\n",
        )
        .unwrap();
        let (indexer, executor) = indexer(&dir);

        indexer.sync_path(&dir.path().join("src/lib.rs")).unwrap();
        assert!(executor.matching("MERGE (d:Code {path: t.path})")[0].contains("'src/store/mod.rs'"));
        assert_eq!(executor.matching("modules=['serde']").len(), 1);
    }

    #[test]
    fn test_module_root() {
        assert_eq!(module_root("os.path", Language::Python), "os");
        assert_eq!(module_root("std::collections", Language::Rust), "std");
        assert_eq!(module_root("@scope/pkg/sub", Language::TypeScript), "@scope/pkg");
        assert_eq!(module_root("lodash/fp", Language::JavaScript), "lodash");
        assert_eq!(module_root("github.com/a/b/c", Language::Go), "github.com/a/b");
        assert_eq!(module_root("net/http", Language::Go), "net");
        assert_eq!(module_root("sys/types.h", Language::C), "sys");
        assert_eq!(module_root("java.util.List", Language::Java), "java");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("a/./b/../c.py")), Some(PathBuf::from("a/c.py")));
        assert_eq!(normalize(Path::new("../x.py")), None);
    }
}
