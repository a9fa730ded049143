//! Polymorphic file parser.
//!
//! Dispatches a classified path to the Markdown, code, or asset extractor.
//! Every entry point returns either metadata or a [`ParseError`]; callers
//! log the error and move on to the next file.

use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::code;
use crate::markdown;
use crate::metadata::{AssetMetadata, FileKind, FileMetadata};

/// Errors that can occur during parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path is not indexed: {0}")]
    Ignored(String),

    #[error("Not a regular file: {0}")]
    NotAFile(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Languages known to the extension table.
///
/// Only some of these have a tree-sitter grammar; the rest are handled by
/// the regex fallback in [`crate::lang::fallback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    Python,
    C,
    Cpp,
    Go,
    JavaScript,
    TypeScript,
    Java,
    Kotlin,
    Ruby,
    Php,
    CSharp,
    Swift,
    Scala,
    Shell,
    Lua,
    Unknown,
}

/// Static extension → language table.
const EXTENSION_TABLE: &[(&str, Language)] = &[
    ("rs", Language::Rust),
    ("py", Language::Python),
    ("pyi", Language::Python),
    ("c", Language::C),
    ("h", Language::C),
    ("cpp", Language::Cpp),
    ("cc", Language::Cpp),
    ("cxx", Language::Cpp),
    ("c++", Language::Cpp),
    ("hpp", Language::Cpp),
    ("hh", Language::Cpp),
    ("hxx", Language::Cpp),
    ("go", Language::Go),
    ("js", Language::JavaScript),
    ("jsx", Language::JavaScript),
    ("mjs", Language::JavaScript),
    ("cjs", Language::JavaScript),
    ("ts", Language::TypeScript),
    ("tsx", Language::TypeScript),
    ("mts", Language::TypeScript),
    ("java", Language::Java),
    ("kt", Language::Kotlin),
    ("kts", Language::Kotlin),
    ("rb", Language::Ruby),
    ("php", Language::Php),
    ("cs", Language::CSharp),
    ("swift", Language::Swift),
    ("scala", Language::Scala),
    ("sh", Language::Shell),
    ("bash", Language::Shell),
    ("zsh", Language::Shell),
    ("lua", Language::Lua),
];

impl Language {
    /// Detect language from file extension. Unmapped extensions yield
    /// [`Language::Unknown`].
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_lowercase();
        EXTENSION_TABLE
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, lang)| *lang)
            .unwrap_or(Language::Unknown)
    }

    /// Detect language from file path.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    /// Name stored on Code nodes.
    pub fn name(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Go => "go",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Java => "java",
            Language::Kotlin => "kotlin",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::CSharp => "csharp",
            Language::Swift => "swift",
            Language::Scala => "scala",
            Language::Shell => "shell",
            Language::Lua => "lua",
            Language::Unknown => "unknown",
        }
    }

    /// Get file extensions associated with this language.
    pub fn extensions(&self) -> Vec<&'static str> {
        EXTENSION_TABLE
            .iter()
            .filter(|(_, lang)| lang == self)
            .map(|(ext, _)| *ext)
            .collect()
    }

    /// Returns true if the extension is in the table.
    pub fn is_known_extension(ext: &str) -> bool {
        Self::from_extension(ext) != Language::Unknown
    }
}

/// Stateless parser front end.
///
/// Grammar state lives in a process-wide registry, so a `Parser` is cheap
/// to construct and safe to share between worker threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a file that has already been classified.
    ///
    /// `rel_path` is the vault-relative key stored in the graph.
    pub fn parse_file(&self, path: &Path, rel_path: &str, kind: FileKind) -> Result<FileMetadata> {
        match kind {
            FileKind::Markdown => {
                let (source, modified) = read_text(path)?;
                Ok(FileMetadata::Note(markdown::parse_note(
                    rel_path, &source, modified,
                )))
            }
            FileKind::Code => {
                let (source, _) = read_text(path)?;
                let language = Language::from_path(path);
                Ok(FileMetadata::Code(code::extract(rel_path, &source, language)))
            }
            FileKind::Asset => self.parse_asset(path, rel_path).map(FileMetadata::Asset),
            FileKind::Ignore => Err(ParseError::Ignored(rel_path.to_string())),
        }
    }

    /// Stat an asset without reading its content.
    pub fn parse_asset(&self, path: &Path, rel_path: &str) -> Result<AssetMetadata> {
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(ParseError::NotAFile(rel_path.to_string()));
        }
        Ok(AssetMetadata {
            path: rel_path.to_string(),
            name: file_name(rel_path),
            size: meta.len(),
        })
    }
}

/// Read a text file lossily, returning its content and modification time.
fn read_text(path: &Path) -> Result<(String, DateTime<Utc>)> {
    let meta = std::fs::metadata(path)?;
    if !meta.is_file() {
        return Err(ParseError::NotAFile(path.display().to_string()));
    }
    let bytes = std::fs::read(path)?;
    let modified = meta
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    let source = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };
    Ok((source, modified))
}

/// Last segment of a `/`-separated path.
pub(crate) fn file_name(rel_path: &str) -> String {
    rel_path
        .rsplit('/')
        .next()
        .unwrap_or(rel_path)
        .to_string()
}
