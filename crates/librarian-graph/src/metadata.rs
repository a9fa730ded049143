//! Metadata types produced by the parsers.
//!
//! These types are the contract between the parser and the graph store:
//! every parser entry point yields one [`FileMetadata`] and the store turns
//! it into nodes and relationships.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a path inside the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// A Markdown note.
    Markdown,
    /// A source code file.
    Code,
    /// A binary or otherwise opaque attachment.
    Asset,
    /// Anything the librarian does not track.
    Ignore,
}

impl FileKind {
    /// Returns the string representation used in logs and counters.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Markdown => "markdown",
            FileKind::Code => "code",
            FileKind::Asset => "asset",
            FileKind::Ignore => "ignore",
        }
    }

    /// Returns true if files of this kind are synced into the graph.
    pub fn is_tracked(&self) -> bool {
        !matches!(self, FileKind::Ignore)
    }
}

/// A Markdown heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// Heading level, 1 through 6.
    pub level: u8,
    /// Heading text without the leading hashes.
    pub text: String,
}

/// Metadata extracted from a Markdown note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteMetadata {
    /// Vault-relative path, `/` separated.
    pub path: String,
    /// File stem.
    pub name: String,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// Frontmatter and inline tags, deduplicated, first-seen order.
    pub tags: Vec<String>,
    /// `[[Target]]` link targets, deduplicated, first-seen order.
    pub wikilinks: Vec<String>,
    /// `![[Target]]` embed targets, deduplicated, first-seen order.
    pub embeds: Vec<String>,
    /// Headings in document order.
    pub headings: Vec<Heading>,
    /// Parsed YAML frontmatter. Empty when absent or malformed.
    pub frontmatter: BTreeMap<String, serde_json::Value>,
}

/// A named symbol defined in a code file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolRef {
    pub name: String,
    /// 1-based source line.
    pub line: usize,
}

impl SymbolRef {
    pub fn new(name: impl Into<String>, line: usize) -> Self {
        Self {
            name: name.into(),
            line,
        }
    }
}

/// Marker of a task comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Todo,
    Fixme,
    Note,
    Xxx,
}

impl TaskStatus {
    /// Returns the marker as it appears in source.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "TODO",
            TaskStatus::Fixme => "FIXME",
            TaskStatus::Note => "NOTE",
            TaskStatus::Xxx => "XXX",
        }
    }

    /// Parse a marker. Case-sensitive, as markers conventionally are.
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "TODO" => Some(TaskStatus::Todo),
            "FIXME" => Some(TaskStatus::Fixme),
            "NOTE" => Some(TaskStatus::Note),
            "XXX" => Some(TaskStatus::Xxx),
            _ => None,
        }
    }
}

/// A TODO/FIXME/NOTE/XXX comment found in a code file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskComment {
    pub status: TaskStatus,
    pub text: String,
    pub line: usize,
}

/// Metadata extracted from a source code file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeMetadata {
    /// Vault-relative path, `/` separated.
    pub path: String,
    /// File name including extension.
    pub name: String,
    /// Language name from the extension table, `"unknown"` if unmapped.
    pub language: String,
    pub functions: Vec<SymbolRef>,
    pub classes: Vec<SymbolRef>,
    /// Import specifiers as written in source, deduplicated.
    pub imports: Vec<String>,
    pub tasks: Vec<TaskComment>,
}

/// Metadata for an asset. Nothing beyond a stat is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    /// Vault-relative path, `/` separated.
    pub path: String,
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

impl AssetMetadata {
    /// Asset type label stored on the node.
    pub const TYPE: &'static str = "asset";
}

/// Result of parsing one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileMetadata {
    Note(NoteMetadata),
    Code(CodeMetadata),
    Asset(AssetMetadata),
}

impl FileMetadata {
    /// The vault-relative path of the parsed file.
    pub fn path(&self) -> &str {
        match self {
            FileMetadata::Note(n) => &n.path,
            FileMetadata::Code(c) => &c.path,
            FileMetadata::Asset(a) => &a.path,
        }
    }

    /// The classification this metadata was produced for.
    pub fn kind(&self) -> FileKind {
        match self {
            FileMetadata::Note(_) => FileKind::Markdown,
            FileMetadata::Code(_) => FileKind::Code,
            FileMetadata::Asset(_) => FileKind::Asset,
        }
    }
}
