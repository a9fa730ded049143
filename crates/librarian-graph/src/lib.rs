//! librarian-graph: Vault graph infrastructure
//!
//! This crate keeps a property graph in sync with a vault of notes, code,
//! and assets:
//! - Markdown and source parsing (tree-sitter where a grammar exists,
//!   regexes otherwise)
//! - Graph storage over the Redis protocol
//! - Debounced file watching and parallel full scans
//! - Diagram and report export

pub mod classify;
pub mod code;
pub mod config;
pub mod debounce;
pub mod export;
pub mod indexer;
pub mod lang;
pub mod markdown;
pub mod metadata;
pub mod parser;
pub mod scanner;
pub mod store;
pub mod watcher;

pub use classify::Classifier;
pub use config::{ConfigError, VaultConfig};
pub use debounce::Debouncer;
pub use export::{Detail, ExportError, ExportOptions, Exporter, Filter};
pub use indexer::{IndexError, Indexer, SyncOutcome};
pub use metadata::{
    AssetMetadata, CodeMetadata, FileKind, FileMetadata, Heading, NoteMetadata, SymbolRef,
    TaskComment, TaskStatus,
};
pub use parser::{Language, ParseError, Parser};
pub use scanner::{FullScanner, ScanCounts, ScanError};
pub use store::{GraphAddress, GraphStats, GraphStore, NoteRef, QueryExecutor, StoreError};
pub use watcher::{VaultWatcher, WatchError};
