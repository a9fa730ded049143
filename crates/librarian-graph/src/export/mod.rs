//! Diagram and report export.
//!
//! The exporter reads the graph once into a [`GraphModel`], then each
//! renderer turns the model into text. Renderers never touch the store, so
//! they can be tested against hand-built models.
//!
//! | Renderer                | Artifacts                                         |
//! |-------------------------|---------------------------------------------------|
//! | [`mermaid`]             | `flow.mermaid`, `classes.mermaid`, `packages_*.mermaid` |
//! | [`plantuml`]            | `architecture_*.puml`, `packages.puml`, `files.puml`, `classes.puml` |
//! | [`dot`]                 | `graph.dot`                                       |
//! | [`report`]              | `index.html`, `report.md`                         |

pub mod dot;
pub mod mermaid;
pub mod model;
pub mod plantuml;
pub mod report;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::store::{GraphStats, GraphStore, StoreError};

pub use model::{GraphEdge, GraphModel, GraphNode, Symbol, SymbolKind};

/// Error type for export operations.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Graph query failed: {0}")]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid export option: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ExportError>;

/// Which relationships survive by endpoint locality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    #[default]
    All,
    /// Only relationships between nodes that live in the vault.
    Internal,
    /// Only relationships touching an external module or unresolved note.
    External,
}

/// How much each node shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Detail {
    /// Bare nodes, unlabeled and deduplicated edges.
    Low,
    #[default]
    Medium,
    High,
}

impl Detail {
    /// Symbols listed inside a file node before collapsing into "+N more".
    pub fn symbol_limit(&self) -> usize {
        match self {
            Detail::Low => 0,
            Detail::Medium => 3,
            Detail::High => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Detail::Low => "low",
            Detail::Medium => "medium",
            Detail::High => "high",
        }
    }
}

impl Filter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Filter::All => "all",
            Filter::Internal => "internal",
            Filter::External => "external",
        }
    }
}

impl FromStr for Detail {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Detail::Low),
            "medium" => Ok(Detail::Medium),
            "high" => Ok(Detail::High),
            other => Err(format!("unknown detail '{}' (expected low, medium or high)", other)),
        }
    }
}

impl FromStr for Filter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Filter::All),
            "internal" => Ok(Filter::Internal),
            "external" => Ok(Filter::External),
            other => Err(format!(
                "unknown filter '{}' (expected all, internal or external)",
                other
            )),
        }
    }
}

impl fmt::Display for Detail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options shared by every exporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub filter: Filter,
    pub detail: Detail,
    /// Maximum path length followed from `focus`.
    pub depth: usize,
    /// Path prefix that anchors the exported neighbourhood.
    pub focus: Option<String>,
    /// Node labels to keep. Empty keeps all.
    pub node_types: Vec<String>,
    /// Relationship types to keep. Empty keeps all.
    pub rel_types: Vec<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            filter: Filter::All,
            detail: Detail::Medium,
            depth: 2,
            focus: None,
            node_types: Vec::new(),
            rel_types: Vec::new(),
        }
    }
}

impl ExportOptions {
    /// Returns true if nodes labelled `label` are kept.
    pub fn keeps_label(&self, label: &str) -> bool {
        self.node_types.is_empty() || self.node_types.iter().any(|t| t == label)
    }

    /// Returns true if relationships of type `rel` are kept.
    pub fn keeps_rel(&self, rel: &str) -> bool {
        self.rel_types.is_empty() || self.rel_types.iter().any(|t| t == rel)
    }

    pub fn validate(&self) -> Result<()> {
        if self.depth > 10 {
            return Err(ExportError::Invalid(format!(
                "depth {} is too large (maximum 10)",
                self.depth
            )));
        }
        for name in self.node_types.iter().chain(&self.rel_types) {
            if !crate::store::cypher::is_identifier(name) {
                return Err(ExportError::Invalid(format!(
                    "'{}' is not a valid label or relationship type",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Map arbitrary text onto `[A-Za-z0-9_]+`.
///
/// The result is never empty and never starts with a digit.
pub fn sanitize_id(text: &str) -> String {
    let mut id: String = text
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if id.is_empty() || id.starts_with(|c: char| c.is_ascii_digit()) {
        id.insert(0, '_');
    }
    id
}

/// Stable, collision-free diagram identifiers for graph keys.
///
/// Two keys that sanitize to the same text get distinct numbered ids.
#[derive(Debug, Default)]
pub struct IdMap {
    prefix: &'static str,
    ids: HashMap<String, String>,
    used: HashSet<String>,
}

impl IdMap {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            ..Default::default()
        }
    }

    pub fn id(&mut self, key: &str) -> String {
        if let Some(id) = self.ids.get(key) {
            return id.clone();
        }
        let base = format!("{}_{}", self.prefix, sanitize_id(key));
        let mut id = base.clone();
        let mut n = 2;
        while !self.used.insert(id.clone()) {
            id = format!("{}_{}", base, n);
            n += 1;
        }
        self.ids.insert(key.to_string(), id.clone());
        id
    }
}

/// Edges to draw at `detail`. Low detail keeps one edge per ordered node
/// pair; otherwise one per pair and relationship type.
pub fn dedupe_edges<'a>(edges: &'a [GraphEdge], detail: Detail) -> Vec<&'a GraphEdge> {
    let mut seen = HashSet::new();
    edges
        .iter()
        .filter(|e| {
            let rel = if detail == Detail::Low { "" } else { e.rel.as_str() };
            seen.insert((e.from.as_str(), e.to.as_str(), rel))
        })
        .collect()
}

/// Output format of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Mermaid,
    PlantUml,
    Dot,
    Html,
    Markdown,
}

/// One rendered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File name inside the output directory.
    pub name: String,
    pub title: String,
    pub format: ArtifactFormat,
    pub content: String,
}

impl Artifact {
    fn new(name: impl Into<String>, title: impl Into<String>, format: ArtifactFormat, content: String) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            format,
            content,
        }
    }
}

/// Reads the graph and writes every diagram and report.
pub struct Exporter {
    store: Arc<GraphStore>,
    options: ExportOptions,
}

impl Exporter {
    pub fn new(store: Arc<GraphStore>, options: ExportOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Query the graph into a filtered model.
    pub fn load(&self) -> Result<GraphModel> {
        self.options.validate()?;
        let model = GraphModel::load(&self.store, &self.options)?;
        Ok(model.filtered(self.options.filter))
    }

    /// Render every artifact for `model`. Reports come last and embed the
    /// diagrams rendered before them.
    pub fn render(&self, model: &GraphModel, stats: &GraphStats) -> Result<Vec<Artifact>> {
        let options = &self.options;
        let mut artifacts = vec![Artifact::new(
            "flow.mermaid",
            "Module flow",
            ArtifactFormat::Mermaid,
            mermaid::flow(model, options),
        )];
        // Distinct modules can sanitize to the same file name.
        let mut files = IdMap::new("packages");
        for (module, content) in mermaid::packages(model, options) {
            artifacts.push(Artifact::new(
                format!("{}.mermaid", files.id(&module)),
                format!("Package {}", module),
                ArtifactFormat::Mermaid,
                content,
            ));
        }
        artifacts.push(Artifact::new(
            "classes.mermaid",
            "Classes",
            ArtifactFormat::Mermaid,
            mermaid::classes(model, options),
        ));

        let mut files = IdMap::new("architecture");
        for (package, content) in plantuml::architecture(model, options) {
            artifacts.push(Artifact::new(
                format!("{}.puml", files.id(&package)),
                format!("Architecture of {}", package),
                ArtifactFormat::PlantUml,
                content,
            ));
        }
        artifacts.push(Artifact::new(
            "packages.puml",
            "Package dependencies",
            ArtifactFormat::PlantUml,
            plantuml::packages(model, options),
        ));
        artifacts.push(Artifact::new(
            "files.puml",
            "File dependencies",
            ArtifactFormat::PlantUml,
            plantuml::files(model, options),
        ));
        artifacts.push(Artifact::new(
            "classes.puml",
            "Classes",
            ArtifactFormat::PlantUml,
            plantuml::classes(model, options),
        ));
        artifacts.push(Artifact::new(
            "graph.dot",
            "Graph",
            ArtifactFormat::Dot,
            dot::render(model, options),
        ));

        let html = report::html(stats, options, &artifacts)?;
        let markdown = report::markdown(stats, options, &artifacts)?;
        artifacts.push(Artifact::new("index.html", "Report", ArtifactFormat::Html, html));
        artifacts.push(Artifact::new("report.md", "Report", ArtifactFormat::Markdown, markdown));
        Ok(artifacts)
    }

    /// Load, render, and write everything into `out_dir`.
    pub fn export_all(&self, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let model = self.load()?;
        let stats = self.store.get_stats()?;
        let artifacts = self.render(&model, &stats)?;

        std::fs::create_dir_all(out_dir)?;
        let mut written = Vec::with_capacity(artifacts.len());
        for artifact in &artifacts {
            let path = out_dir.join(&artifact.name);
            std::fs::write(&path, &artifact.content)?;
            tracing::debug!("Wrote {}", path.display());
            written.push(path);
        }
        tracing::info!(
            "Exported {} artifacts ({} nodes, {} edges) to {}",
            written.len(),
            model.nodes.len(),
            model.edges.len(),
            out_dir.display()
        );
        Ok(written)
    }
}
