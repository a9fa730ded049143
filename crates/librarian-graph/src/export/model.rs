//! In-memory snapshot of the graph used by every renderer.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::{ExportOptions, Filter, Result};
use crate::store::result::{as_count, as_str};
use crate::store::{GraphStore, Param, QueryResult};

/// A node as the renderers see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    /// Unique key: the vault path, or `Label:name` for nodes without one.
    pub key: String,
    pub label: String,
    pub name: String,
    pub path: Option<String>,
    pub language: Option<String>,
}

impl GraphNode {
    pub fn new(label: &str, path: Option<&str>, name: &str) -> Self {
        Self {
            key: node_key(label, path, name),
            label: label.to_string(),
            name: name.to_string(),
            path: path.map(str::to_string),
            language: None,
        }
    }

    /// Returns true for nodes backed by something in the vault. External
    /// modules and notes that only exist as link targets are not.
    pub fn is_internal(&self) -> bool {
        match self.label.as_str() {
            "Module" => false,
            "Tag" => true,
            _ => self.path.is_some(),
        }
    }

    pub fn is_code(&self) -> bool {
        self.label == "Code"
    }

    /// Human-readable label: the path when there is one.
    pub fn display(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub rel: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolKind {
    Function,
    Class,
}

impl SymbolKind {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Function" => Some(SymbolKind::Function),
            "Class" => Some(SymbolKind::Class),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "Function",
            SymbolKind::Class => "Class",
        }
    }
}

/// A function or class defined by a code file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub file: String,
    pub name: String,
    pub kind: SymbolKind,
    pub line: i64,
}

impl Symbol {
    /// Unique key, distinct from any node key.
    pub fn key(&self) -> String {
        format!("{}#{}@{}", self.file, self.name, self.line)
    }
}

/// Nodes, relationships, and symbols read from the graph.
///
/// `DEFINES` relationships are not in `edges`; they are implied by
/// `symbols`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphModel {
    pub nodes: BTreeMap<String, GraphNode>,
    pub edges: Vec<GraphEdge>,
    /// Symbols per file path, in line order.
    pub symbols: BTreeMap<String, Vec<Symbol>>,
}

/// Key used for a node in the model.
pub fn node_key(label: &str, path: Option<&str>, name: &str) -> String {
    match path {
        Some(path) => path.to_string(),
        None => format!("{}:{}", label, name),
    }
}

/// Directory part of a vault path, `.` for the root.
pub fn directory(path: &str) -> &str {
    path.rsplit_once('/').map_or(".", |(dir, _)| dir)
}

/// First path segment, `root` for files at the vault root.
pub fn top_level(path: &str) -> &str {
    path.split_once('/').map_or("root", |(top, _)| top)
}

impl GraphModel {
    /// Add a node unless one with the same key exists.
    pub fn add_node(&mut self, node: GraphNode) -> String {
        let key = node.key.clone();
        self.nodes.entry(key.clone()).or_insert(node);
        key
    }

    pub fn add_edge(&mut self, from: &str, to: &str, rel: &str) {
        self.edges.push(GraphEdge {
            from: from.to_string(),
            to: to.to_string(),
            rel: rel.to_string(),
        });
    }

    pub fn add_symbol(&mut self, symbol: Symbol) {
        self.symbols.entry(symbol.file.clone()).or_default().push(symbol);
    }

    pub fn node(&self, key: &str) -> Option<&GraphNode> {
        self.nodes.get(key)
    }

    /// Code file nodes in path order.
    pub fn files(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values().filter(|n| n.is_code())
    }

    pub fn symbols_of(&self, path: &str) -> &[Symbol] {
        self.symbols.get(path).map_or(&[], Vec::as_slice)
    }

    /// Every class symbol in path and line order.
    pub fn classes(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols
            .values()
            .flatten()
            .filter(|s| s.kind == SymbolKind::Class)
    }

    /// Keep only relationships allowed by `filter`, and the nodes and
    /// symbols they still need.
    pub fn filtered(self, filter: Filter) -> Self {
        if filter == Filter::All {
            return self;
        }
        let internal = |key: &str| self.nodes.get(key).is_some_and(GraphNode::is_internal);
        let edges: Vec<GraphEdge> = self
            .edges
            .iter()
            .filter(|e| {
                let both = internal(&e.from) && internal(&e.to);
                match filter {
                    Filter::Internal => both,
                    Filter::External => !both,
                    Filter::All => true,
                }
            })
            .cloned()
            .collect();

        let touched: BTreeSet<&str> = edges
            .iter()
            .flat_map(|e| [e.from.as_str(), e.to.as_str()])
            .collect();
        let nodes: BTreeMap<String, GraphNode> = self
            .nodes
            .iter()
            .filter(|(key, node)| {
                touched.contains(key.as_str())
                    || (filter == Filter::Internal && node.is_code())
            })
            .map(|(k, n)| (k.clone(), n.clone()))
            .collect();
        let symbols = self
            .symbols
            .into_iter()
            .filter(|(file, _)| nodes.contains_key(file))
            .collect();
        Self {
            nodes,
            edges,
            symbols,
        }
    }

    /// Read the graph through `store`.
    ///
    /// With a `focus`, only relationships on paths of at most `depth` hops
    /// starting at a node under the focus prefix are read.
    pub fn load(store: &GraphStore, options: &ExportOptions) -> Result<Self> {
        let mut model = GraphModel::default();
        let focus = options.focus.as_deref().map(|f| f.trim_start_matches("./"));
        let mut params: Vec<(&str, Param)> = Vec::new();
        if let Some(focus) = focus {
            params.push(("focus", Param::from(focus)));
        }
        if !options.node_types.is_empty() {
            params.push(("node_types", Param::strings(&options.node_types)));
        }
        if !options.rel_types.is_empty() {
            params.push(("rel_types", Param::strings(&options.rel_types)));
        }

        if options.keeps_label("Code") {
            let statement = match focus {
                Some(_) => {
                    "MATCH (c:Code) WHERE c.path STARTS WITH $focus \
                     RETURN c.path, c.name, c.language ORDER BY c.path"
                }
                None => "MATCH (c:Code) RETURN c.path, c.name, c.language ORDER BY c.path",
            };
            let result = store.query_with_params(statement, &params)?;
            for row in &result.rows {
                let (Some(path), Some(name)) = (cell_str(row, 0), cell_str(row, 1)) else {
                    continue;
                };
                let mut node = GraphNode::new("Code", Some(path), name);
                node.language = cell_str(row, 2).map(str::to_string);
                model.add_node(node);
            }
        }

        let result = store.query_with_params(&edge_query(options, focus.is_some()), &params)?;
        model.add_edges(&result);

        let wants_symbols = options.keeps_rel("DEFINES")
            && options.keeps_label("Code")
            && (options.keeps_label("Function") || options.keeps_label("Class"));
        if wants_symbols {
            let statement = match focus {
                Some(_) => {
                    "MATCH (c:Code)-[:DEFINES]->(s) WHERE c.path STARTS WITH $focus \
                     RETURN c.path, labels(s)[0], s.name, s.line ORDER BY c.path, s.line"
                }
                None => {
                    "MATCH (c:Code)-[:DEFINES]->(s) \
                     RETURN c.path, labels(s)[0], s.name, s.line ORDER BY c.path, s.line"
                }
            };
            let result = store.query_with_params(statement, &params)?;
            for row in &result.rows {
                let (Some(file), Some(label), Some(name)) =
                    (cell_str(row, 0), cell_str(row, 1), cell_str(row, 2))
                else {
                    continue;
                };
                let Some(kind) = SymbolKind::from_label(label) else {
                    continue;
                };
                if !options.keeps_label(label) || !model.nodes.contains_key(file) {
                    continue;
                }
                model.add_symbol(Symbol {
                    file: file.to_string(),
                    name: name.to_string(),
                    kind,
                    line: row.get(3).and_then(as_count).unwrap_or(0),
                });
            }
        }

        tracing::debug!(
            "Loaded export model: {} nodes, {} edges, {} files with symbols",
            model.nodes.len(),
            model.edges.len(),
            model.symbols.len()
        );
        Ok(model)
    }

    fn add_edges(&mut self, result: &QueryResult) {
        for row in &result.rows {
            let (Some(from_label), Some(rel), Some(to_label)) =
                (cell_str(row, 0), cell_str(row, 3), cell_str(row, 4))
            else {
                continue;
            };
            let from_path = cell_str(row, 1);
            let to_path = cell_str(row, 5);
            let from_name = cell_str(row, 2).or(from_path).unwrap_or_default();
            let to_name = cell_str(row, 6).or(to_path).unwrap_or_default();
            if from_name.is_empty() || to_name.is_empty() {
                continue;
            }
            let from = self.add_node(GraphNode::new(from_label, from_path, from_name));
            let to = self.add_node(GraphNode::new(to_label, to_path, to_name));
            self.add_edge(&from, &to, rel);
        }
    }
}

/// Relationship query for the export options. `DEFINES` is read separately.
fn edge_query(options: &ExportOptions, focused: bool) -> String {
    let mut conditions = vec!["type(r) <> 'DEFINES'".to_string()];
    if !options.node_types.is_empty() {
        conditions.push("labels(a)[0] IN $node_types AND labels(b)[0] IN $node_types".to_string());
    }
    if !options.rel_types.is_empty() {
        conditions.push("type(r) IN $rel_types".to_string());
    }
    let returns = "RETURN labels(a)[0] AS from_label, a.path AS from_path, a.name AS from_name, \
                   type(r) AS rel, labels(b)[0] AS to_label, b.path AS to_path, b.name AS to_name";

    if focused {
        format!(
            "MATCH p = (f)-[*1..{}]->() WHERE f.path STARTS WITH $focus \
             UNWIND relationships(p) AS r WITH DISTINCT r \
             WITH startNode(r) AS a, r, endNode(r) AS b WHERE {} {}",
            options.depth.max(1),
            conditions.join(" AND "),
            returns
        )
    } else {
        format!("MATCH (a)-[r]->(b) WHERE {} {}", conditions.join(" AND "), returns)
    }
}

fn cell_str(row: &[Value], index: usize) -> Option<&str> {
    row.get(index).and_then(as_str)
}

/// Small model shared by the renderer tests.
#[cfg(test)]
pub(crate) fn sample_model() -> GraphModel {
    let mut model = GraphModel::default();
    for path in ["app/main.py", "app/util.py", "lib/core.py"] {
        model.add_node(GraphNode::new("Code", Some(path), path.rsplit('/').next().unwrap()));
    }
    let requests = model.add_node(GraphNode::new("Module", None, "requests"));
    model.add_edge("app/main.py", "app/util.py", "IMPORTS");
    model.add_edge("app/main.py", "lib/core.py", "IMPORTS");
    model.add_edge("app/main.py", &requests, "IMPORTS");
    model.add_symbol(Symbol {
        file: "lib/core.py".to_string(),
        name: "Engine".to_string(),
        kind: SymbolKind::Class,
        line: 3,
    });
    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordingExecutor;
    use serde_json::json;
    use std::sync::Arc;

    fn edge_row(from: (&str, Option<&str>, &str), rel: &str, to: (&str, Option<&str>, &str)) -> Vec<Value> {
        vec![
            json!(from.0),
            from.1.map_or(Value::Null, |p| json!(p)),
            json!(from.2),
            json!(rel),
            json!(to.0),
            to.1.map_or(Value::Null, |p| json!(p)),
            json!(to.2),
        ]
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(directory("a/b/c.py"), "a/b");
        assert_eq!(directory("c.py"), ".");
        assert_eq!(top_level("a/b/c.py"), "a");
        assert_eq!(top_level("c.py"), "root");
    }

    #[test]
    fn test_internal_filter_drops_external_modules() {
        let model = sample_model().filtered(Filter::Internal);
        assert_eq!(model.edges.len(), 2);
        assert!(model.node("Module:requests").is_none());
        assert_eq!(model.files().count(), 3);
    }

    #[test]
    fn test_external_filter_keeps_only_external_edges() {
        let model = sample_model().filtered(Filter::External);
        assert_eq!(model.edges.len(), 1);
        assert_eq!(model.edges[0].to, "Module:requests");
        assert_eq!(model.nodes.len(), 2);
        assert!(model.symbols.is_empty());
    }

    #[test]
    fn test_load_reads_files_edges_and_symbols() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.respond_when(
            "RETURN c.path, c.name, c.language",
            QueryResult::new(
                &["c.path", "c.name", "c.language"],
                vec![vec![json!("src/a.py"), json!("a.py"), json!("python")]],
            ),
        );
        executor.respond_when(
            "type(r) AS rel",
            QueryResult::new(
                &[],
                vec![
                    edge_row(("Code", Some("src/a.py"), "a.py"), "IMPORTS", ("Module", None, "numpy")),
                    edge_row(("Note", Some("n.md"), "n"), "LINKS_TO", ("Note", None, "Ghost")),
                ],
            ),
        );
        executor.respond_when(
            "labels(s)[0]",
            QueryResult::new(
                &[],
                vec![
                    vec![json!("src/a.py"), json!("Class"), json!("A"), json!(4)],
                    vec![json!("src/a.py"), json!("Function"), json!("run"), json!("9")],
                ],
            ),
        );
        let store = GraphStore::new(executor.clone(), "test");

        let model = GraphModel::load(&store, &ExportOptions::default()).unwrap();
        assert_eq!(model.node("src/a.py").unwrap().language.as_deref(), Some("python"));
        assert!(model.node("Module:numpy").is_some());
        assert!(!model.node("Note:Ghost").unwrap().is_internal());
        assert_eq!(model.edges.len(), 2);
        let symbols = model.symbols_of("src/a.py");
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[1].line, 9);
        assert_eq!(model.classes().count(), 1);
    }

    #[test]
    fn test_focus_and_type_filters_reach_the_query() {
        let executor = Arc::new(RecordingExecutor::new());
        let store = GraphStore::new(executor.clone(), "test");
        let options = ExportOptions {
            focus: Some("src/store".to_string()),
            depth: 3,
            node_types: vec!["Code".to_string(), "Module".to_string()],
            rel_types: vec!["IMPORTS".to_string()],
            ..Default::default()
        };
        GraphModel::load(&store, &options).unwrap();

        let edges = executor.matching("type(r) AS rel");
        assert_eq!(edges.len(), 1);
        assert!(edges[0].contains("[*1..3]"));
        assert!(edges[0].contains("focus='src/store'"));
        assert!(edges[0].contains("type(r) IN $rel_types"));
        assert!(edges[0].contains("rel_types=['IMPORTS']"));
        // DEFINES is excluded by rel_types, so no symbol query runs.
        assert!(executor.matching("labels(s)[0]").is_empty());
    }
}
