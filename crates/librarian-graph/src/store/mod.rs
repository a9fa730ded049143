//! Graph storage over a Redis-wire property graph server.
//!
//! [`GraphStore`] owns the node and relationship layout:
//!
//! | Label      | Key    | Notes                                             |
//! |------------|--------|---------------------------------------------------|
//! | `Note`     | `path` | placeholders created by links have `name` only    |
//! | `Tag`      | `name` |                                                   |
//! | `Code`     | `path` |                                                   |
//! | `Function` | `file` + `name` + `line`, owned by one `Code` node      |
//! | `Class`    | `file` + `name` + `line`, owned by one `Code` node      |
//! | `Module`   | `name` | external import targets                           |
//! | `Asset`    | `path` |                                                   |
//!
//! Upserts are several statements in sequence: merge the node, set its
//! scalars, delete its outgoing relationships, then recreate them. A failure
//! part way leaves the node stale until its next upsert.

pub mod cypher;
pub mod executor;
pub mod recording;
pub mod result;

use std::sync::Arc;

use serde::Serialize;

pub use cypher::Param;
pub use executor::{GraphAddress, QueryExecutor, RedisExecutor};
pub use recording::RecordingExecutor;
pub use result::QueryResult;

use crate::metadata::{AssetMetadata, CodeMetadata, NoteMetadata, SymbolRef};

/// Error type for graph store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(#[from] redis::RedisError),
    #[error("Query failed: {0}")]
    Query(String),
    #[error("Unexpected reply: {0}")]
    Protocol(String),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Relationship types owned by the node they start from.
const OWNED_RELATIONSHIPS: &str = "TAGGED|LINKS_TO|EMBEDS|DEFINES|IMPORTS";

/// Where an import of a code file points.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportTarget {
    /// Another code file in the vault, by relative path.
    Code(String),
    /// An external package.
    Module(String),
}

/// A note returned by the read helpers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteRef {
    pub path: String,
    pub name: String,
}

/// Node and relationship counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub notes: i64,
    pub links: i64,
    pub tags: i64,
    pub code: i64,
    pub modules: i64,
    pub assets: i64,
}

/// Normalize a wikilink target to the note name it refers to: last path
/// segment, no `.md` suffix.
pub fn link_name(target: &str) -> String {
    let target = target.trim().trim_end_matches('/');
    let last = target.rsplit('/').next().unwrap_or(target);
    let lower = last.to_ascii_lowercase();
    if lower.ends_with(".md") {
        last[..last.len() - 3].to_string()
    } else {
        last.to_string()
    }
}

/// Typed access to the vault graph.
pub struct GraphStore {
    executor: Arc<dyn QueryExecutor>,
    graph: String,
}

impl GraphStore {
    pub fn new(executor: Arc<dyn QueryExecutor>, graph: impl Into<String>) -> Self {
        Self {
            executor,
            graph: graph.into(),
        }
    }

    /// Connect to a graph server. Fails if the server does not answer.
    pub fn connect(address: &GraphAddress, graph: impl Into<String>) -> Result<Self> {
        let executor = RedisExecutor::connect(address)?;
        Ok(Self::new(Arc::new(executor), graph))
    }

    pub fn graph_name(&self) -> &str {
        &self.graph
    }

    pub fn ping(&self) -> Result<()> {
        self.executor.ping()
    }

    /// Run a raw statement.
    pub fn query(&self, query: &str) -> Result<QueryResult> {
        tracing::trace!(graph = %self.graph, "{}", query);
        self.executor.execute(&self.graph, query)
    }

    /// Run a statement with `$name` parameters bound to escaped literals.
    pub fn query_with_params(&self, query: &str, params: &[(&str, Param)]) -> Result<QueryResult> {
        self.query(&cypher::with_params(query, params)?)
    }

    /// Create the lookup indexes the upserts rely on. Existing indexes are
    /// not an error.
    pub fn ensure_indexes(&self) -> Result<()> {
        for (label, property) in [
            ("Note", "path"),
            ("Note", "name"),
            ("Tag", "name"),
            ("Code", "path"),
            ("Module", "name"),
            ("Asset", "path"),
        ] {
            let statement = format!("CREATE INDEX FOR (n:{}) ON (n.{})", label, property);
            match self.query(&statement) {
                Ok(_) => {}
                Err(StoreError::Query(msg)) if msg.to_lowercase().contains("already") => {
                    tracing::debug!("Index on {}.{} exists", label, property);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Write a note and rebuild its tag, link, and embed relationships.
    pub fn upsert_note(&self, note: &NoteMetadata) -> Result<()> {
        let path = Param::from(&note.path);

        self.query_with_params(
            "MERGE (n:Note {path: $path}) \
             SET n.name = $name, n.modified = $modified, n.tags = $tags, \
             n.wikilinks = $wikilinks, n.embeds = $embeds, \
             n.headings = $headings, n.frontmatter = $frontmatter",
            &[
                ("path", path.clone()),
                ("name", Param::from(&note.name)),
                ("modified", Param::from(note.modified.to_rfc3339())),
                ("tags", Param::from(note.tags.as_slice())),
                ("wikilinks", Param::from(note.wikilinks.as_slice())),
                ("embeds", Param::from(note.embeds.as_slice())),
                ("headings", Param::from(serde_json::to_string(&note.headings)?)),
                ("frontmatter", Param::from(serde_json::to_string(&note.frontmatter)?)),
            ],
        )?;

        self.fold_placeholders(&note.path, &note.name)?;
        self.clear_relationships(&note.path)?;

        if !note.tags.is_empty() {
            self.query_with_params(
                "MATCH (n:Note {path: $path}) UNWIND $tags AS t \
                 MERGE (g:Tag {name: t}) CREATE (n)-[:TAGGED]->(g)",
                &[("path", path.clone()), ("tags", Param::from(note.tags.as_slice()))],
            )?;
        }

        for (relationship, targets) in [("LINKS_TO", &note.wikilinks), ("EMBEDS", &note.embeds)] {
            let names = unique_link_names(targets);
            if names.is_empty() {
                continue;
            }
            let statement = format!(
                "MATCH (n:Note {{path: $path}}) UNWIND $targets AS t \
                 MERGE (m:Note {{name: t}}) CREATE (n)-[:{}]->(m)",
                relationship
            );
            self.query_with_params(
                &statement,
                &[("path", path.clone()), ("targets", Param::strings(names))],
            )?;
        }
        self.sweep_dangling()
    }

    /// Write a code file, its symbol nodes, and its import relationships.
    pub fn upsert_code(&self, code: &CodeMetadata, imports: &[ImportTarget]) -> Result<()> {
        let path = Param::from(&code.path);
        let names = |symbols: &[SymbolRef]| Param::strings(symbols.iter().map(|s| s.name.clone()));

        self.query_with_params(
            "MERGE (c:Code {path: $path}) \
             SET c.name = $name, c.language = $language, c.functions = $functions, \
             c.classes = $classes, c.imports = $imports, c.tasks = $tasks",
            &[
                ("path", path.clone()),
                ("name", Param::from(&code.name)),
                ("language", Param::from(&code.language)),
                ("functions", names(&code.functions)),
                ("classes", names(&code.classes)),
                ("imports", Param::from(code.imports.as_slice())),
                ("tasks", Param::from(serde_json::to_string(&code.tasks)?)),
            ],
        )?;

        self.delete_symbols(&code.path)?;
        self.clear_relationships(&code.path)?;

        for (label, kind, symbols) in [
            ("Function", "function", &code.functions),
            ("Class", "class", &code.classes),
        ] {
            if symbols.is_empty() {
                continue;
            }
            let statement = format!(
                "MATCH (c:Code {{path: $path}}) UNWIND $symbols AS s \
                 CREATE (c)-[:DEFINES]->(:{} {{name: s.name, line: s.line, kind: $kind, file: $path}})",
                label
            );
            self.query_with_params(
                &statement,
                &[
                    ("path", path.clone()),
                    ("kind", Param::from(kind)),
                    ("symbols", symbol_maps(symbols)),
                ],
            )?;
        }

        let mut files = Vec::new();
        let mut modules = Vec::new();
        for target in imports {
            match target {
                ImportTarget::Code(p) if !files.contains(p) && *p != code.path => files.push(p.clone()),
                ImportTarget::Module(m) if !modules.contains(m) => modules.push(m.clone()),
                _ => {}
            }
        }

        if !files.is_empty() {
            let targets = files
                .iter()
                .map(|p| {
                    Param::Map(vec![
                        ("path".to_string(), Param::from(p)),
                        ("name".to_string(), Param::from(crate::parser::file_name(p))),
                    ])
                })
                .collect();
            self.query_with_params(
                "MATCH (c:Code {path: $path}) UNWIND $targets AS t \
                 MERGE (d:Code {path: t.path}) ON CREATE SET d.name = t.name \
                 CREATE (c)-[:IMPORTS]->(d)",
                &[("path", path.clone()), ("targets", Param::List(targets))],
            )?;
        }
        if !modules.is_empty() {
            self.query_with_params(
                "MATCH (c:Code {path: $path}) UNWIND $modules AS m \
                 MERGE (x:Module {name: m}) CREATE (c)-[:IMPORTS]->(x)",
                &[("path", path), ("modules", Param::strings(modules))],
            )?;
        }
        self.sweep_dangling()
    }

    /// Write an asset node.
    pub fn upsert_asset(&self, asset: &AssetMetadata) -> Result<()> {
        self.query_with_params(
            "MERGE (a:Asset {path: $path}) SET a.name = $name, a.size = $size, a.type = $type",
            &[
                ("path", Param::from(&asset.path)),
                ("name", Param::from(&asset.name)),
                ("size", Param::from(asset.size)),
                ("type", Param::from(AssetMetadata::TYPE)),
            ],
        )?;
        Ok(())
    }

    /// Remove a note and all of its relationships.
    pub fn delete_note(&self, path: &str) -> Result<()> {
        self.query_with_params(
            "MATCH (n:Note {path: $path}) DETACH DELETE n",
            &[("path", Param::from(path))],
        )?;
        self.sweep_dangling()
    }

    /// Remove a code file, its symbols, and all of its relationships.
    pub fn delete_code(&self, path: &str) -> Result<()> {
        self.delete_symbols(path)?;
        self.query_with_params(
            "MATCH (c:Code {path: $path}) DETACH DELETE c",
            &[("path", Param::from(path))],
        )?;
        self.sweep_dangling()
    }

    pub fn delete_asset(&self, path: &str) -> Result<()> {
        self.query_with_params(
            "MATCH (a:Asset {path: $path}) DETACH DELETE a",
            &[("path", Param::from(path))],
        )?;
        self.sweep_dangling()
    }

    /// Remove whatever node is stored under `path`, whatever its label.
    /// Used when a file disappears and its kind is no longer knowable.
    pub fn delete_path(&self, path: &str) -> Result<()> {
        self.delete_symbols(path)?;
        self.query_with_params(
            "MATCH (n {path: $path}) DETACH DELETE n",
            &[("path", Param::from(path))],
        )?;
        self.sweep_dangling()
    }

    /// Remove every node stored under directory `dir`.
    pub fn delete_under(&self, dir: &str) -> Result<()> {
        let dir = dir.trim_matches('/');
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };
        let prefix = Param::from(prefix);
        self.query_with_params(
            "MATCH (s) WHERE s.file STARTS WITH $prefix DETACH DELETE s",
            &[("prefix", prefix.clone())],
        )?;
        self.query_with_params(
            "MATCH (n) WHERE n.path STARTS WITH $prefix DETACH DELETE n",
            &[("prefix", prefix)],
        )?;
        self.sweep_dangling()
    }

    /// Notes that no other note links to.
    pub fn get_orphans(&self) -> Result<Vec<NoteRef>> {
        let result = self.query(
            "MATCH (n:Note) WHERE n.path IS NOT NULL \
             OPTIONAL MATCH (m:Note)-[r:LINKS_TO]->(n) \
             WITH n, count(r) AS incoming WHERE incoming = 0 \
             RETURN n.path, n.name ORDER BY n.path",
        )?;
        Ok(note_refs(&result))
    }

    /// Notes that link to the note named `name`.
    pub fn get_backlinks(&self, name: &str) -> Result<Vec<NoteRef>> {
        let result = self.query_with_params(
            "MATCH (s:Note)-[:LINKS_TO]->(t:Note {name: $name}) \
             WHERE s.path IS NOT NULL \
             RETURN DISTINCT s.path, s.name ORDER BY s.path",
            &[("name", Param::from(link_name(name)))],
        )?;
        Ok(note_refs(&result))
    }

    /// Notes tagged `tag`. A leading `#` is ignored.
    pub fn get_notes_by_tag(&self, tag: &str) -> Result<Vec<NoteRef>> {
        let result = self.query_with_params(
            "MATCH (n:Note)-[:TAGGED]->(:Tag {name: $tag}) \
             RETURN DISTINCT n.path, n.name ORDER BY n.path",
            &[("tag", Param::from(tag.trim().trim_start_matches('#')))],
        )?;
        Ok(note_refs(&result))
    }

    pub fn get_stats(&self) -> Result<GraphStats> {
        let count = |statement: &str| -> Result<i64> { Ok(self.query(statement)?.count()) };
        Ok(GraphStats {
            notes: count("MATCH (n:Note) WHERE n.path IS NOT NULL RETURN count(n)")?,
            links: count("MATCH (:Note)-[r:LINKS_TO]->(:Note) RETURN count(r)")?,
            tags: count("MATCH (t:Tag) RETURN count(t)")?,
            code: count("MATCH (c:Code) RETURN count(c)")?,
            modules: count("MATCH (m:Module) RETURN count(m)")?,
            assets: count("MATCH (a:Asset) RETURN count(a)")?,
        })
    }

    /// Re-point links that reached `name` through a pathless placeholder
    /// onto the note at `path`, then drop the placeholder.
    ///
    /// Runs after the note's MERGE, so a placeholder created by a concurrent
    /// writer before that point is always folded; later writers MERGE onto
    /// the real note by name.
    fn fold_placeholders(&self, path: &str, name: &str) -> Result<()> {
        let params = [("path", Param::from(path)), ("name", Param::from(name))];
        for relationship in ["LINKS_TO", "EMBEDS"] {
            let statement = format!(
                "MATCH (n:Note {{path: $path}}) \
                 MATCH (s)-[old:{rel}]->(p:Note {{name: $name}}) WHERE p.path IS NULL \
                 CREATE (s)-[:{rel}]->(n) DELETE old",
                rel = relationship
            );
            self.query_with_params(&statement, &params)?;
        }
        self.query_with_params(
            "MATCH (p:Note {name: $name}) WHERE p.path IS NULL DETACH DELETE p",
            &params[1..],
        )?;
        Ok(())
    }

    /// Remove placeholder notes, modules, and tags that nothing points at.
    fn sweep_dangling(&self) -> Result<()> {
        for (pattern, condition) in [
            ("(n:Note)", "n.path IS NULL"),
            ("(n:Module)", "true"),
            ("(n:Tag)", "true"),
        ] {
            let statement = format!(
                "MATCH {} WHERE {} OPTIONAL MATCH ()-[r]->(n) \
                 WITH n, count(r) AS incoming WHERE incoming = 0 DELETE n",
                pattern, condition
            );
            self.query(&statement)?;
        }
        Ok(())
    }

    fn clear_relationships(&self, path: &str) -> Result<()> {
        let statement = format!(
            "MATCH (n {{path: $path}})-[r:{}]->() DELETE r",
            OWNED_RELATIONSHIPS
        );
        self.query_with_params(&statement, &[("path", Param::from(path))])?;
        Ok(())
    }

    fn delete_symbols(&self, path: &str) -> Result<()> {
        self.query_with_params(
            "MATCH (s {file: $path}) DETACH DELETE s",
            &[("path", Param::from(path))],
        )?;
        Ok(())
    }
}

fn unique_link_names(targets: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for target in targets {
        let name = link_name(target);
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn symbol_maps(symbols: &[SymbolRef]) -> Param {
    Param::List(
        symbols
            .iter()
            .map(|s| {
                Param::Map(vec![
                    ("name".to_string(), Param::from(&s.name)),
                    ("line".to_string(), Param::from(s.line)),
                ])
            })
            .collect(),
    )
}

fn note_refs(result: &QueryResult) -> Vec<NoteRef> {
    result
        .rows
        .iter()
        .filter_map(|row| {
            let path = row.first()?.as_str()?.to_string();
            let name = row
                .get(1)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| crate::markdown::note_name(&path));
            Some(NoteRef { path, name })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn store() -> (GraphStore, Arc<RecordingExecutor>) {
        let executor = Arc::new(RecordingExecutor::new());
        let store = GraphStore::new(executor.clone(), "vault");
        (store, executor)
    }

    fn note(path: &str, links: &[&str]) -> NoteMetadata {
        NoteMetadata {
            path: path.to_string(),
            name: crate::markdown::note_name(path),
            modified: Utc::now(),
            tags: vec!["project".to_string()],
            wikilinks: links.iter().map(|l| l.to_string()).collect(),
            embeds: Vec::new(),
            headings: Vec::new(),
            frontmatter: BTreeMap::new(),
        }
    }

    fn position(statements: &[String], fragment: &str) -> usize {
        statements
            .iter()
            .position(|s| s.contains(fragment))
            .unwrap_or_else(|| panic!("no statement containing {}", fragment))
    }

    #[test]
    fn test_link_name() {
        assert_eq!(link_name("Project"), "Project");
        assert_eq!(link_name("folder/Project.md"), "Project");
        assert_eq!(link_name("diagram.png"), "diagram.png");
        assert_eq!(link_name(" Spaced "), "Spaced");
    }

    #[test]
    fn test_upsert_note_clears_before_recreating() {
        let (store, executor) = store();
        store.upsert_note(&note("notes/a.md", &["B", "C"])).unwrap();

        let statements = executor.statements();
        let merge = position(&statements, "MERGE (n:Note {path: $path})");
        let clear = position(&statements, "DELETE r");
        let tags = position(&statements, ":TAGGED]");
        let links = position(&statements, "UNWIND $targets");
        assert!(merge < clear && clear < tags && tags < links);
        assert!(statements[clear].contains("TAGGED|LINKS_TO|EMBEDS|DEFINES|IMPORTS"));
        assert!(statements[links].contains("CREATE (n)-[:LINKS_TO]->(m)"));
        assert!(statements[links].contains("targets=['B', 'C']"));
        assert_eq!(executor.matching("UNWIND $targets").len(), 1);
    }

    #[test]
    fn test_upsert_note_folds_placeholder_after_merge() {
        let (store, executor) = store();
        store.upsert_note(&note("notes/Plan.md", &[])).unwrap();

        let statements = executor.statements();
        let merge = position(&statements, "MERGE (n:Note {path: $path})");
        let links = position(&statements, "CREATE (s)-[:LINKS_TO]->(n) DELETE old");
        let embeds = position(&statements, "CREATE (s)-[:EMBEDS]->(n) DELETE old");
        let drop = position(&statements, "WHERE p.path IS NULL DETACH DELETE p");
        let clear = position(&statements, "DELETE r");
        assert!(merge < links && links < embeds && embeds < drop && drop < clear);

        for i in [links, embeds] {
            assert!(statements[i].contains("path='notes/Plan.md'"));
            assert!(statements[i].contains("name='Plan'"));
            assert!(statements[i].contains("p.path IS NULL"));
        }
        assert!(statements[drop].starts_with("CYPHER name='Plan' "));
        assert!(executor.matching("SET n.path").is_empty());
    }

    #[test]
    fn test_writes_and_deletes_sweep_dangling_nodes() {
        let (store, executor) = store();
        store.upsert_note(&note("a.md", &["B"])).unwrap();
        let statements = executor.take();
        let links = position(&statements, "UNWIND $targets");
        let sweep = position(&statements, "WHERE incoming = 0 DELETE n");
        assert!(links < sweep);

        store.delete_note("a.md").unwrap();
        let statements = executor.take();
        assert!(statements[0].contains("DETACH DELETE n"));
        let sweeps: Vec<&String> = statements[1..].iter().collect();
        assert_eq!(sweeps.len(), 3);
        assert!(sweeps[0].contains("MATCH (n:Note) WHERE n.path IS NULL"));
        assert!(sweeps[1].contains("MATCH (n:Module)"));
        assert!(sweeps[2].contains("MATCH (n:Tag)"));
        assert!(sweeps.iter().all(|s| s.contains("incoming = 0") && !s.contains("DETACH")));
    }

    #[test]
    fn test_reupsert_drops_stale_link() {
        let (store, executor) = store();
        store.upsert_note(&note("a.md", &["A", "B"])).unwrap();
        executor.take();

        store.upsert_note(&note("a.md", &["A"])).unwrap();
        let statements = executor.statements();
        let clear = position(&statements, "DELETE r");
        let links = position(&statements, "UNWIND $targets");
        assert!(clear < links);
        assert!(statements[links].contains("targets=['A']"));
        assert!(!statements[links].contains("'B'"));
    }

    #[test]
    fn test_hostile_paths_are_escaped() {
        let (store, executor) = store();
        store.delete_note("x'}) DETACH DELETE (m) //").unwrap();
        let statement = &executor.statements()[0];
        assert!(statement.starts_with("CYPHER path='x\\'}) DETACH DELETE (m) //' "));
    }

    #[test]
    fn test_upsert_code_symbols_and_imports() {
        let (store, executor) = store();
        let code = CodeMetadata {
            path: "src/app.py".to_string(),
            name: "app.py".to_string(),
            language: "python".to_string(),
            functions: vec![SymbolRef::new("main", 3)],
            classes: Vec::new(),
            imports: vec!["os".to_string(), "src.util".to_string()],
            tasks: Vec::new(),
        };
        store
            .upsert_code(
                &code,
                &[
                    ImportTarget::Module("os".to_string()),
                    ImportTarget::Code("src/util.py".to_string()),
                    ImportTarget::Module("os".to_string()),
                ],
            )
            .unwrap();

        let statements = executor.statements();
        let symbols_removed = position(&statements, "MATCH (s {file: $path}) DETACH DELETE s");
        let defines = position(&statements, ":DEFINES]");
        assert!(symbols_removed < defines);
        assert!(statements[defines].contains("symbols=[{name: 'main', line: 3}]"));
        assert!(executor.matching(":Class {").is_empty());
        assert_eq!(executor.matching("MERGE (x:Module").len(), 1);
        assert!(executor.matching("modules=['os']").len() == 1);
        assert!(executor.matching("MERGE (d:Code {path: t.path})")[0].contains("path: 'src/util.py'"));
    }

    #[test]
    fn test_delete_code_removes_symbols() {
        let (store, executor) = store();
        store.delete_code("src/a.rs").unwrap();
        let statements = executor.statements();
        assert!(statements[0].contains("{file: $path}"));
        assert!(statements[1].contains("MATCH (c:Code {path: $path}) DETACH DELETE c"));
        assert!(statements[2..].iter().all(|s| s.contains("incoming = 0")));
    }

    #[test]
    fn test_delete_under_uses_directory_prefix() {
        let (store, executor) = store();
        store.delete_under("notes/archive/").unwrap();
        let statements = executor.statements();
        assert!(statements.iter().all(|s| s.contains("prefix='notes/archive/'")));
    }

    #[test]
    fn test_orphans_parsed_from_rows() {
        let (store, executor) = store();
        executor.respond_when(
            "incoming = 0",
            QueryResult::new(
                &["n.path", "n.name"],
                vec![
                    vec![json!("a.md"), json!("a")],
                    vec![json!("b/c.md"), json!(null)],
                ],
            ),
        );
        let orphans = store.get_orphans().unwrap();
        assert_eq!(
            orphans,
            vec![
                NoteRef { path: "a.md".to_string(), name: "a".to_string() },
                NoteRef { path: "b/c.md".to_string(), name: "c".to_string() },
            ]
        );
    }

    #[test]
    fn test_backlinks_and_tags_normalize_input() {
        let (store, executor) = store();
        store.get_backlinks("dir/Target.md").unwrap();
        store.get_notes_by_tag("#work").unwrap();
        assert_eq!(executor.matching("name='Target'").len(), 1);
        assert_eq!(executor.matching("tag='work'").len(), 1);
    }

    #[test]
    fn test_stats_normalize_counts() {
        let (store, executor) = store();
        executor.respond_when("count(n)", QueryResult::new(&["c"], vec![vec![json!(2)]]));
        executor.respond_when("count(r)", QueryResult::new(&["c"], vec![vec![json!(5.0)]]));
        executor.respond_when("count(t)", QueryResult::new(&["c"], vec![vec![json!("3")]]));
        let stats = store.get_stats().unwrap();
        assert_eq!(stats.notes, 2);
        assert_eq!(stats.links, 5);
        assert_eq!(stats.tags, 3);
        assert_eq!(stats.code, 0);
    }

    #[test]
    fn test_ensure_indexes_propagates_other_failures() {
        let (store, executor) = store();
        executor.fail_when("CREATE INDEX");
        // Scripted failures don't say "already", so they surface.
        assert!(store.ensure_indexes().is_err());
    }

    #[test]
    fn test_query_failure_surfaces() {
        let (store, executor) = store();
        executor.fail_when("MERGE (a:Asset");
        let asset = AssetMetadata {
            path: "a.png".to_string(),
            name: "a.png".to_string(),
            size: 1,
        };
        assert!(matches!(store.upsert_asset(&asset), Err(StoreError::Query(_))));
    }
}
