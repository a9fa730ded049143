//! Mermaid flowchart and class diagrams.

use std::collections::{BTreeMap, BTreeSet};

use super::model::{GraphModel, GraphNode, SymbolKind, directory, top_level};
use super::{Detail, ExportOptions, IdMap, dedupe_edges};

/// Escape text for a quoted Mermaid label.
fn label(text: &str) -> String {
    text.replace('"', "#quot;")
        .replace('<', "#lt;")
        .replace('>', "#gt;")
}

/// Cluster a node belongs to in the flow diagram.
fn cluster(node: &GraphNode) -> String {
    match (&node.path, node.label.as_str()) {
        (Some(path), _) => match directory(path) {
            "." => "(root)".to_string(),
            dir => dir.to_string(),
        },
        (None, "Module") => "External".to_string(),
        (None, "Note") => "Unresolved notes".to_string(),
        (None, other) => other.to_string(),
    }
}

/// File nodes clustered by directory, external dependencies in their own
/// cluster. Symbol summaries grow with the detail level.
pub fn flow(model: &GraphModel, options: &ExportOptions) -> String {
    let mut ids = IdMap::new("n");
    let mut out = String::from("flowchart LR\n");

    let mut clusters: BTreeMap<String, Vec<&GraphNode>> = BTreeMap::new();
    for node in model.nodes.values() {
        clusters.entry(cluster(node)).or_default().push(node);
    }

    let limit = options.detail.symbol_limit();
    for (name, nodes) in &clusters {
        let cluster_id = ids.id(&format!("cluster:{}", name));
        out.push_str(&format!("  subgraph {}[\"{}\"]\n", cluster_id, label(name)));
        for node in nodes {
            let id = ids.id(&node.key);
            let mut text = label(&node.name);
            let symbols = node.path.as_deref().map(|p| model.symbols_of(p)).unwrap_or_default();
            if limit > 0 {
                for symbol in symbols.iter().take(limit) {
                    let prefix = match symbol.kind {
                        SymbolKind::Class => "class",
                        SymbolKind::Function => "fn",
                    };
                    text.push_str(&format!("<br/>{} {}", prefix, label(&symbol.name)));
                }
                if symbols.len() > limit {
                    text.push_str(&format!("<br/>+{} more", symbols.len() - limit));
                }
            }
            out.push_str(&format!("    {}[\"{}\"]\n", id, text));
        }
        out.push_str("  end\n");
    }

    for edge in dedupe_edges(&model.edges, options.detail) {
        let from = ids.id(&edge.from);
        let to = ids.id(&edge.to);
        if options.detail == Detail::Low {
            out.push_str(&format!("  {} --> {}\n", from, to));
        } else {
            out.push_str(&format!("  {} -->|{}| {}\n", from, edge.rel, to));
        }
    }
    out
}

/// Import edges between files aggregated to directories, one diagram per
/// top-level module. Each diagram adds one hop of frontier nodes: sibling
/// modules and external packages it imports.
///
/// Returns `(module, diagram)` pairs sorted by module.
pub fn packages(model: &GraphModel, options: &ExportOptions) -> Vec<(String, String)> {
    // module -> directories inside it
    let mut modules: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for file in model.files() {
        if let Some(path) = &file.path {
            modules
                .entry(top_level(path).to_string())
                .or_default()
                .insert(directory(path).to_string());
        }
    }

    // (module, from dir, to target) -> import count
    let mut weights: BTreeMap<(String, String, Target), usize> = BTreeMap::new();
    for edge in model.edges.iter().filter(|e| e.rel == "IMPORTS") {
        let (Some(from), Some(to)) = (model.node(&edge.from), model.node(&edge.to)) else {
            continue;
        };
        let Some(from_path) = from.path.as_deref().filter(|_| from.is_code()) else {
            continue;
        };
        let module = top_level(from_path).to_string();
        let target = match to.path.as_deref() {
            Some(to_path) if top_level(to_path) == module => Target::Dir(directory(to_path).to_string()),
            Some(to_path) => Target::Sibling(top_level(to_path).to_string()),
            None => Target::External(to.name.clone()),
        };
        if target == Target::Dir(directory(from_path).to_string()) {
            continue;
        }
        *weights
            .entry((module, directory(from_path).to_string(), target))
            .or_default() += 1;
    }

    modules
        .into_iter()
        .map(|(module, dirs)| {
            let mut ids = IdMap::new("p");
            let mut out = String::from("flowchart LR\n");
            out.push_str(&format!("  subgraph {}[\"{}\"]\n", ids.id(&format!("module:{}", module)), label(&module)));
            for dir in &dirs {
                out.push_str(&format!("    {}[\"{}\"]\n", ids.id(dir), label(dir)));
            }
            out.push_str("  end\n");

            let edges: Vec<_> = weights
                .iter()
                .filter(|((m, _, _), _)| *m == module)
                .collect();
            let frontier: BTreeSet<&Target> = edges
                .iter()
                .map(|((_, _, target), _)| target)
                .filter(|t| !matches!(t, Target::Dir(_)))
                .collect();
            for target in frontier {
                let (key, text, shape) = match target {
                    Target::Sibling(name) => (format!("sibling:{}", name), name, ("[/", "/]")),
                    Target::External(name) => (format!("external:{}", name), name, ("([", "])")),
                    Target::Dir(_) => continue,
                };
                out.push_str(&format!(
                    "  {}{}\"{}\"{}\n",
                    ids.id(&key),
                    shape.0,
                    label(text),
                    shape.1
                ));
            }

            for ((_, from, target), count) in edges {
                let to = match target {
                    Target::Dir(dir) => ids.id(dir),
                    Target::Sibling(name) => ids.id(&format!("sibling:{}", name)),
                    Target::External(name) => ids.id(&format!("external:{}", name)),
                };
                let from = ids.id(from);
                if options.detail == Detail::Low {
                    out.push_str(&format!("  {} --> {}\n", from, to));
                } else {
                    out.push_str(&format!("  {} -->|{}| {}\n", from, count, to));
                }
            }
            (module, out)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Target {
    Dir(String),
    Sibling(String),
    External(String),
}

/// One node per class symbol, grouped by nothing; the defining file is an
/// annotation above medium detail.
pub fn classes(model: &GraphModel, options: &ExportOptions) -> String {
    let mut ids = IdMap::new("c");
    let mut out = String::from("classDiagram\n");
    let mut any = false;
    for class in model.classes() {
        any = true;
        let id = ids.id(&class.key());
        if options.detail == Detail::Low {
            out.push_str(&format!("  class {}[\"{}\"]\n", id, label(&class.name)));
        } else {
            out.push_str(&format!(
                "  class {}[\"{}\"] {{\n    <<{}>>\n  }}\n",
                id,
                label(&class.name),
                label(&class.file)
            ));
        }
    }
    if !any {
        out.push_str("  class Empty[\"No classes\"]\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::model::{Symbol, sample_model};
    use regex::Regex;

    fn ids_in(diagram: &str) -> Vec<String> {
        let re = Regex::new(r"(?m)^\s*(?:subgraph |class )?([^\s\[\(\{]+)[\[\(\{]").unwrap();
        re.captures_iter(diagram).map(|c| c[1].to_string()).collect()
    }

    #[test]
    fn test_flow_clusters_and_external_group() {
        let diagram = flow(&sample_model(), &ExportOptions::default());
        assert!(diagram.starts_with("flowchart LR\n"));
        assert!(diagram.contains("[\"app\"]"));
        assert!(diagram.contains("[\"External\"]"));
        assert!(diagram.contains("-->|IMPORTS|"));
        assert!(diagram.contains("class Engine"));
    }

    #[test]
    fn test_flow_ids_are_sanitized() {
        let mut model = sample_model();
        model.add_node(GraphNode::new("Code", Some("weird dir/ä-b.py"), "ä-b.py"));
        let diagram = flow(&model, &ExportOptions::default());
        let valid = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();
        let ids = ids_in(&diagram);
        assert!(!ids.is_empty());
        for id in ids {
            assert!(valid.is_match(&id), "bad id {}", id);
        }
    }

    #[test]
    fn test_flow_symbol_limit_by_detail() {
        let mut model = sample_model();
        for i in 0..10 {
            model.add_symbol(Symbol {
                file: "app/util.py".to_string(),
                name: format!("f{}", i),
                kind: SymbolKind::Function,
                line: i + 1,
            });
        }
        let medium = flow(&model, &ExportOptions::default());
        assert!(medium.contains("fn f2<br/>+7 more"));
        let high = flow(
            &model,
            &ExportOptions {
                detail: Detail::High,
                ..Default::default()
            },
        );
        assert!(high.contains("fn f7<br/>+2 more"));
        let low = flow(
            &model,
            &ExportOptions {
                detail: Detail::Low,
                ..Default::default()
            },
        );
        assert!(!low.contains("fn f0"));
    }

    #[test]
    fn test_low_detail_flow_has_no_duplicate_edges() {
        let mut model = sample_model();
        model.add_edge("app/main.py", "app/util.py", "IMPORTS");
        model.add_edge("app/main.py", "app/util.py", "LINKS_TO");
        let diagram = flow(
            &model,
            &ExportOptions {
                detail: Detail::Low,
                ..Default::default()
            },
        );
        let edges: Vec<&str> = diagram.lines().filter(|l| l.contains("-->")).collect();
        let unique: BTreeSet<&str> = edges.iter().copied().collect();
        assert_eq!(edges.len(), unique.len());
        assert_eq!(edges.len(), 3);
    }

    #[test]
    fn test_packages_one_diagram_per_module_with_frontier() {
        let diagrams = packages(&sample_model(), &ExportOptions::default());
        let names: Vec<&str> = diagrams.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(names, vec!["app", "lib"]);

        let app = &diagrams[0].1;
        // lib is a sibling module, requests is external
        assert!(app.contains("[/\"lib\"/]"));
        assert!(app.contains("([\"requests\"])"));
        assert!(app.contains("-->|1|"));
        // imports inside the same directory are not drawn
        assert_eq!(app.lines().filter(|l| l.contains("-->")).count(), 2);
    }

    #[test]
    fn test_classes_diagram() {
        let diagram = classes(&sample_model(), &ExportOptions::default());
        assert!(diagram.contains("class c_lib_core_py_Engine_3[\"Engine\"]"));
        assert!(diagram.contains("<<lib/core.py>>"));
        let empty = classes(&GraphModel::default(), &ExportOptions::default());
        assert!(empty.contains("No classes"));
    }
}
