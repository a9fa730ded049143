//! Graphviz DOT dump of the whole model.

use super::model::{GraphEdge, GraphModel};
use super::{Detail, ExportOptions, IdMap, dedupe_edges};

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn shape(label: &str) -> &'static str {
    match label {
        "Note" => "note",
        "Module" => "ellipse",
        "Tag" => "hexagon",
        "Asset" => "folder",
        "Function" => "plain",
        "Class" => "component",
        _ => "box",
    }
}

/// Every node and relationship, including the symbols each file defines.
///
/// Low detail draws one unlabeled edge per ordered node pair.
pub fn render(model: &GraphModel, options: &ExportOptions) -> String {
    let mut ids = IdMap::new("n");
    let mut out = String::from("digraph vault {\n");
    out.push_str("  rankdir=LR;\n");
    out.push_str("  node [shape=box, fontname=\"Helvetica\"];\n\n");

    for node in model.nodes.values() {
        out.push_str(&format!(
            "  {} [label=\"{}\", shape={}];\n",
            ids.id(&node.key),
            escape(node.display()),
            shape(&node.label)
        ));
    }
    for symbol in model.symbols.values().flatten() {
        out.push_str(&format!(
            "  {} [label=\"{}\", shape={}];\n",
            ids.id(&symbol.key()),
            escape(&symbol.name),
            shape(symbol.kind.as_str())
        ));
    }
    out.push('\n');

    let mut edges = model.edges.clone();
    for symbol in model.symbols.values().flatten() {
        edges.push(GraphEdge {
            from: symbol.file.clone(),
            to: symbol.key(),
            rel: "DEFINES".to_string(),
        });
    }
    for edge in dedupe_edges(&edges, options.detail) {
        let from = ids.id(&edge.from);
        let to = ids.id(&edge.to);
        if options.detail == Detail::Low {
            out.push_str(&format!("  {} -> {};\n", from, to));
        } else {
            out.push_str(&format!("  {} -> {} [label=\"{}\"];\n", from, to, escape(&edge.rel)));
        }
    }
    out.push_str("}\n");
    out
}
