//! PlantUML architecture, dependency, and class diagrams.

use std::collections::{BTreeMap, BTreeSet};

use super::model::{GraphModel, GraphNode, SymbolKind, directory, top_level};
use super::{Detail, ExportOptions, IdMap, dedupe_edges};

fn quoted(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "'"))
}

fn header(title: &str) -> String {
    format!("@startuml\ntitle {}\nskinparam shadowing false\n", title.replace('\n', " "))
}

/// Arrow for a relationship type. Imports are dashed, everything else solid.
fn arrow(rel: &str) -> &'static str {
    match rel {
        "IMPORTS" => "..>",
        _ => "-->",
    }
}

fn edge_line(from: &str, to: &str, rel: &str, detail: Detail) -> String {
    if detail == Detail::Low {
        format!("{} {} {}\n", from, arrow(rel), to)
    } else {
        format!("{} {} {} : {}\n", from, arrow(rel), to, rel)
    }
}

fn declare(out: &mut String, ids: &mut IdMap, node: &GraphNode, indent: &str) {
    let keyword = match node.label.as_str() {
        "Module" => "node",
        "Note" => "file",
        "Tag" => "label",
        "Asset" => "artifact",
        _ => "component",
    };
    out.push_str(&format!(
        "{}{} {} as {}\n",
        indent,
        keyword,
        quoted(&node.name),
        ids.id(&node.key)
    ));
}

/// One diagram per top-level package. Each directory inside it is a
/// PlantUML package holding its files; above low detail, the classes a file
/// defines are drawn with containment arrows.
///
/// Returns `(package, diagram)` pairs sorted by package.
pub fn architecture(model: &GraphModel, options: &ExportOptions) -> Vec<(String, String)> {
    let mut packages: BTreeMap<&str, BTreeMap<&str, Vec<&GraphNode>>> = BTreeMap::new();
    for node in model.nodes.values() {
        let Some(path) = node.path.as_deref() else {
            continue;
        };
        packages
            .entry(top_level(path))
            .or_default()
            .entry(directory(path))
            .or_default()
            .push(node);
    }

    packages
        .into_iter()
        .map(|(package, dirs)| {
            let mut ids = IdMap::new("a");
            let mut out = header(&format!("Architecture: {}", package));
            out.push_str("allowmixing\n");
            let mut members: BTreeSet<&str> = BTreeSet::new();

            for (dir, nodes) in &dirs {
                out.push_str(&format!("package {} {{\n", quoted(dir)));
                for node in nodes {
                    members.insert(&node.key);
                    declare(&mut out, &mut ids, node, "  ");
                    if options.detail == Detail::Low {
                        continue;
                    }
                    let path = node.path.as_deref().unwrap_or_default();
                    for symbol in model.symbols_of(path).iter().filter(|s| s.kind == SymbolKind::Class) {
                        out.push_str(&format!(
                            "  class {} as {}\n",
                            quoted(&symbol.name),
                            ids.id(&symbol.key())
                        ));
                    }
                }
                out.push_str("}\n");
            }

            // Targets outside this package, one hop out.
            let edges: Vec<_> = dedupe_edges(&model.edges, options.detail)
                .into_iter()
                .filter(|e| members.contains(e.from.as_str()))
                .collect();
            let mut outside: BTreeSet<&str> = BTreeSet::new();
            for edge in &edges {
                if !members.contains(edge.to.as_str()) && outside.insert(&edge.to) {
                    if let Some(node) = model.node(&edge.to) {
                        declare(&mut out, &mut ids, node, "");
                    }
                }
            }

            if options.detail != Detail::Low {
                for key in &members {
                    for symbol in model.symbols_of(key).iter().filter(|s| s.kind == SymbolKind::Class) {
                        let from = ids.id(key);
                        let to = ids.id(&symbol.key());
                        out.push_str(&format!("{} *-- {}\n", from, to));
                    }
                }
            }
            for edge in edges {
                if model.node(&edge.to).is_none() {
                    continue;
                }
                let from = ids.id(&edge.from);
                let to = ids.id(&edge.to);
                out.push_str(&edge_line(&from, &to, &edge.rel, options.detail));
            }
            out.push_str("@enduml\n");
            (package.to_string(), out)
        })
        .collect()
}

/// Directory-level import dependencies with import counts.
pub fn packages(model: &GraphModel, options: &ExportOptions) -> String {
    let mut ids = IdMap::new("pkg");
    let mut out = header("Package dependencies");

    let mut dirs: BTreeSet<&str> = BTreeSet::new();
    for file in model.files() {
        if let Some(path) = file.path.as_deref() {
            dirs.insert(directory(path));
        }
    }

    let mut externals: BTreeSet<&str> = BTreeSet::new();
    let mut weights: BTreeMap<(String, String), usize> = BTreeMap::new();
    for edge in model.edges.iter().filter(|e| e.rel == "IMPORTS") {
        let (Some(from), Some(to)) = (model.node(&edge.from), model.node(&edge.to)) else {
            continue;
        };
        let Some(from_dir) = from.path.as_deref().map(directory) else {
            continue;
        };
        let to_key = match to.path.as_deref() {
            Some(path) => {
                let dir = directory(path);
                dirs.insert(dir);
                format!("dir:{}", dir)
            }
            None => {
                externals.insert(&to.name);
                format!("ext:{}", to.name)
            }
        };
        if to_key == format!("dir:{}", from_dir) {
            continue;
        }
        *weights.entry((format!("dir:{}", from_dir), to_key)).or_default() += 1;
    }

    for dir in &dirs {
        out.push_str(&format!(
            "package {} as {} {{\n}}\n",
            quoted(dir),
            ids.id(&format!("dir:{}", dir))
        ));
    }
    for name in &externals {
        out.push_str(&format!(
            "node {} as {}\n",
            quoted(name),
            ids.id(&format!("ext:{}", name))
        ));
    }
    for ((from, to), count) in &weights {
        let from = ids.id(from);
        let to = ids.id(to);
        if options.detail == Detail::Low {
            out.push_str(&format!("{} ..> {}\n", from, to));
        } else {
            out.push_str(&format!("{} ..> {} : {}\n", from, to, count));
        }
    }
    out.push_str("@enduml\n");
    out
}

/// Every file-level relationship as a component diagram.
pub fn files(model: &GraphModel, options: &ExportOptions) -> String {
    let mut ids = IdMap::new("f");
    let mut out = header("File dependencies");
    for node in model.nodes.values() {
        let keyword = if node.is_internal() { "component" } else { "node" };
        out.push_str(&format!(
            "{} {} as {}\n",
            keyword,
            quoted(node.display()),
            ids.id(&node.key)
        ));
    }
    for edge in dedupe_edges(&model.edges, options.detail) {
        let from = ids.id(&edge.from);
        let to = ids.id(&edge.to);
        out.push_str(&edge_line(&from, &to, &edge.rel, options.detail));
    }
    out.push_str("@enduml\n");
    out
}

/// Classes grouped by defining file. High detail also lists each file's
/// free functions.
pub fn classes(model: &GraphModel, options: &ExportOptions) -> String {
    let mut ids = IdMap::new("cls");
    let mut out = header("Classes");
    for (file, symbols) in &model.symbols {
        let classes: Vec<_> = symbols.iter().filter(|s| s.kind == SymbolKind::Class).collect();
        let functions: Vec<_> = symbols
            .iter()
            .filter(|s| s.kind == SymbolKind::Function)
            .collect();
        let show_functions = options.detail == Detail::High && !functions.is_empty();
        if classes.is_empty() && !show_functions {
            continue;
        }
        out.push_str(&format!("package {} {{\n", quoted(file)));
        for class in classes {
            out.push_str(&format!("  class {} as {}\n", quoted(&class.name), ids.id(&class.key())));
        }
        if show_functions {
            out.push_str(&format!(
                "  class {} as {} << (M,#DDDDDD) module >> {{\n",
                quoted(file.rsplit('/').next().unwrap_or(file)),
                ids.id(&format!("functions:{}", file))
            ));
            for function in functions {
                out.push_str(&format!("    +{}()\n", function.name));
            }
            out.push_str("  }\n");
        }
        out.push_str("}\n");
    }
    out.push_str("@enduml\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::model::{Symbol, sample_model};

    #[test]
    fn test_architecture_per_package() {
        let diagrams = architecture(&sample_model(), &ExportOptions::default());
        let names: Vec<&str> = diagrams.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(names, vec!["app", "lib"]);

        let app = &diagrams[0].1;
        assert!(app.starts_with("@startuml\n"));
        assert!(app.ends_with("@enduml\n"));
        assert!(app.contains("package \"app\" {"));
        // dashed import arrows, outside targets declared once
        assert!(app.contains("a_app_main_py ..> a_app_util_py : IMPORTS"));
        assert!(app.contains("node \"requests\" as a_Module_requests"));
        assert!(app.contains("component \"core.py\" as a_lib_core_py"));

        let lib = &diagrams[1].1;
        assert!(lib.contains("class \"Engine\""));
        assert!(lib.contains("a_lib_core_py *-- a_lib_core_py_Engine_3"));
    }

    #[test]
    fn test_architecture_low_detail_omits_classes() {
        let options = ExportOptions {
            detail: Detail::Low,
            ..Default::default()
        };
        let diagrams = architecture(&sample_model(), &options);
        assert!(diagrams.iter().all(|(_, d)| !d.contains("*--")));
        assert!(diagrams[0].1.contains("a_app_main_py ..> a_app_util_py\n"));
    }

    #[test]
    fn test_packages_aggregates_imports() {
        let mut model = sample_model();
        model.add_node(GraphNode::new("Code", Some("lib/extra.py"), "extra.py"));
        model.add_edge("app/main.py", "lib/extra.py", "IMPORTS");
        let diagram = packages(&model, &ExportOptions::default());
        assert!(diagram.contains("pkg_dir_app ..> pkg_dir_lib : 2"));
        assert!(diagram.contains("pkg_dir_app ..> pkg_ext_requests : 1"));
        assert!(!diagram.contains("pkg_dir_app ..> pkg_dir_app"));
    }

    #[test]
    fn test_files_diagram_marks_external_nodes() {
        let diagram = files(&sample_model(), &ExportOptions::default());
        assert!(diagram.contains("component \"app/main.py\" as f_app_main_py"));
        assert!(diagram.contains("node \"requests\" as f_Module_requests"));
        assert_eq!(diagram.matches("..>").count(), 3);
    }

    #[test]
    fn test_classes_high_detail_lists_functions() {
        let mut model = sample_model();
        model.add_symbol(Symbol {
            file: "lib/core.py".to_string(),
            name: "boot".to_string(),
            kind: SymbolKind::Function,
            line: 20,
        });
        let medium = classes(&model, &ExportOptions::default());
        assert!(medium.contains("package \"lib/core.py\" {"));
        assert!(!medium.contains("+boot()"));

        let high = classes(
            &model,
            &ExportOptions {
                detail: Detail::High,
                ..Default::default()
            },
        );
        assert!(high.contains("+boot()"));
    }
}
