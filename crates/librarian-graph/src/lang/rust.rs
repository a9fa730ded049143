//! Rust structural query.

/// Functions (free, associated, trait signatures), type declarations, and
/// `use` / `extern crate` imports.
pub const QUERY: &str = r#"
(function_item name: (identifier) @function)
(function_signature_item name: (identifier) @function)

(struct_item name: (type_identifier) @class)
(enum_item name: (type_identifier) @class)
(union_item name: (type_identifier) @class)
(trait_item name: (type_identifier) @class)
(type_item name: (type_identifier) @class)

(use_declaration argument: (_) @import)
(extern_crate_declaration name: (identifier) @import)
"#;

/// Reduce a `use` argument to its module path.
///
/// `std::collections::{HashMap, HashSet}` becomes `std::collections`,
/// `serde::Serialize as Ser` becomes `serde::Serialize`, and glob imports
/// drop the trailing `::*`.
pub fn normalize_import(text: &str) -> Option<String> {
    let compact: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut spec = compact.as_str();
    if let Some(idx) = spec.find("::{") {
        spec = &spec[..idx];
    }
    if let Some(idx) = spec.find(" as ") {
        spec = &spec[..idx];
    }
    let spec = spec.trim_end_matches("::*").trim();
    if spec.is_empty() || spec.starts_with('{') {
        return None;
    }
    Some(spec.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::grammar_for;
    use crate::parser::Language;

    #[test]
    fn test_normalize_import() {
        assert_eq!(
            normalize_import("std::collections::{HashMap, HashSet}"),
            Some("std::collections".to_string())
        );
        assert_eq!(
            normalize_import("serde::Serialize as Ser"),
            Some("serde::Serialize".to_string())
        );
        assert_eq!(normalize_import("crate::store::*"), Some("crate::store".to_string()));
        assert_eq!(normalize_import("{a, b}"), None);
    }

    #[test]
    fn test_extract_rust_symbols() {
        let source = r#"
use std::path::Path;
use crate::metadata::{SymbolRef, TaskStatus};
extern crate alloc;

pub struct Foo {
    value: i32,
}

enum Mode { A, B }

trait Render {
    fn render(&self) -> String;
}

impl Foo {
    pub fn new(value: i32) -> Self {
        Self { value }
    }
}

fn helper() {}
"#;
        let grammar = grammar_for(Language::Rust).expect("rust grammar");
        let extracted = grammar.extract(source).expect("parse");

        let functions: Vec<_> = extracted.functions.iter().map(|s| s.name.as_str()).collect();
        assert!(functions.contains(&"render"));
        assert!(functions.contains(&"new"));
        assert!(functions.contains(&"helper"));

        let mut classes: Vec<_> = extracted.classes.iter().map(|s| s.name.as_str()).collect();
        classes.sort();
        assert_eq!(classes, vec!["Foo", "Mode", "Render"]);

        let foo = extracted.classes.iter().find(|s| s.name == "Foo").unwrap();
        assert_eq!(foo.line, 6);

        let mut imports: Vec<_> = extracted.imports.iter().map(|s| s.name.as_str()).collect();
        imports.sort();
        assert_eq!(imports, vec!["alloc", "crate::metadata", "std::path::Path"]);
    }
}
