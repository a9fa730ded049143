//! Python structural query.

pub const QUERY: &str = r#"
(function_definition name: (identifier) @function)
(class_definition name: (identifier) @class)

(import_statement name: (dotted_name) @import)
(import_statement name: (aliased_import name: (dotted_name) @import))
(import_from_statement module_name: (_) @import)
"#;

/// Python import specifiers are already dotted module paths.
pub fn normalize_import(text: &str) -> Option<String> {
    let spec = text.trim();
    (!spec.is_empty()).then(|| spec.to_string())
}

#[cfg(test)]
mod tests {
    use crate::lang::grammar_for;
    use crate::parser::Language;

    #[test]
    fn test_extract_python_symbols() {
        let source = r#"import os.path
import numpy as np
from typing import List
from . import sibling

class Greeter:
    def greet(self, name):
        return f"Hello, {name}!"

async def main():
    pass
"#;
        let grammar = grammar_for(Language::Python).expect("python grammar");
        let extracted = grammar.extract(source).expect("parse");

        let functions: Vec<_> = extracted
            .functions
            .iter()
            .map(|s| (s.name.as_str(), s.line))
            .collect();
        assert_eq!(functions, vec![("greet", 7), ("main", 10)]);

        let classes: Vec<_> = extracted.classes.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(classes, vec!["Greeter"]);

        let imports: Vec<_> = extracted.imports.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(imports, vec!["os.path", "numpy", "typing", "."]);
    }
}
