//! Language grammar registry.
//!
//! Languages with a tree-sitter grammar register a structural query that
//! captures `@function`, `@class`, and `@import` nodes. Everything else goes
//! through [`fallback`], which produces the same shape of result from regexes.

pub mod cfamily;
pub mod fallback;
pub mod python;
pub mod rust;

use std::collections::HashMap;
use std::sync::{LazyLock, OnceLock};

use streaming_iterator::StreamingIterator;
use tree_sitter::{Query, QueryCursor};

use crate::metadata::SymbolRef;
use crate::parser::Language;

/// Symbols and imports pulled out of one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub functions: Vec<SymbolRef>,
    pub classes: Vec<SymbolRef>,
    /// Import specifiers with their 1-based line.
    pub imports: Vec<SymbolRef>,
}

/// A compiled grammar: tree-sitter language plus its structural query.
pub struct Grammar {
    pub language: tree_sitter::Language,
    pub query: Query,
    normalize_import: fn(&str) -> Option<String>,
}

impl Grammar {
    fn compile(lang: Language) -> Option<Self> {
        let (language, source, normalize_import): (tree_sitter::Language, &str, fn(&str) -> Option<String>) =
            match lang {
                Language::Rust => (
                    tree_sitter_rust::LANGUAGE.into(),
                    rust::QUERY,
                    rust::normalize_import,
                ),
                Language::Python => (
                    tree_sitter_python::LANGUAGE.into(),
                    python::QUERY,
                    python::normalize_import,
                ),
                Language::C => (
                    tree_sitter_c::LANGUAGE.into(),
                    cfamily::C_QUERY,
                    cfamily::normalize_include,
                ),
                Language::Cpp => (
                    tree_sitter_cpp::LANGUAGE.into(),
                    cfamily::CPP_QUERY,
                    cfamily::normalize_include,
                ),
                _ => return None,
            };

        match Query::new(&language, source) {
            Ok(query) => Some(Self {
                language,
                query,
                normalize_import,
            }),
            Err(e) => {
                tracing::warn!(
                    "Grammar query for {} failed to compile, using regex extraction: {}",
                    lang.name(),
                    e
                );
                None
            }
        }
    }

    /// Run the structural query over `source`.
    ///
    /// Returns `None` if tree-sitter cannot produce a tree, in which case the
    /// caller falls back to regex extraction.
    pub fn extract(&self, source: &str) -> Option<Extracted> {
        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&self.language).ok()?;
        let tree = parser.parse(source, None)?;

        let source_bytes = source.as_bytes();
        let capture_names = self.query.capture_names();
        let mut extracted = Extracted::default();

        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.query, tree.root_node(), source_bytes);
        while let Some(match_) = matches.next() {
            for capture in match_.captures {
                let node = capture.node;
                let text = node.utf8_text(source_bytes).unwrap_or("").trim();
                if text.is_empty() {
                    continue;
                }
                let line = node.start_position().row + 1;
                match capture_names[capture.index as usize] {
                    "function" => extracted.functions.push(SymbolRef::new(text, line)),
                    "class" => extracted.classes.push(SymbolRef::new(text, line)),
                    "import" => {
                        if let Some(spec) = (self.normalize_import)(text) {
                            extracted.imports.push(SymbolRef::new(spec, line));
                        }
                    }
                    _ => {}
                }
            }
        }
        Some(extracted)
    }
}

/// A grammar compiled on first use.
struct LazyGrammar {
    language: Language,
    grammar: OnceLock<Option<Grammar>>,
}

impl LazyGrammar {
    fn new(language: Language) -> Self {
        Self {
            language,
            grammar: OnceLock::new(),
        }
    }

    fn get(&self) -> Option<&Grammar> {
        self.grammar
            .get_or_init(|| Grammar::compile(self.language))
            .as_ref()
    }
}

static REGISTRY: LazyLock<HashMap<Language, LazyGrammar>> = LazyLock::new(|| {
    [Language::Rust, Language::Python, Language::C, Language::Cpp]
        .into_iter()
        .map(|lang| (lang, LazyGrammar::new(lang)))
        .collect()
});

/// Look up the grammar for a language. `None` means "use the regex fallback".
pub fn grammar_for(language: Language) -> Option<&'static Grammar> {
    REGISTRY.get(&language).and_then(LazyGrammar::get)
}

/// Returns true if a grammar is registered and compiles.
pub fn has_grammar(language: Language) -> bool {
    grammar_for(language).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registered_grammars_compile() {
        for lang in [Language::Rust, Language::Python, Language::C, Language::Cpp] {
            assert!(has_grammar(lang), "{} grammar should compile", lang.name());
        }
    }

    #[test]
    fn test_unregistered_languages_have_no_grammar() {
        assert!(grammar_for(Language::Go).is_none());
        assert!(grammar_for(Language::Unknown).is_none());
    }
}
