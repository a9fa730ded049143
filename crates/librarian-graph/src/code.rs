//! Source code extraction: symbols, imports, and task comments.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::lang::{self, Extracted, fallback};
use crate::metadata::{CodeMetadata, SymbolRef, TaskComment, TaskStatus};
use crate::parser::{Language, file_name};

/// A task marker introduced by `//`, `#`, `<!--`, `/*` or a block comment
/// continuation `*`, optionally followed by `(owner)` and `:`.
static TASK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|\s)(?://+!?|#+|<!--|/\*+!?|\*+)\s*(TODO|FIXME|NOTE|XXX)\b(?:\([^)]*\))?[:\s]*(.*)$",
    )
    .expect("valid task regex")
});

/// Extract code metadata from `source`.
///
/// Uses the language's grammar when one is registered and falls back to
/// regex extraction otherwise. Never fails.
pub fn extract(rel_path: &str, source: &str, language: Language) -> CodeMetadata {
    let extracted = lang::grammar_for(language)
        .and_then(|grammar| grammar.extract(source))
        .unwrap_or_else(|| {
            tracing::trace!("Regex extraction for {} ({})", rel_path, language.name());
            fallback::extract(source, language)
        });

    let Extracted {
        functions,
        classes,
        mut imports,
    } = extracted;

    imports.sort_by_key(|i| i.line);
    let mut seen = HashSet::new();
    let imports = imports
        .into_iter()
        .map(|i| i.name)
        .filter(|name| seen.insert(name.clone()))
        .collect();

    CodeMetadata {
        path: rel_path.to_string(),
        name: file_name(rel_path),
        language: language.name().to_string(),
        functions: normalize_symbols(functions),
        classes: normalize_symbols(classes),
        imports,
        tasks: extract_tasks(source),
    }
}

/// Find TODO/FIXME/NOTE/XXX comments. At most one task per line.
pub fn extract_tasks(source: &str) -> Vec<TaskComment> {
    source
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let cap = TASK_RE.captures(line)?;
            let status = TaskStatus::from_marker(&cap[1])?;
            let text = cap[2]
                .trim()
                .trim_end_matches("-->")
                .trim_end_matches("*/")
                .trim()
                .to_string();
            Some(TaskComment {
                status,
                text,
                line: idx + 1,
            })
        })
        .collect()
}

/// Sort by line and drop exact (name, line) duplicates.
fn normalize_symbols(mut symbols: Vec<SymbolRef>) -> Vec<SymbolRef> {
    symbols.sort_by(|a, b| a.line.cmp(&b.line).then_with(|| a.name.cmp(&b.name)));
    symbols.dedup();
    symbols
}
