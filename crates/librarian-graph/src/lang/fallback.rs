//! Regex extraction for languages without a grammar.
//!
//! Each language gets a small set of line-anchored patterns whose first
//! capture group is the symbol or import specifier. The result has the same
//! shape as grammar extraction so callers never need to know which path ran.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::Extracted;
use crate::metadata::SymbolRef;
use crate::parser::Language;

/// Control-flow words that look like calls to the looser patterns.
const KEYWORDS: &[&str] = &[
    "if", "else", "for", "foreach", "while", "switch", "case", "return", "catch", "sizeof", "new",
    "do", "function", "throw", "elif", "until",
];

struct Patterns {
    functions: Vec<Regex>,
    classes: Vec<Regex>,
    imports: Vec<Regex>,
    comment_prefixes: &'static [&'static str],
}

impl Patterns {
    fn new(
        functions: &[&str],
        classes: &[&str],
        imports: &[&str],
        comment_prefixes: &'static [&'static str],
    ) -> Self {
        Self {
            functions: compile(functions),
            classes: compile(classes),
            imports: compile(imports),
            comment_prefixes,
        }
    }

    fn is_comment(&self, trimmed: &str) -> bool {
        self.comment_prefixes.iter().any(|p| trimmed.starts_with(p))
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("valid fallback regex"))
        .collect()
}

const SLASH_COMMENTS: &[&str] = &["//", "/*", "* ", "*/"];
const HASH_COMMENTS: &[&str] = &["#"];
const LUA_COMMENTS: &[&str] = &["--"];

static PATTERNS: LazyLock<HashMap<Language, Patterns>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    map.insert(
        Language::Rust,
        Patterns::new(
            &[r#"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:default\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+([A-Za-z_]\w*)"#],
            &[r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait|union|type)\s+([A-Za-z_]\w*)"],
            &[
                r"^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+((?:::)?[\w]+(?:::[\w]+)*)",
                r"^\s*extern\s+crate\s+(\w+)",
            ],
            SLASH_COMMENTS,
        ),
    );

    map.insert(
        Language::Python,
        Patterns::new(
            &[r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)"],
            &[r"^\s*class\s+([A-Za-z_]\w*)"],
            &[
                r"^\s*import\s+([\w.]+)",
                r"^\s*from\s+(\.*[\w.]*)\s+import\b",
            ],
            HASH_COMMENTS,
        ),
    );

    let c_functions = [r"^\s*(?:[\w*&:<>,]+\s+)+[*&]*([A-Za-z_][\w:~]*)\s*\([^;]*$"];
    let c_imports = [r#"^\s*#\s*include\s*[<"]([^>"]+)[>"]"#];
    map.insert(
        Language::C,
        Patterns::new(
            &c_functions,
            &[r"^\s*(?:typedef\s+)?(?:struct|union|enum)\s+([A-Za-z_]\w*)\s*\{?\s*$"],
            &c_imports,
            SLASH_COMMENTS,
        ),
    );
    map.insert(
        Language::Cpp,
        Patterns::new(
            &c_functions,
            &[r"^\s*(?:template\s*<[^>]*>\s*)?(?:typedef\s+)?(?:class|struct|union|enum(?:\s+class)?)\s+([A-Za-z_]\w*)\s*(?:final\s*)?(?:[:{]|$)"],
            &c_imports,
            SLASH_COMMENTS,
        ),
    );

    map.insert(
        Language::Go,
        Patterns::new(
            &[r"^\s*func\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)\s*[\[(]"],
            &[r"^\s*type\s+([A-Za-z_]\w*)\s+(?:struct|interface)\b"],
            &[r#"^\s*import\s+(?:[A-Za-z_.]\w*\s+)?"([^"]+)""#],
            SLASH_COMMENTS,
        ),
    );

    let js_functions = [
        r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)",
        r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*(?::[^=]+)?=>|[A-Za-z_$][\w$]*\s*=>)",
    ];
    let js_imports = [
        r#"^\s*import\s+(?:[^'"]*?\s+from\s+)?['"]([^'"]+)['"]"#,
        r#"^[^'"{]*\}\s*from\s+['"]([^'"]+)['"]"#,
        r#"^\s*export\s+[^'"]*?\bfrom\s+['"]([^'"]+)['"]"#,
        r#"\brequire\(\s*['"]([^'"]+)['"]\s*\)"#,
    ];
    map.insert(
        Language::JavaScript,
        Patterns::new(
            &js_functions,
            &[r"^\s*(?:export\s+)?(?:default\s+)?class\s+([A-Za-z_$][\w$]*)"],
            &js_imports,
            SLASH_COMMENTS,
        ),
    );
    map.insert(
        Language::TypeScript,
        Patterns::new(
            &js_functions,
            &[
                r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)",
                r"^\s*(?:export\s+)?(?:declare\s+)?(?:interface|enum)\s+([A-Za-z_$][\w$]*)",
                r"^\s*(?:export\s+)?type\s+([A-Za-z_$][\w$]*)\s*(?:<[^>]*>)?\s*=",
            ],
            &js_imports,
            SLASH_COMMENTS,
        ),
    );

    map.insert(
        Language::Java,
        Patterns::new(
            &[r"^\s*(?:(?:public|private|protected|static|final|abstract|synchronized|native|default)\s+)*(?:<[^>]+>\s+)?[\w<>\[\],.?]+\s+([a-zA-Z_]\w*)\s*\([^;]*$"],
            &[r"^\s*(?:(?:public|private|protected|static|final|abstract|sealed)\s+)*(?:class|interface|enum|record|@interface)\s+([A-Za-z_]\w*)"],
            &[r"^\s*import\s+(?:static\s+)?([\w.]+(?:\.\*)?)\s*;"],
            SLASH_COMMENTS,
        ),
    );

    map.insert(
        Language::Kotlin,
        Patterns::new(
            &[r"^\s*(?:(?:private|public|internal|protected|override|suspend|inline|open|abstract|operator|infix|tailrec)\s+)*fun\s+(?:<[^>]+>\s*)?(?:[\w.]+\.)?([A-Za-z_]\w*)\s*\("],
            &[r"^\s*(?:(?:data|sealed|abstract|open|enum|inner|private|public|internal|annotation|value)\s+)*(?:class|interface|object)\s+([A-Za-z_]\w*)"],
            &[r"^\s*import\s+([\w.]+)"],
            SLASH_COMMENTS,
        ),
    );

    map.insert(
        Language::Ruby,
        Patterns::new(
            &[r"^\s*def\s+(?:self\.)?([A-Za-z_]\w*[?!=]?)"],
            &[r"^\s*(?:class|module)\s+([A-Z]\w*(?:::[A-Z]\w*)*)"],
            &[r#"^\s*require(?:_relative)?\s*\(?\s*['"]([^'"]+)['"]"#],
            HASH_COMMENTS,
        ),
    );

    map.insert(
        Language::Php,
        Patterns::new(
            &[r"^\s*(?:(?:public|private|protected|static|final|abstract)\s+)*function\s+&?([A-Za-z_]\w*)"],
            &[r"^\s*(?:(?:abstract|final|readonly)\s+)*(?:class|interface|trait|enum)\s+([A-Za-z_]\w*)"],
            &[
                r"^\s*use\s+\\?([\w\\]+)",
                r#"^\s*(?:require|include)(?:_once)?\s*\(?\s*['"]([^'"]+)['"]"#,
            ],
            &["//", "#", "/*", "* ", "*/"],
        ),
    );

    map.insert(
        Language::CSharp,
        Patterns::new(
            &[r"^\s*(?:(?:public|private|protected|internal|static|virtual|override|abstract|sealed|async|extern|unsafe|new|partial)\s+)+[\w<>\[\],.?]+\s+([A-Za-z_]\w*)\s*(?:<[^>]*>)?\s*\([^;]*$"],
            &[r"^\s*(?:(?:public|private|protected|internal|static|abstract|sealed|partial|readonly)\s+)*(?:class|interface|struct|enum|record)\s+([A-Za-z_]\w*)"],
            &[r"^\s*using\s+(?:static\s+)?([\w.]+)\s*;"],
            SLASH_COMMENTS,
        ),
    );

    map.insert(
        Language::Swift,
        Patterns::new(
            &[r"^\s*(?:(?:public|private|internal|fileprivate|open|static|class|override|mutating|final|@\w+)\s+)*func\s+([A-Za-z_]\w*)"],
            &[r"^\s*(?:(?:public|private|internal|fileprivate|open|final)\s+)*(?:class|struct|enum|protocol|extension|actor)\s+([A-Za-z_]\w*)"],
            &[r"^\s*import\s+(?:\w+\s+)?([\w.]+)"],
            SLASH_COMMENTS,
        ),
    );

    map.insert(
        Language::Scala,
        Patterns::new(
            &[r"^\s*(?:(?:private|protected|override|final|implicit|lazy)\s+)*def\s+([A-Za-z_]\w*)"],
            &[r"^\s*(?:(?:abstract|final|sealed|private|protected)\s+)*(?:case\s+)?(?:class|object|trait)\s+([A-Za-z_]\w*)"],
            &[r"^\s*import\s+([\w.]+)"],
            SLASH_COMMENTS,
        ),
    );

    map.insert(
        Language::Shell,
        Patterns::new(
            &[
                r"^\s*function\s+([A-Za-z_][\w-]*)",
                r"^\s*([A-Za-z_][\w-]*)\s*\(\s*\)",
            ],
            &[],
            &[r#"^\s*(?:source|\.)\s+['"]?([^'"\s;]+)"#],
            HASH_COMMENTS,
        ),
    );

    map.insert(
        Language::Lua,
        Patterns::new(
            &[
                r"^\s*(?:local\s+)?function\s+([A-Za-z_][\w.:]*)",
                r"^\s*(?:local\s+)?([A-Za-z_][\w.]*)\s*=\s*function\b",
            ],
            &[],
            &[r#"\brequire\s*\(?\s*['"]([^'"]+)['"]"#],
            LUA_COMMENTS,
        ),
    );

    map
});

/// Catch-all for languages outside the table.
static GENERIC: LazyLock<Patterns> = LazyLock::new(|| {
    Patterns::new(
        &[r"^\s*(?:(?:pub|export|public|private|static|async|local)\s+)*(?:def|fn|func|function|fun|sub|proc)\s+([A-Za-z_][\w.]*)"],
        &[r"^\s*(?:(?:pub|export|public|abstract)\s+)*(?:class|struct|interface|trait|module)\s+([A-Za-z_]\w*)"],
        &[r#"^\s*(?:import|use|require|include)\s+['"<]?([\w./:@-]+)"#],
        &["//", "/*", "* "],
    )
});

/// Extract symbols from `source` with the regex set for `language`.
pub fn extract(source: &str, language: Language) -> Extracted {
    let patterns = PATTERNS.get(&language).unwrap_or(&*GENERIC);
    let mut extracted = Extracted::default();
    let mut in_go_import_block = false;

    for (idx, line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim_start();

        if language == Language::Go {
            if in_go_import_block {
                if trimmed.starts_with(')') {
                    in_go_import_block = false;
                } else if let Some(spec) = go_block_import(trimmed) {
                    extracted.imports.push(SymbolRef::new(spec, line_no));
                }
                continue;
            }
            if trimmed.starts_with("import (") || trimmed == "import(" {
                in_go_import_block = true;
                continue;
            }
        }

        if trimmed.is_empty() || patterns.is_comment(trimmed) {
            continue;
        }

        if let Some(name) = first_capture(&patterns.functions, line) {
            extracted.functions.push(SymbolRef::new(name, line_no));
        }
        if let Some(name) = first_capture(&patterns.classes, line) {
            extracted.classes.push(SymbolRef::new(name, line_no));
        }
        let first_import = extracted.imports.len();
        for re in &patterns.imports {
            for cap in re.captures_iter(line) {
                let Some(spec) = cap.get(1).map(|m| m.as_str()).filter(|s| !s.is_empty()) else {
                    continue;
                };
                // Several patterns can match the same statement.
                if extracted.imports[first_import..].iter().any(|i| i.name == spec) {
                    continue;
                }
                extracted.imports.push(SymbolRef::new(spec, line_no));
            }
        }
    }
    extracted
}

fn first_capture<'a>(patterns: &[Regex], line: &'a str) -> Option<&'a str> {
    patterns.iter().find_map(|re| {
        let name = re.captures(line)?.get(1)?.as_str();
        (!KEYWORDS.contains(&name)).then_some(name)
    })
}

/// An import line inside a Go `import ( ... )` block: `"fmt"` or `alias "x/y"`.
fn go_block_import(trimmed: &str) -> Option<&str> {
    let start = trimmed.find('"')? + 1;
    let len = trimmed[start..].find('"')?;
    let spec = &trimmed[start..start + len];
    (!spec.is_empty()).then_some(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(symbols: &[SymbolRef]) -> Vec<&str> {
        symbols.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_go_import_block_and_receivers() {
        let source = r#"package main

import (
	"fmt"
	str "strings"
)
import "os"

type Server struct {
	addr string
}

func (s *Server) Start() error {
	return nil
}

func main() {
	fmt.Println("hi")
}
"#;
        let extracted = extract(source, Language::Go);
        assert_eq!(names(&extracted.imports), vec!["fmt", "strings", "os"]);
        assert_eq!(names(&extracted.classes), vec!["Server"]);
        assert_eq!(names(&extracted.functions), vec!["Start", "main"]);
        assert_eq!(extracted.functions[0].line, 13);
    }

    #[test]
    fn test_javascript_functions_and_imports() {
        let source = r#"import React from 'react';
import { a,
  b } from './util';
const lodash = require("lodash");

export default class App {}

export async function load(id) {}
const handler = async (event) => {};
// function commented() {}
"#;
        let extracted = extract(source, Language::JavaScript);
        assert_eq!(names(&extracted.imports), vec!["react", "./util", "lodash"]);
        assert_eq!(names(&extracted.classes), vec!["App"]);
        assert_eq!(names(&extracted.functions), vec!["load", "handler"]);
    }

    #[test]
    fn test_keywords_are_not_functions() {
        let source = "public class Foo {\n    public void run() {\n        } else if (x) {\n    }\n}\n";
        let extracted = extract(source, Language::Java);
        assert_eq!(names(&extracted.functions), vec!["run"]);
        assert_eq!(names(&extracted.classes), vec!["Foo"]);
    }

    #[test]
    fn test_ruby_symbols() {
        let source = "require 'json'\nmodule Billing\n  class Invoice\n    def self.build\n    end\n    def paid?\n    end\n  end\nend\n";
        let extracted = extract(source, Language::Ruby);
        assert_eq!(names(&extracted.imports), vec!["json"]);
        assert_eq!(names(&extracted.classes), vec!["Billing", "Invoice"]);
        assert_eq!(names(&extracted.functions), vec!["build", "paid?"]);
    }

    #[test]
    fn test_generic_fallback() {
        let extracted = extract("const std = @import(\"std\");\npub fn main() void {}\n", Language::Unknown);
        assert_eq!(names(&extracted.functions), vec!["main"]);
        assert_eq!(extracted.functions[0].line, 2);
    }

    #[test]
    fn test_fallback_for_grammar_languages() {
        let extracted = extract("use std::fmt;\npub struct Foo;\npub(crate) async fn go() {}\n", Language::Rust);
        assert_eq!(names(&extracted.imports), vec!["std::fmt"]);
        assert_eq!(names(&extracted.classes), vec!["Foo"]);
        assert_eq!(names(&extracted.functions), vec!["go"]);
    }
}
