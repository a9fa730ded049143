//! C and C++ structural queries.

pub const C_QUERY: &str = r#"
(function_definition
  declarator: (function_declarator declarator: (identifier) @function))
(function_definition
  declarator: (pointer_declarator
    declarator: (function_declarator declarator: (identifier) @function)))

(struct_specifier name: (type_identifier) @class body: (field_declaration_list))
(union_specifier name: (type_identifier) @class body: (field_declaration_list))
(enum_specifier name: (type_identifier) @class body: (enumerator_list))

(preproc_include path: (_) @import)
"#;

pub const CPP_QUERY: &str = r#"
(function_definition
  declarator: (function_declarator declarator: (_) @function))

(class_specifier name: (type_identifier) @class body: (field_declaration_list))
(struct_specifier name: (type_identifier) @class body: (field_declaration_list))
(enum_specifier name: (type_identifier) @class body: (enumerator_list))

(preproc_include path: (_) @import)
"#;

/// Strip the quotes or angle brackets from an `#include` path.
pub fn normalize_include(text: &str) -> Option<String> {
    let spec = text
        .trim()
        .trim_start_matches(['"', '<'])
        .trim_end_matches(['"', '>'])
        .trim();
    (!spec.is_empty()).then(|| spec.to_string())
}
