//! Cypher literal rendering.
//!
//! Every value that reaches a statement goes through [`Param::render`] or
//! [`quote`]. Strings are emitted as single-quoted literals with quotes,
//! backslashes, and control characters escaped, so file-derived text can
//! never terminate the literal early.

use super::{Result, StoreError};

/// Escape a string for use inside a single-quoted Cypher literal.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

/// Render `s` as a quoted literal.
pub fn quote(s: &str) -> String {
    format!("'{}'", escape(s))
}

/// Returns true for names usable as parameter names or map keys unquoted.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A value bound to a query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Param>),
    Map(Vec<(String, Param)>),
}

impl Param {
    /// Render as a Cypher literal.
    pub fn render(&self) -> String {
        match self {
            Param::Null => "null".to_string(),
            Param::Bool(b) => b.to_string(),
            Param::Int(i) => i.to_string(),
            Param::Float(f) if f.is_finite() => {
                let s = f.to_string();
                if s.contains(['.', 'e', 'E']) { s } else { format!("{}.0", s) }
            }
            Param::Float(_) => "null".to_string(),
            Param::Str(s) => quote(s),
            Param::List(items) => {
                let items: Vec<String> = items.iter().map(Param::render).collect();
                format!("[{}]", items.join(", "))
            }
            Param::Map(entries) => {
                let entries: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", map_key(k), v.render()))
                    .collect();
                format!("{{{}}}", entries.join(", "))
            }
        }
    }

    /// A list of strings.
    pub fn strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Param::List(items.into_iter().map(|s| Param::Str(s.into())).collect())
    }
}

fn map_key(key: &str) -> String {
    if is_identifier(key) {
        key.to_string()
    } else {
        format!("`{}`", key.replace('`', "``"))
    }
}

impl From<&str> for Param {
    fn from(s: &str) -> Self {
        Param::Str(s.to_string())
    }
}

impl From<String> for Param {
    fn from(s: String) -> Self {
        Param::Str(s)
    }
}

impl From<&String> for Param {
    fn from(s: &String) -> Self {
        Param::Str(s.clone())
    }
}

impl From<bool> for Param {
    fn from(b: bool) -> Self {
        Param::Bool(b)
    }
}

impl From<i64> for Param {
    fn from(i: i64) -> Self {
        Param::Int(i)
    }
}

impl From<usize> for Param {
    fn from(u: usize) -> Self {
        Param::Int(i64::try_from(u).unwrap_or(i64::MAX))
    }
}

impl From<u64> for Param {
    fn from(u: u64) -> Self {
        Param::Int(i64::try_from(u).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Param {
    fn from(f: f64) -> Self {
        Param::Float(f)
    }
}

impl From<&[String]> for Param {
    fn from(items: &[String]) -> Self {
        Param::strings(items.iter().cloned())
    }
}

impl From<Vec<String>> for Param {
    fn from(items: Vec<String>) -> Self {
        Param::strings(items)
    }
}

/// Prefix `query` with a `CYPHER name=value ...` parameter header.
pub fn with_params(query: &str, params: &[(&str, Param)]) -> Result<String> {
    if params.is_empty() {
        return Ok(query.to_string());
    }
    let mut header = String::from("CYPHER");
    for (name, value) in params {
        if !is_identifier(name) {
            return Err(StoreError::Query(format!("invalid parameter name '{}'", name)));
        }
        header.push(' ');
        header.push_str(name);
        header.push('=');
        header.push_str(&value.render());
    }
    Ok(format!("{} {}", header, query))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_breakout_attempts() {
        assert_eq!(escape("it's"), "it\\'s");
        assert_eq!(escape(r"C:\notes"), r"C:\\notes");
        assert_eq!(escape("a\"b"), "a\\\"b");
        assert_eq!(escape("line\nnext\ttab\r"), "line\\nnext\\ttab\\r");
        assert_eq!(escape("nul\0byte"), "nulbyte");
        assert_eq!(quote("x' OR 1=1 //"), "'x\\' OR 1=1 //'");
    }

    #[test]
    fn test_escaped_literal_has_no_unescaped_quote() {
        let hostile = "a'}) DETACH DELETE n //\\'";
        let literal = quote(hostile);
        let inner = &literal[1..literal.len() - 1];
        let mut escaped = false;
        for c in inner.chars() {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else {
                assert_ne!(c, '\'', "unescaped quote in {}", literal);
            }
        }
        assert!(!escaped);
    }

    #[test]
    fn test_render_values() {
        assert_eq!(Param::from("a").render(), "'a'");
        assert_eq!(Param::from(3usize).render(), "3");
        assert_eq!(Param::Float(2.0).render(), "2.0");
        assert_eq!(Param::Float(f64::NAN).render(), "null");
        assert_eq!(Param::strings(["x", "y'z"]).render(), "['x', 'y\\'z']");
        let map = Param::Map(vec![
            ("name".to_string(), Param::from("main")),
            ("line".to_string(), Param::Int(4)),
            ("odd key".to_string(), Param::Null),
        ]);
        assert_eq!(map.render(), "{name: 'main', line: 4, `odd key`: null}");
    }

    #[test]
    fn test_with_params() {
        let q = with_params(
            "MATCH (n:Note {path: $path}) RETURN n",
            &[("path", Param::from("a/b.md"))],
        )
        .unwrap();
        assert_eq!(q, "CYPHER path='a/b.md' MATCH (n:Note {path: $path}) RETURN n");

        assert_eq!(with_params("RETURN 1", &[]).unwrap(), "RETURN 1");
        assert!(with_params("RETURN 1", &[("bad name", Param::Null)]).is_err());
    }
}
