//! Markdown note extraction: frontmatter, tags, wikilinks, embeds, headings.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::metadata::{Heading, NoteMetadata};

static WIKILINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(!?)\[\[([^\[\]]+?)\]\]").expect("valid wikilink regex"));
static INLINE_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s(\[,;])#([A-Za-z0-9_][A-Za-z0-9_\-/]*)").expect("valid tag regex")
});
static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(#{1,6})[ \t]+(.+?)(?:[ \t]+#+)?[ \t]*$").expect("valid heading regex")
});
static INLINE_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`[^`\n]*`").expect("valid inline code regex"));

/// Parse a note's source into metadata.
///
/// Never fails: malformed frontmatter degrades to an empty map and the body
/// is still scanned.
pub fn parse_note(rel_path: &str, source: &str, modified: DateTime<Utc>) -> NoteMetadata {
    let (yaml, body) = split_frontmatter(source);
    let frontmatter = yaml
        .map(|y| parse_frontmatter(rel_path, y))
        .unwrap_or_default();

    let body = strip_code(body);

    let mut tags = OrderedSet::default();
    for tag in frontmatter_tags(&frontmatter) {
        tags.insert(tag);
    }
    for tag in extract_inline_tags(&body) {
        tags.insert(tag);
    }

    let (wikilinks, embeds) = extract_links(&body);

    NoteMetadata {
        path: rel_path.to_string(),
        name: note_name(rel_path),
        modified,
        tags: tags.into_vec(),
        wikilinks,
        embeds,
        headings: extract_headings(&body),
        frontmatter,
    }
}

/// Note name: the file stem of the path.
pub fn note_name(rel_path: &str) -> String {
    let file = rel_path.rsplit('/').next().unwrap_or(rel_path);
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file.to_string(),
    }
}

/// Split content into (frontmatter yaml, body).
///
/// Frontmatter must open on the first line with `---` and close with a line
/// that is exactly `---` or `...`. Without a closing fence the whole
/// content is body.
fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let Some(rest) = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    else {
        return (None, content);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed == "---" || trimmed == "..." {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(yaml), body);
        }
        offset += line.len();
    }
    (None, content)
}

fn parse_frontmatter(rel_path: &str, yaml: &str) -> BTreeMap<String, serde_json::Value> {
    if yaml.trim().is_empty() {
        return BTreeMap::new();
    }
    let value: serde_yaml::Value = match serde_yaml::from_str(yaml) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("Malformed frontmatter in {}: {}", rel_path, e);
            return BTreeMap::new();
        }
    };
    let serde_yaml::Value::Mapping(mapping) = value else {
        return BTreeMap::new();
    };

    let mut map = BTreeMap::new();
    for (key, value) in mapping {
        let key = match key {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        let json = serde_json::to_value(&value).unwrap_or(serde_json::Value::Null);
        map.insert(key, json);
    }
    map
}

/// Tags declared in frontmatter under `tags` or `tag`, as a list or a
/// comma/space separated string.
fn frontmatter_tags(frontmatter: &BTreeMap<String, serde_json::Value>) -> Vec<String> {
    let mut tags = Vec::new();
    for key in ["tags", "tag"] {
        match frontmatter.get(key) {
            Some(serde_json::Value::Array(items)) => {
                for item in items {
                    let raw = match item {
                        serde_json::Value::String(s) => s.clone(),
                        serde_json::Value::Number(n) => n.to_string(),
                        _ => continue,
                    };
                    tags.extend(clean_tag(&raw));
                }
            }
            Some(serde_json::Value::String(s)) => {
                for raw in s.split(|c: char| c == ',' || c.is_whitespace()) {
                    tags.extend(clean_tag(raw));
                }
            }
            _ => {}
        }
    }
    tags
}

fn clean_tag(raw: &str) -> Option<String> {
    let tag = raw.trim().trim_start_matches('#').trim_end_matches('/');
    (!tag.is_empty()).then(|| tag.to_string())
}

/// Blank out fenced code blocks and inline code spans so their contents
/// never produce tags, links, or headings.
fn strip_code(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut fence: Option<&str> = None;
    for line in body.lines() {
        let trimmed = line.trim_start();
        match fence {
            Some(marker) => {
                if trimmed.starts_with(marker) {
                    fence = None;
                }
            }
            None => {
                if trimmed.starts_with("```") {
                    fence = Some("```");
                } else if trimmed.starts_with("~~~") {
                    fence = Some("~~~");
                } else {
                    out.push_str(&INLINE_CODE_RE.replace_all(line, " "));
                }
            }
        }
        out.push('\n');
    }
    out
}

fn extract_inline_tags(body: &str) -> Vec<String> {
    let mut tags = Vec::new();
    for line in body.lines() {
        for cap in INLINE_TAG_RE.captures_iter(line) {
            let tag = cap[1].trim_end_matches('/');
            if tag.is_empty() || tag.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            tags.push(tag.to_string());
        }
    }
    tags
}

/// Extract wikilink and embed targets, each deduplicated in first-seen order.
///
/// `[[Target|Alias]]` and `![[Target|size]]` keep only `Target`; a
/// `#heading` anchor is dropped from the target.
fn extract_links(body: &str) -> (Vec<String>, Vec<String>) {
    let mut links = OrderedSet::default();
    let mut embeds = OrderedSet::default();
    for cap in WIKILINK_RE.captures_iter(body) {
        let inner = &cap[2];
        let target = inner.split('|').next().unwrap_or(inner);
        let target = target.split('#').next().unwrap_or(target).trim();
        if target.is_empty() {
            continue;
        }
        if &cap[1] == "!" {
            embeds.insert(target.to_string());
        } else {
            links.insert(target.to_string());
        }
    }
    (links.into_vec(), embeds.into_vec())
}

fn extract_headings(body: &str) -> Vec<Heading> {
    body.lines()
        .filter_map(|line| HEADING_RE.captures(line))
        .map(|cap| Heading {
            level: cap[1].len() as u8,
            text: cap[2].trim().to_string(),
        })
        .collect()
}

/// Insertion-ordered set of strings.
#[derive(Default)]
struct OrderedSet {
    seen: HashSet<String>,
    items: Vec<String>,
}

impl OrderedSet {
    fn insert(&mut self, item: String) {
        if self.seen.insert(item.clone()) {
            self.items.push(item);
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.items
    }
}
