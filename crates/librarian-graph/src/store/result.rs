//! Reply decoding for `GRAPH.QUERY`.
//!
//! A reply is `[headers, rows, stats]`, or just `[stats]` for statements
//! that return nothing. Cells holding nodes or relationships arrive as
//! nested key/value pair lists and are flattened into JSON objects:
//!
//! ```text
//! [["id", 3], ["labels", ["Note"]], ["properties", [["path", "a.md"]]]]
//!   => {"_nodeId": 3, "_labels": ["Note"], "path": "a.md"}
//! ```

use serde_json::{Map, Number, Value};

use super::{Result, StoreError};

/// Decoded query reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Raw statistics lines, e.g. `"Nodes created: 1"`.
    pub stats: Vec<String>,
}

impl QueryResult {
    /// Build a result directly. Mostly useful for scripted executors.
    pub fn new(headers: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
            stats: Vec::new(),
        }
    }

    /// Decode a raw Redis reply.
    pub fn from_redis(reply: &redis::Value) -> Result<Self> {
        let parts = match reply {
            redis::Value::Array(parts) => parts,
            other => {
                return Err(StoreError::Protocol(format!(
                    "expected an array reply, got {:?}",
                    other
                )));
            }
        };

        match parts.as_slice() {
            [stats] => Ok(Self {
                stats: string_list(stats),
                ..Default::default()
            }),
            [headers, rows] => Ok(Self {
                headers: header_list(headers),
                rows: row_list(rows),
                stats: Vec::new(),
            }),
            [headers, rows, stats, ..] => Ok(Self {
                headers: header_list(headers),
                rows: row_list(rows),
                stats: string_list(stats),
            }),
            [] => Ok(Self::default()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Index of a named column.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell by row index and column name.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.column(column)?;
        self.rows.get(row)?.get(col)
    }

    /// Every row as a header-keyed object.
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    /// The first cell of the first row as a count. Empty results count zero.
    pub fn count(&self) -> i64 {
        self.rows
            .first()
            .and_then(|row| row.first())
            .and_then(as_count)
            .unwrap_or(0)
    }

    /// A numeric statistic such as `"Nodes deleted"`.
    pub fn stat(&self, name: &str) -> Option<f64> {
        self.stats.iter().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            if key.trim() != name {
                return None;
            }
            value.split_whitespace().next()?.parse().ok()
        })
    }
}

/// Normalize a numeric cell. Aggregates may arrive as integers, floats, or
/// numeric strings depending on the server and the expression.
pub fn as_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.round() as i64))
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// A cell as a string, if it is one.
pub fn as_str(value: &Value) -> Option<&str> {
    value.as_str()
}

/// Recursively convert a Redis value into JSON, flattening node and
/// relationship representations.
pub fn unwrap_value(value: &redis::Value) -> Value {
    match value {
        redis::Value::Nil => Value::Null,
        redis::Value::Int(i) => Value::Number((*i).into()),
        redis::Value::Double(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        redis::Value::Boolean(b) => Value::Bool(*b),
        redis::Value::Okay => Value::String("OK".to_string()),
        redis::Value::SimpleString(s) => Value::String(s.clone()),
        redis::Value::BulkString(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        redis::Value::VerbatimString { text, .. } => Value::String(text.clone()),
        redis::Value::Array(items) | redis::Value::Set(items) => {
            entity(items).unwrap_or_else(|| Value::Array(items.iter().map(unwrap_value).collect()))
        }
        redis::Value::Map(pairs) => Value::Object(
            pairs
                .iter()
                .filter_map(|(k, v)| Some((key_string(k)?, unwrap_value(v))))
                .collect(),
        ),
        _ => Value::Null,
    }
}

/// Keys that mark a pair list as a node or relationship.
const ENTITY_KEYS: &[&str] = &["id", "labels", "properties", "type"];

fn entity(items: &[redis::Value]) -> Option<Value> {
    let pairs = pair_list(items)?;
    if !pairs.iter().any(|(k, _)| ENTITY_KEYS.contains(&k.as_str())) {
        return None;
    }

    let mut map = Map::new();
    for (key, value) in pairs {
        match key.as_str() {
            "id" => {
                map.insert("_nodeId".to_string(), unwrap_value(value));
            }
            "labels" => {
                map.insert("_labels".to_string(), unwrap_value(value));
            }
            "type" => {
                map.insert("_type".to_string(), unwrap_value(value));
            }
            "src_node" => {
                map.insert("_src".to_string(), unwrap_value(value));
            }
            "dest_node" => {
                map.insert("_dst".to_string(), unwrap_value(value));
            }
            "properties" => {
                let props = match value {
                    redis::Value::Array(props) => pair_list(props).unwrap_or_default(),
                    _ => Vec::new(),
                };
                for (name, prop) in props {
                    map.insert(name, unwrap_value(prop));
                }
            }
            other => {
                map.insert(other.to_string(), unwrap_value(value));
            }
        }
    }
    Some(Value::Object(map))
}

/// Interpret `items` as `[[key, value], ...]`.
fn pair_list(items: &[redis::Value]) -> Option<Vec<(String, &redis::Value)>> {
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| match item {
            redis::Value::Array(pair) if pair.len() == 2 => Some((key_string(&pair[0])?, &pair[1])),
            _ => None,
        })
        .collect()
}

fn key_string(value: &redis::Value) -> Option<String> {
    match value {
        redis::Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        redis::Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

fn string_list(value: &redis::Value) -> Vec<String> {
    match value {
        redis::Value::Array(items) => items.iter().filter_map(key_string).collect(),
        _ => Vec::new(),
    }
}

/// Headers are plain strings, or `[type, name]` pairs in compact replies.
fn header_list(value: &redis::Value) -> Vec<String> {
    match value {
        redis::Value::Array(items) => items
            .iter()
            .map(|item| match item {
                redis::Value::Array(pair) => pair.last().and_then(key_string).unwrap_or_default(),
                other => key_string(other).unwrap_or_default(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn row_list(value: &redis::Value) -> Vec<Vec<Value>> {
    match value {
        redis::Value::Array(rows) => rows
            .iter()
            .map(|row| match row {
                redis::Value::Array(cells) => cells.iter().map(unwrap_value).collect(),
                other => vec![unwrap_value(other)],
            })
            .collect(),
        _ => Vec::new(),
    }
}
