//! Statement execution against a graph server.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::result::QueryResult;
use super::{Result, StoreError};

/// Executes one Cypher statement against a named graph.
///
/// Implementations must be safe to share between scanner workers and
/// debounced watcher fires.
pub trait QueryExecutor: Send + Sync {
    fn execute(&self, graph: &str, query: &str) -> Result<QueryResult>;

    /// Check that the server is reachable.
    fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Where the graph server listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphAddress {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

impl Default for GraphAddress {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
        }
    }
}

impl GraphAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
        }
    }

    /// Connection URL in the form the `redis` crate expects.
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!("redis://:{}@{}:{}/", password, self.host, self.port),
            None => format!("redis://{}:{}/", self.host, self.port),
        }
    }
}

/// Executor speaking the Redis wire protocol (`GRAPH.QUERY`).
///
/// Statements are serialized over a single connection. A dropped connection
/// is re-established once before the statement is reported as failed.
pub struct RedisExecutor {
    client: redis::Client,
    conn: Mutex<Option<redis::Connection>>,
}

impl RedisExecutor {
    /// Connect and verify the server answers `PING`.
    pub fn connect(address: &GraphAddress) -> Result<Self> {
        Self::open(&address.url())
    }

    /// Connect using a `redis://` URL.
    pub fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection()?;
        let executor = Self {
            client,
            conn: Mutex::new(Some(conn)),
        };
        executor.ping()?;
        Ok(executor)
    }

    fn send(conn: &mut redis::Connection, graph: &str, query: &str) -> redis::RedisResult<redis::Value> {
        redis::cmd("GRAPH.QUERY")
            .arg(graph)
            .arg(query)
            .query::<redis::Value>(conn)
    }
}

impl QueryExecutor for RedisExecutor {
    fn execute(&self, graph: &str, query: &str) -> Result<QueryResult> {
        let mut guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            *guard = Some(self.client.get_connection()?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(StoreError::Protocol("no connection available".to_string()));
        };

        let reply = match Self::send(conn, graph, query) {
            Ok(reply) => reply,
            Err(e) if e.is_io_error() || e.is_connection_dropped() => {
                tracing::warn!("Graph connection lost ({}), reconnecting", e);
                *guard = None;
                let mut conn = self.client.get_connection()?;
                let reply = Self::send(&mut conn, graph, query).map_err(classify)?;
                *guard = Some(conn);
                reply
            }
            Err(e) => return Err(classify(e)),
        };
        QueryResult::from_redis(&reply)
    }

    fn ping(&self) -> Result<()> {
        let mut guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            *guard = Some(self.client.get_connection()?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(StoreError::Protocol("no connection available".to_string()));
        };
        let pong: String = redis::cmd("PING").query(conn)?;
        if pong != "PONG" {
            return Err(StoreError::Protocol(format!("unexpected PING reply '{}'", pong)));
        }
        Ok(())
    }
}

/// Server-side statement errors are query failures; everything else is a
/// transport problem.
fn classify(e: redis::RedisError) -> StoreError {
    if e.kind() == redis::ErrorKind::ResponseError || e.kind() == redis::ErrorKind::ExtensionError {
        StoreError::Query(e.to_string())
    } else {
        StoreError::Connection(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_url() {
        let address = GraphAddress::new("graph.local", 6380);
        assert_eq!(address.url(), "redis://graph.local:6380/");

        let address = GraphAddress {
            password: Some("secret".to_string()),
            ..GraphAddress::default()
        };
        assert_eq!(address.url(), "redis://:secret@127.0.0.1:6379/");
    }

    #[test]
    fn test_connect_refused_is_connection_error() {
        // Port 1 is reserved and never runs a graph server.
        let err = RedisExecutor::connect(&GraphAddress::new("127.0.0.1", 1))
            .err()
            .expect("connect should fail");
        assert!(matches!(err, StoreError::Connection(_)));
    }
}
