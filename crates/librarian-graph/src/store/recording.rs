//! An executor that records statements instead of sending them.
//!
//! Used by `scan --dry-run` and throughout the tests. Replies can be
//! scripted by substring so read helpers can be exercised without a server.

use std::sync::Mutex;

use super::executor::QueryExecutor;
use super::result::QueryResult;
use super::{Result, StoreError};

#[derive(Default)]
pub struct RecordingExecutor {
    statements: Mutex<Vec<String>>,
    responses: Mutex<Vec<(String, QueryResult)>>,
    failures: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `result` to any statement containing `fragment`. The first
    /// registered match wins.
    pub fn respond_when(&self, fragment: impl Into<String>, result: QueryResult) {
        lock(&self.responses).push((fragment.into(), result));
    }

    /// Fail any statement containing `fragment`.
    pub fn fail_when(&self, fragment: impl Into<String>) {
        lock(&self.failures).push(fragment.into());
    }

    /// Every statement executed so far, in order.
    pub fn statements(&self) -> Vec<String> {
        lock(&self.statements).clone()
    }

    /// Statements containing `fragment`.
    pub fn matching(&self, fragment: &str) -> Vec<String> {
        lock(&self.statements)
            .iter()
            .filter(|s| s.contains(fragment))
            .cloned()
            .collect()
    }

    /// Drain the recorded statements.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.statements))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl QueryExecutor for RecordingExecutor {
    fn execute(&self, _graph: &str, query: &str) -> Result<QueryResult> {
        lock(&self.statements).push(query.to_string());

        if lock(&self.failures).iter().any(|f| query.contains(f.as_str())) {
            return Err(StoreError::Query(format!("scripted failure for: {}", query)));
        }
        Ok(lock(&self.responses)
            .iter()
            .find(|(fragment, _)| query.contains(fragment.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_records_and_scripts() {
        let executor = RecordingExecutor::new();
        executor.respond_when("count", QueryResult::new(&["c"], vec![vec![json!(4)]]));
        executor.fail_when("BOOM");

        assert_eq!(executor.execute("g", "RETURN count(*)").unwrap().count(), 4);
        assert!(executor.execute("g", "RETURN 1").unwrap().is_empty());
        assert!(executor.execute("g", "BOOM").is_err());

        assert_eq!(executor.statements().len(), 3);
        assert_eq!(executor.matching("RETURN").len(), 2);
        assert_eq!(executor.take().len(), 3);
        assert!(executor.statements().is_empty());
    }
}
