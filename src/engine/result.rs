// ABOUTME: Result of a single graph run
// ABOUTME: Records run timing, dispatch waves, and the gathered terminal values

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
    /// Node ids in the order they were dispatched, one entry per wave.
    pub waves: Vec<Vec<String>>,
    /// Gathered results of the sink nodes, keyed by node id.
    pub results: IndexMap<String, Value>,
}

impl RunResult {
    pub fn get(&self, node: &str) -> Option<&Value> {
        self.results.get(node)
    }

    pub fn total_nodes(&self) -> usize {
        self.waves.iter().map(|wave| wave.len()).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_result_accessors() {
        let now = Utc::now();
        let result = RunResult {
            run_id: "run".to_string(),
            started_at: now,
            finished_at: now,
            duration: Duration::from_millis(5),
            waves: vec![vec!["a".to_string()], vec!["b".to_string(), "c".to_string()]],
            results: IndexMap::from([("c".to_string(), json!(1))]),
        };
        assert_eq!(result.total_nodes(), 3);
        assert_eq!(result.get("c"), Some(&json!(1)));
        assert!(result.get("a").is_none());

        let parsed: RunResult = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(parsed.results, result.results);
    }
}
