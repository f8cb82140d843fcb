use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

/// One section of an outline: ordered key/value settings.
pub type Section = serde_json::Map<String, Value>;

/// Keyword arguments handed to an algorithm.
pub type ParameterMap = serde_json::Map<String, Value>;

/// Unique identifier for a summary run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How many times a component's algorithm runs per execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iterations {
    Count(u64),
    /// Runs until the algorithm halts, the run is cancelled, or the
    /// project's iteration limit is reached.
    Infinite,
}

impl Iterations {
    /// Parse an outline value: a non-negative integer, a numeric string, or "infinite".
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_u64().map(Self::Count),
            Value::String(text) => text.parse().ok(),
            _ => None,
        }
    }

    /// Whether another iteration may start after `completed` iterations.
    pub fn allows(&self, completed: u64) -> bool {
        match self {
            Self::Count(count) => completed < *count,
            Self::Infinite => true,
        }
    }
}

impl Default for Iterations {
    fn default() -> Self {
        Self::Count(1)
    }
}

impl FromStr for Iterations {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("infinite") {
            return Ok(Self::Infinite);
        }
        trimmed.parse().map(Self::Count)
    }
}

impl std::fmt::Display for Iterations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count(count) => write!(f, "{}", count),
            Self::Infinite => write!(f, "infinite"),
        }
    }
}

/// A stage in the life of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Settings,
    Workflow,
    Summary,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Settings, Stage::Workflow, Stage::Summary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Settings => "settings",
            Self::Workflow => "workflow",
            Self::Summary => "summary",
        }
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| s.to_string())
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an algorithm wants to happen after one iteration
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Feed the value into the next iteration.
    Continue(Value),
    /// Stop iterating and return the value.
    Halt(Value),
}

impl Flow {
    pub fn into_value(self) -> Value {
        match self {
            Self::Continue(value) | Self::Halt(value) => value,
        }
    }
}

/// Status of a single executed path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum PathStatus {
    Pending,
    Completed,
    Failed(String),
    Cancelled,
}

/// Output of one node along a path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub node: String,
    pub value: Value,
}

/// Record of one path's execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    pub name: String,
    pub path: Vec<String>,
    pub status: PathStatus,
    pub outcomes: Vec<Outcome>,
    /// Nodes with no matching component.
    pub skipped: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PathResult {
    pub fn new(name: impl Into<String>, path: Vec<String>) -> Self {
        Self {
            name: name.into(),
            path,
            status: PathStatus::Pending,
            outcomes: Vec::new(),
            skipped: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn record(&mut self, node: impl Into<String>, value: Value) {
        self.outcomes.push(Outcome {
            node: node.into(),
            value,
        });
    }

    pub fn skip(&mut self, node: impl Into<String>) {
        self.skipped.push(node.into());
    }

    /// The last value produced on this path
    pub fn output(&self) -> Option<&Value> {
        self.outcomes.last().map(|outcome| &outcome.value)
    }

    pub fn finish(&mut self, status: PathStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}

/// Ordered collection of path results from one workflow execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub id: RunId,
    pub prefix: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub results: IndexMap<String, PathResult>,
}

impl Summary {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            id: RunId::new(),
            prefix: prefix.into(),
            started_at: Utc::now(),
            completed_at: None,
            results: IndexMap::new(),
        }
    }

    /// Key for the next result: `<prefix>_<ordinal>`, counting from 1.
    pub fn next_name(&self) -> String {
        format!("{}_{}", self.prefix, self.results.len() + 1)
    }

    pub fn insert(&mut self, result: PathResult) {
        self.results.insert(result.name.clone(), result);
    }

    pub fn get(&self, name: &str) -> Option<&PathResult> {
        self.results.get(name)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathResult> {
        self.results.values()
    }

    pub fn completed(&self) -> usize {
        self.iter()
            .filter(|result| result.status == PathStatus::Completed)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.iter()
            .filter(|result| matches!(result.status, PathStatus::Failed(_)))
            .count()
    }

    pub fn finish(&mut self) {
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_iterations_from_value() {
        assert_eq!(Iterations::from_value(&json!(3)), Some(Iterations::Count(3)));
        assert_eq!(Iterations::from_value(&json!("4")), Some(Iterations::Count(4)));
        assert_eq!(
            Iterations::from_value(&json!("Infinite")),
            Some(Iterations::Infinite)
        );
        assert_eq!(Iterations::from_value(&json!(-1)), None);
        assert_eq!(Iterations::from_value(&json!(true)), None);
    }

    #[test]
    fn test_iterations_allows() {
        assert!(Iterations::Count(2).allows(1));
        assert!(!Iterations::Count(2).allows(2));
        assert!(!Iterations::Count(0).allows(0));
        assert!(Iterations::Infinite.allows(u64::MAX));
    }

    #[test]
    fn test_summary_names_count_from_one() {
        let mut summary = Summary::new("path");
        assert_eq!(summary.next_name(), "path_1");

        let mut result = PathResult::new(summary.next_name(), vec!["a".to_string()]);
        result.record("a", json!(1));
        result.finish(PathStatus::Completed);
        summary.insert(result);

        assert_eq!(summary.next_name(), "path_2");
        assert_eq!(summary.get("path_1").and_then(|r| r.output()), Some(&json!(1)));
        assert_eq!(summary.completed(), 1);
        assert_eq!(summary.failed(), 0);
    }

    #[test]
    fn test_stage_parsing() {
        assert_eq!("Workflow".parse::<Stage>(), Ok(Stage::Workflow));
        assert_eq!("bogus".parse::<Stage>(), Err("bogus".to_string()));
        assert_eq!(Stage::Summary.to_string(), "summary");
    }

    #[test]
    fn test_path_status_serialization() {
        let failed = serde_json::to_value(PathStatus::Failed("boom".into())).unwrap();
        assert_eq!(failed, json!({"status": "failed", "error": "boom"}));

        let done = serde_json::to_value(PathStatus::Completed).unwrap();
        assert_eq!(done, json!({"status": "completed"}));
    }
}
