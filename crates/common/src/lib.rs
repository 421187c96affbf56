//! Error types, row representation, and engine-wide configuration shared by
//! every crate above `types`.

use std::collections::HashMap;
use std::path::PathBuf;

pub use types::{SqlType, Value};

/// Identifies a page on disk. Pages are allocated from a single global
/// counter and persisted one-file-per-page under `<data_dir>/pages/`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct PageId(pub u64);

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one record within a page by its byte offset from the start of
/// the page's record area. There is no slot array: records are packed back
/// to back and located by walking the page's decoded record list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RecordId {
    pub page_id: PageId,
    pub offset: u32,
}

/// A single relational row as a fully-qualified and bare-name dictionary.
/// Every column is stored twice: once under its bare name (`age`) and once
/// under its alias-qualified name (`s.age`), so predicate/projection
/// evaluation never has to know which form a reference used. Joins simply
/// merge two `RowMap`s; bare-name collisions are resolved by whichever side
/// inserts last, which is why planner-level ambiguity checks run before
/// execution ever builds one of these.
pub type RowMap = HashMap<String, Value>;

/// Insert `value` under both `column` and, when an alias is known,
/// `alias.column`.
pub fn insert_dual_key(row: &mut RowMap, alias: Option<&str>, column: &str, value: Value) {
    if let Some(alias) = alias {
        row.insert(format!("{alias}.{column}"), value.clone());
    }
    row.insert(column.to_string(), value);
}

/// A batch of rows produced by an executor node along with the column order
/// the caller should render them in. Kept separate from `RowMap` itself
/// because a `HashMap` has no stable iteration order.
#[derive(Clone, Debug, Default)]
pub struct RecordBatch {
    pub columns: Vec<String>,
    pub rows: Vec<RowMap>,
}

impl RecordBatch {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn push(&mut self, row: RowMap) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Replacement policy for the buffer pool, selectable at `Database::open`
/// time (spec scenarios compare LRU against FIFO on the same access trace).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReplacementPolicy {
    Lru,
    Fifo,
}

impl Default for ReplacementPolicy {
    fn default() -> Self {
        ReplacementPolicy::Lru
    }
}

/// Engine-wide configuration. Built with `bon`'s derive so callers can set
/// only the fields they care about, e.g. `Config::builder().data_dir(dir).build()`.
#[derive(Clone, Debug, bon::Builder)]
pub struct Config {
    /// Root directory holding `pages/`, `catalog.json`, and `table_files.json`.
    #[builder(into)]
    pub data_dir: PathBuf,

    #[builder(default = 4096)]
    pub page_size: u32,

    #[builder(default = 100)]
    pub buffer_pool_capacity: usize,

    #[builder(default)]
    pub replacement_policy: ReplacementPolicy,

    /// Directory the CLI writes `compile_log_<timestamp>.txt` transcripts
    /// into. Not used by the engine itself; carried here because it's the
    /// one place every binary shares configuration.
    #[builder(default = PathBuf::from("log"))]
    pub log_dir: PathBuf,
}

/// Cumulative counters surfaced by `EXPLAIN ANALYZE` and by the buffer pool's
/// own stats query, mirroring the hit/miss/eviction counts the original
/// buffer pool tracked.
#[derive(Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct ExecutionStats {
    pub buffer_hits: u64,
    pub buffer_misses: u64,
    pub evictions: u64,
    pub pages_read: u64,
    pub pages_written: u64,
    pub rows_scanned: u64,
    pub rows_returned: u64,
}

impl ExecutionStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.buffer_hits + self.buffer_misses;
        if total == 0 {
            0.0
        } else {
            self.buffer_hits as f64 / total as f64
        }
    }
}

/// The error taxonomy used end to end: lexing through execution. Each stage
/// wraps its own finer-grained diagnostic text (including the smart-hint
/// strings the parser/semantic analyzer attach) rather than exposing its own
/// error enum, so a `Database::execute` caller always sees one flat type.
#[derive(thiserror::Error, Debug)]
pub enum DbError {
    #[error("lex error: {0}")]
    Lex(String),

    #[error("syntax error: {0}")]
    Parse(String),

    #[error("semantic error: {0}")]
    Semantic(String),

    #[error("plan error: {0}")]
    Plan(String),

    #[error("execution error: {0}")]
    Exec(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dual_key_insert_sets_both_keys() {
        let mut row = RowMap::new();
        insert_dual_key(&mut row, Some("s"), "age", Value::Int(21));
        assert!(matches!(row.get("s.age"), Some(Value::Int(21))));
        assert!(matches!(row.get("age"), Some(Value::Int(21))));
    }

    #[test]
    fn config_builder_applies_defaults() {
        let cfg = Config::builder().data_dir("data").build();
        assert_eq!(cfg.page_size, 4096);
        assert_eq!(cfg.buffer_pool_capacity, 100);
        assert_eq!(cfg.replacement_policy, ReplacementPolicy::Lru);
    }

    #[test]
    fn stats_hit_rate_handles_zero_total() {
        let stats = ExecutionStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
    }
}
