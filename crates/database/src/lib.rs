//! The synchronous, single-user engine entry point: owns the buffer pool,
//! catalog, and table directory, and drives every statement through
//! lex -> parse -> semantic analysis -> plan -> execute.
//!
//! There is exactly one `Database` per data directory and no locking
//! anywhere in this crate, matching the single-threaded execution model the
//! rest of the engine assumes (see `executor`'s `ExecutionContext`).

use std::fs;
use std::path::{Path, PathBuf};

use buffer::BufferPool;
use catalog::Catalog;
use common::{Config, DbError, DbResult, RecordBatch};
use executor::{ExecutionContext, QueryResult};
use heap::TableDirectory;
use planner::Plan;
use storage::PageManager;

pub struct Database {
    data_dir: PathBuf,
    buffer: BufferPool,
    catalog: Catalog,
    table_dir: TableDirectory,
}

impl Database {
    /// Opens (or creates) a database rooted at `config.data_dir`, loading
    /// the catalog and table directory and constructing a buffer pool in
    /// front of a freshly opened page manager.
    pub fn open(config: &Config) -> DbResult<Self> {
        fs::create_dir_all(&config.data_dir)?;
        log::info!("opening database at {}", config.data_dir.display());
        let pager = PageManager::open(&config.data_dir)?;
        let buffer = BufferPool::open(pager, config.buffer_pool_capacity, config.replacement_policy);
        let catalog = Catalog::open(&config.data_dir)?;
        let table_dir = TableDirectory::open(&config.data_dir)?;
        Ok(Self { data_dir: config.data_dir.clone(), buffer, catalog, table_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Runs every statement in `sql`, in source order, splitting on
    /// semicolons outside single-quoted strings. A failing statement stops
    /// the batch: prior statements' writes are already flushed and are not
    /// rolled back (this engine has no transactions).
    pub fn execute_batch(&mut self, sql: &str) -> DbResult<Vec<QueryResult>> {
        let mut results = Vec::new();
        for stmt_text in split_statements(sql) {
            if stmt_text.is_empty() {
                continue;
            }
            results.push(self.execute_one(&stmt_text)?);
        }
        Ok(results)
    }

    /// Runs a single statement (with its trailing `;`) end to end.
    pub fn execute_one(&mut self, stmt_text: &str) -> DbResult<QueryResult> {
        log::debug!("executing: {stmt_text}");
        let stmt = parser::parse_statement(stmt_text).map_err(|e| DbError::Parse(e.to_string()))?;
        semantic::analyze(&stmt, &self.catalog)?;
        let plan = planner::plan_statement(&stmt, stmt_text)?;
        let is_write = matches!(plan, Plan::Insert(_) | Plan::Update(_) | Plan::Delete(_) | Plan::CreateTable(_));

        let mut ctx = ExecutionContext { buffer: &mut self.buffer, catalog: &mut self.catalog, table_dir: &mut self.table_dir };
        let result = executor::execute_plan(&mut ctx, &plan, stmt_text)?;

        if is_write {
            self.buffer.flush_all()?;
        }
        Ok(result)
    }

    pub fn flush_all(&mut self) -> DbResult<()> {
        self.buffer.flush_all()
    }
}

/// Renders a `QueryResult` the way the spec's user-visible output section
/// describes, independent of any particular output surface.
pub fn describe_result(stmt: &str, result: &QueryResult) -> String {
    match result {
        QueryResult::Rows(batch) => format!("{} row(s) returned", batch.len()),
        QueryResult::RowsAffected(n) => describe_affected(stmt, *n),
        QueryResult::Message(msg) => msg.clone(),
    }
}

fn describe_affected(stmt: &str, n: u64) -> String {
    let upper = stmt.trim_start().to_ascii_uppercase();
    if upper.starts_with("INSERT") {
        format!("{n} row(s) inserted")
    } else if upper.starts_with("DELETE") {
        format!("{n} row(s) deleted")
    } else if upper.starts_with("UPDATE") {
        format!("Updated {n} row(s)")
    } else {
        format!("{n} row(s) affected")
    }
}

/// Extracts the `RecordBatch` from a `QueryResult`, for callers that only
/// care about `SELECT`/`EXPLAIN` results.
pub fn rows(result: &QueryResult) -> Option<&RecordBatch> {
    match result {
        QueryResult::Rows(batch) => Some(batch),
        _ => None,
    }
}

/// Splits raw SQL text into individual statement strings (each retaining
/// its trailing `;`, if present) on semicolons that fall outside
/// single-quoted string literals. A doubled `''` inside a string is the
/// lexer's own escape for a literal quote and never ends the string here.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if c == '\'' {
            if in_string && chars.peek() == Some(&'\'') {
                current.push(chars.next().unwrap());
            } else {
                in_string = !in_string;
            }
            continue;
        }
        if c == ';' && !in_string {
            let trimmed = current.trim().to_string();
            if !trimmed.is_empty() {
                out.push(trimmed);
            }
            current.clear();
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        out.push(tail.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use types::Value;

    fn config(dir: &Path) -> Config {
        Config::builder().data_dir(dir.to_path_buf()).build()
    }

    #[test]
    fn splits_on_semicolons_outside_strings() {
        let stmts = split_statements("INSERT INTO t VALUES (1, 'a;b'); SELECT * FROM t;");
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("a;b"));
    }

    #[test]
    fn doubled_quote_does_not_end_string() {
        let stmts = split_statements("INSERT INTO t VALUES ('it''s; fine');");
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn create_insert_select_round_trips_through_the_pipeline() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(&config(dir.path())).unwrap();
        db.execute_batch(
            "CREATE TABLE students (id INT, name VARCHAR(20), age INT, PRIMARY KEY (id));
             INSERT INTO students VALUES (1, 'Alice', 21);
             INSERT INTO students VALUES (2, 'Bob', 17);",
        )
        .unwrap();

        let results = db.execute_batch("SELECT name FROM students WHERE age >= 18;").unwrap();
        let batch = rows(&results[0]).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.rows[0].get("name"), Some(&Value::Varchar("Alice".into())));
    }

    #[test]
    fn unknown_table_is_rejected_before_planning() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(&config(dir.path())).unwrap();
        let err = db.execute_one("SELECT * FROM ghost;").unwrap_err();
        assert!(matches!(err, DbError::Semantic(_)));
    }

    #[test]
    fn left_join_keeps_unmatched_left_rows_padded_with_null() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(&config(dir.path())).unwrap();
        db.execute_batch(
            "CREATE TABLE departments (dept_id INT, dept_name VARCHAR(20), PRIMARY KEY (dept_id));
             CREATE TABLE employees (emp_id INT, dept_id INT,
               FOREIGN KEY (dept_id) REFERENCES departments(dept_id));
             INSERT INTO departments VALUES (1, 'Eng');
             INSERT INTO departments VALUES (2, 'Sales');
             INSERT INTO employees VALUES (101, 1);",
        )
        .unwrap();

        let results = db
            .execute_batch(
                "SELECT dept_name, emp_id FROM departments d LEFT JOIN employees e ON d.dept_id = e.dept_id ORDER BY dept_name ASC;",
            )
            .unwrap();
        let batch = rows(&results[0]).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.rows[0].get("dept_name"), Some(&Value::Varchar("Eng".into())));
        assert_eq!(batch.rows[0].get("emp_id"), Some(&Value::Int(101)));
        assert_eq!(batch.rows[1].get("dept_name"), Some(&Value::Varchar("Sales".into())));
        assert_eq!(batch.rows[1].get("emp_id"), Some(&Value::Null));
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let mut db = Database::open(&config(dir.path())).unwrap();
            db.execute_batch(
                "CREATE TABLE t (id INT, PRIMARY KEY (id));
                 INSERT INTO t VALUES (1);",
            )
            .unwrap();
        }
        let mut db = Database::open(&config(dir.path())).unwrap();
        let results = db.execute_batch("SELECT id FROM t;").unwrap();
        assert_eq!(rows(&results[0]).unwrap().len(), 1);
    }
}
