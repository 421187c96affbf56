//! Volcano-style query execution over [`RowMap`] rows, plus the DML
//! statement handlers (`CREATE TABLE`/`INSERT`/`UPDATE`/`DELETE`) that never
//! go through the iterator tree since they aren't queries.
//!
//! Every node materializes its output the first time `next` is asked for a
//! row and serves the rest from that buffer. That's a deliberate
//! simplification over a true row-at-a-time pull model: this engine never
//! deals with a dataset too big to hold in memory (heap scans are the only
//! access path, there's no concurrency to interleave with), so the
//! materialize-then-serve shape keeps every node's logic easy to read
//! without losing the `open`/`next`/`close` contract.

pub mod aggregate;
pub mod dml;
pub mod filter;
pub mod join;
pub mod project;
pub mod scan;
pub mod sort;

use buffer::BufferPool;
use catalog::Catalog;
use common::{DbResult, RecordBatch, RowMap};
use heap::TableDirectory;
use planner::Plan;

/// Everything an executor node needs to reach the outside world: the page
/// cache, the schema catalog, and the table-to-header-page directory. A
/// fresh reference is threaded through every call rather than stored in
/// each node, since nodes are built bottom-up before a context exists.
pub struct ExecutionContext<'a> {
    pub buffer: &'a mut BufferPool,
    pub catalog: &'a mut Catalog,
    pub table_dir: &'a mut TableDirectory,
}

pub trait Executor {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()>;
    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<RowMap>>;
    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()>;
    fn schema(&self) -> Vec<String>;
}

/// The result of running any statement: either rows (a `SELECT`/`EXPLAIN`)
/// or a count of rows affected (DML).
pub enum QueryResult {
    Rows(RecordBatch),
    RowsAffected(u64),
    Message(String),
}

/// Builds the executor tree for a logical query plan.
pub fn build_executor(node: &planner::PlanNode) -> Box<dyn Executor> {
    use planner::PlanNode;
    match node {
        PlanNode::TableScan { table, alias, pushed_predicate } => {
            Box::new(scan::TableScanExec::new(table.clone(), alias.clone(), pushed_predicate.clone()))
        }
        PlanNode::Join { left, right, join_type, on } => {
            let (right_alias, right_table) = match right.as_ref() {
                PlanNode::TableScan { table, alias, .. } => (alias.clone(), table.clone()),
                other => unreachable!("join right side is always a table scan, got {other:?}"),
            };
            Box::new(join::NestedLoopJoinExec::new(
                build_executor(left),
                build_executor(right),
                on.clone(),
                *join_type,
                right_alias,
                right_table,
            ))
        }
        PlanNode::Filter { input, predicate } => Box::new(filter::FilterExec::new(build_executor(input), predicate.clone())),
        PlanNode::Aggregate { input, group_by, items } => {
            Box::new(aggregate::AggregateExec::new(build_executor(input), group_by.clone(), items.clone()))
        }
        PlanNode::Project { input, items } => Box::new(project::ProjectExec::new(build_executor(input), items.clone())),
        PlanNode::Sort { input, column, desc } => Box::new(sort::SortExec::new(build_executor(input), column.clone(), *desc)),
    }
}

/// Drains an executor tree into a `RecordBatch`.
pub fn run_to_batch(ctx: &mut ExecutionContext, exec: &mut dyn Executor) -> DbResult<RecordBatch> {
    exec.open(ctx)?;
    let mut batch = RecordBatch::new(exec.schema());
    while let Some(row) = exec.next(ctx)? {
        batch.push(row);
    }
    exec.close(ctx)?;
    Ok(batch)
}

/// Executes an already-planned statement end to end.
pub fn execute_plan(ctx: &mut ExecutionContext, plan: &Plan, sql: &str) -> DbResult<QueryResult> {
    match plan {
        Plan::Query(node) => {
            let mut exec = build_executor(node);
            Ok(QueryResult::Rows(run_to_batch(ctx, exec.as_mut())?))
        }
        Plan::CreateTable(stmt) => {
            dml::create_table(ctx, stmt)?;
            Ok(QueryResult::Message(format!("table '{}' created", stmt.table)))
        }
        Plan::Insert(stmt) => Ok(QueryResult::RowsAffected(dml::insert(ctx, stmt)?)),
        Plan::Update(stmt) => Ok(QueryResult::RowsAffected(dml::update(ctx, stmt)?)),
        Plan::Delete(stmt) => Ok(QueryResult::RowsAffected(dml::delete(ctx, stmt)?)),
        Plan::Explain { inner, sql: inner_sql } => {
            let text = planner::explain_text(plan);
            let _ = (inner.as_ref(), inner_sql, sql);
            Ok(QueryResult::Message(text))
        }
    }
}
