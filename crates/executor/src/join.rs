use common::{insert_dual_key, DbError, DbResult, RowMap};
use expr::Expr;
use parser::ast::JoinType;
use types::Value;

use crate::{ExecutionContext, Executor};

/// Plain nested-loop join: materializes the left side once, then for every
/// left row scans the whole right side, merging and testing the `ON`
/// predicate. Fine for the dataset sizes this engine ever sees — there is
/// no index to speed this up (see the storage layer's Non-goals).
///
/// A `LEFT` join keeps every left row that matched nothing, padding in the
/// right table's columns (both bare and `alias.col` keyed) as `NULL`. The
/// right side of a join is always a single table reference in this
/// grammar (no derived tables), so `right_alias`/`right_table` are enough
/// to recover its column set from the catalog when a left row needs
/// padding.
pub struct NestedLoopJoinExec {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    on: Expr,
    join_type: JoinType,
    right_alias: String,
    right_table: String,
    rows: Vec<RowMap>,
    cursor: usize,
    schema: Vec<String>,
}

impl NestedLoopJoinExec {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        on: Expr,
        join_type: JoinType,
        right_alias: String,
        right_table: String,
    ) -> Self {
        let schema = left.schema().into_iter().chain(right.schema()).collect();
        Self { left, right, on, join_type, right_alias, right_table, rows: Vec::new(), cursor: 0, schema }
    }

    fn pad_with_nulls(&self, ctx: &mut ExecutionContext, left_row: &RowMap) -> DbResult<RowMap> {
        let meta = ctx
            .catalog
            .get(&self.right_table)
            .ok_or_else(|| DbError::Exec(format!("table '{}' does not exist", self.right_table)))?
            .clone();
        let mut merged = left_row.clone();
        for name in meta.column_names() {
            insert_dual_key(&mut merged, Some(&self.right_alias), name, Value::Null);
        }
        Ok(merged)
    }
}

impl Executor for NestedLoopJoinExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.left.open(ctx)?;
        let mut left_rows = Vec::new();
        while let Some(row) = self.left.next(ctx)? {
            left_rows.push(row);
        }
        self.left.close(ctx)?;

        self.right.open(ctx)?;
        let mut right_rows = Vec::new();
        while let Some(row) = self.right.next(ctx)? {
            right_rows.push(row);
        }
        self.right.close(ctx)?;

        let mut out = Vec::new();
        for l in &left_rows {
            let mut matched = false;
            for r in &right_rows {
                let mut merged = l.clone();
                merged.extend(r.clone());
                if expr::eval(&self.on, &merged)? {
                    out.push(merged);
                    matched = true;
                }
            }
            if !matched && self.join_type == JoinType::Left {
                out.push(self.pad_with_nulls(ctx, l)?);
            }
        }
        self.rows = out;
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<Option<RowMap>> {
        if self.cursor >= self.rows.len() {
            return Ok(None);
        }
        let row = self.rows[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(row))
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        Ok(())
    }

    fn schema(&self) -> Vec<String> {
        self.schema.clone()
    }
}
