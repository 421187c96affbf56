use std::cmp::Ordering;

use common::{DbResult, RowMap};

use crate::{ExecutionContext, Executor};

pub struct SortExec {
    input: Box<dyn Executor>,
    column: String,
    desc: bool,
    rows: Vec<RowMap>,
    cursor: usize,
}

impl SortExec {
    pub fn new(input: Box<dyn Executor>, column: String, desc: bool) -> Self {
        Self { input, column, desc, rows: Vec::new(), cursor: 0 }
    }
}

impl Executor for SortExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.open(ctx)?;
        let mut rows = Vec::new();
        while let Some(row) = self.input.next(ctx)? {
            rows.push(row);
        }
        self.input.close(ctx)?;

        let col_ref = expr::ColumnRef::bare(&self.column);
        rows.sort_by(|a, b| {
            let va = expr::EvalContext::new(a).resolve(&col_ref);
            let vb = expr::EvalContext::new(b).resolve(&col_ref);
            let ord = match (va, vb) {
                (Some(x), Some(y)) => x.cmp_same_type(y).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            if self.desc {
                ord.reverse()
            } else {
                ord
            }
        });

        self.rows = rows;
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
        self.input.schema()
    }
}
