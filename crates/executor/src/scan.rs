use common::{insert_dual_key, DbError, DbResult, RowMap};
use expr::PushedPredicate;

use crate::{ExecutionContext, Executor};

pub struct TableScanExec {
    table: String,
    alias: String,
    pushed_predicate: Option<PushedPredicate>,
    rows: Vec<RowMap>,
    cursor: usize,
    columns: Vec<String>,
}

impl TableScanExec {
    pub fn new(table: String, alias: String, pushed_predicate: Option<PushedPredicate>) -> Self {
        Self { table, alias, pushed_predicate, rows: Vec::new(), cursor: 0, columns: Vec::new() }
    }
}

impl Executor for TableScanExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let meta = ctx
            .catalog
            .get(&self.table)
            .ok_or_else(|| DbError::Exec(format!("table '{}' does not exist", self.table)))?
            .clone();
        self.columns = meta.column_names().into_iter().map(String::from).collect();
        let decoded = heap::scan(ctx.buffer, ctx.table_dir, &meta, self.pushed_predicate.as_ref())?;

        self.rows = decoded
            .into_iter()
            .map(|(_, values)| {
                let mut row = RowMap::new();
                for (col, value) in meta.columns.iter().zip(values) {
                    insert_dual_key(&mut row, Some(&self.alias), &col.name, value);
                }
                row
            })
            .collect();
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
        self.columns.clone()
    }
}
