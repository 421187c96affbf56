use common::{DbError, DbResult, RowMap};
use parser::ast::SelectItem;

use crate::{ExecutionContext, Executor};

pub struct ProjectExec {
    input: Box<dyn Executor>,
    items: Vec<SelectItem>,
}

impl ProjectExec {
    pub fn new(input: Box<dyn Executor>, items: Vec<SelectItem>) -> Self {
        Self { input, items }
    }

    fn output_columns(&self) -> Vec<String> {
        if self.items.iter().any(|i| matches!(i, SelectItem::Star)) {
            return self.input.schema();
        }
        self.items
            .iter()
            .map(|item| match item {
                SelectItem::Column { column, alias } => alias.clone().unwrap_or_else(|| column.name.clone()),
                SelectItem::Aggregate { alias, .. } => alias.clone().unwrap_or_else(|| "agg".to_string()),
                SelectItem::Star => unreachable!(),
            })
            .collect()
    }

    fn project_row(&self, row: &RowMap) -> DbResult<RowMap> {
        if self.items.iter().any(|i| matches!(i, SelectItem::Star)) {
            return Ok(row.clone());
        }
        let mut out = RowMap::new();
        let ctx = expr::EvalContext::new(row);
        for item in &self.items {
            match item {
                SelectItem::Column { column, alias } => {
                    let value = ctx
                        .resolve(column)
                        .ok_or_else(|| DbError::Exec(format!("could not resolve column '{}'", column.render())))?
                        .clone();
                    let name = alias.clone().unwrap_or_else(|| column.name.clone());
                    out.insert(name, value);
                }
                SelectItem::Aggregate { .. } => {
                    return Err(DbError::Exec("aggregate expression outside of GROUP BY context".into()))
                }
                SelectItem::Star => unreachable!(),
            }
        }
        Ok(out)
    }
}

impl Executor for ProjectExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<RowMap>> {
        match self.input.next(ctx)? {
            Some(row) => Ok(Some(self.project_row(&row)?)),
            None => Ok(None),
        }
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.close(ctx)
    }

    fn schema(&self) -> Vec<String> {
        self.output_columns()
    }
}
