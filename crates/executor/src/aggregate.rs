use std::collections::HashMap as StdHashMap;

use common::{DbError, DbResult, RowMap};
use parser::ast::{AggArg, AggKind, SelectItem};
use types::Value;

use crate::{ExecutionContext, Executor};

pub struct AggregateExec {
    input: Box<dyn Executor>,
    group_by: Option<String>,
    items: Vec<SelectItem>,
    rows: Vec<RowMap>,
    cursor: usize,
}

impl AggregateExec {
    pub fn new(input: Box<dyn Executor>, group_by: Option<String>, items: Vec<SelectItem>) -> Self {
        Self { input, group_by, items, rows: Vec::new(), cursor: 0 }
    }

    fn group_key(&self, row: &RowMap) -> String {
        match &self.group_by {
            Some(col) => expr::EvalContext::new(row)
                .resolve(&expr::ColumnRef::bare(col))
                .map(|v| v.as_display_string())
                .unwrap_or_default(),
            None => String::new(),
        }
    }

    fn compute_groups(&self, all_rows: Vec<RowMap>) -> DbResult<Vec<RowMap>> {
        let mut groups: StdHashMap<String, Vec<RowMap>> = StdHashMap::new();
        let mut order: Vec<String> = Vec::new();
        for row in all_rows {
            let key = self.group_key(&row);
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(row);
        }

        let mut output = Vec::new();
        for key in order {
            let members = &groups[&key];
            let mut out_row = RowMap::new();
            for item in &self.items {
                match item {
                    SelectItem::Column { column, alias } => {
                        let value = members
                            .first()
                            .and_then(|r| expr::EvalContext::new(r).resolve(column))
                            .cloned()
                            .unwrap_or(Value::Null);
                        out_row.insert(alias.clone().unwrap_or_else(|| column.name.clone()), value);
                    }
                    SelectItem::Aggregate { kind, arg, alias } => {
                        let value = compute_aggregate(kind, arg, members)?;
                        let name = alias.clone().unwrap_or_else(|| default_agg_name(kind, arg));
                        out_row.insert(name, value);
                    }
                    SelectItem::Star => {
                        return Err(DbError::Exec("SELECT * cannot be combined with GROUP BY".into()))
                    }
                }
            }
            output.push(out_row);
        }
        Ok(output)
    }
}

fn default_agg_name(kind: &AggKind, arg: &AggArg) -> String {
    let fname = match kind {
        AggKind::Count => "COUNT",
        AggKind::Sum => "SUM",
        AggKind::Avg => "AVG",
    };
    match arg {
        AggArg::Star => format!("{fname}(*)"),
        AggArg::Column(c) => format!("{fname}({})", c.render()),
    }
}

fn compute_aggregate(kind: &AggKind, arg: &AggArg, members: &[RowMap]) -> DbResult<Value> {
    match (kind, arg) {
        (AggKind::Count, AggArg::Star) => Ok(Value::Int(members.len() as i32)),
        (AggKind::Count, AggArg::Column(col)) => {
            let n = members
                .iter()
                .filter(|r| !matches!(expr::EvalContext::new(r).resolve(col), None | Some(Value::Null)))
                .count();
            Ok(Value::Int(n as i32))
        }
        (AggKind::Sum, AggArg::Column(col)) => {
            let mut sum = 0f64;
            let mut saw_float = false;
            for row in members {
                match expr::EvalContext::new(row).resolve(col) {
                    Some(Value::Int(i)) => sum += *i as f64,
                    Some(Value::Float(f)) => {
                        sum += *f as f64;
                        saw_float = true;
                    }
                    Some(Value::Null) | None => {}
                    Some(other) => return Err(DbError::Exec(format!("SUM over non-numeric value {other}"))),
                }
            }
            Ok(if saw_float { Value::Float(sum as f32) } else { Value::Int(sum as i32) })
        }
        (AggKind::Avg, AggArg::Column(col)) => {
            let mut sum = 0f64;
            let mut count = 0u32;
            for row in members {
                match expr::EvalContext::new(row).resolve(col) {
                    Some(Value::Int(i)) => {
                        sum += *i as f64;
                        count += 1;
                    }
                    Some(Value::Float(f)) => {
                        sum += *f as f64;
                        count += 1;
                    }
                    Some(Value::Null) | None => {}
                    Some(other) => return Err(DbError::Exec(format!("AVG over non-numeric value {other}"))),
                }
            }
            Ok(Value::Float(if count == 0 { 0.0 } else { (sum / count as f64) as f32 }))
        }
        (AggKind::Sum, AggArg::Star) | (AggKind::Avg, AggArg::Star) => {
            Err(DbError::Plan("SUM/AVG require a column argument, not '*'".into()))
        }
    }
}

impl Executor for AggregateExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.open(ctx)?;
        let mut all_rows = Vec::new();
        while let Some(row) = self.input.next(ctx)? {
            all_rows.push(row);
        }
        self.input.close(ctx)?;
        self.rows = self.compute_groups(all_rows)?;
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
        self.items
            .iter()
            .map(|item| match item {
                SelectItem::Column { column, alias } => alias.clone().unwrap_or_else(|| column.name.clone()),
                SelectItem::Aggregate { kind, arg, alias } => alias.clone().unwrap_or_else(|| default_agg_name(kind, arg)),
                SelectItem::Star => "*".to_string(),
            })
            .collect()
    }
}
