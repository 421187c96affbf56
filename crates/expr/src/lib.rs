//! Boolean expression tree evaluated against a [`RowMap`], plus the narrow
//! [`PushedPredicate`] shape the planner hands down to the storage layer.
//!
//! Two evaluation surfaces exist by design: the full tree here supports
//! `AND`/`OR`/`NOT` and parentheses, and runs once rows have already been
//! materialized as `RowMap`s above the heap file. The heap file itself only
//! ever evaluates a single `PushedPredicate` comparison while decoding a
//! page, because that's as much of a WHERE clause as can be checked before
//! a row has a schema-bound dict built for it.

use common::{DbError, DbResult, RowMap};
use types::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl ComparisonOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::NotEq => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
        }
    }

    pub fn apply(&self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match (self, ord) {
            (ComparisonOp::Eq, Equal) => true,
            (ComparisonOp::NotEq, Less | Greater) => true,
            (ComparisonOp::Lt, Less) => true,
            (ComparisonOp::Lte, Less | Equal) => true,
            (ComparisonOp::Gt, Greater) => true,
            (ComparisonOp::Gte, Greater | Equal) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// A reference to a column, optionally qualified by a table alias
/// (`s.age` vs `age`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnRef {
    pub alias: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn bare(name: impl Into<String>) -> Self {
        Self { alias: None, name: name.into() }
    }

    pub fn qualified(alias: impl Into<String>, name: impl Into<String>) -> Self {
        Self { alias: Some(alias.into()), name: name.into() }
    }

    pub fn render(&self) -> String {
        match &self.alias {
            Some(a) => format!("{a}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Operand {
    Column(ColumnRef),
    Literal(Value),
}

#[derive(Clone, Debug)]
pub enum Expr {
    Compare { left: Operand, op: ComparisonOp, right: Operand },
    Logical { left: Box<Expr>, op: LogicalOp, right: Box<Expr> },
    Not(Box<Expr>),
}

/// Resolves column references against a row. Qualified references look up
/// the exact `alias.column` key; unqualified references try the bare key
/// first, then fall back to a suffix match over every `*.column` key in the
/// row (ambiguity across multiple matches is rejected at semantic-analysis
/// time, so at evaluation time the first match wins).
pub struct EvalContext<'a> {
    pub row: &'a RowMap,
}

impl<'a> EvalContext<'a> {
    pub fn new(row: &'a RowMap) -> Self {
        Self { row }
    }

    pub fn resolve(&self, col: &ColumnRef) -> Option<&'a Value> {
        if let Some(alias) = &col.alias {
            return self.row.get(&format!("{alias}.{}", col.name));
        }
        if let Some(v) = self.row.get(&col.name) {
            return Some(v);
        }
        let suffix = format!(".{}", col.name);
        self.row.iter().find(|(k, _)| k.ends_with(&suffix)).map(|(_, v)| v)
    }

    fn operand_value(&self, operand: &'a Operand) -> Option<&'a Value> {
        match operand {
            Operand::Column(c) => self.resolve(c),
            Operand::Literal(v) => Some(v),
        }
    }
}

/// Compares two values, coercing a string operand to a number when the
/// other side is numeric and the string actually parses as one. This is the
/// one cross-type leniency the engine grants; everything else must match
/// types exactly or the comparison is simply false (never an error — a
/// WHERE clause that can't match anything just filters everything out).
pub fn compare_values(a: &Value, op: ComparisonOp, b: &Value) -> bool {
    if let Some(ord) = a.cmp_same_type(b) {
        return op.apply(ord);
    }
    if let (Some(x), Some(y)) = (coerce_numeric(a), coerce_numeric(b)) {
        if let Some(ord) = x.partial_cmp(&y) {
            return op.apply(ord);
        }
    }
    false
}

fn coerce_numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f as f64),
        Value::Varchar(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Evaluates the full boolean tree against a row.
pub fn eval(expr: &Expr, row: &RowMap) -> DbResult<bool> {
    let ctx = EvalContext::new(row);
    eval_inner(expr, &ctx)
}

fn eval_inner(expr: &Expr, ctx: &EvalContext) -> DbResult<bool> {
    match expr {
        Expr::Compare { left, op, right } => {
            let l = ctx.operand_value(left).ok_or_else(|| {
                DbError::Exec(format!("could not resolve column '{}'", operand_label(left)))
            })?;
            let r = ctx.operand_value(right).ok_or_else(|| {
                DbError::Exec(format!("could not resolve column '{}'", operand_label(right)))
            })?;
            Ok(compare_values(l, *op, r))
        }
        Expr::Logical { left, op, right } => {
            let l = eval_inner(left, ctx)?;
            match op {
                LogicalOp::And => {
                    if !l {
                        return Ok(false);
                    }
                    eval_inner(right, ctx)
                }
                LogicalOp::Or => {
                    if l {
                        return Ok(true);
                    }
                    eval_inner(right, ctx)
                }
            }
        }
        Expr::Not(inner) => Ok(!eval_inner(inner, ctx)?),
    }
}

fn operand_label(op: &Operand) -> String {
    match op {
        Operand::Column(c) => c.render(),
        Operand::Literal(v) => v.to_string(),
    }
}

/// The narrow predicate shape the storage layer can evaluate without
/// building a `RowMap`: a single unqualified-column comparison against a
/// literal. The planner produces these by splitting a WHERE clause into its
/// top-level AND-conjuncts and pushing down whichever conjuncts qualify.
#[derive(Clone, Debug)]
pub struct PushedPredicate {
    pub column: String,
    pub op: ComparisonOp,
    pub value: Value,
}

impl PushedPredicate {
    /// Attempts to read a single `Expr::Compare` as a pushable predicate.
    /// Only `column OP literal` or `literal OP column` shapes qualify;
    /// anything else (column-to-column, or any `Logical`/`Not` node) is not
    /// pushable and must be kept as a residual filter above the scan.
    pub fn from_expr(expr: &Expr) -> Option<PushedPredicate> {
        match expr {
            Expr::Compare { left: Operand::Column(c), op, right: Operand::Literal(v) } if c.alias.is_none() => {
                Some(PushedPredicate { column: c.name.clone(), op: *op, value: v.clone() })
            }
            Expr::Compare { left: Operand::Literal(v), op, right: Operand::Column(c) } if c.alias.is_none() => {
                Some(PushedPredicate { column: c.name.clone(), op: flip(*op), value: v.clone() })
            }
            _ => None,
        }
    }

    pub fn matches(&self, row_value: &Value) -> bool {
        compare_values(row_value, self.op, &self.value)
    }
}

fn flip(op: ComparisonOp) -> ComparisonOp {
    match op {
        ComparisonOp::Lt => ComparisonOp::Gt,
        ComparisonOp::Lte => ComparisonOp::Gte,
        ComparisonOp::Gt => ComparisonOp::Lt,
        ComparisonOp::Gte => ComparisonOp::Lte,
        same => same,
    }
}

/// Splits a WHERE expression into its top-level AND-conjuncts. `OR`/`NOT`
/// nodes are returned whole as a single conjunct since they can't be split
/// further without changing meaning.
pub fn split_conjuncts(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::Logical { left, op: LogicalOp::And, right } => {
            let mut out = split_conjuncts(left);
            out.extend(split_conjuncts(right));
            out
        }
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> RowMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn unqualified_resolves_via_bare_then_suffix() {
        let r = row(&[("s.age", Value::Int(21))]);
        let ctx = EvalContext::new(&r);
        assert_eq!(ctx.resolve(&ColumnRef::bare("age")), Some(&Value::Int(21)));
    }

    #[test]
    fn qualified_requires_exact_alias_key() {
        let r = row(&[("age", Value::Int(21))]);
        let ctx = EvalContext::new(&r);
        assert_eq!(ctx.resolve(&ColumnRef::qualified("s", "age")), None);
    }

    #[test]
    fn string_coerces_to_number_when_it_parses() {
        assert!(compare_values(&Value::Varchar("18".into()), ComparisonOp::Gte, &Value::Int(18)));
        assert!(!compare_values(&Value::Varchar("abc".into()), ComparisonOp::Gte, &Value::Int(18)));
    }

    #[test]
    fn and_short_circuits() {
        let r = row(&[("age", Value::Int(17))]);
        let expr = Expr::Logical {
            left: Box::new(Expr::Compare {
                left: Operand::Column(ColumnRef::bare("age")),
                op: ComparisonOp::Gte,
                right: Operand::Literal(Value::Int(18)),
            }),
            op: LogicalOp::And,
            right: Box::new(Expr::Compare {
                left: Operand::Column(ColumnRef::bare("missing")),
                op: ComparisonOp::Eq,
                right: Operand::Literal(Value::Int(1)),
            }),
        };
        // left is false, so the right (which would error) must never run.
        assert_eq!(eval(&expr, &r).unwrap(), false);
    }

    #[test]
    fn pushable_predicate_flips_reversed_literal_comparisons() {
        let expr = Expr::Compare {
            left: Operand::Literal(Value::Int(18)),
            op: ComparisonOp::Lte,
            right: Operand::Column(ColumnRef::bare("age")),
        };
        let pushed = PushedPredicate::from_expr(&expr).unwrap();
        assert_eq!(pushed.column, "age");
        assert_eq!(pushed.op, ComparisonOp::Gte);
    }

    #[test]
    fn conjuncts_split_on_top_level_and_only() {
        let expr = Expr::Logical {
            left: Box::new(Expr::Compare {
                left: Operand::Column(ColumnRef::bare("a")),
                op: ComparisonOp::Eq,
                right: Operand::Literal(Value::Int(1)),
            }),
            op: LogicalOp::And,
            right: Box::new(Expr::Compare {
                left: Operand::Column(ColumnRef::bare("b")),
                op: ComparisonOp::Eq,
                right: Operand::Literal(Value::Int(2)),
            }),
        };
        assert_eq!(split_conjuncts(&expr).len(), 2);
    }
}
