//! Catalog-aware validation that runs between parsing and planning: table
//! and column existence, alias resolution, unqualified-column ambiguity,
//! INSERT arity, and the single-column GROUP BY restriction. Every failure
//! here carries a smart hint in the same voice as the parser's own
//! diagnostics.
//!
//! Deliberately pure with respect to the catalog: nothing here ever
//! mutates it, so the same `&Catalog` can be reused to validate a batch of
//! statements (e.g. a `.sql` file) without any statement's validation
//! observing another's not-yet-committed schema changes.

use catalog::{Catalog, TableMeta};
use common::{DbError, DbResult};
use expr::{ColumnRef, Expr, Operand};
use parser::ast::*;
use parser::diag;

struct Binding<'a> {
    alias: String,
    table: &'a TableMeta,
}

fn lookup_table<'a>(catalog: &'a Catalog, name: &str) -> DbResult<&'a TableMeta> {
    catalog.get(name).ok_or_else(|| {
        let known: Vec<String> = catalog.list_tables().iter().map(|s| s.to_string()).collect();
        DbError::Semantic(format!(
            "unknown table '{name}'\n{}",
            diag::suggest_expected_vs_got(&known, name)
        ))
    })
}

fn walk_expr_columns<'e>(expr: &'e Expr, out: &mut Vec<&'e ColumnRef>) {
    match expr {
        Expr::Compare { left, right, .. } => {
            if let Operand::Column(c) = left {
                out.push(c);
            }
            if let Operand::Column(c) = right {
                out.push(c);
            }
        }
        Expr::Logical { left, right, .. } => {
            walk_expr_columns(left, out);
            walk_expr_columns(right, out);
        }
        Expr::Not(inner) => walk_expr_columns(inner, out),
    }
}

fn resolve_column(col: &ColumnRef, bindings: &[Binding]) -> DbResult<()> {
    match &col.alias {
        Some(alias) => {
            let binding = bindings.iter().find(|b| b.alias == *alias).ok_or_else(|| {
                let available: Vec<String> = bindings.iter().map(|b| b.alias.clone()).collect();
                DbError::Semantic(format!("unknown table alias '{alias}'\n{}", diag::suggest_alias(alias, &available)))
            })?;
            if binding.table.column(&col.name).is_none() {
                let cols: Vec<String> = binding.table.column_names().into_iter().map(String::from).collect();
                return Err(DbError::Semantic(format!(
                    "column '{}' does not exist on '{alias}'\n{}",
                    col.name,
                    diag::suggest_column(&col.name, &cols)
                )));
            }
            Ok(())
        }
        None => {
            let matches: Vec<&Binding> = bindings.iter().filter(|b| b.table.column(&col.name).is_some()).collect();
            match matches.len() {
                0 => {
                    let all_cols: Vec<String> =
                        bindings.iter().flat_map(|b| b.table.column_names()).map(String::from).collect();
                    Err(DbError::Semantic(format!(
                        "unknown column '{}'\n{}",
                        col.name,
                        diag::suggest_column(&col.name, &all_cols)
                    )))
                }
                1 => Ok(()),
                _ => {
                    let owners: Vec<String> = matches.iter().map(|b| b.alias.clone()).collect();
                    Err(DbError::Semantic(format!(
                        "column '{}' is ambiguous between {}",
                        col.name,
                        owners.join(", ")
                    )))
                }
            }
        }
    }
}

fn analyze_select(select: &SelectStmt, catalog: &Catalog) -> DbResult<()> {
    let from_table = lookup_table(catalog, &select.from.name)?;
    let mut bindings = vec![Binding { alias: select.from.binding().to_string(), table: from_table }];
    for join in &select.joins {
        let table = lookup_table(catalog, &join.table.name)?;
        bindings.push(Binding { alias: join.table.binding().to_string(), table });
    }

    for join in &select.joins {
        let mut cols = Vec::new();
        walk_expr_columns(&join.on, &mut cols);
        for c in cols {
            resolve_column(c, &bindings)?;
        }
    }

    if let Some(where_expr) = &select.where_clause {
        let mut cols = Vec::new();
        walk_expr_columns(where_expr, &mut cols);
        for c in cols {
            resolve_column(c, &bindings)?;
        }
    }

    let has_aggregates = select.items.iter().any(|i| matches!(i, SelectItem::Aggregate { .. }));

    for item in &select.items {
        match item {
            SelectItem::Column { column, .. } => {
                resolve_column(column, &bindings)?;
                if has_aggregates {
                    let is_group_col = select.group_by.as_deref() == Some(column.name.as_str());
                    if !is_group_col {
                        return Err(DbError::Semantic(format!(
                            "column '{}' must appear in GROUP BY or be wrapped in an aggregate",
                            column.render()
                        )));
                    }
                }
            }
            SelectItem::Aggregate { arg: AggArg::Column(column), .. } => resolve_column(column, &bindings)?,
            SelectItem::Aggregate { arg: AggArg::Star, .. } => {}
            SelectItem::Star => {
                if has_aggregates {
                    return Err(DbError::Semantic(
                        "'*' cannot be combined with aggregate functions in the same select list".to_string(),
                    ));
                }
            }
        }
    }

    if let Some(group_col) = &select.group_by {
        resolve_column(&ColumnRef::bare(group_col), &bindings)?;
    }

    if let Some((order_col, _)) = &select.order_by {
        resolve_column(&ColumnRef::bare(order_col), &bindings)?;
    }

    Ok(())
}

fn analyze_insert(insert: &InsertStmt, catalog: &Catalog) -> DbResult<()> {
    let table = lookup_table(catalog, &insert.table)?;
    let expected = match &insert.columns {
        Some(cols) => {
            for name in cols {
                if table.column(name).is_none() {
                    let known: Vec<String> = table.column_names().into_iter().map(String::from).collect();
                    return Err(DbError::Semantic(format!(
                        "column '{name}' does not exist on '{}'\n{}",
                        insert.table,
                        diag::suggest_column(name, &known)
                    )));
                }
            }
            cols.len()
        }
        None => table.columns.len(),
    };
    for row in &insert.rows {
        if row.len() != expected {
            let col_names: Vec<String> = table.column_names().into_iter().map(String::from).collect();
            return Err(DbError::Semantic(diag::suggest_insert_arity(&insert.table, expected, row.len(), &col_names)));
        }
    }
    Ok(())
}

fn analyze_update(update: &UpdateStmt, catalog: &Catalog) -> DbResult<()> {
    let table = lookup_table(catalog, &update.table)?;
    let binding = Binding { alias: update.table.clone(), table };
    for (col, _) in &update.assignments {
        if table.column(col).is_none() {
            let known: Vec<String> = table.column_names().into_iter().map(String::from).collect();
            return Err(DbError::Semantic(format!(
                "column '{col}' does not exist on '{}'\n{}",
                update.table,
                diag::suggest_column(col, &known)
            )));
        }
    }
    if let Some(where_expr) = &update.where_clause {
        let mut cols = Vec::new();
        walk_expr_columns(where_expr, &mut cols);
        for c in cols {
            resolve_column(c, std::slice::from_ref(&binding))?;
        }
    }
    Ok(())
}

fn analyze_delete(delete: &DeleteStmt, catalog: &Catalog) -> DbResult<()> {
    let table = lookup_table(catalog, &delete.table)?;
    let binding = Binding { alias: delete.table.clone(), table };
    if let Some(where_expr) = &delete.where_clause {
        let mut cols = Vec::new();
        walk_expr_columns(where_expr, &mut cols);
        for c in cols {
            resolve_column(c, std::slice::from_ref(&binding))?;
        }
    }
    Ok(())
}

/// Validates a parsed statement against the catalog. `CREATE TABLE` is
/// intentionally not re-validated here: its structural rules (duplicate
/// columns, PK/FK references) live on `Catalog::create_table` itself, which
/// is the single place that both validates and persists them.
pub fn analyze(stmt: &Statement, catalog: &Catalog) -> DbResult<()> {
    let result = match stmt {
        Statement::Select(s) => analyze_select(s, catalog),
        Statement::Insert(i) => analyze_insert(i, catalog),
        Statement::Update(u) => analyze_update(u, catalog),
        Statement::Delete(d) => analyze_delete(d, catalog),
        Statement::CreateTable(_) => Ok(()),
        Statement::Explain(inner) => analyze(inner, catalog),
    };
    if let Err(e) = &result {
        log::debug!("semantic analysis rejected statement: {e}");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::Column;
    use tempfile::tempdir;
    use types::SqlType;

    fn test_catalog() -> Catalog {
        let dir = tempdir().unwrap();
        let mut cat = Catalog::open(dir.path()).unwrap();
        std::mem::forget(dir);
        cat.create_table(
            "students",
            vec![
                Column { name: "id".into(), sql_type: SqlType::Int },
                Column { name: "name".into(), sql_type: SqlType::Varchar(Some(20)) },
                Column { name: "age".into(), sql_type: SqlType::Int },
            ],
            Some("id".into()),
            vec![],
        )
        .unwrap();
        cat
    }

    fn select(sql: &str) -> SelectStmt {
        match parser::parse_statement(sql).unwrap() {
            Statement::Select(s) => s,
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn unknown_table_carries_hint() {
        let cat = test_catalog();
        let err = analyze_select(&select("SELECT * FROM studnets;"), &cat).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("students") || msg.contains("智能提示"));
    }

    #[test]
    fn unknown_column_is_rejected() {
        let cat = test_catalog();
        let err = analyze_select(&select("SELECT nope FROM students;"), &cat).unwrap_err();
        assert!(matches!(err, DbError::Semantic(_)));
    }

    #[test]
    fn valid_query_passes() {
        let cat = test_catalog();
        assert!(analyze_select(&select("SELECT id, name FROM students WHERE age >= 18;"), &cat).is_ok());
    }

    #[test]
    fn star_mixed_with_aggregate_is_rejected() {
        let cat = test_catalog();
        let err = analyze_select(&select("SELECT *, COUNT(*) FROM students;"), &cat).unwrap_err();
        assert!(matches!(err, DbError::Semantic(_)));
    }

    #[test]
    fn insert_arity_mismatch_is_rejected() {
        let cat = test_catalog();
        let stmt = match parser::parse_statement("INSERT INTO students VALUES (1, 'Alice');").unwrap() {
            Statement::Insert(i) => i,
            _ => unreachable!(),
        };
        let err = analyze_insert(&stmt, &cat).unwrap_err();
        assert!(matches!(err, DbError::Semantic(_)));
    }
}
