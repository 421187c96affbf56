//! `CREATE TABLE`/`INSERT`/`UPDATE`/`DELETE` handlers. Unlike queries these
//! never build an executor tree — each is a direct, sequential pipeline
//! against the catalog and heap file, mirroring the assemble-check-write
//! state machine the original compiler walked through by hand:
//! `Assembled -> TypeChecked -> PK-Checked -> FK-Checked -> Written ->
//! Counted`, rejecting at any check with no partial page mutation.

use catalog::{Column as CatColumn, ForeignKey as CatForeignKey};
use common::{insert_dual_key, DbError, DbResult, RecordId, RowMap};
use expr::{ColumnRef, ComparisonOp, Expr, Operand};
use parser::ast::{CreateTableStmt, DeleteStmt, InsertStmt, UpdateStmt};
use parser::diag;
use types::{SqlType, Value};

use crate::ExecutionContext;

pub fn create_table(ctx: &mut ExecutionContext, stmt: &CreateTableStmt) -> DbResult<()> {
    let columns: Vec<CatColumn> =
        stmt.columns.iter().map(|c| CatColumn { name: c.name.clone(), sql_type: c.sql_type.clone() }).collect();
    let foreign_keys: Vec<CatForeignKey> = stmt
        .foreign_keys
        .iter()
        .map(|fk| CatForeignKey { column: fk.column.clone(), ref_table: fk.ref_table.clone(), ref_column: fk.ref_column.clone() })
        .collect();
    ctx.catalog.create_table(&stmt.table, columns, stmt.primary_key.clone(), foreign_keys)?;
    let meta = ctx.catalog.get(&stmt.table).expect("just created").clone();
    heap::create_table_storage(ctx.buffer, ctx.table_dir, &meta)
}

/// Checks that `value` is assignable to `column`, matching the same
/// permissive INT-into-FLOAT widening the storage layer's encoder allows,
/// and returns the value the row should actually store: VARCHAR(n) is
/// checked against its length bound, and BOOL coerces from `0`/`1` and
/// case-insensitive `true`/`false`/`t`/`f` into a normalized `Value::Bool`.
fn check_type(column: &CatColumn, value: &Value) -> DbResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match (&column.sql_type, value) {
        (SqlType::Int, Value::Int(_)) => Ok(value.clone()),
        (SqlType::Float, Value::Float(_)) | (SqlType::Float, Value::Int(_)) => Ok(value.clone()),
        (SqlType::Bool, Value::Bool(_)) => Ok(value.clone()),
        (SqlType::Bool, Value::Int(0)) => Ok(Value::Bool(false)),
        (SqlType::Bool, Value::Int(1)) => Ok(Value::Bool(true)),
        (SqlType::Bool, Value::Varchar(s)) => match s.to_ascii_lowercase().as_str() {
            "true" | "t" => Ok(Value::Bool(true)),
            "false" | "f" => Ok(Value::Bool(false)),
            _ => Err(DbError::Constraint(format!(
                "value {value} is not assignable to column '{}' of type {}",
                column.name, column.sql_type
            ))),
        },
        (SqlType::Varchar(bound), Value::Varchar(s)) => {
            if let Some(n) = bound {
                if s.chars().count() as u32 > *n {
                    return Err(DbError::Constraint(format!(
                        "value {value} exceeds VARCHAR({n}) bound on column '{}'",
                        column.name
                    )));
                }
            }
            Ok(value.clone())
        }
        _ => Err(DbError::Constraint(format!(
            "value {value} is not assignable to column '{}' of type {}",
            column.name, column.sql_type
        ))),
    }
}

fn row_map(table_alias: &str, columns: &[CatColumn], values: &[Value]) -> RowMap {
    let mut row = RowMap::new();
    for (col, value) in columns.iter().zip(values) {
        insert_dual_key(&mut row, Some(table_alias), &col.name, value.clone());
    }
    row
}

fn find_matching(
    ctx: &mut ExecutionContext,
    table: &catalog::TableMeta,
    where_clause: &Option<Expr>,
) -> DbResult<Vec<(RecordId, Vec<Value>)>> {
    let all = heap::scan(ctx.buffer, ctx.table_dir, table, None)?;
    let Some(predicate) = where_clause else {
        return Ok(all);
    };
    let mut out = Vec::new();
    for (id, values) in all {
        let row = row_map(&table.name, &table.columns, &values);
        if expr::eval(predicate, &row)? {
            out.push((id, values));
        }
    }
    Ok(out)
}

/// Rejects an insert/update whose primary key value collides with a live
/// row other than `ignore`.
fn check_pk_unique(
    ctx: &mut ExecutionContext,
    table: &catalog::TableMeta,
    pk_idx: usize,
    pk_value: &Value,
    ignore: Option<RecordId>,
) -> DbResult<()> {
    if pk_value.is_null() {
        return Ok(());
    }
    let existing = heap::scan(ctx.buffer, ctx.table_dir, table, None)?;
    for (id, values) in existing {
        if Some(id) == ignore {
            continue;
        }
        if values[pk_idx].eq_same_type(pk_value) == Some(true) {
            return Err(DbError::Constraint(format!(
                "duplicate primary key value {pk_value} for table '{}'",
                table.name
            )));
        }
    }
    Ok(())
}

/// Renders a value the way it would need to appear in a literal SQL
/// statement (quoted for VARCHAR), for the smart-hint repair examples.
fn sql_literal(value: &Value) -> String {
    match value {
        Value::Varchar(s) => format!("'{s}'"),
        other => other.as_display_string(),
    }
}

/// Rejects an insert/update whose foreign key value has no matching row in
/// the referenced table's current primary key column. `row` and
/// `child_table` are only used to build the smart hint's repaired INSERT
/// example.
fn check_fk_exists(
    ctx: &mut ExecutionContext,
    child_table: &str,
    fk: &CatForeignKey,
    value: &Value,
    row: &[Value],
) -> DbResult<()> {
    if value.is_null() {
        return Ok(());
    }
    let ref_table = ctx
        .catalog
        .get(&fk.ref_table)
        .ok_or_else(|| DbError::Constraint(format!("foreign key references unknown table '{}'", fk.ref_table)))?
        .clone();
    let ref_idx = ref_table
        .columns
        .iter()
        .position(|c| c.name.eq_ignore_ascii_case(&fk.ref_column))
        .ok_or_else(|| DbError::Constraint(format!("referenced column '{}' does not exist", fk.ref_column)))?;
    let rows = heap::scan(ctx.buffer, ctx.table_dir, &ref_table, None)?;
    let found = rows.iter().any(|(_, values)| values[ref_idx].eq_same_type(value) == Some(true));
    if found {
        return Ok(());
    }
    let existing: Vec<String> = rows.iter().take(10).map(|(_, values)| values[ref_idx].as_display_string()).collect();
    let insert_values: Vec<String> = row.iter().map(sql_literal).collect();
    let hint = diag::suggest_fk_violation(
        child_table,
        &fk.column,
        &fk.ref_table,
        &fk.ref_column,
        &sql_literal(value),
        &insert_values,
        &existing,
    );
    Err(DbError::Constraint(format!(
        "foreign key value {value} has no matching row in '{}.{}'\n{hint}",
        fk.ref_table, fk.ref_column
    )))
}

/// INSERT: maps the (possibly partial) column list onto full table order,
/// then runs type, PK, and FK checks before the row is written. Nothing is
/// written if any row in the statement fails a check.
pub fn insert(ctx: &mut ExecutionContext, stmt: &InsertStmt) -> DbResult<u64> {
    let table = ctx
        .catalog
        .get(&stmt.table)
        .ok_or_else(|| DbError::Exec(format!("table '{}' does not exist", stmt.table)))?
        .clone();

    let mut assembled_rows = Vec::with_capacity(stmt.rows.len());
    for row in &stmt.rows {
        let mut values = match &stmt.columns {
            Some(names) => {
                let mut full = vec![Value::Null; table.columns.len()];
                for (name, value) in names.iter().zip(row) {
                    let idx = table
                        .columns
                        .iter()
                        .position(|c| c.name.eq_ignore_ascii_case(name))
                        .ok_or_else(|| DbError::Exec(format!("unknown column '{name}' on '{}'", table.name)))?;
                    full[idx] = value.clone();
                }
                full
            }
            None => row.clone(),
        };
        for (col, value) in table.columns.iter().zip(values.iter_mut()) {
            *value = check_type(col, value)?;
        }
        assembled_rows.push(values);
    }

    let pk_idx = table.primary_key.as_deref().and_then(|pk| table.columns.iter().position(|c| c.name.eq_ignore_ascii_case(pk)));

    for values in &assembled_rows {
        if let Some(idx) = pk_idx {
            check_pk_unique(ctx, &table, idx, &values[idx], None)?;
        }
        for fk in &table.foreign_keys {
            let idx = table.columns.iter().position(|c| c.name.eq_ignore_ascii_case(&fk.column)).expect("fk column declared on table");
            check_fk_exists(ctx, &table.name, fk, &values[idx], values)?;
        }
    }

    for values in &assembled_rows {
        heap::insert_record(ctx.buffer, ctx.table_dir, &table, values)?;
    }

    let count = heap::count_live_rows(ctx.buffer, ctx.table_dir, &table)?;
    ctx.catalog.set_row_count(&table.name, count)?;
    log::debug!("inserted {} row(s) into '{}'", assembled_rows.len(), table.name);
    Ok(assembled_rows.len() as u64)
}

/// UPDATE is implemented as delete-then-reinsert rather than an in-place
/// rewrite: a VARCHAR assignment can change a record's encoded length, and
/// the heap file has no way to grow a record within its page in place.
///
/// When an assignment changes the primary key's value, every table with a
/// foreign key pointing at this one is updated in turn by synthesizing and
/// recursively running an UPDATE against it, keyed on the old value.
pub fn update(ctx: &mut ExecutionContext, stmt: &UpdateStmt) -> DbResult<u64> {
    let table = ctx
        .catalog
        .get(&stmt.table)
        .ok_or_else(|| DbError::Exec(format!("table '{}' does not exist", stmt.table)))?
        .clone();

    let mut assignments = Vec::with_capacity(stmt.assignments.len());
    for (col, value) in &stmt.assignments {
        let column = table
            .columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(col))
            .ok_or_else(|| DbError::Exec(format!("unknown column '{col}' on '{}'", table.name)))?;
        assignments.push((col.clone(), check_type(column, value)?));
    }

    let matched = find_matching(ctx, &table, &stmt.where_clause)?;
    let pk_idx = table.primary_key.as_deref().and_then(|pk| table.columns.iter().position(|c| c.name.eq_ignore_ascii_case(pk)));

    let mut cascades: Vec<(String, Value, Value)> = Vec::new();

    for (id, old_values) in &matched {
        let mut new_values = old_values.clone();
        for (col, value) in &assignments {
            let idx = table.columns.iter().position(|c| c.name.eq_ignore_ascii_case(col)).expect("checked above");
            new_values[idx] = value.clone();
        }

        if let Some(idx) = pk_idx {
            if new_values[idx].eq_same_type(&old_values[idx]) != Some(true) {
                check_pk_unique(ctx, &table, idx, &new_values[idx], Some(*id))?;
                cascades.push((table.name.clone(), old_values[idx].clone(), new_values[idx].clone()));
            }
        }
        for fk in &table.foreign_keys {
            let idx = table.columns.iter().position(|c| c.name.eq_ignore_ascii_case(&fk.column)).expect("fk column declared on table");
            if new_values[idx].eq_same_type(&old_values[idx]) != Some(true) {
                check_fk_exists(ctx, &table.name, fk, &new_values[idx], &new_values)?;
            }
        }

        heap::delete_record(ctx.buffer, *id)?;
        heap::insert_record(ctx.buffer, ctx.table_dir, &table, &new_values)?;
    }

    let count = heap::count_live_rows(ctx.buffer, ctx.table_dir, &table)?;
    ctx.catalog.set_row_count(&table.name, count)?;

    for (parent_table, old_pk, new_pk) in cascades {
        let referencing: Vec<(String, String)> = ctx
            .catalog
            .referencing(&parent_table)
            .into_iter()
            .map(|(t, fk)| (t.name.clone(), fk.column.clone()))
            .collect();
        for (child_table, fk_column) in referencing {
            log::debug!("cascading primary key change on '{parent_table}' into '{child_table}.{fk_column}'");
            let synthetic = UpdateStmt {
                table: child_table,
                assignments: vec![(fk_column.clone(), new_pk.clone())],
                where_clause: Some(Expr::Compare {
                    left: Operand::Column(ColumnRef::bare(fk_column)),
                    op: ComparisonOp::Eq,
                    right: Operand::Literal(old_pk.clone()),
                }),
            };
            update(ctx, &synthetic)?;
        }
    }

    Ok(matched.len() as u64)
}

/// DELETE refuses to remove a row still referenced by another table's
/// foreign key (restrict semantics); the whole statement is rejected before
/// any row is tombstoned.
pub fn delete(ctx: &mut ExecutionContext, stmt: &DeleteStmt) -> DbResult<u64> {
    let table = ctx
        .catalog
        .get(&stmt.table)
        .ok_or_else(|| DbError::Exec(format!("table '{}' does not exist", stmt.table)))?
        .clone();

    let matched = find_matching(ctx, &table, &stmt.where_clause)?;

    let pk_idx = table.primary_key.as_deref().and_then(|pk| table.columns.iter().position(|c| c.name.eq_ignore_ascii_case(pk)));
    if let Some(idx) = pk_idx {
        let referencing: Vec<(catalog::TableMeta, CatForeignKey)> =
            ctx.catalog.referencing(&table.name).into_iter().map(|(t, fk)| (t.clone(), fk.clone())).collect();
        if !referencing.is_empty() {
            for (_, values) in &matched {
                let pk_value = &values[idx];
                for (child_table, fk) in &referencing {
                    let ref_idx = child_table.columns.iter().position(|c| c.name.eq_ignore_ascii_case(&fk.column)).expect("fk column declared on child table");
                    let child_rows = heap::scan(ctx.buffer, ctx.table_dir, child_table, None)?;
                    if child_rows.iter().any(|(_, v)| v[ref_idx].eq_same_type(pk_value) == Some(true)) {
                        return Err(DbError::Constraint(format!(
                            "cannot delete from '{}': row is referenced by '{}.{}'",
                            table.name, child_table.name, fk.column
                        )));
                    }
                }
            }
        }
    }

    for (id, _) in &matched {
        heap::delete_record(ctx.buffer, *id)?;
    }

    let count = heap::count_live_rows(ctx.buffer, ctx.table_dir, &table)?;
    ctx.catalog.set_row_count(&table.name, count)?;
    log::debug!("deleted {} row(s) from '{}'", matched.len(), table.name);
    Ok(matched.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use buffer::BufferPool;
    use catalog::Catalog;
    use common::ReplacementPolicy;
    use heap::TableDirectory;
    use parser::ast::Statement;
    use storage::PageManager;
    use tempfile::tempdir;

    fn create(ctx: &mut ExecutionContext, sql: &str) {
        match parser::parse_statement(sql).unwrap() {
            Statement::CreateTable(c) => create_table(ctx, &c).unwrap(),
            _ => panic!("expected create table"),
        }
    }

    fn do_insert(ctx: &mut ExecutionContext, sql: &str) -> DbResult<u64> {
        match parser::parse_statement(sql).unwrap() {
            Statement::Insert(i) => insert(ctx, &i),
            _ => panic!("expected insert"),
        }
    }

    fn do_delete(ctx: &mut ExecutionContext, sql: &str) -> DbResult<u64> {
        match parser::parse_statement(sql).unwrap() {
            Statement::Delete(d) => delete(ctx, &d),
            _ => panic!("expected delete"),
        }
    }

    fn do_update(ctx: &mut ExecutionContext, sql: &str) -> DbResult<u64> {
        match parser::parse_statement(sql).unwrap() {
            Statement::Update(u) => update(ctx, &u),
            _ => panic!("expected update"),
        }
    }

    struct Harness {
        buffer: BufferPool,
        catalog: Catalog,
        table_dir: TableDirectory,
    }

    impl Harness {
        fn new() -> (Self, tempfile::TempDir) {
            let dir = tempdir().unwrap();
            let pager = PageManager::open(dir.path()).unwrap();
            let buffer = BufferPool::open(pager, 32, ReplacementPolicy::Lru);
            let catalog = Catalog::open(dir.path()).unwrap();
            let table_dir = TableDirectory::open(dir.path()).unwrap();
            (Self { buffer, catalog, table_dir }, dir)
        }

        fn ctx(&mut self) -> ExecutionContext<'_> {
            ExecutionContext { buffer: &mut self.buffer, catalog: &mut self.catalog, table_dir: &mut self.table_dir }
        }
    }

    #[test]
    fn duplicate_primary_key_is_rejected() {
        let (mut h, _dir) = Harness::new();
        let mut ctx = h.ctx();
        create(&mut ctx, "CREATE TABLE students (id INT, name VARCHAR(20), PRIMARY KEY (id));");
        do_insert(&mut ctx, "INSERT INTO students VALUES (1, 'Alice');").unwrap();
        let err = do_insert(&mut ctx, "INSERT INTO students VALUES (1, 'Bob');").unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
    }

    #[test]
    fn foreign_key_without_matching_parent_is_rejected() {
        let (mut h, _dir) = Harness::new();
        let mut ctx = h.ctx();
        create(&mut ctx, "CREATE TABLE students (id INT, PRIMARY KEY (id));");
        create(
            &mut ctx,
            "CREATE TABLE enrollments (id INT, student_id INT, PRIMARY KEY (id), FOREIGN KEY (student_id) REFERENCES students(id));",
        );
        let err = do_insert(&mut ctx, "INSERT INTO enrollments VALUES (1, 99);").unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
        let msg = err.to_string();
        assert!(msg.contains("外键约束失败"));
        assert!(msg.contains("智能提示"));
    }

    #[test]
    fn delete_referenced_row_is_restricted() {
        let (mut h, _dir) = Harness::new();
        let mut ctx = h.ctx();
        create(&mut ctx, "CREATE TABLE students (id INT, PRIMARY KEY (id));");
        create(
            &mut ctx,
            "CREATE TABLE enrollments (id INT, student_id INT, PRIMARY KEY (id), FOREIGN KEY (student_id) REFERENCES students(id));",
        );
        do_insert(&mut ctx, "INSERT INTO students VALUES (1);").unwrap();
        do_insert(&mut ctx, "INSERT INTO enrollments VALUES (1, 1);").unwrap();
        let err = do_delete(&mut ctx, "DELETE FROM students WHERE id = 1;").unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
    }

    #[test]
    fn update_cascades_primary_key_change_to_referencing_rows() {
        let (mut h, _dir) = Harness::new();
        let mut ctx = h.ctx();
        create(&mut ctx, "CREATE TABLE students (id INT, PRIMARY KEY (id));");
        create(
            &mut ctx,
            "CREATE TABLE enrollments (id INT, student_id INT, PRIMARY KEY (id), FOREIGN KEY (student_id) REFERENCES students(id));",
        );
        do_insert(&mut ctx, "INSERT INTO students VALUES (1);").unwrap();
        do_insert(&mut ctx, "INSERT INTO enrollments VALUES (1, 1);").unwrap();

        do_update(&mut ctx, "UPDATE students SET id = 2 WHERE id = 1;").unwrap();

        let rows = heap::scan(ctx.buffer, ctx.table_dir, ctx.catalog.get("enrollments").unwrap(), None).unwrap();
        assert_eq!(rows[0].1[1], Value::Int(2));
    }

    #[test]
    fn varchar_length_bound_is_enforced() {
        let (mut h, _dir) = Harness::new();
        let mut ctx = h.ctx();
        create(&mut ctx, "CREATE TABLE students (id INT, name VARCHAR(3), PRIMARY KEY (id));");
        let err = do_insert(&mut ctx, "INSERT INTO students VALUES (1, 'Alice');").unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
        do_insert(&mut ctx, "INSERT INTO students VALUES (2, 'Bob');").unwrap();
    }

    #[test]
    fn bool_coerces_from_int_and_string() {
        let (mut h, _dir) = Harness::new();
        let mut ctx = h.ctx();
        create(&mut ctx, "CREATE TABLE flags (id INT, active BOOL, PRIMARY KEY (id));");
        do_insert(&mut ctx, "INSERT INTO flags VALUES (1, 1);").unwrap();
        do_insert(&mut ctx, "INSERT INTO flags VALUES (2, 0);").unwrap();
        do_insert(&mut ctx, "INSERT INTO flags VALUES (3, 'true');").unwrap();
        do_insert(&mut ctx, "INSERT INTO flags VALUES (4, 'F');").unwrap();
        let rows = heap::scan(ctx.buffer, ctx.table_dir, ctx.catalog.get("flags").unwrap(), None).unwrap();
        let by_id: std::collections::HashMap<i32, Value> = rows
            .into_iter()
            .map(|(_, v)| match &v[0] {
                Value::Int(i) => (*i, v[1].clone()),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(by_id[&1], Value::Bool(true));
        assert_eq!(by_id[&2], Value::Bool(false));
        assert_eq!(by_id[&3], Value::Bool(true));
        assert_eq!(by_id[&4], Value::Bool(false));
    }

    #[test]
    fn plain_delete_removes_row_and_updates_row_count() {
        let (mut h, _dir) = Harness::new();
        let mut ctx = h.ctx();
        create(&mut ctx, "CREATE TABLE students (id INT, PRIMARY KEY (id));");
        do_insert(&mut ctx, "INSERT INTO students VALUES (1);").unwrap();
        do_insert(&mut ctx, "INSERT INTO students VALUES (2);").unwrap();
        let affected = do_delete(&mut ctx, "DELETE FROM students WHERE id = 1;").unwrap();
        assert_eq!(affected, 1);
        assert_eq!(ctx.catalog.get("students").unwrap().row_count, 1);
    }
}
