//! Statement AST produced by the recursive-descent parser. WHERE/ON
//! conditions reuse [`expr::Expr`] directly rather than re-declaring a
//! parallel expression tree.

use expr::Expr;
use types::{SqlType, Value};

#[derive(Clone, Debug)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    /// The name queries should key rows under: the alias if given, else the
    /// bare table name.
    pub fn binding(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Clone, Debug)]
pub enum AggKind {
    Count,
    Sum,
    Avg,
}

#[derive(Clone, Debug)]
pub enum AggArg {
    Star,
    Column(expr::ColumnRef),
}

#[derive(Clone, Debug)]
pub enum SelectItem {
    Star,
    Column { column: expr::ColumnRef, alias: Option<String> },
    Aggregate { kind: AggKind, arg: AggArg, alias: Option<String> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderDir {
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

#[derive(Clone, Debug)]
pub struct JoinClause {
    pub table: TableRef,
    pub join_type: JoinType,
    pub on: Expr,
}

#[derive(Clone, Debug)]
pub struct SelectStmt {
    pub items: Vec<SelectItem>,
    pub from: TableRef,
    pub joins: Vec<JoinClause>,
    pub where_clause: Option<Expr>,
    pub group_by: Option<String>,
    pub order_by: Option<(String, OrderDir)>,
}

#[derive(Clone, Debug)]
pub struct InsertStmt {
    pub table: String,
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Clone, Debug)]
pub struct UpdateStmt {
    pub table: String,
    pub assignments: Vec<(String, Value)>,
    pub where_clause: Option<Expr>,
}

#[derive(Clone, Debug)]
pub struct DeleteStmt {
    pub table: String,
    pub where_clause: Option<Expr>,
}

#[derive(Clone, Debug)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
}

#[derive(Clone, Debug)]
pub struct ForeignKeyDef {
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

#[derive(Clone, Debug)]
pub struct CreateTableStmt {
    pub table: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Option<String>,
    pub foreign_keys: Vec<ForeignKeyDef>,
}

#[derive(Clone, Debug)]
pub enum Statement {
    Select(SelectStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    CreateTable(CreateTableStmt),
    Explain(Box<Statement>),
}

impl Statement {
    /// The statement kind keyword, used to pick which pedagogical LL(1)
    /// grammar the trace debugger should run.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Select(_) => "select",
            Statement::Insert(_) => "insert",
            Statement::Update(_) => "update",
            Statement::Delete(_) => "delete",
            Statement::CreateTable(_) => "create",
            Statement::Explain(inner) => inner.kind_name(),
        }
    }
}
