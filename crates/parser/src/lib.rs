//! SQL front end: lexer, recursive-descent parser, smart-hint diagnostics,
//! and a pedagogical LL(1) trace simulator that runs alongside the real
//! parser purely for `EXPLAIN`-style teaching output.

pub mod ast;
pub mod diag;
pub mod grammar;
pub mod lexer;

use ast::*;
use expr::{ColumnRef, ComparisonOp, Expr, LogicalOp, Operand};
use lexer::{tokenize, LexError, Token, TokenKind};
use types::{SqlType, Value};

#[derive(Debug)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub col: usize,
    pub hint: Option<String>,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (line {}, col {})", self.message, self.line, self.col)?;
        if let Some(hint) = &self.hint {
            write!(f, "\n{hint}")?;
        }
        Ok(())
    }
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError { message: e.message, line: e.line, col: e.col, hint: None }
    }
}

const KEYWORD_UNIVERSE: &[&str] = lexer::KEYWORDS;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn error_at(&self, tok: &Token, message: impl Into<String>) -> ParseError {
        ParseError { message: message.into(), line: tok.line, col: tok.col, hint: None }
    }

    fn error_expected(&self, expected: &[&str]) -> ParseError {
        let expected_owned: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
        self.error_expected_owned(expected_owned)
    }

    fn error_expected_owned(&self, expected: Vec<String>) -> ParseError {
        let tok = self.peek().clone();
        let hint = diag::suggest_expected_vs_got(&expected, &tok.text());
        ParseError {
            message: format!("expected one of {expected:?}, found '{}'", tok.text()),
            line: tok.line,
            col: tok.col,
            hint: Some(hint),
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Keyword(k) if k == kw)
    }

    fn is_delim(&self, c: char) -> bool {
        matches!(self.peek().kind, TokenKind::Delimiter(d) if d == c)
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn expect_keyword(&mut self, kw: &'static str) -> Result<Token, ParseError> {
        if self.is_keyword(kw) {
            Ok(self.advance())
        } else {
            Err(self.error_expected(&[kw]))
        }
    }

    fn expect_delim(&mut self, c: char) -> Result<Token, ParseError> {
        if self.is_delim(c) {
            Ok(self.advance())
        } else {
            Err(self.error_expected_owned(vec![c.to_string()]))
        }
    }

    fn expect_identifier(&mut self) -> Result<String, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_expected(&["IDENTIFIER"])),
        }
    }

    fn expect_operator(&mut self) -> Result<ComparisonOp, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Operator(op) => {
                self.advance();
                comparison_op_from_symbol(&op).ok_or_else(|| self.error_at(self.peek(), format!("unknown operator '{op}'")))
            }
            _ => Err(self.error_expected(&["OPERATOR"])),
        }
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        if self.is_keyword("EXPLAIN") {
            self.advance();
            let inner = self.parse_statement_body()?;
            self.expect_delim(';')?;
            return Ok(Statement::Explain(Box::new(inner)));
        }
        let stmt = self.parse_statement_body()?;
        self.expect_delim(';')?;
        Ok(stmt)
    }

    fn parse_statement_body(&mut self) -> Result<Statement, ParseError> {
        if self.is_keyword("SELECT") {
            self.parse_select().map(Statement::Select)
        } else if self.is_keyword("INSERT") {
            self.parse_insert().map(Statement::Insert)
        } else if self.is_keyword("UPDATE") {
            self.parse_update().map(Statement::Update)
        } else if self.is_keyword("DELETE") {
            self.parse_delete().map(Statement::Delete)
        } else if self.is_keyword("CREATE") {
            self.parse_create_table().map(Statement::CreateTable)
        } else {
            Err(self.error_expected(&["SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "EXPLAIN"]))
        }
    }

    // ---- CREATE TABLE ----

    fn parse_create_table(&mut self) -> Result<CreateTableStmt, ParseError> {
        self.expect_keyword("CREATE")?;
        self.expect_keyword("TABLE")?;
        let table = self.expect_identifier()?;
        self.expect_delim('(')?;

        let mut columns = Vec::new();
        let mut primary_key = None;
        let mut foreign_keys = Vec::new();
        loop {
            if self.is_keyword("PRIMARY") {
                self.advance();
                self.expect_keyword("KEY")?;
                self.expect_delim('(')?;
                primary_key = Some(self.expect_identifier()?);
                self.expect_delim(')')?;
            } else if self.is_keyword("FOREIGN") {
                self.advance();
                self.expect_keyword("KEY")?;
                self.expect_delim('(')?;
                let column = self.expect_identifier()?;
                self.expect_delim(')')?;
                self.expect_keyword("REFERENCES")?;
                let ref_table = self.expect_identifier()?;
                self.expect_delim('(')?;
                let ref_column = self.expect_identifier()?;
                self.expect_delim(')')?;
                foreign_keys.push(ForeignKeyDef { column, ref_table, ref_column });
            } else {
                let name = self.expect_identifier()?;
                let sql_type = self.parse_type()?;
                if self.is_keyword("PRIMARY") {
                    self.advance();
                    self.expect_keyword("KEY")?;
                    primary_key = Some(name.clone());
                }
                columns.push(ColumnDef { name, sql_type });
            }
            if self.is_delim(',') {
                self.advance();
                continue;
            }
            break;
        }
        self.expect_delim(')')?;
        Ok(CreateTableStmt { table, columns, primary_key, foreign_keys })
    }

    fn parse_type(&mut self) -> Result<SqlType, ParseError> {
        if self.is_keyword("INT") {
            self.advance();
            return Ok(SqlType::Int);
        }
        if self.is_keyword("FLOAT") {
            self.advance();
            return Ok(SqlType::Float);
        }
        if self.is_keyword("BOOL") {
            self.advance();
            return Ok(SqlType::Bool);
        }
        if self.is_keyword("VARCHAR") {
            self.advance();
            if self.is_delim('(') {
                self.advance();
                let n_tok = self.peek().clone();
                let n = match &n_tok.kind {
                    TokenKind::Number(s) => s.parse::<u32>().map_err(|_| self.error_at(&n_tok, "invalid VARCHAR length"))?,
                    _ => return Err(self.error_expected(&["NUMBER"])),
                };
                self.advance();
                self.expect_delim(')')?;
                return Ok(SqlType::Varchar(Some(n)));
            }
            return Ok(SqlType::Varchar(None));
        }
        Err(self.error_expected(&["INT", "FLOAT", "BOOL", "VARCHAR"]))
    }

    // ---- INSERT ----

    fn parse_insert(&mut self) -> Result<InsertStmt, ParseError> {
        self.expect_keyword("INSERT")?;
        self.expect_keyword("INTO")?;
        let table = self.expect_identifier()?;

        let columns = if self.is_delim('(') {
            self.advance();
            let mut cols = vec![self.expect_identifier()?];
            while self.is_delim(',') {
                self.advance();
                cols.push(self.expect_identifier()?);
            }
            self.expect_delim(')')?;
            Some(cols)
        } else {
            None
        };

        self.expect_keyword("VALUES")?;
        let mut rows = vec![self.parse_value_tuple()?];
        while self.is_delim(',') {
            self.advance();
            rows.push(self.parse_value_tuple()?);
        }
        Ok(InsertStmt { table, columns, rows })
    }

    fn parse_value_tuple(&mut self) -> Result<Vec<Value>, ParseError> {
        self.expect_delim('(')?;
        let mut values = vec![self.parse_value_literal()?];
        while self.is_delim(',') {
            self.advance();
            values.push(self.parse_value_literal()?);
        }
        self.expect_delim(')')?;
        Ok(values)
    }

    fn parse_value_literal(&mut self) -> Result<Value, ParseError> {
        let tok = self.peek().clone();
        match &tok.kind {
            TokenKind::Number(s) => {
                self.advance();
                if s.contains('.') {
                    Ok(Value::Float(s.parse().map_err(|_| self.error_at(&tok, "invalid number"))?))
                } else {
                    Ok(Value::Int(s.parse().map_err(|_| self.error_at(&tok, "invalid number"))?))
                }
            }
            TokenKind::StringLit(s) => {
                self.advance();
                Ok(Value::Varchar(s.clone()))
            }
            TokenKind::Keyword(k) if k == "TRUE" => {
                self.advance();
                Ok(Value::Bool(true))
            }
            TokenKind::Keyword(k) if k == "FALSE" => {
                self.advance();
                Ok(Value::Bool(false))
            }
            TokenKind::Keyword(k) if k == "NULL" => {
                self.advance();
                Ok(Value::Null)
            }
            _ => Err(self.error_expected(&["NUMBER", "STRING", "TRUE", "FALSE", "NULL"])),
        }
    }

    // ---- UPDATE ----

    fn parse_update(&mut self) -> Result<UpdateStmt, ParseError> {
        self.expect_keyword("UPDATE")?;
        let table = self.expect_identifier()?;
        self.expect_keyword("SET")?;
        let mut assignments = vec![self.parse_assignment()?];
        while self.is_delim(',') {
            self.advance();
            assignments.push(self.parse_assignment()?);
        }
        let where_clause = self.parse_where_opt()?;
        Ok(UpdateStmt { table, assignments, where_clause })
    }

    fn parse_assignment(&mut self) -> Result<(String, Value), ParseError> {
        let column = self.expect_identifier()?;
        let op = self.expect_operator()?;
        if op != ComparisonOp::Eq {
            return Err(self.error_at(self.peek(), "assignment must use '='"));
        }
        let value = self.parse_value_literal()?;
        Ok((column, value))
    }

    // ---- DELETE ----

    fn parse_delete(&mut self) -> Result<DeleteStmt, ParseError> {
        self.expect_keyword("DELETE")?;
        self.expect_keyword("FROM")?;
        let table = self.expect_identifier()?;
        let where_clause = self.parse_where_opt()?;
        Ok(DeleteStmt { table, where_clause })
    }

    fn parse_where_opt(&mut self) -> Result<Option<Expr>, ParseError> {
        if self.is_keyword("WHERE") {
            self.advance();
            Ok(Some(self.parse_bool_expr()?))
        } else {
            Ok(None)
        }
    }

    // ---- SELECT ----

    fn parse_select(&mut self) -> Result<SelectStmt, ParseError> {
        self.expect_keyword("SELECT")?;
        let items = self.parse_select_list()?;
        self.expect_keyword("FROM")?;
        let from = self.parse_table_ref()?;

        let mut joins = Vec::new();
        while self.is_keyword("JOIN") || self.is_keyword("LEFT") || self.is_keyword("INNER") {
            let join_type = if self.is_keyword("LEFT") {
                self.advance();
                JoinType::Left
            } else if self.is_keyword("INNER") {
                self.advance();
                JoinType::Inner
            } else {
                JoinType::Inner
            };
            self.expect_keyword("JOIN")?;
            let table = self.parse_table_ref()?;
            self.expect_keyword("ON")?;
            let on = self.parse_bool_expr()?;
            joins.push(JoinClause { table, join_type, on });
        }

        let where_clause = self.parse_where_opt()?;

        let group_by = if self.is_keyword("GROUP") {
            self.advance();
            self.expect_keyword("BY")?;
            Some(self.expect_identifier()?)
        } else {
            None
        };

        let order_by = if self.is_keyword("ORDER") {
            self.advance();
            self.expect_keyword("BY")?;
            let col = self.expect_identifier()?;
            let dir = if self.is_keyword("DESC") {
                self.advance();
                OrderDir::Desc
            } else {
                if self.is_keyword("ASC") {
                    self.advance();
                }
                OrderDir::Asc
            };
            Some((col, dir))
        } else {
            None
        };

        Ok(SelectStmt { items, from, joins, where_clause, group_by, order_by })
    }

    fn parse_select_list(&mut self) -> Result<Vec<SelectItem>, ParseError> {
        let mut items = vec![self.parse_select_item()?];
        while self.is_delim(',') {
            self.advance();
            items.push(self.parse_select_item()?);
        }
        Ok(items)
    }

    fn parse_select_item(&mut self) -> Result<SelectItem, ParseError> {
        if self.is_delim('*') {
            self.advance();
            return Ok(SelectItem::Star);
        }
        if self.is_keyword("COUNT") || self.is_keyword("SUM") || self.is_keyword("AVG") {
            let kind = if self.is_keyword("COUNT") {
                AggKind::Count
            } else if self.is_keyword("SUM") {
                AggKind::Sum
            } else {
                AggKind::Avg
            };
            self.advance();
            self.expect_delim('(')?;
            let arg = if matches!(kind, AggKind::Count) && self.is_delim('*') {
                self.advance();
                AggArg::Star
            } else {
                AggArg::Column(self.parse_column_ref()?)
            };
            self.expect_delim(')')?;
            let alias = self.parse_alias_opt()?;
            return Ok(SelectItem::Aggregate { kind, arg, alias });
        }
        let column = self.parse_column_ref()?;
        let alias = self.parse_alias_opt()?;
        Ok(SelectItem::Column { column, alias })
    }

    fn parse_alias_opt(&mut self) -> Result<Option<String>, ParseError> {
        if self.is_keyword("AS") {
            self.advance();
            return Ok(Some(self.expect_identifier()?));
        }
        if let TokenKind::Identifier(name) = self.peek().kind.clone() {
            self.advance();
            return Ok(Some(name));
        }
        Ok(None)
    }

    fn parse_table_ref(&mut self) -> Result<TableRef, ParseError> {
        let name = self.expect_identifier()?;
        let alias = if let TokenKind::Identifier(a) = self.peek().kind.clone() {
            self.advance();
            Some(a)
        } else {
            None
        };
        Ok(TableRef { name, alias })
    }

    fn parse_column_ref(&mut self) -> Result<ColumnRef, ParseError> {
        let first = self.expect_identifier()?;
        if self.is_delim('.') {
            self.advance();
            let second = self.expect_identifier()?;
            return Ok(ColumnRef::qualified(first, second));
        }
        Ok(ColumnRef::bare(first))
    }

    // ---- Boolean expressions: OR > AND > NOT/parens/predicate ----

    fn parse_bool_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_bool_term()?;
        while self.is_keyword("OR") {
            self.advance();
            let right = self.parse_bool_term()?;
            left = Expr::Logical { left: Box::new(left), op: LogicalOp::Or, right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_bool_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_bool_factor()?;
        while self.is_keyword("AND") {
            self.advance();
            let right = self.parse_bool_factor()?;
            left = Expr::Logical { left: Box::new(left), op: LogicalOp::And, right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_bool_factor(&mut self) -> Result<Expr, ParseError> {
        if self.is_keyword("NOT") {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_bool_factor()?)));
        }
        if self.is_delim('(') {
            self.advance();
            let inner = self.parse_bool_expr()?;
            self.expect_delim(')')?;
            return Ok(inner);
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_column_ref()?;
        let op = self.expect_operator()?;
        let right = self.parse_predicate_operand()?;
        Ok(Expr::Compare { left: Operand::Column(left), op, right })
    }

    fn parse_predicate_operand(&mut self) -> Result<Operand, ParseError> {
        let tok = self.peek().clone();
        match &tok.kind {
            TokenKind::Number(_) | TokenKind::StringLit(_) => Ok(Operand::Literal(self.parse_value_literal()?)),
            TokenKind::Keyword(k) if k == "TRUE" || k == "FALSE" || k == "NULL" => {
                Ok(Operand::Literal(self.parse_value_literal()?))
            }
            TokenKind::Identifier(_) => Ok(Operand::Column(self.parse_column_ref()?)),
            _ => Err(self.error_expected(&["NUMBER", "STRING", "IDENTIFIER"])),
        }
    }
}

fn comparison_op_from_symbol(sym: &str) -> Option<ComparisonOp> {
    Some(match sym {
        "=" => ComparisonOp::Eq,
        "!=" | "<>" => ComparisonOp::NotEq,
        "<" => ComparisonOp::Lt,
        "<=" => ComparisonOp::Lte,
        ">" => ComparisonOp::Gt,
        ">=" => ComparisonOp::Gte,
        _ => return None,
    })
}

/// Parses exactly one statement, terminated by its trailing `;`. Splitting
/// multi-statement input on semicolons outside quotes is the CLI's job.
pub fn parse_statement(sql: &str) -> Result<Statement, ParseError> {
    let tokens = tokenize(sql)?;
    let mut parser = Parser::new(tokens);
    let result = parser.parse_statement();
    if let Err(e) = &result {
        log::debug!("parse error at line {}, col {}: {}", e.line, e.col, e.message);
    }
    result
}

/// Tokenizes a statement into the abstract terminal symbols the pedagogical
/// LL(1) grammars expect (`IDENTIFIER`, `NUMBER`, keyword text, ...),
/// dropping the trailing end-of-file marker the trace driver adds itself.
pub fn trace_symbols(sql: &str) -> Result<Vec<String>, LexError> {
    let tokens = tokenize(sql)?;
    Ok(tokens
        .iter()
        .filter(|t| !matches!(t.kind, TokenKind::Eof))
        .map(grammar::terminal_symbol)
        .collect())
}

/// Runs the pedagogical LL(1) trace for a statement already known to parse
/// successfully, selecting the grammar by its statement kind.
pub fn run_trace(sql: &str, kind: &str, explain: bool) -> Result<grammar::TraceResult, LexError> {
    let symbols = trace_symbols(sql)?;
    let g = grammar::grammar_for(kind, explain);
    Ok(grammar::trace(&g, &symbols))
}

pub fn known_keywords() -> &'static [&'static str] {
    KEYWORD_UNIVERSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_select() {
        let stmt = parse_statement("SELECT id, name FROM students;").unwrap();
        match stmt {
            Statement::Select(s) => {
                assert_eq!(s.items.len(), 2);
                assert_eq!(s.from.name, "students");
            }
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn parses_select_with_join_and_where_and_order() {
        let stmt = parse_statement(
            "SELECT s.name, e.grade FROM students s JOIN enrollments e ON s.id = e.student_id WHERE s.age >= 18 ORDER BY e.grade DESC;",
        )
        .unwrap();
        match stmt {
            Statement::Select(s) => {
                assert_eq!(s.joins.len(), 1);
                assert!(s.where_clause.is_some());
                assert_eq!(s.order_by.unwrap().1, OrderDir::Desc);
            }
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn parses_left_join_defaults_inner_otherwise() {
        let stmt = parse_statement(
            "SELECT * FROM departments d LEFT JOIN employees e ON d.dept_id = e.dept_id;",
        )
        .unwrap();
        match stmt {
            Statement::Select(s) => assert_eq!(s.joins[0].join_type, JoinType::Left),
            _ => panic!("expected select"),
        }

        let stmt = parse_statement(
            "SELECT * FROM departments d JOIN employees e ON d.dept_id = e.dept_id;",
        )
        .unwrap();
        match stmt {
            Statement::Select(s) => assert_eq!(s.joins[0].join_type, JoinType::Inner),
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn parses_select_with_and_or_not_parens() {
        let stmt = parse_statement("SELECT * FROM t WHERE NOT (age < 18 OR age > 65) AND active = TRUE;").unwrap();
        assert!(matches!(stmt, Statement::Select(_)));
    }

    #[test]
    fn parses_multi_row_insert() {
        let stmt = parse_statement("INSERT INTO t (id, name) VALUES (1, 'Alice'), (2, 'Bob');").unwrap();
        match stmt {
            Statement::Insert(i) => assert_eq!(i.rows.len(), 2),
            _ => panic!("expected insert"),
        }
    }

    #[test]
    fn parses_create_table_with_pk_and_fk() {
        let stmt = parse_statement(
            "CREATE TABLE enrollments (id INT, student_id INT, PRIMARY KEY (id), FOREIGN KEY (student_id) REFERENCES students(id));",
        )
        .unwrap();
        match stmt {
            Statement::CreateTable(c) => {
                assert_eq!(c.primary_key.as_deref(), Some("id"));
                assert_eq!(c.foreign_keys.len(), 1);
            }
            _ => panic!("expected create table"),
        }
    }

    #[test]
    fn parses_star_mixed_with_other_select_items() {
        let stmt = parse_statement("SELECT *, COUNT(*) FROM students;").unwrap();
        match stmt {
            Statement::Select(s) => {
                assert_eq!(s.items.len(), 2);
                assert!(matches!(s.items[0], SelectItem::Star));
            }
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn parses_create_table_with_inline_primary_key() {
        let stmt = parse_statement("CREATE TABLE students (id INT PRIMARY KEY, name VARCHAR(20));").unwrap();
        match stmt {
            Statement::CreateTable(c) => {
                assert_eq!(c.primary_key.as_deref(), Some("id"));
                assert_eq!(c.columns.len(), 2);
            }
            _ => panic!("expected create table"),
        }
    }

    #[test]
    fn parses_explain_wrapper() {
        let stmt = parse_statement("EXPLAIN SELECT * FROM t;").unwrap();
        assert!(matches!(stmt, Statement::Explain(_)));
    }

    #[test]
    fn malformed_statement_carries_smart_hint() {
        let err = parse_statement("SELET * FROM t;").unwrap_err();
        assert!(err.hint.is_some());
    }

    #[test]
    fn trace_symbols_match_grammar_terminals() {
        let symbols = trace_symbols("DELETE FROM t WHERE id = 1;").unwrap();
        assert_eq!(symbols, vec!["DELETE", "FROM", "IDENTIFIER", "WHERE", "IDENTIFIER", "OPERATOR", "NUMBER", ";"]);
    }
}
