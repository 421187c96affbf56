//! Pedagogical LL(1) table-driven parse simulation. This runs *alongside*
//! the real recursive-descent parser purely as a teaching aid: each
//! statement kind gets its own small, left-factored, non-left-recursive
//! grammar, and [`trace`] drives a stack machine over it while recording
//! every `(stack, remaining input, action)` step so a learner can see
//! exactly how a predictive parser consumes a token stream.
//!
//! These grammars never reject input the real parser accepted and never
//! accept input the real parser rejected on their own — they run over the
//! same token stream only to produce the trace, not to gate execution.

use std::collections::{HashMap, HashSet};

use crate::lexer::{Token, TokenKind};

pub const END_MARKER: &str = "#";
pub const EPSILON: &str = "ε";

pub struct Grammar {
    pub start: &'static str,
    pub productions: HashMap<&'static str, Vec<Vec<&'static str>>>,
    pub terminals: HashSet<&'static str>,
    pub non_terminals: HashSet<&'static str>,
}

impl Grammar {
    fn is_terminal(&self, sym: &str) -> bool {
        sym == EPSILON || self.terminals.contains(sym)
    }
}

macro_rules! grammar {
    (start: $start:expr, terminals: [$($t:expr),* $(,)?], rules: { $($nt:expr => [$([$($sym:expr),* $(,)?]),+ $(,)?]),+ $(,)? }) => {{
        let mut productions: HashMap<&'static str, Vec<Vec<&'static str>>> = HashMap::new();
        $(
            productions.insert($nt, vec![$(vec![$($sym),*]),+]);
        )+
        let non_terminals: HashSet<&'static str> = productions.keys().copied().collect();
        let terminals: HashSet<&'static str> = [$($t),*].into_iter().collect();
        Grammar { start: $start, productions, terminals, non_terminals }
    }};
}

pub fn grammar_select() -> Grammar {
    grammar! {
        start: "SelectStmt",
        terminals: [
            "SELECT", "FROM", "JOIN", "INNER", "LEFT", "ON", "WHERE", "GROUP", "BY", "ORDER", "ASC", "DESC",
            "AS", "COUNT", "SUM", "AVG", "IDENTIFIER", "NUMBER", "STRING", "OPERATOR",
            "(", ")", ",", ".", "*", ";", "#",
        ],
        rules: {
            "SelectStmt" => [["SELECT", "SelectList", "FROM", "TableRef", "JoinList", "WhereOpt", "GroupOpt", "OrderOpt", ";"]],
            "SelectList" => [["SelectItem", "SelectListTail"]],
            "SelectListTail" => [[",", "SelectItem", "SelectListTail"], [EPSILON]],
            "SelectItem" => [["*"], ["Aggregate", "AliasOpt"], ["ColumnRef", "AliasOpt"]],
            "AliasOpt" => [["AS", "IDENTIFIER"], ["IDENTIFIER"], [EPSILON]],
            "Aggregate" => [["COUNT", "(", "AggArg", ")"], ["SUM", "(", "ColumnRef", ")"], ["AVG", "(", "ColumnRef", ")"]],
            "AggArg" => [["*"], ["ColumnRef"]],
            "ColumnRef" => [["IDENTIFIER", "ColumnRefTail"]],
            "ColumnRefTail" => [[".", "IDENTIFIER"], [EPSILON]],
            "TableRef" => [["IDENTIFIER", "TableAliasOpt"]],
            "TableAliasOpt" => [["IDENTIFIER"], [EPSILON]],
            "JoinList" => [["Join", "JoinList"], [EPSILON]],
            "Join" => [["JoinKind", "JOIN", "IDENTIFIER", "TableAliasOpt", "ON", "BoolExpr"]],
            "JoinKind" => [["INNER"], ["LEFT"], [EPSILON]],
            "WhereOpt" => [["WHERE", "BoolExpr"], [EPSILON]],
            "GroupOpt" => [["GROUP", "BY", "IDENTIFIER"], [EPSILON]],
            "OrderOpt" => [["ORDER", "BY", "IDENTIFIER", "OrderDir"], [EPSILON]],
            "OrderDir" => [["ASC"], ["DESC"], [EPSILON]],
            "BoolExpr" => [["BoolTerm", "BoolExprTail"]],
            "BoolExprTail" => [["OR", "BoolTerm", "BoolExprTail"], [EPSILON]],
            "BoolTerm" => [["BoolFactor", "BoolTermTail"]],
            "BoolTermTail" => [["AND", "BoolFactor", "BoolTermTail"], [EPSILON]],
            "BoolFactor" => [["NOT", "BoolFactor"], ["(", "BoolExpr", ")"], ["Predicate"]],
            "Predicate" => [["ColumnRef", "OPERATOR", "Value"]],
            "Value" => [["NUMBER"], ["STRING"], ["IDENTIFIER"]],
        }
    }
}

pub fn grammar_insert() -> Grammar {
    grammar! {
        start: "InsertStmt",
        terminals: ["INSERT", "INTO", "VALUES", "IDENTIFIER", "NUMBER", "STRING", "(", ")", ",", ";", "#"],
        rules: {
            "InsertStmt" => [["INSERT", "INTO", "IDENTIFIER", "InsertCols", "VALUES", "(", "ValueList", ")", "InsertTail", ";"]],
            "InsertCols" => [["(", "ColumnList", ")"], [EPSILON]],
            "ColumnList" => [["IDENTIFIER", "ColumnListTail"]],
            "ColumnListTail" => [[",", "IDENTIFIER", "ColumnListTail"], [EPSILON]],
            "ValueList" => [["Value", "ValueListTail"]],
            "ValueListTail" => [[",", "Value", "ValueListTail"], [EPSILON]],
            "Value" => [["NUMBER"], ["STRING"], ["IDENTIFIER"]],
            "InsertTail" => [[",", "(", "ValueList", ")", "InsertTail"], [EPSILON]],
        }
    }
}

pub fn grammar_update() -> Grammar {
    grammar! {
        start: "UpdateStmt",
        terminals: ["UPDATE", "IDENTIFIER", "SET", "OPERATOR", ",", "WHERE", "NUMBER", "STRING", ";", "#"],
        rules: {
            "UpdateStmt" => [["UPDATE", "IDENTIFIER", "SET", "AssignmentList", "WhereOpt", ";"]],
            "AssignmentList" => [["IDENTIFIER", "AssignOp", "Value", "AssignTail"]],
            "AssignTail" => [[",", "IDENTIFIER", "AssignOp", "Value", "AssignTail"], [EPSILON]],
            "AssignOp" => [["OPERATOR"]],
            "WhereOpt" => [["WHERE", "IDENTIFIER", "OPERATOR", "Value"], [EPSILON]],
            "Value" => [["NUMBER"], ["STRING"], ["IDENTIFIER"]],
        }
    }
}

pub fn grammar_delete() -> Grammar {
    grammar! {
        start: "DeleteStmt",
        terminals: ["DELETE", "FROM", "IDENTIFIER", "WHERE", "OPERATOR", "NUMBER", "STRING", ";", "#"],
        rules: {
            "DeleteStmt" => [["DELETE", "FROM", "IDENTIFIER", "WhereOpt", ";"]],
            "WhereOpt" => [["WHERE", "IDENTIFIER", "OPERATOR", "Value"], [EPSILON]],
            "Value" => [["NUMBER"], ["STRING"], ["IDENTIFIER"]],
        }
    }
}

pub fn grammar_create_table() -> Grammar {
    grammar! {
        start: "CreateStmt",
        terminals: ["CREATE", "TABLE", "IDENTIFIER", "(", ")", ",", "INT", "VARCHAR", "FLOAT", "BOOL", ";", "#"],
        rules: {
            "CreateStmt" => [["CREATE", "TABLE", "IDENTIFIER", "(", "ColumnDefs", ")", ";"]],
            "ColumnDefs" => [["IDENTIFIER", "Type", "ColumnDefsTail"]],
            "ColumnDefsTail" => [[",", "IDENTIFIER", "Type", "ColumnDefsTail"], [EPSILON]],
            "Type" => [["INT"], ["VARCHAR"], ["FLOAT"], ["BOOL"]],
        }
    }
}

/// Wraps any of the above behind a leading `EXPLAIN` terminal.
pub fn grammar_explain_of(kind: &str) -> Grammar {
    let mut inner = match kind {
        "select" => grammar_select(),
        "insert" => grammar_insert(),
        "update" => grammar_update(),
        "delete" => grammar_delete(),
        "create" => grammar_create_table(),
        other => panic!("unsupported EXPLAIN kind: {other}"),
    };
    inner.productions.insert("ExplainStmt", vec![vec!["EXPLAIN", inner.start]]);
    inner.terminals.insert("EXPLAIN");
    inner.non_terminals.insert("ExplainStmt");
    inner.start = "ExplainStmt";
    inner
}

pub fn grammar_for(kind: &str, explain: bool) -> Grammar {
    if explain {
        return grammar_explain_of(kind);
    }
    match kind {
        "select" => grammar_select(),
        "insert" => grammar_insert(),
        "update" => grammar_update(),
        "delete" => grammar_delete(),
        "create" => grammar_create_table(),
        other => panic!("unsupported statement kind: {other}"),
    }
}

fn first_of_symbol(
    grammar: &Grammar,
    sym: &'static str,
    cache: &mut HashMap<&'static str, HashSet<&'static str>>,
    visiting: &mut HashSet<&'static str>,
) -> HashSet<&'static str> {
    if grammar.is_terminal(sym) {
        return [sym].into_iter().collect();
    }
    if let Some(cached) = cache.get(sym) {
        return cached.clone();
    }
    if !visiting.insert(sym) {
        return HashSet::new(); // recursive cycle guard; these grammars have none
    }
    let mut result = HashSet::new();
    for production in &grammar.productions[sym] {
        let mut nullable_prefix = true;
        for &symbol in production {
            if symbol == EPSILON {
                result.insert(EPSILON);
                break;
            }
            let first_sym = first_of_symbol(grammar, symbol, cache, visiting);
            result.extend(first_sym.iter().filter(|&&s| s != EPSILON));
            if !first_sym.contains(EPSILON) {
                nullable_prefix = false;
                break;
            }
        }
        if nullable_prefix && !production.is_empty() && production.last() != Some(&EPSILON) {
            result.insert(EPSILON);
        }
    }
    visiting.remove(sym);
    cache.insert(sym, result.clone());
    result
}

fn first_of_sequence(
    grammar: &Grammar,
    seq: &[&'static str],
    cache: &mut HashMap<&'static str, HashSet<&'static str>>,
) -> HashSet<&'static str> {
    let mut result = HashSet::new();
    let mut visiting = HashSet::new();
    let mut nullable = true;
    for &symbol in seq {
        if symbol == EPSILON {
            result.insert(EPSILON);
            break;
        }
        let f = first_of_symbol(grammar, symbol, cache, &mut visiting);
        result.extend(f.iter().filter(|&&s| s != EPSILON));
        if !f.contains(EPSILON) {
            nullable = false;
            break;
        }
    }
    if nullable {
        result.insert(EPSILON);
    }
    result
}

fn follow_sets(
    grammar: &Grammar,
    first_cache: &mut HashMap<&'static str, HashSet<&'static str>>,
) -> HashMap<&'static str, HashSet<&'static str>> {
    let mut follow: HashMap<&'static str, HashSet<&'static str>> =
        grammar.non_terminals.iter().map(|&nt| (nt, HashSet::new())).collect();
    follow.get_mut(grammar.start).unwrap().insert(END_MARKER);

    // Iterate to a fixed point; these grammars are small enough that a
    // bounded number of passes always converges.
    for _ in 0..grammar.non_terminals.len() + 1 {
        for (&head, productions) in &grammar.productions {
            for production in productions {
                for (i, &symbol) in production.iter().enumerate() {
                    if !grammar.non_terminals.contains(symbol) {
                        continue;
                    }
                    let rest = &production[i + 1..];
                    let rest_first = first_of_sequence(grammar, rest, first_cache);
                    let additions: Vec<&'static str> = rest_first.iter().filter(|&&s| s != EPSILON).copied().collect();
                    follow.get_mut(symbol).unwrap().extend(additions);
                    if rest.is_empty() || rest_first.contains(EPSILON) {
                        let head_follow: Vec<&'static str> = follow[head].iter().copied().collect();
                        follow.get_mut(symbol).unwrap().extend(head_follow);
                    }
                }
            }
        }
    }
    follow
}

/// `(non_terminal, lookahead) -> production`.
pub fn build_predict_table(grammar: &Grammar) -> HashMap<(&'static str, &'static str), Vec<&'static str>> {
    let mut first_cache = HashMap::new();
    let follow = follow_sets(grammar, &mut first_cache);
    let mut table = HashMap::new();
    for (&head, productions) in &grammar.productions {
        for production in productions {
            let first = first_of_sequence(grammar, production, &mut first_cache);
            for &terminal in first.iter().filter(|&&s| s != EPSILON) {
                table.insert((head, terminal), production.clone());
            }
            if first.contains(EPSILON) {
                for &terminal in &follow[head] {
                    table.insert((head, terminal), production.clone());
                }
            }
        }
    }
    table
}

#[derive(Clone, Debug)]
pub struct TraceStep {
    pub stack: Vec<String>,
    pub remaining_input: Vec<String>,
    pub action: String,
}

#[derive(Debug)]
pub struct TraceResult {
    pub steps: Vec<TraceStep>,
    pub accepted: bool,
}

/// Maps one lexer token to the abstract terminal symbol used by the
/// pedagogical grammars (`IDENTIFIER`, `NUMBER`, `STRING`, `OPERATOR`, the
/// keyword's own text, or the literal delimiter character).
pub fn terminal_symbol(tok: &Token) -> String {
    match &tok.kind {
        TokenKind::Keyword(k) => k.clone(),
        TokenKind::Identifier(_) => "IDENTIFIER".to_string(),
        TokenKind::Number(_) => "NUMBER".to_string(),
        TokenKind::StringLit(_) => "STRING".to_string(),
        TokenKind::Operator(_) => "OPERATOR".to_string(),
        TokenKind::Delimiter(c) => c.to_string(),
        TokenKind::Eof => END_MARKER.to_string(),
    }
}

/// Drives the LL(1) stack machine over an already-tokenized statement,
/// recording one [`TraceStep`] per stack action. This never panics on
/// malformed input: a predict-table miss simply ends the trace with
/// `accepted: false`, since by the time this runs the real parser has
/// already accepted or rejected the statement.
pub fn trace(grammar: &Grammar, tokens: &[String]) -> TraceResult {
    let table = build_predict_table(grammar);
    let mut stack: Vec<&'static str> = vec![END_MARKER, grammar.start];
    let mut input: Vec<String> = tokens.iter().cloned().chain(std::iter::once(END_MARKER.to_string())).collect();
    let mut pos = 0usize;
    let mut steps = Vec::new();

    loop {
        let snapshot_stack: Vec<String> = stack.iter().map(|s| s.to_string()).collect();
        let snapshot_input: Vec<String> = input[pos..].to_vec();

        let Some(&top) = stack.last() else {
            steps.push(TraceStep { stack: snapshot_stack, remaining_input: snapshot_input, action: "stack exhausted".into() });
            return TraceResult { steps, accepted: false };
        };
        let lookahead = input.get(pos).map(|s| s.as_str()).unwrap_or(END_MARKER);

        if top == END_MARKER && lookahead == END_MARKER {
            steps.push(TraceStep { stack: snapshot_stack, remaining_input: snapshot_input, action: "accept".into() });
            return TraceResult { steps, accepted: true };
        }

        if grammar.is_terminal(top) {
            if top == lookahead {
                stack.pop();
                pos += 1;
                steps.push(TraceStep {
                    stack: snapshot_stack,
                    remaining_input: snapshot_input,
                    action: format!("match {top}"),
                });
            } else {
                steps.push(TraceStep {
                    stack: snapshot_stack,
                    remaining_input: snapshot_input,
                    action: format!("error: expected {top}, found {lookahead}"),
                });
                return TraceResult { steps, accepted: false };
            }
        } else {
            match table.get(&(top, lookahead)) {
                Some(production) => {
                    stack.pop();
                    if production != &[EPSILON] {
                        for &sym in production.iter().rev() {
                            stack.push(sym);
                        }
                    }
                    steps.push(TraceStep {
                        stack: snapshot_stack,
                        remaining_input: snapshot_input,
                        action: format!("{top} -> {}", production.join(" ")),
                    });
                }
                None => {
                    steps.push(TraceStep {
                        stack: snapshot_stack,
                        remaining_input: snapshot_input,
                        action: format!("error: no production for {top} on lookahead {lookahead}"),
                    });
                    return TraceResult { steps, accepted: false };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_table_trace_accepts_well_formed_statement() {
        let grammar = grammar_create_table();
        let tokens: Vec<String> = ["CREATE", "TABLE", "IDENTIFIER", "(", "IDENTIFIER", "INT", ")", ";"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let result = trace(&grammar, &tokens);
        assert!(result.accepted);
    }

    #[test]
    fn delete_trace_accepts_with_where() {
        let grammar = grammar_delete();
        let tokens: Vec<String> = ["DELETE", "FROM", "IDENTIFIER", "WHERE", "IDENTIFIER", "OPERATOR", "NUMBER", ";"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let result = trace(&grammar, &tokens);
        assert!(result.accepted);
    }

    #[test]
    fn malformed_input_ends_trace_without_accepting() {
        let grammar = grammar_delete();
        let tokens: Vec<String> = ["DELETE", "IDENTIFIER", ";"].iter().map(|s| s.to_string()).collect();
        let result = trace(&grammar, &tokens);
        assert!(!result.accepted);
    }

    #[test]
    fn explain_wraps_inner_grammar_with_leading_terminal() {
        let grammar = grammar_explain_of("delete");
        let tokens: Vec<String> =
            ["EXPLAIN", "DELETE", "FROM", "IDENTIFIER", ";"].iter().map(|s| s.to_string()).collect();
        let result = trace(&grammar, &tokens);
        assert!(result.accepted);
    }
}
