//! Hand-written character-at-a-time lexer. Tracks line/column for every
//! token so the parser and the smart-hint diagnostics can point at the
//! exact source position of a mistake.

use std::fmt;

pub const KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "INSERT", "INTO", "VALUES", "UPDATE", "SET", "DELETE", "CREATE",
    "TABLE", "JOIN", "INNER", "LEFT", "ON", "GROUP", "BY", "ORDER", "ASC", "DESC", "AS", "AND", "OR", "NOT",
    "COUNT", "SUM", "AVG", "INT", "FLOAT", "BOOL", "VARCHAR", "PRIMARY", "KEY", "FOREIGN",
    "REFERENCES", "EXPLAIN", "NULL", "TRUE", "FALSE",
];

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Keyword(String),
    Identifier(String),
    Number(String),
    StringLit(String),
    Operator(String),
    Delimiter(char),
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Keyword(k) => write!(f, "{k}"),
            TokenKind::Identifier(s) => write!(f, "{s}"),
            TokenKind::Number(s) => write!(f, "{s}"),
            TokenKind::StringLit(s) => write!(f, "'{s}'"),
            TokenKind::Operator(s) => write!(f, "{s}"),
            TokenKind::Delimiter(c) => write!(f, "{c}"),
            TokenKind::Eof => write!(f, "<eof>"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub col: usize,
}

impl Token {
    /// The token's uppercased text, used for keyword and operator matching
    /// anywhere the parser needs to `peek` without caring about case.
    pub fn text(&self) -> String {
        self.kind.to_string()
    }
}

#[derive(Debug)]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {}, col {})", self.message, self.line, self.col)
    }
}

pub struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    src: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { chars: src.chars().collect(), pos: 0, line: 1, col: 1, src }
    }

    pub fn source(&self) -> &'a str {
        self.src
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while matches!(self.peek(), Some(c) if c.is_whitespace()) {
                self.advance();
            }
            if self.peek() == Some('-') && self.peek_at(1) == Some('-') {
                while !matches!(self.peek(), None | Some('\n')) {
                    self.advance();
                }
                continue;
            }
            break;
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments();
        let (line, col) = (self.line, self.col);
        let Some(c) = self.peek() else {
            return Ok(Token { kind: TokenKind::Eof, line, col });
        };

        if c.is_ascii_digit() {
            return Ok(self.lex_number(line, col));
        }
        if c == '\'' {
            return self.lex_string(line, col);
        }
        if c.is_alphabetic() || c == '_' {
            return Ok(self.lex_word(line, col));
        }
        if "=<>!".contains(c) {
            return Ok(self.lex_operator(line, col));
        }
        if "(),;.*".contains(c) {
            self.advance();
            return Ok(Token { kind: TokenKind::Delimiter(c), line, col });
        }

        Err(LexError { message: format!("unexpected character '{c}'"), line, col })
    }

    fn lex_number(&mut self, line: usize, col: usize) -> Token {
        let mut s = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            s.push(self.advance().unwrap());
        }
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            s.push(self.advance().unwrap());
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                s.push(self.advance().unwrap());
            }
        }
        Token { kind: TokenKind::Number(s), line, col }
    }

    fn lex_string(&mut self, line: usize, col: usize) -> Result<Token, LexError> {
        self.advance(); // opening quote
        let mut s = String::new();
        loop {
            match self.advance() {
                Some('\'') => {
                    // allow '' as an escaped quote inside the literal
                    if self.peek() == Some('\'') {
                        s.push('\'');
                        self.advance();
                        continue;
                    }
                    return Ok(Token { kind: TokenKind::StringLit(s), line, col });
                }
                Some(c) => s.push(c),
                None => {
                    return Err(LexError {
                        message: "unterminated string literal".to_string(),
                        line,
                        col,
                    })
                }
            }
        }
    }

    fn lex_word(&mut self, line: usize, col: usize) -> Token {
        let mut s = String::new();
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            s.push(self.advance().unwrap());
        }
        let upper = s.to_ascii_uppercase();
        if KEYWORDS.contains(&upper.as_str()) {
            Token { kind: TokenKind::Keyword(upper), line, col }
        } else {
            Token { kind: TokenKind::Identifier(s), line, col }
        }
    }

    fn lex_operator(&mut self, line: usize, col: usize) -> Token {
        let first = self.advance().unwrap();
        let two_char = match (first, self.peek()) {
            ('<', Some('=')) | ('>', Some('=')) | ('!', Some('=')) | ('<', Some('>')) => true,
            _ => false,
        };
        let mut s = first.to_string();
        if two_char {
            s.push(self.advance().unwrap());
        }
        Token { kind: TokenKind::Operator(s), line, col }
    }
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(src).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_basic_select() {
        let tokens = tokenize("SELECT * FROM t;").unwrap();
        let kinds: Vec<_> = tokens.into_iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword("SELECT".into()),
                TokenKind::Delimiter('*'),
                TokenKind::Keyword("FROM".into()),
                TokenKind::Identifier("t".into()),
                TokenKind::Delimiter(';'),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_line_comments() {
        let tokens = tokenize("SELECT 1; -- trailing comment\n").unwrap();
        assert!(tokens.iter().any(|t| matches!(&t.kind, TokenKind::Number(n) if n == "1")));
    }

    #[test]
    fn two_char_operators_lex_as_one_token() {
        let tokens = tokenize("age >= 18").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Operator(">=".into()));
    }

    #[test]
    fn unterminated_string_reports_position() {
        let err = tokenize("SELECT 'oops").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn tracks_line_and_column_across_newlines() {
        let tokens = tokenize("SELECT *\nFROM t;").unwrap();
        let from_tok = tokens.iter().find(|t| t.kind == TokenKind::Keyword("FROM".into())).unwrap();
        assert_eq!(from_tok.line, 2);
    }
}
