//! Scalar SQL types and runtime values shared across every crate in the
//! engine. Kept dependency-free (besides `serde`) so both the storage layer
//! and the front-end compiler can sit on top of it without pulling in error
//! or catalog machinery.

use std::cmp::Ordering;
use std::fmt;

/// A column's declared SQL type. `Varchar(None)` is an unbounded varchar;
/// `Varchar(Some(n))` carries the `VARCHAR(n)` length bound from `CREATE TABLE`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SqlType {
    Int,
    Float,
    Bool,
    Varchar(Option<u32>),
}

impl SqlType {
    /// Short keyword used in error messages, the page header column block,
    /// and the catalog JSON document.
    pub fn keyword(&self) -> &'static str {
        match self {
            SqlType::Int => "INT",
            SqlType::Float => "FLOAT",
            SqlType::Bool => "BOOL",
            SqlType::Varchar(_) => "VARCHAR",
        }
    }

    /// Render the type the way a `CREATE TABLE` statement would (e.g.
    /// `VARCHAR(20)`), used by the page header descriptor block and by
    /// smart-hint repair examples.
    pub fn render(&self) -> String {
        match self {
            SqlType::Varchar(Some(n)) => format!("VARCHAR({n})"),
            other => other.keyword().to_string(),
        }
    }

    /// Parse a type string as produced by `render`. Returns `None` on any
    /// malformed input; callers attach their own error context.
    pub fn parse(raw: &str) -> Option<SqlType> {
        let raw = raw.trim();
        let upper = raw.to_ascii_uppercase();
        if upper == "INT" {
            return Some(SqlType::Int);
        }
        if upper == "FLOAT" {
            return Some(SqlType::Float);
        }
        if upper == "BOOL" {
            return Some(SqlType::Bool);
        }
        if upper == "VARCHAR" {
            return Some(SqlType::Varchar(None));
        }
        if let Some(rest) = upper.strip_prefix("VARCHAR(") {
            let rest = rest.strip_suffix(')')?;
            let n: u32 = rest.trim().parse().ok()?;
            return Some(SqlType::Varchar(Some(n)));
        }
        None
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, SqlType::Int | SqlType::Float)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// A runtime SQL value. `Int`/`Float` map to the 4-byte fixed-width record
/// encoding; `Varchar` is length-prefixed UTF-8.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Int(i32),
    Float(f32),
    Bool(bool),
    Varchar(String),
    Null,
}

impl Value {
    pub fn sql_type(&self) -> Option<SqlType> {
        match self {
            Value::Int(_) => Some(SqlType::Int),
            Value::Float(_) => Some(SqlType::Float),
            Value::Bool(_) => Some(SqlType::Bool),
            Value::Varchar(s) => Some(SqlType::Varchar(Some(s.len() as u32))),
            Value::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view of the value: `Int` and `Float` both widen to `f64`.
    /// Used by `SUM`/`AVG` and by numeric comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f as f64),
            _ => None,
        }
    }

    /// String form used for lexicographic comparison and for display.
    pub fn as_display_string(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Bool(b) => b.to_string(),
            Value::Varchar(s) => s.clone(),
            Value::Null => "NULL".to_string(),
        }
    }

    /// Same-type equality, mirroring `cmp_same_type`. Cross-type or NULL
    /// comparisons return `None` so callers can decide how to treat them.
    pub fn eq_same_type(&self, other: &Value) -> Option<bool> {
        self.cmp_same_type(other).map(|o| o == Ordering::Equal)
    }

    /// Strict same-type ordering. Numeric cross-type (`Int` vs `Float`)
    /// compares as numbers; everything else requires an exact type match.
    pub fn cmp_same_type(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Int(b)) => (*a as f64).partial_cmp(&(*b as f64)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Varchar(a), Value::Varchar(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display_string())
    }
}

/// Formats a float the way the output formatter and AVG aggregate expect:
/// always with a fractional part so `70000.0` never prints as `70000`.
pub fn format_float(v: f32) -> String {
    if v.fract() == 0.0 && v.is_finite() {
        format!("{v:.1}")
    } else {
        let mut s = format!("{v}");
        if !s.contains('.') {
            s.push_str(".0");
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cmp::Ordering::{Equal, Greater, Less};

    #[test]
    fn render_and_parse_round_trip() {
        for ty in [
            SqlType::Int,
            SqlType::Float,
            SqlType::Bool,
            SqlType::Varchar(None),
            SqlType::Varchar(Some(20)),
        ] {
            let rendered = ty.render();
            assert_eq!(SqlType::parse(&rendered), Some(ty));
        }
    }

    #[test]
    fn varchar_zero_length_parses_but_is_rejected_elsewhere() {
        // SqlType::parse is purely syntactic; the "(n>0)" rule lives in catalog.
        assert_eq!(SqlType::parse("VARCHAR(0)"), Some(SqlType::Varchar(Some(0))));
    }

    #[test]
    fn cross_type_numeric_compares() {
        assert_eq!(Value::Int(5).cmp_same_type(&Value::Float(5.0)), Some(Equal));
        assert_eq!(Value::Int(4).cmp_same_type(&Value::Float(5.0)), Some(Less));
        assert_eq!(Value::Float(6.0).cmp_same_type(&Value::Int(5)), Some(Greater));
    }

    #[test]
    fn incompatible_types_reject() {
        assert_eq!(Value::Int(1).cmp_same_type(&Value::Varchar("1".into())), None);
        assert_eq!(Value::Null.cmp_same_type(&Value::Int(1)), None);
    }

    #[test]
    fn float_display_always_has_fraction() {
        assert_eq!(format_float(70000.0), "70000.0");
        assert_eq!(format_float(55000.5), "55000.5");
    }

    proptest! {
        #[test]
        fn int_ordering_is_antisymmetric(a in any::<i32>(), b in any::<i32>()) {
            let va = Value::Int(a);
            let vb = Value::Int(b);
            match (va.cmp_same_type(&vb), vb.cmp_same_type(&va)) {
                (Some(o1), Some(o2)) => prop_assert_eq!(o1, o2.reverse()),
                _ => prop_assert!(false, "int comparisons are always defined"),
            }
        }
    }
}
