//! Reader for the bracketed literal lists the anomaly pipeline writes.
//!
//! Raw timeseries (`[[1610000000, 1.5], (1610000060, 2.0), ...]`) and legacy
//! marker files (`[12, 1610000500, '0.4.0', 2.1, 210, 7390.2, 86400]`) share
//! this shape. Tuples are read as lists. Only scalars, quoted strings and
//! nested lists are understood; anything else is a syntax error.

use std::fmt;

/// A single literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
    List(Vec<Literal>),
}

impl Literal {
    /// Numeric view; quoted numbers are accepted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Int(i) => Some(*i as f64),
            Literal::Float(f) => Some(*f),
            Literal::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Integer view, truncating floats.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Literal::Int(i) => Some(*i),
            Literal::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Literal::Str(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            }
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Literal]> {
        match self {
            Literal::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::Str(s) => f.write_str(s),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::None => f.write_str("None"),
            Literal::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Parse a whole document that must be a single list.
pub fn parse_literal_list(input: &str) -> std::result::Result<Vec<Literal>, String> {
    let mut parser = Parser {
        chars: input.char_indices().peekable(),
        input,
        depth: 0,
    };
    parser.skip_ws();
    let value = parser.value()?;
    parser.skip_ws();
    if let Some((pos, c)) = parser.chars.peek() {
        return Err(format!("unexpected trailing {:?} at offset {}", c, pos));
    }
    match value {
        Literal::List(items) => Ok(items),
        other => Err(format!("expected a list, found {}", other)),
    }
}

/// Deepest list nesting accepted; real documents nest two or three levels.
const MAX_DEPTH: usize = 64;

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    input: &'a str,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn value(&mut self) -> std::result::Result<Literal, String> {
        self.skip_ws();
        let Some(&(pos, c)) = self.chars.peek() else {
            return Err("unexpected end of input".to_string());
        };
        match c {
            '[' => self.list(']'),
            '(' => self.list(')'),
            '\'' | '"' => self.string(c),
            _ if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            _ if c.is_ascii_alphabetic() => self.word(),
            _ => Err(format!("unexpected {:?} at offset {}", c, pos)),
        }
    }

    fn list(&mut self, close: char) -> std::result::Result<Literal, String> {
        if self.depth >= MAX_DEPTH {
            return Err(format!("nesting too deep (more than {} levels)", MAX_DEPTH));
        }
        self.depth += 1;
        let list = self.list_items(close);
        self.depth -= 1;
        list
    }

    fn list_items(&mut self, close: char) -> std::result::Result<Literal, String> {
        self.chars.next();
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.chars.peek() {
                Some(&(_, c)) if c == close => {
                    self.chars.next();
                    return Ok(Literal::List(items));
                }
                None => return Err(format!("unterminated list, expected {:?}", close)),
                _ => {}
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.chars.next() {
                Some((_, ',')) => continue,
                Some((_, c)) if c == close => return Ok(Literal::List(items)),
                Some((pos, c)) => {
                    return Err(format!("expected ',' or {:?}, found {:?} at offset {}", close, c, pos))
                }
                None => return Err(format!("unterminated list, expected {:?}", close)),
            }
        }
    }

    fn string(&mut self, quote: char) -> std::result::Result<Literal, String> {
        self.chars.next();
        let mut out = String::new();
        while let Some((_, c)) = self.chars.next() {
            match c {
                '\\' => {
                    if let Some((_, escaped)) = self.chars.next() {
                        out.push(escaped);
                    }
                }
                _ if c == quote => return Ok(Literal::Str(out)),
                _ => out.push(c),
            }
        }
        Err("unterminated string".to_string())
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.chars.peek().map(|(i, _)| *i).unwrap_or(self.input.len());
        let mut end = start;
        while let Some(&(i, c)) = self.chars.peek() {
            if !pred(c) {
                break;
            }
            end = i + c.len_utf8();
            self.chars.next();
        }
        &self.input[start..end]
    }

    fn number(&mut self) -> std::result::Result<Literal, String> {
        let token = self.take_while(|c| {
            c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '+' || c == '_'
        });
        if let Ok(i) = token.parse::<i64>() {
            return Ok(Literal::Int(i));
        }
        token
            .parse::<f64>()
            .map(Literal::Float)
            .map_err(|_| format!("invalid number {:?}", token))
    }

    fn word(&mut self) -> std::result::Result<Literal, String> {
        let token = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
        match token {
            "True" | "true" => Ok(Literal::Bool(true)),
            "False" | "false" => Ok(Literal::Bool(false)),
            "None" | "null" => Ok(Literal::None),
            "nan" | "NaN" => Ok(Literal::Float(f64::NAN)),
            "inf" => Ok(Literal::Float(f64::INFINITY)),
            _ => Err(format!("unknown identifier {:?}", token)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_tuples_and_lists() {
        let items = parse_literal_list("[(1610000000, 1.5), [1610000060, '2.0'], (1610000120, None)]").unwrap();
        assert_eq!(items.len(), 3);
        let second = items[1].as_list().unwrap();
        assert_eq!(second[0].as_i64(), Some(1_610_000_060));
        assert_eq!(second[1].as_f64(), Some(2.0));
        assert_eq!(items[2].as_list().unwrap()[1], Literal::None);
    }

    #[test]
    fn test_legacy_marker_list() {
        let items = parse_literal_list("[12, 1610000500, '0.4.0', 2.1, 210, 7390.2, 86400]").unwrap();
        assert_eq!(items[0], Literal::Int(12));
        assert_eq!(items[2], Literal::Str("0.4.0".into()));
        assert_eq!(items[5].as_f64(), Some(7390.2));
    }

    #[test]
    fn test_not_a_list_is_error() {
        assert!(parse_literal_list("{\"a\": 1}").is_err());
        assert!(parse_literal_list("42").is_err());
        assert!(parse_literal_list("[1, 2").is_err());
        assert!(parse_literal_list("[1, 2] trailing").is_err());
    }

    #[test]
    fn test_deep_nesting_is_error() {
        let err = parse_literal_list(&"[".repeat(200_000)).unwrap_err();
        assert!(err.contains("nesting too deep"));

        let nested = format!("{}1{}", "[".repeat(MAX_DEPTH), "]".repeat(MAX_DEPTH));
        assert!(parse_literal_list(&nested).is_ok());
    }

    #[test]
    fn test_empty_list() {
        assert!(parse_literal_list("  []\n").unwrap().is_empty());
    }
}
