// Restricted decoder for Python literal reprs
//
// Accepts strings, numbers, booleans, None, lists, tuples, dicts and sets and
// maps them onto JSON values. Nothing is ever evaluated.

use serde_json::{Map, Number, Value};
use thiserror::Error;

const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid literal at offset {offset}: {reason}")]
pub struct LiteralError {
    pub offset: usize,
    pub reason: &'static str,
}

/// Decode a complete literal
pub fn decode(text: &str) -> Result<Value, LiteralError> {
    let mut parser = Parser {
        chars: text.chars().collect(),
        pos: 0,
        depth: 0,
    };
    parser.skip_whitespace();
    let value = parser.value()?;
    parser.skip_whitespace();
    if parser.pos != parser.chars.len() {
        return Err(parser.error("trailing characters"));
    }
    Ok(value)
}

/// Decode, falling back to the raw text as a JSON string
pub fn decode_or_raw(text: &str) -> Value {
    decode(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Decode a value expected to be a message: decoded strings stay strings,
/// anything else keeps the raw text
pub fn decode_message(text: &str) -> String {
    match decode(text) {
        Ok(Value::String(s)) => s,
        _ => text.to_string(),
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn error(&self, reason: &'static str) -> LiteralError {
        LiteralError {
            offset: self.pos,
            reason,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn value(&mut self) -> Result<Value, LiteralError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        let result = self.value_inner();
        self.depth -= 1;
        result
    }

    fn value_inner(&mut self) -> Result<Value, LiteralError> {
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some('[') => {
                self.pos += 1;
                self.sequence(']').map(|(items, _)| Value::Array(items))
            }
            Some('(') => {
                self.pos += 1;
                // A parenthesized single value without a comma is just a value
                let (mut items, trailing_comma) = self.sequence(')')?;
                if items.len() == 1 && !trailing_comma {
                    Ok(items.remove(0))
                } else {
                    Ok(Value::Array(items))
                }
            }
            Some('{') => {
                self.pos += 1;
                self.braced()
            }
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(c) if c == '\'' || c == '"' || self.starts_prefixed_string() => self.strings(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.word(),
            Some(_) => Err(self.error("unexpected character")),
        }
    }

    /// Elements up to `close`; reports whether the last element had a trailing comma
    fn sequence(&mut self, close: char) -> Result<(Vec<Value>, bool), LiteralError> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            self.skip_whitespace();
            if self.eat(close) {
                return Ok((items, trailing_comma));
            }
            items.push(self.value()?);
            self.skip_whitespace();
            if self.eat(',') {
                trailing_comma = true;
                continue;
            }
            trailing_comma = false;
            self.skip_whitespace();
            if self.eat(close) {
                return Ok((items, trailing_comma));
            }
            return Err(self.error("expected separator"));
        }
    }

    /// Dict or set
    fn braced(&mut self) -> Result<Value, LiteralError> {
        self.skip_whitespace();
        if self.eat('}') {
            return Ok(Value::Object(Map::new()));
        }

        let first = self.value()?;
        self.skip_whitespace();
        if self.eat(':') {
            let mut map = Map::new();
            self.skip_whitespace();
            let value = self.value()?;
            map.insert(key_string(first), value);
            loop {
                self.skip_whitespace();
                if self.eat('}') {
                    return Ok(Value::Object(map));
                }
                if !self.eat(',') {
                    return Err(self.error("expected ',' in dict"));
                }
                self.skip_whitespace();
                if self.eat('}') {
                    return Ok(Value::Object(map));
                }
                let key = self.value()?;
                self.skip_whitespace();
                if !self.eat(':') {
                    return Err(self.error("expected ':' in dict"));
                }
                self.skip_whitespace();
                let value = self.value()?;
                map.insert(key_string(key), value);
            }
        }

        let mut items = vec![first];
        loop {
            self.skip_whitespace();
            if self.eat('}') {
                return Ok(Value::Array(items));
            }
            if !self.eat(',') {
                return Err(self.error("expected ',' in set"));
            }
            self.skip_whitespace();
            if self.eat('}') {
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);
        }
    }

    fn word(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" => Ok(Value::Bool(true)),
            "False" => Ok(Value::Bool(false)),
            "None" => Ok(Value::Null),
            "set" | "frozenset" => {
                self.skip_whitespace();
                if self.eat('(') {
                    self.skip_whitespace();
                    if self.eat(')') {
                        return Ok(Value::Array(Vec::new()));
                    }
                    let inner = self.value()?;
                    self.skip_whitespace();
                    if self.eat(')') {
                        return Ok(inner);
                    }
                }
                Err(self.error("unsupported set form"))
            }
            _ => {
                self.pos = start;
                Err(self.error("names are not literals"))
            }
        }
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        let mut negative = false;
        while let Some(sign) = self.peek().filter(|c| *c == '-' || *c == '+') {
            if sign == '-' {
                negative = !negative;
            }
            self.pos += 1;
            self.skip_whitespace();
        }

        let body_start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_' || c == '.')
            || (matches!(self.peek(), Some('-') | Some('+'))
                && matches!(self.chars.get(self.pos.wrapping_sub(1)), Some('e') | Some('E'))
                && !self.is_radix_literal(body_start))
        {
            self.pos += 1;
        }
        let body: String = self.chars[body_start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if body.is_empty() {
            self.pos = start;
            return Err(self.error("expected number"));
        }

        let lower = body.to_ascii_lowercase();
        if let Some(value) = parse_radix(&lower) {
            let value = value.ok_or_else(|| self.error("invalid integer"))?;
            return Ok(signed_integer(value, negative));
        }

        if lower.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(value) = lower.parse::<u128>() {
                return Ok(signed_integer(value, negative));
            }
        }

        if lower.ends_with('j') || lower == "inf" || lower == "nan" {
            return Err(self.error("non-JSON number"));
        }
        let value: f64 = lower.parse().map_err(|_| self.error("invalid number"))?;
        let value = if negative { -value } else { value };
        Number::from_f64(value)
            .map(Value::Number)
            .ok_or_else(|| self.error("non-finite number"))
    }

    fn is_radix_literal(&self, body_start: usize) -> bool {
        self.chars.get(body_start) == Some(&'0')
            && matches!(self.chars.get(body_start + 1), Some('x') | Some('X'))
    }

    fn starts_prefixed_string(&self) -> bool {
        let mut offset = 0;
        while offset < 2 {
            match self.peek_at(offset) {
                Some(c) if "rRbBuU".contains(c) => offset += 1,
                Some('\'') | Some('"') => return offset > 0,
                _ => return false,
            }
        }
        matches!(self.peek_at(offset), Some('\'') | Some('"'))
    }

    /// One or more adjacent string literals, concatenated
    fn strings(&mut self) -> Result<Value, LiteralError> {
        let mut text = self.string()?;
        loop {
            let save = self.pos;
            self.skip_whitespace();
            match self.peek() {
                Some('\'') | Some('"') => text.push_str(&self.string()?),
                Some(_) if self.starts_prefixed_string() => text.push_str(&self.string()?),
                _ => {
                    self.pos = save;
                    return Ok(Value::String(text));
                }
            }
        }
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let mut raw = false;
        while let Some(c) = self.peek().filter(|c| "rRbBuU".contains(*c)) {
            if c == 'r' || c == 'R' {
                raw = true;
            }
            self.pos += 1;
        }

        let quote = self.peek().ok_or_else(|| self.error("expected string"))?;
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut out = String::new();
        loop {
            let c = self.peek().ok_or_else(|| self.error("unterminated string"))?;
            if c == quote {
                if !triple {
                    self.pos += 1;
                    return Ok(out);
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    return Ok(out);
                }
            }
            if c == '\n' && !triple {
                return Err(self.error("newline in string"));
            }
            if c == '\\' {
                let next = self.peek_at(1).ok_or_else(|| self.error("unterminated escape"))?;
                if raw {
                    out.push('\\');
                    out.push(next);
                    self.pos += 2;
                    continue;
                }
                self.pos += 2;
                self.escape(next, &mut out)?;
                continue;
            }
            out.push(c);
            self.pos += 1;
        }
    }

    fn escape(&mut self, kind: char, out: &mut String) -> Result<(), LiteralError> {
        match kind {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'v' => out.push('\u{0b}'),
            'x' => out.push(self.hex_escape(2)?),
            'u' => out.push(self.hex_escape(4)?),
            'U' => out.push(self.hex_escape(8)?),
            '0'..='7' => {
                let mut value = kind.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek().and_then(|c| c.to_digit(8)) {
                        Some(digit) => {
                            value = value * 8 + digit;
                            self.pos += 1;
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value).ok_or_else(|| self.error("invalid octal escape"))?);
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char, LiteralError> {
        if self.pos + digits > self.chars.len() {
            return Err(self.error("truncated escape"));
        }
        let hex: String = self.chars[self.pos..self.pos + digits].iter().collect();
        let value = u32::from_str_radix(&hex, 16).map_err(|_| self.error("invalid hex escape"))?;
        self.pos += digits;
        char::from_u32(value).ok_or_else(|| self.error("invalid code point"))
    }
}

/// `Some(None)` for a malformed radix literal, `None` if not a radix literal
fn parse_radix(lower: &str) -> Option<Option<u128>> {
    let (digits, radix) = if let Some(rest) = lower.strip_prefix("0x") {
        (rest, 16)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (rest, 8)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (rest, 2)
    } else {
        return None;
    };
    Some(u128::from_str_radix(digits, radix).ok())
}

fn signed_integer(value: u128, negative: bool) -> Value {
    if negative {
        if let Ok(v) = i64::try_from(value) {
            return Value::Number(Number::from(-v));
        }
        if value == i64::MAX as u128 + 1 {
            return Value::Number(Number::from(i64::MIN));
        }
    } else if let Ok(v) = u64::try_from(value) {
        return Value::Number(Number::from(v));
    }
    // Too large for JSON integers
    let magnitude = value as f64;
    Number::from_f64(if negative { -magnitude } else { magnitude })
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// JSON object keys must be strings
fn key_string(key: Value) -> String {
    match key {
        Value::String(s) => s,
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strings() {
        assert_eq!(decode("'hello\\nworld'"), Ok(json!("hello\nworld")));
        assert_eq!(decode("\"it's\""), Ok(json!("it's")));
        assert_eq!(decode("'it\\'s'"), Ok(json!("it's")));
        assert_eq!(decode("'\\x41\\u00e9\\U0001F600'"), Ok(json!("Aé😀")));
        assert_eq!(decode("'\\101'"), Ok(json!("A")));
        assert_eq!(decode("r'a\\nb'"), Ok(json!("a\\nb")));
        assert_eq!(decode("b'bytes'"), Ok(json!("bytes")));
        assert_eq!(decode("'''multi\nline'''"), Ok(json!("multi\nline")));
        assert_eq!(decode("'a' 'b'"), Ok(json!("ab")));
        assert_eq!(decode("'\\d'"), Ok(json!("\\d")));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(decode("42"), Ok(json!(42)));
        assert_eq!(decode("-7"), Ok(json!(-7)));
        assert_eq!(decode("1_000"), Ok(json!(1000)));
        assert_eq!(decode("0xff"), Ok(json!(255)));
        assert_eq!(decode("3.5"), Ok(json!(3.5)));
        assert_eq!(decode("1e3"), Ok(json!(1000.0)));
        assert_eq!(decode("-2.5e-1"), Ok(json!(-0.25)));
        assert!(decode("1j").is_err());
        assert!(decode("inf").is_err());
    }

    #[test]
    fn test_constants_and_containers() {
        assert_eq!(decode("None"), Ok(Value::Null));
        assert_eq!(decode("[True, False, None]"), Ok(json!([true, false, null])));
        assert_eq!(decode("(1, 2)"), Ok(json!([1, 2])));
        assert_eq!(decode("(1,)"), Ok(json!([1])));
        assert_eq!(decode("(1)"), Ok(json!(1)));
        assert_eq!(decode("()"), Ok(json!([])));
        assert_eq!(decode("{'a': [1, 2], 'b': {'c': None}}"), Ok(json!({"a": [1, 2], "b": {"c": null}})));
        assert_eq!(decode("{1: 'one', True: 'yes'}"), Ok(json!({"1": "one", "True": "yes"})));
        assert_eq!(decode("{1, 2, 3}"), Ok(json!([1, 2, 3])));
        assert_eq!(decode("set()"), Ok(json!([])));
        assert_eq!(decode("{}"), Ok(json!({})));
    }

    #[test]
    fn test_rejects_non_literals() {
        assert!(decode("__import__('os')").is_err());
        assert!(decode("open('x').read()").is_err());
        assert!(decode("[1, 2").is_err());
        assert!(decode("'unterminated").is_err());
        assert!(decode("1 + 2").is_err());
        assert!(decode("").is_err());
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}{}", "[".repeat(100), "]".repeat(100));
        assert!(decode(&deep).is_err());
        let shallow = format!("{}{}", "[".repeat(10), "]".repeat(10));
        assert!(decode(&shallow).is_ok());
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(decode_or_raw("Some output here"), json!("Some output here"));
        assert_eq!(decode_or_raw("[1, 2]"), json!([1, 2]));
        assert_eq!(decode_message("'AssertionError: boom'"), "AssertionError: boom");
        assert_eq!(decode_message("AssertionError: boom"), "AssertionError: boom");
        assert_eq!(decode_message("[1]"), "[1]");
    }
}
