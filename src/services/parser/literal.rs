//! Argument Literal Evaluator
//!
//! Evaluates the JSON-like argument literal inside a command's
//! parentheses. The grammar is deliberately bounded: objects and arrays,
//! quoted or bare object keys, strings in double/single/backtick quotes
//! with backslash escaping, numbers (including unary minus), booleans and
//! null. `//` and `/* */` comments are treated as whitespace. This is not
//! a general-purpose expression parser.

use serde_json::{Map, Number, Value};

/// Find the closing parenthesis matching an already-consumed `(`.
///
/// `from` is the byte offset just after the opening parenthesis; the
/// returned offset points at the matching `)` (the span is exclusive of
/// it). Quoted strings are skipped wholesale, honoring backslash escapes,
/// so parentheses and quotes inside string content never affect balance.
/// Returns `None` when the input ends before balance reaches zero.
pub fn find_args_end(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth: u32 = 1;
    let mut i = from;
    let mut in_string: Option<u8> = None;
    let mut escaped = false;

    while i < bytes.len() {
        let c = bytes[i];
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if c == b'\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
        } else {
            match c {
                b'"' | b'\'' | b'`' => in_string = Some(c),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Evaluate an argument literal into a JSON value.
///
/// An empty (or all-whitespace) literal evaluates to `{}`, matching the
/// zero-argument call form.
pub fn parse_literal(src: &str) -> Result<Value, String> {
    let mut parser = LiteralParser::new(src);
    parser.skip_trivia();
    if parser.at_end() {
        return Ok(Value::Object(Map::new()));
    }
    let value = parser.parse_value()?;
    parser.skip_trivia();
    if !parser.at_end() {
        return Err(format!(
            "Unexpected trailing content at offset {}",
            parser.pos
        ));
    }
    Ok(value)
}

struct LiteralParser<'a> {
    bytes: &'a [u8],
    src: &'a str,
    pos: usize,
}

impl<'a> LiteralParser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            bytes: src.as_bytes(),
            src,
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Skip whitespace and comments.
    fn skip_trivia(&mut self) {
        loop {
            while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
                self.pos += 1;
            }
            if self.bytes[self.pos..].starts_with(b"//") {
                while let Some(c) = self.peek() {
                    if c == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else if self.bytes[self.pos..].starts_with(b"/*") {
                self.pos += 2;
                while self.pos < self.bytes.len() && !self.bytes[self.pos..].starts_with(b"*/") {
                    self.pos += 1;
                }
                self.pos = (self.pos + 2).min(self.bytes.len());
            } else {
                return;
            }
        }
    }

    fn parse_value(&mut self) -> Result<Value, String> {
        self.skip_trivia();
        match self.peek() {
            None => Err("Unexpected end of arguments".to_string()),
            Some(b'{') => self.parse_object(),
            Some(b'[') => self.parse_array(),
            Some(b'"') | Some(b'\'') | Some(b'`') => Ok(Value::String(self.parse_string()?)),
            Some(c) if c == b'-' || c.is_ascii_digit() => self.parse_number(),
            Some(c) if is_ident_byte(c) => self.parse_keyword(),
            Some(c) => Err(format!(
                "Unexpected character '{}' at offset {}",
                c as char, self.pos
            )),
        }
    }

    fn parse_object(&mut self) -> Result<Value, String> {
        self.pos += 1; // consume '{'
        let mut map = Map::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::Object(map));
                }
                None => return Err("Unterminated object literal".to_string()),
                _ => {}
            }

            let key = self.parse_key()?;
            self.skip_trivia();
            if self.peek() != Some(b':') {
                return Err(format!("Expected ':' after key '{}' at offset {}", key, self.pos));
            }
            self.pos += 1;
            let value = self.parse_value()?;
            map.insert(key, value);

            self.skip_trivia();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1; // trailing commas tolerated
                }
                Some(b'}') => {}
                None => return Err("Unterminated object literal".to_string()),
                Some(c) => {
                    return Err(format!(
                        "Expected ',' or '}}' in object, found '{}' at offset {}",
                        c as char, self.pos
                    ));
                }
            }
        }
    }

    fn parse_array(&mut self) -> Result<Value, String> {
        self.pos += 1; // consume '['
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                None => return Err("Unterminated array literal".to_string()),
                _ => {}
            }
            items.push(self.parse_value()?);
            self.skip_trivia();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                }
                Some(b']') => {}
                None => return Err("Unterminated array literal".to_string()),
                Some(c) => {
                    return Err(format!(
                        "Expected ',' or ']' in array, found '{}' at offset {}",
                        c as char, self.pos
                    ));
                }
            }
        }
    }

    /// Object keys may be quoted strings or bare identifiers.
    fn parse_key(&mut self) -> Result<String, String> {
        match self.peek() {
            Some(b'"') | Some(b'\'') | Some(b'`') => self.parse_string(),
            Some(c) if is_ident_byte(c) => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if is_ident_byte(c)) {
                    self.pos += 1;
                }
                Ok(self.src[start..self.pos].to_string())
            }
            _ => Err(format!("Expected object key at offset {}", self.pos)),
        }
    }

    fn parse_string(&mut self) -> Result<String, String> {
        let quote = self.bytes[self.pos];
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err("Unterminated string literal".to_string()),
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        None => return Err("Unterminated string escape".to_string()),
                        Some(b'n') => {
                            out.push('\n');
                            self.pos += 1;
                        }
                        Some(b't') => {
                            out.push('\t');
                            self.pos += 1;
                        }
                        Some(b'r') => {
                            out.push('\r');
                            self.pos += 1;
                        }
                        Some(b'u') => {
                            self.pos += 1;
                            out.push(self.parse_unicode_escape()?);
                        }
                        // Any other escaped character stands for itself
                        // (covers \" \' \` \\ and friends).
                        Some(_) => {
                            let rest = &self.src[self.pos..];
                            let c = rest.chars().next().ok_or("Invalid escape")?;
                            out.push(c);
                            self.pos += c.len_utf8();
                        }
                    }
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(_) => {
                    let rest = &self.src[self.pos..];
                    let c = rest.chars().next().ok_or("Invalid UTF-8 in string")?;
                    out.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    fn parse_unicode_escape(&mut self) -> Result<char, String> {
        if self.pos + 4 > self.bytes.len() {
            return Err("Truncated \\u escape".to_string());
        }
        let hex = &self.src[self.pos..self.pos + 4];
        let code = u32::from_str_radix(hex, 16)
            .map_err(|_| format!("Invalid \\u escape '{}'", hex))?;
        self.pos += 4;
        char::from_u32(code).ok_or_else(|| format!("Invalid code point U+{:04X}", code))
    }

    fn parse_number(&mut self) -> Result<Value, String> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text = &self.src[start..self.pos];
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Number(Number::from(i)));
        }
        let f: f64 = text
            .parse()
            .map_err(|_| format!("Invalid number '{}'", text))?;
        Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| format!("Number '{}' is not representable", text))
    }

    fn parse_keyword(&mut self) -> Result<Value, String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_ident_byte(c)) {
            self.pos += 1;
        }
        match &self.src[start..self.pos] {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "null" => Ok(Value::Null),
            other => Err(format!("Unexpected identifier '{}'", other)),
        }
    }
}

fn is_ident_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$'
}
