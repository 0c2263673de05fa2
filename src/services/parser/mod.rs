//! Command Scanner
//!
//! Walks free-form text looking for embedded tool invocations of the
//! form `mcp:server:tool(args)`. The scanner is a single-pass state
//! machine over a byte cursor: quoted strings and `//` / `/* */`
//! comments are skipped wholesale so a header inside either is never
//! matched, and the cursor always advances past the full consumed span
//! of a matched command so nothing inside it is re-parsed.

pub mod literal;

use serde_json::{Map, Value};

pub use literal::{find_args_end, parse_literal};

/// Prefix every invocation header starts with.
pub const COMMAND_PREFIX: &str = "mcp";

/// One invocation detected in the scanned text.
///
/// Built once per scan and never mutated afterward. `is_valid == false`
/// means the argument literal was malformed; the command carries a
/// placeholder `args` and must not be executed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    /// The exact source span the command was parsed from
    pub original: String,
    /// Target server id ("internal" or an external provider id)
    pub server: String,
    /// Tool name on that server
    pub tool: String,
    /// Evaluated argument value ({} for zero-argument calls)
    pub args: Value,
    /// Whether the argument literal parsed cleanly
    pub is_valid: bool,
    /// Parse failure detail when `is_valid` is false
    pub error: Option<String>,
}

/// Scan `text` and return every detected command in appearance order.
///
/// Malformed commands are emitted with `is_valid == false` rather than
/// aborting the scan, so one bad invocation never hides the rest.
pub fn scan_commands(text: &str) -> Vec<ParsedCommand> {
    let bytes = text.as_bytes();
    let mut commands = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes[i..].starts_with(b"//") => {
                i = skip_line(bytes, i);
            }
            b'/' if bytes[i..].starts_with(b"/*") => {
                i = skip_block_comment(bytes, i);
            }
            b'"' | b'\'' | b'`' => {
                i = skip_string(bytes, i);
            }
            _ => {
                if let Some((command, next)) = match_header(text, i) {
                    commands.push(command);
                    i = next;
                } else {
                    i += 1;
                }
            }
        }
    }

    commands
}

fn skip_line(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
    }
    i
}

fn skip_block_comment(bytes: &[u8], mut i: usize) -> usize {
    i += 2;
    while i < bytes.len() && !bytes[i..].starts_with(b"*/") {
        i += 1;
    }
    (i + 2).min(bytes.len())
}

/// Skip a quoted span including its closing quote. An unterminated
/// string runs to the end of input.
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn is_ident_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'-'
}

fn read_ident(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && is_ident_byte(bytes[i]) {
        i += 1;
    }
    i
}

/// Try to match a full command starting at `start`. Returns the parsed
/// command and the cursor position just past its consumed span.
fn match_header(text: &str, start: usize) -> Option<(ParsedCommand, usize)> {
    let bytes = text.as_bytes();
    let prefix = COMMAND_PREFIX.as_bytes();

    if !bytes[start..].starts_with(prefix) {
        return None;
    }
    let mut i = start + prefix.len();
    if bytes.get(i) != Some(&b':') {
        return None;
    }
    i += 1;

    let server_end = read_ident(bytes, i);
    if server_end == i {
        return None;
    }
    let server = &text[i..server_end];
    i = server_end;

    if bytes.get(i) != Some(&b':') {
        return None;
    }
    i += 1;

    let tool_end = read_ident(bytes, i);
    if tool_end == i {
        return None;
    }
    let tool = &text[i..tool_end];
    let header_end = tool_end;

    // Optional whitespace, then the argument list.
    let mut probe = header_end;
    while matches!(bytes.get(probe), Some(b' ' | b'\t' | b'\r' | b'\n')) {
        probe += 1;
    }

    if bytes.get(probe) != Some(&b'(') {
        // Zero-argument form; consume the header only.
        let command = ParsedCommand {
            original: text[start..header_end].to_string(),
            server: server.to_string(),
            tool: tool.to_string(),
            args: Value::Object(Map::new()),
            is_valid: true,
            error: None,
        };
        return Some((command, header_end));
    }

    let args_start = probe + 1;
    match find_args_end(text, args_start) {
        Some(close) => {
            let span = &text[start..=close];
            let literal = &text[args_start..close];
            let command = match parse_literal(literal) {
                Ok(args) => ParsedCommand {
                    original: span.to_string(),
                    server: server.to_string(),
                    tool: tool.to_string(),
                    args,
                    is_valid: true,
                    error: None,
                },
                Err(err) => ParsedCommand {
                    original: span.to_string(),
                    server: server.to_string(),
                    tool: tool.to_string(),
                    args: Value::Object(Map::new()),
                    is_valid: false,
                    error: Some(err),
                },
            };
            Some((command, close + 1))
        }
        None => {
            // Unterminated argument list. Truncate the span to the end
            // of the line so the rest of the text is still scanned.
            let recover = skip_line(bytes, args_start);
            let command = ParsedCommand {
                original: text[start..recover].to_string(),
                server: server.to_string(),
                tool: tool.to_string(),
                args: Value::Object(Map::new()),
                is_valid: false,
                error: Some("Unterminated argument list".to_string()),
            };
            Some((command, recover))
        }
    }
}
