//! Client-side placeholder translation.
//!
//! Playbooks write parameters the psycopg way: `%s` for positional values and
//! `%(name)s` for named ones, with `%%` for a literal percent sign. The wire
//! protocol only knows `$n`, so statements are rewritten before they are
//! prepared. Quoted strings, quoted identifiers, comments and dollar-quoted
//! bodies never contain placeholders; only `%%` is unescaped there.
//! Statements without parameters are passed through untouched.

use crate::models::QueryParams;
use serde_json::{Map, Value};

/// A statement rewritten to `$n` placeholders and the values to bind, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Translated {
    pub sql: String,
    pub values: Vec<Value>,
}

#[derive(Clone)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

enum Placeholder<'a> {
    Positional,
    Named(&'a str),
}

/// Rewrite `sql` for `params`.
pub fn translate(sql: &str, params: &QueryParams) -> Result<Translated, String> {
    match params {
        QueryParams::None => Ok(Translated { sql: sql.to_string(), values: Vec::new() }),
        QueryParams::Positional(values) => translate_positional(sql, values),
        QueryParams::Named(map) => translate_named(sql, map),
    }
}

fn translate_positional(sql: &str, values: &[Value]) -> Result<Translated, String> {
    let mut used = 0usize;
    let rewritten = rewrite(sql, |placeholder| match placeholder {
        Placeholder::Positional => {
            used += 1;
            Ok(used)
        }
        Placeholder::Named(name) => {
            Err(format!("named placeholder %({name})s used with positional_args"))
        }
    })?;

    // No `%s` at all: the statement uses native `$n` placeholders.
    if used == 0 {
        return Ok(Translated { sql: rewritten, values: values.to_vec() });
    }
    if used > values.len() {
        return Err(format!(
            "not enough arguments for format string: {used} placeholders, {} values",
            values.len()
        ));
    }
    if used < values.len() {
        return Err(format!(
            "not all arguments converted during string formatting: {used} placeholders, {} values",
            values.len()
        ));
    }

    Ok(Translated { sql: rewritten, values: values.to_vec() })
}

fn translate_named(sql: &str, map: &Map<String, Value>) -> Result<Translated, String> {
    let mut order: Vec<String> = Vec::new();
    let rewritten = rewrite(sql, |placeholder| match placeholder {
        Placeholder::Named(name) => {
            if !map.contains_key(name) {
                return Err(format!("missing value for named argument '{name}'"));
            }
            match order.iter().position(|seen| seen == name) {
                Some(idx) => Ok(idx + 1),
                None => {
                    order.push(name.to_string());
                    Ok(order.len())
                }
            }
        }
        Placeholder::Positional => Err("positional placeholder %s used with named_args".to_string()),
    })?;

    let values = order.iter().filter_map(|name| map.get(name).cloned()).collect();
    Ok(Translated { sql: rewritten, values })
}

/// Walk `sql`, replacing each placeholder with `$n` where `n` comes from `bind`.
fn rewrite<'a, F>(sql: &'a str, mut bind: F) -> Result<String, String>
where
    F: FnMut(Placeholder<'a>) -> Result<usize, String>,
{
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut state = State::Normal;
    let mut last = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];

        // `%%` is an escaped percent sign in every state.
        if b == b'%' && bytes.get(idx + 1) == Some(&b'%') {
            out.push_str(&sql[last..idx]);
            out.push('%');
            idx += 2;
            last = idx;
            continue;
        }

        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((tag, advance)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = advance;
                    }
                }
                b'%' => {
                    let (placeholder, end) = parse_placeholder(sql, idx)?;
                    let n = bind(placeholder)?;
                    out.push_str(&sql[last..idx]);
                    out.push('$');
                    out.push_str(&n.to_string());
                    idx = end;
                    last = idx;
                    continue;
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 { State::Normal } else { State::BlockComment(depth - 1) };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && matches_tag(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }

    out.push_str(&sql[last..]);
    Ok(out)
}

/// Parse the placeholder starting at the `%` at `start`; returns it and the index after it.
fn parse_placeholder(sql: &str, start: usize) -> Result<(Placeholder<'_>, usize), String> {
    let bytes = sql.as_bytes();
    match bytes.get(start + 1) {
        Some(b's') => Ok((Placeholder::Positional, start + 2)),
        Some(b'(') => {
            let name_start = start + 2;
            let close = sql[name_start..]
                .find(')')
                .map(|offset| name_start + offset)
                .ok_or_else(|| "incomplete placeholder: missing ')'".to_string())?;
            if bytes.get(close + 1) != Some(&b's') {
                return Err(format!(
                    "unsupported placeholder %({})",
                    &sql[name_start..close]
                ));
            }
            Ok((Placeholder::Named(&sql[name_start..close]), close + 2))
        }
        Some(_) => {
            let c = sql[start + 1..].chars().next().unwrap_or('%');
            Err(format!("unsupported format character '{c}' at position {start}"))
        }
        None => Err("incomplete format: trailing '%'".to_string()),
    }
}

fn is_line_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'-') && bytes.get(idx + 1) == Some(&b'-')
}

fn is_block_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'/') && bytes.get(idx + 1) == Some(&b'*')
}

fn is_block_comment_end(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'*') && bytes.get(idx + 1) == Some(&b'/')
}

fn try_start_dollar_quote(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut idx = start + 1;
    while idx < bytes.len() && bytes[idx] != b'$' {
        let b = bytes[idx];
        let digit_ok = idx > start + 1 && b.is_ascii_digit();
        if !(b.is_ascii_alphabetic() || b == b'_' || digit_ok) {
            return None;
        }
        idx += 1;
    }

    if idx < bytes.len() && bytes[idx] == b'$' {
        let tag = String::from_utf8(bytes[start + 1..idx].to_vec()).ok()?;
        Some((tag, idx))
    } else {
        None
    }
}

fn matches_tag(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let end = idx + 1 + tag.len();
    end < bytes.len() && bytes[idx + 1..end] == *tag.as_bytes() && bytes[end] == b'$'
}
