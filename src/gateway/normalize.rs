//! Input normalization for operator-supplied SQL text.

use super::GatewayError;

/// Normalizes raw SQL text before validation.
///
/// Steps, in order: trim, replace ASCII control characters with a space,
/// collapse whitespace runs to one space, strip one trailing `;`.
/// Absent input normalizes to an empty string. Only ASCII whitespace and
/// control characters count; other Unicode spaces are kept as text.
///
/// Only a single terminator is ever stripped. When the text ends in two or
/// more terminators nothing is stripped, so the separator rule rejects it and
/// normalizing the output again yields the same text.
pub fn normalize(raw: Option<&str>, max_len: usize) -> Result<String, GatewayError> {
    let Some(raw) = raw else {
        return Ok(String::new());
    };

    let trimmed = raw.trim_matches(is_trimmable);
    if trimmed.chars().count() > max_len {
        return Err(GatewayError::InputTooLong { max: max_len });
    }

    let mut collapsed = String::with_capacity(trimmed.len());
    let mut pending_space = false;
    for c in trimmed.chars() {
        let c = if is_control(c) { ' ' } else { c };
        if c.is_ascii_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            collapsed.push(' ');
            pending_space = false;
        }
        collapsed.push(c);
    }

    Ok(strip_terminator(&collapsed).to_string())
}

/// Removes one trailing `;` plus the whitespace before it.
fn strip_terminator(sql: &str) -> &str {
    let Some(body) = sql.strip_suffix(';') else {
        return sql;
    };
    let body = body.trim_end_matches(' ');
    if body.ends_with(';') {
        sql
    } else {
        body
    }
}

fn is_control(c: char) -> bool {
    c <= '\u{1f}'
}

fn is_trimmable(c: char) -> bool {
    c <= ' '
}
