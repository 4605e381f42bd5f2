//! Shape checks for streamed JSON payloads.
//!
//! A payload that fails to parse is either cut off (more text is coming) or
//! broken for good. Only the first kind is worth carrying over to the next line.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// Balanced object or array. If it still fails to parse, it is malformed.
    Balanced,
    /// Opens like JSON but has unclosed braces, brackets or strings.
    Truncated,
    /// Does not start like a JSON container, or closes more than it opens.
    Malformed,
}

/// Classifies a payload by bracket balance outside of string literals.
pub fn classify(payload: &str) -> PayloadShape {
    let trimmed = payload.trim();
    match trimmed.chars().next() {
        Some('{') | Some('[') => {}
        _ => return PayloadShape::Malformed,
    }

    let mut brace_count: i64 = 0;
    let mut bracket_count: i64 = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for ch in trimmed.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => brace_count += 1,
            '}' if !in_string => brace_count -= 1,
            '[' if !in_string => bracket_count += 1,
            ']' if !in_string => bracket_count -= 1,
            _ => {}
        }

        if brace_count < 0 || bracket_count < 0 {
            return PayloadShape::Malformed;
        }
    }

    if in_string || brace_count > 0 || bracket_count > 0 {
        PayloadShape::Truncated
    } else {
        PayloadShape::Balanced
    }
}
