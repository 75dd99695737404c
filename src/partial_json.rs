//! Partial JSON completion for streamed structured output.
//!
//! While a response streams, `response_format` argument text arrives as a
//! growing but not-yet-valid JSON fragment. This module repairs the
//! fragment into the smallest valid JSON document that could legally
//! follow it, so callers can get an `onPartialParsed<T>` preview before the
//! stream completes. The repaired value is decoded against a
//! fully-`Option`-wrapped mirror of the target schema: a partial document
//! logically can't satisfy every required field yet, so every field must
//! be allowed to be absent mid-stream.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Object,
    Array,
}

/// Complete a truncated JSON fragment into syntactically valid JSON.
///
/// Strategy: scan character-by-character tracking open strings (respecting
/// `\`-escapes) and an open-bracket stack. At end of input:
/// - an open string is closed;
/// - a trailing, not-yet-colon-terminated object key is dropped, along
///   with its preceding comma;
/// - a trailing comma before a would-be next element is dropped;
/// - every still-open `{`/`[` is closed, innermost first.
///
/// Returns `None` if the fragment is empty or contains no openable
/// structure (nothing to complete).
pub fn complete(fragment: &str) -> Option<String> {
    if fragment.trim().is_empty() {
        return None;
    }

    let chars: Vec<char> = fragment.chars().collect();
    let mut stack: Vec<Frame> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    // Byte length (in chars) of output actually kept, truncating dangling
    // incomplete tokens (a key with no value yet, a bare trailing comma).
    let mut keep_upto = chars.len();

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push(Frame::Object),
            '[' => stack.push(Frame::Array),
            '}' => {
                stack.pop();
            }
            ']' => {
                stack.pop();
            }
            _ => {}
        }
        keep_upto = i + 1;
    }

    let mut out: String = chars[..keep_upto].iter().collect();

    if in_string {
        out.push('"');
    }

    trim_dangling_tail(&mut out, stack.last().copied());

    for frame in stack.iter().rev() {
        match frame {
            Frame::Object => out.push('}'),
            Frame::Array => out.push(']'),
        }
    }

    Some(out)
}

/// Drop a trailing comma, complete a trailing colon with no value as
/// `null`, or drop a trailing bare key with no colon yet — whatever
/// incomplete token sits at the end once open strings are closed.
/// `innermost` is the current open frame (the last unclosed bracket), used
/// to tell a just-closed object key (must be followed by `:`) from an
/// array element (already complete on its own).
///
/// A key with a colon but no value yet (`{"temp":`) is a complete key with
/// a missing value, not a dangling fragment — it's completed as
/// `{"temp":null}` rather than dropped, so streamed partial objects don't
/// lose fields the model has already committed to emitting.
fn trim_dangling_tail(out: &mut String, innermost: Option<Frame>) {
    loop {
        let trimmed = out.trim_end().to_string();
        *out = trimmed;

        if out.ends_with(',') {
            out.pop();
            continue;
        }
        if out.ends_with(':') {
            if has_key_before_colon(out) {
                out.push_str("null");
                break;
            }
            out.pop();
            continue;
        }
        if innermost == Some(Frame::Object) {
            if let Some(cut) = find_dangling_bare_key(out) {
                out.truncate(cut);
                continue;
            }
        }
        break;
    }
}

/// If `out` ends with a complete quoted string that is directly preceded
/// (module whitespace) by `{` or `,` rather than `:`, it's an object key
/// with no value yet and must be dropped along with any preceding comma.
fn find_dangling_bare_key(out: &str) -> Option<usize> {
    let bytes = out.as_bytes();
    if bytes.is_empty() || *bytes.last().unwrap() != b'"' {
        return None;
    }
    let mut start = bytes.len() - 1;
    loop {
        if start == 0 {
            return None;
        }
        start -= 1;
        if bytes[start] == b'"' && (start == 0 || bytes[start - 1] != b'\\') {
            break;
        }
    }
    let mut k = start;
    while k > 0 && bytes[k - 1].is_ascii_whitespace() {
        k -= 1;
    }
    if k == 0 || !(bytes[k - 1] == b'{' || bytes[k - 1] == b',') {
        return None;
    }
    let mut cut = start;
    let mut m = start;
    while m > 0 && bytes[m - 1].is_ascii_whitespace() {
        m -= 1;
    }
    if m > 0 && bytes[m - 1] == b',' {
        cut = m - 1;
    }
    Some(cut)
}

/// True if a trailing `:` is preceded (modulo whitespace) by a complete
/// quoted key, i.e. the fragment ends with `"key":` rather than a bare
/// colon with nothing valid before it.
fn has_key_before_colon(out: &str) -> bool {
    let bytes = out.as_bytes();
    let mut i = out.len();
    if i == 0 || bytes[i - 1] != b':' {
        return false;
    }
    i -= 1;
    // Walk back over whitespace, then a quoted key.
    while i > 0 && bytes[i - 1].is_ascii_whitespace() {
        i -= 1;
    }
    if i == 0 || bytes[i - 1] != b'"' {
        return false;
    }
    i -= 1;
    loop {
        if i == 0 {
            return false;
        }
        i -= 1;
        if bytes[i] == b'"' && (i == 0 || bytes[i - 1] != b'\\') {
            break;
        }
    }
    true
}

/// Parse a possibly-incomplete JSON fragment into a best-effort `Value`,
/// returning `Value::Null` if nothing could be salvaged.
pub fn parse_partial(fragment: &str) -> Value {
    match complete(fragment) {
        Some(repaired) => serde_json::from_str(&repaired).unwrap_or(Value::Null),
        None => Value::Null,
    }
}
