//! Delimiter-based token extraction.

/// Extract the text between `open` and `close` in `input`.
///
/// Returns `None` when `open` does not occur, and `Some(Err-like None)`
/// cannot happen — an `open` with no matching `close` yields `Some(None)` so
/// the caller can distinguish "no token" from "malformed token".
pub fn extract_token<'a>(input: &'a str, open: &str, close: &str) -> Option<Option<&'a str>> {
    let start = input.find(open)?;
    let rest = &input[start + open.len()..];
    match rest.find(close) {
        Some(end) => Some(Some(&rest[..end])),
        None => Some(None),
    }
}
