//! Length bounding for string fields.

/// Marker appended to any field that was cut short.
pub const TRIM_MARKER: &str = "...[trimmed]";

/// Default maximum length (in characters) for record string fields.
pub const DEFAULT_MAX_FIELD_LEN: usize = 2000;

/// Maximum length of the text content kept in a user action snapshot.
pub const USER_ACTION_TEXT_MAX: usize = 100;

/// Bound `value` to `max` characters, appending [`TRIM_MARKER`] when cut.
///
/// Lengths are counted in Unicode scalar values so multi-byte text is never
/// split mid-character.
pub fn trim_field(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        None => value.to_string(),
        Some((byte_idx, _)) => {
            let mut out = String::with_capacity(byte_idx + TRIM_MARKER.len());
            out.push_str(&value[..byte_idx]);
            out.push_str(TRIM_MARKER);
            out
        }
    }
}

/// [`trim_field`] lifted over an optional value.
pub fn trim_optional(value: Option<&str>, max: usize) -> Option<String> {
    value.map(|v| trim_field(v, max))
}
