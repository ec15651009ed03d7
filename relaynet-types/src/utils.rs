use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current unix timestamp in milliseconds
pub fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Validate a value that will be used as a single topic segment
pub fn validate_segment(segment: &str) -> Result<(), String> {
    if segment.is_empty() {
        return Err("topic segment must not be empty".into());
    }
    for c in segment.chars() {
        if matches!(c, '+' | '/' | '#') {
            return Err(format!(
                "topic segment {segment} cannot contain '+', '/' or '#' characters"
            ));
        }
    }
    Ok(())
}

/// Follow a dotted object path (`"a.b.c"`) into a JSON value.
///
/// An empty path returns the value itself. Array elements can be addressed by index.
pub fn lookup_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, key| match current {
        serde_json::Value::Object(map) => map.get(key),
        serde_json::Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
