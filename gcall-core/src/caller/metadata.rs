//! Metadata text parsing.
//!
//! Callers supply metadata as free text in one of two forms: a JSON object
//! of string-to-string entries, or the legacy `key1:value1,key2:value2`
//! pair list. Text that is neither is rejected with a diagnostic quoting the
//! input verbatim.
use super::CallerError;

/// Parses a metadata specification into ordered (key, value) entries.
pub fn parse_metadata_text(text: &str) -> Result<Vec<(String, String)>, CallerError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('{') {
        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(trimmed) {
            return Ok(map
                .into_iter()
                .map(|(key, value)| {
                    let value = match value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (key, value)
                })
                .collect());
        }
    }

    let mut entries = Vec::new();
    for pair in trimmed.split(',') {
        let Some((key, value)) = pair.split_once(':') else {
            return Err(CallerError::Metadata(text.to_string()));
        };
        entries.push((key.to_string(), value.to_string()));
    }
    Ok(entries)
}
