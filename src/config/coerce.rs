//! Boolean coercion shared by CLI flags, the project file and the
//! environment.

use crate::error::{EnvError, Result};

const TRUE_TOKENS: &[&str] = &["y", "yes", "true", "1"];
const FALSE_TOKENS: &[&str] = &["n", "no", "false", "0"];

/// Parse a boolean token. Returns `None` for anything outside the accepted
/// token sets.
pub fn parse_bool(value: &str) -> Option<bool> {
    let value = value.trim().to_ascii_lowercase();
    if TRUE_TOKENS.contains(&value.as_str()) {
        Some(true)
    } else if FALSE_TOKENS.contains(&value.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Coerce an optional raw value into a tri-state toggle: `Ok(None)` means
/// unspecified, an unrecognized token is an error naming `field`.
pub fn coerce_toggle(field: &str, value: Option<&str>) -> Result<Option<bool>> {
    match value {
        None => Ok(None),
        Some(raw) => parse_bool(raw).map(Some).ok_or_else(|| EnvError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
            expected: "one of y, yes, true, 1, n, no, false, 0".to_string(),
        }),
    }
}

/// Render a YAML scalar the way a user would have typed it on the command
/// line. Returns `None` for null, sequences and mappings.
pub fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        _ => None,
    }
}
