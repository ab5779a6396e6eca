//! Display name extraction from registry payloads.
//!
//! The registry wraps its answer differently depending on the deployment: an
//! ASP.NET `d` envelope (sometimes holding a JSON-encoded string), a flat
//! object with `nombreCompleto`, or a terse `n`. Nothing here fails; an
//! unrecognised shape yields [`UNKNOWN_NAME`].

use serde_json::{Map, Value};

pub const UNKNOWN_NAME: &str = "unknown";

const NAME_KEYS: [&str; 4] = ["nombreCompleto", "nombre", "n", "name"];
const SURNAME_KEYS: [&str; 2] = ["primerApellido", "segundoApellido"];

pub fn extract_display_name(payload: &Value) -> String {
    unwrap_envelope(payload)
        .as_ref()
        .and_then(name_from_object)
        .unwrap_or_else(|| UNKNOWN_NAME.to_string())
}

fn unwrap_envelope(payload: &Value) -> Option<Map<String, Value>> {
    let object = payload.as_object()?;
    match object.get("d") {
        Some(Value::Object(inner)) => Some(inner.clone()),
        Some(Value::String(encoded)) => match serde_json::from_str::<Value>(encoded) {
            Ok(Value::Object(inner)) => Some(inner),
            _ => Some(object.clone()),
        },
        _ => Some(object.clone()),
    }
}

fn name_from_object(object: &Map<String, Value>) -> Option<String> {
    let direct = NAME_KEYS
        .iter()
        .filter_map(|key| non_empty(object.get(*key)))
        .next();

    match direct {
        Some(name) if name_has_surnames(object) && !name.contains(' ') => {
            Some(compose(&name, object))
        }
        Some(name) => Some(name),
        None => None,
    }
}

fn name_has_surnames(object: &Map<String, Value>) -> bool {
    SURNAME_KEYS.iter().any(|key| non_empty(object.get(*key)).is_some())
}

fn compose(first: &str, object: &Map<String, Value>) -> String {
    let mut parts = vec![first.to_string()];
    parts.extend(SURNAME_KEYS.iter().filter_map(|key| non_empty(object.get(*key))));
    parts.join(" ")
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
