use serde_json::Value;

/// Walk a dotted path like `"resp.pageLayout.widgets.0.data"` into a JSON
/// value. Numeric segments index into arrays; negative indices count from the
/// end. Returns `None` as soon as any segment is missing.
pub fn json_get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for seg in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(seg)?,
            Value::Array(items) => {
                let idx: i64 = seg.parse().ok()?;
                let idx = if idx < 0 {
                    items.len().checked_sub(idx.unsigned_abs() as usize)?
                } else {
                    idx as usize
                };
                items.get(idx)?
            }
            _ => return None,
        };
    }
    Some(current)
}

pub fn json_get_str(value: &Value, path: &str) -> Option<String> {
    json_get(value, path).and_then(|v| v.as_str()).map(str::to_string)
}

/// Numeric lookup tolerant of the string-encoded numbers some payloads carry
/// (Dmart prices arrive as `"249.00"`).
pub fn json_get_f64(value: &Value, path: &str) -> Option<f64> {
    match json_get(value, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Overwrite the value at a dotted path, if the full parent chain exists.
/// Used to blank out bulky subtrees before dumping payloads to disk.
pub fn json_set(value: &mut Value, path: &str, new_value: Value) {
    let Some((parent_path, leaf)) = path.rsplit_once('.') else {
        if let Value::Object(map) = value {
            if map.contains_key(path) {
                map.insert(path.to_string(), new_value);
            }
        }
        return;
    };
    let mut current = value;
    for seg in parent_path.split('.') {
        let next = match current {
            Value::Object(map) => map.get_mut(seg),
            Value::Array(items) => seg
                .parse::<i64>()
                .ok()
                .and_then(|idx| {
                    if idx < 0 {
                        items.len().checked_sub(idx.unsigned_abs() as usize)
                    } else {
                        Some(idx as usize)
                    }
                })
                .and_then(|idx| items.get_mut(idx)),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return,
        }
    }
    if let Value::Object(map) = current {
        if map.contains_key(leaf) {
            map.insert(leaf.to_string(), new_value);
        }
    }
}

/// Python-style truthiness: null, false, 0, "" and empty containers are all
/// "missing" as far as payload checks are concerned.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Recursively blank every object entry whose key matches the predicate.
pub fn json_blank_keys(value: &mut Value, matches: &dyn Fn(&str) -> bool, blank: &Value) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if matches(key) {
                    *v = blank.clone();
                } else {
                    json_blank_keys(v, matches, blank);
                }
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                json_blank_keys(v, matches, blank);
            }
        }
        _ => {}
    }
}
