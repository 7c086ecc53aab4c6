//! Dotted JSON-path lookup used for response transforms, pagination
//! extraction and templated cache keys. Object keys only, no array
//! indexing — the same restriction the response shaping language imposes
//! everywhere else.

use serde_json::Value;

pub fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| current.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn walks_nested_objects() {
        let value = json!({"data": {"items": [1, 2, 3]}});
        assert_eq!(get(&value, "data.items"), Some(&json!([1, 2, 3])));
    }

    #[test]
    fn missing_segment_is_none() {
        let value = json!({"data": {}});
        assert_eq!(get(&value, "data.items"), None);
    }
}
