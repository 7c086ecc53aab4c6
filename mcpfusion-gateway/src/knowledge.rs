//! Built-in knowledge-store tools (spec §4.10): `knowledge_set`,
//! `knowledge_get`, `knowledge_delete`. These bypass the HTTP engine
//! entirely and operate directly on [`mcpfusion_store::Store`], scoped by
//! the resolved user ID.

use mcpfusion_store::Store;
use serde_json::{json, Value};

use crate::error::{GatewayError, GatewayResult};

fn str_arg<'a>(args: &'a serde_json::Map<String, Value>, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

fn require_str<'a>(args: &'a serde_json::Map<String, Value>, name: &str) -> GatewayResult<&'a str> {
    str_arg(args, name).filter(|s| !s.is_empty()).ok_or_else(|| GatewayError::Config(format!("'{name}' is required")))
}

pub fn knowledge_set(store: &Store, user_id: &str, args: &serde_json::Map<String, Value>) -> GatewayResult<Value> {
    let domain = require_str(args, "domain")?;
    let key = require_str(args, "key")?;
    let content = require_str(args, "content")?;
    let entry = store.knowledge_set(user_id, domain, key, content)?;
    Ok(json!({
        "domain": entry.domain,
        "key": entry.key,
        "content": entry.content,
        "created_at": entry.created_at,
        "updated_at": entry.updated_at,
    }))
}

/// `knowledge_get(domain?, key?)` (spec §9, §4.10 edge case): both given
/// resolves one entry, only `domain` lists that domain, neither lists the
/// caller's entire knowledge set. Enumeration is always caller-scoped,
/// never cross-user (spec §9 open question, resolved that way).
pub fn knowledge_get(store: &Store, user_id: &str, args: &serde_json::Map<String, Value>) -> GatewayResult<Value> {
    let domain = str_arg(args, "domain");
    let key = str_arg(args, "key");

    match (domain, key) {
        (Some(domain), Some(key)) => match store.knowledge_get(user_id, domain, key)? {
            Some(entry) => Ok(json!([{
                "domain": entry.domain,
                "key": entry.key,
                "content": entry.content,
                "created_at": entry.created_at,
                "updated_at": entry.updated_at,
            }])),
            None => Ok(json!([])),
        },
        (Some(domain), None) => {
            let entries = store.knowledge_list_domain(user_id, domain)?;
            Ok(serde_json::to_value(entries).expect("KnowledgeEntry always serializes"))
        }
        (None, _) => {
            let entries = store.knowledge_list_all(user_id)?;
            Ok(serde_json::to_value(entries).expect("KnowledgeEntry always serializes"))
        }
    }
}

pub fn knowledge_delete(store: &Store, user_id: &str, args: &serde_json::Map<String, Value>) -> GatewayResult<Value> {
    let domain = require_str(args, "domain")?;
    let key = require_str(args, "key")?;
    let deleted = store.knowledge_delete(user_id, domain, key)?;
    Ok(json!({ "deleted": deleted }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn args(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), json!(v))).collect()
    }

    #[test]
    fn set_then_get_then_delete_round_trips() {
        let (store, _dir) = Store::open_temporary().unwrap();
        let user = store.create_user("tester").unwrap();

        knowledge_set(&store, &user.id, &args(&[("domain", "email"), ("key", "k1"), ("content", "v1")])).unwrap();

        let got = knowledge_get(&store, &user.id, &args(&[("domain", "email"), ("key", "k1")])).unwrap();
        assert_eq!(got[0]["content"], "v1");

        let deleted = knowledge_delete(&store, &user.id, &args(&[("domain", "email"), ("key", "k1")])).unwrap();
        assert_eq!(deleted["deleted"], true);

        let got = knowledge_get(&store, &user.id, &args(&[("domain", "email"), ("key", "k1")])).unwrap();
        assert_eq!(got, json!([]));
    }

    #[test]
    fn get_with_no_args_lists_only_the_callers_entries() {
        let (store, _dir) = Store::open_temporary().unwrap();
        let user_a = store.create_user("a").unwrap();
        let user_b = store.create_user("b").unwrap();
        store.knowledge_set(&user_a.id, "email", "k1", "a-content").unwrap();
        store.knowledge_set(&user_b.id, "email", "k1", "b-content").unwrap();

        let got = knowledge_get(&store, &user_a.id, &Map::new()).unwrap();
        let items = got.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["content"], "a-content");
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let (store, _dir) = Store::open_temporary().unwrap();
        let user = store.create_user("tester").unwrap();
        assert!(knowledge_set(&store, &user.id, &args(&[("domain", "email")])).is_err());
    }
}
