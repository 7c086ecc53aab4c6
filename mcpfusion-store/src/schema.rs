//! Tree names and key layout for the bucket tree described in spec §4.1.
//!
//! sled has no native nested-bucket concept, so the `api_tokens/<hash>/...`
//! hierarchy is expressed as flat trees keyed by a `\0`-joined path prefix.
//! Transactions that must touch more than one tree atomically use sled's
//! multi-tree `Transactional` implementation for tuples.

/// Bumped whenever the on-disk key layout changes incompatibly.
pub const SCHEMA_VERSION: u32 = 1;

pub const TREE_SYSTEM: &str = "system";
pub const TREE_API_TOKEN_META: &str = "api_tokens/metadata";
pub const TREE_OAUTH_TOKENS: &str = "api_tokens/oauth_tokens";
pub const TREE_SERVICE_CREDENTIALS: &str = "api_tokens/service_credentials";
pub const TREE_TOKEN_INDEX_BY_PREFIX: &str = "token_index/by_prefix";
pub const TREE_USERS_META: &str = "users/metadata";
pub const TREE_USER_API_KEYS: &str = "users/api_keys";
pub const TREE_KNOWLEDGE: &str = "users/knowledge";
pub const TREE_KEY_TO_USER: &str = "key_to_user";
pub const TREE_AUTH_CODES: &str = "api_tokens/auth_codes";

pub const KEY_SCHEMA_VERSION: &[u8] = b"schema_version";
pub const KEY_STATS: &[u8] = b"stats";

pub const PREFIX_LEN: usize = 8;

/// `api_tokens/oauth_tokens` and `.../service_credentials` are keyed by
/// `<hash>\0<service>`.
pub fn tenant_service_key(hash: &str, service: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(hash.len() + 1 + service.len());
    key.extend_from_slice(hash.as_bytes());
    key.push(0);
    key.extend_from_slice(service.as_bytes());
    key
}

/// `users/knowledge` is keyed by `<user_id>\0<domain>\0<key>`.
pub fn knowledge_key(user_id: &str, domain: &str, key: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(user_id.len() + domain.len() + key.len() + 2);
    out.extend_from_slice(user_id.as_bytes());
    out.push(0);
    out.extend_from_slice(domain.as_bytes());
    out.push(0);
    out.extend_from_slice(key.as_bytes());
    out
}

/// Prefix used to scan every knowledge entry for `(user_id, domain)`.
pub fn knowledge_domain_prefix(user_id: &str, domain: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(user_id.len() + domain.len() + 2);
    out.extend_from_slice(user_id.as_bytes());
    out.push(0);
    out.extend_from_slice(domain.as_bytes());
    out.push(0);
    out
}

/// Prefix used to scan every knowledge entry for a user, across domains.
pub fn knowledge_user_prefix(user_id: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(user_id.len() + 1);
    out.extend_from_slice(user_id.as_bytes());
    out.push(0);
    out
}

/// Prefix used to scan every `(oauth_tokens | service_credentials)` entry
/// belonging to one tenant.
pub fn tenant_prefix(hash: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(hash.len() + 1);
    out.extend_from_slice(hash.as_bytes());
    out.push(0);
    out
}

/// `users/api_keys` is keyed by `<user_id>\0<hash>` so every hash owned by
/// a user can be scanned and cascade-deleted.
pub fn user_api_key_key(user_id: &str, hash: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(user_id.len() + hash.len() + 1);
    out.extend_from_slice(user_id.as_bytes());
    out.push(0);
    out.extend_from_slice(hash.as_bytes());
    out
}

pub fn user_api_key_prefix(user_id: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(user_id.len() + 1);
    out.extend_from_slice(user_id.as_bytes());
    out.push(0);
    out
}
