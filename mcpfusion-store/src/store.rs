//! The embedded persistent store (spec §4.1).

use crate::error::{StoreError, StoreResult};
use crate::model::{ApiTokenMetadata, KnowledgeEntry, StoredToken, User};
use crate::schema::*;
use chrono::Utc;
use mcpfusion_core::authcode::{hash_secret, IssuedAuthCode};
use rand::RngCore;
use sled::transaction::{ConflictableTransactionError, Transactional};
use sled::Db;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Handle to the on-disk store. Cheap to clone (sled trees are
/// reference-counted handles onto the shared page cache).
#[derive(Clone)]
pub struct Store {
    db: Db,
    system: sled::Tree,
    api_token_meta: sled::Tree,
    oauth_tokens: sled::Tree,
    service_credentials: sled::Tree,
    token_index_by_prefix: sled::Tree,
    users_meta: sled::Tree,
    user_api_keys: sled::Tree,
    knowledge: sled::Tree,
    key_to_user: sled::Tree,
    auth_codes: sled::Tree,
}

impl Store {
    /// Open (creating if absent) the store rooted at `path`. Refuses to
    /// open a store stamped with a schema version newer than
    /// [`SCHEMA_VERSION`].
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db = sled::open(path)?;
        let system = db.open_tree(TREE_SYSTEM)?;

        match system.get(KEY_SCHEMA_VERSION)? {
            Some(raw) => {
                let on_disk = u32::from_be_bytes(raw.as_ref().try_into().map_err(|_| {
                    StoreError::TransactionAborted("corrupt schema_version record".into())
                })?);
                if on_disk > SCHEMA_VERSION {
                    return Err(StoreError::UnsupportedSchemaVersion {
                        on_disk,
                        supported: SCHEMA_VERSION,
                    });
                }
            }
            None => {
                system.insert(KEY_SCHEMA_VERSION, &SCHEMA_VERSION.to_be_bytes())?;
            }
        }

        let store = Self {
            api_token_meta: db.open_tree(TREE_API_TOKEN_META)?,
            oauth_tokens: db.open_tree(TREE_OAUTH_TOKENS)?,
            service_credentials: db.open_tree(TREE_SERVICE_CREDENTIALS)?,
            token_index_by_prefix: db.open_tree(TREE_TOKEN_INDEX_BY_PREFIX)?,
            users_meta: db.open_tree(TREE_USERS_META)?,
            user_api_keys: db.open_tree(TREE_USER_API_KEYS)?,
            knowledge: db.open_tree(TREE_KNOWLEDGE)?,
            key_to_user: db.open_tree(TREE_KEY_TO_USER)?,
            auth_codes: db.open_tree(TREE_AUTH_CODES)?,
            system,
            db,
        };
        info!("store opened with schema version {}", SCHEMA_VERSION);
        Ok(store)
    }

    /// An ephemeral store backed by a temporary directory, for tests.
    #[doc(hidden)]
    pub fn open_temporary() -> StoreResult<(Self, tempfile::TempDir)> {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Self::open(dir.path())?;
        Ok((store, dir))
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    // ---- API tokens (§4.1 "AddAPIToken" et al.) ----------------------

    /// Generates 32 random bytes, hex-encodes them as the plaintext secret,
    /// and atomically creates the tenant's metadata, prefix index, and an
    /// auto-migrated user. Returns the plaintext exactly once.
    pub fn add_api_token(&self, description: &str) -> StoreResult<(String, String)> {
        let mut secret_bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut secret_bytes);
        let plaintext = hex::encode(secret_bytes);
        let hash = hash_secret(&plaintext);
        let prefix = plaintext[..PREFIX_LEN].to_string();

        let user = User::new(Uuid::new_v4().to_string(), format!("auto-created for token {prefix}"));
        let metadata = ApiTokenMetadata {
            hash: hash.clone(),
            prefix: prefix.clone(),
            description: description.to_string(),
            created_at: Utc::now(),
            last_used_at: None,
        };

        (
            &self.api_token_meta,
            &self.token_index_by_prefix,
            &self.key_to_user,
            &self.users_meta,
            &self.user_api_keys,
        )
            .transaction(|(meta_tx, prefix_tx, k2u_tx, users_tx, uak_tx)| {
                let meta_bytes = serde_json::to_vec(&metadata)
                    .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?;
                meta_tx.insert(hash.as_bytes(), meta_bytes)?;

                let mut hashes = read_prefix_set(prefix_tx, &prefix)?;
                hashes.push(hash.clone());
                let prefix_bytes = serde_json::to_vec(&hashes)
                    .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?;
                prefix_tx.insert(prefix.as_bytes(), prefix_bytes)?;

                k2u_tx.insert(hash.as_bytes(), user.id.as_bytes())?;

                let user_bytes = serde_json::to_vec(&user)
                    .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?;
                users_tx.insert(user.id.as_bytes(), user_bytes)?;

                uak_tx.insert(user_api_key_key(&user.id, &hash), &[])?;

                Ok(())
            })
            .map_err(StoreError::from)?;

        debug!(%hash, "added api token");
        Ok((plaintext, hash))
    }

    /// Validates a presented plaintext token and, on success, updates
    /// `last_used` in the same transaction.
    pub fn validate_api_token(&self, plaintext: &str) -> StoreResult<(bool, String)> {
        let hash = hash_secret(plaintext);
        let updated = (&self.api_token_meta,)
            .transaction(|(meta_tx,)| {
                let Some(raw) = meta_tx.get(hash.as_bytes())? else {
                    return Ok(false);
                };
                let mut meta: ApiTokenMetadata = serde_json::from_slice(&raw)
                    .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?;
                meta.last_used_at = Some(Utc::now());
                let bytes = serde_json::to_vec(&meta)
                    .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?;
                meta_tx.insert(hash.as_bytes(), bytes)?;
                Ok(true)
            })
            .map_err(StoreError::from)?;
        Ok((updated, hash))
    }

    /// Resolves a full hash or an unambiguous hex prefix to the canonical
    /// hash. A prefix matching more than one token is an error distinct
    /// from not-found (§8 boundary behaviour).
    pub fn resolve_api_token(&self, identifier: &str) -> StoreResult<String> {
        if self.api_token_meta.contains_key(identifier.as_bytes())? {
            return Ok(identifier.to_string());
        }
        if identifier.len() >= PREFIX_LEN {
            let short = &identifier[..PREFIX_LEN];
            let hashes = read_prefix_set_plain(&self.token_index_by_prefix, short)?;
            return match hashes.len() {
                0 => Err(StoreError::NotFound),
                1 => Ok(hashes.into_iter().next().unwrap()),
                _ => Err(StoreError::AmbiguousPrefix(short.to_string())),
            };
        }
        Err(StoreError::NotFound)
    }

    pub fn get_api_token_metadata(&self, hash: &str) -> StoreResult<ApiTokenMetadata> {
        let raw = self
            .api_token_meta
            .get(hash.as_bytes())?
            .ok_or(StoreError::NotFound)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn list_api_tokens(&self) -> StoreResult<Vec<ApiTokenMetadata>> {
        self.api_token_meta
            .iter()
            .values()
            .map(|r| Ok(serde_json::from_slice(&r?)?))
            .collect()
    }

    /// Cascades the tenant's oauth tokens and credentials, removes both
    /// index entries, and drops the token's membership in its user's
    /// `api_keys` index (the user record itself is left intact).
    pub fn delete_api_token(&self, hash: &str) -> StoreResult<()> {
        let metadata = self.get_api_token_metadata(hash)?;
        let user_id = self.key_to_user.get(hash.as_bytes())?.map(|v| {
            String::from_utf8(v.to_vec()).unwrap_or_default()
        });

        for key in self.oauth_tokens.scan_prefix(tenant_prefix(hash)).keys() {
            self.oauth_tokens.remove(key?)?;
        }
        for key in self
            .service_credentials
            .scan_prefix(tenant_prefix(hash))
            .keys()
        {
            self.service_credentials.remove(key?)?;
        }

        (
            &self.api_token_meta,
            &self.token_index_by_prefix,
            &self.key_to_user,
            &self.user_api_keys,
        )
            .transaction(|(meta_tx, prefix_tx, k2u_tx, uak_tx)| {
                meta_tx.remove(hash.as_bytes())?;

                let mut hashes = read_prefix_set(prefix_tx, &metadata.prefix)?;
                hashes.retain(|h| h != hash);
                if hashes.is_empty() {
                    prefix_tx.remove(metadata.prefix.as_bytes())?;
                } else {
                    let bytes = serde_json::to_vec(&hashes)
                        .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?;
                    prefix_tx.insert(metadata.prefix.as_bytes(), bytes)?;
                }

                k2u_tx.remove(hash.as_bytes())?;

                if let Some(ref user_id) = user_id {
                    uak_tx.remove(user_api_key_key(user_id, hash))?;
                }

                Ok(())
            })
            .map_err(StoreError::from)?;

        debug!(%hash, "deleted api token");
        Ok(())
    }

    /// Ensures `hash` is linked to a user, auto-migrating a legacy token
    /// (one with metadata but no `key_to_user` entry) by creating a fresh
    /// user for it, per the §3 invariant.
    pub fn ensure_user_for_token(&self, hash: &str) -> StoreResult<String> {
        if let Some(existing) = self.key_to_user.get(hash.as_bytes())? {
            return Ok(String::from_utf8(existing.to_vec()).unwrap_or_default());
        }
        let user = User::new(Uuid::new_v4().to_string(), format!("auto-migrated for token {hash}"));
        (&self.users_meta, &self.key_to_user, &self.user_api_keys)
            .transaction(|(users_tx, k2u_tx, uak_tx)| {
                let bytes = serde_json::to_vec(&user)
                    .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?;
                users_tx.insert(user.id.as_bytes(), bytes)?;
                k2u_tx.insert(hash.as_bytes(), user.id.as_bytes())?;
                uak_tx.insert(user_api_key_key(&user.id, hash), &[])?;
                Ok(())
            })
            .map_err(StoreError::from)?;
        Ok(user.id)
    }

    pub fn user_for_token(&self, hash: &str) -> StoreResult<Option<String>> {
        Ok(self
            .key_to_user
            .get(hash.as_bytes())?
            .map(|v| String::from_utf8(v.to_vec()).unwrap_or_default()))
    }

    /// Detaches `hash` from its current user, orphaning it until the next
    /// `ensure_user_for_token` call re-migrates it (used by the admin CLI's
    /// `unlink` operation, ahead of a subsequent `link`).
    pub fn unlink_api_token(&self, hash: &str) -> StoreResult<()> {
        if let Some(user_id) = self.user_for_token(hash)? {
            self.user_api_keys.remove(user_api_key_key(&user_id, hash))?;
        }
        self.key_to_user.remove(hash.as_bytes())?;
        Ok(())
    }

    pub fn link_api_token(&self, hash: &str, user_id: &str) -> StoreResult<()> {
        if self.get_user(user_id)?.is_none() {
            return Err(StoreError::NotFound);
        }
        self.key_to_user.insert(hash.as_bytes(), user_id.as_bytes())?;
        self.user_api_keys.insert(user_api_key_key(user_id, hash), &[])?;
        Ok(())
    }

    // ---- OAuth tokens / service credentials (§4.1) --------------------

    pub fn store_oauth_token(&self, hash: &str, service: &str, token: &StoredToken) -> StoreResult<()> {
        let bytes = serde_json::to_vec(token)?;
        self.oauth_tokens.insert(tenant_service_key(hash, service), bytes)?;
        Ok(())
    }

    pub fn get_oauth_token(&self, hash: &str, service: &str) -> StoreResult<Option<StoredToken>> {
        match self.oauth_tokens.get(tenant_service_key(hash, service))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn delete_oauth_token(&self, hash: &str, service: &str) -> StoreResult<()> {
        self.oauth_tokens.remove(tenant_service_key(hash, service))?;
        Ok(())
    }

    pub fn list_oauth_tokens(&self, hash: &str) -> StoreResult<Vec<(String, StoredToken)>> {
        let mut out = Vec::new();
        for kv in self.oauth_tokens.scan_prefix(tenant_prefix(hash)) {
            let (key, raw) = kv?;
            let service = service_suffix(hash, &key);
            out.push((service, serde_json::from_slice(&raw)?));
        }
        Ok(out)
    }

    pub fn store_service_credentials(&self, hash: &str, service: &str, token: &StoredToken) -> StoreResult<()> {
        let bytes = serde_json::to_vec(token)?;
        self.service_credentials
            .insert(tenant_service_key(hash, service), bytes)?;
        Ok(())
    }

    pub fn get_service_credentials(&self, hash: &str, service: &str) -> StoreResult<Option<StoredToken>> {
        match self.service_credentials.get(tenant_service_key(hash, service))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    // ---- Users ---------------------------------------------------------

    pub fn create_user(&self, description: &str) -> StoreResult<User> {
        let user = User::new(Uuid::new_v4().to_string(), description.to_string());
        let bytes = serde_json::to_vec(&user)?;
        self.users_meta.insert(user.id.as_bytes(), bytes)?;
        Ok(user)
    }

    pub fn get_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        match self.users_meta.get(user_id.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn list_users(&self) -> StoreResult<Vec<User>> {
        self.users_meta
            .iter()
            .values()
            .map(|r| Ok(serde_json::from_slice(&r?)?))
            .collect()
    }

    /// Cascades every bucket scoped under the user: their knowledge
    /// entries, their `api_keys` index, and the `key_to_user` entries for
    /// every token that pointed at them. The underlying token metadata
    /// records themselves are left alone (§3 "deleting a user cascades").
    pub fn delete_user(&self, user_id: &str) -> StoreResult<()> {
        for key in self.knowledge.scan_prefix(knowledge_user_prefix(user_id)).keys() {
            self.knowledge.remove(key?)?;
        }
        for key in self.user_api_keys.scan_prefix(user_api_key_prefix(user_id)).keys() {
            let key = key?;
            self.user_api_keys.remove(&key)?;
            if let Some(hash) = key.get(user_id.len() + 1..) {
                self.key_to_user.remove(hash)?;
            }
        }
        self.users_meta.remove(user_id.as_bytes())?;
        Ok(())
    }

    // ---- Knowledge store (§4.10, §8 scenario 6) -----------------------

    pub fn knowledge_set(&self, user_id: &str, domain: &str, key: &str, content: &str) -> StoreResult<KnowledgeEntry> {
        let existing = self.knowledge.get(knowledge_key(user_id, domain, key))?;
        let created_at = match existing {
            Some(ref raw) => serde_json::from_slice::<KnowledgeEntry>(raw)?.created_at,
            None => Utc::now(),
        };
        let entry = KnowledgeEntry {
            domain: domain.to_string(),
            key: key.to_string(),
            content: content.to_string(),
            created_at,
            updated_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&entry)?;
        self.knowledge.insert(knowledge_key(user_id, domain, key), bytes)?;
        Ok(entry)
    }

    pub fn knowledge_get(&self, user_id: &str, domain: &str, key: &str) -> StoreResult<Option<KnowledgeEntry>> {
        match self.knowledge.get(knowledge_key(user_id, domain, key))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn knowledge_list_domain(&self, user_id: &str, domain: &str) -> StoreResult<Vec<KnowledgeEntry>> {
        self.knowledge
            .scan_prefix(knowledge_domain_prefix(user_id, domain))
            .values()
            .map(|r| Ok(serde_json::from_slice(&r?)?))
            .collect()
    }

    pub fn knowledge_list_all(&self, user_id: &str) -> StoreResult<Vec<KnowledgeEntry>> {
        self.knowledge
            .scan_prefix(knowledge_user_prefix(user_id))
            .values()
            .map(|r| Ok(serde_json::from_slice(&r?)?))
            .collect()
    }

    pub fn knowledge_delete(&self, user_id: &str, domain: &str, key: &str) -> StoreResult<bool> {
        Ok(self.knowledge.remove(knowledge_key(user_id, domain, key))?.is_some())
    }

    // ---- Helper-flow auth codes (§4.9) --------------------------------

    pub fn put_issued_auth_code(&self, issued: &IssuedAuthCode) -> StoreResult<()> {
        let bytes = serde_json::to_vec(issued)?;
        self.auth_codes.insert(issued.code.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get_issued_auth_code(&self, code: &str) -> StoreResult<Option<IssuedAuthCode>> {
        match self.auth_codes.get(code.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn delete_issued_auth_code(&self, code: &str) -> StoreResult<()> {
        self.auth_codes.remove(code.as_bytes())?;
        Ok(())
    }
}

fn read_prefix_set(
    tree: &sled::transaction::TransactionalTree,
    prefix: &str,
) -> Result<Vec<String>, ConflictableTransactionError<StoreError>> {
    match tree.get(prefix.as_bytes())? {
        Some(raw) => serde_json::from_slice(&raw).map_err(|e| ConflictableTransactionError::Abort(e.into())),
        None => Ok(Vec::new()),
    }
}

fn read_prefix_set_plain(tree: &sled::Tree, prefix: &str) -> StoreResult<Vec<String>> {
    match tree.get(prefix.as_bytes())? {
        Some(raw) => Ok(serde_json::from_slice(&raw)?),
        None => Ok(Vec::new()),
    }
}

fn service_suffix(hash: &str, key: &sled::IVec) -> String {
    let skip = hash.len() + 1;
    String::from_utf8_lossy(&key[skip.min(key.len())..]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_validate_delete_token_round_trip() {
        let (store, _dir) = Store::open_temporary().unwrap();
        let (plaintext, hash) = store.add_api_token("dev").unwrap();
        assert_eq!(hash_secret(&plaintext), hash);

        let tokens = store.list_api_tokens().unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].hash, hash);
        assert_eq!(tokens[0].prefix, &plaintext[..PREFIX_LEN]);
        assert_eq!(tokens[0].description, "dev");

        let (valid, validated_hash) = store.validate_api_token(&plaintext).unwrap();
        assert!(valid);
        assert_eq!(validated_hash, hash);

        store.delete_api_token(&hash).unwrap();
        assert!(store.list_api_tokens().unwrap().is_empty());
        let (valid, _) = store.validate_api_token(&plaintext).unwrap();
        assert!(!valid);
    }

    #[test]
    fn resolve_prefix_ambiguity() {
        let (store, _dir) = Store::open_temporary().unwrap();
        let (p1, h1) = store.add_api_token("a").unwrap();
        // Force a second token sharing the same 8-char prefix by direct
        // manipulation of the index, simulating the boundary case from §8.
        let shared_prefix = p1[..PREFIX_LEN].to_string();
        let h2 = hash_secret("some-other-plaintext-with-same-prefix");
        let meta = ApiTokenMetadata {
            hash: h2.clone(),
            prefix: shared_prefix.clone(),
            description: "b".into(),
            created_at: Utc::now(),
            last_used_at: None,
        };
        store
            .api_token_meta
            .insert(h2.as_bytes(), serde_json::to_vec(&meta).unwrap())
            .unwrap();
        let existing = store
            .token_index_by_prefix
            .get(shared_prefix.as_bytes())
            .unwrap()
            .map(|raw| serde_json::from_slice::<Vec<String>>(&raw).unwrap())
            .unwrap_or_default();
        let mut updated = existing;
        updated.push(h2.clone());
        store
            .token_index_by_prefix
            .insert(shared_prefix.as_bytes(), serde_json::to_vec(&updated).unwrap())
            .unwrap();

        let result = store.resolve_api_token(&shared_prefix);
        assert!(matches!(result, Err(StoreError::AmbiguousPrefix(_))));
        let _ = h1;
    }

    #[test]
    fn delete_user_cascades_knowledge_but_not_token_metadata() {
        let (store, _dir) = Store::open_temporary().unwrap();
        let (_plaintext, hash) = store.add_api_token("dev").unwrap();
        let user_id = store.user_for_token(&hash).unwrap().unwrap();

        store.knowledge_set(&user_id, "email", "k1", "content").unwrap();
        store.delete_user(&user_id).unwrap();

        assert!(store.knowledge_get(&user_id, "email", "k1").unwrap().is_none());
        assert!(store.get_user(&user_id).unwrap().is_none());
        // token metadata itself is untouched by user deletion
        assert!(store.get_api_token_metadata(&hash).is_ok());
    }

    #[test]
    fn knowledge_lifecycle() {
        let (store, _dir) = Store::open_temporary().unwrap();
        let user = store.create_user("tester").unwrap();
        store
            .knowledge_set(&user.id, "email", "dymon-packages", "ask about Mini 20")
            .unwrap();
        let got = store.knowledge_get(&user.id, "email", "dymon-packages").unwrap().unwrap();
        assert_eq!(got.content, "ask about Mini 20");

        let list = store.knowledge_list_domain(&user.id, "email").unwrap();
        assert_eq!(list.len(), 1);

        let deleted = store.knowledge_delete(&user.id, "email", "dymon-packages").unwrap();
        assert!(deleted);
        assert!(store
            .knowledge_get(&user.id, "email", "dymon-packages")
            .unwrap()
            .is_none());
    }

    #[test]
    fn schema_version_guard_rejects_future_version() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = sled::open(dir.path()).unwrap();
            let system = db.open_tree(TREE_SYSTEM).unwrap();
            system
                .insert(KEY_SCHEMA_VERSION, &(SCHEMA_VERSION + 1).to_be_bytes())
                .unwrap();
        }
        let result = Store::open(dir.path());
        assert!(matches!(result, Err(StoreError::UnsupportedSchemaVersion { .. })));
    }

    #[test]
    fn issued_auth_code_round_trip_and_delete() {
        let (store, _dir) = Store::open_temporary().unwrap();
        let issued = IssuedAuthCode::new("ONETIME", "google", "tenant-hash");
        store.put_issued_auth_code(&issued).unwrap();

        let fetched = store.get_issued_auth_code("ONETIME").unwrap().unwrap();
        assert_eq!(fetched.service, "google");
        assert!(!fetched.consumed);

        store.delete_issued_auth_code("ONETIME").unwrap();
        assert!(store.get_issued_auth_code("ONETIME").unwrap().is_none());
    }
}
