//! The helper-flow auth-code blob (§4.9, §6): a short-lived, single-use
//! handshake payload base64url-encoded for easy transcription into a
//! desktop helper.

use base64::{alphabet, engine::general_purpose::NO_PAD, engine::GeneralPurpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Default validity window for an issued blob.
pub const DEFAULT_TTL_MINUTES: i64 = 15;

/// Wire format of the blob: `{u, c, s}` as specified in §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCodeBlob {
    /// Gateway's externally reachable base URL.
    #[serde(rename = "u")]
    pub server_url: String,
    /// The one-time code.
    #[serde(rename = "c")]
    pub code: String,
    /// The service this code authorizes a token push for.
    #[serde(rename = "s")]
    pub service: String,
}

/// Size bound on a decoded blob, per §6 ("size bounded").
pub const MAX_BLOB_BYTES: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum AuthCodeError {
    #[error("auth-code blob is malformed: {0}")]
    Malformed(String),
    #[error("auth-code blob exceeds the {MAX_BLOB_BYTES}-byte size bound")]
    TooLarge,
}

// Unpadded base64url, but decoding tolerates padded input (§6).
const ENGINE: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, NO_PAD);

impl AuthCodeBlob {
    pub fn new(server_url: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            code: Uuid::new_v4().simple().to_string(),
            service: service.into(),
        }
    }

    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("AuthCodeBlob always serializes");
        ENGINE.encode(json)
    }

    pub fn decode(input: &str) -> Result<Self, AuthCodeError> {
        if input.len() > MAX_BLOB_BYTES {
            return Err(AuthCodeError::TooLarge);
        }
        // Accept both padded and unpadded base64url input.
        let trimmed = input.trim_end_matches('=');
        let bytes = ENGINE
            .decode(trimmed)
            .map_err(|e| AuthCodeError::Malformed(e.to_string()))?;
        if bytes.len() > MAX_BLOB_BYTES {
            return Err(AuthCodeError::TooLarge);
        }
        serde_json::from_slice(&bytes).map_err(|e| AuthCodeError::Malformed(e.to_string()))
    }
}

/// Server-side record of an issued code: tracks expiry and single-use
/// consumption independent of the blob itself (the blob is just a carrier).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedAuthCode {
    pub code: String,
    pub service: String,
    pub tenant_token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

impl IssuedAuthCode {
    pub fn new(code: impl Into<String>, service: impl Into<String>, tenant_token_hash: impl Into<String>) -> Self {
        let issued_at = Utc::now();
        Self {
            code: code.into(),
            service: service.into(),
            tenant_token_hash: tenant_token_hash.into(),
            issued_at,
            expires_at: issued_at + Duration::minutes(DEFAULT_TTL_MINUTES),
            consumed: false,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.consumed && now < self.expires_at
    }
}

/// Hash an API token's plaintext the same way the store does, so the auth
/// layer and the store agree on token identity without either depending on
/// the other.
pub fn hash_secret(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}
