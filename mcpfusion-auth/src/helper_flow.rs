//! Server side of the helper-flow bridge (spec §4.9): issuing a short-lived
//! auth-code blob, and verifying/consuming the one-time code when the
//! desktop helper pushes a token back.

use mcpfusion_core::authcode::{AuthCodeBlob, IssuedAuthCode};
use mcpfusion_store::{Store, StoredToken};

use crate::error::{AuthError, AuthResult};

pub struct HelperFlow<'a> {
    store: &'a Store,
}

impl<'a> HelperFlow<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Issues a blob packaging `{server_url, service, one-time code}` and
    /// records the server-side bookkeeping record for it.
    pub fn issue(&self, server_url: &str, service: &str, tenant_hash: &str) -> AuthResult<AuthCodeBlob> {
        let blob = AuthCodeBlob::new(server_url, service);
        let issued = IssuedAuthCode::new(blob.code.clone(), service, tenant_hash);
        self.store.put_issued_auth_code(&issued)?;
        Ok(blob)
    }

    /// Verifies `code` is live, matches `service`, and has not already
    /// been consumed, then writes `token` under the issuing tenant and
    /// marks the code consumed so it cannot be redeemed again.
    pub fn redeem(&self, code: &str, service: &str, token: StoredToken) -> AuthResult<()> {
        let mut issued = self.store.get_issued_auth_code(code)?.ok_or(AuthError::InvalidAuthCode)?;
        if issued.service != service || !issued.is_valid_at(chrono::Utc::now()) {
            return Err(AuthError::InvalidAuthCode);
        }

        issued.consumed = true;
        self.store.put_issued_auth_code(&issued)?;
        self.store.store_oauth_token(&issued.tenant_token_hash, service, &token)?;
        Ok(())
    }
}
