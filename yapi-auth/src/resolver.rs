//! Raw-key parsing, bcrypt verification, and binding resolution
//! (spec.md §4.4).

use std::sync::Arc;
use yapi_core::credential::{
    ApiKey, Binding, UpstreamCredential, KEY_LITERAL_PREFIX, KEY_PUBLIC_PREFIX_LEN,
};
use yapi_core::error::GatewayError;
use yapi_core::user::User;
use yapi_store::{ApiKeyStore, BindingStore, UpstreamCredentialStore, UserStore};

/// A parsed `yapi_<prefix8>_<secret>` key, before lookup/verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawKey {
    pub prefix: String,
    pub secret: String,
}

/// Parse the plaintext key form. Fails `invalid-input` for anything that
/// isn't exactly three `_`-delimited parts with the literal prefix and an
/// 8-character prefix segment (spec.md §4.4).
pub fn parse_raw_key(raw: &str) -> Result<RawKey, GatewayError> {
    let parts: Vec<&str> = raw.split('_').collect();
    if parts.len() != 3 {
        return Err(GatewayError::InvalidInput("invalid-input: malformed key".into()));
    }
    if parts[0] != KEY_LITERAL_PREFIX {
        return Err(GatewayError::InvalidInput("invalid-input: wrong key prefix".into()));
    }
    if parts[1].len() != KEY_PUBLIC_PREFIX_LEN {
        return Err(GatewayError::InvalidInput(
            "invalid-input: prefix segment must be 8 characters".into(),
        ));
    }
    if parts[2].is_empty() {
        return Err(GatewayError::InvalidInput("invalid-input: empty secret".into()));
    }
    Ok(RawKey {
        prefix: parts[1].to_string(),
        secret: parts[2].to_string(),
    })
}

/// Resolves a raw bearer string into an `ApiKey`, optionally its owning
/// `User`, and (if bound) the `Binding` + `UpstreamCredential` it points at.
pub struct CredentialResolver {
    api_keys: Arc<dyn ApiKeyStore>,
    users: Arc<dyn UserStore>,
    bindings: Arc<dyn BindingStore>,
    upstreams: Arc<dyn UpstreamCredentialStore>,
}

impl CredentialResolver {
    pub fn new(
        api_keys: Arc<dyn ApiKeyStore>,
        users: Arc<dyn UserStore>,
        bindings: Arc<dyn BindingStore>,
        upstreams: Arc<dyn UpstreamCredentialStore>,
    ) -> Self {
        Self {
            api_keys,
            users,
            bindings,
            upstreams,
        }
    }

    /// Resolve a plaintext key into its `ApiKey` record. Never distinguishes
    /// "wrong secret" from "unknown prefix" from "disabled" in the error —
    /// all surface as `not-found` (spec.md §4.4: "never `unauthorized`
    /// reason leakage").
    pub async fn resolve_key(&self, raw: &str) -> Result<ApiKey, GatewayError> {
        let parsed = parse_raw_key(raw)?;
        let key = self
            .api_keys
            .get_by_prefix(&parsed.prefix)
            .await?
            .ok_or_else(|| GatewayError::NotFound("not-found: unknown api key".into()))?;

        if !key.enabled {
            return Err(GatewayError::NotFound("not-found: api key disabled".into()));
        }

        let verified = bcrypt::verify(&parsed.secret, &key.secret_hash)
            .map_err(|_| GatewayError::NotFound("not-found: api key".into()))?;
        if !verified {
            return Err(GatewayError::NotFound("not-found: api key".into()));
        }

        let _ = self.api_keys.touch_last_used(&key.id).await;
        Ok(key)
    }

    pub async fn resolve_user(&self, key: &ApiKey) -> Result<Option<User>, GatewayError> {
        self.users.get(&key.user_id).await
    }

    /// `not-found` if either the binding or the credential it references
    /// is missing.
    pub async fn resolve_binding(
        &self,
        key: &ApiKey,
    ) -> Result<Option<(Binding, UpstreamCredential)>, GatewayError> {
        let binding = match self.bindings.get_by_api_key(&key.id).await? {
            Some(b) => b,
            None => return Ok(None),
        };
        let credential = self
            .upstreams
            .get(&binding.upstream_credential_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound("not-found: bound upstream credential".into()))?;
        Ok(Some((binding, credential)))
    }

    /// Create a binding, enforcing spec.md §4.4's ownership invariant: the
    /// key's, the credential's, and the binding's own `user_id` must agree.
    pub async fn create_binding_checked(&self, binding: Binding) -> Result<(), GatewayError> {
        let key = self
            .api_keys
            .get(&binding.api_key_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound("not-found: api key".into()))?;
        let credential = self
            .upstreams
            .get(&binding.upstream_credential_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound("not-found: upstream credential".into()))?;

        if binding.user_id != key.user_id || key.user_id != credential.user_id {
            return Err(GatewayError::Conflict(
                "conflict: binding user_id must match both key and credential owners".into(),
            ));
        }

        self.bindings.save(binding).await
    }
}
