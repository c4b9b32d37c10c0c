//! API keys, upstream credentials, and the binding that links them.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Literal prefix of every plaintext key, per spec.md §4.4/§6.
pub const KEY_LITERAL_PREFIX: &str = "yapi";
/// Length in hex characters of the public, indexable prefix segment.
pub const KEY_PUBLIC_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub label: String,

    /// 8-char hex prefix, unique, used for the lookup index.
    pub prefix: String,

    /// bcrypt hash of the secret half of the plaintext key. Never the
    /// plaintext itself — that is returned once at creation time and
    /// never persisted.
    pub secret_hash: String,

    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

/// A freshly minted plaintext key and the record derived from it.
///
/// `plaintext` is returned to the caller exactly once; only `prefix` and
/// `secret_hash` are ever persisted.
pub struct NewApiKey {
    pub plaintext: String,
    pub prefix: String,
    pub secret_hash: String,
}

/// Generate a new `yapi_<prefix8>_<secret48hex>` plaintext key.
///
/// Per spec.md §6: prefix and secret are hex-encoded from a 24-byte random
/// buffer split 4:20 (4 bytes → 8 hex chars prefix, 20 bytes → 40 hex chars
/// secret — `secret48hex` in the spec's naming counts the combined budget,
/// not the secret's own hex length).
pub fn generate_plaintext_key() -> (String, String, String) {
    let mut buf = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut buf);
    let prefix = hex::encode(&buf[..4]);
    let secret = hex::encode(&buf[4..]);
    let plaintext = format!("{KEY_LITERAL_PREFIX}_{prefix}_{secret}");
    (plaintext, prefix, secret)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamCredential {
    pub id: String,
    pub user_id: String,

    /// Service/provider tag, e.g. "openai", "anthropic".
    pub provider: String,
    pub display_name: String,

    /// Stored as-is; sensitive. Never logged.
    pub secret: String,

    /// Ordered endpoints; only `endpoints[0]` is ever used (spec.md §9 open
    /// question: no failover/health-checking/round-robin).
    #[serde(default)]
    pub endpoints: Vec<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UpstreamCredential {
    /// The single endpoint this credential resolves to, per the unconditional
    /// `endpoints[0]` contract.
    pub fn first_endpoint(&self) -> Option<&str> {
        self.endpoints.first().map(|s| s.as_str())
    }
}

/// Maps one APIKey to one UpstreamCredential. Optionally scoped to a
/// service/provider when a key is bound to more than one credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub id: String,
    pub user_id: String,
    pub api_key_id: String,
    pub upstream_credential_id: String,

    /// Present only for the service-scoped variant (one binding per
    /// (key, service) instead of one binding per key).
    #[serde(default)]
    pub service: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Resolved upstream-side facts attached to a `RequestContext` once a
/// binding has been followed to its credential. Endpoints are decoded
/// (owned strings) so the hot path never re-parses `Credential::endpoints`.
#[derive(Debug, Clone)]
pub struct UpstreamInfo {
    pub credential: UpstreamCredential,
    pub endpoints: Vec<String>,
}

impl UpstreamInfo {
    pub fn from_credential(credential: UpstreamCredential) -> Self {
        let endpoints = credential.endpoints.clone();
        Self {
            credential,
            endpoints,
        }
    }

    pub fn first_endpoint(&self) -> Option<&str> {
        self.endpoints.first().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_has_expected_shape() {
        let (plaintext, prefix, secret) = generate_plaintext_key();
        assert!(plaintext.starts_with("yapi_"));
        assert_eq!(prefix.len(), KEY_PUBLIC_PREFIX_LEN);
        assert_eq!(secret.len(), 40);
        let parts: Vec<&str> = plaintext.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1], prefix);
        assert_eq!(parts[2], secret);
    }

    #[test]
    fn generated_keys_are_unique() {
        let (p1, ..) = generate_plaintext_key();
        let (p2, ..) = generate_plaintext_key();
        assert_ne!(p1, p2);
    }

    #[test]
    fn first_endpoint_unconditionally_picks_index_zero() {
        let cred = UpstreamCredential {
            id: "c1".into(),
            user_id: "u1".into(),
            provider: "openai".into(),
            display_name: "prod".into(),
            secret: "sk-test".into(),
            endpoints: vec!["https://a.example".into(), "https://b.example".into()],
            metadata: HashMap::new(),
            enabled: true,
            created_at: None,
            updated_at: None,
        };
        assert_eq!(cred.first_endpoint(), Some("https://a.example"));
        let info = UpstreamInfo::from_credential(cred);
        assert_eq!(info.first_endpoint(), Some("https://a.example"));
    }
}
