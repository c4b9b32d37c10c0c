//! In-memory account stores: users, API keys, upstream credentials, and
//! bindings (spec.md §3). The relational persistence layer itself is an
//! external collaborator per spec.md §1 ("described by the data model but
//! not its SQL") — these traits are the contract yapi-auth's resolver and
//! yapi-admin's handlers code against; a real deployment swaps the
//! in-memory implementations for SQL-backed ones without touching either.

use async_trait::async_trait;
use dashmap::DashMap;
use yapi_core::credential::{ApiKey, Binding, UpstreamCredential};
use yapi_core::error::GatewayError;
use yapi_core::user::User;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn list(&self) -> Result<Vec<User>, GatewayError>;
    async fn get(&self, id: &str) -> Result<Option<User>, GatewayError>;
    async fn get_by_name(&self, name: &str) -> Result<Option<User>, GatewayError>;
    /// Fails with `Conflict` if `user.name` collides with a different user.
    async fn save(&self, user: User) -> Result<(), GatewayError>;
    async fn soft_delete(&self, id: &str) -> Result<(), GatewayError>;
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<ApiKey>, GatewayError>;
    async fn get_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>, GatewayError>;
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ApiKey>, GatewayError>;
    async fn save(&self, key: ApiKey) -> Result<(), GatewayError>;
    async fn delete(&self, id: &str) -> Result<(), GatewayError>;
    async fn touch_last_used(&self, id: &str) -> Result<(), GatewayError>;
}

#[async_trait]
pub trait UpstreamCredentialStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<UpstreamCredential>, GatewayError>;
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<UpstreamCredential>, GatewayError>;
    async fn save(&self, credential: UpstreamCredential) -> Result<(), GatewayError>;
    async fn delete(&self, id: &str) -> Result<(), GatewayError>;
}

#[async_trait]
pub trait BindingStore: Send + Sync {
    async fn get_by_api_key(&self, api_key_id: &str) -> Result<Option<Binding>, GatewayError>;
    async fn get(&self, id: &str) -> Result<Option<Binding>, GatewayError>;
    /// All bindings, for admin listing and persistence snapshots.
    async fn list(&self) -> Result<Vec<Binding>, GatewayError>;
    async fn save(&self, binding: Binding) -> Result<(), GatewayError>;
    async fn delete_for_api_key(&self, api_key_id: &str) -> Result<(), GatewayError>;
    async fn delete_for_credential(&self, credential_id: &str) -> Result<(), GatewayError>;
}

#[derive(Default)]
pub struct InMemoryUserStore {
    users: DashMap<String, User>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn list(&self) -> Result<Vec<User>, GatewayError> {
        Ok(self.users.iter().map(|e| e.value().clone()).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<User>, GatewayError> {
        Ok(self.users.get(id).map(|e| e.value().clone()))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<User>, GatewayError> {
        Ok(self
            .users
            .iter()
            .find(|e| e.value().name == name)
            .map(|e| e.value().clone()))
    }

    async fn save(&self, user: User) -> Result<(), GatewayError> {
        if let Some(existing) = self.get_by_name(&user.name).await? {
            if existing.id != user.id {
                return Err(GatewayError::Conflict(format!(
                    "user name {:?} already in use",
                    user.name
                )));
            }
        }
        self.users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn soft_delete(&self, id: &str) -> Result<(), GatewayError> {
        match self.users.get_mut(id) {
            Some(mut e) => {
                e.deleted = true;
                Ok(())
            }
            None => Err(GatewayError::NotFound(format!("user {id:?} not found"))),
        }
    }
}

#[derive(Default)]
pub struct InMemoryApiKeyStore {
    keys: DashMap<String, ApiKey>,
}

impl InMemoryApiKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiKeyStore for InMemoryApiKeyStore {
    async fn get(&self, id: &str) -> Result<Option<ApiKey>, GatewayError> {
        Ok(self.keys.get(id).map(|e| e.value().clone()))
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>, GatewayError> {
        Ok(self
            .keys
            .iter()
            .find(|e| e.value().prefix == prefix)
            .map(|e| e.value().clone()))
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ApiKey>, GatewayError> {
        Ok(self
            .keys
            .iter()
            .filter(|e| e.value().user_id == user_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn save(&self, key: ApiKey) -> Result<(), GatewayError> {
        if let Some(existing) = self.get_by_prefix(&key.prefix).await? {
            if existing.id != key.id {
                return Err(GatewayError::Conflict(format!(
                    "api key prefix {:?} already in use",
                    key.prefix
                )));
            }
        }
        self.keys.insert(key.id.clone(), key);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), GatewayError> {
        self.keys
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| GatewayError::NotFound(format!("api key {id:?} not found")))
    }

    async fn touch_last_used(&self, id: &str) -> Result<(), GatewayError> {
        match self.keys.get_mut(id) {
            Some(mut e) => {
                e.last_used_at = Some(chrono::Utc::now());
                Ok(())
            }
            None => Err(GatewayError::NotFound(format!("api key {id:?} not found"))),
        }
    }
}

#[derive(Default)]
pub struct InMemoryUpstreamCredentialStore {
    credentials: DashMap<String, UpstreamCredential>,
}

impl InMemoryUpstreamCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UpstreamCredentialStore for InMemoryUpstreamCredentialStore {
    async fn get(&self, id: &str) -> Result<Option<UpstreamCredential>, GatewayError> {
        Ok(self.credentials.get(id).map(|e| e.value().clone()))
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<UpstreamCredential>, GatewayError> {
        Ok(self
            .credentials
            .iter()
            .filter(|e| e.value().user_id == user_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn save(&self, credential: UpstreamCredential) -> Result<(), GatewayError> {
        self.credentials.insert(credential.id.clone(), credential);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), GatewayError> {
        self.credentials
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| GatewayError::NotFound(format!("upstream credential {id:?} not found")))
    }
}

#[derive(Default)]
pub struct InMemoryBindingStore {
    /// Keyed by api_key_id: current model is one binding per key (the
    /// service-scoped variant would key by (api_key_id, service) instead).
    by_key: DashMap<String, Binding>,
    by_id: DashMap<String, String>,
}

impl InMemoryBindingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BindingStore for InMemoryBindingStore {
    async fn get_by_api_key(&self, api_key_id: &str) -> Result<Option<Binding>, GatewayError> {
        Ok(self.by_key.get(api_key_id).map(|e| e.value().clone()))
    }

    async fn get(&self, id: &str) -> Result<Option<Binding>, GatewayError> {
        match self.by_id.get(id) {
            Some(key_id) => Ok(self.by_key.get(key_id.value()).map(|e| e.value().clone())),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Binding>, GatewayError> {
        Ok(self.by_key.iter().map(|e| e.value().clone()).collect())
    }

    async fn save(&self, binding: Binding) -> Result<(), GatewayError> {
        self.by_id
            .insert(binding.id.clone(), binding.api_key_id.clone());
        self.by_key.insert(binding.api_key_id.clone(), binding);
        Ok(())
    }

    async fn delete_for_api_key(&self, api_key_id: &str) -> Result<(), GatewayError> {
        if let Some((_, binding)) = self.by_key.remove(api_key_id) {
            self.by_id.remove(&binding.id);
        }
        Ok(())
    }

    async fn delete_for_credential(&self, credential_id: &str) -> Result<(), GatewayError> {
        let stale: Vec<String> = self
            .by_key
            .iter()
            .filter(|e| e.value().upstream_credential_id == credential_id)
            .map(|e| e.key().clone())
            .collect();
        for key_id in stale {
            self.delete_for_api_key(&key_id).await?;
        }
        Ok(())
    }
}
