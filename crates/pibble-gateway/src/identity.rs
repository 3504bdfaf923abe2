use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{error, warn};

use pibble_types::error::ChatError;
use pibble_types::models::User;

use crate::store::{self, SharedStore};

/// Role given to synthesized admin identities.
pub const ADMIN_ROLE: &str = "Admin";

/// A privileged credential that validates even without a store row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCredential {
    pub credential: String,
    pub display_name: String,
}

impl AdminCredential {
    pub fn new(credential: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            display_name: display_name.into(),
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![Self::new("pibble_power3", "Tulip"), Self::new("1pibble", "Admin")]
    }

    /// Parse `key:Name,key2:Name2`.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>> {
        let mut admins = Vec::new();
        for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let Some((credential, name)) = item.split_once(':') else {
                bail!("admin credential '{}' is missing ':<display name>'", item);
            };
            let (credential, name) = (credential.trim(), name.trim());
            if credential.is_empty() || name.is_empty() {
                bail!("admin credential '{}' has an empty key or name", item);
            }
            admins.push(Self::new(credential, name));
        }
        Ok(admins)
    }

    fn synthesize(&self) -> User {
        User {
            credential: self.credential.clone(),
            display_name: self.display_name.clone(),
            avatar_path: None,
            role: Some(ADMIN_ROLE.to_string()),
            bio: None,
        }
    }
}

/// Where a resolved identity came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Stored(User),
    /// Fabricated in memory for a configured admin credential with no row.
    SyntheticAdmin(User),
}

impl Identity {
    pub fn into_user(self) -> User {
        match self {
            Self::Stored(user) | Self::SyntheticAdmin(user) => user,
        }
    }
}

/// Turns a raw credential into a user. Shared by the realtime gateway and
/// the HTTP handlers so both follow the same rules.
#[derive(Clone)]
pub struct IdentityResolver {
    store: SharedStore,
    admins: Arc<Vec<AdminCredential>>,
}

impl IdentityResolver {
    pub fn new(store: SharedStore, admins: Vec<AdminCredential>) -> Self {
        Self {
            store,
            admins: Arc::new(admins),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn is_admin(&self, credential: &str) -> bool {
        self.admin(credential).is_some()
    }

    fn admin(&self, credential: &str) -> Option<&AdminCredential> {
        self.admins.iter().find(|a| a.credential == credential)
    }

    /// A stored row wins over the synthetic admin identity. `Ok(None)` means
    /// the credential is unknown; `Err` means the store could not answer.
    pub async fn resolve(&self, credential: &str) -> Result<Option<Identity>, ChatError> {
        if credential.is_empty() {
            return Ok(None);
        }

        let key = credential.to_string();
        let lookup = store::call(&self.store, move |s| s.user_by_credential(&key)).await;

        match (lookup, self.admin(credential)) {
            (Ok(Some(user)), _) => Ok(Some(Identity::Stored(user))),
            (Ok(None), Some(admin)) => Ok(Some(Identity::SyntheticAdmin(admin.synthesize()))),
            (Ok(None), None) => Ok(None),
            (Err(e), Some(admin)) => {
                warn!("Store lookup failed for admin credential, using synthetic identity: {}", e);
                Ok(Some(Identity::SyntheticAdmin(admin.synthesize())))
            }
            (Err(e), None) => {
                error!("Credential lookup failed: {}", e);
                Err(ChatError::Persistence("Authentication error".into()))
            }
        }
    }

    pub async fn validate(&self, credential: &str) -> Result<Option<User>, ChatError> {
        Ok(self.resolve(credential).await?.map(Identity::into_user))
    }

    /// Like `validate`, but an unknown credential is an error.
    pub async fn require(&self, credential: &str) -> Result<User, ChatError> {
        self.validate(credential)
            .await?
            .ok_or_else(ChatError::invalid_credential)
    }
}
