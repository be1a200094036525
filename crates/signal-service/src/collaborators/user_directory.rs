//! Contact list lookups.

use crate::errors::SignalError;
use common::types::Identity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// One entry of the contact list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Identity,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
}

impl UserSummary {
    /// Summary whose display name is the identity itself.
    pub fn bare(id: Identity) -> Self {
        Self {
            full_name: id.to_string(),
            id,
            profile_pic: None,
        }
    }
}

/// The user directory.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    /// Every known user except `identity`, ordered by id.
    async fn list_excluding(&self, identity: &Identity) -> Result<Vec<UserSummary>, SignalError>;

    /// Note an identity that just authenticated or connected.
    async fn remember(&self, identity: &Identity) -> Result<(), SignalError>;
}

/// Process-local directory.
///
/// Seeded from configuration. Identities resolved by the API middleware or
/// bound at socket upgrade are added on first sight, so two fresh users can
/// find each other.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<BTreeMap<Identity, UserSummary>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory pre-populated with bare entries for `identities`.
    pub fn seeded(identities: impl IntoIterator<Item = Identity>) -> Self {
        let users = identities
            .into_iter()
            .map(|id| (id.clone(), UserSummary::bare(id)))
            .collect();
        Self {
            users: RwLock::new(users),
        }
    }

    /// Insert or replace an entry.
    pub async fn upsert(&self, summary: UserSummary) {
        self.users.write().await.insert(summary.id.clone(), summary);
    }

}

#[async_trait::async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn list_excluding(&self, identity: &Identity) -> Result<Vec<UserSummary>, SignalError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .filter(|u| &u.id != identity)
            .cloned()
            .collect())
    }

    async fn remember(&self, identity: &Identity) -> Result<(), SignalError> {
        self.users
            .write()
            .await
            .entry(identity.clone())
            .or_insert_with(|| UserSummary::bare(identity.clone()));
        Ok(())
    }
}
