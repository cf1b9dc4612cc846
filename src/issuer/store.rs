//! Credential storage
//!
//! The issuer talks to storage through [`CredentialStore`]; the in-memory
//! implementation backs the binary and the tests.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::types::{AuthError, LintelError};

/// Public view of a registered identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub identity_id: Uuid,
    pub identifier: String,
    pub created_at: DateTime<Utc>,
}

/// Stored credential. The secret only ever exists as an Argon2id PHC string.
#[derive(Clone)]
pub struct CredentialRecord {
    pub identity_id: Uuid,
    pub identifier: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn identity(&self) -> Identity {
        Identity {
            identity_id: self.identity_id,
            identifier: self.identifier.clone(),
            created_at: self.created_at,
        }
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("identity_id", &self.identity_id)
            .field("identifier", &self.identifier)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Storage seam for credentials - allows swapping the in-memory store for a
/// database without touching the issuer
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new record. Fails with `DuplicateIdentifier` if the
    /// identifier is taken; the existing record is left untouched.
    async fn insert(&self, record: CredentialRecord) -> Result<(), LintelError>;

    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<CredentialRecord>, LintelError>;

    async fn find_by_id(&self, identity_id: Uuid) -> Result<Option<CredentialRecord>, LintelError>;

    /// Replace the password hash of an existing identity
    async fn update_password_hash(
        &self,
        identity_id: Uuid,
        password_hash: String,
        updated_at: DateTime<Utc>,
    ) -> Result<(), LintelError>;
}

/// In-memory credential store
#[derive(Default)]
pub struct MemoryCredentialStore {
    /// identifier -> record
    records: DashMap<String, CredentialRecord>,
    /// identity_id -> identifier
    by_id: DashMap<Uuid, String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn insert(&self, record: CredentialRecord) -> Result<(), LintelError> {
        // The entry guard holds the shard lock, so check-and-insert is atomic
        match self.records.entry(record.identifier.clone()) {
            Entry::Occupied(_) => Err(AuthError::DuplicateIdentifier.into()),
            Entry::Vacant(slot) => {
                self.by_id
                    .insert(record.identity_id, record.identifier.clone());
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<CredentialRecord>, LintelError> {
        Ok(self.records.get(identifier).map(|r| r.value().clone()))
    }

    async fn find_by_id(&self, identity_id: Uuid) -> Result<Option<CredentialRecord>, LintelError> {
        let identifier = match self.by_id.get(&identity_id) {
            Some(identifier) => identifier.value().clone(),
            None => return Ok(None),
        };
        Ok(self.records.get(&identifier).map(|r| r.value().clone()))
    }

    async fn update_password_hash(
        &self,
        identity_id: Uuid,
        password_hash: String,
        updated_at: DateTime<Utc>,
    ) -> Result<(), LintelError> {
        let identifier = self
            .by_id
            .get(&identity_id)
            .map(|i| i.value().clone())
            .ok_or_else(|| LintelError::NotFound(format!("identity {identity_id}")))?;

        let mut record = self
            .records
            .get_mut(&identifier)
            .ok_or_else(|| LintelError::NotFound(format!("identity {identity_id}")))?;
        record.password_hash = password_hash;
        record.updated_at = updated_at;
        Ok(())
    }
}
