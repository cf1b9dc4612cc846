//! Identity issuer
//!
//! Registers credentials, checks them at login and mints identity tokens.
//! The issuer is only consulted on `/auth/*`; downstream routes are verified
//! by the gateway from the shared key registry alone.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;
use zeroize::Zeroizing;

use super::store::{CredentialRecord, CredentialStore, Identity};
use crate::auth::{
    hash_password, normalize_identifier, verify_password, HashParams, IssuedToken, KeyRegistry,
    SecretPolicy, SharedClock, TokenIssuer, TokenVerifier,
};
use crate::logging::{SecurityEvent, SecurityEventKind};
use crate::types::{AuthError, LintelError};

/// Plaintext verified against for unknown identifiers
const DUMMY_SECRET: &str = "lintel-dummy-secret-for-timing";

/// Issuer settings
#[derive(Debug, Clone)]
pub struct IssuerConfig {
    pub token_ttl_secs: u64,
    pub clock_skew_secs: u64,
    pub hash_params: HashParams,
    pub policy: SecretPolicy,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: 86_400,
            clock_skew_secs: 5,
            hash_params: HashParams::default(),
            policy: SecretPolicy::default(),
        }
    }
}

/// A minted token together with the identity it names
#[derive(Debug, Clone)]
pub struct Session {
    pub token: IssuedToken,
    pub identity: Identity,
}

pub struct IdentityIssuer {
    store: Arc<dyn CredentialStore>,
    tokens: TokenIssuer,
    verifier: TokenVerifier,
    clock: SharedClock,
    hash_params: HashParams,
    policy: SecretPolicy,
    /// Same cost as real hashes, so unknown identifiers take as long as
    /// wrong secrets
    dummy_hash: String,
}

impl IdentityIssuer {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        keys: Arc<KeyRegistry>,
        clock: SharedClock,
        config: IssuerConfig,
    ) -> Result<Self, LintelError> {
        let dummy_hash = hash_password(DUMMY_SECRET, &config.hash_params)?;

        Ok(Self {
            store,
            tokens: TokenIssuer::new(Arc::clone(&keys), clock.clone(), config.token_ttl_secs),
            verifier: TokenVerifier::new(keys, clock.clone(), config.clock_skew_secs),
            clock,
            hash_params: config.hash_params,
            policy: config.policy,
            dummy_hash,
        })
    }

    pub fn token_ttl_secs(&self) -> u64 {
        self.tokens.ttl_seconds()
    }

    /// Create a new identity.
    ///
    /// Fails with `InvalidRequest` for a malformed identifier, `WeakSecret`
    /// when the policy rejects the secret and `DuplicateIdentifier` when the
    /// identifier is already registered.
    pub async fn register(&self, identifier: &str, secret: &str) -> Result<Identity, LintelError> {
        let identifier = normalize_identifier(identifier)?;
        self.policy.check(&identifier, secret)?;

        // Skip the hashing cost for the common duplicate case; the store's
        // atomic insert still decides races.
        if self.store.find_by_identifier(&identifier).await?.is_some() {
            return Err(AuthError::DuplicateIdentifier.into());
        }

        let password_hash = self.hash(secret).await?;
        let now = self.now();
        let record = CredentialRecord {
            identity_id: Uuid::new_v4(),
            identifier,
            password_hash,
            created_at: now,
            updated_at: now,
        };
        let identity = record.identity();
        self.store.insert(record).await?;

        SecurityEvent::new(SecurityEventKind::Registered)
            .with_subject(identity.identity_id.to_string())
            .with_identifier(identity.identifier.as_str())
            .emit();

        Ok(identity)
    }

    /// Check credentials and mint a token.
    ///
    /// Unknown identifiers and wrong secrets both yield `InvalidCredentials`
    /// after the same amount of hashing work.
    pub async fn authenticate(&self, identifier: &str, secret: &str) -> Result<Session, LintelError> {
        // A malformed identifier can't be registered; treat it as unknown
        let identifier = normalize_identifier(identifier).unwrap_or_default();
        let record = if identifier.is_empty() {
            None
        } else {
            self.store.find_by_identifier(&identifier).await?
        };

        let hash = record
            .as_ref()
            .map(|r| r.password_hash.clone())
            .unwrap_or_else(|| self.dummy_hash.clone());
        let matches = self.verify(secret, hash).await?;

        let record = match record {
            Some(record) if matches => record,
            _ => {
                SecurityEvent::new(SecurityEventKind::LoginFailed)
                    .with_identifier(identifier)
                    .with_code(AuthError::InvalidCredentials.code())
                    .emit();
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let session = self.session_for(record.identity())?;
        SecurityEvent::new(SecurityEventKind::LoginSucceeded)
            .with_subject(session.identity.identity_id.to_string())
            .with_identifier(session.identity.identifier.as_str())
            .with_detail(format!("kid={}", session.token.kid))
            .emit();

        Ok(session)
    }

    /// Resolve a token to its identity.
    ///
    /// Every failure is `InvalidToken`, carrying the underlying verification
    /// error as its reason.
    pub async fn whoami(&self, token: &str) -> Result<Identity, LintelError> {
        Ok(self.record_for_token(token).await?.identity())
    }

    /// Mint a fresh token for a still-valid one. The old token stays valid
    /// until it expires.
    pub async fn refresh(&self, token: &str) -> Result<Session, LintelError> {
        let identity = self.whoami(token).await?;
        let session = self.session_for(identity)?;
        debug!(subject = %session.identity.identity_id, "Refreshed token");
        Ok(session)
    }

    /// Replace the caller's secret after checking the current one
    pub async fn change_secret(
        &self,
        token: &str,
        current_secret: &str,
        new_secret: &str,
    ) -> Result<(), LintelError> {
        let record = self.record_for_token(token).await?;

        if !self.verify(current_secret, record.password_hash.clone()).await? {
            SecurityEvent::new(SecurityEventKind::LoginFailed)
                .with_subject(record.identity_id.to_string())
                .with_identifier(record.identifier.as_str())
                .with_code(AuthError::InvalidCredentials.code())
                .with_detail("current secret rejected on change")
                .emit();
            return Err(AuthError::InvalidCredentials.into());
        }

        self.policy.check(&record.identifier, new_secret)?;
        let password_hash = self.hash(new_secret).await?;
        self.store
            .update_password_hash(record.identity_id, password_hash, self.now())
            .await?;

        SecurityEvent::new(SecurityEventKind::SecretChanged)
            .with_subject(record.identity_id.to_string())
            .with_identifier(record.identifier)
            .emit();

        Ok(())
    }

    async fn record_for_token(&self, token: &str) -> Result<CredentialRecord, LintelError> {
        let claims = self
            .verifier
            .verify(token)
            .map_err(AuthError::into_invalid_token)?;

        let identity_id = Uuid::parse_str(&claims.sub).map_err(|_| {
            AuthError::MalformedToken("subject is not an identity id".into()).into_invalid_token()
        })?;

        self.store.find_by_id(identity_id).await?.ok_or_else(|| {
            AuthError::MalformedToken("subject does not exist".into())
                .into_invalid_token()
                .into()
        })
    }

    fn session_for(&self, identity: Identity) -> Result<Session, LintelError> {
        let token = self
            .tokens
            .issue(&identity.identity_id.to_string(), &identity.identifier)?;
        Ok(Session { token, identity })
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.clock.now() as i64, 0).unwrap_or_else(Utc::now)
    }

    /// Hash on a blocking thread; the plaintext copy is wiped afterwards
    async fn hash(&self, secret: &str) -> Result<String, LintelError> {
        let secret = Zeroizing::new(secret.to_owned());
        let params = self.hash_params;
        blocking(move || hash_password(&secret, &params)).await
    }

    async fn verify(&self, secret: &str, hash: String) -> Result<bool, LintelError> {
        let secret = Zeroizing::new(secret.to_owned());
        blocking(move || verify_password(&secret, &hash)).await
    }
}

async fn blocking<T, F>(f: F) -> Result<T, LintelError>
where
    F: FnOnce() -> Result<T, LintelError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LintelError::Internal(format!("Hashing task failed: {e}")))?
}
