//! Signing key registry
//!
//! Holds the HS256 keys that sign and verify identity tokens. The registry is
//! versioned and append-only:
//!
//! - readers take an immutable [`KeySet`] snapshot (`Arc`), so verification
//!   never waits on a rotation in progress
//! - every change publishes a new snapshot with a higher version
//! - a `kid` is bound to one secret forever, and a retired `kid` is never
//!   trusted again
//!
//! During rotation the previous active key becomes *retiring*: it still
//! verifies until its `retire_at`, then it is treated as unknown and tokens
//! bearing it fail with `InvalidSignature` even if unexpired.

use jsonwebtoken::{DecodingKey, EncodingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::auth::clock::SharedClock;
use crate::logging::{SecurityEvent, SecurityEventKind};
use crate::types::LintelError;

/// Minimum HS256 secret length in bytes
pub const MIN_SECRET_BYTES: usize = 32;

/// Raw HMAC secret, wiped from memory on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeySecret(Vec<u8>);

impl KeySecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, LintelError> {
        let bytes = bytes.into();
        if bytes.len() < MIN_SECRET_BYTES {
            return Err(LintelError::Config(format!(
                "signing secret must be at least {} bytes",
                MIN_SECRET_BYTES
            )));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Short SHA-256 fingerprint, safe to log
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.0);
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for KeySecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeySecret({})", self.fingerprint())
    }
}

/// Lifecycle state of a signing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    /// Signs new tokens and verifies
    Active,
    /// Verifies only, until `retire_at`
    Retiring,
    /// Never trusted again
    Retired,
}

/// A signing key as held in a [`KeySet`]
#[derive(Debug, Clone)]
pub struct SigningKey {
    pub kid: String,
    pub status: KeyStatus,
    /// End of the overlap window (retiring keys only)
    pub retire_at: Option<u64>,
    secret: KeySecret,
}

impl SigningKey {
    pub fn new(kid: impl Into<String>, secret: KeySecret) -> Self {
        Self {
            kid: kid.into(),
            status: KeyStatus::Active,
            retire_at: None,
            secret,
        }
    }

    fn retiring_until(mut self, retire_at: u64) -> Self {
        self.status = KeyStatus::Retiring;
        self.retire_at = Some(retire_at);
        self
    }

    pub fn fingerprint(&self) -> String {
        self.secret.fingerprint()
    }

    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(self.secret.as_bytes())
    }

    pub fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.secret.as_bytes())
    }
}

/// Immutable snapshot of the trusted keys
#[derive(Debug, Clone)]
pub struct KeySet {
    pub version: u64,
    active: SigningKey,
    retiring: Option<SigningKey>,
}

impl KeySet {
    /// Key used to sign new tokens
    pub fn active(&self) -> &SigningKey {
        &self.active
    }

    pub fn retiring(&self) -> Option<&SigningKey> {
        self.retiring.as_ref()
    }

    /// Key trusted to verify a token bearing `kid` at time `now`
    pub fn verification_key(&self, kid: &str, now: u64) -> Option<&SigningKey> {
        if self.active.kid == kid {
            return Some(&self.active);
        }
        match &self.retiring {
            Some(key) if key.kid == kid && key.retire_at.is_some_and(|at| now < at) => Some(key),
            _ => None,
        }
    }

    fn same_keys(&self, other: &KeySet) -> bool {
        let retiring = |set: &KeySet| set.retiring.as_ref().map(|k| (k.kid.clone(), k.retire_at));
        self.active.kid == other.active.kid && retiring(self) == retiring(other)
    }
}

/// One key in the configuration surface (env or keys file)
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KeyEntry {
    pub kid: String,
    pub secret: String,
    pub status: KeyStatus,
    #[serde(default)]
    pub retire_at: Option<u64>,
}

impl fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEntry")
            .field("kid", &self.kid)
            .field("status", &self.status)
            .field("retire_at", &self.retire_at)
            .finish_non_exhaustive()
    }
}

impl KeyEntry {
    pub fn active(kid: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            kid: kid.into(),
            secret: secret.into(),
            status: KeyStatus::Active,
            retire_at: None,
        }
    }

    pub fn retiring(kid: impl Into<String>, secret: impl Into<String>, retire_at: u64) -> Self {
        Self {
            kid: kid.into(),
            secret: secret.into(),
            status: KeyStatus::Retiring,
            retire_at: Some(retire_at),
        }
    }
}

/// On-disk key configuration: `{"keys": [...]}`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeysFile {
    pub keys: Vec<KeyEntry>,
}

impl KeysFile {
    pub fn from_json(json: &str) -> Result<Self, LintelError> {
        serde_json::from_str(json)
            .map_err(|e| LintelError::Config(format!("Invalid keys file: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self, LintelError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            LintelError::Config(format!("Failed to read keys file {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }
}

/// Ledger entry for every kid the registry has ever seen
#[derive(Debug, Clone)]
struct KeyRecord {
    fingerprint: String,
    retired: bool,
}

/// Versioned, append-only registry of signing keys
pub struct KeyRegistry {
    current: RwLock<Arc<KeySet>>,
    /// kid -> record; also serializes writers
    ledger: Mutex<HashMap<String, KeyRecord>>,
}

impl fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRegistry")
            .field("current", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl KeyRegistry {
    /// Registry with a single active key
    pub fn new(active: SigningKey) -> Self {
        Self::from_parts(active, None, Vec::new())
    }

    /// Registry from configured entries
    pub fn from_entries(entries: &[KeyEntry], now: u64) -> Result<Self, LintelError> {
        let (active, retiring, retired) = build_key_set(entries, now)?;
        Ok(Self::from_parts(active, retiring, retired))
    }

    fn from_parts(
        active: SigningKey,
        retiring: Option<SigningKey>,
        retired: Vec<(String, String)>,
    ) -> Self {
        let mut ledger = HashMap::new();
        for key in std::iter::once(&active).chain(retiring.iter()) {
            ledger.insert(
                key.kid.clone(),
                KeyRecord {
                    fingerprint: key.fingerprint(),
                    retired: false,
                },
            );
        }
        for (kid, fingerprint) in retired {
            ledger.insert(
                kid,
                KeyRecord {
                    fingerprint,
                    retired: true,
                },
            );
        }

        Self {
            current: RwLock::new(Arc::new(KeySet {
                version: 1,
                active,
                retiring,
            })),
            ledger: Mutex::new(ledger),
        }
    }

    /// Current key set
    pub fn snapshot(&self) -> Arc<KeySet> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    /// Replace the key set with configured entries.
    ///
    /// Returns `Ok(true)` when a new version was published and `Ok(false)`
    /// when the entries describe the current set. Entries that would re-bind
    /// a kid or revive a retired kid are rejected and nothing changes.
    pub fn apply(&self, entries: &[KeyEntry], now: u64) -> Result<bool, LintelError> {
        let (active, retiring, retired) = build_key_set(entries, now)?;

        let mut ledger = self.lock_ledger();
        for key in std::iter::once(&active).chain(retiring.iter()) {
            check_ledger(&ledger, key)?;
        }
        // (kid, fingerprint) of every key in the incoming set
        let incoming: Vec<(String, String)> = std::iter::once(&active)
            .chain(retiring.iter())
            .map(|k| (k.kid.clone(), k.fingerprint()))
            .collect();

        let current = self.snapshot();
        let next = KeySet {
            version: current.version + 1,
            active,
            retiring,
        };
        if next.same_keys(&current) {
            return Ok(false);
        }

        for (kid, fingerprint) in &incoming {
            ledger.entry(kid.clone()).or_insert_with(|| KeyRecord {
                fingerprint: fingerprint.clone(),
                retired: false,
            });
        }
        for (kid, fingerprint) in retired {
            ledger
                .entry(kid)
                .or_insert(KeyRecord {
                    fingerprint,
                    retired: true,
                })
                .retired = true;
        }
        // Keys dropped from the set are retired for good
        let mut dropped = Vec::new();
        for old in std::iter::once(&current.active).chain(current.retiring.iter()) {
            if !incoming.iter().any(|(kid, _)| *kid == old.kid) {
                if let Some(record) = ledger.get_mut(&old.kid) {
                    record.retired = true;
                }
                dropped.push(old.kid.clone());
            }
        }

        let published = Arc::new(next);
        *self.write_current() = Arc::clone(&published);
        drop(ledger);

        info!(
            version = published.version,
            active = %published.active.kid,
            retiring = ?published.retiring.as_ref().map(|k| &k.kid),
            "Signing key set updated"
        );
        for event in key_set_events(&current, &published, &dropped) {
            event.emit();
        }
        Ok(true)
    }

    /// Promote a new active key.
    ///
    /// The previous active key keeps verifying for `overlap` seconds; any
    /// key that was already retiring is retired immediately. An overlap of
    /// zero retires the previous key at once.
    pub fn rotate(
        &self,
        kid: impl Into<String>,
        secret: KeySecret,
        overlap: Duration,
        now: u64,
    ) -> Result<Arc<KeySet>, LintelError> {
        let incoming = SigningKey::new(kid, secret);
        if incoming.kid.is_empty() {
            return Err(LintelError::Config("key id must not be empty".into()));
        }

        let mut ledger = self.lock_ledger();
        check_ledger(&ledger, &incoming)?;

        let current = self.snapshot();
        let in_set = std::iter::once(&current.active)
            .chain(current.retiring.iter())
            .any(|k| k.kid == incoming.kid);
        if in_set {
            return Err(LintelError::Config(format!(
                "key {} is already in the key set",
                incoming.kid
            )));
        }

        let overlap_secs = overlap.as_secs();
        let previous = current.active.clone();
        let retiring = (overlap_secs > 0).then(|| previous.clone().retiring_until(now + overlap_secs));

        if let Some(record) = current
            .retiring
            .as_ref()
            .and_then(|k| ledger.get_mut(&k.kid))
        {
            record.retired = true;
        }
        if retiring.is_none() {
            if let Some(record) = ledger.get_mut(&previous.kid) {
                record.retired = true;
            }
        }
        ledger.insert(
            incoming.kid.clone(),
            KeyRecord {
                fingerprint: incoming.fingerprint(),
                retired: false,
            },
        );

        let published = Arc::new(KeySet {
            version: current.version + 1,
            active: incoming,
            retiring,
        });
        *self.write_current() = Arc::clone(&published);
        drop(ledger);

        SecurityEvent::new(SecurityEventKind::KeyRotated)
            .with_detail(format!(
                "active={} previous={} overlap={}s version={}",
                published.active.kid, previous.kid, overlap_secs, published.version
            ))
            .emit();

        Ok(published)
    }

    /// Drop the retiring key once its overlap window has closed.
    ///
    /// Verification already ignores it past `retire_at`; this publishes the
    /// retirement so the ledger and logs reflect it.
    pub fn retire_expired(&self, now: u64) -> bool {
        let mut ledger = self.lock_ledger();
        let current = self.snapshot();
        let Some(retiring) = current.retiring.as_ref() else {
            return false;
        };
        if retiring.retire_at.is_some_and(|at| now < at) {
            return false;
        }

        if let Some(record) = ledger.get_mut(&retiring.kid) {
            record.retired = true;
        }
        let published = Arc::new(KeySet {
            version: current.version + 1,
            active: current.active.clone(),
            retiring: None,
        });
        *self.write_current() = Arc::clone(&published);
        drop(ledger);

        SecurityEvent::new(SecurityEventKind::KeyRetired)
            .with_detail(format!("kid={} version={}", retiring.kid, published.version))
            .emit();
        true
    }

    fn lock_ledger(&self) -> std::sync::MutexGuard<'_, HashMap<String, KeyRecord>> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_current(&self) -> std::sync::RwLockWriteGuard<'_, Arc<KeySet>> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }
}

type BuiltKeys = (SigningKey, Option<SigningKey>, Vec<(String, String)>);

/// Validate entries and split them into active, retiring, and retired.
///
/// A retiring entry whose window already closed counts as retired.
fn build_key_set(entries: &[KeyEntry], now: u64) -> Result<BuiltKeys, LintelError> {
    let mut active = None;
    let mut retiring = None;
    let mut retired = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for entry in entries {
        if entry.kid.is_empty() {
            return Err(LintelError::Config("key id must not be empty".into()));
        }
        if !seen.insert(entry.kid.as_str()) {
            return Err(LintelError::Config(format!("duplicate key id {}", entry.kid)));
        }
        let secret = KeySecret::new(entry.secret.as_bytes().to_vec())
            .map_err(|e| LintelError::Config(format!("key {}: {e}", entry.kid)))?;
        let key = SigningKey::new(entry.kid.clone(), secret);

        match entry.status {
            KeyStatus::Active => {
                if active.replace(key).is_some() {
                    return Err(LintelError::Config("exactly one active key is allowed".into()));
                }
            }
            KeyStatus::Retiring => {
                let retire_at = entry.retire_at.ok_or_else(|| {
                    LintelError::Config(format!("retiring key {} needs retireAt", entry.kid))
                })?;
                if retire_at <= now {
                    retired.push((key.kid.clone(), key.fingerprint()));
                } else if retiring.replace(key.retiring_until(retire_at)).is_some() {
                    return Err(LintelError::Config("at most one retiring key is allowed".into()));
                }
            }
            KeyStatus::Retired => retired.push((key.kid.clone(), key.fingerprint())),
        }
    }

    let active = active.ok_or_else(|| LintelError::Config("an active signing key is required".into()))?;
    Ok((active, retiring, retired))
}

/// Security events for a key set published from configuration
fn key_set_events(previous: &KeySet, published: &KeySet, dropped: &[String]) -> Vec<SecurityEvent> {
    let mut events = Vec::new();
    if published.active.kid != previous.active.kid {
        events.push(SecurityEvent::new(SecurityEventKind::KeyRotated).with_detail(format!(
            "active={} previous={} source=keys_file version={}",
            published.active.kid, previous.active.kid, published.version
        )));
    }
    for kid in dropped {
        events.push(
            SecurityEvent::new(SecurityEventKind::KeyRetired)
                .with_detail(format!("kid={} version={}", kid, published.version)),
        );
    }
    events
}

fn check_ledger(ledger: &HashMap<String, KeyRecord>, key: &SigningKey) -> Result<(), LintelError> {
    match ledger.get(&key.kid) {
        Some(record) if record.fingerprint != key.fingerprint() => Err(LintelError::Config(
            format!("key id {} is already bound to a different secret", key.kid),
        )),
        Some(record) if record.retired => Err(LintelError::Config(format!(
            "key {} was retired and cannot be trusted again",
            key.kid
        ))),
        _ => Ok(()),
    }
}

/// Periodically reload the keys file and retire closed overlap windows.
///
/// A file that fails to load or validate is logged and the current key set
/// stays in force.
pub fn spawn_refresh_task(
    registry: Arc<KeyRegistry>,
    keys_file: Option<PathBuf>,
    interval: Duration,
    clock: SharedClock,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately; the registry is already loaded
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let now = clock.now();

            if let Some(ref path) = keys_file {
                match tokio::fs::read_to_string(path).await {
                    Ok(json) => match KeysFile::from_json(&json)
                        .and_then(|file| registry.apply(&file.keys, now))
                    {
                        Ok(true) => debug!(path = %path.display(), "Reloaded signing keys"),
                        Ok(false) => {}
                        Err(e) => warn!(path = %path.display(), "Keeping current signing keys: {}", e),
                    },
                    Err(e) => warn!(path = %path.display(), "Failed to read keys file: {}", e),
                }
            }

            registry.retire_expired(now);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET_A: &str = "secret-a-that-is-at-least-32-characters-long";
    const SECRET_B: &str = "secret-b-that-is-at-least-32-characters-long";
    const SECRET_C: &str = "secret-c-that-is-at-least-32-characters-long";

    fn key(kid: &str, secret: &str) -> SigningKey {
        SigningKey::new(kid, KeySecret::new(secret.as_bytes().to_vec()).unwrap())
    }

    #[test]
    fn test_secret_length_enforced() {
        assert!(KeySecret::new(b"short".to_vec()).is_err());
        assert!(KeySecret::new(SECRET_A.as_bytes().to_vec()).is_ok());
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = KeySecret::new(SECRET_A.as_bytes().to_vec()).unwrap();
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("secret-a"));
        assert!(debug.contains(&secret.fingerprint()));
    }

    #[test]
    fn test_rotation_overlap_window() {
        let registry = KeyRegistry::new(key("k1", SECRET_A));
        let secret_b = KeySecret::new(SECRET_B.as_bytes().to_vec()).unwrap();
        let set = registry
            .rotate("k2", secret_b, Duration::from_secs(600), 1_000)
            .unwrap();

        assert_eq!(set.version, 2);
        assert_eq!(set.active().kid, "k2");
        assert_eq!(set.retiring().unwrap().retire_at, Some(1_600));

        assert!(set.verification_key("k1", 1_599).is_some());
        assert!(set.verification_key("k1", 1_600).is_none());
        assert!(set.verification_key("k2", 5_000).is_some());
        assert!(set.verification_key("unknown", 1_000).is_none());
    }

    #[test]
    fn test_rotation_without_overlap_retires_immediately() {
        let registry = KeyRegistry::new(key("k1", SECRET_A));
        let set = registry
            .rotate(
                "k2",
                KeySecret::new(SECRET_B.as_bytes().to_vec()).unwrap(),
                Duration::ZERO,
                1_000,
            )
            .unwrap();
        assert!(set.retiring().is_none());
        assert!(set.verification_key("k1", 1_000).is_none());
    }

    #[test]
    fn test_second_rotation_retires_older_key() {
        let registry = KeyRegistry::new(key("k1", SECRET_A));
        let overlap = Duration::from_secs(600);
        registry
            .rotate("k2", KeySecret::new(SECRET_B.as_bytes().to_vec()).unwrap(), overlap, 1_000)
            .unwrap();
        let set = registry
            .rotate("k3", KeySecret::new(SECRET_C.as_bytes().to_vec()).unwrap(), overlap, 1_100)
            .unwrap();

        assert_eq!(set.version, 3);
        assert_eq!(set.retiring().unwrap().kid, "k2");
        assert!(set.verification_key("k1", 1_100).is_none());

        // k1 is retired for good
        let revived = registry.apply(&[KeyEntry::active("k1", SECRET_A)], 1_200);
        assert!(revived.is_err());
    }

    #[test]
    fn test_kid_cannot_be_rebound() {
        let registry = KeyRegistry::new(key("k1", SECRET_A));
        let result = registry.rotate(
            "k1",
            KeySecret::new(SECRET_B.as_bytes().to_vec()).unwrap(),
            Duration::from_secs(60),
            1_000,
        );
        assert!(result.is_err());

        let result = registry.apply(&[KeyEntry::active("k1", SECRET_B)], 1_000);
        assert!(result.is_err());
        assert_eq!(registry.version(), 1);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let entries = vec![
            KeyEntry::active("k2", SECRET_B),
            KeyEntry::retiring("k1", SECRET_A, 2_000),
        ];
        let registry = KeyRegistry::from_entries(&entries, 1_000).unwrap();
        assert_eq!(registry.version(), 1);

        assert!(!registry.apply(&entries, 1_000).unwrap());
        assert_eq!(registry.version(), 1);

        // Promote k3, keep k2 retiring, drop k1
        let next = vec![
            KeyEntry::active("k3", SECRET_C),
            KeyEntry::retiring("k2", SECRET_B, 3_000),
        ];
        assert!(registry.apply(&next, 1_500).unwrap());
        let set = registry.snapshot();
        assert_eq!(set.version, 2);
        assert_eq!(set.active().kid, "k3");
        assert!(set.verification_key("k1", 1_500).is_none());
    }

    #[test]
    fn test_entry_validation() {
        // No active key
        assert!(KeyRegistry::from_entries(&[KeyEntry::retiring("k1", SECRET_A, 10)], 0).is_err());
        // Two active keys
        assert!(KeyRegistry::from_entries(
            &[KeyEntry::active("k1", SECRET_A), KeyEntry::active("k2", SECRET_B)],
            0
        )
        .is_err());
        // Duplicate kid
        assert!(KeyRegistry::from_entries(
            &[KeyEntry::active("k1", SECRET_A), KeyEntry::retiring("k1", SECRET_A, 10)],
            0
        )
        .is_err());
        // Short secret
        assert!(KeyRegistry::from_entries(&[KeyEntry::active("k1", "short")], 0).is_err());
    }

    #[test]
    fn test_closed_retiring_entry_counts_as_retired() {
        let registry = KeyRegistry::from_entries(
            &[KeyEntry::active("k2", SECRET_B), KeyEntry::retiring("k1", SECRET_A, 500)],
            1_000,
        )
        .unwrap();
        assert!(registry.snapshot().retiring().is_none());
    }

    #[test]
    fn test_retire_expired() {
        let registry = KeyRegistry::new(key("k1", SECRET_A));
        registry
            .rotate("k2", KeySecret::new(SECRET_B.as_bytes().to_vec()).unwrap(), Duration::from_secs(60), 1_000)
            .unwrap();

        assert!(!registry.retire_expired(1_059));
        assert!(registry.retire_expired(1_060));
        assert!(registry.snapshot().retiring().is_none());
        assert_eq!(registry.version(), 3);
    }

    #[test]
    fn test_keys_file_parsing() {
        let file = KeysFile::from_json(&format!(
            r#"{{"keys": [
                {{"kid": "k2", "secret": "{SECRET_B}", "status": "active"}},
                {{"kid": "k1", "secret": "{SECRET_A}", "status": "retiring", "retireAt": 2000}}
            ]}}"#
        ))
        .unwrap();
        assert_eq!(file.keys.len(), 2);
        assert_eq!(file.keys[1].retire_at, Some(2_000));
        assert!(!format!("{:?}", file).contains(SECRET_A));

        assert!(KeysFile::from_json(r#"{"keys": [{"kid": "k", "status": "active"}]}"#).is_err());
    }

    #[test]
    fn test_apply_reports_rotation_and_retirement() {
        let registry = KeyRegistry::from_entries(
            &[KeyEntry::active("k2", SECRET_B), KeyEntry::retiring("k1", SECRET_A, 2_000)],
            1_000,
        )
        .unwrap();
        let before = registry.snapshot();

        // Promote k3, keep k2 retiring, drop k1
        let next = vec![
            KeyEntry::active("k3", SECRET_C),
            KeyEntry::retiring("k2", SECRET_B, 3_000),
        ];
        assert!(registry.apply(&next, 1_500).unwrap());
        let after = registry.snapshot();

        let events = key_set_events(&before, &after, &["k1".to_string()]);
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![SecurityEventKind::KeyRotated, SecurityEventKind::KeyRetired]
        );
        assert!(events[0].detail.as_deref().unwrap().contains("active=k3 previous=k2"));
        assert!(events[1].detail.as_deref().unwrap().contains("kid=k1"));

        // Same active kid, nothing dropped: no security events
        assert!(key_set_events(&after, &after, &[]).is_empty());
    }

    async fn wait_for_version(registry: &KeyRegistry, version: u64) -> bool {
        tokio::time::timeout(Duration::from_secs(5), async {
            while registry.version() < version {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }

    #[tokio::test]
    async fn test_refresh_task_reloads_keys_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("keys.json");
        std::fs::write(
            &path,
            format!(r#"{{"keys": [{{"kid": "k1", "secret": "{SECRET_A}", "status": "active"}}]}}"#),
        )
        .unwrap();

        let clock: SharedClock = Arc::new(crate::auth::clock::ManualClock::new(1_000));
        let registry = Arc::new(
            KeyRegistry::from_entries(&KeysFile::load(&path).unwrap().keys, 1_000).unwrap(),
        );
        let task = spawn_refresh_task(
            Arc::clone(&registry),
            Some(path.clone()),
            Duration::from_millis(20),
            clock,
        );

        // Promote k2, k1 keeps verifying until 2_000
        std::fs::write(
            &path,
            format!(
                r#"{{"keys": [
                    {{"kid": "k2", "secret": "{SECRET_B}", "status": "active"}},
                    {{"kid": "k1", "secret": "{SECRET_A}", "status": "retiring", "retireAt": 2000}}
                ]}}"#
            ),
        )
        .unwrap();
        assert!(wait_for_version(&registry, 2).await);
        let set = registry.snapshot();
        assert_eq!(set.active().kid, "k2");
        assert_eq!(set.retiring().unwrap().kid, "k1");

        // A broken file leaves the current set in force
        std::fs::write(&path, "{not json").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(registry.version(), 2);
        assert_eq!(registry.snapshot().active().kid, "k2");

        // So does one that re-binds a kid to a new secret
        std::fs::write(
            &path,
            format!(r#"{{"keys": [{{"kid": "k2", "secret": "{SECRET_C}", "status": "active"}}]}}"#),
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(registry.version(), 2);

        task.abort();
    }

    #[tokio::test]
    async fn test_refresh_task_retires_closed_window() {
        let clock = Arc::new(crate::auth::clock::ManualClock::new(1_000));
        let registry = Arc::new(KeyRegistry::new(key("k1", SECRET_A)));
        registry
            .rotate("k2", KeySecret::new(SECRET_B.as_bytes().to_vec()).unwrap(), Duration::from_secs(60), 1_000)
            .unwrap();

        let task = spawn_refresh_task(
            Arc::clone(&registry),
            None,
            Duration::from_millis(20),
            clock.clone(),
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(registry.snapshot().retiring().is_some());

        clock.advance(60);
        assert!(wait_for_version(&registry, 3).await);
        assert!(registry.snapshot().retiring().is_none());

        task.abort();
    }
}
