//! Certificate pin store and persistence.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::schema::PinningConfig;
use crate::trust::identity::CertificateIdentity;
use crate::trust::TrustError;

/// File name of the persisted pin set inside the storage directory.
const PIN_FILE: &str = "pins.json";

/// One pinned certificate identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinnedIdentity {
    /// Hex SHA-256 thumbprint. Primary lookup key.
    pub thumbprint: String,
    pub subject: String,
    pub issuer: String,
    /// Hex SHA-256 of the SubjectPublicKeyInfo.
    pub public_key_hash: String,
    /// Seconds since epoch.
    pub pinned_at: u64,
    /// Permanent pins survive restarts; session pins do not.
    pub permanent: bool,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Thread-safe store of pinned certificate identities.
///
/// Per-key inserts and removals go through the concurrent map; the
/// whole load-merge-persist sequence is serialized by one lock so a
/// concurrent load and save cannot interleave.
pub struct CertificatePinStore {
    enabled: bool,
    anchor_paths: Vec<String>,
    pins: DashMap<String, PinnedIdentity>,
    storage_path: PathBuf,
    io_lock: Mutex<()>,
}

impl CertificatePinStore {
    pub fn new(config: &PinningConfig) -> Self {
        Self {
            enabled: config.enabled,
            anchor_paths: config.anchor_paths.clone(),
            pins: DashMap::new(),
            storage_path: Path::new(&config.storage_dir).join(PIN_FILE),
            io_lock: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn count(&self) -> usize {
        self.pins.len()
    }

    /// Load pins at startup: certificates from the configured anchor
    /// files (always permanent) merged with the persisted pin file.
    pub fn load(&self) -> Result<(), TrustError> {
        let _guard = self.io_lock.lock().expect("pin store lock poisoned");

        for path in &self.anchor_paths {
            let file = File::open(path).map_err(|e| {
                TrustError::PinStore(format!("cannot open anchor file {path}: {e}"))
            })?;
            let mut reader = BufReader::new(file);
            for cert in rustls_pemfile::certs(&mut reader) {
                let cert = cert.map_err(|e| {
                    TrustError::PinStore(format!("cannot read anchor file {path}: {e}"))
                })?;
                let identity = CertificateIdentity::from_der(cert.as_ref())?;
                self.insert_if_absent(&identity, true);
            }
        }

        if self.storage_path.exists() {
            let file = File::open(&self.storage_path)
                .map_err(|e| TrustError::PinStore(format!("cannot open pin file: {e}")))?;
            let stored: Vec<PinnedIdentity> = serde_json::from_reader(BufReader::new(file))
                .map_err(|e| TrustError::PinStore(format!("cannot parse pin file: {e}")))?;
            for pin in stored {
                self.pins.entry(pin.thumbprint.clone()).or_insert(pin);
            }
        }

        self.persist_locked()?;
        tracing::info!(pins = self.pins.len(), "Pin store loaded");
        Ok(())
    }

    /// Validate a presented certificate against the pin set.
    ///
    /// Disabled pinning accepts everything. Enabled pinning matches by
    /// thumbprint first, then by public-key hash, so a reissued
    /// certificate with the same key remains trusted.
    pub fn validate(&self, identity: &CertificateIdentity) -> bool {
        if !self.enabled {
            return true;
        }

        if self.pins.contains_key(&identity.thumbprint) {
            return true;
        }

        self.pins
            .iter()
            .any(|pin| pin.public_key_hash == identity.public_key_hash)
    }

    /// Pin a certificate. Returns true when a new pin was inserted; an
    /// existing thumbprint entry is never overwritten. Permanent pins
    /// are persisted immediately.
    pub fn add_pin(
        &self,
        identity: &CertificateIdentity,
        permanent: bool,
    ) -> Result<bool, TrustError> {
        let inserted = self.insert_if_absent(identity, permanent);
        if inserted && permanent {
            let _guard = self.io_lock.lock().expect("pin store lock poisoned");
            self.persist_locked()?;
        }
        Ok(inserted)
    }

    /// Remove a pin by thumbprint and persist the remaining set.
    pub fn remove_pin(&self, thumbprint: &str) -> Result<bool, TrustError> {
        let removed = self.pins.remove(thumbprint).is_some();
        if removed {
            let _guard = self.io_lock.lock().expect("pin store lock poisoned");
            self.persist_locked()?;
        }
        Ok(removed)
    }

    /// Snapshot of all pins, sorted by thumbprint.
    pub fn pins(&self) -> Vec<PinnedIdentity> {
        let mut pins: Vec<PinnedIdentity> =
            self.pins.iter().map(|r| r.value().clone()).collect();
        pins.sort_by(|a, b| a.thumbprint.cmp(&b.thumbprint));
        pins
    }

    fn insert_if_absent(&self, identity: &CertificateIdentity, permanent: bool) -> bool {
        let mut inserted = false;
        self.pins
            .entry(identity.thumbprint.clone())
            .or_insert_with(|| {
                inserted = true;
                PinnedIdentity {
                    thumbprint: identity.thumbprint.clone(),
                    subject: identity.subject.clone(),
                    issuer: identity.issuer.clone(),
                    public_key_hash: identity.public_key_hash.clone(),
                    pinned_at: now_secs(),
                    permanent,
                }
            });
        inserted
    }

    /// Write the permanent subset to disk. Caller holds `io_lock`.
    fn persist_locked(&self) -> Result<(), TrustError> {
        if !self.enabled {
            return Ok(());
        }
        if let Some(dir) = self.storage_path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| TrustError::PinStore(format!("cannot create pin dir: {e}")))?;
        }

        let mut permanent: Vec<PinnedIdentity> = self
            .pins
            .iter()
            .filter(|r| r.permanent)
            .map(|r| r.value().clone())
            .collect();
        permanent.sort_by(|a, b| a.thumbprint.cmp(&b.thumbprint));

        let file = File::create(&self.storage_path)
            .map_err(|e| TrustError::PinStore(format!("cannot write pin file: {e}")))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &permanent)
            .map_err(|e| TrustError::PinStore(format!("cannot serialize pins: {e}")))?;

        tracing::debug!(pins = permanent.len(), path = ?self.storage_path, "Pin store persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(tag: u8) -> CertificateIdentity {
        CertificateIdentity {
            thumbprint: format!("thumb-{tag:02x}"),
            public_key_hash: format!("spki-{tag:02x}"),
            subject: format!("CN=cert-{tag}"),
            issuer: "CN=test-ca".to_string(),
            serial: vec![tag],
            issuer_name_raw: vec![0x30, 0x00],
            spki_raw: vec![tag; 4],
            ocsp_url: None,
            sct_count: 0,
        }
    }

    fn store(dir: &Path, enabled: bool) -> CertificatePinStore {
        CertificatePinStore::new(&PinningConfig {
            enabled,
            anchor_paths: Vec::new(),
            storage_dir: dir.to_string_lossy().into_owned(),
            auto_pin_first: false,
        })
    }

    #[test]
    fn disabled_pinning_accepts_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), false);
        assert!(store.validate(&identity(1)));
    }

    #[test]
    fn enabled_pinning_requires_a_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), true);
        store.add_pin(&identity(1), false).unwrap();

        assert!(store.validate(&identity(1)));
        assert!(!store.validate(&identity(2)));
    }

    #[test]
    fn public_key_hash_fallback_matches_rotated_cert() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), true);
        store.add_pin(&identity(1), false).unwrap();

        // Same key, new certificate bytes.
        let mut rotated = identity(2);
        rotated.public_key_hash = identity(1).public_key_hash;
        assert!(store.validate(&rotated));
    }

    #[test]
    fn pinning_is_idempotent_per_thumbprint() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), true);
        assert!(store.add_pin(&identity(1), true).unwrap());
        assert!(!store.add_pin(&identity(1), true).unwrap());
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn permanent_pins_round_trip_through_storage() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = store(dir.path(), true);
            store.add_pin(&identity(1), true).unwrap();
            store.add_pin(&identity(2), false).unwrap();
        }

        // Simulated restart.
        let reloaded = store(dir.path(), true);
        reloaded.load().unwrap();
        let pins = reloaded.pins();
        assert_eq!(pins.len(), 1);
        assert_eq!(pins[0].thumbprint, identity(1).thumbprint);
        assert_eq!(pins[0].subject, identity(1).subject);
        assert_eq!(pins[0].public_key_hash, identity(1).public_key_hash);
    }

    #[test]
    fn remove_pin_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), true);
        store.add_pin(&identity(1), true).unwrap();
        assert!(store.remove_pin(&identity(1).thumbprint).unwrap());
        assert!(!store.remove_pin(&identity(1).thumbprint).unwrap());

        let reloaded = self::store(dir.path(), true);
        reloaded.load().unwrap();
        assert_eq!(reloaded.count(), 0);
    }
}
