//! Write-once object storage for uploaded document binaries and rendered
//! certificates, with time-limited signed read URLs.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Signed URL expired")]
    Expired,

    #[error("Signed URL signature mismatch")]
    BadSignature,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
    /// Base64 SHA-256 of the content.
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`. Existing keys are never overwritten.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<StoredObject, StorageError>;

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    fn exists(&self, key: &str) -> bool;

    fn signed_url(&self, key: &str, ttl: Duration) -> Result<SignedUrl, StorageError>;

    /// Check a signature produced by `signed_url` against `now`.
    fn verify_signature(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

/// Generated key for an uploaded document binary.
pub fn document_object_key(application_id: &Uuid, document_id: &Uuid, filename: &str) -> String {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".into());
    format!(
        "applications/{application_id}/documents/{document_id}/{}.{extension}",
        Uuid::new_v4()
    )
}

/// Generated key for a rendered certificate.
pub fn certificate_object_key(application_id: &Uuid) -> String {
    format!("applications/{application_id}/certificates/{}.pdf", Uuid::new_v4())
}

// ═══════════════════════════════════════════
// Local filesystem store
// ═══════════════════════════════════════════

pub struct LocalObjectStore {
    root: PathBuf,
    signing_key: Vec<u8>,
    public_base: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, signing_key: &[u8], public_base: &str) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            signing_key: signing_key.to_vec(),
            public_base: public_base.trim_end_matches('/').to_string(),
        })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let clean = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn sign(&self, key: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.signing_key);
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

impl ObjectStore for LocalObjectStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<StoredObject, StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(bytes)?;
        file.sync_all()?;

        let sha256 = base64::engine::general_purpose::STANDARD.encode(Sha256::digest(bytes));
        tracing::debug!(key = %key, size = bytes.len(), "Object stored");

        Ok(StoredObject {
            key: key.to_string(),
            size: bytes.len() as u64,
            sha256,
        })
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, key: &str) -> bool {
        self.path_for(key).map(|p| p.is_file()).unwrap_or(false)
    }

    fn signed_url(&self, key: &str, ttl: Duration) -> Result<SignedUrl, StorageError> {
        if !self.exists(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        let expires_at = Utc::now() + ttl;
        let expires = expires_at.timestamp();
        let signature = self.sign(key, expires);
        Ok(SignedUrl {
            url: format!(
                "{}/{}?expires={}&signature={}",
                self.public_base, key, expires, signature
            ),
            expires_at,
        })
    }

    fn verify_signature(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        if self.sign(key, expires) != signature {
            return Err(StorageError::BadSignature);
        }
        if now.timestamp() > expires {
            return Err(StorageError::Expired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, LocalObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), b"test-signing-key", "http://files.local/").unwrap();
        (dir, store)
    }

    fn signature_of(url: &str) -> (i64, String) {
        let query = url.split_once('?').unwrap().1;
        let mut expires = 0;
        let mut signature = String::new();
        for pair in query.split('&') {
            match pair.split_once('=').unwrap() {
                ("expires", v) => expires = v.parse().unwrap(),
                ("signature", v) => signature = v.to_string(),
                _ => {}
            }
        }
        (expires, signature)
    }

    #[test]
    fn put_then_get() {
        let (_dir, store) = store();
        let obj = store.put("a/b/scan.pdf", b"%PDF-1.4").unwrap();
        assert_eq!(obj.size, 8);
        assert_eq!(store.get("a/b/scan.pdf").unwrap(), b"%PDF-1.4");
        assert!(store.exists("a/b/scan.pdf"));
    }

    #[test]
    fn objects_are_write_once() {
        let (_dir, store) = store();
        store.put("k.bin", b"first").unwrap();
        assert!(matches!(store.put("k.bin", b"second"), Err(StorageError::AlreadyExists(_))));
        assert_eq!(store.get("k.bin").unwrap(), b"first");
    }

    #[test]
    fn traversal_keys_rejected() {
        let (_dir, store) = store();
        assert!(matches!(store.put("../escape", b"x"), Err(StorageError::InvalidKey(_))));
        assert!(matches!(store.put("/etc/passwd", b"x"), Err(StorageError::InvalidKey(_))));
        assert!(matches!(store.put("", b"x"), Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn missing_object_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(store.get("nope"), Err(StorageError::NotFound(_))));
        assert!(matches!(store.signed_url("nope", Duration::minutes(5)), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn signed_url_verifies_until_expiry() {
        let (_dir, store) = store();
        store.put("doc.pdf", b"x").unwrap();
        let signed = store.signed_url("doc.pdf", Duration::minutes(15)).unwrap();
        assert!(signed.url.starts_with("http://files.local/doc.pdf?expires="));

        let (expires, signature) = signature_of(&signed.url);
        assert!(store.verify_signature("doc.pdf", expires, &signature, Utc::now()).is_ok());
        assert!(matches!(
            store.verify_signature("doc.pdf", expires, &signature, Utc::now() + Duration::hours(1)),
            Err(StorageError::Expired)
        ));
        assert!(matches!(
            store.verify_signature("other.pdf", expires, &signature, Utc::now()),
            Err(StorageError::BadSignature)
        ));
        assert!(matches!(
            store.verify_signature("doc.pdf", expires + 60, &signature, Utc::now()),
            Err(StorageError::BadSignature)
        ));
    }

    #[test]
    fn document_keys_are_unique_and_scoped() {
        let app = Uuid::new_v4();
        let doc = Uuid::new_v4();
        let a = document_object_key(&app, &doc, "Schedule F.PDF");
        let b = document_object_key(&app, &doc, "Schedule F.PDF");
        assert_ne!(a, b);
        assert!(a.starts_with(&format!("applications/{app}/documents/{doc}/")));
        assert!(a.ends_with(".pdf"));
        assert!(document_object_key(&app, &doc, "noext").ends_with(".bin"));
        assert!(document_object_key(&app, &doc, "weird.p/df").ends_with(".bin"));
    }
}
