//! Content encryption for vault storage
//!
//! File contents are sealed with ChaCha20-Poly1305 under the vault's key:
//! `nonce (12 bytes) || ciphertext || tag (16 bytes)`. Directory structure and
//! names are left as is; they only ever hold object ids and secret paths that
//! the vault already keeps behind its own root.

use crate::areas::storage::{DirEntry, FileSystem};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;

/// 256-bit symmetric key of one vault
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VaultKey([u8; KEY_SIZE]);

impl VaultKey {
    pub fn generate() -> Self {
        let key = ChaCha20Poly1305::generate_key(&mut OsRng);
        let mut bytes = [0; KEY_SIZE];
        bytes.copy_from_slice(&key);
        VaultKey(bytes)
    }

    pub fn bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey(..)")
    }
}

impl TryFrom<String> for VaultKey {
    type Error = anyhow::Error;

    fn try_from(value: String) -> anyhow::Result<Self> {
        let mut bytes = [0; KEY_SIZE];
        hex::decode_to_slice(value, &mut bytes)?;
        Ok(VaultKey(bytes))
    }
}

impl From<VaultKey> for String {
    fn from(value: VaultKey) -> Self {
        hex::encode(value.0)
    }
}

/// Filesystem wrapper encrypting every file's contents
#[derive(Clone)]
pub struct EncryptedFs {
    inner: Arc<dyn FileSystem>,
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for EncryptedFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFs")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl EncryptedFs {
    pub fn new(inner: Arc<dyn FileSystem>, key: &VaultKey) -> Self {
        EncryptedFs {
            inner,
            cipher: ChaCha20Poly1305::new(Key::from_slice(key.bytes())),
        }
    }

    fn seal(&self, data: &[u8]) -> Result<Bytes> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, data)
            .map_err(|_| anyhow::anyhow!("encryption failed"))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        Ok(sealed.into())
    }

    fn open(&self, path: &str, sealed: &[u8]) -> Result<Bytes> {
        if sealed.len() < NONCE_SIZE {
            return Err(Error::Other(anyhow::anyhow!(
                "encrypted file {path} is truncated"
            )));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);

        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map(Bytes::from)
            .map_err(|_| Error::Other(anyhow::anyhow!("unable to decrypt {path}")))
    }
}

#[async_trait]
impl FileSystem for EncryptedFs {
    async fn read(&self, path: &str) -> Result<Bytes> {
        let sealed = self.inner.read(path).await?;
        self.open(path, &sealed)
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        let sealed = self.seal(&data)?;
        self.inner.write(path, sealed).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn is_dir(&self, path: &str) -> Result<bool> {
        self.inner.is_dir(path).await
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<()> {
        self.inner.mkdir(path, recursive).await
    }

    async fn unlink(&self, path: &str) -> Result<()> {
        self.inner.unlink(path).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.inner.rename(from, to).await
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.inner.read_dir(path).await
    }

    async fn remove_dir_all(&self, path: &str) -> Result<()> {
        self.inner.remove_dir_all(path).await
    }
}
