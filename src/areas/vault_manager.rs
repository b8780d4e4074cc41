//! Registry of vaults
//!
//! Vault metadata lives in `vaults.json` at the root of the base filesystem.
//! Each vault is stored under a directory named after its id, so renaming a
//! vault never moves data. When encryption is enabled every vault gets its
//! own key and its directory is wrapped in an [`EncryptedFs`].

use crate::areas::repository::Repository;
use crate::areas::storage::{EncryptedFs, FileSystem, SubdirFs, VaultKey};
use crate::areas::vault::Vault;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::pack::reader::PackReader;
use crate::config::Config;
use crate::errors::{Error, Result};
use crate::transport::client::GitClient;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub const REGISTRY_FILE: &str = "vaults.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultMetadata {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<VaultKey>,
    /// Vault this one was cloned from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Registry {
    vaults: BTreeMap<String, VaultMetadata>,
}

/// Check a vault name: non-empty, a single path segment, no `..`
pub fn validate_vault_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| Err(Error::InvalidVaultName(format!("{name:?}: {reason}")));

    if name.trim().is_empty() {
        return invalid("name is empty");
    }
    if name.contains('/') || name.contains('\\') {
        return invalid("name contains a path separator");
    }
    if name.contains("..") {
        return invalid("name contains `..`");
    }

    Ok(())
}

#[derive(Debug)]
pub struct VaultManager {
    fs: Arc<dyn FileSystem>,
    config: Arc<Config>,
    registry: Mutex<Registry>,
    /// Open vaults by id
    open: parking_lot::Mutex<HashMap<String, Arc<Vault>>>,
}

impl VaultManager {
    /// Load the registry from `fs`, starting empty when there is none
    pub async fn load(fs: Arc<dyn FileSystem>, config: Arc<Config>) -> Result<Self> {
        let registry = if fs.exists(REGISTRY_FILE).await? {
            let raw = fs.read(REGISTRY_FILE).await?;
            serde_json::from_slice(&raw)
                .map_err(|err| anyhow::anyhow!("Invalid vault registry: {err}"))?
        } else {
            Registry::default()
        };

        Ok(VaultManager {
            fs,
            config,
            registry: Mutex::new(registry),
            open: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    async fn persist(&self, registry: &Registry) -> Result<()> {
        let raw = serde_json::to_vec_pretty(registry).map_err(anyhow::Error::from)?;

        let temp_path = format!("{REGISTRY_FILE}.lock");
        self.fs.write(&temp_path, Bytes::from(raw)).await?;
        self.fs.rename(&temp_path, REGISTRY_FILE).await
    }

    fn vault_fs(&self, metadata: &VaultMetadata) -> Result<Arc<dyn FileSystem>> {
        let scoped: Arc<dyn FileSystem> = Arc::new(SubdirFs::new(self.fs.clone(), &metadata.id)?);

        Ok(match &metadata.key {
            Some(key) => Arc::new(EncryptedFs::new(scoped, key)),
            None => scoped,
        })
    }

    fn new_metadata(&self, name: &str, remote: Option<String>) -> VaultMetadata {
        VaultMetadata {
            id: uuid::Uuid::new_v4().simple().to_string(),
            name: name.to_string(),
            key: self.config.encrypt.then(VaultKey::generate),
            remote,
        }
    }

    async fn open_metadata(&self, metadata: &VaultMetadata) -> Result<Arc<Vault>> {
        if let Some(vault) = self.open.lock().get(&metadata.id) {
            return Ok(vault.clone());
        }

        let vault = Arc::new(
            Vault::create(
                &metadata.id,
                self.vault_fs(metadata)?,
                self.config.clone(),
                metadata.remote.clone(),
            )
            .await?,
        );

        Ok(self
            .open
            .lock()
            .entry(metadata.id.clone())
            .or_insert(vault)
            .clone())
    }

    async fn ensure_undefined(&self, name: &str) -> Result<()> {
        if self.registry.lock().await.vaults.contains_key(name) {
            return Err(Error::VaultDefined {
                name: name.to_string(),
            });
        }

        Ok(())
    }

    pub async fn create_vault(&self, name: &str) -> Result<Arc<Vault>> {
        validate_vault_name(name)?;

        let mut registry = self.registry.lock().await;
        if registry.vaults.contains_key(name) {
            return Err(Error::VaultDefined {
                name: name.to_string(),
            });
        }

        let metadata = self.new_metadata(name, None);
        self.fs.mkdir(&metadata.id, true).await?;
        let vault = self.open_metadata(&metadata).await?;

        registry.vaults.insert(name.to_string(), metadata);
        self.persist(&registry).await?;

        info!(vault = name, id = vault.id(), "created vault");
        Ok(vault)
    }

    /// Metadata of every vault, by name
    pub async fn list_vaults(&self) -> Vec<VaultMetadata> {
        self.registry.lock().await.vaults.values().cloned().collect()
    }

    pub async fn vault_metadata(&self, name: &str) -> Result<VaultMetadata> {
        self.registry
            .lock()
            .await
            .vaults
            .get(name)
            .cloned()
            .ok_or_else(|| Error::VaultUndefined {
                name: name.to_string(),
            })
    }

    pub async fn open_vault(&self, name: &str) -> Result<Arc<Vault>> {
        let metadata = self.vault_metadata(name).await?;
        self.open_metadata(&metadata).await
    }

    pub async fn rename_vault(&self, name: &str, new_name: &str) -> Result<()> {
        validate_vault_name(new_name)?;

        let mut registry = self.registry.lock().await;
        if registry.vaults.contains_key(new_name) {
            return Err(Error::VaultDefined {
                name: new_name.to_string(),
            });
        }
        let mut metadata = registry
            .vaults
            .remove(name)
            .ok_or_else(|| Error::VaultUndefined {
                name: name.to_string(),
            })?;

        metadata.name = new_name.to_string();
        registry.vaults.insert(new_name.to_string(), metadata);
        self.persist(&registry).await?;

        info!(vault = name, new_name, "renamed vault");
        Ok(())
    }

    /// Stop a vault, erase its storage and forget it
    pub async fn destroy_vault(&self, name: &str) -> Result<()> {
        let mut registry = self.registry.lock().await;
        let metadata = registry
            .vaults
            .get(name)
            .cloned()
            .ok_or_else(|| Error::VaultUndefined {
                name: name.to_string(),
            })?;

        let vault = self.open_metadata(&metadata).await?;
        vault.stop().await?;
        vault.destroy().await?;
        if self.fs.exists(&metadata.id).await? {
            self.fs.remove_dir_all(&metadata.id).await?;
        }

        self.open.lock().remove(&metadata.id);
        registry.vaults.remove(name);
        self.persist(&registry).await?;

        info!(vault = name, "destroyed vault");
        Ok(())
    }

    /// Copy `remote_vault` from a peer into a new local vault bound to it
    pub async fn clone_vault(
        &self,
        client: &GitClient,
        remote_vault: &str,
        name: &str,
    ) -> Result<Arc<Vault>> {
        validate_vault_name(name)?;
        self.ensure_undefined(name).await?;

        // the registry stays unlocked while fetching: the peer may be this manager
        let advertisement = client.discover_refs(remote_vault).await?;
        let tip = advertisement
            .head()
            .cloned()
            .ok_or_else(|| Error::Protocol(format!("{remote_vault} advertised no HEAD")))?;
        let fetched = client.fetch_pack(remote_vault, &[tip.clone()], &[], None).await?;

        let metadata = self.new_metadata(name, Some(remote_vault.to_string()));
        self.fs.mkdir(&metadata.id, true).await?;

        let populated = self.populate_clone(&metadata, fetched.pack, &tip).await;
        let vault = match populated {
            Ok(()) => self.open_metadata(&metadata).await,
            Err(err) => Err(err),
        };
        let vault = match vault {
            Ok(vault) => vault,
            Err(err) => {
                warn!(vault = name, error = %err, "clone failed, removing partial vault");
                self.fs.remove_dir_all(&metadata.id).await?;
                return Err(err);
            }
        };

        let mut registry = self.registry.lock().await;
        if registry.vaults.contains_key(name) {
            self.open.lock().remove(&metadata.id);
            self.fs.remove_dir_all(&metadata.id).await?;
            return Err(Error::VaultDefined {
                name: name.to_string(),
            });
        }
        registry.vaults.insert(name.to_string(), metadata);
        self.persist(&registry).await?;

        info!(vault = name, remote = remote_vault, tip = %tip, "cloned vault");
        Ok(vault)
    }

    async fn populate_clone(&self, metadata: &VaultMetadata, pack: Bytes, tip: &ObjectId) -> Result<()> {
        let repository = Repository::new(self.vault_fs(metadata)?, self.config.clone());
        repository.init_layout().await?;

        PackReader::new(pack).unpack_into(repository.database()).await?;
        repository
            .refs()
            .update_head(tip, self.config.max_ref_depth)
            .await?;
        repository.checkout(tip.as_ref()).await?;

        Ok(())
    }

    /// Fetch the remote's current HEAD into a cloned vault
    ///
    /// Returns the new tip, or `None` when the vault was already up to date.
    pub async fn pull_vault(&self, client: &GitClient, name: &str) -> Result<Option<ObjectId>> {
        let metadata = self.vault_metadata(name).await?;
        let remote = metadata
            .remote
            .clone()
            .ok_or_else(|| Error::Protocol(format!("vault {name} has no remote")))?;
        let vault = self.open_metadata(&metadata).await?;

        let advertisement = client.discover_refs(&remote).await?;
        let tip = advertisement
            .head()
            .cloned()
            .ok_or_else(|| Error::Protocol(format!("{remote} advertised no HEAD")))?;

        let current = vault.head().await?;
        if current == tip {
            info!(vault = name, "already up to date");
            return Ok(None);
        }

        let fetched = client
            .fetch_pack(&remote, &[tip.clone()], &[current], None)
            .await?;
        vault.pull_apply(fetched.pack, &tip).await?;

        Ok(Some(tip))
    }
}
