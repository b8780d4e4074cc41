//! A versioned secret store
//!
//! A vault is one git repository whose working tree holds the secrets. Every
//! write runs under an exclusive lock and ends either in a single commit, in
//! no commit at all when nothing changed, or in a rollback to the last
//! commit. Reads share the lock and only ever see committed state.
//!
//! ## Lifecycle
//!
//! `Uninitialized -> Ready -> Stopped -> Destroyed`
//!
//! Stopping waits for every lock holder to finish. Once stopped, operations
//! fail with `VaultNotRunning`; once destroyed, with `VaultDestroyed`.
//!
//! ## Interrupted writes
//!
//! A write or checkout whose future is dropped while it holds the lock leaves
//! the vault marked dirty. The next lock holder restores the working tree from
//! HEAD before doing anything else.

use crate::areas::repository::{GIT_DIR, Repository};
use crate::areas::storage::FileSystem;
use crate::areas::workspace::CONTENTS_DIR;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::pack::reader::PackReader;
use crate::commands::porcelain::log::CommitHistory;
use crate::commands::secrets::{SecretsView, WorkingTree};
use crate::config::Config;
use crate::errors::{Error, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    Uninitialized,
    Ready,
    Stopped,
    Destroyed,
}

#[derive(Debug)]
pub struct Vault {
    id: String,
    /// Name of the vault this one was cloned from
    remote: Option<String>,
    repository: Repository,
    state: Mutex<VaultState>,
    lock: RwLock<()>,
    dirty: AtomicBool,
}

impl Vault {
    /// Open the vault stored in `fs`, initializing it first if it is empty
    pub async fn create(
        id: &str,
        fs: Arc<dyn FileSystem>,
        config: Arc<Config>,
        remote: Option<String>,
    ) -> Result<Self> {
        let vault = Vault {
            id: id.to_string(),
            remote,
            repository: Repository::new(fs, config),
            state: Mutex::new(VaultState::Uninitialized),
            lock: RwLock::new(()),
            dirty: AtomicBool::new(false),
        };

        let head = vault.repository.init().await?;
        *vault.state.lock() = VaultState::Ready;

        debug!(vault = %vault.id, head = %head, "vault ready");
        Ok(vault)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn remote(&self) -> Option<&str> {
        self.remote.as_deref()
    }

    pub fn state(&self) -> VaultState {
        *self.state.lock()
    }

    fn ensure_running(&self) -> Result<()> {
        match self.state() {
            VaultState::Ready => Ok(()),
            VaultState::Destroyed => Err(Error::VaultDestroyed),
            VaultState::Uninitialized | VaultState::Stopped => Err(Error::VaultNotRunning),
        }
    }

    async fn acquire_write(&self) -> RwLockWriteGuard<'_, ()> {
        match self.lock.try_write() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(vault = %self.id, "waiting for write lock");
                self.lock.write().await
            }
        }
    }

    async fn write_lock(&self) -> Result<RwLockWriteGuard<'_, ()>> {
        let guard = self.acquire_write().await;
        self.ensure_running()?;

        if self.dirty.load(Ordering::Acquire) {
            warn!(vault = %self.id, "restoring working tree after an interrupted write");
            self.repository.restore_head().await?;
            self.dirty.store(false, Ordering::Release);
        }

        Ok(guard)
    }

    async fn read_lock(&self) -> Result<RwLockReadGuard<'_, ()>> {
        let guard = match self.lock.try_read() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(vault = %self.id, "waiting for read lock");
                self.lock.read().await
            }
        };
        self.ensure_running()?;

        if !self.dirty.load(Ordering::Acquire) {
            return Ok(guard);
        }

        drop(guard);
        Ok(self.write_lock().await?.downgrade())
    }

    /// Run `mutator` against the working tree and commit what it changed
    ///
    /// Returns the new commit, or `None` when the working tree ended up
    /// identical to HEAD. If the mutator fails the working tree is restored
    /// and its error returned.
    pub async fn write<F, Fut>(&self, mutator: F) -> Result<Option<ObjectId>>
    where
        F: FnOnce(WorkingTree) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self.remote.is_some() {
            return Err(Error::VaultRemoteDefined);
        }

        let _guard = self.write_lock().await?;
        self.dirty.store(true, Ordering::Release);

        let working_tree = WorkingTree::new(self.repository.workspace().clone());
        let outcome = match mutator(working_tree).await {
            Ok(()) => self.repository.commit_working_tree().await,
            Err(err) => Err(err),
        };

        if let Err(err) = &outcome {
            warn!(vault = %self.id, error = %err, "write failed, rolling back");
            self.repository.restore_head().await?;
        }
        self.dirty.store(false, Ordering::Release);

        outcome
    }

    /// Run `accessor` against the committed secrets
    pub async fn read<F, Fut, T>(&self, accessor: F) -> Result<T>
    where
        F: FnOnce(SecretsView) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _guard = self.read_lock().await?;
        accessor(SecretsView::new(self.repository.workspace().clone())).await
    }

    /// Run `f` against the underlying repository under the shared lock
    pub(crate) async fn with_repository<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Repository) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _guard = self.read_lock().await?;
        f(self.repository.clone()).await
    }

    pub async fn head(&self) -> Result<ObjectId> {
        let _guard = self.read_lock().await?;
        self.repository.head().await
    }

    /// History from `reference` (HEAD by default), newest first
    pub async fn log(&self, reference: Option<&str>, depth: Option<usize>) -> Result<CommitHistory> {
        let _guard = self.read_lock().await?;
        self.repository.log(reference, depth).await
    }

    /// Move the vault to the commit `target` names
    ///
    /// `target` may be `HEAD`, `latest`, a commit id or a branch name. Later
    /// commits are dropped from the branch but stay readable by id.
    pub async fn version(&self, target: &str) -> Result<ObjectId> {
        let _guard = self.write_lock().await?;

        let (oid, commit) = self.repository.resolve_commit(target).await?;
        self.switch_to(&oid, &commit).await?;

        Ok(oid)
    }

    /// Reset the working tree to `commit` and move HEAD, holding the write lock
    ///
    /// The vault stays dirty until both steps succeed, so an interrupted or
    /// failed switch is rolled back to HEAD like a failed write.
    async fn switch_to(&self, oid: &ObjectId, commit: &Commit) -> Result<()> {
        self.dirty.store(true, Ordering::Release);

        let outcome = self.repository.switch_to(oid, commit).await;
        if let Err(err) = &outcome {
            warn!(vault = %self.id, oid = %oid, error = %err, "checkout failed, rolling back");
            self.repository.restore_head().await?;
        }
        self.dirty.store(false, Ordering::Release);

        outcome
    }

    /// Apply a pack fetched from the remote and move to its tip
    pub(crate) async fn pull_apply(&self, pack: Bytes, tip: &ObjectId) -> Result<()> {
        let _guard = self.write_lock().await?;

        let unpacked = PackReader::new(pack)
            .unpack_into(self.repository.database())
            .await?;
        let commit = self.repository.database().load_commit(tip).await?;
        self.switch_to(tip, &commit).await?;

        info!(vault = %self.id, tip = %tip, objects = unpacked.len(), "pulled");
        Ok(())
    }

    /// Wait for every lock holder to finish, then refuse further operations
    pub async fn stop(&self) -> Result<()> {
        let _guard = self.acquire_write().await;

        let mut state = self.state.lock();
        match *state {
            VaultState::Destroyed => return Err(Error::VaultDestroyed),
            VaultState::Stopped => {}
            VaultState::Uninitialized | VaultState::Ready => *state = VaultState::Stopped,
        }

        info!(vault = %self.id, "vault stopped");
        Ok(())
    }

    /// Erase the vault's storage; only a stopped vault can be destroyed
    pub async fn destroy(&self) -> Result<()> {
        let _guard = self.acquire_write().await;

        match self.state() {
            VaultState::Stopped => {}
            VaultState::Destroyed => return Err(Error::VaultDestroyed),
            VaultState::Uninitialized | VaultState::Ready => return Err(Error::VaultRunning),
        }

        let fs = self.repository.fs();
        for dir in [CONTENTS_DIR, GIT_DIR] {
            if fs.exists(dir).await? {
                fs.remove_dir_all(dir).await?;
            }
        }
        *self.state.lock() = VaultState::Destroyed;

        info!(vault = %self.id, "vault destroyed");
        Ok(())
    }
}
