//! Shared token store
//!
//! A small key-value space visible to every cooperating process on the host.
//! It holds the current [`Credential`] and the set of registered client ids.
//! The client with the smallest registered id is the elder: it alone runs
//! the interactive login and the refresh calls, every other client reads the
//! credential it publishes.
//!
//! Two backends implement [`SharedRegion`]:
//! - [`FileRegion`]: JSON state file guarded by a lock file, replaced
//!   atomically on every write. Cross-process.
//! - [`MemoryRegion`]: in-process only. Used as the private fallback when
//!   the shared region cannot be allocated.
//!
//! [`FileRegion`] waits for its lock with blocking sleeps, so async callers
//! go through [`TokenStore::load_credential`] and its siblings, which run on
//! tokio's blocking pool.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::types::Credential;

/// Key under which the whole credential is stored as one value.
pub const CREDENTIAL_KEY: &str = "credential";

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(5);
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_STALE_LOCK_AGE: Duration = Duration::from_secs(10);

/// Error type for token store operations
#[derive(Debug, thiserror::Error)]
pub enum TokenStoreError {
    /// Backing region could not be allocated or accessed
    #[error("shared token region unavailable: {0}")]
    Resource(String),

    /// Stored state could not be decoded
    #[error("shared token state is corrupt: {0}")]
    Corrupt(String),
}

pub type TokenStoreResult<T> = Result<T, TokenStoreError>;

/// Everything a region persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedState {
    #[serde(default)]
    pub registered_ids: BTreeSet<u64>,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

/// Storage backend for a [`TokenStore`].
///
/// `update` runs the closure under the region's writer lock and persists the
/// result as one unit, so readers see either the old or the new state.
pub trait SharedRegion: Send + Sync + fmt::Debug {
    fn load(&self) -> TokenStoreResult<SharedState>;

    fn update(&self, apply: &mut dyn FnMut(&mut SharedState)) -> TokenStoreResult<SharedState>;

    /// Drop the backing storage if no client is registered any more.
    fn release(&self) -> TokenStoreResult<()>;

    fn is_shared(&self) -> bool;
}

/// In-process region.
#[derive(Debug, Default)]
pub struct MemoryRegion {
    state: Mutex<SharedState>,
}

impl MemoryRegion {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SharedRegion for MemoryRegion {
    fn load(&self) -> TokenStoreResult<SharedState> {
        Ok(self.state.lock().clone())
    }

    fn update(&self, apply: &mut dyn FnMut(&mut SharedState)) -> TokenStoreResult<SharedState> {
        let mut state = self.state.lock();
        apply(&mut state);
        Ok(state.clone())
    }

    fn release(&self) -> TokenStoreResult<()> {
        let mut state = self.state.lock();
        if state.registered_ids.is_empty() {
            *state = SharedState::default();
        }
        Ok(())
    }

    fn is_shared(&self) -> bool {
        false
    }
}

/// Cross-process region backed by `<dir>/<namespace>.json`.
///
/// Writers serialise on `<dir>/<namespace>.lock`, created with `create_new`
/// and holding a token unique to the acquisition. A lock file older than
/// the stale age is assumed to belong to a crashed process: it is renamed
/// aside and removed only if the renamed file still carries the token that
/// was judged stale. Otherwise a live lock was caught by the rename and is
/// linked back into place.
#[derive(Debug)]
pub struct FileRegion {
    dir: PathBuf,
    state_path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
    stale_lock_age: Duration,
}

impl FileRegion {
    /// Open (or create) the region.
    ///
    /// # Errors
    /// Returns `TokenStoreError::Resource` if the directory cannot be created
    /// or the lock cannot be taken.
    pub fn open(dir: impl AsRef<Path>, namespace: &str) -> TokenStoreResult<Self> {
        Self::open_with_timing(dir, namespace, DEFAULT_LOCK_TIMEOUT, DEFAULT_STALE_LOCK_AGE)
    }

    /// [`FileRegion::open`] with explicit lock timings.
    ///
    /// # Errors
    /// Same as [`FileRegion::open`].
    pub fn open_with_timing(
        dir: impl AsRef<Path>,
        namespace: &str,
        lock_timeout: Duration,
        stale_lock_age: Duration,
    ) -> TokenStoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            TokenStoreError::Resource(format!("cannot create {}: {e}", dir.display()))
        })?;

        let region = Self {
            state_path: dir.join(format!("{namespace}.json")),
            lock_path: dir.join(format!("{namespace}.lock")),
            dir,
            lock_timeout,
            stale_lock_age,
        };

        // Probe: take the lock once and decode whatever is there.
        {
            let _guard = region.acquire_lock()?;
            region.read_state()?;
        }

        debug!(path = %region.state_path.display(), "token_store.region_opened");
        Ok(region)
    }

    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    fn acquire_lock(&self) -> TokenStoreResult<LockGuard> {
        let token = lock_token();
        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&self.lock_path) {
                Ok(mut file) => {
                    if let Err(e) = file.write_all(token.as_bytes()).and_then(|()| file.flush()) {
                        let _ = fs::remove_file(&self.lock_path);
                        return Err(TokenStoreError::Resource(format!(
                            "cannot write {}: {e}",
                            self.lock_path.display()
                        )));
                    }
                    return Ok(LockGuard { path: self.lock_path.clone(), token });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if let Some(observed) = self.stale_lock_token() {
                        self.break_stale_lock(&observed);
                        continue;
                    }
                    if started.elapsed() >= self.lock_timeout {
                        return Err(TokenStoreError::Resource(format!(
                            "timed out waiting for {}",
                            self.lock_path.display()
                        )));
                    }
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(err) => {
                    return Err(TokenStoreError::Resource(format!(
                        "cannot create {}: {err}",
                        self.lock_path.display()
                    )));
                }
            }
        }
    }

    /// Token of the current lock file when it is older than the stale age.
    fn stale_lock_token(&self) -> Option<String> {
        let age = fs::metadata(&self.lock_path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())?;
        if age < self.stale_lock_age {
            return None;
        }
        fs::read_to_string(&self.lock_path).ok()
    }

    /// Move the lock aside atomically, then delete it only if it is the one
    /// judged stale. A concurrent breaker that already replaced it loses the
    /// rename or gets the live lock back via `hard_link`, which never
    /// overwrites.
    fn break_stale_lock(&self, observed: &str) {
        let aside = self.lock_path.with_extension(format!("lock.{}", lock_token()));
        if fs::rename(&self.lock_path, &aside).is_err() {
            // Already broken or released by someone else.
            return;
        }

        let taken = fs::read_to_string(&aside).unwrap_or_default();
        if taken == observed {
            warn!(path = %self.lock_path.display(), "token_store.stale_lock_removed");
        } else if let Err(err) = fs::hard_link(&aside, &self.lock_path) {
            warn!(error = %err, path = %self.lock_path.display(), "token_store.lock_restore_failed");
        } else {
            debug!(path = %self.lock_path.display(), "token_store.live_lock_restored");
        }

        if let Err(err) = fs::remove_file(&aside) {
            warn!(error = %err, path = %aside.display(), "token_store.lock_cleanup_failed");
        }
    }

    fn read_state(&self) -> TokenStoreResult<SharedState> {
        match fs::read(&self.state_path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(SharedState::default()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| TokenStoreError::Corrupt(format!("{}: {e}", self.state_path.display()))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(SharedState::default()),
            Err(err) => Err(TokenStoreError::Resource(format!(
                "cannot read {}: {err}",
                self.state_path.display()
            ))),
        }
    }

    fn write_state(&self, state: &SharedState) -> TokenStoreResult<()> {
        let resource = |e: std::io::Error| {
            TokenStoreError::Resource(format!("cannot write {}: {e}", self.state_path.display()))
        };

        let mut file = NamedTempFile::new_in(&self.dir).map_err(resource)?;
        serde_json::to_writer(&mut file, state)
            .map_err(|e| TokenStoreError::Corrupt(e.to_string()))?;
        file.flush().map_err(resource)?;
        file.persist(&self.state_path).map_err(|e| resource(e.error))?;
        Ok(())
    }
}

impl SharedRegion for FileRegion {
    fn load(&self) -> TokenStoreResult<SharedState> {
        let _guard = self.acquire_lock()?;
        self.read_state()
    }

    fn update(&self, apply: &mut dyn FnMut(&mut SharedState)) -> TokenStoreResult<SharedState> {
        let _guard = self.acquire_lock()?;
        let mut state = self.read_state()?;
        apply(&mut state);
        self.write_state(&state)?;
        Ok(state)
    }

    fn release(&self) -> TokenStoreResult<()> {
        let _guard = self.acquire_lock()?;
        // Another process may have registered since our unregister.
        if !self.read_state()?.registered_ids.is_empty() {
            return Ok(());
        }
        match fs::remove_file(&self.state_path) {
            Ok(()) => {
                info!(path = %self.state_path.display(), "token_store.region_released");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(TokenStoreError::Resource(format!(
                "cannot remove {}: {err}",
                self.state_path.display()
            ))),
        }
    }

    fn is_shared(&self) -> bool {
        true
    }
}

struct LockGuard {
    path: PathBuf,
    token: String,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Only remove the lock this guard created.
        match fs::read_to_string(&self.path) {
            Ok(current) if current == self.token => {
                if let Err(e) = fs::remove_file(&self.path) {
                    warn!(error = %e, path = %self.path.display(), "token_store.lock_release_failed");
                }
            }
            Ok(_) => warn!(path = %self.path.display(), "token_store.lock_taken_over"),
            Err(e) => warn!(error = %e, path = %self.path.display(), "token_store.lock_release_failed"),
        }
    }
}

/// `<pid>-<nanos>-<random>`, unique per lock acquisition.
fn lock_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos());
    format!("{}-{nanos}-{:016x}", std::process::id(), rand::random::<u64>())
}

/// Handle to a shared or private token store. Clones share the region.
#[derive(Debug, Clone)]
pub struct TokenStore {
    region: Arc<dyn SharedRegion>,
}

impl TokenStore {
    /// Open the cross-process store in `dir` under `namespace`.
    ///
    /// # Errors
    /// Returns `TokenStoreError::Resource` when the region cannot be
    /// allocated; callers should fall back to [`TokenStore::private`].
    pub fn open_shared(dir: impl AsRef<Path>, namespace: &str) -> TokenStoreResult<Self> {
        let region = FileRegion::open(dir, namespace)?;
        Ok(Self::with_region(Arc::new(region)))
    }

    /// A store only this process sees. Every private client is its own elder.
    #[must_use]
    pub fn private() -> Self {
        Self::with_region(Arc::new(MemoryRegion::new()))
    }

    /// Shared store, or a private one when the shared region is unavailable.
    #[must_use]
    pub fn open_or_private(dir: impl AsRef<Path>, namespace: &str) -> Self {
        match Self::open_shared(dir, namespace) {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, "token_store.shared_unavailable_using_private");
                Self::private()
            }
        }
    }

    #[must_use]
    pub fn with_region(region: Arc<dyn SharedRegion>) -> Self {
        Self { region }
    }

    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.region.is_shared()
    }

    /// Allocate an id one greater than the current maximum (0 when empty).
    ///
    /// # Errors
    /// Returns error if the region cannot be updated.
    pub fn register(&self) -> TokenStoreResult<u64> {
        let mut allocated = 0;
        self.region.update(&mut |state| {
            allocated = state.registered_ids.iter().next_back().map_or(0, |max| max + 1);
            state.registered_ids.insert(allocated);
        })?;
        info!(client_id = allocated, shared = self.is_shared(), "token_store.registered");
        Ok(allocated)
    }

    /// True iff `client_id` is the smallest registered id.
    ///
    /// # Errors
    /// Returns error if the region cannot be read.
    pub fn is_elder(&self, client_id: u64) -> TokenStoreResult<bool> {
        let state = self.region.load()?;
        Ok(state.registered_ids.first() == Some(&client_id))
    }

    /// # Errors
    /// Returns error if the region cannot be read.
    pub fn registered_ids(&self) -> TokenStoreResult<BTreeSet<u64>> {
        Ok(self.region.load()?.registered_ids)
    }

    /// Remove `client_id`; the region is released once nobody is left.
    ///
    /// # Errors
    /// Returns error if the region cannot be updated or released.
    pub fn unregister(&self, client_id: u64) -> TokenStoreResult<()> {
        let state = self.region.update(&mut |state| {
            state.registered_ids.remove(&client_id);
        })?;
        info!(client_id, remaining = state.registered_ids.len(), "token_store.unregistered");

        if state.registered_ids.is_empty() {
            self.region.release()?;
        }
        Ok(())
    }

    /// Raw read; `default` when the key is absent.
    ///
    /// # Errors
    /// Returns error if the region cannot be read.
    pub fn get(&self, key: &str, default: Value) -> TokenStoreResult<Value> {
        Ok(self.region.load()?.values.get(key).cloned().unwrap_or(default))
    }

    /// Raw write.
    ///
    /// # Errors
    /// Returns error if the region cannot be updated.
    pub fn set(&self, key: &str, value: Value) -> TokenStoreResult<()> {
        let mut slot = Some(value);
        self.region.update(&mut |state| {
            if let Some(value) = slot.take() {
                state.values.insert(key.to_string(), value);
            }
        })?;
        Ok(())
    }

    /// The published credential, if any.
    ///
    /// # Errors
    /// Returns `Corrupt` if the stored value is not a credential.
    pub fn credential(&self) -> TokenStoreResult<Option<Credential>> {
        match self.get(CREDENTIAL_KEY, Value::Null)? {
            Value::Null => Ok(None),
            value => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| TokenStoreError::Corrupt(format!("credential: {e}"))),
        }
    }

    /// Publish a credential as a single value.
    ///
    /// # Errors
    /// Returns error if the region cannot be updated.
    pub fn store_credential(&self, credential: &Credential) -> TokenStoreResult<()> {
        let value =
            serde_json::to_value(credential).map_err(|e| TokenStoreError::Corrupt(e.to_string()))?;
        self.set(CREDENTIAL_KEY, value)?;
        debug!(expiry = %credential.expiry, "token_store.credential_stored");
        Ok(())
    }

    /// [`TokenStore::credential`] for async callers.
    ///
    /// # Errors
    /// Same as [`TokenStore::credential`], plus `Resource` if the blocking
    /// task fails.
    pub async fn load_credential(&self) -> TokenStoreResult<Option<Credential>> {
        self.run_blocking(TokenStore::credential).await
    }

    /// [`TokenStore::store_credential`] for async callers.
    ///
    /// # Errors
    /// Same as [`TokenStore::store_credential`].
    pub async fn publish_credential(&self, credential: Credential) -> TokenStoreResult<()> {
        self.run_blocking(move |store| store.store_credential(&credential)).await
    }

    /// [`TokenStore::is_elder`] for async callers.
    ///
    /// # Errors
    /// Same as [`TokenStore::is_elder`].
    pub async fn check_elder(&self, client_id: u64) -> TokenStoreResult<bool> {
        self.run_blocking(move |store| store.is_elder(client_id)).await
    }

    /// Run `op` on the blocking pool when the region is file-backed; the
    /// memory region never waits and runs inline.
    async fn run_blocking<T, F>(&self, op: F) -> TokenStoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&TokenStore) -> TokenStoreResult<T> + Send + 'static,
    {
        if !self.is_shared() {
            return op(self);
        }
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| TokenStoreError::Resource(format!("token store task failed: {e}")))?
    }
}
