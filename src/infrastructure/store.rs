//! Backing store for tree records
//!
//! Each tree lives behind its own `RwLock`: mutations on one tree are
//! serialized, readers share the lock and always see a committed record.
//! A mutation runs on a clone of the record and replaces the stored record
//! only when it succeeded, so failed operations leave no partial state.
//! With a store directory configured every committed record is also written
//! to `tree-<id>.json`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, instrument, warn};

use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::domain::{DomainError, DomainResult, TreeId, TreeRecord};
use crate::infrastructure::traits::FileSystem;

const TREE_FILE_PREFIX: &str = "tree-";
const TREE_FILE_SUFFIX: &str = ".json";
const STAGING_SUFFIX: &str = ".staged";

/// `None` once the tree was removed; holders of a stale handle see it gone.
type SharedRecord = Arc<RwLock<Option<TreeRecord>>>;

pub struct TreeStore {
    fs: Arc<dyn FileSystem>,
    dir: Option<PathBuf>,
    trees: RwLock<BTreeMap<TreeId, SharedRecord>>,
    next_tree_id: AtomicU32,
}

impl TreeStore {
    /// Store without persistence.
    pub fn in_memory(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            dir: None,
            trees: RwLock::new(BTreeMap::new()),
            next_tree_id: AtomicU32::new(1),
        }
    }

    /// Open (or create) a persistent store in `dir`, loading all tree files.
    ///
    /// Staged files left behind by an interrupted batch are discarded.
    #[instrument(level = "debug", skip(fs))]
    pub fn open(fs: Arc<dyn FileSystem>, dir: &Path) -> ApplicationResult<Self> {
        fs.create_dir_all(dir)
            .with_path_context("create store directory", dir)?;

        let mut trees = BTreeMap::new();
        let mut max_id = 0;
        for path in fs.list_files(dir).with_path_context("list store", dir)? {
            if is_staged_file(&path) {
                warn!("discarding staged file {}", path.display());
                fs.remove_file(&path)
                    .with_path_context("remove staged file", &path)?;
                continue;
            }
            if !is_tree_file(&path) {
                continue;
            }
            let content = fs
                .read_to_string(&path)
                .with_path_context("read tree file", &path)?;
            let record: TreeRecord =
                serde_json::from_str(&content).map_err(|e| ApplicationError::OperationFailed {
                    context: format!("parse tree file {}", path.display()),
                    source: Box::new(e),
                })?;
            max_id = max_id.max(record.tree_id());
            trees.insert(record.tree_id(), Arc::new(RwLock::new(Some(record))));
        }
        info!("opened store {} with {} trees", dir.display(), trees.len());

        Ok(Self {
            fs,
            dir: Some(dir.to_path_buf()),
            trees: RwLock::new(trees),
            next_tree_id: AtomicU32::new(max_id + 1),
        })
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Reserve a fresh tree id. Ids are never handed out twice.
    pub fn allocate_tree_id(&self) -> TreeId {
        self.next_tree_id.fetch_add(1, Ordering::SeqCst)
    }

    fn shared(&self, tree_id: TreeId) -> DomainResult<SharedRecord> {
        let trees = self.trees.read().unwrap_or_else(PoisonError::into_inner);
        trees
            .get(&tree_id)
            .cloned()
            .ok_or(DomainError::TreeNotFound(tree_id))
    }

    pub fn tree_ids(&self) -> Vec<TreeId> {
        let trees = self.trees.read().unwrap_or_else(PoisonError::into_inner);
        trees.keys().copied().collect()
    }

    /// Run `f` against a consistent snapshot of one tree.
    pub fn read<T>(
        &self,
        tree_id: TreeId,
        f: impl FnOnce(&TreeRecord) -> DomainResult<T>,
    ) -> ApplicationResult<T> {
        let shared = self.shared(tree_id)?;
        let guard = shared.read().unwrap_or_else(PoisonError::into_inner);
        let record = guard.as_ref().ok_or(DomainError::TreeNotFound(tree_id))?;
        Ok(f(record)?)
    }

    /// Apply `f` to a working copy of one tree and commit it on success.
    pub fn mutate<T>(
        &self,
        tree_id: TreeId,
        f: impl FnOnce(&mut TreeRecord) -> DomainResult<T>,
    ) -> ApplicationResult<T> {
        let shared = self.shared(tree_id)?;
        self.mutate_shared(tree_id, &shared, f)
    }

    fn mutate_shared<T>(
        &self,
        tree_id: TreeId,
        shared: &SharedRecord,
        f: impl FnOnce(&mut TreeRecord) -> DomainResult<T>,
    ) -> ApplicationResult<T> {
        let mut guard = shared.write().unwrap_or_else(PoisonError::into_inner);
        // removed between lookup and locking
        let current = guard.as_mut().ok_or(DomainError::TreeNotFound(tree_id))?;
        let mut working = current.clone();
        let result = f(&mut working)?;
        if working != *current {
            self.persist(&working)?;
            *current = working;
        }
        Ok(result)
    }

    /// Like [`TreeStore::mutate`] for a batch spanning several trees.
    ///
    /// Locks are taken in ascending tree id order. Either every touched record
    /// is committed, in memory and on disk, or none is.
    pub fn mutate_many<T>(
        &self,
        tree_ids: &BTreeSet<TreeId>,
        f: impl FnOnce(&mut BTreeMap<TreeId, TreeRecord>) -> DomainResult<T>,
    ) -> ApplicationResult<T> {
        let shared: Vec<(TreeId, SharedRecord)> = tree_ids
            .iter()
            .map(|&id| self.shared(id).map(|s| (id, s)))
            .collect::<DomainResult<_>>()?;
        let mut guards: Vec<_> = shared
            .iter()
            .map(|(id, s)| (*id, s.write().unwrap_or_else(PoisonError::into_inner)))
            .collect();

        let mut working = BTreeMap::new();
        for (id, guard) in &guards {
            let record = guard.as_ref().ok_or(DomainError::TreeNotFound(*id))?;
            working.insert(*id, record.clone());
        }
        let result = f(&mut working)?;

        let mut changes = Vec::new();
        for (id, guard) in &guards {
            if let (Some(new), Some(old)) = (working.get(id), guard.as_ref()) {
                if new != old {
                    changes.push((new, old));
                }
            }
        }
        self.persist_all(&changes)?;

        for (id, guard) in guards.iter_mut() {
            let Some(current) = guard.as_mut() else {
                continue;
            };
            if let Some(record) = working.remove(id) {
                *current = record;
            }
        }
        Ok(result)
    }

    /// Make a completely built tree visible.
    pub fn insert(&self, record: TreeRecord) -> ApplicationResult<TreeId> {
        let tree_id = record.tree_id();
        let mut trees = self.trees.write().unwrap_or_else(PoisonError::into_inner);
        if trees.contains_key(&tree_id) {
            return Err(ApplicationError::Store {
                message: format!("tree id {tree_id} already in use"),
            });
        }
        self.persist(&record)?;
        trees.insert(tree_id, Arc::new(RwLock::new(Some(record))));
        debug!(tree_id, "inserted tree");
        Ok(tree_id)
    }

    /// Remove a tree if `check` accepts it. Waits for in-flight operations on the tree.
    pub fn remove(
        &self,
        tree_id: TreeId,
        check: impl FnOnce(&TreeRecord) -> DomainResult<()>,
    ) -> ApplicationResult<TreeRecord> {
        let mut trees = self.trees.write().unwrap_or_else(PoisonError::into_inner);
        let shared = trees
            .get(&tree_id)
            .cloned()
            .ok_or(DomainError::TreeNotFound(tree_id))?;
        let mut guard = shared.write().unwrap_or_else(PoisonError::into_inner);
        let record = guard.as_ref().ok_or(DomainError::TreeNotFound(tree_id))?;
        check(record)?;
        if let Some(path) = self.tree_path(tree_id) {
            if self.fs.exists(&path) {
                self.fs
                    .remove_file(&path)
                    .with_path_context("remove tree file", &path)?;
            }
        }
        let record = guard.take().ok_or(DomainError::TreeNotFound(tree_id))?;
        trees.remove(&tree_id);
        debug!(tree_id, "removed tree");
        Ok(record)
    }

    fn tree_path(&self, tree_id: TreeId) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{TREE_FILE_PREFIX}{tree_id}{TREE_FILE_SUFFIX}")))
    }

    fn persist(&self, record: &TreeRecord) -> ApplicationResult<()> {
        let Some(path) = self.tree_path(record.tree_id()) else {
            return Ok(());
        };
        self.write_record(&path, record)
    }

    fn write_record(&self, path: &Path, record: &TreeRecord) -> ApplicationResult<()> {
        let content =
            serde_json::to_string_pretty(record).map_err(|e| ApplicationError::OperationFailed {
                context: format!("serialize tree {}", record.tree_id()),
                source: Box::new(e),
            })?;
        self.fs
            .write_atomic(path, &content)
            .with_path_context("write tree file", path)
    }

    /// Write `(new, old)` record pairs so that either every file changes or none does.
    ///
    /// All new records are staged next to their files first, then renamed
    /// into place. If a rename fails the files already replaced are rewritten
    /// from the old records.
    fn persist_all(&self, changes: &[(&TreeRecord, &TreeRecord)]) -> ApplicationResult<()> {
        if self.dir.is_none() || changes.is_empty() {
            return Ok(());
        }

        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(changes.len());
        for (new, _) in changes {
            let Some(path) = self.tree_path(new.tree_id()) else {
                continue;
            };
            let staging = staging_path(&path);
            if let Err(e) = self.write_record(&staging, new) {
                self.discard_staged(&staged);
                return Err(e);
            }
            staged.push((staging, path));
        }

        for (done, (staging, path)) in staged.iter().enumerate() {
            if let Err(e) = self.fs.rename(staging, path) {
                for ((_, replaced), (_, old)) in staged[..done].iter().zip(changes) {
                    if let Err(restore) = self.write_record(replaced, old) {
                        warn!("could not restore {}: {restore}", replaced.display());
                    }
                }
                self.discard_staged(&staged[done..]);
                return Err(e).with_path_context("commit tree file", path);
            }
        }
        debug!(trees = staged.len(), "committed batch");
        Ok(())
    }

    fn discard_staged(&self, staged: &[(PathBuf, PathBuf)]) {
        for (staging, _) in staged {
            if self.fs.exists(staging) {
                if let Err(e) = self.fs.remove_file(staging) {
                    warn!("could not remove {}: {e}", staging.display());
                }
            }
        }
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(STAGING_SUFFIX);
    PathBuf::from(name)
}

fn is_tree_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(TREE_FILE_PREFIX) && n.ends_with(TREE_FILE_SUFFIX))
}

fn is_staged_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(TREE_FILE_PREFIX) && n.ends_with(STAGING_SUFFIX))
}
