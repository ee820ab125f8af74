//! Thread-safe file tree database.
//!
//! A [`FileDB`] owns the entry arena, the root path and a secondary index
//! from full-path crc to entries, all behind one lock. Aggregate figures
//! (space, counters, the has-changes hint) are mirrored into atomics so
//! status queries never contend with a running diff-apply.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::entry::{EntryArena, EntryId, EntryKind, FileEntry};
use crate::error::PathError;
use crate::path::{name_crc, ScanPath};
use crate::platform::SEPARATOR;

/// A child listing produced by directory enumeration, before it is merged
/// into the tree.
#[derive(Debug)]
pub struct ScannedEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: i64,
}

/// Copied-out snapshot of a single entry; references never leave the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub kind: EntryKind,
    pub size: i64,
}

/// Borrow of a live entry, valid only inside a [`FileDB::process_entry`]
/// callback.
#[derive(Clone, Copy)]
pub struct EntryView<'a> {
    arena: &'a EntryArena,
    id: EntryId,
}

impl<'a> EntryView<'a> {
    fn entry(&self) -> &'a FileEntry {
        self.arena.entry(self.id)
    }

    pub fn name(&self) -> &'a str {
        self.entry().name()
    }

    pub fn size(&self) -> i64 {
        self.entry().size()
    }

    pub fn kind(&self) -> EntryKind {
        self.entry().kind()
    }

    pub fn is_dir(&self) -> bool {
        self.entry().is_dir()
    }

    pub fn has_children(&self) -> bool {
        self.entry().has_children()
    }

    /// Visits children in non-increasing size order; stops on `false`.
    pub fn for_each_child<F>(&self, mut visit: F) -> bool
    where
        F: FnMut(EntryView<'a>) -> bool,
    {
        self.arena.for_each_child(self.id, |id, _| {
            visit(EntryView {
                arena: self.arena,
                id,
            })
        })
    }
}

#[derive(Default)]
struct DbState {
    arena: EntryArena,
    root: Option<EntryId>,
    root_path: Option<ScanPath>,
    /// Full-path crc to every entry carrying it; collisions are resolved by
    /// walking ancestor names.
    index: HashMap<u16, Vec<EntryId>>,
    file_count: u64,
    dir_count: u64,
}

/// Locked container owning the file tree.
#[derive(Default)]
pub struct FileDB {
    state: Mutex<DbState>,
    root_valid: AtomicBool,
    has_changes: AtomicBool,
    total_space: AtomicU64,
    available_space: AtomicU64,
    used_space: AtomicU64,
    file_count: AtomicU64,
    dir_count: AtomicU64,
}

impl FileDB {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops any existing tree and starts a fresh one rooted at `path`.
    pub fn set_root(&self, path: &str) -> Result<(), PathError> {
        let root_path = ScanPath::new(path)?;
        let mut state = self.state.lock().unwrap();
        Self::clear_state(&mut state);

        let root = state
            .arena
            .acquire(&root_path.get_path(true), EntryKind::Directory);
        state.arena.update_path_crc(root, 0);
        state.root = Some(root);
        state.root_path = Some(root_path);
        state.dir_count = 1;
        state.file_count = 0;

        self.dir_count.store(1, Ordering::Relaxed);
        self.file_count.store(0, Ordering::Relaxed);
        self.used_space.store(0, Ordering::Relaxed);
        self.root_valid.store(true, Ordering::Release);
        self.has_changes.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Clears the database back to the uninitialized state.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        Self::clear_state(&mut state);
        self.root_valid.store(false, Ordering::Release);
        self.used_space.store(0, Ordering::Relaxed);
        self.file_count.store(0, Ordering::Relaxed);
        self.dir_count.store(0, Ordering::Relaxed);
        self.has_changes.store(true, Ordering::Relaxed);
    }

    fn clear_state(state: &mut DbState) {
        if let Some(root) = state.root.take() {
            state.arena.release_subtree(root);
        }
        state.root_path = None;
        state.index.clear();
        state.file_count = 0;
        state.dir_count = 0;
    }

    /// Replaces the children of the entry at `path` with `entries`,
    /// diffing against what is already in the tree.
    ///
    /// Existing children missing from the listing are removed with their
    /// subtrees, new ones are inserted, files whose size changed are resized
    /// in place. When `new_dir_paths` is given, the path of every newly
    /// discovered directory is pushed into it so the caller can queue it for
    /// scanning. Returns false if the path is no longer in the tree.
    pub fn set_children_for_path(
        &self,
        path: &ScanPath,
        mut entries: Vec<ScannedEntry>,
        mut new_dir_paths: Option<&mut Vec<ScanPath>>,
    ) -> bool {
        // presort by size so bucket inserts rarely relocate anything
        entries.sort_by(|a, b| b.size.cmp(&a.size));

        let mut state = self.state.lock().unwrap();
        if !self.is_ready() {
            return false;
        }
        let Some(parent) = Self::resolve(&state, path) else {
            return false;
        };
        if !state.arena.entry(parent).is_dir() {
            return false;
        }

        let (mut missing_files, mut missing_dirs) =
            state.arena.mark_children_pending_delete(parent);
        let parent_crc = state.arena.entry(parent).path_crc();

        for incoming in entries {
            let crc = name_crc(&incoming.name);
            if let Some(existing) = Self::find_child(&state, parent, &incoming.name, crc) {
                let was_pending = state.arena.entry(existing).pending_delete();
                state.arena.clear_pending_delete(existing);
                let entry = state.arena.entry(existing);
                if entry.is_dir() {
                    missing_dirs -= u64::from(was_pending);
                } else {
                    missing_files -= u64::from(was_pending);
                    let delta = incoming.size - entry.size();
                    if delta != 0 {
                        state.arena.apply_size_delta(existing, delta);
                    }
                }
                state.arena.recycle_name(incoming.name);
                continue;
            }

            let is_dir = incoming.kind == EntryKind::Directory;
            let id = state.arena.acquire_named(incoming.name, incoming.kind);
            state.arena.set_size(id, incoming.size);
            state.arena.update_path_crc(id, parent_crc);
            let path_crc = state.arena.entry(id).path_crc();
            state.arena.add_child(parent, id);
            state.index.entry(path_crc).or_default().push(id);

            if is_dir {
                state.dir_count += 1;
                if let Some(out) = new_dir_paths.as_mut() {
                    let mut child_path = path.clone();
                    if child_path.add_dir(state.arena.entry(id).name()).is_ok() {
                        out.push(child_path);
                    }
                }
            } else {
                state.file_count += 1;
            }
        }

        if missing_files + missing_dirs > 0 {
            let mut deleted = Vec::with_capacity((missing_files + missing_dirs) as usize);
            state.arena.remove_pending_delete(parent, &mut deleted);
            for child in deleted {
                Self::unindex_subtree(&mut state, child);
                state.arena.release_subtree(child);
            }
        }

        let Some(root) = state.root else {
            return false;
        };
        let used = state.arena.entry(root).size().max(0) as u64;
        self.used_space.store(used, Ordering::Relaxed);
        self.file_count.store(state.file_count, Ordering::Relaxed);
        self.dir_count.store(state.dir_count, Ordering::Relaxed);
        self.has_changes.store(true, Ordering::Relaxed);
        true
    }

    /// Removes a detached subtree from the index and the counters.
    fn unindex_subtree(state: &mut DbState, root: EntryId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            stack.extend(state.arena.child_ids(id));
            let entry = state.arena.entry(id);
            if entry.is_dir() {
                state.dir_count -= 1;
            } else {
                state.file_count -= 1;
            }
            let crc = entry.path_crc();
            if let Some(bucket) = state.index.get_mut(&crc) {
                bucket.retain(|&e| e != id);
                if bucket.is_empty() {
                    state.index.remove(&crc);
                }
            }
        }
    }

    /// Probe for a direct child by name, via the pathCrc index.
    fn find_child(state: &DbState, parent: EntryId, name: &str, name_crc: u16) -> Option<EntryId> {
        let crc = state.arena.entry(parent).path_crc() ^ name_crc;
        let candidates = state.index.get(&crc)?;
        candidates.iter().copied().find(|&id| {
            let entry = state.arena.entry(id);
            entry.parent() == Some(parent) && entry.name() == name
        })
    }

    /// Index lookup with collision disambiguation by the ancestor name chain.
    fn resolve(state: &DbState, path: &ScanPath) -> Option<EntryId> {
        let root = state.root?;
        let parts = path.parts();
        if parts.is_empty() || state.arena.entry(root).name() != parts[0] {
            return None;
        }
        if parts.len() == 1 {
            return Some(root);
        }

        let candidates = state.index.get(&path.path_crc())?;
        'candidate: for &candidate in candidates {
            let mut current = candidate;
            for part in parts[1..].iter().rev() {
                let part = part.strip_suffix(SEPARATOR).unwrap_or(part);
                let entry = state.arena.entry(current);
                if entry.name() != part {
                    continue 'candidate;
                }
                match entry.parent() {
                    Some(parent) => current = parent,
                    None => continue 'candidate,
                }
            }
            if current == root {
                return Some(candidate);
            }
        }
        None
    }

    /// Looks up an entry and copies out its basic fields.
    pub fn find_entry(&self, path: &ScanPath) -> Option<EntryInfo> {
        let state = self.state.lock().unwrap();
        if !self.is_ready() {
            return None;
        }
        let id = Self::resolve(&state, path)?;
        let entry = state.arena.entry(id);
        Some(EntryInfo {
            name: entry.name().to_string(),
            kind: entry.kind(),
            size: entry.size(),
        })
    }

    /// Runs `visit` against the live entry at `path` under the lock. The
    /// borrow must not escape the callback. A successful visit counts as
    /// having read the pending changes, so the has-changes hint is cleared.
    pub fn process_entry<F>(&self, path: &ScanPath, visit: F) -> bool
    where
        F: FnOnce(EntryView<'_>),
    {
        let state = self.state.lock().unwrap();
        if !self.is_ready() {
            return false;
        }
        let Some(id) = Self::resolve(&state, path) else {
            return false;
        };
        visit(EntryView {
            arena: &state.arena,
            id,
        });
        self.has_changes.store(false, Ordering::Relaxed);
        true
    }

    pub fn set_space(&self, total: u64, available: u64) {
        self.total_space.store(total, Ordering::Relaxed);
        self.available_space.store(available, Ordering::Relaxed);
    }

    /// Returns (used, available, total). Used space is clamped so that
    /// used + available never exceeds total; the remainder shows up as
    /// unknown space in the view layer.
    pub fn get_space(&self) -> (u64, u64, u64) {
        let total = self.total_space.load(Ordering::Relaxed);
        let available = self.available_space.load(Ordering::Relaxed);
        let mut used = self.used_space.load(Ordering::Relaxed);
        if used.saturating_add(available) > total {
            used = total.saturating_sub(available);
        }
        (used, available, total)
    }

    pub fn is_ready(&self) -> bool {
        self.root_valid.load(Ordering::Acquire)
    }

    pub fn has_changes(&self) -> bool {
        self.has_changes.load(Ordering::Relaxed)
    }

    pub fn file_count(&self) -> u64 {
        self.file_count.load(Ordering::Relaxed)
    }

    pub fn dir_count(&self) -> u64 {
        self.dir_count.load(Ordering::Relaxed)
    }

    pub fn root_path(&self) -> Option<ScanPath> {
        self.state.lock().unwrap().root_path.clone()
    }
}
