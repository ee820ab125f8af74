//! Arena-allocated file tree with size-sorted children.
//!
//! Entries live in a growable arena ([`EntryArena`]) and refer to each other
//! by index, so parents and children link both ways without reference
//! cycles. The arena doubles as the entry pool: releasing a subtree files the
//! freed slots in a free list and the freed name buffers in a length-keyed
//! cache, and the next acquisition reuses both. Rescans on large volumes
//! cycle entries by the million, which is what the pool is for.
//!
//! Children are kept in size-keyed buckets (a `BTreeMap` from size to an
//! insertion-ordered chain), so enumeration visits them in non-increasing
//! size with newest-first ordering among equal sizes, and a size change
//! relocates one entry between buckets instead of resorting a list.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::path::name_crc;

/// Index of an entry inside an [`EntryArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(u32);

impl EntryId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// A single file or directory in the tree.
///
/// `size` of a directory is the sum of its children's sizes; for a file it is
/// the intrinsic size. Sizes are signed so that delta propagation can pass
/// through transient negative values.
#[derive(Debug, Default)]
pub struct FileEntry {
    name: String,
    is_dir: bool,
    size: i64,
    name_crc: u16,
    path_crc: u16,
    pending_delete: bool,
    parent: Option<EntryId>,
    children: BTreeMap<i64, VecDeque<EntryId>>,
}

impl FileEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EntryKind {
        if self.is_dir {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn name_crc(&self) -> u16 {
        self.name_crc
    }

    pub fn path_crc(&self) -> u16 {
        self.path_crc
    }

    pub fn parent(&self) -> Option<EntryId> {
        self.parent
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub(crate) fn pending_delete(&self) -> bool {
        self.pending_delete
    }

    fn reset(&mut self, name: String, kind: EntryKind) {
        self.name_crc = name_crc(&name);
        self.name = name;
        self.is_dir = kind == EntryKind::Directory;
        self.size = 0;
        self.path_crc = 0;
        self.pending_delete = false;
        self.parent = None;
        self.children.clear();
    }
}

/// Growable entry storage plus the recycle pool.
#[derive(Debug, Default)]
pub struct EntryArena {
    slots: Vec<FileEntry>,
    free: Vec<EntryId>,
    /// Freed name buffers filed by exact length.
    name_cache: HashMap<usize, Vec<String>>,
}

impl EntryArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an entry, copying the name into a recycled buffer when one of
    /// matching length is cached.
    pub fn acquire(&mut self, name: &str, kind: EntryKind) -> EntryId {
        let buffer = match self.take_cached_name(name.len()) {
            Some(mut buffer) => {
                buffer.push_str(name);
                buffer
            }
            None => name.to_string(),
        };
        self.acquire_named(buffer, kind)
    }

    /// Creates an entry that takes ownership of an already-built name.
    pub fn acquire_named(&mut self, name: String, kind: EntryKind) -> EntryId {
        match self.free.pop() {
            Some(id) => {
                self.slots[id.index()].reset(name, kind);
                id
            }
            None => {
                let id = EntryId(self.slots.len() as u32);
                let mut entry = FileEntry::default();
                entry.reset(name, kind);
                self.slots.push(entry);
                id
            }
        }
    }

    /// Files a name buffer for reuse without an entry attached (the incoming
    /// side of a diff-apply drops names of entries that already exist).
    pub fn recycle_name(&mut self, mut name: String) {
        let len = name.len();
        name.clear();
        self.name_cache.entry(len).or_default().push(name);
    }

    fn take_cached_name(&mut self, len: usize) -> Option<String> {
        self.name_cache.get_mut(&len).and_then(|bufs| bufs.pop())
    }

    pub fn entry(&self, id: EntryId) -> &FileEntry {
        &self.slots[id.index()]
    }

    /// Sets the size of a detached entry (before it is attached to a parent).
    pub fn set_size(&mut self, id: EntryId, size: i64) {
        debug_assert!(self.slots[id.index()].parent.is_none());
        self.slots[id.index()].size = size;
    }

    /// Recomputes the full-path crc from the parent's.
    pub fn update_path_crc(&mut self, id: EntryId, parent_path_crc: u16) {
        let entry = &mut self.slots[id.index()];
        entry.path_crc = parent_path_crc ^ entry.name_crc;
    }

    /// Attaches a detached entry under `parent` and propagates its size up
    /// the ancestor chain. Equal-size siblings enumerate newest first.
    pub fn add_child(&mut self, parent: EntryId, child: EntryId) {
        debug_assert!(self.slots[child.index()].parent.is_none());
        let child_size = self.slots[child.index()].size;
        self.slots[child.index()].parent = Some(parent);
        self.slots[parent.index()]
            .children
            .entry(child_size)
            .or_default()
            .push_front(child);
        self.apply_size_delta(parent, child_size);
    }

    /// Adds `delta` to an entry's size, relocating it between its parent's
    /// buckets, and repeats up to the root.
    pub fn apply_size_delta(&mut self, id: EntryId, delta: i64) {
        if delta == 0 {
            return;
        }
        let mut current = id;
        loop {
            let old_size = self.slots[current.index()].size;
            let new_size = old_size + delta;
            self.slots[current.index()].size = new_size;

            let Some(parent) = self.slots[current.index()].parent else {
                break;
            };
            let buckets = &mut self.slots[parent.index()].children;
            if let Some(bucket) = buckets.get_mut(&old_size) {
                if let Some(pos) = bucket.iter().position(|&e| e == current) {
                    bucket.remove(pos);
                }
                if bucket.is_empty() {
                    buckets.remove(&old_size);
                }
            }
            buckets.entry(new_size).or_default().push_front(current);
            current = parent;
        }
    }

    /// Flags every direct child for deletion; returns (files, dirs) counts.
    pub fn mark_children_pending_delete(&mut self, parent: EntryId) -> (u64, u64) {
        let ids: Vec<EntryId> = self.slots[parent.index()]
            .children
            .values()
            .flatten()
            .copied()
            .collect();
        let mut files = 0;
        let mut dirs = 0;
        for id in ids {
            let child = &mut self.slots[id.index()];
            child.pending_delete = true;
            if child.is_dir {
                dirs += 1;
            } else {
                files += 1;
            }
        }
        (files, dirs)
    }

    pub fn clear_pending_delete(&mut self, id: EntryId) {
        self.slots[id.index()].pending_delete = false;
    }

    /// Detaches every child still flagged for deletion, pushing their ids
    /// into `deleted`, and propagates the removed size up the chain. The
    /// detached subtrees stay allocated until the caller releases them.
    pub fn remove_pending_delete(&mut self, parent: EntryId, deleted: &mut Vec<EntryId>) {
        let mut buckets = std::mem::take(&mut self.slots[parent.index()].children);
        let mut delta = 0i64;
        buckets.retain(|_, bucket| {
            bucket.retain(|&id| {
                let child = &mut self.slots[id.index()];
                if child.pending_delete {
                    delta += child.size;
                    child.parent = None;
                    child.pending_delete = false;
                    deleted.push(id);
                    false
                } else {
                    true
                }
            });
            !bucket.is_empty()
        });
        self.slots[parent.index()].children = buckets;
        self.apply_size_delta(parent, -delta);
    }

    /// Visits direct children in non-increasing size order, ties newest
    /// first. Stops early when `visit` returns false. Returns false if the
    /// entry has no children.
    pub fn for_each_child<F>(&self, parent: EntryId, mut visit: F) -> bool
    where
        F: FnMut(EntryId, &FileEntry) -> bool,
    {
        let children = &self.slots[parent.index()].children;
        if children.is_empty() {
            return false;
        }
        'outer: for (_, bucket) in children.iter().rev() {
            for &id in bucket {
                if !visit(id, &self.slots[id.index()]) {
                    break 'outer;
                }
            }
        }
        true
    }

    /// Ids of direct children in enumeration order.
    pub fn child_ids(&self, parent: EntryId) -> Vec<EntryId> {
        self.slots[parent.index()]
            .children
            .iter()
            .rev()
            .flat_map(|(_, bucket)| bucket.iter().copied())
            .collect()
    }

    /// Returns a detached entry and its whole subtree to the pool. Name
    /// buffers are filed by length for reuse. Returns the released count.
    pub fn release_subtree(&mut self, root: EntryId) -> u64 {
        debug_assert!(self.slots[root.index()].parent.is_none());
        let mut count = 0;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let entry = &mut self.slots[id.index()];
            stack.extend(entry.children.values().flatten().copied());

            let name = std::mem::take(&mut entry.name);
            *entry = FileEntry::default();
            self.recycle_name(name);
            self.free.push(id);
            count += 1;
        }
        count
    }

    /// Entries currently waiting in the free list.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Name buffers currently cached for reuse.
    pub fn cached_name_count(&self) -> usize {
        self.name_cache.values().map(Vec::len).sum()
    }
}
