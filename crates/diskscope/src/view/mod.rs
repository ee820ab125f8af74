//! Snapshot projection of the live tree for rendering.
//!
//! A [`ViewProjector`] derives a bounded copy of a sub-path of the file
//! database (at most `depth` levels, at most `max_children` entries per
//! level, nothing smaller than the cell the viewport could show) and
//! allocates a rectangle for every copied entry. The snapshot is owned by
//! the projector, so rendering never touches the database lock.

mod treemap;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::db::{EntryView, FileDB};
use crate::path::{PathCompare, ScanPath};
use crate::platform::SEPARATOR;
use crate::settings::ViewSettings;

/// Pixel rectangle; a zero-sized area means "not rendered".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn contains(&self, px: i32, py: i32) -> bool {
        self.x <= px && self.y <= py && px - self.x < self.w && py - self.y < self.h
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Directory,
    File,
    /// Placeholder for the filesystem's reported free space.
    FreeSpace,
    /// Placeholder for space not covered by the scan or the free figure.
    UnknownSpace,
}

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);

fn next_view_id() -> u64 {
    NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed)
}

/// One rendered cell of the snapshot.
///
/// The id is assigned on creation and survives rebuilds of the same slot, so
/// a host can correlate the hovered cell across updates.
#[derive(Debug)]
pub struct ViewEntry {
    id: u64,
    name: String,
    size: i64,
    kind: ViewKind,
    draw_area: Rect,
    children: Vec<ViewEntry>,
}

impl ViewEntry {
    fn new() -> Self {
        Self {
            id: next_view_id(),
            name: String::new(),
            size: 0,
            kind: ViewKind::File,
            draw_area: Rect::default(),
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        match self.kind {
            ViewKind::FreeSpace => "Free",
            ViewKind::UnknownSpace => "Unknown",
            _ => &self.name,
        }
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn is_dir(&self) -> bool {
        self.kind == ViewKind::Directory
    }

    pub fn draw_area(&self) -> Rect {
        self.draw_area
    }

    pub fn children(&self) -> &[ViewEntry] {
        &self.children
    }

    fn make_pseudo(&mut self, kind: ViewKind, size: i64) {
        self.name.clear();
        self.kind = kind;
        self.size = size;
        self.draw_area = Rect::default();
        self.children.clear();
    }

    /// Deepest entry whose rectangle contains the point.
    fn hovered(&self, x: i32, y: i32) -> Option<&ViewEntry> {
        if !self.draw_area.contains(x, y) {
            return None;
        }
        for child in &self.children {
            if let Some(hit) = child.hovered(x, y) {
                return Some(hit);
            }
        }
        Some(self)
    }
}

/// Copy bounds for one snapshot rebuild.
struct ViewOptions {
    depth: usize,
    min_size: i64,
    free_space: i64,
    unknown_space: i64,
    max_children: usize,
}

/// Derives bounded, rectangle-allocated snapshots from a [`FileDB`].
pub struct ViewProjector {
    db: Option<Arc<FileDB>>,
    view_area: Rect,
    view_path: Option<ScanPath>,
    depth: usize,
    text_height: i32,
    max_children: usize,
    min_pixel_area: i64,
    root: Option<ViewEntry>,
}

impl Default for ViewProjector {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewProjector {
    pub fn new() -> Self {
        Self::with_settings(&ViewSettings::default())
    }

    pub fn with_settings(settings: &ViewSettings) -> Self {
        Self {
            db: None,
            view_area: Rect::default(),
            view_path: None,
            depth: 3,
            text_height: 16,
            max_children: settings.max_children,
            min_pixel_area: settings.min_pixel_area,
            root: None,
        }
    }

    pub fn set_file_db(&mut self, db: Arc<FileDB>) {
        self.db = Some(db);
        self.root = None;
    }

    pub fn set_view_area(&mut self, area: Rect) {
        self.view_area = area;
    }

    /// Sub-path to project; `None` projects the database root.
    pub fn set_view_path(&mut self, path: Option<ScanPath>) {
        self.view_path = path;
    }

    pub fn set_view_depth(&mut self, depth: usize) {
        self.depth = depth;
    }

    pub fn set_text_height(&mut self, height: i32) {
        self.text_height = height.max(1);
    }

    /// Rebuilds the snapshot from the live tree and lays out rectangles.
    ///
    /// Free and unknown space placeholders are synthesized for the root view
    /// only, and only when the respective flag is set. Returns false when
    /// the database is missing or the target path is gone.
    pub fn update(&mut self, include_unknown: bool, include_free: bool) -> bool {
        let Some(db) = self.db.clone() else {
            self.root = None;
            return false;
        };
        let Some(root_path) = db.root_path() else {
            self.root = None;
            return false;
        };
        let target = match &self.view_path {
            Some(path) => path.clone(),
            None => root_path.clone(),
        };
        let is_root_view = target.compare_to(&root_path) == PathCompare::Equal;
        let (_, available, total) = db.get_space();

        let area = self.view_area;
        let depth = self.depth;
        let max_children = self.max_children;
        let min_pixel_area = self.min_pixel_area;
        let mut snapshot = self.root.take();

        let built = db.process_entry(&target, |entry| {
            let mut free_space = 0i64;
            let mut unknown_space = 0i64;
            if is_root_view {
                if include_free {
                    free_space = available as i64;
                }
                if include_unknown {
                    unknown_space = total as i64 - entry.size() - available as i64;
                }
            }
            let full_space = entry.size() + free_space.max(0) + unknown_space.max(0);

            // nothing below roughly a 7x7 pixel cell is worth copying
            let view_pixels = area.w as i64 * area.h as i64;
            let min_size = if view_pixels > 0 {
                (full_space as i128 * 49 / view_pixels as i128) as i64
            } else {
                0
            };

            let options = ViewOptions {
                depth,
                min_size,
                free_space,
                unknown_space,
                max_children,
            };
            let slot = snapshot.get_or_insert_with(ViewEntry::new);
            reconstruct(slot, entry, &options);
        });

        if !built {
            self.root = None;
            return false;
        }
        self.root = snapshot;
        if let Some(root) = &mut self.root {
            let title = self.text_height * 3 / 2;
            treemap::allocate_view(root, area, title, min_pixel_area);
        }
        true
    }

    /// Runs `visit` against the current snapshot root, if one exists.
    pub fn process_entry<F>(&self, visit: F) -> bool
    where
        F: FnOnce(&ViewEntry),
    {
        match &self.root {
            Some(root) => {
                visit(root);
                true
            }
            None => false,
        }
    }

    /// Deepest snapshot entry under the given pixel position.
    pub fn hovered_view(&self, x: i32, y: i32) -> Option<&ViewEntry> {
        self.root.as_ref()?.hovered(x, y)
    }

    /// Follows `path` (relative to the projected root) down the snapshot,
    /// skipping cells too small to be meaningful, and returns the deepest
    /// ancestor that matched.
    pub fn closest_view(&self, path: &ScanPath, max_depth: usize) -> Option<&ViewEntry> {
        let mut closest = self.root.as_ref()?;
        let min_gate = (self.min_pixel_area / 5) as i32;

        for part in path.parts().iter().take(max_depth) {
            let part = part.strip_suffix(SEPARATOR).unwrap_or(part);
            let next = closest.children.iter().find(|child| {
                child.draw_area.w > min_gate && child.draw_area.h > min_gate && child.name == part
            });
            match next {
                Some(child) => closest = child,
                None => break,
            }
        }
        Some(closest)
    }

    /// Hook for hosts that cache render assets per theme; the snapshot
    /// itself holds none.
    pub fn on_theme_changed(&mut self) {}
}

/// Rebuilds `view` in place from a live entry, reusing child slots so ids
/// stay stable across updates.
fn reconstruct(view: &mut ViewEntry, entry: EntryView<'_>, options: &ViewOptions) {
    view.name.clear();
    view.name.push_str(entry.name());
    view.size = entry.size();
    view.kind = if entry.is_dir() {
        ViewKind::Directory
    } else {
        ViewKind::File
    };
    view.draw_area = Rect::default();

    if options.depth == 0 {
        view.children.clear();
        return;
    }

    let mut count = 0usize;
    let max_children = options.max_children;
    let min_size = options.min_size;
    // placeholders slot in just before the first smaller child
    let mut free_space = options.free_space;
    let mut unknown_space = options.unknown_space;
    let depth = options.depth;

    let mut children = std::mem::take(&mut view.children);
    entry.for_each_child(|child| {
        if count >= max_children {
            return false;
        }
        let child_size = child.size();
        // children arrive largest first, so the first miss ends the copy
        if child_size < min_size {
            return false;
        }
        if unknown_space > child_size && count < max_children {
            slot_at(&mut children, count).make_pseudo(ViewKind::UnknownSpace, unknown_space);
            unknown_space = 0;
            count += 1;
        }
        if free_space > child_size && count < max_children {
            slot_at(&mut children, count).make_pseudo(ViewKind::FreeSpace, free_space);
            free_space = 0;
            count += 1;
        }
        if count >= max_children {
            return false;
        }

        let child_options = ViewOptions {
            depth: depth - 1,
            min_size,
            free_space: 0,
            unknown_space: 0,
            max_children,
        };
        reconstruct(slot_at(&mut children, count), child, &child_options);
        count += 1;
        true
    });

    // placeholders smaller than every copied child go last
    if unknown_space > 0 && count < max_children {
        slot_at(&mut children, count).make_pseudo(ViewKind::UnknownSpace, unknown_space);
        count += 1;
    }
    if free_space > 0 && count < max_children {
        slot_at(&mut children, count).make_pseudo(ViewKind::FreeSpace, free_space);
        count += 1;
    }

    children.truncate(count);
    view.children = children;
}

fn slot_at(children: &mut Vec<ViewEntry>, index: usize) -> &mut ViewEntry {
    if index >= children.len() {
        children.push(ViewEntry::new());
    }
    &mut children[index]
}
