//! diskscope is the scanning core for treemap disk usage visualizers.
//!
//! The crate keeps a live in-memory tree that mirrors disk occupancy under a
//! chosen root. A background [`Scanner`] traverses directories breadth-first
//! under pause/stop/rescan control, a [`SpaceWatcher`] turns OS change
//! notifications into queued rescan requests, the [`FileDB`] holds the
//! size-sorted tree behind one lock, and a [`ViewProjector`] derives bounded
//! rectangle-allocated snapshots for rendering. Hosts (GUI or TUI) drive the
//! public operations and draw the snapshots; the core has no UI of its own.
//!
//! ```no_run
//! use diskscope::{Scanner, ViewProjector, Rect};
//!
//! let scanner = Scanner::new("/home/user")?;
//! let mut projector = ViewProjector::new();
//! projector.set_file_db(scanner.file_db());
//! projector.set_view_area(Rect::new(0, 0, 1280, 720));
//!
//! while scanner.is_running() {
//!     if scanner.has_changes() {
//!         projector.update(true, true);
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(100));
//! }
//! # Ok::<(), diskscope::ScannerError>(())
//! ```

pub mod db;
pub mod entry;
pub mod error;
pub mod fs;
pub mod logger;
pub mod path;
pub mod platform;
pub mod scanner;
pub mod settings;
pub mod view;
pub mod watcher;

pub use db::{EntryInfo, EntryView, FileDB, ScannedEntry};
pub use entry::{EntryArena, EntryId, EntryKind, FileEntry};
pub use error::{PathError, ScannerError, WatcherError};
pub use fs::{DirList, DirListEntry};
pub use logger::Logger;
pub use path::{PathCompare, ScanPath};
pub use scanner::{ScanStatus, Scanner, WatcherLimits};
pub use settings::Settings;
pub use view::{Rect, ViewEntry, ViewKind, ViewProjector};
pub use watcher::{AddWatch, FileEvent, SpaceWatcher, WatchAction};
