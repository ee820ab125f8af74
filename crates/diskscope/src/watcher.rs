//! Filesystem change watching.
//!
//! Built on the `notify` crate, which embodies both platform shapes: on
//! Linux every directory is registered individually with inotify, elsewhere
//! (Windows, macOS) a single native recursive watch covers the subtree. The
//! backend's read thread hands raw events to a crossbeam channel;
//! [`SpaceWatcher::pop_event`] drains that channel and translates each raw
//! event into the [`FileEvent`] queue consumed by the scanner.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crossbeam::channel::{unbounded, Receiver};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::WatcherError;
use crate::platform::SEPARATOR;

/// True when the platform backend watches a whole subtree from one watch.
#[cfg(target_os = "linux")]
const RECURSIVE_NATIVE: bool = false;
#[cfg(not(target_os = "linux"))]
const RECURSIVE_NATIVE: bool = true;

/// What happened to a filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    Added,
    Removed,
    Modified,
    /// Source side of a rename.
    OldName,
    /// Destination side of a rename.
    NewName,
}

/// A single translated change notification.
///
/// `filepath` never ends with a separator; `parentpath` always does. Both
/// are non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub action: WatchAction,
    pub filepath: String,
    pub parentpath: String,
}

/// Successful outcomes of [`SpaceWatcher::add_dir`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddWatch {
    Added,
    AlreadyWatched,
}

/// Recursive change notifier producing a queue of [`FileEvent`]s.
pub struct SpaceWatcher {
    backend: Mutex<Option<RecommendedWatcher>>,
    raw_events: Receiver<notify::Result<Event>>,
    watched: Mutex<HashSet<PathBuf>>,
    queue: Mutex<VecDeque<FileEvent>>,
    watching: AtomicBool,
}

impl SpaceWatcher {
    /// Starts watching `path`. Fails if the path cannot be opened for
    /// watching.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, WatcherError> {
        let (tx, rx) = unbounded();
        let backend = notify::recommended_watcher(move |result: notify::Result<Event>| {
            let _ = tx.send(result);
        })
        .map_err(|_| WatcherError::NotInitialized)?;

        let watcher = Self {
            backend: Mutex::new(Some(backend)),
            raw_events: rx,
            watched: Mutex::new(HashSet::new()),
            queue: Mutex::new(VecDeque::new()),
            watching: AtomicBool::new(false),
        };
        watcher.watch_root(path.as_ref())?;
        Ok(watcher)
    }

    fn watch_root(&self, path: &Path) -> Result<(), WatcherError> {
        let mode = if RECURSIVE_NATIVE {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        let mut backend = self.backend.lock().unwrap();
        let watcher = backend.as_mut().ok_or(WatcherError::NotInitialized)?;
        watcher.watch(path, mode).map_err(map_notify_error)?;
        self.watched.lock().unwrap().insert(path.to_path_buf());
        self.watching.store(true, Ordering::Release);
        Ok(())
    }

    /// Registers one more directory. On recursively-watching platforms the
    /// subtree is already covered and this reports `AlreadyWatched`.
    ///
    /// A `DirLimitReached` error means the platform ran out of watch slots;
    /// callers must surface it rather than drop it.
    pub fn add_dir<P: AsRef<Path>>(&self, path: P) -> Result<AddWatch, WatcherError> {
        if !self.is_watching() {
            return Err(WatcherError::NotInitialized);
        }
        if RECURSIVE_NATIVE {
            return Ok(AddWatch::AlreadyWatched);
        }
        let path = path.as_ref();
        {
            let watched = self.watched.lock().unwrap();
            if watched.contains(path) {
                return Ok(AddWatch::AlreadyWatched);
            }
        }

        let mut backend = self.backend.lock().unwrap();
        let watcher = backend.as_mut().ok_or(WatcherError::NotInitialized)?;
        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(map_notify_error)?;
        self.watched.lock().unwrap().insert(path.to_path_buf());
        Ok(AddWatch::Added)
    }

    /// Drops the watch for one directory, if present.
    pub fn rm_dir<P: AsRef<Path>>(&self, path: P) {
        let path = path.as_ref();
        if !self.watched.lock().unwrap().remove(path) {
            return;
        }
        if let Some(watcher) = self.backend.lock().unwrap().as_mut() {
            let _ = watcher.unwatch(path);
        }
    }

    /// Next queued event, if any. Raw backend events received since the last
    /// call are translated first.
    pub fn pop_event(&self) -> Option<FileEvent> {
        self.drain_backend();
        self.queue.lock().unwrap().pop_front()
    }

    fn drain_backend(&self) {
        while let Ok(result) = self.raw_events.try_recv() {
            match result {
                Ok(event) => {
                    let translated = translate(&event);
                    if !translated.is_empty() {
                        // a removed directory loses its watch slot
                        for file_event in &translated {
                            if file_event.action == WatchAction::Removed {
                                self.rm_dir(&file_event.filepath);
                            }
                        }
                        self.queue.lock().unwrap().extend(translated);
                    }
                }
                Err(err) => {
                    tracing::debug!(%err, "watcher read failed, stopping watch");
                    self.watching.store(false, Ordering::Release);
                }
            }
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::Acquire) && self.backend.lock().unwrap().is_some()
    }

    /// Number of directories currently watched; 1 when the platform watches
    /// recursively.
    pub fn watched_count(&self) -> i64 {
        if RECURSIVE_NATIVE {
            return i64::from(self.is_watching());
        }
        self.watched.lock().unwrap().len() as i64
    }

    /// Platform limit on watched directories, or -1 when watching is
    /// recursive and no limit applies.
    pub fn dir_limit(&self) -> i64 {
        if RECURSIVE_NATIVE {
            return -1;
        }
        inotify_watch_limit()
    }

    /// Stops the backend and its read thread. Called before the scanner
    /// worker is stopped so nothing blocks on a dead channel.
    pub fn stop(&self) {
        self.watching.store(false, Ordering::Release);
        self.backend.lock().unwrap().take();
        self.watched.lock().unwrap().clear();
    }
}

impl Drop for SpaceWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(target_os = "linux")]
fn inotify_watch_limit() -> i64 {
    std::fs::read_to_string("/proc/sys/fs/inotify/max_user_watches")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn inotify_watch_limit() -> i64 {
    -1
}

fn map_notify_error(err: notify::Error) -> WatcherError {
    match err.kind {
        notify::ErrorKind::MaxFilesWatch => WatcherError::DirLimitReached,
        notify::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
            WatcherError::AccessDenied
        }
        // inotify reports an exhausted watch table as ENOSPC
        notify::ErrorKind::Io(io) if io.raw_os_error() == Some(28) => WatcherError::DirLimitReached,
        _ => WatcherError::AccessDenied,
    }
}

/// Maps one raw backend event onto zero or more [`FileEvent`]s.
fn translate(event: &Event) -> Vec<FileEvent> {
    let actions: Vec<WatchAction> = match &event.kind {
        EventKind::Create(_) => vec![WatchAction::Added],
        EventKind::Remove(_) => vec![WatchAction::Removed],
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => vec![WatchAction::OldName],
            RenameMode::To => vec![WatchAction::NewName],
            // one event carrying both sides of the rename
            RenameMode::Both => vec![WatchAction::OldName, WatchAction::NewName],
            _ => vec![WatchAction::Modified],
        },
        EventKind::Modify(_) => vec![WatchAction::Modified],
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .enumerate()
        .filter_map(|(i, path)| {
            let action = if actions.len() == event.paths.len() {
                actions[i]
            } else {
                *actions.first()?
            };
            let (filepath, parentpath) = split_event_path(path)?;
            Some(FileEvent {
                action,
                filepath,
                parentpath,
            })
        })
        .collect()
}

fn split_event_path(path: &Path) -> Option<(String, String)> {
    let mut filepath = path.to_string_lossy().into_owned();
    while filepath.ends_with(SEPARATOR) && filepath.len() > 1 {
        filepath.pop();
    }
    let last_sep = filepath.rfind(SEPARATOR)?;
    if last_sep == 0 && filepath.len() == 1 {
        return None;
    }
    let parentpath = filepath[..last_sep + 1].to_string();
    if parentpath.is_empty() || filepath.is_empty() {
        return None;
    }
    Some((filepath, parentpath))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::time::{Duration, Instant};

    fn p(s: &str) -> String {
        s.replace('/', &SEPARATOR.to_string())
    }

    #[test]
    fn create_and_remove_events_translate() {
        let event = Event::new(EventKind::Create(CreateKind::File)).add_path(p("/tmp/a.txt").into());
        let out = translate(&event);
        assert_eq!(
            out,
            vec![FileEvent {
                action: WatchAction::Added,
                filepath: p("/tmp/a.txt"),
                parentpath: p("/tmp/"),
            }]
        );

        let event = Event::new(EventKind::Remove(RemoveKind::Any)).add_path(p("/tmp/gone/").into());
        let out = translate(&event);
        assert_eq!(out[0].action, WatchAction::Removed);
        assert_eq!(out[0].filepath, p("/tmp/gone"));
        assert_eq!(out[0].parentpath, p("/tmp/"));
    }

    #[test]
    fn rename_pair_translates_to_old_and_new_name() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(p("/dir/old").into())
            .add_path(p("/dir/new").into());
        let out = translate(&event);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].action, WatchAction::OldName);
        assert_eq!(out[0].filepath, p("/dir/old"));
        assert_eq!(out[1].action, WatchAction::NewName);
        assert_eq!(out[1].filepath, p("/dir/new"));
    }

    #[test]
    fn modification_translates_and_access_is_dropped() {
        let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Any)))
            .add_path(p("/dir/file").into());
        assert_eq!(translate(&event)[0].action, WatchAction::Modified);

        let event = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(p("/dir/file").into());
        assert!(translate(&event).is_empty());
    }

    #[test]
    fn event_paths_keep_the_separator_contract() {
        let event = Event::new(EventKind::Create(CreateKind::Folder))
            .add_path(p("/a/b/c/").into());
        let out = translate(&event);
        assert!(!out[0].filepath.ends_with(SEPARATOR));
        assert!(out[0].parentpath.ends_with(SEPARATOR));
        assert!(!out[0].filepath.is_empty());
        assert!(!out[0].parentpath.is_empty());
    }

    #[test]
    fn watching_a_real_directory_sees_a_created_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let watcher = match SpaceWatcher::new(temp.path()) {
            Ok(w) => w,
            // some sandboxes have no watch backend at all
            Err(_) => return,
        };
        assert!(watcher.is_watching());
        assert!(watcher.watched_count() >= 1);

        std::fs::write(temp.path().join("fresh.txt"), b"hi").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = None;
        while Instant::now() < deadline {
            if let Some(event) = watcher.pop_event() {
                if event.filepath.ends_with("fresh.txt") {
                    seen = Some(event);
                    break;
                }
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        let event = seen.expect("no event for created file");
        assert!(event.parentpath.ends_with(SEPARATOR));

        watcher.stop();
        assert!(!watcher.is_watching());
        assert_eq!(
            watcher.add_dir(temp.path()),
            Err(WatcherError::NotInitialized)
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn per_directory_platform_reports_a_limit() {
        let temp = tempfile::TempDir::new().unwrap();
        let Ok(watcher) = SpaceWatcher::new(temp.path()) else {
            return;
        };
        assert!(watcher.dir_limit() > 0);

        std::fs::create_dir(temp.path().join("sub")).unwrap();
        assert_eq!(
            watcher.add_dir(temp.path().join("sub")),
            Ok(AddWatch::Added)
        );
        assert_eq!(
            watcher.add_dir(temp.path().join("sub")),
            Ok(AddWatch::AlreadyWatched)
        );
        assert_eq!(watcher.watched_count(), 2);

        watcher.rm_dir(temp.path().join("sub"));
        assert_eq!(watcher.watched_count(), 1);
    }
}
