//! Background scan worker.
//!
//! A [`Scanner`] owns the file database, the change watcher and one worker
//! thread. Work arrives as [`ScanRequest`]s on a deduplicated queue: the
//! initial recursive scan of the root, user-initiated rescans, and
//! non-recursive refreshes derived from watcher events. The worker pops a
//! request, lists the directory with the lock released, merges the listing
//! into the database, and feeds newly found directories back into the queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::atomic::AtomicCell;

use crate::db::{FileDB, ScannedEntry};
use crate::entry::EntryKind;
use crate::error::{ScannerError, WatcherError};
use crate::fs::DirList;
use crate::logger::Logger;
use crate::path::{PathCompare, ScanPath};
use crate::platform::{self, MountPoints, SEPARATOR};
use crate::settings::Settings;
use crate::watcher::SpaceWatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Idle,
    Scanning,
    ScanPaused,
    Stopping,
}

/// One unit of work for the worker; consumed exactly once.
#[derive(Debug)]
struct ScanRequest {
    path: ScanPath,
    recursive: bool,
}

/// Watch registration figures reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherLimits {
    pub watched: i64,
    /// -1 when the platform watches recursively and no limit applies.
    pub limit: i64,
    /// True once the limit was hit or the watch count is close to it.
    pub exceeded: bool,
}

struct QueueState {
    requests: VecDeque<ScanRequest>,
    current: Option<ScanPath>,
}

struct ScannerInner {
    db: Arc<FileDB>,
    watcher: Option<SpaceWatcher>,
    logger: Arc<Logger>,
    status: AtomicCell<ScanStatus>,
    run: AtomicBool,
    queue: Mutex<QueueState>,
    mounts: Mutex<Arc<MountPoints>>,
    watch_limit_hit: AtomicBool,
    progress_known: AtomicBool,
    /// Rendered root path, cached so event translation never needs the db
    /// lock while the queue lock is held.
    root_str: String,
    fs_types: Vec<String>,
    poll: Duration,
    watch_margin: i64,
}

/// Scans a directory tree in the background and keeps it fresh.
pub struct Scanner {
    inner: Arc<ScannerInner>,
    worker: Option<JoinHandle<()>>,
}

impl Scanner {
    /// Starts scanning `path` with default settings.
    pub fn new(path: &str) -> Result<Self, ScannerError> {
        Self::with_settings(path, &Settings::default())
    }

    /// Starts scanning `path`.
    ///
    /// The database root is set, mount points are discovered, the watcher is
    /// attached and the worker is spawned with a recursive request for the
    /// root already queued.
    pub fn with_settings(path: &str, settings: &Settings) -> Result<Self, ScannerError> {
        if !platform::can_scan_dir(path) {
            return Err(ScannerError::CantOpenDir);
        }

        let logger = Arc::new(Logger::new());
        let db = Arc::new(FileDB::new());
        db.set_root(path).map_err(|_| ScannerError::CantOpenDir)?;
        let root_path = db.root_path().ok_or(ScannerError::CantOpenDir)?;
        let root_str = root_path.get_path(true);

        let fs_types = settings.scanner.fs_types.clone();
        let mounts = Arc::new(platform::mount_points(&fs_types));
        let progress_known = mounts.available.iter().any(|m| *m == root_str);

        let watcher = match SpaceWatcher::new(&root_str) {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                logger.log(
                    &format!("can't watch {root_str} for changes: {err}"),
                    "WATCH",
                );
                None
            }
        };

        let mut requests = VecDeque::new();
        requests.push_back(ScanRequest {
            path: root_path,
            recursive: true,
        });

        let inner = Arc::new(ScannerInner {
            db,
            watcher,
            logger,
            status: AtomicCell::new(ScanStatus::Scanning),
            run: AtomicBool::new(true),
            queue: Mutex::new(QueueState {
                requests,
                current: None,
            }),
            mounts: Mutex::new(mounts),
            watch_limit_hit: AtomicBool::new(false),
            progress_known: AtomicBool::new(progress_known),
            root_str,
            fs_types,
            poll: Duration::from_millis(settings.scanner.queue_poll_ms.max(1)),
            watch_margin: settings.scanner.watch_limit_margin,
        });
        inner.update_disk_space();

        let worker = thread::spawn({
            let inner = Arc::clone(&inner);
            move || inner.worker_run()
        });

        Ok(Self {
            inner,
            worker: Some(worker),
        })
    }

    /// Queues a recursive rescan of a known path; unknown paths are a no-op.
    pub fn rescan_path(&self, path: &ScanPath) -> Result<(), ScannerError> {
        if self.inner.status.load() == ScanStatus::Stopping {
            return Err(ScannerError::ScanRunning);
        }
        if self.inner.db.find_entry(path).is_none() {
            return Ok(());
        }

        // mounts and disk space may have changed since the last pass
        *self.inner.mounts.lock().unwrap() = Arc::new(platform::mount_points(&self.inner.fs_types));
        self.inner.update_disk_space();

        let mut qs = self.inner.queue.lock().unwrap();
        // to the front so the rescan starts as soon as possible
        ScannerInner::enqueue(&mut qs.requests, path.clone(), true, true);
        self.inner.resume_scanning();
        Ok(())
    }

    pub fn pause(&self) -> bool {
        self.inner
            .status
            .compare_exchange(ScanStatus::Scanning, ScanStatus::ScanPaused)
            .is_ok()
    }

    pub fn resume(&self) -> bool {
        self.inner
            .status
            .compare_exchange(ScanStatus::ScanPaused, ScanStatus::Scanning)
            .is_ok()
    }

    pub fn can_pause(&self) -> bool {
        self.inner.status.load() == ScanStatus::Scanning
    }

    pub fn can_resume(&self) -> bool {
        self.inner.status.load() == ScanStatus::ScanPaused
    }

    /// Stops the current scan and waits until the worker is idle.
    pub fn stop(&self) {
        let status = self.inner.status.load();
        if status == ScanStatus::Scanning || status == ScanStatus::ScanPaused {
            self.inner.status.store(ScanStatus::Stopping);
        }
        while self.inner.status.load() == ScanStatus::Stopping {
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Percentage of the mount's used space already accounted for; 100 when
    /// idle. Meaningful only while [`is_progress_known`] is true.
    ///
    /// [`is_progress_known`]: Scanner::is_progress_known
    pub fn scan_progress(&self) -> i32 {
        let status = self.inner.status.load();
        if status != ScanStatus::Scanning && status != ScanStatus::ScanPaused {
            return 100;
        }
        let (used, available, total) = self.inner.db.get_space();
        if total <= available {
            return 100;
        }
        let progress = (used as i128 * 100 / (total - available) as i128) as i32;
        progress.clamp(0, 100)
    }

    /// True when the scanned root is itself a mount point, so used disk
    /// space bounds the scan and progress is a real percentage.
    pub fn is_progress_known(&self) -> bool {
        self.inner.progress_known.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.inner.status.load() != ScanStatus::Idle
    }

    pub fn can_refresh(&self) -> bool {
        self.inner.db.is_ready()
    }

    pub fn has_changes(&self) -> bool {
        self.inner.db.has_changes()
    }

    /// Path the worker is scanning right now, if any.
    pub fn current_scan_path(&self) -> Option<ScanPath> {
        self.inner.queue.lock().unwrap().current.clone()
    }

    pub fn get_space(&self) -> (u64, u64, u64) {
        self.inner.db.get_space()
    }

    pub fn file_count(&self) -> u64 {
        self.inner.db.file_count()
    }

    pub fn dir_count(&self) -> u64 {
        self.inner.db.dir_count()
    }

    pub fn root_path(&self) -> Option<ScanPath> {
        self.inner.db.root_path()
    }

    /// Shared database handle for view projection and direct queries.
    pub fn file_db(&self) -> Arc<FileDB> {
        Arc::clone(&self.inner.db)
    }

    pub fn logger(&self) -> Arc<Logger> {
        Arc::clone(&self.inner.logger)
    }

    /// Current watch registration figures; `exceeded` tells the host to
    /// surface an advisory about partial live updates.
    pub fn watcher_limits(&self) -> WatcherLimits {
        let (watched, limit) = match &self.inner.watcher {
            Some(watcher) => (watcher.watched_count(), watcher.dir_limit()),
            None => (0, 0),
        };
        let near = limit >= 0 && watched + self.inner.watch_margin >= limit;
        WatcherLimits {
            watched,
            limit,
            exceeded: self.inner.watch_limit_hit.load(Ordering::Relaxed) || near,
        }
    }

    /// Re-reads the mount table and returns the roots that may be scanned.
    pub fn get_available_roots(&self) -> Vec<String> {
        let mounts = Arc::new(platform::mount_points(&self.inner.fs_types));
        let roots = mounts.available.clone();
        *self.inner.mounts.lock().unwrap() = mounts;
        roots
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        // the watcher goes first so nothing keeps feeding the queue
        if let Some(watcher) = &self.inner.watcher {
            watcher.stop();
        }
        self.inner.run.store(false, Ordering::Relaxed);
        self.inner.status.store(ScanStatus::Stopping);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.inner.db.clear();
    }
}

impl ScannerInner {
    fn worker_run(&self) {
        tracing::debug!(root = %self.root_str, "scan worker started");
        while self.run.load(Ordering::Relaxed) {
            {
                let mut qs = self.queue.lock().unwrap();
                while qs.requests.is_empty()
                    && self.status.load() == ScanStatus::Idle
                    && self.run.load(Ordering::Relaxed)
                {
                    drop(qs);
                    thread::sleep(self.poll);
                    qs = self.queue.lock().unwrap();
                    self.drain_watcher_events(&mut qs);
                }
            }
            if !self.run.load(Ordering::Relaxed) {
                break;
            }

            let started = Instant::now();
            let mut processed = 0u64;
            self.update_disk_space();

            loop {
                while self.status.load() == ScanStatus::ScanPaused {
                    thread::sleep(self.poll);
                }
                let Some(request) = self.next_request() else {
                    break;
                };
                processed += 1;

                let mounts = Arc::clone(&self.mounts.lock().unwrap());
                let mut new_dirs = Vec::new();
                let listing =
                    self.list_children(&request.path, &mounts, request.recursive, &mut new_dirs);
                self.register_watch(&request.path);

                if self.status.load() == ScanStatus::Stopping {
                    break;
                }

                let mut found_dirs = Vec::new();
                self.db.set_children_for_path(
                    &request.path,
                    listing,
                    if request.recursive {
                        None
                    } else {
                        Some(&mut found_dirs)
                    },
                );

                while self.status.load() == ScanStatus::ScanPaused {
                    thread::sleep(self.poll);
                }

                let mut qs = self.queue.lock().unwrap();
                if request.recursive {
                    Self::enqueue_children(&mut qs.requests, new_dirs, true, true);
                } else {
                    found_dirs.retain(|p| !Self::is_mount(&p.get_path(true), &mounts));
                    Self::enqueue_children(&mut qs.requests, found_dirs, false, false);
                }
                self.drain_watcher_events(&mut qs);
            }

            {
                let mut qs = self.queue.lock().unwrap();
                qs.requests.clear();
                qs.current = None;
            }
            self.update_disk_space();

            if processed > 0 {
                self.logger.log_default(&format!(
                    "scan pass over {} dir(s) took {} ms, {} file(s) and {} dir(s) known",
                    processed,
                    started.elapsed().as_millis(),
                    self.db.file_count(),
                    self.db.dir_count(),
                ));
            }
            self.status.store(ScanStatus::Idle);
        }
        tracing::debug!("scan worker finished");
    }

    /// Pops the next request while the queue is live; records it as the
    /// current scan path.
    fn next_request(&self) -> Option<ScanRequest> {
        let mut qs = self.queue.lock().unwrap();
        if !self.run.load(Ordering::Relaxed) || self.status.load() != ScanStatus::Scanning {
            return None;
        }
        let request = qs.requests.pop_front()?;
        qs.current = Some(request.path.clone());
        Some(request)
    }

    /// Lists one directory without holding any lock. For recursive requests
    /// the sub-directory paths are collected here (skipping mount
    /// boundaries); non-recursive requests rely on the database reporting
    /// which directories are new.
    fn list_children(
        &self,
        path: &ScanPath,
        mounts: &MountPoints,
        recursive: bool,
        new_dirs: &mut Vec<ScanPath>,
    ) -> Vec<ScannedEntry> {
        let path_str = path.get_path(true);
        let mut entries = Vec::new();

        for item in DirList::open(&path_str) {
            if item.is_dir && self.status.load() != ScanStatus::Stopping {
                let mut child_str =
                    String::with_capacity(path_str.len() + item.name.len() + 1);
                child_str.push_str(&path_str);
                child_str.push_str(&item.name);
                if !child_str.ends_with(SEPARATOR) {
                    child_str.push(SEPARATOR);
                }
                if Self::is_mount(&child_str, mounts) {
                    tracing::debug!(path = %child_str, "skipping mount boundary");
                } else if recursive {
                    let mut child_path = path.clone();
                    if child_path.add_dir(&item.name).is_ok() {
                        new_dirs.push(child_path);
                    }
                }
            }
            entries.push(ScannedEntry {
                kind: if item.is_dir {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
                name: item.name,
                size: item.size,
            });
        }
        entries
    }

    fn is_mount(path_str: &str, mounts: &MountPoints) -> bool {
        mounts.available.iter().any(|m| m == path_str)
            || mounts.excluded.iter().any(|m| m == path_str)
    }

    /// Registers the directory being scanned with the watcher. A limit hit
    /// latches the advisory flag instead of being dropped.
    fn register_watch(&self, path: &ScanPath) {
        let Some(watcher) = &self.watcher else {
            return;
        };
        match watcher.add_dir(path.get_path(true)) {
            Ok(_) => {}
            Err(WatcherError::DirLimitReached) => {
                if !self.watch_limit_hit.swap(true, Ordering::Relaxed) {
                    self.logger.log(
                        "watched directory limit reached, live updates will be partial",
                        "WATCH",
                    );
                }
            }
            Err(err) => {
                tracing::trace!(path = %path.get_path(true), %err, "watch registration failed");
            }
        }
    }

    /// Turns queued watcher events into non-recursive scan requests for the
    /// affected parent directories. Called with the queue lock held.
    fn drain_watcher_events(&self, qs: &mut QueueState) {
        let Some(watcher) = &self.watcher else {
            return;
        };
        while let Some(event) = watcher.pop_event() {
            if event.parentpath.is_empty() {
                continue;
            }
            match ScanPath::from_path(&event.parentpath, &self.root_str) {
                Ok(parent) => {
                    tracing::trace!(action = ?event.action, path = %event.filepath, "change event");
                    Self::enqueue(&mut qs.requests, parent, false, false);
                    // wake an idle worker; a paused scan stays paused
                    let _ = self
                        .status
                        .compare_exchange(ScanStatus::Idle, ScanStatus::Scanning);
                }
                // events outside the scanned root are not ours
                Err(_) => continue,
            }
        }
    }

    /// Wakes the worker up for new requests unless it is shutting down.
    fn resume_scanning(&self) {
        let _ = self
            .status
            .compare_exchange(ScanStatus::Idle, ScanStatus::Scanning);
        let _ = self
            .status
            .compare_exchange(ScanStatus::ScanPaused, ScanStatus::Scanning);
    }

    fn update_disk_space(&self) {
        let Some(root) = self.db.root_path() else {
            return;
        };
        if let Some((total, available)) = platform::mount_space(root.get_path(true)) {
            self.db.set_space(total, available);
        }
    }

    /// Queue discipline: a request subsumes queued children, is subsumed by
    /// a queued recursive ancestor, and never duplicates an equal path.
    fn enqueue(
        requests: &mut VecDeque<ScanRequest>,
        path: ScanPath,
        recursive: bool,
        to_front: bool,
    ) {
        let mut covered = false;
        requests.retain(|queued| match path.compare_to(&queued.path) {
            PathCompare::Different => true,
            // the new request will reach this path anyway
            PathCompare::Parent => false,
            PathCompare::Child => {
                covered |= queued.recursive;
                true
            }
            PathCompare::Equal => false,
        });
        if covered {
            return;
        }
        let request = ScanRequest { path, recursive };
        if to_front {
            requests.push_front(request);
        } else {
            requests.push_back(request);
        }
    }

    /// Batch form for children that share one parent: when the parent does
    /// not interact with anything queued, all of them are pushed directly.
    fn enqueue_children(
        requests: &mut VecDeque<ScanRequest>,
        paths: Vec<ScanPath>,
        recursive: bool,
        to_front: bool,
    ) {
        let Some(first) = paths.first() else {
            return;
        };
        let mut parent = first.clone();
        let safe_batch = parent.go_up().is_ok()
            && requests.iter().all(|queued| {
                match parent.compare_to(&queued.path) {
                    PathCompare::Different => true,
                    // covered by a queued recursive ancestor; nothing to add
                    PathCompare::Child => !queued.recursive,
                    _ => false,
                }
            });
        if safe_batch {
            for path in paths {
                let request = ScanRequest { path, recursive };
                if to_front {
                    requests.push_front(request);
                } else {
                    requests.push_back(request);
                }
            }
        } else {
            for path in paths {
                Self::enqueue(requests, path, recursive, to_front);
            }
        }
    }
}
