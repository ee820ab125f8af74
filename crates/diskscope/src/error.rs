//! Error types surfaced by the core.

/// Errors returned when starting or controlling a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScannerError {
    /// A scan was requested while the worker is shutting down.
    #[error("a scan is already running")]
    ScanRunning,

    /// The requested root is not a directory that can be opened.
    #[error("can't open directory for scanning")]
    CantOpenDir,
}

/// Errors returned by the change watcher.
///
/// `DirLimitReached` is a reportable condition, not a fatal one: the scanner
/// keeps running without live updates for the unwatched directories and the
/// host surfaces an advisory via [`Scanner::watcher_limits`].
///
/// [`Scanner::watcher_limits`]: crate::Scanner::watcher_limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WatcherError {
    #[error("access denied while adding watch")]
    AccessDenied,

    #[error("watched directory limit reached")]
    DirLimitReached,

    #[error("watcher is not initialized")]
    NotInitialized,

    #[error("directory is already watched")]
    AlreadyWatched,
}

/// Failures constructing or editing a [`ScanPath`](crate::ScanPath).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("can't create path from empty root")]
    EmptyRoot,

    #[error("can't append empty name")]
    EmptyName,

    #[error("path already ends with a file")]
    NotADirectory,

    #[error("root is not a prefix of the given path")]
    NotAPrefix,

    #[error("already at root")]
    AtRoot,

    #[error("path is not a child of the given parent")]
    NotAChild,
}
