//! Platform-abstract directory enumeration.

use std::fs;
use std::path::Path;

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListEntry {
    pub name: String,
    pub is_dir: bool,
    /// Logical file size; 0 for directories and symlinks.
    pub size: i64,
}

/// Iterator over the direct children of one directory.
///
/// Opening a directory that cannot be read yields an iterator that is
/// immediately exhausted rather than an error: a directory vanishing between
/// being queued and being listed is a normal race with concurrent deletion.
/// Symlinks and reparse points are reported as zero-size files so a scan
/// never crosses mount boundaries or loops through link cycles.
#[derive(Debug)]
pub struct DirList {
    inner: Option<fs::ReadDir>,
}

impl DirList {
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let inner = match fs::read_dir(path.as_ref()) {
            Ok(iter) => Some(iter),
            Err(err) => {
                tracing::debug!(path = %path.as_ref().display(), %err, "can't list directory");
                None
            }
        };
        Self { inner }
    }
}

impl Iterator for DirList {
    type Item = DirListEntry;

    fn next(&mut self) -> Option<DirListEntry> {
        let iter = self.inner.as_mut()?;
        loop {
            // entries that error out or vanish mid-listing are skipped
            let entry = match iter.next()? {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.is_empty() {
                continue;
            }

            // file_type/metadata of a DirEntry do not follow symlinks, so a
            // link to a directory stays a non-directory here
            if file_type.is_dir() {
                return Some(DirListEntry {
                    name,
                    is_dir: true,
                    size: 0,
                });
            }
            let size = if file_type.is_symlink() {
                0
            } else {
                entry.metadata().map(|md| md.len() as i64).unwrap_or(0)
            };
            return Some(DirListEntry {
                name,
                is_dir: false,
                size,
            });
        }
    }
}
