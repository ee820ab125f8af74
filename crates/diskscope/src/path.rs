//! Normalized, crc-tagged scan paths.
//!
//! A [`ScanPath`] is an ordered list of parts: the root first (always ending
//! with the platform separator), then one directory part per level, and
//! optionally a final file part. Alongside the parts it keeps a running
//! CRC-16 per level (the XOR of the previous level's crc with the crc of the
//! new part's base name), which the file database uses as a cheap full-path
//! hash.

use crc::Crc;

use crate::error::PathError;
use crate::platform::{FOREIGN_SEPARATOR, SEPARATOR};

const CRC16: Crc<u16> = Crc::<u16>::new(&crc::CRC_16_ARC);

/// CRC-16 of a path component, computed without any trailing separator.
pub fn name_crc(name: &str) -> u16 {
    let trimmed = name.strip_suffix(SEPARATOR).unwrap_or(name);
    CRC16.checksum(trimmed.as_bytes())
}

/// Result of comparing two paths by their parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathCompare {
    Equal,
    /// `self` is an ancestor directory of the other path.
    Parent,
    /// `self` lives somewhere below the other path.
    Child,
    Different,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPath {
    /// Each part holds at most one separator, at its end. The root part may
    /// hold several (`/home/user/`). Directory parts end with the separator,
    /// a file part does not, and only the last part may be a file.
    parts: Vec<String>,
    /// Running XOR of part-name crcs; same length as `parts`.
    crcs: Vec<u16>,
}

impl ScanPath {
    /// Creates a path pointing at a root directory.
    pub fn new(root: &str) -> Result<Self, PathError> {
        if root.is_empty() {
            return Err(PathError::EmptyRoot);
        }
        let root = normalize(root, true);
        let crc = name_crc(&root);
        Ok(Self {
            parts: vec![root],
            crcs: vec![crc],
        })
    }

    /// Creates a path from a full path string and the root it must start
    /// with. A trailing separator marks the target as a directory; without
    /// one the final component is a file.
    pub fn from_path(full: &str, root: &str) -> Result<Self, PathError> {
        if full.is_empty() || root.is_empty() {
            return Err(PathError::EmptyRoot);
        }
        let root = normalize(root, true);
        // keep the caller's trailing-separator choice, fix the slashes
        let is_dir = full.ends_with(SEPARATOR) || full.ends_with(FOREIGN_SEPARATOR);
        let full = normalize(full, is_dir);
        if !full.starts_with(&root) {
            return Err(PathError::NotAPrefix);
        }

        let mut path = Self::new(&root)?;
        let rest = &full[root.len()..];
        if rest.is_empty() {
            return Ok(path);
        }

        let ends_with_sep = rest.ends_with(SEPARATOR);
        let segments: Vec<&str> = rest.split(SEPARATOR).filter(|s| !s.is_empty()).collect();
        for (i, segment) in segments.iter().enumerate() {
            let last = i + 1 == segments.len();
            if last && !ends_with_sep {
                path.add_file(segment)?;
            } else {
                path.add_dir(segment)?;
            }
        }
        Ok(path)
    }

    /// Appends a directory. Fails if the path already ends with a file.
    pub fn add_dir(&mut self, name: &str) -> Result<(), PathError> {
        self.push_part(name, true)
    }

    /// Appends a file. Nothing more can be appended afterwards.
    pub fn add_file(&mut self, name: &str) -> Result<(), PathError> {
        self.push_part(name, false)
    }

    fn push_part(&mut self, name: &str, is_dir: bool) -> Result<(), PathError> {
        if name.is_empty() {
            return Err(PathError::EmptyName);
        }
        if !self.is_dir() {
            return Err(PathError::NotADirectory);
        }
        let crc = self.path_crc() ^ name_crc(name);
        let mut part = name.to_string();
        if is_dir && !part.ends_with(SEPARATOR) {
            part.push(SEPARATOR);
        }
        self.parts.push(part);
        self.crcs.push(crc);
        Ok(())
    }

    /// Moves the path to its parent directory; fails at the root.
    pub fn go_up(&mut self) -> Result<(), PathError> {
        if !self.can_go_up() {
            return Err(PathError::AtRoot);
        }
        self.parts.pop();
        self.crcs.pop();
        Ok(())
    }

    pub fn can_go_up(&self) -> bool {
        self.parts.len() > 1
    }

    /// True if the path denotes a directory (its last part ends with the
    /// separator).
    pub fn is_dir(&self) -> bool {
        self.parts
            .last()
            .map(|p| p.ends_with(SEPARATOR))
            .unwrap_or(false)
    }

    /// Renders the full path. For directories a trailing separator is added
    /// only when `with_trailing` is set.
    pub fn get_path(&self, with_trailing: bool) -> String {
        let mut path: String = self.parts.concat();
        if !with_trailing && path.ends_with(SEPARATOR) && self.parts.len() > 1 {
            path.pop();
        }
        path
    }

    /// Name of the file or directory this path points to. The root is
    /// returned as is; otherwise the trailing separator is stripped.
    pub fn name(&self) -> &str {
        let last = self.parts.last().map(String::as_str).unwrap_or("");
        if self.parts.len() == 1 {
            return last;
        }
        last.strip_suffix(SEPARATOR).unwrap_or(last)
    }

    pub fn root(&self) -> &str {
        self.parts.first().map(String::as_str).unwrap_or("")
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn crcs(&self) -> &[u16] {
        &self.crcs
    }

    /// Running crc of the whole path.
    pub fn path_crc(&self) -> u16 {
        *self.crcs.last().unwrap_or(&0)
    }

    /// Compares by parts, guarded by the cheap running-crc check per level.
    pub fn compare_to(&self, other: &ScanPath) -> PathCompare {
        let shared = self.parts.len().min(other.parts.len());
        for i in 0..shared {
            if self.crcs[i] != other.crcs[i] || self.parts[i] != other.parts[i] {
                return PathCompare::Different;
            }
        }
        match self.parts.len().cmp(&other.parts.len()) {
            std::cmp::Ordering::Equal => PathCompare::Equal,
            std::cmp::Ordering::Less => PathCompare::Parent,
            std::cmp::Ordering::Greater => PathCompare::Child,
        }
    }

    /// Rewrites this path to be relative to `parent`, which must be one of
    /// its ancestors. The first remaining part becomes the new root.
    pub fn make_relative_to(&mut self, parent: &ScanPath) -> Result<(), PathError> {
        if self.compare_to(parent) != PathCompare::Child {
            return Err(PathError::NotAChild);
        }
        self.parts.drain(..parent.parts.len());
        self.crcs.clear();
        let mut crc = 0u16;
        for part in &self.parts {
            crc ^= name_crc(part);
            self.crcs.push(crc);
        }
        Ok(())
    }
}

impl std::fmt::Display for ScanPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.get_path(true))
    }
}

/// Rewrites foreign separators and fixes the trailing separator: added when
/// `trailing` is set, removed otherwise.
fn normalize(path: &str, trailing: bool) -> String {
    let mut out: String = path
        .chars()
        .map(|c| if c == FOREIGN_SEPARATOR { SEPARATOR } else { c })
        .collect();
    if trailing && !out.ends_with(SEPARATOR) {
        out.push(SEPARATOR);
    } else if !trailing && out.ends_with(SEPARATOR) && out.len() > 1 {
        out.pop();
    }
    out
}
