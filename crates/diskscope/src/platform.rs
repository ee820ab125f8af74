//! Platform queries: separators, mount points and disk space.

use std::path::Path;

use sysinfo::Disks;

/// File path separator native to this platform.
#[cfg(windows)]
pub const SEPARATOR: char = '\\';
#[cfg(not(windows))]
pub const SEPARATOR: char = '/';

/// The other platform's separator; accepted on input and rewritten.
#[cfg(windows)]
pub const FOREIGN_SEPARATOR: char = '/';
#[cfg(not(windows))]
pub const FOREIGN_SEPARATOR: char = '\\';

/// Mount points split into scannable roots and paths a scan must never enter.
#[derive(Debug, Clone, Default)]
pub struct MountPoints {
    /// Roots a scan may start from (e.g. `/`, `/home/`, `C:\`). All end with
    /// the separator.
    pub available: Vec<String>,
    /// Mounted paths that must be skipped while scanning (pseudo filesystems,
    /// network mounts and anything else outside the allowlist).
    pub excluded: Vec<String>,
}

/// Checks that a path exists and is a directory that could be scanned.
pub fn can_scan_dir<P: AsRef<Path>>(path: P) -> bool {
    std::fs::symlink_metadata(path.as_ref())
        .map(|md| md.is_dir())
        .unwrap_or(false)
}

/// Filesystem types whose mounts are scannable. Everything else mounted is
/// treated as excluded (proc, sysfs, tmpfs, network shares, ...).
const FS_ALLOWLIST: [&str; 6] = ["ext2", "ext3", "ext4", "vfat", "ntfs", "fuseblk"];

/// Discovers mount points and classifies them by filesystem type.
#[cfg(target_os = "linux")]
pub fn mount_points(allowlist: &[String]) -> MountPoints {
    let table = std::fs::read_to_string("/proc/mounts").unwrap_or_default();
    let mut points = MountPoints::default();

    for line in table.lines() {
        // device, mount path, fstype; the rest of the line is options
        let mut tokens = line.split_whitespace();
        let (Some(_device), Some(mount), Some(fstype)) =
            (tokens.next(), tokens.next(), tokens.next())
        else {
            continue;
        };

        let mut mount = unescape_mount(mount);
        if !mount.ends_with(SEPARATOR) {
            mount.push(SEPARATOR);
        }
        if allowlist.iter().any(|fs| fs == fstype) {
            points.available.push(mount);
        } else {
            tracing::trace!(mount, fstype, "excluded mount");
            points.excluded.push(mount);
        }
    }

    points
}

/// Non-Linux fallback: every mounted disk reported by the OS is a scannable
/// root (fixed and removable drives on Windows); nothing is excluded.
#[cfg(not(target_os = "linux"))]
pub fn mount_points(_allowlist: &[String]) -> MountPoints {
    let disks = Disks::new_with_refreshed_list();
    let mut points = MountPoints::default();

    for disk in disks.list() {
        let mut mount = disk.mount_point().to_string_lossy().into_owned();
        if !mount.ends_with(SEPARATOR) {
            mount.push(SEPARATOR);
        }
        points.available.push(mount);
    }

    points
}

/// Default allowlist as owned strings, for callers without settings.
pub fn default_fs_allowlist() -> Vec<String> {
    FS_ALLOWLIST.iter().map(|s| s.to_string()).collect()
}

/// Total and available space of the filesystem holding `path`, in bytes.
///
/// The disk is selected by the longest mount point that prefixes the path, so
/// sub-directories of a mount resolve to their filesystem.
pub fn mount_space<P: AsRef<Path>>(path: P) -> Option<(u64, u64)> {
    let path = path.as_ref().canonicalize().ok()?;
    let disks = Disks::new_with_refreshed_list();

    let mut best: Option<(usize, u64, u64)> = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if path.starts_with(mount) {
            let depth = mount.components().count();
            if best.map(|(d, _, _)| depth > d).unwrap_or(true) {
                best = Some((depth, disk.total_space(), disk.available_space()));
            }
        }
    }

    best.map(|(_, total, available)| (total, available))
}

/// `/proc/mounts` escapes spaces and other separators as octal (`\040`).
#[cfg(target_os = "linux")]
fn unescape_mount(mount: &str) -> String {
    let mut out = String::with_capacity(mount.len());
    let mut chars = mount.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let digits: String = chars.clone().take(3).collect();
        if digits.len() == 3 {
            if let Ok(code) = u8::from_str_radix(&digits, 8) {
                out.push(code as char);
                chars.nth(2);
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_check_rejects_missing_and_file_paths() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();

        assert!(can_scan_dir(temp.path()));
        assert!(!can_scan_dir(&file));
        assert!(!can_scan_dir(temp.path().join("missing")));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn mounts_are_classified_and_slash_terminated() {
        let points = mount_points(&default_fs_allowlist());
        for mount in points.available.iter().chain(points.excluded.iter()) {
            assert!(mount.ends_with(SEPARATOR), "unterminated mount {mount:?}");
        }
        // root is always mounted somewhere
        assert!(points
            .available
            .iter()
            .chain(points.excluded.iter())
            .any(|m| m == "/"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn octal_escapes_in_mount_table_are_decoded() {
        assert_eq!(unescape_mount(r"/mnt/with\040space"), "/mnt/with space");
        assert_eq!(unescape_mount("/plain"), "/plain");
    }
}
