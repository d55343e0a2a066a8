//! Non-recursive directory listing.
//!
//! Lists the immediate children of one directory, classified by type and keyed
//! by name so that callers see them in a stable, sorted order.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum DirListError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("File name is not valid UTF-8: {0}")]
    NonUtf8Name(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEntry {
    File,
    Dir,
    /// Not followed.
    Symlink,
    /// Sockets, FIFOs, devices.
    Other,
}

/// Lists the immediate children of `dir`.
///
/// `exclude`, if given, is skipped when it is one of the children. It must be
/// spelled the same way `dir.join(name)` would spell it (canonicalize both
/// sides first).
pub fn list_directory(
    dir: &Path,
    exclude: Option<&Path>,
) -> Result<BTreeMap<String, FsEntry>, DirListError> {
    let read_dir = std::fs::read_dir(dir).map_err(|e| {
        if e.kind() == ErrorKind::PermissionDenied {
            DirListError::PermissionDenied(dir.to_path_buf())
        } else {
            DirListError::Io(e)
        }
    })?;

    let mut entries = BTreeMap::new();

    for entry in read_dir {
        let entry = entry.map_err(DirListError::Io)?;
        let path = entry.path();

        if exclude == Some(path.as_path()) {
            continue;
        }

        let name = entry
            .file_name()
            .into_string()
            .map_err(|_| DirListError::NonUtf8Name(path.clone()))?;

        // DirEntry::file_type does not follow symlinks.
        let file_type = entry.file_type().map_err(|e| {
            if e.kind() == ErrorKind::PermissionDenied {
                DirListError::PermissionDenied(path.clone())
            } else {
                DirListError::Io(e)
            }
        })?;

        let fs_entry = if file_type.is_symlink() {
            FsEntry::Symlink
        } else if file_type.is_dir() {
            FsEntry::Dir
        } else if file_type.is_file() {
            FsEntry::File
        } else {
            FsEntry::Other
        };

        entries.insert(name, fs_entry);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_list_simple_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::write(root.join("file1.txt"), "content1").unwrap();
        fs::write(root.join("file2.txt"), "content2").unwrap();
        fs::create_dir(root.join("dir1")).unwrap();
        fs::write(root.join("dir1/file3.txt"), "content3").unwrap();

        let entries = list_directory(root, None).unwrap();
        let listed: Vec<(&str, FsEntry)> = entries.iter().map(|(n, e)| (n.as_str(), *e)).collect();

        assert_eq!(
            listed,
            vec![
                ("dir1", FsEntry::Dir),
                ("file1.txt", FsEntry::File),
                ("file2.txt", FsEntry::File),
            ]
        );
    }

    #[test]
    fn test_list_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(list_directory(temp_dir.path(), None).unwrap().is_empty());
    }

    #[test]
    fn test_list_sorted_by_name() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::write(root.join("zebra.txt"), "z").unwrap();
        fs::write(root.join("apple.txt"), "a").unwrap();
        fs::write(root.join("banana.txt"), "b").unwrap();

        let names: Vec<String> = list_directory(root, None).unwrap().into_keys().collect();
        assert_eq!(names, vec!["apple.txt", "banana.txt", "zebra.txt"]);
    }

    #[test]
    fn test_list_skips_excluded_child() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();

        fs::create_dir(root.join("archives")).unwrap();
        fs::write(root.join("keep.txt"), "k").unwrap();

        let excluded = root.join("archives");
        let entries = list_directory(&root, Some(&excluded)).unwrap();

        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("keep.txt"));
    }

    #[test]
    fn test_list_missing_directory_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = list_directory(&temp_dir.path().join("gone"), None);

        match result {
            Err(DirListError::Io(e)) => assert_eq!(e.kind(), ErrorKind::NotFound),
            other => panic!("Expected NotFound IO error, got {other:?}"),
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_list_symlinks_are_not_followed() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir(root.join("real")).unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("link")).unwrap();
        std::os::unix::fs::symlink("/nonexistent/target", root.join("broken")).unwrap();

        let entries = list_directory(root, None).unwrap();

        assert_eq!(entries.get("real"), Some(&FsEntry::Dir));
        assert_eq!(entries.get("link"), Some(&FsEntry::Symlink));
        assert_eq!(entries.get("broken"), Some(&FsEntry::Symlink));
    }

    #[test]
    #[cfg(unix)]
    fn test_list_non_utf8_name_is_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = TempDir::new().unwrap();
        let name = OsStr::from_bytes(b"bad\xffname");
        if fs::write(temp_dir.path().join(name), "x").is_err() {
            // Some filesystems refuse non-UTF-8 names outright.
            return;
        }

        let result = list_directory(temp_dir.path(), None);
        assert!(matches!(result, Err(DirListError::NonUtf8Name(_))));
    }

    #[test]
    #[cfg(unix)]
    fn test_list_permission_denied() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let restricted_dir = temp_dir.path().join("restricted");
        fs::create_dir(&restricted_dir).unwrap();

        let mut perms = fs::metadata(&restricted_dir).unwrap().permissions();
        perms.set_mode(0o000);
        fs::set_permissions(&restricted_dir, perms.clone()).unwrap();

        let result = list_directory(&restricted_dir, None);

        perms.set_mode(0o755);
        fs::set_permissions(&restricted_dir, perms).unwrap();

        // Root bypasses permission bits.
        if result.is_ok() {
            return;
        }
        assert!(matches!(result, Err(DirListError::PermissionDenied(_))));
    }
}
