use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Reads and writes whole payload files.
pub trait MessageStore: Send + Sync {
    fn read_text(&self, path: &Path) -> io::Result<String>;
    fn write_text(&self, path: &Path, contents: &str) -> io::Result<()>;
    /// Create `path` as an empty file, truncating any existing content.
    fn touch(&self, path: &Path) -> io::Result<()>;
}

/// Filesystem-backed [`MessageStore`].
///
/// Writes are atomic: content goes to a temp file in the target directory
/// which is then renamed over the destination. The destination keeps its
/// permissions; new files are created world-readable (`0644` on unix).
#[derive(Debug, Clone, Copy, Default)]
pub struct FsMessageStore;

impl MessageStore for FsMessageStore {
    fn read_text(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write_text(&self, path: &Path, contents: &str) -> io::Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let permissions = fs::metadata(path)
            .ok()
            .map(|meta| meta.permissions())
            .or_else(default_permissions);

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        // Temp files are created owner-only.
        if let Some(permissions) = permissions {
            tmp.as_file().set_permissions(permissions)?;
        }
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn touch(&self, path: &Path) -> io::Result<()> {
        fs::File::create(path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn default_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<fs::Permissions> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let store = FsMessageStore;
        store.write_text(&path, "{\"a\": 1}").unwrap();
        assert_eq!(store.read_text(&path).unwrap(), "{\"a\": 1}");

        store.write_text(&path, "{}").unwrap();
        assert_eq!(store.read_text(&path).unwrap(), "{}");
    }

    #[test]
    fn touch_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, "stale").unwrap();
        FsMessageStore.touch(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn read_missing_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FsMessageStore
            .read_text(&dir.path().join("missing.json"))
            .is_err());
    }

    #[test]
    fn write_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("out.json");
        assert!(FsMessageStore.write_text(&path, "{}").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn new_files_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        FsMessageStore.write_text(&path, "{}").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn overwrite_keeps_existing_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, "stale").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        FsMessageStore.write_text(&path, "{}").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
        assert_eq!(FsMessageStore.read_text(&path).unwrap(), "{}");
    }
}
