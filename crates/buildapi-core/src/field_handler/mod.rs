//! Path-field translation across the sandbox boundary.
//!
//! - [`PathFieldTranslator`]: the three operations the bridge depends on
//! - [`SandboxDescriptor`]: sandbox root, temp root, enter args, env overlay
//! - [`PathsIn`]: guard restoring rewritten request fields on drop
//! - [`copy`]: [`CopyingTranslator`], the filesystem-copying implementation

pub mod copy;

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::TempDir;
use tracing::debug;

use crate::message::Message;

pub use copy::CopyingTranslator;

/// Errors from path-field translation.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("invalid sandbox descriptor in field {field}: {source}")]
    InvalidSandbox {
        field: String,
        source: serde_json::Error,
    },

    #[error("cannot resolve sandbox path {}: {source}", path.display())]
    Unresolved {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("path field {field} references missing path {}", path.display())]
    MissingSource { field: String, path: PathBuf },

    #[error("path field {field} has no file name: {}", path.display())]
    NoFileName { field: String, path: PathBuf },

    #[error("{} is not inside the sandbox root {}", path.display(), root.display())]
    OutsideSandbox { path: PathBuf, root: PathBuf },

    #[error("copying {} to {} failed: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for translation operations.
pub type Result<T> = std::result::Result<T, TranslateError>;

/// Where the sandbox lives and how to enter it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SandboxDescriptor {
    /// Sandbox root on the host.
    pub root: PathBuf,
    /// Cache directory handed to the enter tool.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Environment overlay applied inside the sandbox.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl SandboxDescriptor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host directory backing the sandbox's `/tmp`.
    pub fn tmp_root(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Arguments for the enter tool.
    pub fn enter_args(&self) -> Vec<String> {
        let mut args = vec![
            "--chroot".to_string(),
            self.root.to_string_lossy().into_owned(),
        ];
        if let Some(cache) = &self.cache_dir {
            args.push("--cache-dir".to_string());
            args.push(cache.to_string_lossy().into_owned());
        }
        args
    }

    /// Sandbox-relative form of a host path under the root: the root is
    /// stripped and replaced with a single leading `/`.
    pub fn to_sandbox_path(&self, host: &Path) -> Result<String> {
        let relative =
            host.strip_prefix(&self.root)
                .map_err(|_| TranslateError::OutsideSandbox {
                    path: host.to_path_buf(),
                    root: self.root.clone(),
                })?;
        Ok(format!("/{}", relative.to_string_lossy()))
    }

    /// Host location of a sandbox-relative path. Paths that climb out of
    /// the root through `..` are rejected.
    pub fn to_host_path(&self, inside: &str) -> Result<PathBuf> {
        let relative = Path::new(inside.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(TranslateError::OutsideSandbox {
                path: PathBuf::from(inside),
                root: self.root.clone(),
            });
        }
        Ok(self.root.join(relative))
    }
}

/// Guard over a request whose input-path fields were rewritten to
/// sandbox-relative copies.
///
/// Derefs to the rewritten message. Dropping the guard restores every
/// rewritten field and removes the copies.
pub struct PathsIn<'a> {
    message: &'a mut Message,
    originals: Vec<(Vec<String>, Option<Value>)>,
    copies: Option<TempDir>,
}

impl<'a> PathsIn<'a> {
    /// Wrap `message`; `copies` is removed when the guard drops.
    pub fn new(message: &'a mut Message, copies: Option<TempDir>) -> Self {
        Self {
            message,
            originals: Vec::new(),
            copies,
        }
    }

    /// Rewrite a field, remembering its previous value for restoration.
    pub fn rewrite(&mut self, field: Vec<String>, value: impl Into<Value>) {
        let previous = self.message.lookup(&field).cloned();
        self.message.set_at(&field, value);
        self.originals.push((field, previous));
    }

    /// Directory holding the copies, if any were made.
    pub fn copies_dir(&self) -> Option<&Path> {
        self.copies.as_ref().map(TempDir::path)
    }

    /// Number of rewritten fields.
    pub fn rewritten(&self) -> usize {
        self.originals.len()
    }
}

impl Deref for PathsIn<'_> {
    type Target = Message;

    fn deref(&self) -> &Message {
        &*self.message
    }
}

impl DerefMut for PathsIn<'_> {
    fn deref_mut(&mut self) -> &mut Message {
        &mut *self.message
    }
}

impl Drop for PathsIn<'_> {
    fn drop(&mut self) {
        for (field, previous) in self.originals.drain(..).rev() {
            match previous {
                Some(value) => self.message.set_at(&field, value),
                None => self.message.remove_at(&field),
            }
        }
        if let Some(dir) = self.copies.take() {
            debug!(dir = %dir.path().display(), "Removing sandbox path copies");
        }
    }
}

/// Translates path fields between host and sandbox.
pub trait PathFieldTranslator: Send + Sync {
    /// Sandbox descriptor carried by `request`. Idempotent; only reads the
    /// sandbox-bearing field.
    fn extract_sandbox(&self, request: &Message) -> Result<SandboxDescriptor>;

    /// Copy every set input-path field of `request` under `temp_root` and
    /// rewrite it to the copy's path relative to `prefix`.
    fn copy_paths_in<'a>(
        &self,
        request: &'a mut Message,
        temp_root: &Path,
        prefix: &Path,
    ) -> Result<PathsIn<'a>>;

    /// Copy every set output-path field of `response` out of the sandbox to
    /// the location `original_request` asks for, rewriting it to the host path.
    fn extract_results(
        &self,
        original_request: &Message,
        response: &mut Message,
        sandbox: &SandboxDescriptor,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageSchema;
    use std::sync::Arc;

    #[test]
    fn test_enter_args() {
        let mut sandbox = SandboxDescriptor::new("/work/chroot");
        assert_eq!(sandbox.enter_args(), vec!["--chroot", "/work/chroot"]);

        sandbox.cache_dir = Some("/work/.cache".into());
        assert_eq!(
            sandbox.enter_args(),
            vec!["--chroot", "/work/chroot", "--cache-dir", "/work/.cache"]
        );
    }

    #[test]
    fn test_sandbox_path_mapping() {
        let sandbox = SandboxDescriptor::new("/work/chroot");
        assert_eq!(sandbox.tmp_root(), PathBuf::from("/work/chroot/tmp"));
        assert_eq!(
            sandbox
                .to_sandbox_path(Path::new("/work/chroot/tmp/abc/input.json"))
                .unwrap(),
            "/tmp/abc/input.json"
        );
        assert_eq!(
            sandbox.to_host_path("/tmp/abc/out.bin").unwrap(),
            PathBuf::from("/work/chroot/tmp/abc/out.bin")
        );
        assert!(matches!(
            sandbox.to_sandbox_path(Path::new("/elsewhere/file")),
            Err(TranslateError::OutsideSandbox { .. })
        ));
    }

    #[test]
    fn test_host_path_cannot_climb_out() {
        let sandbox = SandboxDescriptor::new("/work/chroot");
        for inside in ["/../../etc/passwd", "/tmp/../../x", "../x", "/tmp/./.."] {
            assert!(
                matches!(
                    sandbox.to_host_path(inside),
                    Err(TranslateError::OutsideSandbox { .. })
                ),
                "{inside} should be rejected"
            );
        }
        assert_eq!(
            sandbox.to_host_path("/tmp/./a..b").unwrap(),
            PathBuf::from("/work/chroot/tmp/a..b")
        );
    }

    #[test]
    fn test_guard_restores_on_drop() {
        let schema = Arc::new(
            MessageSchema::new("test.Request")
                .input_path("source")
                .input_path("other"),
        );
        let mut msg = Message::new(schema);
        msg.set("source", "/host/data.txt");
        let before = msg.clone();

        {
            let mut guard = PathsIn::new(&mut msg, None);
            guard.rewrite(vec!["source".into()], "/tmp/x/data.txt");
            guard.rewrite(vec!["other".into()], "/tmp/x/other");
            assert_eq!(guard.lookup_str(&["source"]), Some("/tmp/x/data.txt"));
            assert_eq!(guard.rewritten(), 2);
        }

        // Fields that were unset before the rewrite are unset again.
        assert_eq!(msg, before);
    }
}
