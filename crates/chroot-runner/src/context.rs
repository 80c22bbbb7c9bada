//! Detection of whether the current process runs inside the chroot.

use std::path::{Path, PathBuf};

/// File present only inside the SDK chroot.
pub const DEFAULT_CHROOT_MARKER: &str = "/etc/cros_chroot_version";

/// Answers "am I already inside the sandbox?".
pub trait SandboxContext: Send + Sync {
    fn is_inside(&self) -> bool;
}

/// Inside when a marker file exists.
#[derive(Debug, Clone)]
pub struct MarkerFileContext {
    marker: PathBuf,
}

impl MarkerFileContext {
    pub fn new(marker: impl Into<PathBuf>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &Path {
        &self.marker
    }
}

impl Default for MarkerFileContext {
    fn default() -> Self {
        Self::new(DEFAULT_CHROOT_MARKER)
    }
}

impl SandboxContext for MarkerFileContext {
    fn is_inside(&self) -> bool {
        self.marker.exists()
    }
}

/// A context with a fixed answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedContext(pub bool);

impl FixedContext {
    pub fn inside() -> Self {
        Self(true)
    }

    pub fn outside() -> Self {
        Self(false)
    }
}

impl SandboxContext for FixedContext {
    fn is_inside(&self) -> bool {
        self.0
    }
}
