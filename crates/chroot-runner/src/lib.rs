//! Chroot-Runner: process execution for the Build API
//!
//! Runs external commands either on the host or inside the SDK chroot
//! through an enter tool (`cros_sdk` by default), and tells the caller
//! whether it is already running inside the chroot.
//!
//! A command that could not be started at all is reported as
//! [`RunError::NotStarted`], which callers keep distinct from a command
//! that ran and exited non-zero.

pub mod context;
pub mod error;
pub mod runner;

pub use context::{FixedContext, MarkerFileContext, SandboxContext, DEFAULT_CHROOT_MARKER};
pub use error::RunError;
pub use runner::{CommandRunner, Invocation, ProcessRunner, DEFAULT_ENTER_COMMAND};

/// Result type for chroot-runner operations
pub type Result<T> = std::result::Result<T, RunError>;
