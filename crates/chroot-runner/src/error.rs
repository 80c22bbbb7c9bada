//! Error types for chroot-runner

use thiserror::Error;

/// Errors that can occur while running a command
#[derive(Error, Debug)]
pub enum RunError {
    /// The invocation carried no program to run
    #[error("Command is empty")]
    EmptyCommand,

    /// The command could not be started at all (missing binary, bad
    /// permissions, missing chroot tooling)
    #[error("Failed to start {program}: {source}")]
    NotStarted {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and exited non-zero while a zero exit was required
    #[error("{program} exited with code {code}")]
    NonZeroExit { program: String, code: i32 },
}

impl RunError {
    /// Whether the command never started.
    pub fn is_start_failure(&self) -> bool {
        matches!(self, RunError::NotStarted { .. } | RunError::EmptyCommand)
    }
}
