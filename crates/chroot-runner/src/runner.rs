//! Command execution on the host or through the chroot enter tool.

use crate::error::RunError;
use crate::Result;
use std::collections::BTreeMap;
use std::process::Command;
use tracing::{debug, warn};

/// Default tool used to enter the SDK chroot.
pub const DEFAULT_ENTER_COMMAND: &str = "cros_sdk";

/// A single command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program and arguments.
    pub command: Vec<String>,

    /// Run the command inside the chroot.
    pub enter_sandbox: bool,

    /// Extra arguments handed to the enter tool (e.g. `--chroot <path>`).
    pub enter_args: Vec<String>,

    /// Environment overlay applied to the command.
    pub extra_env: BTreeMap<String, String>,

    /// Fail with [`RunError::NonZeroExit`] on a non-zero exit code.
    pub check: bool,
}

impl Invocation {
    /// A host command that must exit zero.
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            enter_sandbox: false,
            enter_args: Vec::new(),
            extra_env: BTreeMap::new(),
            check: true,
        }
    }

    /// Run inside the chroot using the given enter arguments.
    pub fn entering(mut self, enter_args: Vec<String>) -> Self {
        self.enter_sandbox = true;
        self.enter_args = enter_args;
        self
    }

    /// Apply an environment overlay.
    pub fn with_env(mut self, extra_env: BTreeMap<String, String>) -> Self {
        self.extra_env = extra_env;
        self
    }

    /// Report non-zero exit codes as data instead of failing.
    pub fn tolerate_non_zero(mut self) -> Self {
        self.check = false;
        self
    }
}

/// Runs [`Invocation`]s and reports their exit codes.
///
/// `Err` means the command did not run to completion as requested; an
/// `Ok(code)` carries the exit status of a command that did run.
pub trait ProcessRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<i32>;
}

/// [`ProcessRunner`] backed by `std::process::Command`.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    enter_command: String,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_ENTER_COMMAND)
    }
}

impl CommandRunner {
    /// Create a runner that enters the chroot with `enter_command`.
    pub fn new(enter_command: impl Into<String>) -> Self {
        Self {
            enter_command: enter_command.into(),
        }
    }

    /// The full argv that will be executed for `invocation`.
    ///
    /// Chroot invocations are wrapped as
    /// `<enter> <enter_args..> -- env K=V.. <command..>` so the overlay
    /// survives the enter tool's environment scrubbing.
    pub fn argv(&self, invocation: &Invocation) -> Vec<String> {
        if !invocation.enter_sandbox {
            return invocation.command.clone();
        }

        let mut argv = vec![self.enter_command.clone()];
        argv.extend(invocation.enter_args.iter().cloned());
        argv.push("--".to_string());
        if !invocation.extra_env.is_empty() {
            argv.push("env".to_string());
            argv.extend(
                invocation
                    .extra_env
                    .iter()
                    .map(|(key, value)| format!("{key}={value}")),
            );
        }
        argv.extend(invocation.command.iter().cloned());
        argv
    }
}

impl ProcessRunner for CommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<i32> {
        if invocation.command.is_empty() {
            return Err(RunError::EmptyCommand);
        }

        let argv = self.argv(invocation);
        let program = &argv[0];
        debug!(command = ?argv, enter_sandbox = invocation.enter_sandbox, "Running command");

        let mut command = Command::new(program);
        command.args(&argv[1..]);
        if !invocation.enter_sandbox {
            command.envs(&invocation.extra_env);
        }

        let status = command.status().map_err(|source| RunError::NotStarted {
            program: program.clone(),
            source,
        })?;
        let code = status.code().unwrap_or(-1);

        if code != 0 {
            if invocation.check {
                return Err(RunError::NonZeroExit {
                    program: program.clone(),
                    code,
                });
            }
            warn!(program = %program, code, "Command exited non-zero");
        }

        Ok(code)
    }
}
