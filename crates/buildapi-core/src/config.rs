//! Per-call options and process-wide settings.

use std::path::PathBuf;

use chroot_runner::{DEFAULT_CHROOT_MARKER, DEFAULT_ENTER_COMMAND};
use serde::{Deserialize, Serialize};

/// Environment variable naming the chroot enter tool.
pub const ENV_ENTER_COMMAND: &str = "BUILD_API_ENTER_COMMAND";
/// Environment variable naming the entry point re-invoked inside the sandbox.
pub const ENV_SANDBOX_ENTRY: &str = "BUILD_API_SANDBOX_ENTRY";
/// Environment variable naming the file whose presence means "inside".
pub const ENV_SANDBOX_MARKER: &str = "BUILD_API_SANDBOX_MARKER";
/// Environment variable naming the sandbox root used when a request has none.
pub const ENV_DEFAULT_SANDBOX: &str = "BUILD_API_DEFAULT_SANDBOX";

/// How a call should be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    /// Run the implementation.
    #[default]
    Execute,
    /// Validate the request, then stop.
    ValidateOnly,
    /// Return a canned successful response.
    MockSuccess,
    /// Return a canned failure response.
    MockFailure,
    /// Return a canned invalid-input response.
    MockInvalid,
}

impl CallType {
    /// Command-line flag selecting this call type, `None` for [`CallType::Execute`].
    pub fn flag(&self) -> Option<&'static str> {
        match self {
            CallType::Execute => None,
            CallType::ValidateOnly => Some("--validate-only"),
            CallType::MockSuccess => Some("--mock-call"),
            CallType::MockFailure => Some("--mock-failure"),
            CallType::MockInvalid => Some("--mock-invalid"),
        }
    }
}

impl std::fmt::Display for CallType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallType::Execute => write!(f, "execute"),
            CallType::ValidateOnly => write!(f, "validate_only"),
            CallType::MockSuccess => write!(f, "mock_success"),
            CallType::MockFailure => write!(f, "mock_failure"),
            CallType::MockInvalid => write!(f, "mock_invalid"),
        }
    }
}

/// Per-call options handed unchanged to local and bridged execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallConfig {
    pub call_type: CallType,
}

impl CallConfig {
    pub fn new(call_type: CallType) -> Self {
        Self { call_type }
    }

    pub fn validate_only(&self) -> bool {
        self.call_type == CallType::ValidateOnly
    }

    pub fn is_mock(&self) -> bool {
        matches!(
            self.call_type,
            CallType::MockSuccess | CallType::MockFailure | CallType::MockInvalid
        )
    }
}

/// Router settings, read from the environment with built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Tool used to enter the sandbox.
    pub enter_command: String,
    /// Entry point re-invoked inside the sandbox for bridged calls.
    pub sandbox_entry: String,
    /// File whose presence means the process already runs inside.
    pub sandbox_marker: PathBuf,
    /// Sandbox root used when a request carries no descriptor.
    pub default_sandbox: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enter_command: DEFAULT_ENTER_COMMAND.to_string(),
            sandbox_entry: "build_api".to_string(),
            sandbox_marker: PathBuf::from(DEFAULT_CHROOT_MARKER),
            default_sandbox: PathBuf::from("chroot"),
        }
    }
}

impl Settings {
    /// Defaults overridden by any `BUILD_API_*` variables that are set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            enter_command: non_empty(ENV_ENTER_COMMAND).unwrap_or(defaults.enter_command),
            sandbox_entry: non_empty(ENV_SANDBOX_ENTRY).unwrap_or(defaults.sandbox_entry),
            sandbox_marker: non_empty(ENV_SANDBOX_MARKER)
                .map(PathBuf::from)
                .unwrap_or(defaults.sandbox_marker),
            default_sandbox: non_empty(ENV_DEFAULT_SANDBOX)
                .map(PathBuf::from)
                .unwrap_or(defaults.default_sandbox),
        }
    }
}
