//! Router error taxonomy.
//!
//! Every variant has a stable identifier ([`RouterError::kind`]) and a
//! distinct process exit code ([`RouterError::exit_code`]) so the CLI can
//! report each failure class separately. Nothing here is retried.

use std::path::PathBuf;

use chroot_runner::RunError;

use crate::field_handler::TranslateError;
use crate::message::MessageError;

/// Errors produced by registration and routing.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("service {service} does not declare an implementing module")]
    ControllerModuleNotDefined { service: String },

    #[error("unable to read input file {}: {source}", path.display())]
    InvalidInputFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unable to parse input file {}: {source}", path.display())]
    InvalidInputFormat { path: PathBuf, source: MessageError },

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("unknown method {method} on service {service}")]
    UnknownMethod { service: String, method: String },

    #[error("no controller registered for module {module} (service {service})")]
    ServiceControllerNotFound { service: String, module: String },

    #[error("controller module {module} has no handler named {name}")]
    MethodNotFound { module: String, name: String },

    #[error("{service}/{method} must be run outside the sandbox")]
    MustRunOutsideSandbox { service: String, method: String },

    #[error("unable to enter the sandbox: {source}")]
    SandboxEntryFailed { source: RunError },

    #[error("sandbox i/o failed at {}: {source}", path.display())]
    SandboxIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unable to parse the response produced inside the sandbox: {source}")]
    InvalidBridgedOutput { source: MessageError },

    #[error("path translation failed: {0}")]
    PathTranslation(#[from] TranslateError),

    #[error("unable to write output file {}: {source}", path.display())]
    InvalidOutputFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{service}/{method} failed: {source}")]
    Handler {
        service: String,
        method: String,
        source: anyhow::Error,
    },
}

impl RouterError {
    /// Stable identifier of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RouterError::ControllerModuleNotDefined { .. } => "controller_module_not_defined",
            RouterError::InvalidInputFile { .. } => "invalid_input_file",
            RouterError::InvalidInputFormat { .. } => "invalid_input_format",
            RouterError::UnknownService(_) => "unknown_service",
            RouterError::UnknownMethod { .. } => "unknown_method",
            RouterError::ServiceControllerNotFound { .. } => "service_controller_not_found",
            RouterError::MethodNotFound { .. } => "method_not_found",
            RouterError::MustRunOutsideSandbox { .. } => "must_run_outside_sandbox",
            RouterError::SandboxEntryFailed { .. } => "sandbox_entry_failed",
            RouterError::SandboxIo { .. } => "sandbox_io",
            RouterError::InvalidBridgedOutput { .. } => "invalid_bridged_output",
            RouterError::PathTranslation(_) => "path_translation",
            RouterError::InvalidOutputFile { .. } => "invalid_output_file",
            RouterError::Handler { .. } => "handler_failed",
        }
    }

    /// Process exit code for this kind. Kept clear of the 0..=3 handler
    /// return codes.
    pub fn exit_code(&self) -> u8 {
        match self {
            RouterError::InvalidInputFile { .. } => 65,
            RouterError::InvalidInputFormat { .. } => 66,
            RouterError::UnknownService(_) => 67,
            RouterError::UnknownMethod { .. } => 68,
            RouterError::ServiceControllerNotFound { .. } => 69,
            RouterError::MethodNotFound { .. } => 70,
            RouterError::ControllerModuleNotDefined { .. } => 71,
            RouterError::MustRunOutsideSandbox { .. } => 72,
            RouterError::SandboxEntryFailed { .. } => 73,
            RouterError::SandboxIo { .. } => 74,
            RouterError::InvalidBridgedOutput { .. } => 75,
            RouterError::PathTranslation(_) => 76,
            RouterError::InvalidOutputFile { .. } => 77,
            RouterError::Handler { .. } => 78,
        }
    }

    /// Errors that mean the process was started in the wrong environment.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RouterError::MustRunOutsideSandbox { .. } | RouterError::SandboxEntryFailed { .. }
        )
    }
}

/// Result type for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn all() -> Vec<RouterError> {
        let io = || std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let parse = || MessageError::NotAnObject {
            message: "m".into(),
        };
        vec![
            RouterError::ControllerModuleNotDefined { service: "s".into() },
            RouterError::InvalidInputFile {
                path: "in".into(),
                source: io(),
            },
            RouterError::InvalidInputFormat {
                path: "in".into(),
                source: parse(),
            },
            RouterError::UnknownService("s".into()),
            RouterError::UnknownMethod {
                service: "s".into(),
                method: "m".into(),
            },
            RouterError::ServiceControllerNotFound {
                service: "s".into(),
                module: "m".into(),
            },
            RouterError::MethodNotFound {
                module: "m".into(),
                name: "n".into(),
            },
            RouterError::MustRunOutsideSandbox {
                service: "s".into(),
                method: "m".into(),
            },
            RouterError::SandboxEntryFailed {
                source: RunError::EmptyCommand,
            },
            RouterError::SandboxIo {
                path: "p".into(),
                source: io(),
            },
            RouterError::InvalidBridgedOutput { source: parse() },
            RouterError::PathTranslation(TranslateError::Io(io())),
            RouterError::InvalidOutputFile {
                path: "out".into(),
                source: io(),
            },
            RouterError::Handler {
                service: "s".into(),
                method: "m".into(),
                source: anyhow::anyhow!("handler blew up"),
            },
        ]
    }

    #[test]
    fn test_kinds_and_exit_codes_are_distinct() {
        let errors = all();
        let kinds: HashSet<_> = errors.iter().map(|e| e.kind()).collect();
        let codes: HashSet<_> = errors.iter().map(|e| e.exit_code()).collect();
        assert_eq!(kinds.len(), errors.len());
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|c| *c > 3));
    }

    #[test]
    fn test_fatal_kinds() {
        let fatal: Vec<_> = all()
            .into_iter()
            .filter(|e| e.is_fatal())
            .map(|e| e.kind())
            .collect();
        assert_eq!(fatal, vec!["must_run_outside_sandbox", "sandbox_entry_failed"]);
    }

    #[test]
    fn test_display_includes_context() {
        let err = RouterError::UnknownMethod {
            service: "chromite.api.ImageService".into(),
            method: "Explode".into(),
        };
        assert!(err.to_string().contains("Explode"));

        let err = RouterError::InvalidInputFile {
            path: "/tmp/in.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("/tmp/in.json"));
    }
}
