//! Sandbox placement policy: where a call is allowed to execute.

use chroot_runner::SandboxContext;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};
use crate::registry::{MethodDescriptor, ServiceDescriptor};

/// Declared constraint on where a service or method may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxAssertion {
    #[default]
    NoAssertion,
    /// Must run inside the sandbox; bridged when called from outside.
    Inside,
    /// Must run outside the sandbox; calling it from inside is fatal.
    Outside,
}

impl std::fmt::Display for SandboxAssertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxAssertion::NoAssertion => write!(f, "no_assertion"),
            SandboxAssertion::Inside => write!(f, "inside"),
            SandboxAssertion::Outside => write!(f, "outside"),
        }
    }
}

/// Where a call executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Run the handler in this process.
    Local,
    /// Re-invoke the call inside the sandbox.
    Bridge,
}

/// The method assertion when declared, else the service assertion.
pub fn effective_assertion(
    service: SandboxAssertion,
    method: Option<SandboxAssertion>,
) -> SandboxAssertion {
    method.unwrap_or(service)
}

/// Decide where a call runs.
///
/// Returns [`RouterError::MustRunOutsideSandbox`] when an `Outside` call is
/// made from inside the sandbox; that error is fatal for the process.
pub fn evaluate(
    service: &ServiceDescriptor,
    method: &MethodDescriptor,
    context: &dyn SandboxContext,
) -> Result<Placement> {
    match effective_assertion(service.sandbox(), method.sandbox()) {
        SandboxAssertion::Inside if !context.is_inside() => Ok(Placement::Bridge),
        SandboxAssertion::Outside if context.is_inside() => {
            Err(RouterError::MustRunOutsideSandbox {
                service: service.name().to_string(),
                method: method.name().to_string(),
            })
        }
        _ => Ok(Placement::Local),
    }
}
