//! Structured observability hooks for routed calls.
//!
//! This module provides:
//! - Call-scoped tracing spans via the `CallSpan` RAII guard
//! - Emission functions for the call lifecycle: start, bridge, finish, failure
//!
//! Events are emitted at `info!` level (failures at `warn!`).

use tracing::{info, warn};
use uuid::Uuid;

/// RAII guard that enters a call-scoped tracing span for the duration of a
/// `route` call.
///
/// # Example
///
/// ```ignore
/// let span = CallSpan::enter("chromite.api.ImageService", "Create");
/// // Every tracing call below carries call_id, service and method.
/// ```
pub struct CallSpan {
    call_id: String,
    _span: tracing::span::EnteredSpan,
}

impl CallSpan {
    /// Create and enter a span tagged with a fresh call id.
    pub fn enter(service: &str, method: &str) -> Self {
        let call_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "buildapi.call",
            call_id = %call_id,
            service = %service,
            method = %method,
        );
        Self {
            call_id,
            _span: span.entered(),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }
}

/// Emit event: call accepted for dispatch.
pub fn emit_call_started(call_id: &str, call_type: &dyn std::fmt::Display) {
    info!(event = "call.started", call_id = %call_id, call_type = %call_type);
}

/// Emit event: call re-invoked inside the sandbox.
pub fn emit_call_bridged(call_id: &str, sandbox_root: &std::path::Path) {
    info!(
        event = "call.bridged",
        call_id = %call_id,
        sandbox_root = %sandbox_root.display(),
    );
}

/// Emit event: call finished with its return code.
pub fn emit_call_finished(call_id: &str, duration_ms: u64, return_code: i32, bridged: bool) {
    info!(
        event = "call.finished",
        call_id = %call_id,
        duration_ms = duration_ms,
        return_code = return_code,
        bridged = bridged,
    );
}

/// Emit event: call failed before producing a return code.
pub fn emit_call_failed(call_id: &str, kind: &str, error: &dyn std::fmt::Display) {
    warn!(event = "call.failed", call_id = %call_id, kind = %kind, error = %error);
}
