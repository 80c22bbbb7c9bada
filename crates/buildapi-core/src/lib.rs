//! Build API core library
//!
//! Routes `(service, method)` calls to registered controllers, either in the
//! current process or by re-invoking the call inside the SDK chroot.
//!
//! - [`registry`]: service modules, descriptors and the method registry
//! - [`policy`]: sandbox placement decisions
//! - [`router`]: local dispatch and the sandbox bridge
//! - [`field_handler`]: path-field translation across the sandbox boundary
//! - [`message`]: schema-driven JSON messages and their storage
//! - [`api`]: built-in method listing and version services

pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod field_handler;
pub mod message;
pub mod obs;
pub mod policy;
pub mod registry;
pub mod router;
pub mod telemetry;
pub mod validate;

pub use config::{CallConfig, CallType, Settings};
pub use controller::{Controller, Handler, HandlerResult, ReturnCode};
pub use error::{Result, RouterError};
pub use field_handler::{
    CopyingTranslator, PathFieldTranslator, PathsIn, SandboxDescriptor, TranslateError,
};
pub use message::{
    FieldKind, FsMessageStore, Message, MessageError, MessageSchema, MessageStore, PathRole,
};
pub use policy::{Placement, SandboxAssertion};
pub use registry::{
    MethodDescriptor, MethodOptions, MethodSpec, Registry, ServiceDescriptor, ServiceModule,
    ServiceOptions, ServiceSpec,
};
pub use router::Router;
pub use validate::ValidationError;

pub use chroot_runner::{
    CommandRunner, FixedContext, Invocation, MarkerFileContext, ProcessRunner, RunError,
    SandboxContext,
};
