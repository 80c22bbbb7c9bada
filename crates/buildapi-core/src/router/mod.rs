//! The router: registry lookup, placement policy, local dispatch and the
//! sandbox bridge behind one [`Router::route`] call.
//!
//! A `Router` is built once at startup, filled with service modules and
//! controllers, and then serves a single call per process.

mod bridge;

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::time::Instant;

use chroot_runner::{CommandRunner, MarkerFileContext, ProcessRunner, SandboxContext};
use tracing::debug;

use crate::config::{CallConfig, Settings};
use crate::controller::{Controller, ReturnCode};
use crate::error::{Result, RouterError};
use crate::field_handler::{CopyingTranslator, PathFieldTranslator};
use crate::message::{FsMessageStore, Message, MessageStore};
use crate::obs::{
    emit_call_bridged, emit_call_failed, emit_call_finished, emit_call_started, CallSpan,
};
use crate::policy::{self, Placement};
use crate::registry::{Registry, ServiceModule};

/// Dispatches `(service, method)` calls to registered controllers.
pub struct Router {
    registry: Registry,
    controllers: HashMap<String, Controller>,
    settings: Settings,
    store: Box<dyn MessageStore>,
    runner: Box<dyn ProcessRunner>,
    translator: Box<dyn PathFieldTranslator>,
    context: Box<dyn SandboxContext>,
}

impl Router {
    /// A router with filesystem, process and chroot collaborators derived
    /// from `settings`.
    pub fn new(settings: Settings) -> Self {
        Self {
            registry: Registry::default(),
            controllers: HashMap::new(),
            store: Box::new(FsMessageStore),
            runner: Box::new(CommandRunner::new(settings.enter_command.clone())),
            translator: Box::new(CopyingTranslator::new(settings.default_sandbox.clone())),
            context: Box::new(MarkerFileContext::new(settings.sandbox_marker.clone())),
            settings,
        }
    }

    pub fn with_store(mut self, store: impl MessageStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn with_runner(mut self, runner: impl ProcessRunner + 'static) -> Self {
        self.runner = Box::new(runner);
        self
    }

    pub fn with_translator(mut self, translator: impl PathFieldTranslator + 'static) -> Self {
        self.translator = Box::new(translator);
        self
    }

    pub fn with_context(mut self, context: impl SandboxContext + 'static) -> Self {
        self.context = Box::new(context);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register every service of `module`. See [`Registry::register`].
    pub fn register(&mut self, module: &ServiceModule) -> Result<()> {
        self.registry.register(module)
    }

    /// Install the controller implementing services whose module is `module`.
    /// Replaces any controller already installed under that name.
    pub fn register_controller(&mut self, module: impl Into<String>, controller: Controller) {
        let module = module.into();
        debug!(module = %module, handlers = controller.len(), "Registered controller");
        self.controllers.insert(module, controller);
    }

    /// Every `"<service>/<method>"`, sorted.
    pub fn list_methods(&self) -> Vec<String> {
        self.registry.list_methods()
    }

    /// Execute one call.
    ///
    /// Reads the request from `input_path` and writes the response to
    /// `output_path`. Returns the handler's return code (`None` normalized to
    /// [`ReturnCode::SUCCESS`]) or, for bridged calls, the exit code of the
    /// process that ran inside the sandbox.
    pub fn route(
        &self,
        service: &str,
        method: &str,
        input_path: &Path,
        output_path: &Path,
        config: &CallConfig,
    ) -> Result<i32> {
        let span = CallSpan::enter(service, method);
        emit_call_started(span.call_id(), &config.call_type);
        let started = Instant::now();

        match self.dispatch(span.call_id(), service, method, input_path, output_path, config) {
            Ok((code, bridged)) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                emit_call_finished(span.call_id(), duration_ms, code, bridged);
                Ok(code)
            }
            Err(err) => {
                emit_call_failed(span.call_id(), err.kind(), &err);
                Err(err)
            }
        }
    }

    /// Returns the result code and whether the call was bridged.
    fn dispatch(
        &self,
        call_id: &str,
        service: &str,
        method: &str,
        input_path: &Path,
        output_path: &Path,
        config: &CallConfig,
    ) -> Result<(i32, bool)> {
        let text = self
            .store
            .read_text(input_path)
            .map_err(|source| RouterError::InvalidInputFile {
                path: input_path.to_path_buf(),
                source,
            })?;

        let svc = self
            .registry
            .service(service)
            .ok_or_else(|| RouterError::UnknownService(service.to_string()))?;
        let descriptor = svc
            .method(method)
            .ok_or_else(|| RouterError::UnknownMethod {
                service: service.to_string(),
                method: method.to_string(),
            })?;

        let request = Message::parse(descriptor.input().clone(), &text).map_err(|source| {
            RouterError::InvalidInputFormat {
                path: input_path.to_path_buf(),
                source,
            }
        })?;
        let mut response = Message::new(descriptor.output().clone());

        if policy::evaluate(svc, descriptor, self.context.as_ref())? == Placement::Bridge {
            let sandbox = self.translator.extract_sandbox(&request)?;
            emit_call_bridged(call_id, sandbox.root());
            let code = self.bridge(svc, descriptor, request, sandbox, output_path, config)?;
            return Ok((code, true));
        }

        let implementation = descriptor.implementation_name();
        let controller = self.controllers.get(svc.module()).ok_or_else(|| {
            RouterError::ServiceControllerNotFound {
                service: svc.name().to_string(),
                module: svc.module().to_string(),
            }
        })?;
        let handler = controller
            .get(implementation)
            .ok_or_else(|| RouterError::MethodNotFound {
                module: svc.module().to_string(),
                name: implementation.to_string(),
            })?;

        debug!(module = %svc.module(), handler = %implementation, "Running handler locally");
        let code = handler
            .call(&request, &mut response, config)
            .map_err(|source| RouterError::Handler {
                service: svc.name().to_string(),
                method: descriptor.name().to_string(),
                source,
            })?
            .unwrap_or(ReturnCode::SUCCESS);

        self.write_response(&response, output_path)?;
        Ok((code, false))
    }

    fn write_response(&self, response: &Message, output_path: &Path) -> Result<()> {
        let output_err = |source| RouterError::InvalidOutputFile {
            path: output_path.to_path_buf(),
            source,
        };
        let text = response
            .to_json()
            .map_err(|e| output_err(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        self.store.write_text(output_path, &text).map_err(output_err)
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("registry", &self.registry)
            .field("controllers", &self.controllers)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
