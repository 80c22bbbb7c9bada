//! Service and method registry.
//!
//! Service modules describe their services with plain option structs
//! ([`ServiceOptions`], [`MethodOptions`]); [`Registry::register`] turns
//! them into immutable descriptors keyed by fully-qualified service name.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, RouterError};
use crate::message::MessageSchema;
use crate::policy::SandboxAssertion;

/// Options declared on a service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceOptions {
    /// Name of the controller module implementing the service.
    pub module: Option<String>,
    pub sandbox: SandboxAssertion,
}

/// Options declared on a method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodOptions {
    /// Overrides the service assertion when set.
    pub sandbox: Option<SandboxAssertion>,
    /// Handler name to look up instead of the method name.
    pub implementation_name: Option<String>,
}

/// Declaration of one method.
#[derive(Debug, Clone)]
pub struct MethodSpec {
    pub name: String,
    pub input: Arc<MessageSchema>,
    pub output: Arc<MessageSchema>,
    pub options: MethodOptions,
}

impl MethodSpec {
    pub fn new(
        name: impl Into<String>,
        input: Arc<MessageSchema>,
        output: Arc<MessageSchema>,
    ) -> Self {
        Self {
            name: name.into(),
            input,
            output,
            options: MethodOptions::default(),
        }
    }

    pub fn sandbox(mut self, assertion: SandboxAssertion) -> Self {
        self.options.sandbox = Some(assertion);
        self
    }

    pub fn implementation_name(mut self, name: impl Into<String>) -> Self {
        self.options.implementation_name = Some(name.into());
        self
    }
}

/// Declaration of one service.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub options: ServiceOptions,
    pub methods: Vec<MethodSpec>,
}

impl ServiceSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: ServiceOptions::default(),
            methods: Vec::new(),
        }
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.options.module = Some(module.into());
        self
    }

    pub fn sandbox(mut self, assertion: SandboxAssertion) -> Self {
        self.options.sandbox = assertion;
        self
    }

    pub fn method(mut self, method: MethodSpec) -> Self {
        self.methods.push(method);
        self
    }
}

/// A schema module exposing one or more services.
#[derive(Debug, Clone)]
pub struct ServiceModule {
    pub name: String,
    pub services: Vec<ServiceSpec>,
}

impl ServiceModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            services: Vec::new(),
        }
    }

    pub fn service(mut self, service: ServiceSpec) -> Self {
        self.services.push(service);
        self
    }
}

/// A registered method.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    service: String,
    name: String,
    input: Arc<MessageSchema>,
    output: Arc<MessageSchema>,
    sandbox: Option<SandboxAssertion>,
    implementation_name: Option<String>,
}

impl MethodDescriptor {
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input(&self) -> &Arc<MessageSchema> {
        &self.input
    }

    pub fn output(&self) -> &Arc<MessageSchema> {
        &self.output
    }

    pub fn sandbox(&self) -> Option<SandboxAssertion> {
        self.sandbox
    }

    /// Handler name to resolve: the override when declared, else the method name.
    pub fn implementation_name(&self) -> &str {
        self.implementation_name.as_deref().unwrap_or(&self.name)
    }
}

/// A registered service.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    name: String,
    module: String,
    sandbox: SandboxAssertion,
    methods: Vec<MethodDescriptor>,
}

impl ServiceDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Controller module implementing this service.
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn sandbox(&self) -> SandboxAssertion {
        self.sandbox
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    fn from_spec(spec: &ServiceSpec) -> Result<Self> {
        let module = spec
            .options
            .module
            .clone()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| RouterError::ControllerModuleNotDefined {
                service: spec.name.clone(),
            })?;

        let methods = spec
            .methods
            .iter()
            .map(|m| MethodDescriptor {
                service: spec.name.clone(),
                name: m.name.clone(),
                input: m.input.clone(),
                output: m.output.clone(),
                sandbox: m.options.sandbox,
                implementation_name: m.options.implementation_name.clone(),
            })
            .collect();

        Ok(Self {
            name: spec.name.clone(),
            module,
            sandbox: spec.options.sandbox,
            methods,
        })
    }
}

/// Fully-qualified service name → descriptor.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    services: HashMap<String, ServiceDescriptor>,
}

impl Registry {
    /// Register every service of `module`.
    ///
    /// Fails with [`RouterError::ControllerModuleNotDefined`] when any service
    /// lacks an implementing module; nothing from `module` is registered then.
    /// Re-registering a service name overwrites the previous descriptor.
    pub fn register(&mut self, module: &ServiceModule) -> Result<()> {
        let descriptors = module
            .services
            .iter()
            .map(ServiceDescriptor::from_spec)
            .collect::<Result<Vec<_>>>()?;

        for descriptor in descriptors {
            debug!(
                module = %module.name,
                service = %descriptor.name,
                methods = descriptor.methods.len(),
                "Registered service"
            );
            self.services.insert(descriptor.name.clone(), descriptor);
        }
        Ok(())
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.get(name)
    }

    /// Every `"<service>/<method>"`, sorted.
    pub fn list_methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self
            .services
            .values()
            .flat_map(|svc| {
                svc.methods
                    .iter()
                    .map(move |m| format!("{}/{}", svc.name, m.name))
            })
            .collect();
        methods.sort();
        methods
    }
}
