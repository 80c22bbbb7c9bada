//! Controllers: the handler tables that implement registered services.
//!
//! A service's options name a controller module; the router looks that name
//! up among the controllers registered with it and then resolves the
//! method's implementation name to a [`Handler`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::CallConfig;
use crate::message::Message;

/// Return codes shared by handlers and the CLI.
pub struct ReturnCode;

impl ReturnCode {
    pub const SUCCESS: i32 = 0;
    /// The call failed but the response holds details.
    pub const UNSUCCESSFUL_RESPONSE_AVAILABLE: i32 = 1;
    pub const COMPLETED_UNSUCCESSFULLY: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
}

/// Result of a handler: `None` means [`ReturnCode::SUCCESS`].
pub type HandlerResult = anyhow::Result<Option<i32>>;

/// Implementation of one method.
pub trait Handler: Send + Sync {
    fn call(&self, request: &Message, response: &mut Message, config: &CallConfig)
        -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(&Message, &mut Message, &CallConfig) -> HandlerResult + Send + Sync,
{
    fn call(
        &self,
        request: &Message,
        response: &mut Message,
        config: &CallConfig,
    ) -> HandlerResult {
        self(request, response, config)
    }
}

/// Handlers of one controller module, keyed by implementation name.
#[derive(Clone, Default)]
pub struct Controller {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler function (builder pattern).
    pub fn handler<F>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Message, &mut Message, &CallConfig) -> HandlerResult + Send + Sync + 'static,
    {
        self.with_handler(name, Arc::new(handler))
    }

    /// Add a handler object (builder pattern).
    pub fn with_handler(mut self, name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("Controller").field("handlers", &names).finish()
    }
}
