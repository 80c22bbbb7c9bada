//! Built-in services describing the Build API itself.
//!
//! `buildapi.MethodService/Get` lists every registered method and
//! `buildapi.VersionService/Get` reports the API version. Both run wherever
//! they are called.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::CallConfig;
use crate::controller::{Controller, HandlerResult};
use crate::message::{Message, MessageSchema};
use crate::registry::{MethodSpec, ServiceModule, ServiceSpec};
use crate::validate;

/// Controller module name of the built-in services.
pub const MODULE: &str = "api";

pub const METHOD_SERVICE: &str = "buildapi.MethodService";
pub const VERSION_SERVICE: &str = "buildapi.VersionService";

/// API version reported by `VersionService/Get`.
pub const VERSION: ApiVersion = ApiVersion {
    major: 1,
    minor: 0,
    bug: 0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
    pub bug: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub method: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MethodGetResponse {
    methods: Vec<MethodInfo>,
}

/// Registration for the built-in services.
pub fn service_module() -> ServiceModule {
    let empty = Arc::new(MessageSchema::new("buildapi.GetRequest"));
    let methods = Arc::new(MessageSchema::new("buildapi.MethodGetResponse").repeated("methods"));
    let version = Arc::new(
        MessageSchema::new("buildapi.VersionGetResponse")
            .scalar("major")
            .scalar("minor")
            .scalar("bug"),
    );

    ServiceModule::new(MODULE)
        .service(
            ServiceSpec::new(METHOD_SERVICE)
                .module(MODULE)
                .method(
                    MethodSpec::new("Get", empty.clone(), methods)
                        .implementation_name("GetMethods"),
                ),
        )
        .service(
            ServiceSpec::new(VERSION_SERVICE)
                .module(MODULE)
                .method(MethodSpec::new("Get", empty, version).implementation_name("GetVersion")),
        )
}

/// Controller for the built-in services. `methods` is what `MethodService/Get`
/// reports, normally [`crate::Router::list_methods`] after all registration.
pub fn controller(methods: Vec<String>) -> Controller {
    let methods: Vec<MethodInfo> = methods
        .into_iter()
        .map(|method| MethodInfo { method })
        .collect();

    Controller::new()
        .handler(
            "GetMethods",
            move |_: &Message, response: &mut Message, config: &CallConfig| -> HandlerResult {
                if validate::validation_complete(config) {
                    return Ok(None);
                }
                if let Some(code) = validate::mock_result(config) {
                    return Ok(Some(code));
                }
                response.encode(&MethodGetResponse {
                    methods: methods.clone(),
                })?;
                Ok(None)
            },
        )
        .handler("GetVersion", get_version)
}

fn get_version(_: &Message, response: &mut Message, config: &CallConfig) -> HandlerResult {
    if validate::validation_complete(config) {
        return Ok(None);
    }
    if let Some(code) = validate::mock_result(config) {
        return Ok(Some(code));
    }
    response.encode(&VERSION)?;
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CallType;
    use crate::registry::Registry;
    use serde_json::json;

    fn call(name: &str, config: CallConfig) -> (Option<i32>, Message) {
        let mut registry = Registry::default();
        registry.register(&service_module()).unwrap();
        let service = if name == "GetMethods" {
            METHOD_SERVICE
        } else {
            VERSION_SERVICE
        };
        let method = registry.service(service).unwrap().method("Get").unwrap();

        let request = Message::new(method.input().clone());
        let mut response = Message::new(method.output().clone());
        let controller = controller(registry.list_methods());
        let code = controller
            .get(name)
            .unwrap()
            .call(&request, &mut response, &config)
            .unwrap();
        (code, response)
    }

    #[test]
    fn test_method_service_lists_itself() {
        let (code, response) = call("GetMethods", CallConfig::default());
        assert_eq!(code, None);
        assert_eq!(
            response.get("methods"),
            Some(&json!([
                {"method": "buildapi.MethodService/Get"},
                {"method": "buildapi.VersionService/Get"}
            ]))
        );
    }

    #[test]
    fn test_version_service() {
        let (code, response) = call("GetVersion", CallConfig::default());
        assert_eq!(code, None);
        let version: ApiVersion = response.decode().unwrap();
        assert_eq!(version, VERSION);
    }

    #[test]
    fn test_validate_only_and_mocks() {
        let (code, response) = call("GetVersion", CallConfig::new(CallType::ValidateOnly));
        assert_eq!(code, None);
        assert!(response.is_empty());

        let (code, response) = call("GetMethods", CallConfig::new(CallType::MockFailure));
        assert_eq!(code, Some(1));
        assert!(response.is_empty());
    }
}
