//! Schema-driven request and response messages.
//!
//! A [`Message`] is a JSON object conforming to a [`MessageSchema`]. The
//! canonical text encoding is pretty-printed JSON; `parse(to_json(m)) == m`
//! for every message. Request payloads are parsed leniently (unknown fields
//! are dropped) so an older router accepts payloads from a newer schema.

pub mod schema;
pub mod store;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

pub use schema::{FieldDescriptor, FieldKind, MessageSchema, PathRole};
pub use store::{FsMessageStore, MessageStore};

/// Errors from parsing or encoding messages.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{message} payload is not a json object")]
    NotAnObject { message: String },

    #[error("{message} has no field named {field}")]
    UnknownField { message: String, field: String },

    #[error("{message}.{field} must be {expected}")]
    FieldType {
        message: String,
        field: String,
        expected: &'static str,
    },
}

/// Result type for message operations.
pub type Result<T> = std::result::Result<T, MessageError>;

/// An instance of a request or response schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    schema: Arc<MessageSchema>,
    fields: Map<String, Value>,
}

impl Message {
    /// The zero value of `schema` (no fields set).
    pub fn new(schema: Arc<MessageSchema>) -> Self {
        Self {
            schema,
            fields: Map::new(),
        }
    }

    /// Parse a payload, dropping fields the schema does not declare.
    pub fn parse(schema: Arc<MessageSchema>, text: &str) -> Result<Self> {
        Self::parse_with(schema, text, true)
    }

    /// Parse a payload, rejecting undeclared fields.
    pub fn parse_strict(schema: Arc<MessageSchema>, text: &str) -> Result<Self> {
        Self::parse_with(schema, text, false)
    }

    fn parse_with(schema: Arc<MessageSchema>, text: &str, tolerate_unknown: bool) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let fields = conform(&schema, value, tolerate_unknown)?;
        Ok(Self { schema, fields })
    }

    /// Canonical text encoding.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.fields)?)
    }

    pub fn schema(&self) -> &Arc<MessageSchema> {
        &self.schema
    }

    /// `true` when no field is set.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Top-level field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Set a top-level field.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
    }

    /// Unset a top-level field.
    pub fn clear(&mut self, name: &str) {
        self.fields.remove(name);
    }

    /// Value at a field path through nested messages. A numeric segment
    /// indexes into a repeated field.
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.fields.get(first.as_ref())?, |value, segment| {
                child(value, segment.as_ref())
            })
    }

    /// String value at a field path, if set and non-empty.
    pub fn lookup_str<S: AsRef<str>>(&self, path: &[S]) -> Option<&str> {
        self.lookup(path)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Value at a dotted field path (`"sysroot.build_target.name"`).
    pub fn field(&self, dotted: &str) -> Option<&Value> {
        let path: Vec<&str> = dotted.split('.').collect();
        self.lookup(&path)
    }

    /// Set the value at a field path, creating intermediate messages.
    /// Elements of repeated fields are only replaced, never appended.
    pub fn set_at<S: AsRef<str>>(&mut self, path: &[S], value: impl Into<Value>) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let Some((first, rest)) = parents.split_first() else {
            self.fields.insert(last.as_ref().to_string(), value.into());
            return;
        };
        let mut cursor = self
            .fields
            .entry(first.as_ref().to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        for segment in rest {
            match child_or_insert(cursor, segment.as_ref()) {
                Some(next) => cursor = next,
                None => return,
            }
        }
        match cursor {
            Value::Array(items) => {
                if let Some(slot) = index(last.as_ref()).and_then(|i| items.get_mut(i)) {
                    *slot = value.into();
                }
            }
            Value::Object(map) => {
                map.insert(last.as_ref().to_string(), value.into());
            }
            other => {
                let mut map = Map::new();
                map.insert(last.as_ref().to_string(), value.into());
                *other = Value::Object(map);
            }
        }
    }

    /// Unset the field at a field path. Elements of repeated fields are
    /// left in place.
    pub fn remove_at<S: AsRef<str>>(&mut self, path: &[S]) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let Some((first, rest)) = parents.split_first() else {
            self.fields.remove(last.as_ref());
            return;
        };
        let Some(mut cursor) = self.fields.get_mut(first.as_ref()) else {
            return;
        };
        for segment in rest {
            match child_mut(cursor, segment.as_ref()) {
                Some(next) => cursor = next,
                None => return,
            }
        }
        if let Value::Object(map) = cursor {
            map.remove(last.as_ref());
        }
    }

    /// Concrete locations of every set path field with `role`, expanding
    /// repeated fields into one location per non-empty element.
    pub fn path_locations(&self, role: PathRole) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        collect_locations(&self.schema, &self.fields, role, &mut Vec::new(), &mut out);
        out
    }

    /// Deserialize the message body into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }

    /// Replace the message body with a typed value, checked against the schema.
    pub fn encode<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.fields = conform(&self.schema, value, false)?;
        Ok(())
    }
}

fn index(segment: &str) -> Option<usize> {
    segment.parse().ok()
}

fn child<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => items.get(index(segment)?),
        _ => None,
    }
}

fn child_mut<'v>(value: &'v mut Value, segment: &str) -> Option<&'v mut Value> {
    match value {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => items.get_mut(index(segment)?),
        _ => None,
    }
}

fn child_or_insert<'v>(value: &'v mut Value, segment: &str) -> Option<&'v mut Value> {
    let insert = |map: &'v mut Map<String, Value>| {
        map.entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()))
    };
    match value {
        Value::Array(items) => items.get_mut(index(segment)?),
        Value::Object(map) => Some(insert(map)),
        other => {
            *other = Value::Object(Map::new());
            other.as_object_mut().map(insert)
        }
    }
}

fn collect_locations(
    schema: &MessageSchema,
    fields: &Map<String, Value>,
    role: PathRole,
    prefix: &mut Vec<String>,
    out: &mut Vec<Vec<String>>,
) {
    let is_set = |value: &Value| value.as_str().is_some_and(|s| !s.is_empty());
    for field in schema.fields() {
        let Some(value) = fields.get(&field.name) else {
            continue;
        };
        prefix.push(field.name.clone());
        match &field.kind {
            FieldKind::Path(r) if *r == role && is_set(value) => out.push(prefix.clone()),
            FieldKind::RepeatedPath(r) if *r == role => {
                for (i, item) in value.as_array().into_iter().flatten().enumerate() {
                    if is_set(item) {
                        let mut location = prefix.clone();
                        location.push(i.to_string());
                        out.push(location);
                    }
                }
            }
            FieldKind::Message(nested) => {
                if let Some(map) = value.as_object() {
                    collect_locations(nested, map, role, prefix, out);
                }
            }
            FieldKind::RepeatedMessage(nested) => {
                for (i, item) in value.as_array().into_iter().flatten().enumerate() {
                    if let Some(map) = item.as_object() {
                        prefix.push(i.to_string());
                        collect_locations(nested, map, role, prefix, out);
                        prefix.pop();
                    }
                }
            }
            _ => {}
        }
        prefix.pop();
    }
}

fn conform(
    schema: &MessageSchema,
    value: Value,
    tolerate_unknown: bool,
) -> Result<Map<String, Value>> {
    let Value::Object(map) = value else {
        return Err(MessageError::NotAnObject {
            message: schema.name().to_string(),
        });
    };

    let mut out = Map::new();
    for (key, value) in map {
        if value.is_null() {
            continue;
        }
        let Some(field) = schema.get(&key) else {
            if tolerate_unknown {
                debug!(message = schema.name(), field = %key, "Dropping unknown field");
                continue;
            }
            return Err(MessageError::UnknownField {
                message: schema.name().to_string(),
                field: key,
            });
        };

        let type_error = |expected| MessageError::FieldType {
            message: schema.name().to_string(),
            field: key.clone(),
            expected,
        };
        let value = match &field.kind {
            FieldKind::Scalar if value.is_object() || value.is_array() => {
                return Err(type_error("a scalar"))
            }
            FieldKind::Repeated if !value.is_array() => return Err(type_error("an array")),
            FieldKind::Path(_) | FieldKind::ResultDir if !value.is_string() => {
                return Err(type_error("a path string"))
            }
            FieldKind::Sandbox if !value.is_object() => return Err(type_error("an object")),
            FieldKind::Message(nested) => Value::Object(conform(nested, value, tolerate_unknown)?),
            FieldKind::RepeatedPath(_) => match value {
                Value::Array(items) if items.iter().all(Value::is_string) => Value::Array(items),
                _ => return Err(type_error("an array of path strings")),
            },
            FieldKind::RepeatedMessage(nested) => match value {
                Value::Array(items) => Value::Array(
                    items
                        .into_iter()
                        .map(|item| conform(nested, item, tolerate_unknown).map(Value::Object))
                        .collect::<Result<_>>()?,
                ),
                _ => return Err(type_error("an array of messages")),
            },
            _ => value,
        };
        out.insert(key, value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn schema() -> Arc<MessageSchema> {
        Arc::new(
            MessageSchema::new("test.Request")
                .scalar("name")
                .scalar("count")
                .repeated("tags")
                .input_path("source")
                .sandbox("chroot")
                .message(
                    "target",
                    MessageSchema::new("test.Target").scalar("board").input_path("image"),
                ),
        )
    }

    #[test]
    fn test_roundtrip_preserves_fields() {
        let text = json!({
            "name": "eve",
            "count": 3,
            "tags": ["a", "b"],
            "source": "/host/data.txt",
            "chroot": {"path": "/sandbox"},
            "target": {"board": "eve", "image": "/img.bin"}
        })
        .to_string();
        let msg = Message::parse(schema(), &text).unwrap();
        let back = Message::parse(schema(), &msg.to_json().unwrap()).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn test_lenient_parse_drops_unknown_fields() {
        let text = json!({"name": "eve", "added_in_newer_schema": true}).to_string();
        let msg = Message::parse(schema(), &text).unwrap();
        assert_eq!(msg.get("name"), Some(&json!("eve")));
        assert!(msg.get("added_in_newer_schema").is_none());
    }

    #[test]
    fn test_lenient_parse_drops_unknown_nested_fields() {
        let text = json!({"target": {"board": "eve", "extra": 1}}).to_string();
        let msg = Message::parse(schema(), &text).unwrap();
        assert_eq!(msg.field("target.board"), Some(&json!("eve")));
        assert!(msg.field("target.extra").is_none());
    }

    #[test]
    fn test_strict_parse_rejects_unknown_fields() {
        let text = json!({"name": "eve", "bogus": 1}).to_string();
        let err = Message::parse_strict(schema(), &text).unwrap_err();
        match err {
            MessageError::UnknownField { field, .. } => assert_eq!(field, "bogus"),
            other => panic!("expected UnknownField, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_payload() {
        assert!(matches!(
            Message::parse(schema(), "{not json").unwrap_err(),
            MessageError::Json(_)
        ));
        assert!(matches!(
            Message::parse(schema(), "[1, 2]").unwrap_err(),
            MessageError::NotAnObject { .. }
        ));
    }

    #[test]
    fn test_field_type_checked() {
        let text = json!({"source": 42}).to_string();
        let err = Message::parse(schema(), &text).unwrap_err();
        assert!(err.to_string().contains("test.Request.source"));
    }

    #[test]
    fn test_null_is_unset() {
        let msg = Message::parse(schema(), r#"{"name": null}"#).unwrap();
        assert!(msg.is_empty());
    }

    #[test]
    fn test_set_at_creates_intermediates() {
        let mut msg = Message::new(schema());
        msg.set_at(&["target", "image"], "/x.bin");
        assert_eq!(msg.lookup_str(&["target", "image"]), Some("/x.bin"));
        assert_eq!(msg.lookup(&["target", "board"]), None);
    }

    #[test]
    fn test_lookup_str_ignores_empty() {
        let mut msg = Message::new(schema());
        msg.set("source", "");
        assert_eq!(msg.lookup_str(&["source"]), None);
    }

    #[test]
    fn test_typed_decode_encode() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Request {
            name: String,
            #[serde(default)]
            tags: Vec<String>,
        }

        let mut msg = Message::new(schema());
        msg.encode(&Request {
            name: "eve".into(),
            tags: vec!["x".into()],
        })
        .unwrap();
        assert_eq!(msg.get("tags"), Some(&json!(["x"])));

        let back: Request = msg.decode().unwrap();
        assert_eq!(back.name, "eve");
    }

    #[test]
    fn test_encode_rejects_undeclared_fields() {
        #[derive(Serialize)]
        struct Wrong {
            nope: u32,
        }
        let mut msg = Message::new(schema());
        assert!(msg.encode(&Wrong { nope: 1 }).is_err());
    }

    fn bundle_schema() -> Arc<MessageSchema> {
        Arc::new(
            MessageSchema::new("test.BundleRequest")
                .input_path("source")
                .output_path("artifact")
                .repeated_input_path("extras")
                .message("sysroot", MessageSchema::new("test.Sysroot").input_path("path"))
                .repeated_message(
                    "packages",
                    MessageSchema::new("test.Package")
                        .scalar("name")
                        .input_path("ebuild"),
                ),
        )
    }

    #[test]
    fn test_path_locations_expand_repeated_fields() {
        let text = json!({
            "source": "/host/data.txt",
            "artifact": "/out.bin",
            "extras": ["/host/a.txt", "", "/host/b.txt"],
            "sysroot": {"path": "/build/eve"},
            "packages": [
                {"name": "chromeos-base/foo", "ebuild": "/host/foo.ebuild"},
                {"name": "chromeos-base/bar"}
            ]
        })
        .to_string();
        let msg = Message::parse(bundle_schema(), &text).unwrap();

        let inputs = msg.path_locations(PathRole::Input);
        let dotted: Vec<String> = inputs.iter().map(|p| p.join(".")).collect();
        assert_eq!(
            dotted,
            vec!["source", "extras.0", "extras.2", "sysroot.path", "packages.0.ebuild"]
        );
        for location in &inputs {
            assert!(msg.lookup_str(location).is_some());
        }
        assert_eq!(msg.path_locations(PathRole::Output), vec![vec!["artifact".to_string()]]);
    }

    #[test]
    fn test_array_elements_addressable() {
        let text = json!({
            "extras": ["/a", "/b"],
            "packages": [{"name": "foo", "ebuild": "/foo.ebuild"}]
        })
        .to_string();
        let mut msg = Message::parse(bundle_schema(), &text).unwrap();

        assert_eq!(msg.field("extras.1"), Some(&json!("/b")));
        assert_eq!(msg.lookup_str(&["packages", "0", "ebuild"]), Some("/foo.ebuild"));
        assert_eq!(msg.lookup(&["extras", "5"]), None);

        msg.set_at(&["extras", "1"], "/tmp/b");
        msg.set_at(&["packages", "0", "ebuild"], "/tmp/foo.ebuild");
        // Out-of-range elements are not appended.
        msg.set_at(&["extras", "9"], "/nope");
        assert_eq!(msg.get("extras"), Some(&json!(["/a", "/tmp/b"])));
        assert_eq!(msg.field("packages.0.ebuild"), Some(&json!("/tmp/foo.ebuild")));

        msg.remove_at(&["packages", "0", "ebuild"]);
        assert_eq!(msg.get("packages"), Some(&json!([{"name": "foo"}])));
    }

    #[test]
    fn test_repeated_kinds_type_checked() {
        let err = Message::parse(bundle_schema(), r#"{"extras": "/a"}"#).unwrap_err();
        assert!(err.to_string().contains("array of path strings"));

        let err = Message::parse(bundle_schema(), r#"{"extras": ["/a", 3]}"#).unwrap_err();
        assert!(matches!(err, MessageError::FieldType { .. }));

        let text = json!({"packages": [{"name": "foo", "ebuild": 7}]}).to_string();
        let err = Message::parse(bundle_schema(), &text).unwrap_err();
        assert!(err.to_string().contains("test.Package.ebuild"));

        let text = json!({"packages": [{"name": "foo", "bogus": 1}]}).to_string();
        assert!(Message::parse_strict(bundle_schema(), &text).is_err());
        let msg = Message::parse(bundle_schema(), &text).unwrap();
        assert_eq!(msg.get("packages"), Some(&json!([{"name": "foo"}])));
    }
}
