//! Message schemas: declared fields and their annotations.

use std::sync::Arc;

/// Which way a path-valued field crosses the sandbox boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathRole {
    /// Host path copied into the sandbox before a bridged call.
    Input,
    /// Sandbox path copied back out after a bridged call.
    Output,
}

/// The kind of value a field holds.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// String, number or bool.
    Scalar,
    /// JSON array of any values.
    Repeated,
    /// Filesystem path (string) translated across the sandbox boundary.
    Path(PathRole),
    /// Host directory receiving output-path results of a bridged call.
    ResultDir,
    /// Sandbox descriptor object (`path`, `cache_dir`, `env`).
    Sandbox,
    /// JSON array of path strings, each translated like [`FieldKind::Path`].
    RepeatedPath(PathRole),
    /// Nested message.
    Message(Arc<MessageSchema>),
    /// JSON array of nested messages.
    RepeatedMessage(Arc<MessageSchema>),
}

/// A declared field of a message.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

/// Schema of a request or response message.
///
/// Built once at registration time and shared behind an `Arc` by every
/// message instance of that type.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSchema {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl MessageSchema {
    /// Create a schema with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Declare a field (builder pattern). Redeclaring a name replaces it.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        self.fields.retain(|f| f.name != name);
        self.fields.push(FieldDescriptor { name, kind });
        self
    }

    pub fn scalar(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Scalar)
    }

    pub fn repeated(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Repeated)
    }

    pub fn input_path(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Path(PathRole::Input))
    }

    pub fn output_path(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Path(PathRole::Output))
    }

    pub fn repeated_input_path(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::RepeatedPath(PathRole::Input))
    }

    pub fn repeated_output_path(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::RepeatedPath(PathRole::Output))
    }

    pub fn result_dir(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::ResultDir)
    }

    pub fn sandbox(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Sandbox)
    }

    pub fn message(self, name: impl Into<String>, schema: MessageSchema) -> Self {
        self.field(name, FieldKind::Message(Arc::new(schema)))
    }

    pub fn repeated_message(self, name: impl Into<String>, schema: MessageSchema) -> Self {
        self.field(name, FieldKind::RepeatedMessage(Arc::new(schema)))
    }

    /// Fully-qualified message name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Name of the top-level field carrying the sandbox descriptor.
    pub fn sandbox_field(&self) -> Option<&str> {
        self.first_of(|kind| matches!(kind, FieldKind::Sandbox))
    }

    /// Name of the top-level result directory field.
    pub fn result_dir_field(&self) -> Option<&str> {
        self.first_of(|kind| matches!(kind, FieldKind::ResultDir))
    }

    fn first_of(&self, pred: impl Fn(&FieldKind) -> bool) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| pred(&f.kind))
            .map(|f| f.name.as_str())
    }
}
