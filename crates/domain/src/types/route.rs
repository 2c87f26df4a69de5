//! Route metadata built from the API reference document.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::RESERVED_PARAMETER_NAMES;

/// HTTP verb of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpVerb {
    pub const ALL: [Self; 5] = [Self::Get, Self::Post, Self::Put, Self::Delete, Self::Patch];

    /// Parse a verb key as it appears in the reference document
    /// (case-insensitive). Returns `None` for non-verb keys such as
    /// `parameters` or `summary`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "get" => Some(Self::Get),
            "post" => Some(Self::Post),
            "put" => Some(Self::Put),
            "delete" => Some(Self::Delete),
            "patch" => Some(Self::Patch),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of verbs a caller wants to see when browsing routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerbFilter(BTreeSet<HttpVerb>);

impl VerbFilter {
    #[must_use]
    pub fn all() -> Self {
        Self(HttpVerb::ALL.into_iter().collect())
    }

    #[must_use]
    pub fn only(verbs: &[HttpVerb]) -> Self {
        Self(verbs.iter().copied().collect())
    }

    #[must_use]
    pub fn with(mut self, verb: HttpVerb) -> Self {
        self.0.insert(verb);
        self
    }

    #[must_use]
    pub fn allows(&self, verb: HttpVerb) -> bool {
        self.0.contains(&verb)
    }

    pub fn set(&mut self, verb: HttpVerb, enabled: bool) {
        if enabled {
            self.0.insert(verb);
        } else {
            self.0.remove(&verb);
        }
    }
}

impl Default for VerbFilter {
    fn default() -> Self {
        Self::only(&[HttpVerb::Get])
    }
}

/// Where a parameter travels in the outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    /// Locations the dispatcher does not send (e.g. `cookie`).
    Unsupported,
}

impl From<String> for ParameterLocation {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "path" => Self::Path,
            "query" => Self::Query,
            "header" => Self::Header,
            _ => Self::Unsupported,
        }
    }
}

impl From<ParameterLocation> for &'static str {
    fn from(value: ParameterLocation) -> Self {
        match value {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
            ParameterLocation::Unsupported => "unsupported",
        }
    }
}

/// Declared value type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum SchemaType {
    Integer,
    Number,
    Boolean,
    String,
    Array,
    Object,
    /// Unix timestamp in seconds.
    Epoch,
    Other,
}

impl From<String> for SchemaType {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "integer" => Self::Integer,
            "number" | "float" => Self::Number,
            "boolean" => Self::Boolean,
            "string" => Self::String,
            "array" => Self::Array,
            "object" => Self::Object,
            "epoch" => Self::Epoch,
            _ => Self::Other,
        }
    }
}

impl From<SchemaType> for &'static str {
    fn from(value: SchemaType) -> Self {
        match value {
            SchemaType::Integer => "integer",
            SchemaType::Number => "number",
            SchemaType::Boolean => "boolean",
            SchemaType::String => "string",
            SchemaType::Array => "array",
            SchemaType::Object => "object",
            SchemaType::Epoch => "epoch",
            SchemaType::Other => "other",
        }
    }
}

/// Constraints attached to a parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SchemaType>,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Element schema for arrays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ParameterSchema>>,
}

/// One declared route parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,

    #[serde(rename = "in")]
    pub location: ParameterLocation,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub schema: ParameterSchema,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParameterSpec {
    /// True for names used internally by the dispatch layer.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        RESERVED_PARAMETER_NAMES.contains(&self.name.as_str())
    }
}

/// A callable route: operation id, URL template, verb and parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDescriptor {
    /// Operation id, e.g. `getShop`.
    pub name: String,

    /// Path with `{param}` placeholders, e.g. `/v3/application/shops/{shop_id}`.
    pub url_template: String,

    pub verb: HttpVerb,

    pub parameters: Vec<ParameterSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl RouteDescriptor {
    /// Parameters a caller may bind, in document order. Plumbing names are
    /// stripped.
    pub fn invocable_parameters(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.parameters.iter().filter(|param| !param.is_reserved())
    }

    #[must_use]
    pub fn parameter_names(&self) -> BTreeSet<&str> {
        self.invocable_parameters().map(|param| param.name.as_str()).collect()
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.invocable_parameters().find(|param| param.name == name)
    }

    /// Whether the route declares a parameter with this name.
    #[must_use]
    pub fn accepts(&self, name: &str) -> bool {
        self.parameter(name).is_some()
    }

    pub fn required_parameters(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.invocable_parameters().filter(|param| param.required)
    }
}
