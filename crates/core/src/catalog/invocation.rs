//! Turning a route plus bound arguments into a concrete request.
//!
//! One generic [`prepare`] replaces per-operation generated functions: it
//! checks the arguments against the route's parameter specs, substitutes
//! path placeholders and sorts the rest into query and header lists.
//! Nothing here touches the network; a request that fails validation is
//! never sent.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use marketlens_domain::{
    HttpVerb, MarketLensError, ParameterLocation, ParameterSchema, ParameterSpec, Result,
    RouteDescriptor, SchemaType,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Wire rendering of one argument value.
///
/// Strings go out verbatim, scalars in their JSON spelling, arrays as a
/// comma-separated list and objects as compact JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamValue(Value);

impl ParamValue {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for ParamValue {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            Value::Null => Ok(()),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", ParamValue(item.clone()))?;
                }
                Ok(())
            }
            other => write!(f, "{other}"),
        }
    }
}

/// Caller-supplied arguments keyed by parameter name.
///
/// A `null` value counts as unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundArguments(BTreeMap<String, Value>);

impl BoundArguments {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|value| !value.is_null())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for BoundArguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<serde_json::Map<String, Value>> for BoundArguments {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        Self(map.into_iter().collect())
    }
}

/// A fully resolved request, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedRequest {
    pub route_name: String,
    pub verb: HttpVerb,
    /// URL template with every placeholder substituted and encoded.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl PreparedRequest {
    #[must_use]
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

/// Validate `args` against `route` and assemble the request.
///
/// Reserved plumbing names (`path`, `method`, `self`) are dropped.
///
/// # Errors
/// Returns `Validation` when a required argument is missing, an argument is
/// not declared by the route, a value violates its schema, or a URL
/// placeholder cannot be filled.
pub fn prepare(route: &RouteDescriptor, args: &BoundArguments) -> Result<PreparedRequest> {
    for (name, _) in args.iter() {
        if marketlens_domain::constants::RESERVED_PARAMETER_NAMES.contains(&name.as_str()) {
            continue;
        }
        if !route.accepts(name) {
            return Err(MarketLensError::Validation(format!(
                "{} does not take an argument named `{name}`",
                route.name
            )));
        }
    }

    let mut path_values: HashMap<&str, String> = HashMap::new();
    let mut query = Vec::new();
    let mut headers = Vec::new();

    for spec in route.invocable_parameters() {
        let Some(value) = args.get(&spec.name) else {
            if spec.required {
                return Err(MarketLensError::Validation(format!(
                    "{} requires argument `{}`",
                    route.name, spec.name
                )));
            }
            continue;
        };

        check_value(&route.name, spec, &spec.schema, value)?;
        let rendered = ParamValue::from(value.clone()).to_string();

        match spec.location {
            ParameterLocation::Path => {
                path_values.insert(spec.name.as_str(), rendered);
            }
            ParameterLocation::Query => query.push((spec.name.clone(), rendered)),
            ParameterLocation::Header => headers.push((spec.name.clone(), rendered)),
            ParameterLocation::Unsupported => {
                warn!(
                    route = %route.name,
                    parameter = %spec.name,
                    "catalog.parameter_location_unsupported"
                );
            }
        }
    }

    let path = substitute_placeholders(route, &path_values)?;

    Ok(PreparedRequest { route_name: route.name.clone(), verb: route.verb, path, query, headers })
}

fn substitute_placeholders(
    route: &RouteDescriptor,
    values: &HashMap<&str, String>,
) -> Result<String> {
    let template = route.url_template.as_str();
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            return Err(MarketLensError::Validation(format!(
                "{}: unbalanced placeholder in {template}",
                route.name
            )));
        };
        let name = &after[..close];
        let value = values.get(name).ok_or_else(|| {
            MarketLensError::Validation(format!(
                "{}: no value for path placeholder `{name}`",
                route.name
            ))
        })?;
        out.push_str(&urlencoding::encode(value));
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn check_value(
    route: &str,
    spec: &ParameterSpec,
    schema: &ParameterSchema,
    value: &Value,
) -> Result<()> {
    let invalid = |expected: &str| {
        MarketLensError::Validation(format!(
            "{route}: argument `{}` expects {expected}, got {value}",
            spec.name
        ))
    };

    let numeric = match schema.kind {
        Some(SchemaType::Integer | SchemaType::Epoch) => {
            Some(as_integer(value).ok_or_else(|| invalid("an integer"))? as f64)
        }
        Some(SchemaType::Number) => Some(as_number(value).ok_or_else(|| invalid("a number"))?),
        Some(SchemaType::Boolean) => {
            let ok = value.is_boolean()
                || value.as_str().is_some_and(|s| matches!(s, "true" | "false"));
            if !ok {
                return Err(invalid("a boolean"));
            }
            None
        }
        Some(SchemaType::String) => {
            if value.is_array() || value.is_object() {
                return Err(invalid("a string"));
            }
            None
        }
        Some(SchemaType::Array) => {
            match value {
                Value::Array(items) => {
                    if let Some(item_schema) = schema.items.as_deref() {
                        for item in items {
                            check_value(route, spec, item_schema, item)?;
                        }
                    }
                }
                Value::String(_) => {}
                _ => return Err(invalid("a list")),
            }
            return Ok(());
        }
        Some(SchemaType::Object) => {
            if !value.is_object() {
                return Err(invalid("an object"));
            }
            None
        }
        Some(SchemaType::Other) | None => as_number(value),
    };

    if let Some(allowed) = &schema.allowed {
        let rendered = ParamValue::from(value.clone()).to_string();
        let permitted = allowed.iter().any(|candidate| {
            candidate == value || ParamValue::from(candidate.clone()).to_string() == rendered
        });
        if !permitted {
            return Err(invalid(&format!("one of {}", Value::Array(allowed.clone()))));
        }
    }

    if let Some(number) = numeric {
        if let Some(min) = schema.minimum.filter(|min| number < *min) {
            return Err(invalid(&format!("a value >= {min}")));
        }
        if let Some(max) = schema.maximum.filter(|max| number > *max) {
            return Err(invalid(&format!("a value <= {max}")));
        }
    }

    Ok(())
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn get_shop() -> RouteDescriptor {
        serde_json::from_value(json!({
            "name": "getListingsByShop",
            "url_template": "/v3/application/shops/{shop_id}/listings",
            "verb": "GET",
            "parameters": [
                {"name": "shop_id", "in": "path", "required": true, "schema": {"type": "integer", "minimum": 1}},
                {"name": "state", "in": "query", "schema": {"type": "string", "enum": ["active", "draft"]}},
                {"name": "limit", "in": "query", "schema": {"type": "integer", "minimum": 1, "maximum": 100}},
                {"name": "includes", "in": "query", "schema": {"type": "array", "items": {"type": "string", "enum": ["Images", "Shop"]}}},
                {"name": "x-request-tag", "in": "header", "schema": {"type": "string"}},
                {"name": "path", "in": "query", "schema": {"type": "string"}}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn renders_path_query_and_headers() {
        let args = BoundArguments::new()
            .with("shop_id", 123)
            .with("state", "active")
            .with("includes", json!(["Images", "Shop"]))
            .with("x-request-tag", "ui");

        let request = prepare(&get_shop(), &args).unwrap();

        assert_eq!(request.path, "/v3/application/shops/123/listings");
        assert_eq!(request.verb, HttpVerb::Get);
        assert_eq!(
            request.query,
            vec![
                ("state".to_string(), "active".to_string()),
                ("includes".to_string(), "Images,Shop".to_string())
            ]
        );
        assert_eq!(request.headers, vec![("x-request-tag".to_string(), "ui".to_string())]);
    }

    #[test]
    fn missing_required_argument_is_rejected() {
        let err = prepare(&get_shop(), &BoundArguments::new().with("limit", 5)).unwrap_err();
        assert!(matches!(err, MarketLensError::Validation(ref msg) if msg.contains("shop_id")));

        let null_counts_as_unset = BoundArguments::new().with("shop_id", Value::Null);
        assert!(prepare(&get_shop(), &null_counts_as_unset).is_err());
    }

    #[test]
    fn schema_constraints_are_enforced() {
        let route = get_shop();
        let cases = [
            BoundArguments::new().with("shop_id", "abc"),
            BoundArguments::new().with("shop_id", 0),
            BoundArguments::new().with("shop_id", 1).with("limit", 101),
            BoundArguments::new().with("shop_id", 1).with("state", "sold"),
            BoundArguments::new().with("shop_id", 1).with("includes", json!(["Reviews"])),
            BoundArguments::new().with("shop_id", 1).with("unknown", 1),
        ];
        for args in cases {
            assert!(
                matches!(prepare(&route, &args), Err(MarketLensError::Validation(_))),
                "expected rejection for {args:?}"
            );
        }
    }

    #[test]
    fn reserved_names_are_stripped_and_strings_coerce() {
        let args = BoundArguments::new()
            .with("shop_id", "42")
            .with("limit", "25")
            .with("path", "/ignored")
            .with("method", "DELETE");

        let request = prepare(&get_shop(), &args).unwrap();
        assert_eq!(request.path, "/v3/application/shops/42/listings");
        assert_eq!(request.query_value("limit"), Some("25"));
        assert_eq!(request.query_value("path"), None);
    }

    #[test]
    fn path_values_are_percent_encoded() {
        let route: RouteDescriptor = serde_json::from_value(json!({
            "name": "findShops",
            "url_template": "/shops/{shop_name}",
            "verb": "GET",
            "parameters": [{"name": "shop_name", "in": "path", "required": true}]
        }))
        .unwrap();

        let request = prepare(&route, &BoundArguments::new().with("shop_name", "a b/c")).unwrap();
        assert_eq!(request.path, "/shops/a%20b%2Fc");
    }

    #[test]
    fn param_value_rendering() {
        assert_eq!(ParamValue::from(json!("x")).to_string(), "x");
        assert_eq!(ParamValue::from(json!(true)).to_string(), "true");
        assert_eq!(ParamValue::from(json!(1.5)).to_string(), "1.5");
        assert_eq!(ParamValue::from(json!([1, "b", false])).to_string(), "1,b,false");
    }
}
