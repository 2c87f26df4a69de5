//! Reference document traversal
//!
//! The document is a nested `paths -> verb -> operation` mapping. Every
//! operation carries an `operationId` and a `parameters` list; parameters
//! declared next to the verbs apply to every verb of that path, and
//! operation-level entries override them by `(name, in)`. Local `$ref`
//! pointers (`#/components/parameters/...`) are resolved against the same
//! document.

use marketlens_domain::{HttpVerb, MarketLensError, ParameterSpec, Result, RouteDescriptor};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Walk the document in file order and build one descriptor per operation.
///
/// # Errors
/// Returns `Validation` if the document has no `paths` object or a
/// parameter cannot be decoded.
pub fn parse_routes(document: &Value) -> Result<Vec<RouteDescriptor>> {
    let paths = document
        .get("paths")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            MarketLensError::Validation("reference document has no `paths` object".to_string())
        })?;

    let mut routes = Vec::new();
    for (url_template, item) in paths {
        let Some(item) = item.as_object() else {
            warn!(path = %url_template, "catalog.path_item_not_object");
            continue;
        };

        let shared = match item.get("parameters") {
            Some(list) => parse_parameters(document, list, url_template)?,
            None => Vec::new(),
        };

        for (key, operation) in item {
            // `parameters`, `summary`, `servers` and friends sit next to verbs.
            let Some(verb) = HttpVerb::parse(key) else { continue };
            let Some(operation) = operation.as_object() else {
                warn!(path = %url_template, verb = %verb, "catalog.operation_not_object");
                continue;
            };
            if let Some(route) = parse_operation(document, url_template, verb, operation, &shared)? {
                routes.push(route);
            }
        }
    }

    debug!(routes = routes.len(), "catalog.document_parsed");
    Ok(routes)
}

fn parse_operation(
    document: &Value,
    url_template: &str,
    verb: HttpVerb,
    operation: &Map<String, Value>,
    shared: &[ParameterSpec],
) -> Result<Option<RouteDescriptor>> {
    let Some(name) = operation.get("operationId").and_then(Value::as_str) else {
        warn!(path = %url_template, verb = %verb, "catalog.operation_missing_id");
        return Ok(None);
    };

    let own = match operation.get("parameters") {
        Some(list) => parse_parameters(document, list, name)?,
        None => Vec::new(),
    };

    let mut parameters: Vec<ParameterSpec> = shared
        .iter()
        .filter(|inherited| {
            !own.iter().any(|p| p.name == inherited.name && p.location == inherited.location)
        })
        .cloned()
        .collect();
    parameters.extend(own);

    let summary = operation
        .get("summary")
        .or_else(|| operation.get("description"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Some(RouteDescriptor {
        name: name.to_string(),
        url_template: url_template.to_string(),
        verb,
        parameters,
        summary,
    }))
}

fn parse_parameters(document: &Value, list: &Value, owner: &str) -> Result<Vec<ParameterSpec>> {
    let Some(entries) = list.as_array() else {
        return Err(MarketLensError::Validation(format!(
            "`parameters` of {owner} is not a list"
        )));
    };

    entries
        .iter()
        .map(|entry| {
            let resolved = resolve_ref(document, entry)?;
            serde_json::from_value::<ParameterSpec>(resolved.clone()).map_err(|e| {
                MarketLensError::Validation(format!("invalid parameter in {owner}: {e}"))
            })
        })
        .collect()
}

fn resolve_ref<'a>(document: &'a Value, entry: &'a Value) -> Result<&'a Value> {
    let Some(reference) = entry.get("$ref").and_then(Value::as_str) else {
        return Ok(entry);
    };
    reference
        .strip_prefix('#')
        .and_then(|pointer| document.pointer(pointer))
        .ok_or_else(|| MarketLensError::Validation(format!("unresolvable reference {reference}")))
}
