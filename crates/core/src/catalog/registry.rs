//! Route catalog built once per session from the reference document.

use std::collections::HashMap;
use std::path::Path;

use marketlens_domain::{HttpVerb, MarketLensError, Result, RouteDescriptor, VerbFilter};
use serde_json::Value;
use tracing::{info, warn};

use super::document::parse_routes;
use super::invocation::{prepare, BoundArguments, PreparedRequest};

/// Immutable set of callable routes, in document order.
#[derive(Debug, Clone, Default)]
pub struct RouteCatalog {
    routes: Vec<RouteDescriptor>,
    by_name: HashMap<String, usize>,
}

impl RouteCatalog {
    /// Build the catalog from a parsed reference document.
    ///
    /// A repeated operation id keeps its first position but takes the later
    /// definition.
    ///
    /// # Errors
    /// Returns `Validation` for a document without `paths` or with malformed
    /// parameters.
    pub fn load(document: &Value) -> Result<Self> {
        let mut catalog = Self::default();
        for route in parse_routes(document)? {
            match catalog.by_name.get(&route.name) {
                Some(&index) => {
                    warn!(route = %route.name, "catalog.duplicate_operation_id");
                    catalog.routes[index] = route;
                }
                None => {
                    catalog.by_name.insert(route.name.clone(), catalog.routes.len());
                    catalog.routes.push(route);
                }
            }
        }
        info!(routes = catalog.routes.len(), "catalog.loaded");
        Ok(catalog)
    }

    /// # Errors
    /// Returns `Validation` if the text is not JSON or not a valid document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(text).map_err(|e| {
            MarketLensError::Validation(format!("reference document is not valid JSON: {e}"))
        })?;
        Self::load(&document)
    }

    /// # Errors
    /// Returns `Config` if the file cannot be read, otherwise as
    /// [`RouteCatalog::from_json_str`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            MarketLensError::Config(format!(
                "cannot read reference document {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json_str(&text)
    }

    /// All routes, paths first then verbs within a path.
    #[must_use]
    pub fn list_routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// # Errors
    /// Returns `NotFound` when no operation has this id.
    pub fn find_by_name(&self, name: &str) -> Result<&RouteDescriptor> {
        self.by_name
            .get(name)
            .map(|&index| &self.routes[index])
            .ok_or_else(|| MarketLensError::NotFound(format!("route `{name}`")))
    }

    /// Look a route up by its URL template and verb.
    ///
    /// # Errors
    /// Returns `NotFound` when nothing matches.
    pub fn find_by_url(&self, url_template: &str, verb: HttpVerb) -> Result<&RouteDescriptor> {
        self.routes
            .iter()
            .find(|route| route.url_template == url_template && route.verb == verb)
            .ok_or_else(|| MarketLensError::NotFound(format!("route {verb} {url_template}")))
    }

    /// Routes whose verb is enabled, in catalog order.
    #[must_use]
    pub fn routes_with_verbs(&self, filter: &VerbFilter) -> Vec<&RouteDescriptor> {
        self.routes.iter().filter(|route| filter.allows(route.verb)).collect()
    }

    /// Look up `name` and prepare a request for it.
    ///
    /// # Errors
    /// `NotFound` for an unknown route, `Validation` for bad arguments.
    pub fn prepare(&self, name: &str, args: &BoundArguments) -> Result<PreparedRequest> {
        prepare(self.find_by_name(name)?, args)
    }
}
