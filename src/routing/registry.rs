//! Handler and route bindings.
//!
//! # Responsibilities
//! - Bind actions to handler names (per method, any-fallback, data)
//! - Bind path patterns to handler names with a parameter spec
//! - Match a request to a handler and its resolved params
//! - Reverse-resolve a handler name and params to a URL
//!
//! # Handler Spec
//! ```text
//! name                       params inferred from the path, all required
//! name(a, b?, c="x", d?="y") required, optional, pinned, optional with default
//! name(a, *)                 catch-all: unknown params go to the query string
//! ```
//!
//! # Design Decisions
//! - Registration order is both match priority and reverse priority
//! - Built once at startup, read-only afterwards

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use axum::http::Method;
use thiserror::Error;
use url::form_urlencoded;

use crate::http::action::{Action, DataAction};
use crate::routing::path::{Match, Params, Path, PathError};

/// Reverse routing failures.
#[derive(Debug, Error)]
pub enum ReverseError {
    #[error("reverse for {name:?} not found, parameters: {params:?}")]
    NotFound { name: String, params: Params },

    #[error("reverse for {name:?} failed: {source}")]
    Render {
        name: String,
        #[source]
        source: PathError,
    },
}

/// Declared route parameter: a pinned value or default, and whether it may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParam {
    pub value: String,
    pub optional: bool,
}

/// A parsed `name(params...)` handler spec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerSpec {
    pub name: String,
    pub params: BTreeMap<String, RouteParam>,
    pub catchall: bool,
}

impl HandlerSpec {
    pub fn parse(spec: &str) -> Self {
        let (name, list) = match spec.split_once('(') {
            Some((name, rest)) => (name, Some(rest.strip_suffix(')').unwrap_or(rest))),
            None => (spec, None),
        };
        let (params, catchall) = list.map(parse_params).unwrap_or_default();
        Self {
            name: name.trim().to_string(),
            params,
            catchall,
        }
    }
}

fn parse_params(list: &str) -> (BTreeMap<String, RouteParam>, bool) {
    let mut params = BTreeMap::new();
    let mut catchall = false;

    let mut name = String::new();
    let mut value = String::new();
    let mut optional = false;
    let mut in_value = false;
    let mut quote: Option<char> = None;

    let mut flush = |name: &mut String, value: &mut String, optional: &mut bool| {
        let key = name.trim();
        if !key.is_empty() {
            params.insert(
                key.to_string(),
                RouteParam {
                    value: std::mem::take(value),
                    optional: *optional,
                },
            );
        }
        name.clear();
        value.clear();
        *optional = false;
    };

    let mut chars = list.chars();
    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            match c {
                c if c == q => quote = None,
                '\\' => value.extend(chars.next()),
                c => value.push(c),
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                quote = Some(c);
                value.clear();
                in_value = true;
            }
            '=' => {
                value.clear();
                in_value = true;
            }
            ',' => {
                flush(&mut name, &mut value, &mut optional);
                in_value = false;
            }
            '?' => optional = true,
            '*' => catchall = true,
            c if c.is_whitespace() => {}
            '\\' => {
                let escaped = chars.next();
                if in_value {
                    value.extend(escaped);
                } else {
                    name.extend(escaped);
                }
            }
            c if in_value => value.push(c),
            c => name.push(c),
        }
    }
    flush(&mut name, &mut value, &mut optional);

    (params, catchall)
}

/// A path pattern bound to a handler name.
#[derive(Debug, Clone)]
pub struct Route {
    path: Path,
    handler: String,
    params: BTreeMap<String, RouteParam>,
    catchall: bool,
}

impl Route {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn handler_name(&self) -> &str {
        &self.handler
    }

    pub fn params(&self) -> &BTreeMap<String, RouteParam> {
        &self.params
    }

    pub fn is_catchall(&self) -> bool {
        self.catchall
    }

    /// Slugify the named params whenever this route is rendered.
    pub fn normalize(&mut self, names: &[&str]) -> &mut Self {
        self.path.set_normalize(names.iter().copied());
        self
    }

    /// Prepare render values and the keys already accounted for, or `None`
    /// when a required param is missing or contradicts a pinned value.
    fn render_values(&self, supplied: &Params) -> Option<(Params, HashSet<String>)> {
        let mut values = Params::new();
        let mut used = HashSet::new();

        for (key, param) in &self.params {
            let given = supplied.get(key);
            match given {
                None if !param.optional => return None,
                Some(v) if !param.optional && !param.value.is_empty() && *v != param.value => {
                    return None
                }
                _ => {}
            }
            values.insert(key.clone(), param.value.clone());
            used.insert(key.clone());
        }

        for (key, value) in supplied {
            if values.get(key) != Some(value) {
                used.remove(key);
            }
            values.insert(key.clone(), value.clone());
        }

        Some((values, used))
    }
}

/// Actions registered under one handler name.
#[derive(Clone, Default)]
pub struct HandlerActions {
    methods: HashMap<Method, Arc<dyn Action>>,
    any: Option<Arc<dyn Action>>,
    data: Option<Arc<dyn DataAction>>,
}

impl HandlerActions {
    pub fn method(&self, method: &Method) -> Option<&Arc<dyn Action>> {
        self.methods.get(method)
    }

    pub fn any(&self) -> Option<&Arc<dyn Action>> {
        self.any.as_ref()
    }

    pub fn data(&self) -> Option<&Arc<dyn DataAction>> {
        self.data.as_ref()
    }

    /// Registered methods, sorted by name.
    pub fn methods(&self) -> Vec<&Method> {
        let mut methods: Vec<_> = self.methods.keys().collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }

    fn accepts(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains_key(method)
    }
}

impl fmt::Debug for HandlerActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerActions")
            .field("methods", &self.methods())
            .field("any", &self.any.is_some())
            .field("data", &self.data.is_some())
            .finish()
    }
}

/// A request resolved to a handler.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub handler: String,
    pub actions: HandlerActions,
    pub params: Params,
}

/// Registers routes and actions into a registry.
pub trait RoutesModule: Send + Sync {
    fn routes(&self, registry: &mut RouterRegistry) -> Result<(), PathError>;
}

impl<F> RoutesModule for F
where
    F: Fn(&mut RouterRegistry) -> Result<(), PathError> + Send + Sync,
{
    fn routes(&self, registry: &mut RouterRegistry) -> Result<(), PathError> {
        self(registry)
    }
}

/// Named handler bindings plus ordered path bindings.
#[derive(Debug, Default)]
pub struct RouterRegistry {
    handlers: HashMap<String, HandlerActions>,
    routes: Vec<Route>,
    aliases: HashMap<String, HandlerSpec>,
}

impl RouterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fallback action for methods without a specific action.
    pub fn handle_any(&mut self, name: &str, action: impl Action + 'static) {
        self.handlers.entry(name.to_string()).or_default().any = Some(Arc::new(action));
    }

    pub fn handle_method(&mut self, method: Method, name: &str, action: impl Action + 'static) {
        self.handlers
            .entry(name.to_string())
            .or_default()
            .methods
            .insert(method, Arc::new(action));
    }

    pub fn handle_get(&mut self, name: &str, action: impl Action + 'static) {
        self.handle_method(Method::GET, name, action);
    }

    pub fn handle_post(&mut self, name: &str, action: impl Action + 'static) {
        self.handle_method(Method::POST, name, action);
    }

    pub fn handle_put(&mut self, name: &str, action: impl Action + 'static) {
        self.handle_method(Method::PUT, name, action);
    }

    pub fn handle_delete(&mut self, name: &str, action: impl Action + 'static) {
        self.handle_method(Method::DELETE, name, action);
    }

    pub fn handle_options(&mut self, name: &str, action: impl Action + 'static) {
        self.handle_method(Method::OPTIONS, name, action);
    }

    pub fn handle_head(&mut self, name: &str, action: impl Action + 'static) {
        self.handle_method(Method::HEAD, name, action);
    }

    pub fn handle_data(&mut self, name: &str, action: impl DataAction + 'static) {
        self.handlers.entry(name.to_string()).or_default().data = Some(Arc::new(action));
    }

    pub fn has(&self, method: &Method, name: &str) -> bool {
        self.handlers
            .get(name)
            .is_some_and(|h| h.methods.contains_key(method))
    }

    pub fn has_any(&self, name: &str) -> bool {
        self.handlers.get(name).is_some_and(|h| h.any.is_some())
    }

    pub fn has_data(&self, name: &str) -> bool {
        self.handlers.get(name).is_some_and(|h| h.data.is_some())
    }

    pub fn actions(&self, name: &str) -> Option<&HandlerActions> {
        self.handlers.get(name)
    }

    /// Handler names with at least one action, sorted.
    pub fn handler_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Bind `pattern` to the handler described by `spec`.
    pub fn route(&mut self, pattern: &str, spec: &str) -> Result<&mut Route, PathError> {
        let spec = HandlerSpec::parse(spec);
        let path = Path::new(pattern)?;

        let params = if spec.params.is_empty() {
            path.params()
                .iter()
                .map(|name| (name.clone(), RouteParam::default()))
                .collect()
        } else {
            spec.params
        };

        self.routes.push(Route {
            path,
            handler: spec.name,
            params,
            catchall: spec.catchall,
        });
        let index = self.routes.len() - 1;
        Ok(&mut self.routes[index])
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Resolve `name` as `to`, which may pin params: `alias("home", "page.view(page=\"home\")")`.
    pub fn alias(&mut self, name: &str, to: &str) {
        self.aliases.insert(name.to_string(), HandlerSpec::parse(to));
    }

    /// Build the URL for a handler name and params.
    pub fn reverse(&self, name: &str, params: &Params) -> Result<String, ReverseError> {
        let mut name = name;
        let mut params = params.clone();
        if let Some(alias) = self.aliases.get(name) {
            name = &alias.name;
            for (key, param) in &alias.params {
                params.insert(key.clone(), param.value.clone());
            }
        }

        let candidates = || self.routes.iter().filter(|r| r.handler == name);

        let strict = candidates().find_map(|route| {
            let prepared = route.render_values(&params)?;
            params
                .keys()
                .all(|key| route.params.contains_key(key))
                .then_some((route, prepared))
        });
        let found = strict.or_else(|| {
            candidates()
                .filter(|route| route.catchall)
                .find_map(|route| route.render_values(&params).map(|prepared| (route, prepared)))
        });

        match found {
            Some((route, (values, mut used))) => {
                route
                    .path
                    .render(&values, &mut used)
                    .map_err(|source| ReverseError::Render {
                        name: name.to_string(),
                        source,
                    })
            }
            None => Err(ReverseError::NotFound {
                name: name.to_string(),
                params,
            }),
        }
    }

    /// Match a request. `path` is the raw, undecoded request path.
    pub fn match_request(&self, method: &Method, path: &str, query: Option<&str>) -> Option<RouteMatch> {
        let path = format!("/{}", path.trim_start_matches('/'));
        let empty = HandlerActions::default();

        let matched: Vec<(&Route, &HandlerActions, Match)> = self
            .routes
            .iter()
            .filter_map(|route| {
                let m = route.path.match_path(&path)?;
                let actions = self.handlers.get(&route.handler).unwrap_or(&empty);
                Some((route, actions, m))
            })
            .collect();

        let has_method = matched
            .iter()
            .any(|(_, actions, _)| actions.methods.contains_key(method));
        if !has_method {
            if let Some((route, actions, m)) = matched.iter().find(|(_, a, _)| a.any.is_some()) {
                return resolve(route, actions, m, query);
            }
        }

        matched
            .iter()
            .filter(|(_, actions, _)| actions.accepts(method))
            .find_map(|(route, actions, m)| resolve(route, actions, m, query))
    }
}

/// Fill declared params: pinned value, then path capture, then a non-empty
/// query value, then the default. A required param left unfilled rejects the route.
fn resolve(route: &Route, actions: &HandlerActions, m: &Match, query: Option<&str>) -> Option<RouteMatch> {
    let params = if route.params.is_empty() {
        m.values.clone()
    } else {
        let mut params = Params::new();
        for (key, param) in &route.params {
            let value = if !param.optional && !param.value.is_empty() {
                param.value.clone()
            } else if let Some(captured) = m.values.get(key) {
                captured.clone()
            } else if let Some(v) = query_value(query, key) {
                v
            } else if !param.optional {
                return None;
            } else {
                param.value.clone()
            };
            params.insert(key.clone(), value);
        }
        params
    };

    Some(RouteMatch {
        handler: route.handler.clone(),
        actions: actions.clone(),
        params,
    })
}

fn query_value(query: Option<&str>, key: &str) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}
