use crate::error::{Result, TrellisError};
use crate::middleware::Middleware;
use crate::routing::PolicySpec;
use serde_json::Value;
use std::fmt;

/// Router that routes are mounted on unless they name another one.
pub const DEFAULT_ROUTER: &str = "default";

/// What answers a route: a `"Name.action"` path or a function.
#[derive(Clone)]
pub enum Handler {
    Named(String),
    Function(Middleware),
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Handler::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl From<&str> for Handler {
    fn from(name: &str) -> Self {
        Handler::Named(name.to_string())
    }
}

impl From<String> for Handler {
    fn from(name: String) -> Self {
        Handler::Named(name)
    }
}

impl From<Middleware> for Handler {
    fn from(function: Middleware) -> Self {
        Handler::Function(function)
    }
}

/// A declared route.
///
/// Declared routes are normalized and validated once, at compile time;
/// invalid ones are logged and never mounted.
#[derive(Clone, Debug)]
pub struct Route {
    pub methods: Vec<String>,
    pub url: String,
    pub handler: Option<Handler>,
    pub filters: Option<PolicySpec>,
    pub router: String,
    /// Target of a `view` or `redirect` shortcut handler.
    pub target: Option<String>,
    /// Model a generated route operates on.
    pub model: Option<String>,
    pub valid: bool,
}

impl Route {
    /// A `get` route for `url`.
    pub fn new(url: impl Into<String>, handler: impl Into<Handler>) -> Self {
        Self {
            methods: vec!["get".to_string()],
            url: url.into(),
            handler: Some(handler.into()),
            filters: None,
            router: DEFAULT_ROUTER.to_string(),
            target: None,
            model: None,
            valid: true,
        }
    }

    /// Render `template` through the configured view handler.
    pub fn view(url: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(url, "view").target(template)
    }

    /// Redirect to `location`.
    pub fn redirect(url: impl Into<String>, location: impl Into<String>) -> Self {
        Self::new(url, "redirect").target(location)
    }

    pub fn method(self, method: impl Into<String>) -> Self {
        self.methods([method.into()])
    }

    pub fn methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = methods.into_iter().map(Into::into).collect();
        self
    }

    pub fn filters(mut self, filters: impl Into<PolicySpec>) -> Self {
        self.filters = Some(filters.into());
        self
    }

    pub fn router(mut self, router: impl Into<String>) -> Self {
        self.router = router.into();
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Normalize methods and validate required fields, setting `valid`.
    pub fn normalize(mut self) -> Self {
        let mut methods: Vec<String> = Vec::with_capacity(self.methods.len());
        for method in self.methods.iter().map(|m| normalize_method(m)) {
            if !method.is_empty() && !methods.contains(&method) {
                methods.push(method);
            }
        }
        self.methods = methods;

        let missing = if self.methods.is_empty() {
            Some("method")
        } else if self.url.trim().is_empty() {
            Some("url")
        } else if self.handler.is_none() || self.handler_name().is_some_and(|name| name.trim().is_empty()) {
            Some("handler")
        } else {
            None
        };

        self.valid = missing.is_none();
        if let Some(field) = missing {
            tracing::warn!("Dropping route {:?} {:?}: missing {}", self.methods, self.url, field);
        }
        self
    }

    pub fn handler_name(&self) -> Option<&str> {
        match &self.handler {
            Some(Handler::Named(name)) => Some(name.as_str()),
            _ => None,
        }
    }
}

/// Lowercase a method name and map the `del` alias to `delete`.
pub fn normalize_method(method: &str) -> String {
    let method = method.trim().to_lowercase();
    if method == "del" {
        "delete".to_string()
    } else {
        method
    }
}

/// Split `"<method> <url>"` into its parts; a bare url means `get`.
pub fn parse_route_key(key: &str) -> Option<(String, String)> {
    let mut parts = key.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(url), None, None) => Some(("get".to_string(), url.to_string())),
        (Some(method), Some(url), None) => Some((method.to_string(), url.to_string())),
        _ => None,
    }
}

/// Parse a declarative route table.
///
/// ```json
/// {
///     "get /user/:id": "UserController.find",
///     "/about": { "view": "about" },
///     "post /login": { "handler": "AuthController.login", "filters": ["RateLimit"] }
/// }
/// ```
pub fn routes_from_json(table: &Value) -> Result<Vec<Route>> {
    let entries = table
        .as_object()
        .ok_or_else(|| TrellisError::invalid_config("route table must be an object"))?;

    let mut routes = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        let Some((method, url)) = parse_route_key(key) else {
            tracing::warn!("Ignoring malformed route key '{}'", key);
            continue;
        };
        routes.push(route_from_value(method, url, value));
    }
    Ok(routes)
}

fn route_from_value(method: String, url: String, value: &Value) -> Route {
    let mut route = Route {
        methods: vec![method],
        url,
        handler: None,
        filters: None,
        router: DEFAULT_ROUTER.to_string(),
        target: None,
        model: None,
        valid: true,
    };

    match value {
        Value::String(handler) => route.handler = Some(Handler::Named(handler.clone())),
        Value::Object(options) => {
            let text = |field: &str| options.get(field).and_then(Value::as_str).map(str::to_string);

            if let Some(view) = text("view") {
                route.handler = Some(Handler::from("view"));
                route.target = Some(view);
            } else if let Some(location) = text("redirect") {
                route.handler = Some(Handler::from("redirect"));
                route.target = Some(location);
            } else if let Some(handler) = text("handler") {
                route.handler = Some(Handler::Named(handler));
            } else if let (Some(controller), Some(action)) = (text("controller"), text("action")) {
                route.handler = Some(Handler::Named(format!("{}.{}", controller, action)));
            }

            if let Some(filters) = options.get("filters") {
                route.filters = Some(PolicySpec::from(filters.clone()));
            }
            if let Some(router) = text("router") {
                route.router = router;
            }
            if let Some(method) = text("method") {
                route.methods = vec![method];
            }
        }
        other => tracing::warn!("Route '{}' has an unusable target: {}", route.url, other),
    }
    route
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_method_is_get() {
        let route = Route::new("/users", "UserController.find").normalize();
        assert!(route.valid);
        assert_eq!(route.methods, vec!["get"]);
    }

    #[test]
    fn test_method_normalization() {
        let route = Route::new("/users/:id", "UserController.destroy")
            .methods(["DEL", "Post", "post"])
            .normalize();
        assert_eq!(route.methods, vec!["delete", "post"]);
        assert_eq!(normalize_method("del"), "delete");
    }

    #[test]
    fn test_missing_fields_invalidate() {
        let no_method = Route::new("/x", "C.a").methods(Vec::<String>::new()).normalize();
        assert!(!no_method.valid);

        let no_url = Route::new("", "C.a").normalize();
        assert!(!no_url.valid);

        let mut no_handler = Route::new("/x", "C.a");
        no_handler.handler = None;
        assert!(!no_handler.normalize().valid);

        assert!(!Route::new("/x", "").normalize().valid);
    }

    #[test]
    fn test_parse_route_key() {
        assert_eq!(parse_route_key("/about"), Some(("get".into(), "/about".into())));
        assert_eq!(parse_route_key("post /login"), Some(("post".into(), "/login".into())));
        assert_eq!(parse_route_key("get /a /b"), None);
    }

    #[test]
    fn test_routes_from_json() {
        let routes = routes_from_json(&json!({
            "get /user/:id": "UserController.find",
            "/about": { "view": "about" },
            "/old": { "redirect": "/new" },
            "post /login": { "handler": "AuthController.login", "filters": ["RateLimit"], "router": "api" },
            "put /user/:id": { "controller": "UserController", "action": "update" },
            "/broken": 42
        }))
        .unwrap();
        assert_eq!(routes.len(), 6);

        let about = routes.iter().find(|r| r.url == "/about").unwrap();
        assert_eq!(about.handler_name(), Some("view"));
        assert_eq!(about.target.as_deref(), Some("about"));

        let login = routes.iter().find(|r| r.url == "/login").unwrap();
        assert_eq!(login.methods, vec!["post"]);
        assert_eq!(login.router, "api");
        assert!(matches!(login.filters, Some(PolicySpec::Chain(_))));

        let update = routes.iter().find(|r| r.methods == ["put"]).unwrap();
        assert_eq!(update.handler_name(), Some("UserController.update"));

        let broken = routes.iter().find(|r| r.url == "/broken").unwrap().clone();
        assert!(!broken.normalize().valid);
    }

    #[test]
    fn test_route_table_must_be_object() {
        assert!(routes_from_json(&json!(["get /"])).is_err());
    }
}
