use crate::error::{Result, TrellisError};
use crate::middleware::Middleware;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Key of the global policy, and of a controller's default policy.
pub const WILDCARD: &str = "*";

/// A policy or route filter specification.
///
/// `true` allows, `false` denies through the security filter, a string names
/// a filter or controller action, and a list composes specs in order.
#[derive(Clone)]
pub enum PolicySpec {
    Allow,
    Deny,
    Named(String),
    Custom(Middleware),
    Chain(Vec<PolicySpec>),
    /// A value of a type no policy can be built from, kept for reporting.
    Unsupported(String),
}

impl fmt::Debug for PolicySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicySpec::Allow => f.write_str("Allow"),
            PolicySpec::Deny => f.write_str("Deny"),
            PolicySpec::Named(name) => f.debug_tuple("Named").field(name).finish(),
            PolicySpec::Custom(_) => f.write_str("Custom(..)"),
            PolicySpec::Chain(specs) => f.debug_tuple("Chain").field(specs).finish(),
            PolicySpec::Unsupported(found) => f.debug_tuple("Unsupported").field(found).finish(),
        }
    }
}

impl From<bool> for PolicySpec {
    fn from(allow: bool) -> Self {
        if allow { PolicySpec::Allow } else { PolicySpec::Deny }
    }
}

impl From<&str> for PolicySpec {
    fn from(name: &str) -> Self {
        PolicySpec::Named(name.to_string())
    }
}

impl From<String> for PolicySpec {
    fn from(name: String) -> Self {
        PolicySpec::Named(name)
    }
}

impl From<Middleware> for PolicySpec {
    fn from(function: Middleware) -> Self {
        PolicySpec::Custom(function)
    }
}

impl<T: Into<PolicySpec>> From<Vec<T>> for PolicySpec {
    fn from(specs: Vec<T>) -> Self {
        PolicySpec::Chain(specs.into_iter().map(Into::into).collect())
    }
}

impl From<Value> for PolicySpec {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(allow) => allow.into(),
            Value::String(name) => PolicySpec::Named(name),
            Value::Array(items) => PolicySpec::Chain(items.into_iter().map(PolicySpec::from).collect()),
            other => PolicySpec::Unsupported(other.to_string()),
        }
    }
}

/// Policies keyed globally, per controller and per controller action.
///
/// Lookup precedence is action, then the controller's `"*"` entry, then
/// nothing. The global policy is composed separately, ahead of all of them.
#[derive(Clone, Debug, Default)]
pub struct PolicyMap {
    global: Option<PolicySpec>,
    controllers: HashMap<String, HashMap<String, PolicySpec>>,
}

impl PolicyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global(global: impl Into<PolicySpec>) -> Self {
        let mut map = Self::new();
        map.set_global(global);
        map
    }

    pub fn set_global(&mut self, spec: impl Into<PolicySpec>) {
        self.global = Some(spec.into());
    }

    pub fn global(&self) -> Option<&PolicySpec> {
        self.global.as_ref()
    }

    /// Set the policy of `controller.action`; `"*"` sets the controller default.
    pub fn set(&mut self, controller: impl Into<String>, action: impl Into<String>, spec: impl Into<PolicySpec>) {
        self.controllers
            .entry(controller.into())
            .or_default()
            .insert(action.into(), spec.into());
    }

    /// Builder form of [`PolicyMap::set`].
    pub fn policy(
        mut self,
        controller: impl Into<String>,
        action: impl Into<String>,
        spec: impl Into<PolicySpec>,
    ) -> Self {
        self.set(controller, action, spec);
        self
    }

    /// The policy applying to `controller.action`, if any.
    pub fn lookup(&self, controller: &str, action: &str) -> Option<&PolicySpec> {
        let policies = self.controllers.get(controller)?;
        policies.get(action).or_else(|| policies.get(WILDCARD))
    }

    pub fn controller(&self, controller: &str) -> Option<&HashMap<String, PolicySpec>> {
        self.controllers.get(controller)
    }

    /// Parse a declarative policy table.
    ///
    /// ```json
    /// {
    ///     "*": true,
    ///     "UserController": { "*": "AuthFilter", "create": ["AuthFilter", "AdminFilter"] },
    ///     "AdminController": false
    /// }
    /// ```
    ///
    /// A controller mapped to a plain value sets that controller's default.
    pub fn from_json(table: &Value) -> Result<Self> {
        let entries = table
            .as_object()
            .ok_or_else(|| TrellisError::invalid_config("policy table must be an object"))?;

        let mut map = Self::new();
        for (key, value) in entries {
            match (key.as_str(), value) {
                (WILDCARD, value) => map.set_global(value.clone()),
                (controller, Value::Object(actions)) => {
                    for (action, spec) in actions {
                        map.set(controller, action.as_str(), spec.clone());
                    }
                }
                (controller, value) => map.set(controller, WILDCARD, value.clone()),
            }
        }
        Ok(map)
    }
}

/// The filter `false` policies resolve to.
#[derive(Clone)]
pub enum SecurityFilter {
    Named(String),
    Function(Middleware),
}

impl fmt::Debug for SecurityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityFilter::Named(name) => f.debug_tuple("Named").field(name).finish(),
            SecurityFilter::Function(_) => f.write_str("Function(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_conversion() {
        assert!(matches!(PolicySpec::from(json!(true)), PolicySpec::Allow));
        assert!(matches!(PolicySpec::from(json!(false)), PolicySpec::Deny));
        assert!(matches!(PolicySpec::from(json!("Auth")), PolicySpec::Named(n) if n == "Auth"));
        assert!(matches!(PolicySpec::from(json!(3)), PolicySpec::Unsupported(found) if found == "3"));

        let PolicySpec::Chain(items) = PolicySpec::from(json!(["Auth", true, {"x": 1}])) else {
            panic!("expected chain");
        };
        assert_eq!(items.len(), 3);
        assert!(matches!(items[2], PolicySpec::Unsupported(_)));
    }

    #[test]
    fn test_lookup_precedence() {
        let map = PolicyMap::with_global(true)
            .policy("UserController", "*", "AuthFilter")
            .policy("UserController", "create", false);

        assert!(matches!(map.lookup("UserController", "create"), Some(PolicySpec::Deny)));
        assert!(matches!(map.lookup("UserController", "find"), Some(PolicySpec::Named(_))));
        assert!(map.lookup("PageController", "home").is_none());
        assert!(matches!(map.global(), Some(PolicySpec::Allow)));
    }

    #[test]
    fn test_from_json() {
        let map = PolicyMap::from_json(&json!({
            "*": "RateLimit",
            "UserController": { "*": true, "destroy": ["AuthFilter", "AdminFilter"] },
            "AdminController": false
        }))
        .unwrap();

        assert!(matches!(map.global(), Some(PolicySpec::Named(n)) if n == "RateLimit"));
        assert!(matches!(map.lookup("UserController", "find"), Some(PolicySpec::Allow)));
        assert!(matches!(map.lookup("UserController", "destroy"), Some(PolicySpec::Chain(v)) if v.len() == 2));
        assert!(matches!(map.lookup("AdminController", "anything"), Some(PolicySpec::Deny)));
    }

    #[test]
    fn test_from_json_without_global() {
        let map = PolicyMap::from_json(&json!({ "UserController": true })).unwrap();
        assert!(map.global().is_none());
        assert!(PolicyMap::from_json(&json!(true)).is_err());
    }
}
