//! Route compilation
//!
//! Turns declared routes and the policy map into the middleware chains that
//! get mounted:
//!
//! ```text
//! chain = global policy ++ action (or controller) policy ++ route filters ++ handler
//! ```

use super::policy::{PolicyMap, PolicySpec, SecurityFilter, WILDCARD};
use super::route::{Handler, Route};
use crate::component::filter_middleware;
use crate::context::AppContext;
use crate::error::{Result, TrellisError};
use crate::middleware::{BoxFuture, Chain, Middleware, MiddlewareResult, Next, builtins};
use crate::registry::ComponentSlot;
use axum::{body::Body, http::Request};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Why a `"Name.action"` path did not resolve.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no filter or controller named '{0}'")]
    UnknownComponent(String),

    #[error("{kind} '{name}' is registered but not active")]
    NotActivated { kind: &'static str, name: String },

    #[error("'{component}' has no action '{action}'")]
    UnknownAction { component: String, action: String },

    #[error("controller path '{0}' names no action")]
    MissingAction(String),
}

/// Target of a `view`/`redirect` shortcut, available to its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget(pub String);

/// Model a generated route operates on, available to its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteModel(pub String);

/// A route ready to be mounted.
#[derive(Clone)]
pub struct CompiledRoute {
    pub methods: Vec<String>,
    pub url: String,
    pub router: String,
    pub chain: Chain,
}

/// Resolve `"Name"` or `"Name.action"` against the filter and controller
/// registries, binding the result to its owning instance.
pub fn resolve_path(context: &AppContext, path: &str) -> std::result::Result<Middleware, ResolveError> {
    let (name, action) = match path.split_once('.') {
        Some((name, action)) => (name, Some(action)),
        None => (path, None),
    };

    if let Some(slot) = context.filters.get(name) {
        let ComponentSlot::Instance(filter) = slot else {
            return Err(ResolveError::NotActivated {
                kind: "filter",
                name: name.to_string(),
            });
        };
        return match action {
            None => Ok(filter_middleware(filter)),
            Some(action) => filter.action(action).ok_or_else(|| ResolveError::UnknownAction {
                component: name.to_string(),
                action: action.to_string(),
            }),
        };
    }

    if let Some(slot) = context.controllers.get(name) {
        let ComponentSlot::Instance(controller) = slot else {
            return Err(ResolveError::NotActivated {
                kind: "controller",
                name: name.to_string(),
            });
        };
        let action = action.ok_or_else(|| ResolveError::MissingAction(path.to_string()))?;
        return controller.action(action).ok_or_else(|| ResolveError::UnknownAction {
            component: name.to_string(),
            action: action.to_string(),
        });
    }

    Err(ResolveError::UnknownComponent(name.to_string()))
}

pub struct RouteCompiler<'a> {
    context: &'a AppContext,
    policies: &'a PolicyMap,
    security_filter: Option<&'a SecurityFilter>,
    security: Option<Middleware>,
    controller_policies: HashMap<String, Vec<Middleware>>,
}

impl<'a> RouteCompiler<'a> {
    pub fn new(context: &'a AppContext, policies: &'a PolicyMap, security_filter: Option<&'a SecurityFilter>) -> Self {
        Self {
            context,
            policies,
            security_filter,
            security: None,
            controller_policies: HashMap::new(),
        }
    }

    /// Compile every valid route.
    ///
    /// Fails when the global policy is missing, or when a production-like
    /// environment meets a policy value it cannot build a middleware from.
    /// Anything else that does not resolve is logged and left unmounted.
    pub fn compile_all(&mut self, routes: &[Route]) -> Result<Vec<CompiledRoute>> {
        let policies = self.policies;
        let global_spec = policies.global().ok_or(TrellisError::MissingGlobalPolicy)?;
        let global = self.normalize(global_spec, "policy '*'")?;

        let mut candidates: Vec<Route> = routes
            .iter()
            .cloned()
            .map(Route::normalize)
            .filter(|route| route.valid)
            .collect();
        if self.context.config.routes.sort {
            sort_routes(&mut candidates);
        }

        let mut compiled = Vec::with_capacity(candidates.len());
        for route in &candidates {
            if let Some(route) = self.compile(route, &global)? {
                compiled.push(route);
            }
        }
        Ok(compiled)
    }

    fn compile(&mut self, route: &Route, global: &[Middleware]) -> Result<Option<CompiledRoute>> {
        let Some((handler, controller_action)) = self.resolve_handler(route) else {
            tracing::warn!("Route {:?} {} has no resolvable handler; not mounted", route.methods, route.url);
            return Ok(None);
        };

        let policy = match &controller_action {
            Some((controller, action)) => self.policy_for(controller, action)?,
            None => Vec::new(),
        };
        let filters = match &route.filters {
            Some(spec) => self.normalize(spec, &format!("filters of {}", route.url))?,
            None => Vec::new(),
        };

        let mut chain = Vec::with_capacity(global.len() + policy.len() + filters.len() + 1);
        chain.extend_from_slice(global);
        chain.extend(policy);
        chain.extend(filters);
        chain.push(handler);

        Ok(Some(CompiledRoute {
            methods: route.methods.clone(),
            url: route.url.clone(),
            router: route.router.clone(),
            chain: Chain::new(chain),
        }))
    }

    /// Action policy, else the controller's cached default.
    fn policy_for(&mut self, controller: &str, action: &str) -> Result<Vec<Middleware>> {
        let policies = self.policies;
        if let Some(spec) = policies.controller(controller).and_then(|actions| actions.get(action)) {
            return self.normalize(spec, &format!("policy '{}.{}'", controller, action));
        }

        if let Some(cached) = self.controller_policies.get(controller) {
            return Ok(cached.clone());
        }
        let resolved = match policies.controller(controller).and_then(|actions| actions.get(WILDCARD)) {
            Some(spec) => self.normalize(spec, &format!("policy '{}.*'", controller))?,
            None => Vec::new(),
        };
        self.controller_policies.insert(controller.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// Flatten a spec into middleware, in declaration order.
    pub fn normalize(&mut self, spec: &PolicySpec, location: &str) -> Result<Vec<Middleware>> {
        let mut out = Vec::new();
        self.normalize_into(spec, location, &mut out)?;
        Ok(out)
    }

    fn normalize_into(&mut self, spec: &PolicySpec, location: &str, out: &mut Vec<Middleware>) -> Result<()> {
        match spec {
            PolicySpec::Allow => {}
            PolicySpec::Deny => out.push(self.security_filter()),
            PolicySpec::Custom(function) => out.push(Arc::clone(function)),
            PolicySpec::Named(path) => match resolve_path(self.context, path) {
                Ok(middleware) => out.push(middleware),
                Err(e) => tracing::warn!("Dropping '{}' from {}: {}", path, location, e),
            },
            PolicySpec::Chain(specs) => {
                for spec in specs {
                    self.normalize_into(spec, location, out)?;
                }
            }
            PolicySpec::Unsupported(found) => {
                if self.context.config.environment.is_production_like() {
                    tracing::error!("Unsupported policy value {} in {}", found, location);
                    return Err(TrellisError::UnsupportedPolicy {
                        location: location.to_string(),
                        found: found.clone(),
                    });
                }
                tracing::warn!("Ignoring unsupported policy value {} in {}", found, location);
            }
        }
        Ok(())
    }

    fn security_filter(&mut self) -> Middleware {
        if let Some(resolved) = &self.security {
            return Arc::clone(resolved);
        }

        let resolved = match self.security_filter {
            Some(SecurityFilter::Function(function)) => Arc::clone(function),
            Some(SecurityFilter::Named(name)) => resolve_path(self.context, name).unwrap_or_else(|e| {
                tracing::warn!("Security filter '{}' unresolved ({}); denying instead", name, e);
                builtins::deny_all()
            }),
            None => {
                tracing::warn!("No security filter configured; 'false' policies deny every request");
                builtins::deny_all()
            }
        };
        self.security = Some(Arc::clone(&resolved));
        resolved
    }

    /// The handler middleware, plus the controller/action pair used for
    /// policy lookup when the handler is a named path.
    fn resolve_handler(&self, route: &Route) -> Option<(Middleware, Option<(String, String)>)> {
        let name = match route.handler.as_ref()? {
            Handler::Function(function) => return Some((with_extensions(route, Arc::clone(function)), None)),
            Handler::Named(name) => name,
        };

        let handlers = &self.context.config.routes.handlers;
        let configured = match name.as_str() {
            "view" => Some(handlers.view.as_ref()),
            "redirect" => Some(handlers.redirect.as_ref()),
            _ => None,
        };

        let path = match configured {
            None => name.clone(),
            Some(default) => {
                let Some(target) = &route.target else {
                    tracing::warn!("'{}' route {} has no target", name, route.url);
                    return None;
                };
                match default {
                    Some(path) => path.clone(),
                    None if name == "redirect" => return Some((builtins::redirect(target), None)),
                    None => {
                        tracing::warn!("No default view handler configured for {}", route.url);
                        return None;
                    }
                }
            }
        };

        match resolve_path(self.context, &path) {
            Ok(handler) => {
                let controller_action = path
                    .split_once('.')
                    .map(|(controller, action)| (controller.to_string(), action.to_string()));
                Some((with_extensions(route, handler), controller_action))
            }
            Err(e) => {
                tracing::warn!("Handler '{}' for {}: {}", path, route.url, e);
                None
            }
        }
    }
}

/// Descending lexicographic order by url.
pub fn sort_routes(routes: &mut [Route]) {
    routes.sort_by(|a, b| b.url.cmp(&a.url));
}

fn with_extensions(route: &Route, handler: Middleware) -> Middleware {
    if route.target.is_none() && route.model.is_none() {
        return handler;
    }
    let target = route.target.clone().map(RouteTarget);
    let model = route.model.clone().map(RouteModel);
    Arc::new(move |mut request: Request<Body>, next: Next| -> BoxFuture<MiddlewareResult> {
        if let Some(target) = &target {
            request.extensions_mut().insert(target.clone());
        }
        if let Some(model) = &model {
            request.extensions_mut().insert(model.clone());
        }
        handler(request, next)
    })
}
