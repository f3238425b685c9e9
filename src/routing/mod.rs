//! Route and policy resolution
//!
//! Declared [`Route`]s and the [`PolicyMap`] are compiled into one middleware
//! [`Chain`](crate::middleware::Chain) per route and mounted on a
//! [`RouterBackend`]. Models can additionally get routes synthesized from
//! the REST and CRUD templates in the configuration.

mod backend;
mod generator;
mod policy;
mod resolver;
mod route;

pub use backend::{AxumBackend, MountError, RouterBackend, axum_path};
pub use generator::{generate_routes, normalize_model_name};
pub use policy::{PolicyMap, PolicySpec, SecurityFilter, WILDCARD};
pub use resolver::{CompiledRoute, ResolveError, RouteCompiler, RouteModel, RouteTarget, resolve_path, sort_routes};
pub use route::{DEFAULT_ROUTER, Handler, Route, normalize_method, parse_route_key, routes_from_json};
