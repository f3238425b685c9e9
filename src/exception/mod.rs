use axum::http::StatusCode;
use std::collections::HashMap;

pub mod http;

pub use http::HttpException;

/// Factory producing an [`HttpException`] from a message.
pub type ExceptionFactory = fn(String) -> HttpException;

/// Named table of exception factories exposed to application code.
///
/// Components look these up by name (`"notFound"`, `"badRequest"`, ...) through
/// the application context instead of constructing status codes themselves.
#[derive(Clone)]
pub struct ErrorTable {
    factories: HashMap<&'static str, ExceptionFactory>,
}

impl Default for ErrorTable {
    fn default() -> Self {
        let mut table = Self {
            factories: HashMap::new(),
        };
        table.register("badRequest", HttpException::bad_request);
        table.register("unauthorized", HttpException::unauthorized);
        table.register("forbidden", HttpException::forbidden);
        table.register("notFound", HttpException::not_found);
        table.register("serverError", HttpException::server_error);
        table.register("serviceUnavailable", HttpException::service_unavailable);
        table
    }
}

impl ErrorTable {
    pub fn register(&mut self, name: &'static str, factory: ExceptionFactory) {
        self.factories.insert(name, factory);
    }

    pub fn get(&self, name: &str) -> Option<ExceptionFactory> {
        self.factories.get(name).copied()
    }

    /// Build the named exception, falling back to a 500 for unknown names.
    pub fn create(&self, name: &str, message: impl Into<String>) -> HttpException {
        match self.get(name) {
            Some(factory) => factory(message.into()),
            None => {
                tracing::warn!("Unknown exception factory '{}'", name);
                HttpException::new(StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_factories() {
        let table = ErrorTable::default();
        assert_eq!(table.create("notFound", "missing").status, StatusCode::NOT_FOUND);
        assert_eq!(table.create("badRequest", "bad").status, StatusCode::BAD_REQUEST);
        assert_eq!(
            table.create("noSuchThing", "x").status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(table.names().contains(&"forbidden"));
    }
}
