use crate::component::{Controller, Filter, Model, Service};
use crate::config::AppConfig;
use crate::exception::ErrorTable;
use crate::messaging::EventBus;
use crate::registry::Registry;
use std::any::Any;
use std::sync::{Arc, Weak};

/// State shared by the host application and every component it activates.
pub struct AppContext {
    pub config: AppConfig,
    pub services: Registry<dyn Service>,
    pub filters: Registry<dyn Filter>,
    pub models: Registry<dyn Model>,
    pub controllers: Registry<dyn Controller>,
    pub errors: ErrorTable,
    pub events: EventBus,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            services: Registry::new("service"),
            filters: Registry::new("filter"),
            models: Registry::new("model"),
            controllers: Registry::new("controller"),
            errors: ErrorTable::default(),
            events: EventBus::new(),
        }
    }

    /// A lookup-only back-reference for components.
    pub fn handle(self: &Arc<Self>) -> AppHandle {
        AppHandle {
            inner: Arc::downgrade(self),
        }
    }
}

/// Weak back-reference to the host application.
///
/// Components hold this to find their siblings by name. It never keeps the
/// application alive; lookups return `None` once the application is dropped.
#[derive(Clone)]
pub struct AppHandle {
    inner: Weak<AppContext>,
}

impl AppHandle {
    pub fn context(&self) -> Option<Arc<AppContext>> {
        self.inner.upgrade()
    }

    pub fn config(&self) -> Option<AppConfig> {
        self.context().map(|ctx| ctx.config.clone())
    }

    pub fn service(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.context()?.services.instance(name)
    }

    pub fn filter(&self, name: &str) -> Option<Arc<dyn Filter>> {
        self.context()?.filters.instance(name)
    }

    pub fn model(&self, name: &str) -> Option<Arc<dyn Model>> {
        self.context()?.models.instance(name)
    }

    pub fn controller(&self, name: &str) -> Option<Arc<dyn Controller>> {
        self.context()?.controllers.instance(name)
    }

    pub fn service_as<T: Service>(&self, name: &str) -> Option<Arc<T>> {
        downcast(self.service(name)?.as_any())
    }

    pub fn model_as<T: Model>(&self, name: &str) -> Option<Arc<T>> {
        downcast(self.model(name)?.as_any())
    }

    pub fn filter_as<T: Filter>(&self, name: &str) -> Option<Arc<T>> {
        downcast(self.filter(name)?.as_any())
    }

    pub fn controller_as<T: Controller>(&self, name: &str) -> Option<Arc<T>> {
        downcast(self.controller(name)?.as_any())
    }
}

fn downcast<T: Any + Send + Sync>(instance: Arc<dyn Any + Send + Sync>) -> Option<Arc<T>> {
    instance.downcast::<T>().ok()
}
