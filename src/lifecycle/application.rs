//! Application Bootstrap
//!
//! The host application owns every registry, the policy map, the declared
//! routes and the middleware table, and walks them through the stage
//! sequence. Each step is one call to [`Application::advance`]: before-hooks,
//! stage body, after-hooks, transition. Automatic and manual drive are two
//! callers of that primitive.

use super::{LifecycleError, LifecycleManager, Stage, StageCompleted};
use crate::component::{Component, Controller, Filter, Model, Service};
use crate::config::{AppConfig, RouteTemplate};
use crate::context::{AppContext, AppHandle};
use crate::error::{Result, TrellisError};
use crate::middleware::{Middleware, MiddlewareTable, builtins};
use crate::registry::{Factory, Registry};
use crate::routing::{
    AxumBackend, DEFAULT_ROUTER, PolicyMap, Route, RouteCompiler, RouterBackend, SecurityFilter, generate_routes,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

type Registration = Box<dyn FnOnce(&AppContext) + Send>;

/// A method and url mounted on one of the application's routers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedRoute {
    pub method: String,
    pub url: String,
    pub router: String,
}

/// The host application
///
/// # Example
///
/// ```rust,ignore
/// let mut app = Application::builder()
///     .config(AppConfig::from_file("config/app.json")?)
///     .policies(PolicyMap::with_global(true))
///     .controller("PageController", |_app| Ok(PageController))
///     .route(Route::new("/", "PageController.home"))
///     .build()?;
///
/// app.start().await?;
/// shutdown_signal().await;
/// app.shutdown().await;
/// ```
pub struct Application {
    context: Arc<AppContext>,
    lifecycle: LifecycleManager,
    policies: PolicyMap,
    routes: Vec<Route>,
    middleware: MiddlewareTable,
    security_filter: Option<SecurityFilter>,
    backend: Box<dyn RouterBackend>,
    mounted: Vec<MountedRoute>,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    pub fn handle(&self) -> AppHandle {
        self.context.handle()
    }

    pub fn config(&self) -> &AppConfig {
        &self.context.config
    }

    pub fn middleware(&self) -> &MiddlewareTable {
        &self.middleware
    }

    pub fn mounted_routes(&self) -> &[MountedRoute] {
        &self.mounted
    }

    /// The next stage to run; `None` once `core:listen` completed.
    pub fn next_stage(&self) -> Option<Stage> {
        self.lifecycle.next_stage()
    }

    /// Address the listener is bound to, after `core:listen`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.backend.local_addr()
    }

    /// The composed request handler, usable without binding a listener.
    pub fn router(&self) -> axum::Router {
        self.backend.router()
    }

    pub fn before<F, Fut>(&mut self, stage: &str, hook: F) -> bool
    where
        F: FnOnce(AppHandle) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.lifecycle.before(stage, hook)
    }

    pub fn after<F, Fut>(&mut self, stage: &str, hook: F) -> bool
    where
        F: FnOnce(AppHandle) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.lifecycle.after(stage, hook)
    }

    /// Register application-wide middleware; see [`MiddlewareTable::add`].
    pub fn add_middleware(&mut self, name: impl Into<String>, middleware: Middleware, order: Option<f64>) -> f64 {
        let name = name.into();
        if self.next_stage().is_none_or(|next| next > Stage::CoreStart) {
            tracing::warn!("Middleware '{}' registered after 'core:start'; it will not be applied", name);
        }
        self.middleware.add(name, middleware, order)
    }

    /// Boot in automatic mode: every completed stage triggers the next.
    pub async fn start(&mut self) -> Result<()> {
        if !self.context.config.auto {
            return Err(LifecycleError::misuse("start() on an application configured for manual drive").into());
        }
        if self.lifecycle.has_started() {
            return Err(LifecycleError::misuse("application already started").into());
        }

        let mut completions = self.context.events.subscribe::<StageCompleted>();
        self.advance().await?;
        while let Some(StageCompleted { stage, next }) = completions.recv().await {
            match next {
                Some(_) => {
                    self.advance().await?;
                }
                None => {
                    tracing::info!("Boot finished after '{}'", stage);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Boot in manual mode, one stage per [`StageStep::run`].
    pub fn drive(&mut self) -> Result<StageStep<'_>> {
        if self.context.config.auto {
            return Err(LifecycleError::misuse("manual drive of an application configured for automatic start").into());
        }
        if self.lifecycle.has_started() {
            return Err(LifecycleError::misuse("application already started").into());
        }
        Ok(StageStep {
            app: self,
            stage: Stage::FIRST,
        })
    }

    /// Run the next stage: before-hooks, body, after-hooks, then transition.
    async fn advance(&mut self) -> Result<Option<Stage>> {
        let stage = self.lifecycle.begin()?;
        let app = self.context.handle();
        tracing::info!("Stage '{}'", stage);

        self.lifecycle.exec_before(stage, &app).await?;
        self.run_stage(stage).await?;
        self.lifecycle.exec_after(stage, &app).await?;

        let next = self.lifecycle.complete(stage)?;
        self.context.events.publish(StageCompleted { stage, next });
        Ok(next)
    }

    async fn run_stage(&mut self, stage: Stage) -> Result<()> {
        let context = Arc::clone(&self.context);
        let app = context.handle();

        match stage {
            Stage::Init => context.config.validate()?,
            Stage::InitServer => self.backend.create_router(DEFAULT_ROUTER),
            Stage::InitServices => activate(&context.services, &app)?,
            Stage::InitFilters => activate(&context.filters, &app)?,
            Stage::InitModels => activate(&context.models, &app)?,
            Stage::InitControllers => activate(&context.controllers, &app)?,
            Stage::InitRoutes => self.mount_routes(&context)?,
            Stage::InitDone => tracing::info!(
                "Initialized {} services, {} filters, {} models, {} controllers and {} routes",
                context.services.len(),
                context.filters.len(),
                context.models.len(),
                context.controllers.len(),
                self.mounted.len()
            ),
            Stage::CoreStart => self.apply_middleware(&context.config),
            Stage::CoreListen => {
                self.backend.listen(&context.config).await?;
            }
        }
        Ok(())
    }

    fn mount_routes(&mut self, context: &AppContext) -> Result<()> {
        let config = &context.config;
        let templates: Vec<&RouteTemplate> = [config.routes.rest.as_ref(), config.routes.crud.as_ref()]
            .into_iter()
            .flatten()
            .collect();
        if !templates.is_empty() {
            let models: Vec<String> = context
                .models
                .names()
                .into_iter()
                .filter(|name| context.models.instance(name).is_some())
                .collect();
            let added = generate_routes(&templates, &models, &mut self.routes);
            tracing::debug!("Generated {} routes for {} models", added, models.len());
        }

        let compiled =
            RouteCompiler::new(context, &self.policies, self.security_filter.as_ref()).compile_all(&self.routes)?;

        for route in compiled {
            if !self.backend.has_router(&route.router) {
                self.backend.create_router(&route.router);
            }
            for method in &route.methods {
                match self.backend.mount(&route.router, method, &route.url, route.chain.clone()) {
                    Ok(()) => self.mounted.push(MountedRoute {
                        method: method.clone(),
                        url: route.url.clone(),
                        router: route.router.clone(),
                    }),
                    Err(e) => tracing::warn!("Not mounting {} {}: {}", method, route.url, e),
                }
            }
        }
        Ok(())
    }

    fn apply_middleware(&mut self, config: &AppConfig) {
        let mut applied = Vec::with_capacity(self.middleware.len());
        if let Some(max) = config.max_connections {
            self.backend.limit_concurrency(max);
        }
        for entry in self.middleware.sorted() {
            tracing::debug!("Applying middleware '{}' (order {})", entry.name, entry.order);
            applied.push(Arc::clone(&entry.middleware));
        }
        self.backend.apply_middleware(applied);
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(&mut self) {
        tracing::info!("Shutting down application...");
        self.backend.shutdown().await;
        tracing::info!("Application shutdown complete");
    }
}

fn activate<T: ?Sized + Component>(registry: &Registry<T>, app: &AppHandle) -> Result<()> {
    let activated = registry.init_all(app)?;
    tracing::debug!("Activated {} {}s", activated, registry.kind());
    Ok(())
}

/// Continuation of a manually driven boot.
///
/// ```rust,ignore
/// let mut step = app.drive()?;
/// while let Some(next) = step.run().await? {
///     step = next;
/// }
/// ```
pub struct StageStep<'a> {
    app: &'a mut Application,
    stage: Stage,
}

impl<'a> StageStep<'a> {
    /// The stage [`StageStep::run`] will execute.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub async fn run(self) -> Result<Option<StageStep<'a>>> {
        let StageStep { app, .. } = self;
        let next = app.advance().await?;
        Ok(next.map(move |stage| StageStep { app, stage }))
    }
}

/// Builder for Application
pub struct ApplicationBuilder {
    config: Option<AppConfig>,
    lifecycle: LifecycleManager,
    policies: PolicyMap,
    routes: Vec<Route>,
    middleware: MiddlewareTable,
    security_filter: Option<SecurityFilter>,
    backend: Option<Box<dyn RouterBackend>>,
    registrations: Vec<Registration>,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            lifecycle: LifecycleManager::new(),
            policies: PolicyMap::new(),
            routes: Vec::new(),
            middleware: MiddlewareTable::new(),
            security_filter: None,
            backend: None,
            registrations: Vec::new(),
        }
    }

    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn policies(mut self, policies: PolicyMap) -> Self {
        self.policies = policies;
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn routes(mut self, routes: impl IntoIterator<Item = Route>) -> Self {
        self.routes.extend(routes);
        self
    }

    pub fn middleware(mut self, name: impl Into<String>, middleware: Middleware, order: Option<f64>) -> Self {
        self.middleware.add(name, middleware, order);
        self
    }

    /// Filter that `false` policies resolve to; overrides `security_filter` in the configuration.
    pub fn security_filter(mut self, filter: SecurityFilter) -> Self {
        self.security_filter = Some(filter);
        self
    }

    /// Replace the bundled axum backend.
    pub fn backend(mut self, backend: impl RouterBackend + 'static) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    pub fn before<F, Fut>(mut self, stage: &str, hook: F) -> Self
    where
        F: FnOnce(AppHandle) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.lifecycle.before(stage, hook);
        self
    }

    pub fn after<F, Fut>(mut self, stage: &str, hook: F) -> Self
    where
        F: FnOnce(AppHandle) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.lifecycle.after(stage, hook);
        self
    }

    pub fn service<C, F>(self, name: impl Into<String>, factory: F) -> Self
    where
        C: Service,
        F: Fn(&AppHandle) -> anyhow::Result<C> + Send + Sync + 'static,
    {
        let factory: Factory<dyn Service> = Arc::new(move |app: &AppHandle| -> anyhow::Result<Arc<dyn Service>> {
            let instance: Arc<dyn Service> = Arc::new(factory(app)?);
            Ok(instance)
        });
        self.register(name.into(), |ctx| &ctx.services, factory)
    }

    pub fn filter<C, F>(self, name: impl Into<String>, factory: F) -> Self
    where
        C: Filter,
        F: Fn(&AppHandle) -> anyhow::Result<C> + Send + Sync + 'static,
    {
        let factory: Factory<dyn Filter> = Arc::new(move |app: &AppHandle| -> anyhow::Result<Arc<dyn Filter>> {
            let instance: Arc<dyn Filter> = Arc::new(factory(app)?);
            Ok(instance)
        });
        self.register(name.into(), |ctx| &ctx.filters, factory)
    }

    pub fn model<C, F>(self, name: impl Into<String>, factory: F) -> Self
    where
        C: Model,
        F: Fn(&AppHandle) -> anyhow::Result<C> + Send + Sync + 'static,
    {
        let factory: Factory<dyn Model> = Arc::new(move |app: &AppHandle| -> anyhow::Result<Arc<dyn Model>> {
            let instance: Arc<dyn Model> = Arc::new(factory(app)?);
            Ok(instance)
        });
        self.register(name.into(), |ctx| &ctx.models, factory)
    }

    pub fn controller<C, F>(self, name: impl Into<String>, factory: F) -> Self
    where
        C: Controller,
        F: Fn(&AppHandle) -> anyhow::Result<C> + Send + Sync + 'static,
    {
        let factory: Factory<dyn Controller> =
            Arc::new(move |app: &AppHandle| -> anyhow::Result<Arc<dyn Controller>> {
                let instance: Arc<dyn Controller> = Arc::new(factory(app)?);
                Ok(instance)
            });
        self.register(name.into(), |ctx| &ctx.controllers, factory)
    }

    fn register<T>(mut self, name: String, registry: fn(&AppContext) -> &Registry<T>, factory: Factory<T>) -> Self
    where
        T: ?Sized + Component,
    {
        self.registrations
            .push(Box::new(move |ctx: &AppContext| registry(ctx).add(name, factory)));
        self
    }

    pub fn build(self) -> Result<Application> {
        let config = self.config.ok_or(TrellisError::NotConfigured)?;
        config.validate()?;

        let mut lifecycle = self.lifecycle;
        lifecycle.configure(config.hook_timeout(), config.hooks.abort_on_error);

        let mut middleware = self.middleware;
        if config.http.log_requests {
            middleware.add("requestLogger", builtins::request_logger(), Some(0.0));
        }

        let security_filter = self
            .security_filter
            .or_else(|| config.security_filter.clone().map(SecurityFilter::Named));

        let context = Arc::new(AppContext::new(config));
        for registration in self.registrations {
            registration(&context);
        }

        Ok(Application {
            context,
            lifecycle,
            policies: self.policies,
            routes: self.routes,
            middleware,
            security_filter,
            backend: self.backend.unwrap_or_else(|| Box::new(AxumBackend::new())),
            mounted: Vec::new(),
        })
    }
}
