use crate::component::Component;
use crate::context::AppHandle;
use crate::error::{Result, TrellisError};
use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Constructs a component from the host application.
pub type Factory<T> = Arc<dyn Fn(&AppHandle) -> anyhow::Result<Arc<T>> + Send + Sync>;

/// A registry slot: either the raw definition or the activated instance.
pub enum ComponentSlot<T: ?Sized> {
    Definition(Factory<T>),
    Instance(Arc<T>),
}

impl<T: ?Sized> Clone for ComponentSlot<T> {
    fn clone(&self) -> Self {
        match self {
            ComponentSlot::Definition(factory) => ComponentSlot::Definition(Arc::clone(factory)),
            ComponentSlot::Instance(instance) => ComponentSlot::Instance(Arc::clone(instance)),
        }
    }
}

impl<T: ?Sized> ComponentSlot<T> {
    pub fn is_active(&self) -> bool {
        matches!(self, ComponentSlot::Instance(_))
    }
}

/// Named store of component definitions and their activated instances.
///
/// Slots are activated in registration order. Overwriting a name with
/// [`Registry::add`] keeps its original position.
pub struct Registry<T: ?Sized> {
    kind: &'static str,
    slots: DashMap<String, ComponentSlot<T>>,
    order: RwLock<Vec<String>>,
}

impl<T: ?Sized + Component> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            slots: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Store a raw definition under `name`, replacing whatever was there.
    pub fn add(&self, name: impl Into<String>, factory: Factory<T>) {
        self.insert(name.into(), ComponentSlot::Definition(factory));
    }

    /// Store an already constructed instance under `name`.
    pub fn add_instance(&self, name: impl Into<String>, instance: Arc<T>) {
        self.insert(name.into(), ComponentSlot::Instance(instance));
    }

    fn insert(&self, name: String, slot: ComponentSlot<T>) {
        if self.slots.insert(name.clone(), slot).is_none() {
            self.order
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .push(name);
        }
    }

    /// Whatever is currently stored under `name`, activated or not.
    pub fn get(&self, name: &str) -> Option<ComponentSlot<T>> {
        self.slots.get(name).map(|slot| slot.value().clone())
    }

    /// The activated instance under `name`, if any.
    pub fn instance(&self, name: &str) -> Option<Arc<T>> {
        match self.get(name)? {
            ComponentSlot::Instance(instance) => Some(instance),
            ComponentSlot::Definition(_) => None,
        }
    }

    /// Construct the instance for `name` and replace its definition with it.
    ///
    /// The instance's [`Component::initialize`] runs right after the slot
    /// is replaced, so it can already find itself through the application.
    pub fn init(&self, name: &str, app: &AppHandle) -> Result<Arc<T>> {
        let factory = match self.get(name) {
            Some(ComponentSlot::Definition(factory)) => factory,
            Some(ComponentSlot::Instance(_)) => {
                return Err(TrellisError::ComponentAlreadyActive {
                    kind: self.kind,
                    name: name.to_string(),
                });
            }
            None => {
                return Err(TrellisError::ComponentNotFound {
                    kind: self.kind,
                    name: name.to_string(),
                });
            }
        };

        let instance = factory(app).map_err(|source| TrellisError::ComponentInit {
            kind: self.kind,
            name: name.to_string(),
            source,
        })?;
        self.slots
            .insert(name.to_string(), ComponentSlot::Instance(Arc::clone(&instance)));
        instance.initialize(app)?;

        tracing::debug!("Activated {} '{}'", self.kind, name);
        Ok(instance)
    }

    /// Activate every slot still holding a definition, in registration order.
    ///
    /// Returns the number of components activated.
    pub fn init_all(&self, app: &AppHandle) -> Result<usize> {
        let mut activated = 0;
        for name in self.names() {
            match self.get(&name) {
                Some(ComponentSlot::Definition(_)) => {
                    self.init(&name, app)?;
                    activated += 1;
                }
                Some(ComponentSlot::Instance(_)) => {
                    tracing::debug!("Skipping {} '{}': already active", self.kind, name);
                }
                None => {}
            }
        }
        Ok(activated)
    }

    pub fn remove(&self, name: &str) -> Option<ComponentSlot<T>> {
        let removed = self.slots.remove(name).map(|(_, slot)| slot);
        if removed.is_some() {
            self.order
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|existing| existing != name);
        }
        removed
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.order
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{AsAny, Service};
    use crate::config::AppConfig;
    use crate::context::AppContext;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        initialized: AtomicUsize,
    }

    impl Component for Counter {
        fn initialize(&self, _app: &AppHandle) -> Result<()> {
            self.initialized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Service for Counter {}

    struct Named(&'static str);

    impl Component for Named {}
    impl Service for Named {}

    fn counter_factory() -> Factory<dyn Service> {
        Arc::new(|_app: &AppHandle| -> anyhow::Result<Arc<dyn Service>> {
            Ok(Arc::new(Counter {
                initialized: AtomicUsize::new(0),
            }))
        })
    }

    fn logging_factory(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Factory<dyn Service> {
        let log = Arc::clone(log);
        Arc::new(move |_app: &AppHandle| -> anyhow::Result<Arc<dyn Service>> {
            log.lock().unwrap().push(name);
            Ok(Arc::new(Named(name)))
        })
    }

    fn context() -> Arc<AppContext> {
        Arc::new(AppContext::new(AppConfig::default()))
    }

    #[test]
    fn test_add_get_and_init() {
        let ctx = context();
        let app = ctx.handle();
        ctx.services.add("Counter", counter_factory());

        assert!(matches!(ctx.services.get("Counter"), Some(ComponentSlot::Definition(_))));
        assert!(ctx.services.instance("Counter").is_none());

        ctx.services.init("Counter", &app).unwrap();
        assert!(ctx.services.get("Counter").unwrap().is_active());

        let counter = app.service_as::<Counter>("Counter").unwrap();
        assert_eq!(counter.initialized.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_init_unknown_fails_loudly() {
        let ctx = context();
        let err = ctx.services.init("Missing", &ctx.handle()).err().unwrap();
        assert!(matches!(err, TrellisError::ComponentNotFound { kind: "service", .. }));
    }

    #[test]
    fn test_reactivation_is_rejected() {
        let ctx = context();
        let app = ctx.handle();
        ctx.services.add("Counter", counter_factory());
        ctx.services.init("Counter", &app).unwrap();
        let err = ctx.services.init("Counter", &app).err().unwrap();
        assert!(matches!(err, TrellisError::ComponentAlreadyActive { .. }));
    }

    #[test]
    fn test_init_all_follows_registration_order() {
        let ctx = context();
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["b", "a", "c"] {
            ctx.services.add(name, logging_factory(name, &log));
        }
        // Overwriting keeps the original slot position
        ctx.services.add("b", logging_factory("b2", &log));

        assert_eq!(ctx.services.init_all(&ctx.handle()).unwrap(), 3);
        assert_eq!(*log.lock().unwrap(), vec!["b2", "a", "c"]);
        assert_eq!(ctx.services.names(), vec!["b", "a", "c"]);

        let b = ctx.services.instance("b").unwrap();
        assert_eq!(AsAny::as_any(b).downcast::<Named>().unwrap().0, "b2");
    }

    #[test]
    fn test_init_all_skips_active_instances() {
        let ctx = context();
        let log = Arc::new(Mutex::new(Vec::new()));
        ctx.services.add_instance("ready", Arc::new(Named("ready")));
        ctx.services.add("lazy", logging_factory("lazy", &log));

        assert_eq!(ctx.services.init_all(&ctx.handle()).unwrap(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["lazy"]);
    }

    #[test]
    fn test_factory_error_is_wrapped() {
        let ctx = context();
        ctx.services.add(
            "Broken",
            Arc::new(|_app: &AppHandle| -> anyhow::Result<Arc<dyn Service>> {
                Err(anyhow::anyhow!("no database"))
            }),
        );
        let err = ctx.services.init_all(&ctx.handle()).unwrap_err();
        assert!(matches!(err, TrellisError::ComponentInit { kind: "service", .. }));
    }

    #[test]
    fn test_remove() {
        let ctx = context();
        ctx.services.add("Counter", counter_factory());
        assert!(ctx.services.remove("Counter").is_some());
        assert!(!ctx.services.contains("Counter"));
        assert!(ctx.services.names().is_empty());
    }

    #[test]
    fn test_factory_sees_earlier_siblings() {
        let ctx = context();
        let app = ctx.handle();
        ctx.services.add("Counter", counter_factory());
        ctx.services.add(
            "Dependent",
            Arc::new(|app: &AppHandle| -> anyhow::Result<Arc<dyn Service>> {
                app.service_as::<Counter>("Counter")
                    .ok_or_else(|| anyhow::anyhow!("Counter not active"))?;
                Ok(Arc::new(Named("dependent")))
            }),
        );
        assert_eq!(ctx.services.init_all(&app).unwrap(), 2);
    }
}
