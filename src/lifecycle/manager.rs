//! Lifecycle Manager
//!
//! Owns the before/after hook lists of every stage and the cursor that walks
//! the stage sequence.

use super::{LifecycleError, Result, Stage};
use crate::context::AppHandle;
use crate::middleware::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use strum_macros::Display;

type Hook = Box<dyn FnOnce(AppHandle) -> BoxFuture<anyhow::Result<()>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Phase {
    #[strum(serialize = "before")]
    Before,
    #[strum(serialize = "after")]
    After,
}

#[derive(Default)]
struct StageHooks {
    before: Vec<Hook>,
    after: Vec<Hook>,
}

/// Drives the stage sequence and runs hooks in series.
///
/// Each hook runs exactly once, in registration order, and the next hook
/// starts only after the previous one completed. A failing hook skips the
/// rest of its series; by default boot then continues with the stage body.
///
/// # Example
///
/// ```rust,ignore
/// let mut manager = LifecycleManager::new();
/// manager.before("init:server", |_app| async { Ok(()) });
///
/// let stage = manager.begin()?;
/// manager.exec_before(stage, &app).await?;
/// // ... stage body ...
/// manager.exec_after(stage, &app).await?;
/// manager.complete(stage);
/// ```
pub struct LifecycleManager {
    hooks: HashMap<Stage, StageHooks>,
    next: Option<Stage>,
    started: bool,
    hook_timeout: Option<Duration>,
    abort_on_error: bool,
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self {
            hooks: HashMap::new(),
            next: Some(Stage::FIRST),
            started: false,
            hook_timeout: None,
            abort_on_error: false,
        }
    }

    /// Apply hook timeout and failure policy.
    pub fn configure(&mut self, hook_timeout: Option<Duration>, abort_on_error: bool) {
        self.hook_timeout = hook_timeout;
        self.abort_on_error = abort_on_error;
    }

    /// Register a hook to run before the named stage's body.
    ///
    /// Unknown stage names are logged and ignored. Returns whether the hook
    /// was registered.
    pub fn before<F, Fut>(&mut self, stage: &str, hook: F) -> bool
    where
        F: FnOnce(AppHandle) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(stage, Phase::Before, hook)
    }

    /// Register a hook to run after the named stage's body.
    pub fn after<F, Fut>(&mut self, stage: &str, hook: F) -> bool
    where
        F: FnOnce(AppHandle) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(stage, Phase::After, hook)
    }

    fn register<F, Fut>(&mut self, stage: &str, phase: Phase, hook: F) -> bool
    where
        F: FnOnce(AppHandle) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let Ok(stage) = stage.parse::<Stage>() else {
            tracing::warn!("Ignoring {} hook for unknown stage '{}'", phase, stage);
            return false;
        };
        if !self.is_pending(stage) {
            tracing::warn!("Stage '{}' already ran; its {} hook will never be called", stage, phase);
        }

        let hook: Hook = Box::new(move |app: AppHandle| -> BoxFuture<anyhow::Result<()>> {
            Box::pin(hook(app))
        });
        let hooks = self.hooks.entry(stage).or_default();
        match phase {
            Phase::Before => hooks.before.push(hook),
            Phase::After => hooks.after.push(hook),
        }
        true
    }

    /// Number of hooks still waiting to run for `stage` in `phase`.
    pub fn hook_count(&self, stage: Stage, phase: Phase) -> usize {
        self.hooks.get(&stage).map_or(0, |hooks| match phase {
            Phase::Before => hooks.before.len(),
            Phase::After => hooks.after.len(),
        })
    }

    pub fn next_stage(&self) -> Option<Stage> {
        self.next
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn is_finished(&self) -> bool {
        self.next.is_none()
    }

    fn is_pending(&self, stage: Stage) -> bool {
        self.next.is_some_and(|next| stage >= next)
    }

    /// Claim the next stage for execution.
    pub fn begin(&mut self) -> Result<Stage> {
        let stage = self.next.ok_or(LifecycleError::Finished)?;
        self.started = true;
        Ok(stage)
    }

    /// Mark `stage` as done and move the cursor to its successor.
    pub fn complete(&mut self, stage: Stage) -> Result<Option<Stage>> {
        match self.next {
            Some(expected) if expected == stage => {
                self.next = stage.next();
                Ok(self.next)
            }
            Some(expected) => Err(LifecycleError::OutOfOrder {
                expected,
                found: stage,
            }),
            None => Err(LifecycleError::Finished),
        }
    }

    pub async fn exec_before(&mut self, stage: Stage, app: &AppHandle) -> Result<()> {
        let hooks = self
            .hooks
            .get_mut(&stage)
            .map(|hooks| std::mem::take(&mut hooks.before))
            .unwrap_or_default();
        run_series(stage, Phase::Before, hooks, app, self.hook_timeout, self.abort_on_error).await
    }

    pub async fn exec_after(&mut self, stage: Stage, app: &AppHandle) -> Result<()> {
        let hooks = self
            .hooks
            .get_mut(&stage)
            .map(|hooks| std::mem::take(&mut hooks.after))
            .unwrap_or_default();
        run_series(stage, Phase::After, hooks, app, self.hook_timeout, self.abort_on_error).await
    }
}

async fn run_series(
    stage: Stage,
    phase: Phase,
    hooks: Vec<Hook>,
    app: &AppHandle,
    hook_timeout: Option<Duration>,
    abort_on_error: bool,
) -> Result<()> {
    let total = hooks.len();
    for (index, hook) in hooks.into_iter().enumerate() {
        tracing::debug!("Running {} hook {}/{} for '{}'", phase, index + 1, total, stage);

        let outcome = match hook_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, hook(app.clone())).await {
                Ok(result) => result.map_err(|e| LifecycleError::hook_failed(stage, format!("{:#}", e))),
                Err(_) => Err(LifecycleError::timeout(
                    format!("{} {}", phase, stage),
                    format!("Timeout after {:?}", timeout),
                )),
            },
            None => hook(app.clone())
                .await
                .map_err(|e| LifecycleError::hook_failed(stage, format!("{:#}", e))),
        };

        if let Err(e) = outcome {
            tracing::error!(
                "{} hook {}/{} for '{}' failed, skipping {} remaining: {}",
                phase,
                index + 1,
                total,
                stage,
                total - index - 1,
                e
            );
            if abort_on_error {
                return Err(e);
            }
            return Ok(());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::context::AppContext;
    use std::sync::{Arc, Mutex};

    fn app() -> (Arc<AppContext>, AppHandle) {
        let ctx = Arc::new(AppContext::new(AppConfig::default()));
        let handle = ctx.handle();
        (ctx, handle)
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, entry: &str) -> impl FnOnce(AppHandle) -> BoxFuture<anyhow::Result<()>> + Send + 'static {
        let log = Arc::clone(log);
        let entry = entry.to_string();
        move |_app: AppHandle| -> BoxFuture<anyhow::Result<()>> {
            Box::pin(async move {
                log.lock().unwrap().push(entry);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_hooks_run_in_registration_order_once() {
        let (_ctx, app) = app();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = LifecycleManager::new();
        manager.before("init", recorder(&log, "first"));
        manager.before("init", recorder(&log, "second"));

        manager.exec_before(Stage::Init, &app).await.unwrap();
        manager.exec_before(Stage::Init, &app).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(manager.hook_count(Stage::Init, Phase::Before), 0);
    }

    #[tokio::test]
    async fn test_unknown_stage_is_ignored() {
        let mut manager = LifecycleManager::new();
        assert!(!manager.before("init:views", |_app| async { Ok(()) }));
        assert!(!manager.after("init:views", |_app| async { Ok(()) }));
    }

    #[tokio::test]
    async fn test_failing_hook_skips_rest_but_continues() {
        let (_ctx, app) = app();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = LifecycleManager::new();
        manager.after("init:models", recorder(&log, "one"));
        manager.after("init:models", |_app| async { Err(anyhow::anyhow!("boom")) });
        manager.after("init:models", recorder(&log, "three"));

        manager.exec_after(Stage::InitModels, &app).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["one"]);
    }

    #[tokio::test]
    async fn test_abort_on_error_propagates() {
        let (_ctx, app) = app();
        let mut manager = LifecycleManager::new();
        manager.configure(None, true);
        manager.before("init", |_app| async { Err(anyhow::anyhow!("boom")) });

        let err = manager.exec_before(Stage::Init, &app).await.unwrap_err();
        assert!(matches!(err, LifecycleError::HookFailed { stage: Stage::Init, .. }));
    }

    #[tokio::test]
    async fn test_stalled_hook_times_out() {
        let (_ctx, app) = app();
        let mut manager = LifecycleManager::new();
        manager.configure(Some(Duration::from_millis(20)), true);
        manager.before("init", |_app| async {
            std::future::pending::<()>().await;
            Ok(())
        });

        let err = manager.exec_before(Stage::Init, &app).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Timeout { .. }));
    }

    #[test]
    fn test_cursor_walks_every_stage_once() {
        let mut manager = LifecycleManager::new();
        let mut seen = Vec::new();
        while let Ok(stage) = manager.begin() {
            seen.push(stage);
            manager.complete(stage).unwrap();
        }
        assert_eq!(seen.len(), 10);
        assert!(manager.is_finished());
        assert!(matches!(manager.complete(Stage::Init), Err(LifecycleError::Finished)));
    }

    #[test]
    fn test_completing_out_of_order_fails() {
        let mut manager = LifecycleManager::new();
        let err = manager.complete(Stage::InitRoutes).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::OutOfOrder {
                expected: Stage::Init,
                found: Stage::InitRoutes
            }
        ));
    }
}
