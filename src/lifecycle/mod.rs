//! Lifecycle Module
//!
//! Boot is a fixed sequence of stages, each with before and after hooks:
//!
//! ```text
//! init
//!   ↓
//! init:server           create the default router
//!   ↓
//! init:services         activate registries, in this order
//! init:filters
//! init:models
//! init:controllers
//!   ↓
//! init:routes           generate, compile and mount routes
//!   ↓
//! init:done
//!   ↓
//! core:start            apply application middleware
//!   ↓
//! core:listen           bind host:port
//! ```
//!
//! Every stage runs exactly once. A stage starts only after the previous
//! stage's after-hooks finished.
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis::prelude::*;
//!
//! let mut app = Application::builder()
//!     .config(config)
//!     .policies(PolicyMap::with_global(true))
//!     .before("init:routes", |app| async move {
//!         tracing::info!("{} controllers ready", app.context().map_or(0, |c| c.controllers.len()));
//!         Ok(())
//!     })
//!     .build()?;
//!
//! app.start().await?;
//! ```

mod application;
mod error;
mod manager;
mod shutdown;
mod stage;

pub use application::{Application, ApplicationBuilder, MountedRoute, StageStep};
pub use error::{LifecycleError, Result};
pub use manager::{LifecycleManager, Phase};
pub use shutdown::shutdown_signal;
pub use stage::{Stage, StageCompleted};
