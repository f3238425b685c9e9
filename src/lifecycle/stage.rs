use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// The fixed, ordered sequence of boot stages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum Stage {
    #[strum(serialize = "init")]
    Init,
    #[strum(serialize = "init:server")]
    InitServer,
    #[strum(serialize = "init:services")]
    InitServices,
    #[strum(serialize = "init:filters")]
    InitFilters,
    #[strum(serialize = "init:models")]
    InitModels,
    #[strum(serialize = "init:controllers")]
    InitControllers,
    #[strum(serialize = "init:routes")]
    InitRoutes,
    #[strum(serialize = "init:done")]
    InitDone,
    #[strum(serialize = "core:start")]
    CoreStart,
    #[strum(serialize = "core:listen")]
    CoreListen,
}

impl Stage {
    pub const FIRST: Stage = Stage::Init;

    /// The stage that follows this one; `None` after `core:listen`.
    pub fn next(self) -> Option<Stage> {
        use Stage::*;
        match self {
            Init => Some(InitServer),
            InitServer => Some(InitServices),
            InitServices => Some(InitFilters),
            InitFilters => Some(InitModels),
            InitModels => Some(InitControllers),
            InitControllers => Some(InitRoutes),
            InitRoutes => Some(InitDone),
            InitDone => Some(CoreStart),
            CoreStart => Some(CoreListen),
            CoreListen => None,
        }
    }
}

/// Published on the application event bus after a stage and its after-hooks finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageCompleted {
    pub stage: Stage,
    pub next: Option<Stage>,
}
