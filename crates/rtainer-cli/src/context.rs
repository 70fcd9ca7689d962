//! Shared runtime context of one `rtn` invocation.
//!
//! Builds the whole stack (storage, isolation subsystem, executive,
//! manager, background drivers) and registers the shell thread as a task
//! so path-bearing commands have a task context.

use std::sync::Arc;
use std::time::Duration;

use rtainer_common::config::RtainerConfig;
use rtainer_common::types::{ResourceLimits, TaskId};
use rtainer_core::filesystem::{DiskStorage, Storage, TaskFs};
use rtainer_core::task::Executive;
use rtainer_core::Isolation;
use rtainer_runtime::daemon::{spawn_reconciler, spawn_tick_driver, PeriodicDriver};
use rtainer_runtime::{ContainerManager, EchoLoader, ProgramLoader, ThreadExecutive};

/// Everything a command handler needs.
pub struct AppContext {
    /// The executive backend.
    pub exec: Arc<ThreadExecutive>,
    /// The isolation subsystem.
    pub isolation: Arc<Isolation>,
    /// The storage backend.
    pub storage: Arc<dyn Storage>,
    /// The container manager.
    pub manager: Arc<ContainerManager>,
    /// The program loader, also used by the `run` command.
    pub loader: Arc<dyn ProgramLoader>,
    /// Task identity of the shell itself.
    pub shell_task: TaskId,
    /// Filesystem view through the shell task's root and cwd.
    pub fs: TaskFs,
    /// Limits applied when a create command names none.
    pub default_limits: ResourceLimits,
    _tick_driver: PeriodicDriver,
    _reconciler: PeriodicDriver,
}

impl AppContext {
    /// Builds the runtime from a configuration.
    ///
    /// # Errors
    ///
    /// Fails if the storage backend cannot be initialised.
    pub fn new(config: &RtainerConfig) -> anyhow::Result<Self> {
        let storage: Arc<dyn Storage> = Arc::new(
            DiskStorage::new(config.data_dir.clone()).map_err(|e| anyhow::anyhow!("{e}"))?,
        );
        let isolation = Arc::new(Isolation::new());
        let exec = Arc::new(ThreadExecutive::new());
        let loader: Arc<dyn ProgramLoader> = Arc::new(EchoLoader);
        let manager = Arc::new(ContainerManager::new(
            Arc::clone(&isolation),
            Arc::clone(&exec) as Arc<dyn Executive>,
            Arc::clone(&storage),
            Arc::clone(&loader),
        ));

        let tick_driver = spawn_tick_driver(
            Arc::clone(&exec),
            Arc::clone(&isolation),
            Duration::from_millis(1),
        );
        let reconciler = spawn_reconciler(
            Arc::clone(&manager),
            Duration::from_millis(config.daemon_period_ticks),
        );

        let shell_task = exec.adopt_current("shell");
        isolation.tasks.register(shell_task);
        let fs = manager.fs().clone();

        Ok(Self {
            exec,
            isolation,
            storage,
            manager,
            loader,
            shell_task,
            fs,
            default_limits: config.default_limits,
            _tick_driver: tick_driver,
            _reconciler: reconciler,
        })
    }
}
