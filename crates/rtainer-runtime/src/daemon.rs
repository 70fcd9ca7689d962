//! Background drivers: the tick driver and the reconciliation daemon.
//!
//! On the real executive these entry points are the tick interrupt and a
//! periodic daemon task; here each is a thread that stops when its handle
//! is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use rtainer_core::Isolation;

use crate::exec::ThreadExecutive;
use crate::manager::ContainerManager;

/// A periodic background thread; stops and joins on drop.
#[derive(Debug)]
pub struct PeriodicDriver {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicDriver {
    fn spawn(name: &str, period: Duration, mut body: impl FnMut() + Send + 'static) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                while !stop_flag.load(Ordering::Relaxed) {
                    std::thread::sleep(period);
                    if stop_flag.load(Ordering::Relaxed) {
                        break;
                    }
                    body();
                }
            })
            .ok();
        Self {
            stop,
            handle,
        }
    }

    /// Requests the driver to stop and waits for its thread.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PeriodicDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawns the tick driver: advances the executive clock and invokes the
/// isolation tick hook with the sampled running task. The sample consults
/// the admission check, so a task whose cgroup is over quota or in
/// penalty is never treated as the current task and never charged.
#[must_use]
pub fn spawn_tick_driver(
    exec: Arc<ThreadExecutive>,
    isolation: Arc<Isolation>,
    period: Duration,
) -> PeriodicDriver {
    PeriodicDriver::spawn("rtainer-tick", period, move || {
        let now = exec.advance_tick();
        let current = exec.sample_running(|task| isolation.can_run(task));
        isolation.on_tick(now, current);
    })
}

/// Spawns the reconciliation daemon: periodically folds exited container
/// tasks back into the STOPPED state.
#[must_use]
pub fn spawn_reconciler(manager: Arc<ContainerManager>, period: Duration) -> PeriodicDriver {
    PeriodicDriver::spawn("rtainer-reconcile", period, move || {
        manager.reconcile();
    })
}
