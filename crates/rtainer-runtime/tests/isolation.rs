//! Isolation verification through the full container path: namespace
//! application from the task's own context, per-container virtual PIDs,
//! IPC access control between running containers, and CPU quota gating.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rtainer_common::error::Result;
use rtainer_common::types::{ContainerId, ContainerState, ResourceLimits, TaskId};
use rtainer_core::filesystem::{DiskStorage, Storage};
use rtainer_core::ipc::{IsolatedQueue, Semaphore, Wait};
use rtainer_core::task::Executive;
use rtainer_core::Isolation;
use rtainer_image::{codec, ImageStore};
use rtainer_runtime::{ContainerManager, ProgramLoader, ThreadExecutive};

struct Harness {
    _dir: tempfile::TempDir,
    isolation: Arc<Isolation>,
    exec: Arc<ThreadExecutive>,
    manager: ContainerManager,
    release: Semaphore,
    entered: Semaphore,
}

// Every container program blocks until released, so the containers stay
// RUNNING while the test inspects them.
fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage: Arc<dyn Storage> = Arc::new(DiskStorage::new(dir.path()).expect("storage"));
    let isolation = Arc::new(Isolation::new());
    let exec = Arc::new(ThreadExecutive::new());

    let entered = Semaphore::counting(u32::MAX, 0);
    let release = Semaphore::counting(u32::MAX, 0);
    let loader_entered = entered.clone();
    let loader_release = release.clone();
    let loader = move |_: &[u8]| -> Result<()> {
        loader_entered.give();
        loader_release.take(Wait::Forever);
        Ok(())
    };

    let manager = ContainerManager::new(
        Arc::clone(&isolation),
        Arc::clone(&exec) as Arc<dyn Executive>,
        Arc::clone(&storage),
        Arc::new(loader) as Arc<dyn ProgramLoader>,
    );

    storage.mkdir("/src").expect("mkdir");
    storage.write("/src/app.bin", b"PROGRAM").expect("write");
    codec::pack(storage.as_ref(), "/src", "/app.img").expect("pack");
    ImageStore::new(storage.as_ref()).load("/app.img").expect("load");

    Harness {
        _dir: dir,
        isolation,
        exec,
        manager,
        release,
        entered,
    }
}

fn start_container(h: &Harness, name: &str) -> (ContainerId, TaskId) {
    let id = h.manager.create(name, "app.img", "app.bin", None).expect("create");
    h.manager.start(id).expect("start");
    assert!(h.entered.take(Wait::Ticks(5_000)), "program never started");
    let task = h.manager.get(id).expect("get").task.expect("task handle");
    (id, task)
}

fn wait_for_state(manager: &ContainerManager, id: ContainerId, expected: ContainerState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let state = manager.get(id).expect("container exists").state;
        if state == expected {
            return;
        }
        assert!(Instant::now() < deadline, "container stuck in {state}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn wrapper_applies_namespaces_cgroup_and_chroot() {
    let h = harness();
    let (id, task) = start_container(&h, "demo");

    // The task reached user code only after the wrapper verified its
    // memberships, so all of them must be observable now.
    assert_eq!(h.isolation.pid_namespaces.virtual_pid(task), Some(1));
    assert!(h.isolation.ipc.task_namespace(task).is_some());
    assert!(h.isolation.cgroups.task_group(task).is_some());
    assert_eq!(h.isolation.tasks.root(task), format!("/var/container/{id}"));
    assert_eq!(h.manager.cgroup_stats(id).expect("stats").task_count, 1);

    h.release.give();
    wait_for_state(&h.manager, id, ContainerState::Stopped);

    // Completion detaches the task from every controller.
    assert_eq!(h.isolation.pid_namespaces.virtual_pid(task), None);
    assert_eq!(h.isolation.ipc.task_namespace(task), None);
    assert_eq!(h.isolation.cgroups.task_group(task), None);
}

#[test]
fn both_containers_own_virtual_pid_one() {
    let h = harness();
    let (_, task_a) = start_container(&h, "alpha");
    let (_, task_b) = start_container(&h, "beta");

    assert_ne!(task_a, task_b);
    assert_eq!(h.isolation.pid_namespaces.virtual_pid(task_a), Some(1));
    assert_eq!(h.isolation.pid_namespaces.virtual_pid(task_b), Some(1));

    let ns_a = h.isolation.pid_namespaces.task_namespace(task_a).expect("ns a");
    let ns_b = h.isolation.pid_namespaces.task_namespace(task_b).expect("ns b");
    assert_ne!(ns_a, ns_b);
    assert_eq!(h.isolation.pid_namespaces.find_task(ns_a, 1), Some(task_a));
    assert_eq!(h.isolation.pid_namespaces.find_task(ns_b, 1), Some(task_b));

    h.release.give();
    h.release.give();
}

#[test]
fn queues_are_confined_to_their_namespace_with_root_override() {
    let h = harness();
    let (_, task_a) = start_container(&h, "alpha");
    let (_, task_b) = start_container(&h, "beta");

    // A queue created on behalf of container A's task lands in A's
    // namespace.
    let queue: IsolatedQueue<u32> =
        IsolatedQueue::create(&h.isolation.ipc, task_a, 4, "work").expect("queue");
    assert_eq!(queue.namespace(), h.isolation.ipc.task_namespace(task_a).expect("ns"));

    assert!(queue.send(task_a, 7, Wait::NoWait));
    assert!(!queue.send(task_b, 8, Wait::NoWait), "foreign send must fail");
    assert_eq!(queue.recv(task_b, Wait::NoWait), None, "foreign recv must fail");

    // A monitor task without an assigned namespace acts as root and may
    // drain any registered queue.
    let monitor = h.exec.adopt_current("monitor");
    assert_eq!(queue.recv(monitor, Wait::NoWait), Some(7));

    queue.unregister().expect("unregister");
    h.release.give();
    h.release.give();
}

#[test]
fn cpu_quota_gates_the_container_task() {
    let h = harness();
    let quota = 50u32;
    let id = h
        .manager
        .create(
            "budget",
            "app.img",
            "app.bin",
            Some(ResourceLimits {
                memory_bytes: 16_384,
                cpu_quota_ticks: quota,
            }),
        )
        .expect("create");
    h.manager.start(id).expect("start");
    assert!(h.entered.take(Wait::Ticks(5_000)), "program never started");
    let task = h.manager.get(id).expect("get").task.expect("task");

    // Drive the tick hook directly, attributing every tick to the
    // container task, as the single-processor scheduler would.
    let base = h.exec.now();
    for offset in 1..=u64::from(quota) {
        h.isolation.on_tick(base + offset, Some(task));
    }

    let stats = h.manager.cgroup_stats(id).expect("stats");
    assert_eq!(stats.cpu.ticks_used, quota);
    assert!(!h.isolation.can_run(task), "task at quota must be skipped");

    // Once gated, the dispatch sample must not pick the task at all, and
    // ticks a misbehaving host still attributes to it must not be
    // charged, so the quota is never overshot within the window.
    assert_eq!(h.exec.sample_running(|t| h.isolation.can_run(t)), None);
    for offset in 1..=10u64 {
        h.isolation.on_tick(base + u64::from(quota) + offset, Some(task));
    }
    let stats = h.manager.cgroup_stats(id).expect("stats");
    assert_eq!(stats.cpu.ticks_used, quota);
    assert_eq!(stats.cpu.penalty_ticks_left, 0);

    h.release.give();
}
