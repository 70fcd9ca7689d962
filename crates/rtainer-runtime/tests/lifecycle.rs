//! End-to-end container lifecycle tests: create, start, stop, delete,
//! reconciliation, and the unwind paths.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rtainer_common::constants::MAX_PID_NAMESPACES;
use rtainer_common::error::Result;
use rtainer_common::types::{ContainerId, ContainerState};
use rtainer_core::filesystem::{DiskStorage, Storage};
use rtainer_core::ipc::{Semaphore, Wait};
use rtainer_core::task::Executive;
use rtainer_core::Isolation;
use rtainer_image::{codec, ImageStore};
use rtainer_runtime::{ContainerManager, EchoLoader, ProgramLoader, ThreadExecutive};

struct Harness {
    _dir: tempfile::TempDir,
    storage: Arc<dyn Storage>,
    exec: Arc<ThreadExecutive>,
    manager: ContainerManager,
}

fn harness_with(loader: Arc<dyn ProgramLoader>) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage: Arc<dyn Storage> = Arc::new(DiskStorage::new(dir.path()).expect("storage"));
    let isolation = Arc::new(Isolation::new());
    let exec = Arc::new(ThreadExecutive::new());
    let manager = ContainerManager::new(
        isolation,
        Arc::clone(&exec) as Arc<dyn Executive>,
        Arc::clone(&storage),
        loader,
    );
    Harness {
        _dir: dir,
        storage,
        exec,
        manager,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(EchoLoader))
}

fn seed_image(storage: &Arc<dyn Storage>) {
    storage.mkdir("/src").expect("mkdir");
    storage.write("/src/app.bin", b"PROGRAM").expect("write");
    codec::pack(storage.as_ref(), "/src", "/app.img").expect("pack");
    ImageStore::new(storage.as_ref()).load("/app.img").expect("load");
}

fn wait_for_state(manager: &ContainerManager, id: ContainerId, expected: ContainerState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let state = manager.get(id).expect("container exists").state;
        if state == expected {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "container {id} stuck in {state}, expected {expected}"
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}

// A loader that blocks until released, to keep containers RUNNING.
fn blocking_loader() -> (Arc<dyn ProgramLoader>, Semaphore, Semaphore) {
    let entered = Semaphore::counting(u32::MAX, 0);
    let release = Semaphore::counting(u32::MAX, 0);
    let loader_entered = entered.clone();
    let loader_release = release.clone();
    let loader = move |_: &[u8]| -> Result<()> {
        loader_entered.give();
        loader_release.take(Wait::Forever);
        Ok(())
    };
    (Arc::new(loader), entered, release)
}

#[test]
fn create_unpacks_image_into_container_dir() {
    let h = harness();
    seed_image(&h.storage);

    let id = h.manager.create("demo", "app.img", "app.bin", None).expect("create");
    assert_eq!(id, ContainerId::new(1));

    let info = h.manager.get(id).expect("get");
    assert_eq!(info.state, ContainerState::Stopped);
    assert!(info.task.is_none());
    assert_eq!(
        h.storage.read("/var/container/1/app.bin").expect("unpacked"),
        b"PROGRAM"
    );
    assert_eq!(h.manager.count(), 1);
}

#[test]
fn full_lifecycle_runs_program_to_completion() {
    let executed: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&executed);
    let loader = move |program: &[u8]| -> Result<()> {
        record.lock().expect("record lock").push(program.to_vec());
        Ok(())
    };
    let h = harness_with(Arc::new(loader));
    seed_image(&h.storage);

    let id = h.manager.create("demo", "app.img", "app.bin", None).expect("create");
    h.manager.start(id).expect("start");
    wait_for_state(&h.manager, id, ContainerState::Stopped);

    let info = h.manager.get(id).expect("get");
    assert!(info.task.is_none());
    assert_eq!(executed.lock().expect("lock").as_slice(), &[b"PROGRAM".to_vec()]);
}

#[test]
fn start_of_running_container_fails() {
    let (loader, entered, release) = blocking_loader();
    let h = harness_with(loader);
    seed_image(&h.storage);

    let id = h.manager.create("demo", "app.img", "app.bin", None).expect("create");
    h.manager.start(id).expect("start");
    assert!(entered.take(Wait::Ticks(5_000)), "program never started");

    assert!(h.manager.start(id).is_err());
    release.give();
    wait_for_state(&h.manager, id, ContainerState::Stopped);
}

#[test]
fn stop_is_not_idempotent_and_clears_the_task() {
    let (loader, entered, release) = blocking_loader();
    let h = harness_with(loader);
    seed_image(&h.storage);

    let id = h.manager.create("demo", "app.img", "app.bin", None).expect("create");
    assert!(h.manager.stop(id).is_err(), "stopping a stopped container must fail");

    h.manager.start(id).expect("start");
    assert!(entered.take(Wait::Ticks(5_000)), "program never started");

    h.manager.stop(id).expect("stop");
    let info = h.manager.get(id).expect("get");
    assert_eq!(info.state, ContainerState::Stopped);
    assert!(info.task.is_none());
    assert!(h.manager.stop(id).is_err());
    release.give();
}

#[test]
fn delete_removes_container_dir_but_not_images() {
    let h = harness();
    seed_image(&h.storage);

    let id = h.manager.create("demo", "app.img", "app.bin", None).expect("create");
    assert!(h.storage.exists("/var/container/1"));

    h.manager.delete(id).expect("delete");
    assert!(!h.storage.exists("/var/container/1"));
    assert!(h.storage.exists("/var/container/images/app.img"));
    assert!(h.manager.get(id).is_err());
    assert_eq!(h.manager.count(), 0);
}

#[test]
fn delete_stops_a_running_container_first() {
    let (loader, entered, release) = blocking_loader();
    let h = harness_with(loader);
    seed_image(&h.storage);

    let id = h.manager.create("demo", "app.img", "app.bin", None).expect("create");
    h.manager.start(id).expect("start");
    assert!(entered.take(Wait::Ticks(5_000)), "program never started");

    h.manager.delete(id).expect("delete running container");
    assert!(h.manager.get(id).is_err());
    release.give();
}

#[test]
fn failed_create_leaves_no_leaked_slots() {
    let h = harness();
    seed_image(&h.storage);

    let first = h.manager.create("one", "app.img", "app.bin", None).expect("create");
    assert_eq!(first, ContainerId::new(1));

    // The next id will be 2; a pre-existing working directory makes the
    // unpack step fail and the construction unwind.
    h.storage.mkdir("/var/container/2").expect("mkdir");
    assert!(h.manager.create("clash", "app.img", "app.bin", None).is_err());
    assert_eq!(h.manager.count(), 1);

    // The namespace tables are the binding constraint (the root namespace
    // occupies one of the MAX_PID_NAMESPACES slots). Every slot freed by
    // the unwind is available again: fill the table to its capacity.
    for i in 2..MAX_PID_NAMESPACES {
        h.manager
            .create(&format!("fill{i}"), "app.img", "app.bin", None)
            .expect("slots must not leak");
    }
    assert!(h.manager.create("overflow", "app.img", "app.bin", None).is_err());
    assert_eq!(h.manager.count(), MAX_PID_NAMESPACES - 1);
}

#[test]
fn container_ids_are_never_reused() {
    let h = harness();
    seed_image(&h.storage);

    let first = h.manager.create("a", "app.img", "app.bin", None).expect("create");
    h.manager.delete(first).expect("delete");
    let second = h.manager.create("b", "app.img", "app.bin", None).expect("create");
    assert_eq!(first, ContainerId::new(1));
    assert_eq!(second, ContainerId::new(2));
}

#[test]
fn reconcile_folds_killed_task_into_stopped() {
    let (loader, entered, release) = blocking_loader();
    let h = harness_with(loader);
    seed_image(&h.storage);

    let id = h.manager.create("demo", "app.img", "app.bin", None).expect("create");
    h.manager.start(id).expect("start");
    assert!(entered.take(Wait::Ticks(5_000)), "program never started");

    let task = h.manager.get(id).expect("get").task.expect("task handle");
    h.exec.kill(task).expect("kill");
    h.manager.reconcile();

    let info = h.manager.get(id).expect("get");
    assert_eq!(info.state, ContainerState::Stopped);
    assert!(info.task.is_none());
    release.give();
}

#[test]
fn run_is_create_plus_start() {
    let h = harness();
    seed_image(&h.storage);

    let id = h.manager.run("demo", "app.img", "app.bin", None).expect("run");
    wait_for_state(&h.manager, id, ContainerState::Stopped);
    assert_eq!(h.manager.count(), 1);
}

#[test]
fn unknown_ids_fail_without_side_effects() {
    let h = harness();
    let ghost = ContainerId::new(999);
    assert!(h.manager.get(ghost).is_err());
    assert!(h.manager.start(ghost).is_err());
    assert!(h.manager.stop(ghost).is_err());
    assert!(h.manager.delete(ghost).is_err());
    assert_eq!(h.manager.count(), 0);
}

#[test]
fn missing_program_puts_container_in_error() {
    let h = harness();
    seed_image(&h.storage);

    let id = h.manager.create("demo", "app.img", "ghost.bin", None).expect("create");
    h.manager.start(id).expect("start");
    wait_for_state(&h.manager, id, ContainerState::Error);

    // ERROR containers can still be deleted.
    h.manager.delete(id).expect("delete");
}

#[test]
fn find_by_name_is_an_exact_match() {
    let h = harness();
    seed_image(&h.storage);

    h.manager.create("alpha", "app.img", "app.bin", None).expect("create");
    assert!(h.manager.find_by_name("alpha").is_some());
    assert!(h.manager.find_by_name("alph").is_none());
    assert!(h.manager.find_by_name("alphabet").is_none());
}

#[test]
fn default_limits_apply_when_none_are_given() {
    let h = harness();
    seed_image(&h.storage);

    let id = h.manager.create("demo", "app.img", "app.bin", None).expect("create");
    let info = h.manager.get(id).expect("get");
    assert_eq!(info.memory_limit, rtainer_common::constants::DEFAULT_MEMORY_LIMIT);
    assert_eq!(
        info.cpu_quota_ticks,
        rtainer_common::constants::DEFAULT_CPU_QUOTA_TICKS
    );
    let stats = h.manager.cgroup_stats(id).expect("stats");
    assert_eq!(stats.memory.limit, rtainer_common::constants::DEFAULT_MEMORY_LIMIT);
}
