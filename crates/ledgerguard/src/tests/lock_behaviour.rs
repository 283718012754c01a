//! Behavioural tests for lock contention and stale lock reclamation.

use std::cell::RefCell;
use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::lock::{LockError, LockGrant, LockManager, ReclaimedLock};

use super::support::{Workspace, parse_millis, strip_quotes};

const ACQUIRE_TIMEOUT: Duration = Duration::from_millis(2000);

struct LockWorld {
    workspace: Workspace,
    manager: Option<Arc<LockManager>>,
    outcomes: Vec<(String, Result<LockGrant, LockError>)>,
    reclaimed: Vec<ReclaimedLock>,
}

impl LockWorld {
    fn new() -> Self {
        let workspace = Workspace::new();
        workspace.write("{}");
        Self {
            workspace,
            manager: None,
            outcomes: Vec::new(),
            reclaimed: Vec::new(),
        }
    }

    fn manager(&self) -> Arc<LockManager> {
        Arc::clone(self.manager.as_ref().expect("lock manager configured"))
    }

    fn acquire(&self, agent: &str) -> Result<LockGrant, LockError> {
        self.manager()
            .acquire_lock(&self.workspace.document, agent, ACQUIRE_TIMEOUT)
    }
}

#[fixture]
fn world() -> RefCell<LockWorld> {
    RefCell::new(LockWorld::new())
}

#[given("a ledger document locked with a {ttl} ms lifetime")]
fn given_lock_lifetime(world: &RefCell<LockWorld>, ttl: String) {
    let mut world = world.borrow_mut();
    let config = Workspace::config()
        .with_lock_ttl(parse_millis(&ttl))
        .with_lock_retry_interval(Duration::from_millis(50));
    let manager = LockManager::new(world.workspace.context(), &config).expect("lock manager");
    world.manager = Some(Arc::new(manager));
}

#[given("agent {agent} holds the document lock")]
fn given_agent_holds(world: &RefCell<LockWorld>, agent: String) {
    world
        .borrow()
        .acquire(strip_quotes(&agent))
        .expect("initial acquire");
}

#[when("agents {first} and {second} acquire the document lock concurrently")]
fn when_agents_race(world: &RefCell<LockWorld>, first: String, second: String) {
    let manager = world.borrow().manager();
    let document = world.borrow().workspace.document.clone();
    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [first, second]
        .into_iter()
        .map(|agent| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let document = document.clone();
            thread::spawn(move || {
                let name = strip_quotes(&agent).to_owned();
                barrier.wait();
                let outcome = manager.acquire_lock(&document, &name, ACQUIRE_TIMEOUT);
                (name, outcome)
            })
        })
        .collect();
    world.borrow_mut().outcomes = handles
        .into_iter()
        .map(|handle| handle.join().expect("agent thread"))
        .collect();
}

#[when("{elapsed} ms pass")]
fn when_time_passes(world: &RefCell<LockWorld>, elapsed: String) {
    world.borrow().workspace.clock.advance(parse_millis(&elapsed));
}

#[when("stale locks are cleaned up")]
fn when_cleanup(world: &RefCell<LockWorld>) {
    let reclaimed = world
        .borrow()
        .manager()
        .cleanup_stale_locks()
        .expect("cleanup");
    world.borrow_mut().reclaimed = reclaimed;
}

#[then("exactly one agent holds the document lock")]
fn then_one_winner(world: &RefCell<LockWorld>) {
    let world = world.borrow();
    let winners: Vec<_> = world
        .outcomes
        .iter()
        .filter_map(|(_, outcome)| outcome.as_ref().ok())
        .collect();
    assert_eq!(winners.len(), 1, "outcomes: {:?}", world.outcomes);
    let lock_file = world.manager().lock_file_for(&world.workspace.document);
    assert!(lock_file.starts_with(&world.workspace.lock_directory));
    assert!(lock_file.exists());
}

#[then("the other agent timed out waiting")]
fn then_loser_timed_out(world: &RefCell<LockWorld>) {
    let world = world.borrow();
    let winner = world
        .outcomes
        .iter()
        .find_map(|(agent, outcome)| outcome.is_ok().then_some(agent.as_str()))
        .expect("winner");
    let (_, loser) = world
        .outcomes
        .iter()
        .find(|(_, outcome)| outcome.is_err())
        .expect("loser");
    match loser {
        Err(LockError::Timeout { holder, .. }) => assert_eq!(holder, winner),
        other => panic!("expected a timeout, got {other:?}"),
    }
}

#[then("{count} stale lock was reclaimed")]
fn then_reclaimed_one(world: &RefCell<LockWorld>, count: String) {
    assert_reclaimed(&world.borrow(), &count);
}

#[then("{count} stale locks were reclaimed")]
fn then_reclaimed_many(world: &RefCell<LockWorld>, count: String) {
    assert_reclaimed(&world.borrow(), &count);
}

#[then("agent {agent} can acquire the document lock")]
fn then_agent_acquires(world: &RefCell<LockWorld>, agent: String) {
    let agent = strip_quotes(&agent);
    let grant = world.borrow().acquire(agent).expect("acquire after sweep");
    assert_eq!(grant.record.owner_agent_id, agent);
    let bytes = fs::read(&grant.lock_file).expect("read lock file");
    assert!(String::from_utf8_lossy(&bytes).contains(agent));
}

#[then("agent {agent} is refused the document lock")]
fn then_agent_refused(world: &RefCell<LockWorld>, agent: String) {
    let error = world
        .borrow()
        .acquire(strip_quotes(&agent))
        .expect_err("lock is still held");
    assert!(matches!(error, LockError::Timeout { .. }));
}

fn assert_reclaimed(world: &LockWorld, count: &str) {
    let expected: usize = strip_quotes(count).parse().expect("count");
    assert_eq!(world.reclaimed.len(), expected);
    for reclaimed in &world.reclaimed {
        assert!(!reclaimed.lock_file.exists());
    }
}

#[scenario(path = "tests/features/lock_manager.feature")]
fn lock_manager_scenarios(#[from(world)] world: RefCell<LockWorld>) {
    drop(world);
}
