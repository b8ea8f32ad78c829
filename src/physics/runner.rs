//! Running a [`World`] on its own thread.
//!
//! Other threads request steps and read the results through snapshots,
//! so nobody ever sees a world halfway through a step.

use super::{BodyKey, RigidBody, World, WorldError, WorldSnapshot};

use parking_lot::{Mutex, RwLock};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

/// How long the stepping thread sleeps when there's nothing to do
/// before checking again on its own.
const IDLE_PARK: Duration = Duration::from_millis(1);

struct Shared {
    /// Locked for the whole duration of a step.
    world: Mutex<World>,
    pending: AtomicUsize,
    running: AtomicBool,
    stopped: AtomicBool,
    snapshot: RwLock<Arc<WorldSnapshot>>,
}

impl Shared {
    /// Claim one pending step if there is one.
    fn take_pending(&self) -> bool {
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    fn step_and_publish(&self) -> Result<(), WorldError> {
        let snapshot = {
            let mut world = self.world.lock();
            world.step()?;
            world.snapshot()
        };
        *self.snapshot.write() = Arc::new(snapshot);
        Ok(())
    }

    fn publish(&self, world: &World) {
        *self.snapshot.write() = Arc::new(world.snapshot());
    }
}

/// A [`World`] shared between threads.
///
/// Step requests only bump a counter, so they never wait for a step to finish.
/// Steps are taken either by a dedicated thread started with [`start`][Self::start],
/// or synchronously with [`run_pending`][Self::run_pending].
/// Any access to the world itself waits for the step in progress,
/// which means bodies are only ever added or removed between steps.
pub struct SharedWorld {
    shared: Arc<Shared>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SharedWorld {
    pub fn new(world: World) -> Self {
        let snapshot = Arc::new(world.snapshot());
        SharedWorld {
            shared: Arc::new(Shared {
                world: Mutex::new(world),
                pending: AtomicUsize::new(0),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                snapshot: RwLock::new(snapshot),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Spawn the stepping thread. Does nothing if it's already running.
    pub fn start(&self) -> Result<(), WorldError> {
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(WorldError::Stopped);
        }
        let mut slot = self.thread.lock();
        if self.shared.running.load(Ordering::Acquire) {
            return Ok(());
        }
        // a thread that quit on its own still needs joining
        if let Some(finished) = slot.take() {
            let _ = finished.join();
        }

        #[cfg(feature = "tracy")]
        let _ = tracy_client::Client::start();

        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("physics".into())
            .spawn(move || step_loop(&shared))
            .map_err(|err| {
                log::error!("Failed to spawn the physics thread: {}", err);
                self.shared.running.store(false, Ordering::Release);
                WorldError::Stopped
            })?;
        *slot = Some(handle);
        Ok(())
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Ask for one more step. Never waits for the world.
    pub fn request_step(&self) -> Result<(), WorldError> {
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(WorldError::Stopped);
        }
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        if let Some(handle) = self.thread.lock().as_ref() {
            handle.thread().unpark();
        }
        Ok(())
    }

    #[inline]
    pub fn pending_steps(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Take every pending step on the calling thread, publishing a snapshot after each.
    /// Returns how many steps were taken.
    pub fn run_pending(&self) -> Result<usize, WorldError> {
        let mut taken = 0;
        while self.shared.take_pending() {
            self.shared.step_and_publish()?;
            taken += 1;
        }
        Ok(taken)
    }

    /// The state of the world as of the last finished step.
    pub fn snapshot(&self) -> Arc<WorldSnapshot> {
        self.shared.snapshot.read().clone()
    }

    /// Run a closure with exclusive access to the world, between steps.
    pub fn with_world<R>(&self, f: impl FnOnce(&mut World) -> R) -> R {
        let mut world = self.shared.world.lock();
        f(&mut *world)
    }

    pub fn add_body(&self, body: RigidBody) -> BodyKey {
        self.with_world(|world| world.add_body(body))
    }

    pub fn remove_body(&self, key: BodyKey) -> Option<RigidBody> {
        self.with_world(|world| world.remove_body(key))
    }

    /// Stop the stepping thread, drop pending steps and hand back every body.
    ///
    /// Step requests are rejected afterwards until [`restart`][Self::restart].
    /// Calling this again does nothing and returns no bodies.
    pub fn stop(&self) -> Vec<(BodyKey, RigidBody)> {
        self.shared.stopped.store(true, Ordering::Release);
        self.join_thread();
        self.shared.pending.store(0, Ordering::Release);

        let mut world = self.shared.world.lock();
        let bodies = world.clear();
        self.shared.publish(&world);
        bodies
    }

    /// Accept steps again after a [`stop`][Self::stop].
    /// The stepping thread needs to be [`start`][Self::start]ed again separately.
    ///
    /// Requests that raced with the stop are dropped here.
    pub fn restart(&self) {
        let mut world = self.shared.world.lock();
        world.restart();
        self.shared.publish(&world);
        self.shared.pending.store(0, Ordering::Release);
        self.shared.stopped.store(false, Ordering::Release);
    }

    fn join_thread(&self) {
        let handle = self.thread.lock().take();
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = handle {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::error!("Physics thread panicked");
            }
        }
    }
}

impl Drop for SharedWorld {
    fn drop(&mut self) {
        self.join_thread();
    }
}

fn step_loop(shared: &Shared) {
    log::debug!("Physics thread started");
    while shared.running.load(Ordering::Acquire) {
        if !shared.take_pending() {
            thread::park_timeout(IDLE_PARK);
            continue;
        }
        if let Err(err) = shared.step_and_publish() {
            log::debug!("Physics thread stopping: {}", err);
            break;
        }
    }
    shared.running.store(false, Ordering::Release);
    log::debug!("Physics thread stopped");
}
