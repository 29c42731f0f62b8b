//! The update lock.
//!
//! Graph mutation and layout happen while holding a single process-wide, re-entrant lock. An
//! update is a span during which the lock is held and the update depth is non-zero; actions
//! enqueued during an update run, in order, when the outermost update ends.

use crate::config::Config;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::cell::Cell;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use tracing::trace;

type Action = Box<dyn FnOnce() + Send>;

static LOCK: ReentrantMutex<()> = parking_lot::const_reentrant_mutex(());
// only modified by the lock owner
static DEPTH: AtomicU32 = AtomicU32::new(0);
static DISPATCH_DEPTH: AtomicU32 = AtomicU32::new(0);
static ACTIONS: Mutex<Vec<Action>> = parking_lot::const_mutex(Vec::new());

const ASSERTIONS_FROM_CONFIG: u8 = 0;
const ASSERTIONS_ON: u8 = 1;
const ASSERTIONS_OFF: u8 = 2;
static ASSERTIONS: AtomicU8 = AtomicU8::new(ASSERTIONS_FROM_CONFIG);

thread_local! {
    static LOCK_COUNT: Cell<u32> = Cell::new(0);
}

/// Holds the update lock.
pub struct LockGuard {
    _guard: ReentrantMutexGuard<'static, ()>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        LOCK_COUNT.with(|count| count.set(count.get() - 1));
    }
}

/// Acquires the update lock without starting an update.
pub fn lock() -> LockGuard {
    let guard = LOCK.lock();
    LOCK_COUNT.with(|count| count.set(count.get() + 1));
    LockGuard { _guard: guard }
}

/// An update in progress; ends the update when dropped.
pub struct UpdateGuard {
    _lock: LockGuard,
}

/// Starts an update.
pub fn begin() -> UpdateGuard {
    let lock = lock();
    let depth = DEPTH.fetch_add(1, Ordering::AcqRel) + 1;
    if depth == 1 {
        trace!("update began");
    }
    UpdateGuard { _lock: lock }
}

impl Drop for UpdateGuard {
    fn drop(&mut self) {
        struct EndUpdate;

        impl Drop for EndUpdate {
            fn drop(&mut self) {
                DEPTH.fetch_sub(1, Ordering::AcqRel);
            }
        }

        let _end = EndUpdate;
        if DEPTH.load(Ordering::Acquire) == 1 {
            dispatch_actions();
            trace!("update ended");
        }
    }
}

/// Marks the current depth as action dispatch until dropped.
struct RestoreDispatchDepth(u32);

impl RestoreDispatchDepth {
    fn enter() -> RestoreDispatchDepth {
        RestoreDispatchDepth(DISPATCH_DEPTH.swap(DEPTH.load(Ordering::Acquire), Ordering::AcqRel))
    }
}

impl Drop for RestoreDispatchDepth {
    fn drop(&mut self) {
        DISPATCH_DEPTH.store(self.0, Ordering::Release);
    }
}

/// Runs `body` inside an update.
pub fn perform<R>(body: impl FnOnce() -> R) -> R {
    let _update = begin();
    body()
}

/// Runs `body` inside an update, starting one if needed.
pub fn ensure<R>(body: impl FnOnce() -> R) -> R {
    perform(body)
}

/// Runs `body` inside an update that counts as action dispatch, so
/// [`thread_is_updating`] is false while it runs.
pub fn dispatch_immediately<R>(body: impl FnOnce() -> R) -> R {
    let _update = begin();
    let _dispatch = RestoreDispatchDepth::enter();
    body()
}

/// Runs `body` holding the lock, without starting an update.
pub fn locked<R>(body: impl FnOnce() -> R) -> R {
    let _lock = lock();
    body()
}

/// Whether the calling thread holds the update lock.
pub fn is_owner() -> bool {
    LOCK_COUNT.with(Cell::get) > 0
}

/// Whether an update is in progress on any thread.
pub fn is_active() -> bool {
    DEPTH.load(Ordering::Acquire) != 0
}

/// Whether the calling thread is running an update, outside of action dispatch.
pub fn thread_is_updating() -> bool {
    is_owner() && DEPTH.load(Ordering::Acquire) > DISPATCH_DEPTH.load(Ordering::Acquire)
}

/// Overrides whether [`assert_is_locked`] checks anything. `None` defers to [`Config::global`].
pub fn set_lock_assertions(enabled: Option<bool>) {
    let value = match enabled {
        None => ASSERTIONS_FROM_CONFIG,
        Some(true) => ASSERTIONS_ON,
        Some(false) => ASSERTIONS_OFF,
    };
    ASSERTIONS.store(value, Ordering::Relaxed);
}

fn lock_assertions_enabled() -> bool {
    match ASSERTIONS.load(Ordering::Relaxed) {
        ASSERTIONS_ON => true,
        ASSERTIONS_OFF => false,
        _ => Config::global().assert_locks,
    }
}

/// Panics if lock assertions are enabled and the calling thread does not hold the update lock.
pub fn assert_is_locked() {
    if lock_assertions_enabled() && !is_owner() {
        panic!("view graph is active without holding the update lock; missing update::ensure()?");
    }
}

/// Runs `action` when the outermost update ends, or right away if no update is in progress.
pub fn enqueue_action(action: impl FnOnce() + Send + 'static) {
    let _update = begin();
    ACTIONS.lock().push(Box::new(action));
}

fn dispatch_actions() {
    loop {
        let actions = std::mem::take(&mut *ACTIONS.lock());
        if actions.is_empty() {
            break;
        }
        trace!(count = actions.len(), "dispatching update actions");

        let _update = begin();
        let _dispatch = RestoreDispatchDepth::enter();
        for action in actions {
            action();
        }
    }
}
