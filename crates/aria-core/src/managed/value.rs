//! Managed values - lock-free cross-thread value publishing
//!
//! A [`ManagedValue`] holds a mutable reference to state shared with the
//! render thread: a processing module, a parameter block, a routing table.
//! The control thread replaces the value at any time; the render thread
//! reads it in O(1) without locking, blocking or allocating.
//!
//! # Two-phase commit
//!
//! Writes are staged: [`ManagedValue::set`] parks the new value in a pending
//! slot and the render thread publishes every pending slot in its group at
//! one point per cycle, [`UpdateGroup::commit_pending_updates`]. Updates to
//! several values made inside [`UpdateGroup::perform_atomic_batch_update`]
//! therefore become visible together - the render thread never observes half
//! of a batch.
//!
//! # Deferred release
//!
//! A displaced value cannot be freed on the render thread (deallocation can
//! take arbitrarily long) and must not be freed while the render thread can
//! still observe it. Displaced values are enqueued wait-free and freed by
//! [`UpdateGroup::collect`] on the control side - either polled explicitly
//! or from the background thread started by
//! [`UpdateGroup::spawn_collector_thread`]. Custom release closures run
//! there, never on the render thread.
//!
//! # Thread roles
//!
//! `commit_pending_updates` belongs to the render thread; `set`, batch
//! updates, `collect` and teardown belong to the control side. Concurrent
//! control-thread writers serialize on the group's update lock - the one
//! lock in this system, which the render thread only ever `try_lock`s.

use std::cell::UnsafeCell;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use basedrop::{Collector, Handle, Shared, SharedCell};

/// How often the background collector thread frees retired values
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

/// Stable, non-zero key identifying the calling thread
///
/// The address of a thread-local is unique among live threads, which is all
/// the reentrancy check needs.
fn thread_key() -> usize {
    thread_local! {
        static KEY: u8 = 0;
    }
    KEY.with(|key| key as *const u8 as usize)
}

/// A published value plus the hooks to run when it is finally released
struct Payload<T: Send + Sync + 'static> {
    value: ManuallyDrop<T>,
    release: Option<Arc<dyn Fn(T) + Send + Sync>>,
    notify: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl<T: Send + Sync + 'static> Payload<T> {
    fn new(
        value: T,
        release: Option<Arc<dyn Fn(T) + Send + Sync>>,
        notify: Option<Arc<dyn Fn() + Send + Sync>>,
    ) -> Self {
        Self { value: ManuallyDrop::new(value), release, notify }
    }

    fn value(&self) -> &T {
        &self.value
    }
}

impl<T: Send + Sync + 'static> Drop for Payload<T> {
    fn drop(&mut self) {
        // Runs on the collector side, never on the render thread
        let value = unsafe { ManuallyDrop::take(&mut self.value) };
        match &self.release {
            Some(release) => release(value),
            None => drop(value),
        }
        if let Some(notify) = &self.notify {
            notify();
        }
    }
}

/// A member of an update group that may have a staged value to publish
trait CommitTarget: Send + Sync {
    /// Swap the staged value, if any, into the published slot.
    ///
    /// # Safety
    ///
    /// The group's update lock must be held by the caller; it is the only
    /// synchronization guarding the staged slot.
    unsafe fn commit_staged(&self);
}

/// Shared state of one managed value
struct ValueCore<T: Send + Sync + 'static> {
    /// The slot the render thread reads
    current: SharedCell<Payload<T>>,
    /// The pending slot, guarded by the group update lock
    staged: UnsafeCell<Option<Shared<Payload<T>>>>,
}

// The staged slot is only touched with the group update lock held (set and
// batch updates on the control side, commit under try_lock on the render
// side); `current` is a SharedCell, safe on both sides.
unsafe impl<T: Send + Sync + 'static> Sync for ValueCore<T> {}

impl<T: Send + Sync + 'static> CommitTarget for ValueCore<T> {
    unsafe fn commit_staged(&self) {
        let staged = &mut *self.staged.get();
        if let Some(value) = staged.take() {
            // The displaced value is enqueued wait-free for the collector
            self.current.set(value);
        }
    }
}

/// Shared state of an update group
struct GroupCore {
    /// Serializes control-side updates; `try_lock`ed by the render thread
    update_lock: Mutex<()>,
    /// Thread key of the control thread currently inside an update region
    batch_owner: AtomicUsize,
    /// Whether any member has staged a value since the last commit
    dirty: AtomicBool,
    /// Published list of members, read by the render thread during commit
    members: ManuallyDrop<SharedCell<Vec<Arc<dyn CommitTarget>>>>,
    /// Allocation handle for deferred-release values
    handle: Handle,
    /// Collector that frees retired values on the control side
    collector: Mutex<Collector>,
}

impl Drop for GroupCore {
    fn drop(&mut self) {
        // Drop the member list first so its allocation reaches the final
        // collect below; by now every member has unregistered itself.
        unsafe {
            ManuallyDrop::drop(&mut self.members);
        }
        if let Ok(mut collector) = self.collector.lock() {
            collector.collect();
        }
    }
}

/// Keeps `batch_owner` accurate for the duration of an update region
struct UpdateLockGuard<'a> {
    owner: &'a AtomicUsize,
    _guard: MutexGuard<'a, ()>,
}

impl Drop for UpdateLockGuard<'_> {
    fn drop(&mut self) {
        self.owner.store(0, Ordering::Release);
    }
}

/// Run `f` with the group update lock held, reentrant per thread
fn with_update_lock<R>(core: &GroupCore, f: impl FnOnce() -> R) -> R {
    let key = thread_key();
    if core.batch_owner.load(Ordering::Acquire) == key {
        // Already inside an update region on this thread
        return f();
    }
    let guard = core
        .update_lock
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    core.batch_owner.store(key, Ordering::Release);
    let _guard = UpdateLockGuard { owner: &core.batch_owner, _guard: guard };
    f()
}

/// A set of managed values that commit together
///
/// Cloning yields another handle to the same group. Typical engines create
/// one group, register every managed value and array with it, and call
/// [`commit_pending_updates`](UpdateGroup::commit_pending_updates) at the
/// top of the render callback.
#[derive(Clone)]
pub struct UpdateGroup {
    core: Arc<GroupCore>,
}

impl UpdateGroup {
    /// Create an empty update group
    pub fn new() -> Self {
        let collector = Collector::new();
        let handle = collector.handle();
        let members = SharedCell::new(Shared::new(&handle, Vec::new()));
        Self {
            core: Arc::new(GroupCore {
                update_lock: Mutex::new(()),
                batch_owner: AtomicUsize::new(0),
                dirty: AtomicBool::new(false),
                members: ManuallyDrop::new(members),
                handle,
                collector: Mutex::new(collector),
            }),
        }
    }

    /// Update multiple managed values atomically
    ///
    /// All `set` calls made inside `f` - on any value in this group - become
    /// visible to the render thread at the same commit. Nestable; a nested
    /// call joins the enclosing region.
    pub fn perform_atomic_batch_update<R>(&self, f: impl FnOnce() -> R) -> R {
        with_update_lock(&self.core, f)
    }

    /// Publish pending updates - call once per render cycle, render thread
    ///
    /// Must run before any `get` that depends on freshly set values. If a
    /// control-thread batch is mid-flight the commit is skipped for this
    /// cycle and the whole batch is picked up on the next one; the render
    /// thread never waits.
    pub fn commit_pending_updates(&self) {
        if !self.core.dirty.load(Ordering::Acquire) {
            return;
        }
        let Ok(_guard) = self.core.update_lock.try_lock() else {
            // Control thread mid-update: keep showing the previous values
            return;
        };
        self.core.dirty.store(false, Ordering::Release);
        let members = self.core.members.get();
        for member in members.iter() {
            // Safe: the update lock is held for the whole walk
            unsafe { member.commit_staged() };
        }
    }

    /// Free retired values - control thread
    ///
    /// Runs release closures and deallocation for every value displaced by
    /// commits since the last call. Cheap when there is nothing to do.
    pub fn collect(&self) {
        if let Ok(mut collector) = self.core.collector.lock() {
            collector.collect();
        }
    }

    /// Start a background thread that frees retired values periodically
    ///
    /// The thread exits once the group (and every value in it) is gone.
    /// Alternative to polling [`collect`](UpdateGroup::collect) from an
    /// existing control-side loop.
    pub fn spawn_collector_thread(&self) {
        let weak = Arc::downgrade(&self.core);
        thread::Builder::new()
            .name("value-gc".to_string())
            .spawn(move || {
                log::info!("Managed value collector thread started");
                loop {
                    let Some(core) = weak.upgrade() else { break };
                    if let Ok(mut collector) = core.collector.lock() {
                        collector.collect();
                    }
                    drop(core);
                    thread::sleep(COLLECT_INTERVAL);
                }
                log::debug!("Managed value collector thread stopped");
            })
            .expect("Failed to spawn value collector thread");
    }
}

impl Default for UpdateGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// A mutable reference shared safely with the render thread
///
/// The control thread replaces the value with [`set`](ManagedValue::set);
/// the render thread reads it with [`get`](ManagedValue::get). Old values
/// are released on the control side only after a newer value has been
/// committed, so the render thread never observes freed memory.
///
/// Create, mutate and drop instances on the control side; `get` is the only
/// render-thread entry point.
pub struct ManagedValue<T: Send + Sync + 'static> {
    group: Arc<GroupCore>,
    core: Arc<ValueCore<T>>,
    release: Option<Arc<dyn Fn(T) + Send + Sync>>,
    notify: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl<T: Send + Sync + 'static> ManagedValue<T> {
    /// Create a managed value holding `initial`
    ///
    /// Old values are simply dropped when released.
    pub fn new(group: &UpdateGroup, initial: T) -> Self {
        Self::new_inner(group, initial, None, None)
    }

    /// Create a managed value with a custom release closure
    ///
    /// `release` receives each displaced value on the control side once the
    /// render thread can no longer observe it.
    pub fn with_release(
        group: &UpdateGroup,
        initial: T,
        release: impl Fn(T) + Send + Sync + 'static,
    ) -> Self {
        Self::new_inner(group, initial, Some(Arc::new(release)), None)
    }

    /// Create a managed value with release and release-notification closures
    ///
    /// `notify` fires after each release, for bookkeeping only.
    pub fn with_release_and_notification(
        group: &UpdateGroup,
        initial: T,
        release: impl Fn(T) + Send + Sync + 'static,
        notify: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self::new_inner(group, initial, Some(Arc::new(release)), Some(Arc::new(notify)))
    }

    fn new_inner(
        group: &UpdateGroup,
        initial: T,
        release: Option<Arc<dyn Fn(T) + Send + Sync>>,
        notify: Option<Arc<dyn Fn() + Send + Sync>>,
    ) -> Self {
        let payload = Shared::new(
            &group.core.handle,
            Payload::new(initial, release.clone(), notify.clone()),
        );
        let core = Arc::new(ValueCore {
            current: SharedCell::new(payload),
            staged: UnsafeCell::new(None),
        });
        with_update_lock(&group.core, || {
            let members = group.core.members.get();
            let mut next: Vec<Arc<dyn CommitTarget>> = Vec::with_capacity(members.len() + 1);
            next.extend(members.iter().cloned());
            next.push(core.clone());
            group.core.members.set(Shared::new(&group.core.handle, next));
        });
        Self { group: group.core.clone(), core, release, notify }
    }

    /// Stage a new value - control thread
    ///
    /// The render thread keeps observing the previous value until the next
    /// [`UpdateGroup::commit_pending_updates`]. Staging twice before a
    /// commit retires the first staged value through the normal release
    /// path; it is never published.
    pub fn set(&self, value: T) {
        let payload = self.new_payload(value);
        with_update_lock(&self.group, || {
            unsafe {
                *self.core.staged.get() = Some(payload);
            }
            self.group.dirty.store(true, Ordering::Release);
        });
    }

    /// Read the current published value - render thread
    ///
    /// Lock-free and allocation-free. The reference is guaranteed valid at
    /// least until the next successful commit; holding the guard extends the
    /// value's lifetime past that, and dropping the guard on the render
    /// thread is wait-free. Also safe (if rarely useful) on the control
    /// thread.
    pub fn get(&self) -> ValueRef<T> {
        ValueRef { payload: self.core.current.get() }
    }

    /// Run `f` against the latest value, staged or published - control thread
    pub(crate) fn read_latest<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        with_update_lock(&self.group, || {
            let staged = unsafe { (*self.core.staged.get()).clone() };
            let latest = staged.unwrap_or_else(|| self.core.current.get());
            f(latest.value())
        })
    }

    /// Stage a value derived from the latest one - control thread
    ///
    /// Read-modify-write under the group update lock, so it composes with
    /// batches and cannot race a commit.
    pub(crate) fn update_latest(&self, f: impl FnOnce(&T) -> T) {
        with_update_lock(&self.group, || {
            let staged = unsafe { (*self.core.staged.get()).clone() };
            let latest = staged.unwrap_or_else(|| self.core.current.get());
            let payload = self.new_payload(f(latest.value()));
            unsafe {
                *self.core.staged.get() = Some(payload);
            }
            self.group.dirty.store(true, Ordering::Release);
        })
    }

    fn new_payload(&self, value: T) -> Shared<Payload<T>> {
        Shared::new(
            &self.group.handle,
            Payload::new(value, self.release.clone(), self.notify.clone()),
        )
    }
}

impl<T: Send + Sync + 'static> Drop for ManagedValue<T> {
    fn drop(&mut self) {
        // Unregister from the group so commits stop visiting this value;
        // the current and staged payloads retire through the collector.
        let target = Arc::as_ptr(&self.core) as *const ();
        with_update_lock(&self.group, || {
            let members = self.group.members.get();
            let next: Vec<Arc<dyn CommitTarget>> = members
                .iter()
                .filter(|member| Arc::as_ptr(member) as *const () != target)
                .cloned()
                .collect();
            self.group.members.set(Shared::new(&self.group.handle, next));
        });
    }
}

/// Guard over a published value
///
/// Dereferences to the value. Wait-free to acquire and to drop on the
/// render thread.
pub struct ValueRef<T: Send + Sync + 'static> {
    payload: Shared<Payload<T>>,
}

impl<T: Send + Sync + 'static> Deref for ValueRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.payload.value()
    }
}
