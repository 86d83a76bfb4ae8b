//! Realtime-safe snapshot arrays
//!
//! A [`RealtimeArray`] manages an ordered collection shared between the
//! control thread and the render thread: the list of active modules, the
//! per-channel gain entries, anything the render pass iterates. Updates
//! build an immutable snapshot published through a [`ManagedValue`], so
//! reads follow the same once-per-cycle commit discipline as every other
//! managed value in the group.
//!
//! # Structural sharing
//!
//! [`update`](RealtimeArray::update) maps each source item to a stored
//! value. Items that were already present - compared by *identity*, not
//! equality (see [`SourceIdentity`]) - keep their previously mapped value
//! untouched, so render-side state survives reordering and insertion.
//! Only newly introduced items invoke the mapping closure; only removed
//! items are released, on the control side, through the group's normal
//! deferred-release path.
//!
//! # Render-side access
//!
//! The render thread calls [`acquire_token`](RealtimeArray::acquire_token)
//! once per cycle and reads through the token; acquiring and dropping the
//! token are wait-free.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use super::value::{ManagedValue, UpdateGroup, ValueRef};

/// Identity comparison for source items
///
/// Snapshot diffing matches items by identity: two distinct items that
/// compare equal are still distinct entries. For `Arc` sources this is
/// pointer identity.
pub trait SourceIdentity {
    /// Whether `self` and `other` are the same item
    fn same_source(&self, other: &Self) -> bool;
}

impl<T: ?Sized> SourceIdentity for Arc<T> {
    fn same_source(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

/// One mapped entry, shared between every snapshot that contains it
struct ArrayEntry<S, V>
where
    S: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    source: S,
    value: ManuallyDrop<V>,
    release: Option<Arc<dyn Fn(&S, V) + Send + Sync>>,
}

impl<S, V> ArrayEntry<S, V>
where
    S: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn new(source: S, value: V, release: Option<Arc<dyn Fn(&S, V) + Send + Sync>>) -> Self {
        Self { source, value: ManuallyDrop::new(value), release }
    }

    fn value(&self) -> &V {
        &self.value
    }
}

impl<S, V> Drop for ArrayEntry<S, V>
where
    S: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn drop(&mut self) {
        // Runs once the last snapshot containing the entry is collected
        let value = unsafe { ManuallyDrop::take(&mut self.value) };
        match &self.release {
            Some(release) => release(&self.source, value),
            None => drop(value),
        }
    }
}

/// An immutable snapshot of the array
pub(crate) struct ArraySnapshot<S, V>
where
    S: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    entries: Vec<Arc<ArrayEntry<S, V>>>,
}

/// An ordered collection shared with the render thread
///
/// `S` is the source item type supplied by the control thread; `V` is the
/// mapped value the render thread reads.
pub struct RealtimeArray<S, V>
where
    S: SourceIdentity + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    value: ManagedValue<ArraySnapshot<S, V>>,
    release: Option<Arc<dyn Fn(&S, V) + Send + Sync>>,
}

impl<S, V> RealtimeArray<S, V>
where
    S: SourceIdentity + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create an empty array in the given update group
    ///
    /// Removed values are simply dropped when released.
    pub fn new(group: &UpdateGroup) -> Self {
        Self {
            value: ManagedValue::new(group, ArraySnapshot { entries: Vec::new() }),
            release: None,
        }
    }

    /// Create an empty array with a custom release closure
    ///
    /// `release` receives each removed item's source and mapped value on the
    /// control side, once no snapshot references it.
    pub fn with_release(
        group: &UpdateGroup,
        release: impl Fn(&S, V) + Send + Sync + 'static,
    ) -> Self {
        Self {
            value: ManagedValue::new(group, ArraySnapshot { entries: Vec::new() }),
            release: Some(Arc::new(release)),
        }
    }

    /// Replace the array contents - control thread
    ///
    /// `map` is invoked for items not present in the previous snapshot;
    /// retained items keep their existing mapped value by identity. The new
    /// snapshot becomes visible at the next commit. Call inside
    /// [`UpdateGroup::perform_atomic_batch_update`] to publish together
    /// with other value updates.
    pub fn update(&self, items: &[S], mut map: impl FnMut(&S) -> V) {
        self.update_indexed(items, |item, _index| map(item));
    }

    /// Replace the array contents, with the item index passed to `map`
    pub fn update_indexed(&self, items: &[S], mut map: impl FnMut(&S, usize) -> V) {
        self.value.update_latest(|previous| {
            let entries = items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    previous
                        .entries
                        .iter()
                        .find(|entry| entry.source.same_source(item))
                        .cloned()
                        .unwrap_or_else(|| {
                            Arc::new(ArrayEntry::new(
                                item.clone(),
                                map(item, index),
                                self.release.clone(),
                            ))
                        })
                })
                .collect();
            ArraySnapshot { entries }
        });
    }

    /// Replace the mapped value for one item - control thread
    ///
    /// Published through the same two-phase discipline as a full update; the
    /// previous value retires through the normal release path. Returns
    /// whether the item was found.
    pub fn update_value_for(&self, source: &S, value: V) -> bool {
        let mut value = Some(value);
        self.value.update_latest(|previous| {
            let mut entries = Vec::with_capacity(previous.entries.len());
            for entry in &previous.entries {
                if value.is_some() && entry.source.same_source(source) {
                    if let Some(value) = value.take() {
                        entries.push(Arc::new(ArrayEntry::new(
                            entry.source.clone(),
                            value,
                            self.release.clone(),
                        )));
                        continue;
                    }
                }
                entries.push(entry.clone());
            }
            ArraySnapshot { entries }
        });
        value.is_none()
    }

    /// Get the current snapshot token - render thread
    ///
    /// Wait-free. The token stays coherent for as long as it is held; fetch
    /// it once per render cycle so commits take effect between cycles, not
    /// within one.
    pub fn acquire_token(&self) -> ArrayToken<S, V> {
        ArrayToken { snapshot: self.value.get() }
    }

    /// Number of items in the latest array contents - control thread
    pub fn len(&self) -> usize {
        self.value.read_latest(|snapshot| snapshot.entries.len())
    }

    /// Whether the latest array contents are empty - control thread
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The source items of the latest array contents - control thread
    pub fn sources(&self) -> Vec<S> {
        self.value.read_latest(|snapshot| {
            snapshot.entries.iter().map(|entry| entry.source.clone()).collect()
        })
    }
}

/// Token over one published snapshot
///
/// All accessors are O(1) against the snapshot the token was acquired from;
/// later commits do not affect it.
pub struct ArrayToken<S, V>
where
    S: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    snapshot: ValueRef<ArraySnapshot<S, V>>,
}

impl<S, V> ArrayToken<S, V>
where
    S: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Number of items in the snapshot
    pub fn len(&self) -> usize {
        self.snapshot.entries.len()
    }

    /// Whether the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.snapshot.entries.is_empty()
    }

    /// The mapped value at `index`
    pub fn item(&self, index: usize) -> Option<&V> {
        self.snapshot.entries.get(index).map(|entry| entry.value())
    }

    /// The source item at `index`
    pub fn source(&self, index: usize) -> Option<&S> {
        self.snapshot.entries.get(index).map(|entry| &entry.source)
    }

    /// Iterate over the mapped values
    ///
    /// Restartable: each call yields a fresh pass over the same snapshot.
    pub fn iter(&self) -> impl Iterator<Item = &V> {
        self.snapshot.entries.iter().map(|entry| entry.value())
    }
}
