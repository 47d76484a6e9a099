//! Resource handles and usage tracking.
//!
//! Handles are generation-tagged slot-map keys: resolving a handle whose slot
//! was vacated (or reused by a later load) yields nothing instead of a
//! different resource. The null key is the invalid handle.
//!
//! Usage counts live in a shared [`UsageTracker`] per pool entry. A
//! [`Binding`] owns one unit of usage for as long as it is alive, so material
//! texture slots and mesh fragments never need paired increment/decrement
//! calls.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use slotmap::{new_key_type, Key};

new_key_type! {
    /// Handle to a [`crate::Texture`].
    pub struct TextureHandle;
    /// Handle to a [`crate::Material`].
    pub struct MaterialHandle;
    /// Handle to a [`crate::Mesh`].
    pub struct MeshHandle;
    /// Handle to a [`crate::Environment`].
    pub struct EnvironmentHandle;
}

/// Usage counter shared between a pool entry and its bindings.
#[derive(Debug, Default)]
pub struct UsageTracker {
    count: AtomicU32,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the usage count, returns the new count.
    #[inline]
    pub fn increment(&self) -> u32 {
        self.count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrements the usage count, saturating at zero. Returns the new count.
    #[inline]
    pub fn decrement(&self) -> u32 {
        let previous = self
            .count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                Some(c.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }
}

/// An owned unit of usage on a pool entry.
///
/// Created by the owning pool's `acquire`. Cloning increments the entry's
/// usage; dropping decrements it.
pub struct Binding<K: Key> {
    handle: K,
    tracker: Arc<UsageTracker>,
}

impl<K: Key> Binding<K> {
    pub(crate) fn new(handle: K, tracker: Arc<UsageTracker>) -> Self {
        tracker.increment();
        Self { handle, tracker }
    }

    /// The handle this binding keeps in use.
    #[inline]
    pub fn handle(&self) -> K {
        self.handle
    }

    /// Current usage count of the bound entry.
    #[inline]
    pub fn usage(&self) -> u32 {
        self.tracker.get()
    }
}

impl<K: Key> Clone for Binding<K> {
    fn clone(&self) -> Self {
        Self::new(self.handle, Arc::clone(&self.tracker))
    }
}

impl<K: Key> Drop for Binding<K> {
    fn drop(&mut self) {
        self.tracker.decrement();
    }
}

impl<K: Key> PartialEq for Binding<K> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl<K: Key> fmt::Debug for Binding<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("handle", &self.handle)
            .field("usage", &self.tracker.get())
            .finish()
    }
}

pub type TextureBinding = Binding<TextureHandle>;
pub type MaterialBinding = Binding<MaterialHandle>;
pub type MeshBinding = Binding<MeshHandle>;
pub type EnvironmentBinding = Binding<EnvironmentHandle>;
