//! Typed publish/subscribe buses for cross-view invalidation.
//!
//! Listeners are called synchronously, in subscription order, on the
//! emitting task. A listener may drop its own [`Subscription`] while being
//! called; it still sees the event in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use insight_library_core::PostId;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener<E>)>>,
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            listeners: Mutex::new(Vec::new()),
        }
    }
}

impl<E: 'static> Registry<E> {
    fn subscribe(self: &Arc<Self>, listener: Listener<E>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));

        let registry: Weak<Self> = Arc::downgrade(self);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.remove(id);
                }
            })),
        }
    }

    fn remove(&self, id: u64) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(listener_id, _)| *listener_id != id);
    }

    fn emit(&self, event: &E) {
        // Snapshot so listeners can (un)subscribe without deadlocking.
        let listeners: Vec<Listener<E>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Handle returned by `subscribe`. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// "The saved-posts list changed; refetch it."
#[derive(Clone, Default)]
pub struct SavedPostsEvents {
    registry: Arc<Registry<()>>,
}

impl std::fmt::Debug for SavedPostsEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SavedPostsEvents")
            .field("listeners", &self.registry.len())
            .finish()
    }
}

impl SavedPostsEvents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.registry.subscribe(Arc::new(move |_: &()| listener()))
    }

    pub fn emit(&self) {
        self.registry.emit(&());
    }
}

/// What the user did to a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostAction {
    Save,
    Unsave,
    Like,
    Unlike,
}

/// A single post interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostUpdate {
    pub post_id: PostId,
    pub action: PostAction,
}

/// Per-post interaction events, used to keep counters in open views aligned.
#[derive(Clone, Default)]
pub struct PostUpdateEvents {
    registry: Arc<Registry<PostUpdate>>,
}

impl std::fmt::Debug for PostUpdateEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostUpdateEvents")
            .field("listeners", &self.registry.len())
            .finish()
    }
}

impl PostUpdateEvents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&PostUpdate) + Send + Sync + 'static,
    ) -> Subscription {
        self.registry.subscribe(Arc::new(listener))
    }

    pub fn emit(&self, update: PostUpdate) {
        self.registry.emit(&update);
    }
}
