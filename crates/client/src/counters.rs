//! Optimistic like/save counters.
//!
//! Each open view owns a [`PostCounters`] attached to the shared
//! [`PostUpdateEvents`] bus. A toggle in one view is published on the bus
//! and applied by every attached view, the originating one included, before
//! the toggle returns. Views may drift from the server until the feed query
//! is refetched; [`PostCounters::reconcile`] then replaces everything with
//! server truth.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use insight_library_core::PostId;

use crate::events::{PostAction, PostUpdate, PostUpdateEvents, SavedPostsEvents, Subscription};

/// Cache key of the feed query whose refetch carries server-side counts.
pub const FEED_QUERY_KEY: &str = "feed-posts-optimized";

/// Counts and the viewer's own flags for one post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostCounts {
    pub like_count: u32,
    pub save_count: u32,
    pub liked: bool,
    pub saved: bool,
}

impl PostCounts {
    /// Apply one interaction. Repeating the current state is a no-op.
    fn apply(&mut self, action: PostAction) {
        match action {
            PostAction::Like if !self.liked => {
                self.liked = true;
                self.like_count = self.like_count.saturating_add(1);
            }
            PostAction::Unlike if self.liked => {
                self.liked = false;
                self.like_count = self.like_count.saturating_sub(1);
            }
            PostAction::Save if !self.saved => {
                self.saved = true;
                self.save_count = self.save_count.saturating_add(1);
            }
            PostAction::Unsave if self.saved => {
                self.saved = false;
                self.save_count = self.save_count.saturating_sub(1);
            }
            _ => {}
        }
    }
}

type CountMap = Arc<Mutex<HashMap<PostId, PostCounts>>>;

fn lock(counts: &CountMap) -> MutexGuard<'_, HashMap<PostId, PostCounts>> {
    counts.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One view's counters.
#[derive(Debug)]
pub struct PostCounters {
    counts: CountMap,
    updates: PostUpdateEvents,
    saved: SavedPostsEvents,
    _subscription: Subscription,
}

impl PostCounters {
    /// Attach a new, empty view to the buses.
    #[must_use]
    pub fn attach(updates: &PostUpdateEvents, saved: &SavedPostsEvents) -> Self {
        let counts: CountMap = Arc::default();
        let sink = Arc::clone(&counts);
        let subscription = updates.subscribe(move |update: &PostUpdate| {
            // Only posts this view has loaded.
            if let Some(entry) = lock(&sink).get_mut(&update.post_id) {
                entry.apply(update.action);
            }
        });

        Self {
            counts,
            updates: updates.clone(),
            saved: saved.clone(),
            _subscription: subscription,
        }
    }

    #[must_use]
    pub fn get(&self, post_id: PostId) -> Option<PostCounts> {
        lock(&self.counts).get(&post_id).copied()
    }

    /// Like or unlike, depending on the current flag. `None` for posts this
    /// view has not loaded.
    pub fn toggle_like(&self, post_id: PostId) -> Option<PostAction> {
        let liked = self.get(post_id)?.liked;
        let action = if liked {
            PostAction::Unlike
        } else {
            PostAction::Like
        };
        self.updates.emit(PostUpdate { post_id, action });
        Some(action)
    }

    /// Save or unsave, depending on the current flag. Saved-posts listeners
    /// are told to refetch.
    pub fn toggle_save(&self, post_id: PostId) -> Option<PostAction> {
        let saved = self.get(post_id)?.saved;
        let action = if saved {
            PostAction::Unsave
        } else {
            PostAction::Save
        };
        self.updates.emit(PostUpdate { post_id, action });
        self.saved.emit();
        Some(action)
    }

    /// Replace every count with `server` when `query_key` is the feed query.
    /// Other keys carry no counts and are ignored.
    pub fn reconcile(
        &self,
        query_key: &str,
        server: impl IntoIterator<Item = (PostId, PostCounts)>,
    ) -> bool {
        if query_key != FEED_QUERY_KEY {
            return false;
        }
        let fresh: HashMap<PostId, PostCounts> = server.into_iter().collect();
        debug!(posts = fresh.len(), "Counters reconciled with server");
        *lock(&self.counts) = fresh;
        true
    }
}
