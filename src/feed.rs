//! Shared post collection and the rules for converging it.
//!
//! The feed is the single owner of the visible posts. Three input classes
//! mutate it: bulk loads, remote events from the channel, and the optimistic
//! writes of the interaction controller. Remote merges are idempotent by id,
//! so a user's own action and its later echo collapse to one application.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tracing::debug;

use crate::{
    model::{Comment, Post},
    protocol::ServerEvent,
};

/// Collection lifecycle: `Loading` until the first bulk load lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Loading,
    Ready,
}

/// Pending, not-yet-confirmed like state for one post. Composed with the
/// confirmed base values only when reading; collapsed once the authoritative
/// response or event arrives.
#[derive(Debug, Clone, Copy)]
struct LikeOverlay {
    delta: i64,
    has_liked: bool,
}

struct FeedInner {
    state: FeedState,
    posts: Vec<Post>,
    overlays: HashMap<String, LikeOverlay>,
}

/// Ordered, shared collection of visible posts. Clones share state.
#[derive(Clone)]
pub struct Feed {
    viewer_id: Arc<str>,
    inner: Arc<Mutex<FeedInner>>,
}

impl Feed {
    /// Create an empty feed for the given viewer.
    pub fn new(viewer_id: impl Into<String>) -> Self {
        Self {
            viewer_id: viewer_id.into().into(),
            inner: Arc::new(Mutex::new(FeedInner {
                state: FeedState::Loading,
                posts: Vec::new(),
                overlays: HashMap::new(),
            })),
        }
    }

    pub fn state(&self) -> FeedState {
        self.lock().state
    }

    /// Replace the whole collection. No merge with prior state; any pending
    /// like overlays are dropped.
    pub fn load(&self, posts: Vec<Post>) {
        let mut inner = self.lock();
        inner.posts = posts;
        inner.overlays.clear();
        inner.state = FeedState::Ready;
    }

    /// Snapshot of the collection with pending like state composed in.
    pub fn posts(&self) -> Vec<Post> {
        let inner = self.lock();
        inner
            .posts
            .iter()
            .map(|p| compose(p, inner.overlays.get(&p.id)))
            .collect()
    }

    /// Composed view of a single post.
    pub fn get(&self, post_id: &str) -> Option<Post> {
        let inner = self.lock();
        inner
            .posts
            .iter()
            .find(|p| p.id == post_id)
            .map(|p| compose(p, inner.overlays.get(post_id)))
    }

    pub fn len(&self) -> usize {
        self.lock().posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().posts.is_empty()
    }

    /// Merge one remote event into the collection. Events referencing a post
    /// id that is not loaded are ignored; there is no fetch-on-miss.
    pub fn apply_event(&self, event: &ServerEvent) {
        match event {
            ServerEvent::PostCreated(post) => {
                let mut inner = self.lock();
                match inner.posts.iter_mut().find(|p| p.id == post.id) {
                    // Already present (our own create or a bulk load that
                    // raced the event): replace in place.
                    Some(existing) => *existing = post.clone(),
                    None => inner.posts.insert(0, post.clone()),
                }
            }
            ServerEvent::PostUpdated(post) => {
                let mut inner = self.lock();
                // An id we never loaded, or one already deleted, stays gone.
                if let Some(existing) = inner.posts.iter_mut().find(|p| p.id == post.id) {
                    *existing = post.clone();
                } else {
                    debug!(post_id = %post.id, "update for unknown post ignored");
                }
            }
            ServerEvent::PostDeleted(post_id) => {
                let mut inner = self.lock();
                inner.posts.retain(|p| p.id != *post_id);
                inner.overlays.remove(post_id);
            }
            ServerEvent::CommentCreated { post_id, comment } => {
                self.merge_comment(post_id, comment.clone());
            }
            ServerEvent::PostLiked(update) => {
                let mut inner = self.lock();
                let own = update.user_id.as_str() == &*self.viewer_id;
                if let Some(post) = inner.posts.iter_mut().find(|p| p.id == update.post_id) {
                    post.likes = update.likes;
                    if own {
                        post.has_liked = !post.has_liked;
                    }
                }
                // The event carries the authoritative count; any pending
                // estimate for this post is superseded.
                inner.overlays.remove(&update.post_id);
            }
            ServerEvent::Notification(_) | ServerEvent::OnlineUsers(_) => {}
        }
    }

    /// Merge a comment into a post by comment id: replace when already
    /// present and not newer, append otherwise. Returns false when the post
    /// id is not loaded. The submitter's immediate local append and the
    /// server's later echo both funnel through here, so the echo is a no-op.
    pub fn merge_comment(&self, post_id: &str, comment: Comment) -> bool {
        let mut inner = self.lock();
        let Some(post) = inner.posts.iter_mut().find(|p| p.id == post_id) else {
            debug!(%post_id, "comment for unknown post ignored");
            return false;
        };
        match post.comments.iter_mut().find(|c| c.id == comment.id) {
            Some(existing) => {
                if comment.timestamp >= existing.timestamp {
                    *existing = comment;
                }
            }
            None => post.comments.push(comment),
        }
        true
    }

    /// Replace a post with the server's returned representation. No-op when
    /// the id is no longer present (deleted concurrently).
    pub fn replace_post(&self, post: Post) -> bool {
        let mut inner = self.lock();
        match inner.posts.iter_mut().find(|p| p.id == post.id) {
            Some(existing) => {
                *existing = post;
                true
            }
            None => false,
        }
    }

    /// Remove a post. Idempotent.
    pub fn remove_post(&self, post_id: &str) -> bool {
        let mut inner = self.lock();
        let before = inner.posts.len();
        inner.posts.retain(|p| p.id != post_id);
        inner.overlays.remove(post_id);
        inner.posts.len() != before
    }

    /// Install an optimistic like toggle for a post and return the composed
    /// `(likes, has_liked)` estimate. `None` when the post is not loaded.
    pub fn begin_like(&self, post_id: &str) -> Option<(u64, bool)> {
        let mut inner = self.lock();
        let post = inner.posts.iter().find(|p| p.id == post_id)?;
        let overlay = if post.has_liked {
            LikeOverlay {
                delta: -1,
                has_liked: false,
            }
        } else {
            LikeOverlay {
                delta: 1,
                has_liked: true,
            }
        };
        let composed = compose_values(post.likes, &overlay);
        inner.overlays.insert(post_id.to_string(), overlay);
        Some(composed)
    }

    /// Collapse a pending like into the confirmed base values.
    pub fn confirm_like(&self, post_id: &str, likes: u64, has_liked: bool) {
        let mut inner = self.lock();
        inner.overlays.remove(post_id);
        if let Some(post) = inner.posts.iter_mut().find(|p| p.id == post_id) {
            post.likes = likes;
            post.has_liked = has_liked;
        }
    }

    /// Discard a pending like, restoring the exact pre-action view.
    pub fn rollback_like(&self, post_id: &str) {
        self.lock().overlays.remove(post_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FeedInner> {
        self.inner.lock().expect("feed lock poisoned")
    }
}

/// Compose a post's confirmed values with its pending overlay, if any.
fn compose(post: &Post, overlay: Option<&LikeOverlay>) -> Post {
    let mut composed = post.clone();
    if let Some(overlay) = overlay {
        let (likes, has_liked) = compose_values(post.likes, overlay);
        composed.likes = likes;
        composed.has_liked = has_liked;
    }
    composed
}

fn compose_values(base_likes: u64, overlay: &LikeOverlay) -> (u64, bool) {
    let likes = (base_likes as i64 + overlay.delta).max(0) as u64;
    (likes, overlay.has_liked)
}
