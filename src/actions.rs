//! Per-post optimistic mutations against the REST authority.
//!
//! Each action kind is serialized per post by an in-flight guard, applied
//! optimistically to the shared feed, confirmed or rolled back on the
//! authoritative response, and broadcast over the channel on success.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use thiserror::Error;
use tracing::info;

use crate::{
    api::{ApiClient, ApiError, LikeOutcome, NewComment, NewReport, PostEdit},
    channel::RealtimeChannel,
    feed::Feed,
    model::{Comment, Post, ReportReason},
    protocol::{ClientEvent, LikeUpdate},
    session::Session,
};

/// Distinct action kinds; same-kind actions on one post never overlap,
/// different kinds may race (last write wins at the server).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Like,
    Comment,
    Edit,
    Delete,
    Report,
}

/// Failures surfaced to the UI by a controller action.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The same action for this post is still in flight.
    #[error("this action is already in progress")]
    Busy,
    /// Rejected before any network call; no rollback was needed.
    #[error("{0}")]
    Invalid(String),
    /// The authoritative call failed; optimistic state has been rolled back.
    #[error("{0}")]
    Failed(String),
}

impl ActionError {
    fn failed(err: ApiError) -> Self {
        ActionError::Failed(err.user_message())
    }
}

/// Controller for user-initiated post mutations.
#[derive(Clone)]
pub struct PostActions {
    feed: Feed,
    api: ApiClient,
    channel: RealtimeChannel,
    session: Session,
    in_flight: Arc<Mutex<HashSet<(String, ActionKind)>>>,
}

/// Releases the in-flight marker on every exit path.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<(String, ActionKind)>>>,
    key: (String, ActionKind),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.key);
        }
    }
}

impl PostActions {
    pub fn new(feed: Feed, api: ApiClient, channel: RealtimeChannel, session: Session) -> Self {
        Self {
            feed,
            api,
            channel,
            session,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Toggle the viewer's like. The optimistic estimate is visible (and
    /// broadcast) immediately; the server's values replace it on success and
    /// the pre-action values return on failure.
    pub async fn toggle_like(&self, post_id: &str) -> Result<LikeOutcome, ActionError> {
        let _guard = self.begin(post_id, ActionKind::Like)?;
        let (likes, _) = self
            .feed
            .begin_like(post_id)
            .ok_or_else(|| ActionError::Invalid("this post is no longer available".into()))?;
        self.channel.emit(ClientEvent::PostLike(LikeUpdate {
            post_id: post_id.to_string(),
            likes,
            user_id: self.session.user_id.clone(),
        }));
        match self.api.like_post(post_id).await {
            Ok(outcome) => {
                self.feed
                    .confirm_like(post_id, outcome.likes, outcome.has_liked);
                Ok(outcome)
            }
            Err(err) => {
                self.feed.rollback_like(post_id);
                Err(ActionError::failed(err))
            }
        }
    }

    /// Submit a comment. The created comment is merged into the feed right
    /// away; the server's later echo merges idempotently by id.
    pub async fn submit_comment(
        &self,
        post_id: &str,
        comment: NewComment,
    ) -> Result<Comment, ActionError> {
        if comment.is_empty() {
            return Err(ActionError::Invalid(
                "a comment needs text or a voice clip".into(),
            ));
        }
        let _guard = self.begin(post_id, ActionKind::Comment)?;
        let created = self
            .api
            .comment_on_post(post_id, &comment)
            .await
            .map_err(ActionError::failed)?;
        self.feed.merge_comment(post_id, created.clone());
        self.channel.emit(ClientEvent::CommentCreate {
            post_id: post_id.to_string(),
            comment: created.clone(),
        });
        Ok(created)
    }

    /// Apply an edit. Returns `Ok(None)` when nothing differs from the
    /// current values, so no request is made.
    pub async fn edit_post(
        &self,
        post_id: &str,
        edit: PostEdit,
    ) -> Result<Option<Post>, ActionError> {
        let current = self
            .feed
            .get(post_id)
            .ok_or_else(|| ActionError::Invalid("this post is no longer available".into()))?;
        let description_changed = edit
            .description
            .as_deref()
            .is_some_and(|d| Some(d) != current.description.as_deref());
        if !description_changed && edit.audio.is_none() {
            return Ok(None);
        }
        let _guard = self.begin(post_id, ActionKind::Edit)?;
        let updated = self
            .api
            .update_post(post_id, &edit)
            .await
            .map_err(ActionError::failed)?;
        // A post deleted while the edit was in flight stays deleted.
        if self.feed.replace_post(updated.clone()) {
            self.channel.emit(ClientEvent::PostUpdate(updated.clone()));
        }
        Ok(Some(updated))
    }

    /// Delete a post. Final: no undo.
    pub async fn delete_post(&self, post_id: &str) -> Result<(), ActionError> {
        let _guard = self.begin(post_id, ActionKind::Delete)?;
        self.api
            .delete_post(post_id)
            .await
            .map_err(ActionError::failed)?;
        self.feed.remove_post(post_id);
        self.channel.emit(ClientEvent::PostDelete(post_id.to_string()));
        info!(%post_id, "post deleted");
        Ok(())
    }

    /// File a moderation report. Touches no post state.
    pub async fn report_post(
        &self,
        post_id: &str,
        reason: Option<ReportReason>,
        details: Option<String>,
    ) -> Result<(), ActionError> {
        let reason =
            reason.ok_or_else(|| ActionError::Invalid("a report reason is required".into()))?;
        let _guard = self.begin(post_id, ActionKind::Report)?;
        self.api
            .create_report(&NewReport {
                post_id: post_id.to_string(),
                reason,
                details,
            })
            .await
            .map_err(ActionError::failed)?;
        Ok(())
    }

    fn begin(&self, post_id: &str, kind: ActionKind) -> Result<InFlightGuard, ActionError> {
        let key = (post_id.to_string(), kind);
        let mut set = self.in_flight.lock().expect("in-flight lock poisoned");
        if !set.insert(key.clone()) {
            return Err(ActionError::Busy);
        }
        Ok(InFlightGuard {
            set: Arc::clone(&self.in_flight),
            key,
        })
    }
}
