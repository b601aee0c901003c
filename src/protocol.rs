//! Wire protocol for the realtime channel.
//!
//! Every frame is a two-element JSON array `["event-name", payload]`. Payloads
//! are parsed into tagged variants before dispatch; a frame with an unknown
//! name or a malformed payload is dropped by the caller rather than forwarded
//! with missing fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{Comment, Notification, Post};

/// Events the server pushes to clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Notification(Notification),
    /// Full replacement snapshot of connected user ids.
    OnlineUsers(Vec<String>),
    PostCreated(Post),
    PostUpdated(Post),
    PostDeleted(String),
    CommentCreated { post_id: String, comment: Comment },
    PostLiked(LikeUpdate),
}

/// Payload of `post:liked` / `post:like`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LikeUpdate {
    pub post_id: String,
    /// Like count as the originator sees it; authoritative when inbound.
    pub likes: u64,
    /// User whose like action produced the event.
    pub user_id: String,
}

/// Payload of `comment:create` / `comment:created`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct CommentEnvelope {
    post_id: String,
    comment: Comment,
}

/// Events clients send to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Announce presence for a user id right after connecting.
    Join(String),
    /// Request an `onlineUsers` snapshot.
    GetOnlineUsers,
    PostCreate(Post),
    PostUpdate(Post),
    PostDelete(String),
    CommentCreate { post_id: String, comment: Comment },
    PostLike(LikeUpdate),
}

/// Names used to route subscriptions to inbound events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Notification,
    OnlineUsers,
    PostCreated,
    PostUpdated,
    PostDeleted,
    CommentCreated,
    PostLiked,
}

impl ServerEvent {
    /// Routing kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::Notification(_) => EventKind::Notification,
            ServerEvent::OnlineUsers(_) => EventKind::OnlineUsers,
            ServerEvent::PostCreated(_) => EventKind::PostCreated,
            ServerEvent::PostUpdated(_) => EventKind::PostUpdated,
            ServerEvent::PostDeleted(_) => EventKind::PostDeleted,
            ServerEvent::CommentCreated { .. } => EventKind::CommentCreated,
            ServerEvent::PostLiked(_) => EventKind::PostLiked,
        }
    }

    /// Parse a text frame into a typed event. Returns `None` for anything
    /// that is not a well-formed `["name", payload]` frame with a payload
    /// matching the named event.
    pub fn parse(frame: &str) -> Option<ServerEvent> {
        let val: Value = serde_json::from_str(frame).ok()?;
        let arr = val.as_array()?;
        let name = arr.first()?.as_str()?;
        let payload = arr.get(1).cloned().unwrap_or(Value::Null);
        match name {
            "notification" => Some(ServerEvent::Notification(
                serde_json::from_value(payload).ok()?,
            )),
            "onlineUsers" => Some(ServerEvent::OnlineUsers(
                serde_json::from_value(payload).ok()?,
            )),
            "post:created" => Some(ServerEvent::PostCreated(
                serde_json::from_value(payload).ok()?,
            )),
            "post:updated" => Some(ServerEvent::PostUpdated(
                serde_json::from_value(payload).ok()?,
            )),
            "post:deleted" => Some(ServerEvent::PostDeleted(
                serde_json::from_value(payload).ok()?,
            )),
            "comment:created" => {
                let env: CommentEnvelope = serde_json::from_value(payload).ok()?;
                Some(ServerEvent::CommentCreated {
                    post_id: env.post_id,
                    comment: env.comment,
                })
            }
            "post:liked" => Some(ServerEvent::PostLiked(
                serde_json::from_value(payload).ok()?,
            )),
            _ => None,
        }
    }
}

impl ClientEvent {
    /// Serialize this event into its text frame.
    pub fn to_frame(&self) -> String {
        let (name, payload) = match self {
            ClientEvent::Join(user_id) => ("join", serde_json::json!(user_id)),
            ClientEvent::GetOnlineUsers => ("getOnlineUsers", Value::Null),
            ClientEvent::PostCreate(post) => {
                ("post:create", serde_json::to_value(post).unwrap_or(Value::Null))
            }
            ClientEvent::PostUpdate(post) => {
                ("post:update", serde_json::to_value(post).unwrap_or(Value::Null))
            }
            ClientEvent::PostDelete(id) => ("post:delete", serde_json::json!(id)),
            ClientEvent::CommentCreate { post_id, comment } => (
                "comment:create",
                serde_json::to_value(CommentEnvelope {
                    post_id: post_id.clone(),
                    comment: comment.clone(),
                })
                .unwrap_or(Value::Null),
            ),
            ClientEvent::PostLike(update) => (
                "post:like",
                serde_json::to_value(update).unwrap_or(Value::Null),
            ),
        };
        serde_json::json!([name, payload]).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_comment(id: &str) -> Comment {
        Comment {
            id: id.into(),
            user_id: "u2".into(),
            username: "bob".into(),
            avatar: "b.png".into(),
            content: Some("nice".into()),
            audio_url: None,
            audio_duration: None,
            timestamp: chrono::Utc.with_ymd_and_hms(2024, 5, 1, 9, 5, 0).unwrap(),
        }
    }

    #[test]
    fn parses_online_users_snapshot() {
        let ev = ServerEvent::parse(r#"["onlineUsers", ["u1", "u2"]]"#).unwrap();
        assert_eq!(
            ev,
            ServerEvent::OnlineUsers(vec!["u1".into(), "u2".into()])
        );
        assert_eq!(ev.kind(), EventKind::OnlineUsers);
    }

    #[test]
    fn parses_post_deleted_id() {
        let ev = ServerEvent::parse(r#"["post:deleted", "p9"]"#).unwrap();
        assert_eq!(ev, ServerEvent::PostDeleted("p9".into()));
    }

    #[test]
    fn parses_like_update() {
        let ev = ServerEvent::parse(
            r#"["post:liked", {"postId": "p1", "likes": 6, "userId": "u1"}]"#,
        )
        .unwrap();
        match ev {
            ServerEvent::PostLiked(update) => {
                assert_eq!(update.post_id, "p1");
                assert_eq!(update.likes, 6);
                assert_eq!(update.user_id, "u1");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn malformed_frames_fail_closed() {
        assert!(ServerEvent::parse("not json").is_none());
        assert!(ServerEvent::parse("{}").is_none());
        assert!(ServerEvent::parse(r#"["unknown:event", {}]"#).is_none());
        // Right name, wrong payload shape.
        assert!(ServerEvent::parse(r#"["post:liked", {"postId": "p1"}]"#).is_none());
        assert!(ServerEvent::parse(r#"["onlineUsers", "u1"]"#).is_none());
    }

    #[test]
    fn comment_create_frame_round_trips() {
        let out = ClientEvent::CommentCreate {
            post_id: "p1".into(),
            comment: sample_comment("c1"),
        }
        .to_frame();
        // The server echoes creates back under the past-tense name.
        let echoed = out.replacen("comment:create", "comment:created", 1);
        match ServerEvent::parse(&echoed).unwrap() {
            ServerEvent::CommentCreated { post_id, comment } => {
                assert_eq!(post_id, "p1");
                assert_eq!(comment.id, "c1");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn join_and_snapshot_request_frames() {
        assert_eq!(
            ClientEvent::Join("u1".into()).to_frame(),
            r#"["join","u1"]"#
        );
        assert_eq!(
            ClientEvent::GetOnlineUsers.to_frame(),
            r#"["getOnlineUsers",null]"#
        );
    }
}
