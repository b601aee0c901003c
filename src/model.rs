//! Domain records exchanged with the VocalExpress backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A published voice note as the backend serves it.
///
/// ```json
/// {
///   "id": "p1",
///   "userId": "u1",
///   "username": "ada",
///   "avatar": "https://cdn/avatars/ada.png",
///   "audioUrl": "https://cdn/audio/p1.webm",
///   "audioDuration": 12.5,
///   "description": "morning thoughts",
///   "timestamp": "2024-05-01T09:00:00Z",
///   "likes": 3,
///   "comments": [],
///   "hasLiked": false
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Opaque identifier assigned by the server.
    pub id: String,
    /// Author's user id.
    pub user_id: String,
    /// Author display name.
    pub username: String,
    /// Author avatar URL.
    pub avatar: String,
    /// Location of the audio clip.
    pub audio_url: String,
    /// Clip length in seconds, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_duration: Option<f64>,
    /// Optional text accompanying the clip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Server-confirmed like count. Optimistic like state lives in the
    /// feed's overlay, never here.
    pub likes: u64,
    /// Comments in insertion order.
    pub comments: Vec<Comment>,
    /// Whether the current viewer has liked this post (server-confirmed).
    pub has_liked: bool,
}

/// A text and/or voice comment attached to a post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Opaque identifier assigned by the server.
    pub id: String,
    /// Author's user id.
    pub user_id: String,
    /// Author display name.
    pub username: String,
    /// Author avatar URL.
    pub avatar: String,
    /// Text content, absent for voice-only comments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Audio clip URL, absent for text-only comments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    /// Clip length in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_duration: Option<f64>,
    /// Creation time; used for last-write-wins merges.
    pub timestamp: DateTime<Utc>,
}

/// Minimal sender identity carried inside a notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationSender {
    pub username: String,
    pub avatar: String,
}

/// A social or moderation notification pushed over the channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub from_user: NotificationSender,
    pub message: String,
    /// Post the notification refers to, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Closed set of reasons accepted when reporting a post.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReportReason {
    #[serde(rename = "inappropriate_content")]
    Inappropriate,
    #[serde(rename = "harassment")]
    Harassment,
    #[serde(rename = "spam")]
    Spam,
    #[serde(rename = "hate_speech")]
    HateSpeech,
    #[serde(rename = "other")]
    Other,
}

impl std::str::FromStr for ReportReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inappropriate_content" | "inappropriate" => Ok(Self::Inappropriate),
            "harassment" => Ok(Self::Harassment),
            "spam" => Ok(Self::Spam),
            "hate_speech" | "hate-speech" => Ok(Self::HateSpeech),
            "other" => Ok(Self::Other),
            other => Err(anyhow::anyhow!("unknown report reason: {other}")),
        }
    }
}
