//! REST client for authoritative mutations and bulk loads.
//!
//! Every backend response is wrapped in `{ success, message?, data? }`. A
//! response with `success: false` carries a user-presentable message which is
//! preserved so controllers can surface it after rolling back.

use reqwest::{multipart, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use tracing::warn;

use crate::{
    model::{Comment, Post, ReportReason},
    session::Session,
};

/// Failures surfaced by REST calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered and rejected the request with a message.
    #[error("request rejected: {0}")]
    Rejected(String),
    /// The server answered with a bare failure status.
    #[error("request failed with status {0}")]
    Status(StatusCode),
    /// The request never completed.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    /// Message suitable for showing to the viewer: the server's own wording
    /// when present, a generic fallback otherwise.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Rejected(message) => message.clone(),
            _ => "The server could not be reached. Please try again.".into(),
        }
    }
}

/// Authoritative result of a like toggle.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LikeOutcome {
    pub likes: u64,
    pub has_liked: bool,
}

/// Audio produced by the capture collaborator: raw bytes plus duration.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub duration: f64,
}

/// Content of a comment submission; at least one of the parts must be set.
#[derive(Debug, Clone, Default)]
pub struct NewComment {
    pub content: Option<String>,
    pub audio: Option<AudioClip>,
}

impl NewComment {
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().map_or(true, str::is_empty) && self.audio.is_none()
    }
}

/// Changes requested by an edit; only description and audio may change.
#[derive(Debug, Clone, Default)]
pub struct PostEdit {
    pub description: Option<String>,
    pub audio: Option<AudioClip>,
}

/// One-shot moderation report.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub post_id: String,
    pub reason: ReportReason,
    pub details: Option<String>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    message: Option<String>,
    data: Option<T>,
}

/// Stateless request/response client. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Build a client for the given base URL, attaching the session's bearer
    /// token to every request when one is configured.
    pub fn new(base_url: impl Into<String>, session: &Session) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: session.bearer_token().map(String::from),
        }
    }

    /// Bulk load of the whole feed.
    pub async fn get_posts(&self) -> Result<Vec<Post>, ApiError> {
        let req = self.http.get(self.url("/posts"));
        self.send(req).await
    }

    /// Posts authored by one user.
    pub async fn get_user_posts(&self, user_id: &str) -> Result<Vec<Post>, ApiError> {
        let req = self.http.get(self.url(&format!("/posts/user/{user_id}")));
        self.send(req).await
    }

    /// Full-text search. Degrades to an empty result set on any failure so
    /// the results view never breaks.
    pub async fn search_posts(&self, query: &str) -> Vec<Post> {
        let req = self
            .http
            .get(self.url("/posts/search"))
            .query(&[("query", query)]);
        match self.send(req).await {
            Ok(posts) => posts,
            Err(err) => {
                warn!(%query, error = %err, "search failed, returning empty result set");
                Vec::new()
            }
        }
    }

    /// Toggle the viewer's like on a post.
    pub async fn like_post(&self, post_id: &str) -> Result<LikeOutcome, ApiError> {
        let req = self.http.post(self.url(&format!("/posts/{post_id}/like")));
        self.send(req).await
    }

    /// Create a comment; JSON for text-only, multipart when audio is
    /// attached.
    pub async fn comment_on_post(
        &self,
        post_id: &str,
        comment: &NewComment,
    ) -> Result<Comment, ApiError> {
        let url = self.url(&format!("/posts/{post_id}/comment"));
        let req = match &comment.audio {
            Some(audio) => {
                let mut form = audio_form(audio);
                if let Some(content) = &comment.content {
                    form = form.text("content", content.clone());
                }
                self.http.post(url).multipart(form)
            }
            None => self
                .http
                .post(url)
                .json(&serde_json::json!({ "content": comment.content })),
        };
        self.send(req).await
    }

    /// Apply an edit and return the server's representation of the post.
    pub async fn update_post(&self, post_id: &str, edit: &PostEdit) -> Result<Post, ApiError> {
        let url = self.url(&format!("/posts/{post_id}"));
        let req = match &edit.audio {
            Some(audio) => {
                let mut form = audio_form(audio);
                if let Some(description) = &edit.description {
                    form = form.text("description", description.clone());
                }
                self.http.put(url).multipart(form)
            }
            None => self
                .http
                .put(url)
                .json(&serde_json::json!({ "description": edit.description })),
        };
        self.send(req).await
    }

    /// Delete a post. Irreversible.
    pub async fn delete_post(&self, post_id: &str) -> Result<(), ApiError> {
        let req = self.http.delete(self.url(&format!("/posts/{post_id}")));
        self.send_expecting_nothing(req).await
    }

    /// File a moderation report.
    pub async fn create_report(&self, report: &NewReport) -> Result<(), ApiError> {
        let req = self.http.post(self.url("/reports")).json(&serde_json::json!({
            "postId": report.post_id,
            "reason": report.reason,
            "details": report.details,
        }));
        self.send_expecting_nothing(req).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let envelope = self.exchange::<T>(req).await?;
        envelope.data.ok_or_else(|| {
            ApiError::Rejected(
                envelope
                    .message
                    .unwrap_or_else(|| "the server returned no data".into()),
            )
        })
    }

    async fn send_expecting_nothing(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<(), ApiError> {
        self.exchange::<serde_json::Value>(req).await.map(|_| ())
    }

    async fn exchange<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<Envelope<T>, ApiError> {
        let response = self.authorize(req).send().await?;
        let status = response.status();
        if !status.is_success() {
            // Failure bodies still tend to carry the envelope message.
            if let Ok(envelope) = response.json::<Envelope<serde_json::Value>>().await {
                if let Some(message) = envelope.message {
                    return Err(ApiError::Rejected(message));
                }
            }
            return Err(ApiError::Status(status));
        }
        let envelope: Envelope<T> = response.json().await?;
        if !envelope.success {
            return Err(ApiError::Rejected(
                envelope
                    .message
                    .unwrap_or_else(|| "the request was not accepted".into()),
            ));
        }
        Ok(envelope)
    }
}

fn audio_form(audio: &AudioClip) -> multipart::Form {
    multipart::Form::new()
        .part(
            "audio",
            multipart::Part::bytes(audio.bytes.clone()).file_name(audio.file_name.clone()),
        )
        .text("audioDuration", audio.duration.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelTuning, Settings};
    use axum::{
        extract::{Multipart, Path},
        http::HeaderMap,
        routing::{get, post, put},
        Json, Router,
    };

    fn session(token: Option<&str>) -> Session {
        Session::from_settings(&Settings {
            api_url: String::new(),
            ws_url: String::new(),
            token: token.map(String::from),
            user_id: "u1".into(),
            username: "ada".into(),
            avatar: "a.png".into(),
            is_admin: false,
            channel: ChannelTuning::default(),
        })
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn post_json(id: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "userId": "author",
            "username": "ada",
            "avatar": "a.png",
            "audioUrl": "clip.webm",
            "timestamp": "2024-05-01T09:00:00Z",
            "likes": 0,
            "comments": [],
            "hasLiked": false
        })
    }

    #[tokio::test]
    async fn like_sends_bearer_token_and_parses_outcome() {
        let app = Router::new().route(
            "/posts/:id/like",
            post(|Path(id): Path<String>, headers: HeaderMap| async move {
                assert_eq!(id, "p1");
                assert_eq!(
                    headers.get("authorization").unwrap().to_str().unwrap(),
                    "Bearer secret"
                );
                Json(serde_json::json!({
                    "success": true,
                    "data": { "likes": 6, "hasLiked": true }
                }))
            }),
        );
        let base = serve(app).await;
        let client = ApiClient::new(base, &session(Some("secret")));
        let outcome = client.like_post("p1").await.unwrap();
        assert_eq!(
            outcome,
            LikeOutcome {
                likes: 6,
                has_liked: true
            }
        );
    }

    #[tokio::test]
    async fn rejected_envelope_preserves_server_message() {
        let app = Router::new().route(
            "/posts/:id/like",
            post(|| async {
                Json(serde_json::json!({
                    "success": false,
                    "message": "post is locked"
                }))
            }),
        );
        let base = serve(app).await;
        let client = ApiClient::new(base, &session(None));
        let err = client.like_post("p1").await.unwrap_err();
        assert_eq!(err.user_message(), "post is locked");
    }

    #[tokio::test]
    async fn bare_http_failure_yields_generic_message() {
        let app = Router::new().route(
            "/posts",
            get(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = serve(app).await;
        let client = ApiClient::new(base, &session(None));
        let err = client.get_posts().await.unwrap_err();
        assert!(matches!(err, ApiError::Status(_)));
        assert!(err.user_message().contains("try again"));
    }

    #[tokio::test]
    async fn search_failure_degrades_to_empty() {
        let app = Router::new().route(
            "/posts/search",
            get(|| async { (axum::http::StatusCode::BAD_GATEWAY, "down") }),
        );
        let base = serve(app).await;
        let client = ApiClient::new(base, &session(None));
        assert!(client.search_posts("anything").await.is_empty());
    }

    #[tokio::test]
    async fn search_success_returns_matches() {
        let app = Router::new().route(
            "/posts/search",
            get(|| async {
                Json(serde_json::json!({
                    "success": true,
                    "data": [post_json("p1")]
                }))
            }),
        );
        let base = serve(app).await;
        let client = ApiClient::new(base, &session(None));
        let posts = client.search_posts("morning").await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "p1");
    }

    #[tokio::test]
    async fn text_comment_goes_as_json() {
        let app = Router::new().route(
            "/posts/:id/comment",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["content"], "nice one");
                Json(serde_json::json!({
                    "success": true,
                    "data": {
                        "id": "c1",
                        "userId": "u1",
                        "username": "ada",
                        "avatar": "a.png",
                        "content": "nice one",
                        "timestamp": "2024-05-01T09:05:00Z"
                    }
                }))
            }),
        );
        let base = serve(app).await;
        let client = ApiClient::new(base, &session(None));
        let comment = client
            .comment_on_post(
                "p1",
                &NewComment {
                    content: Some("nice one".into()),
                    audio: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(comment.id, "c1");
    }

    #[tokio::test]
    async fn voice_comment_goes_as_multipart() {
        let app = Router::new().route(
            "/posts/:id/comment",
            post(|mut multipart: Multipart| async move {
                let mut fields = Vec::new();
                while let Some(field) = multipart.next_field().await.unwrap() {
                    fields.push(field.name().unwrap().to_string());
                }
                fields.sort();
                assert_eq!(fields, vec!["audio", "audioDuration"]);
                Json(serde_json::json!({
                    "success": true,
                    "data": {
                        "id": "c2",
                        "userId": "u1",
                        "username": "ada",
                        "avatar": "a.png",
                        "audioUrl": "c2.webm",
                        "audioDuration": 4.2,
                        "timestamp": "2024-05-01T09:06:00Z"
                    }
                }))
            }),
        );
        let base = serve(app).await;
        let client = ApiClient::new(base, &session(None));
        let comment = client
            .comment_on_post(
                "p1",
                &NewComment {
                    content: None,
                    audio: Some(AudioClip {
                        bytes: vec![1, 2, 3],
                        file_name: "clip.webm".into(),
                        duration: 4.2,
                    }),
                },
            )
            .await
            .unwrap();
        assert_eq!(comment.audio_url.as_deref(), Some("c2.webm"));
    }

    #[tokio::test]
    async fn update_and_delete_round_trip() {
        let app = Router::new().route(
            "/posts/:id",
            put(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["description"], "new text");
                let mut post = post_json("p1");
                post["description"] = "new text".into();
                Json(serde_json::json!({ "success": true, "data": post }))
            })
            .delete(|| async { Json(serde_json::json!({ "success": true })) }),
        );
        let base = serve(app).await;
        let client = ApiClient::new(base, &session(None));
        let post = client
            .update_post(
                "p1",
                &PostEdit {
                    description: Some("new text".into()),
                    audio: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(post.description.as_deref(), Some("new text"));
        client.delete_post("p1").await.unwrap();
    }

    #[tokio::test]
    async fn report_posts_reason_code() {
        let app = Router::new().route(
            "/reports",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["postId"], "p1");
                assert_eq!(body["reason"], "spam");
                assert_eq!(body["details"], "repeat offender");
                Json(serde_json::json!({ "success": true }))
            }),
        );
        let base = serve(app).await;
        let client = ApiClient::new(base, &session(None));
        client
            .create_report(&NewReport {
                post_id: "p1".into(),
                reason: ReportReason::Spam,
                details: Some("repeat offender".into()),
            })
            .await
            .unwrap();
    }
}
