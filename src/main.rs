//! Command line interface for the VocalExpress sync client. Supports a live
//! feed session over the realtime channel plus one-shot post actions
//! (search, like, comment, edit, delete, report) against the REST backend.

mod actions;
mod api;
mod channel;
mod config;
mod feed;
mod model;
mod notifications;
mod presence;
mod protocol;
mod session;

use std::{fs, path::Path};

use actions::PostActions;
use anyhow::Context;
use api::{ApiClient, AudioClip, NewComment, PostEdit};
use channel::{RealtimeChannel, Subscription};
use clap::{Parser, Subcommand};
use config::Settings;
use feed::Feed;
use model::Post;
use notifications::NotificationInbox;
use presence::PresenceTracker;
use protocol::{EventKind, ServerEvent};
use session::Session;
use tracing::info;

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "vocalexpress",
    author,
    version,
    about = "Realtime sync client for the VocalExpress voice feed",
    short_flag = 'v',
    long_flag = "version"
)]
struct Cli {
    /// Path to the `.env` configuration file.
    #[arg(long, default_value = ".env")]
    env: String,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Load the feed, join the realtime channel, and follow live updates.
    Feed,
    /// Search posts by description or author.
    Search { query: String },
    /// Toggle the viewer's like on a post.
    Like { post_id: String },
    /// Comment on a post with text, a voice clip, or both.
    Comment {
        post_id: String,
        #[arg(long)]
        content: Option<String>,
        /// Path to a recorded audio file.
        #[arg(long, requires = "audio_duration")]
        audio: Option<String>,
        /// Clip length in seconds.
        #[arg(long)]
        audio_duration: Option<f64>,
    },
    /// Edit a post's description and/or replace its audio.
    Edit {
        post_id: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, requires = "audio_duration")]
        audio: Option<String>,
        #[arg(long)]
        audio_duration: Option<f64>,
    },
    /// Delete a post.
    Delete { post_id: String },
    /// Report a post for moderation.
    Report {
        post_id: String,
        /// One of: inappropriate_content, harassment, spam, hate_speech, other.
        #[arg(long)]
        reason: String,
        #[arg(long)]
        details: Option<String>,
    },
}

/// Execute the selected CLI subcommand.
async fn run(cli: Cli) -> anyhow::Result<()> {
    ensure_env_file(&cli.env)?;
    let cfg = Settings::from_env(&cli.env)?;
    let session = Session::from_settings(&cfg);
    let api = ApiClient::new(cfg.api_url.clone(), &session);

    match cli.command {
        Commands::Feed => {
            let feed = Feed::new(session.user_id.clone());
            let presence = PresenceTracker::new();
            let inbox = NotificationInbox::new();
            let channel = RealtimeChannel::new(cfg.ws_url.clone(), cfg.channel.clone());
            let _subs = wire_subscriptions(&channel, &feed, &presence, &inbox);

            let posts = api.get_posts().await?;
            feed.load(posts);
            info!(
                user = %session.user_id,
                admin = session.is_admin,
                posts = feed.len(),
                "feed loaded"
            );
            channel.connect(&session.user_id);

            for post in feed.posts() {
                print_post(&post);
            }
            info!(
                online = presence.online_count(),
                "following live updates, ctrl-c to stop"
            );
            tokio::signal::ctrl_c().await?;
            info!(unread = inbox.unread_count(), "leaving feed");
            inbox.mark_all_read();
            channel.disconnect();
        }
        Commands::Search { query } => {
            for post in api.search_posts(&query).await {
                print_post(&post);
            }
        }
        Commands::Like { post_id } => {
            let feed = load_feed(&api, &session).await?;
            let channel = RealtimeChannel::new(cfg.ws_url.clone(), cfg.channel.clone());
            let actions = PostActions::new(feed, api, channel, session);
            let outcome = actions.toggle_like(&post_id).await?;
            println!(
                "{post_id}: {} likes, liked={}",
                outcome.likes, outcome.has_liked
            );
        }
        Commands::Comment {
            post_id,
            content,
            audio,
            audio_duration,
        } => {
            let feed = load_feed(&api, &session).await?;
            let channel = RealtimeChannel::new(cfg.ws_url.clone(), cfg.channel.clone());
            let actions = PostActions::new(feed, api, channel, session);
            let comment = NewComment {
                content,
                audio: load_clip(audio, audio_duration)?,
            };
            let created = actions.submit_comment(&post_id, comment).await?;
            println!("comment {} added to {post_id}", created.id);
        }
        Commands::Edit {
            post_id,
            description,
            audio,
            audio_duration,
        } => {
            let feed = load_feed(&api, &session).await?;
            let channel = RealtimeChannel::new(cfg.ws_url.clone(), cfg.channel.clone());
            let actions = PostActions::new(feed, api, channel, session);
            let edit = PostEdit {
                description,
                audio: load_clip(audio, audio_duration)?,
            };
            match actions.edit_post(&post_id, edit).await? {
                Some(updated) => print_post(&updated),
                None => println!("nothing to change for {post_id}"),
            }
        }
        Commands::Delete { post_id } => {
            let feed = load_feed(&api, &session).await?;
            let channel = RealtimeChannel::new(cfg.ws_url.clone(), cfg.channel.clone());
            let actions = PostActions::new(feed, api, channel, session);
            actions.delete_post(&post_id).await?;
            println!("deleted {post_id}");
        }
        Commands::Report {
            post_id,
            reason,
            details,
        } => {
            let reason = reason.parse().context("unknown report reason")?;
            let feed = load_feed(&api, &session).await?;
            let channel = RealtimeChannel::new(cfg.ws_url.clone(), cfg.channel.clone());
            let actions = PostActions::new(feed, api, channel, session);
            actions.report_post(&post_id, Some(reason), details).await?;
            println!("report filed for {post_id}");
        }
    }
    Ok(())
}

/// Route each inbound event kind to the component that consumes it. The
/// returned subscriptions must stay alive for the handlers to keep firing.
fn wire_subscriptions(
    channel: &RealtimeChannel,
    feed: &Feed,
    presence: &PresenceTracker,
    inbox: &NotificationInbox,
) -> Vec<Subscription> {
    let mut subs = Vec::new();
    for kind in [
        EventKind::PostCreated,
        EventKind::PostUpdated,
        EventKind::PostDeleted,
        EventKind::CommentCreated,
        EventKind::PostLiked,
    ] {
        let feed = feed.clone();
        subs.push(channel.subscribe(kind, move |event| feed.apply_event(event)));
    }
    let presence = presence.clone();
    subs.push(channel.subscribe(EventKind::OnlineUsers, move |event| {
        if let ServerEvent::OnlineUsers(users) = event {
            presence.replace(users.clone());
        }
    }));
    let inbox = inbox.clone();
    subs.push(channel.subscribe(EventKind::Notification, move |event| {
        if let ServerEvent::Notification(n) = event {
            info!(from = %n.from_user.username, "notification: {}", n.message);
            inbox.push(n.clone());
        }
    }));
    subs
}

/// One-shot commands need the target post loaded before acting on it.
async fn load_feed(api: &ApiClient, session: &Session) -> anyhow::Result<Feed> {
    let feed = Feed::new(session.user_id.clone());
    feed.load(api.get_posts().await?);
    Ok(feed)
}

fn load_clip(path: Option<String>, duration: Option<f64>) -> anyhow::Result<Option<AudioClip>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let duration = duration.context("--audio-duration is required with --audio")?;
    let bytes = fs::read(&path).with_context(|| format!("reading audio file {path}"))?;
    let file_name = Path::new(&path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "clip.webm".into());
    Ok(Some(AudioClip {
        bytes,
        file_name,
        duration,
    }))
}

fn print_post(post: &Post) {
    println!(
        "[{}] {}: {} ({} likes, {} comments)",
        post.id,
        post.username,
        post.description.as_deref().unwrap_or("<voice only>"),
        post.likes,
        post.comments.len()
    );
}

/// Create a default `.env` file if one is not already present at `path`.
fn ensure_env_file(path: &str) -> anyhow::Result<()> {
    let env_path = Path::new(path);
    if env_path.exists() {
        return Ok(());
    }
    if let Some(parent) = env_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut content = String::new();
    content.push_str("API_URL=http://127.0.0.1:4000/api\n");
    content.push_str("WS_URL=ws://127.0.0.1:4001/\n");
    content.push_str("TOKEN=\n");
    content.push_str("USER_ID=\n");
    content.push_str("USERNAME_DISPLAY=\n");
    content.push_str("AVATAR=\n");
    content.push_str("IS_ADMIN=0\n");
    content.push_str("HANDSHAKE_TIMEOUT_SECS=30\n");
    content.push_str("RECONNECT_MAX=5\n");
    content.push_str("RECONNECT_BASE_MS=500\n");
    content.push_str("RECONNECT_CAP_MS=5000\n");
    fs::write(env_path, content)?;
    Ok(())
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();
    run(cli).await
}
