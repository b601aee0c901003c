//! Realtime channel: one WebSocket connection per authenticated session.
//!
//! The channel owns the connect/reconnect lifecycle and a subscribe/emit
//! surface over the typed events in [`crate::protocol`]. Transport failures
//! are retried with a bounded, growing delay and are never surfaced to
//! consumers beyond the liveness flag.

use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
};

use futures_util::{SinkExt, StreamExt};
use tokio::{sync::mpsc, time::timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, warn};

use crate::{
    config::ChannelTuning,
    protocol::{ClientEvent, EventKind, ServerEvent},
};

type Handler = Box<dyn Fn(&ServerEvent) + Send + Sync + 'static>;

struct ChannelInner {
    ws_url: String,
    tuning: ChannelTuning,
    connected: AtomicBool,
    handlers: Mutex<HashMap<EventKind, Vec<(u64, Handler)>>>,
    next_handler_id: AtomicU64,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    session: Mutex<Option<String>>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Handle to a persistent bidirectional connection. Clones share the
/// connection; the session lifecycle owns creation and teardown, everything
/// else only subscribes and emits.
#[derive(Clone)]
pub struct RealtimeChannel {
    inner: Arc<ChannelInner>,
}

/// Registration of one handler for one event kind. Dropping it (or calling
/// [`Subscription::cancel`]) unregisters the handler.
pub struct Subscription {
    channel: Weak<ChannelInner>,
    kind: EventKind,
    id: u64,
}

impl RealtimeChannel {
    pub fn new(ws_url: impl Into<String>, tuning: ChannelTuning) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                ws_url: ws_url.into(),
                tuning,
                connected: AtomicBool::new(false),
                handlers: Mutex::new(HashMap::new()),
                next_handler_id: AtomicU64::new(0),
                outbound: Mutex::new(None),
                session: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    /// Open the connection for a session. Idempotent: a second call for the
    /// same user while the connection task is alive is a no-op; a call for a
    /// different user replaces the connection.
    pub fn connect(&self, user_id: &str) {
        let mut task = self.inner.task.lock().expect("channel lock poisoned");
        let mut session = self.inner.session.lock().expect("channel lock poisoned");
        let alive = task.as_ref().is_some_and(|t| !t.is_finished());
        if alive && session.as_deref() == Some(user_id) {
            return;
        }
        if let Some(previous) = task.take() {
            previous.abort();
        }
        self.inner.connected.store(false, Ordering::SeqCst);
        self.inner
            .outbound
            .lock()
            .expect("channel lock poisoned")
            .take();
        *session = Some(user_id.to_string());
        let inner = Arc::clone(&self.inner);
        let user = user_id.to_string();
        *task = Some(tokio::spawn(async move {
            run_connection(inner, user).await;
        }));
    }

    /// Whether the transport is currently live.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Register a handler for one event kind. The handler runs on the
    /// dispatch task; a panic inside it is caught and logged.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_handler_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .handlers
            .lock()
            .expect("channel lock poisoned")
            .entry(kind)
            .or_default()
            .push((id, Box::new(handler)));
        Subscription {
            channel: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Send an event to the server. While the connection is not live the
    /// event is dropped, never queued; callers that need delivery guarantees
    /// use the REST path instead.
    pub fn emit(&self, event: ClientEvent) {
        if !self.is_connected() {
            debug!(?event, "channel offline, dropping emit");
            return;
        }
        let outbound = self.inner.outbound.lock().expect("channel lock poisoned");
        if let Some(tx) = outbound.as_ref() {
            let _ = tx.send(Message::Text(event.to_frame()));
        }
    }

    /// Tear the connection down. All handler registrations become inert.
    pub fn disconnect(&self) {
        if let Some(task) = self
            .inner
            .task
            .lock()
            .expect("channel lock poisoned")
            .take()
        {
            task.abort();
        }
        self.inner.connected.store(false, Ordering::SeqCst);
        self.inner
            .outbound
            .lock()
            .expect("channel lock poisoned")
            .take();
        self.inner
            .handlers
            .lock()
            .expect("channel lock poisoned")
            .clear();
        self.inner
            .session
            .lock()
            .expect("channel lock poisoned")
            .take();
    }
}

impl Subscription {
    /// Unregister the handler now instead of at drop time.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.channel.upgrade() {
            if let Ok(mut handlers) = inner.handlers.lock() {
                if let Some(list) = handlers.get_mut(&self.kind) {
                    list.retain(|(id, _)| *id != self.id);
                }
            }
        }
    }
}

/// Connection task: connect, announce presence, pump frames both ways, and
/// retry with growing delay when the transport drops.
async fn run_connection(inner: Arc<ChannelInner>, user_id: String) {
    let tuning = inner.tuning.clone();
    let mut attempt: u32 = 0;
    loop {
        match timeout(tuning.handshake_timeout, connect_async(&inner.ws_url)).await {
            Ok(Ok((ws, _))) => {
                attempt = 0;
                let (mut sink, mut stream) = ws.split();
                let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
                *inner.outbound.lock().expect("channel lock poisoned") = Some(tx);
                inner.connected.store(true, Ordering::SeqCst);
                debug!(url = %inner.ws_url, "channel connected");

                // Announce presence and ask for the current snapshot before
                // anything else goes out.
                let join = Message::Text(ClientEvent::Join(user_id.clone()).to_frame());
                let snapshot = Message::Text(ClientEvent::GetOnlineUsers.to_frame());
                if sink.send(join).await.is_ok() && sink.send(snapshot).await.is_ok() {
                    loop {
                        tokio::select! {
                            outgoing = rx.recv() => match outgoing {
                                Some(msg) => {
                                    if sink.send(msg).await.is_err() {
                                        break;
                                    }
                                }
                                None => break,
                            },
                            incoming = stream.next() => match incoming {
                                Some(Ok(Message::Text(frame))) => dispatch(&inner, &frame),
                                Some(Ok(Message::Close(_))) | None => break,
                                Some(Ok(_)) => {}
                                Some(Err(err)) => {
                                    debug!(error = %err, "channel read error");
                                    break;
                                }
                            },
                        }
                    }
                }

                inner.connected.store(false, Ordering::SeqCst);
                inner
                    .outbound
                    .lock()
                    .expect("channel lock poisoned")
                    .take();
                debug!("channel disconnected");
            }
            Ok(Err(err)) => debug!(error = %err, "channel connect failed"),
            Err(_) => debug!("channel handshake timed out"),
        }

        attempt += 1;
        if attempt > tuning.reconnect_max {
            warn!(
                attempts = tuning.reconnect_max,
                "channel reconnect attempts exhausted"
            );
            return;
        }
        let delay = (tuning.reconnect_base * attempt).min(tuning.reconnect_cap);
        tokio::time::sleep(delay).await;
    }
}

/// Parse one inbound frame and fan it out to the registered handlers.
/// Malformed frames are dropped; a panicking handler never takes the
/// dispatch loop down with it.
fn dispatch(inner: &ChannelInner, frame: &str) {
    let Some(event) = ServerEvent::parse(frame) else {
        warn!(%frame, "dropping malformed channel frame");
        return;
    };
    let handlers = inner.handlers.lock().expect("channel lock poisoned");
    if let Some(list) = handlers.get(&event.kind()) {
        for (id, handler) in list {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                error!(handler = id, kind = ?event.kind(), "channel handler panicked");
            }
        }
    }
}
