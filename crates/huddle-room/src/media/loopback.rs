//! In-process media layer: every endpoint lives in one [`LoopbackNetwork`]
//! and sessions are pairs of channel ends instead of RTP flows.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use huddle_common::new_id;
use tokio::sync::mpsc;
use tracing::debug;

use super::{
    IncomingSession, MediaError, MediaSession, MediaSessionLayer, MediaStream, SessionEvent,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct LoopbackStream {
    id: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl MediaStream for LoopbackStream {
    fn stream_id(&self) -> &str {
        &self.id
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Link (both ends of one session)
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Link {
    session_id: String,
    caller_id: String,
    callee_id: String,
    closed: AtomicBool,
    caller_events: mpsc::Sender<SessionEvent>,
    callee_events: Mutex<Option<mpsc::Sender<SessionEvent>>>,
}

impl Link {
    fn involves(&self, id: &str) -> bool {
        self.caller_id == id || self.callee_id == id
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.caller_events.try_send(SessionEvent::Closed {
            session_id: self.session_id.clone(),
            remote_id: self.callee_id.clone(),
        });
        if let Some(tx) = lock(&self.callee_events).as_ref() {
            let _ = tx.try_send(SessionEvent::Closed {
                session_id: self.session_id.clone(),
                remote_id: self.caller_id.clone(),
            });
        }
        debug!(session = %self.session_id, "loopback session closed");
    }
}

#[derive(Debug)]
struct LoopbackSession {
    link: Arc<Link>,
    remote_id: String,
}

impl MediaSession for LoopbackSession {
    fn session_id(&self) -> &str {
        &self.link.session_id
    }

    fn remote_id(&self) -> &str {
        &self.remote_id
    }

    fn close(&self) {
        self.link.close();
    }
}

#[derive(Debug)]
struct LoopbackIncoming {
    link: Arc<Link>,
    caller_stream: Arc<dyn MediaStream>,
}

impl IncomingSession for LoopbackIncoming {
    fn remote_id(&self) -> &str {
        &self.link.caller_id
    }

    fn session_id(&self) -> &str {
        &self.link.session_id
    }

    fn answer(
        self: Box<Self>,
        local: Arc<dyn MediaStream>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Arc<dyn MediaSession>, MediaError> {
        let link = self.link;
        if link.closed.load(Ordering::SeqCst) {
            return Err(MediaError::SessionClosed);
        }
        *lock(&link.callee_events) = Some(events.clone());

        let _ = link.caller_events.try_send(SessionEvent::RemoteStream {
            session_id: link.session_id.clone(),
            remote_id: link.callee_id.clone(),
            stream: local,
        });
        let _ = events.try_send(SessionEvent::RemoteStream {
            session_id: link.session_id.clone(),
            remote_id: link.caller_id.clone(),
            stream: self.caller_stream,
        });

        let remote_id = link.caller_id.clone();
        Ok(Arc::new(LoopbackSession { link, remote_id }))
    }

    fn reject(self: Box<Self>) {
        self.link.close();
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

struct Endpoint {
    incoming: mpsc::Sender<Box<dyn IncomingSession>>,
    microphone: bool,
}

#[derive(Default)]
struct NetworkState {
    endpoints: HashMap<String, Endpoint>,
    links: Vec<Weak<Link>>,
}

/// Shared switchboard for loopback endpoints. Clones share state.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint with a freshly assigned participant id.
    pub fn endpoint(&self) -> LoopbackMedia {
        self.endpoint_with_id(&new_id())
    }

    /// Register an endpoint with a chosen participant id.
    pub fn endpoint_with_id(&self, id: &str) -> LoopbackMedia {
        let (tx, rx) = mpsc::channel(64);
        lock(&self.state).endpoints.insert(
            id.to_string(),
            Endpoint {
                incoming: tx,
                microphone: true,
            },
        );
        LoopbackMedia {
            id: id.to_string(),
            network: self.clone(),
            incoming: tokio::sync::Mutex::new(Some(rx)),
            local_stream: Mutex::new(None),
        }
    }

    /// Make `create_local_stream` fail for `id`.
    pub fn deny_microphone(&self, id: &str) {
        if let Some(endpoint) = lock(&self.state).endpoints.get_mut(id) {
            endpoint.microphone = false;
        }
    }

    /// Remove an endpoint and close every session it is part of.
    pub fn drop_endpoint(&self, id: &str) {
        let doomed: Vec<Arc<Link>> = {
            let mut state = lock(&self.state);
            state.endpoints.remove(id);
            state.links.retain(|weak| weak.strong_count() > 0);
            state
                .links
                .iter()
                .filter_map(Weak::upgrade)
                .filter(|link| link.involves(id))
                .collect()
        };
        for link in doomed {
            link.close();
        }
    }

    /// Number of sessions that are currently open.
    pub fn open_sessions(&self) -> usize {
        lock(&self.state)
            .links
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|link| !link.closed.load(Ordering::SeqCst))
            .count()
    }
}

/// One participant's view of a [`LoopbackNetwork`].
pub struct LoopbackMedia {
    id: String,
    network: LoopbackNetwork,
    incoming: tokio::sync::Mutex<Option<mpsc::Receiver<Box<dyn IncomingSession>>>>,
    local_stream: Mutex<Option<Arc<LoopbackStream>>>,
}

impl LoopbackMedia {
    /// Whether the last acquired local stream has been released.
    pub fn local_stream_released(&self) -> bool {
        lock(&self.local_stream)
            .as_ref()
            .map_or(true, |stream| stream.stopped.load(Ordering::SeqCst))
    }

    /// Whether the local stream is currently sending audio.
    pub fn local_stream_enabled(&self) -> bool {
        lock(&self.local_stream)
            .as_ref()
            .is_some_and(|stream| stream.is_enabled())
    }
}

#[async_trait]
impl MediaSessionLayer for LoopbackMedia {
    fn local_id(&self) -> &str {
        &self.id
    }

    async fn create_local_stream(&self) -> Result<Arc<dyn MediaStream>, MediaError> {
        let microphone = lock(&self.network.state)
            .endpoints
            .get(&self.id)
            .is_some_and(|endpoint| endpoint.microphone);
        if !microphone {
            return Err(MediaError::Unavailable(format!(
                "no audio input for {}",
                self.id
            )));
        }
        let stream = Arc::new(LoopbackStream {
            id: new_id(),
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        });
        *lock(&self.local_stream) = Some(Arc::clone(&stream));
        Ok(stream)
    }

    async fn open_session(
        &self,
        remote_id: &str,
        local: Arc<dyn MediaStream>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Arc<dyn MediaSession>, MediaError> {
        let link = {
            let mut state = lock(&self.network.state);
            if !state.endpoints.contains_key(&self.id) {
                return Err(MediaError::SessionClosed);
            }
            let endpoint = state
                .endpoints
                .get(remote_id)
                .ok_or_else(|| MediaError::PeerUnreachable(remote_id.to_string()))?;

            let link = Arc::new(Link {
                session_id: new_id(),
                caller_id: self.id.clone(),
                callee_id: remote_id.to_string(),
                closed: AtomicBool::new(false),
                caller_events: events,
                callee_events: Mutex::new(None),
            });
            endpoint
                .incoming
                .try_send(Box::new(LoopbackIncoming {
                    link: Arc::clone(&link),
                    caller_stream: local,
                }))
                .map_err(|_| MediaError::PeerUnreachable(remote_id.to_string()))?;
            state.links.push(Arc::downgrade(&link));
            link
        };

        debug!(from = %self.id, to = remote_id, session = %link.session_id, "loopback dial");
        Ok(Arc::new(LoopbackSession {
            link,
            remote_id: remote_id.to_string(),
        }))
    }

    async fn take_incoming(&self) -> Option<mpsc::Receiver<Box<dyn IncomingSession>>> {
        self.incoming.lock().await.take()
    }

    async fn shutdown(&self) {
        self.network.drop_endpoint(&self.id);
    }
}
