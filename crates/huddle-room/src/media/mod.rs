//! Media Session Layer: opaque point-to-point audio sessions.
//!
//! The room core never sees offers, answers, or ICE. It asks for a local
//! stream, opens a session to a remote participant id, and answers inbound
//! sessions. Stream-level callbacks arrive as [`SessionEvent`]s on the
//! channel handed to the layer when a session is opened or answered.

mod loopback;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use loopback::{LoopbackMedia, LoopbackNetwork};

#[derive(Debug, Clone, thiserror::Error)]
pub enum MediaError {
    #[error("local media unavailable: {0}")]
    Unavailable(String),

    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("session already closed")]
    SessionClosed,
}

/// A local or remote audio stream.
pub trait MediaStream: Send + Sync + Debug {
    fn stream_id(&self) -> &str;

    /// Enable or disable outgoing audio without tearing the stream down.
    fn set_enabled(&self, enabled: bool);

    fn is_enabled(&self) -> bool;

    /// Release the underlying device. Idempotent.
    fn stop(&self);
}

/// One live point-to-point session.
pub trait MediaSession: Send + Sync + Debug {
    /// Identifier shared by both ends of the session.
    fn session_id(&self) -> &str;

    fn remote_id(&self) -> &str;

    /// Close the session. Safe to call repeatedly and from either end.
    fn close(&self);
}

/// Callbacks from a session, delivered in order per session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    RemoteStream {
        session_id: String,
        remote_id: String,
        stream: Arc<dyn MediaStream>,
    },
    Closed {
        session_id: String,
        remote_id: String,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::RemoteStream { session_id, .. } | SessionEvent::Closed { session_id, .. } => {
                session_id
            }
        }
    }

    pub fn remote_id(&self) -> &str {
        match self {
            SessionEvent::RemoteStream { remote_id, .. } | SessionEvent::Closed { remote_id, .. } => {
                remote_id
            }
        }
    }
}

/// An inbound session request that must be answered or rejected.
pub trait IncomingSession: Send + Debug {
    fn remote_id(&self) -> &str;

    fn session_id(&self) -> &str;

    /// Answer with the local stream. Session events go to `events`.
    fn answer(
        self: Box<Self>,
        local: Arc<dyn MediaStream>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Arc<dyn MediaSession>, MediaError>;

    /// Refuse the request; the caller sees the session close.
    fn reject(self: Box<Self>);
}

/// The media transport as seen by the room core.
#[async_trait]
pub trait MediaSessionLayer: Send + Sync {
    /// Participant id assigned to this client by the media layer.
    fn local_id(&self) -> &str;

    /// Acquire the microphone. Fails with [`MediaError::Unavailable`].
    async fn create_local_stream(&self) -> Result<Arc<dyn MediaStream>, MediaError>;

    async fn open_session(
        &self,
        remote_id: &str,
        local: Arc<dyn MediaStream>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Arc<dyn MediaSession>, MediaError>;

    /// Take the inbound-session channel. Only the first call gets it.
    async fn take_incoming(&self) -> Option<mpsc::Receiver<Box<dyn IncomingSession>>>;

    /// Stop accepting sessions and close every open one.
    async fn shutdown(&self);
}
