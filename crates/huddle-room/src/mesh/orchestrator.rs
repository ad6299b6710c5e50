//! Connection table and the reconcile loop body.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::media::{IncomingSession, MediaSessionLayer, MediaStream, SessionEvent};
use crate::membership::MemberSnapshot;

use super::types::{AcceptOutcome, Connection, Direction, MeshChanges};

/// Local connection table for one participant.
pub struct PeerMesh {
    local_id: String,
    media: Arc<dyn MediaSessionLayer>,
    connections: HashMap<String, Connection>,
    /// Present members whose last dial failed.
    unreachable: HashSet<String>,
    events_tx: mpsc::Sender<SessionEvent>,
}

impl PeerMesh {
    /// Create an empty mesh. Session callbacks for every connection arrive
    /// on the returned receiver and must be fed back via [`handle_event`].
    ///
    /// [`handle_event`]: PeerMesh::handle_event
    pub fn new(media: Arc<dyn MediaSessionLayer>) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::channel(256);
        let mesh = Self {
            local_id: media.local_id().to_string(),
            media,
            connections: HashMap::new(),
            unreachable: HashSet::new(),
            events_tx,
        };
        (mesh, events_rx)
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Whether this side is the one that dials `remote_id`.
    pub fn dials(&self, remote_id: &str) -> bool {
        self.local_id.as_str() < remote_id
    }

    pub fn connection(&self, remote_id: &str) -> Option<&Connection> {
        self.connections.get(remote_id)
    }

    /// Connected peer ids, sorted.
    pub fn peer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether the last dial to `remote_id` failed.
    pub fn is_unreachable(&self, remote_id: &str) -> bool {
        self.unreachable.contains(remote_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Bring the connection table in line with `members`.
    ///
    /// Confirmed connections to absent members are closed, then every
    /// present member this side is responsible for dialing gets a session.
    pub async fn reconcile(
        &mut self,
        members: &MemberSnapshot,
        local: &Arc<dyn MediaStream>,
    ) -> MeshChanges {
        let mut changes = MeshChanges::default();

        let gone: Vec<String> = self
            .connections
            .values()
            .filter(|c| c.confirmed && !members.contains(&c.remote_id))
            .map(|c| c.remote_id.clone())
            .collect();
        for remote_id in gone {
            if self.close_peer(&remote_id) {
                changes.closed.push(remote_id);
            }
        }

        for conn in self.connections.values_mut() {
            if members.contains(&conn.remote_id) {
                conn.confirmed = true;
            }
        }
        self.unreachable.retain(|id| members.contains(id));

        for remote_id in members.ids() {
            if remote_id == self.local_id
                || self.connections.contains_key(remote_id)
                || !self.dials(remote_id)
            {
                continue;
            }
            match self
                .media
                .open_session(remote_id, Arc::clone(local), self.events_tx.clone())
                .await
            {
                Ok(session) => {
                    self.unreachable.remove(remote_id);
                    info!(participant = %self.local_id, peer = remote_id, "dialed peer");
                    self.connections.insert(
                        remote_id.to_string(),
                        Connection {
                            remote_id: remote_id.to_string(),
                            session,
                            direction: Direction::Outbound,
                            remote_stream: None,
                            confirmed: true,
                        },
                    );
                    changes.opened.push(remote_id.to_string());
                }
                Err(e) => {
                    if self.unreachable.insert(remote_id.to_string()) {
                        warn!(participant = %self.local_id, peer = remote_id, error = %e, "dial failed");
                    } else {
                        debug!(participant = %self.local_id, peer = remote_id, error = %e, "dial failed again");
                    }
                    changes.failed.push((remote_id.to_string(), e));
                }
            }
        }

        changes
    }

    /// Answer an inbound request, keeping at most one session per peer.
    ///
    /// A request from a peer we already dialed is rejected. A request that
    /// repeats an existing inbound session replaces it, since the dialer
    /// only redials after giving up on its previous session.
    pub fn accept_incoming(
        &mut self,
        incoming: Box<dyn IncomingSession>,
        local: &Arc<dyn MediaStream>,
    ) -> AcceptOutcome {
        let remote_id = incoming.remote_id().to_string();

        let replacing = match self.connections.get(&remote_id).map(|c| c.direction) {
            Some(Direction::Outbound) => {
                debug!(participant = %self.local_id, peer = %remote_id, "duplicate inbound session rejected");
                incoming.reject();
                return AcceptOutcome::Duplicate;
            }
            Some(Direction::Inbound) => {
                self.close_peer(&remote_id);
                true
            }
            None => false,
        };

        match incoming.answer(Arc::clone(local), self.events_tx.clone()) {
            Ok(session) => {
                info!(participant = %self.local_id, peer = %remote_id, "accepted peer");
                self.connections.insert(
                    remote_id.clone(),
                    Connection {
                        remote_id,
                        session,
                        direction: Direction::Inbound,
                        remote_stream: None,
                        confirmed: false,
                    },
                );
                if replacing {
                    AcceptOutcome::Replaced
                } else {
                    AcceptOutcome::Accepted
                }
            }
            Err(e) => {
                warn!(participant = %self.local_id, peer = %remote_id, error = %e, "answer failed");
                AcceptOutcome::Failed(e)
            }
        }
    }

    /// Apply a session callback. Returns `false` for callbacks from
    /// sessions that are no longer in the table.
    pub fn handle_event(&mut self, event: &SessionEvent) -> bool {
        let remote_id = event.remote_id();
        let current = self
            .connections
            .get(remote_id)
            .is_some_and(|c| c.session.session_id() == event.session_id());
        if !current {
            return false;
        }

        match event {
            SessionEvent::RemoteStream { stream, .. } => {
                if let Some(conn) = self.connections.get_mut(remote_id) {
                    conn.remote_stream = Some(Arc::clone(stream));
                }
                debug!(participant = %self.local_id, peer = remote_id, "remote stream attached");
            }
            SessionEvent::Closed { .. } => {
                self.connections.remove(remote_id);
                info!(participant = %self.local_id, peer = remote_id, "peer session closed remotely");
            }
        }
        true
    }

    /// Close and forget the session to `remote_id`. Idempotent.
    pub fn close_peer(&mut self, remote_id: &str) -> bool {
        match self.connections.remove(remote_id) {
            Some(conn) => {
                conn.session.close();
                info!(participant = %self.local_id, peer = remote_id, "closed peer session");
                true
            }
            None => false,
        }
    }

    /// Close every session. Returns the ids that were connected.
    pub fn close_all(&mut self) -> Vec<String> {
        let ids = self.peer_ids();
        for id in &ids {
            self.close_peer(id);
        }
        ids
    }
}
