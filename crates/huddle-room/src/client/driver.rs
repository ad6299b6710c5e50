//! Background task behind a `RoomClient`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::media::{IncomingSession, MediaSessionLayer, MediaStream, SessionEvent};
use crate::membership::{MemberSnapshot, MembershipManager, RoomWatch};
use crate::mesh::{AcceptOutcome, Direction, PeerMesh};
use crate::protocol::RoomRecord;
use crate::reconciler::PresenceStatus;
use crate::vote::{CloseOutcome, VoteCoordinator, VoteState};

use super::types::{ClientState, Command, RoomEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub(super) struct Driver {
    pub room_key: String,
    pub local_id: String,
    pub membership: Arc<MembershipManager>,
    pub votes: Arc<VoteCoordinator>,
    pub media: Arc<dyn MediaSessionLayer>,
    pub clock: Arc<dyn Clock>,
    pub local_stream: Arc<dyn MediaStream>,
    pub mesh: PeerMesh,
    pub session_rx: mpsc::Receiver<SessionEvent>,
    pub incoming_rx: Option<mpsc::Receiver<Box<dyn IncomingSession>>>,
    pub watch: RoomWatch,
    pub cmd_rx: mpsc::Receiver<Command>,
    pub event_tx: mpsc::Sender<RoomEvent>,
    pub shared: Arc<RwLock<ClientState>>,
    pub reconcile_interval: Duration,
    pub state: DriverState,
}

/// Bookkeeping carried between snapshots.
#[derive(Debug, Default)]
pub(super) struct DriverState {
    seen_self: bool,
    members: MemberSnapshot,
    /// `(initiator, end_time)` of the vote last reported.
    tracked_vote: Option<(String, i64)>,
    /// End time of the vote this client will try to close.
    vote_end: Option<i64>,
    close_at: Option<Instant>,
    outcome_primed: bool,
    last_outcome_at: Option<i64>,
}

async fn recv_incoming(
    rx: &mut Option<mpsc::Receiver<Box<dyn IncomingSession>>>,
) -> Option<Box<dyn IncomingSession>> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl Driver {
    pub(super) async fn run(mut self, initial: RoomRecord) {
        if self.handle_snapshot(initial).await == Flow::Stop {
            return;
        }

        let mut tick = tokio::time::interval(self.reconcile_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let flow = tokio::select! {
                changed = self.watch.changed() => match changed {
                    Some(Ok(room)) => self.handle_snapshot(room).await,
                    Some(Err(e)) => {
                        warn!(room = %self.room_key, error = %e, "unreadable room snapshot");
                        self.emit(RoomEvent::Error(e.to_string())).await;
                        Flow::Continue
                    }
                    None => {
                        warn!(room = %self.room_key, "room subscription ended");
                        self.teardown(false).await;
                        Flow::Stop
                    }
                },
                Some(incoming) = recv_incoming(&mut self.incoming_rx) => {
                    self.handle_incoming(incoming).await;
                    Flow::Continue
                }
                Some(event) = self.session_rx.recv() => {
                    self.handle_session_event(event).await;
                    Flow::Continue
                }
                _ = sleep_until(self.state.close_at) => {
                    self.maybe_close_vote().await;
                    Flow::Continue
                }
                _ = tick.tick() => {
                    self.on_tick().await;
                    Flow::Continue
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Leave { ack }) => {
                            let result = self.teardown(true).await;
                            let _ = ack.send(result);
                        }
                        // Handle dropped.
                        None => {
                            let _ = self.teardown(true).await;
                        }
                    }
                    Flow::Stop
                }
            };
            if flow == Flow::Stop {
                break;
            }
        }
        debug!(room = %self.room_key, participant = %self.local_id, "room driver stopped");
    }

    async fn emit(&self, event: RoomEvent) {
        let _ = self.event_tx.send(event).await;
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    async fn handle_snapshot(&mut self, room: RoomRecord) -> Flow {
        let status = PresenceStatus::observe(&self.local_id, &room, self.state.seen_self);
        self.shared.write().await.room = room.clone();

        match status {
            PresenceStatus::Joining => {
                debug!(room = %self.room_key, "snapshot predates our join");
                return Flow::Continue;
            }
            PresenceStatus::Ejected { outcome } => {
                info!(room = %self.room_key, participant = %self.local_id, "removed from room");
                if let Err(e) = self.teardown(true).await {
                    debug!(error = %e, "leave after removal failed");
                }
                self.emit(RoomEvent::Ejected { outcome }).await;
                return Flow::Stop;
            }
            PresenceStatus::Present => self.state.seen_self = true,
        }

        let members = MemberSnapshot::from(&room);
        if members != self.state.members {
            debug!(room = %self.room_key, members = members.len(), "membership changed");
            self.state.members = members.clone();
            self.emit(RoomEvent::MembersChanged(members)).await;
        }

        self.track_vote(&room).await;
        self.track_outcome(&room).await;
        self.reconcile().await;
        Flow::Continue
    }

    async fn track_vote(&mut self, room: &RoomRecord) {
        if room.has_orphaned_vote() {
            // Close right away so the leftover record is cleared.
            self.state.tracked_vote = None;
            self.arm_deadline(i64::MIN);
            return;
        }
        match VoteState::from_room(room) {
            VoteState::Pending(vote) => {
                let key = (vote.initiator_id.clone(), vote.end_time);
                if self.state.tracked_vote.as_ref() != Some(&key) {
                    self.state.tracked_vote = Some(key);
                    self.arm_deadline(vote.end_time);
                    self.emit(RoomEvent::VoteStarted(vote)).await;
                }
            }
            VoteState::NoVote => {
                self.state.tracked_vote = None;
                self.state.vote_end = None;
                self.state.close_at = None;
            }
        }
    }

    async fn track_outcome(&mut self, room: &RoomRecord) {
        let primed = std::mem::replace(&mut self.state.outcome_primed, true);
        let Some(outcome) = &room.last_outcome else {
            return;
        };
        if self.state.last_outcome_at == Some(outcome.closed_at) {
            return;
        }
        self.state.last_outcome_at = Some(outcome.closed_at);
        // An outcome already present when we joined is not news.
        if primed {
            self.emit(RoomEvent::VoteConcluded(outcome.clone())).await;
        }
    }

    // -----------------------------------------------------------------------
    // Mesh
    // -----------------------------------------------------------------------

    async fn reconcile(&mut self) {
        let changes = self
            .mesh
            .reconcile(&self.state.members, &self.local_stream)
            .await;
        for peer_id in changes.opened {
            self.emit(RoomEvent::PeerConnected {
                peer_id,
                direction: Direction::Outbound,
            })
            .await;
        }
        for peer_id in changes.closed {
            self.emit(RoomEvent::PeerDisconnected { peer_id }).await;
        }
        self.publish_peers().await;
    }

    async fn handle_incoming(&mut self, incoming: Box<dyn IncomingSession>) {
        let peer_id = incoming.remote_id().to_string();
        match self.mesh.accept_incoming(incoming, &self.local_stream) {
            AcceptOutcome::Accepted | AcceptOutcome::Replaced => {
                self.emit(RoomEvent::PeerConnected {
                    peer_id,
                    direction: Direction::Inbound,
                })
                .await;
                self.publish_peers().await;
            }
            AcceptOutcome::Duplicate => {}
            AcceptOutcome::Failed(e) => {
                self.emit(RoomEvent::Error(format!("answering {peer_id}: {e}")))
                    .await;
            }
        }
    }

    async fn handle_session_event(&mut self, event: SessionEvent) {
        if !self.mesh.handle_event(&event) {
            return;
        }
        match event {
            SessionEvent::RemoteStream {
                remote_id, stream, ..
            } => {
                self.emit(RoomEvent::PeerStream {
                    peer_id: remote_id,
                    stream,
                })
                .await;
            }
            SessionEvent::Closed { remote_id, .. } => {
                self.emit(RoomEvent::PeerDisconnected { peer_id: remote_id })
                    .await;
                self.publish_peers().await;
            }
        }
    }

    async fn publish_peers(&self) {
        self.shared.write().await.peers = self.mesh.peer_ids();
    }

    async fn on_tick(&mut self) {
        if !self.state.seen_self {
            return;
        }
        self.reconcile().await;
        if self
            .state
            .vote_end
            .is_some_and(|end| self.clock.now_ms() > end)
        {
            self.maybe_close_vote().await;
        }
    }

    // -----------------------------------------------------------------------
    // Vote timer
    // -----------------------------------------------------------------------

    fn arm_deadline(&mut self, end_time: i64) {
        let wait = end_time
            .saturating_sub(self.clock.now_ms())
            .saturating_add(1)
            .max(0) as u64;
        self.state.vote_end = Some(end_time);
        self.state.close_at = Some(Instant::now() + Duration::from_millis(wait));
    }

    async fn maybe_close_vote(&mut self) {
        let Some(end_time) = self.state.vote_end else {
            self.state.close_at = None;
            return;
        };
        if self.clock.now_ms() <= end_time {
            self.arm_deadline(end_time);
            return;
        }

        match self.votes.close_vote(&self.room_key).await {
            Ok(CloseOutcome::NotDue { end_time }) => self.arm_deadline(end_time),
            Ok(outcome) => {
                debug!(room = %self.room_key, ?outcome, "vote close attempted");
                self.state.vote_end = None;
                self.state.close_at = None;
            }
            Err(e) => {
                warn!(room = %self.room_key, error = %e, "closing vote failed, will retry");
                self.state.close_at = Some(Instant::now() + self.reconcile_interval);
                self.emit(RoomEvent::Error(e.to_string())).await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    async fn teardown(&mut self, leave: bool) -> Result<(), crate::error::RoomError> {
        for peer_id in self.mesh.close_all() {
            self.emit(RoomEvent::PeerDisconnected { peer_id }).await;
        }
        let result = if leave {
            self.membership.leave(&self.room_key, &self.local_id).await
        } else {
            Ok(())
        };
        self.local_stream.stop();
        self.media.shutdown().await;
        self.state.close_at = None;
        self.state.vote_end = None;

        let mut shared = self.shared.write().await;
        shared.active = false;
        shared.peers.clear();
        drop(shared);

        info!(room = %self.room_key, participant = %self.local_id, "left room, media released");
        result
    }
}
