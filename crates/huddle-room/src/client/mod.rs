//! Room client: one participant's live session in one room.
//!
//! [`RoomClient::join`] acquires the microphone, registers presence, and
//! spawns a driver task that keeps the peer mesh in line with membership,
//! closes expired votes, and notices when the local participant has been
//! removed. Everything the driver observes is reported as a [`RoomEvent`].

mod driver;
mod types;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::RoomError;
use crate::media::{MediaSessionLayer, MediaStream};
use crate::membership::{MemberSnapshot, MembershipManager};
use crate::mesh::PeerMesh;
use crate::settings::RoomSettings;
use crate::store::SharedStore;
use crate::vote::{CloseOutcome, PendingVote, VoteCoordinator, VoteState};

use driver::{Driver, DriverState};
use types::{ClientState, Command};

pub use types::RoomEvent;

/// Handle to a joined room. Dropping it leaves the room.
pub struct RoomClient {
    room_key: String,
    participant_id: String,
    display_name: String,
    membership: Arc<MembershipManager>,
    votes: Arc<VoteCoordinator>,
    local_stream: Arc<dyn MediaStream>,
    shared: Arc<RwLock<ClientState>>,
    cmd_tx: mpsc::Sender<Command>,
}

impl RoomClient {
    /// Join `room_key` as `display_name`.
    ///
    /// Fails with `MediaUnavailable` before touching the store if the
    /// microphone cannot be acquired, and with `CapacityExceeded` if the
    /// room is full.
    pub async fn join(
        settings: RoomSettings,
        store: Arc<dyn SharedStore>,
        media: Arc<dyn MediaSessionLayer>,
        clock: Arc<dyn Clock>,
        room_key: &str,
        display_name: &str,
    ) -> Result<(Self, mpsc::Receiver<RoomEvent>), RoomError> {
        let local_stream = media.create_local_stream().await.map_err(|e| {
            warn!(room = room_key, error = %e, "cannot acquire microphone");
            RoomError::from(e)
        })?;

        let participant_id = media.local_id().to_string();
        let membership = Arc::new(MembershipManager::new(
            Arc::clone(&store),
            &participant_id,
            settings.clone(),
        ));
        let votes = Arc::new(VoteCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            settings.clone(),
        ));

        if let Err(e) = membership.join(room_key, display_name).await {
            local_stream.stop();
            return Err(e);
        }
        let watch = match membership.subscribe(room_key).await {
            Ok(watch) => watch,
            Err(e) => {
                let _ = membership.leave(room_key, &participant_id).await;
                local_stream.stop();
                return Err(e);
            }
        };
        let initial = watch.current()?;
        let incoming_rx = media.take_incoming().await;
        if incoming_rx.is_none() {
            warn!(participant = %participant_id, "inbound sessions already claimed");
        }

        let (event_tx, event_rx) = mpsc::channel(256);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let shared = Arc::new(RwLock::new(ClientState {
            room: initial.clone(),
            peers: Vec::new(),
            active: true,
        }));
        let (mesh, session_rx) = PeerMesh::new(Arc::clone(&media));

        let driver = Driver {
            room_key: room_key.to_string(),
            local_id: participant_id.clone(),
            membership: Arc::clone(&membership),
            votes: Arc::clone(&votes),
            media,
            clock,
            local_stream: Arc::clone(&local_stream),
            mesh,
            session_rx,
            incoming_rx,
            watch,
            cmd_rx,
            event_tx,
            shared: Arc::clone(&shared),
            reconcile_interval: Duration::from_millis(settings.reconcile_interval_ms.max(1)),
            state: DriverState::default(),
        };
        tokio::spawn(driver.run(initial));

        info!(room = room_key, participant = %participant_id, "room client started");
        let client = Self {
            room_key: room_key.to_string(),
            participant_id,
            display_name: display_name.to_string(),
            membership,
            votes,
            local_stream,
            shared,
            cmd_tx,
        };
        Ok((client, event_rx))
    }

    pub fn room_key(&self) -> &str {
        &self.room_key
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Whether the driver is still running.
    pub async fn is_active(&self) -> bool {
        self.shared.read().await.active
    }

    /// Members as of the latest snapshot.
    pub async fn members(&self) -> MemberSnapshot {
        MemberSnapshot::from(&self.shared.read().await.room)
    }

    /// Peers with a live session, sorted.
    pub async fn connected_peers(&self) -> Vec<String> {
        self.shared.read().await.peers.clone()
    }

    pub async fn vote_state(&self) -> VoteState {
        VoteState::from_room(&self.shared.read().await.room)
    }

    /// Mute or unmute. The store record is updated first; the local
    /// stream follows only if that succeeds.
    pub async fn set_muted(&self, muted: bool) -> Result<(), RoomError> {
        self.membership
            .set_own_muted(&self.room_key, &self.participant_id, muted)
            .await?;
        self.local_stream.set_enabled(!muted);
        Ok(())
    }

    pub async fn start_vote(&self) -> Result<PendingVote, RoomError> {
        self.votes
            .start_vote(&self.room_key, &self.participant_id)
            .await
    }

    pub async fn cast_vote(&self, target_id: &str) -> Result<(), RoomError> {
        self.votes
            .cast_vote(&self.room_key, &self.participant_id, target_id)
            .await
    }

    /// Try to close the pending vote now. The driver does this on its own
    /// once the vote expires.
    pub async fn close_vote(&self) -> Result<CloseOutcome, RoomError> {
        self.votes.close_vote(&self.room_key).await
    }

    /// Leave the room, close every session, and release the microphone.
    /// Leaving twice, or after being ejected, is a no-op.
    pub async fn leave(&self) -> Result<(), RoomError> {
        let (ack, done) = oneshot::channel();
        if self.cmd_tx.send(Command::Leave { ack }).await.is_err() {
            return Ok(());
        }
        done.await.unwrap_or(Ok(()))
    }
}
