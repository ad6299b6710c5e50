//! Multi-participant scenarios over the in-memory store and loopback media.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::*;
use crate::clock::ManualClock;
use crate::media::{LoopbackMedia, LoopbackNetwork};
use crate::protocol::paths;
use crate::store::{MemoryConnection, MemoryStore};

const ROOM: &str = "lobby";
const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    store: MemoryStore,
    net: LoopbackNetwork,
    clock: ManualClock,
    settings: RoomSettings,
}

struct Participant {
    client: RoomClient,
    events: mpsc::Receiver<RoomEvent>,
    media: Arc<LoopbackMedia>,
    conn: MemoryConnection,
}

impl Harness {
    fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            net: LoopbackNetwork::new(),
            clock: ManualClock::new(1_000_000),
            settings: RoomSettings {
                reconcile_interval_ms: 20,
                ..RoomSettings::default()
            },
        }
    }

    async fn try_join(&self, id: &str) -> Result<Participant, RoomError> {
        let conn = self.store.connect().await;
        let media = Arc::new(self.net.endpoint_with_id(id));
        let (client, events) = RoomClient::join(
            self.settings.clone(),
            Arc::new(conn.clone()),
            media.clone(),
            Arc::new(self.clock.clone()),
            ROOM,
            &format!("user-{id}"),
        )
        .await?;
        Ok(Participant {
            client,
            events,
            media,
            conn,
        })
    }

    async fn join(&self, id: &str) -> Participant {
        self.try_join(id).await.unwrap()
    }
}

async fn next_matching(
    rx: &mut mpsc::Receiver<RoomEvent>,
    mut pred: impl FnMut(&RoomEvent) -> bool,
) -> RoomEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn peers_become(p: &Participant, expected: &[&str]) {
    let expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
    tokio::time::timeout(WAIT, async {
        while p.client.connected_peers().await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{} never reached peers {expected:?}", p.client.participant_id()));
}

#[tokio::test]
async fn full_mesh_forms() {
    let h = Harness::new();
    let a = h.join("a").await;
    let b = h.join("b").await;
    let c = h.join("c").await;

    peers_become(&a, &["b", "c"]).await;
    peers_become(&b, &["a", "c"]).await;
    peers_become(&c, &["a", "b"]).await;
    assert_eq!(h.net.open_sessions(), 3);
    assert_eq!(a.client.members().await.len(), 3);
}

#[tokio::test]
async fn remote_streams_are_reported() {
    let h = Harness::new();
    let mut a = h.join("a").await;
    let _b = h.join("b").await;

    let event = next_matching(&mut a.events, |e| matches!(e, RoomEvent::PeerStream { .. })).await;
    match event {
        RoomEvent::PeerStream { peer_id, stream } => {
            assert_eq!(peer_id, "b");
            assert!(stream.is_enabled());
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn missing_microphone_fails_join() {
    let h = Harness::new();
    let conn = h.store.connect().await;
    let media = Arc::new(h.net.endpoint_with_id("a"));
    h.net.deny_microphone("a");

    let err = RoomClient::join(
        h.settings.clone(),
        Arc::new(conn.clone()),
        media,
        Arc::new(h.clock.clone()),
        ROOM,
        "ana",
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, RoomError::MediaUnavailable(_)));
    assert!(!err.is_recoverable());
    assert_eq!(conn.read(&paths::room(ROOM)).await.unwrap(), None);
}

#[tokio::test]
async fn sixth_member_is_turned_away() {
    let h = Harness::new();
    let mut present = Vec::new();
    for id in ["a", "b", "c", "d", "e"] {
        present.push(h.join(id).await);
    }
    let err = h.try_join("f").await.err().unwrap();
    assert!(matches!(err, RoomError::CapacityExceeded { max: 5 }));
    assert!(err.is_recoverable());
    assert_eq!(present[0].client.members().await.len(), 5);
}

#[tokio::test]
async fn leaving_tears_down_sessions() {
    let h = Harness::new();
    let mut a = h.join("a").await;
    let b = h.join("b").await;
    peers_become(&a, &["b"]).await;

    b.client.leave().await.unwrap();
    b.client.leave().await.unwrap();
    assert!(b.media.local_stream_released());
    assert!(!b.client.is_active().await);

    next_matching(&mut a.events, |e| {
        matches!(e, RoomEvent::PeerDisconnected { peer_id } if peer_id == "b")
    })
    .await;
    peers_become(&a, &[]).await;
    assert!(!a.client.members().await.contains("b"));
}

#[tokio::test]
async fn abrupt_disconnect_is_noticed() {
    let h = Harness::new();
    let mut a = h.join("a").await;
    let b = h.join("b").await;
    let _c = h.join("c").await;
    peers_become(&a, &["b", "c"]).await;

    b.conn.disconnect().await;

    next_matching(&mut a.events, |e| {
        matches!(e, RoomEvent::MembersChanged(m) if m.contains("c") && !m.contains("b"))
    })
    .await;
    peers_become(&a, &["c"]).await;
}

#[tokio::test]
async fn mute_updates_record_and_stream() {
    let h = Harness::new();
    let a = h.join("a").await;
    assert!(a.media.local_stream_enabled());

    a.client.set_muted(true).await.unwrap();
    assert!(!a.media.local_stream_enabled());
    let muted = a
        .conn
        .read(&format!("{}/muted", paths::member(ROOM, "a")))
        .await
        .unwrap();
    assert_eq!(muted, Some(serde_json::json!(true)));

    a.client.set_muted(false).await.unwrap();
    assert!(a.media.local_stream_enabled());
}

#[tokio::test]
async fn expired_vote_ejects_target_everywhere() {
    let h = Harness::new();
    let mut a = h.join("a").await;
    let mut b = h.join("b").await;
    let c = h.join("c").await;
    peers_become(&a, &["b", "c"]).await;

    a.client.start_vote().await.unwrap();
    next_matching(&mut b.events, |e| matches!(e, RoomEvent::VoteStarted(_))).await;
    a.client.cast_vote("b").await.unwrap();
    c.client.cast_vote("b").await.unwrap();
    assert!(matches!(
        b.client.cast_vote("b").await,
        Err(RoomError::InvalidTarget(_))
    ));

    h.clock.advance(h.settings.vote_duration_ms + 1);

    let ejected = next_matching(&mut b.events, |e| matches!(e, RoomEvent::Ejected { .. })).await;
    match ejected {
        RoomEvent::Ejected { outcome: Some(o) } => {
            assert!(o.ejected);
            assert_eq!(o.target_id.as_deref(), Some("b"));
            assert_eq!(o.votes, 2);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(b.media.local_stream_released());

    let concluded =
        next_matching(&mut a.events, |e| matches!(e, RoomEvent::VoteConcluded(_))).await;
    assert!(matches!(concluded, RoomEvent::VoteConcluded(o) if o.ejected));
    peers_become(&a, &["c"]).await;
    peers_become(&c, &["a"]).await;

    // Leaving after being ejected is a no-op.
    b.client.leave().await.unwrap();
}

#[tokio::test]
async fn failed_vote_keeps_everyone() {
    let h = Harness::new();
    let mut a = h.join("a").await;
    let _b = h.join("b").await;
    let c = h.join("c").await;

    a.client.start_vote().await.unwrap();
    c.client.cast_vote("b").await.unwrap();
    h.clock.advance(h.settings.vote_duration_ms + 1);

    let concluded =
        next_matching(&mut a.events, |e| matches!(e, RoomEvent::VoteConcluded(_))).await;
    match concluded {
        RoomEvent::VoteConcluded(o) => {
            assert!(!o.ejected);
            assert_eq!(o.votes, 1);
            assert_eq!(o.member_count, 3);
        }
        _ => unreachable!(),
    }
    assert_eq!(a.client.members().await.len(), 3);
    assert_eq!(a.client.vote_state().await, VoteState::NoVote);

    let err = c.client.start_vote().await.unwrap_err();
    assert!(matches!(err, RoomError::Cooldown { .. }));
}

#[tokio::test]
async fn dropping_the_handle_leaves() {
    let h = Harness::new();
    let a = h.join("a").await;
    let b = h.join("b").await;
    peers_become(&a, &["b"]).await;

    let media = Arc::clone(&b.media);
    drop(b);

    tokio::time::timeout(WAIT, async {
        while a.client.members().await.contains("b") {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(media.local_stream_released());
}
