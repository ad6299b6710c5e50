use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::*;
use crate::media::{
    IncomingSession, LoopbackMedia, LoopbackNetwork, MediaSessionLayer, MediaStream, SessionEvent,
};
use crate::membership::MemberSnapshot;
use crate::protocol::MemberRecord;

fn snapshot(ids: &[&str]) -> MemberSnapshot {
    let members: BTreeMap<String, MemberRecord> = ids
        .iter()
        .map(|id| (id.to_string(), MemberRecord::default()))
        .collect();
    MemberSnapshot::new(members)
}

struct Peer {
    media: Arc<LoopbackMedia>,
    mesh: PeerMesh,
    events: mpsc::Receiver<SessionEvent>,
    incoming: mpsc::Receiver<Box<dyn IncomingSession>>,
    stream: Arc<dyn MediaStream>,
}

async fn peer(net: &LoopbackNetwork, id: &str) -> Peer {
    let media = Arc::new(net.endpoint_with_id(id));
    let stream = media.create_local_stream().await.unwrap();
    let incoming = media.take_incoming().await.unwrap();
    let (mesh, events) = PeerMesh::new(media.clone());
    Peer {
        media,
        mesh,
        events,
        incoming,
        stream,
    }
}

impl Peer {
    async fn accept_next(&mut self) -> AcceptOutcome {
        let request = self.incoming.recv().await.unwrap();
        self.mesh.accept_incoming(request, &self.stream)
    }

    async fn pump_event(&mut self) -> SessionEvent {
        let event = self.events.recv().await.unwrap();
        self.mesh.handle_event(&event);
        event
    }
}

#[tokio::test]
async fn only_smaller_id_dials() {
    let net = LoopbackNetwork::new();
    let mut a = peer(&net, "a").await;
    let mut b = peer(&net, "b").await;
    let members = snapshot(&["a", "b"]);

    let changes = b.mesh.reconcile(&members, &b.stream).await;
    assert!(changes.is_empty());

    let changes = a.mesh.reconcile(&members, &a.stream).await;
    assert_eq!(changes.opened, vec!["b".to_string()]);
    assert_eq!(a.mesh.connection("b").unwrap().direction, Direction::Outbound);

    assert!(matches!(b.accept_next().await, AcceptOutcome::Accepted));
    assert_eq!(b.mesh.connection("a").unwrap().direction, Direction::Inbound);

    // Both sides get the other's audio.
    assert!(matches!(a.pump_event().await, SessionEvent::RemoteStream { .. }));
    assert!(matches!(b.pump_event().await, SessionEvent::RemoteStream { .. }));
    assert!(a.mesh.connection("b").unwrap().remote_stream.is_some());
    assert!(b.mesh.connection("a").unwrap().remote_stream.is_some());

    // A second pass is a no-op.
    assert!(a.mesh.reconcile(&members, &a.stream).await.is_empty());
    assert_eq!(a.mesh.len(), 1);
}

#[tokio::test]
async fn departed_member_is_torn_down_on_both_sides() {
    let net = LoopbackNetwork::new();
    let mut a = peer(&net, "a").await;
    let mut b = peer(&net, "b").await;
    let both = snapshot(&["a", "b"]);

    a.mesh.reconcile(&both, &a.stream).await;
    b.accept_next().await;
    b.mesh.reconcile(&both, &b.stream).await;
    a.pump_event().await;
    b.pump_event().await;

    let changes = a.mesh.reconcile(&snapshot(&["a"]), &a.stream).await;
    assert_eq!(changes.closed, vec!["b".to_string()]);
    assert!(a.mesh.is_empty());

    assert!(matches!(b.pump_event().await, SessionEvent::Closed { .. }));
    assert!(b.mesh.is_empty());

    // Teardown is idempotent.
    assert!(!a.mesh.close_peer("b"));
}

#[tokio::test]
async fn unconfirmed_inbound_survives_stale_snapshot() {
    let net = LoopbackNetwork::new();
    let mut a = peer(&net, "a").await;
    let mut b = peer(&net, "b").await;

    a.mesh.reconcile(&snapshot(&["a", "b"]), &a.stream).await;
    b.accept_next().await;

    // b has not seen a in any snapshot yet.
    let changes = b.mesh.reconcile(&snapshot(&["b"]), &b.stream).await;
    assert!(changes.closed.is_empty());
    assert_eq!(b.mesh.peer_ids(), vec!["a".to_string()]);

    b.mesh.reconcile(&snapshot(&["a", "b"]), &b.stream).await;
    assert!(b.mesh.connection("a").unwrap().confirmed);

    let changes = b.mesh.reconcile(&snapshot(&["b"]), &b.stream).await;
    assert_eq!(changes.closed, vec!["a".to_string()]);
}

#[tokio::test]
async fn inbound_from_already_dialed_peer_is_rejected() {
    let net = LoopbackNetwork::new();
    let mut a = peer(&net, "a").await;
    let b = peer(&net, "b").await;

    a.mesh.reconcile(&snapshot(&["a", "b"]), &a.stream).await;
    let original = a.mesh.connection("b").unwrap().session.session_id().to_string();

    // b dials against the ordering rule.
    let (tx, mut rx) = mpsc::channel(8);
    b.media.open_session("a", b.stream.clone(), tx).await.unwrap();

    assert!(matches!(a.accept_next().await, AcceptOutcome::Duplicate));
    assert_eq!(a.mesh.connection("b").unwrap().session.session_id(), original);
    assert!(matches!(rx.recv().await, Some(SessionEvent::Closed { .. })));
}

#[tokio::test]
async fn redial_replaces_stale_inbound() {
    let net = LoopbackNetwork::new();
    let a = peer(&net, "a").await;
    let mut b = peer(&net, "b").await;

    let (tx1, _rx1) = mpsc::channel(8);
    a.media.open_session("b", a.stream.clone(), tx1).await.unwrap();
    assert!(matches!(b.accept_next().await, AcceptOutcome::Accepted));
    let first = b.mesh.connection("a").unwrap().session.session_id().to_string();

    let (tx2, _rx2) = mpsc::channel(8);
    a.media.open_session("b", a.stream.clone(), tx2).await.unwrap();
    assert!(matches!(b.accept_next().await, AcceptOutcome::Replaced));
    assert_ne!(b.mesh.connection("a").unwrap().session.session_id(), first);
    assert_eq!(b.mesh.len(), 1);
}

#[tokio::test]
async fn stale_close_events_are_ignored() {
    let net = LoopbackNetwork::new();
    let mut a = peer(&net, "a").await;
    let mut b = peer(&net, "b").await;
    let both = snapshot(&["a", "b"]);

    a.mesh.reconcile(&both, &a.stream).await;
    b.accept_next().await;
    a.pump_event().await;

    a.mesh.close_peer("b");
    // The Closed callback for the session we closed ourselves is stale.
    let event = a.events.recv().await.unwrap();
    assert!(matches!(event, SessionEvent::Closed { .. }));
    assert!(!a.mesh.handle_event(&event));

    // Redial on the next pass.
    let changes = a.mesh.reconcile(&both, &a.stream).await;
    assert_eq!(changes.opened, vec!["b".to_string()]);
}

#[tokio::test]
async fn unreachable_peer_is_reported() {
    let net = LoopbackNetwork::new();
    let mut a = peer(&net, "a").await;

    let changes = a.mesh.reconcile(&snapshot(&["a", "ghost"]), &a.stream).await;
    assert_eq!(changes.failed.len(), 1);
    assert_eq!(changes.failed[0].0, "ghost");
    assert!(a.mesh.is_empty());
}

#[tokio::test]
async fn unreachable_peer_is_tracked_until_reached_or_gone() {
    let net = LoopbackNetwork::new();
    let mut a = peer(&net, "a").await;
    let members = snapshot(&["a", "ghost"]);

    for _ in 0..3 {
        let changes = a.mesh.reconcile(&members, &a.stream).await;
        assert_eq!(changes.failed.len(), 1);
        assert!(a.mesh.is_unreachable("ghost"));
    }

    let _ghost = peer(&net, "ghost").await;
    let changes = a.mesh.reconcile(&members, &a.stream).await;
    assert_eq!(changes.opened, vec!["ghost".to_string()]);
    assert!(!a.mesh.is_unreachable("ghost"));

    // A member that leaves while unreachable is forgotten.
    a.mesh.reconcile(&snapshot(&["a", "zed"]), &a.stream).await;
    assert!(a.mesh.is_unreachable("zed"));
    a.mesh.reconcile(&snapshot(&["a"]), &a.stream).await;
    assert!(!a.mesh.is_unreachable("zed"));
}

#[tokio::test]
async fn close_all_empties_table() {
    let net = LoopbackNetwork::new();
    let mut a = peer(&net, "a").await;
    let _b = peer(&net, "b").await;
    let _c = peer(&net, "c").await;

    a.mesh.reconcile(&snapshot(&["a", "b", "c"]), &a.stream).await;
    assert_eq!(a.mesh.close_all(), vec!["b".to_string(), "c".to_string()]);
    assert!(a.mesh.is_empty());
    assert_eq!(net.open_sessions(), 0);
}
