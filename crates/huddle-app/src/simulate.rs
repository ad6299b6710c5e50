//! `huddle simulate`: a whole room in one process.
//!
//! Every participant gets its own store connection and loopback media
//! endpoint, so the run goes through the same paths a networked client
//! would. Timing uses the wall clock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use huddle_common::{new_correlation_id, HuddleError};
use huddle_room::{
    LoopbackNetwork, MemoryStore, RoomClient, RoomError, RoomEvent, RoomSettings, SystemClock,
    VoteOutcome,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::SimulateArgs;

const MESH_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(mut settings: RoomSettings, opts: SimulateArgs) -> Result<(), HuddleError> {
    if opts.members == 0 {
        return Err(HuddleError::Other("--members must be at least 1".into()));
    }
    settings.vote_duration_ms = i64::try_from(opts.vote_duration_ms).unwrap_or(i64::MAX);

    let run_id = new_correlation_id();
    info!(run = %run_id, room = %opts.room, members = opts.members, "simulation starting");

    let store = MemoryStore::new();
    let network = LoopbackNetwork::new();
    let clock = Arc::new(SystemClock);
    let (outcome_tx, mut outcome_rx) = mpsc::channel(16);

    let mut clients = Vec::new();
    for i in 1..=opts.members {
        let name = format!("guest-{i}");
        let conn = store.connect().await;
        let media = Arc::new(network.endpoint());
        match RoomClient::join(
            settings.clone(),
            Arc::new(conn),
            media,
            clock.clone(),
            &opts.room,
            &name,
        )
        .await
        {
            Ok((client, events)) => {
                println!("{name} joined as {}", client.participant_id());
                tokio::spawn(watch_events(name, events, outcome_tx.clone()));
                clients.push(client);
            }
            Err(e @ RoomError::CapacityExceeded { .. }) => println!("{name} turned away: {e}"),
            Err(e) => return Err(e.into()),
        }
    }
    drop(outcome_tx);

    wait_for_mesh(&clients).await;
    for client in &clients {
        println!(
            "{} connected to {} peer(s)",
            client.display_name(),
            client.connected_peers().await.len()
        );
    }

    if let Some(votes) = opts.eject_votes {
        if clients.len() < 3 {
            println!("skipping vote: it needs at least 3 members");
        } else {
            run_vote(&clients, votes, &settings, &mut outcome_rx).await?;
        }
    }

    for client in &clients {
        client.leave().await?;
    }
    let dump = serde_json::to_string_pretty(&store.dump().await)
        .map_err(|e| HuddleError::Other(e.to_string()))?;
    println!("store after everyone left:\n{dump}");
    info!(run = %run_id, "simulation finished");
    Ok(())
}

async fn watch_events(
    name: String,
    mut events: mpsc::Receiver<RoomEvent>,
    outcomes: mpsc::Sender<VoteOutcome>,
) {
    while let Some(event) = events.recv().await {
        match event {
            RoomEvent::VoteConcluded(outcome) => {
                let _ = outcomes.send(outcome).await;
            }
            RoomEvent::Ejected { .. } => println!("{name} was ejected"),
            RoomEvent::Error(message) => warn!(participant = %name, %message, "room error"),
            other => debug!(participant = %name, event = ?other, "room event"),
        }
    }
}

async fn wait_for_mesh(clients: &[RoomClient]) {
    let expected = clients.len().saturating_sub(1);
    let formed = tokio::time::timeout(MESH_TIMEOUT, async {
        loop {
            let mut complete = true;
            for client in clients {
                if client.connected_peers().await.len() < expected {
                    complete = false;
                    break;
                }
            }
            if complete {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    if formed.is_err() {
        warn!(timeout = ?MESH_TIMEOUT, "mesh did not fully form");
    }
}

async fn run_vote(
    clients: &[RoomClient],
    votes: usize,
    settings: &RoomSettings,
    outcomes: &mut mpsc::Receiver<VoteOutcome>,
) -> Result<(), HuddleError> {
    let names: HashMap<&str, &str> = clients
        .iter()
        .map(|c| (c.participant_id(), c.display_name()))
        .collect();
    let initiator = &clients[0];
    let target = &clients[1];

    let vote = initiator.start_vote().await?;
    println!(
        "{} opened a vote, closing at {}",
        initiator.display_name(),
        vote.end_time
    );

    let voters = std::iter::once(initiator).chain(clients.iter().skip(2));
    for voter in voters.take(votes) {
        voter.cast_vote(target.participant_id()).await?;
        println!("{} voted against {}", voter.display_name(), target.display_name());
    }

    let wait = Duration::from_millis(u64::try_from(settings.vote_duration_ms).unwrap_or(0))
        + MESH_TIMEOUT;
    let outcome = match tokio::time::timeout(wait, outcomes.recv()).await {
        Ok(Some(outcome)) => outcome,
        _ => return Err(HuddleError::Other("vote did not conclude in time".into())),
    };

    let target_name = outcome
        .target_id
        .as_deref()
        .and_then(|id| names.get(id).copied())
        .unwrap_or("nobody");
    println!(
        "vote closed: {} ballot(s) for {target_name} out of {} member(s), ejected: {}",
        outcome.votes, outcome.member_count, outcome.ejected
    );
    Ok(())
}
