mod common;

use std::time::Duration;

use common::{candidate, eventually, Call, FakeFactory, FakeMedia, RecordingSink, Relay};
use tokio::sync::{broadcast, mpsc};

use pairtalk_lib::peer::state::NegotiationState;
use pairtalk_lib::peer::transport::TransportEventKind;
use pairtalk_lib::peer::types::{ConnectionState, SdpKind};
use pairtalk_lib::signaling::{ChannelEvent, RelayMessage};
use pairtalk_lib::{Endpoint, EndpointHandle, Role, Status};

struct Peer {
    handle: EndpointHandle,
    status: broadcast::Receiver<Status>,
    factory: FakeFactory,
    media: FakeMedia,
}

fn join_relay(relay: &Relay, sid: &str) -> Peer {
    let factory = FakeFactory::default();
    let media = FakeMedia::default();
    let (sink, channel) = relay.connect(sid);
    let (endpoint, handle) = Endpoint::new(factory.clone(), media.clone(), sink, channel);
    let status = handle.subscribe_status();
    tokio::spawn(endpoint.run());
    Peer {
        handle,
        status,
        factory,
        media,
    }
}

async fn wait_status(
    rx: &mut broadcast::Receiver<Status>,
    pred: impl Fn(&Status) -> bool,
) -> Status {
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(status) if pred(&status) => return status,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("status bus closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(2), wait)
        .await
        .expect("status not published in time")
}

async fn allocate_code(peer: &mut Peer) -> String {
    peer.handle.generate_code().unwrap();
    let status = wait_status(&mut peer.status, |s| s.message.starts_with("Your code is: ")).await;
    status.message["Your code is: ".len()..].to_string()
}

async fn wait_for_state(handle: &EndpointHandle, state: NegotiationState) {
    let handle = handle.clone();
    eventually(move || {
        let handle = handle.clone();
        async move {
            let snapshot = handle.session().await.unwrap()?;
            (snapshot.state == state).then_some(())
        }
    })
    .await
}

async fn paired(relay: &Relay) -> (Peer, Peer) {
    let mut a = join_relay(relay, "sid-a");
    let b = join_relay(relay, "sid-b");
    let code = allocate_code(&mut a).await;
    b.handle.join_code(code).unwrap();
    wait_for_state(&a.handle, NegotiationState::Stable).await;
    wait_for_state(&b.handle, NegotiationState::Stable).await;
    (a, b)
}

#[tokio::test]
async fn code_pairing_reaches_stable_on_both_sides() {
    let relay = Relay::default();
    let (a, b) = paired(&relay).await;

    let a_session = a.handle.session().await.unwrap().unwrap();
    let b_session = b.handle.session().await.unwrap().unwrap();
    assert_eq!(a_session.role, Role::Responder);
    assert_eq!(a_session.remote_peer, "sid-b");
    assert_eq!(b_session.role, Role::Initiator);
    assert_eq!(b_session.remote_peer, "sid-a");
    for s in [&a_session, &b_session] {
        assert!(s.has_local_description);
        assert!(s.has_remote_description);
        assert_eq!(s.outbound_tracks, 2);
        assert_eq!(s.pending_candidates, 0);
    }

    // Codes are single-use.
    assert_eq!(relay.active_codes(), 0);

    let offer = format!("offer-{}", b_session.id);
    assert!(a
        .factory
        .log(0)
        .calls()
        .contains(&Call::SetRemote(SdpKind::Offer, offer)));
}

#[tokio::test]
async fn local_candidates_reach_the_other_side() {
    let relay = Relay::default();
    let (a, b) = paired(&relay).await;

    b.factory
        .emit(0, TransportEventKind::LocalCandidate(candidate(3)));
    a.factory
        .emit(0, TransportEventKind::LocalCandidate(candidate(4)));

    let a_log = a.factory.log(0);
    let b_log = b.factory.log(0);
    eventually(|| {
        let found = a_log.candidates().contains(&candidate(3).candidate)
            && b_log.candidates().contains(&candidate(4).candidate);
        async move { found.then_some(()) }
    })
    .await;
}

#[tokio::test]
async fn joining_own_code_is_rejected() {
    let relay = Relay::default();
    let mut a = join_relay(&relay, "sid-a");
    let code = allocate_code(&mut a).await;

    a.handle.join_code(code).unwrap();
    let status = wait_status(&mut a.status, Status::is_error).await;
    assert_eq!(status.message, "Cannot join your own code");
    assert!(a.handle.session().await.unwrap().is_none());
    assert_eq!(relay.active_codes(), 1);
}

#[tokio::test]
async fn unknown_code_is_rejected() {
    let relay = Relay::default();
    let mut b = join_relay(&relay, "sid-b");

    b.handle.join_code("999999").unwrap();
    let status = wait_status(&mut b.status, Status::is_error).await;
    assert_eq!(status.message, "Invalid or expired code");
    assert!(b.handle.session().await.unwrap().is_none());
    assert_eq!(b.factory.created(), 0);
}

#[tokio::test]
async fn blank_code_never_reaches_the_relay() {
    let sink = RecordingSink::default();
    let (_channel_tx, channel_rx) = mpsc::unbounded_channel::<ChannelEvent>();
    let (endpoint, handle) = Endpoint::new(
        FakeFactory::default(),
        FakeMedia::default(),
        sink.clone(),
        channel_rx,
    );
    let mut status = handle.subscribe_status();
    tokio::spawn(endpoint.run());

    handle.join_code("   ").unwrap();
    let first = wait_status(&mut status, |_| true).await;
    assert_eq!(first, Status::error("Please enter a code first"));
    assert!(sink.messages().is_empty());
}

#[tokio::test]
async fn hang_up_releases_the_session() {
    let relay = Relay::default();
    let (mut a, b) = paired(&relay).await;

    a.handle.hang_up().unwrap();
    wait_status(&mut a.status, |s| s.message == "Call ended").await;

    assert!(a.handle.session().await.unwrap().is_none());
    assert!(a.media.issued().iter().all(|t| t.is_stopped()));
    assert_eq!(a.factory.log(0).calls().last(), Some(&Call::Close));

    // The other side only learns about it from its own transport.
    assert!(b.handle.session().await.unwrap().is_some());
}

#[tokio::test]
async fn transport_failure_ends_the_call() {
    let relay = Relay::default();
    let (mut a, _b) = paired(&relay).await;

    a.factory.emit(
        0,
        TransportEventKind::ConnectionState(ConnectionState::Failed),
    );
    wait_status(&mut a.status, |s| {
        s.message == "Connection failed. Please try again."
    })
    .await;

    let handle = a.handle.clone();
    eventually(move || {
        let handle = handle.clone();
        async move { handle.session().await.unwrap().is_none().then_some(()) }
    })
    .await;
    assert_eq!(a.factory.log(0).calls().last(), Some(&Call::Close));
}

#[tokio::test]
async fn relay_drop_is_reported() {
    let relay = Relay::default();
    let mut a = join_relay(&relay, "sid-a");
    wait_status(&mut a.status, |s| s.message == "Connected to server").await;

    relay.disconnect("sid-a");
    let status = wait_status(&mut a.status, |s| s.message == "Disconnected from server").await;
    assert!(status.is_error());
}

#[tokio::test]
async fn relay_reconnect_keeps_the_session() {
    let sink = RecordingSink::default();
    let (channel_tx, channel_rx) = mpsc::unbounded_channel();
    let (endpoint, handle) = Endpoint::new(
        FakeFactory::default(),
        FakeMedia::default(),
        sink,
        channel_rx,
    );
    let mut status = handle.subscribe_status();
    tokio::spawn(endpoint.run());

    channel_tx
        .send(ChannelEvent::Message(RelayMessage::PeerJoined {
            peer_sid: "sid-b".into(),
        }))
        .unwrap();
    wait_for_state(&handle, NegotiationState::Idle).await;

    channel_tx
        .send(ChannelEvent::Disconnected("io".into()))
        .unwrap();
    channel_tx
        .send(ChannelEvent::Reconnecting { attempt: 1, max: 5 })
        .unwrap();
    channel_tx.send(ChannelEvent::Connected).unwrap();
    wait_status(&mut status, |s| s.message == "Connected to server").await;
    let session = handle.session().await.unwrap().unwrap();
    assert_eq!(session.remote_peer, "sid-b");
    assert_eq!(session.role, Role::Responder);

    channel_tx
        .send(ChannelEvent::GaveUp { attempts: 5 })
        .unwrap();
    let gave_up = wait_status(&mut status, Status::is_error).await;
    assert_eq!(gave_up.message, "Unable to reach server after 5 attempts");
}
