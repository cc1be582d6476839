//! Watchdog behaviour under paused time.

use std::sync::Arc;
use std::time::Duration;

use reticulum_core::DestinationHash;
use reticulum_core::testing::RecordingInterface;
use reticulum_crypto::SigningKey;
use reticulum_protocol::link::{
    Link, LinkEstablishment, LinkRegistry, LinkStatus, LinkTable, LinkTimings, LocalDestination,
    RequestPacket, TeardownReason,
};

fn timings() -> LinkTimings {
    LinkTimings {
        establishment_per_hop: Duration::from_secs(6),
        keepalive: Duration::from_secs(10),
        stale_grace: Duration::from_secs(5),
    }
}

struct Pair {
    initiator_table: Arc<LinkTable>,
    responder_table: Arc<LinkTable>,
    outgoing: Arc<Link>,
    incoming: Arc<Link>,
}

fn establish(hops: u8) -> Pair {
    let initiator_table = Arc::new(LinkTable::new());
    let responder_table = Arc::new(LinkTable::new());
    let initiator = LinkEstablishment::new(initiator_table.clone(), timings());
    let responder = LinkEstablishment::new(responder_table.clone(), timings());
    let dest = LocalDestination::new(DestinationHash::new([0xD0; 16]), SigningKey::generate());
    let a = Arc::new(RecordingInterface::new(1, "a"));
    let b = Arc::new(RecordingInterface::new(2, "b"));

    let outgoing = initiator
        .initiate(dest.hash(), dest.identity_key(), hops, a.clone())
        .unwrap();
    let packet = RequestPacket::from_frame(&a.take_sent()[0], hops, b.clone()).unwrap();
    let incoming = responder.validate_request(&dest, &packet).unwrap();
    initiator.receive_proof(&b.take_sent()[0]).unwrap();

    Pair {
        initiator_table,
        responder_table,
        outgoing,
        incoming,
    }
}

async fn settle() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn unanswered_request_closes_after_hop_scaled_timeout() {
    let table = Arc::new(LinkTable::new());
    let establishment = LinkEstablishment::new(table.clone(), timings());
    let iface = Arc::new(RecordingInterface::new(1, "a"));
    let link = establishment
        .initiate(
            DestinationHash::new([1; 16]),
            SigningKey::generate().verifying_key(),
            2,
            iface,
        )
        .unwrap();
    assert_eq!(link.establishment_timeout(), Duration::from_secs(12));

    tokio::time::sleep(Duration::from_secs(11)).await;
    settle().await;
    assert_eq!(link.status(), LinkStatus::Handshaking);
    assert_eq!(table.link_count(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(link.status(), LinkStatus::Closed);
    assert_eq!(
        link.teardown_reason(),
        Some(TeardownReason::EstablishmentTimeout)
    );
    assert_eq!(table.link_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn zero_hop_request_gets_one_hop_allowance() {
    let table = Arc::new(LinkTable::new());
    let establishment = LinkEstablishment::new(table.clone(), timings());
    let link = establishment
        .initiate(
            DestinationHash::new([1; 16]),
            SigningKey::generate().verifying_key(),
            0,
            Arc::new(RecordingInterface::new(1, "a")),
        )
        .unwrap();
    assert_eq!(link.establishment_timeout(), Duration::from_secs(6));

    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(link.status(), LinkStatus::Handshaking);
}

#[tokio::test(start_paused = true)]
async fn silent_active_link_goes_stale_then_closes() {
    let pair = establish(1);
    assert_eq!(pair.incoming.status(), LinkStatus::Active);

    tokio::time::sleep(Duration::from_secs(19)).await;
    settle().await;
    assert_eq!(pair.incoming.status(), LinkStatus::Active);

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(pair.incoming.status(), LinkStatus::Stale);
    assert_eq!(pair.responder_table.link_count(), 1);

    tokio::time::sleep(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(pair.incoming.status(), LinkStatus::Closed);
    assert_eq!(pair.incoming.teardown_reason(), Some(TeardownReason::Inactivity));
    assert_eq!(pair.responder_table.link_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn inbound_traffic_keeps_link_active() {
    let pair = establish(1);

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_secs(15)).await;
        let now = tokio::time::Instant::now();
        let ping = pair.outgoing.encrypt(b"keepalive").unwrap();
        pair.incoming.receive(&ping, now).unwrap();
        let pong = pair.incoming.encrypt(b"keepalive").unwrap();
        pair.outgoing.receive(&pong, now).unwrap();
        settle().await;
        assert_eq!(pair.incoming.status(), LinkStatus::Active);
        assert_eq!(pair.outgoing.status(), LinkStatus::Active);
    }
    assert_eq!(pair.responder_table.link_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn explicit_close_deregisters_immediately() {
    let pair = establish(1);
    assert_eq!(pair.initiator_table.link_count(), 1);

    assert!(pair.outgoing.close(TeardownReason::InitiatorClosed));
    settle().await;
    assert_eq!(pair.initiator_table.link_count(), 0);
    assert_eq!(pair.outgoing.status(), LinkStatus::Closed);
}

#[tokio::test(start_paused = true)]
async fn close_all_retires_every_link() {
    let pair = establish(1);
    assert_eq!(pair.responder_table.close_all(TeardownReason::Shutdown), 1);
    settle().await;
    assert_eq!(pair.incoming.teardown_reason(), Some(TeardownReason::Shutdown));
    assert_eq!(pair.responder_table.link_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn retired_watchdog_leaves_successor_with_same_id_registered() {
    let table = Arc::new(LinkTable::new());
    let establishment = LinkEstablishment::new(table.clone(), timings());
    let dest = LocalDestination::new(DestinationHash::new([0xD1; 16]), SigningKey::generate());
    let iface = Arc::new(RecordingInterface::new(1, "a"));
    let frame = reticulum_protocol::link::handshake::build_request_frame(
        &dest.hash(),
        &reticulum_protocol::link::handshake::build_request_payload(
            &reticulum_crypto::AgreementSecret::generate().public_key(),
            &SigningKey::generate().verifying_key(),
        ),
    );
    let packet = RequestPacket::from_frame(&frame, 1, iface).unwrap();

    let first = establishment.validate_request(&dest, &packet).unwrap();
    assert_eq!(table.close_all(TeardownReason::Shutdown), 1);

    // The replayed request derives the same id before the old watchdog runs.
    let second = establishment.validate_request(&dest, &packet).unwrap();
    assert_eq!(first.id(), second.id());
    settle().await;

    assert_eq!(first.status(), LinkStatus::Closed);
    assert_eq!(second.status(), LinkStatus::Active);
    let registered = table.find_link(&second.id()).unwrap();
    assert!(Arc::ptr_eq(&registered, &second));

    // The successor is still supervised.
    tokio::time::sleep(Duration::from_secs(28)).await;
    settle().await;
    assert_eq!(second.status(), LinkStatus::Closed);
    assert_eq!(table.link_count(), 0);
}
