//! End-to-end flows between two simulated hosts.

use std::time::Duration;

use stunmesh_core::{DeviceProtocol, PeerProtocol, Shutdown};
use stunmesh_crypto::decrypt;
use stunmesh_integration_tests::fixtures::TwoHostFixture;

#[tokio::test]
async fn test_publish_establish_round_trip() {
    let fixture = TwoHostFixture::new(DeviceProtocol::Ipv4, PeerProtocol::Ipv4).await;
    let (alpha, beta) = (&fixture.alpha, &fixture.beta);
    alpha.resolver.set("198.51.100.1:40001".parse().unwrap());
    beta.resolver.set("203.0.113.2:40002".parse().unwrap());

    alpha.publish.execute().await;
    beta.publish.execute().await;
    assert_eq!(fixture.store.writes(), 2);

    // Alpha's publish slot is beta's lookup slot.
    assert_eq!(alpha.peer_id.local_key(), beta.peer_id.remote_key());

    alpha.establish.execute_all().await;
    beta.establish.execute_all().await;

    assert_eq!(alpha.peer_endpoint().await, Some("203.0.113.2:40002".parse().unwrap()));
    assert_eq!(beta.peer_endpoint().await, Some("198.51.100.1:40001".parse().unwrap()));
}

#[tokio::test]
async fn test_envelope_only_opens_for_the_peer() {
    let fixture = TwoHostFixture::new(DeviceProtocol::Ipv4, PeerProtocol::Ipv4).await;
    let alpha = &fixture.alpha;
    alpha.resolver.set("198.51.100.1:40001".parse().unwrap());
    alpha.publish.execute().await;

    let sealed = fixture
        .store
        .peek(&alpha.peer_id.local_key().to_hex())
        .await
        .unwrap();
    let opened = decrypt(&sealed, &alpha.public_key(), &fixture.beta.private_key).unwrap();
    assert_eq!(opened, r#"{"ipv4":"198.51.100.1:40001"}"#);

    // A third party cannot open it.
    let stranger = stunmesh_crypto::PrivateKey::from_bytes([0x33; 32]);
    assert!(decrypt(&sealed, &alpha.public_key(), &stranger).is_err());
}

#[tokio::test]
async fn test_dualstack_prefer_ipv6() {
    let fixture = TwoHostFixture::new(DeviceProtocol::Dualstack, PeerProtocol::PreferIpv6).await;
    let (alpha, beta) = (&fixture.alpha, &fixture.beta);
    alpha.resolver.set("198.51.100.1:40001".parse().unwrap());
    alpha.resolver.set("[2001:db8::a1]:40001".parse().unwrap());

    alpha.publish.execute().await;
    beta.establish.execute_all().await;
    assert_eq!(beta.peer_endpoint().await, Some("[2001:db8::a1]:40001".parse().unwrap()));

    // IPv6 disappears on the next round: beta falls back to IPv4.
    alpha.resolver.clear(stunmesh_transport::AddressFamily::V6);
    alpha.publish.execute().await;
    beta.establish.execute_all().await;
    assert_eq!(beta.peer_endpoint().await, Some("198.51.100.1:40001".parse().unwrap()));
}

#[tokio::test]
async fn test_peer_not_yet_published() {
    let fixture = TwoHostFixture::new(DeviceProtocol::Ipv4, PeerProtocol::Ipv4).await;
    fixture.beta.establish.execute_all().await;
    assert!(fixture.beta.wireguard.applied().is_empty());
    assert_eq!(fixture.beta.peer_endpoint().await, None);
}

#[tokio::test]
async fn test_store_outage_then_recovery() {
    let fixture = TwoHostFixture::new(DeviceProtocol::Ipv4, PeerProtocol::Ipv4).await;
    let (alpha, beta) = (&fixture.alpha, &fixture.beta);
    alpha.resolver.set("198.51.100.1:40001".parse().unwrap());

    fixture.store.set_unavailable(true);
    alpha.publish.execute().await;
    beta.establish.execute_all().await;
    assert_eq!(beta.peer_endpoint().await, None);

    fixture.store.set_unavailable(false);
    alpha.publish.execute().await;
    beta.establish.execute_all().await;
    assert_eq!(beta.peer_endpoint().await, Some("198.51.100.1:40001".parse().unwrap()));
}

#[tokio::test]
async fn test_refresh_through_worker() {
    let mut fixture = TwoHostFixture::new(DeviceProtocol::Ipv4, PeerProtocol::Ipv4).await;
    fixture.alpha.resolver.set("198.51.100.1:40001".parse().unwrap());
    fixture.alpha.publish.execute().await;

    let beta = &mut fixture.beta;
    let shutdown = Shutdown::new();
    let receiver = beta.receiver.take().unwrap();
    let worker = beta.establish.run_worker(receiver, shutdown.subscribe());

    assert_eq!(beta.refresh.execute().await, 1);
    tokio::time::timeout(Duration::from_secs(5), async {
        while beta.peer_endpoint().await.is_none() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    shutdown.trigger();
    worker.await.unwrap();
}
