//! End-to-end topology scenarios (S1-S6 of `spec.md` §8), driving real
//! `MeshNode` instances wired together through `MockTransport` over a shared
//! in-memory switchboard.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockNetwork, MockTransport};
use p2pmesh::protocol::{Message, MessageId, MessageType, PeerId};
use p2pmesh::transport::Transport;
use p2pmesh::{MeshNode, NodeConfig};

/// Short enough that a handful of `settle()` calls observe real announce
/// propagation without the test taking seconds.
const FAST_ANNOUNCE: Duration = Duration::from_millis(20);

async fn settle() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}

async fn settle_for_announce_propagation() {
    tokio::time::sleep(FAST_ANNOUNCE * 6).await;
}

fn node_with_transport(
    network: &MockNetwork,
    id: &str,
    username: &str,
) -> (Arc<MeshNode>, Arc<MockTransport>) {
    let transport = MockTransport::new(network, id, username);
    let config = NodeConfig::new(username)
        .with_peer_id(PeerId::from(id))
        .with_auto_connect(false)
        .with_auto_advertise(false)
        .with_announce_interval(FAST_ANNOUNCE);
    let node = MeshNode::new(config, vec![transport.clone()]).unwrap();
    (node, transport)
}

/// `MockTransport::connect` is symmetric: it registers both ends and emits a
/// `Connected` state change on each, which each node's own state-change
/// handler turns into a real `router.add_direct_peer`. One call links both
/// sides.
async fn link(a_transport: &Arc<MockTransport>, b_id: &str) {
    a_transport.connect(&PeerId::from(b_id)).await.unwrap();
    settle().await;
}

/// S1 - Broadcast over a line A-B-C, ttl=3.
#[tokio::test]
async fn s1_broadcast_over_a_line() {
    let net = MockNetwork::new();
    let (a, a_t) = node_with_transport(&net, "a", "alice");
    let (b, b_t) = node_with_transport(&net, "b", "bob");
    let (c, _c_t) = node_with_transport(&net, "c", "carol");

    a.start().await.unwrap();
    b.start().await.unwrap();
    c.start().await.unwrap();

    link(&a_t, "b").await;
    link(&b_t, "c").await;

    let mut a_msgs = a.on_message();
    let mut b_msgs = b.on_message();
    let mut c_msgs = c.on_message();

    a.broadcast("hi", vec![], Default::default(), Some(3)).await.unwrap();
    settle().await;

    let at_b = b_msgs.try_recv().unwrap();
    assert_eq!(at_b.payload.text, "hi");
    assert!(b_msgs.try_recv().is_err(), "exactly one delivery at B");

    let at_c = c_msgs.try_recv().unwrap();
    assert_eq!(at_c.payload.text, "hi");
    assert!(c_msgs.try_recv().is_err(), "exactly one delivery at C");

    // A never receives a copy of its own broadcast (pre-marked as seen).
    assert!(a_msgs.try_recv().is_err());

    a.stop().await;
    b.stop().await;
    c.stop().await;
}

/// S2 - Targeted send A->C through B, route learned via real periodic
/// announces (no hand-crafted wire frames).
#[tokio::test]
async fn s2_targeted_send_through_intermediate() {
    let net = MockNetwork::new();
    let (a, a_t) = node_with_transport(&net, "a", "alice");
    let (b, b_t) = node_with_transport(&net, "b", "bob");
    let (c, _c_t) = node_with_transport(&net, "c", "carol");

    a.start().await.unwrap();
    b.start().await.unwrap();
    c.start().await.unwrap();

    link(&a_t, "b").await;
    link(&b_t, "c").await;

    // Let B's and C's periodic announces run so A learns a route to C via B.
    settle_for_announce_propagation().await;

    let a_route_to_c = a.get_peer(&PeerId::from("c")).await.unwrap();
    assert!(a_route_to_c.is_some(), "A must have learned of C via B's announce");
    let a_route_to_c = a_route_to_c.unwrap();
    assert_eq!(a_route_to_c.hop_count, 1);
    assert_eq!(a_route_to_c.next_hop_peer_id, Some(PeerId::from("b")));

    let mut c_msgs = c.on_message();
    a.send_to_peer(PeerId::from("c"), "for C", vec![], Default::default(), Some(3))
        .await
        .unwrap();
    settle().await;

    let delivered = c_msgs.try_recv().unwrap();
    assert_eq!(delivered.payload.text, "for C");

    a.stop().await;
    b.stop().await;
    c.stop().await;
}

/// S3 - Duplicate suppression in a triangle A-B-C.
#[tokio::test]
async fn s3_duplicate_suppression_in_a_triangle() {
    let net = MockNetwork::new();
    let (a, a_t) = node_with_transport(&net, "a", "alice");
    let (b, b_t) = node_with_transport(&net, "b", "bob");
    let (c, _c_t) = node_with_transport(&net, "c", "carol");

    a.start().await.unwrap();
    b.start().await.unwrap();
    c.start().await.unwrap();

    link(&a_t, "b").await;
    link(&b_t, "c").await;
    link(&a_t, "c").await;

    let mut b_msgs = b.on_message();
    let mut c_msgs = c.on_message();

    a.broadcast("hi", vec![], Default::default(), Some(5)).await.unwrap();
    settle().await;

    let at_b = b_msgs.try_recv().unwrap();
    assert_eq!(at_b.payload.text, "hi");
    assert!(b_msgs.try_recv().is_err(), "exactly one delivery at B");

    let at_c = c_msgs.try_recv().unwrap();
    assert_eq!(at_c.payload.text, "hi");
    assert!(c_msgs.try_recv().is_err(), "exactly one delivery at C");

    a.stop().await;
    b.stop().await;
    c.stop().await;
}

/// S5 - Direct-peer drop cascades: A-B-D, learned via B's real announce.
#[tokio::test]
async fn s5_direct_peer_drop_cascades() {
    use p2pmesh::mesh::PeerUpdate;

    let net = MockNetwork::new();
    let (a, a_t) = node_with_transport(&net, "a", "alice");
    let (b, b_t) = node_with_transport(&net, "b", "bob");
    let (d, _d_t) = node_with_transport(&net, "d", "dave");

    a.start().await.unwrap();
    b.start().await.unwrap();
    d.start().await.unwrap();

    link(&a_t, "b").await;
    link(&b_t, "d").await;

    settle_for_announce_propagation().await;
    assert_eq!(a.peer_count().await.unwrap(), 2, "A should know B (direct) and D (via B)");

    let mut updates = a.on_peer_update();
    a.disconnect_peer(&PeerId::from("b")).await.unwrap();
    settle().await;

    assert_eq!(a.peer_count().await.unwrap(), 0);

    let mut removed = std::collections::HashSet::new();
    while let Ok(update) = updates.try_recv() {
        if let PeerUpdate::Removed(id) = update {
            removed.insert(id);
        }
    }
    assert!(removed.contains(&PeerId::from("b")));
    assert!(removed.contains(&PeerId::from("d")));

    a.stop().await;
    b.stop().await;
    d.stop().await;
}

/// S4 - Shorter route wins and ties keep the earlier-learned route, observed
/// through real announces across two independent paths to the same peer.
#[tokio::test]
async fn s4_shorter_route_wins_ties_keep_earlier() {
    let net = MockNetwork::new();
    let (a, a_t) = node_with_transport(&net, "a", "alice");
    let (b, b_t) = node_with_transport(&net, "b", "bob");
    let (c, c_t) = node_with_transport(&net, "c", "carol");
    let (d, _d_t) = node_with_transport(&net, "d", "dave");

    a.start().await.unwrap();
    b.start().await.unwrap();
    c.start().await.unwrap();
    d.start().await.unwrap();

    link(&a_t, "b").await;
    link(&a_t, "c").await;
    link(&b_t, "d").await;
    link(&c_t, "d").await;

    settle_for_announce_propagation().await;

    let route = a.get_peer(&PeerId::from("d")).await.unwrap().unwrap();
    assert_eq!(route.hop_count, 1);
    let first_next_hop = route.next_hop_peer_id.clone();
    assert!(first_next_hop == Some(PeerId::from("b")) || first_next_hop == Some(PeerId::from("c")));

    // Further announce rounds at equal cost must not flap the route.
    settle_for_announce_propagation().await;
    let route_again = a.get_peer(&PeerId::from("d")).await.unwrap().unwrap();
    assert_eq!(route_again.hop_count, 1);
    assert_eq!(route_again.next_hop_peer_id, first_next_hop);

    a.stop().await;
    b.stop().await;
    c.stop().await;
    d.stop().await;
}

/// S6 - Ping/pong: C synthesizes and sends a real pong back over its real
/// transport when it receives a ping addressed to it.
#[tokio::test]
async fn s6_ping_pong_round_trip() {
    let net = MockNetwork::new();
    let (a, a_t) = node_with_transport(&net, "a", "alice");
    let (c, _c_t) = node_with_transport(&net, "c", "carol");

    a.start().await.unwrap();
    c.start().await.unwrap();

    link(&a_t, "c").await;

    let mut a_inbound = a_t.subscribe_inbound();

    let ping = Message {
        id: MessageId("p1".to_string()),
        message_type: MessageType::Ping,
        source_id: PeerId::from("a"),
        source_username: "alice".into(),
        target_ids: vec![PeerId::from("c")],
        ttl: 3,
        created_at: p2pmesh::protocol::now_millis(),
        payload: None,
    };
    let encoded = p2pmesh::protocol::wire::encode(&ping).unwrap();
    // Deliver the ping to C as if it arrived over the real link from A.
    a_t.send(&PeerId::from("c"), &encoded).await.unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(1), a_inbound.recv())
        .await
        .expect("timed out waiting for pong")
        .unwrap();
    assert_eq!(frame.from, PeerId::from("c"));
    let pong = p2pmesh::protocol::wire::decode(&frame.text).unwrap();
    assert_eq!(pong.message_type, MessageType::Pong);
    assert_eq!(pong.target_ids, vec![PeerId::from("a")]);
    let payload = pong.payload.unwrap();
    assert_eq!(payload.get("pingId").and_then(|v| v.as_str()), Some("p1"));

    a.stop().await;
    c.stop().await;
}
