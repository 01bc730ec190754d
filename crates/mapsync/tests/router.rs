//! Router behavior driven through authenticated in-memory connections.

mod common;

use std::sync::Arc;

use common::*;
use mapsync::prelude::*;
use mapsync::router;
use serde_json::json;

// =========================================================================
// update_player
// =========================================================================

#[tokio::test]
async fn test_update_player_same_map_reaches_others_not_sender() {
    let hub = hub_for(&["alice", "bob"]);
    let (_alice, mut alice_peer) = place(&hub, "alice", "meadow").await;
    let (_bob, mut bob_peer) = place(&hub, "bob", "meadow").await;
    alice_peer.next_of("load_new_online_player").await.unwrap();
    bob_peer.next_of("load_online_players").await.unwrap();

    alice_peer.send_update(&Player::new("alice", "meadow").at(Position::new(5, 6, 0)));

    let frame = bob_peer.next_of("update_player").await.unwrap();
    assert_eq!(frame["data"]["user_id"], "alice");
    assert_eq!(frame["data"]["pos"]["x"], 5);
    assert_eq!(frame["data"]["pos"]["y"], 6);
    assert!(alice_peer.is_silent().await);

    let stored = hub.players().get("meadow", "alice").unwrap();
    assert_eq!(stored.pos, Position::new(5, 6, 0));
}

#[tokio::test]
async fn test_update_player_switch_leaves_old_map_and_loads_new() {
    let hub = hub_for(&["alice", "bob", "carol"]);
    let (alice, mut alice_peer) = place(&hub, "alice", "meadow").await;
    let (_bob, mut bob_peer) = place(&hub, "bob", "meadow").await;
    let (_carol, mut carol_peer) = place(&hub, "carol", "cave").await;
    alice_peer.next_of("load_new_online_player").await.unwrap();

    alice_peer.send_update(&Player::new("alice", "cave"));

    let removed = bob_peer.next_of("remove_online_player").await.unwrap();
    assert_eq!(removed["data"], "alice");

    let joined = carol_peer.next_of("load_new_online_player").await.unwrap();
    assert_eq!(joined["data"][0]["user_id"], "alice");

    let loaded = alice_peer.next_of("load_online_players").await.unwrap();
    let users: Vec<_> = loaded["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["user_id"].as_str().unwrap().to_owned())
        .collect();
    assert!(users.contains(&"carol".to_owned()));
    assert!(users.contains(&"alice".to_owned()));

    assert!(hub.players().get("meadow", "alice").is_none());
    assert!(hub.players().get("cave", "alice").is_some());
    assert_eq!(alice.map_id().as_deref(), Some("cave"));
}

#[tokio::test]
async fn test_update_player_round_trip_ends_on_last_map() {
    let hub = hub_for(&["alice"]);
    let (alice, alice_peer) = place(&hub, "alice", "meadow").await;

    alice_peer.send_update(&Player::new("alice", "cave"));
    alice_peer.send_update(&Player::new("alice", "meadow"));

    let h = Arc::clone(&hub);
    let a = Arc::clone(&alice);
    eventually(move || {
        a.map_id().as_deref() == Some("meadow") && h.players().get("meadow", "alice").is_some()
    })
    .await;
    assert!(hub.players().players_in("cave").is_empty());
    assert_eq!(hub.players().len(), 1);
}

#[tokio::test]
async fn test_update_player_empty_map_id_leaves_current_map() {
    let hub = hub_for(&["alice", "bob"]);
    let (alice, alice_peer) = place(&hub, "alice", "meadow").await;
    let (_bob, mut bob_peer) = place(&hub, "bob", "meadow").await;

    alice_peer.send_update(&Player::new("alice", ""));

    let removed = bob_peer.next_of("remove_online_player").await.unwrap();
    assert_eq!(removed["data"], "alice");
    assert!(hub.players().occupants_with("alice").is_none());
    assert_eq!(alice.map_id(), None);
}

// =========================================================================
// load_new_online_player
// =========================================================================

#[tokio::test]
async fn test_first_player_on_map_gets_no_occupant_list() {
    let hub = hub_for(&["alice"]);
    let (alice, mut alice_peer) = place(&hub, "alice", "meadow").await;

    assert!(alice_peer.is_silent().await);
    assert_eq!(alice.map_id().as_deref(), Some("meadow"));
}

#[tokio::test]
async fn test_joiner_receives_occupants_with_live_positions() {
    let hub = hub_for(&["alice", "bob"]);
    let (_alice, alice_peer) = join(&hub, "alice").await;
    alice_peer.send_update(&Player::new("alice", "meadow").at(Position::new(7, 9, 0)));
    let h = Arc::clone(&hub);
    eventually(move || h.players().get("meadow", "alice").is_some()).await;

    let (_bob, mut bob_peer) = place(&hub, "bob", "meadow").await;

    let loaded = bob_peer.next_of("load_online_players").await.unwrap();
    let alice_sprite = loaded["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["user_id"] == "alice")
        .cloned()
        .unwrap();
    assert_eq!(alice_sprite["x"], 7);
    assert_eq!(alice_sprite["y"], 9);
    assert_eq!(alice_sprite["asset_type"], "player_down");
}

#[tokio::test]
async fn test_occupants_receive_joiner_characters() {
    let hub = hub_for(&["alice", "bob"]);
    let (_alice, mut alice_peer) = place(&hub, "alice", "meadow").await;
    let (_bob, _bob_peer) = place(&hub, "bob", "meadow").await;

    let joined = alice_peer.next_of("load_new_online_player").await.unwrap();
    let assets = joined["data"].as_array().unwrap();
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0]["user_id"], "bob");
    assert_eq!(assets[0]["data"][0][0]["color"], "#000000");
}

#[tokio::test]
async fn test_player_without_sprites_is_still_placed() {
    let hub = hub_for(&["alice"]);
    let (_alice, mut alice_peer) = place(&hub, "alice", "meadow").await;
    let (_bob, _bob_peer) = place(&hub, "bob", "meadow").await;

    let joined = alice_peer.next_of("load_new_online_player").await.unwrap();
    assert_eq!(joined["data"], json!([]));
    assert_eq!(hub.players().players_in("meadow").len(), 2);
}

#[tokio::test]
async fn test_store_format_error_aborts_load() {
    let store = MemoryAssetStore::from_assets([sprite("bob")]).unwrap();
    store.insert_encoded(sprite("alice"), b"not pixels".to_vec());
    let hub = hub_with(store);
    let (_bob, mut bob_peer) = place(&hub, "bob", "meadow").await;

    let (alice, alice_peer) = join(&hub, "alice").await;
    alice_peer.send_update(&Player::new("alice", "meadow"));

    assert!(bob_peer.is_silent().await);
    assert!(hub.players().get("meadow", "alice").is_none());
    assert_eq!(alice.map_id(), None);
    assert!(alice.is_open());
}

// =========================================================================
// remove_online_player
// =========================================================================

#[tokio::test]
async fn test_remove_online_player_from_client_notifies_map() {
    let hub = hub_for(&["alice", "bob"]);
    let (alice, alice_peer) = place(&hub, "alice", "meadow").await;
    let (_bob, mut bob_peer) = place(&hub, "bob", "meadow").await;

    alice_peer.send(json!({"id": "r", "function": "remove_online_player", "data": "alice"}));

    let removed = bob_peer.next_of("remove_online_player").await.unwrap();
    assert_eq!(removed["data"], "alice");
    assert_eq!(hub.players().players_in("meadow").len(), 1);
    assert_eq!(alice.map_id(), None);
}

#[tokio::test]
async fn test_remove_online_player_unplaced_is_noop() {
    let hub = hub_for(&["alice"]);
    let (alice, mut alice_peer) = join(&hub, "alice").await;

    router::remove_online_player(&alice, "alice").await;

    assert!(alice_peer.is_silent().await);
    assert!(hub.players().is_empty());
}

// =========================================================================
// chat
// =========================================================================

#[tokio::test]
async fn test_chat_truncated_and_delivered_on_both_channels() {
    let hub = hub_for(&["alice", "bob"]);
    let (_alice, mut alice_world) = place(&hub, "alice", "meadow").await;
    let (_bob, mut bob_world) = place(&hub, "bob", "meadow").await;
    let (_alice_chat, mut alice_chat) = join(&hub, "chat::alice").await;
    let (_bob_chat, mut bob_chat) = join(&hub, "chat::bob").await;

    let long = "a".repeat(60);
    alice_chat.send_chat("alice", "Alice", &long);

    for peer in [&mut alice_chat, &mut bob_chat, &mut alice_world, &mut bob_world] {
        let frame = peer.next_of("chat").await.unwrap();
        let message = frame["data"]["message"].as_str().unwrap();
        assert_eq!(message.chars().count(), 53);
        assert!(message.ends_with("..."));
        assert_eq!(frame["data"]["username"], "Alice");
    }
}

#[tokio::test]
async fn test_chat_stays_within_map() {
    let hub = hub_for(&["alice", "carol"]);
    let (_alice, _alice_world) = place(&hub, "alice", "meadow").await;
    let (_carol, _carol_world) = place(&hub, "carol", "cave").await;
    let (_alice_chat, mut alice_chat) = join(&hub, "chat::alice").await;
    let (_carol_chat, mut carol_chat) = join(&hub, "chat::carol").await;

    alice_chat.send_chat("alice", "Alice", "hi");

    let frame = alice_chat.next_of("chat").await.unwrap();
    assert_eq!(frame["data"]["message"], "hi");
    assert!(carol_chat.is_silent().await);
}

#[tokio::test]
async fn test_chat_from_unplaced_user_dropped() {
    let hub = hub_for(&["alice"]);
    let (_chat, mut chat_peer) = join(&hub, "chat::alice").await;

    chat_peer.send_chat("alice", "Alice", "anyone?");

    assert!(chat_peer.is_silent().await);
}

// =========================================================================
// route
// =========================================================================

#[tokio::test]
async fn test_route_unauthenticated_connection_is_closed() {
    let hub = hub_for(&["alice"]);
    let (channel, peer) = channel_pair();
    let conn = Connection::new(Arc::clone(&hub), Identity::parse("alice").unwrap(), channel);

    let raw = RawDispatch::from_bytes(
        br#"{"id":"1","function":"update_player","data":{"user_id":"alice","map_id":"meadow"}}"#,
    )
    .unwrap();
    router::route(&conn, raw).await;

    assert!(!conn.is_open());
    assert!(peer.is_closed());
    assert!(hub.world().get("alice").is_none());
    assert!(hub.players().is_empty());
}

#[tokio::test]
async fn test_route_mismatched_payload_dropped_connection_survives() {
    let hub = hub_for(&["alice"]);
    let (alice, mut alice_peer) = join(&hub, "alice").await;

    alice_peer.send(json!({"id": "x", "function": "update_player", "data": "nonsense"}));
    alice_peer.send_raw(b"not json at all");

    assert!(alice_peer.is_silent().await);
    assert!(alice.is_open());
    assert!(hub.players().is_empty());
}

#[tokio::test]
async fn test_route_ignores_server_only_functions() {
    let hub = hub_for(&["alice"]);
    let (alice, mut alice_peer) = join(&hub, "alice").await;

    alice_peer.send(json!({"id": "x", "function": "load_online_players", "data": []}));
    alice_peer.send(auth_frame(CLIENT_ID, CLIENT_SECRET));

    assert!(alice_peer.is_silent().await);
    assert!(alice.is_open());
}
