//! Integration tests for the player registry driven by membership
//! transitions, the way the router drives it.

use std::sync::Arc;

use mapsync_protocol::{Player, Position};
use mapsync_world::{Membership, PlayerRegistry, Transition};

/// Applies one update the way a router does: consult the recorded
/// membership, mutate the registry, return the new membership.
fn apply(reg: &PlayerRegistry, current: &Membership, player: Player) -> Membership {
    match current.update(&player.map_id) {
        Transition::Idle => Membership::Unplaced,
        Transition::Leave { from } => {
            reg.remove(&from, &player.user_id);
            Membership::Unplaced
        }
        Transition::Stay { .. } | Transition::Enter { .. } => {
            let map = player.map_id.clone();
            reg.set(player);
            Membership::InMap(map)
        }
        Transition::Switch { from, to } => {
            reg.remove(&from, &player.user_id);
            reg.set(player);
            Membership::InMap(to)
        }
    }
}

#[test]
fn test_a_b_a_leaves_user_in_last_map_only() {
    let reg = PlayerRegistry::new();
    let mut state = Membership::Unplaced;

    for map in ["A", "B", "A"] {
        state = apply(&reg, &state, Player::new("u1", map));
    }

    assert_eq!(state, Membership::InMap("A".into()));
    assert!(reg.get("A", "u1").is_some());
    assert!(reg.get("B", "u1").is_none());
    assert_eq!(reg.len(), 1);
}

#[test]
fn test_switch_never_visible_in_both_maps() {
    let reg = PlayerRegistry::new();
    let mut state = Membership::Unplaced;
    state = apply(&reg, &state, Player::new("u1", "meadow"));
    state = apply(&reg, &state, Player::new("u1", "cave").at(Position::new(2, 2, 0)));

    assert_eq!(state.map_id(), Some("cave"));
    assert!(reg.players_in("meadow").is_empty());
    assert_eq!(reg.players_in("cave").len(), 1);
}

#[test]
fn test_racing_updates_keep_at_most_one_map() {
    let reg = Arc::new(PlayerRegistry::new());
    let maps = ["meadow", "cave", "beach", "forest"];

    let handles: Vec<_> = maps
        .iter()
        .map(|map| {
            let reg = Arc::clone(&reg);
            let map = map.to_string();
            std::thread::spawn(move || {
                for i in 0..200 {
                    reg.set(Player::new("racer", map.clone()).at(Position::new(i, 0, 0)));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let present = maps
        .iter()
        .filter(|m| reg.get(m, "racer").is_some())
        .count();
    assert_eq!(present, 1, "racer must be on exactly one map");
    assert_eq!(reg.len(), 1);
}
