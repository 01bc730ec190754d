//! The player registry: map id → user id → live [`Player`].
//!
//! This is the single source of truth for "who is on which map, where". It
//! is shared by every connection task, so all access goes through one
//! mutex. Reads hand back owned clones; nothing here is ever held across
//! an await.
//!
//! # Invariant
//!
//! A user id appears under at most one map at any instant. [`set`] enforces
//! it by removing the user from every other map in the same critical
//! section that inserts them, so two racing updates for the same user can
//! never leave them visible in two maps.
//!
//! [`set`]: PlayerRegistry::set

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use mapsync_protocol::Player;

type Maps = HashMap<String, HashMap<String, Player>>;

/// Concurrency-safe two-level directory of live players.
#[derive(Default)]
pub struct PlayerRegistry {
    maps: Mutex<Maps>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Maps> {
        self.maps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every player currently on `map_id` (empty if the map is unknown).
    pub fn players_in(&self, map_id: &str) -> Vec<Player> {
        self.lock()
            .get(map_id)
            .map(|players| players.values().cloned().collect())
            .unwrap_or_default()
    }

    /// One player by `(map, user)`.
    pub fn get(&self, map_id: &str, user_id: &str) -> Option<Player> {
        self.lock().get(map_id)?.get(user_id).cloned()
    }

    /// Reverse lookup: the full occupant set of whichever map holds
    /// `user_id`, the user included.
    ///
    /// Linear in the number of maps.
    pub fn occupants_with(&self, user_id: &str) -> Option<Vec<Player>> {
        self.lock()
            .values()
            .find(|players| players.contains_key(user_id))
            .map(|players| players.values().cloned().collect())
    }

    /// Inserts or replaces `player` under `player.map_id`.
    ///
    /// Any entry for the same user on a different map is removed first.
    /// Returns the id of that other map, if there was one.
    pub fn set(&self, player: Player) -> Option<String> {
        let mut maps = self.lock();

        let displaced = maps
            .iter()
            .find(|(map_id, players)| {
                **map_id != player.map_id && players.contains_key(&player.user_id)
            })
            .map(|(map_id, _)| map_id.clone());

        if let Some(old) = &displaced {
            remove_locked(&mut maps, old, &player.user_id);
            tracing::debug!(
                user_id = %player.user_id,
                from = %old,
                to = %player.map_id,
                "player moved between maps"
            );
        }

        maps.entry(player.map_id.clone())
            .or_default()
            .insert(player.user_id.clone(), player);
        displaced
    }

    /// Removes `user_id` from `map_id`. Returns the removed entry.
    pub fn remove(&self, map_id: &str, user_id: &str) -> Option<Player> {
        remove_locked(&mut self.lock(), map_id, user_id)
    }

    /// Removes `user_id` from whatever map holds them.
    pub fn remove_everywhere(&self, user_id: &str) -> Option<Player> {
        let mut maps = self.lock();
        let map_id = maps
            .iter()
            .find(|(_, players)| players.contains_key(user_id))
            .map(|(map_id, _)| map_id.clone())?;
        remove_locked(&mut maps, &map_id, user_id)
    }

    /// Total number of placed players across all maps.
    pub fn len(&self) -> usize {
        self.lock().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Empty maps are pruned so reverse lookups only scan occupied maps.
fn remove_locked(maps: &mut Maps, map_id: &str, user_id: &str) -> Option<Player> {
    let players = maps.get_mut(map_id)?;
    let removed = players.remove(user_id);
    if players.is_empty() {
        maps.remove(map_id);
    }
    removed
}
