//! Protocol handlers.
//!
//! The router is stateless. Given an authenticated connection and a raw
//! envelope it decodes the payload by its function tag, mutates the player
//! registry, and fans envelopes out to the affected connections.
//!
//! Fan-out always follows the same shape: resolve targets (each registry
//! lock is taken and released inside the lookup), then publish to each
//! target one at a time. Peers that are gone are skipped and delivery is
//! best effort; a failed publish never aborts the rest of the fan-out.

use std::sync::Arc;

use mapsync_protocol::{
    CharacterAsset, ChatMessage, Dispatch, Function, Message, Player, RawDispatch,
};
use mapsync_session::Authenticator;
use mapsync_transport::Channel;
use mapsync_world::Transition;
use serde::Serialize;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::hub::Hub;
use crate::store::{AssetStore, StoreError};

/// Longest chat line, in characters, before it is cut.
pub const MAX_CHAT_CHARS: usize = 50;

/// Routes one envelope from `conn`.
///
/// An unauthenticated connection is closed instead. Payloads that don't
/// match their function tag are logged and dropped.
pub async fn route<T, S, A>(conn: &Connection<T, S, A>, raw: RawDispatch)
where
    T: Channel,
    S: AssetStore,
    A: Authenticator,
{
    if !conn.is_authenticated() {
        warn!(identity = %conn.identity(), "unauthenticated connection, closing");
        let _ = conn.close().await;
        return;
    }

    let message = match Message::decode(&raw) {
        Ok(message) => message,
        Err(e) => {
            debug!(
                identity = %conn.identity(),
                function = %raw.function,
                error = %e,
                "dropping payload"
            );
            return;
        }
    };

    match message {
        Message::UpdatePlayer(player) => update_player(conn, player).await,
        Message::RemoveOnlinePlayer(user_id) => remove_online_player(conn, &user_id).await,
        Message::LoadNewOnlinePlayer(player) => load_new_online_player(conn, player).await,
        Message::Chat(chat) => self::chat(conn, chat).await,
        Message::Authenticate(_) | Message::LoadOnlinePlayers(_) => {
            debug!(
                identity = %conn.identity(),
                function = %raw.function,
                "ignoring function not accepted from clients"
            );
        }
    }
}

/// `update_player`: drives the sender through the membership state
/// machine.
///
/// - same map: replace and broadcast to the other occupants
/// - new map: leave the old one (if any), then load into the new one
/// - empty map id: leave the current map
pub async fn update_player<T, S, A>(conn: &Connection<T, S, A>, player: Player)
where
    T: Channel,
    S: AssetStore,
    A: Authenticator,
{
    let transition = conn.membership().update(&player.map_id);

    if let Transition::Stay { map } = &transition {
        let hub = conn.hub();
        hub.players().set(player.clone());

        let peers = hub
            .players()
            .players_in(map)
            .into_iter()
            .filter(|p| p.user_id != player.user_id);
        for target in world_connections(hub, peers) {
            send(&target, Function::UpdatePlayer, &player).await;
        }
        return;
    }

    if let Some(from) = transition.leaving() {
        debug!(identity = %conn.identity(), %from, "leaving map");
        remove_online_player(conn, &player.user_id).await;
    }
    match transition.entering() {
        Some(to) => {
            debug!(identity = %conn.identity(), %to, "entering map");
            load_new_online_player(conn, player).await;
        }
        None if transition == Transition::Idle => {
            debug!(identity = %conn.identity(), "update without a map for unplaced player");
        }
        None => {}
    }
}

/// `remove_online_player`: deletes `user_id` from the sender's recorded map
/// and tells the remaining occupants.
///
/// Also called when a world connection closes.
pub async fn remove_online_player<T, S, A>(conn: &Connection<T, S, A>, user_id: &str)
where
    T: Channel,
    S: AssetStore,
    A: Authenticator,
{
    let hub = conn.hub();
    let recorded = conn.map_id();

    let removed = recorded
        .as_deref()
        .and_then(|map| hub.players().remove(map, user_id))
        .or_else(|| hub.players().remove_everywhere(user_id));

    let Some(map) = recorded.or_else(|| removed.map(|p| p.map_id)) else {
        debug!(%user_id, "player was not placed, nothing to remove");
        return;
    };
    if user_id == conn.identity().key() {
        conn.set_map_id(None);
    }

    let payload = user_id.to_owned();
    for target in world_connections(hub, hub.players().players_in(&map)) {
        send(&target, Function::RemoveOnlinePlayer, &payload).await;
    }
}

/// `load_new_online_player`: places `player` on their map.
///
/// 1. Fetch the joiner's character assets.
/// 2. Send them to everyone already on the map.
/// 3. Insert the joiner and record the map on the sender.
/// 4. If the map wasn't empty, send the joiner every occupant's assets
///    with live positions.
///
/// A store failure aborts the remaining steps. Frames already published
/// stay published.
pub async fn load_new_online_player<T, S, A>(conn: &Connection<T, S, A>, player: Player)
where
    T: Channel,
    S: AssetStore,
    A: Authenticator,
{
    let hub = conn.hub();

    let characters = match fetch_characters(hub, &[player.user_id.clone()]).await {
        Ok(characters) => characters,
        Err(e) => {
            warn!(user_id = %player.user_id, error = %e, "could not load joiner's characters");
            return;
        }
    };

    let occupants: Vec<Player> = hub
        .players()
        .players_in(&player.map_id)
        .into_iter()
        .filter(|p| p.user_id != player.user_id)
        .collect();
    for target in world_connections(hub, occupants.iter().cloned()) {
        send(&target, Function::LoadNewOnlinePlayer, &characters).await;
    }

    let map_id = player.map_id.clone();
    let user_id = player.user_id.clone();
    hub.players().set(player);
    conn.set_map_id(Some(map_id.clone()));
    debug!(%user_id, map_id = %map_id, occupants = occupants.len(), "player entered map");

    if occupants.is_empty() {
        return;
    }

    let mut ids: Vec<String> = occupants.into_iter().map(|p| p.user_id).collect();
    ids.push(user_id);
    let mut everyone = match fetch_characters(hub, &ids).await {
        Ok(assets) => assets,
        Err(e) => {
            warn!(map_id = %map_id, error = %e, "could not load occupants' characters");
            return;
        }
    };
    for asset in &mut everyone {
        if let Some(live) = hub.players().get(&map_id, &asset.user_id) {
            asset.x = live.pos.x;
            asset.y = live.pos.y;
        }
    }

    send(conn, Function::LoadOnlinePlayers, &everyone).await;
}

/// `chat`: truncates the line and delivers it to every occupant of the
/// sender's map on both their chat and world channels. The sender is an
/// occupant, so they get their own line back.
pub async fn chat<T, S, A>(conn: &Connection<T, S, A>, chat: ChatMessage)
where
    T: Channel,
    S: AssetStore,
    A: Authenticator,
{
    let hub = conn.hub();
    let Some(occupants) = hub.players().occupants_with(&chat.user_id) else {
        debug!(user_id = %chat.user_id, "chat from unplaced user dropped");
        return;
    };

    let line = ChatMessage {
        message: truncate_message(&chat.message),
        ..chat
    };

    let targets: Vec<_> = occupants
        .iter()
        .flat_map(|p| [hub.chat().get(&p.user_id), hub.world().get(&p.user_id)])
        .flatten()
        .collect();
    for target in targets {
        send(&target, Function::Chat, &line).await;
    }
}

/// Cuts `message` to [`MAX_CHAT_CHARS`] characters plus `"..."` when it is
/// longer; shorter lines are returned unchanged.
pub fn truncate_message(message: &str) -> String {
    match message.char_indices().nth(MAX_CHAT_CHARS) {
        Some((cut, _)) => format!("{}...", &message[..cut]),
        None => message.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Store lookup where "nobody has sprites" is an empty result rather than
/// a failure.
async fn fetch_characters<T, S: AssetStore, A>(
    hub: &Hub<T, S, A>,
    user_ids: &[String],
) -> Result<Vec<CharacterAsset>, StoreError> {
    match hub.store().player_characters(user_ids).await {
        Err(StoreError::NotFound(who)) => {
            debug!(%who, "no character assets");
            Ok(Vec::new())
        }
        other => other,
    }
}

/// Live world connections for `players`, resolved before any publishing.
fn world_connections<T, S, A>(
    hub: &Hub<T, S, A>,
    players: impl IntoIterator<Item = Player>,
) -> Vec<Arc<Connection<T, S, A>>> {
    players
        .into_iter()
        .filter_map(|p| hub.world().get(&p.user_id))
        .collect()
}

async fn send<T, S, A, P>(target: &Connection<T, S, A>, function: Function, data: &P) -> bool
where
    T: Channel,
    S: AssetStore,
    A: Authenticator,
    P: Serialize + ?Sized,
{
    target.publish_dispatch(&Dispatch::server(function, data)).await
}
