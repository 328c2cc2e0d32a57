pub use plaza_shared::protocol::*;

use crate::player::Player;

impl From<&Player> for PlayerWire {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            nickname: player.nickname.clone(),
            character_type: player.character_type,
            position: wire_position(player.position),
            rotation: yaw_rotation(player.rotation),
        }
    }
}

impl From<&Player> for PlayerMovedMsg {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            position: wire_position(player.position),
            rotation: yaw_rotation(player.rotation),
        }
    }
}

/// Snapshot row for `player`; `last_update` is the Unix-millisecond form of
/// its last update.
pub fn snapshot_entry(player: &Player, last_update: u64) -> SnapshotEntry {
    SnapshotEntry {
        id: player.id,
        nickname: player.nickname.clone(),
        character_type: player.character_type,
        position: wire_position(player.position),
        rotation: yaw_rotation(player.rotation),
        last_update,
    }
}

/// Serialize a server message to a JSON text frame.
pub fn encode(msg: &ServerMsg) -> Option<String> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!("Failed to encode server message: {}", e);
            None
        }
    }
}
