use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::vec3::Vec3;

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

// === Server -> Client ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(tag = "type")]
pub enum ServerMsg {
    #[serde(rename = "currentPlayers")]
    CurrentPlayers(CurrentPlayersMsg),
    #[serde(rename = "newPlayer")]
    NewPlayer(PlayerWire),
    #[serde(rename = "playerMoved")]
    PlayerMoved(PlayerMovedMsg),
    #[serde(rename = "playerDisconnected")]
    PlayerDisconnected(PlayerDisconnectedMsg),
    #[serde(rename = "stateSnapshot")]
    StateSnapshot(StateSnapshotMsg),
    #[serde(rename = "error")]
    Error(ErrorMsg),
}

/// Sent once to a connection right after it joins. Includes the joiner itself.
/// JSON object keys are strings, so players are keyed by the id's decimal form.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct CurrentPlayersMsg {
    pub protocol_version: u32,
    pub self_id: u32,
    pub players: BTreeMap<String, PlayerWire>,
}

/// Public view of a player.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct PlayerWire {
    pub id: u32,
    pub nickname: String,
    pub character_type: u32,
    pub position: Vec3,
    /// Only `y` (yaw) is tracked; `x` and `z` are always 0.
    pub rotation: Vec3,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct PlayerMovedMsg {
    pub id: u32,
    pub position: Vec3,
    pub rotation: Vec3,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct PlayerDisconnectedMsg {
    pub id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct StateSnapshotMsg {
    pub players: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub id: u32,
    pub nickname: String,
    pub character_type: u32,
    pub position: Vec3,
    pub rotation: Vec3,
    /// Unix time of the last accepted update, in milliseconds
    #[ts(type = "number")]
    pub last_update: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct ErrorMsg {
    pub message: String,
}

// === Client -> Server ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(tag = "type")]
pub enum ClientMsg {
    #[serde(rename = "join")]
    Join(JoinMsg),
    #[serde(rename = "playerMove")]
    PlayerMove(PlayerMoveMsg),
    /// Keeps an idle player from being evicted
    #[serde(rename = "heartbeat")]
    Heartbeat,
}

/// Join request. Fields of the wrong JSON type decode as `None` so the server
/// can answer with a proper error instead of dropping the frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct JoinMsg {
    #[serde(default, deserialize_with = "lenient_string")]
    #[ts(type = "string | null")]
    pub nickname: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    #[ts(type = "number | null")]
    pub character_type: Option<i64>,
}

/// Reported transform. Missing or non-numeric fields decode as `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct PlayerMoveMsg {
    #[serde(default, deserialize_with = "lenient_f64")]
    #[ts(type = "number | null")]
    pub x: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    #[ts(type = "number | null")]
    pub y: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    #[ts(type = "number | null")]
    pub z: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    #[ts(type = "number | null")]
    pub ry: Option<f64>,
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(value.as_f64().filter(|v| v.is_finite()))
}

fn lenient_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            .map(|v| v as i64)
    }))
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

// === Conversion helpers ===

/// Round to 4 decimal places (sub-millimetre at world scale, keeps JSON small)
#[inline]
pub fn round4(v: f64) -> f64 {
    (v * 10000.0).round() / 10000.0
}

/// Wire form of a yaw-only rotation.
pub fn yaw_rotation(yaw: f64) -> Vec3 {
    Vec3::new(0.0, round4(yaw), 0.0)
}

/// Wire form of a position.
pub fn wire_position(p: Vec3) -> Vec3 {
    Vec3::new(round4(p.x), round4(p.y), round4(p.z))
}
