//! Raw platform payload decoding.
//!
//! The live platform is loose about shapes: ids arrive as numbers or strings,
//! avatars as strings or `{url: [...]}` / `{urlList: [...]}` objects, and
//! score entries as maps or arrays. Everything here is lenient; only a payload
//! that is not an object at all, or whose score items are neither a map nor an
//! array, is reported as malformed.

use serde_json::{Map, Value};

use crate::error::BattleError;
use crate::event::{ArmyEntry, BattleStatus, LiveEvent, ScoreBoard};
use crate::state::participant::ParticipantInfo;

pub const KIND_CONNECTED: &str = "connected";
pub const KIND_DISCONNECTED: &str = "disconnected";
pub const KIND_ERROR: &str = "error";
pub const KIND_BATTLE: &str = "linkMicBattle";
pub const KIND_ARMIES: &str = "linkMicArmies";
pub const KIND_METHOD: &str = "linkMicMethod";
pub const KIND_PUNISH_FINISH: &str = "linkMicBattlePunishFinish";

/// Decode a raw notification.
///
/// Returns `Ok(None)` for kinds the engine does not consume (gifts, chat...).
pub fn decode(kind: &str, payload: &Value) -> Result<Option<LiveEvent>, BattleError> {
    let event = match kind {
        KIND_CONNECTED => LiveEvent::Connected {
            room_id: payload.get("roomId").and_then(lenient_string),
        },
        KIND_DISCONNECTED => LiveEvent::Disconnected,
        KIND_ERROR => LiveEvent::Error {
            message: payload
                .get("message")
                .and_then(lenient_string)
                .or_else(|| lenient_string(payload))
                .unwrap_or_else(|| "unknown error".to_string()),
        },
        KIND_BATTLE => decode_battle(object(kind, payload)?),
        KIND_ARMIES => decode_armies(object(kind, payload)?)?,
        KIND_METHOD => decode_method(object(kind, payload)?),
        KIND_PUNISH_FINISH => LiveEvent::PunishFinished {
            battle_id: object(kind, payload)?
                .get("battleId")
                .and_then(lenient_string)
                .unwrap_or_default(),
        },
        _ => return Ok(None),
    };
    Ok(Some(event))
}

fn object<'a>(kind: &str, payload: &'a Value) -> Result<&'a Map<String, Value>, BattleError> {
    payload
        .as_object()
        .ok_or_else(|| BattleError::malformed(kind, "payload is not an object"))
}

fn decode_battle(data: &Map<String, Value>) -> LiveEvent {
    let participants = data
        .get("anchorInfo")
        .and_then(Value::as_object)
        .and_then(participants_from_anchor_info)
        .or_else(|| {
            data.get("battleUsers")
                .and_then(Value::as_array)
                .and_then(|users| participants_from_users(users))
        })
        .unwrap_or_default();

    LiveEvent::BattleStarted {
        battle_id: data.get("battleId").and_then(lenient_string).unwrap_or_default(),
        participants,
    }
}

fn participants_from_anchor_info(info: &Map<String, Value>) -> Option<[ParticipantInfo; 2]> {
    let mut anchors = info.iter();
    let (key_a, a) = anchors.next()?;
    let (key_b, b) = anchors.next()?;
    Some([anchor_participant(a, key_a), anchor_participant(b, key_b)])
}

fn anchor_participant(anchor: &Value, key: &str) -> ParticipantInfo {
    if let Some(user) = anchor.get("user").filter(|u| u.is_object()) {
        let unique_id = first_string(user, &["displayId", "uniqueId"]).unwrap_or_default();
        return ParticipantInfo {
            anchor_id: first_string(user, &["userId"]).unwrap_or_else(|| key.to_string()),
            nickname: first_string(user, &["nickName", "nickname", "displayId"])
                .unwrap_or_default(),
            unique_id,
            avatar_url: avatar_of(user, &["avatarThumb", "profilePicture"]).unwrap_or_default(),
        };
    }

    ParticipantInfo {
        anchor_id: key.to_string(),
        unique_id: first_string(anchor, &["uniqueId", "displayId"]).unwrap_or_default(),
        nickname: first_string(anchor, &["nickname", "nickName", "uniqueId"]).unwrap_or_default(),
        avatar_url: avatar_of(anchor, &["profilePictureUrl", "avatarThumb", "profilePicture"])
            .unwrap_or_default(),
    }
}

fn participants_from_users(users: &[Value]) -> Option<[ParticipantInfo; 2]> {
    match users {
        [a, b, ..] => Some([user_participant(a), user_participant(b)]),
        _ => None,
    }
}

fn user_participant(user: &Value) -> ParticipantInfo {
    ParticipantInfo {
        anchor_id: first_string(user, &["uniqueId", "userId"]).unwrap_or_default(),
        unique_id: first_string(user, &["uniqueId", "displayId"]).unwrap_or_default(),
        nickname: first_string(user, &["nickname", "nickName", "uniqueId"]).unwrap_or_default(),
        avatar_url: avatar_of(user, &["profilePictureUrl", "avatarThumb"]).unwrap_or_default(),
    }
}

fn decode_armies(data: &Map<String, Value>) -> Result<LiveEvent, BattleError> {
    let status = BattleStatus::from_code(data.get("battleStatus").and_then(lenient_i64).unwrap_or(0));

    let board = match data.get("battleItems") {
        None | Some(Value::Null) => ScoreBoard::Keyed(Vec::new()),
        Some(Value::Object(items)) => ScoreBoard::Keyed(
            items
                .iter()
                .map(|(key, item)| (key.clone(), army_entry(item)))
                .collect(),
        ),
        Some(Value::Array(items)) => ScoreBoard::Positional(items.iter().map(army_entry).collect()),
        Some(_) => {
            return Err(BattleError::malformed(
                KIND_ARMIES,
                "battleItems is neither a map nor an array",
            ))
        }
    };

    Ok(LiveEvent::ScoreUpdate { board, status })
}

fn army_entry(item: &Value) -> ArmyEntry {
    let avatar_url = item
        .get("userArmy")
        .and_then(Value::as_array)
        .and_then(|army| army.first())
        .and_then(|top| top.get("avatarThumb"))
        .and_then(extract_avatar_url);

    ArmyEntry {
        anchor_id: item.get("anchorIdStr").and_then(lenient_string),
        points: extract_points(item),
        avatar_url,
    }
}

fn decode_method(data: &Map<String, Value>) -> LiveEvent {
    let id = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| data.get(*k).and_then(lenient_string))
            .unwrap_or_else(|| "0".to_string())
    };

    LiveEvent::RoundWinAnnounced {
        win: data.get("win").map(lenient_bool).unwrap_or(false),
        winner_id: id(&["userId", "anchorLinkmicId"]),
        rival_id: id(&["rivalAnchorId"]),
    }
}

/// Points for one score entry.
///
/// Tried in order: `hostScore`, the sum of `userArmy[].score`, the sum of
/// `battleGroups[].points`, then plain `points` or `score`. The first positive
/// value wins.
pub fn extract_points(item: &Value) -> u64 {
    if let Some(host) = item.get("hostScore").and_then(lenient_i64).filter(|s| *s > 0) {
        return host as u64;
    }

    let sum = |list: &str, field: &str| -> i64 {
        item.get(list)
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| e.get(field).and_then(lenient_i64))
                    .fold(0i64, i64::saturating_add)
            })
            .unwrap_or(0)
    };

    let army = sum("userArmy", "score");
    if army > 0 {
        return army as u64;
    }
    let groups = sum("battleGroups", "points");
    if groups > 0 {
        return groups as u64;
    }

    ["points", "score"]
        .iter()
        .find_map(|k| item.get(*k).and_then(lenient_i64).filter(|v| *v != 0))
        .map_or(0, |v| v.max(0) as u64)
}

/// Avatar URL from a string or an image object with `url` / `urlList`.
pub fn extract_avatar_url(image: &Value) -> Option<String> {
    match image {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(obj) => ["url", "urlList"].iter().find_map(|k| {
            obj.get(*k)
                .and_then(Value::as_array)
                .and_then(|urls| urls.first())
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }),
        _ => None,
    }
}

fn avatar_of(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(extract_avatar_url))
}

fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| value.get(*k).and_then(lenient_string))
}

/// Non-empty string, or a number rendered as one.
fn lenient_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}
