use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{Horse, HorseId, StatDelta, UserProfile};

/// Prefix marking a bot chat message that carries a JSON envelope.
pub const DEFAULT_REPLY_PREFIX: &str = "HORSE_CARE_DATA:";

/// Local cache key, shared with the web front-end's storage record.
pub const SNAPSHOT_CACHE_KEY: &str = "horseCareState";

/// Records sent to the bot through the host's one-way channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundAction {
    GetUserData {
        timestamp: i64,
    },
    UpdateHorseStats {
        horse_id: HorseId,
        #[serde(flatten)]
        delta: StatDelta,
    },
    DeleteHorseRequest {
        horse_id: HorseId,
    },
}

impl OutboundAction {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundAction::GetUserData { .. } => "get_user_data",
            OutboundAction::UpdateHorseStats { .. } => "update_horse_stats",
            OutboundAction::DeleteHorseRequest { .. } => "delete_horse_request",
        }
    }
}

/// What the host hands to the front-end.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundPayload {
    /// Object delivered directly by the platform.
    Structured(serde_json::Value),
    /// Chat message text posted by the bot.
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDataPayload {
    pub user: UserProfile,
    #[serde(default, deserialize_with = "horses_or_empty")]
    pub horses: Vec<Horse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BotEnvelope {
    UserData(UserDataPayload),
}

impl BotEnvelope {
    /// Renders the chat message the bot would post for this envelope.
    pub fn to_reply_text(&self, prefix: &str) -> serde_json::Result<String> {
        Ok(format!("{prefix}{}", serde_json::to_string(self)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSnapshotRecord {
    #[serde(rename = "userData")]
    pub user_data: UserProfile,
    #[serde(default, deserialize_with = "horses_or_empty")]
    pub horses: Vec<Horse>,
    /// Epoch milliseconds at which the record was written.
    pub timestamp: i64,
}

/// The bot writes `null` for a user without horses.
fn horses_or_empty<'de, D>(deserializer: D) -> Result<Vec<Horse>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Horse>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
