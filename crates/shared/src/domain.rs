use std::fmt;

use chrono::{DateTime, NaiveDateTime};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(HorseId);

/// Highest level a stat bar can show. The bot does not enforce it on the wire.
pub const MAX_STAT_LEVEL: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "male", alias = "муж")]
    Male,
    #[serde(rename = "female", alias = "жен")]
    Female,
}

impl Gender {
    pub fn label(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub username: Option<String>,
    pub gender: Gender,
    pub chibik_name: String,
}

/// Registration number shown on the horse card. The bot stores it as text
/// but older replies carry a plain integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HorseNumber {
    Number(i64),
    Text(String),
}

impl fmt::Display for HorseNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HorseNumber::Number(value) => write!(f, "{value}"),
            HorseNumber::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horse {
    pub id: HorseId,
    /// The bot's column is nullable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<HorseNumber>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default, deserialize_with = "level_or_zero")]
    pub feed_level: i64,
    #[serde(default, deserialize_with = "level_or_zero")]
    pub water_level: i64,
    #[serde(default, deserialize_with = "level_or_zero")]
    pub flower_level: i64,
    /// Epoch milliseconds.
    #[serde(
        default,
        deserialize_with = "timestamp_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated: Option<i64>,
}

impl Horse {
    pub fn level(&self, kind: StatKind) -> i64 {
        match kind {
            StatKind::Feed => self.feed_level,
            StatKind::Water => self.water_level,
            StatKind::Flowers => self.flower_level,
        }
    }

    /// Level clamped to `0..=100` for progress bars.
    pub fn display_percent(&self, kind: StatKind) -> u8 {
        self.level(kind).clamp(0, MAX_STAT_LEVEL) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Feed,
    Water,
    Flowers,
}

impl StatKind {
    pub const ALL: [StatKind; 3] = [StatKind::Feed, StatKind::Water, StatKind::Flowers];

    /// Increment sent by the feed/water/flower buttons.
    pub fn default_increment(self) -> u32 {
        match self {
            StatKind::Feed | StatKind::Water => 10,
            StatKind::Flowers => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StatKind::Feed => "feed",
            StatKind::Water => "water",
            StatKind::Flowers => "flowers",
        }
    }
}

/// Sparse set of stat increments for one horse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flowers: Option<u32>,
}

impl StatDelta {
    pub fn single(kind: StatKind, amount: u32) -> Self {
        let mut delta = Self::default();
        match kind {
            StatKind::Feed => delta.feed = Some(amount),
            StatKind::Water => delta.water = Some(amount),
            StatKind::Flowers => delta.flowers = Some(amount),
        }
        delta
    }

    pub fn is_empty(&self) -> bool {
        self.feed.is_none() && self.water.is_none() && self.flowers.is_none()
    }
}

fn level_or_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(0))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
}

fn timestamp_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawTimestamp>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawTimestamp::Millis(millis)) => Ok(Some(millis)),
        Some(RawTimestamp::Text(text)) => parse_timestamp_text(&text)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("unrecognized timestamp `{text}`"))),
    }
}

/// Parses RFC 3339 or the sqlite `CURRENT_TIMESTAMP` layout (UTC) into epoch ms.
pub fn parse_timestamp_text(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.timestamp_millis());
    }
    const LAYOUTS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];
    LAYOUTS.iter().find_map(|layout| {
        NaiveDateTime::parse_from_str(text, layout)
            .ok()
            .map(|naive| naive.and_utc().timestamp_millis())
    })
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
