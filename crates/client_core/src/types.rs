use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use shared::{
    domain::{Horse, HorseId, UserProfile},
    error::UserFacingError,
    protocol::{CachedSnapshotRecord, UserDataPayload, DEFAULT_REPLY_PREFIX, SNAPSHOT_CACHE_KEY},
};

pub const DEFAULT_REFETCH_DELAY: Duration = Duration::from_millis(1500);
pub const DEFAULT_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Complete client-side view of one user and their horses.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub user: UserProfile,
    pub horses: Vec<Horse>,
    pub captured_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn from_payload(payload: UserDataPayload, captured_at: DateTime<Utc>) -> Self {
        Self {
            user: payload.user,
            horses: payload.horses,
            captured_at,
        }
    }

    pub fn from_cache_record(record: CachedSnapshotRecord) -> Option<Self> {
        let captured_at = DateTime::<Utc>::from_timestamp_millis(record.timestamp)?;
        Some(Self {
            user: record.user_data,
            horses: record.horses,
            captured_at,
        })
    }

    /// `timestamp` is the capture time, not the write time.
    pub fn to_cache_record(&self) -> CachedSnapshotRecord {
        CachedSnapshotRecord {
            user_data: self.user.clone(),
            horses: self.horses.clone(),
            timestamp: self.captured_at.timestamp_millis(),
        }
    }

    pub fn horse(&self, horse_id: HorseId) -> Option<&Horse> {
        self.horses.iter().find(|horse| horse.id == horse_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerMode {
    Idle,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    ModeChanged(ControllerMode),
    SnapshotReplaced(Arc<SessionSnapshot>),
    Error(UserFacingError),
    Notice(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Applied,
    /// Chat text without the reply prefix, or a payload arriving after teardown.
    Ignored,
    Rejected(UserFacingError),
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub reply_prefix: String,
    pub refetch_delay: Duration,
    pub snapshot_timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_key: String,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            reply_prefix: DEFAULT_REPLY_PREFIX.to_string(),
            refetch_delay: DEFAULT_REFETCH_DELAY,
            snapshot_timeout: DEFAULT_SNAPSHOT_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_key: SNAPSHOT_CACHE_KEY.to_string(),
        }
    }
}

/// What the host reports about the environment the front-end was opened in.
#[derive(Debug, Clone, Default)]
pub struct LaunchContext {
    pub platform: String,
    /// Data object handed over by the platform at launch, if any.
    pub handoff: Option<serde_json::Value>,
}
