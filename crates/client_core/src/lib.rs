use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{HorseId, StatDelta, StatKind},
    error::UserFacingError,
    protocol::{CachedSnapshotRecord, InboundPayload, OutboundAction},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub mod decode;
pub mod error;
pub mod transport;
pub mod types;

pub use error::{DecodeError, SessionError};
pub use transport::WebSocketHostChannel;
pub use types::{
    ControllerEvent, ControllerMode, ControllerSettings, IngestOutcome, LaunchContext,
    SessionSnapshot,
};

use decode::decode_inbound;

const DELETE_CONFIRMATION_PROMPT: &str = "Are you sure you want to delete this horse?";
const EVENT_BUFFER: usize = 256;

/// The embedding platform's message plumbing towards the companion bot.
#[async_trait]
pub trait HostChannel: Send + Sync {
    /// Fire-and-forget; success only means the host accepted the message.
    async fn send(&self, message: String) -> Result<()>;
    fn subscribe(&self) -> broadcast::Receiver<InboundPayload>;
    fn launch_context(&self) -> Result<LaunchContext>;
}

pub struct MissingHostChannel {
    inbound: broadcast::Sender<InboundPayload>,
}

impl MissingHostChannel {
    pub fn new() -> Self {
        let (inbound, _) = broadcast::channel(1);
        Self { inbound }
    }
}

impl Default for MissingHostChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostChannel for MissingHostChannel {
    async fn send(&self, _message: String) -> Result<()> {
        Err(anyhow!("host channel is unavailable"))
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundPayload> {
        self.inbound.subscribe()
    }

    fn launch_context(&self) -> Result<LaunchContext> {
        Err(anyhow!("not launched inside the chat platform"))
    }
}

#[async_trait]
pub trait ConfirmationPrompt: Send + Sync {
    async fn confirm(&self, prompt: &str) -> Result<bool>;
}

pub struct MissingConfirmationPrompt;

#[async_trait]
impl ConfirmationPrompt for MissingConfirmationPrompt {
    async fn confirm(&self, _prompt: &str) -> Result<bool> {
        Err(anyhow!("confirmation dialog is unavailable"))
    }
}

#[async_trait]
pub trait SnapshotCache: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<CachedSnapshotRecord>>;
    async fn store(&self, key: &str, record: &CachedSnapshotRecord) -> Result<()>;
}

pub struct DisabledSnapshotCache;

#[async_trait]
impl SnapshotCache for DisabledSnapshotCache {
    async fn load(&self, _key: &str) -> Result<Option<CachedSnapshotRecord>> {
        Ok(None)
    }

    async fn store(&self, _key: &str, _record: &CachedSnapshotRecord) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl SnapshotCache for storage::Storage {
    async fn load(&self, key: &str) -> Result<Option<CachedSnapshotRecord>> {
        self.load_snapshot_record(key).await
    }

    async fn store(&self, key: &str, record: &CachedSnapshotRecord) -> Result<()> {
        self.save_snapshot_record(key, record).await
    }
}

pub struct SessionController {
    host: Arc<dyn HostChannel>,
    confirmer: Arc<dyn ConfirmationPrompt>,
    cache: Arc<dyn SnapshotCache>,
    settings: ControllerSettings,
    inner: Mutex<ControllerState>,
    closed: AtomicBool,
    inbound_task: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<ControllerEvent>,
}

struct ControllerState {
    mode: ControllerMode,
    snapshot: Option<Arc<SessionSnapshot>>,
    last_error: Option<UserFacingError>,
    request_seq: u64,
}

impl SessionController {
    pub fn new(host: Arc<dyn HostChannel>) -> Arc<Self> {
        Self::new_with_dependencies(
            host,
            Arc::new(MissingConfirmationPrompt),
            Arc::new(DisabledSnapshotCache),
            ControllerSettings::default(),
        )
    }

    pub fn new_with_dependencies(
        host: Arc<dyn HostChannel>,
        confirmer: Arc<dyn ConfirmationPrompt>,
        cache: Arc<dyn SnapshotCache>,
        settings: ControllerSettings,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Arc::new(Self {
            host,
            confirmer,
            cache,
            settings,
            inner: Mutex::new(ControllerState {
                mode: ControllerMode::Idle,
                snapshot: None,
                last_error: None,
                request_seq: 0,
            }),
            closed: AtomicBool::new(false),
            inbound_task: Mutex::new(None),
            events,
        })
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn mode(&self) -> ControllerMode {
        self.inner.lock().await.mode
    }

    pub async fn snapshot(&self) -> Option<Arc<SessionSnapshot>> {
        self.inner.lock().await.snapshot.clone()
    }

    pub async fn last_error(&self) -> Option<UserFacingError> {
        self.inner.lock().await.last_error.clone()
    }

    pub async fn start(self: &Arc<Self>) -> Result<(), SessionError> {
        self.ensure_open()?;
        let context = match self.host.launch_context() {
            Ok(context) => context,
            Err(err) => {
                let err = SessionError::HostUnavailable(format!("{err:#}"));
                self.enter_error(&err).await;
                return Err(err);
            }
        };
        info!(platform = %context.platform, "session: attached to host");

        // Cached data must land before any live reply can.
        self.restore_cached_snapshot().await;
        self.spawn_inbound_pump().await;
        if let Some(handoff) = context.handoff {
            self.ingest(InboundPayload::Structured(handoff)).await;
        }
        self.request_snapshot().await
    }

    pub async fn request_snapshot(self: &Arc<Self>) -> Result<(), SessionError> {
        self.ensure_open()?;
        let seq = {
            let mut guard = self.inner.lock().await;
            guard.request_seq += 1;
            guard.mode = ControllerMode::Loading;
            guard.request_seq
        };
        let _ = self
            .events
            .send(ControllerEvent::ModeChanged(ControllerMode::Loading));

        let action = OutboundAction::GetUserData {
            timestamp: Utc::now().timestamp_millis(),
        };
        if let Err(err) = self.send_action(&action).await {
            self.enter_error(&err).await;
            return Err(err);
        }
        self.schedule_timeout(seq);
        Ok(())
    }

    pub async fn ingest(&self, payload: InboundPayload) -> IngestOutcome {
        if self.is_closed() {
            debug!("session: dropping inbound payload after teardown");
            return IngestOutcome::Ignored;
        }
        match decode_inbound(&payload, &self.settings.reply_prefix) {
            Ok(Some(data)) => {
                let snapshot = self
                    .replace_snapshot(SessionSnapshot::from_payload(data, Utc::now()))
                    .await;
                info!(horses = snapshot.horses.len(), "session: snapshot replaced");
                IngestOutcome::Applied
            }
            Ok(None) => {
                debug!("session: ignoring chat text without reply prefix");
                IngestOutcome::Ignored
            }
            Err(err) => {
                let err = SessionError::from(err);
                self.enter_error(&err).await;
                IngestOutcome::Rejected(err.to_user_facing())
            }
        }
    }

    pub async fn request_mutation(
        self: &Arc<Self>,
        horse_id: HorseId,
        delta: StatDelta,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        if delta.is_empty() {
            let err = SessionError::InvalidRequest(format!(
                "stat update for horse {horse_id} names no stat"
            ));
            self.surface_local_error(&err);
            return Err(err);
        }

        let action = OutboundAction::UpdateHorseStats { horse_id, delta };
        if let Err(err) = self.send_action(&action).await {
            self.surface_local_error(&err);
            return Err(err);
        }
        info!(horse_id = horse_id.0, ?delta, "session: stat update requested");
        let _ = self
            .events
            .send(ControllerEvent::Notice(mutation_notice(&delta).to_string()));
        self.schedule_refresh();
        Ok(())
    }

    pub async fn apply_default_increment(
        self: &Arc<Self>,
        horse_id: HorseId,
        kind: StatKind,
    ) -> Result<(), SessionError> {
        self.request_mutation(horse_id, StatDelta::single(kind, kind.default_increment()))
            .await
    }

    pub async fn feed(self: &Arc<Self>, horse_id: HorseId) -> Result<(), SessionError> {
        self.apply_default_increment(horse_id, StatKind::Feed).await
    }

    pub async fn water(self: &Arc<Self>, horse_id: HorseId) -> Result<(), SessionError> {
        self.apply_default_increment(horse_id, StatKind::Water).await
    }

    pub async fn flower(self: &Arc<Self>, horse_id: HorseId) -> Result<(), SessionError> {
        self.apply_default_increment(horse_id, StatKind::Flowers).await
    }

    /// Queues a deletion request for an administrator. Returns `Ok(false)` when
    /// the user declines the confirmation dialog.
    pub async fn request_deletion(self: &Arc<Self>, horse_id: HorseId) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let confirmed = match self.confirmer.confirm(DELETE_CONFIRMATION_PROMPT).await {
            Ok(confirmed) => confirmed,
            Err(err) => {
                let err =
                    SessionError::HostUnavailable(format!("confirmation dialog failed: {err:#}"));
                self.surface_local_error(&err);
                return Err(err);
            }
        };
        if !confirmed {
            debug!(horse_id = horse_id.0, "session: deletion declined");
            return Ok(false);
        }
        // The dialog may have outlived the view.
        self.ensure_open()?;

        let action = OutboundAction::DeleteHorseRequest { horse_id };
        if let Err(err) = self.send_action(&action).await {
            self.surface_local_error(&err);
            return Err(err);
        }
        info!(horse_id = horse_id.0, "session: deletion requested");
        let _ = self.events.send(ControllerEvent::Notice(
            "Deletion request sent to an administrator".to_string(),
        ));
        self.schedule_refresh();
        Ok(true)
    }

    pub async fn teardown(&self) -> Result<(), SessionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(task) = self.inbound_task.lock().await.take() {
            task.abort();
        }

        let Some(snapshot) = self.snapshot().await else {
            return Ok(());
        };
        let record = snapshot.to_cache_record();
        self.cache
            .store(&self.settings.cache_key, &record)
            .await
            .map_err(|err| SessionError::Cache(format!("{err:#}")))?;
        info!(
            cache_key = %self.settings.cache_key,
            horses = record.horses.len(),
            "session: snapshot cached on teardown"
        );
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    async fn send_action(&self, action: &OutboundAction) -> Result<(), SessionError> {
        let message = serde_json::to_string(action)
            .map_err(|err| SessionError::InvalidRequest(err.to_string()))?;
        self.host
            .send(message)
            .await
            .map_err(|err| SessionError::Send(format!("{err:#}")))?;
        debug!(action = action.name(), "session: action handed to host");
        Ok(())
    }

    async fn spawn_inbound_pump(self: &Arc<Self>) {
        let mut inbound = self.host.subscribe();
        let controller = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            loop {
                match inbound.recv().await {
                    Ok(payload) => {
                        let Some(controller) = controller.upgrade() else {
                            break;
                        };
                        controller.ingest(payload).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session: inbound payloads dropped while lagging");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        if let Some(previous) = self.inbound_task.lock().await.replace(task) {
            previous.abort();
        }
    }

    async fn restore_cached_snapshot(&self) {
        let record = match self.cache.load(&self.settings.cache_key).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "session: snapshot cache unreadable");
                return;
            }
        };

        let age_ms = Utc::now().timestamp_millis() - record.timestamp;
        if age_ms < 0 || age_ms as u128 >= self.settings.cache_ttl.as_millis() {
            debug!(age_ms, "session: cached snapshot is stale");
            return;
        }
        let Some(snapshot) = SessionSnapshot::from_cache_record(record) else {
            return;
        };
        let snapshot = self.replace_snapshot(snapshot).await;
        info!(
            age_ms,
            horses = snapshot.horses.len(),
            "session: restored cached snapshot"
        );
    }

    async fn replace_snapshot(&self, snapshot: SessionSnapshot) -> Arc<SessionSnapshot> {
        let snapshot = Arc::new(snapshot);
        {
            let mut guard = self.inner.lock().await;
            guard.snapshot = Some(Arc::clone(&snapshot));
            guard.mode = ControllerMode::Ready;
            guard.last_error = None;
        }
        let _ = self
            .events
            .send(ControllerEvent::SnapshotReplaced(Arc::clone(&snapshot)));
        let _ = self
            .events
            .send(ControllerEvent::ModeChanged(ControllerMode::Ready));
        snapshot
    }

    async fn enter_error(&self, err: &SessionError) {
        let surfaced = err.to_user_facing();
        {
            let mut guard = self.inner.lock().await;
            guard.mode = ControllerMode::Error;
            guard.last_error = Some(surfaced.clone());
        }
        self.publish_error(err, surfaced);
        let _ = self
            .events
            .send(ControllerEvent::ModeChanged(ControllerMode::Error));
    }

    fn surface_local_error(&self, err: &SessionError) {
        self.publish_error(err, err.to_user_facing());
    }

    fn publish_error(&self, err: &SessionError, surfaced: UserFacingError) {
        warn!(code = ?surfaced.code, error = %err, "session: error");
        let _ = self.events.send(ControllerEvent::Error(surfaced));
    }

    fn schedule_timeout(self: &Arc<Self>, seq: u64) {
        let controller = Arc::downgrade(self);
        let timeout = self.settings.snapshot_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(controller) = controller.upgrade() else {
                return;
            };
            if controller.is_closed() {
                return;
            }
            controller.expire_request(seq, timeout).await;
        });
    }

    async fn expire_request(&self, seq: u64, timeout: Duration) {
        let err = SessionError::Timeout(timeout);
        let surfaced = {
            let mut guard = self.inner.lock().await;
            if guard.request_seq != seq || guard.mode != ControllerMode::Loading {
                return;
            }
            let surfaced = err.to_user_facing();
            guard.mode = ControllerMode::Error;
            guard.last_error = Some(surfaced.clone());
            surfaced
        };
        self.publish_error(&err, surfaced);
        let _ = self
            .events
            .send(ControllerEvent::ModeChanged(ControllerMode::Error));
    }

    fn schedule_refresh(self: &Arc<Self>) {
        let controller = Arc::downgrade(self);
        let delay = self.settings.refetch_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(controller) = controller.upgrade() else {
                return;
            };
            if controller.is_closed() {
                return;
            }
            if let Err(err) = controller.request_snapshot().await {
                warn!(error = %err, "session: scheduled refresh failed");
            }
        });
    }
}

fn mutation_notice(delta: &StatDelta) -> &'static str {
    match (delta.feed, delta.water, delta.flowers) {
        (Some(_), None, None) => "Horse fed",
        (None, Some(_), None) => "Horse watered",
        (None, None, Some(_)) => "Flowers watered",
        _ => "Horse stats updated",
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
