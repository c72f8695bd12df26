use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use agrialert_store::{Alert, AlertStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::{
    sync::mpsc,
    time::{interval_at, Instant},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamFilter {
    pub parcel_id: Option<i64>,
}

impl StreamFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parcel_id(mut self, v: i64) -> Self {
        self.parcel_id = Some(v);

        self
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    #[error("stream manager is shut down")]
    Closed,

    #[error("failed to query active alerts: {0}")]
    Query(String),

    #[error("failed to deliver alert to observer: {0}")]
    Delivery(String),
}

/// Receiving side of a stream session. `send` is called once per matching
/// alert per tick; `terminated` is called at most once, when the session
/// dies on a query or delivery failure.
#[async_trait]
pub trait AlertObserver: Send + Sync {
    async fn send(&self, alert: Alert) -> anyhow::Result<()>;

    async fn terminated(&self, error: StreamError);
}

/// Bridges a stream session onto an mpsc channel, for server-push
/// transports and tests.
pub struct ChannelObserver(mpsc::Sender<std::result::Result<Alert, StreamError>>);

impl ChannelObserver {
    pub fn new(tx: mpsc::Sender<std::result::Result<Alert, StreamError>>) -> Self {
        Self(tx)
    }
}

#[async_trait]
impl AlertObserver for ChannelObserver {
    async fn send(&self, alert: Alert) -> anyhow::Result<()> {
        self.0
            .send(Ok(alert))
            .await
            .map_err(|_| anyhow::anyhow!("stream receiver dropped"))
    }

    async fn terminated(&self, error: StreamError) {
        let _ = self.0.send(Err(error)).await;
    }
}

/// Opaque handle to one active stream session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHandle {
    pub id: Uuid,
}

struct Session {
    filter: StreamFilter,
    cancelled: Arc<AtomicBool>,
    messages_sent: Arc<AtomicU64>,
    started_at: DateTime<Utc>,
    task: tokio::task::JoinHandle<()>,
}

/// Owns every long-lived alert streaming session.
///
/// Each session is a repeating timer task that re-queries active alerts
/// matching its filter and pushes them to the observer. Ticks for one
/// session never overlap, cancellation is checked at tick boundaries and
/// between pushes, and a failed tick tears down only its own session.
#[derive(Clone)]
pub struct StreamManager {
    store: AlertStore,
    tick_interval: Duration,
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    closed: Arc<AtomicBool>,
}

impl StreamManager {
    pub fn new(store: AlertStore) -> Self {
        Self {
            store,
            tick_interval: DEFAULT_TICK_INTERVAL,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn tick_interval(mut self, v: Duration) -> Self {
        self.tick_interval = v;

        self
    }

    pub fn start_stream<O: AlertObserver + 'static>(
        &self,
        filter: StreamFilter,
        observer: O,
    ) -> std::result::Result<StreamHandle, StreamError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StreamError::Closed);
        }

        let id = Uuid::new_v4();
        let cancelled = Arc::new(AtomicBool::new(false));
        let messages_sent = Arc::new(AtomicU64::new(0));

        let mut sessions = self.sessions.write();

        let task = tokio::spawn(run_session(
            id,
            self.store.clone(),
            filter.clone(),
            Arc::new(observer),
            self.tick_interval,
            cancelled.clone(),
            messages_sent.clone(),
            self.sessions.clone(),
        ));

        sessions.insert(
            id,
            Session {
                filter,
                cancelled,
                messages_sent,
                started_at: Utc::now(),
                task,
            },
        );

        info!(session = %id, sessions = sessions.len(), "stream session started");

        Ok(StreamHandle { id })
    }

    /// Idempotent: the first call cancels the session task and removes it
    /// from the registry; later calls return false.
    pub fn cancel(&self, handle: &StreamHandle) -> bool {
        let Some(session) = self.sessions.write().remove(&handle.id) else {
            return false;
        };

        if session
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        session.task.abort();

        info!(
            session = %handle.id,
            messages_sent = session.messages_sent.load(Ordering::SeqCst),
            started_at = %session.started_at,
            parcel_id = session.filter.parcel_id,
            "stream session cancelled"
        );

        true
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn messages_sent(&self, handle: &StreamHandle) -> Option<u64> {
        self.sessions
            .read()
            .get(&handle.id)
            .map(|s| s.messages_sent.load(Ordering::SeqCst))
    }

    /// Cancels all outstanding sessions, stops accepting new ones, and
    /// waits briefly for in-flight ticks before aborting stragglers.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let sessions: Vec<(Uuid, Session)> = self.sessions.write().drain().collect();

        info!(sessions = sessions.len(), "shutting down stream manager");

        for (id, session) in sessions {
            session.cancelled.store(true, Ordering::SeqCst);

            let mut task = session.task;

            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!(session = %id, "stream session did not stop in time, aborting");
                task.abort();
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_session<O: AlertObserver + 'static>(
    id: Uuid,
    store: AlertStore,
    filter: StreamFilter,
    observer: Arc<O>,
    tick_interval: Duration,
    cancelled: Arc<AtomicBool>,
    messages_sent: Arc<AtomicU64>,
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
) {
    let mut interval = interval_at(Instant::now(), tick_interval);

    loop {
        interval.tick().await;

        if cancelled.load(Ordering::SeqCst) {
            return;
        }

        let alerts = match filter.parcel_id {
            Some(parcel_id) => store.find_active_by_parcel(parcel_id).await,
            _ => store.find_active().await,
        };

        let alerts = match alerts {
            Ok(alerts) => alerts,
            Err(err) => {
                teardown(
                    id,
                    &cancelled,
                    &sessions,
                    observer.as_ref(),
                    StreamError::Query(err.to_string()),
                )
                .await;

                return;
            }
        };

        for alert in alerts {
            if cancelled.load(Ordering::SeqCst) {
                return;
            }

            if let Err(err) = observer.send(alert).await {
                teardown(
                    id,
                    &cancelled,
                    &sessions,
                    observer.as_ref(),
                    StreamError::Delivery(err.to_string()),
                )
                .await;

                return;
            }

            messages_sent.fetch_add(1, Ordering::SeqCst);
        }

        debug!(session = %id, "stream tick completed");
    }
}

/// Removes the session and signals the observer exactly once. The
/// cancellation flag doubles as the once-guard against a concurrent
/// `cancel` call.
async fn teardown<O: AlertObserver>(
    id: Uuid,
    cancelled: &AtomicBool,
    sessions: &RwLock<HashMap<Uuid, Session>>,
    observer: &O,
    error: StreamError,
) {
    if cancelled
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }

    sessions.write().remove(&id);

    error!(session = %id, error = %error, "stream session failed");

    observer.terminated(error).await;
}
