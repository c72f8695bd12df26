#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use agrialert::{
    store::{Engine, Memory, Result as StoreResult},
    Alert, AlertHistory, AlertSeverity, AlertService, AlertStore, AlertSubscription, AlertType,
    CreateAlert, Notifier, SearchCriteria,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

pub fn service() -> (AlertService, AlertStore) {
    let store = AlertStore::memory();

    (AlertService::new(store.clone()), store)
}

pub fn frost_warning() -> CreateAlert {
    CreateAlert::new(
        AlertType::Weather,
        AlertSeverity::High,
        "Frost warning",
        "Frost expected tonight",
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub channel: &'static str,
    pub target: String,
    pub alert_id: i64,
}

/// Test notifier that records every attempt and can be told to fail the
/// first N of them.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub deliveries: Arc<Mutex<Vec<Delivery>>>,
    pub attempts: Arc<AtomicUsize>,
    pub attempt_times: Arc<Mutex<Vec<tokio::time::Instant>>>,
    fail_first: Arc<AtomicUsize>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(n: usize) -> Self {
        let notifier = Self::default();
        notifier.fail_first.store(n, Ordering::SeqCst);

        notifier
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    async fn attempt(
        &self,
        channel: &'static str,
        target: &str,
        alert: &Alert,
    ) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.attempt_times.lock().push(tokio::time::Instant::now());

        if self.fail_first.load(Ordering::SeqCst) > 0 {
            self.fail_first.fetch_sub(1, Ordering::SeqCst);

            anyhow::bail!("transient delivery failure");
        }

        self.deliveries.lock().push(Delivery {
            channel,
            target: target.to_owned(),
            alert_id: alert.id,
        });

        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_email(&self, address: &str, alert: &Alert) -> anyhow::Result<()> {
        self.attempt("email", address, alert).await
    }

    async fn send_sms(&self, number: &str, alert: &Alert) -> anyhow::Result<()> {
        self.attempt("sms", number, alert).await
    }

    async fn send_push(&self, user_id: &str, alert: &Alert) -> anyhow::Result<()> {
        self.attempt("push", user_id, alert).await
    }

    async fn send_in_app(&self, user_id: &str, alert: &Alert) -> anyhow::Result<()> {
        self.attempt("in_app", user_id, alert).await
    }
}

/// Memory engine wrapper whose failures can be toggled at runtime:
/// `fail_all` makes every call fail, `fail_expired` makes only the next N
/// `find_expired` calls fail.
#[derive(Clone)]
pub struct FlakyEngine {
    inner: Memory,
    pub fail_all: Arc<AtomicBool>,
    pub fail_expired: Arc<AtomicUsize>,
}

impl FlakyEngine {
    pub fn new() -> Self {
        Self {
            inner: Memory::new(),
            fail_all: Arc::new(AtomicBool::new(false)),
            fail_expired: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn check(&self) -> StoreResult<()> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("store unavailable").into());
        }

        Ok(())
    }
}

#[async_trait]
impl Engine for FlakyEngine {
    async fn save_alert(&self, alert: Alert) -> StoreResult<Alert> {
        self.check()?;
        self.inner.save_alert(alert).await
    }

    async fn find_alert(&self, id: i64) -> StoreResult<Option<Alert>> {
        self.check()?;
        self.inner.find_alert(id).await
    }

    async fn find_active(&self) -> StoreResult<Vec<Alert>> {
        self.check()?;
        self.inner.find_active().await
    }

    async fn find_active_by_parcel(&self, parcel_id: i64) -> StoreResult<Vec<Alert>> {
        self.check()?;
        self.inner.find_active_by_parcel(parcel_id).await
    }

    async fn find_active_by_type(
        &self,
        alert_type: AlertType,
    ) -> StoreResult<Vec<Alert>> {
        self.check()?;
        self.inner.find_active_by_type(alert_type).await
    }

    async fn find_active_by_severity(
        &self,
        severity: AlertSeverity,
    ) -> StoreResult<Vec<Alert>> {
        self.check()?;
        self.inner.find_active_by_severity(severity).await
    }

    async fn find_active_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Alert>> {
        self.check()?;
        self.inner.find_active_since(since).await
    }

    async fn find_unacknowledged(&self) -> StoreResult<Vec<Alert>> {
        self.check()?;
        self.inner.find_unacknowledged().await
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> StoreResult<Vec<Alert>> {
        self.check()?;

        if self
            .fail_expired
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(anyhow::anyhow!("store unavailable").into());
        }

        self.inner.find_expired(now).await
    }

    async fn find_since(
        &self,
        parcel_id: Option<i64>,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Alert>> {
        self.check()?;
        self.inner.find_since(parcel_id, since).await
    }

    async fn search(&self, criteria: &SearchCriteria) -> StoreResult<Vec<Alert>> {
        self.check()?;
        self.inner.search(criteria).await
    }

    async fn count_alerts(&self, parcel_id: Option<i64>) -> StoreResult<i64> {
        self.check()?;
        self.inner.count_alerts(parcel_id).await
    }

    async fn count_active(&self, parcel_id: Option<i64>) -> StoreResult<i64> {
        self.check()?;
        self.inner.count_active(parcel_id).await
    }

    async fn count_unacknowledged(&self, parcel_id: Option<i64>) -> StoreResult<i64> {
        self.check()?;
        self.inner.count_unacknowledged(parcel_id).await
    }

    async fn append_history(&self, history: AlertHistory) -> StoreResult<AlertHistory> {
        self.check()?;
        self.inner.append_history(history).await
    }

    async fn find_history(&self, alert_id: i64) -> StoreResult<Vec<AlertHistory>> {
        self.check()?;
        self.inner.find_history(alert_id).await
    }

    async fn save_subscription(
        &self,
        subscription: AlertSubscription,
    ) -> StoreResult<AlertSubscription> {
        self.check()?;
        self.inner.save_subscription(subscription).await
    }

    async fn find_subscription(&self, id: i64) -> StoreResult<Option<AlertSubscription>> {
        self.check()?;
        self.inner.find_subscription(id).await
    }

    async fn find_subscriptions_by_user(
        &self,
        user_id: &str,
    ) -> StoreResult<Vec<AlertSubscription>> {
        self.check()?;
        self.inner.find_subscriptions_by_user(user_id).await
    }

    async fn find_subscription_by_user_and_parcel(
        &self,
        user_id: &str,
        parcel_id: i64,
    ) -> StoreResult<Option<AlertSubscription>> {
        self.check()?;
        self.inner
            .find_subscription_by_user_and_parcel(user_id, parcel_id)
            .await
    }

    async fn find_enabled_for_parcel(
        &self,
        parcel_id: i64,
    ) -> StoreResult<Vec<AlertSubscription>> {
        self.check()?;
        self.inner.find_enabled_for_parcel(parcel_id).await
    }

    async fn find_all_enabled(&self) -> StoreResult<Vec<AlertSubscription>> {
        self.check()?;
        self.inner.find_all_enabled().await
    }

    async fn count_enabled_subscriptions(&self) -> StoreResult<i64> {
        self.check()?;
        self.inner.count_enabled_subscriptions().await
    }
}
