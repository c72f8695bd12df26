use chrono::{DateTime, Utc};

use crate::{
    alert::{Alert, AlertHistory, AlertSeverity, AlertType},
    criteria::SearchCriteria,
    engine::Engine,
    error::Result,
    subscription::AlertSubscription,
};

/// Facade over a boxed storage [`Engine`].
///
/// Cheap to clone; every clone talks to the same underlying engine.
#[derive(Clone)]
pub struct AlertStore {
    pub(crate) engine: Box<dyn Engine>,
}

impl AlertStore {
    pub fn new<E: Engine + 'static>(engine: E) -> Self {
        Self {
            engine: Box::new(engine),
        }
    }

    pub async fn save_alert(&self, alert: Alert) -> Result<Alert> {
        self.engine.save_alert(alert).await
    }

    pub async fn find_alert(&self, id: i64) -> Result<Option<Alert>> {
        self.engine.find_alert(id).await
    }

    pub async fn find_active(&self) -> Result<Vec<Alert>> {
        self.engine.find_active().await
    }

    pub async fn find_active_by_parcel(&self, parcel_id: i64) -> Result<Vec<Alert>> {
        self.engine.find_active_by_parcel(parcel_id).await
    }

    pub async fn find_active_by_type(&self, alert_type: AlertType) -> Result<Vec<Alert>> {
        self.engine.find_active_by_type(alert_type).await
    }

    pub async fn find_active_by_severity(&self, severity: AlertSeverity) -> Result<Vec<Alert>> {
        self.engine.find_active_by_severity(severity).await
    }

    pub async fn find_active_since(&self, since: DateTime<Utc>) -> Result<Vec<Alert>> {
        self.engine.find_active_since(since).await
    }

    pub async fn find_unacknowledged(&self) -> Result<Vec<Alert>> {
        self.engine.find_unacknowledged().await
    }

    pub async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Alert>> {
        self.engine.find_expired(now).await
    }

    pub async fn find_since(
        &self,
        parcel_id: Option<i64>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Alert>> {
        self.engine.find_since(parcel_id, since).await
    }

    pub async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<Alert>> {
        self.engine.search(criteria).await
    }

    pub async fn count_alerts(&self, parcel_id: Option<i64>) -> Result<i64> {
        self.engine.count_alerts(parcel_id).await
    }

    pub async fn count_active(&self, parcel_id: Option<i64>) -> Result<i64> {
        self.engine.count_active(parcel_id).await
    }

    pub async fn count_unacknowledged(&self, parcel_id: Option<i64>) -> Result<i64> {
        self.engine.count_unacknowledged(parcel_id).await
    }

    pub async fn append_history(&self, history: AlertHistory) -> Result<AlertHistory> {
        self.engine.append_history(history).await
    }

    pub async fn find_history(&self, alert_id: i64) -> Result<Vec<AlertHistory>> {
        self.engine.find_history(alert_id).await
    }

    pub async fn save_subscription(
        &self,
        subscription: AlertSubscription,
    ) -> Result<AlertSubscription> {
        self.engine.save_subscription(subscription).await
    }

    pub async fn find_subscription(&self, id: i64) -> Result<Option<AlertSubscription>> {
        self.engine.find_subscription(id).await
    }

    pub async fn find_subscriptions_by_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<AlertSubscription>> {
        self.engine.find_subscriptions_by_user(user_id).await
    }

    pub async fn find_subscription_by_user_and_parcel(
        &self,
        user_id: &str,
        parcel_id: i64,
    ) -> Result<Option<AlertSubscription>> {
        self.engine
            .find_subscription_by_user_and_parcel(user_id, parcel_id)
            .await
    }

    pub async fn find_enabled_for_parcel(&self, parcel_id: i64) -> Result<Vec<AlertSubscription>> {
        self.engine.find_enabled_for_parcel(parcel_id).await
    }

    pub async fn find_all_enabled(&self) -> Result<Vec<AlertSubscription>> {
        self.engine.find_all_enabled().await
    }

    pub async fn count_enabled_subscriptions(&self) -> Result<i64> {
        self.engine.count_enabled_subscriptions().await
    }
}
