use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dyn_clone::DynClone;

use crate::{
    alert::{Alert, AlertHistory, AlertSeverity, AlertType},
    criteria::SearchCriteria,
    error::Result,
    subscription::AlertSubscription,
};

#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "pg")]
mod pg;

#[cfg(feature = "memory")]
pub use memory::*;
#[cfg(feature = "pg")]
pub use pg::*;

/// Storage contract for alerts, history rows and subscriptions.
///
/// `save_*` inserts when the id is zero (assigning a fresh id) and updates
/// otherwise. All `find_active*` queries return active alerts newest first;
/// `find_unacknowledged` orders by severity rank descending, then time
/// descending.
#[async_trait]
pub trait Engine: DynClone + Send + Sync {
    async fn save_alert(&self, alert: Alert) -> Result<Alert>;

    async fn find_alert(&self, id: i64) -> Result<Option<Alert>>;

    async fn find_active(&self) -> Result<Vec<Alert>>;

    async fn find_active_by_parcel(&self, parcel_id: i64) -> Result<Vec<Alert>>;

    async fn find_active_by_type(&self, alert_type: AlertType) -> Result<Vec<Alert>>;

    async fn find_active_by_severity(&self, severity: AlertSeverity) -> Result<Vec<Alert>>;

    async fn find_active_since(&self, since: DateTime<Utc>) -> Result<Vec<Alert>>;

    async fn find_unacknowledged(&self) -> Result<Vec<Alert>>;

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Alert>>;

    async fn find_since(&self, parcel_id: Option<i64>, since: DateTime<Utc>)
        -> Result<Vec<Alert>>;

    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<Alert>>;

    async fn count_alerts(&self, parcel_id: Option<i64>) -> Result<i64>;

    async fn count_active(&self, parcel_id: Option<i64>) -> Result<i64>;

    async fn count_unacknowledged(&self, parcel_id: Option<i64>) -> Result<i64>;

    async fn append_history(&self, history: AlertHistory) -> Result<AlertHistory>;

    async fn find_history(&self, alert_id: i64) -> Result<Vec<AlertHistory>>;

    async fn save_subscription(&self, subscription: AlertSubscription)
        -> Result<AlertSubscription>;

    async fn find_subscription(&self, id: i64) -> Result<Option<AlertSubscription>>;

    async fn find_subscriptions_by_user(&self, user_id: &str) -> Result<Vec<AlertSubscription>>;

    async fn find_subscription_by_user_and_parcel(
        &self,
        user_id: &str,
        parcel_id: i64,
    ) -> Result<Option<AlertSubscription>>;

    async fn find_enabled_for_parcel(&self, parcel_id: i64) -> Result<Vec<AlertSubscription>>;

    async fn find_all_enabled(&self) -> Result<Vec<AlertSubscription>>;

    async fn count_enabled_subscriptions(&self) -> Result<i64>;
}

dyn_clone::clone_trait_object!(Engine);
