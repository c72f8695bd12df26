use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::{collections::BTreeMap, sync::Arc};

use crate::{
    alert::{Alert, AlertHistory, AlertSeverity, AlertType},
    criteria::SearchCriteria,
    engine::Engine,
    error::{Result, StoreError},
    store::AlertStore,
    subscription::AlertSubscription,
};

pub type MemoryStore = AlertStore;

impl MemoryStore {
    pub fn memory() -> Self {
        AlertStore::new(Memory::default())
    }
}

/// In-memory engine over a single `RwLock`, with monotonic id counters.
#[derive(Debug, Clone, Default)]
pub struct Memory(Arc<RwLock<Inner>>);

#[derive(Debug, Default)]
struct Inner {
    alerts: BTreeMap<i64, Alert>,
    history: Vec<AlertHistory>,
    subscriptions: BTreeMap<i64, AlertSubscription>,
    next_alert_id: i64,
    next_history_id: i64,
    next_subscription_id: i64,
}

fn newest_first(mut alerts: Vec<Alert>) -> Vec<Alert> {
    alerts.sort_by(|a, b| b.alert_time.cmp(&a.alert_time).then(b.id.cmp(&a.id)));
    alerts
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect_alerts<F: Fn(&Alert) -> bool>(&self, keep: F) -> Vec<Alert> {
        self.0.read().alerts.values().filter(|a| keep(a)).cloned().collect()
    }

    fn count_where<F: Fn(&Alert) -> bool>(&self, keep: F) -> i64 {
        self.0.read().alerts.values().filter(|a| keep(a)).count() as i64
    }
}

#[async_trait]
impl Engine for Memory {
    async fn save_alert(&self, mut alert: Alert) -> Result<Alert> {
        let mut data = self.0.write();

        if alert.id == 0 {
            data.next_alert_id += 1;
            alert.id = data.next_alert_id;
        } else if !data.alerts.contains_key(&alert.id) {
            return Err(StoreError::UnknownAlert(alert.id));
        }

        data.alerts.insert(alert.id, alert.clone());

        Ok(alert)
    }

    async fn find_alert(&self, id: i64) -> Result<Option<Alert>> {
        Ok(self.0.read().alerts.get(&id).cloned())
    }

    async fn find_active(&self) -> Result<Vec<Alert>> {
        Ok(newest_first(self.collect_alerts(|a| a.is_active)))
    }

    async fn find_active_by_parcel(&self, parcel_id: i64) -> Result<Vec<Alert>> {
        Ok(newest_first(self.collect_alerts(|a| {
            a.is_active && a.parcel_id == Some(parcel_id)
        })))
    }

    async fn find_active_by_type(&self, alert_type: AlertType) -> Result<Vec<Alert>> {
        Ok(newest_first(self.collect_alerts(|a| {
            a.is_active && a.alert_type == alert_type
        })))
    }

    async fn find_active_by_severity(&self, severity: AlertSeverity) -> Result<Vec<Alert>> {
        Ok(newest_first(self.collect_alerts(|a| {
            a.is_active && a.severity == severity
        })))
    }

    async fn find_active_since(&self, since: DateTime<Utc>) -> Result<Vec<Alert>> {
        Ok(newest_first(self.collect_alerts(|a| {
            a.is_active && a.alert_time >= since
        })))
    }

    async fn find_unacknowledged(&self) -> Result<Vec<Alert>> {
        let mut alerts = self.collect_alerts(|a| a.is_active && !a.acknowledged);
        alerts.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(b.alert_time.cmp(&a.alert_time))
                .then(b.id.cmp(&a.id))
        });

        Ok(alerts)
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Alert>> {
        Ok(newest_first(self.collect_alerts(|a| a.is_expired(now))))
    }

    async fn find_since(
        &self,
        parcel_id: Option<i64>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Alert>> {
        Ok(newest_first(self.collect_alerts(|a| {
            a.alert_time >= since && parcel_id.map(|p| a.parcel_id == Some(p)).unwrap_or(true)
        })))
    }

    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<Alert>> {
        let alerts = newest_first(self.collect_alerts(|a| {
            criteria.parcel_id.map(|p| a.parcel_id == Some(p)).unwrap_or(true)
                && criteria.alert_type.map(|t| a.alert_type == t).unwrap_or(true)
                && criteria.severity.map(|s| a.severity == s).unwrap_or(true)
                && criteria.is_active.map(|v| a.is_active == v).unwrap_or(true)
                && criteria.acknowledged.map(|v| a.acknowledged == v).unwrap_or(true)
                && criteria.from.map(|t| a.alert_time >= t).unwrap_or(true)
                && criteria.to.map(|t| a.alert_time <= t).unwrap_or(true)
        }));

        let offset = criteria.offset.unwrap_or(0).min(alerts.len());
        let end = criteria
            .limit
            .map(|l| (offset + l).min(alerts.len()))
            .unwrap_or(alerts.len());

        Ok(alerts[offset..end].to_vec())
    }

    async fn count_alerts(&self, parcel_id: Option<i64>) -> Result<i64> {
        Ok(self.count_where(|a| parcel_id.map(|p| a.parcel_id == Some(p)).unwrap_or(true)))
    }

    async fn count_active(&self, parcel_id: Option<i64>) -> Result<i64> {
        Ok(self.count_where(|a| {
            a.is_active && parcel_id.map(|p| a.parcel_id == Some(p)).unwrap_or(true)
        }))
    }

    async fn count_unacknowledged(&self, parcel_id: Option<i64>) -> Result<i64> {
        Ok(self.count_where(|a| {
            a.is_active
                && !a.acknowledged
                && parcel_id.map(|p| a.parcel_id == Some(p)).unwrap_or(true)
        }))
    }

    async fn append_history(&self, mut history: AlertHistory) -> Result<AlertHistory> {
        let mut data = self.0.write();

        data.next_history_id += 1;
        history.id = data.next_history_id;
        data.history.push(history.clone());

        Ok(history)
    }

    async fn find_history(&self, alert_id: i64) -> Result<Vec<AlertHistory>> {
        Ok(self
            .0
            .read()
            .history
            .iter()
            .filter(|h| h.alert_id == alert_id)
            .cloned()
            .collect())
    }

    async fn save_subscription(
        &self,
        mut subscription: AlertSubscription,
    ) -> Result<AlertSubscription> {
        let mut data = self.0.write();

        if subscription.id == 0 {
            data.next_subscription_id += 1;
            subscription.id = data.next_subscription_id;
        } else if !data.subscriptions.contains_key(&subscription.id) {
            return Err(StoreError::UnknownSubscription(subscription.id));
        }

        data.subscriptions.insert(subscription.id, subscription.clone());

        Ok(subscription)
    }

    async fn find_subscription(&self, id: i64) -> Result<Option<AlertSubscription>> {
        Ok(self.0.read().subscriptions.get(&id).cloned())
    }

    async fn find_subscriptions_by_user(&self, user_id: &str) -> Result<Vec<AlertSubscription>> {
        Ok(self
            .0
            .read()
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_subscription_by_user_and_parcel(
        &self,
        user_id: &str,
        parcel_id: i64,
    ) -> Result<Option<AlertSubscription>> {
        Ok(self
            .0
            .read()
            .subscriptions
            .values()
            .find(|s| s.user_id == user_id && s.parcel_id == Some(parcel_id))
            .cloned())
    }

    async fn find_enabled_for_parcel(&self, parcel_id: i64) -> Result<Vec<AlertSubscription>> {
        Ok(self
            .0
            .read()
            .subscriptions
            .values()
            .filter(|s| s.is_enabled && (s.parcel_id == Some(parcel_id) || s.parcel_id.is_none()))
            .cloned()
            .collect())
    }

    async fn find_all_enabled(&self) -> Result<Vec<AlertSubscription>> {
        Ok(self
            .0
            .read()
            .subscriptions
            .values()
            .filter(|s| s.is_enabled)
            .cloned()
            .collect())
    }

    async fn count_enabled_subscriptions(&self) -> Result<i64> {
        Ok(self
            .0
            .read()
            .subscriptions
            .values()
            .filter(|s| s.is_enabled)
            .count() as i64)
    }
}
