use std::collections::HashMap;

use agrialert_store::{
    Alert, AlertHistory, AlertSeverity, AlertStore, AlertSubscription, AlertType, HistoryAction,
    NotificationMethod, SearchCriteria,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::{
    dispatcher::NotificationDispatcher,
    error::{AlertError, Result},
    matcher::matching_subscriptions,
};

#[derive(Debug, Clone)]
pub struct CreateAlert {
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub parcel_id: Option<i64>,
    pub location: Option<String>,
    pub expiry_seconds: Option<i64>,
    pub metadata: Option<Value>,
}

impl CreateAlert {
    pub fn new(
        alert_type: AlertType,
        severity: AlertSeverity,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            alert_type,
            severity,
            title: title.into(),
            message: message.into(),
            parcel_id: None,
            location: None,
            expiry_seconds: None,
            metadata: None,
        }
    }

    pub fn parcel_id(mut self, v: i64) -> Self {
        self.parcel_id = Some(v);

        self
    }

    pub fn location(mut self, v: impl Into<String>) -> Self {
        self.location = Some(v.into());

        self
    }

    pub fn expiry_seconds(mut self, v: i64) -> Self {
        self.expiry_seconds = Some(v);

        self
    }

    pub fn metadata(mut self, v: Value) -> Self {
        self.metadata = Some(v);

        self
    }
}

#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub user_id: String,
    pub parcel_id: Option<i64>,
    pub alert_types: Vec<AlertType>,
    pub notification_method: NotificationMethod,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

impl CreateSubscription {
    pub fn new(user_id: impl Into<String>, notification_method: NotificationMethod) -> Self {
        Self {
            user_id: user_id.into(),
            parcel_id: None,
            alert_types: Vec::new(),
            notification_method,
            email: None,
            phone_number: None,
        }
    }

    pub fn parcel_id(mut self, v: i64) -> Self {
        self.parcel_id = Some(v);

        self
    }

    pub fn alert_types(mut self, v: Vec<AlertType>) -> Self {
        self.alert_types = v;

        self
    }

    pub fn email(mut self, v: impl Into<String>) -> Self {
        self.email = Some(v.into());

        self
    }

    pub fn phone_number(mut self, v: impl Into<String>) -> Self {
        self.phone_number = Some(v.into());

        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStatistics {
    pub total: i64,
    pub active: i64,
    pub unacknowledged: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertTrends {
    pub total: u64,
    pub by_type: HashMap<AlertType, u64>,
    pub by_severity: HashMap<AlertSeverity, u64>,
    pub acknowledgement_rate: f64,
    pub avg_response_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ServiceHealth {
    #[serde(rename = "UP")]
    Up {
        active_alerts: i64,
        unacknowledged_alerts: i64,
        enabled_subscriptions: i64,
        checked_at: DateTime<Utc>,
    },
    #[serde(rename = "DOWN")]
    Down { error: String },
}

/// Single authority for alert state transitions and derived queries.
///
/// Every mutation is a read-modify-write of one alert row followed by an
/// appended history row. Subscriber notification is handed off to the
/// dispatcher and never affects the outcome of the triggering call.
#[derive(Clone)]
pub struct AlertService {
    store: AlertStore,
    dispatcher: Option<NotificationDispatcher>,
}

impl AlertService {
    pub fn new(store: AlertStore) -> Self {
        Self {
            store,
            dispatcher: None,
        }
    }

    pub fn dispatcher(mut self, dispatcher: NotificationDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);

        self
    }

    pub fn store(&self) -> &AlertStore {
        &self.store
    }

    pub async fn create_alert(&self, request: CreateAlert) -> Result<Alert> {
        if request.title.trim().is_empty() {
            return Err(AlertError::InvalidInput(
                "alert title must not be empty".to_owned(),
            ));
        }

        if request.message.trim().is_empty() {
            return Err(AlertError::InvalidInput(
                "alert message must not be empty".to_owned(),
            ));
        }

        let mut alert = Alert::new(
            request.alert_type,
            request.severity,
            request.title,
            request.message,
        );

        if let Some(parcel_id) = request.parcel_id {
            alert = alert.parcel_id(parcel_id);
        }

        if let Some(location) = request.location {
            alert = alert.location(location);
        }

        if let Some(expiry_seconds) = request.expiry_seconds {
            alert = alert.expires_in(expiry_seconds);
        }

        alert.metadata = request.metadata;

        let alert = self.store.save_alert(alert).await?;

        self.record_history(alert.id, HistoryAction::Created, None, "alert created")
            .await?;

        if let Err(err) = self.notify_subscribers(&alert).await {
            warn!(
                alert_id = alert.id,
                error = %err,
                "failed to queue subscriber notifications"
            );
        }

        info!(
            alert_id = alert.id,
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            parcel_id = alert.parcel_id,
            "alert created"
        );

        Ok(alert)
    }

    pub async fn get_alert(&self, id: i64) -> Result<Alert> {
        self.store
            .find_alert(id)
            .await?
            .ok_or_else(|| AlertError::NotFound(format!("alert not found with id {id}")))
    }

    pub async fn get_active_alerts(&self) -> Result<Vec<Alert>> {
        Ok(self.store.find_active().await?)
    }

    pub async fn get_active_alerts_by_parcel(&self, parcel_id: i64) -> Result<Vec<Alert>> {
        Ok(self.store.find_active_by_parcel(parcel_id).await?)
    }

    pub async fn get_active_alerts_by_type(&self, alert_type: AlertType) -> Result<Vec<Alert>> {
        Ok(self.store.find_active_by_type(alert_type).await?)
    }

    pub async fn get_active_alerts_by_severity(
        &self,
        severity: AlertSeverity,
    ) -> Result<Vec<Alert>> {
        Ok(self.store.find_active_by_severity(severity).await?)
    }

    pub async fn get_active_alerts_since(&self, since: DateTime<Utc>) -> Result<Vec<Alert>> {
        Ok(self.store.find_active_since(since).await?)
    }

    pub async fn get_unacknowledged_alerts(&self) -> Result<Vec<Alert>> {
        Ok(self.store.find_unacknowledged().await?)
    }

    pub async fn search_alerts(&self, criteria: &SearchCriteria) -> Result<Vec<Alert>> {
        Ok(self.store.search(criteria).await?)
    }

    /// Idempotent: acknowledging an already acknowledged alert returns it
    /// unchanged, without a second history row.
    pub async fn acknowledge_alert(&self, id: i64, by: impl Into<String>) -> Result<Alert> {
        let by = by.into();
        let mut alert = self.get_alert(id).await?;

        if alert.acknowledged {
            warn!(alert_id = id, "alert is already acknowledged");

            return Ok(alert);
        }

        alert.acknowledged = true;
        alert.acknowledged_by = Some(by.to_owned());
        alert.acknowledged_at = Some(Utc::now());

        let alert = self.store.save_alert(alert).await?;

        self.record_history(
            id,
            HistoryAction::Acknowledged,
            Some(by.as_str()),
            "alert acknowledged",
        )
        .await?;

        info!(alert_id = id, by = %by, "alert acknowledged");

        Ok(alert)
    }

    /// Best-effort batch acknowledgement. Missing or already acknowledged
    /// ids are skipped; per-id store failures are logged, never abort the
    /// batch. Returns only the alerts actually transitioned.
    pub async fn acknowledge_alerts(
        &self,
        ids: &[i64],
        by: impl Into<String>,
    ) -> Result<Vec<Alert>> {
        let by = by.into();
        let now = Utc::now();
        let mut acknowledged = Vec::new();

        for &id in ids {
            let result = async {
                let Some(mut alert) = self.store.find_alert(id).await? else {
                    return Ok::<_, AlertError>(None);
                };

                if alert.acknowledged {
                    return Ok(None);
                }

                alert.acknowledged = true;
                alert.acknowledged_by = Some(by.to_owned());
                alert.acknowledged_at = Some(now);

                let alert = self.store.save_alert(alert).await?;

                self.record_history(
                    id,
                    HistoryAction::Acknowledged,
                    Some(by.as_str()),
                    "bulk acknowledgement",
                )
                .await?;

                Ok(Some(alert))
            }
            .await;

            match result {
                Ok(Some(alert)) => acknowledged.push(alert),
                Ok(None) => debug!(alert_id = id, "skipped alert during bulk acknowledgement"),
                Err(err) => error!(alert_id = id, error = %err, "failed to acknowledge alert"),
            }
        }

        info!(
            acknowledged = acknowledged.len(),
            requested = ids.len(),
            by = %by,
            "bulk acknowledgement finished"
        );

        Ok(acknowledged)
    }

    pub async fn dismiss_alert(&self, id: i64, by: impl Into<String>) -> Result<Alert> {
        let by = by.into();
        let mut alert = self.get_alert(id).await?;

        alert.is_active = false;

        let alert = self.store.save_alert(alert).await?;

        self.record_history(
            id,
            HistoryAction::Dismissed,
            Some(by.as_str()),
            "alert dismissed",
        )
        .await?;

        info!(alert_id = id, by = %by, "alert dismissed");

        Ok(alert)
    }

    /// Transitions every active alert whose expiry has passed to inactive,
    /// appending one EXPIRED history row each. Returns the number expired.
    pub async fn expire_old_alerts(&self) -> Result<usize> {
        let expired = self.store.find_expired(Utc::now()).await?;
        let count = expired.len();

        for mut alert in expired {
            let id = alert.id;
            alert.is_active = false;

            self.store.save_alert(alert).await?;
            self.record_history(
                id,
                HistoryAction::Expired,
                Some("SYSTEM"),
                "alert expired automatically",
            )
            .await?;

            debug!(alert_id = id, "alert expired");
        }

        if count > 0 {
            info!(count, "expired old alerts");
        }

        Ok(count)
    }

    pub async fn subscribe(&self, request: CreateSubscription) -> Result<AlertSubscription> {
        if request.user_id.trim().is_empty() {
            return Err(AlertError::InvalidInput(
                "subscription user id must not be empty".to_owned(),
            ));
        }

        match request.notification_method {
            NotificationMethod::Email
                if request.email.as_deref().unwrap_or("").trim().is_empty() =>
            {
                return Err(AlertError::InvalidInput(
                    "email notifications require an email address".to_owned(),
                ));
            }
            NotificationMethod::Sms
                if request
                    .phone_number
                    .as_deref()
                    .unwrap_or("")
                    .trim()
                    .is_empty() =>
            {
                return Err(AlertError::InvalidInput(
                    "sms notifications require a phone number".to_owned(),
                ));
            }
            _ => {}
        }

        let mut subscription =
            AlertSubscription::new(request.user_id, request.notification_method)
                .alert_types(request.alert_types);

        if let Some(parcel_id) = request.parcel_id {
            subscription = subscription.parcel_id(parcel_id);
        }

        if let Some(email) = request.email {
            subscription = subscription.email(email);
        }

        if let Some(phone_number) = request.phone_number {
            subscription = subscription.phone_number(phone_number);
        }

        let subscription = self.store.save_subscription(subscription).await?;

        info!(
            subscription_id = subscription.id,
            user_id = %subscription.user_id,
            parcel_id = subscription.parcel_id,
            "subscription created"
        );

        Ok(subscription)
    }

    pub async fn get_subscription(
        &self,
        user_id: &str,
        parcel_id: Option<i64>,
    ) -> Result<AlertSubscription> {
        let subscription = match parcel_id {
            Some(parcel_id) => {
                self.store
                    .find_subscription_by_user_and_parcel(user_id, parcel_id)
                    .await?
            }
            _ => self
                .store
                .find_subscriptions_by_user(user_id)
                .await?
                .into_iter()
                .next(),
        };

        subscription.ok_or_else(|| {
            AlertError::NotFound(format!("subscription not found for user {user_id}"))
        })
    }

    pub async fn get_subscriptions_for_parcel(
        &self,
        parcel_id: i64,
    ) -> Result<Vec<AlertSubscription>> {
        Ok(self.store.find_enabled_for_parcel(parcel_id).await?)
    }

    pub async fn get_alert_statistics(&self, parcel_id: Option<i64>) -> Result<AlertStatistics> {
        Ok(AlertStatistics {
            total: self.store.count_alerts(parcel_id).await?,
            active: self.store.count_active(parcel_id).await?,
            unacknowledged: self.store.count_unacknowledged(parcel_id).await?,
        })
    }

    /// Aggregates alerts over the trailing window: counts by type and
    /// severity, the acknowledgement rate in percent, and the mean minutes
    /// between alert time and acknowledgement.
    pub async fn get_alert_trends(
        &self,
        parcel_id: Option<i64>,
        days: i64,
    ) -> Result<AlertTrends> {
        let since = Utc::now() - Duration::days(days);
        let alerts = self.store.find_since(parcel_id, since).await?;

        let mut by_type: HashMap<AlertType, u64> = HashMap::new();
        let mut by_severity: HashMap<AlertSeverity, u64> = HashMap::new();

        for alert in &alerts {
            *by_type.entry(alert.alert_type).or_default() += 1;
            *by_severity.entry(alert.severity).or_default() += 1;
        }

        let acknowledged = alerts.iter().filter(|a| a.acknowledged).count();
        let acknowledgement_rate = if alerts.is_empty() {
            0.0
        } else {
            acknowledged as f64 / alerts.len() as f64 * 100.0
        };

        let response_minutes: Vec<i64> = alerts
            .iter()
            .filter(|a| a.acknowledged)
            .filter_map(|a| a.acknowledged_at.map(|at| (at - a.alert_time).num_minutes()))
            .collect();

        let avg_response_minutes = if response_minutes.is_empty() {
            0
        } else {
            response_minutes.iter().sum::<i64>() / response_minutes.len() as i64
        };

        Ok(AlertTrends {
            total: alerts.len() as u64,
            by_type,
            by_severity,
            acknowledgement_rate,
            avg_response_minutes,
        })
    }

    /// Store failures surface as a `Down` status, never as an error.
    pub async fn health(&self) -> ServiceHealth {
        let counts = async {
            Ok::<_, AlertError>((
                self.store.count_active(None).await?,
                self.store.count_unacknowledged(None).await?,
                self.store.count_enabled_subscriptions().await?,
            ))
        }
        .await;

        match counts {
            Ok((active_alerts, unacknowledged_alerts, enabled_subscriptions)) => ServiceHealth::Up {
                active_alerts,
                unacknowledged_alerts,
                enabled_subscriptions,
                checked_at: Utc::now(),
            },
            Err(err) => {
                error!(error = %err, "health check failed");

                ServiceHealth::Down {
                    error: err.to_string(),
                }
            }
        }
    }

    async fn record_history(
        &self,
        alert_id: i64,
        action: HistoryAction,
        performed_by: Option<&str>,
        notes: &str,
    ) -> Result<()> {
        let mut history = AlertHistory::new(alert_id, action).notes(notes);

        if let Some(performed_by) = performed_by {
            history = history.performed_by(performed_by);
        }

        self.store.append_history(history).await?;

        Ok(())
    }

    async fn notify_subscribers(&self, alert: &Alert) -> Result<()> {
        let Some(dispatcher) = self.dispatcher.as_ref() else {
            return Ok(());
        };

        let subscriptions = match alert.parcel_id {
            Some(parcel_id) => self.store.find_enabled_for_parcel(parcel_id).await?,
            _ => self.store.find_all_enabled().await?,
        };

        let matched = matching_subscriptions(alert, &subscriptions);

        if matched.is_empty() {
            return Ok(());
        }

        debug!(
            alert_id = alert.id,
            subscribers = matched.len(),
            "queueing subscriber notifications"
        );

        dispatcher
            .dispatch(alert.clone(), matched)
            .map_err(|err| AlertError::Store(agrialert_store::StoreError::Any(err)))
    }
}
