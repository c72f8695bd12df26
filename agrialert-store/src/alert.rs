use chrono::{DateTime, Duration, Utc};
use parse_display::{Display, FromStr};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, FromStr,
)]
#[display(style = "SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    Weather,
    Pest,
    Disease,
    Threshold,
    Irrigation,
    Fertilization,
    Harvest,
    System,
}

/// Ordered from least to most severe so `Ord` reflects severity rank,
/// not alphabetical order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    FromStr,
)]
#[display(style = "SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, FromStr)]
#[display(style = "SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryAction {
    Created,
    Acknowledged,
    Dismissed,
    Expired,
}

/// A persisted event that requires operator attention.
///
/// An alert starts active and unacknowledged. Acknowledgement is a one-way
/// transition while the alert is active; dismissal and expiry clear
/// `is_active` and are terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub parcel_id: Option<i64>,
    pub location: Option<String>,
    pub title: String,
    pub message: String,
    pub alert_time: DateTime<Utc>,
    pub expiry_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        severity: AlertSeverity,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: 0,
            alert_type,
            severity,
            parcel_id: None,
            location: None,
            title: title.into(),
            message: message.into(),
            alert_time: now,
            expiry_time: None,
            is_active: true,
            acknowledged: false,
            acknowledged_at: None,
            acknowledged_by: None,
            metadata: None,
            created_at: now,
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

    /// Sets the expiry relative to the alert time. Values of zero or less
    /// leave the alert without an expiry.
    pub fn expires_in(mut self, seconds: i64) -> Self {
        if seconds > 0 {
            self.expiry_time = Some(self.alert_time + Duration::seconds(seconds));
        }

        self
    }

    pub fn metadata<M: Serialize>(mut self, value: M) -> Result<Self> {
        self.metadata = Some(serde_json::to_value(&value)?);

        Ok(self)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expiry_time.map(|t| t < now).unwrap_or(false)
    }
}

/// One immutable audit row per alert state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertHistory {
    pub id: i64,
    pub alert_id: i64,
    pub action: HistoryAction,
    pub performed_by: Option<String>,
    pub notes: Option<String>,
    pub action_time: DateTime<Utc>,
}

impl AlertHistory {
    pub fn new(alert_id: i64, action: HistoryAction) -> Self {
        Self {
            id: 0,
            alert_id,
            action,
            performed_by: None,
            notes: None,
            action_time: Utc::now(),
        }
    }

    pub fn performed_by(mut self, v: impl Into<String>) -> Self {
        self.performed_by = Some(v.into());

        self
    }

    pub fn notes(mut self, v: impl Into<String>) -> Self {
        self.notes = Some(v.into());

        self
    }
}
