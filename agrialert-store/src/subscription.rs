use chrono::{DateTime, Utc};
use parse_display::{Display, FromStr};
use serde::{Deserialize, Serialize};

use crate::alert::AlertType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, FromStr)]
#[display(style = "SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationMethod {
    Email,
    Sms,
    Push,
    InApp,
    All,
}

/// A standing rule describing which alerts a user wants delivered and how.
///
/// An empty `alert_types` means "all types"; a missing `parcel_id` means
/// "all parcels". Type filtering is exact set membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSubscription {
    pub id: i64,
    pub user_id: String,
    pub parcel_id: Option<i64>,
    pub alert_types: Vec<AlertType>,
    pub notification_method: NotificationMethod,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl AlertSubscription {
    pub fn new(user_id: impl Into<String>, notification_method: NotificationMethod) -> Self {
        Self {
            id: 0,
            user_id: user_id.into(),
            parcel_id: None,
            alert_types: Vec::new(),
            notification_method,
            email: None,
            phone_number: None,
            is_enabled: true,
            created_at: Utc::now(),
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

    pub fn disabled(mut self) -> Self {
        self.is_enabled = false;

        self
    }
}
