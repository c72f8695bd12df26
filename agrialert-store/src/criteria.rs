use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::{AlertSeverity, AlertType};

/// Conjunctive alert search filter. Unset fields do not constrain the
/// result; results are always newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub parcel_id: Option<i64>,
    pub alert_type: Option<AlertType>,
    pub severity: Option<AlertSeverity>,
    pub is_active: Option<bool>,
    pub acknowledged: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl SearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parcel_id(mut self, v: i64) -> Self {
        self.parcel_id = Some(v);

        self
    }

    pub fn alert_type(mut self, v: AlertType) -> Self {
        self.alert_type = Some(v);

        self
    }

    pub fn severity(mut self, v: AlertSeverity) -> Self {
        self.severity = Some(v);

        self
    }

    pub fn is_active(mut self, v: bool) -> Self {
        self.is_active = Some(v);

        self
    }

    pub fn acknowledged(mut self, v: bool) -> Self {
        self.acknowledged = Some(v);

        self
    }

    pub fn from(mut self, v: DateTime<Utc>) -> Self {
        self.from = Some(v);

        self
    }

    pub fn to(mut self, v: DateTime<Utc>) -> Self {
        self.to = Some(v);

        self
    }

    pub fn limit(mut self, v: usize) -> Self {
        self.limit = Some(v);

        self
    }

    pub fn offset(mut self, v: usize) -> Self {
        self.offset = Some(v);

        self
    }
}
