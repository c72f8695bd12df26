use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Postgres, QueryBuilder, Row};

use crate::{
    alert::{Alert, AlertHistory, AlertSeverity, AlertType},
    criteria::SearchCriteria,
    engine::Engine,
    error::{Result, StoreError},
    store::AlertStore,
    subscription::AlertSubscription,
};

impl AlertStore {
    pub fn pg(pool: &PgPool) -> Self {
        AlertStore::new(Pg::new(pool))
    }

    pub fn pg_with_prefix(pool: &PgPool, prefix: impl Into<String>) -> Self {
        AlertStore::new(Pg::new(pool).prefix(prefix))
    }
}

/// Postgres engine. Tables are prefixed so several deployments can share
/// one database; the default prefix is `agri`.
#[derive(Debug, Clone)]
pub struct Pg {
    pool: PgPool,
    prefix: Option<String>,
}

const SEVERITY_RANK: &str =
    "CASE severity WHEN 'CRITICAL' THEN 3 WHEN 'HIGH' THEN 2 WHEN 'MEDIUM' THEN 1 ELSE 0 END";

impl Pg {
    pub fn new(pool: &PgPool) -> Self {
        Self {
            pool: pool.clone(),
            prefix: None,
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());

        self
    }

    pub fn table(&self, name: impl Into<String>) -> String {
        format!(
            "{}_{}",
            self.prefix.as_ref().unwrap_or(&"agri".to_owned()),
            name.into()
        )
    }

    pub fn table_alerts(&self) -> String {
        self.table("alerts")
    }

    pub fn table_history(&self) -> String {
        self.table("alert_history")
    }

    pub fn table_subscriptions(&self) -> String {
        self.table("alert_subscriptions")
    }

    /// Creates the alert tables and indexes if they do not exist yet.
    pub async fn setup(&self) -> Result<()> {
        let table_alerts = self.table_alerts();
        let table_history = self.table_history();
        let table_subscriptions = self.table_subscriptions();

        sqlx::raw_sql(
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table_alerts} (
                    id BIGSERIAL PRIMARY KEY,
                    alert_type VARCHAR(32) NOT NULL,
                    severity VARCHAR(16) NOT NULL,
                    parcel_id BIGINT,
                    location TEXT,
                    title TEXT NOT NULL,
                    message TEXT NOT NULL,
                    alert_time TIMESTAMPTZ NOT NULL,
                    expiry_time TIMESTAMPTZ,
                    is_active BOOLEAN NOT NULL,
                    acknowledged BOOLEAN NOT NULL,
                    acknowledged_at TIMESTAMPTZ,
                    acknowledged_by TEXT,
                    metadata JSONB,
                    created_at TIMESTAMPTZ NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_{table_alerts}_active_time
                    ON {table_alerts} (is_active, alert_time DESC);

                CREATE INDEX IF NOT EXISTS idx_{table_alerts}_parcel
                    ON {table_alerts} (parcel_id);

                CREATE INDEX IF NOT EXISTS idx_{table_alerts}_type
                    ON {table_alerts} (alert_type);

                CREATE TABLE IF NOT EXISTS {table_history} (
                    id BIGSERIAL PRIMARY KEY,
                    alert_id BIGINT NOT NULL,
                    action VARCHAR(16) NOT NULL,
                    performed_by TEXT,
                    notes TEXT,
                    action_time TIMESTAMPTZ NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_{table_history}_alert
                    ON {table_history} (alert_id, id);

                CREATE TABLE IF NOT EXISTS {table_subscriptions} (
                    id BIGSERIAL PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    parcel_id BIGINT,
                    alert_types JSONB NOT NULL,
                    notification_method VARCHAR(16) NOT NULL,
                    email TEXT,
                    phone_number TEXT,
                    is_enabled BOOLEAN NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_{table_subscriptions}_user
                    ON {table_subscriptions} (user_id);
                "#
            )
            .as_str(),
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_alerts(&self, sql: String) -> Result<Vec<Alert>> {
        let rows = sqlx::query(sql.as_str()).fetch_all(&self.pool).await?;

        rows.iter().map(alert_from_row).collect()
    }
}

fn alert_from_row(row: &PgRow) -> Result<Alert> {
    Ok(Alert {
        id: row.try_get("id")?,
        alert_type: row.try_get::<String, _>("alert_type")?.parse()?,
        severity: row.try_get::<String, _>("severity")?.parse()?,
        parcel_id: row.try_get("parcel_id")?,
        location: row.try_get("location")?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        alert_time: row.try_get("alert_time")?,
        expiry_time: row.try_get("expiry_time")?,
        is_active: row.try_get("is_active")?,
        acknowledged: row.try_get("acknowledged")?,
        acknowledged_at: row.try_get("acknowledged_at")?,
        acknowledged_by: row.try_get("acknowledged_by")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

fn history_from_row(row: &PgRow) -> Result<AlertHistory> {
    Ok(AlertHistory {
        id: row.try_get("id")?,
        alert_id: row.try_get("alert_id")?,
        action: row.try_get::<String, _>("action")?.parse()?,
        performed_by: row.try_get("performed_by")?,
        notes: row.try_get("notes")?,
        action_time: row.try_get("action_time")?,
    })
}

fn subscription_from_row(row: &PgRow) -> Result<AlertSubscription> {
    Ok(AlertSubscription {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        parcel_id: row.try_get("parcel_id")?,
        alert_types: serde_json::from_value(row.try_get("alert_types")?)?,
        notification_method: row.try_get::<String, _>("notification_method")?.parse()?,
        email: row.try_get("email")?,
        phone_number: row.try_get("phone_number")?,
        is_enabled: row.try_get("is_enabled")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl Engine for Pg {
    async fn save_alert(&self, mut alert: Alert) -> Result<Alert> {
        let table_alerts = self.table_alerts();

        if alert.id == 0 {
            let id: i64 = sqlx::query_scalar(
                format!(
                    r#"
                    INSERT INTO {table_alerts} (
                        alert_type, severity, parcel_id, location, title, message,
                        alert_time, expiry_time, is_active, acknowledged,
                        acknowledged_at, acknowledged_by, metadata, created_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                    RETURNING id
                    "#
                )
                .as_str(),
            )
            .bind(alert.alert_type.to_string())
            .bind(alert.severity.to_string())
            .bind(alert.parcel_id)
            .bind(&alert.location)
            .bind(&alert.title)
            .bind(&alert.message)
            .bind(alert.alert_time)
            .bind(alert.expiry_time)
            .bind(alert.is_active)
            .bind(alert.acknowledged)
            .bind(alert.acknowledged_at)
            .bind(&alert.acknowledged_by)
            .bind(&alert.metadata)
            .bind(alert.created_at)
            .fetch_one(&self.pool)
            .await?;

            alert.id = id;

            return Ok(alert);
        }

        let updated: Option<i64> = sqlx::query_scalar(
            format!(
                r#"
                UPDATE {table_alerts}
                SET alert_type = $2, severity = $3, parcel_id = $4, location = $5,
                    title = $6, message = $7, alert_time = $8, expiry_time = $9,
                    is_active = $10, acknowledged = $11, acknowledged_at = $12,
                    acknowledged_by = $13, metadata = $14
                WHERE id = $1
                RETURNING id
                "#
            )
            .as_str(),
        )
        .bind(alert.id)
        .bind(alert.alert_type.to_string())
        .bind(alert.severity.to_string())
        .bind(alert.parcel_id)
        .bind(&alert.location)
        .bind(&alert.title)
        .bind(&alert.message)
        .bind(alert.alert_time)
        .bind(alert.expiry_time)
        .bind(alert.is_active)
        .bind(alert.acknowledged)
        .bind(alert.acknowledged_at)
        .bind(&alert.acknowledged_by)
        .bind(&alert.metadata)
        .fetch_optional(&self.pool)
        .await?;

        if updated.is_none() {
            return Err(StoreError::UnknownAlert(alert.id));
        }

        Ok(alert)
    }

    async fn find_alert(&self, id: i64) -> Result<Option<Alert>> {
        let table_alerts = self.table_alerts();

        let row = sqlx::query(format!("SELECT * FROM {table_alerts} WHERE id = $1").as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(alert_from_row).transpose()
    }

    async fn find_active(&self) -> Result<Vec<Alert>> {
        let table_alerts = self.table_alerts();

        self.fetch_alerts(format!(
            "SELECT * FROM {table_alerts} WHERE is_active ORDER BY alert_time DESC, id DESC"
        ))
        .await
    }

    async fn find_active_by_parcel(&self, parcel_id: i64) -> Result<Vec<Alert>> {
        let table_alerts = self.table_alerts();

        let rows = sqlx::query(
            format!(
                r#"
                SELECT * FROM {table_alerts}
                WHERE is_active AND parcel_id = $1
                ORDER BY alert_time DESC, id DESC
                "#
            )
            .as_str(),
        )
        .bind(parcel_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(alert_from_row).collect()
    }

    async fn find_active_by_type(&self, alert_type: AlertType) -> Result<Vec<Alert>> {
        let table_alerts = self.table_alerts();

        let rows = sqlx::query(
            format!(
                r#"
                SELECT * FROM {table_alerts}
                WHERE is_active AND alert_type = $1
                ORDER BY alert_time DESC, id DESC
                "#
            )
            .as_str(),
        )
        .bind(alert_type.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(alert_from_row).collect()
    }

    async fn find_active_by_severity(&self, severity: AlertSeverity) -> Result<Vec<Alert>> {
        let table_alerts = self.table_alerts();

        let rows = sqlx::query(
            format!(
                r#"
                SELECT * FROM {table_alerts}
                WHERE is_active AND severity = $1
                ORDER BY alert_time DESC, id DESC
                "#
            )
            .as_str(),
        )
        .bind(severity.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(alert_from_row).collect()
    }

    async fn find_active_since(&self, since: DateTime<Utc>) -> Result<Vec<Alert>> {
        let table_alerts = self.table_alerts();

        let rows = sqlx::query(
            format!(
                r#"
                SELECT * FROM {table_alerts}
                WHERE is_active AND alert_time >= $1
                ORDER BY alert_time DESC, id DESC
                "#
            )
            .as_str(),
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(alert_from_row).collect()
    }

    async fn find_unacknowledged(&self) -> Result<Vec<Alert>> {
        let table_alerts = self.table_alerts();

        self.fetch_alerts(format!(
            r#"
            SELECT * FROM {table_alerts}
            WHERE is_active AND NOT acknowledged
            ORDER BY {SEVERITY_RANK} DESC, alert_time DESC, id DESC
            "#
        ))
        .await
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Alert>> {
        let table_alerts = self.table_alerts();

        let rows = sqlx::query(
            format!(
                r#"
                SELECT * FROM {table_alerts}
                WHERE is_active AND expiry_time IS NOT NULL AND expiry_time < $1
                ORDER BY alert_time DESC, id DESC
                "#
            )
            .as_str(),
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(alert_from_row).collect()
    }

    async fn find_since(
        &self,
        parcel_id: Option<i64>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Alert>> {
        let table_alerts = self.table_alerts();

        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT * FROM {table_alerts} WHERE alert_time >= "));
        query.push_bind(since);

        if let Some(parcel_id) = parcel_id {
            query.push(" AND parcel_id = ").push_bind(parcel_id);
        }

        query.push(" ORDER BY alert_time DESC, id DESC");

        let rows = query.build().fetch_all(&self.pool).await?;

        rows.iter().map(alert_from_row).collect()
    }

    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<Alert>> {
        let table_alerts = self.table_alerts();

        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT * FROM {table_alerts} WHERE TRUE"));

        if let Some(parcel_id) = criteria.parcel_id {
            query.push(" AND parcel_id = ").push_bind(parcel_id);
        }

        if let Some(alert_type) = criteria.alert_type {
            query.push(" AND alert_type = ").push_bind(alert_type.to_string());
        }

        if let Some(severity) = criteria.severity {
            query.push(" AND severity = ").push_bind(severity.to_string());
        }

        if let Some(is_active) = criteria.is_active {
            query.push(" AND is_active = ").push_bind(is_active);
        }

        if let Some(acknowledged) = criteria.acknowledged {
            query.push(" AND acknowledged = ").push_bind(acknowledged);
        }

        if let Some(from) = criteria.from {
            query.push(" AND alert_time >= ").push_bind(from);
        }

        if let Some(to) = criteria.to {
            query.push(" AND alert_time <= ").push_bind(to);
        }

        query.push(" ORDER BY alert_time DESC, id DESC");

        if let Some(limit) = criteria.limit {
            query.push(" LIMIT ").push_bind(limit as i64);
        }

        if let Some(offset) = criteria.offset {
            query.push(" OFFSET ").push_bind(offset as i64);
        }

        let rows = query.build().fetch_all(&self.pool).await?;

        rows.iter().map(alert_from_row).collect()
    }

    async fn count_alerts(&self, parcel_id: Option<i64>) -> Result<i64> {
        let table_alerts = self.table_alerts();

        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {table_alerts} WHERE TRUE"));

        if let Some(parcel_id) = parcel_id {
            query.push(" AND parcel_id = ").push_bind(parcel_id);
        }

        let count: i64 = query.build_query_scalar().fetch_one(&self.pool).await?;

        Ok(count)
    }

    async fn count_active(&self, parcel_id: Option<i64>) -> Result<i64> {
        let table_alerts = self.table_alerts();

        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {table_alerts} WHERE is_active"));

        if let Some(parcel_id) = parcel_id {
            query.push(" AND parcel_id = ").push_bind(parcel_id);
        }

        let count: i64 = query.build_query_scalar().fetch_one(&self.pool).await?;

        Ok(count)
    }

    async fn count_unacknowledged(&self, parcel_id: Option<i64>) -> Result<i64> {
        let table_alerts = self.table_alerts();

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT COUNT(*) FROM {table_alerts} WHERE is_active AND NOT acknowledged"
        ));

        if let Some(parcel_id) = parcel_id {
            query.push(" AND parcel_id = ").push_bind(parcel_id);
        }

        let count: i64 = query.build_query_scalar().fetch_one(&self.pool).await?;

        Ok(count)
    }

    async fn append_history(&self, mut history: AlertHistory) -> Result<AlertHistory> {
        let table_history = self.table_history();

        let id: i64 = sqlx::query_scalar(
            format!(
                r#"
                INSERT INTO {table_history} (alert_id, action, performed_by, notes, action_time)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#
            )
            .as_str(),
        )
        .bind(history.alert_id)
        .bind(history.action.to_string())
        .bind(&history.performed_by)
        .bind(&history.notes)
        .bind(history.action_time)
        .fetch_one(&self.pool)
        .await?;

        history.id = id;

        Ok(history)
    }

    async fn find_history(&self, alert_id: i64) -> Result<Vec<AlertHistory>> {
        let table_history = self.table_history();

        let rows = sqlx::query(
            format!("SELECT * FROM {table_history} WHERE alert_id = $1 ORDER BY id ASC").as_str(),
        )
        .bind(alert_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(history_from_row).collect()
    }

    async fn save_subscription(
        &self,
        mut subscription: AlertSubscription,
    ) -> Result<AlertSubscription> {
        let table_subscriptions = self.table_subscriptions();
        let alert_types = serde_json::to_value(&subscription.alert_types)?;

        if subscription.id == 0 {
            let id: i64 = sqlx::query_scalar(
                format!(
                    r#"
                    INSERT INTO {table_subscriptions} (
                        user_id, parcel_id, alert_types, notification_method,
                        email, phone_number, is_enabled, created_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    RETURNING id
                    "#
                )
                .as_str(),
            )
            .bind(&subscription.user_id)
            .bind(subscription.parcel_id)
            .bind(&alert_types)
            .bind(subscription.notification_method.to_string())
            .bind(&subscription.email)
            .bind(&subscription.phone_number)
            .bind(subscription.is_enabled)
            .bind(subscription.created_at)
            .fetch_one(&self.pool)
            .await?;

            subscription.id = id;

            return Ok(subscription);
        }

        let updated: Option<i64> = sqlx::query_scalar(
            format!(
                r#"
                UPDATE {table_subscriptions}
                SET user_id = $2, parcel_id = $3, alert_types = $4, notification_method = $5,
                    email = $6, phone_number = $7, is_enabled = $8
                WHERE id = $1
                RETURNING id
                "#
            )
            .as_str(),
        )
        .bind(subscription.id)
        .bind(&subscription.user_id)
        .bind(subscription.parcel_id)
        .bind(&alert_types)
        .bind(subscription.notification_method.to_string())
        .bind(&subscription.email)
        .bind(&subscription.phone_number)
        .bind(subscription.is_enabled)
        .fetch_optional(&self.pool)
        .await?;

        if updated.is_none() {
            return Err(StoreError::UnknownSubscription(subscription.id));
        }

        Ok(subscription)
    }

    async fn find_subscription(&self, id: i64) -> Result<Option<AlertSubscription>> {
        let table_subscriptions = self.table_subscriptions();

        let row =
            sqlx::query(format!("SELECT * FROM {table_subscriptions} WHERE id = $1").as_str())
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn find_subscriptions_by_user(&self, user_id: &str) -> Result<Vec<AlertSubscription>> {
        let table_subscriptions = self.table_subscriptions();

        let rows = sqlx::query(
            format!("SELECT * FROM {table_subscriptions} WHERE user_id = $1 ORDER BY id ASC")
                .as_str(),
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(subscription_from_row).collect()
    }

    async fn find_subscription_by_user_and_parcel(
        &self,
        user_id: &str,
        parcel_id: i64,
    ) -> Result<Option<AlertSubscription>> {
        let table_subscriptions = self.table_subscriptions();

        let row = sqlx::query(
            format!(
                r#"
                SELECT * FROM {table_subscriptions}
                WHERE user_id = $1 AND parcel_id = $2
                ORDER BY id ASC
                LIMIT 1
                "#
            )
            .as_str(),
        )
        .bind(user_id)
        .bind(parcel_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn find_enabled_for_parcel(&self, parcel_id: i64) -> Result<Vec<AlertSubscription>> {
        let table_subscriptions = self.table_subscriptions();

        let rows = sqlx::query(
            format!(
                r#"
                SELECT * FROM {table_subscriptions}
                WHERE is_enabled AND (parcel_id = $1 OR parcel_id IS NULL)
                ORDER BY id ASC
                "#
            )
            .as_str(),
        )
        .bind(parcel_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(subscription_from_row).collect()
    }

    async fn find_all_enabled(&self) -> Result<Vec<AlertSubscription>> {
        let table_subscriptions = self.table_subscriptions();

        let rows = sqlx::query(
            format!("SELECT * FROM {table_subscriptions} WHERE is_enabled ORDER BY id ASC")
                .as_str(),
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(subscription_from_row).collect()
    }

    async fn count_enabled_subscriptions(&self) -> Result<i64> {
        let table_subscriptions = self.table_subscriptions();

        let count: i64 = sqlx::query_scalar(
            format!("SELECT COUNT(*) FROM {table_subscriptions} WHERE is_enabled").as_str(),
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
