use agrialert_store::{
    Alert, AlertHistory, AlertSeverity, AlertStore, AlertSubscription, AlertType, HistoryAction,
    NotificationMethod, SearchCriteria, StoreError,
};
use anyhow::Result;
use chrono::{Duration, Utc};

fn alert_at(minutes_ago: i64, severity: AlertSeverity) -> Alert {
    let mut alert = Alert::new(AlertType::Weather, severity, "Frost warning", "Frost expected");
    alert.alert_time = Utc::now() - Duration::minutes(minutes_ago);

    alert
}

pub async fn test_save_assigns_id(store: &AlertStore) -> Result<()> {
    let first = store.save_alert(alert_at(0, AlertSeverity::Low)).await?;
    let second = store.save_alert(alert_at(0, AlertSeverity::Low)).await?;

    assert!(first.id > 0);
    assert!(second.id > first.id);

    Ok(())
}

pub async fn test_update_roundtrip(store: &AlertStore) -> Result<()> {
    let mut alert = store.save_alert(alert_at(0, AlertSeverity::Low)).await?;
    alert.acknowledged = true;
    alert.acknowledged_by = Some("alice".to_owned());
    alert.acknowledged_at = Some(Utc::now());

    let updated = store.save_alert(alert.clone()).await?;
    assert_eq!(updated.id, alert.id);

    let found = store.find_alert(alert.id).await?.unwrap();
    assert!(found.acknowledged);
    assert_eq!(found.acknowledged_by.as_deref(), Some("alice"));

    Ok(())
}

pub async fn test_update_unknown_id_fails(store: &AlertStore) -> Result<()> {
    let mut alert = alert_at(0, AlertSeverity::Low);
    alert.id = 424242;

    let err = store.save_alert(alert).await.unwrap_err();
    assert!(matches!(err, StoreError::UnknownAlert(424242)));

    Ok(())
}

pub async fn test_find_active_newest_first(store: &AlertStore) -> Result<()> {
    let old = store.save_alert(alert_at(30, AlertSeverity::Low)).await?;
    let newer = store.save_alert(alert_at(10, AlertSeverity::Low)).await?;
    let newest = store.save_alert(alert_at(1, AlertSeverity::Low)).await?;

    let mut dismissed = store.save_alert(alert_at(5, AlertSeverity::Low)).await?;
    dismissed.is_active = false;
    store.save_alert(dismissed).await?;

    let active = store.find_active().await?;
    let ids: Vec<_> = active.iter().map(|a| a.id).collect();

    assert_eq!(ids, vec![newest.id, newer.id, old.id]);

    Ok(())
}

pub async fn test_find_unacknowledged_severity_then_time(store: &AlertStore) -> Result<()> {
    let low_recent = store.save_alert(alert_at(1, AlertSeverity::Low)).await?;
    let critical_old = store.save_alert(alert_at(60, AlertSeverity::Critical)).await?;
    let high_recent = store.save_alert(alert_at(5, AlertSeverity::High)).await?;
    let high_old = store.save_alert(alert_at(45, AlertSeverity::High)).await?;

    let mut acked = store.save_alert(alert_at(2, AlertSeverity::Critical)).await?;
    acked.acknowledged = true;
    store.save_alert(acked).await?;

    let unacked = store.find_unacknowledged().await?;
    let ids: Vec<_> = unacked.iter().map(|a| a.id).collect();

    assert_eq!(
        ids,
        vec![critical_old.id, high_recent.id, high_old.id, low_recent.id]
    );

    Ok(())
}

pub async fn test_find_expired_boundary(store: &AlertStore) -> Result<()> {
    let now = Utc::now();

    let mut past = alert_at(60, AlertSeverity::Low);
    past.expiry_time = Some(now - Duration::minutes(5));
    let past = store.save_alert(past).await?;

    let mut future = alert_at(60, AlertSeverity::Low);
    future.expiry_time = Some(now + Duration::minutes(5));
    store.save_alert(future).await?;

    let mut inactive = alert_at(60, AlertSeverity::Low);
    inactive.expiry_time = Some(now - Duration::minutes(5));
    inactive.is_active = false;
    store.save_alert(inactive).await?;

    store.save_alert(alert_at(60, AlertSeverity::Low)).await?;

    let expired = store.find_expired(now).await?;
    let ids: Vec<_> = expired.iter().map(|a| a.id).collect();

    assert_eq!(ids, vec![past.id]);

    Ok(())
}

pub async fn test_counts_scoped_by_parcel(store: &AlertStore) -> Result<()> {
    store
        .save_alert(alert_at(1, AlertSeverity::Low).parcel_id(5))
        .await?;

    let mut acked = alert_at(2, AlertSeverity::Low).parcel_id(5);
    acked.acknowledged = true;
    store.save_alert(acked).await?;

    let mut dismissed = alert_at(3, AlertSeverity::Low).parcel_id(5);
    dismissed.is_active = false;
    store.save_alert(dismissed).await?;

    store
        .save_alert(alert_at(4, AlertSeverity::Low).parcel_id(9))
        .await?;

    assert_eq!(store.count_alerts(Some(5)).await?, 3);
    assert_eq!(store.count_active(Some(5)).await?, 2);
    assert_eq!(store.count_unacknowledged(Some(5)).await?, 1);
    assert_eq!(store.count_alerts(None).await?, 4);
    assert_eq!(store.count_unacknowledged(None).await?, 2);

    Ok(())
}

pub async fn test_search_conjunction_and_paging(store: &AlertStore) -> Result<()> {
    for minutes_ago in [1, 2, 3, 4] {
        store
            .save_alert(alert_at(minutes_ago, AlertSeverity::High).parcel_id(5))
            .await?;
    }

    store
        .save_alert(alert_at(5, AlertSeverity::Low).parcel_id(5))
        .await?;
    store
        .save_alert(alert_at(6, AlertSeverity::High).parcel_id(9))
        .await?;

    let criteria = SearchCriteria::new()
        .parcel_id(5)
        .severity(AlertSeverity::High)
        .is_active(true);

    let all = store.search(&criteria).await?;
    assert_eq!(all.len(), 4);

    // newest first within the page window
    let page = store.search(&criteria.clone().limit(2).offset(1)).await?;
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].id, all[1].id);
    assert_eq!(page[1].id, all[2].id);

    Ok(())
}

pub async fn test_history_append_order(store: &AlertStore) -> Result<()> {
    let alert = store.save_alert(alert_at(0, AlertSeverity::Low)).await?;

    for action in [
        HistoryAction::Created,
        HistoryAction::Acknowledged,
        HistoryAction::Dismissed,
    ] {
        store
            .append_history(AlertHistory::new(alert.id, action).performed_by("alice"))
            .await?;
    }

    store
        .append_history(AlertHistory::new(alert.id + 1, HistoryAction::Created))
        .await?;

    let history = store.find_history(alert.id).await?;
    let actions: Vec<_> = history.iter().map(|h| h.action).collect();

    assert_eq!(
        actions,
        vec![
            HistoryAction::Created,
            HistoryAction::Acknowledged,
            HistoryAction::Dismissed
        ]
    );

    Ok(())
}

pub async fn test_enabled_for_parcel_includes_unscoped(store: &AlertStore) -> Result<()> {
    store
        .save_subscription(
            AlertSubscription::new("alice", NotificationMethod::Push).parcel_id(5),
        )
        .await?;
    store
        .save_subscription(AlertSubscription::new("bob", NotificationMethod::Push))
        .await?;
    store
        .save_subscription(
            AlertSubscription::new("carol", NotificationMethod::Push).parcel_id(9),
        )
        .await?;
    store
        .save_subscription(
            AlertSubscription::new("dave", NotificationMethod::Push)
                .parcel_id(5)
                .disabled(),
        )
        .await?;

    let matched = store.find_enabled_for_parcel(5).await?;
    let users: Vec<_> = matched.iter().map(|s| s.user_id.as_str()).collect();

    assert_eq!(users, vec!["alice", "bob"]);
    assert_eq!(store.count_enabled_subscriptions().await?, 3);

    Ok(())
}

pub async fn test_subscription_lookups(store: &AlertStore) -> Result<()> {
    let scoped = store
        .save_subscription(
            AlertSubscription::new("alice", NotificationMethod::Email)
                .parcel_id(5)
                .email("alice@example.com")
                .alert_types(vec![AlertType::Weather, AlertType::Pest]),
        )
        .await?;
    store
        .save_subscription(AlertSubscription::new("alice", NotificationMethod::Push))
        .await?;

    let found = store
        .find_subscription_by_user_and_parcel("alice", 5)
        .await?
        .unwrap();
    assert_eq!(found.id, scoped.id);
    assert_eq!(found.alert_types, vec![AlertType::Weather, AlertType::Pest]);

    assert!(store
        .find_subscription_by_user_and_parcel("alice", 7)
        .await?
        .is_none());

    assert_eq!(store.find_subscriptions_by_user("alice").await?.len(), 2);
    assert!(store.find_subscription(scoped.id).await?.is_some());

    Ok(())
}
