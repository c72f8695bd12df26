use agrialert_store::{Alert, AlertSubscription};

/// Returns whether a single subscription should be notified for an alert.
///
/// Parcel scoping: a subscription without a parcel matches alerts for any
/// parcel; a scoped subscription only matches alerts for the same parcel
/// (or alerts without a parcel, which go to every enabled subscription).
/// Type filtering is exact set membership; an empty filter means all types.
pub fn subscription_matches(alert: &Alert, subscription: &AlertSubscription) -> bool {
    if !subscription.is_enabled {
        return false;
    }

    if let (Some(alert_parcel), Some(subscription_parcel)) =
        (alert.parcel_id, subscription.parcel_id)
    {
        if alert_parcel != subscription_parcel {
            return false;
        }
    }

    subscription.alert_types.is_empty()
        || subscription.alert_types.contains(&alert.alert_type)
}

/// Filters the subscriber set down to the subscriptions that should be
/// notified for the given alert. Pure function, preserves input order.
pub fn matching_subscriptions(
    alert: &Alert,
    subscriptions: &[AlertSubscription],
) -> Vec<AlertSubscription> {
    subscriptions
        .iter()
        .filter(|subscription| subscription_matches(alert, subscription))
        .cloned()
        .collect()
}
