use agrialert_store::Alert;
use async_trait::async_trait;
use dyn_clone::DynClone;

/// Delivery channel abstraction. Implementations may fail transiently;
/// the dispatcher owns retry and backoff.
#[async_trait]
pub trait Notifier: DynClone + Send + Sync {
    async fn send_email(&self, address: &str, alert: &Alert) -> anyhow::Result<()>;

    async fn send_sms(&self, number: &str, alert: &Alert) -> anyhow::Result<()>;

    async fn send_push(&self, user_id: &str, alert: &Alert) -> anyhow::Result<()>;

    async fn send_in_app(&self, user_id: &str, alert: &Alert) -> anyhow::Result<()>;
}

dyn_clone::clone_trait_object!(Notifier);
