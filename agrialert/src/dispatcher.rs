use agrialert_store::{Alert, AlertSubscription, NotificationMethod};
use backon::{ConstantBuilder, Retryable};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::notifier::Notifier;

pub const DEFAULT_ATTEMPTS: usize = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

struct Job {
    alert: Alert,
    subscriptions: Vec<AlertSubscription>,
}

enum Channel {
    Email(String),
    Sms(String),
    Push(String),
    InApp(String),
}

/// Best-effort, retried delivery of notifications.
///
/// Jobs are queued through a channel and drained by a background worker
/// that spawns one delivery task per matched subscription, so enqueueing
/// never blocks on delivery or its retries. Failures after the configured
/// attempts are logged and dropped.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::UnboundedSender<Job>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl NotificationDispatcher {
    pub fn builder<N: Notifier + 'static>(notifier: N) -> NotificationDispatcherBuilder {
        NotificationDispatcherBuilder {
            notifier: Box::new(notifier),
            attempts: DEFAULT_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn start<N: Notifier + 'static>(notifier: N) -> Self {
        Self::builder(notifier).start()
    }

    /// Queues one notification per matched subscription. Returns an error
    /// only when the dispatcher worker is no longer running.
    pub fn dispatch(
        &self,
        alert: Alert,
        subscriptions: Vec<AlertSubscription>,
    ) -> anyhow::Result<()> {
        self.tx
            .send(Job {
                alert,
                subscriptions,
            })
            .map_err(|_| anyhow::anyhow!("notification dispatcher is closed"))
    }

    /// Stops accepting jobs from this handle and waits for the worker to
    /// drain. The worker only exits once every cloned handle is gone.
    pub async fn close(self) {
        let handle = self.worker.lock().take();
        drop(self);

        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(error = %err, "notification dispatcher worker panicked");
            }
        }
    }
}

pub struct NotificationDispatcherBuilder {
    notifier: Box<dyn Notifier>,
    attempts: usize,
    retry_delay: Duration,
}

impl NotificationDispatcherBuilder {
    /// Total delivery attempts per channel, including the first one.
    pub fn attempts(mut self, v: usize) -> Self {
        self.attempts = v.max(1);

        self
    }

    /// Fixed delay between attempts.
    pub fn retry_delay(mut self, v: Duration) -> Self {
        self.retry_delay = v;

        self
    }

    pub fn start(self) -> NotificationDispatcher {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let notifier = self.notifier;
        let attempts = self.attempts;
        let retry_delay = self.retry_delay;

        let worker = tokio::spawn(async move {
            info!("notification dispatcher started");

            while let Some(job) = rx.recv().await {
                debug!(
                    alert_id = job.alert.id,
                    subscribers = job.subscriptions.len(),
                    "dispatching notifications"
                );

                for subscription in job.subscriptions {
                    let notifier = notifier.clone();
                    let alert = job.alert.clone();

                    tokio::spawn(async move {
                        deliver(notifier, alert, subscription, attempts, retry_delay).await;
                    });
                }
            }

            info!("notification dispatcher stopped");
        });

        NotificationDispatcher {
            tx,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }
}

/// Resolves the delivery channels for a subscription. A channel whose
/// address is missing is dropped with a log instead of being retried.
fn channels(subscription: &AlertSubscription) -> Vec<Channel> {
    let email = || {
        let Some(address) = subscription.email.clone() else {
            warn!(
                subscription_id = subscription.id,
                user_id = %subscription.user_id,
                "subscription has no email address, skipping email delivery"
            );

            return None;
        };

        Some(Channel::Email(address))
    };

    let sms = || {
        let Some(number) = subscription.phone_number.clone() else {
            warn!(
                subscription_id = subscription.id,
                user_id = %subscription.user_id,
                "subscription has no phone number, skipping sms delivery"
            );

            return None;
        };

        Some(Channel::Sms(number))
    };

    match subscription.notification_method {
        NotificationMethod::Email => email().into_iter().collect(),
        NotificationMethod::Sms => sms().into_iter().collect(),
        NotificationMethod::Push => vec![Channel::Push(subscription.user_id.to_owned())],
        NotificationMethod::InApp => vec![Channel::InApp(subscription.user_id.to_owned())],
        NotificationMethod::All => email()
            .into_iter()
            .chain(Some(Channel::Push(subscription.user_id.to_owned())))
            .collect(),
    }
}

async fn deliver(
    notifier: Box<dyn Notifier>,
    alert: Alert,
    subscription: AlertSubscription,
    attempts: usize,
    retry_delay: Duration,
) {
    for channel in channels(&subscription) {
        let result = (|| async { send(notifier.as_ref(), &alert, &channel).await })
            .retry(
                ConstantBuilder::default()
                    .with_delay(retry_delay)
                    .with_max_times(attempts.saturating_sub(1)),
            )
            .sleep(tokio::time::sleep)
            .notify(|err, dur| {
                warn!(
                    alert_id = alert.id,
                    subscription_id = subscription.id,
                    error = %err,
                    retry_in = ?dur,
                    "notification attempt failed"
                );
            })
            .await;

        match result {
            Ok(()) => debug!(
                alert_id = alert.id,
                subscription_id = subscription.id,
                "notification delivered"
            ),
            Err(err) => error!(
                alert_id = alert.id,
                subscription_id = subscription.id,
                attempts,
                error = %err,
                "failed to send notification, giving up"
            ),
        }
    }
}

async fn send(notifier: &dyn Notifier, alert: &Alert, channel: &Channel) -> anyhow::Result<()> {
    match channel {
        Channel::Email(address) => notifier.send_email(address, alert).await,
        Channel::Sms(number) => notifier.send_sms(number, alert).await,
        Channel::Push(user_id) => notifier.send_push(user_id, alert).await,
        Channel::InApp(user_id) => notifier.send_in_app(user_id, alert).await,
    }
}
