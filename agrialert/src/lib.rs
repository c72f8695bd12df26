#![forbid(unsafe_code)]

mod dispatcher;
mod error;
mod matcher;
mod notifier;
mod scheduler;
mod service;
mod stream;

pub use dispatcher::*;
pub use error::*;
pub use matcher::*;
pub use notifier::*;
pub use scheduler::*;
pub use service::*;
pub use stream::*;

pub use agrialert_store as store;
pub use agrialert_store::{
    Alert, AlertHistory, AlertSeverity, AlertStore, AlertSubscription, AlertType, HistoryAction,
    NotificationMethod, SearchCriteria,
};
