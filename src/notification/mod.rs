//! Notification types and dispatching.
//!
//! [`NotificationDispatcher`] runs every send through the same pipeline:
//! validate, append a pending ledger row, resolve content, call the channel
//! transport, record the outcome.

mod dispatcher;
mod types;

pub use dispatcher::{
    DispatcherStats, DispatcherStatsSnapshot, NotificationDispatcher, RETRY_NOT_ELIGIBLE,
};
pub use types::{
    Channel, NotificationLog, NotificationStatus, Priority, SendRequest, SendResult,
};
