//! Notification triggers: the HTTP API and the Redis domain event bus

mod dedup;
mod events;
mod http;
mod redis;

pub use dedup::EventDeduplicator;
pub use events::{
    DomainEvent, EventError, EventHandler, EventKind, OrderCreated, OrderShipped,
    PasswordResetRequested, UserCreated,
};
pub use self::http::{
    get_history, get_notification, get_stats, retry_notification, send_notification,
    HistoryQuery, StatsQuery,
};
pub use self::redis::RedisSubscriber;
