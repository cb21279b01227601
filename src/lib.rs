// Infrastructure layer (shared components)
pub mod infrastructure;

pub use infrastructure::metrics;
pub use infrastructure::postgres;
pub use infrastructure::redis;

pub mod config;
pub mod error;

// Domain layer (business logic)
pub mod ledger;
pub mod notification;
pub mod template;
pub mod transport;

// Application layer
pub mod api;
pub mod server;
pub mod triggers;
