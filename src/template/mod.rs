//! Notification template system.
//!
//! This module provides:
//! - Template definitions with `{{variable}}` placeholders
//! - Storage backends (memory, PostgreSQL) behind [`TemplateBackend`]
//! - [`TemplateStore`] with soft-delete lifecycle and rendering
//! - Built-in templates seeded on startup
//!
//! # Example
//!
//! ```ignore
//! let store = TemplateStore::new(Arc::new(MemoryTemplateBackend::new()));
//! store.seed_defaults().await?;
//!
//! let rendered = store
//!     .render(
//!         &TemplateRef::Name("welcome_email".into()),
//!         &json!({"user_name": "Ada", "platform_name": "Shop"}),
//!     )
//!     .await?;
//! assert_eq!(rendered.subject, "Welcome to Shop!");
//! ```

mod backend;
pub mod defaults;
mod postgres_backend;
mod store;
mod substitution;
mod types;

use std::sync::Arc;

use crate::config::StorageConfig;
use crate::postgres::PostgresPool;

pub use backend::{MemoryTemplateBackend, TemplateBackend};
pub use postgres_backend::PostgresTemplateBackend;
pub use store::{render_template, TemplateStore};
pub use substitution::{placeholders, substitute_variables};
pub use types::{
    CreateTemplateRequest, RenderedTemplate, Template, TemplateError, TemplateKind,
    TemplateListResponse, TemplateRef, TemplateResult, TemplateState, UpdateTemplateRequest,
};

/// Create a template backend based on configuration.
///
/// `"postgres"` requires a pool; without one the memory backend is used.
pub fn create_template_backend(
    settings: &StorageConfig,
    postgres_pool: Option<Arc<PostgresPool>>,
) -> Arc<dyn TemplateBackend> {
    match settings.backend.as_str() {
        "postgres" => {
            if let Some(pool) = postgres_pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL template backend");
                Arc::new(PostgresTemplateBackend::new(pool.pool().clone()))
            } else {
                tracing::warn!(
                    "PostgreSQL backend requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryTemplateBackend::new())
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory template backend");
            Arc::new(MemoryTemplateBackend::new())
        }
    }
}
