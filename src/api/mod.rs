//! API layer - HTTP endpoint handlers organized by domain.

mod health;
mod metrics;
mod routes;
mod template;

pub use health::health;
pub use metrics::prometheus_metrics;
pub use routes::{admin_routes, api_routes};
pub use template::{
    create_template, delete_template, get_template, list_templates, render_template,
    update_template, ListTemplatesQuery, RenderTemplateRequest,
};
