//! Backend trait for template storage.
//!
//! Backends are plain storage: lifecycle rules (active-only lookups, name
//! uniqueness among active templates) live in `TemplateStore`.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::types::{Template, TemplateKind, TemplateResult};

/// Storage for notification templates.
///
/// Implementations must be thread-safe (`Send + Sync`) as they are shared
/// across request handlers.
#[async_trait]
pub trait TemplateBackend: Send + Sync {
    /// Backend type identifier for health output
    fn backend_type(&self) -> &'static str;

    /// Insert a new template row
    async fn insert(&self, template: &Template) -> TemplateResult<()>;

    /// Overwrite an existing template row
    async fn save(&self, template: &Template) -> TemplateResult<()>;

    /// Fetch a row by id regardless of its state
    async fn get(&self, id: Uuid) -> TemplateResult<Option<Template>>;

    /// Fetch the active template with the given name
    async fn find_active_by_name(&self, name: &str) -> TemplateResult<Option<Template>>;

    /// All active templates, newest first, optionally restricted to one kind
    async fn list_active(&self, kind: Option<TemplateKind>) -> TemplateResult<Vec<Template>>;
}

/// In-memory template backend.
///
/// Rows are never removed; retired templates stay in the map.
pub struct MemoryTemplateBackend {
    templates: DashMap<Uuid, Template>,
}

impl Default for MemoryTemplateBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTemplateBackend {
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
        }
    }
}

#[async_trait]
impl TemplateBackend for MemoryTemplateBackend {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, template: &Template) -> TemplateResult<()> {
        self.templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn save(&self, template: &Template) -> TemplateResult<()> {
        self.templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> TemplateResult<Option<Template>> {
        Ok(self.templates.get(&id).map(|t| t.clone()))
    }

    async fn find_active_by_name(&self, name: &str) -> TemplateResult<Option<Template>> {
        Ok(self
            .templates
            .iter()
            .find(|entry| entry.is_active() && entry.name == name)
            .map(|entry| entry.value().clone()))
    }

    async fn list_active(&self, kind: Option<TemplateKind>) -> TemplateResult<Vec<Template>> {
        let mut templates: Vec<Template> = self
            .templates
            .iter()
            .filter(|entry| entry.is_active())
            .filter(|entry| kind.map_or(true, |k| entry.kind == k))
            .map(|entry| entry.value().clone())
            .collect();

        templates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(templates)
    }
}
