//! Template lifecycle and rendering on top of a storage backend

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::metrics::TEMPLATES_ACTIVE;

use super::backend::TemplateBackend;
use super::defaults::default_templates;
use super::substitution::substitute_variables;
use super::types::{
    CreateTemplateRequest, RenderedTemplate, Template, TemplateError, TemplateKind,
    TemplateRef, TemplateResult, TemplateState, UpdateTemplateRequest,
};

/// Named notification templates with soft-delete lifecycle.
///
/// Every query ignores retired templates.
#[derive(Clone)]
pub struct TemplateStore {
    backend: Arc<dyn TemplateBackend>,
}

impl TemplateStore {
    pub fn new(backend: Arc<dyn TemplateBackend>) -> Self {
        Self { backend }
    }

    /// Backend type identifier
    pub fn backend_type(&self) -> &'static str {
        self.backend.backend_type()
    }

    /// Create a new template.
    ///
    /// Fails with `AlreadyExists` when an active template already uses the name.
    pub async fn create(&self, request: CreateTemplateRequest) -> TemplateResult<Template> {
        let template: Template = request.into();
        template.validate()?;

        if self.backend.find_active_by_name(&template.name).await?.is_some() {
            return Err(TemplateError::AlreadyExists(template.name));
        }

        self.backend.insert(&template).await?;
        TEMPLATES_ACTIVE.inc();

        tracing::info!(
            template_id = %template.id,
            name = %template.name,
            kind = %template.kind,
            "Template created"
        );

        Ok(template)
    }

    /// All active templates, newest first
    pub async fn find_all(&self) -> TemplateResult<Vec<Template>> {
        self.backend.list_active(None).await
    }

    /// Active templates of one kind, newest first
    pub async fn find_by_type(&self, kind: TemplateKind) -> TemplateResult<Vec<Template>> {
        self.backend.list_active(Some(kind)).await
    }

    /// Get an active template by id
    pub async fn find_by_id(&self, id: Uuid) -> TemplateResult<Template> {
        self.backend
            .get(id)
            .await?
            .filter(Template::is_active)
            .ok_or_else(|| TemplateError::NotFound(format!("Template with ID {} not found", id)))
    }

    /// Get an active template by name, `None` when there is none
    pub async fn find_by_name(&self, name: &str) -> TemplateResult<Option<Template>> {
        self.backend.find_active_by_name(name).await
    }

    /// Apply a partial update. Setting `is_active` to false retires the template.
    pub async fn update(
        &self,
        id: Uuid,
        updates: UpdateTemplateRequest,
    ) -> TemplateResult<Template> {
        let mut template = self.find_by_id(id).await?;

        if let Some(subject) = updates.subject {
            template.subject = subject;
        }

        if let Some(html_content) = updates.html_content {
            template.html_content = html_content;
        }

        if let Some(text_content) = updates.text_content {
            template.text_content = text_content;
        }

        if let Some(channels) = updates.channels {
            template.channels = channels;
        }

        if let Some(variables) = updates.variables {
            template.variables = variables;
        }

        if let Some(active) = updates.is_active {
            template.state = TemplateState::from_active(active);
        }

        template.validate()?;
        template.updated_at = Utc::now();

        self.backend.save(&template).await?;

        if !template.is_active() {
            TEMPLATES_ACTIVE.dec();
        }

        tracing::info!(template_id = %id, active = template.is_active(), "Template updated");
        Ok(template)
    }

    /// Soft delete. Retired templates stay in storage but are never returned.
    pub async fn delete(&self, id: Uuid) -> TemplateResult<()> {
        let mut template = self.find_by_id(id).await?;

        template.state = TemplateState::Retired;
        template.updated_at = Utc::now();
        self.backend.save(&template).await?;
        TEMPLATES_ACTIVE.dec();

        tracing::info!(template_id = %id, name = %template.name, "Template retired");
        Ok(())
    }

    /// Resolve a template by id or name and substitute `variables` into its
    /// subject, HTML and text parts.
    pub async fn render(
        &self,
        reference: &TemplateRef,
        variables: &serde_json::Value,
    ) -> TemplateResult<RenderedTemplate> {
        let template = match reference {
            TemplateRef::Id(id) => self.find_by_id(*id).await?,
            TemplateRef::Name(name) => self.find_by_name(name).await?.ok_or_else(|| {
                TemplateError::NotFound(format!("Template with name {} not found", name))
            })?,
        };

        Ok(render_template(&template, variables))
    }

    /// Insert the built-in templates that are not present yet.
    ///
    /// Existing active templates with the same name are never overwritten.
    /// Returns the number of templates inserted.
    pub async fn seed_defaults(&self) -> TemplateResult<usize> {
        let mut seeded = 0;

        for definition in default_templates() {
            if self.find_by_name(&definition.name).await?.is_some() {
                tracing::debug!(name = %definition.name, "Template already present, skipping seed");
                continue;
            }

            let name = definition.name.clone();
            self.create(definition).await?;
            seeded += 1;
            tracing::info!(name = %name, "Seeded template");
        }

        Ok(seeded)
    }

    /// Recompute the active-template gauge from storage
    pub async fn refresh_metrics(&self) -> TemplateResult<()> {
        let active = self.backend.list_active(None).await?.len();
        TEMPLATES_ACTIVE.set(active as i64);
        Ok(())
    }
}

/// Substitute variables into every part of a template
pub fn render_template(template: &Template, variables: &serde_json::Value) -> RenderedTemplate {
    RenderedTemplate {
        template_id: template.id,
        subject: substitute_variables(&template.subject, variables),
        html_content: substitute_variables(&template.html_content, variables),
        text_content: template
            .text_content
            .as_deref()
            .map(|text| substitute_variables(text, variables)),
    }
}
