//! PostgreSQL-based template backend.
//!
//! Table structure:
//! - `notification_templates` - one row per template version; a partial unique
//!   index keeps at most one active row per name

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::notification::Channel;

use super::backend::TemplateBackend;
use super::types::{Template, TemplateError, TemplateKind, TemplateResult, TemplateState};

const SELECT_COLUMNS: &str = "id, name, subject, html_content, text_content, type, channels, \
                              variables, is_active, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: Uuid,
    name: String,
    subject: String,
    html_content: String,
    text_content: Option<String>,
    #[sqlx(rename = "type")]
    kind: String,
    channels: Vec<String>,
    variables: Json<serde_json::Value>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TemplateRow> for Template {
    type Error = TemplateError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        let kind: TemplateKind = row.kind.parse().map_err(TemplateError::InvalidTemplate)?;
        let channels = row
            .channels
            .iter()
            .map(|c| c.parse::<Channel>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(TemplateError::InvalidTemplate)?;

        Ok(Template {
            id: row.id,
            name: row.name,
            subject: row.subject,
            html_content: row.html_content,
            text_content: row.text_content,
            kind,
            channels,
            variables: row.variables.0,
            state: TemplateState::from_active(row.is_active),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn channel_names(template: &Template) -> Vec<String> {
    template
        .channels
        .iter()
        .map(|c| c.as_str().to_string())
        .collect()
}

/// PostgreSQL-based template backend.
pub struct PostgresTemplateBackend {
    pool: PgPool,
}

impl PostgresTemplateBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateBackend for PostgresTemplateBackend {
    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn insert(&self, template: &Template) -> TemplateResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_templates
                (id, name, subject, html_content, text_content, type, channels, variables,
                 is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(template.id)
        .bind(&template.name)
        .bind(&template.subject)
        .bind(&template.html_content)
        .bind(&template.text_content)
        .bind(template.kind.as_str())
        .bind(channel_names(template))
        .bind(Json(&template.variables))
        .bind(template.is_active())
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(&self.pool)
        .await?;

        tracing::trace!(template_id = %template.id, "Template inserted into PostgreSQL");
        Ok(())
    }

    async fn save(&self, template: &Template) -> TemplateResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE notification_templates
            SET subject = $2, html_content = $3, text_content = $4, channels = $5,
                variables = $6, is_active = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(template.id)
        .bind(&template.subject)
        .bind(&template.html_content)
        .bind(&template.text_content)
        .bind(channel_names(template))
        .bind(Json(&template.variables))
        .bind(template.is_active())
        .bind(template.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TemplateError::NotFound(template.id.to_string()));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> TemplateResult<Option<Template>> {
        let row: Option<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {} FROM notification_templates WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Template::try_from).transpose()
    }

    async fn find_active_by_name(&self, name: &str) -> TemplateResult<Option<Template>> {
        let row: Option<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {} FROM notification_templates WHERE name = $1 AND is_active LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Template::try_from).transpose()
    }

    async fn list_active(&self, kind: Option<TemplateKind>) -> TemplateResult<Vec<Template>> {
        let rows: Vec<TemplateRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM notification_templates
            WHERE is_active AND ($1::TEXT IS NULL OR type = $1)
            ORDER BY created_at DESC
            "#,
            SELECT_COLUMNS
        ))
        .bind(kind.map(|k| k.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Template::try_from).collect()
    }
}
