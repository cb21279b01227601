//! Template CRUD and render endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::Result;
use crate::server::AppState;
use crate::template::{
    CreateTemplateRequest, RenderedTemplate, Template, TemplateKind, TemplateListResponse,
    TemplateRef, UpdateTemplateRequest,
};

#[derive(Debug, Deserialize)]
pub struct ListTemplatesQuery {
    #[serde(rename = "type")]
    pub kind: Option<TemplateKind>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RenderTemplateRequest {
    #[serde(default)]
    pub variables: Option<serde_json::Value>,
}

/// POST /api/v1/templates - Create a new template
#[tracing::instrument(
    name = "http.create_template",
    skip(state, request),
    fields(name = %request.name)
)]
pub async fn create_template(
    State(state): State<AppState>,
    Json(request): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<Template>)> {
    let created = state.template_store.create(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/templates - List active templates, optionally of one type
#[tracing::instrument(name = "http.list_templates", skip(state))]
pub async fn list_templates(
    State(state): State<AppState>,
    Query(query): Query<ListTemplatesQuery>,
) -> Result<Json<TemplateListResponse>> {
    let templates = match query.kind {
        Some(kind) => state.template_store.find_by_type(kind).await?,
        None => state.template_store.find_all().await?,
    };
    let total = templates.len();

    Ok(Json(TemplateListResponse { templates, total }))
}

/// GET /api/v1/templates/{id}
#[tracing::instrument(name = "http.get_template", skip(state))]
pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Template>> {
    Ok(Json(state.template_store.find_by_id(id).await?))
}

/// PUT /api/v1/templates/{id}
#[tracing::instrument(name = "http.update_template", skip(state, request))]
pub async fn update_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateTemplateRequest>,
) -> Result<Json<Template>> {
    Ok(Json(state.template_store.update(id, request).await?))
}

/// DELETE /api/v1/templates/{id} - Retire a template
#[tracing::instrument(name = "http.delete_template", skip(state))]
pub async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.template_store.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/templates/{id}/render - Preview a template with variables
#[tracing::instrument(name = "http.render_template", skip(state, request))]
pub async fn render_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RenderTemplateRequest>,
) -> Result<Json<RenderedTemplate>> {
    let variables = request
        .variables
        .unwrap_or_else(|| serde_json::json!({}));

    let rendered = state
        .template_store
        .render(&TemplateRef::Id(id), &variables)
        .await?;

    Ok(Json(rendered))
}
