//! HTTP trigger: send, retry and ledger queries

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::ledger::{DeliveryStats, DEFAULT_HISTORY_LIMIT, DEFAULT_STATS_DAYS};
use crate::metrics::DispatchMetrics;
use crate::notification::{Channel, NotificationLog, SendRequest, SendResult};
use crate::server::AppState;

/// Upper bound for `?limit=` on history queries
const MAX_HISTORY_LIMIT: usize = 500;

/// Upper bound for `?days=` on stats queries
const MAX_STATS_DAYS: u32 = 36_500;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub recipient_id: Option<String>,
    pub days: Option<u32>,
}

/// POST /api/v1/notifications/send
///
/// 202 once a ledger row exists, whatever the delivery outcome. Requests that
/// fail validation get 400 with the same body shape.
#[tracing::instrument(name = "http.send_notification", skip(state, payload))]
pub async fn send_notification(
    State(state): State<AppState>,
    payload: std::result::Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<(StatusCode, Json<SendResult>)> {
    let Json(body) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let request = match parse_send_request(body) {
        Ok(request) => request,
        Err(error) => {
            DispatchMetrics::record_rejected();
            tracing::warn!(error = %error, "Send request rejected");
            return Ok((StatusCode::BAD_REQUEST, Json(SendResult::rejected(error))));
        }
    };

    let result = state.dispatcher.dispatch(request).await?;

    let status = if result.notification_id.is_some() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::BAD_REQUEST
    };

    Ok((status, Json(result)))
}

/// Decode a send body. Unknown channel names get the same error the
/// dispatcher gives for channels without a transport.
fn parse_send_request(body: serde_json::Value) -> std::result::Result<SendRequest, String> {
    if let Some(channel) = body.get("channel").and_then(|c| c.as_str()) {
        if channel.parse::<Channel>().is_err() {
            return Err(format!("Unsupported notification channel: {}", channel));
        }
    }

    serde_json::from_value(body).map_err(|e| format!("Invalid send request: {}", e))
}

/// GET /api/v1/notifications/history/{recipient_id}
#[tracing::instrument(name = "http.get_history", skip(state))]
pub async fn get_history(
    State(state): State<AppState>,
    Path(recipient_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<NotificationLog>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let history = state.ledger.find_history(&recipient_id, limit).await?;
    Ok(Json(history))
}

/// GET /api/v1/notifications/{id}
#[tracing::instrument(name = "http.get_notification", skip(state))]
pub async fn get_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<NotificationLog>> {
    let log = state
        .ledger
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))?;

    Ok(Json(log))
}

/// GET /api/v1/notifications/stats
#[tracing::instrument(name = "http.get_stats", skip(state))]
pub async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<DeliveryStats>> {
    let days = query.days.unwrap_or(DEFAULT_STATS_DAYS);
    if !(1..=MAX_STATS_DAYS).contains(&days) {
        return Err(AppError::Validation(format!(
            "days must be between 1 and {}",
            MAX_STATS_DAYS
        )));
    }

    let since = Utc::now() - Duration::days(i64::from(days));
    let recipient_id = query.recipient_id.as_deref().filter(|r| !r.is_empty());

    let stats = state.ledger.stats(recipient_id, since).await?;
    Ok(Json(stats))
}

/// POST /api/v1/notifications/retry/{id}
///
/// 202 when the retry ran, 409 when the row is missing or not failed.
#[tracing::instrument(name = "http.retry_notification", skip(state))]
pub async fn retry_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SendResult>)> {
    let result = state.dispatcher.retry(id).await?;

    let status = if result.notification_id.is_some() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CONFLICT
    };

    Ok((status, Json(result)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_send_request_unknown_channel() {
        let err = parse_send_request(json!({
            "recipientId": "u1",
            "channel": "fax",
            "content": "Hi"
        }))
        .unwrap_err();
        assert_eq!(err, "Unsupported notification channel: fax");
    }

    #[test]
    fn test_parse_send_request_missing_recipient() {
        let err = parse_send_request(json!({"channel": "email", "content": "Hi"})).unwrap_err();
        assert!(err.starts_with("Invalid send request"));

        let request = parse_send_request(json!({
            "recipientId": "u1",
            "recipientEmail": "a@b.com",
            "channel": "sms",
            "content": "Hi"
        }))
        .unwrap();
        assert_eq!(request.channel, Channel::Sms);
    }
}
