use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use tracing;

use kairos_assignment::{AssignmentDetail, AssignmentService};
use kairos_core::AppContext;
use kairos_notify::{AssignmentEvent, MarkOutcome, NotificationDispatcher, NotificationPayload};

use crate::auth::{self, AuthenticatedUser, Role};
use crate::error::ApiError;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "kairos-api"
    }))
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub user_id: String,
    pub role: Role,
}

/// Development token mint. The production deployment fronts this service
/// with the platform's session layer instead.
pub async fn generate_token(
    Extension(ctx): Extension<AppContext>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.user_id.is_empty() {
        return Err(ApiError::bad_request("user_id is required"));
    }

    let token = auth::generate_token(
        &req.user_id,
        req.role,
        &ctx.config.server.jwt_secret,
        ctx.config.server.token_ttl_days,
    )
    .map_err(ApiError::from)?;

    Ok(Json(serde_json::json!({ "token": token })))
}

#[derive(Deserialize)]
pub struct AssignmentRequest {
    pub trainer_id: String,
    pub client_id: Option<String>,
    pub notes: Option<String>,
}

pub async fn request_assignment(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<AssignmentRequest>,
) -> Result<(StatusCode, Json<AssignmentDetail>), ApiError> {
    if req.trainer_id.is_empty() {
        return Err(ApiError::bad_request("trainer_id is required"));
    }

    // Clients act for themselves; trainers and admins name the client.
    let client_id = match user.role {
        Role::Client => match &req.client_id {
            Some(id) if *id != user.user_id => {
                return Err(ApiError::forbidden("clients may only request for themselves"));
            }
            _ => user.user_id.clone(),
        },
        Role::Trainer | Role::Admin => req
            .client_id
            .clone()
            .ok_or_else(|| ApiError::bad_request("client_id is required"))?,
    };

    let service = AssignmentService::new(ctx.clone());
    let detail = service
        .request_assignment(&client_id, &req.trainer_id, req.notes.as_deref())
        .await?;

    notify_assignment_change(&ctx, &detail, AssignmentEvent::Assigned).await;

    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn my_trainer(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Option<AssignmentDetail>>, ApiError> {
    let service = AssignmentService::new(ctx);
    let detail = service.client_trainer(&user.user_id).await?;
    Ok(Json(detail))
}

#[derive(Deserialize)]
pub struct RosterQuery {
    pub trainer_id: Option<String>,
}

pub async fn trainer_roster(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(params): Query<RosterQuery>,
) -> Result<Json<Vec<kairos_assignment::RosterEntry>>, ApiError> {
    let trainer_id = match user.role {
        Role::Trainer => user.user_id.clone(),
        Role::Admin => params
            .trainer_id
            .clone()
            .ok_or_else(|| ApiError::bad_request("trainer_id is required"))?,
        Role::Client => return Err(ApiError::forbidden("trainer or admin role required")),
    };

    let service = AssignmentService::new(ctx);
    let roster = service.trainer_roster(&trainer_id).await?;
    Ok(Json(roster))
}

pub async fn remove_assignment(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(client_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if user.role == Role::Client && client_id != user.user_id {
        return Err(ApiError::forbidden("clients may only remove their own assignment"));
    }

    let service = AssignmentService::new(ctx.clone());

    // Snapshot display data before the close; the notification needs names
    // the removed row no longer carries.
    let detail = service.client_trainer(&client_id).await?;

    let removed = service.remove_assignment(&client_id).await?;

    if removed.is_some() {
        if let Some(detail) = detail {
            notify_assignment_change(&ctx, &detail, AssignmentEvent::Removed).await;
        }
    }

    Ok(Json(serde_json::json!({ "removed": removed.is_some() })))
}

/// Both parties hear about an assignment change. Failures here never fail
/// the request; the mutation is already durable.
async fn notify_assignment_change(ctx: &AppContext, detail: &AssignmentDetail, event: AssignmentEvent) {
    let dispatcher = NotificationDispatcher::new(ctx.clone());
    let assignment = &detail.assignment;

    if let Err(e) = dispatcher
        .notify_trainer_assignment(
            &assignment.client_id,
            assignment.id,
            event,
            &assignment.trainer_id,
            &detail.trainer_name,
        )
        .await
    {
        tracing::warn!("Failed to notify client of assignment change: {}", e);
    }

    if let Err(e) = dispatcher
        .notify_trainer_assignment(
            &assignment.trainer_id,
            assignment.id,
            event,
            &assignment.client_id,
            &detail.client_name,
        )
        .await
    {
        tracing::warn!("Failed to notify trainer of assignment change: {}", e);
    }
}

#[derive(Deserialize)]
pub struct CreateNotificationRequest {
    pub user_id: String,
    pub payload: NotificationPayload,
    pub title: Option<String>,
    pub body: Option<String>,
}

/// Ingestion point for the platform's other subsystems (workout and
/// nutrition planners, achievement engine).
pub async fn create_notification(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if !user.can_dispatch() {
        return Err(ApiError::forbidden("trainer or admin role required"));
    }

    let (default_title, default_body) = req.payload.render();
    let title = req.title.as_deref().unwrap_or(&default_title);
    let body = req.body.as_deref().unwrap_or(&default_body);

    let dispatcher = NotificationDispatcher::new(ctx);
    let id = dispatcher
        .notify(&req.user_id, title, body, &req.payload)
        .await?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

#[derive(Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub unread_only: Option<bool>,
}

pub async fn get_notifications(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(params): Query<NotificationQuery>,
) -> Result<Json<Vec<kairos_core::types::Notification>>, ApiError> {
    let dispatcher = NotificationDispatcher::new(ctx);
    let notifications = dispatcher
        .list_notifications(
            &user.user_id,
            params.limit.unwrap_or(50),
            params.offset.unwrap_or(0),
            params.unread_only.unwrap_or(false),
        )
        .await?;
    Ok(Json(notifications))
}

pub async fn get_notification_counts(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let dispatcher = NotificationDispatcher::new(ctx);
    let unread = dispatcher.unread_count(&user.user_id).await?;
    Ok(Json(serde_json::json!({ "unread": unread })))
}

pub async fn mark_notification_read(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let dispatcher = NotificationDispatcher::new(ctx);
    let outcome = dispatcher.mark_read(&user.user_id, id).await?;

    let status = match outcome {
        MarkOutcome::Marked => "ok",
        MarkOutcome::AlreadyRead => "already_read",
    };
    Ok(Json(serde_json::json!({ "status": status })))
}

pub async fn mark_all_notifications_read(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let dispatcher = NotificationDispatcher::new(ctx);
    let updated = dispatcher.mark_all_read(&user.user_id).await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}
