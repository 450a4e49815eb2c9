use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing;

use kairos_core::db::get_conn;
use kairos_core::redis::{publish, user_channel};
use kairos_core::schema::notifications;
use kairos_core::types::{NewNotification, Notification};
use kairos_core::{AppContext, Error};

use crate::payload::{AssignmentEvent, NotificationPayload};

/// Result of a mark-read call. Marking twice is a no-op, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Marked,
    AlreadyRead,
}

pub struct NotificationDispatcher {
    ctx: AppContext,
}

impl NotificationDispatcher {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Single entry point for creating a notification.
    ///
    /// The row is persisted first; the publish to the recipient's channel is
    /// best-effort, so a broker outage degrades to pull-only delivery
    /// instead of failing the operation.
    pub async fn notify(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        payload: &NotificationPayload,
    ) -> Result<i64, Error> {
        if user_id.is_empty() {
            return Err(Error::validation("recipient id must not be empty"));
        }
        if title.is_empty() || body.is_empty() {
            return Err(Error::validation("notification title and body are required"));
        }

        let payload_json = serde_json::to_value(payload)
            .map_err(|e| Error::validation(format!("unserializable payload: {}", e)))?;

        let mut conn = get_conn(&self.ctx.db_pool).await?;
        let notification: Notification = diesel::insert_into(notifications::table)
            .values(NewNotification {
                user_id,
                notification_type: payload.kind().as_str(),
                title,
                body,
                payload: payload_json,
            })
            .returning(Notification::as_select())
            .get_result(&mut conn)
            .await?;

        tracing::debug!(
            "Notification {} ({}) created for user {}",
            notification.id,
            notification.notification_type,
            user_id
        );

        self.publish_event(user_id, &notification).await;

        Ok(notification.id)
    }

    async fn publish_event(&self, user_id: &str, notification: &Notification) {
        let wire = match serde_json::to_string(notification) {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!("Failed to serialize notification {}: {}", notification.id, e);
                return;
            }
        };

        let channel = user_channel(user_id);
        if let Err(e) = publish(&self.ctx.redis_pool, &channel, &wire).await {
            // The row is already durable; the recipient will see it via the
            // pull API.
            tracing::warn!(
                "Live publish of notification {} failed: {}",
                notification.id,
                e
            );
        }
    }

    pub async fn notify_trainer_assignment(
        &self,
        user_id: &str,
        assignment_id: i64,
        event: AssignmentEvent,
        counterpart_id: &str,
        counterpart_name: &str,
    ) -> Result<i64, Error> {
        let payload = NotificationPayload::TrainerAssignment {
            assignment_id,
            event,
            counterpart_id: counterpart_id.to_string(),
            counterpart_name: counterpart_name.to_string(),
        };
        let (title, body) = payload.render();
        self.notify(user_id, &title, &body, &payload).await
    }

    pub async fn notify_workout_assigned(
        &self,
        user_id: &str,
        workout_id: &str,
        workout_name: &str,
    ) -> Result<i64, Error> {
        let payload = NotificationPayload::WorkoutAssignment {
            workout_id: workout_id.to_string(),
            workout_name: workout_name.to_string(),
        };
        let (title, body) = payload.render();
        self.notify(user_id, &title, &body, &payload).await
    }

    pub async fn notify_nutrition_assigned(
        &self,
        user_id: &str,
        plan_id: &str,
        plan_name: &str,
    ) -> Result<i64, Error> {
        let payload = NotificationPayload::NutritionAssignment {
            plan_id: plan_id.to_string(),
            plan_name: plan_name.to_string(),
        };
        let (title, body) = payload.render();
        self.notify(user_id, &title, &body, &payload).await
    }

    pub async fn notify_achievement(
        &self,
        user_id: &str,
        achievement: &str,
        detail: Option<&str>,
    ) -> Result<i64, Error> {
        let payload = NotificationPayload::Achievement {
            achievement: achievement.to_string(),
            detail: detail.map(|s| s.to_string()),
        };
        let (title, body) = payload.render();
        self.notify(user_id, &title, &body, &payload).await
    }

    pub async fn notify_reminder(
        &self,
        user_id: &str,
        topic: &str,
        due_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<i64, Error> {
        let payload = NotificationPayload::Reminder {
            topic: topic.to_string(),
            due_at,
        };
        let (title, body) = payload.render();
        self.notify(user_id, &title, &body, &payload).await
    }

    pub async fn notify_system(&self, user_id: &str, message: &str) -> Result<i64, Error> {
        let payload = NotificationPayload::System {
            message: message.to_string(),
        };
        let (title, body) = payload.render();
        self.notify(user_id, &title, &body, &payload).await
    }

    /// Pull API: newest first. `limit` is clamped to 100.
    pub async fn list_notifications(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
        unread_only: bool,
    ) -> Result<Vec<Notification>, Error> {
        let limit = limit.clamp(1, 100);
        let offset = offset.max(0);

        let mut conn = get_conn(&self.ctx.db_pool).await?;

        let mut query = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .order(notifications::created_at.desc())
            .select(Notification::as_select())
            .into_boxed();

        if unread_only {
            query = query.filter(notifications::read_at.is_null());
        }

        let rows = query
            .limit(limit)
            .offset(offset)
            .load(&mut conn)
            .await?;

        Ok(rows)
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<i64, Error> {
        let mut conn = get_conn(&self.ctx.db_pool).await?;

        let count = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::read_at.is_null())
            .count()
            .get_result(&mut conn)
            .await?;

        Ok(count)
    }

    /// Flips the read flag, once. Only the recipient may mark their own
    /// notifications; anything else is a not-found.
    pub async fn mark_read(
        &self,
        user_id: &str,
        notification_id: i64,
    ) -> Result<MarkOutcome, Error> {
        let mut conn = get_conn(&self.ctx.db_pool).await?;

        let updated = diesel::update(
            notifications::table
                .filter(notifications::id.eq(notification_id))
                .filter(notifications::user_id.eq(user_id))
                .filter(notifications::read_at.is_null()),
        )
        .set(notifications::read_at.eq(Utc::now()))
        .execute(&mut conn)
        .await?;

        if updated > 0 {
            return Ok(MarkOutcome::Marked);
        }

        let exists: Option<i64> = notifications::table
            .filter(notifications::id.eq(notification_id))
            .filter(notifications::user_id.eq(user_id))
            .select(notifications::id)
            .first(&mut conn)
            .await
            .optional()?;

        match exists {
            Some(_) => Ok(MarkOutcome::AlreadyRead),
            None => Err(Error::not_found("notification not found")),
        }
    }

    /// Bulk mark-as-read; returns how many rows were flipped.
    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64, Error> {
        let mut conn = get_conn(&self.ctx.db_pool).await?;

        let updated = diesel::update(
            notifications::table
                .filter(notifications::user_id.eq(user_id))
                .filter(notifications::read_at.is_null()),
        )
        .set(notifications::read_at.eq(Utc::now()))
        .execute(&mut conn)
        .await?;

        Ok(updated as u64)
    }
}
