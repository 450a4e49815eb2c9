use chrono::Utc;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::Serialize;
use tracing;

use kairos_core::db::get_conn;
use kairos_core::schema::{assignments, client_profiles, trainer_profiles};
use kairos_core::types::{
    Assignment, AssignmentStatus, ClientProfile, NewAssignment, TrainerProfile,
};
use kairos_core::{AppContext, Error};

use crate::rules::{self, Disposition};

/// An assignment with the display data both sides need to render it.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentDetail {
    pub assignment: Assignment,
    pub client_name: String,
    pub trainer_name: String,
}

/// One active client on a trainer's roster, with the profile snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RosterEntry {
    pub assignment: Assignment,
    pub client: ClientProfile,
}

pub struct AssignmentService {
    ctx: AppContext,
}

impl AssignmentService {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Creates or reactivates the client's assignment to a trainer.
    ///
    /// The capacity check and the write run in one transaction with the
    /// trainer row locked, so concurrent requests against the same trainer
    /// serialize and cannot jointly overfill the roster. The partial unique
    /// index on active assignments closes the same-client race; a violation
    /// from a concurrent admission surfaces as a `Conflict`.
    pub async fn request_assignment(
        &self,
        client_id: &str,
        trainer_id: &str,
        notes: Option<&str>,
    ) -> Result<AssignmentDetail, Error> {
        let mut conn = get_conn(&self.ctx.db_pool).await?;

        let result = conn
            .transaction::<AssignmentDetail, Error, _>(|conn| {
                async move {
                    let current: Option<Assignment> = assignments::table
                        .filter(assignments::client_id.eq(client_id))
                        .filter(assignments::status.eq(AssignmentStatus::Active.as_str()))
                        .select(Assignment::as_select())
                        .first(conn)
                        .await
                        .optional()?;

                    let disposition =
                        rules::current_assignment_disposition(current.as_ref(), trainer_id)?;
                    if let (Disposition::ReuseExisting, Some(mut assignment)) =
                        (disposition, current)
                    {
                        if let Some(text) = notes {
                            assignment = diesel::update(assignments::table.find(assignment.id))
                                .set((
                                    assignments::notes.eq(text),
                                    assignments::updated_at.eq(Utc::now()),
                                ))
                                .returning(Assignment::as_select())
                                .get_result(conn)
                                .await?;
                        }
                        return load_detail(conn, assignment).await;
                    }

                    // Locking the trainer row serializes all admissions for
                    // this trainer; the roster count below stays valid until
                    // commit.
                    let trainer: TrainerProfile = trainer_profiles::table
                        .find(trainer_id)
                        .for_update()
                        .select(TrainerProfile::as_select())
                        .first(conn)
                        .await
                        .optional()?
                        .ok_or_else(|| Error::not_found("trainer not found"))?;

                    let active_count: i64 = assignments::table
                        .filter(assignments::trainer_id.eq(trainer_id))
                        .filter(assignments::status.eq(AssignmentStatus::Active.as_str()))
                        .count()
                        .get_result(conn)
                        .await?;

                    rules::check_admission(&trainer, active_count)?;

                    let client: ClientProfile = client_profiles::table
                        .find(client_id)
                        .select(ClientProfile::as_select())
                        .first(conn)
                        .await
                        .optional()?
                        .ok_or_else(|| Error::not_found("client not found"))?;

                    // A prior requested/removed row for this pair is
                    // reactivated in place rather than duplicated.
                    let prior: Option<i64> = assignments::table
                        .filter(assignments::client_id.eq(client_id))
                        .filter(assignments::trainer_id.eq(trainer_id))
                        .filter(assignments::status.ne(AssignmentStatus::Active.as_str()))
                        .order(assignments::updated_at.desc())
                        .select(assignments::id)
                        .first(conn)
                        .await
                        .optional()?;

                    let assignment = match prior {
                        Some(id) => {
                            diesel::update(assignments::table.find(id))
                                .set((
                                    assignments::status.eq(AssignmentStatus::Active.as_str()),
                                    assignments::notes.eq(notes),
                                    assignments::closed_at.eq(None::<chrono::DateTime<Utc>>),
                                    assignments::updated_at.eq(Utc::now()),
                                ))
                                .returning(Assignment::as_select())
                                .get_result(conn)
                                .await?
                        }
                        None => {
                            diesel::insert_into(assignments::table)
                                .values(NewAssignment {
                                    client_id,
                                    trainer_id,
                                    status: AssignmentStatus::Active.as_str(),
                                    notes,
                                })
                                .returning(Assignment::as_select())
                                .get_result(conn)
                                .await?
                        }
                    };

                    tracing::info!(
                        "Assignment {} activated: client {} -> trainer {}",
                        assignment.id,
                        client_id,
                        trainer_id
                    );

                    Ok(AssignmentDetail {
                        assignment,
                        client_name: client.display_name,
                        trainer_name: trainer.display_name,
                    })
                }
                .scope_boxed()
            })
            .await;

        match result {
            Err(Error::Database(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            ))) => Err(Error::conflict("client already assigned to a trainer")),
            other => other,
        }
    }

    /// All active assignments for a trainer, each with the client's profile
    /// snapshot. Pure read.
    pub async fn trainer_roster(&self, trainer_id: &str) -> Result<Vec<RosterEntry>, Error> {
        let mut conn = get_conn(&self.ctx.db_pool).await?;

        let rows: Vec<(Assignment, ClientProfile)> = assignments::table
            .inner_join(client_profiles::table)
            .filter(assignments::trainer_id.eq(trainer_id))
            .filter(assignments::status.eq(AssignmentStatus::Active.as_str()))
            .order(assignments::created_at.asc())
            .select((Assignment::as_select(), ClientProfile::as_select()))
            .load(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(assignment, client)| RosterEntry { assignment, client })
            .collect())
    }

    /// The client's single active assignment, if any. Pure read.
    pub async fn client_trainer(&self, client_id: &str) -> Result<Option<AssignmentDetail>, Error> {
        let mut conn = get_conn(&self.ctx.db_pool).await?;

        let row: Option<(Assignment, String, String)> = assignments::table
            .inner_join(trainer_profiles::table)
            .inner_join(client_profiles::table)
            .filter(assignments::client_id.eq(client_id))
            .filter(assignments::status.eq(AssignmentStatus::Active.as_str()))
            .select((
                Assignment::as_select(),
                trainer_profiles::display_name,
                client_profiles::display_name,
            ))
            .first(&mut conn)
            .await
            .optional()?;

        Ok(row.map(|(assignment, trainer_name, client_name)| AssignmentDetail {
            assignment,
            client_name,
            trainer_name,
        }))
    }

    /// Soft-closes the client's active assignment, freeing trainer capacity.
    /// Idempotent: returns `Ok(None)` when there is nothing to remove.
    pub async fn remove_assignment(&self, client_id: &str) -> Result<Option<Assignment>, Error> {
        let mut conn = get_conn(&self.ctx.db_pool).await?;

        let removed: Option<Assignment> = diesel::update(
            assignments::table
                .filter(assignments::client_id.eq(client_id))
                .filter(assignments::status.eq(AssignmentStatus::Active.as_str())),
        )
        .set((
            assignments::status.eq(AssignmentStatus::Removed.as_str()),
            assignments::closed_at.eq(Utc::now()),
            assignments::updated_at.eq(Utc::now()),
        ))
        .returning(Assignment::as_select())
        .get_result(&mut conn)
        .await
        .optional()?;

        if let Some(assignment) = &removed {
            tracing::info!(
                "Assignment {} removed: client {} released from trainer {}",
                assignment.id,
                assignment.client_id,
                assignment.trainer_id
            );
        }

        Ok(removed)
    }
}

async fn load_detail(
    conn: &mut kairos_core::db::DbConnection,
    assignment: Assignment,
) -> Result<AssignmentDetail, Error> {
    let trainer_name: String = trainer_profiles::table
        .find(&assignment.trainer_id)
        .select(trainer_profiles::display_name)
        .first(conn)
        .await?;

    let client_name: String = client_profiles::table
        .find(&assignment.client_id)
        .select(client_profiles::display_name)
        .first(conn)
        .await?;

    Ok(AssignmentDetail {
        assignment,
        client_name,
        trainer_name,
    })
}
