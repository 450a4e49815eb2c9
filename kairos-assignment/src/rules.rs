//! Business-rule checks for assignment admission.
//!
//! These run inside the admission transaction, against state read under the
//! trainer row lock, so a passing check cannot be invalidated by a
//! concurrent request.

use kairos_core::types::{Assignment, TrainerProfile};
use kairos_core::Error;

/// What to do with the client's current active assignment, if any.
#[derive(Debug, PartialEq, Eq)]
pub enum Disposition {
    /// No active assignment; proceed with admission.
    Admit,
    /// Already actively assigned to the requested trainer; reuse the row.
    ReuseExisting,
}

/// Precondition (a): a client with an active assignment may only re-request
/// the same trainer.
pub fn current_assignment_disposition(
    current: Option<&Assignment>,
    trainer_id: &str,
) -> Result<Disposition, Error> {
    match current {
        None => Ok(Disposition::Admit),
        Some(a) if a.trainer_id == trainer_id => Ok(Disposition::ReuseExisting),
        Some(_) => Err(Error::conflict("client already assigned to a trainer")),
    }
}

/// Precondition (b): the trainer must be active, accepting, and under
/// capacity. `active_count` must be read under the trainer row lock.
pub fn check_admission(trainer: &TrainerProfile, active_count: i64) -> Result<(), Error> {
    if !trainer.active {
        return Err(Error::validation("trainer account is not active"));
    }
    if !trainer.accepting_clients {
        return Err(Error::validation("trainer is not accepting new clients"));
    }
    if active_count >= i64::from(trainer.capacity) {
        return Err(Error::capacity("trainer at capacity"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn trainer(capacity: i32, accepting: bool, active: bool) -> TrainerProfile {
        TrainerProfile {
            user_id: "trainer-1".to_string(),
            display_name: "Jo Coach".to_string(),
            capacity,
            accepting_clients: accepting,
            active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn active_assignment(trainer_id: &str) -> Assignment {
        Assignment {
            id: 1,
            client_id: "client-1".to_string(),
            trainer_id: trainer_id.to_string(),
            status: "active".to_string(),
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            closed_at: None,
        }
    }

    #[test]
    fn unassigned_client_is_admitted() {
        assert_eq!(
            current_assignment_disposition(None, "trainer-1").unwrap(),
            Disposition::Admit
        );
    }

    #[test]
    fn re_requesting_same_trainer_reuses_assignment() {
        let current = active_assignment("trainer-1");
        assert_eq!(
            current_assignment_disposition(Some(&current), "trainer-1").unwrap(),
            Disposition::ReuseExisting
        );
    }

    #[test]
    fn different_trainer_is_a_conflict() {
        let current = active_assignment("trainer-1");
        let err = current_assignment_disposition(Some(&current), "trainer-2").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn full_roster_is_a_capacity_error() {
        let err = check_admission(&trainer(2, true, true), 2).unwrap_err();
        assert!(matches!(err, Error::Capacity(_)));
    }

    #[test]
    fn admission_under_capacity_passes() {
        assert!(check_admission(&trainer(2, true, true), 1).is_ok());
    }

    #[test]
    fn inactive_or_closed_trainer_is_rejected_before_capacity() {
        let err = check_admission(&trainer(0, true, false), 0).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = check_admission(&trainer(5, false, true), 0).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
