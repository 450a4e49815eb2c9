use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{assignments, client_profiles, notifications, trainer_profiles};

/// Lifecycle of a client/trainer assignment. `Requested` is reserved for an
/// explicit-acceptance policy; the current flow activates immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Requested,
    Active,
    Removed,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Requested => "requested",
            AssignmentStatus::Active => "active",
            AssignmentStatus::Removed => "removed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(AssignmentStatus::Requested),
            "active" => Some(AssignmentStatus::Active),
            "removed" => Some(AssignmentStatus::Removed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = trainer_profiles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TrainerProfile {
    pub user_id: String,
    pub display_name: String,
    pub capacity: i32,
    pub accepting_clients: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = client_profiles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ClientProfile {
    pub user_id: String,
    pub display_name: String,
    pub age: Option<i32>,
    pub goals: Option<String>,
    pub activity_level: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = assignments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Assignment {
    pub id: i64,
    pub client_id: String,
    pub trainer_id: String,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Assignment {
    pub fn is_active(&self) -> bool {
        AssignmentStatus::parse(&self.status) == Some(AssignmentStatus::Active)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = assignments)]
pub struct NewAssignment<'a> {
    pub client_id: &'a str,
    pub trainer_id: &'a str,
    pub status: &'a str,
    pub notes: Option<&'a str>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Notification {
    pub id: i64,
    pub user_id: String,
    pub notification_type: String,
    pub title: String,
    pub body: String,
    pub payload: serde_json::Value,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification<'a> {
    pub user_id: &'a str,
    pub notification_type: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for status in [
            AssignmentStatus::Requested,
            AssignmentStatus::Active,
            AssignmentStatus::Removed,
        ] {
            assert_eq!(AssignmentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AssignmentStatus::parse("cancelled"), None);
    }
}
