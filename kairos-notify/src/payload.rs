//! Typed notification payloads.
//!
//! Every notification carries one of these shapes, keyed by its type tag, so
//! consumers never have to guess which fields a payload has. The dispatcher
//! derives the stored type string, title and body from the payload itself;
//! a payload can never disagree with its notification type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TrainerAssignment,
    WorkoutAssignment,
    NutritionAssignment,
    Achievement,
    Reminder,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TrainerAssignment => "trainer_assignment",
            NotificationKind::WorkoutAssignment => "workout_assignment",
            NotificationKind::NutritionAssignment => "nutrition_assignment",
            NotificationKind::Achievement => "achievement",
            NotificationKind::Reminder => "reminder",
            NotificationKind::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trainer_assignment" => Some(NotificationKind::TrainerAssignment),
            "workout_assignment" => Some(NotificationKind::WorkoutAssignment),
            "nutrition_assignment" => Some(NotificationKind::NutritionAssignment),
            "achievement" => Some(NotificationKind::Achievement),
            "reminder" => Some(NotificationKind::Reminder),
            "system" => Some(NotificationKind::System),
            _ => None,
        }
    }
}

/// Which side of the assignment lifecycle a `TrainerAssignment` payload
/// describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentEvent {
    Assigned,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationPayload {
    TrainerAssignment {
        assignment_id: i64,
        event: AssignmentEvent,
        counterpart_id: String,
        counterpart_name: String,
    },
    WorkoutAssignment {
        workout_id: String,
        workout_name: String,
    },
    NutritionAssignment {
        plan_id: String,
        plan_name: String,
    },
    Achievement {
        achievement: String,
        detail: Option<String>,
    },
    Reminder {
        topic: String,
        due_at: Option<DateTime<Utc>>,
    },
    System {
        message: String,
    },
}

impl NotificationPayload {
    pub fn kind(&self) -> NotificationKind {
        match self {
            NotificationPayload::TrainerAssignment { .. } => NotificationKind::TrainerAssignment,
            NotificationPayload::WorkoutAssignment { .. } => NotificationKind::WorkoutAssignment,
            NotificationPayload::NutritionAssignment { .. } => {
                NotificationKind::NutritionAssignment
            }
            NotificationPayload::Achievement { .. } => NotificationKind::Achievement,
            NotificationPayload::Reminder { .. } => NotificationKind::Reminder,
            NotificationPayload::System { .. } => NotificationKind::System,
        }
    }

    /// Title and body shown to the recipient.
    pub fn render(&self) -> (String, String) {
        match self {
            NotificationPayload::TrainerAssignment {
                event: AssignmentEvent::Assigned,
                counterpart_name,
                ..
            } => (
                "New Training Partnership".to_string(),
                format!("You are now training with {}", counterpart_name),
            ),
            NotificationPayload::TrainerAssignment {
                event: AssignmentEvent::Removed,
                counterpart_name,
                ..
            } => (
                "Training Partnership Ended".to_string(),
                format!("Your training partnership with {} has ended", counterpart_name),
            ),
            NotificationPayload::WorkoutAssignment { workout_name, .. } => (
                "New Workout".to_string(),
                format!("Your trainer assigned you the workout \"{}\"", workout_name),
            ),
            NotificationPayload::NutritionAssignment { plan_name, .. } => (
                "New Nutrition Plan".to_string(),
                format!("Your trainer assigned you the nutrition plan \"{}\"", plan_name),
            ),
            NotificationPayload::Achievement { achievement, detail } => (
                "Achievement Unlocked".to_string(),
                match detail {
                    Some(detail) => format!("{} ({})", achievement, detail),
                    None => achievement.clone(),
                },
            ),
            NotificationPayload::Reminder { topic, .. } => {
                ("Reminder".to_string(), topic.clone())
            }
            NotificationPayload::System { message } => {
                ("Kairos".to_string(), message.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_tag_matches_kind_string() {
        let payloads = [
            NotificationPayload::TrainerAssignment {
                assignment_id: 7,
                event: AssignmentEvent::Assigned,
                counterpart_id: "trainer-1".to_string(),
                counterpart_name: "Jo Coach".to_string(),
            },
            NotificationPayload::WorkoutAssignment {
                workout_id: "w-1".to_string(),
                workout_name: "Leg Day".to_string(),
            },
            NotificationPayload::NutritionAssignment {
                plan_id: "n-1".to_string(),
                plan_name: "Cut Phase".to_string(),
            },
            NotificationPayload::Achievement {
                achievement: "New squat PR".to_string(),
                detail: None,
            },
            NotificationPayload::Reminder {
                topic: "Log today's weigh-in".to_string(),
                due_at: None,
            },
            NotificationPayload::System {
                message: "Scheduled maintenance tonight".to_string(),
            },
        ];

        for payload in payloads {
            let value = serde_json::to_value(&payload).unwrap();
            assert_eq!(value["kind"], payload.kind().as_str());
        }
    }

    #[test]
    fn payload_round_trips_through_json() {
        let payload = NotificationPayload::WorkoutAssignment {
            workout_id: "w-42".to_string(),
            workout_name: "Upper Pull".to_string(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        let back: NotificationPayload = serde_json::from_value(value).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let raw = serde_json::json!({"kind": "billing_update", "amount": 5});
        assert!(serde_json::from_value::<NotificationPayload>(raw).is_err());
    }

    #[test]
    fn kind_strings_round_trip() {
        for kind in [
            NotificationKind::TrainerAssignment,
            NotificationKind::WorkoutAssignment,
            NotificationKind::NutritionAssignment,
            NotificationKind::Achievement,
            NotificationKind::Reminder,
            NotificationKind::System,
        ] {
            assert_eq!(NotificationKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn render_mentions_the_counterpart() {
        let (title, body) = NotificationPayload::TrainerAssignment {
            assignment_id: 1,
            event: AssignmentEvent::Assigned,
            counterpart_id: "trainer-1".to_string(),
            counterpart_name: "Jo Coach".to_string(),
        }
        .render();
        assert_eq!(title, "New Training Partnership");
        assert!(body.contains("Jo Coach"));
    }
}
