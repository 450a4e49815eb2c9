pub mod dispatcher;
pub mod payload;

pub use dispatcher::{MarkOutcome, NotificationDispatcher};
pub use payload::{AssignmentEvent, NotificationKind, NotificationPayload};
