pub mod rules;
pub mod service;

pub use service::{AssignmentDetail, AssignmentService, RosterEntry};
