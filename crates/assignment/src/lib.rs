//! Pull-request lifecycle and reviewer assignment.
//!
//! [`ReviewAssignmentEngine`] reads eligibility from a [`TeamDirectory`] and
//! commits through a [`PullRequestLedger`]. Both stores are injected, so the
//! same engine runs over SQLite in the server and over the [`memory`] stores
//! in tests.

pub mod directory;
pub mod engine;
pub mod memory;
pub mod sampling;
pub mod store;

pub use directory::TeamDirectory;
pub use engine::{Reassignment, ReviewAssignmentEngine, REVIEWERS_PER_PULL_REQUEST};
pub use sampling::{RandomSampler, ReviewerSampler, SeededSampler};
pub use store::{MembershipStore, PullRequestLedger};
