//! Scored mail-to-event candidate selection.

pub mod engine;

pub use engine::{select_candidate, Candidate, MatchConfig, MatchOutcome, MatchReason};
