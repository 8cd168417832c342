//! Core domain types: the job record, its state machine, and identifiers.

pub mod job;
pub mod types;
