// Public fallible APIs in this crate share one concrete error contract (`EnqueteError`).
// Repeating per-function `# Errors` boilerplate obscures behavior more than it clarifies.
#![allow(
    clippy::missing_errors_doc,
    reason = "crate-wide fallible API uses one explicit error type; per-item boilerplate would duplicate contract"
)]

pub mod auth;
pub mod cache;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod flow;
pub mod journal;
pub mod models;
pub mod store;

pub use client::Enquete;
pub use error::{EnqueteError, Result};
pub use flow::{FinishOutcome, FlowContext, FlowStage, SurveyFlow};
