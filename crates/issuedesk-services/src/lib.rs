//! HTTP transport for the IssueDesk sync engine.

pub mod rest;
pub mod retry;

pub use rest::{query_params, RestIssueRepository};
pub use retry::{with_retry, RetryConfig, RetryDecision};
