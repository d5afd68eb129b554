//! Failure handling for store calls.

pub mod failure;
pub mod retry;
