//! Shared types and utilities used across the pipeline

pub mod backoff;
pub mod cache;
pub mod channels;
pub mod errors;
pub mod types;
