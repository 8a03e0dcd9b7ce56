//! Data models: configuration and the per-receipt record.

pub mod config;
pub mod record;
