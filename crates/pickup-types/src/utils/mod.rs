//! Utility functions shared across the pickup crates.
//!
//! Small helpers for log-friendly formatting of identifiers, tokens and
//! money amounts.

pub mod formatting;

pub use formatting::{format_money, mask_token, truncate_id};
