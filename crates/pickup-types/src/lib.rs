//! Common types module for the pickup order system.
//!
//! This module defines the core data types shared by every pickup crate:
//! orders and their lines, account counters, catalog snapshots, lifecycle
//! events, HTTP API bodies and configuration validation helpers.

/// Account counters fed by terminal order transitions.
pub mod account;
/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Read-only catalog snapshots used for pricing.
pub mod catalog;
/// Event types for lifecycle notifications.
pub mod events;
/// Order types including lines, status and transition fields.
pub mod order;
/// Registry trait for pluggable implementations.
pub mod registry;
/// Storage keys for persisted collections.
pub mod storage;
/// Formatting helpers.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use account::*;
pub use api::*;
pub use catalog::*;
pub use events::*;
pub use order::*;
pub use registry::*;
pub use storage::*;
pub use utils::{format_money, mask_token, truncate_id};
pub use validation::*;
