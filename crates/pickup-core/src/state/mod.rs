//! Order state management.
//!
//! Orders move from `pending` to exactly one terminal status. The lifecycle
//! manager owns those moves and the side effects attached to them.

pub mod order;

pub use order::{ExpiryOutcome, LifecycleError, OrderLifecycleManager, OrderLimits};
