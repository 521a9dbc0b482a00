//! Event types published by the order lifecycle.
//!
//! Events flow through a broadcast bus so that side collaborators
//! (audit logging, notifications) can react to lifecycle changes without
//! being on the critical path of a transition.

use crate::Order;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle event emitted after a state change has been committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LifecycleEvent {
	/// A new pending order was persisted.
	OrderCreated { order: Order },
	/// An order was picked up.
	OrderCompleted {
		order_id: String,
		account_id: String,
		total: Decimal,
		pickup_time: DateTime<Utc>,
	},
	/// An order expired without pickup and was marked as a no-show.
	OrderExpired {
		order_id: String,
		account_id: String,
		source: ExpirySource,
	},
	/// An order was cancelled while pending.
	OrderCancelled { order_id: String, account_id: String },
	/// An account reached the strike threshold.
	AccountBlocked { account_id: String, strike_count: u32 },
}

/// Which entry point detected the expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirySource {
	/// A pickup attempt arrived after the deadline.
	Verification,
	/// The background sweep found the order.
	Reaper,
}
