//! Account state maintained by the pickup engine.
//!
//! Identity and authentication live outside this system; the engine only
//! tracks the counters that terminal order transitions feed into.

use serde::{Deserialize, Serialize};

/// Penalty and loyalty counters for one customer account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
	/// Identifier issued by the external identity provider.
	pub id: String,
	/// Number of no-shows recorded against this account.
	pub strike_count: u32,
	/// Set once the strike threshold is reached; cleared only by an admin.
	pub is_blocked: bool,
	/// Accumulated loyalty points.
	pub loyalty_points: u64,
}

impl Account {
	/// Returns a fresh account with no strikes and no points.
	///
	/// Accounts are created lazily the first time a counter is touched, so a
	/// lookup for an unknown id reads as this value.
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			strike_count: 0,
			is_blocked: false,
			loyalty_points: 0,
		}
	}
}
