//! Order types for the pickup system.
//!
//! An order is born `pending` with a single-use pickup token and an expiry
//! deadline, and is resolved exactly once into one of the terminal states.
//! Every monetary amount on an order is captured at creation time and never
//! recomputed afterwards.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Represents one pickup transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
	/// Unique identifier for this order.
	pub id: String,
	/// Account that placed the order.
	pub account_id: String,
	/// Priced line snapshots, in the order they were requested.
	pub lines: Vec<OrderLine>,
	/// Sum of all line totals, fixed at creation.
	pub total: Decimal,
	/// Current status of the order.
	pub status: OrderStatus,
	/// Opaque single-use token presented at pickup.
	pub qr_token: String,
	/// Timestamp when this order was created.
	pub created_at: DateTime<Utc>,
	/// Deadline after which a pending order is a no-show.
	pub expires_at: DateTime<Utc>,
	/// Timestamp of the successful pickup, set only on `completed`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pickup_time: Option<DateTime<Utc>>,
	/// Timestamp of the terminal transition, whichever it was.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub resolved_at: Option<DateTime<Utc>>,
}

impl Order {
	/// Returns true if the order can no longer be picked up at `now`.
	///
	/// The deadline itself is still inside the pickup window.
	pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
		now > self.expires_at
	}
}

/// Immutable snapshot of one requested product line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
	/// Catalog product identifier.
	pub product_id: String,
	/// Product display name at order time.
	pub product_name: String,
	/// Product base price at order time.
	pub base_price: Decimal,
	/// Chosen size, if it matched one of the product's sizes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub size: Option<SelectedSize>,
	/// Add-ons that matched the product, with their captured prices.
	#[serde(default)]
	pub add_ons: Vec<SelectedAddOn>,
	/// Number of units, always at least 1.
	pub quantity: u32,
	/// `(base_price + size delta + add-on prices) * quantity`.
	pub line_total: Decimal,
}

/// Size modifier captured at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedSize {
	pub name: String,
	pub price_delta: Decimal,
}

/// Add-on captured at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedAddOn {
	pub name: String,
	pub price: Decimal,
}

/// Status of an order.
///
/// The only legal moves are from `Pending` to one of the three terminal
/// states; a terminal status is never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
	/// Waiting for pickup.
	#[serde(rename = "pending")]
	Pending,
	/// Picked up before expiry.
	#[serde(rename = "completed")]
	Completed,
	/// Expired without pickup.
	#[serde(rename = "no-show")]
	NoShow,
	/// Cancelled while still pending.
	#[serde(rename = "cancelled")]
	Cancelled,
}

impl OrderStatus {
	/// Returns the wire representation of the status.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "pending",
			OrderStatus::Completed => "completed",
			OrderStatus::NoShow => "no-show",
			OrderStatus::Cancelled => "cancelled",
		}
	}

	/// Returns true for every status other than `Pending`.
	pub fn is_terminal(&self) -> bool {
		!matches!(self, OrderStatus::Pending)
	}

	/// Checks if moving from `self` to `to` is a legal transition.
	pub fn can_transition_to(&self, to: OrderStatus) -> bool {
		matches!(self, OrderStatus::Pending) && to.is_terminal()
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(Self::Pending),
			"completed" => Ok(Self::Completed),
			"no-show" => Ok(Self::NoShow),
			"cancelled" => Ok(Self::Cancelled),
			other => Err(format!("unknown order status: {}", other)),
		}
	}
}

/// Extra fields written together with a status transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionFields {
	/// Pickup timestamp, only meaningful for `completed`.
	pub pickup_time: Option<DateTime<Utc>>,
	/// When the transition happened.
	pub resolved_at: Option<DateTime<Utc>>,
}

impl TransitionFields {
	/// Fields for a transition that happened at `at` without a pickup.
	pub fn resolved(at: DateTime<Utc>) -> Self {
		Self {
			pickup_time: None,
			resolved_at: Some(at),
		}
	}

	/// Fields for a successful pickup at `at`.
	pub fn picked_up(at: DateTime<Utc>) -> Self {
		Self {
			pickup_time: Some(at),
			resolved_at: Some(at),
		}
	}

	/// Applies the fields onto an order record.
	pub fn apply(&self, order: &mut Order) {
		if let Some(pickup_time) = self.pickup_time {
			order.pickup_time = Some(pickup_time);
		}
		if let Some(resolved_at) = self.resolved_at {
			order.resolved_at = Some(resolved_at);
		}
	}
}
