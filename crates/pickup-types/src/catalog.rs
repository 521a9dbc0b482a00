//! Read-only catalog data consumed at order time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Price-relevant view of one catalog product.
///
/// Owned by the catalog; the pickup engine reads it once per order line and
/// copies what it needs into the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
	/// Catalog identifier.
	pub id: String,
	/// Display name.
	pub name: String,
	/// Price of one unit before modifiers.
	pub base_price: Decimal,
	/// Size name to price delta.
	#[serde(default)]
	pub sizes: BTreeMap<String, Decimal>,
	/// Add-on name to price.
	#[serde(default)]
	pub add_ons: BTreeMap<String, Decimal>,
	/// Whether the product can currently be ordered.
	#[serde(default = "default_available")]
	pub available: bool,
}

fn default_available() -> bool {
	true
}
