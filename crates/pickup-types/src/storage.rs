//! Storage-related types for the pickup system.

use std::str::FromStr;

/// Storage keys for the collections the engine persists.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order documents keyed by order id.
	Orders,
	/// Unique index from pickup token to order id.
	Tokens,
	/// Account counters keyed by account id.
	Accounts,
	/// Pending orders ordered by deadline, for the expiry scan.
	Pending,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::Tokens => "tokens",
			StorageKey::Accounts => "accounts",
			StorageKey::Pending => "pending",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Orders, Self::Tokens, Self::Accounts, Self::Pending].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"orders" => Ok(Self::Orders),
			"tokens" => Ok(Self::Tokens),
			"accounts" => Ok(Self::Accounts),
			"pending" => Ok(Self::Pending),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
