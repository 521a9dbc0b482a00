//! Storage module for the pickup order system.
//!
//! This module provides the persistence abstraction for orders and account
//! counters. The one write primitive the engine depends on is a
//! compare-and-set status transition that commits the account counter
//! change of a terminal state in the same atomic step. Backends are selected
//! by name from configuration.

use async_stream::try_stream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use pickup_types::{
	Account, ConfigSchema, ImplementationRegistry, Order, OrderStatus, TransitionFields,
};
use std::future::Future;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs when a new order reuses an existing pickup token.
	#[error("Duplicate pickup token")]
	DuplicateToken,
	/// Error that occurs when a new order reuses an existing order id.
	#[error("Order already exists: {0}")]
	AlreadyExists(String),
	/// Error that occurs when a transition request is not a legal status move.
	#[error("Invalid transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Account counter change committed together with a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountEffect {
	/// One no-show strike; the account blocks once strikes reach `threshold`.
	Strike { threshold: u32 },
	/// Loyalty points for a completed pickup.
	LoyaltyPoints(u64),
}

impl AccountEffect {
	/// Applies the change to an account's counters.
	pub fn apply(&self, account: &mut Account) {
		match *self {
			AccountEffect::Strike { threshold } => {
				account.strike_count = account.strike_count.saturating_add(1);
				if account.strike_count >= threshold {
					account.is_blocked = true;
				}
			},
			AccountEffect::LoyaltyPoints(points) => {
				account.loyalty_points = account.loyalty_points.saturating_add(points);
			},
		}
	}
}

/// Result of a compare-and-set status transition.
///
/// Losing the race is a normal outcome, so it is a value rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
	/// The order was in the expected status and now holds the new one.
	/// `account` holds the counters after the effect, if one was requested.
	Applied {
		order: Order,
		account: Option<Account>,
	},
	/// The order was not in the expected status; carries the order as found.
	Conflict(Order),
}

impl TransitionOutcome {
	/// Returns true if this caller won the transition.
	pub fn is_applied(&self) -> bool {
		matches!(self, TransitionOutcome::Applied { .. })
	}

	/// Returns the order as it stands after the attempt.
	pub fn order(&self) -> &Order {
		match self {
			TransitionOutcome::Applied { order, .. } | TransitionOutcome::Conflict(order) => order,
		}
	}
}

/// Position after the last order returned by an expired-order scan.
///
/// Scans are ordered by `(expires_at, id)`, so the pair is a stable cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryCursor {
	pub expires_at: DateTime<Utc>,
	pub order_id: String,
}

impl From<&Order> for ExpiryCursor {
	fn from(order: &Order) -> Self {
		Self {
			expires_at: order.expires_at,
			order_id: order.id.clone(),
		}
	}
}

/// Trait defining the interface for order and account storage backends.
///
/// Implementations must make `try_transition`, including its account effect,
/// atomic with respect to every other caller of the same backend, including
/// callers in other processes where the backend is shared. Once a transition
/// has started it must run to completion even if the calling future is
/// dropped.
///
/// Backends keep pending orders indexed by `(expires_at, id)` so that
/// `find_expired_pending` never has to visit resolved orders.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Persists a new order together with its token index entry.
	///
	/// Fails with `DuplicateToken` if another order already holds the token.
	async fn create_order(&self, order: &Order) -> Result<(), StorageError>;

	/// Retrieves an order by id.
	async fn get_order(&self, order_id: &str) -> Result<Order, StorageError>;

	/// Retrieves the order holding the given pickup token.
	async fn find_by_token(&self, token: &str) -> Result<Order, StorageError>;

	/// Moves an order from `expected` to `new` if and only if it is currently
	/// in `expected`, applying `fields` and `effect` to the order's account
	/// in the same atomic step. Nothing is written on conflict or error.
	async fn try_transition(
		&self,
		order_id: &str,
		expected: OrderStatus,
		new: OrderStatus,
		fields: &TransitionFields,
		effect: Option<AccountEffect>,
	) -> Result<TransitionOutcome, StorageError>;

	/// Returns up to `limit` pending orders with `expires_at <= now`, ordered
	/// by `(expires_at, id)` and starting after `after`.
	async fn find_expired_pending(
		&self,
		now: DateTime<Utc>,
		after: Option<&ExpiryCursor>,
		limit: usize,
	) -> Result<Vec<Order>, StorageError>;

	/// Retrieves an account, reading unknown ids as a fresh account.
	async fn get_account(&self, account_id: &str) -> Result<Account, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for storage factory functions.
///
/// This is the function signature that all storage implementations must provide
/// to create instances of their storage interface.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// High-level storage service used by the lifecycle engine.
///
/// Reads that fail with a backend error are retried once. Writes are passed
/// through untouched: a lost compare-and-set is already reported as a value,
/// and the counter effect riding on it is not idempotent.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	async fn read_with_retry<T, F, Fut>(&self, operation: &str, read: F) -> Result<T, StorageError>
	where
		F: Fn() -> Fut,
		Fut: Future<Output = Result<T, StorageError>>,
	{
		match read().await {
			Err(StorageError::Backend(error)) => {
				tracing::warn!(operation, %error, "Storage read failed, retrying once");
				read().await
			},
			other => other,
		}
	}

	/// Persists a new order.
	pub async fn create_order(&self, order: &Order) -> Result<(), StorageError> {
		self.backend.create_order(order).await
	}

	/// Retrieves an order by id.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, StorageError> {
		self.read_with_retry("get_order", || self.backend.get_order(order_id))
			.await
	}

	/// Retrieves the order holding the given pickup token.
	pub async fn find_by_token(&self, token: &str) -> Result<Order, StorageError> {
		self.read_with_retry("find_by_token", || self.backend.find_by_token(token))
			.await
	}

	/// Attempts a compare-and-set status transition, committing `effect`
	/// with it when it applies.
	pub async fn try_transition(
		&self,
		order_id: &str,
		expected: OrderStatus,
		new: OrderStatus,
		fields: &TransitionFields,
		effect: Option<AccountEffect>,
	) -> Result<TransitionOutcome, StorageError> {
		if !expected.can_transition_to(new) {
			return Err(StorageError::InvalidTransition {
				from: expected,
				to: new,
			});
		}
		self.backend
			.try_transition(order_id, expected, new, fields, effect)
			.await
	}

	/// Retrieves an account's counters.
	pub async fn get_account(&self, account_id: &str) -> Result<Account, StorageError> {
		self.read_with_retry("get_account", || self.backend.get_account(account_id))
			.await
	}

	/// Lazily yields every pending order whose deadline is at or before
	/// `now`, fetching `batch_size` orders per backend call.
	///
	/// The stream is finite. Calling this again starts a fresh scan.
	pub fn expired_pending(
		&self,
		now: DateTime<Utc>,
		batch_size: usize,
	) -> impl Stream<Item = Result<Order, StorageError>> + Send + '_ {
		let batch_size = batch_size.max(1);
		try_stream! {
			let mut cursor: Option<ExpiryCursor> = None;
			loop {
				let page = self
					.read_with_retry("find_expired_pending", || {
						self.backend.find_expired_pending(now, cursor.as_ref(), batch_size)
					})
					.await?;
				let exhausted = page.len() < batch_size;
				for order in page {
					cursor = Some(ExpiryCursor::from(&order));
					yield order;
				}
				if exhausted {
					break;
				}
			}
		}
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryStorage;
	use crate::test_support::pending_order;
	use chrono::Duration;
	use futures::TryStreamExt;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	/// Memory backend whose reads fail with a backend error a fixed number of times.
	struct FlakyStorage {
		inner: MemoryStorage,
		failures_left: AtomicUsize,
		reads: Arc<AtomicUsize>,
	}

	impl FlakyStorage {
		fn new(failures: usize) -> Self {
			Self {
				inner: MemoryStorage::new(),
				failures_left: AtomicUsize::new(failures),
				reads: Arc::new(AtomicUsize::new(0)),
			}
		}

		fn fail_read(&self) -> Result<(), StorageError> {
			self.reads.fetch_add(1, Ordering::SeqCst);
			let left = self.failures_left.load(Ordering::SeqCst);
			if left > 0 {
				self.failures_left.store(left - 1, Ordering::SeqCst);
				return Err(StorageError::Backend("connection reset".into()));
			}
			Ok(())
		}
	}

	#[async_trait]
	impl StorageInterface for FlakyStorage {
		async fn create_order(&self, order: &Order) -> Result<(), StorageError> {
			self.inner.create_order(order).await
		}

		async fn get_order(&self, order_id: &str) -> Result<Order, StorageError> {
			self.fail_read()?;
			self.inner.get_order(order_id).await
		}

		async fn find_by_token(&self, token: &str) -> Result<Order, StorageError> {
			self.fail_read()?;
			self.inner.find_by_token(token).await
		}

		async fn try_transition(
			&self,
			order_id: &str,
			expected: OrderStatus,
			new: OrderStatus,
			fields: &TransitionFields,
			effect: Option<AccountEffect>,
		) -> Result<TransitionOutcome, StorageError> {
			self.inner
				.try_transition(order_id, expected, new, fields, effect)
				.await
		}

		async fn find_expired_pending(
			&self,
			now: DateTime<Utc>,
			after: Option<&ExpiryCursor>,
			limit: usize,
		) -> Result<Vec<Order>, StorageError> {
			self.inner.find_expired_pending(now, after, limit).await
		}

		async fn get_account(&self, account_id: &str) -> Result<Account, StorageError> {
			self.fail_read()?;
			self.inner.get_account(account_id).await
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			self.inner.config_schema()
		}
	}

	#[tokio::test]
	async fn test_read_retried_once_on_backend_error() {
		let backend = FlakyStorage::new(1);
		let reads = backend.reads.clone();
		let service = StorageService::new(Box::new(backend));
		let order = pending_order("o-1", "tok-1", Utc::now());
		service.create_order(&order).await.unwrap();

		let found = service.find_by_token("tok-1").await.unwrap();
		assert_eq!(found.id, "o-1");
		assert_eq!(reads.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn test_read_gives_up_after_second_failure() {
		let backend = FlakyStorage::new(2);
		let reads = backend.reads.clone();
		let service = StorageService::new(Box::new(backend));

		let result = service.get_account("acc-1").await;
		assert!(matches!(result, Err(StorageError::Backend(_))));
		assert_eq!(reads.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn test_not_found_is_not_retried() {
		let backend = FlakyStorage::new(0);
		let reads = backend.reads.clone();
		let service = StorageService::new(Box::new(backend));

		let result = service.get_order("missing").await;
		assert!(matches!(result, Err(StorageError::NotFound)));
		assert_eq!(reads.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_illegal_transition_rejected_before_backend() {
		let service = StorageService::new(Box::new(MemoryStorage::new()));
		let result = service
			.try_transition(
				"o-1",
				OrderStatus::Completed,
				OrderStatus::NoShow,
				&TransitionFields::default(),
				None,
			)
			.await;
		assert!(matches!(
			result,
			Err(StorageError::InvalidTransition { .. })
		));
	}

	#[tokio::test]
	async fn test_expired_stream_pages_through_all_orders() {
		let service = StorageService::new(Box::new(MemoryStorage::new()));
		let now = Utc::now();
		for i in 0..5 {
			let order = pending_order(
				&format!("o-{}", i),
				&format!("tok-{}", i),
				now - Duration::minutes(10 - i),
			);
			service.create_order(&order).await.unwrap();
		}
		service
			.create_order(&pending_order("fresh", "tok-fresh", now + Duration::minutes(5)))
			.await
			.unwrap();

		let expired: Vec<Order> = service.expired_pending(now, 2).try_collect().await.unwrap();
		let ids: Vec<&str> = expired.iter().map(|o| o.id.as_str()).collect();
		assert_eq!(ids, vec!["o-0", "o-1", "o-2", "o-3", "o-4"]);

		// A fresh scan restarts from the beginning.
		let again: Vec<Order> = service.expired_pending(now, 10).try_collect().await.unwrap();
		assert_eq!(again.len(), 5);
	}

	#[tokio::test]
	async fn test_expired_stream_skips_resolved_orders() {
		let service = StorageService::new(Box::new(MemoryStorage::new()));
		let now = Utc::now();
		for i in 0..3 {
			let order = pending_order(
				&format!("o-{}", i),
				&format!("tok-{}", i),
				now - Duration::minutes(1),
			);
			service.create_order(&order).await.unwrap();
		}
		service
			.try_transition(
				"o-1",
				OrderStatus::Pending,
				OrderStatus::Cancelled,
				&TransitionFields::resolved(now),
				None,
			)
			.await
			.unwrap();

		let expired: Vec<Order> = service.expired_pending(now, 1).try_collect().await.unwrap();
		let ids: Vec<&str> = expired.iter().map(|o| o.id.as_str()).collect();
		assert_eq!(ids, vec!["o-0", "o-2"]);
	}

	#[test]
	fn test_strike_effect_blocks_at_threshold() {
		let mut account = Account::new("acc-1");
		let strike = AccountEffect::Strike { threshold: 2 };

		strike.apply(&mut account);
		assert_eq!((account.strike_count, account.is_blocked), (1, false));
		strike.apply(&mut account);
		assert_eq!((account.strike_count, account.is_blocked), (2, true));

		AccountEffect::LoyaltyPoints(7).apply(&mut account);
		assert_eq!(account.loyalty_points, 7);
		assert_eq!(account.strike_count, 2);
	}
}
