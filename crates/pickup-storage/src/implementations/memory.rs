//! In-memory storage backend implementation for the pickup service.
//!
//! This module provides a memory-based implementation of the StorageInterface trait,
//! useful for testing and single-process deployments where persistence is not required.

use crate::{
	AccountEffect, ExpiryCursor, StorageError, StorageFactory, StorageInterface,
	StorageRegistry, TransitionOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pickup_types::{
	Account, ConfigSchema, ImplementationRegistry, Order, OrderStatus, Schema, TransitionFields,
	ValidationError,
};
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
	orders: HashMap<String, Order>,
	/// Unique index from pickup token to order id.
	tokens: HashMap<String, String>,
	/// Pending orders by `(expires_at, id)`.
	pending: BTreeSet<(DateTime<Utc>, String)>,
	accounts: HashMap<String, Account>,
}

/// In-memory storage implementation.
///
/// All collections live behind one read-write lock. Every mutation runs
/// entirely inside a single write-lock critical section with no await
/// point, which makes a transition and its account effect atomic for this
/// process.
pub struct MemoryStorage {
	/// The in-memory state protected by a read-write lock.
	state: Arc<RwLock<MemoryState>>,
}

impl MemoryStorage {
	/// Creates a new MemoryStorage instance.
	pub fn new() -> Self {
		Self {
			state: Arc::new(RwLock::new(MemoryState::default())),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn create_order(&self, order: &Order) -> Result<(), StorageError> {
		let mut state = self.state.write().await;
		if state.tokens.contains_key(&order.qr_token) {
			return Err(StorageError::DuplicateToken);
		}
		if state.orders.contains_key(&order.id) {
			return Err(StorageError::AlreadyExists(order.id.clone()));
		}
		state
			.tokens
			.insert(order.qr_token.clone(), order.id.clone());
		if order.status == OrderStatus::Pending {
			state
				.pending
				.insert((order.expires_at, order.id.clone()));
		}
		state.orders.insert(order.id.clone(), order.clone());
		Ok(())
	}

	async fn get_order(&self, order_id: &str) -> Result<Order, StorageError> {
		let state = self.state.read().await;
		state
			.orders
			.get(order_id)
			.cloned()
			.ok_or(StorageError::NotFound)
	}

	async fn find_by_token(&self, token: &str) -> Result<Order, StorageError> {
		let state = self.state.read().await;
		state
			.tokens
			.get(token)
			.and_then(|order_id| state.orders.get(order_id))
			.cloned()
			.ok_or(StorageError::NotFound)
	}

	async fn try_transition(
		&self,
		order_id: &str,
		expected: OrderStatus,
		new: OrderStatus,
		fields: &TransitionFields,
		effect: Option<AccountEffect>,
	) -> Result<TransitionOutcome, StorageError> {
		let mut guard = self.state.write().await;
		let state = &mut *guard;
		let order = state
			.orders
			.get_mut(order_id)
			.ok_or(StorageError::NotFound)?;

		if order.status != expected {
			return Ok(TransitionOutcome::Conflict(order.clone()));
		}

		if expected == OrderStatus::Pending {
			state
				.pending
				.remove(&(order.expires_at, order.id.clone()));
		}
		order.status = new;
		fields.apply(order);

		let account = effect.map(|effect| {
			let account = state
				.accounts
				.entry(order.account_id.clone())
				.or_insert_with(|| Account::new(order.account_id.as_str()));
			effect.apply(account);
			account.clone()
		});
		Ok(TransitionOutcome::Applied {
			order: order.clone(),
			account,
		})
	}

	async fn find_expired_pending(
		&self,
		now: DateTime<Utc>,
		after: Option<&ExpiryCursor>,
		limit: usize,
	) -> Result<Vec<Order>, StorageError> {
		let state = self.state.read().await;
		let start = match after {
			Some(cursor) => Bound::Excluded((cursor.expires_at, cursor.order_id.clone())),
			None => Bound::Unbounded,
		};
		Ok(state
			.pending
			.range((start, Bound::Unbounded))
			.take_while(|(expires_at, _)| *expires_at <= now)
			.filter_map(|(_, order_id)| state.orders.get(order_id))
			.take(limit)
			.cloned()
			.collect())
	}

	async fn get_account(&self, account_id: &str) -> Result<Account, StorageError> {
		let state = self.state.read().await;
		Ok(state
			.accounts
			.get(account_id)
			.cloned()
			.unwrap_or_else(|| Account::new(account_id)))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}
}

/// Configuration schema for MemoryStorage.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// Memory storage has no configuration
		let schema = Schema::new(vec![], vec![]);
		schema.validate(config)
	}
}

/// Factory function to create a memory storage backend from configuration.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
