//! Order lifecycle management.
//!
//! Orders are created `pending` and resolved exactly once. Every terminal
//! write goes through the storage compare-and-set, which commits the strike
//! or loyalty points in the same step, and only the caller that wins it
//! publishes events. Expiry
//! detected during verification and expiry found by the reaper share
//! [`OrderLifecycleManager::expire_order`], so both entry points behave
//! identically.

use crate::engine::event_bus::EventBus;
use crate::engine::token_issuer::TokenIssuer;
use chrono::{DateTime, Duration, Utc};
use pickup_account::{AccountError, AccountPenaltyService};
use pickup_catalog::{CatalogError, CatalogService, PricingEngine, PricingError};
use pickup_storage::{StorageError, StorageService, TransitionOutcome};
use pickup_types::{
	mask_token, truncate_id, Account, ExpirySource, LifecycleEvent, Order, OrderLineRequest,
	OrderStatus, TransitionFields,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

/// Errors that can occur during order lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
	/// The request was rejected before any side effect.
	#[error("Validation error: {0}")]
	Validation(String),
	/// A referenced product, order or token does not exist.
	#[error("{entity} not found: {id}")]
	NotFound { entity: &'static str, id: String },
	/// The order had already reached a terminal status.
	#[error("Order already resolved as {status}")]
	AlreadyResolved { status: OrderStatus },
	/// The pickup window closed and the order is a no-show.
	#[error("Pickup window has closed")]
	Expired,
	/// The operation needs a pending order.
	#[error("Order is {status}, not pending")]
	NotPending { status: OrderStatus },
	/// The account has been blocked for repeated no-shows.
	#[error("Account is blocked")]
	AccountBlocked,
	/// Storage failure.
	#[error("Storage error: {0}")]
	Storage(String),
	/// Unexpected internal failure.
	#[error("Internal error: {0}")]
	Internal(String),
}

impl From<StorageError> for LifecycleError {
	fn from(e: StorageError) -> Self {
		LifecycleError::Storage(e.to_string())
	}
}

impl From<AccountError> for LifecycleError {
	fn from(e: AccountError) -> Self {
		LifecycleError::Storage(e.to_string())
	}
}

impl From<PricingError> for LifecycleError {
	fn from(e: PricingError) -> Self {
		LifecycleError::Validation(e.to_string())
	}
}

/// Result of an attempt to expire an order.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpiryOutcome {
	/// This caller moved the order to `no-show` together with the strike.
	Expired(Order),
	/// Someone else resolved the order first; carries the order as found.
	AlreadyResolved(Order),
}

/// Limits applied when creating orders.
#[derive(Debug, Clone, Copy)]
pub struct OrderLimits {
	/// How long a new order can be picked up.
	pub ttl: Duration,
	/// Largest number of lines in one order.
	pub max_lines: usize,
}

impl Default for OrderLimits {
	fn default() -> Self {
		Self {
			ttl: Duration::minutes(30),
			max_lines: 50,
		}
	}
}

/// Orchestrates order creation, verification and cancellation.
pub struct OrderLifecycleManager {
	storage: Arc<StorageService>,
	catalog: Arc<CatalogService>,
	penalties: Arc<AccountPenaltyService>,
	pricing: PricingEngine,
	tokens: TokenIssuer,
	event_bus: EventBus,
	limits: OrderLimits,
}

impl OrderLifecycleManager {
	pub fn new(
		storage: Arc<StorageService>,
		catalog: Arc<CatalogService>,
		penalties: Arc<AccountPenaltyService>,
		pricing: PricingEngine,
		tokens: TokenIssuer,
		event_bus: EventBus,
		limits: OrderLimits,
	) -> Self {
		Self {
			storage,
			catalog,
			penalties,
			pricing,
			tokens,
			event_bus,
			limits,
		}
	}

	/// Creates an order at the current time.
	pub async fn create_order(
		&self,
		account_id: &str,
		lines: &[OrderLineRequest],
	) -> Result<Order, LifecycleError> {
		self.create_order_at(account_id, lines, Utc::now()).await
	}

	/// Creates an order as of `now`.
	///
	/// Blocked accounts are rejected before any pricing or persistence work.
	/// Every line is priced from a fresh catalog snapshot and frozen into the
	/// order.
	#[instrument(skip_all, fields(account_id = %truncate_id(account_id)))]
	pub async fn create_order_at(
		&self,
		account_id: &str,
		lines: &[OrderLineRequest],
		now: DateTime<Utc>,
	) -> Result<Order, LifecycleError> {
		if account_id.trim().is_empty() {
			return Err(LifecycleError::Validation(
				"accountId cannot be empty".into(),
			));
		}
		if self.penalties.is_blocked(account_id).await? {
			tracing::info!("Rejected order from blocked account");
			return Err(LifecycleError::AccountBlocked);
		}
		if lines.is_empty() {
			return Err(LifecycleError::Validation(
				"An order needs at least one line".into(),
			));
		}
		if lines.len() > self.limits.max_lines {
			return Err(LifecycleError::Validation(format!(
				"An order can have at most {} lines, got {}",
				self.limits.max_lines,
				lines.len()
			)));
		}

		let mut priced_lines = Vec::with_capacity(lines.len());
		for request in lines {
			let product = self
				.catalog
				.get_product(&request.product_id)
				.await
				.map_err(|e| match e {
					CatalogError::ProductNotFound(id) => LifecycleError::NotFound {
						entity: "Product",
						id,
					},
					other => LifecycleError::Internal(other.to_string()),
				})?;
			if !product.available {
				return Err(LifecycleError::Validation(format!(
					"Product '{}' is not available",
					product.id
				)));
			}

			let priced = self.pricing.compute_line_total(
				&product,
				request.size.as_deref(),
				&request.add_on_names,
				request.quantity,
			)?;
			if !priced.ignored_add_ons.is_empty() {
				tracing::warn!(
					product_id = %product.id,
					ignored_add_ons = ?priced.ignored_add_ons,
					"Ignoring add-ons not offered for product"
				);
			}
			priced_lines.push(priced.line);
		}
		let total = self.pricing.compute_order_total(&priced_lines)?;

		let mut order = Order {
			id: Uuid::new_v4().to_string(),
			account_id: account_id.to_string(),
			lines: priced_lines,
			total,
			status: OrderStatus::Pending,
			qr_token: self.tokens.issue(),
			created_at: now,
			expires_at: now + self.limits.ttl,
			pickup_time: None,
			resolved_at: None,
		};

		let created = self.storage.create_order(&order).await;
		match created {
			Err(StorageError::DuplicateToken) => {
				tracing::warn!("Pickup token collision, issuing a new token");
				order.qr_token = self.tokens.issue();
				self.storage
					.create_order(&order)
					.await
					.map_err(|e| match e {
						StorageError::DuplicateToken => {
							LifecycleError::Internal("Repeated pickup token collision".into())
						},
						other => other.into(),
					})?;
			},
			result => result?,
		}

		tracing::info!(
			order_id = %truncate_id(&order.id),
			total = %order.total,
			lines = order.lines.len(),
			expires_at = %order.expires_at,
			"Created order"
		);
		self.event_bus.publish(LifecycleEvent::OrderCreated {
			order: order.clone(),
		});
		Ok(order)
	}

	/// Verifies a pickup token at the current time.
	pub async fn verify_token(&self, token: &str) -> Result<Order, LifecycleError> {
		self.verify_token_at(token, Utc::now()).await
	}

	/// Verifies a pickup token as of `now`.
	///
	/// Returns the completed order on success. A token whose order is already
	/// terminal yields `AlreadyResolved` without any mutation. A token
	/// presented after the deadline expires the order and yields `Expired`.
	#[instrument(skip_all, fields(token = %mask_token(token)))]
	pub async fn verify_token_at(
		&self,
		token: &str,
		now: DateTime<Utc>,
	) -> Result<Order, LifecycleError> {
		let order = match self.storage.find_by_token(token).await {
			Ok(order) => order,
			Err(StorageError::NotFound) => {
				return Err(LifecycleError::NotFound {
					entity: "Token",
					id: mask_token(token),
				})
			},
			Err(e) => return Err(e.into()),
		};

		if order.status != OrderStatus::Pending {
			return Err(LifecycleError::AlreadyResolved {
				status: order.status,
			});
		}

		if order.is_expired_at(now) {
			return match self
				.expire_order(&order.id, now, ExpirySource::Verification)
				.await
			{
				Ok(ExpiryOutcome::Expired(_)) => Err(LifecycleError::Expired),
				Ok(ExpiryOutcome::AlreadyResolved(current)) => {
					Err(resolution_error(&current))
				},
				Err(e) => Err(e),
			};
		}

		match self
			.storage
			.try_transition(
				&order.id,
				OrderStatus::Pending,
				OrderStatus::Completed,
				&TransitionFields::picked_up(now),
				self.penalties.completion_effect(order.total),
			)
			.await?
		{
			TransitionOutcome::Applied { order, account } => {
				tracing::info!(
					order_id = %truncate_id(&order.id),
					total = %order.total,
					"Order picked up"
				);
				if let Some(account) = &account {
					self.penalties.on_completed(account, order.total);
				}
				self.event_bus.publish(LifecycleEvent::OrderCompleted {
					order_id: order.id.clone(),
					account_id: order.account_id.clone(),
					total: order.total,
					pickup_time: now,
				});
				Ok(order)
			},
			TransitionOutcome::Conflict(current) => {
				tracing::debug!(
					order_id = %truncate_id(&current.id),
					status = %current.status,
					"Lost verification race"
				);
				Err(resolution_error(&current))
			},
		}
	}

	/// Moves a pending order to `no-show` together with its strike.
	///
	/// Used both by verification after the deadline and by the expiry
	/// reaper. Only the caller whose compare-and-set succeeds publishes
	/// events; everyone else gets `AlreadyResolved` with the order as found.
	/// On error nothing was written and the order is still pending.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), source = ?source))]
	pub async fn expire_order(
		&self,
		order_id: &str,
		now: DateTime<Utc>,
		source: ExpirySource,
	) -> Result<ExpiryOutcome, LifecycleError> {
		let (order, account) = match self
			.storage
			.try_transition(
				order_id,
				OrderStatus::Pending,
				OrderStatus::NoShow,
				&TransitionFields::resolved(now),
				Some(self.penalties.no_show_effect()),
			)
			.await?
		{
			TransitionOutcome::Applied {
				order,
				account: Some(account),
			} => (order, account),
			TransitionOutcome::Applied { order, account: None } => {
				return Err(LifecycleError::Internal(format!(
					"No-show for order {} committed without account counters",
					order.id
				)));
			},
			TransitionOutcome::Conflict(current) => {
				return Ok(ExpiryOutcome::AlreadyResolved(current));
			},
		};

		tracing::info!(
			account_id = %truncate_id(&order.account_id),
			"Order expired without pickup"
		);
		self.event_bus.publish(LifecycleEvent::OrderExpired {
			order_id: order.id.clone(),
			account_id: order.account_id.clone(),
			source,
		});

		let outcome = self.penalties.on_no_show(account);
		if outcome.newly_blocked {
			self.event_bus.publish(LifecycleEvent::AccountBlocked {
				account_id: outcome.account.id.clone(),
				strike_count: outcome.account.strike_count,
			});
		}

		Ok(ExpiryOutcome::Expired(order))
	}

	/// Cancels an order at the current time.
	pub async fn cancel_order(&self, order_id: &str) -> Result<Order, LifecycleError> {
		self.cancel_order_at(order_id, Utc::now()).await
	}

	/// Cancels a pending order as of `now`. No penalty attaches.
	///
	/// A pending order whose window has already closed cannot be cancelled;
	/// it is expired instead, so a late cancellation cannot avoid the strike.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn cancel_order_at(
		&self,
		order_id: &str,
		now: DateTime<Utc>,
	) -> Result<Order, LifecycleError> {
		let order = self.get_order(order_id).await?;
		if order.status != OrderStatus::Pending {
			return Err(LifecycleError::NotPending {
				status: order.status,
			});
		}

		if order.is_expired_at(now) {
			return match self
				.expire_order(&order.id, now, ExpirySource::Verification)
				.await
			{
				Ok(ExpiryOutcome::Expired(_)) => Err(LifecycleError::Expired),
				Ok(ExpiryOutcome::AlreadyResolved(current)) => {
					Err(LifecycleError::NotPending {
						status: current.status,
					})
				},
				Err(e) => Err(e),
			};
		}

		match self
			.storage
			.try_transition(
				&order.id,
				OrderStatus::Pending,
				OrderStatus::Cancelled,
				&TransitionFields::resolved(now),
				None,
			)
			.await?
		{
			TransitionOutcome::Applied { order, .. } => {
				tracing::info!("Order cancelled");
				self.event_bus.publish(LifecycleEvent::OrderCancelled {
					order_id: order.id.clone(),
					account_id: order.account_id.clone(),
				});
				Ok(order)
			},
			TransitionOutcome::Conflict(current) => Err(LifecycleError::NotPending {
				status: current.status,
			}),
		}
	}

	/// Looks up an order by id.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, LifecycleError> {
		self.storage
			.get_order(order_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => LifecycleError::NotFound {
					entity: "Order",
					id: order_id.to_string(),
				},
				other => other.into(),
			})
	}

	/// Returns an account's counters.
	pub async fn get_account(&self, account_id: &str) -> Result<Account, LifecycleError> {
		Ok(self.penalties.get_account(account_id).await?)
	}
}

/// Maps an order that someone else resolved to the error a caller sees.
fn resolution_error(order: &Order) -> LifecycleError {
	match order.status {
		OrderStatus::NoShow => LifecycleError::Expired,
		status => LifecycleError::AlreadyResolved { status },
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{harness, harness_with_tokens, line, Harness};
	use pickup_catalog::CatalogInterface;
	use rust_decimal_macros::dec;
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[tokio::test]
	async fn test_create_order_prices_and_freezes_lines() {
		let Harness { manager, .. } = harness(3).await;
		let now = Utc::now();

		let order = manager
			.create_order_at(
				"acc-1",
				&[line("latte", Some("large"), &["Extra Shot"], 2)],
				now,
			)
			.await
			.unwrap();

		assert_eq!(order.total, dec!(10.00));
		assert_eq!(order.status, OrderStatus::Pending);
		assert_eq!(order.expires_at, now + Duration::minutes(30));
		assert_eq!(order.qr_token.len(), 32);
		assert_eq!(order.lines[0].line_total, dec!(10.00));
		assert_eq!(manager.get_order(&order.id).await.unwrap(), order);
	}

	#[tokio::test]
	async fn test_catalog_change_does_not_touch_existing_order() {
		let Harness {
			manager, catalog, ..
		} = harness(3).await;

		let order = manager
			.create_order("acc-1", &[line("latte", None, &[], 1)])
			.await
			.unwrap();
		assert_eq!(order.total, dec!(3.50));

		let mut latte = catalog.get_product("latte").await.unwrap();
		latte.base_price = dec!(9.00);
		catalog.upsert(latte).await;

		assert_eq!(manager.get_order(&order.id).await.unwrap().total, dec!(3.50));
		let repriced = manager
			.create_order("acc-1", &[line("latte", None, &[], 1)])
			.await
			.unwrap();
		assert_eq!(repriced.total, dec!(9.00));
	}

	#[tokio::test]
	async fn test_create_order_validation() {
		let Harness { manager, .. } = harness(3).await;

		assert!(matches!(
			manager.create_order("acc-1", &[]).await,
			Err(LifecycleError::Validation(_))
		));
		assert!(matches!(
			manager
				.create_order("acc-1", &[line("latte", None, &[], 0)])
				.await,
			Err(LifecycleError::Validation(_))
		));
		assert!(matches!(
			manager
				.create_order("acc-1", &[line("latte", None, &[], 21)])
				.await,
			Err(LifecycleError::Validation(_))
		));
		assert!(matches!(
			manager
				.create_order("acc-1", &[line("seasonal", None, &[], 1)])
				.await,
			Err(LifecycleError::Validation(_))
		));
		assert!(matches!(
			manager
				.create_order("acc-1", &[line("mocha", None, &[], 1)])
				.await,
			Err(LifecycleError::NotFound { entity: "Product", .. })
		));
		assert!(matches!(
			manager
				.create_order("  ", &[line("latte", None, &[], 1)])
				.await,
			Err(LifecycleError::Validation(_))
		));
	}

	#[tokio::test]
	async fn test_unmatched_add_on_is_ignored() {
		let Harness { manager, .. } = harness(3).await;
		let order = manager
			.create_order("acc-1", &[line("latte", Some("venti"), &["Sprinkles"], 1)])
			.await
			.unwrap();
		assert_eq!(order.total, dec!(3.50));
		assert!(order.lines[0].add_ons.is_empty());
		assert_eq!(order.lines[0].size, None);
	}

	#[tokio::test]
	async fn test_duplicate_token_retried_once() {
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = calls.clone();
		// Tokens: "dup", "dup", "fresh", ...
		let issuer = TokenIssuer::with_source(move || match counter.fetch_add(1, Ordering::SeqCst) {
			0 | 1 => "dup".to_string(),
			n => format!("fresh-{}", n),
		});
		let Harness { manager, .. } = harness_with_tokens(3, issuer).await;

		let first = manager
			.create_order("acc-1", &[line("latte", None, &[], 1)])
			.await
			.unwrap();
		assert_eq!(first.qr_token, "dup");

		let second = manager
			.create_order("acc-1", &[line("latte", None, &[], 1)])
			.await
			.unwrap();
		assert_eq!(second.qr_token, "fresh-2");
	}

	#[tokio::test]
	async fn test_repeated_token_collision_is_internal_error() {
		let issuer = TokenIssuer::with_source(|| "same".to_string());
		let Harness { manager, .. } = harness_with_tokens(3, issuer).await;

		manager
			.create_order("acc-1", &[line("latte", None, &[], 1)])
			.await
			.unwrap();
		assert!(matches!(
			manager
				.create_order("acc-1", &[line("latte", None, &[], 1)])
				.await,
			Err(LifecycleError::Internal(_))
		));
	}

	#[tokio::test]
	async fn test_verify_unknown_token() {
		let Harness { manager, .. } = harness(3).await;
		assert!(matches!(
			manager.verify_token("deadbeef").await,
			Err(LifecycleError::NotFound { entity: "Token", .. })
		));
	}

	#[tokio::test]
	async fn test_verify_twice_grants_points_once() {
		let Harness { manager, .. } = harness(3).await;
		let now = Utc::now();
		let order = manager
			.create_order_at(
				"acc-1",
				&[line("latte", Some("large"), &["Extra Shot"], 2)],
				now,
			)
			.await
			.unwrap();

		let picked_up_at = now + Duration::minutes(5);
		let completed = manager
			.verify_token_at(&order.qr_token, picked_up_at)
			.await
			.unwrap();
		assert_eq!(completed.status, OrderStatus::Completed);
		assert_eq!(completed.pickup_time, Some(picked_up_at));
		assert_eq!(manager.get_account("acc-1").await.unwrap().loyalty_points, 10);

		let again = manager
			.verify_token_at(&order.qr_token, picked_up_at)
			.await;
		assert!(matches!(
			again,
			Err(LifecycleError::AlreadyResolved {
				status: OrderStatus::Completed
			})
		));
		assert_eq!(manager.get_account("acc-1").await.unwrap().loyalty_points, 10);
	}

	#[tokio::test]
	async fn test_expiry_boundary() {
		let Harness { manager, .. } = harness(3).await;
		let now = Utc::now();

		let early = manager
			.create_order_at("acc-1", &[line("latte", None, &[], 1)], now)
			.await
			.unwrap();
		let result = manager
			.verify_token_at(&early.qr_token, early.expires_at - Duration::seconds(1))
			.await
			.unwrap();
		assert_eq!(result.status, OrderStatus::Completed);

		let late = manager
			.create_order_at("acc-2", &[line("latte", None, &[], 1)], now)
			.await
			.unwrap();
		let result = manager
			.verify_token_at(&late.qr_token, late.expires_at + Duration::seconds(1))
			.await;
		assert!(matches!(result, Err(LifecycleError::Expired)));
		assert_eq!(
			manager.get_order(&late.id).await.unwrap().status,
			OrderStatus::NoShow
		);
		let account = manager.get_account("acc-2").await.unwrap();
		assert_eq!(account.strike_count, 1);
		assert_eq!(account.loyalty_points, 0);

		// Later attempts see the resolved status and change nothing.
		let result = manager
			.verify_token_at(&late.qr_token, late.expires_at + Duration::seconds(2))
			.await;
		assert!(matches!(
			result,
			Err(LifecycleError::AlreadyResolved {
				status: OrderStatus::NoShow
			})
		));
		assert_eq!(manager.get_account("acc-2").await.unwrap().strike_count, 1);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_verification_single_winner() {
		let Harness { manager, events, .. } = harness(3).await;
		let mut receiver = events.subscribe();
		let now = Utc::now();
		let order = manager
			.create_order_at("acc-1", &[line("latte", None, &[], 3)], now)
			.await
			.unwrap();

		let mut handles = Vec::new();
		for _ in 0..16 {
			let manager = manager.clone();
			let token = order.qr_token.clone();
			handles.push(tokio::spawn(async move {
				manager
					.verify_token_at(&token, now + Duration::minutes(1))
					.await
			}));
		}

		let mut completed = 0;
		let mut resolved = 0;
		for handle in handles {
			match handle.await.unwrap() {
				Ok(order) => {
					assert_eq!(order.status, OrderStatus::Completed);
					completed += 1;
				},
				Err(LifecycleError::AlreadyResolved { .. }) => resolved += 1,
				Err(other) => panic!("unexpected error {:?}", other),
			}
		}
		assert_eq!(completed, 1);
		assert_eq!(resolved, 15);
		assert_eq!(manager.get_account("acc-1").await.unwrap().loyalty_points, 10);

		let mut completions = 0;
		while let Ok(event) = receiver.try_recv() {
			if matches!(event, LifecycleEvent::OrderCompleted { .. }) {
				completions += 1;
			}
		}
		assert_eq!(completions, 1);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_late_verification_single_strike() {
		let Harness { manager, .. } = harness(10).await;
		let now = Utc::now();
		let order = manager
			.create_order_at("acc-1", &[line("latte", None, &[], 1)], now)
			.await
			.unwrap();

		let late = order.expires_at + Duration::seconds(30);
		let mut handles = Vec::new();
		for _ in 0..8 {
			let manager = manager.clone();
			let token = order.qr_token.clone();
			handles.push(tokio::spawn(async move {
				manager.verify_token_at(&token, late).await
			}));
		}
		for handle in handles {
			let result = handle.await.unwrap();
			assert!(
				matches!(
					result,
					Err(LifecycleError::Expired)
						| Err(LifecycleError::AlreadyResolved {
							status: OrderStatus::NoShow
						})
				),
				"unexpected result {:?}",
				result
			);
		}
		assert_eq!(manager.get_account("acc-1").await.unwrap().strike_count, 1);
	}

	#[tokio::test]
	async fn test_cancel_only_pending() {
		let Harness { manager, .. } = harness(3).await;
		let now = Utc::now();
		let order = manager
			.create_order_at("acc-1", &[line("latte", None, &[], 1)], now)
			.await
			.unwrap();

		let cancelled = manager
			.cancel_order_at(&order.id, now + Duration::minutes(1))
			.await
			.unwrap();
		assert_eq!(cancelled.status, OrderStatus::Cancelled);
		assert_eq!(manager.get_account("acc-1").await.unwrap().strike_count, 0);

		assert!(matches!(
			manager
				.cancel_order_at(&order.id, now + Duration::minutes(2))
				.await,
			Err(LifecycleError::NotPending {
				status: OrderStatus::Cancelled
			})
		));
		assert!(matches!(
			manager
				.verify_token_at(&order.qr_token, now + Duration::minutes(2))
				.await,
			Err(LifecycleError::AlreadyResolved {
				status: OrderStatus::Cancelled
			})
		));
		assert!(matches!(
			manager.cancel_order("missing").await,
			Err(LifecycleError::NotFound { entity: "Order", .. })
		));
	}

	#[tokio::test]
	async fn test_late_cancel_counts_as_no_show() {
		let Harness { manager, .. } = harness(3).await;
		let now = Utc::now();
		let order = manager
			.create_order_at("acc-1", &[line("latte", None, &[], 1)], now)
			.await
			.unwrap();

		let result = manager
			.cancel_order_at(&order.id, order.expires_at + Duration::seconds(1))
			.await;
		assert!(matches!(result, Err(LifecycleError::Expired)));
		assert_eq!(manager.get_account("acc-1").await.unwrap().strike_count, 1);
	}

	#[tokio::test]
	async fn test_third_no_show_blocks_account() {
		let Harness { manager, events, .. } = harness(3).await;
		let mut receiver = events.subscribe();
		let now = Utc::now();

		for expected_strikes in 1..=3u32 {
			let order = manager
				.create_order_at("acc-1", &[line("latte", None, &[], 1)], now)
				.await
				.unwrap();
			let outcome = manager
				.expire_order(
					&order.id,
					order.expires_at + Duration::seconds(1),
					ExpirySource::Reaper,
				)
				.await
				.unwrap();
			assert!(matches!(outcome, ExpiryOutcome::Expired(_)));

			let account = manager.get_account("acc-1").await.unwrap();
			assert_eq!(account.strike_count, expected_strikes);
			assert_eq!(account.is_blocked, expected_strikes == 3);
		}

		assert!(matches!(
			manager
				.create_order("acc-1", &[line("latte", None, &[], 1)])
				.await,
			Err(LifecycleError::AccountBlocked)
		));
		// Blocking is checked before the request itself is validated.
		assert!(matches!(
			manager.create_order("acc-1", &[]).await,
			Err(LifecycleError::AccountBlocked)
		));

		let mut blocked_events = 0;
		while let Ok(event) = receiver.try_recv() {
			if let LifecycleEvent::AccountBlocked { strike_count, .. } = event {
				assert_eq!(strike_count, 3);
				blocked_events += 1;
			}
		}
		assert_eq!(blocked_events, 1);
	}

	#[tokio::test]
	async fn test_expire_resolved_order_is_noop() {
		let Harness { manager, .. } = harness(3).await;
		let now = Utc::now();
		let order = manager
			.create_order_at("acc-1", &[line("latte", None, &[], 1)], now)
			.await
			.unwrap();
		manager.verify_token_at(&order.qr_token, now).await.unwrap();

		let outcome = manager
			.expire_order(&order.id, order.expires_at + Duration::minutes(1), ExpirySource::Reaper)
			.await
			.unwrap();
		match outcome {
			ExpiryOutcome::AlreadyResolved(current) => {
				assert_eq!(current.status, OrderStatus::Completed)
			},
			other => panic!("unexpected outcome {:?}", other),
		}
		assert_eq!(manager.get_account("acc-1").await.unwrap().strike_count, 0);
	}
}
