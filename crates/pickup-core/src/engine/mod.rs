//! Core pickup engine that owns the order lifecycle services.
//!
//! The engine wires storage, catalog, account penalties and the lifecycle
//! manager together, runs the expiry reaper in the background, and writes an
//! audit trail of every lifecycle event until shutdown.

pub mod event_bus;
pub mod lifecycle;
pub mod token_issuer;

use crate::monitoring::ExpiryReaper;
use crate::recovery::RecoveryService;
use crate::state::OrderLifecycleManager;
use pickup_account::AccountPenaltyService;
use pickup_config::Config;
use pickup_storage::StorageService;
use pickup_types::{truncate_id, LifecycleEvent};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

/// Main pickup engine.
#[derive(Clone)]
pub struct PickupEngine {
	/// Service configuration.
	pub(crate) config: Config,
	/// Storage service for orders, tokens and accounts.
	pub(crate) storage: Arc<StorageService>,
	/// Strike and loyalty bookkeeping.
	pub(crate) penalties: Arc<AccountPenaltyService>,
	/// Order creation, verification and cancellation.
	pub(crate) orders: Arc<OrderLifecycleManager>,
	/// Background expiry sweep.
	pub(crate) reaper: Arc<ExpiryReaper>,
	/// Event bus for lifecycle events.
	pub(crate) event_bus: event_bus::EventBus,
	/// Cancelled once to stop background tasks.
	pub(crate) shutdown_token: CancellationToken,
}

impl PickupEngine {
	/// Creates a new pickup engine with the given services.
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		penalties: Arc<AccountPenaltyService>,
		orders: Arc<OrderLifecycleManager>,
		event_bus: event_bus::EventBus,
	) -> Self {
		let shutdown = CancellationToken::new();
		let reaper = Arc::new(ExpiryReaper::new(
			storage.clone(),
			orders.clone(),
			config.reaper.batch_size,
			config.reaper.interval(),
			shutdown.clone(),
		));

		Self {
			config,
			storage,
			penalties,
			orders,
			reaper,
			event_bus,
			shutdown_token: shutdown,
		}
	}

	/// Main execution loop: recovers state, starts the reaper and audits
	/// events until ctrl-c or [`PickupEngine::stop`].
	pub async fn run(&self) -> Result<(), EngineError> {
		self.initialize().await?;

		let mut event_receiver = self.event_bus.subscribe();

		let reaper_handle = if self.config.reaper.enabled {
			let reaper = self.reaper.clone();
			tracing::info!(
				interval_seconds = self.config.reaper.interval_seconds,
				batch_size = self.config.reaper.batch_size,
				"Starting expiry reaper"
			);
			Some(tokio::spawn(async move { reaper.run().await }))
		} else {
			tracing::warn!("Expiry reaper disabled; overdue orders expire only on verification");
			None
		};

		loop {
			tokio::select! {
				event = event_receiver.recv() => {
					match event {
						Ok(event) => audit(&event),
						Err(RecvError::Lagged(missed)) => {
							tracing::warn!(missed, "Audit log fell behind lifecycle events");
						}
						Err(RecvError::Closed) => break,
					}
				}

				_ = tokio::signal::ctrl_c() => {
					break;
				}

				_ = self.shutdown_token.cancelled() => {
					break;
				}
			}
		}

		self.shutdown_token.cancel();
		if let Some(handle) = reaper_handle {
			if let Err(e) = handle.await {
				tracing::error!(error = %e, "Expiry reaper task failed");
			}
		}
		self.shutdown().await?;
		Ok(())
	}

	/// Requests shutdown; `run` returns once background work has stopped.
	pub fn stop(&self) {
		self.shutdown_token.cancel();
	}

	/// Returns the service configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns the storage service.
	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	/// Returns the account penalty service.
	pub fn penalties(&self) -> &Arc<AccountPenaltyService> {
		&self.penalties
	}

	/// Returns the order lifecycle manager.
	pub fn orders(&self) -> &Arc<OrderLifecycleManager> {
		&self.orders
	}

	/// Returns the expiry reaper.
	pub fn reaper(&self) -> &Arc<ExpiryReaper> {
		&self.reaper
	}

	/// Returns the event bus.
	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}

	pub(crate) fn recovery(&self) -> RecoveryService {
		RecoveryService::new(self.reaper.clone())
	}
}

/// Writes one audit line per lifecycle event.
fn audit(event: &LifecycleEvent) {
	match event {
		LifecycleEvent::OrderCreated { order } => tracing::info!(
			target: "pickup::audit",
			order_id = %truncate_id(&order.id),
			account_id = %truncate_id(&order.account_id),
			total = %order.total,
			"order created"
		),
		LifecycleEvent::OrderCompleted {
			order_id,
			account_id,
			total,
			pickup_time,
		} => tracing::info!(
			target: "pickup::audit",
			order_id = %truncate_id(order_id),
			account_id = %truncate_id(account_id),
			total = %total,
			pickup_time = %pickup_time,
			"order completed"
		),
		LifecycleEvent::OrderExpired {
			order_id,
			account_id,
			source,
		} => tracing::info!(
			target: "pickup::audit",
			order_id = %truncate_id(order_id),
			account_id = %truncate_id(account_id),
			source = ?source,
			"order expired"
		),
		LifecycleEvent::OrderCancelled {
			order_id,
			account_id,
		} => tracing::info!(
			target: "pickup::audit",
			order_id = %truncate_id(order_id),
			account_id = %truncate_id(account_id),
			"order cancelled"
		),
		LifecycleEvent::AccountBlocked {
			account_id,
			strike_count,
		} => tracing::warn!(
			target: "pickup::audit",
			account_id = %truncate_id(account_id),
			strike_count,
			"account blocked"
		),
	}
}
