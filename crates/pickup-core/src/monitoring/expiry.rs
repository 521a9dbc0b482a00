//! Expiry reaper for abandoned orders.
//!
//! Periodically scans for pending orders past their pickup deadline and
//! moves each one to `no-show` through the same path verification uses, so a
//! customer arriving at the counter while the sweep runs is resolved exactly
//! once.

use crate::state::{ExpiryOutcome, LifecycleError, OrderLifecycleManager};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use pickup_storage::StorageService;
use pickup_types::{truncate_id, ExpirySource};
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Counts from one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
	/// Pending orders found past their deadline.
	pub scanned: usize,
	/// Orders this sweep moved to `no-show`.
	pub expired: usize,
	/// Orders resolved by someone else between the scan and the transition.
	pub skipped: usize,
	/// Orders whose transition failed. Nothing was written for them, so they
	/// are retried on the next sweep.
	pub failed: usize,
}

/// Background task that expires overdue pending orders.
pub struct ExpiryReaper {
	storage: Arc<StorageService>,
	orders: Arc<OrderLifecycleManager>,
	batch_size: usize,
	interval: Duration,
	shutdown: CancellationToken,
}

impl ExpiryReaper {
	pub fn new(
		storage: Arc<StorageService>,
		orders: Arc<OrderLifecycleManager>,
		batch_size: usize,
		interval: Duration,
		shutdown: CancellationToken,
	) -> Self {
		Self {
			storage,
			orders,
			batch_size,
			interval,
			shutdown,
		}
	}

	/// Runs one pass over every pending order expired as of `now`.
	///
	/// A failure on one order is counted and the sweep moves on. A failure
	/// to read the next batch ends the sweep early, and shutdown stops it
	/// between two orders.
	pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport, LifecycleError> {
		let mut report = SweepReport::default();
		let mut expired = pin!(self.storage.expired_pending(now, self.batch_size));

		while let Some(order) = expired.next().await {
			if self.shutdown.is_cancelled() {
				tracing::debug!("Stopping expiry sweep for shutdown");
				break;
			}
			let order = order?;
			report.scanned += 1;

			match self
				.orders
				.expire_order(&order.id, now, ExpirySource::Reaper)
				.await
			{
				Ok(ExpiryOutcome::Expired(_)) => report.expired += 1,
				Ok(ExpiryOutcome::AlreadyResolved(current)) => {
					tracing::debug!(
						order_id = %truncate_id(&current.id),
						status = %current.status,
						"Order resolved before the reaper reached it"
					);
					report.skipped += 1;
				},
				Err(e) => {
					tracing::warn!(
						order_id = %truncate_id(&order.id),
						error = %e,
						"Failed to expire order"
					);
					report.failed += 1;
				},
			}
		}

		if report.scanned > 0 {
			tracing::info!(
				scanned = report.scanned,
				expired = report.expired,
				skipped = report.skipped,
				failed = report.failed,
				"Expiry sweep finished"
			);
		}
		Ok(report)
	}

	/// Sweeps on a fixed interval until shutdown is requested.
	///
	/// An order already being expired when shutdown arrives is finished
	/// before this returns.
	pub async fn run(&self) {
		let mut interval = tokio::time::interval(self.interval);
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				_ = self.shutdown.cancelled() => break,
				_ = interval.tick() => {}
			}
			if let Err(e) = self.sweep_once(Utc::now()).await {
				tracing::warn!(error = %e, "Expiry sweep aborted");
			}
		}
		tracing::info!("Expiry reaper stopped");
	}
}
