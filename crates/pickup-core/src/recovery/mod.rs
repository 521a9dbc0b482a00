//! Recovery of order state after a restart.
//!
//! Orders whose pickup window closed while the service was down are still
//! `pending` in storage. Recovery runs one full expiry sweep before the
//! service starts taking requests so those orders are resolved and their
//! strikes applied.

use crate::monitoring::{ExpiryReaper, SweepReport};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur during recovery operations.
#[derive(Debug, Error)]
pub enum RecoveryError {
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Report of the recovery operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
	/// Result of the catch-up sweep.
	pub sweep: SweepReport,
}

/// Service responsible for resolving orders left behind by a previous run.
pub struct RecoveryService {
	reaper: Arc<ExpiryReaper>,
}

impl RecoveryService {
	/// Creates a new RecoveryService that sweeps with `reaper`.
	pub fn new(reaper: Arc<ExpiryReaper>) -> Self {
		Self { reaper }
	}

	/// Expires every pending order whose deadline has already passed.
	#[instrument(skip_all)]
	pub async fn recover_state(&self) -> Result<RecoveryReport, RecoveryError> {
		tracing::info!("Starting state recovery from storage");

		let sweep = self
			.reaper
			.sweep_once(Utc::now())
			.await
			.map_err(|e| RecoveryError::Storage(e.to_string()))?;

		if sweep.scanned == 0 {
			tracing::info!("No overdue orders to recover");
		} else {
			tracing::info!(
				"Recovery complete: {} overdue orders, {} expired, {} already resolved, {} failed",
				sweep.scanned,
				sweep.expired,
				sweep.skipped,
				sweep.failed
			);
		}

		Ok(RecoveryReport { sweep })
	}
}
