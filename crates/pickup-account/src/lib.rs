//! Account penalty and loyalty module for the pickup order system.
//!
//! Terminal order transitions feed into account counters: a no-show adds a
//! strike and blocks the account at the configured threshold, a completed
//! pickup grants loyalty points. This service decides which counter change a
//! transition carries; storage commits that change in the same atomic step
//! as the status write, so a committed transition never loses its effect
//! and concurrent transitions for the same account never lose an increment.

use pickup_storage::{AccountEffect, StorageError, StorageService};
use pickup_types::{truncate_id, Account};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// Error that occurs when the counters cannot be read.
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

/// Result of a committed no-show strike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoShowOutcome {
	/// Account counters after the strike.
	pub account: Account,
	/// True only for the strike that reached the threshold.
	pub newly_blocked: bool,
}

/// Strike and loyalty policy for terminal order states.
pub struct AccountPenaltyService {
	storage: Arc<StorageService>,
	strike_threshold: u32,
	points_per_unit: u64,
}

impl AccountPenaltyService {
	/// Creates a new AccountPenaltyService.
	pub fn new(storage: Arc<StorageService>, strike_threshold: u32, points_per_unit: u64) -> Self {
		Self {
			storage,
			strike_threshold,
			points_per_unit,
		}
	}

	/// Returns the number of strikes that blocks an account.
	pub fn strike_threshold(&self) -> u32 {
		self.strike_threshold
	}

	/// Counter change carried by a `no-show` transition.
	pub fn no_show_effect(&self) -> AccountEffect {
		AccountEffect::Strike {
			threshold: self.strike_threshold,
		}
	}

	/// Counter change carried by a `completed` transition, if any points
	/// are earned.
	pub fn completion_effect(&self, total: Decimal) -> Option<AccountEffect> {
		match self.points_for(total) {
			0 => None,
			points => Some(AccountEffect::LoyaltyPoints(points)),
		}
	}

	/// Interprets the counters committed with a no-show strike.
	pub fn on_no_show(&self, account: Account) -> NoShowOutcome {
		let newly_blocked = account.is_blocked && account.strike_count == self.strike_threshold;

		if newly_blocked {
			tracing::warn!(
				account_id = %truncate_id(&account.id),
				strikes = account.strike_count,
				"Account blocked after repeated no-shows"
			);
		} else {
			tracing::info!(
				account_id = %truncate_id(&account.id),
				strikes = account.strike_count,
				"Recorded no-show strike"
			);
		}

		NoShowOutcome {
			account,
			newly_blocked,
		}
	}

	/// Logs the counters committed with a completed pickup.
	pub fn on_completed(&self, account: &Account, total: Decimal) {
		tracing::debug!(
			account_id = %truncate_id(&account.id),
			points = self.points_for(total),
			balance = account.loyalty_points,
			"Granted loyalty points"
		);
	}

	/// Loyalty points earned for an order total: one point per whole
	/// currency unit, scaled by the configured rate.
	pub fn points_for(&self, total: Decimal) -> u64 {
		total
			.floor()
			.to_u64()
			.unwrap_or(0)
			.saturating_mul(self.points_per_unit)
	}

	/// Returns the account's current counters.
	pub async fn get_account(&self, account_id: &str) -> Result<Account, AccountError> {
		Ok(self.storage.get_account(account_id).await?)
	}

	/// Returns true if the account may not place orders.
	pub async fn is_blocked(&self, account_id: &str) -> Result<bool, AccountError> {
		Ok(self.get_account(account_id).await?.is_blocked)
	}
}
