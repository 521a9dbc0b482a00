//! Account endpoints.

use pickup_core::PickupEngine;
use pickup_types::{APIError, Account};

/// Handles GET /accounts/{id}.
///
/// Unknown accounts read as fresh ones.
pub async fn get_account(account_id: &str, engine: &PickupEngine) -> Result<Account, APIError> {
	engine
		.orders()
		.get_account(account_id)
		.await
		.map_err(crate::apis::order::to_api_error)
}
