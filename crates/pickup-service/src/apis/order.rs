//! Order endpoints.
//!
//! Thin adapters between the HTTP surface and the lifecycle manager. Race
//! outcomes (already used, expired) are ordinary conflicts, rendered as 409
//! with the order's current status and a reason the client can show as a
//! business message.

use pickup_core::{LifecycleError, PickupEngine};
use pickup_types::{
	mask_token, APIError, CancelOrderResponse, ConflictReason, CreateOrderRequest,
	CreateOrderResponse, Order, OrderStatus, VerifyOrderRequest, VerifyOrderResponse,
};
use tracing::{info, warn};

/// Handles POST /orders.
pub async fn create_order(
	request: CreateOrderRequest,
	engine: &PickupEngine,
) -> Result<CreateOrderResponse, APIError> {
	let order = engine
		.orders()
		.create_order(&request.account_id, &request.lines)
		.await
		.map_err(to_api_error)?;
	Ok(CreateOrderResponse::from(&order))
}

/// Handles POST /orders/verify.
pub async fn verify_order(
	request: VerifyOrderRequest,
	engine: &PickupEngine,
) -> Result<VerifyOrderResponse, APIError> {
	if request.qr_token.trim().is_empty() {
		return Err(APIError::BadRequest {
			error_type: "VALIDATION_ERROR".to_string(),
			message: "qrToken cannot be empty".to_string(),
			details: None,
		});
	}

	let order = engine
		.orders()
		.verify_token(&request.qr_token)
		.await
		.map_err(|e| {
			info!(token = %mask_token(&request.qr_token), outcome = %e, "Pickup rejected");
			to_api_error(e)
		})?;
	Ok(VerifyOrderResponse::from(&order))
}

/// Handles PATCH /orders/{id}/cancel.
pub async fn cancel_order(
	order_id: &str,
	engine: &PickupEngine,
) -> Result<CancelOrderResponse, APIError> {
	let order = engine
		.orders()
		.cancel_order(order_id)
		.await
		.map_err(to_api_error)?;
	Ok(CancelOrderResponse {
		order_id: order.id,
		status: order.status,
	})
}

/// Handles GET /orders/{id}.
pub async fn get_order(order_id: &str, engine: &PickupEngine) -> Result<Order, APIError> {
	engine
		.orders()
		.get_order(order_id)
		.await
		.map_err(to_api_error)
}

/// Maps a lifecycle error to its HTTP representation.
pub fn to_api_error(error: LifecycleError) -> APIError {
	match error {
		LifecycleError::Validation(message) => APIError::BadRequest {
			error_type: "VALIDATION_ERROR".to_string(),
			message,
			details: None,
		},
		LifecycleError::NotFound { entity, id } => APIError::NotFound {
			error_type: format!("{}_NOT_FOUND", entity.to_uppercase()),
			message: format!("{} not found: {}", entity, id),
		},
		LifecycleError::AccountBlocked => APIError::Forbidden {
			error_type: "ACCOUNT_BLOCKED".to_string(),
			message: "Account is blocked after repeated missed pickups".to_string(),
		},
		LifecycleError::Expired => APIError::Conflict {
			error_type: "ORDER_EXPIRED".to_string(),
			message: "The pickup window has closed".to_string(),
			status: OrderStatus::NoShow,
			reason: ConflictReason::Expired,
		},
		LifecycleError::AlreadyResolved { status } => APIError::Conflict {
			error_type: "ORDER_ALREADY_RESOLVED".to_string(),
			message: format!("This code was already used; order is {}", status),
			status,
			reason: ConflictReason::AlreadyResolved,
		},
		LifecycleError::NotPending { status } => APIError::Conflict {
			error_type: "ORDER_NOT_PENDING".to_string(),
			message: format!("Order is {} and can no longer be changed", status),
			status,
			reason: ConflictReason::NotPending,
		},
		e @ (LifecycleError::Storage(_) | LifecycleError::Internal(_)) => {
			warn!(error = %e, "Order request failed");
			APIError::InternalServerError {
				error_type: "INTERNAL_ERROR".to_string(),
				message: "An internal error occurred".to_string(),
			}
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_conflicts_carry_status_and_reason() {
		match to_api_error(LifecycleError::Expired) {
			APIError::Conflict { status, reason, .. } => {
				assert_eq!(status, OrderStatus::NoShow);
				assert_eq!(reason, ConflictReason::Expired);
			},
			other => panic!("unexpected error {:?}", other),
		}

		let err = to_api_error(LifecycleError::AlreadyResolved {
			status: OrderStatus::Completed,
		});
		assert_eq!(err.status_code(), 409);
		let body = err.to_error_response();
		assert_eq!(body.error, "ORDER_ALREADY_RESOLVED");
		assert_eq!(body.reason, Some(ConflictReason::AlreadyResolved));
	}

	#[test]
	fn test_status_codes() {
		assert_eq!(
			to_api_error(LifecycleError::Validation("bad".into())).status_code(),
			400
		);
		assert_eq!(to_api_error(LifecycleError::AccountBlocked).status_code(), 403);
		let not_found = to_api_error(LifecycleError::NotFound {
			entity: "Token",
			id: "ab..".into(),
		});
		assert_eq!(not_found.status_code(), 404);
		assert_eq!(not_found.to_error_response().error, "TOKEN_NOT_FOUND");
		assert_eq!(
			to_api_error(LifecycleError::Storage("disk full".into())).status_code(),
			500
		);
	}

	#[test]
	fn test_internal_details_not_exposed() {
		let body = to_api_error(LifecycleError::Internal("lock poisoned".into())).to_error_response();
		assert!(!body.message.contains("lock poisoned"));
	}
}
