//! API types for the pickup HTTP API.
//!
//! This module defines the request and response bodies shared by the web
//! client and the chat bot, plus the structured error type the handlers
//! return.

use crate::{Order, OrderLine, OrderStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request body for `POST /orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
	/// Authenticated account placing the order.
	pub account_id: String,
	/// Requested lines, in display order.
	pub lines: Vec<OrderLineRequest>,
}

/// One requested line inside a [`CreateOrderRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
	pub product_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub size: Option<String>,
	#[serde(default)]
	pub add_on_names: Vec<String>,
	pub quantity: u32,
}

/// Response body for a created order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
	pub order_id: String,
	pub qr_token: String,
	/// Exact decimal string, e.g. `"10.00"`.
	#[serde(with = "rust_decimal::serde::str")]
	pub total: Decimal,
	pub status: OrderStatus,
	pub expires_at: DateTime<Utc>,
}

impl From<&Order> for CreateOrderResponse {
	fn from(order: &Order) -> Self {
		Self {
			order_id: order.id.clone(),
			qr_token: order.qr_token.clone(),
			total: order.total,
			status: order.status,
			expires_at: order.expires_at,
		}
	}
}

/// Request body for `POST /orders/verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOrderRequest {
	pub qr_token: String,
}

/// Response body for a successful pickup verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOrderResponse {
	pub order_id: String,
	pub status: OrderStatus,
	pub pickup_time: Option<DateTime<Utc>>,
	/// Exact decimal string, e.g. `"10.00"`.
	#[serde(with = "rust_decimal::serde::str")]
	pub total: Decimal,
	pub lines: Vec<OrderLine>,
}

impl From<&Order> for VerifyOrderResponse {
	fn from(order: &Order) -> Self {
		Self {
			order_id: order.id.clone(),
			status: order.status,
			pickup_time: order.pickup_time,
			total: order.total,
			lines: order.lines.clone(),
		}
	}
}

/// Response body for `PATCH /orders/{id}/cancel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderResponse {
	pub order_id: String,
	pub status: OrderStatus,
}

/// Why a request conflicted with the current order state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
	/// This request observed the deadline pass and resolved the order as a no-show.
	Expired,
	/// The order had already been resolved before this request.
	AlreadyResolved,
	/// The operation is only legal on pending orders.
	NotPending,
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Current order status for state conflicts
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<OrderStatus>,
	/// Conflict classification for state conflicts
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<ConflictReason>,
	/// Additional error context
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

/// Structured API error type with appropriate HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Bad request with validation errors (400)
	BadRequest {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Account is not allowed to order (403)
	Forbidden { error_type: String, message: String },
	/// Referenced entity does not exist (404)
	NotFound { error_type: String, message: String },
	/// Request conflicts with the current order state (409)
	Conflict {
		error_type: String,
		message: String,
		status: OrderStatus,
		reason: ConflictReason,
	},
	/// Internal server error (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::Forbidden { .. } => 403,
			APIError::NotFound { .. } => 404,
			APIError::Conflict { .. } => 409,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		match self {
			APIError::BadRequest {
				error_type,
				message,
				details,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				status: None,
				reason: None,
				details: details.clone(),
			},
			APIError::Forbidden {
				error_type,
				message,
			}
			| APIError::NotFound {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				status: None,
				reason: None,
				details: None,
			},
			APIError::Conflict {
				error_type,
				message,
				status,
				reason,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				status: Some(*status),
				reason: Some(*reason),
				details: None,
			},
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::Forbidden { message, .. } => write!(f, "Forbidden: {}", message),
			APIError::NotFound { message, .. } => write!(f, "Not Found: {}", message),
			APIError::Conflict { message, .. } => write!(f, "Conflict: {}", message),
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

		let error_response = self.to_error_response();
		(status, Json(error_response)).into_response()
	}
}
