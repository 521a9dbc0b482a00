//! HTTP server for the pickup API.
//!
//! Exposes order creation, counter verification, cancellation and read-only
//! lookups over the lifecycle engine.

use axum::{
	extract::{FromRequest, Path, Request, State},
	http::{header, HeaderValue, Method, StatusCode},
	response::{IntoResponse, Json},
	routing::{get, patch, post},
	Router,
};
use pickup_config::ApiConfig;
use pickup_core::PickupEngine;
use pickup_types::{
	APIError, Account, CancelOrderResponse, CreateOrderRequest, CreateOrderResponse, Order,
	VerifyOrderRequest, VerifyOrderResponse,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
	cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Reference to the pickup engine for processing requests.
	pub engine: Arc<PickupEngine>,
}

/// JSON request body whose rejections use the API error shape.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
	T: DeserializeOwned,
	S: Send + Sync,
{
	type Rejection = APIError;

	async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
		match Json::<T>::from_request(req, state).await {
			Ok(Json(value)) => Ok(ApiJson(value)),
			Err(rejection) => Err(APIError::BadRequest {
				error_type: "VALIDATION_ERROR".to_string(),
				message: rejection.body_text(),
				details: None,
			}),
		}
	}
}

/// Builds the API router with its middleware stack.
pub fn router(api_config: &ApiConfig, engine: Arc<PickupEngine>) -> Router {
	Router::new()
		.route("/health", get(handle_health))
		.route("/orders", post(handle_create_order))
		.route("/orders/verify", post(handle_verify_order))
		.route("/orders/{id}", get(handle_get_order))
		.route("/orders/{id}/cancel", patch(handle_cancel_order))
		.route("/accounts/{id}", get(handle_get_account))
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(TimeoutLayer::new(Duration::from_secs(
					api_config.timeout_seconds,
				)))
				.map_response(IntoResponse::into_response)
				.layer(RequestBodyLimitLayer::new(api_config.max_request_size))
				.layer(cors_layer(api_config)),
		)
		.with_state(AppState { engine })
}

fn cors_layer(api_config: &ApiConfig) -> CorsLayer {
	let origins: Vec<HeaderValue> = api_config
		.cors
		.as_ref()
		.map(|cors| {
			cors.allowed_origins
				.iter()
				.filter_map(|origin| match origin.parse() {
					Ok(value) => Some(value),
					Err(_) => {
						tracing::warn!(%origin, "Ignoring invalid CORS origin");
						None
					},
				})
				.collect()
		})
		.unwrap_or_default();

	if origins.is_empty() {
		return CorsLayer::permissive();
	}
	CorsLayer::new()
		.allow_origin(origins)
		.allow_methods([Method::GET, Method::POST, Method::PATCH])
		.allow_headers([header::CONTENT_TYPE])
}

/// Starts the HTTP server for the API.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<PickupEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(&api_config, engine);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Pickup API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Handles GET /health requests.
async fn handle_health() -> Json<serde_json::Value> {
	Json(serde_json::json!({ "status": "ok" }))
}

/// Handles POST /orders requests.
async fn handle_create_order(
	State(state): State<AppState>,
	ApiJson(request): ApiJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), APIError> {
	let response = crate::apis::order::create_order(request, &state.engine).await?;
	Ok((StatusCode::CREATED, Json(response)))
}

/// Handles POST /orders/verify requests.
async fn handle_verify_order(
	State(state): State<AppState>,
	ApiJson(request): ApiJson<VerifyOrderRequest>,
) -> Result<Json<VerifyOrderResponse>, APIError> {
	crate::apis::order::verify_order(request, &state.engine)
		.await
		.map(Json)
}

/// Handles PATCH /orders/{id}/cancel requests.
async fn handle_cancel_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<CancelOrderResponse>, APIError> {
	crate::apis::order::cancel_order(&id, &state.engine)
		.await
		.map(Json)
}

/// Handles GET /orders/{id} requests.
async fn handle_get_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<Order>, APIError> {
	crate::apis::order::get_order(&id, &state.engine)
		.await
		.map(Json)
}

/// Handles GET /accounts/{id} requests.
async fn handle_get_account(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<Account>, APIError> {
	crate::apis::account::get_account(&id, &state.engine)
		.await
		.map(Json)
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::{to_bytes, Body};
	use axum::http::Request;
	use chrono::{Duration as ChronoDuration, Utc};
	use pickup_config::ConfigBuilder;
	use pickup_core::{PickupBuilder, PickupFactories};
	use pickup_types::{ExpirySource, OrderLineRequest};
	use rust_decimal::Decimal;
	use rust_decimal_macros::dec;
	use serde_json::{json, Value};
	use tower::ServiceExt;

	fn api_config() -> ApiConfig {
		ApiConfig {
			enabled: true,
			host: "127.0.0.1".into(),
			port: 0,
			timeout_seconds: 5,
			max_request_size: 1024 * 1024,
			cors: None,
		}
	}

	fn engine(strike_threshold: u32) -> Arc<PickupEngine> {
		let config = ConfigBuilder::new()
			.strike_threshold(strike_threshold)
			.product("latte", "3.50", &[("large", "0.50")], &[("Extra Shot", "1.00")])
			.build();
		let factories = PickupFactories {
			storage_factories: pickup_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			catalog_factories: pickup_catalog::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		};
		Arc::new(PickupBuilder::new(config).build(factories).unwrap())
	}

	async fn send(
		app: &Router,
		method: &str,
		uri: &str,
		body: Option<Value>,
	) -> (StatusCode, Value) {
		send_raw(app, method, uri, body.map(|body| body.to_string())).await
	}

	async fn send_raw(
		app: &Router,
		method: &str,
		uri: &str,
		body: Option<String>,
	) -> (StatusCode, Value) {
		let request = Request::builder()
			.method(method)
			.uri(uri)
			.header(header::CONTENT_TYPE, "application/json")
			.body(match body {
				Some(body) => Body::from(body),
				None => Body::empty(),
			})
			.unwrap();
		let response = app.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let value = if bytes.is_empty() {
			Value::Null
		} else {
			serde_json::from_slice(&bytes).unwrap_or(Value::Null)
		};
		(status, value)
	}

	fn latte_order(account_id: &str) -> Value {
		json!({
			"accountId": account_id,
			"lines": [{
				"productId": "latte",
				"size": "large",
				"addOnNames": ["Extra Shot"],
				"quantity": 2
			}]
		})
	}

	#[tokio::test]
	async fn test_health() {
		let app = router(&api_config(), engine(3));
		let (status, body) = send(&app, "GET", "/health", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body, json!({ "status": "ok" }));
	}

	#[tokio::test]
	async fn test_create_then_verify_twice() {
		let app = router(&api_config(), engine(3));

		let (status, created) = send(&app, "POST", "/orders", Some(latte_order("acc-1"))).await;
		assert_eq!(status, StatusCode::CREATED);
		assert_eq!(created["status"], "pending");
		let total: Decimal = created["total"].as_str().unwrap().parse().unwrap();
		assert_eq!(total, dec!(10.00));
		let token = created["qrToken"].as_str().unwrap().to_string();

		let (status, verified) = send(
			&app,
			"POST",
			"/orders/verify",
			Some(json!({ "qrToken": token })),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(verified["status"], "completed");
		assert_eq!(verified["orderId"], created["orderId"]);
		assert!(verified["pickupTime"].is_string());

		let (status, again) = send(
			&app,
			"POST",
			"/orders/verify",
			Some(json!({ "qrToken": token })),
		)
		.await;
		assert_eq!(status, StatusCode::CONFLICT);
		assert_eq!(again["status"], "completed");
		assert_eq!(again["reason"], "already_resolved");

		let (status, account) = send(&app, "GET", "/accounts/acc-1", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(account["loyaltyPoints"], 10);
		assert_eq!(account["strikeCount"], 0);
	}

	#[tokio::test]
	async fn test_verify_unknown_token() {
		let app = router(&api_config(), engine(3));
		let (status, body) = send(
			&app,
			"POST",
			"/orders/verify",
			Some(json!({ "qrToken": "00000000000000000000000000000000" })),
		)
		.await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(body["error"], "TOKEN_NOT_FOUND");
	}

	#[tokio::test]
	async fn test_late_verification_reports_expired() {
		let engine = engine(3);
		let app = router(&api_config(), engine.clone());
		let order = engine
			.orders()
			.create_order_at(
				"acc-1",
				&[OrderLineRequest {
					product_id: "latte".into(),
					size: None,
					add_on_names: vec![],
					quantity: 1,
				}],
				Utc::now() - ChronoDuration::hours(2),
			)
			.await
			.unwrap();

		let (status, body) = send(
			&app,
			"POST",
			"/orders/verify",
			Some(json!({ "qrToken": order.qr_token })),
		)
		.await;
		assert_eq!(status, StatusCode::CONFLICT);
		assert_eq!(body["status"], "no-show");
		assert_eq!(body["reason"], "expired");

		let (_, account) = send(&app, "GET", "/accounts/acc-1", None).await;
		assert_eq!(account["strikeCount"], 1);
	}

	#[tokio::test]
	async fn test_cancel() {
		let app = router(&api_config(), engine(3));
		let (_, created) = send(&app, "POST", "/orders", Some(latte_order("acc-1"))).await;
		let uri = format!("/orders/{}/cancel", created["orderId"].as_str().unwrap());

		let (status, body) = send(&app, "PATCH", &uri, None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["status"], "cancelled");

		let (status, body) = send(&app, "PATCH", &uri, None).await;
		assert_eq!(status, StatusCode::CONFLICT);
		assert_eq!(body["reason"], "not_pending");

		let (status, _) = send(&app, "PATCH", "/orders/missing/cancel", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn test_get_order() {
		let app = router(&api_config(), engine(3));
		let (_, created) = send(&app, "POST", "/orders", Some(latte_order("acc-1"))).await;
		let uri = format!("/orders/{}", created["orderId"].as_str().unwrap());

		let (status, order) = send(&app, "GET", &uri, None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(order["accountId"], "acc-1");
		assert_eq!(order["lines"][0]["quantity"], 2);

		let (status, _) = send(&app, "GET", "/orders/missing", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn test_rejections() {
		let engine = engine(1);
		let app = router(&api_config(), engine.clone());

		let mut zero = latte_order("acc-1");
		zero["lines"][0]["quantity"] = json!(0);
		let (status, body) = send(&app, "POST", "/orders", Some(zero)).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "VALIDATION_ERROR");

		let (status, body) = send(
			&app,
			"POST",
			"/orders",
			Some(json!({
				"accountId": "acc-1",
				"lines": [{ "productId": "mocha", "quantity": 1 }]
			})),
		)
		.await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(body["error"], "PRODUCT_NOT_FOUND");

		let (_, created) = send(&app, "POST", "/orders", Some(latte_order("acc-1"))).await;
		let order_id = created["orderId"].as_str().unwrap();
		engine
			.orders()
			.expire_order(
				order_id,
				Utc::now() + ChronoDuration::hours(1),
				ExpirySource::Reaper,
			)
			.await
			.unwrap();

		let (status, body) = send(&app, "POST", "/orders", Some(latte_order("acc-1"))).await;
		assert_eq!(status, StatusCode::FORBIDDEN);
		assert_eq!(body["error"], "ACCOUNT_BLOCKED");
	}

	#[tokio::test]
	async fn test_unreadable_bodies_use_error_shape() {
		let app = router(&api_config(), engine(3));

		let (status, body) =
			send_raw(&app, "POST", "/orders", Some("{\"accountId\": ".to_string())).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "VALIDATION_ERROR");
		assert!(body["message"].is_string());

		let mut negative = latte_order("acc-1");
		negative["lines"][0]["quantity"] = json!(-1);
		let (status, body) = send(&app, "POST", "/orders", Some(negative)).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "VALIDATION_ERROR");

		let (status, body) = send(&app, "POST", "/orders/verify", Some(json!({}))).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "VALIDATION_ERROR");
		assert!(body["message"].as_str().unwrap().contains("qrToken"));
	}
}
