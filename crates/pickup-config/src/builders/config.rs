//! Configuration builder for creating test and development configurations.
//!
//! This module provides utilities for constructing Config instances with
//! sensible defaults: in-memory storage and a static catalog whose products
//! are supplied by the caller.

use crate::{
	ApiConfig, CatalogConfig, Config, OrdersConfig, PenaltyConfig, ReaperConfig, ServiceConfig,
	StorageConfig,
};
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	orders: OrdersConfig,
	penalty: PenaltyConfig,
	reaper: ReaperConfig,
	storage_primary: String,
	storage_config: toml::Value,
	products: Vec<toml::Value>,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Creates a new `ConfigBuilder` with default values suitable for testing.
	pub fn new() -> Self {
		Self {
			service_id: "pickup-test".to_string(),
			orders: OrdersConfig::default(),
			penalty: PenaltyConfig::default(),
			reaper: ReaperConfig::default(),
			storage_primary: "memory".to_string(),
			storage_config: toml::Value::Table(toml::map::Map::new()),
			products: Vec::new(),
			api: None,
		}
	}

	/// Sets the service ID.
	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	/// Sets the pickup window in minutes.
	pub fn ttl_minutes(mut self, minutes: u64) -> Self {
		self.orders.ttl_minutes = minutes;
		self
	}

	/// Sets the largest quantity accepted per line.
	pub fn max_quantity(mut self, max_quantity: u32) -> Self {
		self.orders.max_quantity = max_quantity;
		self
	}

	/// Sets the strike threshold for blocking.
	pub fn strike_threshold(mut self, threshold: u32) -> Self {
		self.penalty.strike_threshold = threshold;
		self
	}

	/// Sets the reaper batch size.
	pub fn reaper_batch_size(mut self, batch_size: usize) -> Self {
		self.reaper.batch_size = batch_size;
		self
	}

	/// Uses the given storage implementation and its raw configuration.
	pub fn storage(mut self, primary: impl Into<String>, config: toml::Value) -> Self {
		self.storage_primary = primary.into();
		self.storage_config = config;
		self
	}

	/// Adds a product to the static catalog.
	///
	/// `sizes` and `add_ons` are `(name, price)` pairs with prices written as
	/// decimal strings.
	pub fn product(
		mut self,
		id: &str,
		base_price: &str,
		sizes: &[(&str, &str)],
		add_ons: &[(&str, &str)],
	) -> Self {
		let to_table = |pairs: &[(&str, &str)]| {
			toml::Value::Table(
				pairs
					.iter()
					.map(|(name, price)| (name.to_string(), toml::Value::String(price.to_string())))
					.collect(),
			)
		};

		let mut product = toml::map::Map::new();
		product.insert("id".into(), toml::Value::String(id.to_string()));
		product.insert("name".into(), toml::Value::String(id.to_string()));
		product.insert(
			"base_price".into(),
			toml::Value::String(base_price.to_string()),
		);
		product.insert("sizes".into(), to_table(sizes));
		product.insert("add_ons".into(), to_table(add_ons));
		self.products.push(toml::Value::Table(product));
		self
	}

	/// Sets the API configuration.
	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		let mut catalog = toml::map::Map::new();
		catalog.insert("products".into(), toml::Value::Array(self.products));

		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			orders: self.orders,
			penalty: self.penalty,
			reaper: self.reaper,
			storage: StorageConfig {
				primary: self.storage_primary.clone(),
				implementations: HashMap::from([(self.storage_primary, self.storage_config)]),
			},
			catalog: CatalogConfig {
				primary: "static".to_string(),
				implementations: HashMap::from([(
					"static".to_string(),
					toml::Value::Table(catalog),
				)]),
			},
			api: self.api,
		}
	}
}
