//! Builder pattern for constructing pickup engines.
//!
//! Composes a PickupEngine from storage and catalog implementations created
//! by factory functions, selected by name from configuration.

use crate::engine::event_bus::EventBus;
use crate::engine::token_issuer::TokenIssuer;
use crate::engine::PickupEngine;
use crate::state::{OrderLifecycleManager, OrderLimits};
use pickup_account::AccountPenaltyService;
use pickup_catalog::{CatalogError, CatalogInterface, CatalogService, PricingEngine};
use pickup_config::Config;
use pickup_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Container for the factory functions needed to build a PickupEngine.
pub struct PickupFactories<SF, CF> {
	pub storage_factories: HashMap<String, SF>,
	pub catalog_factories: HashMap<String, CF>,
}

/// Builder for constructing a PickupEngine with pluggable implementations.
pub struct PickupBuilder {
	config: Config,
	tokens: TokenIssuer,
}

impl PickupBuilder {
	/// Creates a new PickupBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self {
			config,
			tokens: TokenIssuer::new(),
		}
	}

	/// Replaces the token issuer.
	pub fn with_token_issuer(mut self, tokens: TokenIssuer) -> Self {
		self.tokens = tokens;
		self
	}

	/// Builds the PickupEngine using factories for each component type.
	pub fn build<SF, CF>(
		self,
		factories: PickupFactories<SF, CF>,
	) -> Result<PickupEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		CF: Fn(&toml::Value) -> Result<Box<dyn CatalogInterface>, CatalogError>,
	{
		// Create storage implementations
		let mut storage_impls = HashMap::new();
		for (name, config) in &self.config.storage.implementations {
			if let Some(factory) = factories.storage_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						storage_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.storage.primary == name;
						tracing::info!(component = "storage", implementation = %name, enabled = %is_primary, "Loaded");
					},
					Err(e) => {
						tracing::error!(
							component = "storage",
							implementation = %name,
							error = %e,
							"Failed to create storage implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create storage implementation '{}': {}",
							name, e
						)));
					},
				}
			}
		}

		if storage_impls.is_empty() {
			return Err(BuilderError::Config(
				"No valid storage implementations available".into(),
			));
		}

		let primary_storage = &self.config.storage.primary;
		let storage_backend = storage_impls.remove(primary_storage).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary storage '{}' failed to load or has invalid configuration",
				primary_storage
			))
		})?;
		let storage = Arc::new(StorageService::new(storage_backend));

		// Create catalog implementations
		let mut catalog_impls: HashMap<String, Arc<dyn CatalogInterface>> = HashMap::new();
		for (name, config) in &self.config.catalog.implementations {
			if let Some(factory) = factories.catalog_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						catalog_impls.insert(name.clone(), Arc::from(implementation));
						let is_primary = &self.config.catalog.primary == name;
						tracing::info!(component = "catalog", implementation = %name, enabled = %is_primary, "Loaded");
					},
					Err(e) => {
						tracing::error!(
							component = "catalog",
							implementation = %name,
							error = %e,
							"Failed to create catalog implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create catalog implementation '{}': {}",
							name, e
						)));
					},
				}
			}
		}

		if catalog_impls.is_empty() {
			return Err(BuilderError::MissingComponent(
				"No catalog implementations available".into(),
			));
		}

		let catalog = Arc::new(
			CatalogService::new(catalog_impls, self.config.catalog.primary.clone())
				.map_err(|e| BuilderError::Config(e.to_string()))?,
		);

		let penalties = Arc::new(AccountPenaltyService::new(
			storage.clone(),
			self.config.penalty.strike_threshold,
			self.config.penalty.points_per_unit,
		));

		let event_bus = EventBus::default();
		let orders = Arc::new(OrderLifecycleManager::new(
			storage.clone(),
			catalog,
			penalties.clone(),
			PricingEngine::new(self.config.orders.max_quantity),
			self.tokens,
			event_bus.clone(),
			OrderLimits {
				ttl: self.config.orders.ttl(),
				max_lines: self.config.orders.max_lines,
			},
		));

		Ok(PickupEngine::new(
			self.config,
			storage,
			penalties,
			orders,
			event_bus,
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pickup_config::builders::config::ConfigBuilder;
	use pickup_types::OrderLineRequest;
	use rust_decimal_macros::dec;

	type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;
	type CatalogFactory = fn(&toml::Value) -> Result<Box<dyn CatalogInterface>, CatalogError>;

	fn factories() -> PickupFactories<StorageFactory, CatalogFactory> {
		PickupFactories {
			storage_factories: pickup_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			catalog_factories: pickup_catalog::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}

	#[tokio::test]
	async fn test_build_from_config() {
		let config = ConfigBuilder::new()
			.strike_threshold(2)
			.product("latte", "3.50", &[("large", "0.50")], &[("Extra Shot", "1.00")])
			.build();
		let engine = PickupBuilder::new(config).build(factories()).unwrap();

		let order = engine
			.orders()
			.create_order(
				"acc-1",
				&[OrderLineRequest {
					product_id: "latte".into(),
					size: Some("large".into()),
					add_on_names: vec!["Extra Shot".into()],
					quantity: 2,
				}],
			)
			.await
			.unwrap();
		assert_eq!(order.total, dec!(10.00));
		assert_eq!(engine.penalties().strike_threshold(), 2);
	}

	#[tokio::test]
	async fn test_built_engine_runs_until_stopped() {
		let engine = PickupBuilder::new(ConfigBuilder::new().build())
			.build(factories())
			.unwrap();
		let runner = engine.clone();
		let task = tokio::spawn(async move { runner.run().await });

		tokio::time::sleep(std::time::Duration::from_millis(50)).await;
		engine.stop();
		let result = tokio::time::timeout(std::time::Duration::from_secs(5), task)
			.await
			.expect("engine did not stop")
			.unwrap();
		assert!(result.is_ok());
	}

	#[test]
	fn test_unknown_primary_storage_rejected() {
		let mut config = ConfigBuilder::new().build();
		config.storage.primary = "redis".into();
		let result = PickupBuilder::new(config).build(factories());
		assert!(matches!(result, Err(BuilderError::Config(_))));
	}

	#[test]
	fn test_invalid_catalog_config_rejected() {
		let mut config = ConfigBuilder::new().build();
		let bad: toml::Value = toml::from_str(
			r#"
[[products]]
id = "latte"
"#,
		)
		.unwrap();
		config.catalog.implementations.insert("static".into(), bad);
		let result = PickupBuilder::new(config).build(factories());
		assert!(matches!(result, Err(BuilderError::Config(_))));
	}
}
