//! Catalog module for the pickup order system.
//!
//! The product catalog is owned by an external component; this crate only
//! exposes the read-only lookup the order engine needs, plus the pure
//! pricing rules applied to a product snapshot. Catalog sources follow the
//! same trait-based pattern as other pickup components and are selected by
//! name from configuration.

use async_trait::async_trait;
use pickup_types::{ConfigSchema, ImplementationRegistry, ProductSnapshot};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod pricing;

pub use pricing::{PricedLine, PricingEngine, PricingError};

/// Re-export implementations
pub mod implementations {
	pub mod static_catalog;
}

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
	/// Error that occurs when a product id is not in the catalog.
	#[error("Product not found: {0}")]
	ProductNotFound(String),
	/// Error that occurs when the catalog source cannot be reached.
	#[error("Catalog unavailable: {0}")]
	Unavailable(String),
	/// Internal error that occurs during catalog operations.
	#[error("Internal error: {0}")]
	Internal(String),
	/// Error that occurs when configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for catalog sources.
///
/// Implementations return a snapshot of a product's price-relevant data as
/// it stands at the time of the call. Callers copy what they need; later
/// catalog changes never reach an existing order.
#[async_trait]
pub trait CatalogInterface: Send + Sync {
	/// Returns the configuration schema for this catalog implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Looks up a single product.
	async fn get_product(&self, product_id: &str) -> Result<ProductSnapshot, CatalogError>;
}

/// Type alias for catalog factory functions.
pub type CatalogFactory = fn(&toml::Value) -> Result<Box<dyn CatalogInterface>, CatalogError>;

/// Registry trait for catalog implementations.
pub trait CatalogRegistry: ImplementationRegistry<Factory = CatalogFactory> {}

/// Get all registered catalog implementations.
///
/// Returns a vector of (name, factory) tuples for all available catalog implementations.
pub fn get_all_implementations() -> Vec<(&'static str, CatalogFactory)> {
	use implementations::static_catalog;

	vec![(
		static_catalog::Registry::NAME,
		static_catalog::Registry::factory(),
	)]
}

/// Service that manages catalog sources.
///
/// Lookups go to the primary implementation named in configuration.
pub struct CatalogService {
	/// Map of implementation names to their interfaces.
	implementations: HashMap<String, Arc<dyn CatalogInterface>>,
	/// The primary implementation used for lookups.
	primary_implementation: String,
}

impl CatalogService {
	/// Creates a new CatalogService with the given implementations.
	///
	/// Fails if `primary_implementation` is not among `implementations`.
	pub fn new(
		implementations: HashMap<String, Arc<dyn CatalogInterface>>,
		primary_implementation: String,
	) -> Result<Self, CatalogError> {
		if !implementations.contains_key(&primary_implementation) {
			return Err(CatalogError::Configuration(format!(
				"Primary implementation '{}' not found in available implementations",
				primary_implementation
			)));
		}

		Ok(Self {
			implementations,
			primary_implementation,
		})
	}

	/// Looks up a product using the primary implementation.
	pub async fn get_product(&self, product_id: &str) -> Result<ProductSnapshot, CatalogError> {
		let implementation = self
			.implementations
			.get(&self.primary_implementation)
			.ok_or_else(|| {
				CatalogError::Internal(format!(
					"Primary implementation '{}' not available",
					self.primary_implementation
				))
			})?;

		implementation.get_product(product_id).await
	}
}
