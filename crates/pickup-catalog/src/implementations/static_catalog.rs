//! Static catalog implementation backed by configuration.
//!
//! Products are listed directly in the configuration file. This stands in
//! for the external catalog service in development, small deployments and
//! tests.
//!
//! ```toml
//! [catalog.implementations.static]
//! products = [
//!   { id = "latte", name = "Latte", base_price = "3.50",
//!     sizes = { small = "0", large = "0.50" },
//!     add_ons = { "Extra Shot" = "1.00" } },
//! ]
//! ```

use crate::{CatalogError, CatalogFactory, CatalogInterface, CatalogRegistry};
use async_trait::async_trait;
use pickup_types::{
	parse_money, ConfigSchema, Field, FieldType, ImplementationRegistry, ProductSnapshot, Schema,
	ValidationError,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Catalog holding a fixed set of products in memory.
pub struct StaticCatalog {
	products: RwLock<HashMap<String, ProductSnapshot>>,
}

impl StaticCatalog {
	/// Creates a catalog from a list of products.
	pub fn new(products: Vec<ProductSnapshot>) -> Self {
		Self {
			products: RwLock::new(
				products
					.into_iter()
					.map(|product| (product.id.clone(), product))
					.collect(),
			),
		}
	}

	/// Inserts or replaces a product.
	pub async fn upsert(&self, product: ProductSnapshot) {
		self.products
			.write()
			.await
			.insert(product.id.clone(), product);
	}

	/// Builds a catalog from its TOML configuration.
	pub fn from_config(config: &toml::Value) -> Result<Self, CatalogError> {
		StaticCatalogSchema
			.validate(config)
			.map_err(|e| CatalogError::Configuration(e.to_string()))?;

		let entries = config
			.get("products")
			.and_then(|v| v.as_array())
			.map(|v| v.as_slice())
			.unwrap_or_default();

		let mut products = Vec::with_capacity(entries.len());
		let mut seen = HashMap::new();
		for (index, entry) in entries.iter().enumerate() {
			let product = parse_product(entry)
				.map_err(|e| CatalogError::Configuration(format!("products[{}]: {}", index, e)))?;
			if let Some(previous) = seen.insert(product.id.clone(), index) {
				return Err(CatalogError::Configuration(format!(
					"Duplicate product id '{}' at products[{}] and products[{}]",
					product.id, previous, index
				)));
			}
			products.push(product);
		}

		tracing::debug!(count = products.len(), "Loaded static catalog");
		Ok(Self::new(products))
	}
}

fn parse_prices(value: Option<&toml::Value>) -> Result<BTreeMap<String, Decimal>, String> {
	let Some(table) = value.and_then(|v| v.as_table()) else {
		return Ok(BTreeMap::new());
	};
	table
		.iter()
		.map(|(name, price)| {
			parse_money(price)
				.map(|amount| (name.clone(), amount))
				.map_err(|e| format!("{}: {}", name, e))
		})
		.collect()
}

fn parse_product(entry: &toml::Value) -> Result<ProductSnapshot, String> {
	let id = entry
		.get("id")
		.and_then(|v| v.as_str())
		.ok_or("missing id")?
		.to_string();
	let name = entry
		.get("name")
		.and_then(|v| v.as_str())
		.unwrap_or(&id)
		.to_string();
	let base_price = entry
		.get("base_price")
		.ok_or("missing base_price")
		.and_then(|v| parse_money(v).map_err(|_| "invalid base_price"))?;

	Ok(ProductSnapshot {
		base_price,
		sizes: parse_prices(entry.get("sizes"))?,
		add_ons: parse_prices(entry.get("add_ons"))?,
		available: entry
			.get("available")
			.and_then(|v| v.as_bool())
			.unwrap_or(true),
		id,
		name,
	})
}

#[async_trait]
impl CatalogInterface for StaticCatalog {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(StaticCatalogSchema)
	}

	async fn get_product(&self, product_id: &str) -> Result<ProductSnapshot, CatalogError> {
		self.products
			.read()
			.await
			.get(product_id)
			.cloned()
			.ok_or_else(|| CatalogError::ProductNotFound(product_id.to_string()))
	}
}

/// Configuration schema for StaticCatalog.
pub struct StaticCatalogSchema;

impl ConfigSchema for StaticCatalogSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let product = Schema::new(
			vec![
				Field::new("id", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(id) if !id.trim().is_empty() => Ok(()),
						_ => Err("product id cannot be empty".to_string()),
					}
				}),
				Field::new("base_price", FieldType::Money),
			],
			vec![
				Field::new("name", FieldType::String),
				Field::new("sizes", FieldType::Map(Box::new(FieldType::Money))),
				Field::new("add_ons", FieldType::Map(Box::new(FieldType::Money))),
				Field::new("available", FieldType::Boolean),
			],
		);

		let schema = Schema::new(
			vec![],
			vec![Field::new(
				"products",
				FieldType::Array(Box::new(FieldType::Table(product))),
			)],
		);
		schema.validate(config)
	}
}

/// Factory function to create a static catalog from configuration.
pub fn create_catalog(config: &toml::Value) -> Result<Box<dyn CatalogInterface>, CatalogError> {
	Ok(Box::new(StaticCatalog::from_config(config)?))
}

/// Registry for the static catalog implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "static";
	type Factory = CatalogFactory;

	fn factory() -> Self::Factory {
		create_catalog
	}
}

impl CatalogRegistry for Registry {}
