//! Configuration module for the pickup order service.
//!
//! This module provides structures and utilities for managing service
//! configuration. It supports loading configuration from TOML files and
//! validates every section before the engine is built.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["catalog.toml", "storage.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

#[cfg(feature = "testing")]
pub mod builders;

#[cfg(feature = "testing")]
pub use builders::config::ConfigBuilder;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the pickup service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service instance.
	pub service: ServiceConfig,
	/// Order placement rules.
	#[serde(default)]
	pub orders: OrdersConfig,
	/// Strike and loyalty rules.
	#[serde(default)]
	pub penalty: PenaltyConfig,
	/// Background expiry sweep.
	#[serde(default)]
	pub reaper: ReaperConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Configuration for the product catalog.
	pub catalog: CatalogConfig,
	/// Configuration for the HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Configuration specific to the service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier for this service instance.
	pub id: String,
}

/// Order placement rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrdersConfig {
	/// Minutes a pending order stays redeemable.
	#[serde(default = "default_ttl_minutes")]
	pub ttl_minutes: u64,
	/// Largest quantity accepted on a single line.
	#[serde(default = "default_max_quantity")]
	pub max_quantity: u32,
	/// Largest number of lines accepted on a single order.
	#[serde(default = "default_max_lines")]
	pub max_lines: usize,
}

impl OrdersConfig {
	/// Returns the pickup window as a chrono duration.
	pub fn ttl(&self) -> chrono::Duration {
		chrono::Duration::minutes(self.ttl_minutes as i64)
	}
}

impl Default for OrdersConfig {
	fn default() -> Self {
		Self {
			ttl_minutes: default_ttl_minutes(),
			max_quantity: default_max_quantity(),
			max_lines: default_max_lines(),
		}
	}
}

fn default_ttl_minutes() -> u64 {
	30
}

fn default_max_quantity() -> u32 {
	20
}

fn default_max_lines() -> usize {
	50
}

/// Strike and loyalty rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PenaltyConfig {
	/// Strike count at which an account is blocked.
	#[serde(default = "default_strike_threshold")]
	pub strike_threshold: u32,
	/// Loyalty points granted per whole currency unit of a completed order.
	#[serde(default = "default_points_per_unit")]
	pub points_per_unit: u64,
}

impl Default for PenaltyConfig {
	fn default() -> Self {
		Self {
			strike_threshold: default_strike_threshold(),
			points_per_unit: default_points_per_unit(),
		}
	}
}

fn default_strike_threshold() -> u32 {
	3
}

fn default_points_per_unit() -> u64 {
	1
}

/// Background expiry sweep configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReaperConfig {
	/// Whether the periodic sweep runs at all.
	#[serde(default = "default_reaper_enabled")]
	pub enabled: bool,
	/// Seconds between sweeps.
	#[serde(default = "default_reaper_interval")]
	pub interval_seconds: u64,
	/// Number of expired orders fetched per storage page.
	#[serde(default = "default_reaper_batch_size")]
	pub batch_size: usize,
}

impl ReaperConfig {
	/// Returns the sweep interval as a std duration.
	pub fn interval(&self) -> Duration {
		Duration::from_secs(self.interval_seconds)
	}
}

impl Default for ReaperConfig {
	fn default() -> Self {
		Self {
			enabled: default_reaper_enabled(),
			interval_seconds: default_reaper_interval(),
			batch_size: default_reaper_batch_size(),
		}
	}
}

fn default_reaper_enabled() -> bool {
	true
}

fn default_reaper_interval() -> u64 {
	60
}

fn default_reaper_batch_size() -> usize {
	100
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the product catalog.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of catalog implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	/// CORS configuration.
	pub cors: Option<CorsConfig>,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	/// Allowed origins for CORS.
	pub allowed_origins: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

fn default_max_request_size() -> usize {
	1024 * 1024 // 1MB
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)));
				},
			},
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file with async environment variable resolution.
	///
	/// Supports `include = ["file1.toml", "file2.toml"]`; each top-level
	/// section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates the configuration to ensure all required fields are properly set.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		// Orders
		if self.orders.ttl_minutes == 0 || self.orders.ttl_minutes > 1440 {
			return Err(ConfigError::Validation(
				"orders.ttl_minutes must be between 1 and 1440".into(),
			));
		}
		if self.orders.max_quantity == 0 || self.orders.max_quantity > 1000 {
			return Err(ConfigError::Validation(
				"orders.max_quantity must be between 1 and 1000".into(),
			));
		}
		if self.orders.max_lines == 0 {
			return Err(ConfigError::Validation(
				"orders.max_lines must be at least 1".into(),
			));
		}

		// Penalty
		if self.penalty.strike_threshold == 0 {
			return Err(ConfigError::Validation(
				"penalty.strike_threshold must be at least 1".into(),
			));
		}

		// Reaper
		if self.reaper.interval_seconds == 0 || self.reaper.interval_seconds > 86400 {
			return Err(ConfigError::Validation(
				"reaper.interval_seconds must be between 1 and 86400".into(),
			));
		}
		if self.reaper.batch_size == 0 {
			return Err(ConfigError::Validation(
				"reaper.batch_size must be at least 1".into(),
			));
		}

		// Storage
		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		// Catalog
		if self.catalog.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one catalog implementation must be configured".into(),
			));
		}
		if !self
			.catalog
			.implementations
			.contains_key(&self.catalog.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary catalog '{}' not found in implementations",
				self.catalog.primary
			)));
		}

		// API
		if let Some(ref api) = self.api {
			if api.enabled && api.port == 0 {
				return Err(ConfigError::Validation("api.port cannot be 0".into()));
			}
			if api.timeout_seconds == 0 {
				return Err(ConfigError::Validation(
					"api.timeout_seconds must be greater than 0".into(),
				));
			}
		}

		Ok(())
	}
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// Environment variables are resolved and the configuration is validated
/// after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
