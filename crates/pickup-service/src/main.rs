//! Main entry point for the pickup order service.
//!
//! Runs the order lifecycle engine (expiry reaper, audit log) and, when
//! enabled, the HTTP API used by the ordering clients and the counter.

use clap::Parser;
use pickup_config::Config;
use pickup_core::{PickupBuilder, PickupEngine, PickupFactories};
use std::path::PathBuf;
use std::sync::Arc;

mod apis;
mod server;

use pickup_catalog::implementations::static_catalog::create_catalog as create_static_catalog;
use pickup_storage::implementations::file::create_storage as create_file_storage;
use pickup_storage::implementations::memory::create_storage as create_memory_storage;

/// Command-line arguments for the pickup service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, env = "PICKUP_CONFIG", default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Main entry point for the pickup service.
///
/// Parses arguments, initializes logging, loads configuration, builds the
/// engine and runs it until interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started pickup service");

	let config = Config::from_file(&args.config.to_string_lossy()).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let engine = Arc::new(build_engine(config.clone())?);

	match config.api.filter(|api| api.enabled) {
		Some(api_config) => {
			let api_engine = Arc::clone(&engine);

			let engine_task = engine.run();
			let api_task = server::start_server(api_config, api_engine);

			tokio::select! {
				result = engine_task => {
					tracing::info!("Engine finished");
					result?;
				}
				result = api_task => {
					tracing::info!("API server finished");
					result?;
				}
			}
		},
		None => {
			tracing::info!("Starting engine only");
			engine.run().await?;
		},
	}

	tracing::info!("Stopped pickup service");
	Ok(())
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Builds the pickup engine with all available implementations.
fn build_engine(config: Config) -> Result<PickupEngine, Box<dyn std::error::Error>> {
	let builder = PickupBuilder::new(config);

	let storage_factories = create_factory_map!(
		pickup_storage::StorageInterface,
		pickup_storage::StorageError,
		"file" => create_file_storage,
		"memory" => create_memory_storage,
	);

	let catalog_factories = create_factory_map!(
		pickup_catalog::CatalogInterface,
		pickup_catalog::CatalogError,
		"static" => create_static_catalog,
	);

	let factories = PickupFactories {
		storage_factories,
		catalog_factories,
	};

	Ok(builder.build(factories)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn test_args_defaults() {
		let args = Args::parse_from(["pickup"]);
		assert_eq!(args.config, PathBuf::from("config.toml"));
		assert_eq!(args.log_level, "info");
	}

	#[test]
	fn test_args_custom_values() {
		let args = Args::parse_from(["pickup", "--config", "custom.toml", "-l", "debug"]);
		assert_eq!(args.config, PathBuf::from("custom.toml"));
		assert_eq!(args.log_level, "debug");
	}

	#[test]
	fn test_create_factory_map_multiple_entries() {
		let factories = create_factory_map!(
			pickup_storage::StorageInterface,
			pickup_storage::StorageError,
			"memory" => create_memory_storage,
			"file" => create_file_storage,
		);

		assert_eq!(factories.len(), 2);
		assert!(factories.contains_key("memory"));
		assert!(factories.contains_key("file"));
	}

	#[tokio::test]
	async fn test_build_engine_from_file_config() {
		let temp_dir = tempdir().unwrap();
		let storage_path = temp_dir.path().join("storage");
		let config_path = temp_dir.path().join("config.toml");

		let config_content = format!(
			r#"
[service]
id = "test-cafe"

[orders]
ttl_minutes = 15

[storage]
primary = "file"

[storage.implementations.file]
storage_path = "{}"

[catalog]
primary = "static"

[[catalog.implementations.static.products]]
id = "latte"
name = "Latte"
base_price = "3.50"
sizes = {{ large = "0.50" }}
add_ons = {{ "Extra Shot" = "1.00" }}
"#,
			storage_path.display()
		);
		std::fs::write(&config_path, config_content).unwrap();

		let config = Config::from_file(config_path.to_str().unwrap())
			.await
			.unwrap();
		assert_eq!(config.service.id, "test-cafe");
		assert_eq!(config.orders.ttl_minutes, 15);

		let engine = build_engine(config).unwrap();
		assert_eq!(engine.config().service.id, "test-cafe");
		assert!(storage_path.exists());
	}
}
