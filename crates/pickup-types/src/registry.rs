//! Registry trait for self-registering implementations.
//!
//! Pluggable components (storage backends, catalogs) expose a `Registry`
//! struct naming the configuration key they answer to and their factory.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation,
	/// e.g. "memory" for `[storage.implementations.memory]`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
