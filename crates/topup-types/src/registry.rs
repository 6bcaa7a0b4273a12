//! Registry trait for self-registering implementations.

/// Trait implemented by every pluggable implementation registry.
///
/// Each implementation exposes a unique configuration name and a factory
/// function that builds it from its TOML table.
pub trait ImplementationRegistry {
	/// Name used in configuration files to select this implementation.
	const NAME: &'static str;

	/// Factory function type producing the implementation.
	type Factory;

	/// Returns the factory function.
	fn factory() -> Self::Factory;
}
