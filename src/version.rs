// Crate identity baked in at compile time

/// Crate name at build time.
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Crate version at build time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
