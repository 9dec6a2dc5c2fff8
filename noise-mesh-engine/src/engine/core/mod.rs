//! Application setup for the native and WASM demo.

/// Builds the demo app: default plugins, the noise mesh plugin and the demo scene.
pub mod app_setup;

/// Platform-specific window configuration.
pub mod window_config;
