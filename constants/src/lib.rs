//! Shared layout and binding constants for the procedural noise mesh pipeline.
//!
//! Everything in here is part of the contract between the CPU driver and the
//! WGSL programs under `noise-mesh-engine/assets/shaders`. Changing a value on
//! one side without the other corrupts the device buffers.

pub mod buffer_layout;
pub mod procedural_shader;
pub mod render_settings;
