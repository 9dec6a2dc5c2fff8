pub mod audio;
pub mod camera;
pub mod compute;
pub mod core;
pub mod frame_driver;
pub mod geometry;
pub mod gpu;
pub mod plugin;
pub mod render;
pub mod systems;
