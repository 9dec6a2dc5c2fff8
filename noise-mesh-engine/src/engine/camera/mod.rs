pub mod orbit_camera;

pub use orbit_camera::{OrbitCamera, orbit_camera_system};
