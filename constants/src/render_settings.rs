use bevy::math::{Vec3, Vec4};

/// Colour used for generated lines when no settings asset overrides it.
pub const DEFAULT_LINE_COLOUR: Vec4 = Vec4::new(0.85, 0.95, 1.0, 1.0);

/// Demo camera placement; the camera always looks at the origin.
pub const DEMO_CAMERA_POSITION: Vec3 = Vec3::new(-2.5, 2.0, 4.5);

/// Radians per second the demo camera orbits around the Y axis.
pub const DEMO_CAMERA_ORBIT_SPEED: f32 = 0.15;

/// Subdivision level of the demo icosphere.
pub const DEMO_SPHERE_SUBDIVISIONS: u32 = 3;
