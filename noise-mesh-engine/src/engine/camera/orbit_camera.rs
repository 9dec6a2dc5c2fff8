use bevy::prelude::*;
use constants::render_settings::DEMO_CAMERA_ORBIT_SPEED;

/// Camera that circles the Y axis at a fixed radius and height while looking at the origin.
#[derive(Component, Debug, Clone, Copy)]
pub struct OrbitCamera {
    /// Radians per second.
    pub speed: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            speed: DEMO_CAMERA_ORBIT_SPEED,
        }
    }
}

/// Position after orbiting `angle` radians around the Y axis.
pub fn orbit_position(start: Vec3, angle: f32) -> Vec3 {
    Quat::from_rotation_y(angle) * start
}

pub fn orbit_camera_system(time: Res<Time>, mut cameras: Query<(&OrbitCamera, &mut Transform)>) {
    for (orbit, mut transform) in &mut cameras {
        let position = orbit_position(transform.translation, orbit.speed * time.delta_secs());
        *transform = Transform::from_translation(position).looking_at(Vec3::ZERO, Vec3::Y);
    }
}
