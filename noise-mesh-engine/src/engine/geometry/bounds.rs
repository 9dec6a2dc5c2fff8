use bevy::math::{Affine3A, Mat4, Vec3, Vec3A};
use bevy::render::primitives::{Aabb, Frustum};

/// Axis-aligned box stored as center + half extents.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    pub center: Vec3,
    pub extents: Vec3,
}

impl Bounds {
    pub fn new(center: Vec3, extents: Vec3) -> Self {
        Self { center, extents }
    }

    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            center: (min + max) * 0.5,
            extents: (max - min) * 0.5,
        }
    }

    /// Tight box around `points`. No points yields a zero box at the origin.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a [f32; 3]>) -> Self {
        let mut points = points.into_iter().map(|p| Vec3::from_array(*p));
        let Some(first) = points.next() else {
            return Self::default();
        };
        let (min, max) = points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Self::from_min_max(min, max)
    }

    pub fn min(&self) -> Vec3 {
        self.center - self.extents
    }

    pub fn max(&self) -> Vec3 {
        self.center + self.extents
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (c, e) = (self.center, self.extents);
        [
            c + Vec3::new(-e.x, -e.y, -e.z),
            c + Vec3::new(e.x, -e.y, -e.z),
            c + Vec3::new(-e.x, e.y, -e.z),
            c + Vec3::new(e.x, e.y, -e.z),
            c + Vec3::new(-e.x, -e.y, e.z),
            c + Vec3::new(e.x, -e.y, e.z),
            c + Vec3::new(-e.x, e.y, e.z),
            c + Vec3::new(e.x, e.y, e.z),
        ]
    }

    /// Conservative world-space box for an object-space box.
    ///
    /// Each local extent axis is pushed through the matrix and the absolute
    /// components are summed per world axis. The result always contains the
    /// transformed box but is not re-fitted to it.
    pub fn transformed(&self, local_to_world: &Mat4) -> Self {
        let center = local_to_world.transform_point3(self.center);

        let axis_x = local_to_world.transform_vector3(Vec3::new(self.extents.x, 0.0, 0.0));
        let axis_y = local_to_world.transform_vector3(Vec3::new(0.0, self.extents.y, 0.0));
        let axis_z = local_to_world.transform_vector3(Vec3::new(0.0, 0.0, self.extents.z));

        let extents = axis_x.abs() + axis_y.abs() + axis_z.abs();

        Self { center, extents }
    }

    pub fn to_aabb(&self) -> Aabb {
        Aabb {
            center: Vec3A::from(self.center),
            half_extents: Vec3A::from(self.extents),
        }
    }

    /// Whether a world-space box touches the view frustum of `clip_from_world`.
    pub fn is_visible(&self, clip_from_world: &Mat4) -> bool {
        let frustum = Frustum::from_clip_from_world(clip_from_world);
        frustum.intersects_obb(&self.to_aabb(), &Affine3A::IDENTITY, true, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::Quat;

    #[test]
    fn from_points_is_tight() {
        let points = [[-1.0, 0.0, 2.0], [3.0, -4.0, 2.0], [1.0, 2.0, 6.0]];
        let bounds = Bounds::from_points(&points);
        assert_eq!(bounds.min(), Vec3::new(-1.0, -4.0, 2.0));
        assert_eq!(bounds.max(), Vec3::new(3.0, 2.0, 6.0));
    }

    #[test]
    fn empty_points_give_zero_box() {
        let bounds = Bounds::from_points(std::iter::empty());
        assert_eq!(bounds, Bounds::default());
    }

    #[test]
    fn translation_moves_center_only() {
        let bounds = Bounds::new(Vec3::ONE, Vec3::new(1.0, 2.0, 3.0));
        let world = bounds.transformed(&Mat4::from_translation(Vec3::new(5.0, 0.0, -1.0)));
        assert!(world.center.abs_diff_eq(Vec3::new(6.0, 1.0, 0.0), 1e-6));
        assert!(world.extents.abs_diff_eq(bounds.extents, 1e-6));
    }

    #[test]
    fn quarter_turn_swaps_extents() {
        let bounds = Bounds::new(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
        let rotation = Mat4::from_quat(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));
        let world = bounds.transformed(&rotation);
        assert!(world.extents.abs_diff_eq(Vec3::new(3.0, 2.0, 1.0), 1e-5));
    }

    #[test]
    fn scale_grows_extents() {
        let bounds = Bounds::new(Vec3::ZERO, Vec3::ONE);
        let world = bounds.transformed(&Mat4::from_scale(Vec3::new(2.0, 0.5, -3.0)));
        assert!(world.extents.abs_diff_eq(Vec3::new(2.0, 0.5, 3.0), 1e-6));
    }

    #[test]
    fn box_in_front_of_camera_is_visible() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 100.0);
        let clip_from_world = projection * view;

        let in_front = Bounds::new(Vec3::ZERO, Vec3::splat(0.5));
        let behind = Bounds::new(Vec3::new(0.0, 0.0, 20.0), Vec3::splat(0.5));
        assert!(in_front.is_visible(&clip_from_world));
        assert!(!behind.is_visible(&clip_from_world));
    }
}
