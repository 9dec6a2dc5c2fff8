//! Expansion stage: one invocation per source triangle, zero to seven
//! primitives appended per invocation.
//!
//! [`expand_triangle`] is the CPU rendition of `noise_expand.wgsl`. The
//! simulated device runs it, so both must stay in step.

use crate::engine::geometry::SourceVertex;
use crate::engine::gpu::{BindingName, ComputeProgram, GpuDevice, KernelId, UniformValue};
use bevy::math::{Mat4, Vec2, Vec3};
use bytemuck::{Pod, Zeroable};
use constants::buffer_layout::GENERATED_PRIMITIVE_STRIDE;
use constants::procedural_shader::{
    AUDIO_DISPLACEMENT, BASE_DISPLACEMENT, NOISE_FREQUENCY, NOISE_SCROLL_SPEED, SPIKE_LENGTH,
    SUBDIVIDE_THRESHOLD,
};

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GeneratedCorner {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

/// One record of the append buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GeneratedPrimitive {
    pub center: [f32; 3],
    pub corners: [GeneratedCorner; 3],
}

const _: () = assert!(size_of::<GeneratedPrimitive>() as u64 == GENERATED_PRIMITIVE_STRIDE);

impl GeneratedPrimitive {
    fn from_corners(corners: [Corner; 3]) -> Self {
        let center = (corners[0].position + corners[1].position + corners[2].position) / 3.0;
        Self {
            center: center.to_array(),
            corners: corners.map(|c| GeneratedCorner {
                position: c.position.to_array(),
                uv: c.uv.to_array(),
            }),
        }
    }
}

/// Per-frame uniforms of the expansion program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpansionInputs {
    pub num_source_triangles: u32,
    pub audio_level: f32,
    pub time: f32,
    pub local_to_world: Mat4,
}

impl Default for ExpansionInputs {
    fn default() -> Self {
        Self {
            num_source_triangles: 0,
            audio_level: 0.0,
            time: 0.0,
            local_to_world: Mat4::IDENTITY,
        }
    }
}

/// Signature shared by the reference expansion and test doubles.
pub type ExpansionFn = fn(&[SourceVertex; 3], &ExpansionInputs, &mut dyn FnMut(GeneratedPrimitive));

#[derive(Debug, Clone, Copy)]
struct Corner {
    position: Vec3,
    uv: Vec2,
}

impl Corner {
    fn midpoint(self, other: Corner) -> Corner {
        Corner {
            position: self.position.lerp(other.position, 0.5),
            uv: self.uv.lerp(other.uv, 0.5),
        }
    }
}

fn fract(v: f32) -> f32 {
    v - v.floor()
}

fn hash(p: Vec3) -> f32 {
    let q = p * 0.318_309_9 + Vec3::splat(0.1);
    let q = (q - q.floor()) * 17.0;
    fract(q.x * q.y * q.z * (q.x + q.y + q.z))
}

/// Smooth value noise in `[0, 1)`.
pub fn value_noise(p: Vec3) -> f32 {
    let cell = p.floor();
    let f = p - cell;
    let u = f * f * (Vec3::splat(3.0) - 2.0 * f);

    let corner = |x: f32, y: f32, z: f32| hash(cell + Vec3::new(x, y, z));
    let x00 = corner(0.0, 0.0, 0.0) + (corner(1.0, 0.0, 0.0) - corner(0.0, 0.0, 0.0)) * u.x;
    let x10 = corner(0.0, 1.0, 0.0) + (corner(1.0, 1.0, 0.0) - corner(0.0, 1.0, 0.0)) * u.x;
    let x01 = corner(0.0, 0.0, 1.0) + (corner(1.0, 0.0, 1.0) - corner(0.0, 0.0, 1.0)) * u.x;
    let x11 = corner(0.0, 1.0, 1.0) + (corner(1.0, 1.0, 1.0) - corner(0.0, 1.0, 1.0)) * u.x;
    let y0 = x00 + (x10 - x00) * u.y;
    let y1 = x01 + (x11 - x01) * u.y;
    y0 + (y1 - y0) * u.z
}

/// Displaces a world-space triangle along its normal by animated noise,
/// subdivides it when the noise is high and grows three spikes when the
/// audio level beats the noise.
pub fn expand_triangle(
    triangle: &[SourceVertex; 3],
    inputs: &ExpansionInputs,
    emit: &mut dyn FnMut(GeneratedPrimitive),
) {
    let audio = inputs.audio_level.clamp(0.0, 1.0);
    let [a, b, c] = triangle.map(|v| Corner {
        position: inputs.local_to_world.transform_point3(Vec3::from(v.position)),
        uv: Vec2::from(v.uv),
    });

    let centroid = (a.position + b.position + c.position) / 3.0;
    let normal = (b.position - a.position)
        .cross(c.position - a.position)
        .normalize_or_zero();
    let noise = value_noise(
        centroid * NOISE_FREQUENCY + Vec3::splat(inputs.time * NOISE_SCROLL_SPEED),
    );
    let offset = normal * noise * (BASE_DISPLACEMENT + AUDIO_DISPLACEMENT * audio);
    let [a, b, c] = [a, b, c].map(|corner| Corner {
        position: corner.position + offset,
        uv: corner.uv,
    });

    if noise > SUBDIVIDE_THRESHOLD {
        let (ab, bc, ca) = (a.midpoint(b), b.midpoint(c), c.midpoint(a));
        emit(GeneratedPrimitive::from_corners([a, ab, ca]));
        emit(GeneratedPrimitive::from_corners([ab, b, bc]));
        emit(GeneratedPrimitive::from_corners([ca, bc, c]));
        emit(GeneratedPrimitive::from_corners([ab, bc, ca]));
    } else {
        emit(GeneratedPrimitive::from_corners([a, b, c]));
    }

    if audio > noise {
        let apex = Corner {
            position: centroid + offset + normal * audio * SPIKE_LENGTH,
            uv: (a.uv + b.uv + c.uv) / 3.0,
        };
        emit(GeneratedPrimitive::from_corners([a, b, apex]));
        emit(GeneratedPrimitive::from_corners([b, c, apex]));
        emit(GeneratedPrimitive::from_corners([c, a, apex]));
    }
}

/// Workgroups needed to cover `triangle_count` invocations.
pub fn dispatch_width(triangle_count: u32, group_width: u32) -> u32 {
    triangle_count.div_ceil(group_width.max(1))
}

/// A loaded expansion kernel with its group width cached at load time.
#[derive(Debug, Clone, Copy)]
pub struct ExpansionStage {
    kernel: KernelId,
    group_width: u32,
}

impl ExpansionStage {
    pub fn new(kernel: KernelId, program: &ComputeProgram) -> Self {
        Self {
            kernel,
            group_width: program.group_width(),
        }
    }

    pub fn kernel(&self) -> KernelId {
        self.kernel
    }

    pub fn group_width(&self) -> u32 {
        self.group_width
    }

    pub fn dispatch_width(&self, triangle_count: u32) -> u32 {
        dispatch_width(triangle_count, self.group_width)
    }

    pub fn push_uniforms<D: GpuDevice + ?Sized>(&self, device: &mut D, inputs: &ExpansionInputs) {
        device.set_uniform(
            self.kernel,
            BindingName::NumSourceTriangles,
            UniformValue::U32(inputs.num_source_triangles),
        );
        device.set_uniform(
            self.kernel,
            BindingName::AudioLevel,
            UniformValue::F32(inputs.audio_level),
        );
        device.set_uniform(self.kernel, BindingName::Time, UniformValue::F32(inputs.time));
        device.set_uniform(
            self.kernel,
            BindingName::LocalToWorld,
            UniformValue::Mat4(inputs.local_to_world),
        );
    }

    pub fn dispatch<D: GpuDevice + ?Sized>(&self, device: &mut D, triangle_count: u32) {
        device.dispatch(self.kernel, [self.dispatch_width(triangle_count), 1, 1]);
    }
}
