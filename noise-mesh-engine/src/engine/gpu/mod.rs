//! Device abstraction the frame driver talks to.
//!
//! The driver never touches wgpu directly. It creates buffers, loads validated
//! kernels, binds by symbolic name and records work through [`GpuDevice`].
//! Setup calls are fallible; per-frame calls are not and ignore stale handles
//! after logging them.

pub mod bindings;
pub mod buffer_set;
pub mod program;
pub mod reflect;
pub mod render_backend;
pub mod simulated;

pub use bindings::{BindingName, BindingSlot, SlotKind};
pub use buffer_set::GpuBufferSet;
pub use program::{ComputeProgram, ProgramRole};
pub use render_backend::{PendingDraw, RenderBackend};
pub use simulated::SimulatedDevice;

use crate::engine::geometry::Bounds;
use crate::error::SetupError;
use crate::settings::DrawTopology;
use bevy::math::Mat4;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelId(pub u32);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kernel#{}", self.0)
    }
}

/// How a buffer is used by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Plain structured storage.
    Structured,
    /// Storage with a hidden 32-bit element counter for atomic appends.
    Append,
    /// Holds indirect draw arguments.
    IndirectArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: &'static str,
    pub kind: BufferKind,
    pub element_count: u32,
    pub stride: u64,
}

impl BufferDesc {
    pub fn byte_size(&self) -> u64 {
        self.element_count as u64 * self.stride
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    U32(u32),
    F32(f32),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn kind(&self) -> SlotKind {
        match self {
            Self::U32(_) => SlotKind::UniformU32,
            Self::F32(_) => SlotKind::UniformF32,
            Self::Mat4(_) => SlotKind::UniformMat4,
        }
    }

    /// Little-endian bytes as WGSL reads them. Matrices are column-major.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::U32(v) => v.to_le_bytes().to_vec(),
            Self::F32(v) => v.to_le_bytes().to_vec(),
            Self::Mat4(m) => bytemuck::cast_slice(&m.to_cols_array()).to_vec(),
        }
    }
}

/// An indirect draw submitted by the driver at the end of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawRequest {
    /// Append buffer whose items are read as vertices.
    pub vertex_source: BufferId,
    /// Buffer holding the four indirect argument words.
    pub args: BufferId,
    /// World-space bounds used for culling.
    pub bounds: Bounds,
    pub topology: DrawTopology,
    pub cast_shadows: bool,
    pub line_colour: [f32; 4],
}

pub trait GpuDevice {
    fn name(&self) -> &str;

    /// Creates a kernel for a validated program.
    fn load_kernel(&mut self, program: &ComputeProgram) -> Result<KernelId, SetupError>;

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, SetupError>;

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), SetupError>;

    /// Releases a buffer. Unknown handles are ignored.
    fn release_buffer(&mut self, buffer: BufferId);

    /// Binds `buffer` to the kernel slot `name`. Binding an append buffer also
    /// binds its counter to the kernel's counter slot, when it has one.
    fn bind_buffer(
        &mut self,
        kernel: KernelId,
        name: BindingName,
        buffer: BufferId,
    ) -> Result<(), SetupError>;

    fn set_uniform(&mut self, kernel: KernelId, name: BindingName, value: UniformValue);

    /// Overwrites the hidden counter of an append buffer.
    fn set_counter(&mut self, buffer: BufferId, value: u32);

    fn dispatch(&mut self, kernel: KernelId, groups: [u32; 3]);

    /// Copies the counter of append buffer `src` into `dst` at `dst_offset`, on device.
    fn copy_counter(&mut self, src: BufferId, dst: BufferId, dst_offset: u64);

    fn draw_indirect(&mut self, request: DrawRequest);

    /// Submits recorded work without waiting for it.
    fn flush(&mut self);
}

impl<D: GpuDevice + ?Sized> GpuDevice for &mut D {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn load_kernel(&mut self, program: &ComputeProgram) -> Result<KernelId, SetupError> {
        (**self).load_kernel(program)
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, SetupError> {
        (**self).create_buffer(desc)
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), SetupError> {
        (**self).write_buffer(buffer, offset, data)
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        (**self).release_buffer(buffer)
    }

    fn bind_buffer(
        &mut self,
        kernel: KernelId,
        name: BindingName,
        buffer: BufferId,
    ) -> Result<(), SetupError> {
        (**self).bind_buffer(kernel, name, buffer)
    }

    fn set_uniform(&mut self, kernel: KernelId, name: BindingName, value: UniformValue) {
        (**self).set_uniform(kernel, name, value)
    }

    fn set_counter(&mut self, buffer: BufferId, value: u32) {
        (**self).set_counter(buffer, value)
    }

    fn dispatch(&mut self, kernel: KernelId, groups: [u32; 3]) {
        (**self).dispatch(kernel, groups)
    }

    fn copy_counter(&mut self, src: BufferId, dst: BufferId, dst_offset: u64) {
        (**self).copy_counter(src, dst, dst_offset)
    }

    fn draw_indirect(&mut self, request: DrawRequest) {
        (**self).draw_indirect(request)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}
