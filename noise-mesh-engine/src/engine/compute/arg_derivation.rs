//! Turns the live primitive count into an indirect vertex count on device.

use crate::engine::gpu::{BufferId, GpuDevice, KernelId};
use bytemuck::{Pod, Zeroable};
use constants::buffer_layout::{INDIRECT_ARGS_STRIDE, INITIAL_INDIRECT_ARGS, VERTICES_PER_PRIMITIVE};

/// wgpu's non-indexed draw-indirect record.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectDrawArgs {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

const _: () = assert!(size_of::<IndirectDrawArgs>() as u64 == INDIRECT_ARGS_STRIDE);

impl IndirectDrawArgs {
    pub const INITIAL: Self = Self::from_words(INITIAL_INDIRECT_ARGS);

    pub const fn from_words(words: [u32; 4]) -> Self {
        Self {
            vertex_count: words[0],
            instance_count: words[1],
            first_vertex: words[2],
            first_instance: words[3],
        }
    }

    pub const fn to_words(self) -> [u32; 4] {
        [
            self.vertex_count,
            self.instance_count,
            self.first_vertex,
            self.first_instance,
        ]
    }

    /// What the derivation kernel leaves behind for `primitive_count` primitives.
    pub fn derived(primitive_count: u32) -> Self {
        Self {
            vertex_count: primitive_count * VERTICES_PER_PRIMITIVE,
            ..Self::INITIAL
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ArgDerivationStage {
    kernel: KernelId,
}

impl ArgDerivationStage {
    pub fn new(kernel: KernelId) -> Self {
        Self { kernel }
    }

    pub fn kernel(&self) -> KernelId {
        self.kernel
    }

    /// Copies the append counter of `generated` into word 0 of `args`.
    pub fn copy_count<D: GpuDevice + ?Sized>(&self, device: &mut D, generated: BufferId, args: BufferId) {
        device.copy_counter(generated, args, 0);
    }

    /// Multiplies word 0 in place. A single invocation is enough.
    pub fn dispatch<D: GpuDevice + ?Sized>(&self, device: &mut D) {
        device.dispatch(self.kernel, [1, 1, 1]);
    }
}
