use super::{BindingName, BufferDesc, BufferId, BufferKind, GpuDevice, KernelId};
use crate::engine::geometry::SourceGeometry;
use crate::error::SetupError;
use bevy::prelude::*;
use constants::buffer_layout::{
    GENERATED_PRIMITIVE_STRIDE, INDIRECT_ARGS_STRIDE, INITIAL_INDIRECT_ARGS, SOURCE_INDEX_STRIDE,
    SOURCE_VERTEX_STRIDE,
};

/// The four device buffers backing one active pipeline.
///
/// Created together by [`GpuBufferSet::allocate`] and released together by
/// [`GpuBufferSet::release`]. Nothing is reallocated while the set is live.
#[derive(Debug)]
pub struct GpuBufferSet {
    source_vertices: BufferId,
    source_indices: BufferId,
    generated: BufferId,
    indirect_args: BufferId,
    triangle_count: u32,
    capacity: u32,
    initialized: bool,
}

impl GpuBufferSet {
    /// Creates and uploads all four buffers. If any step fails, buffers
    /// already created by this call are released before the error is returned.
    pub fn allocate<D: GpuDevice + ?Sized>(
        device: &mut D,
        geometry: &SourceGeometry,
    ) -> Result<Self, SetupError> {
        let mut created = Vec::with_capacity(4);
        match Self::create_and_upload(device, geometry, &mut created) {
            Ok(set) => Ok(set),
            Err(err) => {
                for buffer in created {
                    device.release_buffer(buffer);
                }
                Err(err)
            }
        }
    }

    fn create_and_upload<D: GpuDevice + ?Sized>(
        device: &mut D,
        geometry: &SourceGeometry,
        created: &mut Vec<BufferId>,
    ) -> Result<Self, SetupError> {
        let capacity = geometry.output_capacity();

        let mut create = |desc: BufferDesc| -> Result<BufferId, SetupError> {
            let id = device.create_buffer(&desc)?;
            created.push(id);
            Ok(id)
        };

        let source_vertices = create(BufferDesc {
            label: "noise_mesh_source_vertices",
            kind: BufferKind::Structured,
            element_count: geometry.vertex_count(),
            stride: SOURCE_VERTEX_STRIDE,
        })?;
        let source_indices = create(BufferDesc {
            label: "noise_mesh_source_indices",
            kind: BufferKind::Structured,
            element_count: geometry.index_count(),
            stride: SOURCE_INDEX_STRIDE,
        })?;
        let generated = create(BufferDesc {
            label: "noise_mesh_generated_primitives",
            kind: BufferKind::Append,
            element_count: capacity,
            stride: GENERATED_PRIMITIVE_STRIDE,
        })?;
        let indirect_args = create(BufferDesc {
            label: "noise_mesh_indirect_args",
            kind: BufferKind::IndirectArgs,
            element_count: 1,
            stride: INDIRECT_ARGS_STRIDE,
        })?;

        if !geometry.vertices().is_empty() {
            device.write_buffer(source_vertices, 0, bytemuck::cast_slice(geometry.vertices()))?;
        }
        if !geometry.indices().is_empty() {
            device.write_buffer(source_indices, 0, bytemuck::cast_slice(geometry.indices()))?;
        }
        device.write_buffer(indirect_args, 0, bytemuck::cast_slice(&INITIAL_INDIRECT_ARGS))?;
        device.set_counter(generated, 0);

        info!(
            "Allocated noise mesh buffers: {} vertices, {} triangles, capacity {} primitives",
            geometry.vertex_count(),
            geometry.triangle_count(),
            capacity
        );

        Ok(Self {
            source_vertices,
            source_indices,
            generated,
            indirect_args,
            triangle_count: geometry.triangle_count(),
            capacity,
            initialized: true,
        })
    }

    /// Wires the buffers to both kernels: sources read-only and the append
    /// target to expansion, the argument buffer to derivation.
    pub fn bind<D: GpuDevice + ?Sized>(
        &self,
        device: &mut D,
        expansion: KernelId,
        arg_derivation: KernelId,
    ) -> Result<(), SetupError> {
        device.bind_buffer(expansion, BindingName::SourceVertices, self.source_vertices)?;
        device.bind_buffer(expansion, BindingName::SourceTriangles, self.source_indices)?;
        device.bind_buffer(expansion, BindingName::DrawTriangles, self.generated)?;
        device.bind_buffer(arg_derivation, BindingName::IndirectArgsBuffer, self.indirect_args)?;
        Ok(())
    }

    /// Releases all four buffers once. Returns `false` when the set was
    /// already released.
    pub fn release<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> bool {
        if !self.initialized {
            return false;
        }
        for buffer in self.buffers() {
            device.release_buffer(buffer);
        }
        self.initialized = false;
        true
    }

    pub fn buffers(&self) -> [BufferId; 4] {
        [
            self.source_vertices,
            self.source_indices,
            self.generated,
            self.indirect_args,
        ]
    }

    pub fn source_vertices(&self) -> BufferId {
        self.source_vertices
    }

    pub fn source_indices(&self) -> BufferId {
        self.source_indices
    }

    /// Append buffer of generated primitives, also the draw's vertex source.
    pub fn generated(&self) -> BufferId {
        self.generated
    }

    pub fn indirect_args(&self) -> BufferId {
        self.indirect_args
    }

    pub fn triangle_count(&self) -> u32 {
        self.triangle_count
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}
