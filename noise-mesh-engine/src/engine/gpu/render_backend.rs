//! [`GpuDevice`] over Bevy's render device and queue.
//!
//! Lives in the render world. Commands are recorded as plain data and
//! encoded into a single command buffer on [`GpuDevice::flush`], so the
//! backend stays `Send + Sync` on every target.

use super::{
    BindingName, BufferDesc, BufferId, BufferKind, ComputeProgram, DrawRequest, GpuDevice,
    KernelId, SlotKind, UniformValue,
};
use crate::error::SetupError;
use bevy::prelude::*;
use bevy::render::render_resource::{
    BindGroup, BindGroupEntry, BindGroupLayout, BindGroupLayoutEntry, BindingType, Buffer,
    BufferBindingType, BufferDescriptor, BufferUsages, ComputePassDescriptor, ComputePipeline,
    RawComputePipelineDescriptor, ShaderStages,
};
use bevy::render::renderer::{RenderDevice, RenderQueue};
use constants::buffer_layout::APPEND_COUNTER_SIZE;
use std::collections::HashMap;

/// Uniform buffers are padded to this size for backends with a 16 byte minimum.
const UNIFORM_BUFFER_SIZE: u64 = 16;

struct GpuBuffer {
    desc: BufferDesc,
    items: Buffer,
    counter: Option<Buffer>,
}

struct GpuKernel {
    program: ComputeProgram,
    layout: BindGroupLayout,
    pipeline: ComputePipeline,
    /// Storage slots, resolved against the live buffer map when a bind group is built.
    bound: HashMap<BindingName, BufferId>,
    uniforms: HashMap<BindingName, Buffer>,
    bind_group: Option<BindGroup>,
}

enum RecordedCommand {
    Dispatch {
        label: String,
        pipeline: ComputePipeline,
        bind_group: BindGroup,
        groups: [u32; 3],
    },
    CopyCounter {
        src: Buffer,
        dst: Buffer,
        offset: u64,
    },
}

/// The draw the render node should issue this frame.
#[derive(Clone)]
pub struct PendingDraw {
    pub request: DrawRequest,
    pub vertex_source: Buffer,
    pub args: Buffer,
}

pub struct RenderBackend {
    render_device: RenderDevice,
    render_queue: RenderQueue,
    buffers: HashMap<BufferId, GpuBuffer>,
    kernels: Vec<GpuKernel>,
    next_buffer: u32,
    commands: Vec<RecordedCommand>,
    pending_draw: Option<PendingDraw>,
}

impl RenderBackend {
    pub fn new(render_device: RenderDevice, render_queue: RenderQueue) -> Self {
        Self {
            render_device,
            render_queue,
            buffers: HashMap::new(),
            kernels: Vec::new(),
            next_buffer: 0,
            commands: Vec::new(),
            pending_draw: None,
        }
    }

    pub fn pending_draw(&self) -> Option<&PendingDraw> {
        self.pending_draw.as_ref()
    }

    /// Drops the draw submitted by the last frame, e.g. when the pipeline goes inactive.
    pub fn clear_pending_draw(&mut self) {
        self.pending_draw = None;
    }

    fn buffer(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.get(&id).map(|b| &b.items)
    }

    fn layout_entries(program: &ComputeProgram) -> Vec<BindGroupLayoutEntry> {
        program
            .bindings()
            .iter()
            .map(|slot| BindGroupLayoutEntry {
                binding: slot.binding,
                visibility: ShaderStages::COMPUTE,
                ty: BindingType::Buffer {
                    ty: match slot.kind {
                        SlotKind::StorageRead => BufferBindingType::Storage { read_only: true },
                        SlotKind::StorageReadWrite | SlotKind::AppendCounter => {
                            BufferBindingType::Storage { read_only: false }
                        }
                        SlotKind::UniformU32 | SlotKind::UniformF32 | SlotKind::UniformMat4 => {
                            BufferBindingType::Uniform
                        }
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect()
    }

    fn check_size(&self, label: &'static str, size: u64) -> Result<(), SetupError> {
        let limits = self.render_device.limits();
        let max = limits
            .max_buffer_size
            .min(limits.max_storage_buffer_binding_size as u64);
        if size > max {
            return Err(SetupError::BufferAllocation {
                label,
                reason: format!("{size} bytes exceeds the device limit of {max}"),
            });
        }
        Ok(())
    }

    fn bind_group_for(&mut self, kernel: KernelId) -> Option<BindGroup> {
        let gpu_kernel = self.kernels.get(kernel.0 as usize)?;
        if let Some(bind_group) = &gpu_kernel.bind_group {
            return Some(bind_group.clone());
        }

        let mut entries = Vec::with_capacity(gpu_kernel.program.bindings().len());
        for slot in gpu_kernel.program.bindings() {
            let buffer = if slot.kind.is_uniform() {
                gpu_kernel.uniforms.get(&slot.name)
            } else {
                let id = gpu_kernel.bound.get(&slot.name)?;
                let gpu_buffer = self.buffers.get(id)?;
                match slot.kind {
                    SlotKind::AppendCounter => gpu_buffer.counter.as_ref(),
                    _ => Some(&gpu_buffer.items),
                }
            };
            let Some(buffer) = buffer else {
                warn!(
                    "Kernel `{}` has nothing bound to `{}`",
                    gpu_kernel.program.label(),
                    slot.name.symbol()
                );
                return None;
            };
            entries.push(BindGroupEntry {
                binding: slot.binding,
                resource: buffer.as_entire_binding(),
            });
        }

        let bind_group = self.render_device.create_bind_group(
            gpu_kernel.program.label(),
            &gpu_kernel.layout,
            &entries,
        );
        if let Some(gpu_kernel) = self.kernels.get_mut(kernel.0 as usize) {
            gpu_kernel.bind_group = Some(bind_group.clone());
        }
        Some(bind_group)
    }
}

impl GpuDevice for RenderBackend {
    fn name(&self) -> &str {
        "bevy_render"
    }

    fn load_kernel(&mut self, program: &ComputeProgram) -> Result<KernelId, SetupError> {
        let device = self.render_device.wgpu_device();
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self
            .render_device
            .create_and_validate_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(program.label()),
                source: wgpu::ShaderSource::Wgsl(program.source().into()),
            });
        let layout = self
            .render_device
            .create_bind_group_layout(program.label(), &Self::layout_entries(program));
        let pipeline_layout =
            self.render_device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some(program.label()),
                    bind_group_layouts: &[&*layout],
                    push_constant_ranges: &[],
                });
        let pipeline = self
            .render_device
            .create_compute_pipeline(&RawComputePipelineDescriptor {
                label: Some(program.label()),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(program.entry_point()),
                compilation_options: Default::default(),
                cache: None,
            });

        let scope = device.pop_error_scope();
        // Error scopes only resolve asynchronously on the web; validation
        // errors there surface through the device's uncaptured error handler.
        #[cfg(not(target_arch = "wasm32"))]
        if let Some(error) = bevy::tasks::block_on(scope) {
            return Err(SetupError::KernelCreation {
                label: program.label().to_string(),
                reason: error.to_string(),
            });
        }
        #[cfg(target_arch = "wasm32")]
        drop(scope);

        let mut uniforms = HashMap::new();
        for slot in program.bindings().iter().filter(|s| s.kind.is_uniform()) {
            let buffer = self.render_device.create_buffer(&BufferDescriptor {
                label: Some(slot.name.symbol()),
                size: UNIFORM_BUFFER_SIZE.max(slot.kind.uniform_size().unwrap_or(0)),
                usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            uniforms.insert(slot.name, buffer);
        }

        let id = KernelId(self.kernels.len() as u32);
        self.kernels.push(GpuKernel {
            program: program.clone(),
            layout,
            pipeline,
            bound: HashMap::new(),
            uniforms,
            bind_group: None,
        });
        info!("Created compute pipeline `{}` as {id}", program.label());
        Ok(id)
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, SetupError> {
        // Empty storage bindings are invalid, so zero-element buffers get one element.
        let size = desc.byte_size().max(desc.stride);
        self.check_size(desc.label, size)?;

        let usage = match desc.kind {
            BufferKind::Structured | BufferKind::Append => {
                BufferUsages::STORAGE | BufferUsages::COPY_DST
            }
            BufferKind::IndirectArgs => {
                BufferUsages::STORAGE | BufferUsages::INDIRECT | BufferUsages::COPY_DST
            }
        };
        let items = self.render_device.create_buffer(&BufferDescriptor {
            label: Some(desc.label),
            size,
            usage,
            mapped_at_creation: false,
        });
        let counter = (desc.kind == BufferKind::Append).then(|| {
            self.render_device.create_buffer(&BufferDescriptor {
                label: Some(desc.label),
                size: APPEND_COUNTER_SIZE,
                usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });

        let id = BufferId(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(
            id,
            GpuBuffer {
                desc: *desc,
                items,
                counter,
            },
        );
        Ok(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), SetupError> {
        let gpu_buffer = self
            .buffers
            .get(&buffer)
            .ok_or(SetupError::UnknownBuffer(buffer.0))?;
        if offset + data.len() as u64 > gpu_buffer.items.size() {
            return Err(SetupError::BufferAllocation {
                label: gpu_buffer.desc.label,
                reason: format!("write of {} bytes at {offset} overruns the buffer", data.len()),
            });
        }
        self.render_queue.write_buffer(&gpu_buffer.items, offset, data);
        Ok(())
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        let Some(gpu_buffer) = self.buffers.remove(&buffer) else {
            warn!("Release of {buffer}, which is not live");
            return;
        };
        gpu_buffer.items.destroy();
        if let Some(counter) = &gpu_buffer.counter {
            counter.destroy();
        }
        for kernel in &mut self.kernels {
            let before = kernel.bound.len();
            kernel.bound.retain(|_, id| *id != buffer);
            if kernel.bound.len() != before {
                kernel.bind_group = None;
            }
        }
        if self
            .pending_draw
            .as_ref()
            .is_some_and(|draw| draw.request.vertex_source == buffer || draw.request.args == buffer)
        {
            self.pending_draw = None;
        }
    }

    fn bind_buffer(
        &mut self,
        kernel: KernelId,
        name: BindingName,
        buffer: BufferId,
    ) -> Result<(), SetupError> {
        let kind = self
            .buffers
            .get(&buffer)
            .ok_or(SetupError::UnknownBuffer(buffer.0))?
            .desc
            .kind;
        let gpu_kernel = self
            .kernels
            .get_mut(kernel.0 as usize)
            .ok_or(SetupError::UnknownKernel(kernel.0))?;
        let unknown_slot = || SetupError::UnknownSlot {
            kernel: gpu_kernel.program.label().to_string(),
            binding: name.symbol(),
        };
        match gpu_kernel.program.slot(name) {
            Some(slot) if !slot.kind.is_uniform() => {}
            _ => return Err(unknown_slot()),
        }

        gpu_kernel.bound.insert(name, buffer);
        if kind == BufferKind::Append {
            if let Some(counter) = gpu_kernel
                .program
                .bindings()
                .iter()
                .find(|s| s.kind == SlotKind::AppendCounter)
            {
                gpu_kernel.bound.insert(counter.name, buffer);
            }
        }
        gpu_kernel.bind_group = None;
        Ok(())
    }

    fn set_uniform(&mut self, kernel: KernelId, name: BindingName, value: UniformValue) {
        let Some(gpu_kernel) = self.kernels.get(kernel.0 as usize) else {
            warn!("Uniform `{}` set on unknown {kernel}", name.symbol());
            return;
        };
        match (gpu_kernel.program.slot(name), gpu_kernel.uniforms.get(&name)) {
            (Some(slot), Some(buffer)) if slot.kind == value.kind() => {
                self.render_queue.write_buffer(buffer, 0, &value.to_bytes());
            }
            _ => warn!(
                "Kernel `{}` has no {:?} slot named `{}`",
                gpu_kernel.program.label(),
                value.kind(),
                name.symbol()
            ),
        }
    }

    fn set_counter(&mut self, buffer: BufferId, value: u32) {
        match self.buffers.get(&buffer).and_then(|b| b.counter.as_ref()) {
            Some(counter) => self
                .render_queue
                .write_buffer(counter, 0, &value.to_le_bytes()),
            None => warn!("Counter set on {buffer}, which is not a live append buffer"),
        }
    }

    fn dispatch(&mut self, kernel: KernelId, groups: [u32; 3]) {
        if groups.contains(&0) {
            return;
        }
        let Some(bind_group) = self.bind_group_for(kernel) else {
            warn!("Skipping dispatch of {kernel}: bindings incomplete");
            return;
        };
        let Some(gpu_kernel) = self.kernels.get(kernel.0 as usize) else {
            return;
        };
        self.commands.push(RecordedCommand::Dispatch {
            label: gpu_kernel.program.label().to_string(),
            pipeline: gpu_kernel.pipeline.clone(),
            bind_group,
            groups,
        });
    }

    fn copy_counter(&mut self, src: BufferId, dst: BufferId, offset: u64) {
        let counter = self.buffers.get(&src).and_then(|b| b.counter.clone());
        let (Some(src), Some(dst)) = (counter, self.buffer(dst).cloned()) else {
            warn!("Counter copy from {src} into {dst} skipped: buffers not live");
            return;
        };
        self.commands.push(RecordedCommand::CopyCounter { src, dst, offset });
    }

    fn draw_indirect(&mut self, request: DrawRequest) {
        let (Some(vertex_source), Some(args)) = (
            self.buffer(request.vertex_source).cloned(),
            self.buffer(request.args).cloned(),
        ) else {
            warn!("Indirect draw skipped: buffers not live");
            self.pending_draw = None;
            return;
        };
        self.pending_draw = Some(PendingDraw {
            request,
            vertex_source,
            args,
        });
    }

    fn flush(&mut self) {
        if self.commands.is_empty() {
            return;
        }

        let mut encoder = self.render_device.create_command_encoder(&Default::default());
        for command in self.commands.drain(..) {
            match command {
                RecordedCommand::Dispatch {
                    label,
                    pipeline,
                    bind_group,
                    groups: [x, y, z],
                } => {
                    let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                        label: Some(label.as_str()),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(&pipeline);
                    pass.set_bind_group(0, &bind_group, &[]);
                    pass.dispatch_workgroups(x, y, z);
                }
                RecordedCommand::CopyCounter { src, dst, offset } => {
                    encoder.copy_buffer_to_buffer(&src, 0, &dst, offset, APPEND_COUNTER_SIZE);
                }
            }
        }
        self.render_queue.submit([encoder.finish()]);
    }
}
