//! CPU reference device.
//!
//! Executes the same contract as the render backend (atomic appends with a
//! capacity clamp, on-device count copy, argument derivation) against plain
//! memory, and records every call so tests can inspect ordering and
//! resource accounting. Expansion runs through `rayon` with an `AtomicU32`
//! counter, the same way concurrent invocations append on a GPU.
//!
//! The call logs keep at most [`DEFAULT_LOG_LIMIT`] entries each (see
//! [`SimulatedDevice::with_log_limit`]); older entries are dropped in bulk so a
//! long headless run stays bounded.

use super::{
    BindingName, BufferDesc, BufferId, BufferKind, ComputeProgram, DrawRequest, GpuDevice,
    KernelId, ProgramRole, SlotKind, UniformValue,
};
use crate::engine::compute::{
    ExpansionFn, ExpansionInputs, GeneratedPrimitive, IndirectDrawArgs, expand_triangle,
};
use crate::engine::geometry::SourceVertex;
use crate::error::SetupError;
use bevy::log::{debug, warn};
use bevy::math::Mat4;
use constants::buffer_layout::{GENERATED_PRIMITIVE_STRIDE, VERTICES_PER_PRIMITIVE};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};

/// Entries each call log holds before its oldest half is discarded.
pub const DEFAULT_LOG_LIMIT: usize = 4096;

fn record<T>(log: &mut Vec<T>, limit: usize, entry: T) {
    if log.len() >= limit {
        let keep = limit / 2;
        log.drain(..log.len() - keep);
    }
    log.push(entry);
}

/// Resource accounting of a [`SimulatedDevice`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStats {
    pub buffers_created: usize,
    pub buffers_released: usize,
    /// Releases of handles that were never created or already released.
    pub invalid_releases: usize,
    pub kernels_loaded: usize,
}

/// One recorded per-frame device call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceCall {
    SetCounter { buffer: BufferId, value: u32 },
    SetUniform { kernel: KernelId, name: BindingName },
    Dispatch { kernel: KernelId, groups: [u32; 3] },
    CopyCounter { src: BufferId, dst: BufferId, offset: u64 },
    DrawIndirect,
    Flush,
}

#[derive(Debug)]
struct SimBuffer {
    desc: BufferDesc,
    words: Vec<u32>,
    counter: u32,
}

impl SimBuffer {
    fn bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.words)
    }
}

#[derive(Debug)]
struct SimKernel {
    program: ComputeProgram,
    bound: HashMap<BindingName, BufferId>,
    uniforms: HashMap<BindingName, UniformValue>,
}

pub struct SimulatedDevice {
    buffers: HashMap<BufferId, SimBuffer>,
    kernels: Vec<SimKernel>,
    next_buffer: u32,
    expansion: ExpansionFn,
    allocation_budget: Option<usize>,
    stats: DeviceStats,
    calls: Vec<DeviceCall>,
    counters_before_expansion: Vec<u32>,
    draws: Vec<DrawRequest>,
    log_limit: usize,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            kernels: Vec::new(),
            next_buffer: 0,
            expansion: expand_triangle,
            allocation_budget: None,
            stats: DeviceStats::default(),
            calls: Vec::new(),
            counters_before_expansion: Vec::new(),
            draws: Vec::new(),
            log_limit: DEFAULT_LOG_LIMIT,
        }
    }

    /// Replaces the reference expansion run by expansion dispatches.
    pub fn with_expansion(mut self, expansion: ExpansionFn) -> Self {
        self.expansion = expansion;
        self
    }

    /// Lets `count` more buffer creations succeed, then fails every later one.
    pub fn fail_allocations_after(mut self, count: usize) -> Self {
        self.allocation_budget = Some(count);
        self
    }

    /// Bounds every call log to `limit` entries, at least one.
    pub fn with_log_limit(mut self, limit: usize) -> Self {
        self.log_limit = limit.max(1);
        self
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_live(&self, buffer: BufferId) -> bool {
        self.buffers.contains_key(&buffer)
    }

    pub fn buffer_desc(&self, buffer: BufferId) -> Option<BufferDesc> {
        self.buffers.get(&buffer).map(|b| b.desc)
    }

    pub fn words(&self, buffer: BufferId) -> Option<&[u32]> {
        self.buffers.get(&buffer).map(|b| b.words.as_slice())
    }

    /// Current value of an append buffer's counter.
    pub fn counter(&self, buffer: BufferId) -> Option<u32> {
        self.buffers
            .get(&buffer)
            .filter(|b| b.desc.kind == BufferKind::Append)
            .map(|b| b.counter)
    }

    /// Primitives currently counted in an append buffer.
    pub fn primitives(&self, buffer: BufferId) -> Option<Vec<GeneratedPrimitive>> {
        let sim = self.buffers.get(&buffer)?;
        let records: &[GeneratedPrimitive] = bytemuck::try_cast_slice(&sim.words).ok()?;
        Some(records[..(sim.counter as usize).min(records.len())].to_vec())
    }

    pub fn indirect_args(&self, buffer: BufferId) -> Option<IndirectDrawArgs> {
        let words = self.words(buffer)?;
        let words: [u32; 4] = words.get(..4)?.try_into().ok()?;
        Some(IndirectDrawArgs::from_words(words))
    }

    pub fn uniform(&self, kernel: KernelId, name: BindingName) -> Option<UniformValue> {
        self.kernel(kernel)?.uniforms.get(&name).copied()
    }

    pub fn bound_buffer(&self, kernel: KernelId, name: BindingName) -> Option<BufferId> {
        self.kernel(kernel)?.bound.get(&name).copied()
    }

    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    /// Append counter value observed at the start of each expansion dispatch.
    pub fn counters_before_expansion(&self) -> &[u32] {
        &self.counters_before_expansion
    }

    pub fn draws(&self) -> &[DrawRequest] {
        &self.draws
    }

    pub fn clear_log(&mut self) {
        self.calls.clear();
        self.counters_before_expansion.clear();
        self.draws.clear();
    }

    fn kernel(&self, kernel: KernelId) -> Option<&SimKernel> {
        self.kernels.get(kernel.0 as usize)
    }

    fn bound_to(&self, kernel: &SimKernel, name: BindingName) -> Option<BufferId> {
        let buffer = kernel.bound.get(&name).copied();
        if buffer.is_none() {
            warn!(
                "Kernel `{}` dispatched without `{}` bound",
                kernel.program.label(),
                name.symbol()
            );
        }
        buffer
    }

    fn run_expansion(&mut self, kernel: KernelId, invocations: u64) {
        let Some(sim_kernel) = self.kernel(kernel) else {
            return;
        };
        let (Some(vertices), Some(indices), Some(target)) = (
            self.bound_to(sim_kernel, BindingName::SourceVertices),
            self.bound_to(sim_kernel, BindingName::SourceTriangles),
            self.bound_to(sim_kernel, BindingName::DrawTriangles),
        ) else {
            return;
        };

        let uniform = |name: BindingName| sim_kernel.uniforms.get(&name).copied();
        let inputs = ExpansionInputs {
            num_source_triangles: match uniform(BindingName::NumSourceTriangles) {
                Some(UniformValue::U32(v)) => v,
                _ => 0,
            },
            audio_level: match uniform(BindingName::AudioLevel) {
                Some(UniformValue::F32(v)) => v,
                _ => 0.0,
            },
            time: match uniform(BindingName::Time) {
                Some(UniformValue::F32(v)) => v,
                _ => 0.0,
            },
            local_to_world: match uniform(BindingName::LocalToWorld) {
                Some(UniformValue::Mat4(m)) => m,
                _ => Mat4::IDENTITY,
            },
        };

        let (Some(vertex_buffer), Some(index_buffer)) =
            (self.buffers.get(&vertices), self.buffers.get(&indices))
        else {
            warn!("Expansion dispatched against released source buffers");
            return;
        };
        let Ok(source_vertices) =
            bytemuck::try_cast_slice::<u32, SourceVertex>(&vertex_buffer.words)
        else {
            warn!("Source vertex buffer is not a whole number of records");
            return;
        };
        let source_vertices = &source_vertices[..vertex_buffer.desc.element_count as usize];
        let source_indices = &index_buffer.words[..index_buffer.desc.element_count as usize];

        let Some(target_buffer) = self.buffers.get(&target) else {
            warn!("Expansion dispatched against a released append buffer");
            return;
        };
        let capacity = target_buffer.desc.element_count;
        let start = target_buffer.counter;
        record(&mut self.counters_before_expansion, self.log_limit, start);

        let active = invocations.min(inputs.num_source_triangles as u64) as u32;
        let counter = AtomicU32::new(start);
        let slots: Vec<OnceLock<GeneratedPrimitive>> =
            (0..capacity).map(|_| OnceLock::new()).collect();
        let expansion = self.expansion;

        (0..active).into_par_iter().for_each(|triangle| {
            let base = triangle as usize * VERTICES_PER_PRIMITIVE as usize;
            let Some(corners) = source_indices.get(base..base + 3) else {
                return;
            };
            let (Some(&a), Some(&b), Some(&c)) = (
                source_vertices.get(corners[0] as usize),
                source_vertices.get(corners[1] as usize),
                source_vertices.get(corners[2] as usize),
            ) else {
                return;
            };

            expansion(&[a, b, c], &inputs, &mut |primitive| {
                let slot = counter.fetch_add(1, Ordering::Relaxed);
                if slot >= capacity {
                    counter.fetch_sub(1, Ordering::Relaxed);
                    return;
                }
                let _ = slots[slot as usize].set(primitive);
            });
        });

        let Some(target_buffer) = self.buffers.get_mut(&target) else {
            return;
        };
        target_buffer.counter = counter.into_inner();
        let stride = GENERATED_PRIMITIVE_STRIDE as usize;
        let bytes = target_buffer.bytes_mut();
        for (index, slot) in slots.into_iter().enumerate() {
            if let Some(primitive) = slot.into_inner() {
                bytes[index * stride..(index + 1) * stride]
                    .copy_from_slice(bytemuck::bytes_of(&primitive));
            }
        }
    }

    fn run_arg_derivation(&mut self, kernel: KernelId, invocations: u64) {
        let Some(sim_kernel) = self.kernel(kernel) else {
            return;
        };
        let Some(args) = self.bound_to(sim_kernel, BindingName::IndirectArgsBuffer) else {
            return;
        };
        let Some(word) = self
            .buffers
            .get_mut(&args)
            .and_then(|buffer| buffer.words.first_mut())
        else {
            warn!("Argument derivation dispatched against a released args buffer");
            return;
        };
        for _ in 0..invocations {
            *word = word.wrapping_mul(VERTICES_PER_PRIMITIVE);
        }
    }
}

impl GpuDevice for SimulatedDevice {
    fn name(&self) -> &str {
        "simulated"
    }

    fn load_kernel(&mut self, program: &ComputeProgram) -> Result<KernelId, SetupError> {
        let id = KernelId(self.kernels.len() as u32);
        self.kernels.push(SimKernel {
            program: program.clone(),
            bound: HashMap::new(),
            uniforms: HashMap::new(),
        });
        self.stats.kernels_loaded += 1;
        debug!("Loaded kernel `{}` as {id}", program.label());
        Ok(id)
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, SetupError> {
        if let Some(budget) = self.allocation_budget.as_mut() {
            if *budget == 0 {
                return Err(SetupError::BufferAllocation {
                    label: desc.label,
                    reason: "simulated allocation failure".into(),
                });
            }
            *budget -= 1;
        }

        let id = BufferId(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(
            id,
            SimBuffer {
                desc: *desc,
                words: vec![0; (desc.byte_size() as usize).div_ceil(4)],
                counter: 0,
            },
        );
        self.stats.buffers_created += 1;
        Ok(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), SetupError> {
        let sim = self
            .buffers
            .get_mut(&buffer)
            .ok_or(SetupError::UnknownBuffer(buffer.0))?;
        let label = sim.desc.label;
        let bytes = sim.bytes_mut();
        let start = offset as usize;
        let Some(target) = bytes.get_mut(start..start + data.len()) else {
            return Err(SetupError::BufferAllocation {
                label,
                reason: format!("write of {} bytes at {offset} overruns the buffer", data.len()),
            });
        };
        target.copy_from_slice(data);
        Ok(())
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(&buffer).is_some() {
            self.stats.buffers_released += 1;
        } else {
            self.stats.invalid_releases += 1;
            warn!("Release of {buffer}, which is not live");
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
        let sim_kernel = self
            .kernels
            .get_mut(kernel.0 as usize)
            .ok_or(SetupError::UnknownKernel(kernel.0))?;
        let slot = sim_kernel
            .program
            .slot(name)
            .ok_or_else(|| SetupError::UnknownSlot {
                kernel: sim_kernel.program.label().to_string(),
                binding: name.symbol(),
            })?;
        if slot.kind.is_uniform() {
            return Err(SetupError::UnknownSlot {
                kernel: sim_kernel.program.label().to_string(),
                binding: name.symbol(),
            });
        }

        sim_kernel.bound.insert(name, buffer);
        if kind == BufferKind::Append {
            if let Some(counter) = sim_kernel
                .program
                .bindings()
                .iter()
                .find(|s| s.kind == SlotKind::AppendCounter)
            {
                sim_kernel.bound.insert(counter.name, buffer);
            }
        }
        Ok(())
    }

    fn set_uniform(&mut self, kernel: KernelId, name: BindingName, value: UniformValue) {
        record(&mut self.calls, self.log_limit, DeviceCall::SetUniform { kernel, name });
        let Some(sim_kernel) = self.kernels.get_mut(kernel.0 as usize) else {
            warn!("Uniform `{}` set on unknown {kernel}", name.symbol());
            return;
        };
        match sim_kernel.program.slot(name) {
            Some(slot) if slot.kind == value.kind() => {
                sim_kernel.uniforms.insert(name, value);
            }
            _ => warn!(
                "Kernel `{}` has no {:?} slot named `{}`",
                sim_kernel.program.label(),
                value.kind(),
                name.symbol()
            ),
        }
    }

    fn set_counter(&mut self, buffer: BufferId, value: u32) {
        record(&mut self.calls, self.log_limit, DeviceCall::SetCounter { buffer, value });
        match self.buffers.get_mut(&buffer) {
            Some(sim) if sim.desc.kind == BufferKind::Append => sim.counter = value,
            _ => warn!("Counter set on {buffer}, which is not a live append buffer"),
        }
    }

    fn dispatch(&mut self, kernel: KernelId, groups: [u32; 3]) {
        record(&mut self.calls, self.log_limit, DeviceCall::Dispatch { kernel, groups });
        let Some(sim_kernel) = self.kernel(kernel) else {
            warn!("Dispatch of unknown {kernel}");
            return;
        };
        let per_group: u64 = sim_kernel
            .program
            .workgroup_size()
            .iter()
            .map(|&n| n as u64)
            .product();
        let invocations = groups.iter().map(|&n| n as u64).product::<u64>() * per_group;

        match sim_kernel.program.role() {
            ProgramRole::Expansion => self.run_expansion(kernel, invocations),
            ProgramRole::ArgDerivation => self.run_arg_derivation(kernel, invocations),
        }
    }

    fn copy_counter(&mut self, src: BufferId, dst: BufferId, offset: u64) {
        record(&mut self.calls, self.log_limit, DeviceCall::CopyCounter { src, dst, offset });
        let Some(count) = self.counter(src) else {
            warn!("Counter copy from {src}, which is not a live append buffer");
            return;
        };
        match self
            .buffers
            .get_mut(&dst)
            .and_then(|sim| sim.words.get_mut((offset / 4) as usize))
        {
            Some(word) if offset % 4 == 0 => *word = count,
            _ => warn!("Counter copy into {dst} at {offset} is out of range"),
        }
    }

    fn draw_indirect(&mut self, request: DrawRequest) {
        record(&mut self.calls, self.log_limit, DeviceCall::DrawIndirect);
        record(&mut self.draws, self.log_limit, request);
    }

    fn flush(&mut self) {
        record(&mut self.calls, self.log_limit, DeviceCall::Flush);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::compute::PipelinePrograms;

    fn append_desc(element_count: u32) -> BufferDesc {
        BufferDesc {
            label: "append",
            kind: BufferKind::Append,
            element_count,
            stride: GENERATED_PRIMITIVE_STRIDE,
        }
    }

    #[test]
    fn buffers_record_exact_element_counts() {
        let mut device = SimulatedDevice::new();
        let id = device.create_buffer(&append_desc(0)).unwrap();
        assert_eq!(device.buffer_desc(id).unwrap().element_count, 0);
        assert_eq!(device.words(id).unwrap().len(), 0);
    }

    #[test]
    fn releasing_twice_is_counted_as_invalid() {
        let mut device = SimulatedDevice::new();
        let id = device.create_buffer(&append_desc(1)).unwrap();
        device.release_buffer(id);
        device.release_buffer(id);
        assert_eq!(device.stats().buffers_released, 1);
        assert_eq!(device.stats().invalid_releases, 1);
    }

    #[test]
    fn allocation_budget_fails_later_creations() {
        let mut device = SimulatedDevice::new().fail_allocations_after(1);
        assert!(device.create_buffer(&append_desc(1)).is_ok());
        assert!(matches!(
            device.create_buffer(&append_desc(1)),
            Err(SetupError::BufferAllocation { .. })
        ));
    }

    #[test]
    fn overrunning_write_is_rejected() {
        let mut device = SimulatedDevice::new();
        let id = device.create_buffer(&append_desc(1)).unwrap();
        assert!(device.write_buffer(id, 70, &[0; 4]).is_err());
    }

    #[test]
    fn binding_an_append_buffer_also_binds_its_counter() {
        let programs = PipelinePrograms::builtin().unwrap();
        let mut device = SimulatedDevice::new();
        let kernel = device.load_kernel(&programs.expansion).unwrap();
        let target = device.create_buffer(&append_desc(7)).unwrap();
        device
            .bind_buffer(kernel, BindingName::DrawTriangles, target)
            .unwrap();
        assert_eq!(
            device.bound_buffer(kernel, BindingName::DrawTrianglesCounter),
            Some(target)
        );
    }

    #[test]
    fn binding_a_foreign_slot_fails() {
        let programs = PipelinePrograms::builtin().unwrap();
        let mut device = SimulatedDevice::new();
        let kernel = device.load_kernel(&programs.arg_derivation).unwrap();
        let target = device.create_buffer(&append_desc(7)).unwrap();
        assert!(matches!(
            device.bind_buffer(kernel, BindingName::SourceVertices, target),
            Err(SetupError::UnknownSlot { .. })
        ));
    }

    #[test]
    fn counter_copy_lands_in_the_requested_word() {
        let mut device = SimulatedDevice::new();
        let source = device.create_buffer(&append_desc(4)).unwrap();
        let args = device
            .create_buffer(&BufferDesc {
                label: "args",
                kind: BufferKind::IndirectArgs,
                element_count: 1,
                stride: 16,
            })
            .unwrap();
        device.set_counter(source, 3);
        device.copy_counter(source, args, 0);
        assert_eq!(device.words(args).unwrap(), &[3, 0, 0, 0]);
    }

    #[test]
    fn call_log_stays_within_its_limit() {
        let mut device = SimulatedDevice::new().with_log_limit(8);
        let source = device.create_buffer(&append_desc(4)).unwrap();
        for value in 0..100 {
            device.set_counter(source, value);
            assert!(device.calls().len() <= 8);
        }
        assert_eq!(
            device.calls().last(),
            Some(&DeviceCall::SetCounter {
                buffer: source,
                value: 99
            })
        );
    }

    #[test]
    fn default_limit_keeps_a_long_run_bounded() {
        let mut device = SimulatedDevice::new();
        for _ in 0..(DEFAULT_LOG_LIMIT * 3) {
            device.flush();
        }
        assert!(device.calls().len() <= DEFAULT_LOG_LIMIT);
        assert!(device.calls().len() > DEFAULT_LOG_LIMIT / 2);
    }
}
