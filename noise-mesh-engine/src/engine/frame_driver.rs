//! Explicit lifecycle for the procedural mesh pipeline.
//!
//! `initialize` loads kernels and allocates the buffer set, `tick` records one
//! frame of device work in a fixed order, and `shutdown` releases everything.
//! Dropping a driver shuts it down.

use crate::engine::compute::{
    ArgDerivationStage, ExpansionInputs, ExpansionStage, PipelinePrograms,
};
use crate::engine::geometry::{Bounds, SourceGeometry};
use crate::engine::gpu::{DrawRequest, GpuBufferSet, GpuDevice};
use crate::error::SetupError;
use crate::settings::{PipelineSettings, TimeSource};
use bevy::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Uninitialized,
    Ready,
}

/// Per-frame values supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    /// Normalized audio level. Clamped to `[0, 1]` before upload.
    pub audio_level: f32,
    pub local_to_world: Mat4,
}

impl Default for FrameInputs {
    fn default() -> Self {
        Self {
            audio_level: 0.0,
            local_to_world: Mat4::IDENTITY,
        }
    }
}

/// What a completed tick submitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub frame: u64,
    pub dispatch_width: u32,
    pub capacity: u32,
    pub time: f32,
    pub audio_level: f32,
    pub world_bounds: Bounds,
}

#[derive(Debug, Clone, Copy)]
struct Kernels {
    expansion: ExpansionStage,
    arg_derivation: ArgDerivationStage,
}

#[derive(Debug)]
struct ActivePipeline {
    buffers: GpuBufferSet,
    object_bounds: Bounds,
    elapsed: f32,
    frame: u64,
}

pub struct FrameDriver<D: GpuDevice> {
    device: D,
    settings: PipelineSettings,
    programs: PipelinePrograms,
    kernels: Option<Kernels>,
    active: Option<ActivePipeline>,
}

impl<D: GpuDevice> FrameDriver<D> {
    pub fn new(device: D, settings: PipelineSettings, programs: PipelinePrograms) -> Self {
        Self {
            device,
            settings,
            programs,
            kernels: None,
            active: None,
        }
    }

    /// Loads both kernels on first use, allocates and binds the buffer set
    /// for `geometry`. A driver that is already ready is shut down first.
    /// On error nothing stays allocated and the driver is uninitialized.
    pub fn initialize(&mut self, geometry: &SourceGeometry) -> Result<(), SetupError> {
        self.shutdown();

        let kernels = self.load_kernels()?;
        let mut buffers = GpuBufferSet::allocate(&mut self.device, geometry)?;
        if let Err(err) = buffers.bind(
            &mut self.device,
            kernels.expansion.kernel(),
            kernels.arg_derivation.kernel(),
        ) {
            buffers.release(&mut self.device);
            return Err(err);
        }

        info!(
            "Noise mesh pipeline ready on `{}`: {} triangles, dispatch width {}",
            self.device.name(),
            geometry.triangle_count(),
            kernels.expansion.dispatch_width(geometry.triangle_count())
        );

        self.active = Some(ActivePipeline {
            buffers,
            object_bounds: geometry.bounds(),
            elapsed: 0.0,
            frame: 0,
        });
        Ok(())
    }

    fn load_kernels(&mut self) -> Result<Kernels, SetupError> {
        if let Some(kernels) = self.kernels {
            return Ok(kernels);
        }
        let expansion = self.device.load_kernel(&self.programs.expansion)?;
        let arg_derivation = self.device.load_kernel(&self.programs.arg_derivation)?;
        let kernels = Kernels {
            expansion: ExpansionStage::new(expansion, &self.programs.expansion),
            arg_derivation: ArgDerivationStage::new(arg_derivation),
        };
        self.kernels = Some(kernels);
        Ok(kernels)
    }

    /// Records and submits one frame. Returns `None` without touching the
    /// device when the driver is not ready.
    pub fn tick(&mut self, delta_seconds: f32, inputs: &FrameInputs) -> Option<FrameStats> {
        let (Some(active), Some(kernels)) = (self.active.as_mut(), self.kernels) else {
            debug!("Noise mesh frame skipped: pipeline not initialized");
            return None;
        };
        let device = &mut self.device;
        let generated = active.buffers.generated();
        let args = active.buffers.indirect_args();
        let triangle_count = active.buffers.triangle_count();

        device.set_counter(generated, 0);

        active.elapsed += delta_seconds;
        let time = match self.settings.time_source {
            TimeSource::Elapsed => active.elapsed,
            TimeSource::Delta => delta_seconds,
        };
        let audio_level = if inputs.audio_level.is_finite() {
            inputs.audio_level.clamp(0.0, 1.0)
        } else {
            0.0
        };
        kernels.expansion.push_uniforms(
            device,
            &ExpansionInputs {
                num_source_triangles: triangle_count,
                audio_level,
                time,
                local_to_world: inputs.local_to_world,
            },
        );

        let world_bounds = active.object_bounds.transformed(&inputs.local_to_world);

        kernels.expansion.dispatch(device, triangle_count);
        kernels.arg_derivation.copy_count(device, generated, args);
        kernels.arg_derivation.dispatch(device);

        device.draw_indirect(DrawRequest {
            vertex_source: generated,
            args,
            bounds: world_bounds,
            topology: self.settings.topology,
            cast_shadows: self.settings.cast_shadows,
            line_colour: self.settings.line_colour,
        });
        device.flush();

        active.frame += 1;
        Some(FrameStats {
            frame: active.frame,
            dispatch_width: kernels.expansion.dispatch_width(triangle_count),
            capacity: active.buffers.capacity(),
            time,
            audio_level,
            world_bounds,
        })
    }

    /// Releases the buffer set. Calling it again, or on a driver that was
    /// never initialized, does nothing.
    pub fn shutdown(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.buffers.release(&mut self.device);
            info!(
                "Noise mesh pipeline released after {} frames",
                active.frame
            );
        }
    }

    pub fn state(&self) -> DriverState {
        if self.active.is_some() {
            DriverState::Ready
        } else {
            DriverState::Uninitialized
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == DriverState::Ready
    }

    pub fn buffers(&self) -> Option<&GpuBufferSet> {
        self.active.as_ref().map(|a| &a.buffers)
    }

    /// Workgroups the expansion dispatch uses for the active geometry.
    pub fn dispatch_width(&self) -> Option<u32> {
        let kernels = self.kernels?;
        let active = self.active.as_ref()?;
        Some(kernels.expansion.dispatch_width(active.buffers.triangle_count()))
    }

    pub fn capacity(&self) -> Option<u32> {
        self.buffers().map(GpuBufferSet::capacity)
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Draw settings and the time source apply from the next frame. The UV
    /// mode only affects geometry adapted after the change.
    pub fn set_settings(&mut self, settings: PipelineSettings) {
        self.settings = settings;
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

impl<D: GpuDevice> Drop for FrameDriver<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
