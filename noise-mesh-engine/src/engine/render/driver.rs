//! Render-world ownership of the [`FrameDriver`].

use super::extraction::NoiseMeshFrame;
use crate::engine::compute::PipelinePrograms;
use crate::engine::frame_driver::{FrameDriver, FrameInputs, FrameStats};
use crate::engine::gpu::{GpuDevice, RenderBackend};
use crate::settings::PipelineSettings;
use bevy::prelude::*;
use bevy::render::renderer::{RenderDevice, RenderQueue};

#[derive(Resource, Deref, DerefMut)]
pub struct NoiseMeshDriver(pub FrameDriver<RenderBackend>);

/// Builds the driver once the render device exists. Logs and leaves the
/// pipeline disabled if the built-in programs fail validation.
pub fn init_noise_mesh_driver(world: &mut World) {
    let programs = match PipelinePrograms::builtin() {
        Ok(programs) => programs,
        Err(err) => {
            error!("Noise mesh programs failed validation, pipeline disabled: {err}");
            return;
        }
    };
    let device = world.resource::<RenderDevice>().clone();
    let queue = world.resource::<RenderQueue>().clone();
    let backend = RenderBackend::new(device, queue);
    world.insert_resource(NoiseMeshDriver(FrameDriver::new(
        backend,
        PipelineSettings::default(),
        programs,
    )));
}

/// Generation the driver was last initialized for, successful or not.
#[derive(Default)]
pub struct InitializedGeneration(Option<u64>);

pub fn drive_noise_mesh(
    frame: Option<Res<NoiseMeshFrame>>,
    driver: Option<ResMut<NoiseMeshDriver>>,
    mut initialized: Local<InitializedGeneration>,
) {
    let (Some(frame), Some(mut driver)) = (frame, driver) else {
        return;
    };
    if sync_driver(&mut driver.0, &frame, &mut initialized).is_none() {
        driver.device_mut().clear_pending_draw();
    }
}

/// Applies one extracted frame to a driver: shuts it down while the frame is
/// inactive, reinitializes once per new geometry generation, then ticks.
/// Returns `None` when no frame ran.
pub fn sync_driver<D: GpuDevice>(
    driver: &mut FrameDriver<D>,
    frame: &NoiseMeshFrame,
    initialized: &mut InitializedGeneration,
) -> Option<FrameStats> {
    let geometry = match (&frame.geometry, frame.active) {
        (Some(geometry), true) => geometry,
        _ => {
            if driver.is_ready() {
                driver.shutdown();
            }
            initialized.0 = None;
            return None;
        }
    };

    if driver.settings() != &frame.settings {
        driver.set_settings(frame.settings.clone());
    }

    if initialized.0 != Some(frame.generation) {
        initialized.0 = Some(frame.generation);
        if let Err(err) = driver.initialize(geometry) {
            error!("Noise mesh pipeline setup failed: {err}");
        }
    }

    let inputs = FrameInputs {
        audio_level: frame.audio_level,
        local_to_world: frame.local_to_world,
    };
    driver.tick(frame.delta_seconds, &inputs)
}
