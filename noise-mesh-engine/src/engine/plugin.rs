//! Wires the procedural noise mesh pipeline into a Bevy app.

use crate::engine::audio::{AudioLevel, update_audio_level};
use crate::engine::geometry::wireframe::apply_line_strip_wireframe;
use crate::engine::render::{
    NoiseMeshDrawLabel, NoiseMeshDrawNode, NoiseMeshDrawPipeline, NoiseMeshFrame,
    NoiseMeshShadowLabel, NoiseMeshShadowNode, drive_noise_mesh, init_noise_mesh_driver,
    prepare_noise_mesh_frame, queue_noise_mesh_pipelines,
};
use crate::settings::PipelineSettings;
use bevy::asset::AssetEvents;
use bevy::core_pipeline::core_3d::graph::{Core3d, Node3d};
use bevy::pbr::graph::NodePbr;
use bevy::prelude::*;
use bevy::render::extract_resource::ExtractResourcePlugin;
use bevy::render::render_graph::{RenderGraphApp, ViewNodeRunner};
use bevy::render::render_resource::SpecializedRenderPipelines;
use bevy::render::{Render, RenderApp, RenderSet};
use bevy::transform::TransformSystem;
use bevy_common_assets::json::JsonAssetPlugin;

/// Marks the entity whose mesh feeds the pipeline. Its global transform is
/// uploaded as `_LocalToWorld` each frame. Only the first source found is used.
#[derive(Component, Clone, Debug)]
pub struct NoiseMeshSource {
    pub mesh: Handle<Mesh>,
}

/// Handle to the settings asset the plugin keeps in sync with [`PipelineSettings`].
#[derive(Resource, Clone)]
pub struct PipelineSettingsHandle(pub Handle<PipelineSettings>);

pub struct NoiseMeshPlugin {
    /// Settings asset to load, relative to the asset root. `None` keeps the defaults.
    pub settings_path: Option<String>,
}

impl Default for NoiseMeshPlugin {
    fn default() -> Self {
        Self {
            settings_path: Some("settings/noise_mesh.noise.json".into()),
        }
    }
}

impl Plugin for NoiseMeshPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins((
            JsonAssetPlugin::<PipelineSettings>::new(&["noise.json"]),
            ExtractResourcePlugin::<NoiseMeshFrame>::default(),
        ))
        .init_resource::<PipelineSettings>()
        .init_resource::<AudioLevel>()
        .init_resource::<NoiseMeshFrame>()
        .add_systems(
            Update,
            (
                update_audio_level,
                apply_settings_asset,
                apply_line_strip_wireframe,
            ),
        )
        .add_systems(
            PostUpdate,
            prepare_noise_mesh_frame
                .after(TransformSystem::TransformPropagate)
                .after(AssetEvents),
        );

        if let Some(path) = &self.settings_path {
            match app.world().get_resource::<AssetServer>() {
                Some(server) => {
                    let handle = server.load(path.clone());
                    app.insert_resource(PipelineSettingsHandle(handle));
                }
                None => warn!("No asset server, noise mesh settings stay at their defaults"),
            }
        }

        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };

        render_app
            .init_resource::<SpecializedRenderPipelines<NoiseMeshDrawPipeline>>()
            .add_systems(
                Render,
                (drive_noise_mesh, queue_noise_mesh_pipelines).in_set(RenderSet::Queue),
            )
            .add_render_graph_node::<ViewNodeRunner<NoiseMeshShadowNode>>(
                Core3d,
                NoiseMeshShadowLabel,
            )
            .add_render_graph_edges(
                Core3d,
                (
                    NodePbr::LateShadowPass,
                    NoiseMeshShadowLabel,
                    Node3d::StartMainPass,
                ),
            )
            .add_render_graph_node::<ViewNodeRunner<NoiseMeshDrawNode>>(Core3d, NoiseMeshDrawLabel)
            .add_render_graph_edges(
                Core3d,
                (
                    Node3d::MainOpaquePass,
                    NoiseMeshDrawLabel,
                    Node3d::Tonemapping,
                ),
            );
    }

    fn finish(&self, app: &mut App) {
        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };

        render_app.init_resource::<NoiseMeshDrawPipeline>();
        init_noise_mesh_driver(render_app.world_mut());
    }
}

/// Copies the loaded settings asset into the live resource on load and hot reload.
pub fn apply_settings_asset(
    handle: Option<Res<PipelineSettingsHandle>>,
    assets: Res<Assets<PipelineSettings>>,
    mut events: EventReader<AssetEvent<PipelineSettings>>,
    mut settings: ResMut<PipelineSettings>,
) {
    let Some(handle) = handle else {
        events.clear();
        return;
    };
    let id = handle.0.id();
    let changed = events.read().fold(false, |changed, event| {
        changed
            || matches!(
                event,
                AssetEvent::LoadedWithDependencies { id: loaded } | AssetEvent::Modified { id: loaded }
                    if *loaded == id
            )
    });
    if !changed {
        return;
    }
    if let Some(loaded) = assets.get(id) {
        if *settings != *loaded {
            info!("Noise mesh settings applied: {:?}", loaded);
            *settings = loaded.clone();
        }
    }
}
