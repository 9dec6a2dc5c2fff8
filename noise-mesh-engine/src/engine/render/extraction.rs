//! Main-world snapshot of everything the render-world driver needs for a frame.

use crate::engine::audio::AudioLevel;
use crate::engine::geometry::SourceGeometry;
use crate::engine::plugin::NoiseMeshSource;
use crate::settings::{PipelineSettings, UvMode};
use bevy::prelude::*;
use bevy::render::extract_resource::ExtractResource;
use std::sync::Arc;

/// Extracted into the render world every frame.
///
/// `generation` bumps whenever the source geometry is rebuilt; the render
/// world reinitializes the driver when it sees a new value.
#[derive(Resource, Clone, ExtractResource)]
pub struct NoiseMeshFrame {
    pub active: bool,
    pub generation: u64,
    pub geometry: Option<Arc<SourceGeometry>>,
    pub local_to_world: Mat4,
    pub delta_seconds: f32,
    pub audio_level: f32,
    pub settings: PipelineSettings,
}

impl Default for NoiseMeshFrame {
    fn default() -> Self {
        Self {
            active: false,
            generation: 0,
            geometry: None,
            local_to_world: Mat4::IDENTITY,
            delta_seconds: 0.0,
            audio_level: 0.0,
            settings: PipelineSettings::default(),
        }
    }
}

/// Source mesh and UV mode the current geometry was built from.
#[derive(Default)]
pub struct TrackedSource(Option<(AssetId<Mesh>, UvMode)>);

/// Rebuilds the source geometry on mesh or settings change and refreshes the per-frame inputs.
pub fn prepare_noise_mesh_frame(
    time: Res<Time>,
    audio: Res<AudioLevel>,
    settings: Res<PipelineSettings>,
    meshes: Res<Assets<Mesh>>,
    mut mesh_events: EventReader<AssetEvent<Mesh>>,
    sources: Query<(&NoiseMeshSource, &GlobalTransform)>,
    mut frame: ResMut<NoiseMeshFrame>,
    mut tracked: Local<TrackedSource>,
) {
    let tracked_id = tracked.0.map(|(id, _)| id);
    let modified = mesh_events.read().fold(false, |modified, event| {
        modified || matches!(event, AssetEvent::Modified { id } if Some(*id) == tracked_id)
    });

    let Some((source, transform)) = sources.iter().next() else {
        if frame.active || frame.geometry.is_some() {
            debug!("Noise mesh source removed");
            frame.active = false;
            frame.geometry = None;
        }
        tracked.0 = None;
        return;
    };

    let key = (source.mesh.id(), settings.uv_mode);
    if tracked.0 != Some(key) || modified {
        let Some(mesh) = meshes.get(&source.mesh) else {
            // Not loaded yet; retried next frame.
            frame.active = false;
            return;
        };
        match SourceGeometry::from_mesh(mesh, settings.uv_mode) {
            Ok(geometry) => {
                info!(
                    "Noise mesh source prepared: {} vertices, {} triangles",
                    geometry.vertex_count(),
                    geometry.triangle_count()
                );
                frame.geometry = Some(Arc::new(geometry));
                frame.generation += 1;
            }
            Err(err) => {
                error!("Noise mesh source rejected: {err}");
                frame.geometry = None;
            }
        }
        tracked.0 = Some(key);
    }

    frame.active = frame.geometry.is_some();
    frame.local_to_world = transform.compute_matrix();
    frame.delta_seconds = time.delta_secs();
    frame.audio_level = audio.level();
    if frame.settings != *settings {
        frame.settings = settings.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::render::mesh::{Indices, PrimitiveTopology};
    use bevy::render::render_asset::RenderAssetUsages;

    fn triangle() -> Mesh {
        Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
            .with_inserted_attribute(
                Mesh::ATTRIBUTE_POSITION,
                vec![[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            )
            .with_inserted_attribute(
                Mesh::ATTRIBUTE_UV_0,
                vec![[0.0f32, 0.0], [1.0, 0.0], [0.0, 1.0]],
            )
            .with_inserted_indices(Indices::U32(vec![0, 1, 2]))
    }

    fn frame_app() -> App {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, AssetPlugin::default()))
            .init_asset::<Mesh>()
            .init_resource::<AudioLevel>()
            .init_resource::<PipelineSettings>()
            .init_resource::<NoiseMeshFrame>()
            .add_systems(Update, prepare_noise_mesh_frame);
        app
    }

    fn spawn_source(app: &mut App, mesh: Handle<Mesh>) -> Entity {
        app.world_mut()
            .spawn((NoiseMeshSource { mesh }, GlobalTransform::IDENTITY))
            .id()
    }

    fn frame(app: &App) -> &NoiseMeshFrame {
        app.world().resource::<NoiseMeshFrame>()
    }

    fn add_mesh(app: &mut App, mesh: Mesh) -> Handle<Mesh> {
        app.world_mut().resource_mut::<Assets<Mesh>>().add(mesh)
    }

    #[test]
    fn loaded_source_activates_once() {
        let mut app = frame_app();
        let mesh = add_mesh(&mut app, triangle());
        spawn_source(&mut app, mesh);

        app.update();
        assert!(frame(&app).active);
        assert_eq!(frame(&app).generation, 1);
        assert_eq!(frame(&app).geometry.as_ref().unwrap().triangle_count(), 1);

        app.update();
        app.update();
        assert_eq!(frame(&app).generation, 1);
    }

    #[test]
    fn modified_mesh_rebuilds_geometry() {
        let mut app = frame_app();
        let mesh = add_mesh(&mut app, triangle());
        spawn_source(&mut app, mesh.clone());
        app.update();
        assert_eq!(frame(&app).generation, 1);

        {
            let mut meshes = app.world_mut().resource_mut::<Assets<Mesh>>();
            let edited = meshes.get_mut(&mesh).unwrap();
            edited.insert_attribute(
                Mesh::ATTRIBUTE_POSITION,
                vec![[0.0f32, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0]],
            );
        }
        // The modification event is flushed during one update and read by the next.
        app.update();
        app.update();

        assert_eq!(frame(&app).generation, 2);
        let geometry = frame(&app).geometry.clone().unwrap();
        assert_eq!(geometry.vertices()[1].position, [2.0, 0.0, 0.0]);
        assert!(frame(&app).active);
    }

    #[test]
    fn uv_mode_change_rebuilds_geometry() {
        let mut app = frame_app();
        let mesh = add_mesh(&mut app, triangle());
        spawn_source(&mut app, mesh);
        app.update();
        assert_eq!(frame(&app).geometry.as_ref().unwrap().vertices()[1].uv, [0.0, 0.0]);

        app.world_mut().resource_mut::<PipelineSettings>().uv_mode = UvMode::FromMesh;
        app.update();

        assert_eq!(frame(&app).generation, 2);
        assert_eq!(frame(&app).settings.uv_mode, UvMode::FromMesh);
        assert_eq!(frame(&app).geometry.as_ref().unwrap().vertices()[1].uv, [1.0, 0.0]);
    }

    #[test]
    fn despawned_source_deactivates_and_respawn_rebuilds() {
        let mut app = frame_app();
        let mesh = add_mesh(&mut app, triangle());
        let source = spawn_source(&mut app, mesh.clone());
        app.update();
        assert!(frame(&app).active);

        app.world_mut().despawn(source);
        app.update();
        assert!(!frame(&app).active);
        assert!(frame(&app).geometry.is_none());
        assert_eq!(frame(&app).generation, 1);

        spawn_source(&mut app, mesh);
        app.update();
        assert!(frame(&app).active);
        assert_eq!(frame(&app).generation, 2);
    }

    #[test]
    fn unloaded_mesh_is_retried_until_it_arrives() {
        let mut app = frame_app();
        let mesh = app.world_mut().resource_mut::<Assets<Mesh>>().reserve_handle();
        spawn_source(&mut app, mesh.clone());

        app.update();
        app.update();
        assert!(!frame(&app).active);
        assert_eq!(frame(&app).generation, 0);

        let _ = app
            .world_mut()
            .resource_mut::<Assets<Mesh>>()
            .insert(&mesh, triangle());
        app.update();

        assert!(frame(&app).active);
        assert_eq!(frame(&app).generation, 1);
    }

    #[test]
    fn rejected_mesh_stays_inactive_without_retrying() {
        let mut app = frame_app();
        let points = Mesh::new(PrimitiveTopology::PointList, RenderAssetUsages::default())
            .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, vec![[0.0f32, 0.0, 0.0]]);
        let mesh = add_mesh(&mut app, points);
        spawn_source(&mut app, mesh);

        app.update();
        app.update();

        assert!(!frame(&app).active);
        assert!(frame(&app).geometry.is_none());
        assert_eq!(frame(&app).generation, 0);
    }

    #[test]
    fn per_frame_inputs_follow_the_source() {
        let mut app = frame_app();
        let mesh = add_mesh(&mut app, triangle());
        let source = spawn_source(&mut app, mesh);
        app.world_mut().resource_mut::<AudioLevel>().set(0.75);
        let moved = GlobalTransform::from_translation(Vec3::new(1.0, 2.0, 3.0));
        app.world_mut().entity_mut(source).insert(moved);

        app.update();

        assert_eq!(frame(&app).audio_level, 0.75);
        assert_eq!(frame(&app).local_to_world, moved.compute_matrix());
        assert_eq!(frame(&app).generation, 1);
    }
}
