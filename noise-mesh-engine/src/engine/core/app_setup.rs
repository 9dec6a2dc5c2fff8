use bevy::asset::AssetMetaCheck;
use bevy::diagnostic::FrameTimeDiagnosticsPlugin;
use bevy::prelude::*;
use constants::render_settings::{DEMO_CAMERA_POSITION, DEMO_SPHERE_SUBDIVISIONS};

use crate::engine::audio::{ActiveAudioTracker, OscillatingLevel};
use crate::engine::camera::{OrbitCamera, orbit_camera_system};
use crate::engine::core::window_config::create_window_config;
use crate::engine::geometry::wireframe::LineStripWireframe;
use crate::engine::plugin::{NoiseMeshPlugin, NoiseMeshSource};

#[cfg(not(target_arch = "wasm32"))]
use crate::engine::systems::fps_tracking::{FpsText, fps_text_update_system};

pub fn create_app() -> App {
    let mut app = App::new();

    app.add_plugins(create_default_plugins())
        .add_plugins(FrameTimeDiagnosticsPlugin::default())
        .add_plugins(NoiseMeshPlugin::default())
        .insert_resource(ActiveAudioTracker(Box::new(OscillatingLevel::default())))
        .add_systems(Startup, setup)
        .add_systems(Update, orbit_camera_system);

    #[cfg(not(target_arch = "wasm32"))]
    {
        app.add_systems(Update, fps_text_update_system);
    }

    app
}

fn spawn_lighting(commands: &mut Commands) {
    commands.spawn((
        DirectionalLight {
            shadows_enabled: true,
            ..default()
        },
        Transform::from_rotation(Quat::from_euler(
            EulerRot::ZYX,
            0.0,
            1.0,
            -std::f32::consts::FRAC_PI_4,
        )),
    ));
}

fn spawn_orbit_camera(commands: &mut Commands) {
    commands.spawn((
        Camera3d::default(),
        Transform::from_translation(DEMO_CAMERA_POSITION).looking_at(Vec3::ZERO, Vec3::Y),
        OrbitCamera::default(),
    ));
}

fn demo_sphere() -> Mesh {
    match Sphere::new(1.0).mesh().ico(DEMO_SPHERE_SUBDIVISIONS) {
        Ok(mesh) => mesh,
        Err(err) => {
            warn!("Icosphere unavailable ({err}), using a UV sphere");
            Sphere::new(1.0).mesh().uv(32, 18)
        }
    }
}

/// The source sphere is shown as a faint line-strip web under the generated geometry.
fn spawn_noise_mesh_source(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
) {
    let mesh = meshes.add(demo_sphere());
    let material = materials.add(StandardMaterial {
        base_color: Color::srgba(0.3, 0.4, 0.5, 1.0),
        unlit: true,
        ..default()
    });

    commands.spawn((
        Mesh3d(mesh.clone()),
        MeshMaterial3d(material),
        LineStripWireframe,
        NoiseMeshSource { mesh },
        Transform::default(),
    ));
}

fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    spawn_lighting(&mut commands);
    spawn_orbit_camera(&mut commands);
    spawn_noise_mesh_source(&mut commands, &mut meshes, &mut materials);

    #[cfg(not(target_arch = "wasm32"))]
    {
        create_native_overlays(&mut commands);
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn create_native_overlays(commands: &mut Commands) {
    commands
        .spawn(Node {
            width: Val::Percent(100.0),
            height: Val::Percent(100.0),
            ..default()
        })
        .with_children(|parent| {
            parent.spawn((
                Text::new("FPS: "),
                TextFont {
                    font_size: 16.0,
                    ..default()
                },
                TextColor(Color::srgb(0.85, 0.95, 1.0)),
                Node {
                    position_type: PositionType::Absolute,
                    bottom: Val::Px(12.0),
                    right: Val::Px(12.0),
                    ..default()
                },
                FpsText,
            ));
        });
}

fn create_default_plugins() -> impl PluginGroup {
    let window_config = WindowPlugin {
        primary_window: Some(create_window_config()),
        ..default()
    };

    let asset_config = AssetPlugin {
        meta_check: AssetMetaCheck::Never,
        ..default()
    };

    DefaultPlugins.set(window_config).set(asset_config)
}
