use bevy::prelude::*;
use bevy::render::mesh::PrimitiveTopology;

/// Marker that redraws an entity's mesh as a line strip through its own indices.
#[derive(Component, Default, Clone, Copy)]
pub struct LineStripWireframe;

/// Set once the entity's mesh has been swapped for its line strip.
#[derive(Component, Default, Clone, Copy)]
pub struct LineStripApplied;

/// Same vertices and index order, reinterpreted as a line strip.
pub fn to_line_strip(mesh: &Mesh) -> Mesh {
    let mut wire = Mesh::new(PrimitiveTopology::LineStrip, mesh.asset_usage);
    for (attribute, values) in mesh.attributes() {
        wire.insert_attribute(*attribute, values.clone());
    }
    if let Some(indices) = mesh.indices() {
        wire.insert_indices(indices.clone());
    }
    wire
}

/// Swaps the mesh of marked entities for its line-strip version. Entities whose
/// mesh is still loading are retried every frame until it arrives.
pub fn apply_line_strip_wireframe(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut query: Query<
        (Entity, &mut Mesh3d),
        (With<LineStripWireframe>, Without<LineStripApplied>),
    >,
) {
    for (entity, mut mesh_handle) in &mut query {
        let Some(mesh) = meshes.get(&mesh_handle.0) else {
            continue;
        };
        let wire = to_line_strip(mesh);
        mesh_handle.0 = meshes.add(wire);
        commands.entity(entity).insert(LineStripApplied);
        debug!("Line strip wireframe applied to {entity}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::render::mesh::Indices;
    use bevy::render::render_asset::RenderAssetUsages;

    #[test]
    fn line_strip_keeps_vertices_and_indices() {
        let mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
            .with_inserted_attribute(
                Mesh::ATTRIBUTE_POSITION,
                vec![[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            )
            .with_inserted_indices(Indices::U32(vec![0, 1, 2]));

        let wire = to_line_strip(&mesh);

        assert_eq!(wire.primitive_topology(), PrimitiveTopology::LineStrip);
        assert_eq!(wire.count_vertices(), 3);
        assert!(matches!(wire.indices(), Some(Indices::U32(i)) if i == &vec![0, 1, 2]));
    }

    fn triangle() -> Mesh {
        Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
            .with_inserted_attribute(
                Mesh::ATTRIBUTE_POSITION,
                vec![[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            )
            .with_inserted_indices(Indices::U32(vec![0, 1, 2]))
    }

    fn wireframe_app() -> App {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, AssetPlugin::default()))
            .init_asset::<Mesh>()
            .add_systems(Update, apply_line_strip_wireframe);
        app
    }

    fn topology_of(app: &App, entity: Entity) -> Option<PrimitiveTopology> {
        let handle = &app.world().get::<Mesh3d>(entity)?.0;
        let meshes = app.world().resource::<Assets<Mesh>>();
        meshes.get(handle).map(Mesh::primitive_topology)
    }

    #[test]
    fn loaded_mesh_is_converted_once() {
        let mut app = wireframe_app();
        let handle = app.world_mut().resource_mut::<Assets<Mesh>>().add(triangle());
        let entity = app
            .world_mut()
            .spawn((Mesh3d(handle.clone()), LineStripWireframe))
            .id();

        app.update();
        let converted = app.world().get::<Mesh3d>(entity).unwrap().0.clone();
        assert_ne!(converted, handle);
        assert_eq!(topology_of(&app, entity), Some(PrimitiveTopology::LineStrip));
        assert!(app.world().get::<LineStripApplied>(entity).is_some());

        app.update();
        assert_eq!(app.world().get::<Mesh3d>(entity).unwrap().0, converted);
    }

    #[test]
    fn mesh_arriving_a_frame_late_is_still_converted() {
        let mut app = wireframe_app();
        let handle = app.world_mut().resource_mut::<Assets<Mesh>>().reserve_handle();
        let entity = app
            .world_mut()
            .spawn((Mesh3d(handle.clone()), LineStripWireframe))
            .id();

        app.update();
        assert_eq!(app.world().get::<Mesh3d>(entity).unwrap().0, handle);
        assert!(app.world().get::<LineStripApplied>(entity).is_none());

        let _ = app
            .world_mut()
            .resource_mut::<Assets<Mesh>>()
            .insert(&handle, triangle());
        app.update();

        assert_ne!(app.world().get::<Mesh3d>(entity).unwrap().0, handle);
        assert_eq!(topology_of(&app, entity), Some(PrimitiveTopology::LineStrip));
        assert!(app.world().get::<LineStripApplied>(entity).is_some());
    }
}
