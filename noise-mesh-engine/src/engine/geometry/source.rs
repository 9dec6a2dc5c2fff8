use super::bounds::Bounds;
use crate::error::GeometryError;
use crate::settings::UvMode;
use bevy::prelude::*;
use bevy::render::mesh::{Indices, PrimitiveTopology, VertexAttributeValues};
use bytemuck::{Pod, Zeroable};
use constants::buffer_layout::{MAX_PRIMITIVES_PER_TRIANGLE, SOURCE_VERTEX_STRIDE};

/// One uploaded vertex. Layout must match `_SourceVertices` in `noise_expand.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SourceVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

const _: () = assert!(size_of::<SourceVertex>() as u64 == SOURCE_VERTEX_STRIDE);

/// CPU-side copy of a static mesh, ready for one-time upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceGeometry {
    vertices: Vec<SourceVertex>,
    indices: Vec<u32>,
    bounds: Bounds,
}

impl SourceGeometry {
    /// Builds geometry from raw arrays.
    ///
    /// `uvs` is only read in [`UvMode::FromMesh`]; entries past its end are zero.
    pub fn from_arrays(
        positions: &[[f32; 3]],
        uvs: &[[f32; 2]],
        indices: &[u32],
        uv_mode: UvMode,
    ) -> Result<Self, GeometryError> {
        if let Some((position, &index)) = indices
            .iter()
            .enumerate()
            .find(|&(_, &index)| index as usize >= positions.len())
        {
            return Err(GeometryError::IndexOutOfRange {
                index,
                position,
                vertex_count: positions.len(),
            });
        }

        let vertices = positions
            .iter()
            .enumerate()
            .map(|(i, &position)| SourceVertex {
                position,
                uv: match uv_mode {
                    UvMode::Zeroed => [0.0, 0.0],
                    UvMode::FromMesh => uvs.get(i).copied().unwrap_or_default(),
                },
            })
            .collect();

        Ok(Self {
            vertices,
            indices: indices.to_vec(),
            bounds: Bounds::from_points(positions),
        })
    }

    /// Extracts positions, UVs and triangle indices from a Bevy triangle-list mesh.
    /// A mesh without an index buffer is treated as sequentially indexed.
    pub fn from_mesh(mesh: &Mesh, uv_mode: UvMode) -> Result<Self, GeometryError> {
        if mesh.primitive_topology() != PrimitiveTopology::TriangleList {
            return Err(GeometryError::UnsupportedTopology(format!(
                "{:?}",
                mesh.primitive_topology()
            )));
        }

        let Some(VertexAttributeValues::Float32x3(positions)) =
            mesh.attribute(Mesh::ATTRIBUTE_POSITION)
        else {
            return Err(GeometryError::MissingPositions);
        };

        let uvs = match mesh.attribute(Mesh::ATTRIBUTE_UV_0) {
            Some(VertexAttributeValues::Float32x2(uvs)) => uvs.as_slice(),
            _ => &[],
        };

        let indices: Vec<u32> = match mesh.indices() {
            Some(Indices::U16(indices)) => indices.iter().map(|&i| i as u32).collect(),
            Some(Indices::U32(indices)) => indices.clone(),
            None => (0..positions.len() as u32).collect(),
        };

        Self::from_arrays(positions, uvs, &indices, uv_mode)
    }

    pub fn vertices(&self) -> &[SourceVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Whole triangles only; trailing indices are ignored.
    pub fn triangle_count(&self) -> u32 {
        self.index_count() / 3
    }

    /// Generated primitives the output buffer must hold.
    pub fn output_capacity(&self) -> u32 {
        self.triangle_count() * MAX_PRIMITIVES_PER_TRIANGLE
    }

    /// Object-space bounds of the source positions.
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.triangle_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::render::render_asset::RenderAssetUsages;

    fn quad_positions() -> Vec<[f32; 3]> {
        vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ]
    }

    fn quad_uvs() -> Vec<[f32; 2]> {
        vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]
    }

    fn quad_mesh() -> Mesh {
        Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
            .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, quad_positions())
            .with_inserted_attribute(Mesh::ATTRIBUTE_UV_0, quad_uvs())
            .with_inserted_indices(Indices::U16(vec![0, 1, 2, 0, 2, 3]))
    }

    #[test]
    fn zeroed_uv_mode_discards_mesh_uvs() {
        let geometry = SourceGeometry::from_mesh(&quad_mesh(), UvMode::Zeroed).unwrap();
        assert_eq!(geometry.vertex_count(), 4);
        assert!(geometry.vertices().iter().all(|v| v.uv == [0.0, 0.0]));
    }

    #[test]
    fn from_mesh_uv_mode_copies_uvs() {
        let geometry = SourceGeometry::from_mesh(&quad_mesh(), UvMode::FromMesh).unwrap();
        assert_eq!(geometry.vertices()[2].uv, [1.0, 1.0]);
        assert_eq!(geometry.vertices()[2].position, [1.0, 1.0, 0.0]);
    }

    #[test]
    fn short_uv_array_falls_back_to_zero() {
        let geometry =
            SourceGeometry::from_arrays(&quad_positions(), &[[0.5, 0.5]], &[0, 1, 2], UvMode::FromMesh)
                .unwrap();
        assert_eq!(geometry.vertices()[0].uv, [0.5, 0.5]);
        assert_eq!(geometry.vertices()[3].uv, [0.0, 0.0]);
    }

    #[test]
    fn u16_indices_are_widened_and_counted() {
        let geometry = SourceGeometry::from_mesh(&quad_mesh(), UvMode::Zeroed).unwrap();
        assert_eq!(geometry.indices(), &[0, 1, 2, 0, 2, 3]);
        assert_eq!(geometry.triangle_count(), 2);
        assert_eq!(geometry.output_capacity(), 14);
    }

    #[test]
    fn unindexed_mesh_gets_sequential_indices() {
        let mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
            .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, quad_positions()[..3].to_vec());
        let geometry = SourceGeometry::from_mesh(&mesh, UvMode::Zeroed).unwrap();
        assert_eq!(geometry.indices(), &[0, 1, 2]);
    }

    #[test]
    fn bounds_cover_positions() {
        let geometry = SourceGeometry::from_mesh(&quad_mesh(), UvMode::Zeroed).unwrap();
        assert_eq!(geometry.bounds().min(), Vec3::ZERO);
        assert_eq!(geometry.bounds().max(), Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn line_meshes_are_rejected() {
        let mesh = Mesh::new(PrimitiveTopology::LineList, RenderAssetUsages::default())
            .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, quad_positions());
        assert!(matches!(
            SourceGeometry::from_mesh(&mesh, UvMode::Zeroed),
            Err(GeometryError::UnsupportedTopology(_))
        ));
    }

    #[test]
    fn mesh_without_positions_is_rejected() {
        let mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
        assert_eq!(
            SourceGeometry::from_mesh(&mesh, UvMode::Zeroed),
            Err(GeometryError::MissingPositions)
        );
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let result = SourceGeometry::from_arrays(&quad_positions(), &[], &[0, 1, 9], UvMode::Zeroed);
        assert_eq!(
            result,
            Err(GeometryError::IndexOutOfRange {
                index: 9,
                position: 2,
                vertex_count: 4,
            })
        );
    }

    #[test]
    fn trailing_indices_do_not_form_a_triangle() {
        let geometry =
            SourceGeometry::from_arrays(&quad_positions(), &[], &[0, 1, 2, 3, 0], UvMode::Zeroed)
                .unwrap();
        assert_eq!(geometry.index_count(), 5);
        assert_eq!(geometry.triangle_count(), 1);
    }

    #[test]
    fn empty_geometry_is_a_valid_no_op() {
        let geometry = SourceGeometry::from_arrays(&[], &[], &[], UvMode::Zeroed).unwrap();
        assert!(geometry.is_empty());
        assert_eq!(geometry.output_capacity(), 0);
        assert_eq!(geometry.bounds(), Bounds::default());
    }
}
