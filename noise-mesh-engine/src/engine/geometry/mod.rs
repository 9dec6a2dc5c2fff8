//! CPU-side geometry: source mesh adaptation, bounds maths and the line-strip
//! wireframe helper.

/// Object/world-space bounding boxes and frustum visibility.
pub mod bounds;

/// Adapts a static mesh into uploadable vertex and index arrays.
pub mod source;

/// Line-strip reinterpretation of triangle meshes.
pub mod wireframe;

pub use bounds::Bounds;
pub use source::{SourceGeometry, SourceVertex};
