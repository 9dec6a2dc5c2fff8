/// Floats per source vertex: position (3) + uv (2).
pub const SOURCE_VERTEX_FLOATS: usize = 3 + 2;

/// Byte stride of one source vertex record.
pub const SOURCE_VERTEX_STRIDE: u64 = (SOURCE_VERTEX_FLOATS * size_of::<f32>()) as u64;

/// Byte stride of one source index.
pub const SOURCE_INDEX_STRIDE: u64 = size_of::<u32>() as u64;

/// Floats per generated primitive: center (3) + three corners of position (3) + uv (2).
pub const GENERATED_PRIMITIVE_FLOATS: usize = 3 + (3 + 2) * 3;

/// Byte stride of one generated primitive in the append buffer.
pub const GENERATED_PRIMITIVE_STRIDE: u64 = (GENERATED_PRIMITIVE_FLOATS * size_of::<f32>()) as u64;

/// Byte stride of the indirect draw arguments record.
pub const INDIRECT_ARGS_STRIDE: u64 = (4 * size_of::<u32>()) as u64;

/// Byte size of the append counter that sits beside the generated primitives.
pub const APPEND_COUNTER_SIZE: u64 = size_of::<u32>() as u64;

/// Upper bound on primitives a single source triangle may expand into.
/// The output buffer is sized from this, so the expansion program must never exceed it.
pub const MAX_PRIMITIVES_PER_TRIANGLE: u32 = 7;

/// Drawable vertices emitted per generated primitive.
pub const VERTICES_PER_PRIMITIVE: u32 = 3;

/// Indirect args before the first frame: no vertices, one instance, zero offsets.
pub const INITIAL_INDIRECT_ARGS: [u32; 4] = [0, 1, 0, 0];
