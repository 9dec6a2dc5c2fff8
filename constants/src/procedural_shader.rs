/// Entry point every compute program must declare.
pub const KERNEL_ENTRY_POINT: &str = "Main";

/// Bind group all pipeline bindings live in.
pub const BINDING_GROUP: u32 = 0;

// Expansion program bindings.
pub const SOURCE_VERTICES: &str = "_SourceVertices";
pub const SOURCE_TRIANGLES: &str = "_SourceTriangles";
pub const DRAW_TRIANGLES: &str = "_DrawTriangles";
pub const DRAW_TRIANGLES_COUNTER: &str = "_DrawTrianglesCounter";
pub const NUM_SOURCE_TRIANGLES: &str = "_NumSourceTriangles";
pub const AUDIO_LEVEL: &str = "_AudioLevel";
pub const TIME: &str = "_Time";
pub const LOCAL_TO_WORLD: &str = "_LocalToWorld";

// Argument derivation program bindings.
pub const INDIRECT_ARGS_BUFFER: &str = "_IndirectArgsBuffer";

/// Shader asset used for the indirect draw, relative to the asset root.
pub const PROCEDURAL_DRAW_SHADER_PATH: &str = "shaders/procedural_draw.wgsl";

// Expansion shaping, mirrored by `noise_expand.wgsl`.

/// World-space frequency of the value noise sampled at each triangle centroid.
pub const NOISE_FREQUENCY: f32 = 4.0;

/// Noise lattice units scrolled per second of `_Time`.
pub const NOISE_SCROLL_SPEED: f32 = 0.5;

/// Noise above this splits a triangle into its four midpoint sub-triangles.
pub const SUBDIVIDE_THRESHOLD: f32 = 0.6;

/// Displacement along the face normal is `noise * (BASE + AUDIO * level)`.
pub const BASE_DISPLACEMENT: f32 = 0.05;
pub const AUDIO_DISPLACEMENT: f32 = 0.45;

/// Spike height above the centroid per unit of audio level.
pub const SPIKE_LENGTH: f32 = 0.25;
