pub mod driver;
pub mod extraction;
pub mod procedural_draw;

pub use driver::{NoiseMeshDriver, drive_noise_mesh, init_noise_mesh_driver, sync_driver};
pub use extraction::{NoiseMeshFrame, prepare_noise_mesh_frame};
pub use procedural_draw::{
    DrawTarget, NoiseMeshDrawLabel, NoiseMeshDrawNode, NoiseMeshDrawPipeline, NoiseMeshPipelineKey,
    NoiseMeshShadowLabel, NoiseMeshShadowNode, NoiseMeshViewPipelines, queue_noise_mesh_pipelines,
};
