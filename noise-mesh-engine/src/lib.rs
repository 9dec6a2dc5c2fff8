//! GPU procedural mesh pipeline: a static source mesh is expanded every frame
//! by a compute program into an append buffer, the live count becomes
//! indirect draw arguments on the device, and the result is drawn without
//! reading anything back.

pub mod engine;
pub mod error;
pub mod settings;

pub use engine::audio::AudioLevel;
pub use engine::frame_driver::{DriverState, FrameDriver, FrameInputs, FrameStats};
pub use engine::geometry::{Bounds, SourceGeometry, SourceVertex};
pub use engine::plugin::{NoiseMeshPlugin, NoiseMeshSource};
pub use error::{GeometryError, ProgramError, SettingsError, SetupError};
pub use settings::{DrawTopology, PipelineSettings, TimeSource, UvMode};
