//! Error types for pipeline setup.
//!
//! Setup is the only fallible phase: once a driver is ready, per-frame work is
//! infallible and a missing allocation simply skips the frame.

/// Errors raised while reflecting or validating a compute program.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgramError {
    #[error("program `{program}` has no entry point named `{entry_point}`")]
    EntryPointNotFound {
        program: String,
        entry_point: String,
    },

    #[error("entry point `{entry_point}` of program `{program}` is not a compute entry point")]
    NotCompute {
        program: String,
        entry_point: String,
    },

    #[error("program `{program}` does not declare binding `{binding}`")]
    MissingBinding {
        program: String,
        binding: &'static str,
    },

    #[error("binding `{binding}` in program `{program}` does not match the table: {reason}")]
    BindingMismatch {
        program: String,
        binding: &'static str,
        reason: String,
    },

    #[error("program `{program}` declares an invalid workgroup size {size:?}")]
    InvalidWorkgroupSize { program: String, size: [u32; 3] },

    #[error("failed to parse program `{program}`: {reason}")]
    Parse { program: String, reason: String },
}

/// Errors raised while adapting a source mesh into uploadable geometry. They
/// surface when the frame is prepared, before any device work is attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    #[error("mesh has no Float32x3 position attribute")]
    MissingPositions,

    #[error("mesh topology {0} is not a triangle list")]
    UnsupportedTopology(String),

    #[error("index {index} at position {position} is out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        index: u32,
        position: usize,
        vertex_count: usize,
    },
}

/// Fatal setup failures. A driver that hits one stays uninitialized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Program(#[from] ProgramError),

    #[error("failed to allocate buffer `{label}`: {reason}")]
    BufferAllocation { label: &'static str, reason: String },

    #[error("failed to create kernel `{label}`: {reason}")]
    KernelCreation { label: String, reason: String },

    #[error("buffer handle {0} is not live on this device")]
    UnknownBuffer(u32),

    #[error("kernel handle {0} is not loaded on this device")]
    UnknownKernel(u32),

    #[error("kernel `{kernel}` has no slot for binding `{binding}`")]
    UnknownSlot {
        kernel: String,
        binding: &'static str,
    },
}

/// Errors raised while loading pipeline settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
}
