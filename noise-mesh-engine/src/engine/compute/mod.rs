//! The two compute stages run every frame, plus the programs they are built from.

pub mod arg_derivation;
pub mod expansion;
pub mod programs;

pub use arg_derivation::{ArgDerivationStage, IndirectDrawArgs};
pub use expansion::{
    ExpansionFn, ExpansionInputs, ExpansionStage, GeneratedCorner, GeneratedPrimitive,
    expand_triangle,
};
pub use programs::PipelinePrograms;
