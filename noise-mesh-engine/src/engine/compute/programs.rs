use crate::engine::gpu::{ComputeProgram, ProgramRole};
use crate::error::ProgramError;
use std::borrow::Cow;

const NOISE_EXPAND_WGSL: &str = include_str!("../../../assets/shaders/noise_expand.wgsl");
const TRI_TO_VERT_WGSL: &str = include_str!("../../../assets/shaders/tri_to_vert.wgsl");

/// The two validated compute programs a driver needs.
#[derive(Debug, Clone)]
pub struct PipelinePrograms {
    pub expansion: ComputeProgram,
    pub arg_derivation: ComputeProgram,
}

impl PipelinePrograms {
    /// Programs shipped with the crate.
    pub fn builtin() -> Result<Self, ProgramError> {
        Self::from_sources(NOISE_EXPAND_WGSL, TRI_TO_VERT_WGSL)
    }

    pub fn from_sources(
        expansion: impl Into<Cow<'static, str>>,
        arg_derivation: impl Into<Cow<'static, str>>,
    ) -> Result<Self, ProgramError> {
        Ok(Self {
            expansion: ComputeProgram::load("noise_expand", ProgramRole::Expansion, expansion)?,
            arg_derivation: ComputeProgram::load(
                "tri_to_vert",
                ProgramRole::ArgDerivation,
                arg_derivation,
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::gpu::reflect::ProgramReflection;
    use constants::{buffer_layout as layout, procedural_shader as shader};

    #[test]
    fn builtin_programs_validate() {
        let programs = PipelinePrograms::builtin().unwrap();
        assert_eq!(programs.expansion.group_width(), 64);
        assert_eq!(programs.arg_derivation.workgroup_size(), [1, 1, 1]);
    }

    #[test]
    fn expansion_shaping_matches_cpu_constants() {
        let reflection = ProgramReflection::parse("noise_expand", NOISE_EXPAND_WGSL).unwrap();
        let float = |name| reflection.constant_f32(name).unwrap_or_else(|| panic!("{name} missing"));
        let uint = |name| reflection.constant_u32(name).unwrap_or_else(|| panic!("{name} missing"));

        assert_eq!(float("NOISE_FREQUENCY"), shader::NOISE_FREQUENCY);
        assert_eq!(float("NOISE_SCROLL_SPEED"), shader::NOISE_SCROLL_SPEED);
        assert_eq!(float("SUBDIVIDE_THRESHOLD"), shader::SUBDIVIDE_THRESHOLD);
        assert_eq!(float("BASE_DISPLACEMENT"), shader::BASE_DISPLACEMENT);
        assert_eq!(float("AUDIO_DISPLACEMENT"), shader::AUDIO_DISPLACEMENT);
        assert_eq!(float("SPIKE_LENGTH"), shader::SPIKE_LENGTH);

        assert_eq!(uint("SOURCE_VERTEX_FLOATS") as usize, layout::SOURCE_VERTEX_FLOATS);
        assert_eq!(uint("PRIMITIVE_FLOATS") as usize, layout::GENERATED_PRIMITIVE_FLOATS);
        assert_eq!(uint("MAX_PRIMITIVES_PER_TRIANGLE"), layout::MAX_PRIMITIVES_PER_TRIANGLE);
    }

    #[test]
    fn draw_shader_reads_the_generated_layout() {
        let source = include_str!("../../../assets/shaders/procedural_draw.wgsl");
        let reflection = ProgramReflection::parse("procedural_draw", source).unwrap();
        assert_eq!(
            reflection.constant_u32("PRIMITIVE_FLOATS").map(|v| v as usize),
            Some(layout::GENERATED_PRIMITIVE_FLOATS)
        );
        assert_eq!(
            reflection.constant_u32("CORNER_FLOATS").map(|v| v as usize),
            Some(layout::SOURCE_VERTEX_FLOATS)
        );
    }

    #[test]
    fn swapped_programs_are_rejected() {
        let result = PipelinePrograms::from_sources(TRI_TO_VERT_WGSL, NOISE_EXPAND_WGSL);
        assert!(matches!(result, Err(ProgramError::MissingBinding { .. })));
    }
}
