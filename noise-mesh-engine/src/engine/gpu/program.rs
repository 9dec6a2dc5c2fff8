use super::bindings::{
    ARG_DERIVATION_BINDINGS, BindingName, BindingSlot, EXPANSION_BINDINGS, find_slot,
    validate_table,
};
use super::reflect::{ProgramReflection, ShaderStage};
use crate::error::ProgramError;
use constants::procedural_shader::KERNEL_ENTRY_POINT;
use std::borrow::Cow;

/// Which half of the pipeline a program implements. Decides its binding table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramRole {
    Expansion,
    ArgDerivation,
}

impl ProgramRole {
    pub fn bindings(self) -> &'static [BindingSlot] {
        match self {
            Self::Expansion => EXPANSION_BINDINGS,
            Self::ArgDerivation => ARG_DERIVATION_BINDINGS,
        }
    }
}

/// A WGSL compute program whose entry point and bindings passed validation.
#[derive(Debug, Clone)]
pub struct ComputeProgram {
    label: String,
    role: ProgramRole,
    source: Cow<'static, str>,
    workgroup_size: [u32; 3],
}

impl ComputeProgram {
    /// Reflects `source`, requires a compute entry point named `Main` with a
    /// non-zero workgroup size, and validates the role's binding table.
    pub fn load(
        label: impl Into<String>,
        role: ProgramRole,
        source: impl Into<Cow<'static, str>>,
    ) -> Result<Self, ProgramError> {
        let label = label.into();
        let source = source.into();
        let reflection = ProgramReflection::parse(&label, &source)?;

        let entry = reflection
            .entry_point(KERNEL_ENTRY_POINT)
            .ok_or_else(|| ProgramError::EntryPointNotFound {
                program: label.clone(),
                entry_point: KERNEL_ENTRY_POINT.to_string(),
            })?;

        if entry.stage != ShaderStage::Compute {
            return Err(ProgramError::NotCompute {
                program: label,
                entry_point: KERNEL_ENTRY_POINT.to_string(),
            });
        }

        if entry.workgroup_size.contains(&0) {
            return Err(ProgramError::InvalidWorkgroupSize {
                program: label,
                size: entry.workgroup_size,
            });
        }

        validate_table(&label, role.bindings(), &reflection)?;

        Ok(Self {
            workgroup_size: entry.workgroup_size,
            label,
            role,
            source,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn role(&self) -> ProgramRole {
        self.role
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn entry_point(&self) -> &'static str {
        KERNEL_ENTRY_POINT
    }

    pub fn workgroup_size(&self) -> [u32; 3] {
        self.workgroup_size
    }

    /// Invocations per workgroup along x, the axis triangles are spread over.
    pub fn group_width(&self) -> u32 {
        self.workgroup_size[0]
    }

    pub fn bindings(&self) -> &'static [BindingSlot] {
        self.role.bindings()
    }

    pub fn slot(&self, name: BindingName) -> Option<&'static BindingSlot> {
        find_slot(self.role.bindings(), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARGS_SOURCE: &str = r#"
        @group(0) @binding(0) var<storage, read_write> _IndirectArgsBuffer: array<u32>;
        @compute @workgroup_size(1)
        fn Main() { _IndirectArgsBuffer[0] = _IndirectArgsBuffer[0] * 3u; }
    "#;

    #[test]
    fn valid_program_loads_with_group_width() {
        let program = ComputeProgram::load("args", ProgramRole::ArgDerivation, ARGS_SOURCE).unwrap();
        assert_eq!(program.group_width(), 1);
        assert_eq!(program.workgroup_size(), [1, 1, 1]);
        assert!(program.slot(BindingName::IndirectArgsBuffer).is_some());
        assert!(program.slot(BindingName::Time).is_none());
    }

    #[test]
    fn renamed_entry_point_is_fatal() {
        let source = ARGS_SOURCE.replace("fn Main", "fn main");
        let result = ComputeProgram::load("args", ProgramRole::ArgDerivation, source);
        assert!(matches!(result, Err(ProgramError::EntryPointNotFound { .. })));
    }

    #[test]
    fn vertex_main_is_not_a_kernel() {
        let source = r#"
            @group(0) @binding(0) var<storage, read_write> _IndirectArgsBuffer: array<u32>;
            @vertex
            fn Main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }
        "#;
        let result = ComputeProgram::load("args", ProgramRole::ArgDerivation, source);
        assert!(matches!(result, Err(ProgramError::NotCompute { .. })));
    }

    #[test]
    fn zero_workgroup_size_is_rejected() {
        let source = ARGS_SOURCE.replace("@workgroup_size(1)", "@workgroup_size(0)");
        let result = ComputeProgram::load("args", ProgramRole::ArgDerivation, source);
        assert!(matches!(
            result,
            Err(ProgramError::InvalidWorkgroupSize { .. } | ProgramError::Parse { .. })
        ));
    }

    #[test]
    fn workgroup_size_expression_sets_group_width() {
        let source = ARGS_SOURCE
            .replace("@workgroup_size(1)", "@workgroup_size(GROUP_WIDTH * 2)")
            .replace("@group(0)", "const GROUP_WIDTH: u32 = 32u;\n@group(0)");
        let program = ComputeProgram::load("args", ProgramRole::ArgDerivation, source).unwrap();
        assert_eq!(program.group_width(), 64);
    }

    #[test]
    fn wrong_role_fails_binding_validation() {
        let result = ComputeProgram::load("args", ProgramRole::Expansion, ARGS_SOURCE);
        assert!(matches!(result, Err(ProgramError::MissingBinding { .. })));
    }
}
