//! Symbolic binding names and the typed slot tables each program must satisfy.

use super::reflect::{AddressSpace, DeclaredType, ProgramReflection};
use crate::error::ProgramError;
use constants::procedural_shader as symbols;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingName {
    SourceVertices,
    SourceTriangles,
    DrawTriangles,
    DrawTrianglesCounter,
    NumSourceTriangles,
    AudioLevel,
    Time,
    LocalToWorld,
    IndirectArgsBuffer,
}

impl BindingName {
    /// Identifier the WGSL program declares for this binding.
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::SourceVertices => symbols::SOURCE_VERTICES,
            Self::SourceTriangles => symbols::SOURCE_TRIANGLES,
            Self::DrawTriangles => symbols::DRAW_TRIANGLES,
            Self::DrawTrianglesCounter => symbols::DRAW_TRIANGLES_COUNTER,
            Self::NumSourceTriangles => symbols::NUM_SOURCE_TRIANGLES,
            Self::AudioLevel => symbols::AUDIO_LEVEL,
            Self::Time => symbols::TIME,
            Self::LocalToWorld => symbols::LOCAL_TO_WORLD,
            Self::IndirectArgsBuffer => symbols::INDIRECT_ARGS_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    StorageRead,
    StorageReadWrite,
    /// Atomic counter paired with the append target bound in the same program.
    AppendCounter,
    UniformU32,
    UniformF32,
    UniformMat4,
}

impl SlotKind {
    pub fn is_uniform(self) -> bool {
        matches!(self, Self::UniformU32 | Self::UniformF32 | Self::UniformMat4)
    }

    /// Byte size of the uniform value, `None` for buffer slots.
    pub fn uniform_size(self) -> Option<u64> {
        match self {
            Self::UniformU32 | Self::UniformF32 => Some(4),
            Self::UniformMat4 => Some(64),
            _ => None,
        }
    }

    fn check(self, space: AddressSpace, ty: DeclaredType) -> Result<(), String> {
        let read_write = AddressSpace::Storage { read_write: true };
        let expected = match self {
            Self::StorageRead => space == AddressSpace::Storage { read_write: false },
            Self::StorageReadWrite => space == read_write,
            Self::AppendCounter => space == read_write && ty == DeclaredType::AtomicU32,
            Self::UniformU32 => space == AddressSpace::Uniform && ty == DeclaredType::U32,
            Self::UniformF32 => space == AddressSpace::Uniform && ty == DeclaredType::F32,
            Self::UniformMat4 => space == AddressSpace::Uniform && ty == DeclaredType::Mat4x4F32,
        };
        if expected {
            Ok(())
        } else {
            Err(format!("expected {self:?}, found {space:?} {ty:?}"))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingSlot {
    pub name: BindingName,
    pub binding: u32,
    pub kind: SlotKind,
}

const fn slot(name: BindingName, binding: u32, kind: SlotKind) -> BindingSlot {
    BindingSlot {
        name,
        binding,
        kind,
    }
}

/// Slots of the expansion program, all in group 0.
pub const EXPANSION_BINDINGS: &[BindingSlot] = &[
    slot(BindingName::SourceVertices, 0, SlotKind::StorageRead),
    slot(BindingName::SourceTriangles, 1, SlotKind::StorageRead),
    slot(BindingName::DrawTriangles, 2, SlotKind::StorageReadWrite),
    slot(BindingName::DrawTrianglesCounter, 3, SlotKind::AppendCounter),
    slot(BindingName::NumSourceTriangles, 4, SlotKind::UniformU32),
    slot(BindingName::AudioLevel, 5, SlotKind::UniformF32),
    slot(BindingName::Time, 6, SlotKind::UniformF32),
    slot(BindingName::LocalToWorld, 7, SlotKind::UniformMat4),
];

/// Slots of the argument derivation program, all in group 0.
pub const ARG_DERIVATION_BINDINGS: &[BindingSlot] = &[slot(
    BindingName::IndirectArgsBuffer,
    0,
    SlotKind::StorageReadWrite,
)];

pub fn find_slot(table: &[BindingSlot], name: BindingName) -> Option<&BindingSlot> {
    table.iter().find(|s| s.name == name)
}

/// Checks that every slot of `table` is declared by the program with the
/// expected group, binding index, address space and type.
pub fn validate_table(
    program: &str,
    table: &[BindingSlot],
    reflection: &ProgramReflection,
) -> Result<(), ProgramError> {
    for slot in table {
        let symbol = slot.name.symbol();
        let declared = reflection
            .binding(symbol)
            .ok_or_else(|| ProgramError::MissingBinding {
                program: program.to_string(),
                binding: symbol,
            })?;

        let mismatch = |reason: String| ProgramError::BindingMismatch {
            program: program.to_string(),
            binding: symbol,
            reason,
        };

        if declared.group != symbols::BINDING_GROUP || declared.binding != slot.binding {
            return Err(mismatch(format!(
                "expected @group({}) @binding({}), found @group({}) @binding({})",
                symbols::BINDING_GROUP,
                slot.binding,
                declared.group,
                declared.binding
            )));
        }
        slot.kind.check(declared.space, declared.ty).map_err(mismatch)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reflect(source: &str) -> ProgramReflection {
        ProgramReflection::parse("test", source).unwrap()
    }

    #[test]
    fn symbols_keep_their_engine_names() {
        assert_eq!(BindingName::SourceVertices.symbol(), "_SourceVertices");
        assert_eq!(BindingName::LocalToWorld.symbol(), "_LocalToWorld");
        assert_eq!(BindingName::IndirectArgsBuffer.symbol(), "_IndirectArgsBuffer");
    }

    #[test]
    fn matching_declaration_validates() {
        let reflection = reflect(
            "@group(0) @binding(0) var<storage, read_write> _IndirectArgsBuffer: array<u32>;",
        );
        assert_eq!(validate_table("args", ARG_DERIVATION_BINDINGS, &reflection), Ok(()));
    }

    #[test]
    fn missing_declaration_is_reported_by_symbol() {
        let reflection = reflect("@group(0) @binding(0) var<storage, read_write> _Other: array<u32>;");
        assert_eq!(
            validate_table("args", ARG_DERIVATION_BINDINGS, &reflection),
            Err(ProgramError::MissingBinding {
                program: "args".into(),
                binding: "_IndirectArgsBuffer",
            })
        );
    }

    #[test]
    fn wrong_slot_index_is_a_mismatch() {
        let reflection = reflect(
            "@group(0) @binding(3) var<storage, read_write> _IndirectArgsBuffer: array<u32>;",
        );
        assert!(matches!(
            validate_table("args", ARG_DERIVATION_BINDINGS, &reflection),
            Err(ProgramError::BindingMismatch { .. })
        ));
    }

    #[test]
    fn read_only_storage_cannot_fill_a_read_write_slot() {
        let reflection =
            reflect("@group(0) @binding(0) var<storage, read> _IndirectArgsBuffer: array<u32>;");
        assert!(matches!(
            validate_table("args", ARG_DERIVATION_BINDINGS, &reflection),
            Err(ProgramError::BindingMismatch { .. })
        ));
    }

    #[test]
    fn uniform_types_are_checked() {
        let read_write = AddressSpace::Storage { read_write: true };
        assert!(SlotKind::UniformMat4.check(AddressSpace::Uniform, DeclaredType::Mat4x4F32).is_ok());
        assert!(SlotKind::UniformF32.check(AddressSpace::Uniform, DeclaredType::U32).is_err());
        assert!(SlotKind::AppendCounter.check(read_write, DeclaredType::AtomicU32).is_ok());
        assert!(SlotKind::AppendCounter.check(read_write, DeclaredType::U32).is_err());
    }

    #[test]
    fn shorthand_matrix_alias_satisfies_a_matrix_slot() {
        let reflection = reflect(
            "@group(0) @binding(7) var<uniform> _LocalToWorld: mat4x4f;",
        );
        let declared = reflection.binding("_LocalToWorld").unwrap();
        assert_eq!(declared.ty, DeclaredType::Mat4x4F32);
        assert!(SlotKind::UniformMat4.check(declared.space, declared.ty).is_ok());
    }

    #[test]
    fn counter_declared_through_an_alias_is_accepted() {
        let reflection = reflect(
            "alias Counter = atomic<u32>;\n\
             @group(0) @binding(0) var<storage, read_write> _DrawTrianglesCounter: Counter;",
        );
        let declared = reflection.binding("_DrawTrianglesCounter").unwrap();
        assert!(SlotKind::AppendCounter.check(declared.space, declared.ty).is_ok());
    }
}
