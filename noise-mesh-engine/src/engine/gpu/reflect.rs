//! Load-time reflection of WGSL programs through naga's WGSL front end.
//!
//! Only what the pipeline validates is kept: entry points with their stage and
//! evaluated workgroup size, module-scope resource bindings with their address
//! space and declared type, and scalar module constants.

use crate::error::ProgramError;
use naga::{Expression, Literal, Module, Scalar, StorageAccess, TypeInner, VectorSize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Compute,
    Vertex,
    Fragment,
    Other,
}

impl From<naga::ShaderStage> for ShaderStage {
    fn from(stage: naga::ShaderStage) -> Self {
        if stage == naga::ShaderStage::Compute {
            Self::Compute
        } else if stage == naga::ShaderStage::Vertex {
            Self::Vertex
        } else if stage == naga::ShaderStage::Fragment {
            Self::Fragment
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub name: String,
    pub stage: ShaderStage,
    /// Always `[1, 1, 1]` for non-compute stages.
    pub workgroup_size: [u32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSpace {
    Uniform,
    Storage { read_write: bool },
    /// Textures, samplers and anything else bound without a buffer address space.
    Handle,
}

/// The declared type of a binding, reduced to what slot validation distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredType {
    U32,
    F32,
    Mat4x4F32,
    AtomicU32,
    Array,
    Struct,
    Other,
}

impl DeclaredType {
    fn of(module: &Module, ty: naga::Handle<naga::Type>) -> Self {
        match &module.types[ty].inner {
            TypeInner::Scalar(scalar) if *scalar == Scalar::U32 => Self::U32,
            TypeInner::Scalar(scalar) if *scalar == Scalar::F32 => Self::F32,
            TypeInner::Matrix {
                columns: VectorSize::Quad,
                rows: VectorSize::Quad,
                scalar,
            } if *scalar == Scalar::F32 => Self::Mat4x4F32,
            TypeInner::Atomic(scalar) if *scalar == Scalar::U32 => Self::AtomicU32,
            TypeInner::Array { .. } => Self::Array,
            TypeInner::Struct { .. } => Self::Struct,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalBinding {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub space: AddressSpace,
    pub ty: DeclaredType,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstantValue {
    U32(u32),
    I32(i32),
    F32(f32),
    Bool(bool),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramReflection {
    pub entry_points: Vec<EntryPoint>,
    pub bindings: Vec<GlobalBinding>,
    pub constants: HashMap<String, ConstantValue>,
}

impl ProgramReflection {
    pub fn parse(label: &str, source: &str) -> Result<Self, ProgramError> {
        let module = naga::front::wgsl::parse_str(source).map_err(|err| ProgramError::Parse {
            program: label.to_string(),
            reason: err.emit_to_string(source),
        })?;
        Ok(Self::from_module(&module))
    }

    fn from_module(module: &Module) -> Self {
        let entry_points = module
            .entry_points
            .iter()
            .map(|entry| {
                let stage = ShaderStage::from(entry.stage);
                EntryPoint {
                    name: entry.name.clone(),
                    stage,
                    workgroup_size: if stage == ShaderStage::Compute {
                        entry.workgroup_size
                    } else {
                        [1, 1, 1]
                    },
                }
            })
            .collect();

        let bindings = module
            .global_variables
            .iter()
            .filter_map(|(_, global)| {
                let name = global.name.clone()?;
                let resource = global.binding.as_ref()?;
                let space = match global.space {
                    naga::AddressSpace::Uniform => AddressSpace::Uniform,
                    naga::AddressSpace::Storage { access } => AddressSpace::Storage {
                        read_write: access.contains(StorageAccess::STORE),
                    },
                    naga::AddressSpace::Handle => AddressSpace::Handle,
                    _ => return None,
                };
                Some(GlobalBinding {
                    name,
                    group: resource.group,
                    binding: resource.binding,
                    space,
                    ty: DeclaredType::of(module, global.ty),
                })
            })
            .collect();

        let constants = module
            .constants
            .iter()
            .filter_map(|(_, constant)| {
                let name = constant.name.clone()?;
                let value = match &module.global_expressions[constant.init] {
                    Expression::Literal(Literal::U32(v)) => ConstantValue::U32(*v),
                    Expression::Literal(Literal::I32(v)) => ConstantValue::I32(*v),
                    Expression::Literal(Literal::F32(v)) => ConstantValue::F32(*v),
                    Expression::Literal(Literal::Bool(v)) => ConstantValue::Bool(*v),
                    _ => return None,
                };
                Some((name, value))
            })
            .collect();

        Self {
            entry_points,
            bindings,
            constants,
        }
    }

    pub fn entry_point(&self, name: &str) -> Option<&EntryPoint> {
        self.entry_points.iter().find(|e| e.name == name)
    }

    pub fn binding(&self, name: &str) -> Option<&GlobalBinding> {
        self.bindings.iter().find(|b| b.name == name)
    }

    pub fn constant(&self, name: &str) -> Option<ConstantValue> {
        self.constants.get(name).copied()
    }

    pub fn constant_f32(&self, name: &str) -> Option<f32> {
        match self.constant(name)? {
            ConstantValue::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn constant_u32(&self, name: &str) -> Option<u32> {
        match self.constant(name)? {
            ConstantValue::U32(v) => Some(v),
            _ => None,
        }
    }
}
