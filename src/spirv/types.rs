use std::fmt;

use super::asm::{Dim, ParameterModifiers, StorageClass};

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ScalarType {
    Bool,
    /// (width, signedness)
    Int(u32, bool),
    Float(u32),
}
impl ScalarType {
    pub const fn of_vector(self, count: VectorSize) -> VectorType {
        VectorType(self, count)
    }

    pub const fn is_floating(&self) -> bool {
        matches!(self, Self::Float(_))
    }
}

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum VectorSize {
    Two = 2,
    Three = 3,
    Four = 4,
}
impl VectorSize {
    #[inline(always)]
    pub const fn count(self) -> u8 {
        self as _
    }
}
impl TryFrom<u32> for VectorSize {
    type Error = u32;

    #[inline]
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            4 => Ok(Self::Four),
            _ => Err(value),
        }
    }
}
impl From<VectorSize> for u32 {
    #[inline(always)]
    fn from(value: VectorSize) -> Self {
        value as _
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct VectorType(pub ScalarType, pub VectorSize);
impl VectorType {
    pub const fn element_type(&self) -> &ScalarType {
        &self.0
    }

    pub const fn element_count(&self) -> VectorSize {
        self.1
    }
}

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum MatrixColumnCount {
    Two = 2,
    Three = 3,
    Four = 4,
}
impl MatrixColumnCount {
    #[inline(always)]
    pub const fn count(self) -> u8 {
        self as _
    }
}
impl TryFrom<u32> for MatrixColumnCount {
    type Error = u32;

    #[inline]
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            4 => Ok(Self::Four),
            _ => Err(value),
        }
    }
}

/// Which of the stage-local stream structs a placeholder stands for.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum StreamsKind {
    Streams,
    Input,
    Output,
    Constants,
}
impl StreamsKind {
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Streams => "STREAMS",
            Self::Input => "INPUT",
            Self::Output => "OUTPUT",
            Self::Constants => "CONSTANTS",
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum PatchKind {
    /// `InputPatch<T, N>`
    Input,
    /// `OutputPatch<T, N>`
    Output,
}

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct TypeStructMember {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct FunctionParameter {
    pub ty: Type,
    pub modifiers: ParameterModifiers,
}

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct PointerType {
    pub storage_class: StorageClass,
    pub base: Type,
}

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Type {
    Void,
    Scalar(ScalarType),
    Vector(ScalarType, VectorSize),
    Matrix(VectorType, MatrixColumnCount),
    Image {
        sampled_type: ScalarType,
        dim: Dim,
        arrayed: bool,
        multisampled: bool,
    },
    Sampler,
    Array {
        element_type: Box<Type>,
        length: u32,
    },
    RuntimeArray {
        element_type: Box<Type>,
    },
    Struct {
        name: String,
        member_types: Vec<TypeStructMember>,
    },
    Pointer(Box<PointerType>),
    Function {
        return_type: Box<Type>,
        parameters: Vec<FunctionParameter>,
    },
    /// Tessellation control point patch (`InputPatch`/`OutputPatch`).
    Patch {
        kind: PatchKind,
        base: Box<Type>,
        size: u32,
    },
    /// Geometry shader output stream parameter.
    OutputStream {
        base: Box<Type>,
    },
    /// Stage-agnostic stream struct, resolved to `<STAGE>_<KIND>` during linking.
    Streams(StreamsKind),
}
impl From<ScalarType> for Type {
    fn from(value: ScalarType) -> Self {
        Self::Scalar(value)
    }
}
impl From<VectorType> for Type {
    fn from(value: VectorType) -> Self {
        Self::Vector(value.0, value.1)
    }
}
impl From<PointerType> for Type {
    #[inline(always)]
    fn from(value: PointerType) -> Self {
        Self::Pointer(Box::new(value))
    }
}
impl Type {
    #[inline(always)]
    pub const fn bool() -> Self {
        Self::Scalar(ScalarType::Bool)
    }

    #[inline(always)]
    pub const fn sint(width: u32) -> Self {
        Self::Scalar(ScalarType::Int(width, true))
    }

    #[inline(always)]
    pub const fn uint(width: u32) -> Self {
        Self::Scalar(ScalarType::Int(width, false))
    }

    #[inline(always)]
    pub const fn float(width: u32) -> Self {
        Self::Scalar(ScalarType::Float(width))
    }

    /// Widens a scalar to a vector; a count of 1 leaves the type unchanged.
    #[inline(always)]
    pub fn of_vector(self, component_count: u32) -> Self {
        match (self, VectorSize::try_from(component_count)) {
            (Self::Scalar(x), Ok(n)) => Self::Vector(x, n),
            (x, _) => x,
        }
    }

    #[inline(always)]
    pub fn of_array(self, length: u32) -> Self {
        Self::Array {
            element_type: Box::new(self),
            length,
        }
    }

    #[inline(always)]
    pub fn of_pointer(self, storage: StorageClass) -> PointerType {
        PointerType {
            storage_class: storage,
            base: self,
        }
    }

    #[inline(always)]
    pub fn pointer_to(self, storage: StorageClass) -> Self {
        self.of_pointer(storage).into()
    }

    pub fn dereferenced(&self) -> Option<&Self> {
        match self {
            Self::Pointer(p) => Some(&p.base),
            _ => None,
        }
    }

    pub fn storage_class(&self) -> Option<StorageClass> {
        match self {
            Self::Pointer(p) => Some(p.storage_class),
            _ => None,
        }
    }

    /// Scalar element of a scalar, vector or matrix type.
    pub fn scalar_element(&self) -> Option<&ScalarType> {
        match self {
            Self::Scalar(x) | Self::Vector(x, _) => Some(x),
            Self::Matrix(v, _) => Some(v.element_type()),
            _ => None,
        }
    }

    /// Directly nested types.
    pub fn component_types(&self) -> Vec<Type> {
        match self {
            Self::Vector(s, _) => vec![Self::Scalar(*s)],
            Self::Matrix(c, _) => vec![(*c).into()],
            Self::Image { sampled_type, .. } => vec![Self::Scalar(*sampled_type)],
            Self::Array { element_type, .. } | Self::RuntimeArray { element_type } => {
                vec![(**element_type).clone()]
            }
            Self::Struct { member_types, .. } => {
                member_types.iter().map(|m| m.ty.clone()).collect()
            }
            Self::Pointer(p) => vec![p.base.clone()],
            Self::Function {
                return_type,
                parameters,
            } => std::iter::once((**return_type).clone())
                .chain(parameters.iter().map(|p| p.ty.clone()))
                .collect(),
            Self::Patch { base, .. } | Self::OutputStream { base } => vec![(**base).clone()],
            Self::Void | Self::Scalar(_) | Self::Sampler | Self::Streams(_) => Vec::new(),
        }
    }

    pub fn contains_streams_placeholder(&self) -> bool {
        match self {
            Self::Streams(_) => true,
            Self::Array { element_type, .. } | Self::RuntimeArray { element_type } => {
                element_type.contains_streams_placeholder()
            }
            Self::Pointer(p) => p.base.contains_streams_placeholder(),
            Self::Patch { base, .. } | Self::OutputStream { base } => {
                base.contains_streams_placeholder()
            }
            Self::Function {
                return_type,
                parameters,
            } => {
                return_type.contains_streams_placeholder()
                    || parameters.iter().any(|p| p.ty.contains_streams_placeholder())
            }
            Self::Struct { member_types, .. } => member_types
                .iter()
                .any(|m| m.ty.contains_streams_placeholder()),
            _ => false,
        }
    }

    /// Rebuilds the type with every placeholder replaced by `resolve(kind)`.
    pub fn resolve_streams(&self, resolve: &impl Fn(StreamsKind) -> Type) -> Self {
        match self {
            Self::Streams(k) => resolve(*k),
            Self::Array {
                element_type,
                length,
            } => element_type.resolve_streams(resolve).of_array(*length),
            Self::RuntimeArray { element_type } => Self::RuntimeArray {
                element_type: Box::new(element_type.resolve_streams(resolve)),
            },
            Self::Pointer(p) => p.base.resolve_streams(resolve).pointer_to(p.storage_class),
            Self::Patch { kind, base, size } => Self::Patch {
                kind: *kind,
                base: Box::new(base.resolve_streams(resolve)),
                size: *size,
            },
            Self::OutputStream { base } => Self::OutputStream {
                base: Box::new(base.resolve_streams(resolve)),
            },
            Self::Function {
                return_type,
                parameters,
            } => Self::Function {
                return_type: Box::new(return_type.resolve_streams(resolve)),
                parameters: parameters
                    .iter()
                    .map(|p| FunctionParameter {
                        ty: p.ty.resolve_streams(resolve),
                        modifiers: p.modifiers,
                    })
                    .collect(),
            },
            Self::Struct { name, member_types } => Self::Struct {
                name: name.clone(),
                member_types: member_types
                    .iter()
                    .map(|m| TypeStructMember {
                        name: m.name.clone(),
                        ty: m.ty.resolve_streams(resolve),
                    })
                    .collect(),
            },
            x => x.clone(),
        }
    }
}
impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn scalar(f: &mut fmt::Formatter<'_>, s: &ScalarType) -> fmt::Result {
            match s {
                ScalarType::Bool => write!(f, "bool"),
                ScalarType::Int(w, true) => write!(f, "i{w}"),
                ScalarType::Int(w, false) => write!(f, "u{w}"),
                ScalarType::Float(w) => write!(f, "f{w}"),
            }
        }

        match self {
            Self::Void => write!(f, "void"),
            Self::Scalar(s) => scalar(f, s),
            Self::Vector(s, n) => {
                scalar(f, s)?;
                write!(f, "x{}", n.count())
            }
            Self::Matrix(c, n) => {
                scalar(f, c.element_type())?;
                write!(f, "x{}x{}", c.element_count().count(), n.count())
            }
            Self::Image { dim, .. } => write!(f, "image<{dim:?}>"),
            Self::Sampler => write!(f, "sampler"),
            Self::Array {
                element_type,
                length,
            } => write!(f, "{element_type}[{length}]"),
            Self::RuntimeArray { element_type } => write!(f, "{element_type}[]"),
            Self::Struct { name, .. } => write!(f, "{name}"),
            Self::Pointer(p) => write!(f, "ptr<{:?}, {}>", p.storage_class, p.base),
            Self::Function {
                return_type,
                parameters,
            } => {
                write!(f, "fn(")?;
                for (n, p) in parameters.iter().enumerate() {
                    if n > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p.ty)?;
                }
                write!(f, ") -> {return_type}")
            }
            Self::Patch { kind, base, size } => write!(f, "{kind:?}Patch<{base}, {size}>"),
            Self::OutputStream { base } => write!(f, "OutputStream<{base}>"),
            Self::Streams(k) => write!(f, "{}", k.suffix()),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Constant {
    True {
        result_type: Type,
    },
    False {
        result_type: Type,
    },
    Constant {
        result_type: Type,
        value_bits: u32,
    },
    Composite {
        result_type: Type,
        constituents: Vec<Constant>,
    },
    Null {
        result_type: Type,
    },
}
impl Constant {
    /// Zero value of a scalar type, used to pad widened interface values.
    pub fn zero_of(ty: &ScalarType) -> Self {
        match ty {
            ScalarType::Bool => Self::False {
                result_type: Type::bool(),
            },
            _ => Self::Constant {
                result_type: Type::Scalar(*ty),
                value_bits: 0,
            },
        }
    }

    pub fn result_type(&self) -> &Type {
        match self {
            Self::True { result_type }
            | Self::False { result_type }
            | Self::Constant { result_type, .. }
            | Self::Composite { result_type, .. }
            | Self::Null { result_type } => result_type,
        }
    }
}
impl From<u32> for Constant {
    fn from(value: u32) -> Self {
        Self::Constant {
            result_type: Type::uint(32),
            value_bits: value,
        }
    }
}
impl From<i32> for Constant {
    fn from(value: i32) -> Self {
        Self::Constant {
            result_type: Type::sint(32),
            value_bits: value as u32,
        }
    }
}
impl From<f32> for Constant {
    fn from(value: f32) -> Self {
        Self::Constant {
            result_type: Type::float(32),
            value_bits: value.to_bits(),
        }
    }
}
