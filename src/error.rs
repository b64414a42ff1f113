//! Link errors.

use crate::spirv::Id;
use crate::symbol::meta::ShaderStage;

/// Coarse classification of a [`LinkError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingStage,
    ConflictingConfiguration,
    UnmappedSemantic,
    TypeConversion,
    Structural,
}

/// Every failure the linker can report. All of them abort the link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Neither a pixel nor a compute entry point could be resolved.
    #[error("at least a pixel or compute shader is expected")]
    NoPixelOrCompute,

    /// Pixel and compute entry points cannot be linked together.
    #[error("found both a pixel and a compute shader")]
    BothPixelAndCompute,

    /// Tessellation and geometry stages need a vertex stage in front of them.
    #[error("a {stage} shader is specified, so a vertex shader is needed too")]
    MissingVertexStage { stage: ShaderStage },

    /// A hull entry point without `OutputVertices`.
    #[error("output control point count not found on hull shader {entry}")]
    MissingOutputControlPoints { entry: String },

    /// The patch constant function named on a hull entry point does not exist.
    #[error("hull shader patch constant function {name} was not found")]
    MissingPatchConstantFunction { name: String },

    /// Geometry shader input without a primitive topology modifier.
    #[error("execution mode primitive is missing for first parameter of geometry shader {entry}")]
    MissingGeometryTopology { entry: String },

    /// A system value used where the stage cannot provide or consume it.
    #[error("semantic {semantic} cannot be used as {direction} of the {stage} stage")]
    UnmappedSemantic {
        semantic: String,
        stage: ShaderStage,
        direction: &'static str,
    },

    /// Two stream slots share a semantic but disagree on the type.
    #[error(
        "two variables with same semantic {semantic} have different types {first} and {second}"
    )]
    SemanticTypeMismatch {
        semantic: String,
        first: String,
        second: String,
    },

    #[error("cannot convert {from} to {to}")]
    TypeConversion { from: String, to: String },

    #[error("can't find output layout location for variable [{name}] in {stage} stage")]
    MissingOutputLocation { name: String, stage: ShaderStage },

    #[error("vertex shader input {name} doesn't have semantic")]
    VertexInputWithoutSemantic { name: String },

    #[error("recursive call with method id {function}")]
    RecursiveCall { function: Id },

    #[error("patch stream {name} can only be accessed through a constants struct")]
    PatchStreamAccess { name: String },

    #[error("can't process argument {index} of type {ty} in method {entry}")]
    UnsupportedParameter {
        index: usize,
        ty: String,
        entry: String,
    },

    /// Dangling ids and malformed instructions.
    #[error("malformed module: {0}")]
    Malformed(String),
}
impl LinkError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NoPixelOrCompute
            | Self::MissingVertexStage { .. }
            | Self::MissingOutputControlPoints { .. } => ErrorKind::MissingStage,
            Self::BothPixelAndCompute | Self::MissingGeometryTopology { .. } => {
                ErrorKind::ConflictingConfiguration
            }
            Self::UnmappedSemantic { .. } => ErrorKind::UnmappedSemantic,
            Self::SemanticTypeMismatch { .. } | Self::TypeConversion { .. } => {
                ErrorKind::TypeConversion
            }
            Self::MissingOutputLocation { .. }
            | Self::MissingPatchConstantFunction { .. }
            | Self::VertexInputWithoutSemantic { .. }
            | Self::RecursiveCall { .. }
            | Self::PatchStreamAccess { .. }
            | Self::UnsupportedParameter { .. }
            | Self::Malformed(_) => ErrorKind::Structural,
        }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
