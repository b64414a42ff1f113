use std::fmt;

use crate::spirv::asm::ExecutionModel;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShaderStage {
    Vertex,
    Hull,
    Domain,
    Geometry,
    Pixel,
    Compute,
}
impl ShaderStage {
    /// Pipeline order.
    pub const ALL: [Self; 6] = [
        Self::Vertex,
        Self::Hull,
        Self::Domain,
        Self::Geometry,
        Self::Pixel,
        Self::Compute,
    ];

    pub const fn execution_model(self) -> ExecutionModel {
        match self {
            Self::Vertex => ExecutionModel::Vertex,
            Self::Hull => ExecutionModel::TessellationControl,
            Self::Domain => ExecutionModel::TessellationEvaluation,
            Self::Geometry => ExecutionModel::Geometry,
            Self::Pixel => ExecutionModel::Fragment,
            Self::Compute => ExecutionModel::GLCompute,
        }
    }

    pub const fn from_execution_model(model: ExecutionModel) -> Self {
        match model {
            ExecutionModel::Vertex => Self::Vertex,
            ExecutionModel::TessellationControl => Self::Hull,
            ExecutionModel::TessellationEvaluation => Self::Domain,
            ExecutionModel::Geometry => Self::Geometry,
            ExecutionModel::Fragment => Self::Pixel,
            ExecutionModel::GLCompute => Self::Compute,
        }
    }

    /// Short prefix used in generated names (`VS_INPUT`, `in_PS_color`...).
    pub const fn id(self) -> &'static str {
        match self {
            Self::Vertex => "VS",
            Self::Hull => "HS",
            Self::Domain => "DS",
            Self::Geometry => "GS",
            Self::Pixel => "PS",
            Self::Compute => "CS",
        }
    }

    pub const fn has_patch_constants(self) -> bool {
        matches!(self, Self::Hull | Self::Domain)
    }
}
impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Hull => "hull",
            Self::Domain => "domain",
            Self::Geometry => "geometry",
            Self::Pixel => "pixel",
            Self::Compute => "compute",
        })
    }
}

/// Semantic split into its base name and trailing index (`TEXCOORD3` -> `TEXCOORD`, 3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedSemantic {
    pub name: String,
    pub index: u32,
}
impl ParsedSemantic {
    pub fn parse(semantic: &str) -> Self {
        let digits = semantic
            .bytes()
            .rev()
            .take_while(u8::is_ascii_digit)
            .count();
        let (name, index) = semantic.split_at(semantic.len() - digits);

        Self {
            name: name.to_owned(),
            index: index.parse().unwrap_or(0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SystemValue {
    Position,
    ClipDistance,
    CullDistance,
    VertexId,
    InstanceId,
    Depth,
    DepthGreaterEqual,
    DepthLessEqual,
    IsFrontFace,
    DispatchThreadId,
    GroupId,
    GroupThreadId,
    GroupIndex,
    OutputControlPointId,
    GsInstanceId,
    DomainLocation,
    TessFactor,
    InsideTessFactor,
    PrimitiveId,
    SampleIndex,
    Barycentrics,
    InnerCoverage,
    StencilRef,
    Coverage,
    RenderTargetArrayIndex,
    ViewportArrayIndex,
    ViewId,
    ShadingRate,
    Target(u32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SemanticKind {
    System(SystemValue),
    /// `SV_` prefixed but not in the catalog.
    UnknownSystem(String),
    User,
}

/// Classifies a semantic case-insensitively. `VFACE` is the legacy spelling of `SV_IsFrontFace`.
pub fn classify_semantic(semantic: &str) -> SemanticKind {
    let upper = semantic.to_ascii_uppercase();
    if upper == "VFACE" {
        return SemanticKind::System(SystemValue::IsFrontFace);
    }
    if !upper.starts_with("SV_") {
        return SemanticKind::User;
    }

    let ParsedSemantic { name, index } = ParsedSemantic::parse(&upper);
    let sv = match name.as_str() {
        "SV_POSITION" => SystemValue::Position,
        "SV_CLIPDISTANCE" => SystemValue::ClipDistance,
        "SV_CULLDISTANCE" => SystemValue::CullDistance,
        "SV_VERTEXID" => SystemValue::VertexId,
        "SV_INSTANCEID" => SystemValue::InstanceId,
        "SV_DEPTH" => SystemValue::Depth,
        "SV_DEPTHGREATEREQUAL" => SystemValue::DepthGreaterEqual,
        "SV_DEPTHLESSEQUAL" => SystemValue::DepthLessEqual,
        "SV_ISFRONTFACE" => SystemValue::IsFrontFace,
        "SV_DISPATCHTHREADID" => SystemValue::DispatchThreadId,
        "SV_GROUPID" => SystemValue::GroupId,
        "SV_GROUPTHREADID" => SystemValue::GroupThreadId,
        "SV_GROUPINDEX" => SystemValue::GroupIndex,
        "SV_OUTPUTCONTROLPOINTID" => SystemValue::OutputControlPointId,
        "SV_GSINSTANCEID" => SystemValue::GsInstanceId,
        "SV_DOMAINLOCATION" => SystemValue::DomainLocation,
        "SV_TESSFACTOR" => SystemValue::TessFactor,
        "SV_INSIDETESSFACTOR" => SystemValue::InsideTessFactor,
        "SV_PRIMITIVEID" => SystemValue::PrimitiveId,
        "SV_SAMPLEINDEX" => SystemValue::SampleIndex,
        "SV_BARYCENTRICS" => SystemValue::Barycentrics,
        "SV_INNERCOVERAGE" => SystemValue::InnerCoverage,
        "SV_STENCILREF" => SystemValue::StencilRef,
        "SV_COVERAGE" => SystemValue::Coverage,
        "SV_RENDERTARGETARRAYINDEX" => SystemValue::RenderTargetArrayIndex,
        "SV_VIEWPORTARRAYINDEX" => SystemValue::ViewportArrayIndex,
        "SV_VIEWID" => SystemValue::ViewId,
        "SV_SHADINGRATE" => SystemValue::ShadingRate,
        "SV_TARGET" => SystemValue::Target(index),
        _ => return SemanticKind::UnknownSystem(semantic.to_owned()),
    };

    SemanticKind::System(sv)
}

pub fn is_system_value(semantic: &str) -> bool {
    semantic.to_ascii_uppercase().starts_with("SV_") || semantic.eq_ignore_ascii_case("VFACE")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_trailing_index() {
        assert_eq!(
            ParsedSemantic::parse("TEXCOORD3"),
            ParsedSemantic {
                name: "TEXCOORD".into(),
                index: 3
            }
        );
        assert_eq!(
            ParsedSemantic::parse("POSITION"),
            ParsedSemantic {
                name: "POSITION".into(),
                index: 0
            }
        );
        assert_eq!(
            ParsedSemantic::parse("COLOR12"),
            ParsedSemantic {
                name: "COLOR".into(),
                index: 12
            }
        );
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(
            classify_semantic("sv_position"),
            SemanticKind::System(SystemValue::Position)
        );
        assert_eq!(
            classify_semantic("SV_Target2"),
            SemanticKind::System(SystemValue::Target(2))
        );
        assert_eq!(
            classify_semantic("vface"),
            SemanticKind::System(SystemValue::IsFrontFace)
        );
        assert_eq!(classify_semantic("TEXCOORD0"), SemanticKind::User);
        assert_eq!(
            classify_semantic("SV_Bogus"),
            SemanticKind::UnknownSystem("SV_Bogus".into())
        );
    }

    #[test]
    fn stage_ids() {
        assert_eq!(ShaderStage::Hull.id(), "HS");
        assert_eq!(
            ShaderStage::from_execution_model(ShaderStage::Domain.execution_model()),
            ShaderStage::Domain
        );
    }
}
