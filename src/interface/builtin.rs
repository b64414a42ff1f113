//! System value to builtin mapping and interface type coercion.

use crate::error::{LinkError, Result};
use crate::module::Module;
use crate::spirv::{asm::Builtin, Constant, Id, Instruction, ScalarType, Type};
use crate::symbol::meta::{classify_semantic, SemanticKind, ShaderStage, SystemValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}
impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceBinding {
    Builtin(Builtin),
    Location,
    /// The value is produced by the pipeline itself; no interface variable.
    NotForwarded,
}

/// How a stream with `semantic` crosses the `direction` boundary of `stage`.
pub fn resolve_binding(
    stage: ShaderStage,
    direction: Direction,
    semantic: Option<&str>,
) -> Result<InterfaceBinding> {
    let Some(semantic) = semantic else {
        return Ok(InterfaceBinding::Location);
    };
    let sv = match classify_semantic(semantic) {
        SemanticKind::User => return Ok(InterfaceBinding::Location),
        SemanticKind::System(sv) => sv,
        SemanticKind::UnknownSystem(_) => return Err(unmapped(semantic, stage, direction)),
    };

    system_value_binding(stage, direction, sv).ok_or_else(|| unmapped(semantic, stage, direction))
}

fn unmapped(semantic: &str, stage: ShaderStage, direction: Direction) -> LinkError {
    LinkError::UnmappedSemantic {
        semantic: semantic.to_owned(),
        stage,
        direction: direction.as_str(),
    }
}

pub fn system_value_binding(
    stage: ShaderStage,
    direction: Direction,
    sv: SystemValue,
) -> Option<InterfaceBinding> {
    use Direction::{Input, Output};
    use InterfaceBinding::{Location, NotForwarded};
    use ShaderStage::{Compute, Domain, Geometry, Hull, Pixel, Vertex};

    let graphics = stage != Compute;
    let b = match (sv, stage, direction) {
        (SystemValue::Position, Vertex, Input) => return Some(Location),
        (SystemValue::Position, Pixel, Input) => Builtin::FragCoord,
        (SystemValue::Position, Pixel | Compute, Output) | (SystemValue::Position, Compute, _) => {
            return None
        }
        (SystemValue::Position, _, _) => Builtin::Position,

        (SystemValue::ClipDistance | SystemValue::CullDistance, Vertex, Input)
        | (SystemValue::ClipDistance | SystemValue::CullDistance, Pixel, Output) => return None,
        (SystemValue::ClipDistance, _, _) if graphics => Builtin::ClipDistance,
        (SystemValue::CullDistance, _, _) if graphics => Builtin::CullDistance,

        (SystemValue::VertexId, Vertex, Input) => Builtin::VertexIndex,
        (SystemValue::InstanceId, Vertex, Input) => Builtin::InstanceIndex,
        (SystemValue::VertexId | SystemValue::InstanceId, _, _) => return Some(NotForwarded),

        (
            SystemValue::Depth | SystemValue::DepthGreaterEqual | SystemValue::DepthLessEqual,
            Pixel,
            Output,
        ) => Builtin::FragDepth,
        (SystemValue::IsFrontFace, Pixel, Input) => Builtin::FrontFacing,

        (SystemValue::DispatchThreadId, Compute, Input) => Builtin::GlobalInvocationId,
        (SystemValue::GroupId, Compute, Input) => Builtin::WorkgroupId,
        (SystemValue::GroupThreadId, Compute, Input) => Builtin::LocalInvocationId,
        (SystemValue::GroupIndex, Compute, Input) => Builtin::LocalInvocationIndex,

        (SystemValue::OutputControlPointId, Hull, Input) => Builtin::InvocationId,
        (SystemValue::GsInstanceId, Geometry, Input) => Builtin::InvocationId,
        (SystemValue::DomainLocation, Domain, Input) => Builtin::TessCoord,
        (SystemValue::TessFactor, Hull, Output) | (SystemValue::TessFactor, Domain, Input) => {
            Builtin::TessLevelOuter
        }
        (SystemValue::InsideTessFactor, Hull, Output)
        | (SystemValue::InsideTessFactor, Domain, Input) => Builtin::TessLevelInner,

        (SystemValue::PrimitiveId, Hull | Domain | Geometry | Pixel, Input)
        | (SystemValue::PrimitiveId, Geometry, Output) => Builtin::PrimitiveId,

        (SystemValue::SampleIndex, Pixel, Input) => Builtin::SampleId,
        (SystemValue::Barycentrics, Pixel, Input) => Builtin::BaryCoordKHR,
        (SystemValue::InnerCoverage, Pixel, Input) => Builtin::FullyCoveredEXT,
        (SystemValue::StencilRef, Pixel, Output) => Builtin::FragStencilRefEXT,
        (SystemValue::Coverage, Pixel, _) => Builtin::SampleMask,

        (SystemValue::RenderTargetArrayIndex, Pixel, Input)
        | (SystemValue::RenderTargetArrayIndex, Geometry, Output) => Builtin::Layer,
        (SystemValue::ViewportArrayIndex, Pixel, Input)
        | (SystemValue::ViewportArrayIndex, Geometry, Output) => Builtin::ViewportIndex,

        (SystemValue::ViewId, _, Input) if graphics => Builtin::ViewIndex,

        (SystemValue::ShadingRate, Vertex | Geometry, Output) => Builtin::PrimitiveShadingRateKHR,
        (SystemValue::ShadingRate, Pixel, Input) => Builtin::ShadingRateKHR,

        (SystemValue::Target(_), Pixel, Output) => return Some(Location),

        (
            SystemValue::ClipDistance
            | SystemValue::CullDistance
            | SystemValue::Depth
            | SystemValue::DepthGreaterEqual
            | SystemValue::DepthLessEqual
            | SystemValue::IsFrontFace
            | SystemValue::DispatchThreadId
            | SystemValue::GroupId
            | SystemValue::GroupThreadId
            | SystemValue::GroupIndex
            | SystemValue::OutputControlPointId
            | SystemValue::GsInstanceId
            | SystemValue::DomainLocation
            | SystemValue::TessFactor
            | SystemValue::InsideTessFactor
            | SystemValue::PrimitiveId
            | SystemValue::SampleIndex
            | SystemValue::Barycentrics
            | SystemValue::InnerCoverage
            | SystemValue::StencilRef
            | SystemValue::Coverage
            | SystemValue::RenderTargetArrayIndex
            | SystemValue::ViewportArrayIndex
            | SystemValue::ViewId
            | SystemValue::ShadingRate
            | SystemValue::Target(_),
            _,
            _,
        ) => return None,
    };

    Some(InterfaceBinding::Builtin(b))
}

/// Whether the pipeline provides `sv` to `stage` without the previous stage writing it.
pub const fn generated_by_stage(stage: ShaderStage, sv: SystemValue) -> bool {
    use ShaderStage::{Compute, Domain, Geometry, Hull, Pixel, Vertex};

    match stage {
        Pixel => matches!(
            sv,
            SystemValue::Coverage
                | SystemValue::IsFrontFace
                | SystemValue::SampleIndex
                | SystemValue::PrimitiveId
                | SystemValue::Barycentrics
                | SystemValue::InnerCoverage
                | SystemValue::ViewId
                | SystemValue::ShadingRate
        ),
        Hull => matches!(
            sv,
            SystemValue::OutputControlPointId | SystemValue::PrimitiveId | SystemValue::ViewId
        ),
        Domain => matches!(
            sv,
            SystemValue::DomainLocation | SystemValue::PrimitiveId | SystemValue::ViewId
        ),
        Geometry => matches!(
            sv,
            SystemValue::GsInstanceId | SystemValue::PrimitiveId | SystemValue::ViewId
        ),
        Vertex | Compute => false,
    }
}

/// Type of the interface variable for a stream of type `ty` bound to `builtin`.
pub fn interface_type(builtin: Option<Builtin>, ty: &Type) -> Type {
    match builtin {
        Some(Builtin::TessLevelOuter) => Type::float(32).of_array(4),
        Some(Builtin::TessLevelInner) => Type::float(32).of_array(2),
        Some(Builtin::TessCoord) => Type::float(32).of_vector(3),
        _ => ty.clone(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Scalar,
    Vector,
    Array,
}

/// (shape, element, count) for types that convert element-wise.
fn element_layout(ty: &Type) -> Option<(Shape, ScalarType, u32)> {
    match ty {
        &Type::Scalar(s) => Some((Shape::Scalar, s, 1)),
        &Type::Vector(s, n) => Some((Shape::Vector, s, n.count() as _)),
        Type::Array {
            element_type,
            length,
        } => match **element_type {
            Type::Scalar(s) => Some((Shape::Array, s, *length)),
            _ => None,
        },
        _ => None,
    }
}

/// Converts `value` between a stream type and its interface type, padding with zeros on
/// widening and dropping trailing elements on truncation. Emits into `ops`.
pub fn convert_interface_value(
    module: &mut Module,
    ops: &mut Vec<Instruction>,
    from: &Type,
    to: &Type,
    value: Id,
) -> Result<Id> {
    if from == to {
        return Ok(value);
    }

    let mismatch = || LinkError::TypeConversion {
        from: from.to_string(),
        to: to.to_string(),
    };
    let (from_shape, from_elem, from_count) = element_layout(from).ok_or_else(mismatch)?;
    let (to_shape, to_elem, to_count) = element_layout(to).ok_or_else(mismatch)?;
    if from_elem != to_elem
        || (from_shape != to_shape && from_shape != Shape::Scalar && to_shape != Shape::Scalar)
    {
        return Err(mismatch());
    }

    let elem_type_id = module.request_type_id(Type::Scalar(from_elem));
    let mut elements = Vec::with_capacity(to_count as usize);
    for i in 0..from_count.min(to_count) {
        if from_shape == Shape::Scalar {
            elements.push(value);
            continue;
        }
        let result = module.new_id();
        ops.push(Instruction::CompositeExtract {
            result_type: elem_type_id,
            result,
            composite: value,
            indexes: vec![i],
        });
        elements.push(result);
    }
    if to_shape == Shape::Scalar {
        return elements.first().copied().ok_or_else(mismatch);
    }
    let zero = module.request_const_id(Constant::zero_of(&to_elem));
    elements.resize(to_count as usize, zero);

    let result_type = module.request_type_id(to.clone());
    let result = module.new_id();
    ops.push(Instruction::CompositeConstruct {
        result_type,
        result,
        constituents: elements,
    });

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    const ALL_STAGES: [ShaderStage; 6] = [
        ShaderStage::Vertex,
        ShaderStage::Hull,
        ShaderStage::Domain,
        ShaderStage::Geometry,
        ShaderStage::Pixel,
        ShaderStage::Compute,
    ];

    #[test]
    fn position_mapping() {
        let b = |stage, dir| resolve_binding(stage, dir, Some("SV_Position")).ok();

        assert_eq!(
            b(ShaderStage::Vertex, Direction::Input),
            Some(InterfaceBinding::Location)
        );
        assert_eq!(
            b(ShaderStage::Vertex, Direction::Output),
            Some(InterfaceBinding::Builtin(Builtin::Position))
        );
        assert_eq!(
            b(ShaderStage::Pixel, Direction::Input),
            Some(InterfaceBinding::Builtin(Builtin::FragCoord))
        );
        assert_eq!(
            b(ShaderStage::Geometry, Direction::Input),
            Some(InterfaceBinding::Builtin(Builtin::Position))
        );
        assert_eq!(b(ShaderStage::Pixel, Direction::Output), None);
    }

    #[test]
    fn vertex_ids_only_reach_vertex_inputs() {
        for stage in ALL_STAGES {
            for dir in [Direction::Input, Direction::Output] {
                let b = resolve_binding(stage, dir, Some("SV_VertexID")).unwrap();
                if (stage, dir) == (ShaderStage::Vertex, Direction::Input) {
                    assert_eq!(b, InterfaceBinding::Builtin(Builtin::VertexIndex));
                } else {
                    assert_eq!(b, InterfaceBinding::NotForwarded);
                }
            }
        }
    }

    #[test]
    fn primitive_id_is_not_tess_coord() {
        for stage in [
            ShaderStage::Hull,
            ShaderStage::Domain,
            ShaderStage::Geometry,
            ShaderStage::Pixel,
        ] {
            assert_eq!(
                resolve_binding(stage, Direction::Input, Some("SV_PrimitiveID")).unwrap(),
                InterfaceBinding::Builtin(Builtin::PrimitiveId)
            );
        }
        assert!(
            resolve_binding(ShaderStage::Vertex, Direction::Output, Some("SV_PrimitiveID")).is_err()
        );
    }

    #[test]
    fn user_semantics_and_targets_use_locations() {
        assert_eq!(
            resolve_binding(ShaderStage::Vertex, Direction::Output, Some("TEXCOORD0")).unwrap(),
            InterfaceBinding::Location
        );
        assert_eq!(
            resolve_binding(ShaderStage::Pixel, Direction::Output, Some("SV_Target1")).unwrap(),
            InterfaceBinding::Location
        );
        assert_eq!(
            resolve_binding(ShaderStage::Pixel, Direction::Input, None).unwrap(),
            InterfaceBinding::Location
        );
    }

    #[test]
    fn invalid_system_values_are_unmapped() {
        let err =
            resolve_binding(ShaderStage::Vertex, Direction::Input, Some("SV_Depth")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnmappedSemantic);
        let err = resolve_binding(ShaderStage::Pixel, Direction::Input, Some("SV_Nonsense"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnmappedSemantic);
        let err = resolve_binding(ShaderStage::Compute, Direction::Input, Some("SV_ClipDistance0"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnmappedSemantic);
    }

    #[test]
    fn widening_pads_with_zero() {
        let mut m = Module::new();
        let mut ops = Vec::new();
        let from = Type::float(32).of_array(3);
        let to = Type::float(32).of_array(4);
        let v = m.new_id();

        let r = convert_interface_value(&mut m, &mut ops, &from, &to, v).unwrap();

        let zero = m.request_const_id(Constant::zero_of(&ScalarType::Float(32)));
        assert_eq!(ops.len(), 4);
        match &ops[3] {
            Instruction::CompositeConstruct {
                result,
                constituents,
                ..
            } => {
                assert_eq!(*result, r);
                assert_eq!(constituents.len(), 4);
                assert_eq!(constituents[3], zero);
            }
            op => panic!("unexpected {op:?}"),
        }
    }

    #[test]
    fn scalar_widens_like_one_element_array() {
        let mut m = Module::new();
        let mut ops = Vec::new();
        let v = m.new_id();
        let to = Type::float(32).of_array(2);

        convert_interface_value(&mut m, &mut ops, &Type::float(32), &to, v).unwrap();
        assert!(matches!(
            &ops[..],
            [Instruction::CompositeConstruct { constituents, .. }] if constituents[0] == v
        ));

        // and back: the first element survives
        ops.clear();
        let back = convert_interface_value(&mut m, &mut ops, &to, &Type::float(32), v).unwrap();
        assert!(matches!(
            &ops[..],
            [Instruction::CompositeExtract { result, indexes, .. }]
                if *result == back && indexes == &[0]
        ));
    }

    #[test]
    fn vector_to_array_is_a_conversion_error() {
        let mut m = Module::new();
        let mut ops = Vec::new();
        let v = m.new_id();
        let err = convert_interface_value(
            &mut m,
            &mut ops,
            &Type::float(32).of_vector(4),
            &Type::float(32).of_array(4),
            v,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeConversion);

        let err = convert_interface_value(
            &mut m,
            &mut ops,
            &Type::uint(32).of_vector(3),
            &Type::float(32).of_vector(3),
            v,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeConversion);
    }

    #[test]
    fn coerced_interface_types() {
        let f3 = Type::float(32).of_array(3);
        assert_eq!(
            interface_type(Some(Builtin::TessLevelOuter), &f3),
            Type::float(32).of_array(4)
        );
        assert_eq!(
            interface_type(Some(Builtin::TessLevelInner), &Type::float(32)),
            Type::float(32).of_array(2)
        );
        assert_eq!(
            interface_type(Some(Builtin::TessCoord), &Type::float(32).of_vector(2)),
            Type::float(32).of_vector(3)
        );
        assert_eq!(interface_type(Some(Builtin::Position), &f3), f3);
    }

    #[test]
    fn pixel_generated_values() {
        assert!(generated_by_stage(ShaderStage::Pixel, SystemValue::IsFrontFace));
        assert!(generated_by_stage(ShaderStage::Pixel, SystemValue::Coverage));
        assert!(!generated_by_stage(ShaderStage::Pixel, SystemValue::Position));
        assert!(generated_by_stage(ShaderStage::Hull, SystemValue::OutputControlPointId));
        assert!(!generated_by_stage(ShaderStage::Vertex, SystemValue::VertexId));
    }
}
