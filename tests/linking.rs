use pretty_assertions::assert_eq;
use stage_linker::module::builder::FunctionBuilder;
use stage_linker::module::Module;
use stage_linker::samples::{self, Sample};
use std::collections::{BTreeMap, HashSet};

use stage_linker::spirv::asm::{Builtin, Capability, Decoration, ExecutionMode, StorageClass};
use stage_linker::spirv::{Constant, Id, Instruction, Type};
use stage_linker::symbol::meta::ShaderStage;
use stage_linker::symbol::SymbolTable;
use stage_linker::{ErrorKind, InterfaceProcessor, LinkError, LinkResult, LinkerConfig};

fn float4() -> Type {
    Type::float(32).of_vector(4)
}

fn link(module: &mut Module, table: &mut SymbolTable) -> stage_linker::Result<LinkResult> {
    InterfaceProcessor::new(LinkerConfig::default()).process(table, module)
}

fn stages(result: &LinkResult) -> Vec<ShaderStage> {
    result.entry_points.iter().map(|e| e.stage).collect()
}

fn global_named(module: &Module, name: &str) -> Option<Id> {
    module
        .global_variable_ops
        .iter()
        .filter_map(Instruction::result_id)
        .find(|&id| module.name_of(id) == Some(name))
}

fn functions_named(module: &Module, name: &str) -> usize {
    module
        .function_ids()
        .into_iter()
        .filter(|&f| module.name_of(f) == Some(name))
        .count()
}

fn function_body<'m>(module: &'m Module, id: Id) -> &'m [Instruction] {
    let range = module.function_range(id).unwrap();
    &module.function_ops[range]
}

fn access_chain_bases(module: &Module, function: Id) -> HashSet<Id> {
    function_body(module, function)
        .iter()
        .filter_map(|op| match op {
            Instruction::AccessChain { base, .. } => Some(*base),
            _ => None,
        })
        .collect()
}

fn global_with_builtin(module: &Module, builtin: Builtin) -> Vec<Id> {
    module
        .global_variable_ops
        .iter()
        .filter_map(Instruction::result_id)
        .filter(|&id| {
            module.decoration_args(id, Decoration::Builtin) == Some(&[builtin as u32][..])
        })
        .collect()
}

fn storage_class_of(module: &Module, id: Id) -> Option<StorageClass> {
    match module.global_variable(id) {
        Some(&Instruction::Variable { storage_class, .. }) => Some(storage_class),
        _ => None,
    }
}

#[test]
fn compute_only() {
    let (mut m, mut table) = Sample::Compute.build();
    let result = link(&mut m, &mut table).unwrap();

    assert_eq!(stages(&result), vec![ShaderStage::Compute]);
    assert!(result.input_attributes.is_empty());
    let cs = &result.entry_points[0];
    assert_eq!(cs.name, "CSMain_Wrapper");
    assert_eq!(
        m.execution_mode_args(cs.id, ExecutionMode::LocalSize),
        Some(&[8, 8, 1][..])
    );

    assert!(global_named(&m, "ComputeParams").is_some());
    assert!(global_named(&m, "LastThread").is_some());
    assert_eq!(global_named(&m, "UnusedTexture"), None);
    assert_eq!(table.resolve_function("VSMain"), None);
    assert_eq!(functions_named(&m, "VSMain"), 0);
}

#[test]
fn dead_workgroup_variable_is_removed() {
    let (mut m, mut table) = Sample::Compute.build();
    let shared = m.declare_global_variable(Type::float(32), StorageClass::Workgroup);
    m.add_name(shared, "DeadShared");
    let mut helper = FunctionBuilder::new(&mut m, "DeadHelper", Type::Void, vec![]);
    helper.load(Type::float(32), shared);
    helper.finish();

    link(&mut m, &mut table).unwrap();

    assert_eq!(global_named(&m, "DeadShared"), None);
    assert_eq!(m.global_variable(shared), None);
    assert_eq!(functions_named(&m, "DeadHelper"), 0);
}

#[test]
fn workgroup_variable_joins_compute_interface() {
    let mut m = Module::new();
    let mut table = SymbolTable::new();
    let tile = m.declare_global_variable(Type::float(32), StorageClass::Workgroup);
    m.add_name(tile, "SharedTile");

    let mut helper = FunctionBuilder::new(&mut m, "ReadTile", Type::float(32), vec![]);
    let v = helper.load(Type::float(32), tile);
    helper.return_value(v);
    let helper = helper.finish();

    let mut cs = FunctionBuilder::new(&mut m, "CSMain", Type::Void, vec![]);
    cs.call(Type::float(32), helper, vec![]);
    let cs = cs.finish();
    m.add_execution_mode(cs, ExecutionMode::LocalSize, &[64, 1, 1]);
    table.declare_function("CSMain", cs);

    let result = link(&mut m, &mut table).unwrap();
    assert_eq!(global_named(&m, "SharedTile"), Some(tile));
    assert_eq!(storage_class_of(&m, tile), Some(StorageClass::Workgroup));

    let wrapper = result.entry_points[0].id;
    let interface = m
        .entry_point_ops
        .iter()
        .find_map(|op| match op {
            Instruction::EntryPoint {
                entry_point,
                interface,
                ..
            } if *entry_point == wrapper => Some(interface),
            _ => None,
        })
        .unwrap();
    assert!(interface.contains(&tile));
}

#[test]
fn vertex_and_pixel() {
    let (mut m, mut table) = Sample::VertexPixel.build();
    let result = link(&mut m, &mut table).unwrap();

    assert_eq!(stages(&result), vec![ShaderStage::Vertex, ShaderStage::Pixel]);
    assert_eq!(result.entry_points[0].name, "VSMain_Wrapper");
    assert_eq!(result.entry_points[1].name, "PSMain_Wrapper");
    assert!(m
        .execution_mode_args(result.entry_points[1].id, ExecutionMode::OriginUpperLeft)
        .is_some());

    let names = result
        .input_attributes
        .iter()
        .map(|a| a.semantic_name.as_str())
        .collect::<Vec<_>>();
    assert!(names.contains(&"POSITION"));
    assert!(names.contains(&"TEXCOORD"), "forwarded through the vertex stage");

    // the pixel stage samples through the group, so the whole group survives
    assert!(global_named(&m, "Sampler0").is_some());
    assert!(global_named(&m, "Texture0").is_some());
    assert!(global_named(&m, "PerDraw").is_some());

    let target = global_named(&m, "out_PS_ColorTarget").unwrap();
    assert_eq!(storage_class_of(&m, target), Some(StorageClass::Output));
    assert_eq!(m.decoration_args(target, Decoration::Location), Some(&[0][..]));

    // the forwarded attribute lands in the same slot on both sides
    let vs_tex_coord = global_named(&m, "out_VS_TexCoord").unwrap();
    let ps_tex_coord = global_named(&m, "in_PS_TexCoord").unwrap();
    assert_eq!(storage_class_of(&m, vs_tex_coord), Some(StorageClass::Output));
    assert_eq!(storage_class_of(&m, ps_tex_coord), Some(StorageClass::Input));
    assert!(m.has_decoration(vs_tex_coord, Decoration::Location));
    assert_eq!(
        m.decoration_args(vs_tex_coord, Decoration::Location),
        m.decoration_args(ps_tex_coord, Decoration::Location)
    );

    let position = global_named(&m, "out_VS_ShadingPosition").unwrap();
    assert_eq!(storage_class_of(&m, position), Some(StorageClass::Output));
    assert_eq!(
        m.decoration_args(position, Decoration::Builtin),
        Some(&[Builtin::Position as u32][..])
    );
    let frag_coord = global_named(&m, "in_PS_ShadingPosition").unwrap();
    assert_eq!(storage_class_of(&m, frag_coord), Some(StorageClass::Input));
    assert_eq!(
        m.decoration_args(frag_coord, Decoration::Builtin),
        Some(&[Builtin::FragCoord as u32][..])
    );
}

#[test]
fn hull_only_resource_goes_without_hull_stage() {
    let mut m = Module::new();
    let mut table = SymbolTable::new();
    let position = m.declare_stream("Position", float4(), Some("POSITION"));
    let shading_position = m.declare_stream("ShadingPosition", float4(), Some("SV_Position"));
    let color_target = m.declare_stream("ColorTarget", float4(), Some("SV_Target0"));
    let hull_map = m.declare_resource("HullOnlyMap", Type::Sampler);

    let mut vs = FunctionBuilder::new(&mut m, "VSMain", Type::Void, vec![]);
    let p = vs.load(float4(), position);
    vs.store(shading_position, p);
    let vs = vs.finish();
    table.declare_function("VSMain", vs);

    let mut hs = FunctionBuilder::new(&mut m, "HSMain", Type::Void, vec![]);
    hs.load(Type::Sampler, hull_map);
    let hs = hs.finish();
    table.declare_function("HSMain", hs);

    let mut ps = FunctionBuilder::new(&mut m, "PSMain", Type::Void, vec![]);
    let frag = ps.load(float4(), shading_position);
    ps.store(color_target, frag);
    let ps = ps.finish();
    table.declare_function("PSMain", ps);

    let mut config = LinkerConfig::default();
    config.entry_points.set(ShaderStage::Hull, "NoHull");
    let result = InterfaceProcessor::new(config)
        .process(&mut table, &mut m)
        .unwrap();

    assert_eq!(stages(&result), vec![ShaderStage::Vertex, ShaderStage::Pixel]);
    assert_eq!(global_named(&m, "HullOnlyMap"), None);
    assert_eq!(m.global_variable(hull_map), None);
    assert_eq!(functions_named(&m, "HSMain"), 0);
    assert_eq!(table.resolve_function("HSMain"), None);
}

#[test]
fn shared_subroutine_is_specialized_per_stage() {
    let (mut m, mut table) = Sample::Shared.build();
    let result = link(&mut m, &mut table).unwrap();

    assert_eq!(stages(&result), vec![ShaderStage::Vertex, ShaderStage::Pixel]);
    assert_eq!(functions_named(&m, "Shade"), 2);

    // each clone reads through the streams of its own stage
    let streams_vs = global_named(&m, "streamsVS").unwrap();
    let streams_ps = global_named(&m, "streamsPS").unwrap();
    let clones = m
        .function_ids()
        .into_iter()
        .filter(|&f| m.name_of(f) == Some("Shade"))
        .map(|f| access_chain_bases(&m, f))
        .collect::<Vec<_>>();
    assert!(clones
        .iter()
        .all(|bases| bases.contains(&streams_vs) != bases.contains(&streams_ps)));
    assert_eq!(
        clones.iter().filter(|bases| bases.contains(&streams_vs)).count(),
        1
    );
    assert_eq!(
        clones.iter().filter(|bases| bases.contains(&streams_ps)).count(),
        1
    );
    assert!(result
        .input_attributes
        .iter()
        .any(|a| a.semantic_name == "COLOR" && a.semantic_index == 0));
}

#[test]
fn hull_without_output_control_points() {
    let (mut m, mut table) = Sample::Tessellation.build();
    m.execution_mode_ops.retain(|op| {
        !matches!(
            op,
            Instruction::ExecutionMode {
                mode: ExecutionMode::OutputVertices,
                ..
            }
        )
    });
    let before = m.to_string();

    let err = link(&mut m, &mut table).unwrap_err();
    assert!(matches!(&err, LinkError::MissingOutputControlPoints { entry } if entry == "HSMain"));
    assert_eq!(err.kind(), ErrorKind::MissingStage);
    assert!(err.to_string().contains("HSMain"));
    assert_eq!(m.to_string(), before);
}

#[test]
fn missing_patch_constant_function() {
    let (mut m, table) = samples::tessellation();
    let mut table = table
        .iter()
        .filter(|(name, _)| *name != "HSConstants")
        .fold(SymbolTable::new(), |mut t, (name, symbol)| {
            t.insert(name, symbol.clone());
            t
        });

    let err = link(&mut m, &mut table).unwrap_err();
    assert!(
        matches!(&err, LinkError::MissingPatchConstantFunction { name } if name == "HSConstants")
    );
    assert_eq!(err.kind(), ErrorKind::Structural);
}

#[test]
fn semantic_type_mismatch() {
    let mut m = Module::new();
    let mut table = SymbolTable::new();
    let a = m.declare_stream("ColorA", float4(), Some("COLOR0"));
    m.declare_stream("ColorB", Type::float(32).of_vector(3), Some("color0"));
    let target = m.declare_stream("Target", float4(), Some("SV_Target0"));
    let mut ps = FunctionBuilder::new(&mut m, "PSMain", Type::Void, vec![]);
    let v = ps.load(float4(), a);
    ps.store(target, v);
    let ps = ps.finish();
    table.declare_function("PSMain", ps);

    let err = link(&mut m, &mut table).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeConversion);
}

#[test]
fn depth_only_pixel_shader_is_dropped() {
    let mut m = Module::new();
    let mut table = SymbolTable::new();
    let position = m.declare_stream("Position", float4(), Some("POSITION"));
    let shading_position = m.declare_stream("ShadingPosition", float4(), Some("SV_Position"));

    let mut vs = FunctionBuilder::new(&mut m, "VSMain", Type::Void, vec![]);
    let p = vs.load(float4(), position);
    vs.store(shading_position, p);
    let vs = vs.finish();
    table.declare_function("VSMain", vs);

    let mut ps = FunctionBuilder::new(&mut m, "PSMain", Type::Void, vec![]);
    ps.load(float4(), shading_position);
    let ps = ps.finish();
    table.declare_function("PSMain", ps);

    let result = link(&mut m, &mut table).unwrap();
    assert_eq!(stages(&result), vec![ShaderStage::Vertex]);
    assert_eq!(table.resolve_function("PSMain"), None);
    assert_eq!(global_named(&m, "in_PS_ShadingPosition"), None);
}

#[test]
fn tessellation_pipeline() {
    let (mut m, mut table) = Sample::Tessellation.build();
    let result = link(&mut m, &mut table).unwrap();

    assert_eq!(
        stages(&result),
        vec![
            ShaderStage::Vertex,
            ShaderStage::Hull,
            ShaderStage::Domain,
            ShaderStage::Pixel
        ]
    );
    assert!(m.capabilities.contains(&Capability::Tessellation));
    assert!(!m.capabilities.contains(&Capability::Geometry));

    let hull = &result.entry_points[1];
    assert_eq!(
        m.execution_mode_args(hull.id, ExecutionMode::OutputVertices),
        Some(&[3][..])
    );
    let domain = &result.entry_points[2];
    assert!(m.execution_mode_args(domain.id, ExecutionMode::Triangles).is_some());
    assert!(global_named(&m, "DisplacementMap").is_some());

    // the patch constant function runs once, after every control point is written
    let body = function_body(&m, hull.id);
    assert!(body
        .iter()
        .any(|op| matches!(op, Instruction::ControlBarrier { .. })));
    let zero = m.constant_id(&Constant::from(0u32)).unwrap();
    let invocation_ids = global_with_builtin(&m, Builtin::InvocationId);
    assert_eq!(invocation_ids.len(), 1);
    let invocations = body
        .iter()
        .filter_map(|op| match op {
            Instruction::Load {
                result, pointer, ..
            } if *pointer == invocation_ids[0] => Some(*result),
            _ => None,
        })
        .collect::<HashSet<_>>();
    assert!(body.iter().any(|op| matches!(
        op,
        Instruction::IEqual { operand1, operand2, .. }
            if invocations.contains(operand1) && *operand2 == zero
    )));

    // tessellation levels are widened to their fixed builtin sizes
    let outer = global_with_builtin(&m, Builtin::TessLevelOuter);
    let inner = global_with_builtin(&m, Builtin::TessLevelInner);
    assert!(!outer.is_empty());
    assert!(!inner.is_empty());
    for id in outer {
        assert_eq!(m.variable_type(id), Some(&Type::float(32).of_array(4)));
        assert!(m.has_decoration(id, Decoration::Patch));
    }
    for id in inner {
        assert_eq!(m.variable_type(id), Some(&Type::float(32).of_array(2)));
    }
}

#[test]
fn geometry_pipeline() {
    let (mut m, mut table) = Sample::Geometry.build();
    let result = link(&mut m, &mut table).unwrap();

    assert_eq!(
        stages(&result),
        vec![ShaderStage::Vertex, ShaderStage::Geometry, ShaderStage::Pixel]
    );
    assert!(m.capabilities.contains(&Capability::Geometry));
    let geometry = &result.entry_points[1];
    assert!(m
        .execution_mode_args(geometry.id, ExecutionMode::OutputTriangleStrip)
        .is_some());
}

#[test]
fn every_sample_links_cleanly() {
    for sample in Sample::ALL {
        let (mut m, mut table) = sample.build();
        let result = link(&mut m, &mut table).unwrap();

        // no stream slot survives, and builtins never carry a location
        for op in &m.global_variable_ops {
            let Some(id) = op.result_id() else {
                continue;
            };
            assert_ne!(storage_class_of(&m, id), Some(StorageClass::Stream), "{sample:?}");
            assert!(
                !(m.has_decoration(id, Decoration::Builtin)
                    && m.has_decoration(id, Decoration::Location)),
                "{sample:?}: {:?}",
                m.name_of(id)
            );
        }

        let locations = result
            .input_attributes
            .iter()
            .map(|a| a.location)
            .collect::<Vec<_>>();
        assert!(locations.windows(2).all(|w| w[0] < w[1]), "{sample:?}");

        // user locations are packed from 0 per stage and direction
        let mut slots = BTreeMap::<String, Vec<u32>>::new();
        for id in m.global_variable_ops.iter().filter_map(Instruction::result_id) {
            let (Some(&[location]), Some(name)) =
                (m.decoration_args(id, Decoration::Location), m.name_of(id))
            else {
                continue;
            };
            let prefix = name.splitn(3, '_').take(2).collect::<Vec<_>>().join("_");
            slots.entry(prefix).or_default().push(location);
        }
        for (prefix, mut used) in slots {
            used.sort_unstable();
            let packed = (0..used.len() as u32).collect::<Vec<_>>();
            assert_eq!(used, packed, "{sample:?}: {prefix}");
        }

        for e in &result.entry_points {
            assert_eq!(table.resolve_function(&e.name), Some(e.id));
        }
    }
}

#[test]
fn linking_twice_changes_nothing() {
    for sample in Sample::ALL {
        let (mut m, mut table) = sample.build();
        let first = link(&mut m, &mut table).unwrap();
        let linked = m.to_string();

        let second = link(&mut m, &mut table).unwrap();
        assert_eq!(second, first, "{sample:?}");
        assert_eq!(m.to_string(), linked, "{sample:?}");
    }
}
