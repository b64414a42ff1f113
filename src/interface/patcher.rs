//! Lowers stream accesses of one stage to accesses into its scratch struct.

use std::collections::HashMap;

use log::trace;

use super::analysis::{AnalysisResult, LiveAnalysis, StreamVariableInfo};
use super::builtin::convert_interface_value;
use super::variables::{StageInterface, StageTypes};
use crate::error::{LinkError, Result};
use crate::module::Module;
use crate::spirv::{
    asm::StorageClass, Constant, FunctionParameter, Id, Instruction, StreamsKind, Type,
};
use crate::symbol::meta::ShaderStage;

/// What the patcher needs to know about the stage being linked.
pub struct StageLayout<'a> {
    pub stage: ShaderStage,
    pub types: &'a StageTypes,
    pub interface: &'a StageInterface,
    /// The `Private` scratch variable holding the stage's `STREAMS` struct.
    pub streams_variable: Id,
}

/// Concrete type for a type written against the stream placeholders: placeholders become the
/// stage structs, patches become arrays and stream pointers become private pointers.
pub fn lower_type(ty: &Type, types: &StageTypes) -> Type {
    fn lower(ty: Type) -> Type {
        match ty {
            Type::Patch { base, size, .. } => lower(*base).of_array(size),
            Type::Array {
                element_type,
                length,
            } => lower(*element_type).of_array(length),
            Type::Pointer(p) => {
                let storage = match p.storage_class {
                    StorageClass::Stream => StorageClass::Private,
                    s => s,
                };
                lower(p.base).pointer_to(storage)
            }
            Type::Function {
                return_type,
                parameters,
            } => Type::Function {
                return_type: Box::new(lower(*return_type)),
                parameters: parameters
                    .into_iter()
                    .map(|p| FunctionParameter {
                        ty: lower(p.ty),
                        modifiers: p.modifiers,
                    })
                    .collect(),
            },
            Type::OutputStream { base } => Type::OutputStream {
                base: Box::new(lower(*base)),
            },
            t => t,
        }
    }

    lower(ty.resolve_streams(&|k| types.resolve(k)))
}

fn needs_lowering(ty: &Type) -> bool {
    match ty {
        Type::Streams(_) | Type::Patch { .. } => true,
        Type::Pointer(p) => p.storage_class == StorageClass::Stream || needs_lowering(&p.base),
        Type::Array { element_type, .. } | Type::RuntimeArray { element_type } => {
            needs_lowering(element_type)
        }
        Type::Function {
            return_type,
            parameters,
        } => needs_lowering(return_type) || parameters.iter().any(|p| needs_lowering(&p.ty)),
        Type::OutputStream { base } => needs_lowering(base),
        _ => ty.contains_streams_placeholder(),
    }
}

fn relower_type_id(module: &mut Module, types: &StageTypes, id: Id) -> Id {
    match module.type_of(id) {
        Some(t) if needs_lowering(t) => {
            let lowered = lower_type(t, types);
            module.request_type_id(lowered)
        }
        _ => id,
    }
}

fn field_index(stream: &StreamVariableInfo, kind: StreamsKind) -> Result<u32> {
    let index = match kind {
        StreamsKind::Streams | StreamsKind::Constants => stream.stream_struct_field_index,
        StreamsKind::Input => stream.input_struct_field_index,
        StreamsKind::Output => stream.output_struct_field_index,
    };
    index.ok_or_else(|| {
        LinkError::malformed(format!(
            "stream {} has no field in the {} struct",
            stream.name,
            kind.suffix()
        ))
    })
}

/// Field of a stream slot accessed as a global. In tessellation stages patch slots only live in
/// the constants struct.
fn streams_field(
    analysis: &AnalysisResult,
    stage: ShaderStage,
    stream: Id,
) -> Option<Result<(&StreamVariableInfo, u32)>> {
    let s = analysis.streams.get(&stream)?;
    if s.patch && stage.has_patch_constants() {
        return Some(Err(LinkError::PatchStreamAccess {
            name: s.name.clone(),
        }));
    }
    Some(field_index(s, StreamsKind::Streams).map(|i| (s, i)))
}

/// Rewrites every live stream-accessing function of the stage, then marks it specialized.
pub fn patch_streams_accesses(
    module: &mut Module,
    analysis: &AnalysisResult,
    live: &mut LiveAnalysis,
    layout: &StageLayout,
) -> Result<()> {
    let value_types = module.value_types();

    for function in live.stream_methods_this_stage() {
        patch_function(module, analysis, &value_types, layout, function)?;
        if let Some(m) = live.referenced_methods.get_mut(&function) {
            m.specialized_for = Some(layout.stage);
        }
    }

    Ok(())
}

fn patch_function(
    module: &mut Module,
    analysis: &AnalysisResult,
    value_types: &HashMap<Id, Id>,
    layout: &StageLayout,
    function: Id,
) -> Result<()> {
    let range = module
        .function_range(function)
        .ok_or_else(|| LinkError::malformed(format!("function %{function} not found")))?;
    let body = module.function_ops[range.clone()].to_vec();
    trace!("{}: patching %{function}", layout.stage.id());

    let mut patched = Vec::with_capacity(body.len());
    for mut op in body {
        match op {
            Instruction::Load {
                result_type,
                result,
                pointer,
            } => {
                if let Some(f) = streams_field(analysis, layout.stage, pointer) {
                    let (s, index) = f?;
                    let ptr = private_field_pointer(module, layout, &mut patched, &s.ty, index);
                    patched.push(Instruction::Load {
                        result_type,
                        result,
                        pointer: ptr,
                    });
                    continue;
                }
            }
            Instruction::Store { pointer, object } => {
                if let Some(f) = streams_field(analysis, layout.stage, pointer) {
                    let (s, index) = f?;
                    let ptr = private_field_pointer(module, layout, &mut patched, &s.ty, index);
                    patched.push(Instruction::Store {
                        pointer: ptr,
                        object,
                    });
                    continue;
                }
            }
            Instruction::AccessChain {
                ref mut base,
                ref mut indexes,
                ..
            } => {
                if let Some(f) = streams_field(analysis, layout.stage, *base) {
                    let (_, index) = f?;
                    *base = layout.streams_variable;
                    indexes.insert(0, module.request_const_id(Constant::from(index)));
                }
            }
            Instruction::StreamAccess {
                result_type,
                result,
                base,
                stream,
            } => {
                let kind = value_types
                    .get(&base)
                    .and_then(|&t| module.type_of(t))
                    .and_then(Type::dereferenced)
                    .and_then(|t| match t {
                        &Type::Streams(k) => Some(k),
                        _ => None,
                    })
                    .ok_or_else(|| {
                        LinkError::malformed(format!(
                            "stream access %{result} is not based on a stream struct"
                        ))
                    })?;
                let s = analysis.streams.get(&stream).ok_or_else(|| {
                    LinkError::malformed(format!("stream access %{result} names no stream"))
                })?;
                if s.patch && kind != StreamsKind::Constants {
                    return Err(LinkError::PatchStreamAccess {
                        name: s.name.clone(),
                    });
                }
                let index = module.request_const_id(Constant::from(field_index(s, kind)?));
                op = Instruction::AccessChain {
                    result_type,
                    result,
                    base,
                    indexes: vec![index],
                };
            }
            Instruction::EmitStreamVertex { .. } if layout.stage == ShaderStage::Geometry => {
                emit_outputs(module, analysis, layout, &mut patched)?;
                patched.push(Instruction::EmitVertex);
                continue;
            }
            Instruction::EndStreamPrimitive { .. } if layout.stage == ShaderStage::Geometry => {
                patched.push(Instruction::EndPrimitive);
                continue;
            }
            Instruction::Function {
                ref mut function_type,
                ..
            } => {
                *function_type = relower_type_id(module, layout.types, *function_type);
            }
            _ => (),
        }

        if let Some(t) = op.result_type_id_mut() {
            *t = relower_type_id(module, layout.types, *t);
        }
        patched.push(op);
    }

    module.function_ops.splice(range, patched);

    Ok(())
}

fn private_field_pointer(
    module: &mut Module,
    layout: &StageLayout,
    ops: &mut Vec<Instruction>,
    ty: &Type,
    index: u32,
) -> Id {
    let result_type = module.request_type_id(ty.clone().pointer_to(StorageClass::Private));
    let index = module.request_const_id(Constant::from(index));
    let result = module.new_id();
    ops.push(Instruction::AccessChain {
        result_type,
        result,
        base: layout.streams_variable,
        indexes: vec![index],
    });

    result
}

/// Geometry output append: copies the current streams to the `Output` variables.
fn emit_outputs(
    module: &mut Module,
    analysis: &AnalysisResult,
    layout: &StageLayout,
    ops: &mut Vec<Instruction>,
) -> Result<()> {
    for o in &layout.interface.outputs {
        let Some(f) = streams_field(analysis, layout.stage, o.stream) else {
            continue;
        };
        let (s, index) = f?;
        let ptr = private_field_pointer(module, layout, ops, &s.ty, index);
        let result_type = module.request_type_id(s.ty.clone());
        let value = module.new_id();
        ops.push(Instruction::Load {
            result_type,
            result: value,
            pointer: ptr,
        });
        let value = convert_interface_value(module, ops, &s.ty, &o.interface_type, value)?;
        ops.push(Instruction::Store {
            pointer: o.variable,
            object: value,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::read_write::analyze_stream_read_writes;
    use crate::interface::variables::{generate_stream_struct_types, generate_stream_variables};
    use crate::error::ErrorKind;
    use crate::module::builder::{param, FunctionBuilder};
    use crate::spirv::asm::ParameterModifiers;
    use crate::spirv::PatchKind;
    use pretty_assertions::assert_eq;

    fn float4() -> Type {
        Type::float(32).of_vector(4)
    }

    struct Linked {
        module: Module,
        analysis: AnalysisResult,
        live: LiveAnalysis,
        types: StageTypes,
        interface: StageInterface,
        streams_variable: Id,
    }

    fn prepare(mut module: Module, entry: Id, stage: ShaderStage) -> Linked {
        let mut analysis = AnalysisResult::analyze(&module);
        let mut live = LiveAnalysis::default();
        analyze_stream_read_writes(&module, entry, &mut analysis, &mut live).unwrap();
        let interface =
            generate_stream_variables(&mut module, &mut analysis, stage, None, None).unwrap();
        let types = generate_stream_struct_types(&mut module, &mut analysis, stage, &interface);
        let streams_variable = module.declare_private("streams", types.streams.clone(), None);

        Linked {
            module,
            analysis,
            live,
            types,
            interface,
            streams_variable,
        }
    }

    #[test]
    fn loads_and_stores_go_through_the_scratch_struct() {
        let mut m = Module::new();
        let a = m.declare_stream("a", float4(), Some("TEXCOORD0"));
        let b = m.declare_stream("b", float4(), Some("TEXCOORD1"));
        let mut f = FunctionBuilder::new(&mut m, "VSMain", Type::Void, vec![]);
        let v = f.load(float4(), a);
        f.store(b, v);
        let entry = f.finish();

        let mut l = prepare(m, entry, ShaderStage::Vertex);
        let layout = StageLayout {
            stage: ShaderStage::Vertex,
            types: &l.types,
            interface: &l.interface,
            streams_variable: l.streams_variable,
        };
        patch_streams_accesses(&mut l.module, &l.analysis, &mut l.live, &layout).unwrap();

        let ops = &l.module.function_ops[l.module.function_range(entry).unwrap()];
        assert!(ops
            .iter()
            .all(|op| !op.referenced_ids().contains(&a) && !op.referenced_ids().contains(&b)));
        let chains = ops
            .iter()
            .filter(|op| {
                matches!(op, Instruction::AccessChain { base, .. } if *base == l.streams_variable)
            })
            .count();
        assert_eq!(chains, 2);
        assert_eq!(
            l.live.referenced_methods[&entry].specialized_for,
            Some(ShaderStage::Vertex)
        );
    }

    #[test]
    fn stream_struct_parameters_are_resolved() {
        let mut m = Module::new();
        let pos = m.declare_stream("pos", float4(), Some("SV_Position"));
        let mut f = FunctionBuilder::new(
            &mut m,
            "read",
            float4(),
            vec![param(Type::Streams(StreamsKind::Input), ParameterModifiers::None)],
        );
        let input = f.parameter(0);
        let ptr = f.stream_access(float4(), input, pos);
        let v = f.load(float4(), ptr);
        f.return_value(v);
        let read = f.finish();
        let mut f = FunctionBuilder::new(&mut m, "PSMain", Type::Void, vec![]);
        let local = f.local_variable(Type::Streams(StreamsKind::Input));
        f.call(float4(), read, vec![local]);
        let entry = f.finish();

        let mut l = prepare(m, entry, ShaderStage::Pixel);
        let layout = StageLayout {
            stage: ShaderStage::Pixel,
            types: &l.types,
            interface: &l.interface,
            streams_variable: l.streams_variable,
        };
        patch_streams_accesses(&mut l.module, &l.analysis, &mut l.live, &layout).unwrap();

        let Some(Type::Function { parameters, .. }) = l.module.function_type(read) else {
            panic!("read lost its type");
        };
        assert_eq!(
            parameters[0].ty,
            l.types.input.clone().pointer_to(StorageClass::Function)
        );
        let ops = &l.module.function_ops[l.module.function_range(read).unwrap()];
        assert!(ops.iter().all(|op| !matches!(op, Instruction::StreamAccess { .. })));
    }

    #[test]
    fn patch_streams_need_a_constants_struct() {
        let mut m = Module::new();
        let tf = m.declare_patch_stream("tf", Type::float(32).of_array(3), Some("SV_TessFactor"));
        let mut f = FunctionBuilder::new(
            &mut m,
            "DSMain",
            Type::Void,
            vec![param(
                Type::Patch {
                    kind: PatchKind::Output,
                    base: Box::new(Type::Streams(StreamsKind::Input)),
                    size: 3,
                },
                ParameterModifiers::None,
            )],
        );
        let patch = f.parameter(0);
        let first = f.access_chain(
            Type::Streams(StreamsKind::Input),
            StorageClass::Function,
            patch,
            &[0],
        );
        let ptr = f.stream_access(Type::float(32).of_array(3), first, tf);
        f.load(Type::float(32).of_array(3), ptr);
        let entry = f.finish();

        let mut l = prepare(m, entry, ShaderStage::Domain);
        let layout = StageLayout {
            stage: ShaderStage::Domain,
            types: &l.types,
            interface: &l.interface,
            streams_variable: l.streams_variable,
        };
        let err =
            patch_streams_accesses(&mut l.module, &l.analysis, &mut l.live, &layout).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Structural);
        assert!(matches!(err, LinkError::PatchStreamAccess { name } if name == "tf"));
    }

    #[test]
    fn lowering() {
        let types = StageTypes {
            streams: Type::Struct {
                name: "HS_STREAMS".into(),
                member_types: vec![],
            },
            input: Type::Struct {
                name: "HS_INPUT".into(),
                member_types: vec![],
            },
            output: Type::Struct {
                name: "HS_OUTPUT".into(),
                member_types: vec![],
            },
            constants: None,
        };
        let patch = Type::Patch {
            kind: PatchKind::Input,
            base: Box::new(Type::Streams(StreamsKind::Input)),
            size: 3,
        }
        .pointer_to(StorageClass::Function);
        assert_eq!(
            lower_type(&patch, &types),
            types
                .input
                .clone()
                .of_array(3)
                .pointer_to(StorageClass::Function)
        );
        assert_eq!(
            lower_type(&float4().pointer_to(StorageClass::Stream), &types),
            float4().pointer_to(StorageClass::Private)
        );
    }
}
