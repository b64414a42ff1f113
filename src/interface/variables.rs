//! Per-stage interface variables and the concrete stream struct types.

use log::trace;

use super::analysis::AnalysisResult;
use super::builtin::{self, Direction, InterfaceBinding};
use crate::error::{LinkError, Result};
use crate::module::Module;
use crate::spirv::{
    asm::{Builtin, StorageClass},
    Decorate, Id, Instruction, StreamsKind, Type, TypeStructMember,
};
use crate::symbol::meta::{
    classify_semantic, is_system_value, SemanticKind, ShaderStage, SystemValue,
};

/// One stream slot crossing the stage boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceStream {
    pub stream: Id,
    /// The `Input`/`Output` variable.
    pub variable: Id,
    /// Element type of the interface variable, after builtin coercion and before arraying.
    pub interface_type: Type,
    pub builtin: Option<Builtin>,
}

#[derive(Debug, Clone, Default)]
pub struct StageInterface {
    pub inputs: Vec<InterfaceStream>,
    pub outputs: Vec<InterfaceStream>,
    pub patch_inputs: Vec<InterfaceStream>,
    pub patch_outputs: Vec<InterfaceStream>,
    pub array_input_size: Option<u32>,
    pub array_output_size: Option<u32>,
}
impl StageInterface {
    /// Every generated interface variable id.
    pub fn variables(&self) -> impl Iterator<Item = Id> + '_ {
        self.inputs
            .iter()
            .chain(&self.outputs)
            .chain(&self.patch_inputs)
            .chain(&self.patch_outputs)
            .map(|s| s.variable)
    }
}

/// The concrete `<STAGE>_*` struct types replacing the stream placeholders.
#[derive(Debug, Clone)]
pub struct StageTypes {
    pub streams: Type,
    pub input: Type,
    pub output: Type,
    pub constants: Option<Type>,
}
impl StageTypes {
    pub fn resolve(&self, kind: StreamsKind) -> Type {
        match kind {
            StreamsKind::Streams => self.streams.clone(),
            StreamsKind::Input => self.input.clone(),
            StreamsKind::Output => self.output.clone(),
            // stages without patch constants never see this placeholder; keep it
            // unresolvable rather than aliasing another struct
            StreamsKind::Constants => self
                .constants
                .clone()
                .unwrap_or(Type::Streams(StreamsKind::Constants)),
        }
    }
}

fn is_integer_interface(ty: &Type) -> bool {
    matches!(ty, Type::Scalar(_) | Type::Vector(..) | Type::Matrix(..))
        && ty.scalar_element().is_some_and(|s| !s.is_floating())
}

fn declare_interface_variable(
    module: &mut Module,
    name: String,
    ty: Type,
    storage_class: StorageClass,
    decorations: &[Decorate],
) -> Id {
    let id = module.declare_global_variable(ty, storage_class);
    module.add_name(id, name);
    module.decorate(id, decorations);

    id
}

/// Declares the `Input`/`Output` variables of `stage` and assigns locations.
pub fn generate_stream_variables(
    module: &mut Module,
    analysis: &mut AnalysisResult,
    stage: ShaderStage,
    array_input_size: Option<u32>,
    array_output_size: Option<u32>,
) -> Result<StageInterface> {
    // Render targets keep their own slot.
    for s in analysis.streams.values_mut() {
        s.input_id = None;
        s.output_id = None;
        if !s.output || s.output_layout_location.is_some() {
            continue;
        }
        if let Some(SemanticKind::System(SystemValue::Target(n))) =
            s.semantic.as_deref().map(classify_semantic)
        {
            s.output_layout_location = Some(n);
        }
    }
    let mut next_input_location = 0;
    let mut next_output_location = analysis
        .streams
        .values()
        .filter(|s| s.output)
        .filter_map(|s| s.output_layout_location)
        .map(|l| l + 1)
        .max()
        .unwrap_or(0);

    let mut interface = StageInterface {
        array_input_size,
        array_output_size,
        ..StageInterface::default()
    };
    let stage_id = stage.id();

    for (&id, stream) in analysis.streams.iter_mut() {
        if stream.input() {
            match builtin::resolve_binding(stage, Direction::Input, stream.semantic.as_deref())? {
                InterfaceBinding::NotForwarded => {
                    trace!("{stage_id}: {} is not forwarded", stream.name);
                }
                binding => {
                    let mut decorations = Vec::new();
                    let builtin = match binding {
                        InterfaceBinding::Builtin(b) => {
                            decorations.push(Decorate::Builtin(b));
                            Some(b)
                        }
                        _ => {
                            let location = *stream.input_layout_location.get_or_insert_with(|| {
                                next_input_location += 1;
                                next_input_location - 1
                            });
                            decorations.push(Decorate::Location(location));
                            if let Some(s) = &stream.semantic {
                                decorations.push(Decorate::UserSemantic(s.clone()));
                            }
                            None
                        }
                    };
                    if is_integer_interface(&stream.ty) {
                        decorations.push(Decorate::Flat);
                    }
                    if stream.patch {
                        decorations.push(Decorate::Patch);
                    }

                    let interface_type = builtin::interface_type(builtin, &stream.ty);
                    let variable_type = match array_input_size {
                        Some(n) if !stream.patch => interface_type.clone().of_array(n),
                        _ => interface_type.clone(),
                    };
                    let variable = declare_interface_variable(
                        module,
                        format!("in_{stage_id}_{}", stream.name),
                        variable_type,
                        StorageClass::Input,
                        &decorations,
                    );
                    stream.input_id = Some(variable);

                    let s = InterfaceStream {
                        stream: id,
                        variable,
                        interface_type,
                        builtin,
                    };
                    if stream.patch {
                        interface.patch_inputs.push(s);
                    } else {
                        interface.inputs.push(s);
                    }
                }
            }
        }

        if stream.output {
            match builtin::resolve_binding(stage, Direction::Output, stream.semantic.as_deref())? {
                InterfaceBinding::NotForwarded => {
                    trace!("{stage_id}: {} is not forwarded", stream.name);
                }
                binding => {
                    let mut decorations = Vec::new();
                    let builtin = match binding {
                        InterfaceBinding::Builtin(b) => {
                            decorations.push(Decorate::Builtin(b));
                            Some(b)
                        }
                        _ => {
                            let location = match stream.output_layout_location {
                                Some(l) => l,
                                None if stream.semantic.as_deref().is_some_and(is_system_value) => {
                                    next_output_location += 1;
                                    next_output_location - 1
                                }
                                None => {
                                    return Err(LinkError::MissingOutputLocation {
                                        name: stream.name.clone(),
                                        stage,
                                    })
                                }
                            };
                            stream.output_layout_location = Some(location);
                            decorations.push(Decorate::Location(location));
                            if let Some(s) = &stream.semantic {
                                decorations.push(Decorate::UserSemantic(s.clone()));
                            }
                            None
                        }
                    };
                    if is_integer_interface(&stream.ty) {
                        decorations.push(Decorate::Flat);
                    }
                    if stream.patch {
                        decorations.push(Decorate::Patch);
                    }

                    let interface_type = builtin::interface_type(builtin, &stream.ty);
                    let variable_type = match array_output_size {
                        Some(n) if !stream.patch => interface_type.clone().of_array(n),
                        _ => interface_type.clone(),
                    };
                    let variable = declare_interface_variable(
                        module,
                        format!("out_{stage_id}_{}", stream.name),
                        variable_type,
                        StorageClass::Output,
                        &decorations,
                    );
                    stream.output_id = Some(variable);

                    let s = InterfaceStream {
                        stream: id,
                        variable,
                        interface_type,
                        builtin,
                    };
                    if stream.patch {
                        interface.patch_outputs.push(s);
                    } else {
                        interface.outputs.push(s);
                    }
                }
            }
        }
    }

    Ok(interface)
}

fn declare_struct(module: &mut Module, name: String, members: Vec<TypeStructMember>) -> Type {
    let ty = Type::Struct {
        name: name.clone(),
        member_types: members,
    };
    let id = module.request_type_id(ty.clone());
    if module.name_of(id).is_none() {
        module.add_name(id, name);
        if let Type::Struct { member_types, .. } = &ty {
            for (n, m) in member_types.iter().enumerate() {
                module.debug_ops.push(Instruction::MemberName {
                    target: id,
                    member: n as _,
                    name: m.name.clone(),
                });
            }
        }
    }

    ty
}

/// Lays out `<STAGE>_STREAMS`, `_INPUT`, `_OUTPUT` (and `_CONSTANTS` for tessellation stages)
/// and records each stream's field indices.
pub fn generate_stream_struct_types(
    module: &mut Module,
    analysis: &mut AnalysisResult,
    stage: ShaderStage,
    interface: &StageInterface,
) -> StageTypes {
    let has_constants = stage.has_patch_constants();
    let mut stream_fields = Vec::new();
    let mut constant_fields = Vec::new();

    for s in analysis.streams.values_mut() {
        s.stream_struct_field_index = None;
        s.input_struct_field_index = None;
        s.output_struct_field_index = None;
        if !s.has_struct_field() {
            continue;
        }
        let fields = if s.patch && has_constants {
            &mut constant_fields
        } else {
            &mut stream_fields
        };
        s.stream_struct_field_index = Some(fields.len() as _);
        fields.push(TypeStructMember {
            name: s.name.clone(),
            ty: s.ty.clone(),
        });
    }

    let mut struct_fields = |streams: &[InterfaceStream], input: bool| {
        let mut fields = Vec::with_capacity(streams.len());
        for i in streams {
            let Some(s) = analysis.streams.get_mut(&i.stream) else {
                continue;
            };
            let index = Some(fields.len() as _);
            if input {
                s.input_struct_field_index = index;
            } else {
                s.output_struct_field_index = index;
            }
            fields.push(TypeStructMember {
                name: s.name.clone(),
                ty: s.ty.clone(),
            });
        }
        fields
    };
    let input_fields = struct_fields(&interface.inputs, true);
    let output_fields = struct_fields(&interface.outputs, false);

    let stage_id = stage.id();
    StageTypes {
        input: declare_struct(module, format!("{stage_id}_INPUT"), input_fields),
        output: declare_struct(module, format!("{stage_id}_OUTPUT"), output_fields),
        streams: declare_struct(module, format!("{stage_id}_STREAMS"), stream_fields),
        constants: has_constants
            .then(|| declare_struct(module, format!("{stage_id}_CONSTANTS"), constant_fields)),
    }
}
