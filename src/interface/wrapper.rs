//! Synthesis of the `<entry>_Wrapper` entry point of a stage.

use std::collections::HashMap;

use log::debug;

use super::analysis::{AnalysisResult, LiveAnalysis, StreamVariableInfo};
use super::builtin::{self, convert_interface_value, Direction, InterfaceBinding};
use super::patcher::{lower_type, StageLayout};
use crate::error::{LinkError, Result};
use crate::module::builder::FunctionBuilder;
use crate::module::Module;
use crate::spirv::{
    asm::{Decoration, ExecutionMode, MemorySemantics, ParameterModifiers, Scope, StorageClass},
    Decorate, FunctionParameter, Id, Instruction, PatchKind, StreamsKind, Type,
};
use crate::symbol::meta::ShaderStage;

/// A function the wrapper calls.
#[derive(Debug, Clone, Copy)]
pub struct Callee<'a> {
    /// Id to call; a per-stage clone of `source` when the function was specialized.
    pub id: Id,
    /// Id the parameter semantics are attached to.
    pub source: Id,
    /// Signature before stream lowering, where patches and stream structs are still visible.
    pub function_type: &'a Type,
}

pub struct WrapperRequest<'a> {
    pub entry_name: &'a str,
    pub entry: Callee<'a>,
    pub patch_constant: Option<Callee<'a>>,
    pub layout: &'a StageLayout<'a>,
}

fn parameters_of(ty: &Type) -> Result<&[FunctionParameter]> {
    match ty {
        Type::Function { parameters, .. } => Ok(parameters),
        t => Err(LinkError::malformed(format!("{t} is not a function type"))),
    }
}

fn return_type_of(ty: &Type) -> Result<&Type> {
    match ty {
        Type::Function { return_type, .. } => Ok(return_type),
        t => Err(LinkError::malformed(format!("{t} is not a function type"))),
    }
}

/// Rewrites the geometry entry signature: the output stream parameter goes away and the input
/// topology moves from the first parameter to an execution mode.
fn strip_geometry_signature(
    module: &mut Module,
    request: &WrapperRequest,
) -> Result<ExecutionMode> {
    let entry = request.entry;
    let source_parameters = parameters_of(entry.function_type)?;
    let topology = source_parameters
        .first()
        .and_then(|p| p.modifiers.input_topology())
        .ok_or_else(|| LinkError::MissingGeometryTopology {
            entry: request.entry_name.to_owned(),
        })?;

    let current = module
        .function_type(entry.id)
        .cloned()
        .ok_or_else(|| LinkError::malformed(format!("function %{} has no type", entry.id)))?;
    let first = parameters_of(&current)?[0].ty.clone();
    module
        .replace_function_parameter(
            entry.id,
            0,
            FunctionParameter {
                ty: first,
                modifiers: ParameterModifiers::None,
            },
        )
        .ok_or_else(|| LinkError::malformed("geometry input parameter cannot be replaced"))?;

    let has_output_stream = source_parameters
        .get(1)
        .and_then(|p| p.ty.dereferenced())
        .is_some_and(|t| matches!(t, Type::OutputStream { .. }));
    if has_output_stream {
        module
            .remove_function_parameter(entry.id, 1)
            .ok_or_else(|| LinkError::malformed("geometry output stream cannot be removed"))?;
    }

    Ok(topology)
}

struct WrapperState<'a> {
    request: &'a WrapperRequest<'a>,
    analysis: &'a AnalysisResult,
    stage: ShaderStage,
    builtin_inputs: HashMap<String, (Id, Type)>,
    extra_variables: Vec<Id>,
    extra_methods: Vec<Id>,
    inputs: Option<Id>,
    outputs: Option<Id>,
}
impl<'a> WrapperState<'a> {
    fn stream(&self, id: Id) -> Result<&'a StreamVariableInfo> {
        self.analysis
            .streams
            .get(&id)
            .ok_or_else(|| LinkError::malformed(format!("stream %{id} vanished")))
    }

    fn struct_type(&self, kind: StreamsKind) -> Result<Type> {
        let types = self.request.layout.types;
        match kind {
            StreamsKind::Constants => types.constants.clone().ok_or_else(|| {
                LinkError::malformed(format!("{} stage has no constants struct", self.stage))
            }),
            k => Ok(types.resolve(k)),
        }
    }

    fn unsupported(&self, index: usize, parameter: &FunctionParameter) -> LinkError {
        LinkError::UnsupportedParameter {
            index,
            ty: parameter.ty.to_string(),
            entry: self.request.entry_name.to_owned(),
        }
    }

    /// Value of a builtin input converted to `ty`. The builtin variable is declared on first use.
    fn builtin_input(&mut self, f: &mut FunctionBuilder, semantic: &str, ty: &Type) -> Result<Id> {
        let key = semantic.to_ascii_uppercase();
        let (variable, interface_type) = match self.builtin_inputs.get(&key) {
            Some(v) => v.clone(),
            None => {
                let builtin =
                    match builtin::resolve_binding(self.stage, Direction::Input, Some(semantic))? {
                        InterfaceBinding::Builtin(b) => b,
                        _ => {
                            return Err(LinkError::UnmappedSemantic {
                                semantic: semantic.to_owned(),
                                stage: self.stage,
                                direction: Direction::Input.as_str(),
                            })
                        }
                    };
                let interface_type = builtin::interface_type(Some(builtin), ty);
                let module = f.module();
                let variable =
                    module.declare_global_variable(interface_type.clone(), StorageClass::Input);
                module.decorate(variable, &[Decorate::Builtin(builtin)]);
                module.add_name(variable, format!("in_{}_{semantic}", self.stage.id()));
                self.extra_variables.push(variable);
                self.builtin_inputs
                    .insert(key, (variable, interface_type.clone()));
                (variable, interface_type)
            }
        };

        let value = f.load(interface_type.clone(), variable);
        let (module, ops) = f.split();
        convert_interface_value(module, ops, &interface_type, ty, value)
    }

    /// Parameters bound to system values get a local filled from the builtin.
    fn semantic_arguments(
        &mut self,
        f: &mut FunctionBuilder,
        callee: Callee,
        args: &mut [Option<Id>],
    ) -> Result<()> {
        let is_callee = |id: Id| id == callee.source || id == callee.id;
        let semantics = f
            .module()
            .annotation_ops
            .iter()
            .filter_map(|op| match op {
                Instruction::MemberDecorateString {
                    target,
                    member,
                    decoration: Decoration::UserSemantic,
                    value,
                } if is_callee(*target) => Some((*member as usize, value.clone())),
                _ => None,
            })
            .collect::<Vec<_>>();
        let parameters = parameters_of(callee.function_type)?;

        for (index, semantic) in semantics {
            let ty = parameters
                .get(index)
                .and_then(|p| p.ty.dereferenced())
                .ok_or_else(|| {
                    LinkError::malformed(format!(
                        "semantic {semantic} on missing parameter {index}"
                    ))
                })?;
            let value = self.builtin_input(f, &semantic, ty)?;
            let local = f.local_variable(ty.clone());
            f.store(local, value);
            if let Some(slot) = args.get_mut(index) {
                *slot = Some(local);
            }
        }

        f.module().annotation_ops.retain(|op| {
            !matches!(op, Instruction::MemberDecorateString {
                target,
                decoration: Decoration::UserSemantic,
                ..
            } if is_callee(*target))
        });

        Ok(())
    }

    fn initializers(&mut self, f: &mut FunctionBuilder) {
        let streams_variable = self.request.layout.streams_variable;
        for s in self.analysis.streams.values() {
            let (Some(init), Some(field)) = (s.method_initializer, s.stream_struct_field_index)
            else {
                continue;
            };
            if s.patch && self.stage.has_patch_constants() {
                continue;
            }
            let value = f.call(s.ty.clone(), init, vec![]);
            let ptr =
                f.access_chain(s.ty.clone(), StorageClass::Private, streams_variable, &[field]);
            f.store(ptr, value);
            self.extra_methods.push(init);
        }

        for (&id, v) in &self.analysis.variables {
            let Some(init) = v.method_initializer else {
                continue;
            };
            if v.usage.used_this_stage {
                let value = f.call(v.ty.clone(), init, vec![]);
                f.store(id, value);
                self.extra_methods.push(init);
            }
        }
    }

    fn copy_inputs_to_streams(&mut self, f: &mut FunctionBuilder) -> Result<()> {
        let layout = self.request.layout;
        for i in &layout.interface.inputs {
            let s = self.stream(i.stream)?;
            let Some(field) = s.stream_struct_field_index else {
                continue;
            };
            let value = f.load(i.interface_type.clone(), i.variable);
            let (module, ops) = f.split();
            let value = convert_interface_value(module, ops, &i.interface_type, &s.ty, value)?;
            let ptr = f.access_chain(
                s.ty.clone(),
                StorageClass::Private,
                layout.streams_variable,
                &[field],
            );
            f.store(ptr, value);
        }

        Ok(())
    }

    fn copy_streams_to_outputs(&mut self, f: &mut FunctionBuilder) -> Result<()> {
        let layout = self.request.layout;
        for o in &layout.interface.outputs {
            let s = self.stream(o.stream)?;
            let Some(field) = s.stream_struct_field_index else {
                continue;
            };
            let ptr = f.access_chain(
                s.ty.clone(),
                StorageClass::Private,
                layout.streams_variable,
                &[field],
            );
            let value = f.load(s.ty.clone(), ptr);
            let (module, ops) = f.split();
            let value = convert_interface_value(module, ops, &s.ty, &o.interface_type, value)?;
            f.store(o.variable, value);
        }

        Ok(())
    }

    /// `inputs`: one `INPUT` struct per vertex, built from the arrayed input variables.
    fn gather_inputs(&mut self, f: &mut FunctionBuilder) -> Result<Id> {
        if let Some(v) = self.inputs {
            return Ok(v);
        }
        let layout = self.request.layout;
        let n = layout.interface.array_input_size.ok_or_else(|| {
            LinkError::malformed(format!("{} stage has no input array size", self.stage))
        })?;
        let input_type = layout.types.input.clone();

        let mut loaded = Vec::with_capacity(layout.interface.inputs.len());
        for i in &layout.interface.inputs {
            loaded.push(f.load(i.interface_type.clone().of_array(n), i.variable));
        }
        let mut vertices = Vec::with_capacity(n as usize);
        for index in 0..n {
            let mut fields = Vec::with_capacity(loaded.len());
            for (i, &array) in layout.interface.inputs.iter().zip(&loaded) {
                let s = self.stream(i.stream)?;
                let value = f.composite_extract(i.interface_type.clone(), array, &[index]);
                let (module, ops) = f.split();
                fields.push(convert_interface_value(
                    module,
                    ops,
                    &i.interface_type,
                    &s.ty,
                    value,
                )?);
            }
            vertices.push(f.composite_construct(input_type.clone(), fields));
        }
        let value = f.composite_construct(input_type.clone().of_array(n), vertices);
        let local = f.local_variable(input_type.of_array(n));
        f.module().add_name(local, "inputs");
        f.store(local, value);

        self.inputs = Some(local);
        Ok(local)
    }

    /// `outputs`: the control points already written by this hull invocation group.
    fn gather_outputs(&mut self, f: &mut FunctionBuilder, n: u32) -> Result<Id> {
        if let Some(v) = self.outputs {
            return Ok(v);
        }
        let layout = self.request.layout;
        let local = f.local_variable(layout.types.output.clone().of_array(n));
        f.module().add_name(local, "outputs");

        for index in 0..n {
            for o in &layout.interface.outputs {
                let s = self.stream(o.stream)?;
                let field = s.output_struct_field_index.ok_or_else(|| {
                    LinkError::malformed(format!("output {} has no field", s.name))
                })?;
                let src = f.access_chain(
                    o.interface_type.clone(),
                    StorageClass::Output,
                    o.variable,
                    &[index],
                );
                let value = f.load(o.interface_type.clone(), src);
                let (module, ops) = f.split();
                let value = convert_interface_value(module, ops, &o.interface_type, &s.ty, value)?;
                let dst =
                    f.access_chain(s.ty.clone(), StorageClass::Function, local, &[index, field]);
                f.store(dst, value);
            }
        }

        self.outputs = Some(local);
        Ok(local)
    }

    fn constants_from_patch_inputs(&mut self, f: &mut FunctionBuilder) -> Result<Id> {
        let layout = self.request.layout;
        let local = f.local_variable(self.struct_type(StreamsKind::Constants)?);
        for i in &layout.interface.patch_inputs {
            let s = self.stream(i.stream)?;
            let Some(field) = s.stream_struct_field_index else {
                continue;
            };
            let value = f.load(i.interface_type.clone(), i.variable);
            let (module, ops) = f.split();
            let value = convert_interface_value(module, ops, &i.interface_type, &s.ty, value)?;
            let dst = f.access_chain(s.ty.clone(), StorageClass::Function, local, &[field]);
            f.store(dst, value);
        }

        Ok(local)
    }

    fn tessellation_arguments(
        &mut self,
        f: &mut FunctionBuilder,
        callee: Callee,
        args: &mut [Option<Id>],
    ) -> Result<()> {
        let stage = self.stage;
        for (index, p) in parameters_of(callee.function_type)?.iter().enumerate() {
            if args.get(index).copied().flatten().is_some() {
                continue;
            }
            let base = p.ty.dereferenced().unwrap_or(&p.ty);
            let arg = match (base, p.modifiers) {
                (Type::Patch { kind: PatchKind::Input, .. }, _) if stage == ShaderStage::Hull => {
                    self.gather_inputs(f)?
                }
                (Type::Patch { kind: PatchKind::Output, .. }, _)
                    if stage == ShaderStage::Domain =>
                {
                    self.gather_inputs(f)?
                }
                (Type::Patch { kind: PatchKind::Output, size, .. }, _)
                    if stage == ShaderStage::Hull =>
                {
                    self.gather_outputs(f, *size)?
                }
                (
                    Type::Streams(StreamsKind::Constants),
                    ParameterModifiers::None | ParameterModifiers::In,
                ) => self.constants_from_patch_inputs(f)?,
                (
                    &Type::Streams(kind @ (StreamsKind::Output | StreamsKind::Constants)),
                    ParameterModifiers::Out,
                ) => f.local_variable(self.struct_type(kind)?),
                _ => return Err(self.unsupported(index, p)),
            };
            if let Some(slot) = args.get_mut(index) {
                *slot = Some(arg);
            }
        }

        Ok(())
    }

    /// Copies `out` struct arguments back to the interface variables after the call.
    /// Returns whether an `OUTPUT` struct was written that way.
    fn copy_back(
        &mut self,
        f: &mut FunctionBuilder,
        callee: Callee,
        args: &[Id],
    ) -> Result<bool> {
        let layout = self.request.layout;
        let mut wrote_outputs = false;

        for (p, &arg) in parameters_of(callee.function_type)?.iter().zip(args) {
            if p.modifiers != ParameterModifiers::Out {
                continue;
            }
            match p.ty.dereferenced() {
                Some(Type::Streams(StreamsKind::Output)) => {
                    let value = f.load(layout.types.output.clone(), arg);
                    let invocation = match layout.interface.array_output_size {
                        Some(_) => Some(self.builtin_input(
                            f,
                            "SV_OutputControlPointID",
                            &Type::uint(32),
                        )?),
                        None => None,
                    };
                    for o in &layout.interface.outputs {
                        let s = self.stream(o.stream)?;
                        let Some(field) = s.output_struct_field_index else {
                            continue;
                        };
                        let v = f.composite_extract(s.ty.clone(), value, &[field]);
                        let (module, ops) = f.split();
                        let v = convert_interface_value(module, ops, &s.ty, &o.interface_type, v)?;
                        let target = match invocation {
                            Some(i) => f.access_chain_dynamic(
                                o.interface_type.clone(),
                                StorageClass::Output,
                                o.variable,
                                vec![i],
                            ),
                            None => o.variable,
                        };
                        f.store(target, v);
                    }
                    wrote_outputs = true;
                }
                Some(Type::Streams(StreamsKind::Constants)) => {
                    let value = f.load(self.struct_type(StreamsKind::Constants)?, arg);
                    for o in &layout.interface.patch_outputs {
                        let s = self.stream(o.stream)?;
                        let Some(field) = s.stream_struct_field_index else {
                            continue;
                        };
                        let v = f.composite_extract(s.ty.clone(), value, &[field]);
                        let (module, ops) = f.split();
                        let v = convert_interface_value(module, ops, &s.ty, &o.interface_type, v)?;
                        f.store(o.variable, v);
                    }
                }
                _ => (),
            }
        }

        Ok(wrote_outputs)
    }

    fn complete_arguments(&self, callee: Callee, args: Vec<Option<Id>>) -> Result<Vec<Id>> {
        let parameters = parameters_of(callee.function_type)?;
        args.into_iter()
            .enumerate()
            .map(|(index, a)| {
                a.ok_or_else(|| match parameters.get(index) {
                    Some(p) => self.unsupported(index, p),
                    None => LinkError::malformed(format!("argument {index} out of range")),
                })
            })
            .collect()
    }

    fn call(&self, f: &mut FunctionBuilder, callee: Callee, args: Vec<Id>) -> Result<()> {
        let return_type = lower_type(
            return_type_of(callee.function_type)?,
            self.request.layout.types,
        );
        f.call(return_type, callee.id, args);

        Ok(())
    }

    /// `if (InvocationId == 0) patch_constant(...)`, after all control points are written.
    fn call_patch_constant(&mut self, f: &mut FunctionBuilder, pc: Callee) -> Result<()> {
        let execution = f.constant(Scope::Workgroup as u32);
        let memory = f.constant(Scope::Invocation as u32);
        let semantics = f.constant(MemorySemantics::NONE.bits());
        f.push(Instruction::ControlBarrier {
            execution,
            memory,
            semantics,
        });

        let invocation = self.builtin_input(f, "SV_OutputControlPointID", &Type::uint(32))?;
        let zero = f.constant(0u32);
        let is_first = f.iequal(invocation, zero);

        let mut called = Ok(());
        f.if_then(is_first, |f| called = self.patch_constant_body(f, pc));
        called
    }

    fn patch_constant_body(&mut self, f: &mut FunctionBuilder, pc: Callee) -> Result<()> {
        let mut args = vec![None; parameters_of(pc.function_type)?.len()];
        self.semantic_arguments(f, pc, &mut args)?;
        self.tessellation_arguments(f, pc, &mut args)?;
        let args = self.complete_arguments(pc, args)?;
        self.call(f, pc, args.clone())?;
        self.copy_back(f, pc, &args)?;
        self.extra_methods.push(pc.id);

        Ok(())
    }
}

/// Builds the wrapper, declares it as the stage's entry point and returns its id.
pub fn generate_wrapper(
    module: &mut Module,
    analysis: &AnalysisResult,
    live: &mut LiveAnalysis,
    request: &WrapperRequest,
) -> Result<Id> {
    let layout = request.layout;
    let stage = layout.stage;
    let entry = request.entry;
    let topology = match stage {
        ShaderStage::Geometry => Some(strip_geometry_signature(module, request)?),
        _ => None,
    };

    let wrapper_name = format!("{}_Wrapper", request.entry_name);
    let mut state = WrapperState {
        request,
        analysis,
        stage,
        builtin_inputs: HashMap::new(),
        extra_variables: Vec::new(),
        extra_methods: Vec::new(),
        inputs: None,
        outputs: None,
    };
    let mut f = FunctionBuilder::new(module, wrapper_name.clone(), Type::Void, vec![]);

    state.initializers(&mut f);
    let mut args = vec![None; parameters_of(entry.function_type)?.len()];
    state.semantic_arguments(&mut f, entry, &mut args)?;

    match stage {
        ShaderStage::Hull | ShaderStage::Domain => {
            state.tessellation_arguments(&mut f, entry, &mut args)?;
            let args = state.complete_arguments(entry, args)?;
            state.call(&mut f, entry, args.clone())?;
            let wrote_outputs = state.copy_back(&mut f, entry, &args)?;
            if stage == ShaderStage::Domain && !wrote_outputs {
                state.copy_streams_to_outputs(&mut f)?;
            }
            if let Some(pc) = request.patch_constant {
                state.call_patch_constant(&mut f, pc)?;
            }
        }
        ShaderStage::Geometry => {
            let inputs = state.gather_inputs(&mut f)?;
            if let Some(slot @ None) = args.first_mut() {
                *slot = Some(inputs);
            }
            if args.len() > 1 {
                args.remove(1);
            }
            let current = f
                .module()
                .function_type(entry.id)
                .cloned()
                .ok_or_else(|| LinkError::malformed("geometry entry lost its type"))?;
            let lowered = Callee {
                id: entry.id,
                source: entry.source,
                function_type: &current,
            };
            let args = state.complete_arguments(lowered, args)?;
            state.call(&mut f, entry, args)?;
        }
        ShaderStage::Vertex | ShaderStage::Pixel | ShaderStage::Compute => {
            state.copy_inputs_to_streams(&mut f)?;
            let args = state.complete_arguments(entry, args)?;
            state.call(&mut f, entry, args)?;
            state.copy_streams_to_outputs(&mut f)?;
        }
    }

    let wrapper = f.finish();
    if let Some(mode) = topology {
        module.add_execution_mode(wrapper, mode, &[]);
    }

    let mut interface = layout.interface.variables().collect::<Vec<_>>();
    interface.push(layout.streams_variable);
    interface.extend(
        analysis
            .variables
            .iter()
            .filter(|(_, v)| v.usage.used_this_stage)
            .map(|(&id, _)| id),
    );
    interface.extend(
        analysis
            .cbuffers
            .iter()
            .filter(|(_, c)| c.usage.used_this_stage)
            .map(|(&id, _)| id),
    );
    interface.extend(
        analysis
            .resources
            .iter()
            .filter(|(_, r)| r.usage.used_this_stage)
            .map(|(&id, _)| id),
    );
    interface.extend(state.extra_variables.iter().copied());
    module.entry_point_ops.push(Instruction::EntryPoint {
        execution_model: stage.execution_model(),
        entry_point: wrapper,
        name: wrapper_name.clone(),
        interface,
    });

    live.extra_referenced_methods.insert(wrapper);
    live.extra_referenced_methods
        .extend(state.extra_methods.iter().copied());
    debug!("{stage}: generated {wrapper_name} (%{wrapper})");

    Ok(wrapper)
}
