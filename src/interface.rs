//! Links the stream-based entry points of a module into an explicit multi-stage pipeline.
//!
//! Stages are processed consumer first (pixel, geometry, domain, hull, vertex): whatever a stage
//! reads becomes an output of the stage in front of it. Each linked stage gets concrete
//! interface variables, its own `<STAGE>_STREAMS` struct and a `<entry>_Wrapper` entry point.

use std::collections::{BTreeMap, HashSet};

use log::{debug, warn};

use crate::config::LinkerConfig;
use crate::error::{LinkError, Result};
use crate::module::Module;
use crate::spirv::{
    asm::{Capability, Decoration, ExecutionMode, StorageClass},
    Id, Instruction, Type,
};
use crate::symbol::meta::{
    classify_semantic, ParsedSemantic, SemanticKind, ShaderStage, SystemValue,
};
use crate::symbol::SymbolTable;

use self::analysis::{AnalysisResult, LiveAnalysis};
use self::patcher::StageLayout;
use self::wrapper::{Callee, WrapperRequest};

pub mod analysis;
pub mod builtin;
pub mod dce;
pub mod duplicator;
pub mod merger;
pub mod patcher;
pub mod read_write;
pub mod variables;
pub mod wrapper;

/// A generated entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPointInfo {
    pub name: String,
    pub id: Id,
    pub stage: ShaderStage,
}

/// A vertex stage input fed from a vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexInputAttribute {
    pub location: u32,
    pub semantic_name: String,
    pub semantic_index: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkResult {
    /// In pipeline order.
    pub entry_points: Vec<EntryPointInfo>,
    pub input_attributes: Vec<VertexInputAttribute>,
}

/// Entry points found in the symbol table, checked before anything is rewritten.
#[derive(Debug, Default)]
struct LinkPlan {
    entries: BTreeMap<ShaderStage, Id>,
    patch_constant: Option<Id>,
    output_vertices: Option<u32>,
}
impl LinkPlan {
    fn entry(&self, stage: ShaderStage) -> Option<Id> {
        self.entries.get(&stage).copied()
    }
}

pub struct InterfaceProcessor {
    config: LinkerConfig,
}
impl InterfaceProcessor {
    pub const fn new(config: LinkerConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &LinkerConfig {
        &self.config
    }

    /// Links every stage found in `table`, removes dead code and returns the new entry points.
    /// Running it again on its own output returns the same entry points and changes nothing.
    pub fn process(&self, table: &mut SymbolTable, module: &mut Module) -> Result<LinkResult> {
        if is_already_linked(module) {
            debug!("module has no stream left, returning existing entry points");
            return Ok(existing_link_result(module));
        }

        let plan = self.plan(table, module)?;
        let source_globals = global_ids(module);
        let mut linker = StageLinker {
            config: &self.config,
            module,
            table,
            analysis: AnalysisResult::default(),
            live: LiveAnalysis::default(),
            entry_points: Vec::new(),
        };
        let input_attributes = linker.run(&plan)?;

        let StageLinker {
            module,
            table,
            analysis,
            live,
            mut entry_points,
            ..
        } = linker;
        let linker_declared = global_ids(module)
            .difference(&source_globals)
            .copied()
            .collect();
        dce::remove_unreferenced_code(module, table, &analysis, &live, &linker_declared);

        entry_points.sort_by_key(|e| e.stage);
        if entry_points
            .iter()
            .any(|e| matches!(e.stage, ShaderStage::Hull | ShaderStage::Domain))
        {
            module.add_capability(Capability::Tessellation);
        }
        if entry_points.iter().any(|e| e.stage == ShaderStage::Geometry) {
            module.add_capability(Capability::Geometry);
        }

        Ok(LinkResult {
            entry_points,
            input_attributes,
        })
    }

    fn plan(&self, table: &SymbolTable, module: &Module) -> Result<LinkPlan> {
        let names = &self.config.entry_points;
        let mut plan = LinkPlan::default();
        for stage in ShaderStage::ALL {
            if let Some(id) = table.resolve_function(names.get(stage)) {
                plan.entries.insert(stage, id);
            }
        }

        match (plan.entry(ShaderStage::Pixel), plan.entry(ShaderStage::Compute)) {
            (None, None) => return Err(LinkError::NoPixelOrCompute),
            (Some(_), Some(_)) => return Err(LinkError::BothPixelAndCompute),
            (None, Some(_)) => {
                let ignored = plan
                    .entries
                    .keys()
                    .filter(|&&s| s != ShaderStage::Compute)
                    .map(ShaderStage::to_string)
                    .collect::<Vec<_>>();
                if !ignored.is_empty() {
                    warn!(
                        "compute shader found, ignoring {} entry points",
                        ignored.join(", ")
                    );
                }
                plan.entries.retain(|&s, _| s == ShaderStage::Compute);
                return Ok(plan);
            }
            (Some(_), None) => (),
        }

        if plan.entry(ShaderStage::Vertex).is_none() {
            if let Some(&stage) = plan.entries.keys().find(|s| {
                matches!(
                    s,
                    ShaderStage::Hull | ShaderStage::Domain | ShaderStage::Geometry
                )
            }) {
                return Err(LinkError::MissingVertexStage { stage });
            }
        }

        if let Some(hull) = plan.entry(ShaderStage::Hull) {
            let entry = names.get(ShaderStage::Hull);
            plan.output_vertices = Some(
                module
                    .execution_mode_args(hull, ExecutionMode::OutputVertices)
                    .and_then(|a| a.first().copied())
                    .ok_or_else(|| LinkError::MissingOutputControlPoints {
                        entry: entry.to_owned(),
                    })?,
            );
            if let Some(name) = module.decoration_string(hull, Decoration::PatchConstantFunc) {
                plan.patch_constant = Some(table.resolve_function(name).ok_or_else(|| {
                    LinkError::MissingPatchConstantFunction {
                        name: name.to_owned(),
                    }
                })?);
            }
        }

        if let Some(geometry) = plan.entry(ShaderStage::Geometry) {
            let has_topology = match module.function_type(geometry) {
                Some(Type::Function { parameters, .. }) => parameters
                    .first()
                    .and_then(|p| p.modifiers.input_topology())
                    .is_some(),
                _ => false,
            };
            if !has_topology {
                return Err(LinkError::MissingGeometryTopology {
                    entry: names.get(ShaderStage::Geometry).to_owned(),
                });
            }
        }

        Ok(plan)
    }
}

fn global_ids(module: &Module) -> HashSet<Id> {
    module
        .global_variable_ops
        .iter()
        .filter_map(Instruction::result_id)
        .collect()
}

/// A linked module has entry points and no stream slot left.
fn is_already_linked(module: &Module) -> bool {
    !module.entry_point_ops.is_empty()
        && !module.global_variable_ops.iter().any(|op| {
            matches!(
                op,
                Instruction::Variable {
                    storage_class: StorageClass::Stream,
                    ..
                }
            )
        })
}

fn existing_link_result(module: &Module) -> LinkResult {
    let mut entry_points = module
        .entry_points()
        .map(|(name, id, model)| EntryPointInfo {
            name: name.to_owned(),
            id,
            stage: ShaderStage::from_execution_model(model),
        })
        .collect::<Vec<_>>();
    entry_points.sort_by_key(|e| e.stage);

    let mut input_attributes = Vec::new();
    for op in &module.entry_point_ops {
        let Instruction::EntryPoint {
            execution_model,
            interface,
            ..
        } = op
        else {
            continue;
        };
        if ShaderStage::from_execution_model(*execution_model) != ShaderStage::Vertex {
            continue;
        }
        for &v in interface {
            let is_input = matches!(
                module.global_variable(v),
                Some(Instruction::Variable {
                    storage_class: StorageClass::Input,
                    ..
                })
            );
            let location = module
                .decoration_args(v, Decoration::Location)
                .and_then(|a| a.first().copied());
            let semantic = module.decoration_string(v, Decoration::UserSemantic);
            if let (true, Some(location), Some(semantic)) = (is_input, location, semantic) {
                let ParsedSemantic { name, index } = ParsedSemantic::parse(semantic);
                input_attributes.push(VertexInputAttribute {
                    location,
                    semantic_name: name,
                    semantic_index: index,
                });
            }
        }
    }
    input_attributes.sort_by_key(|a| a.location);

    LinkResult {
        entry_points,
        input_attributes,
    }
}

struct StageLinker<'a> {
    config: &'a LinkerConfig,
    module: &'a mut Module,
    table: &'a mut SymbolTable,
    analysis: AnalysisResult,
    live: LiveAnalysis,
    entry_points: Vec<EntryPointInfo>,
}
impl StageLinker<'_> {
    /// Links every planned stage and returns the vertex input attributes.
    fn run(&mut self, plan: &LinkPlan) -> Result<Vec<VertexInputAttribute>> {
        self.analysis = AnalysisResult::analyze(self.module);
        merger::merge_same_semantic_variables(self.module, &mut self.analysis)?;

        if let Some(compute) = plan.entry(ShaderStage::Compute) {
            self.analyze(compute)?;
            self.link_stage(ShaderStage::Compute, compute, plan)?;
            return Ok(Vec::new());
        }

        if let Some(pixel) = plan.entry(ShaderStage::Pixel) {
            self.analyze(pixel)?;
            for s in self.analysis.streams.values_mut() {
                let is_pixel_output = matches!(
                    s.semantic.as_deref().map(classify_semantic),
                    Some(SemanticKind::System(
                        SystemValue::Target(_)
                            | SystemValue::Depth
                            | SystemValue::DepthGreaterEqual
                            | SystemValue::DepthLessEqual
                    ))
                );
                if is_pixel_output && s.write {
                    s.output = true;
                }
            }

            if self.analysis.streams.values().any(|s| s.output) {
                let wrapper = self.link_stage(ShaderStage::Pixel, pixel, plan)?;
                if self.config.origin_upper_left {
                    self.module
                        .add_execution_mode(wrapper, ExecutionMode::OriginUpperLeft, &[]);
                }
                self.end_stage(ShaderStage::Pixel);
            } else {
                // depth-only pass: nothing of the pixel stage survives
                warn!(
                    "pixel shader {} has no output, skipping it",
                    self.config.entry_points.get(ShaderStage::Pixel)
                );
                self.analysis = AnalysisResult::analyze(self.module);
                self.live = LiveAnalysis::default();
            }
        }

        for stage in [ShaderStage::Geometry, ShaderStage::Domain, ShaderStage::Hull] {
            let Some(entry) = plan.entry(stage) else {
                continue;
            };
            self.analyze(entry)?;
            if stage == ShaderStage::Hull {
                if let Some(pc) = plan.patch_constant {
                    read_write::analyze_stream_read_writes(
                        self.module,
                        pc,
                        &mut self.analysis,
                        &mut self.live,
                    )?;
                }
            }
            self.force_outputs(stage);
            self.link_stage(stage, entry, plan)?;
            self.end_stage(stage);
        }

        let Some(vertex) = plan.entry(ShaderStage::Vertex) else {
            return Ok(Vec::new());
        };
        self.analyze(vertex)?;
        self.force_outputs(ShaderStage::Vertex);
        self.link_stage(ShaderStage::Vertex, vertex, plan)?;

        let mut attributes = Vec::new();
        for s in self.analysis.streams.values() {
            // builtins never get a location
            let (true, Some(location)) = (s.input(), s.input_layout_location) else {
                continue;
            };
            let semantic = s
                .semantic
                .as_deref()
                .ok_or_else(|| LinkError::VertexInputWithoutSemantic {
                    name: s.name.clone(),
                })?;
            let ParsedSemantic { name, index } = ParsedSemantic::parse(semantic);
            attributes.push(VertexInputAttribute {
                location,
                semantic_name: name,
                semantic_index: index,
            });
        }
        attributes.sort_by_key(|a| a.location);

        Ok(attributes)
    }

    fn analyze(&mut self, entry: Id) -> Result<()> {
        read_write::mark_initialized_streams(&mut self.analysis);
        read_write::analyze_stream_read_writes(
            self.module,
            entry,
            &mut self.analysis,
            &mut self.live,
        )
    }

    /// Values the fixed-function pipeline consumes after `stage` are always written out.
    fn force_outputs(&mut self, stage: ShaderStage) {
        for s in self.analysis.streams.values_mut() {
            let Some(SemanticKind::System(sv)) = s.semantic.as_deref().map(classify_semantic)
            else {
                continue;
            };
            let forced = match sv {
                SystemValue::Position => true,
                SystemValue::TessFactor | SystemValue::InsideTessFactor => {
                    stage == ShaderStage::Hull
                }
                _ => false,
            };
            if forced {
                s.output = true;
            }
        }
    }

    fn end_stage(&mut self, stage: ShaderStage) {
        read_write::clear_generated_system_values(&mut self.analysis, stage);
        read_write::reset_used_this_stage(&mut self.analysis, &mut self.live);
        merger::propagate_streams_from_previous_stage(&mut self.analysis);
    }

    fn link_stage(&mut self, stage: ShaderStage, entry: Id, plan: &LinkPlan) -> Result<Id> {
        let entry_name = self.config.entry_points.get(stage);
        debug!("linking {stage} stage from {entry_name} (%{entry})");

        let entry_type = self
            .module
            .function_type(entry)
            .cloned()
            .ok_or_else(|| LinkError::malformed(format!("entry point {entry_name} has no type")))?;
        let array_input_size = array_input_size(stage, &entry_type, entry_name)?;
        let array_output_size = match stage {
            ShaderStage::Hull => plan.output_vertices,
            _ => None,
        };

        let interface = variables::generate_stream_variables(
            self.module,
            &mut self.analysis,
            stage,
            array_input_size,
            array_output_size,
        )?;
        let types = variables::generate_stream_struct_types(
            self.module,
            &mut self.analysis,
            stage,
            &interface,
        );
        let streams_variable =
            self.module
                .declare_private(&format!("streams{}", stage.id()), types.streams.clone(), None);

        let patch_constant = match (stage, plan.patch_constant) {
            (ShaderStage::Hull, Some(pc)) => {
                let ty = self.module.function_type(pc).cloned().ok_or_else(|| {
                    LinkError::malformed(format!("patch constant function %{pc} has no type"))
                })?;
                Some((pc, ty))
            }
            _ => None,
        };

        duplicator::snapshot_pristine_bodies(self.module, &mut self.live)?;
        let clones = duplicator::duplicate_methods(self.module, &mut self.live, stage)?;

        let layout = StageLayout {
            stage,
            types: &types,
            interface: &interface,
            streams_variable,
        };
        patcher::patch_streams_accesses(self.module, &self.analysis, &mut self.live, &layout)?;

        let callee = |source: Id, function_type| Callee {
            id: clones.get(&source).copied().unwrap_or(source),
            source,
            function_type,
        };
        let request = WrapperRequest {
            entry_name,
            entry: callee(entry, &entry_type),
            patch_constant: patch_constant.as_ref().map(|(pc, ty)| callee(*pc, ty)),
            layout: &layout,
        };
        let wrapper =
            wrapper::generate_wrapper(self.module, &self.analysis, &mut self.live, &request)?;

        let called = request.entry.id;
        for op in &mut self.module.execution_mode_ops {
            if let Instruction::ExecutionMode { entry_point, .. } = op {
                if *entry_point == entry || *entry_point == called {
                    *entry_point = wrapper;
                }
            }
        }

        let wrapper_name = format!("{entry_name}_Wrapper");
        self.table.declare_function(wrapper_name.clone(), wrapper);
        self.entry_points.push(EntryPointInfo {
            name: wrapper_name,
            id: wrapper,
            stage,
        });

        Ok(wrapper)
    }
}

/// Per-vertex input count of an arrayed stage, read from the entry's first parameter.
fn array_input_size(
    stage: ShaderStage,
    entry_type: &Type,
    entry_name: &str,
) -> Result<Option<u32>> {
    let Type::Function { parameters, .. } = entry_type else {
        return Err(LinkError::malformed(format!(
            "entry point {entry_name} is not a function"
        )));
    };
    let pointee = |p: &crate::spirv::FunctionParameter| {
        p.ty.dereferenced().cloned().unwrap_or_else(|| p.ty.clone())
    };

    match stage {
        ShaderStage::Geometry => match parameters.first().map(pointee) {
            Some(Type::Array { length, .. }) => Ok(Some(length)),
            _ => Err(LinkError::malformed(format!(
                "first parameter of geometry shader {entry_name} is not an array"
            ))),
        },
        ShaderStage::Hull | ShaderStage::Domain => parameters
            .iter()
            .map(pointee)
            .find_map(|t| match t {
                Type::Patch { size, .. } => Some(Some(size)),
                _ => None,
            })
            .ok_or_else(|| {
                LinkError::malformed(format!("{stage} shader {entry_name} has no patch parameter"))
            }),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::module::builder::{param, FunctionBuilder};
    use crate::spirv::asm::ParameterModifiers;
    use pretty_assertions::assert_eq;

    fn float4() -> Type {
        Type::float(32).of_vector(4)
    }

    fn entry(m: &mut Module, table: &mut SymbolTable, name: &str) -> Id {
        let id = FunctionBuilder::new(m, name, Type::Void, vec![]).finish();
        table.declare_function(name, id);
        id
    }

    #[test]
    fn pixel_and_compute_are_exclusive() {
        let mut m = Module::new();
        let mut table = SymbolTable::new();
        entry(&mut m, &mut table, "PSMain");
        entry(&mut m, &mut table, "CSMain");

        let err = InterfaceProcessor::new(LinkerConfig::default())
            .process(&mut table, &mut m)
            .unwrap_err();
        assert!(matches!(err, LinkError::BothPixelAndCompute));
        assert_eq!(err.kind(), ErrorKind::ConflictingConfiguration);
    }

    #[test]
    fn nothing_to_link() {
        let mut m = Module::new();
        let mut table = SymbolTable::new();
        entry(&mut m, &mut table, "VSMain");

        let err = InterfaceProcessor::new(LinkerConfig::default())
            .process(&mut table, &mut m)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingStage);
    }

    #[test]
    fn geometry_needs_a_vertex_stage() {
        let mut m = Module::new();
        let mut table = SymbolTable::new();
        entry(&mut m, &mut table, "PSMain");
        entry(&mut m, &mut table, "GSMain");

        let err = InterfaceProcessor::new(LinkerConfig::default())
            .process(&mut table, &mut m)
            .unwrap_err();
        assert!(matches!(
            err,
            LinkError::MissingVertexStage {
                stage: ShaderStage::Geometry
            }
        ));
    }

    #[test]
    fn validation_happens_before_rewriting() {
        let mut m = Module::new();
        let mut table = SymbolTable::new();
        let pos = m.declare_stream("Position", float4(), Some("SV_Position"));
        let mut vs = FunctionBuilder::new(&mut m, "VSMain", Type::Void, vec![]);
        let v = vs.load(float4(), pos);
        vs.store(pos, v);
        let vs = vs.finish();
        table.declare_function("VSMain", vs);
        entry(&mut m, &mut table, "PSMain");
        let gs = FunctionBuilder::new(
            &mut m,
            "GSMain",
            Type::Void,
            vec![param(float4().of_array(3), ParameterModifiers::None)],
        )
        .finish();
        table.declare_function("GSMain", gs);
        let before = m.to_string();

        let err = InterfaceProcessor::new(LinkerConfig::default())
            .process(&mut table, &mut m)
            .unwrap_err();
        assert!(matches!(err, LinkError::MissingGeometryTopology { entry } if entry == "GSMain"));
        assert_eq!(m.to_string(), before);
    }

    #[test]
    fn renamed_entry_points() {
        let mut m = Module::new();
        let mut table = SymbolTable::new();
        let target = m.declare_stream("Color", float4(), Some("SV_Target0"));
        let mut ps = FunctionBuilder::new(&mut m, "main_ps", Type::Void, vec![]);
        let one = ps.constant(1.0f32);
        let c = ps.composite_construct(float4(), vec![one; 4]);
        ps.store(target, c);
        let ps = ps.finish();
        table.declare_function("main_ps", ps);

        let mut config = LinkerConfig::default();
        config.entry_points.set(ShaderStage::Pixel, "main_ps");
        config.origin_upper_left = false;
        let result = InterfaceProcessor::new(config)
            .process(&mut table, &mut m)
            .unwrap();

        assert_eq!(result.entry_points.len(), 1);
        let e = &result.entry_points[0];
        assert_eq!(e.name, "main_ps_Wrapper");
        assert_eq!(e.stage, ShaderStage::Pixel);
        assert_eq!(m.execution_mode_args(e.id, ExecutionMode::OriginUpperLeft), None);
        assert_eq!(table.resolve_function("main_ps_Wrapper"), Some(e.id));
    }

    #[test]
    fn array_sizes() {
        let gs = Type::Function {
            return_type: Box::new(Type::Void),
            parameters: vec![param(float4().of_array(3), ParameterModifiers::Triangle)],
        };
        assert_eq!(array_input_size(ShaderStage::Geometry, &gs, "GSMain").unwrap(), Some(3));
        assert_eq!(array_input_size(ShaderStage::Vertex, &gs, "VSMain").unwrap(), None);

        let ds = Type::Function {
            return_type: Box::new(Type::Void),
            parameters: vec![
                param(float4(), ParameterModifiers::None),
                param(
                    Type::Patch {
                        kind: crate::spirv::PatchKind::Output,
                        base: Box::new(float4()),
                        size: 4,
                    },
                    ParameterModifiers::None,
                ),
            ],
        };
        assert_eq!(array_input_size(ShaderStage::Domain, &ds, "DSMain").unwrap(), Some(4));
        assert!(array_input_size(ShaderStage::Hull, &gs, "HSMain").is_err());
    }
}
