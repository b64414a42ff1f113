//! Catalog of stream slots, buffers, resources and module-level variables.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::module::Module;
use crate::spirv::{
    asm::{Decoration, StorageClass},
    Id, Instruction, Type,
};
use crate::symbol::meta::ShaderStage;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub used_this_stage: bool,
    /// Sticky across stages.
    pub used_any_stage: bool,
}
impl Usage {
    pub fn mark(&mut self) {
        self.used_this_stage = true;
        self.used_any_stage = true;
    }
}

/// One logical stream slot and its role in the stage being processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamVariableInfo {
    pub name: String,
    pub semantic: Option<String>,
    pub ty: Type,
    pub patch: bool,
    pub read: bool,
    pub write: bool,
    pub output: bool,
    pub usage: Usage,
    pub input_layout_location: Option<u32>,
    pub output_layout_location: Option<u32>,
    pub stream_struct_field_index: Option<u32>,
    pub input_struct_field_index: Option<u32>,
    pub output_struct_field_index: Option<u32>,
    pub input_id: Option<Id>,
    pub output_id: Option<Id>,
    pub method_initializer: Option<Id>,
}
impl StreamVariableInfo {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            semantic: None,
            ty,
            patch: false,
            read: false,
            write: false,
            output: false,
            usage: Usage::default(),
            input_layout_location: None,
            output_layout_location: None,
            stream_struct_field_index: None,
            input_struct_field_index: None,
            output_struct_field_index: None,
            input_id: None,
            output_id: None,
            method_initializer: None,
        }
    }

    /// Read before written, or forwarded untouched to the next stage.
    #[inline]
    pub const fn input(&self) -> bool {
        self.read || (self.output && !self.write)
    }

    pub fn mark_read(&mut self) {
        self.read = true;
        self.usage.mark();
    }

    pub fn mark_written(&mut self) {
        self.write = true;
        self.usage.mark();
    }

    /// Whether the stage-local `STREAMS`/`CONSTANTS` struct needs a field for this slot.
    pub const fn has_struct_field(&self) -> bool {
        self.usage.used_this_stage || self.input() || self.output
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CBufferInfo {
    pub name: String,
    pub usage: Usage,
    pub logical_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub name: String,
    pub usage: Usage,
    pub resource_group: Option<u32>,
    pub logical_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceGroupInfo {
    pub name: String,
    pub resources: Vec<Id>,
    pub logical_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInfo {
    pub name: String,
    pub ty: Type,
    pub usage: Usage,
    pub method_initializer: Option<Id>,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisResult {
    pub streams: BTreeMap<Id, StreamVariableInfo>,
    pub cbuffers: BTreeMap<Id, CBufferInfo>,
    pub resources: BTreeMap<Id, ResourceInfo>,
    pub resource_groups: BTreeMap<u32, ResourceGroupInfo>,
    pub variables: BTreeMap<Id, VariableInfo>,
}
impl AnalysisResult {
    /// Scans the module's global variables once.
    pub fn analyze(module: &Module) -> Self {
        let mut result = Self::default();

        for op in &module.global_variable_ops {
            let &Instruction::Variable {
                result: id,
                storage_class,
                method_initializer,
                ..
            } = op
            else {
                continue;
            };
            let name = module
                .name_of(id)
                .map_or_else(|| format!("unnamed_{id}"), str::to_owned);
            let ty = module.variable_type(id).cloned().unwrap_or(Type::Void);
            let logical_group = module
                .decoration_string(id, Decoration::LogicalGroup)
                .map(str::to_owned);

            match storage_class {
                StorageClass::Stream => {
                    let mut info = StreamVariableInfo::new(name, ty);
                    info.semantic = module
                        .decoration_string(id, Decoration::UserSemantic)
                        .map(str::to_owned);
                    info.patch = module.has_decoration(id, Decoration::Patch);
                    info.method_initializer = method_initializer;
                    result.streams.insert(id, info);
                }
                StorageClass::Uniform => {
                    result.cbuffers.insert(
                        id,
                        CBufferInfo {
                            name,
                            usage: Usage::default(),
                            logical_group,
                        },
                    );
                }
                StorageClass::UniformConstant | StorageClass::StorageBuffer => {
                    let resource_group = module
                        .decoration_args(id, Decoration::ResourceGroupId)
                        .and_then(|a| a.first().copied());
                    if let Some(group) = resource_group {
                        let group_name = module
                            .decoration_string(id, Decoration::ResourceGroup)
                            .unwrap_or_default()
                            .to_owned();
                        let g = result
                            .resource_groups
                            .entry(group)
                            .or_insert_with(|| ResourceGroupInfo {
                                name: group_name,
                                resources: Vec::new(),
                                logical_group: None,
                            });
                        g.resources.push(id);
                        if g.logical_group.is_none() {
                            g.logical_group.clone_from(&logical_group);
                        }
                    }
                    result.resources.insert(
                        id,
                        ResourceInfo {
                            name,
                            usage: Usage::default(),
                            resource_group,
                            logical_group,
                        },
                    );
                }
                StorageClass::Private
                | StorageClass::Workgroup
                | StorageClass::CrossWorkgroup
                | StorageClass::Generic
                | StorageClass::PushConstant
                | StorageClass::AtomicCounter
                | StorageClass::Image => {
                    result.variables.insert(
                        id,
                        VariableInfo {
                            name,
                            ty,
                            usage: Usage::default(),
                            method_initializer,
                        },
                    );
                }
                // per-stage interface, owned by whoever declares the entry point
                StorageClass::Input | StorageClass::Output | StorageClass::Function => (),
            }
        }

        result
    }

    /// Marks a cbuffer, resource or module-level variable as referenced.
    pub fn mark_global_used(&mut self, id: Id) {
        if let Some(c) = self.cbuffers.get_mut(&id) {
            c.usage.mark();
        } else if let Some(r) = self.resources.get_mut(&id) {
            r.usage.mark();
        } else if let Some(v) = self.variables.get_mut(&id) {
            v.usage.mark();
        }
    }

    pub fn reset_used_this_stage(&mut self) {
        for s in self.streams.values_mut() {
            s.usage.used_this_stage = false;
        }
        for c in self.cbuffers.values_mut() {
            c.usage.used_this_stage = false;
        }
        for r in self.resources.values_mut() {
            r.usage.used_this_stage = false;
        }
        for v in self.variables.values_mut() {
            v.usage.used_this_stage = false;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodInfo {
    pub usage: Usage,
    /// Touches streams directly or through a callee.
    pub has_stream_access: bool,
    /// Stage the current body was patched for.
    pub specialized_for: Option<ShaderStage>,
}

/// Liveness of functions across stages.
#[derive(Debug, Clone, Default)]
pub struct LiveAnalysis {
    pub referenced_methods: BTreeMap<Id, MethodInfo>,
    /// Functions kept regardless of call-graph liveness (wrappers, initializers,
    /// patch constant functions).
    pub extra_referenced_methods: BTreeSet<Id>,
    /// Bodies as they were before the first patch, used for later analyses and clones.
    pub(crate) pristine_bodies: HashMap<Id, Vec<Instruction>>,
}
impl LiveAnalysis {
    /// Returns true the first time `function` is marked in the current stage.
    pub fn mark_method_used(&mut self, function: Id) -> bool {
        let info = self.referenced_methods.entry(function).or_default();
        let first = !info.usage.used_this_stage;
        info.usage.mark();

        first
    }

    pub fn reset_used_this_stage(&mut self) {
        for m in self.referenced_methods.values_mut() {
            m.usage.used_this_stage = false;
        }
    }

    /// Live functions of the current stage that need patching, in id order.
    pub fn stream_methods_this_stage(&self) -> Vec<Id> {
        self.referenced_methods
            .iter()
            .filter(|(_, m)| m.usage.used_this_stage && m.has_stream_access)
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn is_live_any_stage(&self, function: Id) -> bool {
        self.extra_referenced_methods.contains(&function)
            || self
                .referenced_methods
                .get(&function)
                .is_some_and(|m| m.usage.used_any_stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spirv::asm::Dim;

    #[test]
    fn input_is_derived() {
        let mut s = StreamVariableInfo::new("color", Type::float(32).of_vector(4));
        assert!(!s.input());

        s.output = true;
        assert!(s.input(), "forwarded untouched");

        s.mark_written();
        assert!(!s.input());

        s.mark_read();
        assert!(s.input());
        assert!(s.usage.used_any_stage);
    }

    #[test]
    fn catalogs_globals_by_storage_class() {
        let mut m = Module::new();
        let pos = m.declare_stream("Position", Type::float(32).of_vector(4), Some("SV_Position"));
        let tf_type = Type::float(32).of_array(3);
        let tf = m.declare_patch_stream("TessFactor", tf_type, Some("SV_TessFactor"));
        let unnamed = m.declare_global_variable(Type::float(32), StorageClass::Stream);
        let cb = m.declare_cbuffer("PerFrame", Type::float(32).of_vector(4));
        m.set_logical_group(cb, "Lighting");
        let tex = m.declare_resource(
            "Texture0",
            Type::Image {
                sampled_type: crate::spirv::ScalarType::Float(32),
                dim: Dim::Dim2,
                arrayed: false,
                multisampled: false,
            },
        );
        let sampler = m.declare_resource("Sampler0", Type::Sampler);
        m.set_resource_group(tex, 1, "PerMaterial");
        m.set_resource_group(sampler, 1, "PerMaterial");
        let private = m.declare_private("counter", Type::uint(32), None);

        let a = AnalysisResult::analyze(&m);

        assert_eq!(a.streams.len(), 3);
        assert_eq!(a.streams[&pos].semantic.as_deref(), Some("SV_Position"));
        assert!(!a.streams[&pos].patch);
        assert!(a.streams[&tf].patch);
        assert_eq!(a.streams[&unnamed].name, format!("unnamed_{unnamed}"));
        assert_eq!(a.cbuffers[&cb].logical_group.as_deref(), Some("Lighting"));
        assert_eq!(a.resource_groups[&1].resources, vec![tex, sampler]);
        assert_eq!(a.resource_groups[&1].name, "PerMaterial");
        assert_eq!(a.resources[&tex].resource_group, Some(1));
        assert_eq!(a.variables[&private].ty, Type::uint(32));
    }

    #[test]
    fn mark_method_used_once_per_stage() {
        let mut live = LiveAnalysis::default();
        assert!(live.mark_method_used(7));
        assert!(!live.mark_method_used(7));

        live.reset_used_this_stage();
        assert!(live.mark_method_used(7));
        assert!(live.is_live_any_stage(7));
        assert!(!live.is_live_any_stage(8));
    }
}
