//! Fluent construction helpers for modules and function bodies.

use super::Module;
use crate::spirv::{
    asm::{
        Decoration, ExecutionMode, FunctionControl, ParameterModifiers, SelectionControl,
        StorageClass,
    },
    Constant, Decorate, FunctionParameter, Id, Instruction, Type,
};

impl Module {
    fn declare_named_variable(
        &mut self,
        name: &str,
        ty: Type,
        storage_class: StorageClass,
        method_initializer: Option<Id>,
    ) -> Id {
        let id = self.declare_global_variable(ty, storage_class);
        if let Some(Instruction::Variable {
            method_initializer: m,
            ..
        }) = self.global_variable_ops.last_mut()
        {
            *m = method_initializer;
        }
        self.add_name(id, name);

        id
    }

    /// Declares a stream slot, optionally tagged with a semantic.
    pub fn declare_stream(&mut self, name: &str, ty: Type, semantic: Option<&str>) -> Id {
        let id = self.declare_named_variable(name, ty, StorageClass::Stream, None);
        if let Some(s) = semantic {
            self.decorate(id, &[Decorate::UserSemantic(s.into())]);
        }

        id
    }

    /// Declares a per-patch stream slot (hull/domain constants).
    pub fn declare_patch_stream(&mut self, name: &str, ty: Type, semantic: Option<&str>) -> Id {
        let id = self.declare_stream(name, ty, semantic);
        self.decorate(id, &[Decorate::Patch]);

        id
    }

    /// Declares a stream slot whose initial value is computed by `initializer`.
    pub fn declare_initialized_stream(
        &mut self,
        name: &str,
        ty: Type,
        semantic: Option<&str>,
        initializer: Id,
    ) -> Id {
        let id = self.declare_named_variable(name, ty, StorageClass::Stream, Some(initializer));
        if let Some(s) = semantic {
            self.decorate(id, &[Decorate::UserSemantic(s.into())]);
        }

        id
    }

    pub fn declare_cbuffer(&mut self, name: &str, ty: Type) -> Id {
        let id = self.declare_named_variable(name, ty, StorageClass::Uniform, None);
        self.decorate(id, &[Decorate::Block]);

        id
    }

    pub fn declare_resource(&mut self, name: &str, ty: Type) -> Id {
        self.declare_named_variable(name, ty, StorageClass::UniformConstant, None)
    }

    pub fn declare_private(&mut self, name: &str, ty: Type, initializer: Option<Id>) -> Id {
        self.declare_named_variable(name, ty, StorageClass::Private, initializer)
    }

    /// Puts a resource into the resource group `group`.
    pub fn set_resource_group(&mut self, resource: Id, group: u32, group_name: &str) {
        self.annotation_ops.push(Instruction::Decorate {
            target: resource,
            decoration: Decoration::ResourceGroupId,
            args: vec![group],
        });
        self.annotation_ops.push(Instruction::DecorateString {
            target: resource,
            decoration: Decoration::ResourceGroup,
            value: group_name.into(),
        });
    }

    /// Tags a cbuffer or resource with a logical group; one used member keeps the whole group.
    pub fn set_logical_group(&mut self, target: Id, logical_group: &str) {
        self.annotation_ops.push(Instruction::DecorateString {
            target,
            decoration: Decoration::LogicalGroup,
            value: logical_group.into(),
        });
    }

    pub fn add_execution_mode(&mut self, entry_point: Id, mode: ExecutionMode, args: &[u32]) {
        self.execution_mode_ops.push(Instruction::ExecutionMode {
            entry_point,
            mode,
            args: args.to_vec(),
        });
    }

    /// Binds parameter `index` of `function` to a system value.
    pub fn set_parameter_semantic(&mut self, function: Id, index: u32, semantic: &str) {
        self.annotation_ops.push(Instruction::MemberDecorateString {
            target: function,
            member: index,
            decoration: Decoration::UserSemantic,
            value: semantic.into(),
        });
    }

    pub fn set_patch_constant_function(&mut self, hull_entry: Id, function_name: &str) {
        self.annotation_ops.push(Instruction::DecorateString {
            target: hull_entry,
            decoration: Decoration::PatchConstantFunc,
            value: function_name.into(),
        });
    }
}

/// Parameter passed by pointer to a function-local value, the calling convention of entry points.
pub fn param(ty: Type, modifiers: ParameterModifiers) -> FunctionParameter {
    FunctionParameter {
        ty: ty.pointer_to(StorageClass::Function),
        modifiers,
    }
}

/// Builds one function body. Local variables and instructions are queued separately and
/// joined by [`FunctionBuilder::finish`], so locals always land in the entry block.
pub struct FunctionBuilder<'m> {
    module: &'m mut Module,
    id: Id,
    name: String,
    header: Vec<Instruction>,
    locals: Vec<Instruction>,
    body: Vec<Instruction>,
    parameters: Vec<Id>,
    terminated: bool,
}
impl<'m> FunctionBuilder<'m> {
    pub fn new(
        module: &'m mut Module,
        name: impl Into<String>,
        return_type: Type,
        parameters: Vec<FunctionParameter>,
    ) -> Self {
        let param_types = parameters.iter().map(|p| p.ty.clone()).collect::<Vec<_>>();
        let function_type = module.request_type_id(Type::Function {
            return_type: Box::new(return_type.clone()),
            parameters,
        });
        let result_type = module.request_type_id(return_type);
        let id = module.new_id();

        let mut header = vec![Instruction::Function {
            result_type,
            result: id,
            function_control: FunctionControl::NONE,
            function_type,
        }];
        let mut parameter_ids = Vec::with_capacity(param_types.len());
        for ty in param_types {
            let result_type = module.request_type_id(ty);
            let result = module.new_id();
            header.push(Instruction::FunctionParameter {
                result_type,
                result,
            });
            parameter_ids.push(result);
        }
        let entry_label = module.new_id();
        header.push(Instruction::Label {
            result: entry_label,
        });

        Self {
            module,
            id,
            name: name.into(),
            header,
            locals: Vec::new(),
            body: Vec::new(),
            parameters: parameter_ids,
            terminated: false,
        }
    }

    #[inline(always)]
    pub const fn id(&self) -> Id {
        self.id
    }

    pub fn parameter(&self, index: usize) -> Id {
        self.parameters[index]
    }

    pub fn module(&mut self) -> &mut Module {
        self.module
    }

    /// The module and the pending body, for helpers that emit raw instructions.
    pub fn split(&mut self) -> (&mut Module, &mut Vec<Instruction>) {
        (&mut *self.module, &mut self.body)
    }

    pub fn push(&mut self, op: Instruction) -> &mut Self {
        self.body.push(op);
        self
    }

    pub fn constant(&mut self, c: impl Into<Constant>) -> Id {
        self.module.request_const_id(c.into())
    }

    pub fn local_variable(&mut self, ty: Type) -> Id {
        let result_type = self
            .module
            .request_type_id(ty.pointer_to(StorageClass::Function));
        let result = self.module.new_id();
        self.locals.push(Instruction::Variable {
            result_type,
            result,
            storage_class: StorageClass::Function,
            initializer: None,
            method_initializer: None,
        });

        result
    }

    pub fn load(&mut self, ty: Type, pointer: Id) -> Id {
        let result_type = self.module.request_type_id(ty);
        let result = self.module.new_id();
        self.body.push(Instruction::Load {
            result_type,
            result,
            pointer,
        });

        result
    }

    pub fn store(&mut self, pointer: Id, object: Id) -> &mut Self {
        self.body.push(Instruction::Store { pointer, object });
        self
    }

    /// Access chain with literal indexes, materialized as `u32` constants.
    pub fn access_chain(
        &mut self,
        ty: Type,
        storage_class: StorageClass,
        base: Id,
        indexes: &[u32],
    ) -> Id {
        let indexes = indexes
            .iter()
            .map(|&i| self.module.request_const_id(i.into()))
            .collect::<Vec<_>>();
        self.access_chain_dynamic(ty, storage_class, base, indexes)
    }

    pub fn access_chain_dynamic(
        &mut self,
        ty: Type,
        storage_class: StorageClass,
        base: Id,
        indexes: Vec<Id>,
    ) -> Id {
        let result_type = self.module.request_type_id(ty.pointer_to(storage_class));
        let result = self.module.new_id();
        self.body.push(Instruction::AccessChain {
            result_type,
            result,
            base,
            indexes,
        });

        result
    }

    /// Pointer to the `stream` member of a stream struct value at `base`.
    pub fn stream_access(&mut self, ty: Type, base: Id, stream: Id) -> Id {
        let result_type = self
            .module
            .request_type_id(ty.pointer_to(StorageClass::Function));
        let result = self.module.new_id();
        self.body.push(Instruction::StreamAccess {
            result_type,
            result,
            base,
            stream,
        });

        result
    }

    pub fn composite_extract(&mut self, ty: Type, composite: Id, indexes: &[u32]) -> Id {
        let result_type = self.module.request_type_id(ty);
        let result = self.module.new_id();
        self.body.push(Instruction::CompositeExtract {
            result_type,
            result,
            composite,
            indexes: indexes.to_vec(),
        });

        result
    }

    pub fn composite_construct(&mut self, ty: Type, constituents: Vec<Id>) -> Id {
        let result_type = self.module.request_type_id(ty);
        let result = self.module.new_id();
        self.body.push(Instruction::CompositeConstruct {
            result_type,
            result,
            constituents,
        });

        result
    }

    pub fn fadd(&mut self, ty: Type, operand1: Id, operand2: Id) -> Id {
        let result_type = self.module.request_type_id(ty);
        let result = self.module.new_id();
        self.body.push(Instruction::FAdd {
            result_type,
            result,
            operand1,
            operand2,
        });

        result
    }

    pub fn fmul(&mut self, ty: Type, operand1: Id, operand2: Id) -> Id {
        let result_type = self.module.request_type_id(ty);
        let result = self.module.new_id();
        self.body.push(Instruction::FMul {
            result_type,
            result,
            operand1,
            operand2,
        });

        result
    }

    pub fn iequal(&mut self, operand1: Id, operand2: Id) -> Id {
        let result_type = self.module.request_type_id(Type::bool());
        let result = self.module.new_id();
        self.body.push(Instruction::IEqual {
            result_type,
            result,
            operand1,
            operand2,
        });

        result
    }

    pub fn call(&mut self, return_type: Type, function: Id, arguments: Vec<Id>) -> Id {
        let result_type = self.module.request_type_id(return_type);
        let result = self.module.new_id();
        self.body.push(Instruction::FunctionCall {
            result_type,
            result,
            function,
            arguments,
        });

        result
    }

    /// `if (condition) { then(...) }`, structured with a selection merge.
    pub fn if_then(&mut self, condition: Id, then: impl FnOnce(&mut Self)) -> &mut Self {
        let then_label = self.module.new_id();
        let merge_label = self.module.new_id();
        self.body.push(Instruction::SelectionMerge {
            merge_block: merge_label,
            selection_control: SelectionControl::NONE,
        });
        self.body.push(Instruction::BranchConditional {
            condition,
            true_label: then_label,
            false_label: merge_label,
        });
        self.body.push(Instruction::Label { result: then_label });
        then(self);
        self.body.push(Instruction::Branch {
            target_label: merge_label,
        });
        self.body.push(Instruction::Label {
            result: merge_label,
        });
        self
    }

    pub fn emit_stream_vertex(&mut self, stream: Id) -> &mut Self {
        self.body.push(Instruction::EmitStreamVertex { stream });
        self
    }

    pub fn end_stream_primitive(&mut self, stream: Id) -> &mut Self {
        self.body.push(Instruction::EndStreamPrimitive { stream });
        self
    }

    pub fn return_value(&mut self, value: Id) -> &mut Self {
        self.body.push(Instruction::ReturnValue { value });
        self.terminated = true;
        self
    }

    /// Terminates the body (with `OpReturn` unless a value was returned) and appends it to the
    /// module. Returns the function id.
    pub fn finish(self) -> Id {
        let Self {
            module,
            id,
            name,
            header,
            locals,
            body,
            terminated,
            ..
        } = self;

        module.function_ops.extend(header);
        module.function_ops.extend(locals);
        module.function_ops.extend(body);
        if !terminated {
            module.function_ops.push(Instruction::Return);
        }
        module.function_ops.push(Instruction::FunctionEnd);
        module.add_name(id, name);

        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn locals_are_hoisted_to_entry_block() {
        let mut m = Module::new();
        let mut f = FunctionBuilder::new(&mut m, "main", Type::Void, vec![]);
        let one = f.constant(1.0f32);
        let a = f.local_variable(Type::float(32));
        f.store(a, one);
        let b = f.local_variable(Type::float(32));
        f.store(b, one);
        let id = f.finish();

        let range = m.function_range(id).unwrap();
        let kinds = m.function_ops[range]
            .iter()
            .map(|op| match op {
                Instruction::Function { .. } => "function",
                Instruction::Label { .. } => "label",
                Instruction::Variable { .. } => "variable",
                Instruction::Store { .. } => "store",
                Instruction::Return => "return",
                Instruction::FunctionEnd => "end",
                _ => "other",
            })
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            ["function", "label", "variable", "variable", "store", "store", "return", "end"]
        );
        assert_eq!(m.name_of(id), Some("main"));
    }

    #[test]
    fn parameters_follow_the_function() {
        let mut m = Module::new();
        let f = FunctionBuilder::new(
            &mut m,
            "f",
            Type::Void,
            vec![
                param(Type::float(32), ParameterModifiers::In),
                param(Type::uint(32), ParameterModifiers::None),
            ],
        );
        let (p0, p1) = (f.parameter(0), f.parameter(1));
        let id = f.finish();

        assert_eq!(m.function_parameters(id), vec![p0, p1]);
        assert!(matches!(
            m.function_type(id),
            Some(Type::Function { parameters, .. }) if parameters.len() == 2
        ));
    }
}
