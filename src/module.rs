//! In-memory module: sectioned instruction storage plus interned types and constants.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;

use crate::spirv::{
    self as spv,
    asm::{AddressingModel, Capability, Decoration, ExecutionMode, MemoryModel, StorageClass},
    Id,
};

pub mod builder;
mod display;

#[derive(Debug, Clone)]
pub struct Module {
    pub capabilities: BTreeSet<Capability>,
    pub addressing_model: AddressingModel,
    pub memory_model: MemoryModel,
    pub entry_point_ops: Vec<spv::Instruction>,
    pub execution_mode_ops: Vec<spv::Instruction>,
    pub debug_ops: Vec<spv::Instruction>,
    pub annotation_ops: Vec<spv::Instruction>,
    pub global_variable_ops: Vec<spv::Instruction>,
    pub function_ops: Vec<spv::Instruction>,
    defined_types: BTreeMap<Id, spv::Type>,
    defined_type_map: HashMap<spv::Type, Id>,
    defined_consts: BTreeMap<Id, spv::Constant>,
    defined_const_map: HashMap<spv::Constant, Id>,
    bound: Id,
}
impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}
impl Module {
    pub fn new() -> Self {
        Self {
            capabilities: BTreeSet::from([Capability::Shader]),
            addressing_model: AddressingModel::Logical,
            memory_model: MemoryModel::GLSL450,
            entry_point_ops: Vec::new(),
            execution_mode_ops: Vec::new(),
            debug_ops: Vec::new(),
            annotation_ops: Vec::new(),
            global_variable_ops: Vec::new(),
            function_ops: Vec::new(),
            defined_types: BTreeMap::new(),
            defined_type_map: HashMap::new(),
            defined_consts: BTreeMap::new(),
            defined_const_map: HashMap::new(),
            bound: 1,
        }
    }

    /// One past the highest id in use.
    #[inline(always)]
    pub const fn bound(&self) -> Id {
        self.bound
    }

    pub fn new_id(&mut self) -> Id {
        self.bound += 1;

        self.bound - 1
    }

    pub fn add_capability(&mut self, capability: Capability) {
        self.capabilities.insert(capability);
    }

    pub fn request_type_id(&mut self, t: spv::Type) -> Id {
        if let Some(&id) = self.defined_type_map.get(&t) {
            return id;
        }

        let id = self.new_id();
        self.defined_types.insert(id, t.clone());
        self.defined_type_map.insert(t, id);
        id
    }

    pub fn request_const_id(&mut self, c: spv::Constant) -> Id {
        if let Some(&id) = self.defined_const_map.get(&c) {
            return id;
        }

        self.request_type_id(c.result_type().clone());
        let id = self.new_id();
        self.defined_consts.insert(id, c.clone());
        self.defined_const_map.insert(c, id);
        id
    }

    pub fn type_of(&self, id: Id) -> Option<&spv::Type> {
        self.defined_types.get(&id)
    }

    pub fn type_id(&self, t: &spv::Type) -> Option<Id> {
        self.defined_type_map.get(t).copied()
    }

    pub fn constant_id(&self, c: &spv::Constant) -> Option<Id> {
        self.defined_const_map.get(c).copied()
    }

    pub fn constant(&self, id: Id) -> Option<&spv::Constant> {
        self.defined_consts.get(&id)
    }

    pub fn types(&self) -> impl Iterator<Item = (Id, &spv::Type)> {
        self.defined_types.iter().map(|(&id, t)| (id, t))
    }

    pub fn constants(&self) -> impl Iterator<Item = (Id, &spv::Constant)> {
        self.defined_consts.iter().map(|(&id, c)| (id, c))
    }

    /// Drops every interned type and constant for which `keep` returns false.
    pub fn retain_types_and_constants(&mut self, mut keep: impl FnMut(Id) -> bool) {
        self.defined_types.retain(|&id, _| keep(id));
        self.defined_consts.retain(|&id, _| keep(id));
        self.defined_type_map.retain(|_, id| keep(*id));
        self.defined_const_map.retain(|_, id| keep(*id));
    }

    pub fn decorate(&mut self, target: Id, decorations: &[spv::Decorate]) {
        self.annotation_ops
            .extend(decorations.iter().map(|d| d.make_instruction(target)));
    }

    pub fn add_name(&mut self, target: Id, name: impl Into<String>) {
        self.debug_ops.push(spv::Instruction::Name {
            target,
            name: name.into(),
        });
    }

    pub fn name_of(&self, id: Id) -> Option<&str> {
        self.debug_ops.iter().find_map(|op| match op {
            spv::Instruction::Name { target, name } if *target == id => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn has_decoration(&self, id: Id, decoration: Decoration) -> bool {
        self.annotation_ops.iter().any(|op| {
            matches!(
                op,
                spv::Instruction::Decorate { target, decoration: d, .. }
                    if *target == id && *d == decoration
            )
        })
    }

    pub fn decoration_args(&self, id: Id, decoration: Decoration) -> Option<&[u32]> {
        self.annotation_ops.iter().find_map(|op| match op {
            spv::Instruction::Decorate {
                target,
                decoration: d,
                args,
            } if *target == id && *d == decoration => Some(&args[..]),
            _ => None,
        })
    }

    pub fn decoration_string(&self, id: Id, decoration: Decoration) -> Option<&str> {
        self.annotation_ops.iter().find_map(|op| match op {
            spv::Instruction::DecorateString {
                target,
                decoration: d,
                value,
            } if *target == id && *d == decoration => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn execution_mode_args(&self, entry: Id, mode: ExecutionMode) -> Option<&[u32]> {
        self.execution_mode_ops.iter().find_map(|op| match op {
            spv::Instruction::ExecutionMode {
                entry_point,
                mode: m,
                args,
            } if *entry_point == entry && *m == mode => Some(&args[..]),
            _ => None,
        })
    }

    pub fn declare_global_variable(&mut self, ty: spv::Type, storage_class: StorageClass) -> Id {
        let ptr_ty = self.request_type_id(ty.pointer_to(storage_class));
        let id = self.new_id();
        self.global_variable_ops.push(spv::Instruction::Variable {
            result_type: ptr_ty,
            result: id,
            storage_class,
            initializer: None,
            method_initializer: None,
        });

        id
    }

    pub fn global_variable(&self, id: Id) -> Option<&spv::Instruction> {
        self.global_variable_ops
            .iter()
            .find(|op| matches!(op, spv::Instruction::Variable { result, .. } if *result == id))
    }

    /// Pointee type of a global variable.
    pub fn variable_type(&self, id: Id) -> Option<&spv::Type> {
        match self.global_variable(id)? {
            &spv::Instruction::Variable { result_type, .. } => {
                self.type_of(result_type)?.dereferenced()
            }
            _ => None,
        }
    }

    pub fn function_ids(&self) -> Vec<Id> {
        self.function_ops
            .iter()
            .filter_map(|op| match op {
                &spv::Instruction::Function { result, .. } => Some(result),
                _ => None,
            })
            .collect()
    }

    /// Index range of a function body, `Function` through `FunctionEnd` inclusive.
    pub fn function_range(&self, id: Id) -> Option<Range<usize>> {
        let start = self
            .function_ops
            .iter()
            .position(
                |op| matches!(op, spv::Instruction::Function { result, .. } if *result == id),
            )?;
        let len = self.function_ops[start..]
            .iter()
            .position(|op| matches!(op, spv::Instruction::FunctionEnd))?;

        Some(start..start + len + 1)
    }

    pub fn function_type_id(&self, id: Id) -> Option<Id> {
        let range = self.function_range(id)?;
        match self.function_ops[range.start] {
            spv::Instruction::Function { function_type, .. } => Some(function_type),
            _ => None,
        }
    }

    pub fn function_type(&self, id: Id) -> Option<&spv::Type> {
        self.type_of(self.function_type_id(id)?)
    }

    pub fn function_parameters(&self, id: Id) -> Vec<Id> {
        let Some(range) = self.function_range(id) else {
            return Vec::new();
        };
        self.function_ops[range]
            .iter()
            .skip(1)
            .map_while(|op| match op {
                &spv::Instruction::FunctionParameter { result, .. } => Some(result),
                _ => None,
            })
            .collect()
    }

    fn set_function_type(
        &mut self,
        function: Id,
        return_type: Box<spv::Type>,
        parameters: Vec<spv::FunctionParameter>,
    ) -> Option<()> {
        let type_id = self.request_type_id(spv::Type::Function {
            return_type,
            parameters,
        });
        let start = self.function_range(function)?.start;
        match &mut self.function_ops[start] {
            spv::Instruction::Function { function_type, .. } => *function_type = type_id,
            _ => return None,
        }

        Some(())
    }

    /// Changes the type and modifiers of one parameter, re-interning the function type.
    pub fn replace_function_parameter(
        &mut self,
        function: Id,
        index: usize,
        parameter: spv::FunctionParameter,
    ) -> Option<()> {
        let Some(spv::Type::Function {
            return_type,
            mut parameters,
        }) = self.function_type(function).cloned()
        else {
            return None;
        };
        let param_type = self.request_type_id(parameter.ty.clone());
        *parameters.get_mut(index)? = parameter;
        self.set_function_type(function, return_type, parameters)?;

        let start = self.function_range(function)?.start;
        match &mut self.function_ops[start + 1 + index] {
            spv::Instruction::FunctionParameter { result_type, .. } => *result_type = param_type,
            _ => return None,
        }

        Some(())
    }

    pub fn remove_function_parameter(&mut self, function: Id, index: usize) -> Option<()> {
        let Some(spv::Type::Function {
            return_type,
            mut parameters,
        }) = self.function_type(function).cloned()
        else {
            return None;
        };
        if index >= parameters.len() {
            return None;
        }
        parameters.remove(index);
        self.set_function_type(function, return_type, parameters)?;

        let start = self.function_range(function)?.start;
        self.function_ops.remove(start + 1 + index);

        Some(())
    }

    /// Rewrites every id operand of entry points, execution modes, globals and function bodies.
    pub fn relocate_ids(&mut self, mut relocator: impl FnMut(Id) -> Id) {
        for op in self
            .entry_point_ops
            .iter_mut()
            .chain(&mut self.execution_mode_ops)
            .chain(&mut self.global_variable_ops)
            .chain(&mut self.function_ops)
        {
            let taken = std::mem::replace(op, spv::Instruction::Nop);
            *op = taken.relocate(&mut relocator);
        }
    }

    /// Drops debug names and decorations attached to any of `ids`.
    pub fn remove_annotations_of(&mut self, mut removed: impl FnMut(Id) -> bool) {
        self.debug_ops
            .retain(|op| !op.annotation_target().is_some_and(&mut removed));
        self.annotation_ops
            .retain(|op| !op.annotation_target().is_some_and(&mut removed));
        self.execution_mode_ops.retain(|op| match op {
            spv::Instruction::ExecutionMode { entry_point, .. } => !removed(*entry_point),
            _ => true,
        });
    }

    /// Result id to result type id, across globals and function bodies.
    pub fn value_types(&self) -> HashMap<Id, Id> {
        self.global_variable_ops
            .iter()
            .chain(self.function_ops.iter())
            .filter_map(|op| Some((op.result_id()?, op.result_type_id()?)))
            .chain(self.constants().filter_map(|(id, c)| {
                Some((id, self.type_id(c.result_type())?))
            }))
            .collect()
    }

    pub fn entry_points(&self) -> impl Iterator<Item = (&str, Id, spv::asm::ExecutionModel)> {
        self.entry_point_ops.iter().filter_map(|op| match op {
            spv::Instruction::EntryPoint {
                execution_model,
                entry_point,
                name,
                ..
            } => Some((name.as_str(), *entry_point, *execution_model)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spirv::{Constant, Type};

    #[test]
    fn interning_is_structural() {
        let mut m = Module::new();
        let a = m.request_type_id(Type::float(32).of_vector(4));
        let b = m.request_type_id(Type::float(32).of_vector(4));
        let c = m.request_type_id(Type::float(32).of_vector(3));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(m.type_of(a), Some(&Type::float(32).of_vector(4)));
    }

    #[test]
    fn constants_request_their_type() {
        let mut m = Module::new();
        let one = m.request_const_id(Constant::from(1u32));

        assert!(m.type_id(&Type::uint(32)).is_some());
        assert_eq!(m.request_const_id(1u32.into()), one);
        assert_ne!(m.request_const_id(1i32.into()), one);
    }

    #[test]
    fn retain_updates_lookup_maps() {
        let mut m = Module::new();
        let f = m.request_type_id(Type::float(32));
        let u = m.request_type_id(Type::uint(32));
        m.retain_types_and_constants(|id| id != f);

        assert_eq!(m.type_id(&Type::float(32)), None);
        assert_eq!(m.type_id(&Type::uint(32)), Some(u));
        assert_ne!(m.request_type_id(Type::float(32)), f);
    }
}
