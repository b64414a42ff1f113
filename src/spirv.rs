pub mod asm;
pub mod types;

pub use self::types::*;
use self::asm::{
    Builtin, Decoration, ExecutionMode, ExecutionModel, FunctionControl, SelectionControl,
    StorageClass,
};

pub type Id = u32;

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Decorate {
    Block,
    Flat,
    Patch,
    Builtin(Builtin),
    Location(u32),
    Binding(u32),
    DescriptorSet(u32),
    Offset(u32),
    UserSemantic(String),
}
impl Decorate {
    pub fn make_instruction<IdType>(&self, target: IdType) -> Instruction<IdType> {
        let (decoration, args) = match self {
            Self::Block => (Decoration::Block, vec![]),
            Self::Flat => (Decoration::Flat, vec![]),
            Self::Patch => (Decoration::Patch, vec![]),
            &Self::Builtin(b) => (Decoration::Builtin, vec![b as u32]),
            &Self::Location(l) => (Decoration::Location, vec![l]),
            &Self::Binding(b) => (Decoration::Binding, vec![b]),
            &Self::DescriptorSet(s) => (Decoration::DescriptorSet, vec![s]),
            &Self::Offset(o) => (Decoration::Offset, vec![o]),
            Self::UserSemantic(s) => {
                return Instruction::DecorateString {
                    target,
                    decoration: Decoration::UserSemantic,
                    value: s.clone(),
                }
            }
        };

        Instruction::Decorate {
            target,
            decoration,
            args,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Instruction<IdType = Id> {
    Nop,
    Name {
        target: IdType,
        name: String,
    },
    MemberName {
        target: IdType,
        member: u32,
        name: String,
    },
    Decorate {
        target: IdType,
        decoration: Decoration,
        args: Vec<u32>,
    },
    DecorateString {
        target: IdType,
        decoration: Decoration,
        value: String,
    },
    MemberDecorate {
        struct_type: IdType,
        member: u32,
        decoration: Decoration,
        args: Vec<u32>,
    },
    /// On a function target, `member` is a parameter index.
    MemberDecorateString {
        target: IdType,
        member: u32,
        decoration: Decoration,
        value: String,
    },
    EntryPoint {
        execution_model: ExecutionModel,
        entry_point: IdType,
        name: String,
        interface: Vec<IdType>,
    },
    ExecutionMode {
        entry_point: IdType,
        mode: ExecutionMode,
        args: Vec<u32>,
    },
    Variable {
        result_type: IdType,
        result: IdType,
        storage_class: StorageClass,
        initializer: Option<IdType>,
        /// Function computing the initial value, called by the stage wrapper.
        method_initializer: Option<IdType>,
    },
    Function {
        result_type: IdType,
        result: IdType,
        function_control: FunctionControl,
        function_type: IdType,
    },
    FunctionParameter {
        result_type: IdType,
        result: IdType,
    },
    FunctionEnd,
    FunctionCall {
        result_type: IdType,
        result: IdType,
        function: IdType,
        arguments: Vec<IdType>,
    },
    Label {
        result: IdType,
    },
    Branch {
        target_label: IdType,
    },
    BranchConditional {
        condition: IdType,
        true_label: IdType,
        false_label: IdType,
    },
    SelectionMerge {
        merge_block: IdType,
        selection_control: SelectionControl,
    },
    Return,
    ReturnValue {
        value: IdType,
    },
    Load {
        result_type: IdType,
        result: IdType,
        pointer: IdType,
    },
    Store {
        pointer: IdType,
        object: IdType,
    },
    AccessChain {
        result_type: IdType,
        result: IdType,
        base: IdType,
        indexes: Vec<IdType>,
    },
    /// Pointer to the member of a stream struct value that stands for a stream slot.
    StreamAccess {
        result_type: IdType,
        result: IdType,
        base: IdType,
        stream: IdType,
    },
    CompositeExtract {
        result_type: IdType,
        result: IdType,
        composite: IdType,
        indexes: Vec<u32>,
    },
    CompositeConstruct {
        result_type: IdType,
        result: IdType,
        constituents: Vec<IdType>,
    },
    IEqual {
        result_type: IdType,
        result: IdType,
        operand1: IdType,
        operand2: IdType,
    },
    FAdd {
        result_type: IdType,
        result: IdType,
        operand1: IdType,
        operand2: IdType,
    },
    FMul {
        result_type: IdType,
        result: IdType,
        operand1: IdType,
        operand2: IdType,
    },
    ControlBarrier {
        execution: IdType,
        memory: IdType,
        semantics: IdType,
    },
    EmitVertex,
    EndPrimitive,
    /// Append the current streams to a geometry output stream.
    EmitStreamVertex {
        stream: IdType,
    },
    /// Restart the strip of a geometry output stream.
    EndStreamPrimitive {
        stream: IdType,
    },
}
impl<IdType> Instruction<IdType> {
    pub fn relocate<IdType2>(
        self,
        mut relocator: impl FnMut(IdType) -> IdType2,
    ) -> Instruction<IdType2> {
        match self {
            Self::Nop => Instruction::Nop,
            Self::Name { target, name } => Instruction::Name {
                target: relocator(target),
                name,
            },
            Self::MemberName {
                target,
                member,
                name,
            } => Instruction::MemberName {
                target: relocator(target),
                member,
                name,
            },
            Self::Decorate {
                target,
                decoration,
                args,
            } => Instruction::Decorate {
                target: relocator(target),
                decoration,
                args,
            },
            Self::DecorateString {
                target,
                decoration,
                value,
            } => Instruction::DecorateString {
                target: relocator(target),
                decoration,
                value,
            },
            Self::MemberDecorate {
                struct_type,
                member,
                decoration,
                args,
            } => Instruction::MemberDecorate {
                struct_type: relocator(struct_type),
                member,
                decoration,
                args,
            },
            Self::MemberDecorateString {
                target,
                member,
                decoration,
                value,
            } => Instruction::MemberDecorateString {
                target: relocator(target),
                member,
                decoration,
                value,
            },
            Self::EntryPoint {
                execution_model,
                entry_point,
                name,
                interface,
            } => Instruction::EntryPoint {
                execution_model,
                entry_point: relocator(entry_point),
                name,
                interface: interface.into_iter().map(relocator).collect(),
            },
            Self::ExecutionMode {
                entry_point,
                mode,
                args,
            } => Instruction::ExecutionMode {
                entry_point: relocator(entry_point),
                mode,
                args,
            },
            Self::Variable {
                result_type,
                result,
                storage_class,
                initializer,
                method_initializer,
            } => Instruction::Variable {
                result_type: relocator(result_type),
                result: relocator(result),
                storage_class,
                initializer: initializer.map(&mut relocator),
                method_initializer: method_initializer.map(&mut relocator),
            },
            Self::Function {
                result_type,
                result,
                function_control,
                function_type,
            } => Instruction::Function {
                result_type: relocator(result_type),
                result: relocator(result),
                function_control,
                function_type: relocator(function_type),
            },
            Self::FunctionParameter {
                result_type,
                result,
            } => Instruction::FunctionParameter {
                result_type: relocator(result_type),
                result: relocator(result),
            },
            Self::FunctionEnd => Instruction::FunctionEnd,
            Self::FunctionCall {
                result_type,
                result,
                function,
                arguments,
            } => Instruction::FunctionCall {
                result_type: relocator(result_type),
                result: relocator(result),
                function: relocator(function),
                arguments: arguments.into_iter().map(relocator).collect(),
            },
            Self::Label { result } => Instruction::Label {
                result: relocator(result),
            },
            Self::Branch { target_label } => Instruction::Branch {
                target_label: relocator(target_label),
            },
            Self::BranchConditional {
                condition,
                true_label,
                false_label,
            } => Instruction::BranchConditional {
                condition: relocator(condition),
                true_label: relocator(true_label),
                false_label: relocator(false_label),
            },
            Self::SelectionMerge {
                merge_block,
                selection_control,
            } => Instruction::SelectionMerge {
                merge_block: relocator(merge_block),
                selection_control,
            },
            Self::Return => Instruction::Return,
            Self::ReturnValue { value } => Instruction::ReturnValue {
                value: relocator(value),
            },
            Self::Load {
                result_type,
                result,
                pointer,
            } => Instruction::Load {
                result_type: relocator(result_type),
                result: relocator(result),
                pointer: relocator(pointer),
            },
            Self::Store { pointer, object } => Instruction::Store {
                pointer: relocator(pointer),
                object: relocator(object),
            },
            Self::AccessChain {
                result_type,
                result,
                base,
                indexes,
            } => Instruction::AccessChain {
                result_type: relocator(result_type),
                result: relocator(result),
                base: relocator(base),
                indexes: indexes.into_iter().map(relocator).collect(),
            },
            Self::StreamAccess {
                result_type,
                result,
                base,
                stream,
            } => Instruction::StreamAccess {
                result_type: relocator(result_type),
                result: relocator(result),
                base: relocator(base),
                stream: relocator(stream),
            },
            Self::CompositeExtract {
                result_type,
                result,
                composite,
                indexes,
            } => Instruction::CompositeExtract {
                result_type: relocator(result_type),
                result: relocator(result),
                composite: relocator(composite),
                indexes,
            },
            Self::CompositeConstruct {
                result_type,
                result,
                constituents,
            } => Instruction::CompositeConstruct {
                result_type: relocator(result_type),
                result: relocator(result),
                constituents: constituents.into_iter().map(relocator).collect(),
            },
            Self::IEqual {
                result_type,
                result,
                operand1,
                operand2,
            } => Instruction::IEqual {
                result_type: relocator(result_type),
                result: relocator(result),
                operand1: relocator(operand1),
                operand2: relocator(operand2),
            },
            Self::FAdd {
                result_type,
                result,
                operand1,
                operand2,
            } => Instruction::FAdd {
                result_type: relocator(result_type),
                result: relocator(result),
                operand1: relocator(operand1),
                operand2: relocator(operand2),
            },
            Self::FMul {
                result_type,
                result,
                operand1,
                operand2,
            } => Instruction::FMul {
                result_type: relocator(result_type),
                result: relocator(result),
                operand1: relocator(operand1),
                operand2: relocator(operand2),
            },
            Self::ControlBarrier {
                execution,
                memory,
                semantics,
            } => Instruction::ControlBarrier {
                execution: relocator(execution),
                memory: relocator(memory),
                semantics: relocator(semantics),
            },
            Self::EmitVertex => Instruction::EmitVertex,
            Self::EndPrimitive => Instruction::EndPrimitive,
            Self::EmitStreamVertex { stream } => Instruction::EmitStreamVertex {
                stream: relocator(stream),
            },
            Self::EndStreamPrimitive { stream } => Instruction::EndStreamPrimitive {
                stream: relocator(stream),
            },
        }
    }
}
impl Instruction<Id> {
    pub const fn result_id(&self) -> Option<Id> {
        match self {
            &Self::Variable { result, .. }
            | &Self::Function { result, .. }
            | &Self::FunctionParameter { result, .. }
            | &Self::FunctionCall { result, .. }
            | &Self::Label { result }
            | &Self::Load { result, .. }
            | &Self::AccessChain { result, .. }
            | &Self::StreamAccess { result, .. }
            | &Self::CompositeExtract { result, .. }
            | &Self::CompositeConstruct { result, .. }
            | &Self::IEqual { result, .. }
            | &Self::FAdd { result, .. }
            | &Self::FMul { result, .. } => Some(result),
            _ => None,
        }
    }

    pub const fn result_type_id(&self) -> Option<Id> {
        match self {
            &Self::Variable { result_type, .. }
            | &Self::Function { result_type, .. }
            | &Self::FunctionParameter { result_type, .. }
            | &Self::FunctionCall { result_type, .. }
            | &Self::Load { result_type, .. }
            | &Self::AccessChain { result_type, .. }
            | &Self::StreamAccess { result_type, .. }
            | &Self::CompositeExtract { result_type, .. }
            | &Self::CompositeConstruct { result_type, .. }
            | &Self::IEqual { result_type, .. }
            | &Self::FAdd { result_type, .. }
            | &Self::FMul { result_type, .. } => Some(result_type),
            _ => None,
        }
    }

    pub fn result_type_id_mut(&mut self) -> Option<&mut Id> {
        match self {
            Self::Variable { result_type, .. }
            | Self::Function { result_type, .. }
            | Self::FunctionParameter { result_type, .. }
            | Self::FunctionCall { result_type, .. }
            | Self::Load { result_type, .. }
            | Self::AccessChain { result_type, .. }
            | Self::StreamAccess { result_type, .. }
            | Self::CompositeExtract { result_type, .. }
            | Self::CompositeConstruct { result_type, .. }
            | Self::IEqual { result_type, .. }
            | Self::FAdd { result_type, .. }
            | Self::FMul { result_type, .. } => Some(result_type),
            _ => None,
        }
    }

    /// Every id operand, the result id included.
    pub fn referenced_ids(&self) -> Vec<Id> {
        let mut ids = Vec::new();
        self.clone().relocate(|id| ids.push(id));
        ids
    }

    /// Id operands other than the result id.
    pub fn operand_ids(&self) -> Vec<Id> {
        let result = self.result_id();
        let mut skipped = false;
        let mut ids = Vec::new();
        self.clone().relocate(|id| {
            if !skipped && Some(id) == result {
                skipped = true;
            } else {
                ids.push(id);
            }
        });
        ids
    }

    /// Ids this instruction is attached to when it only describes another one.
    pub const fn annotation_target(&self) -> Option<Id> {
        match self {
            &Self::Name { target, .. }
            | &Self::MemberName { target, .. }
            | &Self::Decorate { target, .. }
            | &Self::DecorateString { target, .. }
            | &Self::MemberDecorateString { target, .. } => Some(target),
            &Self::MemberDecorate { struct_type, .. } => Some(struct_type),
            _ => None,
        }
    }
}
