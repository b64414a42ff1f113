use std::fmt::{self, Write};

use super::Module;
use crate::spirv::{Constant, Id, Instruction};

struct Ids<'a>(&'a [Id]);
impl fmt::Display for Ids<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.0 {
            write!(f, " %{id}")?;
        }
        Ok(())
    }
}

struct Literals<'a>(&'a [u32]);
impl fmt::Display for Literals<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for x in self.0 {
            write!(f, " {x}")?;
        }
        Ok(())
    }
}

fn write_result(f: &mut impl Write, result: Option<Id>) -> fmt::Result {
    match result {
        Some(id) => write!(f, "{:>12} = ", format!("%{id}")),
        None => write!(f, "{:15}", ""),
    }
}

pub(super) fn write_instruction(f: &mut impl Write, op: &Instruction) -> fmt::Result {
    write_result(f, op.result_id())?;
    match op {
        Instruction::Nop => write!(f, "OpNop"),
        Instruction::Name { target, name } => write!(f, "OpName %{target} {name:?}"),
        Instruction::MemberName {
            target,
            member,
            name,
        } => write!(f, "OpMemberName %{target} {member} {name:?}"),
        Instruction::Decorate {
            target,
            decoration,
            args,
        } => write!(f, "OpDecorate %{target} {decoration:?}{}", Literals(args)),
        Instruction::DecorateString {
            target,
            decoration,
            value,
        } => write!(f, "OpDecorateString %{target} {decoration:?} {value:?}"),
        Instruction::MemberDecorate {
            struct_type,
            member,
            decoration,
            args,
        } => write!(
            f,
            "OpMemberDecorate %{struct_type} {member} {decoration:?}{}",
            Literals(args)
        ),
        Instruction::MemberDecorateString {
            target,
            member,
            decoration,
            value,
        } => write!(
            f,
            "OpMemberDecorateString %{target} {member} {decoration:?} {value:?}"
        ),
        Instruction::EntryPoint {
            execution_model,
            entry_point,
            name,
            interface,
        } => write!(
            f,
            "OpEntryPoint {execution_model:?} %{entry_point} {name:?}{}",
            Ids(interface)
        ),
        Instruction::ExecutionMode {
            entry_point,
            mode,
            args,
        } => write!(f, "OpExecutionMode %{entry_point} {mode:?}{}", Literals(args)),
        Instruction::Variable {
            result_type,
            storage_class,
            initializer,
            method_initializer,
            ..
        } => {
            write!(f, "OpVariable %{result_type} {storage_class:?}")?;
            if let Some(i) = initializer {
                write!(f, " %{i}")?;
            }
            if let Some(m) = method_initializer {
                write!(f, " initializer(%{m})")?;
            }
            Ok(())
        }
        Instruction::Function {
            result_type,
            function_control,
            function_type,
            ..
        } => write!(
            f,
            "OpFunction %{result_type} {:?} %{function_type}",
            function_control.bits()
        ),
        Instruction::FunctionParameter { result_type, .. } => {
            write!(f, "OpFunctionParameter %{result_type}")
        }
        Instruction::FunctionEnd => write!(f, "OpFunctionEnd"),
        Instruction::FunctionCall {
            result_type,
            function,
            arguments,
            ..
        } => write!(
            f,
            "OpFunctionCall %{result_type} %{function}{}",
            Ids(arguments)
        ),
        Instruction::Label { .. } => write!(f, "OpLabel"),
        Instruction::Branch { target_label } => write!(f, "OpBranch %{target_label}"),
        Instruction::BranchConditional {
            condition,
            true_label,
            false_label,
        } => write!(
            f,
            "OpBranchConditional %{condition} %{true_label} %{false_label}"
        ),
        Instruction::SelectionMerge {
            merge_block,
            selection_control,
        } => write!(
            f,
            "OpSelectionMerge %{merge_block} {}",
            selection_control.bits()
        ),
        Instruction::Return => write!(f, "OpReturn"),
        Instruction::ReturnValue { value } => write!(f, "OpReturnValue %{value}"),
        Instruction::Load {
            result_type,
            pointer,
            ..
        } => write!(f, "OpLoad %{result_type} %{pointer}"),
        Instruction::Store { pointer, object } => write!(f, "OpStore %{pointer} %{object}"),
        Instruction::AccessChain {
            result_type,
            base,
            indexes,
            ..
        } => write!(f, "OpAccessChain %{result_type} %{base}{}", Ids(indexes)),
        Instruction::StreamAccess {
            result_type,
            base,
            stream,
            ..
        } => write!(f, "OpStreamAccess %{result_type} %{base} %{stream}"),
        Instruction::CompositeExtract {
            result_type,
            composite,
            indexes,
            ..
        } => write!(
            f,
            "OpCompositeExtract %{result_type} %{composite}{}",
            Literals(indexes)
        ),
        Instruction::CompositeConstruct {
            result_type,
            constituents,
            ..
        } => write!(
            f,
            "OpCompositeConstruct %{result_type}{}",
            Ids(constituents)
        ),
        Instruction::IEqual {
            result_type,
            operand1,
            operand2,
            ..
        } => write!(f, "OpIEqual %{result_type} %{operand1} %{operand2}"),
        Instruction::FAdd {
            result_type,
            operand1,
            operand2,
            ..
        } => write!(f, "OpFAdd %{result_type} %{operand1} %{operand2}"),
        Instruction::FMul {
            result_type,
            operand1,
            operand2,
            ..
        } => write!(f, "OpFMul %{result_type} %{operand1} %{operand2}"),
        Instruction::ControlBarrier {
            execution,
            memory,
            semantics,
        } => write!(f, "OpControlBarrier %{execution} %{memory} %{semantics}"),
        Instruction::EmitVertex => write!(f, "OpEmitVertex"),
        Instruction::EndPrimitive => write!(f, "OpEndPrimitive"),
        Instruction::EmitStreamVertex { stream } => write!(f, "OpEmitStreamVertex %{stream}"),
        Instruction::EndStreamPrimitive { stream } => {
            write!(f, "OpEndStreamPrimitive %{stream}")
        }
    }
}

fn write_constant(f: &mut impl Write, c: &Constant) -> fmt::Result {
    match c {
        Constant::True { result_type } => write!(f, "true: {result_type}"),
        Constant::False { result_type } => write!(f, "false: {result_type}"),
        Constant::Constant {
            result_type,
            value_bits,
        } => match result_type.scalar_element() {
            Some(s) if s.is_floating() => {
                write!(f, "{:?}: {result_type}", f32::from_bits(*value_bits))
            }
            _ => write!(f, "{value_bits}: {result_type}"),
        },
        Constant::Composite {
            result_type,
            constituents,
        } => {
            write!(f, "{result_type}(")?;
            for (n, c) in constituents.iter().enumerate() {
                if n > 0 {
                    write!(f, ", ")?;
                }
                write_constant(f, c)?;
            }
            write!(f, ")")
        }
        Constant::Null { result_type } => write!(f, "null: {result_type}"),
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; Bound: {}", self.bound())?;
        for c in &self.capabilities {
            writeln!(f, "{:15}OpCapability {c:?}", "")?;
        }
        writeln!(
            f,
            "{:15}OpMemoryModel {:?} {:?}",
            "", self.addressing_model, self.memory_model
        )?;

        let sections = [
            &self.entry_point_ops,
            &self.execution_mode_ops,
            &self.debug_ops,
            &self.annotation_ops,
        ];
        for op in sections.into_iter().flatten() {
            write_instruction(f, op)?;
            writeln!(f)?;
        }

        for (id, t) in self.types() {
            writeln!(f, "{:>12} = OpType {t}", format!("%{id}"))?;
        }
        for (id, c) in self.constants() {
            write!(f, "{:>12} = OpConstant ", format!("%{id}"))?;
            write_constant(f, c)?;
            writeln!(f)?;
        }

        for op in self.global_variable_ops.iter().chain(&self.function_ops) {
            write_instruction(f, op)?;
            writeln!(f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spirv::asm::Decoration;

    #[test]
    fn instruction_layout() {
        let mut s = String::new();
        write_instruction(
            &mut s,
            &Instruction::Load {
                result_type: 3,
                result: 7,
                pointer: 5,
            },
        )
        .unwrap();
        assert_eq!(s, "          %7 = OpLoad %3 %5");

        s.clear();
        write_instruction(
            &mut s,
            &Instruction::Decorate {
                target: 5,
                decoration: Decoration::Location,
                args: vec![2],
            },
        )
        .unwrap();
        assert_eq!(s, "               OpDecorate %5 Location 2");
    }
}
