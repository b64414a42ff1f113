//! Removal of everything no linked stage keeps alive.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::debug;

use super::analysis::{AnalysisResult, LiveAnalysis};
use crate::module::Module;
use crate::spirv::{asm::StorageClass, Constant, Id, Instruction};
use crate::symbol::SymbolTable;

/// Counts of what [`remove_unreferenced_code`] dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalStats {
    pub functions: usize,
    pub variables: usize,
    pub types_and_constants: usize,
}

/// Cbuffers and resources kept because they are used in some stage, or share a resource group
/// or logical group with something that is.
fn used_buffers_and_resources(analysis: &AnalysisResult) -> HashSet<Id> {
    let mut used = HashSet::new();
    used.extend(
        analysis
            .cbuffers
            .iter()
            .filter(|(_, c)| c.usage.used_any_stage)
            .map(|(&id, _)| id),
    );
    used.extend(
        analysis
            .resources
            .iter()
            .filter(|(_, r)| r.usage.used_any_stage)
            .map(|(&id, _)| id),
    );

    // a resource group stays whole
    for group in analysis.resource_groups.values() {
        if group.resources.iter().any(|r| used.contains(r)) {
            used.extend(group.resources.iter().copied());
        }
    }

    // logical groups are keyed by owner name so a cbuffer and the resource group it
    // describes can share one
    let mut logical_groups = HashMap::<String, Vec<Id>>::new();
    for group in analysis.resource_groups.values() {
        if let Some(l) = &group.logical_group {
            logical_groups
                .entry(format!("{}.{l}", group.name))
                .or_default()
                .extend(group.resources.iter().copied());
        }
    }
    for (&id, cbuffer) in &analysis.cbuffers {
        if let Some(l) = &cbuffer.logical_group {
            logical_groups
                .entry(format!("{}.{l}", cbuffer.name))
                .or_default()
                .push(id);
        }
    }
    for members in logical_groups.values() {
        if members.iter().any(|m| used.contains(m)) {
            used.extend(members.iter().copied());
        }
    }

    used
}

fn callees(module: &Module, function: Id) -> Vec<Id> {
    let Some(range) = module.function_range(function) else {
        return Vec::new();
    };
    module.function_ops[range]
        .iter()
        .filter_map(|op| match op {
            &Instruction::FunctionCall { function, .. } => Some(function),
            _ => None,
        })
        .collect()
}

/// Closes `live` over the call graph.
fn close_over_calls(module: &Module, live: &mut BTreeSet<Id>) {
    let mut pending = live.iter().copied().collect::<Vec<_>>();
    while let Some(f) = pending.pop() {
        for callee in callees(module, f) {
            if live.insert(callee) {
                pending.push(callee);
            }
        }
    }
}

/// Deletes dead functions, variables, types, constants and their annotations, then drops
/// symbols of removed functions. Globals in `linker_declared` are always kept.
pub fn remove_unreferenced_code(
    module: &mut Module,
    table: &mut SymbolTable,
    analysis: &AnalysisResult,
    live: &LiveAnalysis,
    linker_declared: &HashSet<Id>,
) -> RemovalStats {
    let all_functions = module.function_ids();
    let mut live_functions = all_functions
        .iter()
        .copied()
        .filter(|&f| live.is_live_any_stage(f))
        .collect::<BTreeSet<_>>();
    let used_buffers = used_buffers_and_resources(analysis);

    // Globals and functions keep each other alive through initializers; iterate to a fixpoint.
    let mut kept_globals = HashSet::new();
    loop {
        close_over_calls(module, &mut live_functions);

        let mut referenced = HashSet::new();
        for &f in &live_functions {
            if let Some(range) = module.function_range(f) {
                for op in &module.function_ops[range] {
                    referenced.extend(op.operand_ids());
                }
            }
        }
        for op in &module.entry_point_ops {
            referenced.extend(op.referenced_ids());
        }

        kept_globals.clear();
        let mut new_functions = Vec::new();
        for op in &module.global_variable_ops {
            let &Instruction::Variable {
                result,
                storage_class,
                initializer,
                method_initializer,
                ..
            } = op
            else {
                continue;
            };
            let keep = referenced.contains(&result)
                || match storage_class {
                    StorageClass::Stream => false,
                    StorageClass::Uniform
                    | StorageClass::UniformConstant
                    | StorageClass::StorageBuffer
                        if analysis.cbuffers.contains_key(&result)
                            || analysis.resources.contains_key(&result) =>
                    {
                        used_buffers.contains(&result)
                    }
                    _ => {
                        linker_declared.contains(&result)
                            || analysis
                                .variables
                                .get(&result)
                                .is_some_and(|v| v.usage.used_any_stage)
                    }
                };
            if keep {
                kept_globals.insert(result);
                kept_globals.extend(initializer);
                if let Some(m) = method_initializer {
                    if !live_functions.contains(&m) {
                        new_functions.push(m);
                    }
                }
            }
        }

        if new_functions.is_empty() {
            break;
        }
        live_functions.extend(new_functions);
    }

    let mut removed = HashSet::new();
    let mut stats = RemovalStats::default();

    module.global_variable_ops.retain(|op| match op.result_id() {
        Some(id) if !kept_globals.contains(&id) => {
            removed.insert(id);
            stats.variables += 1;
            false
        }
        _ => true,
    });

    for f in all_functions.iter().filter(|f| !live_functions.contains(f)) {
        let Some(range) = module.function_range(*f) else {
            continue;
        };
        removed.extend(
            module
                .function_ops
                .drain(range)
                .filter_map(|op| op.result_id()),
        );
        stats.functions += 1;
    }

    // types and constants reachable from what survived
    let mut roots = Vec::new();
    for op in module
        .entry_point_ops
        .iter()
        .chain(&module.global_variable_ops)
        .chain(&module.function_ops)
    {
        roots.extend(op.referenced_ids());
    }
    let kept_values = reachable_types_and_constants(module, roots);
    let dead_values = module
        .types()
        .map(|(id, _)| id)
        .chain(module.constants().map(|(id, _)| id))
        .filter(|id| !kept_values.contains(id))
        .collect::<HashSet<_>>();
    stats.types_and_constants = dead_values.len();
    module.retain_types_and_constants(|id| !dead_values.contains(&id));
    removed.extend(dead_values);

    module.remove_annotations_of(|id| removed.contains(&id));
    table.retain_functions(|id| live_functions.contains(&id));

    debug!(
        "removed {} functions, {} variables, {} types and constants",
        stats.functions, stats.variables, stats.types_and_constants
    );
    stats
}

fn reachable_types_and_constants(module: &Module, roots: Vec<Id>) -> HashSet<Id> {
    let mut kept = HashSet::new();
    let mut pending = roots;

    while let Some(id) = pending.pop() {
        if !kept.insert(id) {
            continue;
        }
        if let Some(ty) = module.type_of(id) {
            pending.extend(
                ty.component_types()
                    .iter()
                    .filter_map(|t| module.type_id(t)),
            );
        } else if let Some(c) = module.constant(id) {
            pending.extend(module.type_id(c.result_type()));
            if let Constant::Composite { constituents, .. } = c {
                pending.extend(constituents.iter().filter_map(|c| module.constant_id(c)));
            }
        }
    }

    kept
}
