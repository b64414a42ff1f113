//! Call-graph walk marking stream reads/writes and global liveness for one stage.

use std::collections::HashMap;

use log::trace;

use super::analysis::{AnalysisResult, LiveAnalysis};
use super::builtin;
use crate::error::{LinkError, Result};
use crate::module::Module;
use crate::spirv::{Id, Instruction};
use crate::symbol::meta::{classify_semantic, SemanticKind, ShaderStage};

pub fn analyze_stream_read_writes(
    module: &Module,
    entry: Id,
    analysis: &mut AnalysisResult,
    live: &mut LiveAnalysis,
) -> Result<()> {
    let mut call_stack = Vec::new();
    analyze_function(module, entry, &mut call_stack, analysis, live).map(drop)
}

fn analyze_function(
    module: &Module,
    function: Id,
    call_stack: &mut Vec<Id>,
    analysis: &mut AnalysisResult,
    live: &mut LiveAnalysis,
) -> Result<bool> {
    if call_stack.contains(&function) {
        return Err(LinkError::RecursiveCall { function });
    }
    if !live.mark_method_used(function) {
        return Ok(live
            .referenced_methods
            .get(&function)
            .is_some_and(|m| m.has_stream_access));
    }

    let body = match live.pristine_bodies.get(&function) {
        Some(b) => b.clone(),
        None => {
            let range = module
                .function_range(function)
                .ok_or_else(|| LinkError::malformed(format!("function %{function} not found")))?;
            module.function_ops[range].to_vec()
        }
    };
    trace!("analyzing %{function} ({} instructions)", body.len());

    let mut has_stream_access = module
        .function_type(function)
        .is_some_and(|t| t.contains_streams_placeholder());
    // Any read or write through an access chain counts as one on the root variable.
    let mut chain_roots = HashMap::<Id, Id>::new();
    let root_of = |roots: &HashMap<Id, Id>, id: Id| roots.get(&id).copied().unwrap_or(id);

    call_stack.push(function);
    for op in &body {
        match *op {
            Instruction::AccessChain { result, base, .. } => {
                let root = root_of(&chain_roots, base);
                chain_roots.insert(result, root);
                has_stream_access |= analysis.streams.contains_key(&root);
            }
            Instruction::StreamAccess { result, stream, .. } => {
                chain_roots.insert(result, stream);
                has_stream_access = true;
            }
            Instruction::Load { pointer, .. } => {
                if let Some(s) = analysis.streams.get_mut(&root_of(&chain_roots, pointer)) {
                    if s.write {
                        s.usage.mark();
                    } else {
                        trace!("stream {} read", s.name);
                        s.mark_read();
                    }
                    has_stream_access = true;
                }
            }
            Instruction::Store { pointer, .. } => {
                if let Some(s) = analysis.streams.get_mut(&root_of(&chain_roots, pointer)) {
                    trace!("stream {} written", s.name);
                    s.mark_written();
                    has_stream_access = true;
                }
            }
            Instruction::FunctionCall { function: callee, .. } => {
                has_stream_access |= analyze_function(module, callee, call_stack, analysis, live)?;
            }
            Instruction::EmitStreamVertex { .. } | Instruction::EndStreamPrimitive { .. } => {
                has_stream_access = true;
            }
            _ => (),
        }

        for id in op.operand_ids() {
            analysis.mark_global_used(id);
        }
        if let Some(t) = op.result_type_id().and_then(|t| module.type_of(t)) {
            has_stream_access |= t.contains_streams_placeholder();
        }
    }
    call_stack.pop();

    if let Some(m) = live.referenced_methods.get_mut(&function) {
        m.has_stream_access = has_stream_access;
    }

    Ok(has_stream_access)
}

/// Streams whose initializer runs in the wrapper count as written before the entry starts.
pub fn mark_initialized_streams(analysis: &mut AnalysisResult) {
    for s in analysis.streams.values_mut() {
        if s.method_initializer.is_some() {
            s.write = true;
        }
    }
}

/// System values the fixed-function pipeline provides to `stage` are never asked
/// from the previous stage.
pub fn clear_generated_system_values(analysis: &mut AnalysisResult, stage: ShaderStage) {
    for s in analysis.streams.values_mut() {
        let Some(semantic) = s.semantic.as_deref() else {
            continue;
        };
        if let SemanticKind::System(sv) = classify_semantic(semantic) {
            if builtin::generated_by_stage(stage, sv) {
                s.read = false;
            }
        }
    }
}

pub fn reset_used_this_stage(analysis: &mut AnalysisResult, live: &mut LiveAnalysis) {
    analysis.reset_used_this_stage();
    live.reset_used_this_stage();
}
