//! Per-stage specialization of subroutines shared between stages.

use std::collections::HashMap;

use log::debug;

use super::analysis::{LiveAnalysis, MethodInfo, Usage};
use crate::error::{LinkError, Result};
use crate::module::Module;
use crate::spirv::{Id, Instruction};
use crate::symbol::meta::ShaderStage;

/// Remembers the unpatched body of every stream-accessing function of this stage.
/// Must run before any body of the stage is rewritten.
pub fn snapshot_pristine_bodies(module: &Module, live: &mut LiveAnalysis) -> Result<()> {
    for function in live.stream_methods_this_stage() {
        if live.pristine_bodies.contains_key(&function) {
            continue;
        }
        let range = module
            .function_range(function)
            .ok_or_else(|| LinkError::malformed(format!("function %{function} not found")))?;
        live.pristine_bodies
            .insert(function, module.function_ops[range].to_vec());
    }

    Ok(())
}

/// Clones every stream-accessing function already specialized for another stage and
/// rewires this stage's calls to the clones. Returns original to clone ids.
pub fn duplicate_methods(
    module: &mut Module,
    live: &mut LiveAnalysis,
    stage: ShaderStage,
) -> Result<HashMap<Id, Id>> {
    let mut clones = HashMap::new();

    for function in live.stream_methods_this_stage() {
        let specialized_elsewhere = live
            .referenced_methods
            .get(&function)
            .and_then(|m| m.specialized_for)
            .is_some_and(|s| s != stage);
        if !specialized_elsewhere {
            continue;
        }

        let body = live
            .pristine_bodies
            .get(&function)
            .ok_or_else(|| LinkError::malformed(format!("no pristine body for %{function}")))?
            .clone();

        let mut fresh = HashMap::new();
        for id in body.iter().filter_map(Instruction::result_id) {
            fresh.insert(id, module.new_id());
        }
        let clone_id = fresh
            .get(&function)
            .copied()
            .ok_or_else(|| LinkError::malformed(format!("function %{function} has no header")))?;
        module.function_ops.extend(
            body.iter()
                .cloned()
                .map(|op| op.relocate(|id| fresh.get(&id).copied().unwrap_or(id))),
        );
        if let Some(name) = module.name_of(function).map(str::to_owned) {
            module.add_name(clone_id, name);
        }
        debug!("{stage}: specialized %{function} as %{clone_id}");

        live.pristine_bodies.insert(clone_id, body);
        if let Some(original) = live.referenced_methods.get_mut(&function) {
            original.usage.used_this_stage = false;
        }
        live.referenced_methods.insert(
            clone_id,
            MethodInfo {
                usage: Usage {
                    used_this_stage: true,
                    used_any_stage: true,
                },
                has_stream_access: true,
                specialized_for: None,
            },
        );
        clones.insert(function, clone_id);
    }

    if !clones.is_empty() {
        rewire_calls(module, &live.stream_methods_this_stage(), &clones)?;
    }

    Ok(clones)
}

fn rewire_calls(module: &mut Module, functions: &[Id], clones: &HashMap<Id, Id>) -> Result<()> {
    for &f in functions {
        let range = module
            .function_range(f)
            .ok_or_else(|| LinkError::malformed(format!("function %{f} not found")))?;
        for op in &mut module.function_ops[range] {
            if let Instruction::FunctionCall { function, .. } = op {
                if let Some(&clone) = clones.get(function) {
                    *function = clone;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::analysis::AnalysisResult;
    use crate::interface::read_write::analyze_stream_read_writes;
    use crate::module::builder::FunctionBuilder;
    use crate::spirv::Type;
    use pretty_assertions::assert_eq;

    #[test]
    fn clones_once_per_stage_and_rewires_callers() {
        let mut m = Module::new();
        let s = m.declare_stream("s", Type::float(32), None);

        let mut shared = FunctionBuilder::new(&mut m, "compute", Type::Void, vec![]);
        let v = shared.load(Type::float(32), s);
        shared.store(s, v);
        let shared = shared.finish();

        let mut vs = FunctionBuilder::new(&mut m, "VSMain", Type::Void, vec![]);
        vs.call(Type::Void, shared, vec![]);
        vs.call(Type::Void, shared, vec![]);
        let vs = vs.finish();

        let mut analysis = AnalysisResult::analyze(&m);
        let mut live = LiveAnalysis::default();
        analyze_stream_read_writes(&m, vs, &mut analysis, &mut live).unwrap();
        snapshot_pristine_bodies(&m, &mut live).unwrap();
        // pretend a previous stage already specialized it
        live.referenced_methods.get_mut(&shared).unwrap().specialized_for =
            Some(ShaderStage::Pixel);

        let clones = duplicate_methods(&mut m, &mut live, ShaderStage::Vertex).unwrap();

        assert_eq!(clones.len(), 1);
        let clone = clones[&shared];
        assert_eq!(m.name_of(clone), Some("compute"));
        assert_eq!(
            live.stream_methods_this_stage(),
            {
                let mut v = vec![vs, clone];
                v.sort();
                v
            }
        );

        let calls = m.function_ops[m.function_range(vs).unwrap()]
            .iter()
            .filter_map(|op| match op {
                Instruction::FunctionCall { function, .. } => Some(*function),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(calls, vec![clone, clone]);

        // the clone has its own ids but still touches the same stream
        let clone_ops = &m.function_ops[m.function_range(clone).unwrap()];
        let original_ops = &m.function_ops[m.function_range(shared).unwrap()];
        assert_eq!(clone_ops.len(), original_ops.len());
        for (a, b) in clone_ops.iter().zip(original_ops) {
            if let (Some(x), Some(y)) = (a.result_id(), b.result_id()) {
                assert_ne!(x, y);
            }
        }
        assert!(clone_ops.iter().any(|op| op.referenced_ids().contains(&s)));
    }

    #[test]
    fn unspecialized_functions_are_left_alone() {
        let mut m = Module::new();
        let s = m.declare_stream("s", Type::float(32), None);
        let mut f = FunctionBuilder::new(&mut m, "PSMain", Type::Void, vec![]);
        f.load(Type::float(32), s);
        let f = f.finish();

        let mut analysis = AnalysisResult::analyze(&m);
        let mut live = LiveAnalysis::default();
        analyze_stream_read_writes(&m, f, &mut analysis, &mut live).unwrap();
        snapshot_pristine_bodies(&m, &mut live).unwrap();

        let clones = duplicate_methods(&mut m, &mut live, ShaderStage::Pixel).unwrap();
        assert!(clones.is_empty());
        assert!(live.pristine_bodies.contains_key(&f));
    }
}
