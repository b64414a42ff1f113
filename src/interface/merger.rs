use std::collections::hash_map::Entry;
use std::collections::HashMap;

use log::debug;

use super::analysis::AnalysisResult;
use crate::error::{LinkError, Result};
use crate::module::Module;
use crate::spirv::{Id, Instruction};

/// Unifies stream slots sharing a semantic (case-insensitively) into the lowest id.
pub fn merge_same_semantic_variables(
    module: &mut Module,
    analysis: &mut AnalysisResult,
) -> Result<()> {
    let mut first_by_semantic = HashMap::<String, Id>::new();
    let mut remap = HashMap::<Id, Id>::new();

    for (&id, stream) in &analysis.streams {
        let Some(semantic) = &stream.semantic else {
            continue;
        };
        match first_by_semantic.entry(semantic.to_ascii_uppercase()) {
            Entry::Vacant(e) => {
                e.insert(id);
            }
            Entry::Occupied(e) => {
                let first = &analysis.streams[e.get()];
                if first.ty != stream.ty {
                    return Err(LinkError::SemanticTypeMismatch {
                        semantic: semantic.clone(),
                        first: first.ty.to_string(),
                        second: stream.ty.to_string(),
                    });
                }
                remap.insert(id, *e.get());
            }
        }
    }

    if remap.is_empty() {
        return Ok(());
    }

    for (dup, first) in &remap {
        if let Some(removed) = analysis.streams.remove(dup) {
            debug!(
                "merging stream {} into %{first} (semantic {})",
                removed.name,
                removed.semantic.as_deref().unwrap_or_default()
            );
            if let Some(target) = analysis.streams.get_mut(first) {
                target.patch |= removed.patch;
                target.method_initializer =
                    target.method_initializer.or(removed.method_initializer);
            }
        }
    }

    module.global_variable_ops.retain(
        |op| !matches!(op, Instruction::Variable { result, .. } if remap.contains_key(result)),
    );
    module.remove_annotations_of(|id| remap.contains_key(&id));
    module.relocate_ids(|id| remap.get(&id).copied().unwrap_or(id));

    Ok(())
}

/// Stage boundary: whatever this stage reads becomes the previous stage's output.
pub fn propagate_streams_from_previous_stage(analysis: &mut AnalysisResult) {
    for s in analysis.streams.values_mut() {
        s.output_layout_location = s.input_layout_location.take();
        s.output = s.input();
        s.read = false;
        s.write = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::module::builder::FunctionBuilder;
    use crate::spirv::Type;

    #[test]
    fn duplicates_are_repointed_to_lowest_id() {
        let mut m = Module::new();
        let ty = Type::float(32).of_vector(4);
        let a = m.declare_stream("ColorA", ty.clone(), Some("COLOR"));
        let b = m.declare_stream("ColorB", ty.clone(), Some("color"));

        let mut f = FunctionBuilder::new(&mut m, "PSMain", Type::Void, vec![]);
        let v = f.load(ty.clone(), b);
        f.store(a, v);
        let entry = f.finish();

        let mut analysis = AnalysisResult::analyze(&m);
        merge_same_semantic_variables(&mut m, &mut analysis).unwrap();

        assert!(analysis.streams.contains_key(&a));
        assert!(!analysis.streams.contains_key(&b));
        assert!(m.global_variable(b).is_none());
        assert_eq!(m.name_of(b), None);
        let range = m.function_range(entry).unwrap();
        assert!(m.function_ops[range]
            .iter()
            .all(|op| !op.referenced_ids().contains(&b)));
    }

    #[test]
    fn differing_types_are_rejected() {
        let mut m = Module::new();
        m.declare_stream("a", Type::float(32).of_vector(4), Some("TEXCOORD0"));
        m.declare_stream("b", Type::float(32).of_vector(2), Some("TEXCOORD0"));

        let mut analysis = AnalysisResult::analyze(&m);
        let err = merge_same_semantic_variables(&mut m, &mut analysis).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeConversion);
    }

    #[test]
    fn boundary_rule() {
        let mut m = Module::new();
        let id = m.declare_stream("uv", Type::float(32).of_vector(2), Some("TEXCOORD0"));
        let mut analysis = AnalysisResult::analyze(&m);
        {
            let s = analysis.streams.get_mut(&id).unwrap();
            s.mark_read();
            s.input_layout_location = Some(3);
        }

        propagate_streams_from_previous_stage(&mut analysis);

        let s = &analysis.streams[&id];
        assert!(s.output);
        assert!(!s.read && !s.write);
        assert_eq!(s.output_layout_location, Some(3));
        assert_eq!(s.input_layout_location, None);
        assert!(s.input(), "forwarded until written");
    }
}
