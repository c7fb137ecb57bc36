//! Folds completed pieces into the response tree.

use std::sync::Arc;

use crate::{
    ast::node_locations,
    backend::Backend,
    error::{ExecutionError, dedupe_errors},
    executor::{
        ExecCtx,
        scheduler::{CompletedPiece, Outcome},
    },
    path::PathSegment,
    value::{Object, Value},
};

/// Applies completed pieces in creation order, serializes leaves, applies
/// null barriers, and dedupes errors.
pub(crate) async fn assemble<B: Backend>(
    ctx: &ExecCtx<B>,
    outcome: Outcome<B>,
) -> (Value, Vec<ExecutionError>) {
    let Outcome {
        completed,
        mut errors,
        barriers,
    } = outcome;

    let barriers: Vec<Vec<PathSegment>> = barriers
        .iter()
        .map(|b| b.placeholder_free_prefix().to_vec())
        .collect();

    let mut data = Value::Null;
    let mut wrote = false;

    for piece in completed {
        let CompletedPiece {
            path,
            value,
            serialize,
            nodes,
        } = piece;
        let segments = path.to_vec();
        debug_assert!(
            !segments.contains(&PathSegment::ListPlaceholder),
            "list placeholder in completed path {path}",
        );
        if barriers.iter().any(|b| is_prefix(b, &segments)) {
            continue;
        }

        let value = match serialize {
            Some(serialize) => match serialize(value, Arc::clone(&ctx.context)).await {
                Ok(v) => v,
                Err(e) => {
                    // Serialization failure leaves the slot as-is; null
                    // propagation is the caller's concern.
                    errors.push(ExecutionError::at_path(e, node_locations(&nodes), &path));
                    continue;
                }
            },
            None => value,
        };

        write(&mut data, &segments, value);
        wrote = true;
    }

    for barrier in &barriers {
        write(&mut data, barrier, Value::Null);
        wrote = true;
    }

    if !wrote {
        data = Value::Null;
    }

    (data, dedupe_errors(errors))
}

fn is_prefix(prefix: &[PathSegment], path: &[PathSegment]) -> bool {
    prefix.len() <= path.len() && prefix.iter().zip(path).all(|(a, b)| a.is_equivalent(b))
}

// Walks the output path, creating missing intermediate objects/arrays.
// Numeric segments demand arrays and string segments demand objects; a
// conflict is a scheduler invariant violation.
fn write(current: &mut Value, segments: &[PathSegment], value: Value) {
    let Some((segment, rest)) = segments.split_first() else {
        *current = value;
        return;
    };
    match segment {
        PathSegment::Key(key) => {
            if current.is_null() {
                *current = Value::Object(Object::default());
            }
            let Value::Object(object) = current else {
                panic!("expected object at {key} during result assembly");
            };
            write(object.entry_or_null(key), rest, value);
        }
        PathSegment::Index(i) => {
            if current.is_null() {
                *current = Value::List(vec![]);
            }
            let Value::List(list) = current else {
                panic!("expected list at index {i} during result assembly");
            };
            if list.len() <= *i {
                list.resize(i + 1, Value::Null);
            }
            write(&mut list[*i], rest, value);
        }
        PathSegment::ListPlaceholder => {
            panic!("list placeholder in completed path");
        }
    }
}
