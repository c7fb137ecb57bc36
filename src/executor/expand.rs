//! Fans a batch result out to concrete `(path, value)` pairs.
//!
//! A deferred path addresses into the combined batch result: its head is a
//! batch slot, its tail mirrors the structure inside that slot. The hint
//! output path is the response position of the same logical node; list
//! placeholders in both paths correspond pairwise and are replaced by the
//! indices discovered while walking the materialized value.

use crate::{
    backend::Backend,
    error::{ExecutionError, FieldError, SourceLocation, did_parent_error},
    executor::scheduler::ExcludeFn,
    path::{Path, PathSegment},
    value::Value,
};

/// Expands one `(deferred path, hint path)` pair over `results`.
///
/// Emits one pair per concrete position: at the hint's depth for fully
/// materialized branches, or shallower for null short-circuits. Embedded
/// backend error annotations are recorded into `errors` and prune the
/// branch, as do branches below recorded error paths and branches the
/// `exclude` callback rejects.
///
/// # Panics
///
/// Panics if the placeholder counts of the deferred and hint paths differ,
/// or if the deferred path head is not a valid batch slot. Both are
/// scheduler invariant violations.
pub(crate) fn expand_from_object<B: Backend>(
    backend: &B,
    results: &[Value],
    deferred_path: &[PathSegment],
    hint_path: &Path,
    exclude: Option<&ExcludeFn>,
    locations: &[SourceLocation],
    errors: &mut Vec<ExecutionError>,
) -> Vec<(Path, Value)> {
    let Some((PathSegment::Index(slot), rest)) = deferred_path.split_first() else {
        panic!("deferred path must start with a batch slot: {deferred_path:?}");
    };
    let expected = results
        .get(*slot)
        .unwrap_or_else(|| panic!("batch slot {slot} out of bounds"));

    let hint = hint_path.to_vec();
    let deferred_placeholders = rest
        .iter()
        .filter(|s| **s == PathSegment::ListPlaceholder)
        .count();
    let hint_placeholders = hint
        .iter()
        .filter(|s| **s == PathSegment::ListPlaceholder)
        .count();
    assert_eq!(
        deferred_placeholders, hint_placeholders,
        "list placeholder counts of deferred path and hint path must match",
    );
    assert!(
        hint.len() >= rest.len(),
        "hint path shorter than deferred path tail",
    );

    // The hint prefix not mirrored by the deferred path is the (concrete)
    // position the batch slot was filed at.
    let prefix_len = hint.len() - rest.len();
    let out_path = Path::from_segments(hint[..prefix_len].iter().cloned());

    let mut walker = Walker {
        backend,
        exclude,
        locations,
        errors,
        pairs: Vec::new(),
    };
    let mut consumed = vec![PathSegment::Index(*slot)];
    walker.walk(expected, rest, out_path, &mut consumed);
    walker.pairs
}

struct Walker<'a, B: Backend> {
    backend: &'a B,
    exclude: Option<&'a ExcludeFn>,
    locations: &'a [SourceLocation],
    errors: &'a mut Vec<ExecutionError>,
    pairs: Vec<(Path, Value)>,
}

impl<B: Backend> Walker<'_, B> {
    fn walk(
        &mut self,
        expected: &Value,
        deferred: &[PathSegment],
        out_path: Path,
        consumed: &mut Vec<PathSegment>,
    ) {
        if let Some(exclude) = self.exclude {
            if exclude(consumed, expected) {
                return;
            }
        }
        if did_parent_error(&out_path.to_vec(), self.errors) {
            return;
        }
        if let Some(message) = self.backend.error_message(expected) {
            self.errors.push(ExecutionError::at_path(
                FieldError::from(message),
                self.locations.to_vec(),
                &out_path,
            ));
            return;
        }
        if expected.is_null() {
            self.pairs.push((out_path, Value::Null));
            return;
        }
        let Some((segment, rest)) = deferred.split_first() else {
            self.pairs.push((out_path, expected.clone()));
            return;
        };
        match segment {
            PathSegment::Key(key) => {
                let child = expected
                    .as_object_value()
                    .and_then(|o| o.get_field_value(key))
                    .cloned()
                    .unwrap_or(Value::Null);
                consumed.push(segment.clone());
                self.walk(&child, rest, out_path.child(segment.clone()), consumed);
                consumed.pop();
            }
            PathSegment::Index(i) => {
                let child = expected
                    .as_list_value()
                    .and_then(|l| l.get(*i))
                    .cloned()
                    .unwrap_or(Value::Null);
                consumed.push(segment.clone());
                self.walk(&child, rest, out_path.child(segment.clone()), consumed);
                consumed.pop();
            }
            PathSegment::ListPlaceholder => {
                let Some(items) = expected.as_list_value() else {
                    self.errors.push(ExecutionError::at_path(
                        FieldError::from("expected a list in deferred result"),
                        self.locations.to_vec(),
                        &out_path,
                    ));
                    return;
                };
                if items.is_empty() {
                    self.pairs.push((out_path, Value::List(vec![])));
                    return;
                }
                for (i, item) in items.iter().enumerate() {
                    consumed.push(PathSegment::Index(i));
                    self.walk(item, rest, out_path.child(PathSegment::Index(i)), consumed);
                    consumed.pop();
                }
            }
        }
    }
}
