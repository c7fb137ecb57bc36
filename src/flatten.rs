//! Selection flattening against a concrete object type.
//!
//! Resolves fragment spreads and inline fragments, groups fields by
//! response key in source order, and rejects duplicate response keys whose
//! arguments or directives differ.

use std::sync::Arc;

use fnv::FnvHashSet;
use graphql_parser::query as q;
use indexmap::IndexMap;

use crate::{
    ast::{FieldNode, FragmentDefinition, SelectionSet, response_key},
    backend::Backend,
    error::{FieldError, FieldResult},
    schema::model::Schema,
};

/// The field nodes grouped under one response key.
///
/// Duplicate selections of the same field merge by keeping every node in
/// the group; child selection sets are gathered from all of them.
#[derive(Clone, Debug)]
pub struct FieldGroup {
    /// The response key (`alias ?? name`).
    pub response_key: String,
    /// All field nodes selected under this key, in source order.
    pub nodes: Vec<FieldNode>,
}

impl FieldGroup {
    /// The primary node of the group.
    pub fn node(&self) -> &FieldNode {
        &self.nodes[0]
    }
}

/// Flattens `selection_sets` against `concrete_type` into a deduplicated,
/// ordered list of field groups.
pub fn flatten_selections<B: Backend>(
    schema: &Schema<B>,
    concrete_type: &str,
    selection_sets: &[&SelectionSet],
    fragments: &fnv::FnvHashMap<String, Arc<FragmentDefinition>>,
) -> FieldResult<Vec<FieldGroup>> {
    let mut grouped: IndexMap<String, Vec<FieldNode>> = IndexMap::new();
    let mut visited = FnvHashSet::default();
    for set in selection_sets {
        collect(
            schema,
            concrete_type,
            set,
            fragments,
            &mut grouped,
            &mut visited,
        )?;
    }
    Ok(grouped
        .into_iter()
        .map(|(response_key, nodes)| FieldGroup {
            response_key,
            nodes,
        })
        .collect())
}

fn collect<B: Backend>(
    schema: &Schema<B>,
    concrete_type: &str,
    set: &SelectionSet,
    fragments: &fnv::FnvHashMap<String, Arc<FragmentDefinition>>,
    grouped: &mut IndexMap<String, Vec<FieldNode>>,
    visited: &mut FnvHashSet<String>,
) -> FieldResult<()> {
    for selection in &set.items {
        match selection {
            q::Selection::Field(field) => {
                let key = response_key(field).to_owned();
                let node = Arc::new(field.clone());
                if let Some(group) = grouped.get_mut(&key) {
                    check_merge_compatible(&key, &group[0], &node)?;
                    group.push(node);
                } else {
                    grouped.insert(key, vec![node]);
                }
            }
            q::Selection::FragmentSpread(spread) => {
                // The same spread appearing twice in one selection set is
                // included once.
                if !visited.insert(spread.fragment_name.clone()) {
                    continue;
                }
                let fragment = fragments.get(&spread.fragment_name).ok_or_else(|| {
                    FieldError::from(format!("unknown fragment {}", spread.fragment_name))
                })?;
                let q::TypeCondition::On(condition) = &fragment.type_condition;
                if schema.type_applies(concrete_type, condition) {
                    collect(
                        schema,
                        concrete_type,
                        &fragment.selection_set,
                        fragments,
                        grouped,
                        visited,
                    )?;
                }
            }
            q::Selection::InlineFragment(fragment) => {
                let applies = match &fragment.type_condition {
                    Some(q::TypeCondition::On(condition)) => {
                        schema.type_applies(concrete_type, condition)
                    }
                    None => true,
                };
                if applies {
                    collect(
                        schema,
                        concrete_type,
                        &fragment.selection_set,
                        fragments,
                        grouped,
                        visited,
                    )?;
                }
            }
        }
    }
    Ok(())
}

/// Rejects duplicate response keys selecting different fields, arguments,
/// or directives. Source locations are ignored.
fn check_merge_compatible(
    key: &str,
    existing: &FieldNode,
    new: &FieldNode,
) -> FieldResult<()> {
    if existing.name != new.name {
        return Err(FieldError::from(format!(
            "fields for response key \"{key}\" conflict: {} vs {}",
            existing.name, new.name,
        )));
    }
    if existing.arguments != new.arguments {
        return Err(FieldError::from(format!(
            "fields for response key \"{key}\" have conflicting arguments",
        )));
    }
    let directives = |node: &FieldNode| -> Vec<_> {
        node.directives
            .iter()
            .map(|d| (d.name.clone(), d.arguments.clone()))
            .collect()
    };
    if directives(existing) != directives(new) {
        return Err(FieldError::from(format!(
            "fields for response key \"{key}\" have conflicting directives",
        )));
    }
    Ok(())
}
