//! Owned views over the `graphql-parser` document AST.
//!
//! The executor works on documents parsed with [`graphql_parser`]; this
//! module fixes the text type to owned [`String`]s, extracts the requested
//! operation and the fragment map, and provides the small node helpers the
//! scheduler needs (response keys, error locations).

use std::sync::Arc;

use fnv::FnvHashMap;
use graphql_parser::{Pos, query as q};

use crate::error::{GraphQLError, SourceLocation};

/// A parsed, owned GraphQL document.
pub type Document = q::Document<'static, String>;
/// A selection set node.
pub type SelectionSet = q::SelectionSet<'static, String>;
/// A single selection (field, fragment spread, or inline fragment).
pub type Selection = q::Selection<'static, String>;
/// A field selection node, shared between queue tasks.
pub type FieldNode = Arc<q::Field<'static, String>>;
/// A fragment definition node.
pub type FragmentDefinition = q::FragmentDefinition<'static, String>;
/// An argument or variable value AST node.
pub type InputValueNode = q::Value<'static, String>;
/// A type reference AST node.
pub type TypeNode = q::Type<'static, String>;
/// A variable definition AST node.
pub type VariableDefinition = q::VariableDefinition<'static, String>;

/// Parses a GraphQL document from source text.
pub fn parse_document(source: &str) -> Result<Document, GraphQLError> {
    Ok(q::parse_query::<String>(source)?.into_static())
}

/// The kind of an executable operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperationKind {
    /// A read operation against the query root type.
    Query,
    /// A write operation against the mutation root type.
    Mutation,
    /// A subscription operation; executed here as a plain query.
    Subscription,
}

/// The operation selected for execution, with its parts normalized across
/// the parser's operation shapes.
#[derive(Clone, Debug)]
pub struct Operation {
    /// Which root type this operation executes against.
    pub kind: OperationKind,
    /// The operation name, if present.
    pub name: Option<String>,
    /// The position of the operation in the source.
    pub position: Option<Pos>,
    /// Variable definitions, with types and default values.
    pub variable_definitions: Vec<VariableDefinition>,
    /// The root selection set.
    pub selection_set: SelectionSet,
}

fn normalize(def: &q::OperationDefinition<'static, String>) -> Operation {
    match def {
        q::OperationDefinition::SelectionSet(set) => Operation {
            kind: OperationKind::Query,
            name: None,
            position: None,
            variable_definitions: vec![],
            selection_set: set.clone(),
        },
        q::OperationDefinition::Query(op) => Operation {
            kind: OperationKind::Query,
            name: op.name.clone(),
            position: Some(op.position),
            variable_definitions: op.variable_definitions.clone(),
            selection_set: op.selection_set.clone(),
        },
        q::OperationDefinition::Mutation(op) => Operation {
            kind: OperationKind::Mutation,
            name: op.name.clone(),
            position: Some(op.position),
            variable_definitions: op.variable_definitions.clone(),
            selection_set: op.selection_set.clone(),
        },
        q::OperationDefinition::Subscription(op) => Operation {
            kind: OperationKind::Subscription,
            name: op.name.clone(),
            position: Some(op.position),
            variable_definitions: op.variable_definitions.clone(),
            selection_set: op.selection_set.clone(),
        },
    }
}

/// Selects the operation to execute from `document`.
///
/// Without `operation_name`, the document must contain exactly one
/// operation. With a name, the matching operation is selected.
pub fn get_operation(
    document: &Document,
    operation_name: Option<&str>,
) -> Result<Operation, GraphQLError> {
    let mut operation = None;
    for def in &document.definitions {
        if let q::Definition::Operation(op) = def {
            let normalized = normalize(op);
            if operation_name.is_none() && operation.is_some() {
                return Err(GraphQLError::MultipleOperationsProvided);
            }
            if operation_name.is_none() || normalized.name.as_deref() == operation_name {
                operation = Some(normalized);
            }
        }
    }
    match operation {
        Some(op) => Ok(op),
        None if operation_name.is_none() => Err(GraphQLError::NoOperationProvided),
        None => Err(GraphQLError::UnknownOperationName),
    }
}

/// Collects the document's fragment definitions, keyed by name.
pub fn fragment_map(document: &Document) -> FnvHashMap<String, Arc<FragmentDefinition>> {
    document
        .definitions
        .iter()
        .filter_map(|def| match def {
            q::Definition::Fragment(f) => Some((f.name.clone(), Arc::new(f.clone()))),
            q::Definition::Operation(_) => None,
        })
        .collect()
}

/// The key under which a field appears in the response: its alias when
/// given, its name otherwise.
pub fn response_key<'a>(field: &'a q::Field<'static, String>) -> &'a str {
    field.alias.as_deref().unwrap_or(&field.name)
}

/// Source locations of the given field nodes, for error reporting.
pub fn node_locations(nodes: &[FieldNode]) -> Vec<SourceLocation> {
    nodes.iter().map(|n| n.position.into()).collect()
}
