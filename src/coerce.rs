//! Coercion of argument and variable values against input types.

use graphql_parser::query::Value as Literal;
use indexmap::IndexMap;

use crate::{
    ast::InputValueNode,
    backend::Backend,
    error::{FieldError, FieldResult},
    schema::{
        meta::{Argument, Field, MetaType, Type},
        model::Schema,
    },
    value::{Object, Value},
};

/// The map of variables supplied with an execution request.
pub type Variables = std::collections::HashMap<String, Value>;

/// Coerced argument values handed to a resolver.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Arguments {
    args: IndexMap<String, Value>,
}

impl Arguments {
    /// Returns the coerced value of the named argument, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.args.get(key)
    }

    /// Indicates whether no arguments were coerced.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Iterates name/value pairs in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.args.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            args: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Converts a literal AST value into a runtime [`Value`] without consulting
/// the schema.
///
/// Used as the lenient default literal parser for custom scalars. Variables
/// must be substituted before this point.
pub fn literal_to_value(node: &InputValueNode) -> FieldResult<Value> {
    match node {
        Literal::Null => Ok(Value::Null),
        Literal::Int(n) => n
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(Value::Int)
            .ok_or_else(|| FieldError::from("integer literal outside 32-bit range")),
        Literal::Float(f) => Ok(Value::Float(*f)),
        Literal::String(s) => Ok(Value::String(s.clone())),
        Literal::Boolean(b) => Ok(Value::Boolean(*b)),
        Literal::Enum(name) => Ok(Value::String(name.clone())),
        Literal::List(items) => items
            .iter()
            .map(literal_to_value)
            .collect::<FieldResult<Vec<_>>>()
            .map(Value::List),
        Literal::Object(fields) => Ok(Value::Object(
            fields
                .iter()
                .map(|(k, v)| literal_to_value(v).map(|v| (k.clone(), v)))
                .collect::<FieldResult<Object>>()?,
        )),
        Literal::Variable(name) => Err(FieldError::from(format!(
            "unsubstituted variable ${name} in literal position",
        ))),
    }
}

/// Coerces the arguments of `field_node` against the definitions of
/// `field_def`.
///
/// Absent arguments use their default; absent without default fails for
/// non-null argument types and is omitted otherwise.
pub fn coerce_argument_values<B: Backend>(
    schema: &Schema<B>,
    field_def: &Field<B>,
    argument_nodes: &[(String, InputValueNode)],
    variables: &Variables,
) -> FieldResult<Arguments> {
    let mut coerced = IndexMap::with_capacity(field_def.arguments.len());

    for def in &field_def.arguments {
        let node = argument_nodes
            .iter()
            .find(|(name, _)| *name == def.name)
            .map(|(_, v)| v);

        match node {
            Some(node) => {
                let value = coerce_literal(schema, node, &def.arg_type, variables)
                    .map_err(|e| prefix_argument(&def.name, e))?;
                coerced.insert(def.name.to_string(), value);
            }
            None => match &def.default_value {
                Some(default) => {
                    let value = coerce_literal(schema, default, &def.arg_type, variables)
                        .map_err(|e| prefix_argument(&def.name, e))?;
                    coerced.insert(def.name.to_string(), value);
                }
                None if def.arg_type.is_non_null() => {
                    return Err(FieldError::from(format!(
                        "missing value for required argument \"{}\"",
                        def.name,
                    )));
                }
                None => {}
            },
        }
    }

    Ok(Arguments { args: coerced })
}

fn prefix_argument(name: &str, error: FieldError) -> FieldError {
    FieldError::new(
        format!("invalid value for argument \"{name}\": {}", error.message()),
        error.extensions().clone(),
    )
}

/// Coerces a single literal against an input type (used for variable
/// default values).
pub(crate) fn coerce_literal_value<B: Backend>(
    schema: &Schema<B>,
    node: &InputValueNode,
    ty: &Type,
    variables: &Variables,
) -> FieldResult<Value> {
    coerce_literal(schema, node, ty, variables)
}

/// Coerces a literal AST value against an input type, substituting
/// variables.
fn coerce_literal<B: Backend>(
    schema: &Schema<B>,
    node: &InputValueNode,
    ty: &Type,
    variables: &Variables,
) -> FieldResult<Value> {
    if let Literal::Variable(name) = node {
        let value = variables.get(name).cloned().unwrap_or(Value::Null);
        return coerce_value(schema, value, ty).map_err(|e| {
            FieldError::new(
                format!("variable ${name}: {}", e.message()),
                e.extensions().clone(),
            )
        });
    }

    match ty {
        Type::NonNullNamed(_) | Type::NonNullList(_) => {
            if matches!(node, Literal::Null) {
                return Err(FieldError::from(format!(
                    "null literal for non-null type {ty}",
                )));
            }
            coerce_literal(schema, node, &ty.nullable(), variables)
        }
        _ if matches!(node, Literal::Null) => Ok(Value::Null),
        Type::List(inner) | Type::NonNullList(inner) => match node {
            Literal::List(items) => items
                .iter()
                .map(|item| coerce_literal(schema, item, inner, variables))
                .collect::<FieldResult<Vec<_>>>()
                .map(Value::List),
            // A non-list literal coerces to a singleton list.
            other => Ok(Value::List(vec![coerce_literal(
                schema, other, inner, variables,
            )?])),
        },
        Type::Named(name) | Type::NonNullNamed(name) => {
            match schema.type_by_name(name) {
                Some(MetaType::Scalar(scalar)) => (scalar.parse_literal)(node),
                Some(MetaType::Enum(e)) => match node {
                    Literal::Enum(v) | Literal::String(v) if e.has_value(v) => {
                        Ok(Value::String(v.clone()))
                    }
                    other => Err(FieldError::from(format!(
                        "invalid value {other} for enum {name}",
                    ))),
                },
                Some(MetaType::InputObject(input)) => match node {
                    Literal::Object(fields) => {
                        let mut obj = Object::with_capacity(input.input_fields.len());
                        for def in &input.input_fields {
                            match fields.get(def.name.as_str()) {
                                Some(value) => {
                                    obj.add_field(
                                        def.name.as_str(),
                                        coerce_literal(schema, value, &def.arg_type, variables)
                                            .map_err(|e| prefix_input_field(name, &def.name, e))?,
                                    );
                                }
                                None => {
                                    coerce_absent_input_field(
                                        schema, &mut obj, name, def, variables,
                                    )?;
                                }
                            }
                        }
                        Ok(Value::Object(obj))
                    }
                    other => Err(FieldError::from(format!(
                        "expected input object {name}, found {other}",
                    ))),
                },
                Some(_) => Err(FieldError::from(format!(
                    "type {name} cannot be used in input position",
                ))),
                None => Err(FieldError::from(format!("unknown input type {name}"))),
            }
        }
    }
}

fn coerce_absent_input_field<B: Backend>(
    schema: &Schema<B>,
    obj: &mut Object,
    type_name: &str,
    def: &Argument,
    variables: &Variables,
) -> FieldResult<()> {
    match &def.default_value {
        Some(default) => {
            obj.add_field(
                def.name.as_str(),
                coerce_literal(schema, default, &def.arg_type, variables)
                    .map_err(|e| prefix_input_field(type_name, &def.name, e))?,
            );
            Ok(())
        }
        None if def.arg_type.is_non_null() => Err(FieldError::from(format!(
            "missing value for required input field \"{}.{}\"",
            type_name, def.name,
        ))),
        None => Ok(()),
    }
}

fn prefix_input_field(type_name: &str, field: &str, error: FieldError) -> FieldError {
    FieldError::new(
        format!(
            "invalid value for input field \"{type_name}.{field}\": {}",
            error.message(),
        ),
        error.extensions().clone(),
    )
}

/// Coerces a runtime value (a variable's value) against an input type.
fn coerce_value<B: Backend>(schema: &Schema<B>, value: Value, ty: &Type) -> FieldResult<Value> {
    match ty {
        Type::NonNullNamed(_) | Type::NonNullList(_) => {
            if value.is_null() {
                return Err(FieldError::from(format!("null for non-null type {ty}")));
            }
            coerce_value(schema, value, &ty.nullable())
        }
        _ if value.is_null() => Ok(Value::Null),
        Type::List(inner) | Type::NonNullList(inner) => match value {
            Value::List(items) => items
                .into_iter()
                .map(|item| coerce_value(schema, item, inner))
                .collect::<FieldResult<Vec<_>>>()
                .map(Value::List),
            other => Ok(Value::List(vec![coerce_value(schema, other, inner)?])),
        },
        Type::Named(name) | Type::NonNullNamed(name) => match schema.type_by_name(name) {
            Some(MetaType::Scalar(scalar)) => (scalar.parse_value)(&value),
            Some(MetaType::Enum(e)) => match &value {
                Value::String(v) if e.has_value(v) => Ok(value),
                other => Err(FieldError::from(format!(
                    "invalid value {other} for enum {name}",
                ))),
            },
            Some(MetaType::InputObject(input)) => match value {
                Value::Object(fields) => {
                    let mut obj = Object::with_capacity(input.input_fields.len());
                    for def in &input.input_fields {
                        match fields.get_field_value(def.name.as_str()) {
                            Some(v) => {
                                obj.add_field(
                                    def.name.as_str(),
                                    coerce_value(schema, v.clone(), &def.arg_type)
                                        .map_err(|e| prefix_input_field(name, &def.name, e))?,
                                );
                            }
                            None => {
                                coerce_absent_input_field(
                                    schema,
                                    &mut obj,
                                    name,
                                    def,
                                    &Variables::new(),
                                )?;
                            }
                        }
                    }
                    Ok(Value::Object(obj))
                }
                other => Err(FieldError::from(format!(
                    "expected input object {name}, found {other}",
                ))),
            },
            Some(_) => Err(FieldError::from(format!(
                "type {name} cannot be used in input position",
            ))),
            None => Err(FieldError::from(format!("unknown input type {name}"))),
        },
    }
}
