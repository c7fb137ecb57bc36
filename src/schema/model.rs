//! The schema type registry.

use arcstr::ArcStr;
use fnv::FnvHashMap;

use crate::{
    ast::{InputValueNode, OperationKind},
    backend::Backend,
    error::{FieldError, FieldResult},
    schema::meta::{Field, MetaType, ScalarMeta, SerializeFn, Type, serialize_fn},
    value::Value,
};

/// Metadata registry for a schema.
///
/// Holds every named type and the root type names. Construction inserts the
/// builtin scalars (`Int`, `Float`, `String`, `Boolean`, `ID`) unless the
/// caller supplied its own, and gives every object and interface type a
/// `__typename: String!` field.
pub struct Schema<B: Backend> {
    types: FnvHashMap<ArcStr, MetaType<B>>,
    query_type_name: ArcStr,
    mutation_type_name: Option<ArcStr>,
    subscription_type_name: Option<ArcStr>,
}

impl<B: Backend> Schema<B> {
    /// Builds a schema with only a query root.
    ///
    /// # Panics
    ///
    /// Panics if `query` does not name an object type in `types`.
    pub fn new(types: Vec<MetaType<B>>, query: &str) -> Self {
        Self::with_roots(types, query, None, None)
    }

    /// Builds a schema with the given root type names.
    ///
    /// # Panics
    ///
    /// Panics if a given root name does not resolve to an object type.
    pub fn with_roots(
        types: Vec<MetaType<B>>,
        query: &str,
        mutation: Option<&str>,
        subscription: Option<&str>,
    ) -> Self {
        let mut registry: FnvHashMap<ArcStr, MetaType<B>> = FnvHashMap::default();
        for mut meta in types {
            if let MetaType::Object(o) = &mut meta {
                add_typename_field(&mut o.fields);
            } else if let MetaType::Interface(i) = &mut meta {
                add_typename_field(&mut i.fields);
            }
            registry.insert(meta.name().clone(), meta);
        }
        for builtin in builtin_scalars::<B>() {
            registry
                .entry(builtin.name.clone())
                .or_insert(MetaType::Scalar(builtin));
        }

        let schema = Self {
            types: registry,
            query_type_name: query.into(),
            mutation_type_name: mutation.map(Into::into),
            subscription_type_name: subscription.map(Into::into),
        };
        for root in [Some(query), mutation, subscription].into_iter().flatten() {
            match schema.type_by_name(root) {
                Some(MetaType::Object(_)) => {}
                Some(_) => panic!("root type {root} is not an object"),
                None => panic!("root type {root} does not exist in schema"),
            }
        }
        schema
    }

    /// Looks up a type by name.
    pub fn type_by_name(&self, name: &str) -> Option<&MetaType<B>> {
        self.types.get(name)
    }

    /// Looks up a field definition on the named object or interface type.
    pub fn field_of(&self, type_name: &str, field_name: &str) -> Option<&Field<B>> {
        self.type_by_name(type_name)?.field_by_name(field_name)
    }

    /// The root type name for the given operation kind, or [`None`] when
    /// the schema defines no such root.
    ///
    /// Subscriptions execute as plain queries here, but still select
    /// against the subscription root type.
    pub fn root_type_for(&self, kind: OperationKind) -> Option<&ArcStr> {
        match kind {
            OperationKind::Query => Some(&self.query_type_name),
            OperationKind::Mutation => self.mutation_type_name.as_ref(),
            OperationKind::Subscription => self.subscription_type_name.as_ref(),
        }
    }

    /// The concrete object types an abstract type can resolve to.
    pub fn possible_types(&self, abstract_name: &str) -> Vec<&ArcStr> {
        match self.type_by_name(abstract_name) {
            Some(MetaType::Union(u)) => u.of_type_names.iter().collect(),
            Some(MetaType::Interface(_)) => self
                .types
                .values()
                .filter_map(|t| match t {
                    MetaType::Object(o) if self.implements(&o.name, abstract_name) => {
                        Some(&o.name)
                    }
                    _ => None,
                })
                .collect(),
            _ => vec![],
        }
    }

    /// Indicates whether the named object type implements the named
    /// interface, transitively via interface inheritance.
    pub fn implements(&self, object_name: &str, interface_name: &str) -> bool {
        let direct: &[ArcStr] = match self.type_by_name(object_name) {
            Some(MetaType::Object(o)) => &o.interface_names,
            Some(MetaType::Interface(i)) => &i.interface_names,
            _ => return false,
        };
        let mut pending: Vec<&ArcStr> = direct.iter().collect();
        let mut visited: Vec<&ArcStr> = vec![];
        while let Some(name) = pending.pop() {
            if name == interface_name {
                return true;
            }
            if visited.contains(&name) {
                continue;
            }
            visited.push(name);
            if let Some(MetaType::Interface(i)) = self.type_by_name(name) {
                pending.extend(i.interface_names.iter());
            }
        }
        false
    }

    /// Indicates whether a fragment with the given type condition applies to
    /// the named concrete object type.
    ///
    /// It applies if the condition names the type itself, an interface the
    /// type implements (transitively), or a union the type is a member of.
    pub fn type_applies(&self, concrete_name: &str, condition_name: &str) -> bool {
        if concrete_name == condition_name {
            return true;
        }
        match self.type_by_name(condition_name) {
            Some(MetaType::Interface(_)) => self.implements(concrete_name, condition_name),
            Some(MetaType::Union(u)) => u.of_type_names.iter().any(|n| n == concrete_name),
            _ => false,
        }
    }

}

fn add_typename_field<B: Backend>(fields: &mut Vec<Field<B>>) {
    if !fields.iter().any(|f| f.name == "__typename") {
        fields.push(Field::new(
            "__typename",
            Type::named("String").non_null(),
        ));
    }
}

fn int_from_literal(v: &InputValueNode) -> FieldResult<Value> {
    use graphql_parser::query::Value as V;

    match v {
        V::Int(n) => n
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(Value::Int)
            .ok_or_else(|| FieldError::from("Int cannot represent value outside 32-bit range")),
        V::Null => Ok(Value::Null),
        other => Err(FieldError::from(format!(
            "Int cannot represent non-integer value: {other}",
        ))),
    }
}

fn float_from_literal(v: &InputValueNode) -> FieldResult<Value> {
    use graphql_parser::query::Value as V;

    match v {
        V::Int(n) => n
            .as_i64()
            .map(|n| Value::Float(n as f64))
            .ok_or_else(|| FieldError::from("Float cannot represent value outside range")),
        V::Float(f) => Ok(Value::Float(*f)),
        V::Null => Ok(Value::Null),
        other => Err(FieldError::from(format!(
            "Float cannot represent non-numeric value: {other}",
        ))),
    }
}

fn string_from_literal(v: &InputValueNode) -> FieldResult<Value> {
    use graphql_parser::query::Value as V;

    match v {
        V::String(s) => Ok(Value::String(s.clone())),
        V::Null => Ok(Value::Null),
        other => Err(FieldError::from(format!(
            "String cannot represent a non-string value: {other}",
        ))),
    }
}

fn boolean_from_literal(v: &InputValueNode) -> FieldResult<Value> {
    use graphql_parser::query::Value as V;

    match v {
        V::Boolean(b) => Ok(Value::Boolean(*b)),
        V::Null => Ok(Value::Null),
        other => Err(FieldError::from(format!(
            "Boolean cannot represent a non-boolean value: {other}",
        ))),
    }
}

fn id_from_literal(v: &InputValueNode) -> FieldResult<Value> {
    use graphql_parser::query::Value as V;

    match v {
        V::String(s) => Ok(Value::String(s.clone())),
        V::Int(n) => n
            .as_i64()
            .map(|n| Value::String(n.to_string()))
            .ok_or_else(|| FieldError::from("ID cannot represent value outside range")),
        V::Null => Ok(Value::Null),
        other => Err(FieldError::from(format!(
            "ID cannot represent value: {other}",
        ))),
    }
}

fn serialize_int<B: Backend>() -> SerializeFn<B> {
    serialize_fn::<B>(|v| match v {
        Value::Int(_) => Ok(v),
        other => Err(FieldError::from(format!(
            "Int cannot represent non-integer value: {other}",
        ))),
    })
}

fn serialize_float<B: Backend>() -> SerializeFn<B> {
    serialize_fn::<B>(|v| match v {
        Value::Int(i) => Ok(Value::Float(i as f64)),
        Value::Float(_) => Ok(v),
        other => Err(FieldError::from(format!(
            "Float cannot represent non-numeric value: {other}",
        ))),
    })
}

fn serialize_string<B: Backend>() -> SerializeFn<B> {
    serialize_fn::<B>(|v| match v {
        Value::String(_) => Ok(v),
        other => Err(FieldError::from(format!(
            "String cannot represent a non-string value: {other}",
        ))),
    })
}

fn serialize_boolean<B: Backend>() -> SerializeFn<B> {
    serialize_fn::<B>(|v| match v {
        Value::Boolean(_) => Ok(v),
        other => Err(FieldError::from(format!(
            "Boolean cannot represent a non-boolean value: {other}",
        ))),
    })
}

fn serialize_id<B: Backend>() -> SerializeFn<B> {
    serialize_fn::<B>(|v| match v {
        Value::String(_) => Ok(v),
        Value::Int(i) => Ok(Value::String(i.to_string())),
        other => Err(FieldError::from(format!(
            "ID cannot represent value: {other}",
        ))),
    })
}

fn builtin_scalars<B: Backend>() -> Vec<ScalarMeta<B>> {
    vec![
        ScalarMeta::new("Int")
            .serializer(serialize_int::<B>())
            .literal_parser(int_from_literal)
            .value_parser(|v| match v {
                Value::Int(_) => Ok(v.clone()),
                other => Err(FieldError::from(format!(
                    "Int cannot represent non-integer value: {other}",
                ))),
            }),
        ScalarMeta::new("Float")
            .serializer(serialize_float::<B>())
            .literal_parser(float_from_literal)
            .value_parser(|v| match v {
                Value::Int(i) => Ok(Value::Float(*i as f64)),
                Value::Float(_) => Ok(v.clone()),
                other => Err(FieldError::from(format!(
                    "Float cannot represent non-numeric value: {other}",
                ))),
            }),
        ScalarMeta::new("String")
            .serializer(serialize_string::<B>())
            .literal_parser(string_from_literal)
            .value_parser(|v| match v {
                Value::String(_) => Ok(v.clone()),
                other => Err(FieldError::from(format!(
                    "String cannot represent a non-string value: {other}",
                ))),
            }),
        ScalarMeta::new("Boolean")
            .serializer(serialize_boolean::<B>())
            .literal_parser(boolean_from_literal)
            .value_parser(|v| match v {
                Value::Boolean(_) => Ok(v.clone()),
                other => Err(FieldError::from(format!(
                    "Boolean cannot represent a non-boolean value: {other}",
                ))),
            }),
        ScalarMeta::new("ID")
            .serializer(serialize_id::<B>())
            .literal_parser(id_from_literal)
            .value_parser(|v| match v {
                Value::String(_) => Ok(v.clone()),
                Value::Int(i) => Ok(Value::String(i.to_string())),
                other => Err(FieldError::from(format!(
                    "ID cannot represent value: {other}",
                ))),
            }),
    ]
}
