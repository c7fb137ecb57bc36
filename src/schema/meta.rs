//! Types used to describe a GraphQL schema.
//!
//! Unlike a schema-language document, this metadata is runtime data: field
//! definitions carry resolver functions and scalar definitions carry their
//! serialize/parse functions.

use std::{fmt, future::Future, sync::Arc};

use arcstr::ArcStr;
use futures::future::{self, BoxFuture};

use crate::{
    ast::{InputValueNode, TypeNode},
    backend::{Backend, Resolved, Source},
    coerce::Arguments,
    error::FieldResult,
    executor::ResolveInfo,
    value::Value,
};

/// Type literal: a named type under `NonNull`/`List` wrappers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Type {
    /// A nullable named type.
    Named(ArcStr),
    /// A non-null named type (`T!`).
    NonNullNamed(ArcStr),
    /// A nullable list (`[T]`).
    List(Box<Type>),
    /// A non-null list (`[T]!`).
    NonNullList(Box<Type>),
}

impl Type {
    /// Creates a nullable named type literal.
    pub fn named(name: impl Into<ArcStr>) -> Self {
        Self::Named(name.into())
    }

    /// Wraps this type as non-null.
    #[must_use]
    pub fn non_null(self) -> Self {
        match self {
            Self::Named(n) => Self::NonNullNamed(n),
            Self::List(inner) => Self::NonNullList(inner),
            t @ (Self::NonNullNamed(_) | Self::NonNullList(_)) => t,
        }
    }

    /// Wraps this type in a nullable list.
    #[must_use]
    pub fn list(self) -> Self {
        Self::List(Box::new(self))
    }

    /// The innermost type name, unpacking all wrappers.
    pub fn innermost_name(&self) -> &str {
        match self {
            Self::Named(n) | Self::NonNullNamed(n) => n,
            Self::List(inner) | Self::NonNullList(inner) => inner.innermost_name(),
        }
    }

    /// Indicates whether the outermost wrapper is non-null.
    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNullNamed(_) | Self::NonNullList(_))
    }

    /// This type with the outermost non-null wrapper removed.
    #[must_use]
    pub fn nullable(&self) -> Self {
        match self {
            Self::NonNullNamed(n) => Self::Named(n.clone()),
            Self::NonNullList(inner) => Self::List(inner.clone()),
            t => t.clone(),
        }
    }

    /// The element type, if this (after peeling non-null) is a list.
    pub fn list_inner(&self) -> Option<&Type> {
        match self {
            Self::List(inner) | Self::NonNullList(inner) => Some(inner),
            Self::Named(_) | Self::NonNullNamed(_) => None,
        }
    }

    /// The number of list layers around the innermost named type.
    pub fn list_depth(&self) -> usize {
        match self {
            Self::Named(_) | Self::NonNullNamed(_) => 0,
            Self::List(inner) | Self::NonNullList(inner) => 1 + inner.list_depth(),
        }
    }

    /// Converts a parsed type reference into a [`Type`] literal.
    pub fn from_ast(node: &TypeNode) -> Self {
        use graphql_parser::query::Type as T;

        match node {
            T::NamedType(n) => Self::Named(n.as_str().into()),
            T::ListType(inner) => Self::List(Box::new(Self::from_ast(inner))),
            T::NonNullType(inner) => Self::from_ast(inner).non_null(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(n) => write!(f, "{n}"),
            Self::NonNullNamed(n) => write!(f, "{n}!"),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNullList(inner) => write!(f, "[{inner}]!"),
        }
    }
}

/// The parameters a resolver is invoked with.
pub struct ResolverParams<B: Backend> {
    /// The parent's value: materialized, or wrapped while deferred.
    pub source: Source<B>,
    /// Coerced argument values.
    pub args: Arguments,
    /// The caller-supplied context value.
    pub context: Arc<B::Context>,
    /// Per-invocation execution information; must not be retained.
    pub info: ResolveInfo<B>,
}

/// A field resolver: returns a materialized value, a deferred expression,
/// or a wrapped proxy.
pub type Resolver<B> =
    Arc<dyn Fn(ResolverParams<B>) -> BoxFuture<'static, FieldResult<Resolved<B>>> + Send + Sync>;

/// Builds a [`Resolver`] from an async closure.
pub fn resolver<B, F, Fut>(f: F) -> Resolver<B>
where
    B: Backend,
    F: Fn(ResolverParams<B>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FieldResult<Resolved<B>>> + Send + 'static,
{
    Arc::new(move |params| Box::pin(f(params)))
}

/// Serializes a materialized leaf value for the response. May be
/// asynchronous.
pub type SerializeFn<B> = Arc<
    dyn Fn(Value, Arc<<B as Backend>::Context>) -> BoxFuture<'static, FieldResult<Value>>
        + Send
        + Sync,
>;

/// Builds a [`SerializeFn`] from a synchronous function.
pub fn serialize_fn<B: Backend>(
    f: impl Fn(Value) -> FieldResult<Value> + Send + Sync + 'static,
) -> SerializeFn<B> {
    Arc::new(move |value, _ctx| Box::pin(future::ready(f(value))))
}

/// Parses a literal argument value into a runtime [`Value`].
pub type ParseLiteralFn = fn(&InputValueNode) -> FieldResult<Value>;

/// Coerces a runtime value (e.g. a variable) against a scalar type.
pub type ParseValueFn = fn(&Value) -> FieldResult<Value>;

/// Scalar type metadata.
pub struct ScalarMeta<B: Backend> {
    /// Type name.
    pub name: ArcStr,
    /// Serializes resolved leaf values.
    pub serialize: SerializeFn<B>,
    /// Parses literal argument values.
    pub parse_literal: ParseLiteralFn,
    /// Coerces variable values.
    pub parse_value: ParseValueFn,
}

impl<B: Backend> ScalarMeta<B> {
    /// Builds a new [`ScalarMeta`] with identity serialization and lenient
    /// literal parsing.
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            serialize: serialize_fn::<B>(Ok),
            parse_literal: crate::coerce::literal_to_value,
            parse_value: |v| Ok(v.clone()),
        }
    }

    /// Replaces the serialize function.
    #[must_use]
    pub fn serializer(mut self, f: SerializeFn<B>) -> Self {
        self.serialize = f;
        self
    }

    /// Replaces the literal parse function.
    #[must_use]
    pub fn literal_parser(mut self, f: ParseLiteralFn) -> Self {
        self.parse_literal = f;
        self
    }

    /// Replaces the value coercion function.
    #[must_use]
    pub fn value_parser(mut self, f: ParseValueFn) -> Self {
        self.parse_value = f;
        self
    }
}

/// Enum type metadata.
#[derive(Clone, Debug)]
pub struct EnumMeta {
    /// Type name.
    pub name: ArcStr,
    /// The member value names.
    pub values: Vec<ArcStr>,
}

impl EnumMeta {
    /// Builds a new [`EnumMeta`] from its member names.
    pub fn new(name: impl Into<ArcStr>, values: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Indicates whether `value` names a member of this enum.
    pub fn has_value(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }
}

/// Metadata for an argument to a field.
#[derive(Clone, Debug)]
pub struct Argument {
    /// Argument name.
    pub name: ArcStr,
    /// Input type of the argument.
    pub arg_type: Type,
    /// Default value literal, substituted when the argument is absent.
    pub default_value: Option<InputValueNode>,
}

impl Argument {
    /// Builds a new [`Argument`].
    pub fn new(name: impl Into<ArcStr>, arg_type: Type) -> Self {
        Self {
            name: name.into(),
            arg_type,
            default_value: None,
        }
    }

    /// Sets the default value literal.
    #[must_use]
    pub fn default_value(mut self, value: InputValueNode) -> Self {
        self.default_value = Some(value);
        self
    }
}

/// Metadata for a field of an object or interface type.
pub struct Field<B: Backend> {
    /// Field name.
    pub name: ArcStr,
    /// Output type.
    pub field_type: Type,
    /// Argument definitions.
    pub arguments: Vec<Argument>,
    /// The resolver, when the field does not use the default property
    /// access.
    pub resolver: Option<Resolver<B>>,
}

impl<B: Backend> Field<B> {
    /// Builds a new [`Field`] without arguments or resolver.
    pub fn new(name: impl Into<ArcStr>, field_type: Type) -> Self {
        Self {
            name: name.into(),
            field_type,
            arguments: vec![],
            resolver: None,
        }
    }

    /// Adds an argument definition.
    #[must_use]
    pub fn argument(mut self, arg: Argument) -> Self {
        self.arguments.push(arg);
        self
    }

    /// Attaches a resolver.
    #[must_use]
    pub fn resolver(mut self, r: Resolver<B>) -> Self {
        self.resolver = Some(r);
        self
    }

    /// Attaches a resolver built from an async closure.
    #[must_use]
    pub fn resolve_with<F, Fut>(self, f: F) -> Self
    where
        F: Fn(ResolverParams<B>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FieldResult<Resolved<B>>> + Send + 'static,
    {
        self.resolver(resolver(f))
    }

    /// Looks up an argument definition by name.
    pub fn argument_by_name(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.name == name)
    }
}

impl<B: Backend> fmt::Debug for Field<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("arguments", &self.arguments)
            .field("resolver", &self.resolver.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Object type metadata.
pub struct ObjectMeta<B: Backend> {
    /// Type name.
    pub name: ArcStr,
    /// Field definitions in declaration order.
    pub fields: Vec<Field<B>>,
    /// Names of the interfaces this object implements.
    pub interface_names: Vec<ArcStr>,
}

impl<B: Backend> ObjectMeta<B> {
    /// Builds a new [`ObjectMeta`] from its fields.
    pub fn new(name: impl Into<ArcStr>, fields: Vec<Field<B>>) -> Self {
        Self {
            name: name.into(),
            fields,
            interface_names: vec![],
        }
    }

    /// Declares the interfaces this object implements.
    #[must_use]
    pub fn interfaces(mut self, names: impl IntoIterator<Item = &'static str>) -> Self {
        self.interface_names = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Interface type metadata.
pub struct InterfaceMeta<B: Backend> {
    /// Type name.
    pub name: ArcStr,
    /// Field definitions in declaration order.
    pub fields: Vec<Field<B>>,
    /// Names of the interfaces this interface inherits from.
    pub interface_names: Vec<ArcStr>,
}

impl<B: Backend> InterfaceMeta<B> {
    /// Builds a new [`InterfaceMeta`] from its fields.
    pub fn new(name: impl Into<ArcStr>, fields: Vec<Field<B>>) -> Self {
        Self {
            name: name.into(),
            fields,
            interface_names: vec![],
        }
    }

    /// Declares the interfaces this interface inherits from.
    #[must_use]
    pub fn interfaces(mut self, names: impl IntoIterator<Item = &'static str>) -> Self {
        self.interface_names = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Union type metadata.
#[derive(Clone, Debug)]
pub struct UnionMeta {
    /// Type name.
    pub name: ArcStr,
    /// Names of the member object types.
    pub of_type_names: Vec<ArcStr>,
}

impl UnionMeta {
    /// Builds a new [`UnionMeta`] from its member type names.
    pub fn new(name: impl Into<ArcStr>, members: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            name: name.into(),
            of_type_names: members.into_iter().map(Into::into).collect(),
        }
    }
}

/// Input object type metadata.
#[derive(Clone, Debug)]
pub struct InputObjectMeta {
    /// Type name.
    pub name: ArcStr,
    /// Input field definitions.
    pub input_fields: Vec<Argument>,
}

impl InputObjectMeta {
    /// Builds a new [`InputObjectMeta`] from its input fields.
    pub fn new(name: impl Into<ArcStr>, input_fields: Vec<Argument>) -> Self {
        Self {
            name: name.into(),
            input_fields,
        }
    }

    /// Looks up an input field by name.
    pub fn input_field_by_name(&self, name: &str) -> Option<&Argument> {
        self.input_fields.iter().find(|f| f.name == name)
    }
}

/// Generic type metadata.
pub enum MetaType<B: Backend> {
    /// A scalar leaf type.
    Scalar(ScalarMeta<B>),
    /// An enum leaf type.
    Enum(EnumMeta),
    /// An object type.
    Object(ObjectMeta<B>),
    /// An interface type.
    Interface(InterfaceMeta<B>),
    /// A union type.
    Union(UnionMeta),
    /// An input object type, usable in argument positions only.
    InputObject(InputObjectMeta),
}

impl<B: Backend> MetaType<B> {
    /// The name of the type.
    pub fn name(&self) -> &ArcStr {
        match self {
            Self::Scalar(ScalarMeta { name, .. })
            | Self::Enum(EnumMeta { name, .. })
            | Self::Object(ObjectMeta { name, .. })
            | Self::Interface(InterfaceMeta { name, .. })
            | Self::Union(UnionMeta { name, .. })
            | Self::InputObject(InputObjectMeta { name, .. }) => name,
        }
    }

    /// Indicates whether the type can occur in leaf positions.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Enum(_))
    }

    /// Indicates whether the type is abstract (interface or union).
    pub fn is_abstract(&self) -> bool {
        matches!(self, Self::Interface(_) | Self::Union(_))
    }

    /// Indicates whether the type is composite (object, interface, or
    /// union).
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Interface(_) | Self::Union(_))
    }

    /// Accesses a field's metadata by name.
    ///
    /// Only objects and interfaces have fields; always [`None`] otherwise.
    pub fn field_by_name(&self, name: &str) -> Option<&Field<B>> {
        match self {
            Self::Object(ObjectMeta { fields, .. })
            | Self::Interface(InterfaceMeta { fields, .. }) => {
                fields.iter().find(|f| f.name == name)
            }
            Self::Scalar(_) | Self::Enum(_) | Self::Union(_) | Self::InputObject(_) => None,
        }
    }
}

impl<B: Backend> fmt::Debug for MetaType<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Scalar(_) => "Scalar",
            Self::Enum(_) => "Enum",
            Self::Object(_) => "Object",
            Self::Interface(_) => "Interface",
            Self::Union(_) => "Union",
            Self::InputObject(_) => "InputObject",
        };
        write!(f, "{kind}({})", self.name())
    }
}
