//! Resolve a document to response values in as few backend round-trips as
//! possible.

use std::sync::Arc;

use arcstr::ArcStr;
use fnv::FnvHashMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::{
    ast::{self, Document, FieldNode, FragmentDefinition, Operation, OperationKind},
    backend::{Backend, Resolved, Source},
    coerce::{self, Variables},
    error::{ExecutionError, FieldError, GraphQLError},
    middleware::{
        FieldResolverGetter, Middlewares, ResolveDeferredFn, SerializerGetter, TypeResolverFn,
        TypeResolverGetter, compose,
    },
    path::Path,
    schema::{
        meta::{EnumMeta, Field, MetaType, Resolver, SerializeFn, Type, resolver, serialize_fn},
        model::Schema,
    },
    value::Value,
};

mod assemble;
mod expand;
mod scheduler;

/// Everything needed to execute one request.
pub struct ExecutionArgs<B: Backend> {
    /// The schema to execute against.
    pub schema: Arc<Schema<B>>,
    /// The deferred backend.
    pub backend: Arc<B>,
    /// The parsed request document.
    pub document: Document,
    /// Selects the operation when the document contains several.
    pub operation_name: Option<String>,
    /// The value the root type's fields resolve against.
    pub root_value: Value,
    /// The caller-supplied context threaded to resolvers and the backend.
    pub context: Arc<B::Context>,
    /// Variable values for the operation.
    pub variables: Variables,
    /// Default field resolver, used when a field definition has none.
    pub field_resolver: Option<Resolver<B>>,
    /// Default type resolver for abstract types.
    pub type_resolver: Option<TypeResolverFn<B>>,
    /// Per-call middleware bundles; run outermost.
    pub middlewares: Middlewares<B>,
}

impl<B: Backend> ExecutionArgs<B> {
    /// Builds execution args with empty variables and a null root value.
    pub fn new(
        schema: Arc<Schema<B>>,
        backend: Arc<B>,
        document: Document,
        context: Arc<B::Context>,
    ) -> Self {
        Self {
            schema,
            backend,
            document,
            operation_name: None,
            root_value: Value::Null,
            context,
            variables: Variables::new(),
            field_resolver: None,
            type_resolver: None,
            middlewares: Middlewares::new(),
        }
    }

    /// Selects the operation to execute by name.
    #[must_use]
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Sets the root value.
    #[must_use]
    pub fn root_value(mut self, value: Value) -> Self {
        self.root_value = value;
        self
    }

    /// Sets the variable values.
    #[must_use]
    pub fn variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    /// Sets the default field resolver.
    #[must_use]
    pub fn field_resolver(mut self, r: Resolver<B>) -> Self {
        self.field_resolver = Some(r);
        self
    }

    /// Sets the default type resolver.
    #[must_use]
    pub fn type_resolver(mut self, r: TypeResolverFn<B>) -> Self {
        self.type_resolver = Some(r);
        self
    }

    /// Sets the per-call middleware bundles.
    #[must_use]
    pub fn middlewares(mut self, middlewares: Middlewares<B>) -> Self {
        self.middlewares = middlewares;
        self
    }
}

/// The result of executing one request.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionResponse {
    /// The response data; `null` when no top-level data accumulated.
    pub data: Value,
    /// Deduplicated execution errors, in order of first appearance.
    pub errors: Vec<ExecutionError>,
}

impl Serialize for ExecutionResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("data", &self.data)?;
        if !self.errors.is_empty() {
            map.serialize_entry("errors", &self.errors)?;
        }
        map.end()
    }
}

/// Per-invocation execution information supplied to resolvers and type
/// resolvers.
///
/// Constructed fresh for every invocation; implementations must not retain
/// it.
pub struct ResolveInfo<B: Backend> {
    /// The executing schema.
    pub schema: Arc<Schema<B>>,
    /// The request's root value.
    pub root_value: Arc<Value>,
    /// Fragment definitions of the document, by name.
    pub fragments: Arc<FnvHashMap<String, Arc<FragmentDefinition>>>,
    /// The executing operation.
    pub operation: Arc<Operation>,
    /// The effective variable values (defaults merged).
    pub variable_values: Arc<Variables>,
    /// The type the field is resolved on.
    pub parent_type: ArcStr,
    /// The response path of the field.
    pub path: Path,
    /// The field name (not the response key).
    pub field_name: String,
    /// Every field node merged under the response key.
    pub field_nodes: Vec<FieldNode>,
    /// The field's declared output type.
    pub return_type: Type,
}

/// Shared per-request state, with all middleware chains composed.
pub(crate) struct ExecCtx<B: Backend> {
    pub schema: Arc<Schema<B>>,
    pub backend: Arc<B>,
    pub context: Arc<B::Context>,
    pub variables: Arc<Variables>,
    pub fragments: Arc<FnvHashMap<String, Arc<FragmentDefinition>>>,
    pub operation: Arc<Operation>,
    pub root_type: ArcStr,
    pub root_value: Arc<Value>,
    pub resolver_getter: FieldResolverGetter<B>,
    pub resolver_wrappers: Vec<crate::middleware::Middleware<Resolver<B>>>,
    pub type_resolver_getter: TypeResolverGetter<B>,
    pub serializer_getter: SerializerGetter<B>,
    pub resolve_deferred: ResolveDeferredFn<B>,
}

impl<B: Backend> ExecCtx<B> {
    /// The resolver for a field definition, with the raw resolver
    /// middleware applied.
    pub(crate) fn resolver_for(&self, field: &Field<B>) -> Resolver<B> {
        compose(&self.resolver_wrappers, (self.resolver_getter)(field))
    }

    pub(crate) fn resolve_info(
        &self,
        parent_type: &ArcStr,
        nodes: &[FieldNode],
        path: &Path,
        return_type: &Type,
    ) -> ResolveInfo<B> {
        ResolveInfo {
            schema: Arc::clone(&self.schema),
            root_value: Arc::clone(&self.root_value),
            fragments: Arc::clone(&self.fragments),
            operation: Arc::clone(&self.operation),
            variable_values: Arc::clone(&self.variables),
            parent_type: parent_type.clone(),
            path: path.clone(),
            field_name: nodes[0].name.clone(),
            field_nodes: nodes.to_vec(),
            return_type: return_type.clone(),
        }
    }
}

/// The default field resolver: property access on the source.
///
/// Over a wrapped (still deferred) source it synthesizes a projection
/// expression; `__typename` resolves to the parent type name.
pub fn default_field_resolver<B: Backend>() -> Resolver<B> {
    resolver(|params| async move {
        if params.info.field_name == "__typename" {
            return Ok(Resolved::Value(Value::String(
                params.info.parent_type.to_string(),
            )));
        }
        Ok(match params.source {
            Source::Value(ref v) => Resolved::Value(
                v.as_object_value()
                    .and_then(|o| o.get_field_value(&params.info.field_name))
                    .cloned()
                    .unwrap_or(Value::Null),
            ),
            Source::Wrapped(w) => Resolved::Wrapped(w.get(&params.info.field_name)),
        })
    })
}

/// The default type resolver: reads the value's `__typename` property.
pub fn default_type_resolver<B: Backend>() -> TypeResolverFn<B> {
    Arc::new(|value, _info| {
        value
            .as_object_value()
            .and_then(|o| o.get_field_value("__typename"))
            .and_then(Value::as_string_value)
            .map(ArcStr::from)
            .ok_or_else(|| FieldError::from("Failed to resolve concrete type"))
    })
}

fn enum_serializer<B: Backend>(meta: &EnumMeta) -> SerializeFn<B> {
    let name = meta.name.clone();
    let values = meta.values.clone();
    serialize_fn::<B>(move |v| match &v {
        Value::String(s) if values.iter().any(|m| m == s) => Ok(v),
        other => Err(FieldError::from(format!(
            "Enum {name} cannot represent value: {other}",
        ))),
    })
}

/// The default serializer getter: a scalar's own serialize function, enum
/// membership checking, identity elsewhere.
fn default_serializer_getter<B: Backend>() -> SerializerGetter<B> {
    Arc::new(|meta: &MetaType<B>| match meta {
        MetaType::Scalar(s) => Arc::clone(&s.serialize),
        MetaType::Enum(e) => enum_serializer::<B>(e),
        _ => serialize_fn::<B>(Ok),
    })
}

/// An executor carrying default middleware bundles applied to every call.
///
/// Per-call bundles from [`ExecutionArgs`] are chained before these
/// defaults, so per-call middleware runs outermost.
pub struct Executor<B: Backend> {
    middlewares: Middlewares<B>,
}

impl<B: Backend> Default for Executor<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Executor<B> {
    /// An executor with no default middleware.
    pub fn new() -> Self {
        Self {
            middlewares: Middlewares::new(),
        }
    }

    /// An executor with the given default middleware bundles.
    pub fn with_middlewares(middlewares: Middlewares<B>) -> Self {
        Self { middlewares }
    }

    /// Executes one request.
    pub async fn execute(
        &self,
        args: ExecutionArgs<B>,
    ) -> Result<ExecutionResponse, GraphQLError> {
        execute_with_defaults(args, &self.middlewares).await
    }
}

/// Executes one request without executor-level default middleware.
pub async fn execute<B: Backend>(
    args: ExecutionArgs<B>,
) -> Result<ExecutionResponse, GraphQLError> {
    execute_with_defaults(args, &Middlewares::new()).await
}

async fn execute_with_defaults<B: Backend>(
    args: ExecutionArgs<B>,
    defaults: &Middlewares<B>,
) -> Result<ExecutionResponse, GraphQLError> {
    let operation = ast::get_operation(&args.document, args.operation_name.as_deref())?;
    let root_type = match args.schema.root_type_for(operation.kind) {
        Some(name) => name.clone(),
        None => {
            return Err(match operation.kind {
                OperationKind::Mutation => GraphQLError::MutationsNotSupported,
                _ => GraphQLError::SubscriptionsNotSupported,
            });
        }
    };
    let fragments = ast::fragment_map(&args.document);

    let mut variables = args.variables;
    merge_variable_defaults(&args.schema, &operation, &mut variables);

    let middlewares = args.middlewares.chain(defaults);

    let base_resolver_getter: FieldResolverGetter<B> = {
        let fallback = args
            .field_resolver
            .unwrap_or_else(default_field_resolver::<B>);
        Arc::new(move |field: &Field<B>| {
            field.resolver.clone().unwrap_or_else(|| fallback.clone())
        })
    };
    let base_type_resolver_getter: TypeResolverGetter<B> = {
        let fallback = args
            .type_resolver
            .unwrap_or_else(default_type_resolver::<B>);
        Arc::new(move |_abstract_type: &str| fallback.clone())
    };
    let base_resolve_deferred: ResolveDeferredFn<B> = {
        let backend = Arc::clone(&args.backend);
        let context = Arc::clone(&args.context);
        Arc::new(move |batch| {
            let backend = Arc::clone(&backend);
            let context = Arc::clone(&context);
            Box::pin(async move { backend.resolve_deferred(batch, &context).await })
        })
    };

    let ctx = Arc::new(ExecCtx {
        schema: Arc::clone(&args.schema),
        backend: Arc::clone(&args.backend),
        context: Arc::clone(&args.context),
        variables: Arc::new(variables),
        fragments: Arc::new(fragments),
        operation: Arc::new(operation),
        root_type,
        root_value: Arc::new(args.root_value),
        resolver_getter: compose(&middlewares.field_resolver_getter, base_resolver_getter),
        resolver_wrappers: middlewares.field_resolver.clone(),
        type_resolver_getter: compose(
            &middlewares.type_resolver_getter,
            base_type_resolver_getter,
        ),
        serializer_getter: compose(
            &middlewares.serializer_getter,
            default_serializer_getter::<B>(),
        ),
        resolve_deferred: compose(&middlewares.resolve_deferred, base_resolve_deferred),
    });

    let outcome = scheduler::Scheduler::new(Arc::clone(&ctx)).run().await;
    let (data, errors) = assemble::assemble(&ctx, outcome).await;

    Ok(ExecutionResponse { data, errors })
}

/// Merges default values from the operation's variable definitions under
/// explicitly-provided variables.
fn merge_variable_defaults<B: Backend>(
    schema: &Schema<B>,
    operation: &Operation,
    variables: &mut Variables,
) {
    for def in &operation.variable_definitions {
        if variables.contains_key(&def.name) {
            continue;
        }
        if let Some(default) = &def.default_value {
            let ty = Type::from_ast(&def.var_type);
            if let Ok(value) = coerce::coerce_literal_value(schema, default, &ty, &Variables::new())
            {
                variables.insert(def.name.clone(), value);
            }
        }
    }
}
