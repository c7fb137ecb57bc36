//! The pluggable contract for a deferred-expression system.
//!
//! A deferred backend owns an opaque expression type ([`Backend::Expr`])
//! describing computation to be evaluated remotely. The executor collects
//! such expressions into batches, submits one combined query per scheduling
//! stage, and asks the backend to expand object and abstract-typed parents
//! into per-field child expressions.

use std::{fmt, sync::Arc};

use arcstr::ArcStr;
use async_trait::async_trait;

use crate::{
    ast::FieldNode,
    error::{BackendError, FieldError, FieldResult},
    path::Path,
    schema::model::Schema,
    value::Value,
};

/// Callback installing an updated expression into a batch slot or a parent
/// composite.
///
/// Setters re-install the *whole* updated expression, so the scheduler
/// observes copy-on-write semantics; the batch freezes once submitted.
pub type SetExpr<B> = Arc<dyn Fn(<B as Backend>::Expr) + Send + Sync>;

/// A child descriptor produced by [`Backend::expand_children`].
///
/// The scheduler derives the child's output path and deferred-path prefix
/// from the parent field's list shape; the descriptor carries the pieces
/// only the backend can supply.
pub struct ExpandedChild<B: Backend> {
    /// The object type the child field is selected on.
    pub concrete_type: ArcStr,
    /// The child's field node.
    pub node: FieldNode,
    /// The child's source expression, denoting the parent object (the list
    /// element, for list parents).
    pub source: B::Expr,
    /// Installs the child's contribution into the parent composite.
    pub set_data: SetExpr<B>,
}

/// A dispatch candidate produced by [`Backend::expand_abstract`], one per
/// possible concrete type.
pub struct AbstractCandidate<B: Backend> {
    /// The candidate concrete object type.
    pub concrete_type: ArcStr,
    /// The source expression for fields selected on this candidate.
    pub source: B::Expr,
    /// Installs this candidate's composite into the parent slot.
    pub set_deferred: SetExpr<B>,
    /// When set, the parent's list shape has already been handled by the
    /// candidate expression and children must not map over it again.
    pub suppress_array_handling: bool,
}

/// A deferred backend: the capability bundle the executor is generic over.
///
/// `resolve_deferred` is the only async capability; expansion happens
/// synchronously while the scheduler drains its queues.
#[async_trait]
pub trait Backend: Send + Sync + Sized + 'static {
    /// The backend's opaque deferred-expression type.
    type Expr: Clone + fmt::Debug + Send + Sync + 'static;
    /// The caller-supplied context value threaded to resolvers and backend
    /// calls.
    type Context: Send + Sync + 'static;

    /// Builds a constant expression holding an already-materialized value.
    fn lift(&self, value: &Value) -> Self::Expr;

    /// Builds a "project property" expression over `parent`.
    fn project(&self, parent: &Self::Expr, key: &str) -> Self::Expr;

    /// Submits one combined query and returns one result per batch entry,
    /// in order.
    ///
    /// Transport and protocol failures map to a single [`BackendError`]
    /// covering every output path in the batch.
    async fn resolve_deferred(
        &self,
        batch: Vec<Self::Expr>,
        context: &Self::Context,
    ) -> Result<Vec<Value>, BackendError>;

    /// Expands an object (or list-of-object) parent expression into one
    /// child descriptor per selected field.
    ///
    /// `list_depth` is the number of list layers between the parent
    /// expression and the object the fields are selected on; the backend
    /// maps its composite over each layer. Each child's `set_data` updates
    /// a private composite which is re-installed whole through
    /// `set_parent`.
    fn expand_children(
        &self,
        output_path: &Path,
        parent_type: &str,
        parent: &Self::Expr,
        list_depth: usize,
        selections: &[FieldNode],
        set_parent: SetExpr<Self>,
        context: &Self::Context,
    ) -> Result<Vec<ExpandedChild<Self>>, FieldError>;

    /// Expands an abstract-typed parent into one candidate per possible
    /// concrete type.
    ///
    /// The composite installed for the parent must, when materialized,
    /// carry a `__typename` sibling so results can be attributed to the
    /// winning candidate. Returning [`None`] means the backend refuses to
    /// dispatch on abstract types it cannot statically infer.
    fn expand_abstract(
        &self,
        schema: &Schema<Self>,
        output_path: &Path,
        parent: &Self::Expr,
        abstract_type: &str,
        is_list: bool,
        set_parent: SetExpr<Self>,
        context: &Self::Context,
    ) -> Option<Result<Vec<AbstractCandidate<Self>>, FieldError>> {
        let _ = (
            schema,
            output_path,
            parent,
            abstract_type,
            is_list,
            set_parent,
            context,
        );
        None
    }

    /// Decodes a per-field error annotation the backend may embed in an
    /// otherwise-normal materialized result.
    fn error_message(&self, value: &Value) -> Option<String> {
        let _ = value;
        None
    }
}

/// A facade over a deferred expression through which a resolver synthesizes
/// new expressions.
///
/// Property access ([`Wrapped::get`]) returns a new wrapped value carrying a
/// backend-built projection. [`Wrapped::materialize`] signals that the
/// resolver wishes to inspect the materialized data: before the batch has
/// run it resolves to the restage sentinel, and the resolver is re-invoked
/// with the materialized value once the batch returns.
pub struct Wrapped<B: Backend> {
    backend: Arc<B>,
    expr: B::Expr,
}

impl<B: Backend> Wrapped<B> {
    pub(crate) fn new(backend: Arc<B>, expr: B::Expr) -> Self {
        Self { backend, expr }
    }

    /// Extends the underlying expression by a property projection.
    #[must_use]
    pub fn get(&self, key: &str) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            expr: self.backend.project(&self.expr, key),
        }
    }

    /// The underlying deferred expression.
    pub fn expr(&self) -> &B::Expr {
        &self.expr
    }

    pub(crate) fn into_expr(self) -> B::Expr {
        self.expr
    }

    /// Requests the materialized value behind this expression.
    ///
    /// Propagating the error with `?` suspends the resolver until the
    /// current batch returns; the resolver is then re-invoked with the
    /// materialized value as its source.
    pub async fn materialize(&self) -> FieldResult<Value> {
        Err(FieldError::next_stage())
    }
}

impl<B: Backend> Clone for Wrapped<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            expr: self.expr.clone(),
        }
    }
}

impl<B: Backend> fmt::Debug for Wrapped<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Wrapped").field(&self.expr).finish()
    }
}

/// A value returned from a resolver.
#[derive(Clone, Debug)]
pub enum Resolved<B: Backend> {
    /// An ordinary, already-materialized value.
    Value(Value),
    /// A deferred expression to be computed by the backend.
    Deferred(B::Expr),
    /// A wrapped proxy; unwrapped to its expression by the scheduler.
    Wrapped(Wrapped<B>),
}

impl<B: Backend> Resolved<B> {
    /// Wraps an ordinary value.
    pub fn value(v: impl Into<Value>) -> Self {
        Self::Value(v.into())
    }

    /// Wraps a deferred expression.
    pub fn deferred(expr: B::Expr) -> Self {
        Self::Deferred(expr)
    }
}

impl<B: Backend> From<Value> for Resolved<B> {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

/// The source value a resolver is invoked with: its parent's materialized
/// value, or a wrapped proxy when the parent is still deferred.
#[derive(Clone, Debug)]
pub enum Source<B: Backend> {
    /// A materialized parent value.
    Value(Value),
    /// A wrapped proxy over the parent's deferred expression.
    Wrapped(Wrapped<B>),
}

impl<B: Backend> Source<B> {
    /// Accesses a property of the source.
    ///
    /// On a materialized object this reads the field (null when absent); on
    /// a wrapped source it synthesizes a projection expression.
    #[must_use]
    pub fn get(&self, key: &str) -> Self {
        match self {
            Self::Value(v) => Self::Value(
                v.as_object_value()
                    .and_then(|o| o.get_field_value(key))
                    .cloned()
                    .unwrap_or(Value::Null),
            ),
            Self::Wrapped(w) => Self::Wrapped(w.get(key)),
        }
    }

    /// The materialized value behind this source.
    ///
    /// Suspends the resolver until the next batch boundary when the source
    /// is still deferred (see [`Wrapped::materialize`]).
    pub async fn materialize(&self) -> FieldResult<Value> {
        match self {
            Self::Value(v) => Ok(v.clone()),
            Self::Wrapped(w) => w.materialize().await,
        }
    }

    /// Views the materialized value, if this source is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Wrapped(_) => None,
        }
    }

    /// Views the wrapped proxy, if this source is one.
    pub fn as_wrapped(&self) -> Option<&Wrapped<B>> {
        match self {
            Self::Value(_) => None,
            Self::Wrapped(w) => Some(w),
        }
    }
}
