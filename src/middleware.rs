//! Decorator composition for the executor's injection points.
//!
//! A middleware has the shape `next -> next'`: it receives the next handler
//! in the chain and returns a replacement. Bundles compose by right-fold,
//! so the rightmost middleware wraps the base handler and each middleware
//! to its left wraps the result. Per-call bundles are chained before
//! per-executor defaults, which makes per-call middleware run outermost.

use std::sync::Arc;

use arcstr::ArcStr;
use futures::future::BoxFuture;

use crate::{
    backend::Backend,
    error::{BackendError, FieldResult},
    executor::ResolveInfo,
    schema::meta::{Field, MetaType, Resolver, SerializeFn},
    value::Value,
};

/// A single middleware over a handler of type `T`.
pub type Middleware<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// Resolves an abstract-typed value to a concrete object type name.
pub type TypeResolverFn<B> =
    Arc<dyn Fn(&Value, &ResolveInfo<B>) -> FieldResult<ArcStr> + Send + Sync>;

/// Selects the resolver for a field definition.
pub type FieldResolverGetter<B> = Arc<dyn Fn(&Field<B>) -> Resolver<B> + Send + Sync>;

/// Selects the type resolver for an abstract type name.
pub type TypeResolverGetter<B> = Arc<dyn Fn(&str) -> TypeResolverFn<B> + Send + Sync>;

/// Selects the serializer for a leaf type.
pub type SerializerGetter<B> = Arc<dyn Fn(&MetaType<B>) -> SerializeFn<B> + Send + Sync>;

/// Submits one deferred batch and yields one result per entry.
pub type ResolveDeferredFn<B> = Arc<
    dyn Fn(Vec<<B as Backend>::Expr>) -> BoxFuture<'static, Result<Vec<Value>, BackendError>>
        + Send
        + Sync,
>;

/// Right-fold composition: the rightmost middleware wraps `base`, and each
/// middleware to its left wraps the result.
pub fn compose<T>(chain: &[Middleware<T>], base: T) -> T {
    chain.iter().rev().fold(base, |next, mw| mw(next))
}

/// Middleware bundles for every injection point.
///
/// Each bundle is a list composed by [`compose`]; an empty bundle leaves
/// the base handler untouched.
pub struct Middlewares<B: Backend> {
    /// Wraps the field-resolver getter.
    pub field_resolver_getter: Vec<Middleware<FieldResolverGetter<B>>>,
    /// Wraps each selected field resolver.
    pub field_resolver: Vec<Middleware<Resolver<B>>>,
    /// Wraps the type-resolver getter.
    pub type_resolver_getter: Vec<Middleware<TypeResolverGetter<B>>>,
    /// Wraps the serializer getter.
    pub serializer_getter: Vec<Middleware<SerializerGetter<B>>>,
    /// Wraps the batched deferred-resolution call.
    pub resolve_deferred: Vec<Middleware<ResolveDeferredFn<B>>>,
}

impl<B: Backend> Default for Middlewares<B> {
    fn default() -> Self {
        Self {
            field_resolver_getter: vec![],
            field_resolver: vec![],
            type_resolver_getter: vec![],
            serializer_getter: vec![],
            resolve_deferred: vec![],
        }
    }
}

impl<B: Backend> Clone for Middlewares<B> {
    fn clone(&self) -> Self {
        Self {
            field_resolver_getter: self.field_resolver_getter.clone(),
            field_resolver: self.field_resolver.clone(),
            type_resolver_getter: self.type_resolver_getter.clone(),
            serializer_getter: self.serializer_getter.clone(),
            resolve_deferred: self.resolve_deferred.clone(),
        }
    }
}

impl<B: Backend> Middlewares<B> {
    /// An empty bundle set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Chains `self` before `defaults`, so `self`'s middlewares run
    /// outermost after composition.
    #[must_use]
    pub fn chain(&self, defaults: &Self) -> Self {
        fn join<T: Clone>(first: &[T], second: &[T]) -> Vec<T> {
            first.iter().chain(second).cloned().collect()
        }

        Self {
            field_resolver_getter: join(&self.field_resolver_getter, &defaults.field_resolver_getter),
            field_resolver: join(&self.field_resolver, &defaults.field_resolver),
            type_resolver_getter: join(&self.type_resolver_getter, &defaults.type_resolver_getter),
            serializer_getter: join(&self.serializer_getter, &defaults.serializer_getter),
            resolve_deferred: join(&self.resolve_deferred, &defaults.resolve_deferred),
        }
    }
}
