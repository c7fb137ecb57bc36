//! Multi-stage GraphQL executor.
//!
//! Resolvers in this library may return ordinary values, futures of
//! ordinary values, *deferred expressions* (opaque descriptions of
//! computation owned by a remote backend), or *wrapped* proxies over a
//! parent's deferred value. The executor translates a document into the
//! minimum number of batched backend round-trips: every deferred sub-tree
//! that can be computed without further resolver input joins one combined
//! query per scheduling stage, and resolvers that inspected a
//! materialized value re-enter the pipeline after their batch returns.
//!
//! Standard GraphQL execution semantics are preserved throughout: field
//! ordering, null propagation, abstract-type resolution, error bubbling,
//! and leaf serialization.
//!
//! The backend is pluggable through the [`Backend`] trait; the executor is
//! generic over its deferred-expression type.

pub mod ast;
pub mod backend;
pub mod coerce;
pub mod error;
pub mod executor;
pub mod flatten;
pub mod middleware;
pub mod path;
pub mod schema;
pub mod value;

#[cfg(test)]
mod executor_tests;

pub use crate::{
    ast::{Document, OperationKind, parse_document},
    backend::{AbstractCandidate, Backend, ExpandedChild, Resolved, SetExpr, Source, Wrapped},
    coerce::{Arguments, Variables},
    error::{
        BackendError, ExecutionError, FieldError, FieldResult, GraphQLError, SourceLocation,
    },
    executor::{
        ExecutionArgs, ExecutionResponse, Executor, ResolveInfo, default_field_resolver,
        default_type_resolver, execute,
    },
    middleware::{
        FieldResolverGetter, Middleware, Middlewares, ResolveDeferredFn, SerializerGetter,
        TypeResolverFn, TypeResolverGetter, compose,
    },
    path::{DeferredPath, Path, PathSegment},
    schema::{
        meta::{
            Argument, EnumMeta, Field, InputObjectMeta, InterfaceMeta, MetaType, ObjectMeta,
            Resolver, ResolverParams, ScalarMeta, SerializeFn, Type, UnionMeta, resolver,
            serialize_fn,
        },
        model::Schema,
    },
    value::{Object, Value},
};
