//! The multi-stage scheduling loop.
//!
//! Fields move through four FIFO queues: `resolve` invokes resolvers,
//! `discriminate` routes resolved values (materialized values toward
//! validation, deferred expressions into the batch), `validate` shapes
//! materialized values, and the follow-up queues `restage`/`revalidate`
//! re-enter fields whose work depended on a batch result. One batched
//! backend call is issued per outer iteration; the loop ends when every
//! queue is empty.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use arcstr::ArcStr;
use futures::{
    future::BoxFuture,
    stream::{FuturesOrdered, StreamExt as _},
};
use tracing::{debug, trace};

use crate::{
    ast::{FieldNode, SelectionSet, node_locations, response_key},
    backend::{Backend, Resolved, SetExpr, Source, Wrapped},
    coerce::coerce_argument_values,
    error::{ExecutionError, FieldError, FieldResult, did_parent_error},
    executor::{ExecCtx, expand::expand_from_object},
    flatten::{FieldGroup, flatten_selections},
    middleware::TypeResolverFn,
    path::{DeferredPath, Path, PathSegment, extend_deferred},
    schema::meta::{MetaType, Resolver, ResolverParams, SerializeFn, Type},
    value::{Object, Value},
};

/// Prunes a branch of a deferred-result expansion. Receives the deferred
/// path consumed so far (with concrete indices) and the value reached.
pub(crate) type ExcludeFn = Arc<dyn Fn(&[PathSegment], &Value) -> bool + Send + Sync>;

/// A pending contribution to an ancestor's composite deferred expression.
#[derive(Clone)]
pub(crate) struct Deferral<B: Backend> {
    /// Installs this field's expression into the ancestor composite.
    pub set: SetExpr<B>,
    /// Deferred-path prefix of the field's parent position.
    pub path: DeferredPath,
}

struct FieldToResolve<B: Backend> {
    parent_path: Path,
    parent_type: ArcStr,
    nodes: Vec<FieldNode>,
    source: Resolved<B>,
    deferral: Option<Deferral<B>>,
    override_resolver: Option<Resolver<B>>,
    exclude: Option<ExcludeFn>,
    parent_null_at: Path,
}

struct FieldToDiscriminate<B: Backend> {
    nodes: Vec<FieldNode>,
    field_type: Type,
    value: Resolved<B>,
    parent_type: ArcStr,
    path: Path,
    deferral: Option<Deferral<B>>,
    exclude: Option<ExcludeFn>,
    null_at: Path,
}

struct FieldToValidate {
    field_type: Type,
    nodes: Vec<FieldNode>,
    value: Value,
    parent_type: ArcStr,
    path: Path,
    null_at: Path,
}

struct FieldToRestage {
    nodes: Vec<FieldNode>,
    parent_type: ArcStr,
    prev_path: Path,
    deferred_path: DeferredPath,
    exclude: Option<ExcludeFn>,
    parent_null_at: Path,
}

struct FieldToRevalidate {
    field_type: Type,
    nodes: Vec<FieldNode>,
    path: Path,
    deferred_path: DeferredPath,
    parent_type: ArcStr,
    exclude: Option<ExcludeFn>,
    null_at: Path,
}

/// A value destined for the response tree.
pub(crate) struct CompletedPiece<B: Backend> {
    pub path: Path,
    pub value: Value,
    pub serialize: Option<SerializeFn<B>>,
    pub nodes: Vec<FieldNode>,
}

/// Everything the scheduler produced, handed to result assembly.
pub(crate) struct Outcome<B: Backend> {
    pub completed: Vec<CompletedPiece<B>>,
    pub errors: Vec<ExecutionError>,
    /// Positions forced to `null` by non-null failures underneath them.
    pub barriers: Vec<Path>,
}

/// A prepared resolver invocation: the state routed on completion, paired
/// with the future to await.
type PreparedResolve<B> =
    (ResolveMeta<B>, BoxFuture<'static, FieldResult<Resolved<B>>>);

/// State carried across a resolver await, used to route its outcome.
struct ResolveMeta<B: Backend> {
    nodes: Vec<FieldNode>,
    key: ArcStr,
    parent_type: ArcStr,
    parent_path: Path,
    path: Path,
    field_type: Type,
    deferral: Option<Deferral<B>>,
    exclude: Option<ExcludeFn>,
    null_at: Path,
    parent_null_at: Path,
    source_expr: Option<B::Expr>,
}

pub(crate) struct Scheduler<B: Backend> {
    ctx: Arc<ExecCtx<B>>,
    resolve: VecDeque<FieldToResolve<B>>,
    discriminate: VecDeque<FieldToDiscriminate<B>>,
    validate: VecDeque<FieldToValidate>,
    restage: VecDeque<FieldToRestage>,
    revalidate: VecDeque<FieldToRevalidate>,
    batch: Arc<Mutex<Vec<(B::Expr, Path)>>>,
    completed: Vec<CompletedPiece<B>>,
    errors: Vec<ExecutionError>,
    barriers: Vec<Path>,
}

impl<B: Backend> Scheduler<B> {
    pub(crate) fn new(ctx: Arc<ExecCtx<B>>) -> Self {
        Self {
            ctx,
            resolve: VecDeque::new(),
            discriminate: VecDeque::new(),
            validate: VecDeque::new(),
            restage: VecDeque::new(),
            revalidate: VecDeque::new(),
            batch: Arc::new(Mutex::new(Vec::new())),
            completed: Vec::new(),
            errors: Vec::new(),
            barriers: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self) -> Outcome<B> {
        self.seed_root();

        loop {
            while !self.resolve.is_empty()
                || !self.discriminate.is_empty()
                || !self.validate.is_empty()
            {
                if !self.resolve.is_empty() {
                    self.drain_resolve().await;
                }
                while let Some(task) = self.discriminate.pop_front() {
                    self.discriminate_task(task);
                }
                while let Some(task) = self.validate.pop_front() {
                    self.validate_task(task);
                }
            }

            let batch: Vec<(B::Expr, Path)> = {
                let mut slots = self.batch.lock().unwrap();
                slots.drain(..).collect()
            };
            if batch.is_empty() {
                debug_assert!(self.restage.is_empty() && self.revalidate.is_empty());
                break;
            }

            debug!(slots = batch.len(), "submitting deferred batch");
            let exprs = batch.into_iter().map(|(expr, _)| expr).collect();
            match (self.ctx.resolve_deferred)(exprs).await {
                Ok(results) => {
                    self.drain_restage(&results);
                    self.drain_revalidate(&results);
                }
                Err(err) => {
                    debug!(error = %err, "deferred batch failed");
                    self.errors.push(ExecutionError::from_backend(err));
                    // Every field awaiting the batch is implicitly null.
                    let restaged: Vec<_> = self.restage.drain(..).collect();
                    for task in restaged {
                        let key = ArcStr::from(response_key(&task.nodes[0]));
                        let path = task
                            .prev_path
                            .child(PathSegment::Key(key))
                            .placeholder_free_prefix();
                        self.complete(path, Value::Null, None, task.nodes);
                    }
                    let revalidated: Vec<_> = self.revalidate.drain(..).collect();
                    for task in revalidated {
                        let path = task.path.placeholder_free_prefix();
                        self.complete(path, Value::Null, None, task.nodes);
                    }
                }
            }
        }

        Outcome {
            completed: self.completed,
            errors: self.errors,
            barriers: self.barriers,
        }
    }

    fn seed_root(&mut self) {
        let ctx = Arc::clone(&self.ctx);
        let root_type = ctx.root_type.clone();
        let groups = match flatten_selections(
            &ctx.schema,
            &root_type,
            &[&ctx.operation.selection_set],
            &ctx.fragments,
        ) {
            Ok(groups) => groups,
            Err(e) => {
                self.errors.push(ExecutionError::at_segments(e, vec![], vec![]));
                return;
            }
        };

        self.complete(Path::root(), skeleton(&groups), None, vec![]);
        for group in groups {
            self.resolve.push_back(FieldToResolve {
                parent_path: Path::root(),
                parent_type: root_type.clone(),
                nodes: group.nodes,
                source: Resolved::Value((*ctx.root_value).clone()),
                deferral: None,
                override_resolver: None,
                exclude: None,
                parent_null_at: Path::root(),
            });
        }
    }

    // Resolve drain: snapshot the queue, invoke every resolver, await them
    // concurrently in stable order, then route each outcome.
    async fn drain_resolve(&mut self) {
        let tasks: Vec<FieldToResolve<B>> = self.resolve.drain(..).collect();
        trace!(tasks = tasks.len(), "resolve drain");

        let mut metas: Vec<ResolveMeta<B>> = Vec::with_capacity(tasks.len());
        let mut futures: FuturesOrdered<BoxFuture<'static, FieldResult<Resolved<B>>>> =
            FuturesOrdered::new();
        for task in tasks {
            if let Some((meta, future)) = self.prepare_resolve(task) {
                metas.push(meta);
                futures.push_back(future);
            }
        }

        let results: Vec<FieldResult<Resolved<B>>> = futures.collect().await;
        for (meta, result) in metas.into_iter().zip(results) {
            self.finish_resolve(meta, result);
        }
    }

    fn prepare_resolve(&mut self, task: FieldToResolve<B>) -> Option<PreparedResolve<B>> {
        let ctx = Arc::clone(&self.ctx);
        let node = Arc::clone(&task.nodes[0]);
        let key = ArcStr::from(response_key(&node));
        let path = task.parent_path.child(PathSegment::Key(key.clone()));

        if did_parent_error(&path.to_vec(), &self.errors) {
            return None;
        }

        let Some(field_def) = ctx.schema.field_of(&task.parent_type, &node.name) else {
            self.errors.push(ExecutionError::at_path(
                FieldError::from(format!(
                    "Unknown field \"{}\" on type \"{}\"",
                    node.name, task.parent_type,
                )),
                node_locations(&task.nodes),
                &path,
            ));
            return None;
        };
        let field_type = field_def.field_type.clone();
        let null_at = if field_type.is_non_null() {
            task.parent_null_at.clone()
        } else {
            path.clone()
        };

        let args = match coerce_argument_values(
            &ctx.schema,
            field_def,
            &node.arguments,
            &ctx.variables,
        ) {
            Ok(args) => args,
            Err(e) => {
                self.hard_fail(e, &task.nodes, &path, &null_at);
                return None;
            }
        };

        let resolver = task
            .override_resolver
            .clone()
            .unwrap_or_else(|| ctx.resolver_for(field_def));

        let source = match task.source {
            Resolved::Value(v) => Source::Value(v),
            Resolved::Deferred(expr) => {
                Source::Wrapped(Wrapped::new(Arc::clone(&ctx.backend), expr))
            }
            Resolved::Wrapped(w) => Source::Wrapped(w),
        };
        let source_expr = source.as_wrapped().map(|w| w.expr().clone());

        let info = ctx.resolve_info(&task.parent_type, &task.nodes, &path, &field_type);
        let future = resolver(ResolverParams {
            source,
            args,
            context: Arc::clone(&ctx.context),
            info,
        });

        Some((
            ResolveMeta {
                nodes: task.nodes,
                key,
                parent_type: task.parent_type,
                parent_path: task.parent_path,
                path,
                field_type,
                deferral: task.deferral,
                exclude: task.exclude,
                null_at,
                parent_null_at: task.parent_null_at,
                source_expr,
            },
            future,
        ))
    }

    fn finish_resolve(&mut self, meta: ResolveMeta<B>, result: FieldResult<Resolved<B>>) {
        match result {
            Ok(resolved) => {
                // Wrapped values carry a synthesized expression; recover it.
                let value = match resolved {
                    Resolved::Wrapped(w) => Resolved::Deferred(w.into_expr()),
                    other => other,
                };
                self.discriminate.push_back(FieldToDiscriminate {
                    nodes: meta.nodes,
                    field_type: meta.field_type,
                    value,
                    parent_type: meta.parent_type,
                    path: meta.path,
                    deferral: meta.deferral,
                    exclude: meta.exclude,
                    null_at: meta.null_at,
                });
            }
            Err(e) if e.is_next_stage() => match (meta.deferral, meta.source_expr) {
                (Some(deferral), Some(expr)) => {
                    // The resolver needs its source materialized; file the
                    // source as-is and re-resolve after the batch.
                    (deferral.set)(expr);
                    let deferred_path =
                        extend_deferred(&deferral.path, &[PathSegment::Key(meta.key)]);
                    self.restage.push_back(FieldToRestage {
                        nodes: meta.nodes,
                        parent_type: meta.parent_type,
                        prev_path: meta.parent_path,
                        deferred_path,
                        exclude: meta.exclude,
                        parent_null_at: meta.parent_null_at,
                    });
                }
                _ => {
                    self.hard_fail(
                        FieldError::from("expected deferral value"),
                        &meta.nodes,
                        &meta.path,
                        &meta.null_at,
                    );
                }
            },
            Err(e) => self.hard_fail(e, &meta.nodes, &meta.path, &meta.null_at),
        }
    }

    fn discriminate_task(&mut self, task: FieldToDiscriminate<B>) {
        let ctx = Arc::clone(&self.ctx);

        // Materialized values in a fully-indexed position validate
        // directly; below an unmaterialized list they join the ancestor's
        // composite instead. A pending exclusion means the field belongs
        // to an abstract-dispatch candidate that may lose: its value must
        // go through the batch so expansion can prune it.
        if let Resolved::Value(v) = &task.value {
            if task.path.placeholder_count() == 0 && task.exclude.is_none() {
                self.validate.push_back(FieldToValidate {
                    field_type: task.field_type,
                    nodes: task.nodes,
                    value: v.clone(),
                    parent_type: task.parent_type,
                    path: task.path,
                    null_at: task.null_at,
                });
                return;
            }
        }

        let expr = match &task.value {
            Resolved::Value(v) => ctx.backend.lift(v),
            Resolved::Deferred(e) => e.clone(),
            Resolved::Wrapped(w) => w.expr().clone(),
        };
        let node = Arc::clone(&task.nodes[0]);
        let (set_self, deferred_path): (SetExpr<B>, DeferredPath) = match &task.deferral {
            Some(deferral) => {
                (deferral.set)(expr.clone());
                (
                    Arc::clone(&deferral.set),
                    extend_deferred(
                        &deferral.path,
                        &[PathSegment::Key(response_key(&node).into())],
                    ),
                )
            }
            None => {
                let slot = {
                    let mut slots = self.batch.lock().unwrap();
                    slots.push((expr.clone(), task.path.clone()));
                    slots.len() - 1
                };
                (self.slot_setter(slot), vec![PathSegment::Index(slot)])
            }
        };

        let named = task.field_type.innermost_name().to_owned();
        let Some(meta) = ctx.schema.type_by_name(&named) else {
            self.hard_fail(
                FieldError::from(format!("Unknown type \"{named}\"")),
                &task.nodes,
                &task.path,
                &task.null_at,
            );
            return;
        };

        if meta.is_leaf() {
            self.revalidate.push_back(FieldToRevalidate {
                field_type: task.field_type,
                nodes: task.nodes,
                path: task.path,
                deferred_path,
                parent_type: task.parent_type,
                exclude: task.exclude,
                null_at: task.null_at,
            });
            return;
        }

        match meta {
            MetaType::Interface(_) | MetaType::Union(_) => {
                let is_list = task.field_type.list_depth() > 0;
                match ctx.backend.expand_abstract(
                    &ctx.schema,
                    &task.path,
                    &expr,
                    &named,
                    is_list,
                    Arc::clone(&set_self),
                    &ctx.context,
                ) {
                    None => self.hard_fail(
                        FieldError::from(format!(
                            "backend cannot expand abstract type \"{named}\"",
                        )),
                        &task.nodes,
                        &task.path,
                        &task.null_at,
                    ),
                    Some(Err(e)) => {
                        self.hard_fail(e, &task.nodes, &task.path, &task.null_at);
                    }
                    Some(Ok(candidates)) => {
                        for candidate in candidates {
                            let expr_depth = if candidate.suppress_array_handling {
                                0
                            } else {
                                task.field_type.list_depth()
                            };
                            self.expand_concrete(
                                &task,
                                true,
                                candidate.concrete_type,
                                candidate.source,
                                candidate.set_deferred,
                                expr_depth,
                                &deferred_path,
                            );
                        }
                    }
                }
            }
            MetaType::Object(_) => {
                let concrete = named.into();
                self.expand_concrete(
                    &task,
                    false,
                    concrete,
                    expr,
                    set_self,
                    task.field_type.list_depth(),
                    &deferred_path,
                );
            }
            _ => self.hard_fail(
                FieldError::from(format!(
                    "type \"{named}\" cannot be selected against",
                )),
                &task.nodes,
                &task.path,
                &task.null_at,
            ),
        }
    }

    // Expands a deferred composite parent into one resolve task per
    // selected child field on `concrete_type`.
    #[expect(clippy::too_many_arguments, reason = "scheduler-internal fan-out")]
    fn expand_concrete(
        &mut self,
        task: &FieldToDiscriminate<B>,
        abstract_dispatch: bool,
        concrete_type: ArcStr,
        parent_expr: B::Expr,
        set_parent: SetExpr<B>,
        expr_list_depth: usize,
        deferred_path: &DeferredPath,
    ) {
        let ctx = Arc::clone(&self.ctx);
        let sets: Vec<&SelectionSet> =
            task.nodes.iter().map(|n| &n.selection_set).collect();
        let groups = match flatten_selections(&ctx.schema, &concrete_type, &sets, &ctx.fragments)
        {
            Ok(groups) => groups,
            Err(e) => {
                self.hard_fail(e, &task.nodes, &task.path, &task.null_at);
                return;
            }
        };

        // The deferred path mirrors the materialized shape, which keeps its
        // list layers even when the candidate expression already mapped
        // over them.
        let list_depth = task.field_type.list_depth();
        let placeholders: Vec<PathSegment> =
            std::iter::repeat_n(PathSegment::ListPlaceholder, list_depth).collect();
        let child_deferred_prefix = extend_deferred(deferred_path, &placeholders);
        let child_parent_path = placeholders
            .iter()
            .fold(task.path.clone(), |p, seg| p.child(seg.clone()));

        let exclude = if abstract_dispatch {
            Some(typename_exclude(
                task.exclude.clone(),
                concrete_type.clone(),
                child_deferred_prefix.len(),
            ))
        } else {
            task.exclude.clone()
        };

        // Objects at a concrete position get their key order fixed up
        // front; list elements take theirs from expansion task order.
        if !abstract_dispatch && list_depth == 0 && task.path.placeholder_count() == 0 {
            self.complete(task.path.clone(), skeleton(&groups), None, vec![]);
        }

        let primary: Vec<FieldNode> = groups.iter().map(|g| Arc::clone(g.node())).collect();
        let children = match ctx.backend.expand_children(
            &task.path,
            &concrete_type,
            &parent_expr,
            expr_list_depth,
            &primary,
            set_parent,
            &ctx.context,
        ) {
            Ok(children) => children,
            Err(e) => {
                self.hard_fail(e, &task.nodes, &task.path, &task.null_at);
                return;
            }
        };

        let parent_null_at = child_null_anchor(&task.field_type, &task.path, &task.null_at);
        for child in children {
            let Some(group) = groups
                .iter()
                .find(|g| g.response_key == response_key(&child.node))
            else {
                continue;
            };
            let override_resolver = (abstract_dispatch && child.node.name == "__typename")
                .then(|| constant_resolver(Value::String(concrete_type.to_string())));
            self.resolve.push_back(FieldToResolve {
                parent_path: child_parent_path.clone(),
                parent_type: child.concrete_type,
                nodes: group.nodes.clone(),
                source: Resolved::Deferred(child.source),
                deferral: Some(Deferral {
                    set: child.set_data,
                    path: child_deferred_prefix.clone(),
                }),
                override_resolver,
                exclude: exclude.clone(),
                parent_null_at: parent_null_at.clone(),
            });
        }
    }

    fn validate_task(&mut self, task: FieldToValidate) {
        let ctx = Arc::clone(&self.ctx);

        if did_parent_error(&task.path.to_vec(), &self.errors) {
            return;
        }

        let ty = if task.field_type.is_non_null() {
            if task.value.is_null() {
                self.errors.push(ExecutionError::at_path(
                    FieldError::from("Cannot return null for non-nullable field"),
                    node_locations(&task.nodes),
                    &task.path,
                ));
                self.barriers.push(task.null_at);
                return;
            }
            task.field_type.nullable()
        } else {
            task.field_type.clone()
        };

        if task.value.is_null() {
            self.complete(task.path, Value::Null, None, task.nodes);
            return;
        }

        if let Some(inner) = ty.list_inner() {
            match task.value {
                Value::List(items) => {
                    if items.is_empty() {
                        self.complete(task.path, Value::List(vec![]), None, task.nodes);
                        return;
                    }
                    for (i, item) in items.into_iter().enumerate() {
                        let path = task.path.child(PathSegment::Index(i));
                        let null_at = if inner.is_non_null() {
                            task.null_at.clone()
                        } else {
                            path.clone()
                        };
                        self.validate.push_back(FieldToValidate {
                            field_type: inner.clone(),
                            nodes: task.nodes.clone(),
                            value: item,
                            parent_type: task.parent_type.clone(),
                            path,
                            null_at,
                        });
                    }
                }
                _ => {
                    self.hard_fail(
                        FieldError::from("Cannot return non-list value for list field"),
                        &task.nodes,
                        &task.path,
                        &task.null_at,
                    );
                }
            }
            return;
        }

        let named = ty.innermost_name().to_owned();
        let Some(meta) = ctx.schema.type_by_name(&named) else {
            self.hard_fail(
                FieldError::from(format!("Unknown type \"{named}\"")),
                &task.nodes,
                &task.path,
                &task.null_at,
            );
            return;
        };

        if matches!(task.value, Value::List(_)) && !matches!(meta, MetaType::Scalar(_)) {
            self.hard_fail(
                FieldError::from("Cannot return list value for non-list field"),
                &task.nodes,
                &task.path,
                &task.null_at,
            );
            return;
        }

        if meta.is_leaf() {
            let serialize = (ctx.serializer_getter)(meta);
            self.completed.push(CompletedPiece {
                path: task.path,
                value: task.value,
                serialize: Some(serialize),
                nodes: task.nodes,
            });
            return;
        }

        // Composite: settle the concrete type, then recurse into children.
        let concrete: ArcStr = if meta.is_abstract() {
            let type_resolver: TypeResolverFn<B> = (ctx.type_resolver_getter)(&named);
            let info =
                ctx.resolve_info(&task.parent_type, &task.nodes, &task.path, &task.field_type);
            match type_resolver(&task.value, &info) {
                Ok(name) => name,
                Err(e) => {
                    self.hard_fail(e, &task.nodes, &task.path, &task.null_at);
                    return;
                }
            }
        } else {
            named.as_str().into()
        };
        let concrete_is_object = matches!(
            ctx.schema.type_by_name(&concrete),
            Some(MetaType::Object(_)),
        );
        if !concrete_is_object || !ctx.schema.type_applies(&concrete, &named) {
            self.hard_fail(
                FieldError::from("Failed to resolve concrete type"),
                &task.nodes,
                &task.path,
                &task.null_at,
            );
            return;
        }

        let sets: Vec<&SelectionSet> = task.nodes.iter().map(|n| &n.selection_set).collect();
        let groups = match flatten_selections(&ctx.schema, &concrete, &sets, &ctx.fragments) {
            Ok(groups) => groups,
            Err(e) => {
                self.hard_fail(e, &task.nodes, &task.path, &task.null_at);
                return;
            }
        };
        self.complete(task.path.clone(), skeleton(&groups), None, vec![]);
        for group in groups {
            self.resolve.push_back(FieldToResolve {
                parent_path: task.path.clone(),
                parent_type: concrete.clone(),
                nodes: group.nodes,
                source: Resolved::Value(task.value.clone()),
                deferral: None,
                override_resolver: None,
                exclude: None,
                parent_null_at: task.null_at.clone(),
            });
        }
    }

    fn drain_restage(&mut self, results: &[Value]) {
        let tasks: Vec<FieldToRestage> = self.restage.drain(..).collect();
        trace!(tasks = tasks.len(), "restage drain");
        for task in tasks {
            let key = ArcStr::from(response_key(&task.nodes[0]));
            let hint = task.prev_path.child(PathSegment::Key(key));
            let locations = node_locations(&task.nodes);
            let pairs = expand_from_object(
                &*self.ctx.backend,
                results,
                &task.deferred_path,
                &hint,
                task.exclude.as_ref(),
                &locations,
                &mut self.errors,
            );
            let anchor_len = task.parent_null_at.len();
            for (path, value) in pairs {
                let shallow = !keys_equivalent(path.prev(), Some(&task.prev_path));
                if shallow || value.is_null() {
                    self.complete(path, value, None, task.nodes.clone());
                    continue;
                }
                let segments = path.to_vec();
                let parent_null_at = Path::from_segments(
                    segments[..anchor_len.min(segments.len())].iter().cloned(),
                );
                self.resolve.push_back(FieldToResolve {
                    parent_path: path.prev().cloned().unwrap_or_default(),
                    parent_type: task.parent_type.clone(),
                    nodes: task.nodes.clone(),
                    source: Resolved::Value(value),
                    deferral: None,
                    override_resolver: None,
                    exclude: None,
                    parent_null_at,
                });
            }
        }
    }

    fn drain_revalidate(&mut self, results: &[Value]) {
        let tasks: Vec<FieldToRevalidate> = self.revalidate.drain(..).collect();
        trace!(tasks = tasks.len(), "revalidate drain");
        for task in tasks {
            let locations = node_locations(&task.nodes);
            let pairs = expand_from_object(
                &*self.ctx.backend,
                results,
                &task.deferred_path,
                &task.path,
                task.exclude.as_ref(),
                &locations,
                &mut self.errors,
            );
            let anchor_len = task.null_at.len();
            for (path, value) in pairs {
                let shallow =
                    !keys_equivalent(path.prev(), task.path.prev());
                if shallow {
                    self.complete(path, value, None, task.nodes.clone());
                    continue;
                }
                let segments = path.to_vec();
                let null_at = Path::from_segments(
                    segments[..anchor_len.min(segments.len())].iter().cloned(),
                );
                self.validate.push_back(FieldToValidate {
                    field_type: task.field_type.clone(),
                    nodes: task.nodes.clone(),
                    value,
                    parent_type: task.parent_type.clone(),
                    path,
                    null_at,
                });
            }
        }
    }

    fn slot_setter(&self, slot: usize) -> SetExpr<B> {
        let slots = Arc::clone(&self.batch);
        Arc::new(move |expr| {
            slots.lock().unwrap()[slot].0 = expr;
        })
    }

    fn complete(
        &mut self,
        path: Path,
        value: Value,
        serialize: Option<SerializeFn<B>>,
        nodes: Vec<FieldNode>,
    ) {
        self.completed.push(CompletedPiece {
            path,
            value,
            serialize,
            nodes,
        });
    }

    // Records an error at `path` and lets null propagate: the field's own
    // position when nullable, the nearest nullable ancestor otherwise.
    fn hard_fail(&mut self, error: FieldError, nodes: &[FieldNode], path: &Path, null_at: &Path) {
        self.errors.push(ExecutionError::at_path(
            error,
            node_locations(nodes),
            path,
        ));
        if null_at == path && path.placeholder_count() == 0 {
            self.complete(path.clone(), Value::Null, None, nodes.to_vec());
        } else {
            self.barriers.push(null_at.clone());
        }
    }
}

/// An object with every selected response key preset to null, so the
/// response preserves selection order regardless of completion order.
fn skeleton(groups: &[FieldGroup]) -> Value {
    Value::Object(
        groups
            .iter()
            .map(|g| (g.response_key.clone(), Value::Null))
            .collect::<Object>(),
    )
}

fn keys_equivalent(a: Option<&Path>, b: Option<&Path>) -> bool {
    match (a.and_then(Path::key), b.and_then(Path::key)) {
        (None, None) => true,
        (Some(x), Some(y)) => x.is_equivalent(y),
        _ => false,
    }
}

// The position where a null lands for children of a list-shaped field:
// the deepest nullable element layer, or the field's own anchor.
fn child_null_anchor(field_type: &Type, path: &Path, null_at: &Path) -> Path {
    let mut anchor = null_at.clone();
    let mut ty = field_type.nullable();
    let mut position = path.clone();
    while let Some(inner) = ty.list_inner().cloned() {
        position = position.child(PathSegment::ListPlaceholder);
        if !inner.is_non_null() {
            anchor = position.clone();
        }
        ty = inner.nullable();
    }
    anchor
}

fn typename_exclude(
    parent: Option<ExcludeFn>,
    concrete_type: ArcStr,
    element_depth: usize,
) -> ExcludeFn {
    Arc::new(move |consumed: &[PathSegment], value: &Value| {
        if let Some(parent) = &parent {
            if parent(consumed, value) {
                return true;
            }
        }
        consumed.len() == element_depth
            && value
                .as_object_value()
                .and_then(|o| o.get_field_value("__typename"))
                .and_then(Value::as_string_value)
                .is_some_and(|name| name != concrete_type.as_str())
    })
}

fn constant_resolver<B: Backend>(value: Value) -> Resolver<B> {
    Arc::new(move |_params| {
        let value = value.clone();
        Box::pin(futures::future::ready(Ok(Resolved::Value(value))))
    })
}
