//! An in-memory deferred backend driving the executor tests.
//!
//! Expressions form a small query language with constant, projection,
//! object, map, merge, and concatenation nodes; `resolve_deferred`
//! evaluates them locally and counts its invocations so tests can assert
//! batch cardinality.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use arcstr::ArcStr;
use async_trait::async_trait;

use crate::{
    ast::{FieldNode, response_key},
    backend::{AbstractCandidate, Backend, ExpandedChild, SetExpr},
    error::{BackendError, FieldError},
    path::Path,
    schema::model::Schema,
    value::{Object, Value},
};

/// A deferred expression of the test backend.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TestExpr {
    /// A constant value.
    Lit(Value),
    /// The element bound by the nearest enclosing [`TestExpr::Map`].
    Var,
    /// Property projection.
    Prop(Box<TestExpr>, String),
    /// Object construction.
    Obj(Vec<(String, TestExpr)>),
    /// Maps the body over every element of a list, binding
    /// [`TestExpr::Var`].
    Map(Box<TestExpr>, Box<TestExpr>),
    /// Merges object results left to right; later keys win.
    Merge(Vec<TestExpr>),
    /// String concatenation.
    Concat(Vec<TestExpr>),
}

impl TestExpr {
    pub(crate) fn lit(value: Value) -> Self {
        Self::Lit(value)
    }

    pub(crate) fn concat(parts: Vec<TestExpr>) -> Self {
        Self::Concat(parts)
    }

    fn eval(&self, var: Option<&Value>) -> Value {
        match self {
            Self::Lit(v) => v.clone(),
            Self::Var => var.cloned().unwrap_or(Value::Null),
            Self::Prop(parent, key) => match parent.eval(var) {
                Value::Object(o) => o.get_field_value(key).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            },
            Self::Obj(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, e)| (k.clone(), e.eval(var)))
                    .collect::<Object>(),
            ),
            Self::Map(list, body) => match list.eval(var) {
                Value::List(items) => Value::List(
                    items
                        .iter()
                        .map(|item| {
                            if item.is_null() {
                                Value::Null
                            } else {
                                body.eval(Some(item))
                            }
                        })
                        .collect(),
                ),
                Value::Null => Value::Null,
                single => body.eval(Some(&single)),
            },
            Self::Merge(parts) => {
                let mut merged = Object::default();
                for part in parts {
                    if let Value::Object(o) = part.eval(var) {
                        for (k, v) in o {
                            merged.add_field(k, v);
                        }
                    }
                }
                Value::Object(merged)
            }
            Self::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part.eval(var) {
                        Value::String(s) => out.push_str(&s),
                        Value::Null => {}
                        other => out.push_str(&other.to_string()),
                    }
                }
                Value::String(out)
            }
        }
    }
}

/// The test backend.
#[derive(Debug, Default)]
pub(crate) struct TestBackend {
    calls: AtomicUsize,
    fail_batches: AtomicBool,
    refuse_abstract: bool,
}

impl TestBackend {
    /// A backend that refuses abstract-type expansion.
    pub(crate) fn without_abstract() -> Self {
        Self {
            refuse_abstract: true,
            ..Self::default()
        }
    }

    /// Number of `resolve_deferred` calls issued so far.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes every subsequent batch call fail.
    pub(crate) fn fail_batches(&self) {
        self.fail_batches.store(true, Ordering::SeqCst);
    }
}

// A composite object builder whose every update re-installs the whole
// expression through the parent setter. The body always sits under at
// least one `Map`, which also collapses a null parent (and null list
// elements) instead of materializing an object of nulls.
fn composite(
    list_depth: usize,
    parent: TestExpr,
    set_parent: SetExpr<TestBackend>,
) -> impl Fn(String, TestExpr) + Send + Sync + Clone {
    let entries: Arc<Mutex<Vec<(String, TestExpr)>>> = Arc::new(Mutex::new(Vec::new()));
    let layers = list_depth.max(1);
    move |key: String, expr: TestExpr| {
        let rebuilt = {
            let mut entries = entries.lock().unwrap();
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = expr,
                None => entries.push((key, expr)),
            }
            let mut body = TestExpr::Obj(entries.clone());
            for depth in (0..layers).rev() {
                let over = if depth == 0 {
                    parent.clone()
                } else {
                    TestExpr::Var
                };
                body = TestExpr::Map(Box::new(over), Box::new(body));
            }
            body
        };
        set_parent(rebuilt);
    }
}

#[async_trait]
impl Backend for TestBackend {
    type Expr = TestExpr;
    type Context = ();

    fn lift(&self, value: &Value) -> TestExpr {
        TestExpr::Lit(value.clone())
    }

    fn project(&self, parent: &TestExpr, key: &str) -> TestExpr {
        TestExpr::Prop(Box::new(parent.clone()), key.into())
    }

    async fn resolve_deferred(
        &self,
        batch: Vec<TestExpr>,
        _context: &(),
    ) -> Result<Vec<Value>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(BackendError::new("batch refused"));
        }
        Ok(batch.iter().map(|expr| expr.eval(None)).collect())
    }

    fn expand_children(
        &self,
        _output_path: &Path,
        parent_type: &str,
        parent: &TestExpr,
        list_depth: usize,
        selections: &[FieldNode],
        set_parent: SetExpr<Self>,
        _context: &(),
    ) -> Result<Vec<ExpandedChild<Self>>, FieldError> {
        let install = composite(list_depth, parent.clone(), set_parent);
        let child_source = TestExpr::Var;
        let parent_type = ArcStr::from(parent_type);

        Ok(selections
            .iter()
            .map(|node| {
                let key = response_key(node).to_owned();
                let install = install.clone();
                ExpandedChild {
                    concrete_type: parent_type.clone(),
                    node: Arc::clone(node),
                    source: child_source.clone(),
                    set_data: Arc::new(move |expr| install(key.clone(), expr)),
                }
            })
            .collect())
    }

    fn expand_abstract(
        &self,
        schema: &Schema<Self>,
        _output_path: &Path,
        parent: &TestExpr,
        abstract_type: &str,
        is_list: bool,
        set_parent: SetExpr<Self>,
        _context: &(),
    ) -> Option<Result<Vec<AbstractCandidate<Self>>, FieldError>> {
        if self.refuse_abstract {
            return None;
        }

        let element = TestExpr::Var;
        let candidates: Arc<Mutex<Vec<(ArcStr, TestExpr)>>> = Arc::new(Mutex::new(Vec::new()));
        let parent = parent.clone();
        let rebuild = {
            let candidates = Arc::clone(&candidates);
            move || {
                let mut parts: Vec<TestExpr> = candidates
                    .lock()
                    .unwrap()
                    .iter()
                    .map(|(_, expr)| expr.clone())
                    .collect();
                // The materialized `__typename` stays authoritative over
                // any per-candidate constant.
                parts.push(TestExpr::Obj(vec![(
                    "__typename".into(),
                    TestExpr::Prop(Box::new(TestExpr::Var), "__typename".into()),
                )]));
                TestExpr::Map(Box::new(parent.clone()), Box::new(TestExpr::Merge(parts)))
            }
        };
        set_parent(rebuild());

        let entries = schema
            .possible_types(abstract_type)
            .into_iter()
            .map(|concrete| {
                let concrete = concrete.clone();
                let candidates = Arc::clone(&candidates);
                let rebuild = rebuild.clone();
                let set_parent = Arc::clone(&set_parent);
                let name = concrete.clone();
                AbstractCandidate {
                    concrete_type: concrete,
                    source: element.clone(),
                    set_deferred: Arc::new(move |expr| {
                        {
                            let mut candidates = candidates.lock().unwrap();
                            match candidates.iter_mut().find(|(n, _)| *n == name) {
                                Some(entry) => entry.1 = expr,
                                None => candidates.push((name.clone(), expr)),
                            }
                        }
                        set_parent(rebuild());
                    }),
                    suppress_array_handling: is_list,
                }
            })
            .collect();
        Some(Ok(entries))
    }

    fn error_message(&self, value: &Value) -> Option<String> {
        let object = value.as_object_value()?;
        if object.field_count() != 1 {
            return None;
        }
        object
            .get_field_value("__error")
            .and_then(Value::as_string_value)
            .map(str::to_owned)
    }
}
