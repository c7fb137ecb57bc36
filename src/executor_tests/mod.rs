mod abstract_types;
pub(crate) mod backend;
mod plain;

use std::sync::Arc;

use crate::{
    ast::parse_document,
    backend::Backend,
    executor::{ExecutionArgs, ExecutionResponse, execute},
    schema::model::Schema,
};

/// Runs `query` against `schema` over `backend` with default everything.
pub(crate) async fn run<B: Backend<Context = ()>>(
    schema: Schema<B>,
    backend: Arc<B>,
    query: &str,
) -> ExecutionResponse {
    run_args(schema, backend, query, |args| args).await
}

/// Runs `query` with a hook to customize the execution args.
pub(crate) async fn run_args<B: Backend<Context = ()>>(
    schema: Schema<B>,
    backend: Arc<B>,
    query: &str,
    configure: impl FnOnce(ExecutionArgs<B>) -> ExecutionArgs<B>,
) -> ExecutionResponse {
    let document = parse_document(query).expect("test document parses");
    let args = ExecutionArgs::new(Arc::new(schema), backend, document, Arc::new(()));
    execute(configure(args)).await.expect("execution starts")
}
