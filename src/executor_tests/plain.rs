//! Execution semantics with purely synchronous resolvers: no deferred
//! values, zero batch calls.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use crate::{
    ast::parse_document,
    backend::Resolved,
    coerce::Variables,
    error::GraphQLError,
    executor::{ExecutionArgs, execute},
    executor_tests::{backend::TestBackend, run, run_args},
    graphql_value,
    path::PathSegment,
    schema::{
        meta::{Argument, EnumMeta, Field, MetaType, ObjectMeta, Type},
        model::Schema,
    },
    value::Value,
};

fn query_schema(fields: Vec<Field<TestBackend>>) -> Schema<TestBackend> {
    Schema::new(vec![MetaType::Object(ObjectMeta::new("Query", fields))], "Query")
}

#[tokio::test]
async fn plain_literal() {
    let schema = query_schema(vec![
        Field::new("foo", Type::named("Int"))
            .resolve_with(|_| async { Ok(Resolved::value(9001)) }),
    ]);
    let backend = Arc::new(TestBackend::default());

    let response = run(schema, Arc::clone(&backend), "{ foo }").await;

    assert_eq!(response.errors, vec![]);
    assert_eq!(response.data, graphql_value!({ "foo": 9001 }));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn fields_aliases_and_fragments() {
    let schema = Schema::new(
        vec![
            MetaType::Object(ObjectMeta::new(
                "Query",
                vec![
                    Field::new("a", Type::named("String")),
                    Field::new("b", Type::named("String")),
                    Field::new("c", Type::named("String")),
                    Field::new("pic", Type::named("String"))
                        .argument(Argument::new("size", Type::named("Int")))
                        .resolve_with(|params| async move {
                            let size = match params.args.get("size") {
                                Some(Value::Int(n)) => *n,
                                _ => 50,
                            };
                            Ok(Resolved::value(format!("Pic of size: {size}")))
                        }),
                    Field::new("deep", Type::named("Deep"))
                        .resolve_with(|_| async {
                            Ok(Resolved::value(graphql_value!({ "c": [
                                "Contrived", null, "Confusing",
                            ] })))
                        }),
                ],
            )),
            MetaType::Object(ObjectMeta::new(
                "Deep",
                vec![Field::new("c", Type::named("String").list())],
            )),
        ],
        "Query",
    );
    let backend = Arc::new(TestBackend::default());

    let doc = r#"
      query Example($size: Int) {
        a
        x: c
        ...frag
        pic(size: $size)
        deep { c }
      }

      fragment frag on Query { b }
    "#;
    let response = run_args(schema, Arc::clone(&backend), doc, |args| {
        args.root_value(graphql_value!({
            "a": "Apple", "b": "Banana", "c": "Cookie",
        }))
        .variables(Variables::from([("size".to_string(), graphql_value!(100))]))
    })
    .await;

    assert_eq!(response.errors, vec![]);
    assert_eq!(
        response.data,
        graphql_value!({
            "a": "Apple",
            "x": "Cookie",
            "b": "Banana",
            "pic": "Pic of size: 100",
            "deep": { "c": ["Contrived", null, "Confusing"] },
        }),
    );
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn variable_defaults_are_merged() {
    let schema = query_schema(vec![
        Field::new("pic", Type::named("String"))
            .argument(Argument::new("size", Type::named("Int")))
            .resolve_with(|params| async move {
                Ok(Resolved::value(format!(
                    "size={}",
                    params.args.get("size").cloned().unwrap_or(Value::Null),
                )))
            }),
    ]);
    let backend = Arc::new(TestBackend::default());

    let response = run(
        schema,
        backend,
        "query Q($size: Int = 25) { pic(size: $size) }",
    )
    .await;

    assert_eq!(response.errors, vec![]);
    assert_eq!(response.data, graphql_value!({ "pic": "size=25" }));
}

#[tokio::test]
async fn typename_resolves_to_the_parent_type() {
    let schema = query_schema(vec![Field::new("a", Type::named("Int"))]);
    let backend = Arc::new(TestBackend::default());

    let response = run_args(schema, backend, "{ __typename a }", |args| {
        args.root_value(graphql_value!({ "a": 1 }))
    })
    .await;

    assert_eq!(
        response.data,
        graphql_value!({ "__typename": "Query", "a": 1 }),
    );
}

#[tokio::test]
async fn resolver_error_nulls_the_field() {
    let schema = query_schema(vec![
        Field::new("bad", Type::named("Int"))
            .resolve_with(|_| async { Err("boom".into()) }),
        Field::new("good", Type::named("Int"))
            .resolve_with(|_| async { Ok(Resolved::value(1)) }),
    ]);
    let backend = Arc::new(TestBackend::default());

    let response = run(schema, backend, "{ bad good }").await;

    assert_eq!(response.data, graphql_value!({ "bad": null, "good": 1 }));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].message(), "boom");
    assert_eq!(response.errors[0].path(), &[PathSegment::from("bad")]);
}

#[tokio::test]
async fn null_in_non_null_bubbles_to_nullable_ancestor() {
    let schema = Schema::new(
        vec![
            MetaType::Object(ObjectMeta::new(
                "Query",
                vec![
                    Field::new("inner", Type::named("Inner")),
                    Field::new("other", Type::named("Int")),
                ],
            )),
            MetaType::Object(ObjectMeta::new(
                "Inner",
                vec![Field::new("required", Type::named("Int").non_null())],
            )),
        ],
        "Query",
    );
    let backend = Arc::new(TestBackend::default());

    let response = run_args(schema, backend, "{ inner { required } other }", |args| {
        args.root_value(graphql_value!({
            "inner": { "required": null },
            "other": 3,
        }))
    })
    .await;

    assert_eq!(
        response.data,
        graphql_value!({ "inner": null, "other": 3 }),
    );
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].message(),
        "Cannot return null for non-nullable field",
    );
    assert_eq!(
        response.errors[0].path(),
        &["inner".into(), PathSegment::from("required")] as &[PathSegment],
    );
}

#[tokio::test]
async fn non_null_list_element_nulls_the_list() {
    let schema = query_schema(vec![
        Field::new("items", Type::named("Int").non_null().list())
            .resolve_with(|_| async {
                Ok(Resolved::Value(graphql_value!([1, null, 3])))
            }),
    ]);
    let backend = Arc::new(TestBackend::default());

    let response = run(schema, backend, "{ items }").await;

    assert_eq!(response.data, graphql_value!({ "items": null }));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].path(),
        &["items".into(), PathSegment::Index(1)] as &[PathSegment],
    );
}

#[tokio::test]
async fn list_value_for_non_list_field_is_rejected() {
    let schema = Schema::new(
        vec![
            MetaType::Object(ObjectMeta::new(
                "Query",
                vec![Field::new("deep", Type::named("Deep2"))],
            )),
            MetaType::Object(ObjectMeta::new(
                "Deep2",
                vec![Field::new("a", Type::named("Int"))],
            )),
        ],
        "Query",
    );
    let backend = Arc::new(TestBackend::default());

    let response = run_args(schema, backend, "{ deep { a } }", |args| {
        args.root_value(graphql_value!({ "deep": [1, 2] }))
    })
    .await;

    assert_eq!(response.data, graphql_value!({ "deep": null }));
    assert_eq!(
        response.errors[0].message(),
        "Cannot return list value for non-list field",
    );
}

#[tokio::test]
async fn enums_serialize_by_membership() {
    let schema = Schema::new(
        vec![
            MetaType::Object(ObjectMeta::new(
                "Query",
                vec![
                    Field::new("ok", Type::named("Color")),
                    Field::new("bad", Type::named("Color")),
                ],
            )),
            MetaType::Enum(EnumMeta::new("Color", ["RED", "GREEN"])),
        ],
        "Query",
    );
    let backend = Arc::new(TestBackend::default());

    let response = run_args(schema, backend, "{ ok bad }", |args| {
        args.root_value(graphql_value!({ "ok": "RED", "bad": "BLUE" }))
    })
    .await;

    assert_eq!(response.data, graphql_value!({ "ok": "RED", "bad": null }));
    assert_eq!(response.errors.len(), 1);
    assert!(response.errors[0].message().contains("Color"));
}

#[tokio::test]
async fn unknown_operation_name_is_a_request_error() {
    let schema = query_schema(vec![Field::new("a", Type::named("Int"))]);
    let document = parse_document("query A { a }").unwrap();
    let args = ExecutionArgs::new(
        Arc::new(schema),
        Arc::new(TestBackend::default()),
        document,
        Arc::new(()),
    )
    .operation_name("B");

    assert!(matches!(
        execute(args).await,
        Err(GraphQLError::UnknownOperationName),
    ));
}

#[tokio::test]
async fn mutations_execute_against_the_mutation_root() {
    let schema = Schema::with_roots(
        vec![
            MetaType::Object(ObjectMeta::new(
                "Query",
                vec![Field::new("a", Type::named("Int"))],
            )),
            MetaType::Object(ObjectMeta::new(
                "Mutation",
                vec![
                    Field::new("bump", Type::named("Int"))
                        .resolve_with(|_| async { Ok(Resolved::value(1)) }),
                ],
            )),
        ],
        "Query",
        Some("Mutation"),
        None,
    );
    let backend = Arc::new(TestBackend::default());

    let response = run(schema, backend, "mutation { bump }").await;

    assert_eq!(response.errors, vec![]);
    assert_eq!(response.data, graphql_value!({ "bump": 1 }));
}

#[tokio::test]
async fn operations_without_a_matching_root_are_request_errors() {
    let document = parse_document("mutation { bump }").unwrap();
    let args = ExecutionArgs::new(
        Arc::new(query_schema(vec![Field::new("a", Type::named("Int"))])),
        Arc::new(TestBackend::default()),
        document,
        Arc::new(()),
    );
    assert!(matches!(
        execute(args).await,
        Err(GraphQLError::MutationsNotSupported),
    ));

    let document = parse_document("subscription { tick }").unwrap();
    let args = ExecutionArgs::new(
        Arc::new(query_schema(vec![Field::new("a", Type::named("Int"))])),
        Arc::new(TestBackend::default()),
        document,
        Arc::new(()),
    );
    assert!(matches!(
        execute(args).await,
        Err(GraphQLError::SubscriptionsNotSupported),
    ));
}

#[tokio::test]
async fn subscriptions_execute_as_plain_queries() {
    let schema = Schema::with_roots(
        vec![
            MetaType::Object(ObjectMeta::new(
                "Query",
                vec![Field::new("a", Type::named("Int"))],
            )),
            MetaType::Object(ObjectMeta::new(
                "Subscription",
                vec![
                    Field::new("tick", Type::named("Int"))
                        .resolve_with(|_| async { Ok(Resolved::value(42)) }),
                ],
            )),
        ],
        "Query",
        None,
        Some("Subscription"),
    );
    let backend = Arc::new(TestBackend::default());

    let response = run(schema, backend, "subscription { tick }").await;

    assert_eq!(response.errors, vec![]);
    assert_eq!(response.data, graphql_value!({ "tick": 42 }));
}

#[tokio::test]
async fn response_serializes_to_the_graphql_shape() {
    let schema = query_schema(vec![
        Field::new("foo", Type::named("Int"))
            .resolve_with(|_| async { Ok(Resolved::value(1)) }),
    ]);
    let backend = Arc::new(TestBackend::default());

    let response = run(schema, backend, "{ foo }").await;

    assert_eq!(
        serde_json::to_string(&response).unwrap(),
        r#"{"data":{"foo":1}}"#,
    );
}
