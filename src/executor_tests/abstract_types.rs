//! Abstract-type dispatch: unions and interfaces, deferred and
//! materialized.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use crate::{
    backend::Resolved,
    executor_tests::{
        backend::{TestBackend, TestExpr},
        run,
    },
    graphql_value,
    schema::{
        meta::{Field, InterfaceMeta, MetaType, ObjectMeta, Type, UnionMeta},
        model::Schema,
    },
};

fn union_schema(resolver_value: TestExpr) -> Schema<TestBackend> {
    Schema::new(
        vec![
            MetaType::Object(ObjectMeta::new(
                "Query",
                vec![
                    Field::new("u", Type::named("FooHello").list()).resolve_with(
                        move |_| {
                            let expr = resolver_value.clone();
                            async move { Ok(Resolved::Deferred(expr)) }
                        },
                    ),
                ],
            )),
            MetaType::Object(ObjectMeta::new(
                "Foo",
                vec![Field::new("foo", Type::named("String"))],
            )),
            MetaType::Object(ObjectMeta::new(
                "Hello",
                vec![Field::new("hello", Type::named("String"))],
            )),
            MetaType::Union(UnionMeta::new("FooHello", ["Foo", "Hello"])),
        ],
        "Query",
    )
}

#[tokio::test]
async fn deferred_union_list_dispatches_per_element() {
    let schema = union_schema(TestExpr::lit(graphql_value!([
        { "__typename": "Foo", "foo": "bar" },
        { "__typename": "Hello", "hello": "world" },
    ])));
    let backend = Arc::new(TestBackend::default());

    let response = run(
        schema,
        Arc::clone(&backend),
        "{ u { ... on Foo { foo } ... on Hello { hello } __typename } }",
    )
    .await;

    assert_eq!(response.errors, vec![]);
    // Each element carries only its own concrete type's keys.
    assert_eq!(
        response.data,
        graphql_value!({ "u": [
            { "foo": "bar", "__typename": "Foo" },
            { "hello": "world", "__typename": "Hello" },
        ] }),
    );
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn materialized_union_uses_the_type_resolver() {
    let schema = Schema::new(
        vec![
            MetaType::Object(ObjectMeta::new(
                "Query",
                vec![
                    Field::new("u", Type::named("FooHello")).resolve_with(|_| async {
                        Ok(Resolved::Value(graphql_value!({
                            "__typename": "Hello",
                            "hello": "world",
                        })))
                    }),
                ],
            )),
            MetaType::Object(ObjectMeta::new(
                "Foo",
                vec![Field::new("foo", Type::named("String"))],
            )),
            MetaType::Object(ObjectMeta::new(
                "Hello",
                vec![Field::new("hello", Type::named("String"))],
            )),
            MetaType::Union(UnionMeta::new("FooHello", ["Foo", "Hello"])),
        ],
        "Query",
    );
    let backend = Arc::new(TestBackend::default());

    let response = run(
        schema,
        Arc::clone(&backend),
        "{ u { ... on Foo { foo } ... on Hello { hello } __typename } }",
    )
    .await;

    assert_eq!(response.errors, vec![]);
    assert_eq!(
        response.data,
        graphql_value!({ "u": { "hello": "world", "__typename": "Hello" } }),
    );
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn missing_typename_fails_concrete_resolution() {
    let schema = Schema::new(
        vec![
            MetaType::Object(ObjectMeta::new(
                "Query",
                vec![
                    Field::new("u", Type::named("FooHello")).resolve_with(|_| async {
                        Ok(Resolved::Value(graphql_value!({ "hello": "world" })))
                    }),
                ],
            )),
            MetaType::Object(ObjectMeta::new(
                "Foo",
                vec![Field::new("foo", Type::named("String"))],
            )),
            MetaType::Object(ObjectMeta::new(
                "Hello",
                vec![Field::new("hello", Type::named("String"))],
            )),
            MetaType::Union(UnionMeta::new("FooHello", ["Foo", "Hello"])),
        ],
        "Query",
    );
    let backend = Arc::new(TestBackend::default());

    let response = run(schema, backend, "{ u { ... on Hello { hello } } }").await;

    assert_eq!(response.data, graphql_value!({ "u": null }));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].message(),
        "Failed to resolve concrete type",
    );
}

#[tokio::test]
async fn backend_without_abstract_expansion_hard_errors() {
    let schema = union_schema(TestExpr::lit(graphql_value!([
        { "__typename": "Foo", "foo": "bar" },
    ])));
    let backend = Arc::new(TestBackend::without_abstract());

    let response = run(
        schema,
        Arc::clone(&backend),
        "{ u { ... on Foo { foo } } }",
    )
    .await;

    assert_eq!(response.data, graphql_value!({ "u": null }));
    assert_eq!(response.errors.len(), 1);
    assert!(
        response.errors[0]
            .message()
            .contains("cannot expand abstract type"),
    );
}

#[tokio::test]
async fn interface_fragments_apply_to_implementors() {
    let schema = Schema::new(
        vec![
            MetaType::Object(ObjectMeta::new(
                "Query",
                vec![
                    Field::new("node", Type::named("Node")).resolve_with(|_| async {
                        Ok(Resolved::Value(graphql_value!({
                            "__typename": "User",
                            "id": "u1",
                            "name": "Ada",
                        })))
                    }),
                ],
            )),
            MetaType::Interface(InterfaceMeta::new(
                "Node",
                vec![Field::new("id", Type::named("ID").non_null())],
            )),
            MetaType::Object(
                ObjectMeta::new(
                    "User",
                    vec![
                        Field::new("id", Type::named("ID").non_null()),
                        Field::new("name", Type::named("String")),
                    ],
                )
                .interfaces(["Node"]),
            ),
        ],
        "Query",
    );
    let backend = Arc::new(TestBackend::default());

    let response = run(
        schema,
        backend,
        "{ node { id ... on User { name } } }",
    )
    .await;

    assert_eq!(response.errors, vec![]);
    assert_eq!(
        response.data,
        graphql_value!({ "node": { "id": "u1", "name": "Ada" } }),
    );
}

#[tokio::test]
async fn deferred_single_union_object_dispatches() {
    let schema = Schema::new(
        vec![
            MetaType::Object(ObjectMeta::new(
                "Query",
                vec![
                    Field::new("u", Type::named("FooHello")).resolve_with(|_| async {
                        Ok(Resolved::Deferred(TestExpr::lit(graphql_value!({
                            "__typename": "Foo",
                            "foo": "bar",
                        }))))
                    }),
                ],
            )),
            MetaType::Object(ObjectMeta::new(
                "Foo",
                vec![Field::new("foo", Type::named("String"))],
            )),
            MetaType::Object(ObjectMeta::new(
                "Hello",
                vec![Field::new("hello", Type::named("String"))],
            )),
            MetaType::Union(UnionMeta::new("FooHello", ["Foo", "Hello"])),
        ],
        "Query",
    );
    let backend = Arc::new(TestBackend::default());

    let response = run(
        schema,
        Arc::clone(&backend),
        "{ u { ... on Foo { foo } ... on Hello { hello } __typename } }",
    )
    .await;

    assert_eq!(response.errors, vec![]);
    assert_eq!(
        response.data,
        graphql_value!({ "u": { "foo": "bar", "__typename": "Foo" } }),
    );
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn typename_sibling_is_carried_even_when_not_selected() {
    // Dispatch needs the materialized __typename to exclude sibling
    // candidates, but an unselected __typename must not leak into the
    // response.
    let schema = union_schema(TestExpr::lit(graphql_value!([
        { "__typename": "Foo", "foo": "bar" },
    ])));
    let backend = Arc::new(TestBackend::default());

    let response = run(
        schema,
        Arc::clone(&backend),
        "{ u { ... on Foo { foo } } }",
    )
    .await;

    assert_eq!(response.errors, vec![]);
    assert_eq!(response.data, graphql_value!({ "u": [{ "foo": "bar" }] }));
    assert_eq!(backend.calls(), 1);
}
