//! Round trips against a running LocalStack, run with `cargo test -- --ignored`

mod common;

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use common::LocalStackContext;
use pretty_assertions::assert_eq;
use umbrella_storage::{
    CreateTableOutcome, Item, Key, ReadRequest, UpdateRequest, CONDITIONAL_CHECK_FAILED,
};

#[tokio::test]
#[ignore = "requires LocalStack on localhost:4566"]
async fn test_user_data_round_trip() {
    let context = LocalStackContext::new().await;
    let table = context.user_data_table.as_str();
    let item = Item::new()
        .number("server_id", 42)
        .number("user_id", 7)
        .string("registered", "2024-01-01 00:00:00")
        .string("minecraft_user_id", "abc");
    let key = Key::new().number("server_id", 42).number("user_id", 7);

    context.accessor.put(table, &item).await.unwrap();
    assert_eq!(context.accessor.get(table, &key, None).await.unwrap(), item);

    let updated = context
        .accessor
        .update(
            table,
            &key,
            "set minecraft_user_id = :v",
            HashMap::from([(":v".to_string(), AttributeValue::S("xyz".to_string()))]),
        )
        .await
        .unwrap();
    assert_eq!(updated.get_string("minecraft_user_id"), Some("xyz"));

    context.accessor.delete(table, &key).await.unwrap();
    assert!(context.accessor.get(table, &key, None).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires LocalStack on localhost:4566"]
async fn test_create_table_is_idempotent() {
    let context = LocalStackContext::new().await;

    let outcome = context
        .accessor
        .create_table(&context.server_data_table)
        .await
        .unwrap();

    assert_eq!(outcome, CreateTableOutcome::AlreadyExists);
}

#[tokio::test]
#[ignore = "requires LocalStack on localhost:4566"]
async fn test_query_reads_one_partition() {
    let context = LocalStackContext::new().await;
    let table = context.user_data_table.as_str();
    for (server_id, user_id) in [(1, 1), (1, 2), (2, 1)] {
        let item = Item::new()
            .number("server_id", server_id)
            .number("user_id", user_id)
            .string("registered", "2024-01-01 00:00:00")
            .string("minecraft_user_id", "abc");
        context.accessor.put(table, &item).await.unwrap();
    }

    let request = ReadRequest::query("server_id = :sid")
        .value(":sid", AttributeValue::N("1".to_string()));
    let outcome = context.accessor.read_all(table, &request).await.unwrap();

    assert_eq!(outcome.items.len(), 2);
    assert_eq!(outcome.scanned_count, 2);
}

#[tokio::test]
#[ignore = "requires LocalStack on localhost:4566"]
async fn test_conditional_update_does_not_insert() {
    let context = LocalStackContext::new().await;
    let table = context.user_data_table.as_str();
    let key = Key::new().number("server_id", 9).number("user_id", 9);
    let request = UpdateRequest::new("SET minecraft_user_id = :mc")
        .condition("attribute_exists(server_id)")
        .value(":mc", AttributeValue::S("xyz".to_string()));

    let err = context
        .accessor
        .update_with(table, &key, &request)
        .await
        .unwrap_err();

    assert_eq!(err.code(), Some(CONDITIONAL_CHECK_FAILED));
    assert!(context.accessor.get(table, &key, None).await.unwrap().is_empty());
}
