//! LocalStack test setup utilities

#![allow(dead_code)]

use std::sync::Arc;

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use umbrella_storage::tables::{server_data_table, user_data_table};
use umbrella_storage::{TableAccessor, TableDefinition, TableRegistry};
use uuid::Uuid;

/// Test configuration for LocalStack
pub const LOCALSTACK_ENDPOINT: &str = "http://localhost:4566";
pub const TEST_REGION: &str = "us-east-1";

/// Test context with uniquely named tables, deleted on drop
pub struct LocalStackContext {
    pub accessor: TableAccessor,
    pub server_data_table: String,
    pub user_data_table: String,
    dynamodb_client: Arc<DynamoDbClient>,
}

impl LocalStackContext {
    pub async fn new() -> Self {
        let credentials = Credentials::from_keys(
            "test", // AWS_ACCESS_KEY_ID
            "test", // AWS_SECRET_ACCESS_KEY
            None,   // no session token
        );
        let config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(LOCALSTACK_ENDPOINT)
            .region(Region::new(TEST_REGION))
            .credentials_provider(credentials)
            .load()
            .await;

        let dynamodb_client = Arc::new(DynamoDbClient::new(&config));

        // Unique names avoid races between tests
        let suffix = Uuid::new_v4();
        let server_data_name = format!("test-server-data-{suffix}");
        let user_data_name = format!("test-user-data-{suffix}");

        // Deletion protection would block cleanup
        let definition = TableDefinition {
            deletion_protection: false,
            ..TableDefinition::default()
        };
        let registry = TableRegistry::new([
            server_data_table(&server_data_name).with_definition(definition),
            user_data_table(&user_data_name).with_definition(definition),
        ])
        .expect("Test table names are distinct");

        let accessor = TableAccessor::new(dynamodb_client.clone(), registry);
        accessor
            .create_all_tables()
            .await
            .expect("Failed to create test tables");

        Self {
            accessor,
            server_data_table: server_data_name,
            user_data_table: user_data_name,
            dynamodb_client,
        }
    }
}

impl Drop for LocalStackContext {
    fn drop(&mut self) {
        let client = self.dynamodb_client.clone();
        let tables = [self.server_data_table.clone(), self.user_data_table.clone()];

        // Use tokio runtime to delete tables
        let handle = tokio::runtime::Handle::try_current();
        if let Ok(handle) = handle {
            handle.spawn(async move {
                for table in tables {
                    let _ = client.delete_table().table_name(&table).send().await;
                }
            });
        }
    }
}
