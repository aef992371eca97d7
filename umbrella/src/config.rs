use std::env;
use std::time::Duration;

use aws_config::{retry::RetryConfig, timeout::TimeoutConfig, BehaviorVersion, Region};
use umbrella_storage::tables::{self, SERVER_DATA_TABLE, USER_DATA_TABLE};
use umbrella_storage::{StorageResult, TableRegistry};

use crate::types::Environment;

/// Region used when `AWS_REGION` is not set
pub const DEFAULT_REGION: &str = "us-east-1";

/// Configuration for the bot, read once from the process environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    /// Deployment stage
    pub environment: Environment,
    /// AWS region of the `DynamoDB` tables
    pub region: String,
    /// Endpoint override, e.g. `LocalStack`
    pub dynamodb_endpoint: Option<String>,
    /// Name of the per-server table
    pub server_data_table: String,
    /// Name of the per-user table
    pub user_data_table: String,
}

impl BotConfig {
    /// Creates a new `BotConfig` from the given environment
    #[must_use]
    pub fn from_environment(environment: &Environment) -> Self {
        Self {
            environment: *environment,
            region: env::var("AWS_REGION").unwrap_or_else(|_| DEFAULT_REGION.to_string()),
            dynamodb_endpoint: env::var("DYNAMODB_ENDPOINT_URL").ok().or_else(|| {
                environment
                    .default_dynamodb_endpoint()
                    .map(ToString::to_string)
            }),
            server_data_table: env::var("DYNAMODB_SERVER_DATA_TABLE_NAME")
                .unwrap_or_else(|_| SERVER_DATA_TABLE.to_string()),
            user_data_table: env::var("DYNAMODB_USER_DATA_TABLE_NAME")
                .unwrap_or_else(|_| USER_DATA_TABLE.to_string()),
        }
    }

    /// AWS configuration with retry and timeout settings
    ///
    /// Retries belong to the SDK client, the storage layer never retries.
    pub async fn aws_config(&self) -> aws_config::SdkConfig {
        let retry_config = RetryConfig::standard()
            .with_max_attempts(3)
            .with_initial_backoff(Duration::from_millis(50));

        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(30))
            .build();

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .retry_config(retry_config)
            .timeout_config(timeout_config);

        if let Some(endpoint_url) = &self.dynamodb_endpoint {
            loader = loader.endpoint_url(endpoint_url);
        }

        loader.load().await
    }

    /// Table registry under the configured table names
    ///
    /// # Errors
    ///
    /// Returns `StorageError::DuplicateTable` if both tables are configured
    /// with the same name
    pub fn table_registry(&self) -> StorageResult<TableRegistry> {
        tables::registry(&self.server_data_table, &self.user_data_table)
    }
}
