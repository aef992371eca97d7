use std::sync::Arc;

use aws_sdk_dynamodb::Client as DynamoDbClient;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use umbrella::{
    commands::{self, Cli},
    config::BotConfig,
    types::Environment,
};
use umbrella_storage::TableAccessor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let environment = Environment::from_env();

    // Configure logging format based on environment
    // Use JSON format for staging/production, regular format for development.
    // Logs go to stderr, command output to stdout. `RUST_LOG` overrides the level.
    let filter = || {
        EnvFilter::builder()
            .with_default_directive(cli.log_level().into())
            .from_env_lossy()
    };
    if environment.json_logs() {
        fmt()
            .json()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
    }

    let config = BotConfig::from_environment(&environment);
    info!(
        ?environment,
        region = %config.region,
        endpoint = ?config.dynamodb_endpoint,
        "Starting Umbrella"
    );

    let registry = config.table_registry()?;
    let dynamodb_client = Arc::new(DynamoDbClient::new(&config.aws_config().await));
    let accessor = TableAccessor::new(dynamodb_client, registry);

    let output = commands::run(cli.command, &accessor, &config).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
