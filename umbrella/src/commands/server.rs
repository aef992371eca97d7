use clap::Subcommand;
use serde_json::{json, Value};
use tracing::debug;
use umbrella_storage::tables::{ServerDataItem, ServerDataKey};
use umbrella_storage::{ItemStore, Key, ReadRequest, TableAccessor};

use crate::config::BotConfig;

/// Per-server settings
#[derive(Debug, Subcommand)]
pub enum ServerCommand {
    /// Set the channel server status messages are posted to
    SetStatusChannel {
        /// Server ID
        #[arg(long)]
        server_id: u64,
        /// Channel ID
        #[arg(long)]
        channel_id: u64,
    },
    /// Show the settings of one server
    Get {
        /// Server ID
        #[arg(long)]
        server_id: u64,
    },
    /// Show the settings of every server
    List,
}

/// Runs a server command
///
/// # Errors
///
/// Returns an error if the storage operation fails
pub async fn run<S>(
    command: ServerCommand,
    accessor: &TableAccessor<S>,
    config: &BotConfig,
) -> anyhow::Result<Value>
where
    S: ItemStore + ?Sized,
{
    let table = config.server_data_table.as_str();

    match command {
        ServerCommand::SetStatusChannel {
            server_id,
            channel_id,
        } => {
            let record = ServerDataItem {
                server_id,
                server_status_channel_id: channel_id,
            };
            accessor.put_record(table, &record).await?;
            Ok(serde_json::to_value(record)?)
        }
        ServerCommand::Get { server_id } => {
            let key = Key::from_record(&ServerDataKey { server_id })?;
            let record = accessor.get_as::<ServerDataItem>(table, &key).await?;
            Ok(json!(record))
        }
        ServerCommand::List => {
            let servers = accessor
                .read_all_as::<ServerDataItem>(table, &ReadRequest::scan())
                .await?;
            debug!(count = servers.len(), "Listed servers");
            Ok(json!(servers))
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::commands::tests::test_context;

    #[tokio::test]
    async fn test_set_status_channel_then_get() {
        let (accessor, config) = test_context();

        run(
            ServerCommand::SetStatusChannel {
                server_id: 42,
                channel_id: 1000,
            },
            &accessor,
            &config,
        )
        .await
        .unwrap();

        let server = run(ServerCommand::Get { server_id: 42 }, &accessor, &config)
            .await
            .unwrap();
        assert_eq!(
            server,
            json!({ "server_id": 42, "server_status_channel_id": 1000 })
        );

        let missing = run(ServerCommand::Get { server_id: 43 }, &accessor, &config)
            .await
            .unwrap();
        assert_eq!(missing, Value::Null);
    }

    #[tokio::test]
    async fn test_list_servers() {
        let (accessor, config) = test_context();
        for server_id in [1, 2] {
            run(
                ServerCommand::SetStatusChannel {
                    server_id,
                    channel_id: server_id * 10,
                },
                &accessor,
                &config,
            )
            .await
            .unwrap();
        }

        let servers = run(ServerCommand::List, &accessor, &config).await.unwrap();

        assert_eq!(
            servers,
            json!([
                { "server_id": 1, "server_status_channel_id": 10 },
                { "server_id": 2, "server_status_channel_id": 20 },
            ])
        );
    }
}
