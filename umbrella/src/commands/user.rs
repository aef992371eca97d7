use anyhow::bail;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde_json::{json, Value};
use umbrella_storage::tables::{UserDataAttribute, UserDataItem, UserDataKey};
use umbrella_storage::{
    ItemStore, Key, ReadRequest, TableAccessor, UpdateRequest, CONDITIONAL_CHECK_FAILED,
};

use crate::config::BotConfig;

/// Format of the `registered` attribute
pub const REGISTERED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Per-user registrations
#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// Register a user of a server with their Minecraft account
    Register {
        /// Server ID
        #[arg(long)]
        server_id: u64,
        /// User ID
        #[arg(long)]
        user_id: u64,
        /// Minecraft account ID
        #[arg(long)]
        minecraft_user_id: String,
    },
    /// Show one registration
    Get {
        /// Server ID
        #[arg(long)]
        server_id: u64,
        /// User ID
        #[arg(long)]
        user_id: u64,
    },
    /// Link a registered user to another Minecraft account
    Link {
        /// Server ID
        #[arg(long)]
        server_id: u64,
        /// User ID
        #[arg(long)]
        user_id: u64,
        /// Minecraft account ID
        #[arg(long)]
        minecraft_user_id: String,
    },
    /// Remove a registration
    Unregister {
        /// Server ID
        #[arg(long)]
        server_id: u64,
        /// User ID
        #[arg(long)]
        user_id: u64,
    },
    /// Show every registration of a server
    List {
        /// Server ID
        #[arg(long)]
        server_id: u64,
        /// Only users linked to this Minecraft account
        #[arg(long)]
        minecraft_user_id: Option<String>,
    },
}

fn user_key(server_id: u64, user_id: u64) -> anyhow::Result<Key> {
    Ok(Key::from_record(&UserDataKey { server_id, user_id })?)
}

/// Runs a user command
///
/// # Errors
///
/// Returns an error if the storage operation fails or a linked user is not
/// registered
pub async fn run<S>(
    command: UserCommand,
    accessor: &TableAccessor<S>,
    config: &BotConfig,
) -> anyhow::Result<Value>
where
    S: ItemStore + ?Sized,
{
    let table = config.user_data_table.as_str();

    match command {
        UserCommand::Register {
            server_id,
            user_id,
            minecraft_user_id,
        } => {
            let record = registration(server_id, user_id, minecraft_user_id, Utc::now());
            accessor.put_record(table, &record).await?;
            Ok(serde_json::to_value(record)?)
        }
        UserCommand::Get { server_id, user_id } => {
            let record = accessor
                .get_as::<UserDataItem>(table, &user_key(server_id, user_id)?)
                .await?;
            Ok(json!(record))
        }
        UserCommand::Link {
            server_id,
            user_id,
            minecraft_user_id,
        } => {
            // Only existing registrations are linked, the update never inserts
            let request = UpdateRequest::new("SET #mc = :mc")
                .condition("attribute_exists(#sid)")
                .name("#sid", UserDataAttribute::ServerId.to_string())
                .name("#mc", UserDataAttribute::MinecraftUserId.to_string())
                .value(":mc", AttributeValue::S(minecraft_user_id));

            let item = match accessor
                .update_with(table, &user_key(server_id, user_id)?, &request)
                .await
            {
                Ok(item) => item,
                Err(err) if err.code() == Some(CONDITIONAL_CHECK_FAILED) => {
                    bail!("user {user_id} is not registered on server {server_id}")
                }
                Err(err) => return Err(err.into()),
            };
            Ok(serde_json::to_value(item.into_record::<UserDataItem>()?)?)
        }
        UserCommand::Unregister { server_id, user_id } => {
            accessor
                .delete(table, &user_key(server_id, user_id)?)
                .await?;
            Ok(json!({ "server_id": server_id, "user_id": user_id, "deleted": true }))
        }
        UserCommand::List {
            server_id,
            minecraft_user_id,
        } => {
            let mut request = ReadRequest::query("#sid = :sid")
                .name("#sid", UserDataAttribute::ServerId.to_string())
                .value(":sid", AttributeValue::N(server_id.to_string()));
            if let Some(minecraft_user_id) = minecraft_user_id {
                request = request
                    .filter("#mc = :mc")
                    .name("#mc", UserDataAttribute::MinecraftUserId.to_string())
                    .value(":mc", AttributeValue::S(minecraft_user_id));
            }

            let users = accessor.read_all_as::<UserDataItem>(table, &request).await?;
            Ok(json!(users))
        }
    }
}

fn registration(
    server_id: u64,
    user_id: u64,
    minecraft_user_id: String,
    now: DateTime<Utc>,
) -> UserDataItem {
    UserDataItem {
        server_id,
        user_id,
        registered: now.format(REGISTERED_FORMAT).to_string(),
        minecraft_user_id,
    }
}
