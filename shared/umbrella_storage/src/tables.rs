//! Umbrella's tables: `ServerData` and `UserData`

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::StorageResult;
use crate::schema::{
    AttributeType, ItemSchema, KeyAttribute, TableDescriptor, TableRegistry, TableSchema,
};

/// Default name of the per-server table
pub const SERVER_DATA_TABLE: &str = "ServerData";
/// Default name of the per-user table
pub const USER_DATA_TABLE: &str = "UserData";

/// `DynamoDB` attribute names for the server data table
#[derive(Debug, Clone, Copy, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ServerDataAttribute {
    /// Server ID (Partition Key)
    ServerId,
    /// Channel the status message is posted to
    ServerStatusChannelId,
}

/// `DynamoDB` attribute names for the user data table
#[derive(Debug, Clone, Copy, Display)]
#[strum(serialize_all = "snake_case")]
pub enum UserDataAttribute {
    /// Server ID (Partition Key)
    ServerId,
    /// User ID (Sort Key)
    UserId,
    /// Registration timestamp, `%Y-%m-%d %H:%M:%S`
    Registered,
    /// Linked Minecraft account
    MinecraftUserId,
}

/// Item of the server data table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDataItem {
    /// Server ID (Partition Key)
    pub server_id: u64,
    /// Channel the status message is posted to
    pub server_status_channel_id: u64,
}

/// Key of the server data table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDataKey {
    /// Server ID (Partition Key)
    pub server_id: u64,
}

/// Item of the user data table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDataItem {
    /// Server ID (Partition Key)
    pub server_id: u64,
    /// User ID (Sort Key)
    pub user_id: u64,
    /// Registration timestamp
    pub registered: String,
    /// Linked Minecraft account
    pub minecraft_user_id: String,
}

/// Key of the user data table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDataKey {
    /// Server ID (Partition Key)
    pub server_id: u64,
    /// User ID (Sort Key)
    pub user_id: u64,
}

/// Server data table under `table_name`
#[must_use]
pub fn server_data_table(table_name: impl Into<String>) -> TableSchema {
    TableSchema::new(
        TableDescriptor::new(
            table_name,
            KeyAttribute::new(
                ServerDataAttribute::ServerId.to_string(),
                AttributeType::Number,
            ),
        ),
        ItemSchema::new("ServerTableItem").attribute(
            ServerDataAttribute::ServerStatusChannelId.to_string(),
            AttributeType::Number,
        ),
    )
}

/// User data table under `table_name`
#[must_use]
pub fn user_data_table(table_name: impl Into<String>) -> TableSchema {
    TableSchema::new(
        TableDescriptor::new(
            table_name,
            KeyAttribute::new(UserDataAttribute::ServerId.to_string(), AttributeType::Number),
        )
        .with_sort_key(KeyAttribute::new(
            UserDataAttribute::UserId.to_string(),
            AttributeType::Number,
        )),
        ItemSchema::new("UserTableItem")
            .attribute(
                UserDataAttribute::Registered.to_string(),
                AttributeType::String,
            )
            .attribute(
                UserDataAttribute::MinecraftUserId.to_string(),
                AttributeType::String,
            ),
    )
}

/// Registry with both tables under the given names
///
/// # Errors
///
/// Returns `StorageError::DuplicateTable` if both names are the same
pub fn registry(
    server_data_table_name: impl Into<String>,
    user_data_table_name: impl Into<String>,
) -> StorageResult<TableRegistry> {
    TableRegistry::new([
        server_data_table(server_data_table_name),
        user_data_table(user_data_table_name),
    ])
}

/// Registry with both tables under their default names
///
/// # Errors
///
/// Never fails in practice, the default names are distinct
pub fn default_registry() -> StorageResult<TableRegistry> {
    registry(SERVER_DATA_TABLE, USER_DATA_TABLE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::item::{Item, Key};

    #[test]
    fn test_default_registry_tables() {
        let registry = default_registry().unwrap();
        let names: Vec<&str> = registry.tables().iter().map(|t| t.name()).collect();

        assert_eq!(names, vec![SERVER_DATA_TABLE, USER_DATA_TABLE]);

        let user = registry.get(USER_DATA_TABLE).unwrap();
        assert_eq!(user.descriptor.partition_key.name, "server_id");
        assert_eq!(
            user.descriptor.sort_key.as_ref().map(|k| k.name.as_str()),
            Some("user_id")
        );
        assert_eq!(user.item_schema.attributes().len(), 4);
    }

    #[test]
    fn test_registry_rejects_shared_table_name() {
        let err = registry("Shared", "Shared").unwrap_err();

        assert!(matches!(err, StorageError::DuplicateTable(name) if name == "Shared"));
    }

    #[test]
    fn test_records_match_their_schemas() {
        let registry = default_registry().unwrap();

        let user = Item::from_record(&UserDataItem {
            server_id: 42,
            user_id: 7,
            registered: "2024-01-01 00:00:00".to_string(),
            minecraft_user_id: "abc".to_string(),
        })
        .unwrap();
        let server = Item::from_record(&ServerDataItem {
            server_id: 42,
            server_status_channel_id: 1000,
        })
        .unwrap();

        let user_table = registry.get(USER_DATA_TABLE).unwrap();
        let server_table = registry.get(SERVER_DATA_TABLE).unwrap();
        assert!(user_table.item_schema.validate(&user).is_ok());
        assert!(server_table.item_schema.validate(&server).is_ok());
        assert!(server_table.item_schema.validate(&user).is_err());
        assert!(user_table.item_schema.validate(&server).is_err());
    }

    #[test]
    fn test_key_records_match_their_descriptors() {
        let registry = default_registry().unwrap();

        let user_key = Key::from_record(&UserDataKey {
            server_id: 42,
            user_id: 7,
        })
        .unwrap();
        let server_key = Key::from_record(&ServerDataKey { server_id: 42 }).unwrap();

        let user_table = registry.get(USER_DATA_TABLE).unwrap();
        let server_table = registry.get(SERVER_DATA_TABLE).unwrap();
        assert!(user_table.descriptor.validate_key(&user_key).is_ok());
        assert!(server_table.descriptor.validate_key(&server_key).is_ok());
        assert!(server_table.descriptor.validate_key(&user_key).is_err());
    }
}
