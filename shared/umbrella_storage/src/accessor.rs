//! Schema-aware access to the registered tables
//!
//! [`TableAccessor`] routes typed requests to the store client, validates
//! payloads against the table they target and accumulates multi-page reads.

use std::collections::HashMap;
use std::sync::Arc;

use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info, warn};

use crate::error::{Operation, SchemaViolation, StorageError, StorageResult};
use crate::item::{Item, Key};
use crate::schema::{CreateTableOutcome, TableRegistry, TableSchema};
use crate::store::{ItemStore, Projection, ReadOutcome, ReadRequest, StoreFailure, UpdateRequest};

/// Storage client for the registered tables
///
/// Holds one store client handle and the read-only table registry. It keeps
/// no other state between calls and adds no locking, so a single instance can
/// be shared by concurrent callers.
pub struct TableAccessor<S: ?Sized = DynamoDbClient> {
    store: Arc<S>,
    registry: TableRegistry,
}

impl<S: ?Sized> Clone for TableAccessor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: self.registry.clone(),
        }
    }
}

fn store_error(operation: Operation, table: &str, failure: StoreFailure) -> StorageError {
    StorageError::StoreOperationFailed {
        operation,
        table: table.to_string(),
        code: failure.code,
        message: failure.message,
    }
}

impl<S: ItemStore + ?Sized> TableAccessor<S> {
    /// Creates a new accessor
    ///
    /// # Arguments
    ///
    /// * `store` - Pre-configured store client, bound to its region and credentials
    /// * `registry` - Tables this accessor may address
    #[must_use]
    pub const fn new(store: Arc<S>, registry: TableRegistry) -> Self {
        Self { store, registry }
    }

    /// Tables this accessor may address
    #[must_use]
    pub const fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    fn table(&self, name: &str) -> StorageResult<&TableSchema> {
        self.registry
            .get(name)
            .ok_or_else(|| StorageError::UnknownTable(name.to_string()))
    }

    fn reject(
        operation: Operation,
        table: &str,
        key: &Key,
        violation: SchemaViolation,
    ) -> StorageError {
        warn!(
            operation = %operation,
            table,
            key = %key,
            outcome = "schema_mismatch",
            "Rejected {operation} on table {table}: {violation}"
        );
        StorageError::SchemaMismatch {
            table: table.to_string(),
            violation,
        }
    }

    fn check_key(&self, operation: Operation, table: &str, key: &Key) -> StorageResult<()> {
        self.table(table)?
            .descriptor
            .validate_key(key)
            .map_err(|violation| Self::reject(operation, table, key, violation))
    }

    /// Writes an item, replacing any item with the same key
    ///
    /// The item must carry exactly the attributes of the table's item schema,
    /// otherwise nothing is sent to the store.
    ///
    /// # Errors
    ///
    /// * `StorageError::UnknownTable` if `table` is not registered
    /// * `StorageError::SchemaMismatch` if the item does not match the table
    /// * `StorageError::StoreOperationFailed` if the put fails
    pub async fn put(&self, table: &str, item: &Item) -> StorageResult<()> {
        let operation = Operation::PutItem;
        let schema = self.table(table)?;
        let key = Key::from(
            schema
                .descriptor
                .key_attributes()
                .filter_map(|attribute| {
                    item.get(&attribute.name)
                        .map(|value| (attribute.name.clone(), value.clone()))
                })
                .collect::<HashMap<_, _>>(),
        );

        schema
            .item_schema
            .validate(item)
            .map_err(|violation| Self::reject(operation, table, &key, violation))?;

        match self.store.put_item(table, item.attributes().clone()).await {
            Ok(()) => {
                info!(
                    operation = %operation,
                    table,
                    key = %key,
                    outcome = "success",
                    "Item {item} successfully created on table {table}"
                );
                Ok(())
            }
            Err(failure) => {
                error!(
                    operation = %operation,
                    table,
                    key = %key,
                    outcome = "failure",
                    "Couldn't put item {item} to table {table}: {failure}"
                );
                Err(store_error(operation, table, failure))
            }
        }
    }

    /// Serializes a record and writes it with [`Self::put`]
    ///
    /// # Errors
    ///
    /// Same as [`Self::put`], plus `StorageError::SerializationError`
    pub async fn put_record<T: Serialize + Sync>(&self, table: &str, record: &T) -> StorageResult<()> {
        let item = Item::from_record(record)?;
        self.put(table, &item).await
    }

    /// Reads an item by key
    ///
    /// Returns an empty item when nothing is stored under `key`.
    ///
    /// # Errors
    ///
    /// * `StorageError::UnknownTable` if `table` is not registered
    /// * `StorageError::SchemaMismatch` if the key does not match the table key
    /// * `StorageError::StoreOperationFailed` if the get fails
    pub async fn get(
        &self,
        table: &str,
        key: &Key,
        projection: Option<&Projection>,
    ) -> StorageResult<Item> {
        let operation = Operation::GetItem;
        self.check_key(operation, table, key)?;

        let item = self
            .store
            .get_item(table, key.attributes().clone(), projection)
            .await
            .map_err(|failure| {
                error!(
                    operation = %operation,
                    table,
                    key = %key,
                    outcome = "failure",
                    "Couldn't get item from table {table}: {failure}"
                );
                store_error(operation, table, failure)
            })?;

        Ok(item.map(Item::from).unwrap_or_default())
    }

    /// Reads an item by key and deserializes it, `None` when absent
    ///
    /// # Errors
    ///
    /// Same as [`Self::get`], plus `StorageError::SerializationError`
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        table: &str,
        key: &Key,
    ) -> StorageResult<Option<T>> {
        let item = self.get(table, key, None).await?;
        if item.is_empty() {
            return Ok(None);
        }
        item.into_record().map(Some)
    }

    /// Applies an update expression, e.g. `set minecraft_user_id = :v`
    ///
    /// Returns every attribute of the item after the update.
    ///
    /// # Errors
    ///
    /// * `StorageError::UnknownTable` if `table` is not registered
    /// * `StorageError::SchemaMismatch` if the key does not match the table key
    /// * `StorageError::StoreOperationFailed` if the update fails
    pub async fn update(
        &self,
        table: &str,
        key: &Key,
        update_expression: &str,
        values: HashMap<String, AttributeValue>,
    ) -> StorageResult<Item> {
        self.update_with_names(table, key, update_expression, HashMap::new(), values)
            .await
    }

    /// Same as [`Self::update`], with `#placeholder` aliases for attribute names
    ///
    /// # Errors
    ///
    /// Same as [`Self::update`]
    pub async fn update_with_names(
        &self,
        table: &str,
        key: &Key,
        update_expression: &str,
        names: HashMap<String, String>,
        values: HashMap<String, AttributeValue>,
    ) -> StorageResult<Item> {
        let request = UpdateRequest {
            update_expression: update_expression.to_string(),
            condition: None,
            names,
            values,
        };
        self.update_with(table, key, &request).await
    }

    /// Applies an [`UpdateRequest`], optionally guarded by a condition
    ///
    /// A guarded update on an item that does not satisfy the condition changes
    /// nothing and fails with code [`crate::CONDITIONAL_CHECK_FAILED`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::update`]
    pub async fn update_with(
        &self,
        table: &str,
        key: &Key,
        request: &UpdateRequest,
    ) -> StorageResult<Item> {
        let operation = Operation::UpdateItem;
        self.check_key(operation, table, key)?;

        match self
            .store
            .update_item(table, key.attributes().clone(), request)
            .await
        {
            Ok(attributes) => {
                let item = attributes.map(Item::from).unwrap_or_default();
                info!(
                    operation = %operation,
                    table,
                    key = %key,
                    outcome = "success",
                    "Item {item} successfully updated on table {table}"
                );
                Ok(item)
            }
            Err(failure) => {
                error!(
                    operation = %operation,
                    table,
                    key = %key,
                    outcome = "failure",
                    update_expression = %request.update_expression,
                    condition = ?request.condition,
                    "Couldn't update item on table {table}: {failure}"
                );
                Err(store_error(operation, table, failure))
            }
        }
    }

    /// Deletes an item by key, deleting a missing item is not an error
    ///
    /// # Errors
    ///
    /// * `StorageError::UnknownTable` if `table` is not registered
    /// * `StorageError::SchemaMismatch` if the key does not match the table key
    /// * `StorageError::StoreOperationFailed` if the delete fails
    pub async fn delete(&self, table: &str, key: &Key) -> StorageResult<()> {
        let operation = Operation::DeleteItem;
        self.check_key(operation, table, key)?;

        match self.store.delete_item(table, key.attributes().clone()).await {
            Ok(Some(attributes)) => {
                info!(
                    operation = %operation,
                    table,
                    key = %key,
                    outcome = "success",
                    "Item {} successfully deleted on table {table}",
                    Item::from(attributes)
                );
                Ok(())
            }
            Ok(None) => {
                info!(
                    operation = %operation,
                    table,
                    key = %key,
                    outcome = "success",
                    "No item to delete on table {table}"
                );
                Ok(())
            }
            Err(failure) => {
                error!(
                    operation = %operation,
                    table,
                    key = %key,
                    outcome = "failure",
                    "Couldn't delete item from table {table}: {failure}"
                );
                Err(store_error(operation, table, failure))
            }
        }
    }

    /// Reads every item matching `request`, following continuation tokens
    ///
    /// Items are returned in the order the store produced them, page after
    /// page. The loop is not atomic: writes landing between pages may or may
    /// not be observed. A failing page discards everything read so far.
    /// Dropping the returned future stops the loop after the in-flight call.
    ///
    /// # Errors
    ///
    /// * `StorageError::UnknownTable` if `table` is not registered
    /// * `StorageError::StoreOperationFailed` if any page fails
    pub async fn read_all(&self, table: &str, request: &ReadRequest) -> StorageResult<ReadOutcome> {
        let operation = request.operation();
        self.table(table)?;

        let mut items = Vec::new();
        let mut scanned_count = 0;
        let mut pages = 0_usize;
        let mut start_key = None;

        loop {
            let page = self
                .store
                .read_page(table, request, start_key.take())
                .await
                .map_err(|failure| {
                    error!(
                        operation = %operation,
                        table,
                        pages,
                        outcome = "failure",
                        "Couldn't {operation} table {table}: {failure}"
                    );
                    store_error(operation, table, failure)
                })?;

            pages += 1;
            scanned_count += page.scanned_count;
            items.extend(page.items.into_iter().map(Item::from));

            match page.last_evaluated_key {
                Some(key) => start_key = Some(key),
                None => break,
            }
        }

        info!(
            operation = %operation,
            table,
            pages,
            scanned_count,
            item_count = items.len(),
            "A total of {scanned_count} items were retrieved from table {table} using {operation}"
        );

        Ok(ReadOutcome {
            items,
            scanned_count,
        })
    }

    /// Reads every item matching `request` and deserializes each one
    ///
    /// # Errors
    ///
    /// Same as [`Self::read_all`], plus `StorageError::SerializationError`
    pub async fn read_all_as<T: DeserializeOwned>(
        &self,
        table: &str,
        request: &ReadRequest,
    ) -> StorageResult<Vec<T>> {
        self.read_all(table, request)
            .await?
            .items
            .into_iter()
            .map(Item::into_record)
            .collect()
    }

    /// Creates a registered table, an existing table counts as success
    ///
    /// # Errors
    ///
    /// * `StorageError::UnknownTable` if `table` is not registered
    /// * `StorageError::StoreOperationFailed` for any other creation failure
    pub async fn create_table(&self, table: &str) -> StorageResult<CreateTableOutcome> {
        let operation = Operation::CreateTable;
        let schema = self.table(table)?;

        match self.store.create_table(schema).await {
            Ok(outcome) => {
                info!(
                    operation = %operation,
                    table,
                    outcome = %outcome,
                    "Table {table} ready"
                );
                Ok(outcome)
            }
            Err(failure) => {
                error!(
                    operation = %operation,
                    table,
                    outcome = "failure",
                    "Couldn't create table {table}: {failure}"
                );
                Err(store_error(operation, table, failure))
            }
        }
    }

    /// Creates every registered table, in name order
    ///
    /// # Errors
    ///
    /// Stops at the first table that fails, see [`Self::create_table`]
    pub async fn create_all_tables(&self) -> StorageResult<Vec<(String, CreateTableOutcome)>> {
        let names: Vec<String> = self
            .registry
            .tables()
            .iter()
            .map(|table| table.name().to_string())
            .collect();

        let mut outcomes = Vec::with_capacity(names.len());
        for name in names {
            let outcome = self.create_table(&name).await?;
            outcomes.push((name, outcome));
        }

        Ok(outcomes)
    }
}
