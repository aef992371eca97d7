//! [`ItemStore`] over the `DynamoDB` client
//!
//! The client carries its own retry and timeout configuration, nothing is
//! retried here.

use std::collections::HashMap;
use std::time::Duration;

use aws_sdk_dynamodb::client::Waiters;
use aws_sdk_dynamodb::error::{BuildError, DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::create_table::CreateTableError;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, KeySchemaElement, KeyType, ProvisionedThroughput,
    ReturnConsumedCapacity, ReturnValue,
};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use tracing::debug;

use super::{ItemStore, Page, Projection, ReadRequest, StoreFailure, UpdateRequest};
use crate::item::AttributeMap;
use crate::schema::{CreateTableOutcome, KeyAttribute, TableSchema};

/// Upper bound on waiting for a new table to become active
const TABLE_EXISTS_MAX_WAIT: Duration = Duration::from_secs(300);

impl<E, R> From<SdkError<E, R>> for StoreFailure
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    fn from(err: SdkError<E, R>) -> Self {
        let code = err.code().unwrap_or("Unknown").to_string();
        let message = err.message().map_or_else(
            || DisplayErrorContext(&err).to_string(),
            ToString::to_string,
        );
        Self { code, message }
    }
}

fn build_failure(err: BuildError) -> StoreFailure {
    StoreFailure::new("BuildError", err.to_string())
}

/// `DynamoDB` rejects empty expression maps, so they are sent as absent
fn non_empty<V: Clone>(map: &HashMap<String, V>) -> Option<HashMap<String, V>> {
    (!map.is_empty()).then(|| map.clone())
}

fn continuation(key: Option<AttributeMap>) -> Option<AttributeMap> {
    key.filter(|key| !key.is_empty())
}

fn scanned(count: i32) -> usize {
    usize::try_from(count).unwrap_or_default()
}

fn key_element(
    attribute: &KeyAttribute,
    key_type: KeyType,
) -> Result<(KeySchemaElement, AttributeDefinition), StoreFailure> {
    let scalar_type = attribute
        .attribute_type
        .scalar_attribute_type()
        .ok_or_else(|| {
            StoreFailure::new(
                "ValidationException",
                format!(
                    "key attribute `{}` must be a number or a string",
                    attribute.name
                ),
            )
        })?;

    let element = KeySchemaElement::builder()
        .attribute_name(&attribute.name)
        .key_type(key_type)
        .build()
        .map_err(build_failure)?;
    let definition = AttributeDefinition::builder()
        .attribute_name(&attribute.name)
        .attribute_type(scalar_type)
        .build()
        .map_err(build_failure)?;

    Ok((element, definition))
}

#[async_trait::async_trait]
impl ItemStore for DynamoDbClient {
    async fn put_item(&self, table: &str, item: AttributeMap) -> Result<(), StoreFailure> {
        Self::put_item(self)
            .table_name(table)
            .set_item(Some(item))
            .send()
            .await?;

        Ok(())
    }

    async fn get_item(
        &self,
        table: &str,
        key: AttributeMap,
        projection: Option<&Projection>,
    ) -> Result<Option<AttributeMap>, StoreFailure> {
        let response = Self::get_item(self)
            .table_name(table)
            .set_key(Some(key))
            .set_projection_expression(projection.map(|p| p.expression.clone()))
            .set_expression_attribute_names(projection.and_then(|p| non_empty(&p.names)))
            .send()
            .await?;

        Ok(response.item)
    }

    async fn update_item(
        &self,
        table: &str,
        key: AttributeMap,
        request: &UpdateRequest,
    ) -> Result<Option<AttributeMap>, StoreFailure> {
        let response = Self::update_item(self)
            .table_name(table)
            .set_key(Some(key))
            .update_expression(&request.update_expression)
            .set_condition_expression(request.condition.clone())
            .set_expression_attribute_names(non_empty(&request.names))
            .set_expression_attribute_values(non_empty(&request.values))
            .return_values(ReturnValue::AllNew)
            .send()
            .await?;

        Ok(response.attributes)
    }

    async fn delete_item(
        &self,
        table: &str,
        key: AttributeMap,
    ) -> Result<Option<AttributeMap>, StoreFailure> {
        let response = Self::delete_item(self)
            .table_name(table)
            .set_key(Some(key))
            .return_values(ReturnValue::AllOld)
            .send()
            .await?;

        Ok(response.attributes)
    }

    async fn read_page(
        &self,
        table: &str,
        request: &ReadRequest,
        exclusive_start_key: Option<AttributeMap>,
    ) -> Result<Page, StoreFailure> {
        if let Some(key_condition) = &request.key_condition {
            let response = self
                .query()
                .table_name(table)
                .key_condition_expression(key_condition)
                .set_filter_expression(request.filter.clone())
                .set_projection_expression(request.projection.clone())
                .set_expression_attribute_names(non_empty(&request.names))
                .set_expression_attribute_values(non_empty(&request.values))
                .set_exclusive_start_key(exclusive_start_key)
                .return_consumed_capacity(ReturnConsumedCapacity::Indexes)
                .send()
                .await?;

            debug!(table, consumed_capacity = ?response.consumed_capacity, "Query page read");

            Ok(Page {
                items: response.items.unwrap_or_default(),
                last_evaluated_key: continuation(response.last_evaluated_key),
                scanned_count: scanned(response.scanned_count),
            })
        } else {
            let response = self
                .scan()
                .table_name(table)
                .set_filter_expression(request.filter.clone())
                .set_projection_expression(request.projection.clone())
                .set_expression_attribute_names(non_empty(&request.names))
                .set_expression_attribute_values(non_empty(&request.values))
                .set_exclusive_start_key(exclusive_start_key)
                .return_consumed_capacity(ReturnConsumedCapacity::Indexes)
                .send()
                .await?;

            debug!(table, consumed_capacity = ?response.consumed_capacity, "Scan page read");

            Ok(Page {
                items: response.items.unwrap_or_default(),
                last_evaluated_key: continuation(response.last_evaluated_key),
                scanned_count: scanned(response.scanned_count),
            })
        }
    }

    async fn create_table(&self, table: &TableSchema) -> Result<CreateTableOutcome, StoreFailure> {
        let descriptor = &table.descriptor;
        let keys = std::iter::once((&descriptor.partition_key, KeyType::Hash)).chain(
            descriptor
                .sort_key
                .as_ref()
                .map(|sort_key| (sort_key, KeyType::Range)),
        );

        let mut key_schema = Vec::new();
        let mut attribute_definitions = Vec::new();
        for (attribute, key_type) in keys {
            let (element, definition) = key_element(attribute, key_type)?;
            key_schema.push(element);
            attribute_definitions.push(definition);
        }

        let throughput = ProvisionedThroughput::builder()
            .read_capacity_units(table.definition.read_capacity_units)
            .write_capacity_units(table.definition.write_capacity_units)
            .build()
            .map_err(build_failure)?;

        let created = Self::create_table(self)
            .table_name(table.name())
            .set_key_schema(Some(key_schema))
            .set_attribute_definitions(Some(attribute_definitions))
            .provisioned_throughput(throughput)
            .deletion_protection_enabled(table.definition.deletion_protection)
            .send()
            .await;

        match created {
            Ok(_) => {}
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(CreateTableError::is_resource_in_use_exception) =>
            {
                return Ok(CreateTableOutcome::AlreadyExists);
            }
            Err(err) => return Err(err.into()),
        }

        self.wait_until_table_exists()
            .table_name(table.name())
            .wait(TABLE_EXISTS_MAX_WAIT)
            .await
            .map_err(|err| StoreFailure::new("WaiterError", DisplayErrorContext(&err).to_string()))?;

        Ok(CreateTableOutcome::Created)
    }
}
