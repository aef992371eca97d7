//! Store client seam
//!
//! [`ItemStore`] is the set of primitives the accessor needs from a key-value
//! store client. It is implemented for the `DynamoDB` client in
//! [`dynamodb`] and for an in-memory double in [`crate::mock`].

/// `DynamoDB` client implementation
pub mod dynamodb;

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use thiserror::Error;

use crate::error::Operation;
use crate::item::{AttributeMap, Item};
use crate::schema::{CreateTableOutcome, TableSchema};

/// Error code of an update whose condition expression did not hold
pub const CONDITIONAL_CHECK_FAILED: &str = "ConditionalCheckFailedException";

/// Failure reported by the store client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct StoreFailure {
    /// Machine readable error code
    pub code: String,
    /// Human readable error message
    pub message: String,
}

impl StoreFailure {
    /// Creates a failure from a code and message
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// One batch of items returned by a single scan or query call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Items in the order returned by the store
    pub items: Vec<AttributeMap>,
    /// Continuation token, present iff more data remains
    pub last_evaluated_key: Option<AttributeMap>,
    /// Items examined by the store, before any filter was applied
    pub scanned_count: usize,
}

/// Attribute subset to return from a single item read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    /// Projection expression, e.g. `server_id, #r`
    pub expression: String,
    /// Placeholder aliases for attribute names that collide with reserved words
    pub names: HashMap<String, String>,
}

impl Projection {
    /// Creates a projection
    #[must_use]
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            names: HashMap::new(),
        }
    }

    /// Adds a `#placeholder` alias for an attribute name
    #[must_use]
    pub fn name(mut self, placeholder: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.names.insert(placeholder.into(), attribute.into());
        self
    }
}

/// Parameters of a multi-page read
///
/// A key condition turns the read into a query restricted to one partition,
/// without one the whole table is scanned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadRequest {
    /// Key condition expression, selects query mode
    pub key_condition: Option<String>,
    /// Filter expression applied after items are read
    pub filter: Option<String>,
    /// Projection expression
    pub projection: Option<String>,
    /// Placeholder aliases for attribute names
    pub names: HashMap<String, String>,
    /// Placeholder values referenced by the expressions
    pub values: HashMap<String, AttributeValue>,
}

impl ReadRequest {
    /// Full table scan
    #[must_use]
    pub fn scan() -> Self {
        Self::default()
    }

    /// Query restricted by a key condition, e.g. `server_id = :sid`
    #[must_use]
    pub fn query(key_condition: impl Into<String>) -> Self {
        Self {
            key_condition: Some(key_condition.into()),
            ..Self::default()
        }
    }

    /// Sets the filter expression
    #[must_use]
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Sets the projection expression
    #[must_use]
    pub fn projection(mut self, projection: impl Into<String>) -> Self {
        self.projection = Some(projection.into());
        self
    }

    /// Adds a `#placeholder` alias for an attribute name
    #[must_use]
    pub fn name(mut self, placeholder: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.names.insert(placeholder.into(), attribute.into());
        self
    }

    /// Adds a `:placeholder` value
    #[must_use]
    pub fn value(mut self, placeholder: impl Into<String>, value: AttributeValue) -> Self {
        self.values.insert(placeholder.into(), value);
        self
    }

    /// Store operation this request issues
    #[must_use]
    pub const fn operation(&self) -> Operation {
        if self.key_condition.is_some() {
            Operation::Query
        } else {
            Operation::Scan
        }
    }
}

/// Parameters of a single item update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateRequest {
    /// Update expression, e.g. `SET minecraft_user_id = :v`
    pub update_expression: String,
    /// Condition the stored item must satisfy, e.g. `attribute_exists(server_id)`
    pub condition: Option<String>,
    /// Placeholder aliases for attribute names
    pub names: HashMap<String, String>,
    /// Placeholder values referenced by the expressions
    pub values: AttributeMap,
}

impl UpdateRequest {
    /// Unconditional update
    #[must_use]
    pub fn new(update_expression: impl Into<String>) -> Self {
        Self {
            update_expression: update_expression.into(),
            ..Self::default()
        }
    }

    /// Only applies the update when `condition` holds for the stored item
    #[must_use]
    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Adds a `#placeholder` alias for an attribute name
    #[must_use]
    pub fn name(mut self, placeholder: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.names.insert(placeholder.into(), attribute.into());
        self
    }

    /// Adds a `:placeholder` value
    #[must_use]
    pub fn value(mut self, placeholder: impl Into<String>, value: AttributeValue) -> Self {
        self.values.insert(placeholder.into(), value);
        self
    }
}

/// Every item of a multi-page read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOutcome {
    /// Accumulated items in page order
    pub items: Vec<Item>,
    /// Sum of the scanned count of every page
    pub scanned_count: usize,
}

/// Primitive operations of a key-value store client
///
/// Implementations must be safe for concurrent use and perform their own
/// retries, if any.
#[async_trait::async_trait]
pub trait ItemStore: Send + Sync {
    /// Writes an item, replacing any item with the same key
    async fn put_item(&self, table: &str, item: AttributeMap) -> Result<(), StoreFailure>;

    /// Reads an item by key, `None` if it does not exist
    async fn get_item(
        &self,
        table: &str,
        key: AttributeMap,
        projection: Option<&Projection>,
    ) -> Result<Option<AttributeMap>, StoreFailure>;

    /// Applies an update expression and returns the item after the update
    ///
    /// A request whose condition does not hold fails with
    /// [`CONDITIONAL_CHECK_FAILED`] and leaves the item untouched.
    async fn update_item(
        &self,
        table: &str,
        key: AttributeMap,
        request: &UpdateRequest,
    ) -> Result<Option<AttributeMap>, StoreFailure>;

    /// Deletes an item and returns its attributes if it existed
    async fn delete_item(
        &self,
        table: &str,
        key: AttributeMap,
    ) -> Result<Option<AttributeMap>, StoreFailure>;

    /// Reads one page, starting after `exclusive_start_key` when given
    async fn read_page(
        &self,
        table: &str,
        request: &ReadRequest,
        exclusive_start_key: Option<AttributeMap>,
    ) -> Result<Page, StoreFailure>;

    /// Creates a table, reporting an existing table as `AlreadyExists`
    async fn create_table(&self, table: &TableSchema) -> Result<CreateTableOutcome, StoreFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_request_mode() {
        assert_eq!(ReadRequest::scan().operation(), Operation::Scan);
        assert_eq!(
            ReadRequest::query("server_id = :sid").operation(),
            Operation::Query
        );
    }

    #[test]
    fn test_read_request_builder() {
        let request = ReadRequest::query("#sid = :sid")
            .filter("minecraft_user_id = :mc")
            .projection("user_id")
            .name("#sid", "server_id")
            .value(":sid", AttributeValue::N("42".to_string()))
            .value(":mc", AttributeValue::S("abc".to_string()));

        assert_eq!(request.filter.as_deref(), Some("minecraft_user_id = :mc"));
        assert_eq!(request.projection.as_deref(), Some("user_id"));
        assert_eq!(request.names.get("#sid").map(String::as_str), Some("server_id"));
        assert_eq!(request.values.len(), 2);
    }

    #[test]
    fn test_update_request_builder() {
        let request = UpdateRequest::new("SET #mc = :mc")
            .condition("attribute_exists(#sid)")
            .name("#sid", "server_id")
            .name("#mc", "minecraft_user_id")
            .value(":mc", AttributeValue::S("xyz".to_string()));

        assert_eq!(request.update_expression, "SET #mc = :mc");
        assert_eq!(request.condition.as_deref(), Some("attribute_exists(#sid)"));
        assert_eq!(request.names.len(), 2);
        assert!(UpdateRequest::new("SET a = :a").condition.is_none());
    }
}
