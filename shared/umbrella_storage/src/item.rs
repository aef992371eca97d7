//! Items and keys as maps of tagged scalar values

use std::collections::HashMap;
use std::fmt;

use aws_sdk_dynamodb::types::AttributeValue;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::StorageResult;

/// Raw `DynamoDB` attribute map
pub type AttributeMap = HashMap<String, AttributeValue>;

/// A table item: attribute name to tagged scalar value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Item(AttributeMap);

impl Item {
    /// Creates an empty item
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a number attribute
    #[must_use]
    pub fn number(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.0.insert(name.into(), AttributeValue::N(value.to_string()));
        self
    }

    /// Sets a string attribute
    #[must_use]
    pub fn string(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), AttributeValue::S(value.into()));
        self
    }

    /// Sets a boolean attribute
    #[must_use]
    pub fn boolean(mut self, name: impl Into<String>, value: bool) -> Self {
        self.0.insert(name.into(), AttributeValue::Bool(value));
        self
    }

    /// Converts a record into an item
    ///
    /// # Errors
    ///
    /// Returns `StorageError::SerializationError` if the record cannot be
    /// represented as a `DynamoDB` item
    pub fn from_record<T: Serialize>(record: &T) -> StorageResult<Self> {
        Ok(Self(serde_dynamo::to_item(record)?))
    }

    /// Converts the item into a record
    ///
    /// # Errors
    ///
    /// Returns `StorageError::SerializationError` if the item does not have
    /// the record's shape
    pub fn into_record<T: DeserializeOwned>(self) -> StorageResult<T> {
        Ok(serde_dynamo::from_item(self.0)?)
    }

    /// Looks up an attribute
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.0.get(name)
    }

    /// String value of an attribute, if it is a string
    #[must_use]
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|value| value.as_s().ok()).map(String::as_str)
    }

    /// Raw attribute map
    #[must_use]
    pub const fn attributes(&self) -> &AttributeMap {
        &self.0
    }

    /// Consumes the item, returning the raw attribute map
    #[must_use]
    pub fn into_attributes(self) -> AttributeMap {
        self.0
    }

    /// Whether the item has no attributes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of attributes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<AttributeMap> for Item {
    fn from(attributes: AttributeMap) -> Self {
        Self(attributes)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_attributes(f, &self.0)
    }
}

/// Partition key and, if declared, sort key of one item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Key(AttributeMap);

impl Key {
    /// Creates an empty key
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a number key attribute
    #[must_use]
    pub fn number(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.0.insert(name.into(), AttributeValue::N(value.to_string()));
        self
    }

    /// Sets a string key attribute
    #[must_use]
    pub fn string(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), AttributeValue::S(value.into()));
        self
    }

    /// Converts a key record into a key
    ///
    /// # Errors
    ///
    /// Returns `StorageError::SerializationError` if the record cannot be
    /// represented as a `DynamoDB` item
    pub fn from_record<T: Serialize>(record: &T) -> StorageResult<Self> {
        Ok(Self(serde_dynamo::to_item(record)?))
    }

    /// Looks up a key attribute
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.0.get(name)
    }

    /// Raw attribute map
    #[must_use]
    pub const fn attributes(&self) -> &AttributeMap {
        &self.0
    }

    /// Consumes the key, returning the raw attribute map
    #[must_use]
    pub fn into_attributes(self) -> AttributeMap {
        self.0
    }
}

impl From<AttributeMap> for Key {
    fn from(attributes: AttributeMap) -> Self {
        Self(attributes)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_attributes(f, &self.0)
    }
}

/// Writes `{a=1, b="x"}` with attributes sorted by name
fn write_attributes(f: &mut fmt::Formatter<'_>, attributes: &AttributeMap) -> fmt::Result {
    let mut entries: Vec<(&String, &AttributeValue)> = attributes.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    f.write_str("{")?;
    for (index, (name, value)) in entries.into_iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        match value {
            AttributeValue::N(number) => write!(f, "{name}={number}")?,
            AttributeValue::S(string) => write!(f, "{name}={string:?}")?,
            AttributeValue::Bool(boolean) => write!(f, "{name}={boolean}")?,
            other => write!(f, "{name}={other:?}")?,
        }
    }
    f.write_str("}")
}
