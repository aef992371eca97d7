//! Table descriptors, item schemas and the table registry
//!
//! All of these are fixed configuration: built once at startup and only read
//! afterwards.

use std::collections::{BTreeMap, HashMap};

use aws_sdk_dynamodb::types::{AttributeValue, ScalarAttributeType};
use strum::Display;

use crate::error::{SchemaViolation, StorageError, StorageResult};
use crate::item::{Item, Key};

/// Default provisioned read capacity for new tables
pub const DEFAULT_READ_CAPACITY_UNITS: i64 = 10;
/// Default provisioned write capacity for new tables
pub const DEFAULT_WRITE_CAPACITY_UNITS: i64 = 10;

/// Primitive type tag of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum AttributeType {
    /// `N`, numbers are carried as strings
    Number,
    /// `S`
    String,
    /// `BOOL`
    Boolean,
}

impl AttributeType {
    /// Whether `value` carries this type's tag
    #[must_use]
    pub const fn matches(self, value: &AttributeValue) -> bool {
        matches!(
            (self, value),
            (Self::Number, AttributeValue::N(_))
                | (Self::String, AttributeValue::S(_))
                | (Self::Boolean, AttributeValue::Bool(_))
        )
    }

    /// Key attribute type used in table definitions
    ///
    /// `DynamoDB` only accepts string, number and binary key attributes, so
    /// boolean keys have no scalar type.
    #[must_use]
    pub const fn scalar_attribute_type(self) -> Option<ScalarAttributeType> {
        match self {
            Self::Number => Some(ScalarAttributeType::N),
            Self::String => Some(ScalarAttributeType::S),
            Self::Boolean => None,
        }
    }
}

/// Wire tag of an attribute value, for error messages
#[must_use]
pub fn value_tag(value: &AttributeValue) -> &'static str {
    match value {
        AttributeValue::N(_) => "N",
        AttributeValue::S(_) => "S",
        AttributeValue::Bool(_) => "BOOL",
        AttributeValue::B(_) => "B",
        AttributeValue::Null(_) => "NULL",
        AttributeValue::L(_) => "L",
        AttributeValue::M(_) => "M",
        AttributeValue::Ns(_) => "NS",
        AttributeValue::Ss(_) => "SS",
        AttributeValue::Bs(_) => "BS",
        _ => "unknown",
    }
}

/// A partition or sort key attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAttribute {
    /// Attribute name
    pub name: String,
    /// Attribute type
    pub attribute_type: AttributeType,
}

impl KeyAttribute {
    /// Creates a key attribute
    #[must_use]
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
        }
    }
}

/// Identifies a table and declares its key schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    /// Table name
    pub name: String,
    /// Partition (hash) key
    pub partition_key: KeyAttribute,
    /// Optional sort (range) key
    pub sort_key: Option<KeyAttribute>,
}

impl TableDescriptor {
    /// Creates a descriptor for a table keyed by partition key only
    #[must_use]
    pub fn new(name: impl Into<String>, partition_key: KeyAttribute) -> Self {
        Self {
            name: name.into(),
            partition_key,
            sort_key: None,
        }
    }

    /// Adds a sort key to the descriptor
    #[must_use]
    pub fn with_sort_key(mut self, sort_key: KeyAttribute) -> Self {
        self.sort_key = Some(sort_key);
        self
    }

    /// Partition key followed by the sort key, if declared
    pub fn key_attributes(&self) -> impl Iterator<Item = &KeyAttribute> {
        std::iter::once(&self.partition_key).chain(self.sort_key.as_ref())
    }

    /// Checks that `key` supplies exactly the declared key attributes
    ///
    /// # Errors
    ///
    /// Returns the first `SchemaViolation` found
    pub fn validate_key(&self, key: &Key) -> Result<(), SchemaViolation> {
        let mut names: Vec<&String> = key.attributes().keys().collect();
        names.sort();

        for name in names {
            if !self.key_attributes().any(|attribute| &attribute.name == name) {
                return Err(SchemaViolation::UnexpectedKeyAttribute(name.clone()));
            }
        }

        for attribute in self.key_attributes() {
            let value = key
                .get(&attribute.name)
                .ok_or_else(|| SchemaViolation::MissingKeyAttribute(attribute.name.clone()))?;
            check_type(&attribute.name, attribute.attribute_type, value)?;
        }

        Ok(())
    }
}

/// Closed set of attributes an item of one table must carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSchema {
    /// Schema name
    pub name: String,
    attributes: BTreeMap<String, AttributeType>,
}

impl ItemSchema {
    /// Creates an empty schema
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Declares an attribute
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, attribute_type: AttributeType) -> Self {
        self.attributes.insert(name.into(), attribute_type);
        self
    }

    /// Declared attributes, ordered by name
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, AttributeType> {
        &self.attributes
    }

    /// Checks that `item` carries exactly the declared attributes with matching tags
    ///
    /// # Errors
    ///
    /// Returns the first `SchemaViolation` found. Extra attributes are reported
    /// before missing ones.
    pub fn validate(&self, item: &Item) -> Result<(), SchemaViolation> {
        let mut names: Vec<&String> = item.attributes().keys().collect();
        names.sort();

        for name in names {
            if !self.attributes.contains_key(name) {
                return Err(SchemaViolation::UnexpectedAttribute(name.clone()));
            }
        }

        for (name, attribute_type) in &self.attributes {
            let value = item
                .get(name)
                .ok_or_else(|| SchemaViolation::MissingAttribute(name.clone()))?;
            check_type(name, *attribute_type, value)?;
        }

        Ok(())
    }
}

fn check_type(
    name: &str,
    expected: AttributeType,
    value: &AttributeValue,
) -> Result<(), SchemaViolation> {
    if !expected.matches(value) {
        return Err(SchemaViolation::TypeMismatch {
            attribute: name.to_string(),
            expected,
            found: value_tag(value).to_string(),
        });
    }

    match value {
        AttributeValue::N(number) if !is_number(number) => Err(SchemaViolation::InvalidNumber {
            attribute: name.to_string(),
            value: number.clone(),
        }),
        _ => Ok(()),
    }
}

/// Whether `value` is a finite decimal number as `DynamoDB` accepts it
///
/// Rust's float parser also takes `inf` and `NaN`, which `DynamoDB` rejects.
#[must_use]
pub fn is_number(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        && value.parse::<f64>().is_ok_and(f64::is_finite)
}

/// Capacity hints and flags used when creating a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDefinition {
    /// Provisioned read capacity units
    pub read_capacity_units: i64,
    /// Provisioned write capacity units
    pub write_capacity_units: i64,
    /// Whether deletion protection is enabled on the table
    pub deletion_protection: bool,
}

impl Default for TableDefinition {
    fn default() -> Self {
        Self {
            read_capacity_units: DEFAULT_READ_CAPACITY_UNITS,
            write_capacity_units: DEFAULT_WRITE_CAPACITY_UNITS,
            deletion_protection: true,
        }
    }
}

/// Result of an idempotent table creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CreateTableOutcome {
    /// The table was created and is active
    Created,
    /// The table already existed, nothing was changed
    AlreadyExists,
}

/// Everything known about one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Name and key schema
    pub descriptor: TableDescriptor,
    /// Attributes every item must carry
    pub item_schema: ItemSchema,
    /// Creation parameters
    pub definition: TableDefinition,
}

impl TableSchema {
    /// Binds an item schema to a table
    ///
    /// Key attributes are always part of the item schema, so any key attribute
    /// missing from `item_schema` is added with its declared type.
    #[must_use]
    pub fn new(descriptor: TableDescriptor, item_schema: ItemSchema) -> Self {
        let mut item_schema = item_schema;
        for key in descriptor.key_attributes() {
            item_schema
                .attributes
                .entry(key.name.clone())
                .or_insert(key.attribute_type);
        }

        Self {
            descriptor,
            item_schema,
            definition: TableDefinition::default(),
        }
    }

    /// Overrides the creation parameters
    #[must_use]
    pub const fn with_definition(mut self, definition: TableDefinition) -> Self {
        self.definition = definition;
        self
    }

    /// Table name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Fixed set of tables the accessor is allowed to address
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: HashMap<String, TableSchema>,
}

impl TableRegistry {
    /// Builds a registry
    ///
    /// # Errors
    ///
    /// Returns `StorageError::DuplicateTable` if two tables share a name
    pub fn new(tables: impl IntoIterator<Item = TableSchema>) -> StorageResult<Self> {
        let mut registry = Self::default();
        for table in tables {
            let name = table.name().to_string();
            if registry.tables.contains_key(&name) {
                return Err(StorageError::DuplicateTable(name));
            }
            registry.tables.insert(name, table);
        }
        Ok(registry)
    }

    /// Looks up a table by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    /// All registered tables, ordered by name
    #[must_use]
    pub fn tables(&self) -> Vec<&TableSchema> {
        let mut tables: Vec<&TableSchema> = self.tables.values().collect();
        tables.sort_by(|a, b| a.name().cmp(b.name()));
        tables
    }

    /// Number of registered tables
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the registry has no tables
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_table() -> TableSchema {
        TableSchema::new(
            TableDescriptor::new("Users", KeyAttribute::new("server_id", AttributeType::Number))
                .with_sort_key(KeyAttribute::new("user_id", AttributeType::Number)),
            ItemSchema::new("UserItem").attribute("name", AttributeType::String),
        )
    }

    #[test]
    fn test_key_attributes_are_added_to_item_schema() {
        let table = user_table();
        let names: Vec<&str> = table
            .item_schema
            .attributes()
            .keys()
            .map(String::as_str)
            .collect();

        assert_eq!(names, vec!["name", "server_id", "user_id"]);
        assert_eq!(table.definition, TableDefinition::default());
    }

    #[test]
    fn test_validate_item_reports_extra_before_missing() {
        let table = user_table();
        let item = Item::new()
            .number("server_id", 1)
            .string("nickname", "x");

        assert_eq!(
            table.item_schema.validate(&item),
            Err(SchemaViolation::UnexpectedAttribute("nickname".to_string()))
        );
    }

    #[test]
    fn test_validate_item_type_mismatch() {
        let table = user_table();
        let item = Item::new()
            .number("server_id", 1)
            .string("user_id", "2")
            .string("name", "x");

        assert_eq!(
            table.item_schema.validate(&item),
            Err(SchemaViolation::TypeMismatch {
                attribute: "user_id".to_string(),
                expected: AttributeType::Number,
                found: "S".to_string(),
            })
        );
    }

    #[test]
    fn test_validate_item_accepts_exact_shape() {
        let table = user_table();
        let item = Item::new()
            .number("server_id", 1)
            .number("user_id", 2)
            .string("name", "x");

        assert!(table.item_schema.validate(&item).is_ok());
    }

    #[test]
    fn test_validate_key() {
        let descriptor = user_table().descriptor;

        let partial = Key::new().number("server_id", 1);
        assert_eq!(
            descriptor.validate_key(&partial),
            Err(SchemaViolation::MissingKeyAttribute("user_id".to_string()))
        );

        let extra = Key::new()
            .number("server_id", 1)
            .number("user_id", 2)
            .string("name", "x");
        assert_eq!(
            descriptor.validate_key(&extra),
            Err(SchemaViolation::UnexpectedKeyAttribute("name".to_string()))
        );

        let full = Key::new().number("server_id", 1).number("user_id", 2);
        assert!(descriptor.validate_key(&full).is_ok());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = TableRegistry::new([user_table()]).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.get("Users").is_some());
        assert!(registry.get("Servers").is_none());
    }

    #[test]
    fn test_registry_rejects_duplicate_names() {
        let servers = TableSchema::new(
            TableDescriptor::new("Users", KeyAttribute::new("server_id", AttributeType::Number)),
            ItemSchema::new("ServerItem").attribute("channel_id", AttributeType::Number),
        );

        let err = TableRegistry::new([servers, user_table()]).unwrap_err();

        assert!(matches!(err, StorageError::DuplicateTable(name) if name == "Users"));
    }

    #[test]
    fn test_validate_rejects_malformed_numbers() {
        let table = user_table();

        for malformed in ["not-a-number", "", "NaN", "inf", " 1"] {
            let item = Item::new()
                .number("server_id", malformed)
                .number("user_id", 2)
                .string("name", "x");

            assert_eq!(
                table.item_schema.validate(&item),
                Err(SchemaViolation::InvalidNumber {
                    attribute: "server_id".to_string(),
                    value: malformed.to_string(),
                }),
                "{malformed:?}"
            );
        }

        let key = Key::new().number("server_id", 1).number("user_id", "1.5.2");
        assert!(matches!(
            table.descriptor.validate_key(&key),
            Err(SchemaViolation::InvalidNumber { attribute, .. }) if attribute == "user_id"
        ));
    }

    #[test]
    fn test_is_number_accepts_dynamodb_numbers() {
        for number in ["0", "-42", "3.25", "1e10", "-1.5E-3", "12345678901234567890"] {
            assert!(is_number(number), "{number}");
        }
    }
}
