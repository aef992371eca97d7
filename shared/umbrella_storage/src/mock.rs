//! In-memory [`ItemStore`] for tests
//!
//! Keeps items per table, counts calls per operation and can be told to fail
//! the next call of an operation or to serve scripted pages to reads.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use aws_sdk_dynamodb::types::AttributeValue;

use crate::error::Operation;
use crate::item::AttributeMap;
use crate::schema::{CreateTableOutcome, TableRegistry, TableSchema};
use crate::schema::is_number;
use crate::store::{
    ItemStore, Page, Projection, ReadRequest, StoreFailure, UpdateRequest, CONDITIONAL_CHECK_FAILED,
};
use crate::tables::default_registry;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn validation(message: impl Into<String>) -> StoreFailure {
    StoreFailure::new("ValidationException", message)
}

/// Per-operation call counters
#[derive(Debug, Default)]
struct Calls {
    put: AtomicUsize,
    get: AtomicUsize,
    update: AtomicUsize,
    delete: AtomicUsize,
    read: AtomicUsize,
    create: AtomicUsize,
}

/// In-memory store double
#[derive(Debug)]
pub struct InMemoryStore {
    registry: TableRegistry,
    items: Mutex<HashMap<String, BTreeMap<String, AttributeMap>>>,
    created: Mutex<HashSet<String>>,
    scripted_pages: Mutex<VecDeque<Result<Page, StoreFailure>>>,
    failures: Mutex<HashMap<Operation, StoreFailure>>,
    start_keys: Mutex<Vec<Option<AttributeMap>>>,
    page_size: Option<usize>,
    calls: Calls,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Store holding the default `ServerData` and `UserData` tables
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(default_registry().expect("default table names are distinct"))
    }

    /// Store holding the tables of `registry`
    #[must_use]
    pub fn with_registry(registry: TableRegistry) -> Self {
        Self {
            registry,
            items: Mutex::default(),
            created: Mutex::default(),
            scripted_pages: Mutex::default(),
            failures: Mutex::default(),
            start_keys: Mutex::default(),
            page_size: None,
            calls: Calls::default(),
        }
    }

    /// Limits every read page to `page_size` scanned items
    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Queues a page (or failure) to be returned by the next read call
    ///
    /// While scripted pages are queued, reads ignore stored items.
    pub fn push_page(&self, page: Result<Page, StoreFailure>) {
        lock(&self.scripted_pages).push_back(page);
    }

    /// Makes the next call of `operation` fail with `failure`
    pub fn fail_next(&self, operation: Operation, failure: StoreFailure) {
        lock(&self.failures).insert(operation, failure);
    }

    /// Continuation tokens received by read calls, in call order
    #[must_use]
    pub fn start_keys(&self) -> Vec<Option<AttributeMap>> {
        lock(&self.start_keys).clone()
    }

    /// Number of stored items in `table`
    #[must_use]
    pub fn item_count(&self, table: &str) -> usize {
        lock(&self.items).get(table).map_or(0, BTreeMap::len)
    }

    /// Number of put calls
    #[must_use]
    pub fn put_calls(&self) -> usize {
        self.calls.put.load(Ordering::SeqCst)
    }

    /// Number of get calls
    #[must_use]
    pub fn get_calls(&self) -> usize {
        self.calls.get.load(Ordering::SeqCst)
    }

    /// Number of update calls
    #[must_use]
    pub fn update_calls(&self) -> usize {
        self.calls.update.load(Ordering::SeqCst)
    }

    /// Number of delete calls
    #[must_use]
    pub fn delete_calls(&self) -> usize {
        self.calls.delete.load(Ordering::SeqCst)
    }

    /// Number of read page calls
    #[must_use]
    pub fn read_calls(&self) -> usize {
        self.calls.read.load(Ordering::SeqCst)
    }

    /// Number of create table calls
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.calls.create.load(Ordering::SeqCst)
    }

    /// Calls of every operation
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.put_calls()
            + self.get_calls()
            + self.update_calls()
            + self.delete_calls()
            + self.read_calls()
            + self.create_calls()
    }

    fn take_failure(&self, operation: Operation) -> Result<(), StoreFailure> {
        lock(&self.failures).remove(&operation).map_or(Ok(()), Err)
    }

    fn schema(&self, table: &str) -> Result<&TableSchema, StoreFailure> {
        self.registry.get(table).ok_or_else(|| {
            StoreFailure::new(
                "ResourceNotFoundException",
                format!("Requested resource not found: Table: {table} not found"),
            )
        })
    }

    /// Sort position of an item, built from its key attributes
    fn position(schema: &TableSchema, attributes: &AttributeMap) -> Result<String, StoreFailure> {
        let mut parts = Vec::new();
        for key in schema.descriptor.key_attributes() {
            let value = attributes.get(&key.name).ok_or_else(|| {
                validation(format!("Missing the key {} in the item", key.name))
            })?;
            let part = match value {
                AttributeValue::N(number) => sortable_number(number)?,
                AttributeValue::S(string) => string.clone(),
                other => format!("{other:?}"),
            };
            parts.push(part);
        }
        Ok(parts.join("\u{0}"))
    }

    fn key_of(schema: &TableSchema, attributes: &AttributeMap) -> AttributeMap {
        schema
            .descriptor
            .key_attributes()
            .filter_map(|key| {
                attributes
                    .get(&key.name)
                    .map(|value| (key.name.clone(), value.clone()))
            })
            .collect()
    }

    fn read_stored(
        &self,
        table: &str,
        request: &ReadRequest,
        exclusive_start_key: Option<&AttributeMap>,
    ) -> Result<Page, StoreFailure> {
        let schema = self.schema(table)?;
        let key_condition = request
            .key_condition
            .as_deref()
            .map(|expression| Condition::parse(expression, &request.names, &request.values))
            .transpose()?;
        let filter = request
            .filter
            .as_deref()
            .map(|expression| Condition::parse(expression, &request.names, &request.values))
            .transpose()?;
        let start = exclusive_start_key
            .map(|key| Self::position(schema, key))
            .transpose()?;

        let items = lock(&self.items);
        let stored = items.get(table).cloned().unwrap_or_default();
        drop(items);

        let candidates: Vec<AttributeMap> = stored
            .into_iter()
            .filter(|(position, _)| start.as_ref().is_none_or(|start| position > start))
            .map(|(_, item)| item)
            .filter(|item| key_condition.as_ref().is_none_or(|c| c.matches(item)))
            .collect();

        let limit = self.page_size.unwrap_or(usize::MAX);
        let more = candidates.len() > limit;
        let scanned: Vec<AttributeMap> = candidates.into_iter().take(limit).collect();
        let last_evaluated_key = if more {
            scanned.last().map(|item| Self::key_of(schema, item))
        } else {
            None
        };
        let scanned_count = scanned.len();

        let items = scanned
            .into_iter()
            .filter(|item| filter.as_ref().is_none_or(|f| f.matches(item)))
            .map(|item| project(item, request.projection.as_deref(), &request.names))
            .collect();

        Ok(Page {
            items,
            last_evaluated_key,
            scanned_count,
        })
    }
}

/// Encodes a number so that string order follows numeric order
///
/// Uses the IEEE 754 bit pattern with the sign bit flipped for positives and
/// every bit flipped for negatives. Precision beyond `f64` is not kept.
fn sortable_number(number: &str) -> Result<String, StoreFailure> {
    let value = number
        .parse::<f64>()
        .ok()
        .filter(|_| is_number(number))
        .ok_or_else(|| {
            validation(format!(
                "The parameter cannot be converted to a numeric value: {number}"
            ))
        })?;
    // -0 and 0 are the same key
    let value = value + 0.0;
    let bits = value.to_bits();
    let ordered = if value.is_sign_negative() {
        !bits
    } else {
        bits | (1 << 63)
    };
    Ok(format!("{ordered:016x}"))
}

/// Resolves a `#placeholder` through `names`
fn resolve_name(token: &str, names: &HashMap<String, String>) -> Result<String, StoreFailure> {
    if token.starts_with('#') {
        names
            .get(token)
            .cloned()
            .ok_or_else(|| validation(format!("Unresolved attribute name {token}")))
    } else {
        Ok(token.to_string())
    }
}

fn project(item: AttributeMap, projection: Option<&str>, names: &HashMap<String, String>) -> AttributeMap {
    let Some(projection) = projection else {
        return item;
    };
    let wanted: HashSet<String> = projection
        .split(',')
        .map(str::trim)
        .filter_map(|token| resolve_name(token, names).ok())
        .collect();
    item.into_iter()
        .filter(|(name, _)| wanted.contains(name))
        .collect()
}

/// One clause of a condition
enum Clause {
    Equals(String, AttributeValue),
    Exists(String),
    NotExists(String),
}

/// Conjunction of `attribute = :value`, `attribute_exists(attribute)` and
/// `attribute_not_exists(attribute)` clauses
struct Condition(Vec<Clause>);

impl Condition {
    fn parse(
        expression: &str,
        names: &HashMap<String, String>,
        values: &AttributeMap,
    ) -> Result<Self, StoreFailure> {
        let mut clauses = Vec::new();
        for clause in split_keyword(expression, "and") {
            if let Some(name) = function_argument(clause, "attribute_exists") {
                clauses.push(Clause::Exists(resolve_name(name, names)?));
                continue;
            }
            if let Some(name) = function_argument(clause, "attribute_not_exists") {
                clauses.push(Clause::NotExists(resolve_name(name, names)?));
                continue;
            }

            let (name, placeholder) = clause
                .split_once('=')
                .ok_or_else(|| validation(format!("Unsupported condition: {clause}")))?;
            let name = resolve_name(name.trim(), names)?;
            let placeholder = placeholder.trim();
            let value = values
                .get(placeholder)
                .cloned()
                .ok_or_else(|| validation(format!("Unresolved attribute value {placeholder}")))?;
            clauses.push(Clause::Equals(name, value));
        }
        Ok(Self(clauses))
    }

    fn matches(&self, item: &AttributeMap) -> bool {
        self.0.iter().all(|clause| match clause {
            Clause::Equals(name, value) => item.get(name) == Some(value),
            Clause::Exists(name) => item.contains_key(name),
            Clause::NotExists(name) => !item.contains_key(name),
        })
    }
}

/// Argument of `function(argument)`, if `clause` is a call of `function`
fn function_argument<'a>(clause: &'a str, function: &str) -> Option<&'a str> {
    clause
        .trim()
        .strip_prefix(function)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
        .map(str::trim)
}

/// Splits on a whitespace-delimited keyword, case-insensitively
fn split_keyword<'a>(expression: &'a str, keyword: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut rest = expression;
    loop {
        let lower = rest.to_lowercase();
        match lower.find(&format!(" {keyword} ")) {
            Some(index) => {
                parts.push(rest[..index].trim());
                rest = &rest[index + keyword.len() + 2..];
            }
            None => {
                parts.push(rest.trim());
                return parts;
            }
        }
    }
}

/// Parses `SET a = :v, #b = :w` into attribute assignments
fn parse_set(
    update_expression: &str,
    names: &HashMap<String, String>,
    values: &AttributeMap,
) -> Result<Vec<(String, AttributeValue)>, StoreFailure> {
    let trimmed = update_expression.trim();
    let body = trimmed
        .get(..3)
        .filter(|prefix| prefix.eq_ignore_ascii_case("set"))
        .map(|_| &trimmed[3..])
        .ok_or_else(|| validation(format!("Unsupported update expression: {update_expression}")))?;

    body.split(',')
        .map(|assignment| {
            let (name, placeholder) = assignment
                .split_once('=')
                .ok_or_else(|| validation(format!("Unsupported assignment: {assignment}")))?;
            let name = resolve_name(name.trim(), names)?;
            let placeholder = placeholder.trim();
            let value = values
                .get(placeholder)
                .cloned()
                .ok_or_else(|| validation(format!("Unresolved attribute value {placeholder}")))?;
            Ok((name, value))
        })
        .collect()
}

#[async_trait::async_trait]
impl ItemStore for InMemoryStore {
    async fn put_item(&self, table: &str, item: AttributeMap) -> Result<(), StoreFailure> {
        self.calls.put.fetch_add(1, Ordering::SeqCst);
        self.take_failure(Operation::PutItem)?;

        let schema = self.schema(table)?;
        let position = Self::position(schema, &item)?;
        lock(&self.items)
            .entry(table.to_string())
            .or_default()
            .insert(position, item);
        Ok(())
    }

    async fn get_item(
        &self,
        table: &str,
        key: AttributeMap,
        projection: Option<&Projection>,
    ) -> Result<Option<AttributeMap>, StoreFailure> {
        self.calls.get.fetch_add(1, Ordering::SeqCst);
        self.take_failure(Operation::GetItem)?;

        let schema = self.schema(table)?;
        let position = Self::position(schema, &key)?;
        let item = lock(&self.items)
            .get(table)
            .and_then(|items| items.get(&position))
            .cloned();

        Ok(item.map(|item| match projection {
            Some(projection) => project(item, Some(projection.expression.as_str()), &projection.names),
            None => item,
        }))
    }

    async fn update_item(
        &self,
        table: &str,
        key: AttributeMap,
        request: &UpdateRequest,
    ) -> Result<Option<AttributeMap>, StoreFailure> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        self.take_failure(Operation::UpdateItem)?;

        let schema = self.schema(table)?;
        let position = Self::position(schema, &key)?;
        let assignments = parse_set(&request.update_expression, &request.names, &request.values)?;
        let condition = request
            .condition
            .as_deref()
            .map(|expression| Condition::parse(expression, &request.names, &request.values))
            .transpose()?;

        let mut items = lock(&self.items);
        let stored = items.entry(table.to_string()).or_default();
        if let Some(condition) = condition {
            let current = stored.get(&position).cloned().unwrap_or_default();
            if !condition.matches(&current) {
                return Err(StoreFailure::new(
                    CONDITIONAL_CHECK_FAILED,
                    "The conditional request failed",
                ));
            }
        }

        let item = stored.entry(position).or_insert(key);
        for (name, value) in assignments {
            item.insert(name, value);
        }
        Ok(Some(item.clone()))
    }

    async fn delete_item(
        &self,
        table: &str,
        key: AttributeMap,
    ) -> Result<Option<AttributeMap>, StoreFailure> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        self.take_failure(Operation::DeleteItem)?;

        let schema = self.schema(table)?;
        let position = Self::position(schema, &key)?;
        Ok(lock(&self.items)
            .get_mut(table)
            .and_then(|items| items.remove(&position)))
    }

    async fn read_page(
        &self,
        table: &str,
        request: &ReadRequest,
        exclusive_start_key: Option<AttributeMap>,
    ) -> Result<Page, StoreFailure> {
        self.calls.read.fetch_add(1, Ordering::SeqCst);
        lock(&self.start_keys).push(exclusive_start_key.clone());
        self.take_failure(request.operation())?;

        if let Some(page) = lock(&self.scripted_pages).pop_front() {
            return page;
        }
        self.read_stored(table, request, exclusive_start_key.as_ref())
    }

    async fn create_table(&self, table: &TableSchema) -> Result<CreateTableOutcome, StoreFailure> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        self.take_failure(Operation::CreateTable)?;

        if lock(&self.created).insert(table.name().to_string()) {
            Ok(CreateTableOutcome::Created)
        } else {
            Ok(CreateTableOutcome::AlreadyExists)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(value: &str) -> AttributeValue {
        AttributeValue::N(value.to_string())
    }

    #[test]
    fn test_split_keyword_is_case_insensitive() {
        assert_eq!(
            split_keyword("a = :a AND b = :b and c = :c", "and"),
            vec!["a = :a", "b = :b", "c = :c"]
        );
    }

    #[test]
    fn test_parse_set_resolves_placeholders() {
        let names = HashMap::from([("#r".to_string(), "registered".to_string())]);
        let values = HashMap::from([
            (":v".to_string(), AttributeValue::S("xyz".to_string())),
            (":r".to_string(), AttributeValue::S("now".to_string())),
        ]);

        let assignments = parse_set("set minecraft_user_id = :v, #r = :r", &names, &values).unwrap();

        assert_eq!(
            assignments,
            vec![
                (
                    "minecraft_user_id".to_string(),
                    AttributeValue::S("xyz".to_string())
                ),
                ("registered".to_string(), AttributeValue::S("now".to_string())),
            ]
        );
    }

    #[test]
    fn test_parse_set_rejects_other_clauses() {
        let err = parse_set("remove minecraft_user_id", &HashMap::new(), &HashMap::new()).unwrap_err();

        assert_eq!(err.code, "ValidationException");
    }

    #[test]
    fn test_number_positions_follow_numeric_order() {
        let numbers = ["-10", "-2.5", "-0", "0", "0.5", "2", "10", "1e3"];
        let positions: Vec<String> = numbers
            .iter()
            .map(|number| sortable_number(number).unwrap())
            .collect();

        let mut sorted = positions.clone();
        sorted.sort();
        assert_eq!(positions, sorted);
        assert_eq!(positions[2], positions[3]);
        assert_eq!(sortable_number("10").unwrap(), sortable_number("1e1").unwrap());
    }

    #[test]
    fn test_number_positions_reject_malformed_numbers() {
        for malformed in ["abc", "inf", "NaN", ""] {
            let err = sortable_number(malformed).unwrap_err();
            assert_eq!(err.code, "ValidationException", "{malformed:?}");
        }
    }

    #[test]
    fn test_condition_existence_clauses() {
        let names = HashMap::from([("#sid".to_string(), "server_id".to_string())]);
        let item = HashMap::from([("server_id".to_string(), n("1"))]);

        let exists = Condition::parse("attribute_exists(#sid)", &names, &HashMap::new()).unwrap();
        let missing =
            Condition::parse("attribute_not_exists( user_id )", &names, &HashMap::new()).unwrap();

        assert!(exists.matches(&item));
        assert!(!exists.matches(&HashMap::new()));
        assert!(missing.matches(&item));
    }

    #[tokio::test]
    async fn test_failed_condition_does_not_write() {
        let store = InMemoryStore::new();
        let request = UpdateRequest::new("SET minecraft_user_id = :mc")
            .condition("attribute_exists(server_id)")
            .value(":mc", AttributeValue::S("xyz".to_string()));
        let key = HashMap::from([
            ("server_id".to_string(), n("1")),
            ("user_id".to_string(), n("2")),
        ]);

        let err = store.update_item("UserData", key, &request).await.unwrap_err();

        assert_eq!(err.code, CONDITIONAL_CHECK_FAILED);
        assert_eq!(store.item_count("UserData"), 0);
    }

    #[tokio::test]
    async fn test_natural_pagination_orders_negative_and_decimal_keys() {
        let store = InMemoryStore::new();
        for server_id in ["10", "-3", "2.5", "-20"] {
            store
                .put_item(
                    "ServerData",
                    HashMap::from([
                        ("server_id".to_string(), n(server_id)),
                        ("server_status_channel_id".to_string(), n("1")),
                    ]),
                )
                .await
                .unwrap();
        }

        let page = store.read_page("ServerData", &ReadRequest::scan(), None).await.unwrap();
        let ids: Vec<&AttributeValue> = page
            .items
            .iter()
            .filter_map(|item| item.get("server_id"))
            .collect();

        assert_eq!(ids, vec![&n("-20"), &n("-3"), &n("2.5"), &n("10")]);
    }

    #[tokio::test]
    async fn test_natural_pagination_follows_key_order() {
        let store = InMemoryStore::new().with_page_size(2);
        for user_id in ["3", "1", "2"] {
            store
                .put_item(
                    "UserData",
                    HashMap::from([
                        ("server_id".to_string(), n("1")),
                        ("user_id".to_string(), n(user_id)),
                    ]),
                )
                .await
                .unwrap();
        }

        let first = store.read_page("UserData", &ReadRequest::scan(), None).await.unwrap();
        assert_eq!(first.scanned_count, 2);
        assert_eq!(first.items[0].get("user_id"), Some(&n("1")));

        let second = store
            .read_page("UserData", &ReadRequest::scan(), first.last_evaluated_key)
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].get("user_id"), Some(&n("3")));
        assert!(second.last_evaluated_key.is_none());
    }
}
