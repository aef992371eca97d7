//! `DynamoDB` table storage for Umbrella
//!
//! This crate provides schema-aware item storage shared by the bot commands,
//! including table routing, write-path validation and paginated reads.

#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    dead_code
)]

pub mod accessor;
pub mod error;
pub mod item;
pub mod schema;
pub mod store;
pub mod tables;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use accessor::TableAccessor;
pub use error::{SchemaViolation, StorageError, StorageResult};
pub use item::{AttributeMap, Item, Key};
pub use schema::{
    AttributeType, CreateTableOutcome, ItemSchema, KeyAttribute, TableDefinition,
    TableDescriptor, TableRegistry, TableSchema,
};
pub use store::{
    ItemStore, Page, Projection, ReadOutcome, ReadRequest, StoreFailure, UpdateRequest,
    CONDITIONAL_CHECK_FAILED,
};
