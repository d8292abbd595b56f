//! clipstash - clipboard history record store
//!
//! Persists clipboard records in SQLite and queries them through a fluent
//! builder. Filters run either as a WHERE clause pushed to SQLite or as an
//! in-memory predicate over a full scan; both return the same rows in the
//! same order.

pub mod codec;
pub mod database;
pub mod filter;
pub mod interface;
pub mod models;
pub mod query;
mod store;

pub use filter::FilterStrategy;
pub use interface::*;
pub use query::{ClipboardQueryBuilder, Condition, Field, Operator, QueryDescriptor, Value};
pub use store::{RecordStore, StoreOptions, StoreState, DEFAULT_FILE_NAME};
