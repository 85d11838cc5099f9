//! Document ODM helpers: a shorthand filter compiler (`"age >="`, `"role in"`, ...)
//! with left-nested AND/OR composition, and an ordered middleware pipeline that
//! fills default and custom metadata fields, runs operation hooks and validates
//! documents around every database call.
//!
//! The database itself sits behind [`driver::Driver`]; [`driver::memory`] ships
//! an in-process implementation.

pub mod aggregate;
pub mod collection;
pub mod connection;
pub mod database;
pub mod driver;
pub mod errors;
pub mod field;
pub mod hook;
pub mod logger;
pub mod middleware;
pub mod model;
pub mod query;
pub mod types;
pub mod util;
pub mod validator;

pub use aggregate::Aggregate;
pub use collection::Collection;
pub use connection::{ClientOptions, Config, Connection, Session};
pub use database::Database;
pub use driver::IndexModel;
pub use errors::{DbError, Result};
pub use field::{CustomFieldHook, CustomFields, DefaultField, DefaultFieldHook, FieldAccess, FieldMut};
pub use hook::OperationHook;
pub use middleware::{Docs, Pipeline};
pub use model::Model;
pub use query::{Change, Cursor, Query};
pub use types::{Context, OpType, SessionId};
pub use validator::Validate;
