//! The boundary to the underlying document-database client.
//!
//! Everything above this module speaks in `bson::Document`s and the option
//! structs defined here. A driver never decodes into user types and reports an
//! empty single-document result as `Ok(None)`.

pub mod memory;

use crate::connection::ClientOptions;
use crate::errors::{DbError, Result};
use crate::types::{Context, SessionId};
use bson::{Bson, Document};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self { database: database.into(), collection: collection.into() }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Index hint: an index name or its key document.
#[derive(Debug, Clone, PartialEq)]
pub enum Hint {
    Name(String),
    Keys(Document),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<Document>,
    pub projection: Option<Document>,
    pub skip: Option<u64>,
    /// Negative values mean "at most |n| in a single batch"; zero means no limit.
    pub limit: Option<i64>,
    pub batch_size: Option<u32>,
    pub hint: Option<Hint>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountOptions {
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub upsert: bool,
    pub multi: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindAndModifyOptions {
    pub sort: Option<Document>,
    pub projection: Option<Document>,
    pub upsert: bool,
    /// Return the document as it is after the change instead of before.
    pub return_new: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    pub inserted_id: Bson,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertManyResult {
    pub inserted_ids: Vec<Bson>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    pub matched: u64,
    pub modified: u64,
    pub upserted_id: Option<Bson>,
}

impl UpdateReport {
    #[must_use]
    pub const fn upserted_count(&self) -> u64 {
        if self.upserted_id.is_some() { 1 } else { 0 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: u64,
}

/// Index definition. Key fields prefixed with `-` sort descending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexModel {
    pub key: Vec<String>,
    /// Defaults to the key fields and directions joined by `_`, e.g. `age_-1_name_1`.
    pub name: Option<String>,
    pub unique: bool,
    /// Skip documents that carry none of the key fields.
    pub sparse: bool,
}

impl IndexModel {
    pub fn new<I, S>(key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { key: key.into_iter().map(Into::into).collect(), ..Self::default() }
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub const fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn fields(&self) -> Result<Vec<(&str, i32)>> {
        if self.key.is_empty() {
            return Err(DbError::Driver("BadValue: index key pattern must not be empty".into()));
        }
        let mut out: Vec<(&str, i32)> = Vec::with_capacity(self.key.len());
        for k in &self.key {
            let (field, dir) = match k.strip_prefix('-') {
                Some(rest) => (rest, -1),
                None => (k.as_str(), 1),
            };
            if field.is_empty() {
                return Err(DbError::EmptyFieldName("index"));
            }
            if out.iter().any(|(f, _)| *f == field) {
                return Err(DbError::Driver(format!("BadValue: duplicate index key field {field:?}")));
            }
            out.push((field, dir));
        }
        Ok(out)
    }

    /// Key pattern as the server expects it: `{field: 1 | -1}` in key order.
    ///
    /// # Errors
    /// An empty key list, an empty field name or a repeated field.
    pub fn keys_document(&self) -> Result<Document> {
        let mut out = Document::new();
        for (field, dir) in self.fields()? {
            out.insert(field, dir);
        }
        Ok(out)
    }

    /// The explicit name, else the generated one.
    ///
    /// # Errors
    /// As [`IndexModel::keys_document`].
    pub fn index_name(&self) -> Result<String> {
        let fields = self.fields()?;
        Ok(match &self.name {
            Some(name) => name.clone(),
            None => fields.iter().map(|(f, d)| format!("{f}_{d}")).collect::<Vec<_>>().join("_"),
        })
    }
}

/// Server-side result stream.
pub trait RawCursor: Send {
    /// # Errors
    /// Transport failure or a cancelled context.
    fn next_document(&mut self, ctx: &Context) -> Result<Option<Document>>;
    /// # Errors
    /// Transport failure while releasing server resources.
    fn close(&mut self) -> Result<()>;
}

/// Operations the ODM layer needs from a client. All calls honour `ctx`.
pub trait Driver: Send + Sync {
    fn ping(&self, ctx: &Context) -> Result<()>;
    fn disconnect(&self, ctx: &Context) -> Result<()>;
    fn server_version(&self, ctx: &Context) -> Result<String>;

    fn insert_one(&self, ctx: &Context, ns: &Namespace, doc: Document) -> Result<InsertOneResult>;
    fn insert_many(&self, ctx: &Context, ns: &Namespace, docs: Vec<Document>) -> Result<InsertManyResult>;
    fn update(
        &self,
        ctx: &Context,
        ns: &Namespace,
        filter: &Document,
        update: &Document,
        opts: &UpdateOptions,
    ) -> Result<UpdateReport>;
    fn replace_one(
        &self,
        ctx: &Context,
        ns: &Namespace,
        filter: &Document,
        replacement: Document,
        opts: &UpdateOptions,
    ) -> Result<UpdateReport>;
    fn delete(&self, ctx: &Context, ns: &Namespace, filter: &Document, multi: bool) -> Result<DeleteReport>;

    fn find(&self, ctx: &Context, ns: &Namespace, filter: &Document, opts: &FindOptions) -> Result<Box<dyn RawCursor>>;
    fn find_one(&self, ctx: &Context, ns: &Namespace, filter: &Document, opts: &FindOptions) -> Result<Option<Document>>;
    fn count(&self, ctx: &Context, ns: &Namespace, filter: &Document, opts: &CountOptions) -> Result<u64>;
    fn distinct(&self, ctx: &Context, ns: &Namespace, key: &str, filter: &Document) -> Result<Vec<Bson>>;

    fn find_one_and_delete(
        &self,
        ctx: &Context,
        ns: &Namespace,
        filter: &Document,
        opts: &FindAndModifyOptions,
    ) -> Result<Option<Document>>;
    fn find_one_and_replace(
        &self,
        ctx: &Context,
        ns: &Namespace,
        filter: &Document,
        replacement: Document,
        opts: &FindAndModifyOptions,
    ) -> Result<Option<Document>>;
    fn find_one_and_update(
        &self,
        ctx: &Context,
        ns: &Namespace,
        filter: &Document,
        update: &Document,
        opts: &FindAndModifyOptions,
    ) -> Result<Option<Document>>;

    fn aggregate(&self, ctx: &Context, ns: &Namespace, pipeline: &[Document]) -> Result<Box<dyn RawCursor>>;

    /// Runs a raw command document against `database` and returns the reply.
    fn run_command(&self, ctx: &Context, database: &str, command: &Document) -> Result<Document>;

    /// Creates the indexes and returns their names in input order.
    fn create_indexes(&self, ctx: &Context, ns: &Namespace, models: &[IndexModel]) -> Result<Vec<String>>;
    fn list_indexes(&self, ctx: &Context, ns: &Namespace) -> Result<Vec<Document>>;

    fn create_collection(&self, ctx: &Context, ns: &Namespace) -> Result<()>;
    fn drop_collection(&self, ctx: &Context, ns: &Namespace) -> Result<()>;
    fn drop_database(&self, ctx: &Context, database: &str) -> Result<()>;

    fn start_transaction(&self, ctx: &Context, session: SessionId) -> Result<()>;
    fn commit_transaction(&self, ctx: &Context, session: SessionId) -> Result<()>;
    fn abort_transaction(&self, ctx: &Context, session: SessionId) -> Result<()>;
}

/// Builds a connected driver from client options.
pub trait Connector: Send + Sync {
    /// # Errors
    /// The driver could not be constructed or reached.
    fn connect(&self, ctx: &Context, opts: &ClientOptions) -> Result<Arc<dyn Driver>>;
}
