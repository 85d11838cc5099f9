use crate::collection::Collection;
use crate::errors::{DbError, Result};
use crate::query::Cursor;
use crate::types::Context;
use bson::Document;
use serde::de::DeserializeOwned;

/// Aggregation pipeline bound to a collection; runs when an executor is called.
pub struct Aggregate {
    ctx: Context,
    coll: Collection,
    pipeline: Vec<Document>,
}

impl Aggregate {
    pub(crate) fn new(ctx: Context, coll: Collection, pipeline: Vec<Document>) -> Self {
        Self { ctx, coll, pipeline }
    }

    #[must_use]
    pub fn stages(&self) -> &[Document] {
        &self.pipeline
    }

    /// # Errors
    /// Driver or decode errors.
    pub fn all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let mut out = Vec::new();
        self.iter().all(&mut out)?;
        Ok(out)
    }

    /// First output document.
    ///
    /// # Errors
    /// `NoSuchDocuments` when the pipeline produced nothing; driver or decode errors.
    pub fn one<T: DeserializeOwned>(&self) -> Result<T> {
        let mut cursor = self.iter();
        let first = cursor.try_next()?;
        cursor.close()?;
        first.ok_or(DbError::NoSuchDocuments)
    }

    #[must_use]
    pub fn iter(&self) -> Cursor {
        let opened = self.coll.driver().aggregate(&self.ctx, self.coll.namespace(), &self.pipeline);
        Cursor::new(self.ctx.clone(), opened)
    }
}
