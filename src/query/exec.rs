use crate::collection::Collection;
use crate::driver::{CountOptions, FindAndModifyOptions, FindOptions, Hint};
use crate::errors::{DbError, Result};
use crate::middleware::Docs;
use crate::model::Model;
use crate::types::{Context, OpType};
use bson::{Bson, Document};
use serde::de::DeserializeOwned;

use super::builder::FilterBuilder;
use super::cursor::Cursor;
use super::parse::{parse_select_field, parse_sort_field};
use super::types::{Change, ChangeMode, Clause, ProjectionSpec, SortSpec, projection_document, sort_document};

/// Chainable query over one collection.
///
/// Builder methods consume and return the query; executors borrow it mutably
/// because they run query hooks on the attached hook object.
pub struct Query {
    filter: FilterBuilder,
    sort: Vec<SortSpec>,
    project: Vec<ProjectionSpec>,
    hint: Option<Hint>,
    limit: Option<i64>,
    skip: Option<u64>,
    batch_size: Option<u32>,
    ctx: Context,
    coll: Collection,
    hook: Option<Box<dyn Model + Send>>,
}

impl Query {
    pub(crate) fn new(ctx: Context, coll: Collection) -> Self {
        Self {
            filter: FilterBuilder::new(),
            sort: Vec::new(),
            project: Vec::new(),
            hint: None,
            limit: None,
            skip: None,
            batch_size: None,
            ctx,
            coll,
            hook: None,
        }
    }

    #[must_use]
    pub fn where_<I, K, V>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Bson>,
    {
        self.filter = self.filter.where_(conditions);
        self
    }

    #[must_use]
    pub fn and_where<I, K, V>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Bson>,
    {
        self.filter = self.filter.and_where(conditions);
        self
    }

    #[must_use]
    pub fn or_where<I, K, V>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Bson>,
    {
        self.filter = self.filter.or_where(conditions);
        self
    }

    /// Appends sort keys, e.g. `["age", "name desc"]`.
    ///
    /// # Panics
    /// On an empty field name, which is a programming error.
    #[must_use]
    pub fn sort<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for f in fields {
            match parse_sort_field(f.as_ref()) {
                Ok(spec) => self.sort.push(spec),
                Err(e) => panic!("Sort: {e}"),
            }
        }
        self
    }

    /// Appends projection entries, e.g. `["name", "!password"]`.
    ///
    /// # Panics
    /// On an empty field name, which is a programming error.
    #[must_use]
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for f in fields {
            match parse_select_field(f.as_ref()) {
                Ok(spec) => self.project.push(spec),
                Err(e) => panic!("Select: {e}"),
            }
        }
        self
    }

    #[must_use]
    pub const fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    /// Zero means no limit; a negative value returns at most `|n|` documents in one batch.
    #[must_use]
    pub const fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    #[must_use]
    pub const fn batch_size(mut self, n: u32) -> Self {
        self.batch_size = Some(n);
        self
    }

    #[must_use]
    pub fn hint(mut self, hint: Hint) -> Self {
        self.hint = Some(hint);
        self
    }

    /// Object whose `OperationHook` receives `before_query` / `after_query`.
    #[must_use]
    pub fn hook<H: Model + Send + 'static>(mut self, hook: H) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub const fn clause(&self) -> Option<&Clause> {
        self.filter.clause()
    }

    #[must_use]
    pub fn filter_document(&self) -> Document {
        self.filter.to_document()
    }

    #[must_use]
    pub fn find_options(&self) -> FindOptions {
        FindOptions {
            sort: (!self.sort.is_empty()).then(|| sort_document(&self.sort)),
            projection: (!self.project.is_empty()).then(|| projection_document(&self.project)),
            skip: self.skip,
            limit: self.limit,
            batch_size: self.batch_size,
            hint: self.hint.clone(),
        }
    }

    fn run_hook(&mut self, op: OpType) -> Result<()> {
        let mut docs = match self.hook.as_deref_mut() {
            Some(h) => Docs::One(h),
            None => Docs::Empty,
        };
        self.coll.pipeline().run(&self.ctx, &mut docs, op, &[])
    }

    /// First matching document (honouring sort, projection, skip and hint).
    ///
    /// # Errors
    /// `NoSuchDocuments` when nothing matches; hook, driver or decode errors.
    pub fn one<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.run_hook(OpType::BeforeQuery)?;
        let mut opts = self.find_options();
        opts.limit = None;
        opts.batch_size = None;
        let found = self.coll.driver().find_one(&self.ctx, self.coll.namespace(), &self.filter_document(), &opts)?;
        let doc = found.ok_or(DbError::NoSuchDocuments)?;
        let out = bson::deserialize_from_document(doc)?;
        self.run_hook(OpType::AfterQuery)?;
        Ok(out)
    }

    /// Every matching document.
    ///
    /// # Errors
    /// Hook, driver or decode errors.
    pub fn all<T: DeserializeOwned>(&mut self) -> Result<Vec<T>> {
        self.run_hook(OpType::BeforeQuery)?;
        let mut out = Vec::new();
        self.cursor().all(&mut out)?;
        self.run_hook(OpType::AfterQuery)?;
        Ok(out)
    }

    /// # Errors
    /// Driver errors.
    pub fn count(&self) -> Result<u64> {
        let opts = CountOptions { skip: self.skip, limit: self.limit };
        self.coll.driver().count(&self.ctx, self.coll.namespace(), &self.filter_document(), &opts)
    }

    /// Distinct values of `key` among matching documents, decoded as `T`.
    ///
    /// # Errors
    /// `QueryResultTypeInconsistent` when a value does not decode as `T`; driver errors.
    pub fn distinct<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let values = self.coll.driver().distinct(&self.ctx, self.coll.namespace(), key, &self.filter_document())?;
        values
            .into_iter()
            .map(|v| {
                bson::deserialize_from_bson(v).map_err(|e| {
                    log::debug!("distinct {key}: value does not decode: {e}");
                    DbError::QueryResultTypeInconsistent
                })
            })
            .collect()
    }

    /// Untyped form of [`Query::distinct`]: `result` must already be an array,
    /// which is then replaced by the distinct values.
    ///
    /// # Errors
    /// `QueryNotSlicePointer` (without touching the driver) when `result` is not an array.
    pub fn distinct_into(&self, key: &str, result: &mut Bson) -> Result<()> {
        if !matches!(result, Bson::Array(_)) {
            return Err(DbError::QueryNotSlicePointer);
        }
        let values = self.coll.driver().distinct(&self.ctx, self.coll.namespace(), key, &self.filter_document())?;
        *result = Bson::Array(values);
        Ok(())
    }

    /// Lazy result stream. No query hooks run.
    #[must_use]
    pub fn cursor(&self) -> Cursor {
        let opened = self.coll.driver().find(&self.ctx, self.coll.namespace(), &self.filter_document(), &self.find_options());
        Cursor::new(self.ctx.clone(), opened)
    }

    /// Atomic find-and-modify. Returns the document before the change, or after
    /// it when `return_new` is set.
    ///
    /// # Errors
    /// - `ReplacementContainUpdateOperators` / `UpdateRequiresOperators` for a payload of the wrong shape;
    /// - `NoSuchDocuments` when nothing matched, except for an upsert that did not
    ///   ask for the new document, which yields `Ok(None)`.
    pub fn apply<T: DeserializeOwned>(&mut self, change: Change) -> Result<Option<T>> {
        let mode = change.mode();
        let filter = self.filter_document();
        let opts = FindAndModifyOptions {
            sort: (!self.sort.is_empty()).then(|| sort_document(&self.sort)),
            projection: (!self.project.is_empty()).then(|| projection_document(&self.project)),
            upsert: change.upsert,
            return_new: change.return_new,
        };
        let driver = self.coll.driver();
        let ns = self.coll.namespace();
        let found = match mode {
            ChangeMode::Remove => {
                let opts = FindAndModifyOptions { upsert: false, return_new: false, ..opts };
                driver.find_one_and_delete(&self.ctx, ns, &filter, &opts)?
            }
            ChangeMode::Replace => {
                if change.update.keys().any(|k| k.starts_with('$')) {
                    return Err(DbError::ReplacementContainUpdateOperators);
                }
                driver.find_one_and_replace(&self.ctx, ns, &filter, change.update, &opts)?
            }
            ChangeMode::Update => {
                if change.update.is_empty() || change.update.keys().any(|k| !k.starts_with('$')) {
                    return Err(DbError::UpdateRequiresOperators);
                }
                driver.find_one_and_update(&self.ctx, ns, &filter, &change.update, &opts)?
            }
        };
        match found {
            Some(doc) => Ok(Some(bson::deserialize_from_document(doc)?)),
            None if mode != ChangeMode::Remove && change.upsert && !change.return_new => Ok(None),
            None => Err(DbError::NoSuchDocuments),
        }
    }
}
