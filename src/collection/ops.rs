use super::core::Collection;
use crate::driver::{DeleteReport, InsertManyResult, InsertOneResult, UpdateOptions, UpdateReport};
use crate::errors::{DbError, Result};
use crate::middleware::Docs;
use crate::model::Model;
use crate::types::{Context, OpType};
use bson::{Bson, Document, doc};
use serde::Serialize;

fn check_replacement(doc: &Document) -> Result<()> {
    if doc.keys().any(|k| k.starts_with('$')) {
        return Err(DbError::ReplacementContainUpdateOperators);
    }
    Ok(())
}

fn check_update(update: &Document) -> Result<()> {
    if update.is_empty() || update.keys().any(|k| !k.starts_with('$')) {
        return Err(DbError::UpdateRequiresOperators);
    }
    Ok(())
}

impl Collection {
    /// Inserts one document. Before/after-insert middleware run on `doc`, so
    /// default fields are filled in place before it is encoded.
    ///
    /// # Errors
    /// Middleware, encode or driver errors (`is_dup()` for a duplicate `_id`).
    pub fn insert_one<T: Model + Serialize>(&self, ctx: &Context, doc: &mut T) -> Result<InsertOneResult> {
        self.pipeline().run(ctx, &mut Docs::one(doc), OpType::BeforeInsert, &[])?;
        let encoded = bson::serialize_to_document(&*doc)?;
        let res = self.driver().insert_one(ctx, self.namespace(), encoded)?;
        self.pipeline().run(ctx, &mut Docs::one(doc), OpType::AfterInsert, &[])?;
        Ok(res)
    }

    /// # Errors
    /// `NotValidSliceToInsert` for an empty slice; otherwise as [`Collection::insert_one`].
    pub fn insert_many<T: Model + Serialize>(&self, ctx: &Context, docs: &mut [T]) -> Result<InsertManyResult> {
        if docs.is_empty() {
            return Err(DbError::NotValidSliceToInsert);
        }
        self.pipeline().run(ctx, &mut Docs::many(docs), OpType::BeforeInsert, &[])?;
        let encoded = docs
            .iter()
            .map(|d| bson::serialize_to_document(d))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let res = self.driver().insert_many(ctx, self.namespace(), encoded)?;
        self.pipeline().run(ctx, &mut Docs::many(docs), OpType::AfterInsert, &[])?;
        Ok(res)
    }

    /// Inserts `doc` as is and runs the insert middleware on `hook` instead, for
    /// callers whose document type carries no hooks of its own.
    ///
    /// # Errors
    /// Middleware (from `hook`), encode or driver errors.
    pub fn insert_one_with_hook<T: Serialize>(
        &self,
        ctx: &Context,
        doc: &T,
        hook: &mut dyn Model,
    ) -> Result<InsertOneResult> {
        self.pipeline().run(ctx, &mut Docs::One(&mut *hook), OpType::BeforeInsert, &[])?;
        let encoded = bson::serialize_to_document(doc)?;
        let res = self.driver().insert_one(ctx, self.namespace(), encoded)?;
        self.pipeline().run(ctx, &mut Docs::One(hook), OpType::AfterInsert, &[])?;
        Ok(res)
    }

    /// [`Collection::insert_many`] with the middleware run once on `hook`.
    ///
    /// # Errors
    /// `NotValidSliceToInsert` for an empty slice; otherwise as [`Collection::insert_one_with_hook`].
    pub fn insert_many_with_hook<T: Serialize>(
        &self,
        ctx: &Context,
        docs: &[T],
        hook: &mut dyn Model,
    ) -> Result<InsertManyResult> {
        if docs.is_empty() {
            return Err(DbError::NotValidSliceToInsert);
        }
        self.pipeline().run(ctx, &mut Docs::One(&mut *hook), OpType::BeforeInsert, &[])?;
        let encoded = docs
            .iter()
            .map(|d| bson::serialize_to_document(d))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let res = self.driver().insert_many(ctx, self.namespace(), encoded)?;
        self.pipeline().run(ctx, &mut Docs::One(hook), OpType::AfterInsert, &[])?;
        Ok(res)
    }

    /// Replaces the first match of `filter` with `doc`, inserting it when nothing matches.
    ///
    /// # Errors
    /// `ReplacementContainUpdateOperators` when `doc` encodes `$` keys; middleware or driver errors.
    pub fn upsert<T: Model + Serialize>(&self, ctx: &Context, filter: &Document, doc: &mut T) -> Result<UpdateReport> {
        let opts = UpdateOptions { upsert: true, multi: false };
        self.pipeline().run(ctx, &mut Docs::one(doc), OpType::BeforeUpsert, &[&opts])?;
        let encoded = bson::serialize_to_document(&*doc)?;
        check_replacement(&encoded)?;
        let res = self.driver().replace_one(ctx, self.namespace(), filter, encoded, &opts)?;
        self.pipeline().run(ctx, &mut Docs::one(doc), OpType::AfterUpsert, &[&opts])?;
        Ok(res)
    }

    /// [`Collection::upsert`] keyed on `_id`.
    ///
    /// # Errors
    /// As [`Collection::upsert`].
    pub fn upsert_id<T: Model + Serialize>(&self, ctx: &Context, id: impl Into<Bson>, doc: &mut T) -> Result<UpdateReport> {
        self.upsert(ctx, &doc! {"_id": id.into()}, doc)
    }

    /// # Errors
    /// `NoSuchDocuments` when nothing matched; `ReplacementContainUpdateOperators`;
    /// middleware or driver errors.
    pub fn replace_one<T: Model + Serialize>(&self, ctx: &Context, filter: &Document, doc: &mut T) -> Result<()> {
        let opts = UpdateOptions::default();
        self.pipeline().run(ctx, &mut Docs::one(doc), OpType::BeforeReplace, &[&opts])?;
        let encoded = bson::serialize_to_document(&*doc)?;
        check_replacement(&encoded)?;
        let res = self.driver().replace_one(ctx, self.namespace(), filter, encoded, &opts)?;
        if res.matched == 0 {
            return Err(DbError::NoSuchDocuments);
        }
        self.pipeline().run(ctx, &mut Docs::one(doc), OpType::AfterReplace, &[&opts])
    }

    /// Applies `update` (made of `$` operators) to the first match. `hook`, when
    /// given, receives the before/after-update phases.
    ///
    /// # Errors
    /// `UpdateRequiresOperators`; `NoSuchDocuments` when nothing matched; middleware or driver errors.
    pub fn update_one(
        &self,
        ctx: &Context,
        filter: &Document,
        update: &Document,
        mut hook: Option<&mut dyn Model>,
    ) -> Result<()> {
        check_update(update)?;
        let opts = UpdateOptions::default();
        self.run_hook(ctx, &mut hook, OpType::BeforeUpdate, &[&opts])?;
        let res = self.driver().update(ctx, self.namespace(), filter, update, &opts)?;
        if res.matched == 0 {
            return Err(DbError::NoSuchDocuments);
        }
        self.run_hook(ctx, &mut hook, OpType::AfterUpdate, &[&opts])
    }

    /// [`Collection::update_one`] keyed on `_id`.
    ///
    /// # Errors
    /// As [`Collection::update_one`].
    pub fn update_id(
        &self,
        ctx: &Context,
        id: impl Into<Bson>,
        update: &Document,
        hook: Option<&mut dyn Model>,
    ) -> Result<()> {
        self.update_one(ctx, &doc! {"_id": id.into()}, update, hook)
    }

    /// Applies `update` to every match. Zero matches is not an error.
    ///
    /// # Errors
    /// `UpdateRequiresOperators`; middleware or driver errors.
    pub fn update_all(
        &self,
        ctx: &Context,
        filter: &Document,
        update: &Document,
        mut hook: Option<&mut dyn Model>,
    ) -> Result<UpdateReport> {
        check_update(update)?;
        let opts = UpdateOptions { upsert: false, multi: true };
        self.run_hook(ctx, &mut hook, OpType::BeforeUpdate, &[&opts])?;
        let res = self.driver().update(ctx, self.namespace(), filter, update, &opts)?;
        self.run_hook(ctx, &mut hook, OpType::AfterUpdate, &[&opts])?;
        Ok(res)
    }

    /// Deletes the first match.
    ///
    /// # Errors
    /// `NoSuchDocuments` when nothing matched; middleware or driver errors.
    pub fn remove(&self, ctx: &Context, filter: &Document, mut hook: Option<&mut dyn Model>) -> Result<()> {
        self.run_hook(ctx, &mut hook, OpType::BeforeRemove, &[])?;
        let res = self.driver().delete(ctx, self.namespace(), filter, false)?;
        if res.deleted == 0 {
            return Err(DbError::NoSuchDocuments);
        }
        self.run_hook(ctx, &mut hook, OpType::AfterRemove, &[])
    }

    /// # Errors
    /// As [`Collection::remove`].
    pub fn remove_id(&self, ctx: &Context, id: impl Into<Bson>, hook: Option<&mut dyn Model>) -> Result<()> {
        self.remove(ctx, &doc! {"_id": id.into()}, hook)
    }

    /// Deletes every match. Zero matches is not an error.
    ///
    /// # Errors
    /// Middleware or driver errors.
    pub fn remove_all(&self, ctx: &Context, filter: &Document, mut hook: Option<&mut dyn Model>) -> Result<DeleteReport> {
        self.run_hook(ctx, &mut hook, OpType::BeforeRemove, &[])?;
        let res = self.driver().delete(ctx, self.namespace(), filter, true)?;
        self.run_hook(ctx, &mut hook, OpType::AfterRemove, &[])?;
        Ok(res)
    }
}
