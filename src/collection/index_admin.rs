use super::core::Collection;
use crate::driver::IndexModel;
use crate::errors::{DbError, Result};
use crate::types::Context;
use bson::Document;

impl Collection {
    /// Creates every index in `models` and returns their names in the same order.
    /// Re-creating an identical index is a no-op.
    ///
    /// # Errors
    /// Bad key lists, a conflicting existing index, or a unique index over
    /// documents that already repeat the key (`is_dup()`).
    pub fn create_indexes(&self, ctx: &Context, models: &[IndexModel]) -> Result<Vec<String>> {
        let names = self.driver().create_indexes(ctx, self.namespace(), models)?;
        log::debug!("created indexes {names:?} on {}", self.namespace());
        Ok(names)
    }

    /// # Errors
    /// As [`Collection::create_indexes`].
    pub fn create_one_index(&self, ctx: &Context, model: IndexModel) -> Result<String> {
        self.create_indexes(ctx, std::slice::from_ref(&model))?
            .pop()
            .ok_or_else(|| DbError::Driver("no index name returned".into()))
    }

    /// Shorthand for single-purpose indexes: every entry of `keys` is one index
    /// (`"-field"` for descending), all unique or all not.
    ///
    /// # Errors
    /// As [`Collection::create_indexes`].
    pub fn ensure_indexes(&self, ctx: &Context, keys: &[&str], unique: bool) -> Result<Vec<String>> {
        let models: Vec<IndexModel> = keys
            .iter()
            .map(|k| {
                let model = IndexModel::new([*k]);
                if unique { model.unique() } else { model }
            })
            .collect();
        self.create_indexes(ctx, &models)
    }

    /// Index descriptions (`v`, `key`, `name`, ...) including the `_id_` index.
    ///
    /// # Errors
    /// Driver errors, e.g. the collection does not exist.
    pub fn list_indexes(&self, ctx: &Context) -> Result<Vec<Document>> {
        self.driver().list_indexes(ctx, self.namespace())
    }
}
