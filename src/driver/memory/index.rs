//! Secondary index definitions kept per namespace. Only uniqueness is enforced;
//! lookups still scan.

use super::eval::{bson_equal, get_path};
use crate::driver::{IndexModel, Namespace};
use crate::errors::{DbError, Result};
use bson::{Bson, Document, doc};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IndexSpec {
    pub(crate) name: String,
    pub(crate) keys: Document,
    pub(crate) unique: bool,
    pub(crate) sparse: bool,
}

impl IndexSpec {
    pub(crate) fn from_model(model: &IndexModel) -> Result<Self> {
        Ok(Self {
            name: model.index_name()?,
            keys: model.keys_document()?,
            unique: model.unique,
            sparse: model.sparse,
        })
    }

    /// The implicit unique index every collection has.
    pub(crate) fn primary() -> Self {
        Self { name: "_id_".into(), keys: doc! {"_id": 1}, unique: false, sparse: false }
    }

    /// Index description in `listIndexes` shape.
    pub(crate) fn describe(&self) -> Document {
        let mut out = doc! {"v": 2, "key": self.keys.clone(), "name": self.name.as_str()};
        if self.unique {
            out.insert("unique", true);
        }
        if self.sparse {
            out.insert("sparse", true);
        }
        out
    }

    /// Key values of `doc`; `None` when a sparse index skips it.
    fn key_of(&self, doc: &Document) -> Option<Vec<Bson>> {
        let values: Vec<Option<&Bson>> = self.keys.keys().map(|k| get_path(doc, k)).collect();
        if self.sparse && values.iter().all(Option::is_none) {
            return None;
        }
        Some(values.into_iter().map(|v| v.cloned().unwrap_or(Bson::Null)).collect())
    }

    /// Fails when `doc` would collide with one of `docs` under this index.
    pub(crate) fn admit(&self, docs: &[Document], ns: &Namespace, doc: &Document) -> Result<()> {
        if !self.unique {
            return Ok(());
        }
        let Some(key) = self.key_of(doc) else {
            return Ok(());
        };
        if docs.iter().filter_map(|d| self.key_of(d)).any(|other| same_key(&key, &other)) {
            return Err(self.duplicate(ns, &key));
        }
        Ok(())
    }

    /// Fails when `docs` already hold two entries with the same key.
    pub(crate) fn admit_all(&self, docs: &[Document], ns: &Namespace) -> Result<()> {
        if !self.unique {
            return Ok(());
        }
        let mut seen: Vec<Vec<Bson>> = Vec::with_capacity(docs.len());
        for key in docs.iter().filter_map(|d| self.key_of(d)) {
            if seen.iter().any(|s| same_key(s, &key)) {
                return Err(self.duplicate(ns, &key));
            }
            seen.push(key);
        }
        Ok(())
    }

    fn duplicate(&self, ns: &Namespace, key: &[Bson]) -> DbError {
        let shown = self.keys.keys().zip(key).map(|(k, v)| format!("{k}: {v}")).collect::<Vec<_>>().join(", ");
        DbError::Driver(format!("E11000 duplicate key error collection: {ns} index: {} dup key: {{ {shown} }}", self.name))
    }
}

fn same_key(a: &[Bson], b: &[Bson]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| bson_equal(x, y))
}

/// Adds `spec` to `existing`. Re-creating an identical index is a no-op; reusing a
/// name or a key pattern with different options is a conflict.
pub(crate) fn merge(existing: &mut Vec<IndexSpec>, spec: IndexSpec) -> Result<()> {
    if let Some(same) = existing.iter().find(|e| e.name == spec.name || e.keys == spec.keys) {
        if *same == spec {
            return Ok(());
        }
        return Err(DbError::Driver(format!(
            "IndexOptionsConflict: index {} conflicts with existing index {}",
            spec.name, same.name
        )));
    }
    existing.push(spec);
    Ok(())
}
