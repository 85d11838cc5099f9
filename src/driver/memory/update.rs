use crate::errors::{DbError, Result};
use bson::{Bson, Document};

const MAX_UPDATE_FIELDS: usize = 128;

/// Parsed update operators supported by the in-memory driver.
#[derive(Debug, Default, Clone)]
pub(crate) struct UpdateDoc {
    pub set: Vec<(String, Bson)>,
    pub inc: Vec<(String, Bson)>,
    pub unset: Vec<String>,
}

fn bad(msg: impl Into<String>) -> DbError {
    DbError::Driver(format!("FailedToParse: {}", msg.into()))
}

impl UpdateDoc {
    /// # Errors
    /// Non-operator keys, unknown operators, non-numeric `$inc` values, or `_id` targets.
    pub(crate) fn parse(update: &Document) -> Result<Self> {
        if update.is_empty() {
            return Err(bad("update document must not be empty"));
        }
        let mut out = Self::default();
        for (op, arg) in update {
            let Bson::Document(fields) = arg else {
                return Err(bad(format!("modifier {op} expects a document")));
            };
            if fields.len() > MAX_UPDATE_FIELDS {
                return Err(bad(format!("{op} touches {} fields, at most {MAX_UPDATE_FIELDS} allowed", fields.len())));
            }
            for (path, value) in fields {
                if path == "_id" {
                    return Err(DbError::Driver(
                        "ImmutableField: performing an update on the path '_id' would modify the immutable field '_id'"
                            .into(),
                    ));
                }
                match op.as_str() {
                    "$set" => out.set.push((path.clone(), value.clone())),
                    "$inc" => {
                        if !matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) {
                            return Err(bad(format!("cannot increment with non-numeric argument: {path}")));
                        }
                        out.inc.push((path.clone(), value.clone()));
                    }
                    "$unset" => out.unset.push(path.clone()),
                    other if other.starts_with('$') => return Err(bad(format!("unknown modifier: {other}"))),
                    _ => return Err(bad("update document requires atomic operators")),
                }
            }
        }
        Ok(out)
    }
}

fn ensure_subdoc<'a>(root: &'a mut Document, key: &str) -> Option<&'a mut Document> {
    if !matches!(root.get(key), Some(Bson::Document(_))) {
        root.insert(key.to_string(), Bson::Document(Document::new()));
    }
    match root.get_mut(key) {
        Some(Bson::Document(d)) => Some(d),
        _ => None,
    }
}

fn traverse_to_parent<'a>(root: &'a mut Document, path: &str) -> Option<(&'a mut Document, String)> {
    let mut cur = root;
    let mut iter = path.split('.').peekable();
    while let Some(seg) = iter.next() {
        if iter.peek().is_none() {
            return Some((cur, seg.to_string()));
        }
        cur = ensure_subdoc(cur, seg)?;
    }
    None
}

/// Sets a dotted path, creating intermediate documents. Returns whether the value changed.
pub(crate) fn set_path(root: &mut Document, path: &str, value: Bson) -> bool {
    let Some((parent, last)) = traverse_to_parent(root, path) else { return false };
    let old = parent.insert(last, value.clone());
    old.as_ref() != Some(&value)
}

pub(crate) fn unset_path(root: &mut Document, path: &str) -> bool {
    let mut cur = root;
    let mut iter = path.split('.').peekable();
    while let Some(seg) = iter.next() {
        if iter.peek().is_none() {
            return cur.remove(seg).is_some();
        }
        match cur.get_mut(seg) {
            Some(Bson::Document(d)) => cur = d,
            _ => return false,
        }
    }
    false
}

/// Integer sums stay integral (widening on overflow); anything involving a double is a double.
#[allow(clippy::cast_precision_loss)]
fn add_numbers(cur: Option<&Bson>, by: &Bson) -> Result<Bson> {
    let Some(cur) = cur else { return Ok(by.clone()) };
    Ok(match (cur, by) {
        (Bson::Int32(a), Bson::Int32(b)) => a.checked_add(*b).map_or(Bson::Int64(i64::from(*a) + i64::from(*b)), Bson::Int32),
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a).wrapping_add(*b)),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.wrapping_add(i64::from(*b))),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.wrapping_add(*b)),
        (Bson::Double(a), Bson::Double(b)) => Bson::Double(a + b),
        (Bson::Double(a), Bson::Int32(b)) => Bson::Double(a + f64::from(*b)),
        (Bson::Double(a), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Bson::Int32(a), Bson::Double(b)) => Bson::Double(f64::from(*a) + b),
        (Bson::Int64(a), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        (other, _) => {
            return Err(bad(format!("cannot apply $inc to a value of non-numeric type {:?}", other.element_type())));
        }
    })
}

/// Applies `$set`, `$inc` and `$unset` in that order. Returns whether anything changed.
///
/// # Errors
/// `$inc` on a non-numeric field.
pub(crate) fn apply_update(doc: &mut Document, upd: &UpdateDoc) -> Result<bool> {
    let mut changed = false;
    for (k, v) in &upd.set {
        changed |= set_path(doc, k, v.clone());
    }
    for (k, by) in &upd.inc {
        let next = add_numbers(super::eval::get_path(doc, k), by)?;
        changed |= set_path(doc, k, next);
    }
    for k in &upd.unset {
        changed |= unset_path(doc, k);
    }
    Ok(changed)
}
