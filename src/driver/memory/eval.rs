use crate::errors::{DbError, Result};
use bson::{Bson, Document};
use std::cmp::Ordering;

use super::filter::{Cmp, MAX_PATH_DEPTH, Predicate, truthy};
use super::update::{set_path, unset_path};

const MAX_SORT_FIELDS: usize = 32;

pub(crate) fn eval_filter(doc: &Document, pred: &Predicate) -> bool {
    match pred {
        Predicate::True => true,
        Predicate::And(ps) => ps.iter().all(|p| eval_filter(doc, p)),
        Predicate::Or(ps) => ps.iter().any(|p| eval_filter(doc, p)),
        Predicate::Not(p) => !eval_filter(doc, p),
        Predicate::Exists { path, exists } => get_path(doc, path).is_some() == *exists,
        Predicate::In { path, values } => match get_path(doc, path) {
            Some(v) => matches_any(v, |x| is_in_set(x, values)),
            // Missing fields only match an explicit null in the set.
            None => values.iter().any(|x| matches!(x, Bson::Null)),
        },
        Predicate::Cmp { path, op, value } => match get_path(doc, path) {
            Some(v) => matches_any(v, |x| cmp_matches(x, *op, value)),
            None => *op == Cmp::Eq && matches!(value, Bson::Null),
        },
        #[cfg(feature = "regex")]
        Predicate::Regex { path, pattern, case_insensitive } => {
            let Some(v) = get_path(doc, path) else { return false };
            let mut re = regex::RegexBuilder::new(pattern);
            re.case_insensitive(*case_insensitive);
            match re.build() {
                Ok(r) => matches_any(v, |x| matches!(x, Bson::String(s) if r.is_match(s))),
                Err(_) => false,
            }
        }
    }
}

/// Applies `test` to the value itself and, for arrays, to each element.
fn matches_any(v: &Bson, test: impl Fn(&Bson) -> bool) -> bool {
    if test(v) {
        return true;
    }
    match v {
        Bson::Array(items) => items.iter().any(test),
        _ => false,
    }
}

fn cmp_matches(v: &Bson, op: Cmp, value: &Bson) -> bool {
    if op == Cmp::Eq {
        return bson_equal(v, value);
    }
    // Range operators only compare within the same type bracket.
    if !comparable(v, value) {
        return false;
    }
    let c = compare_bson(v, value);
    match op {
        Cmp::Eq => c == Ordering::Equal,
        Cmp::Gt => c == Ordering::Greater,
        Cmp::Gte => c != Ordering::Less,
        Cmp::Lt => c == Ordering::Less,
        Cmp::Lte => c != Ordering::Greater,
    }
}

fn is_num(x: &Bson) -> bool {
    matches!(x, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(x: &Bson) -> f64 {
    match x {
        Bson::Int32(i) => f64::from(*i),
        Bson::Int64(i) => *i as f64,
        Bson::Double(f) => *f,
        _ => f64::NAN,
    }
}

fn comparable(a: &Bson, b: &Bson) -> bool {
    (is_num(a) && is_num(b)) || std::mem::discriminant(a) == std::mem::discriminant(b)
}

/// Equality with numeric coercion across Int32, Int64 and Double.
pub(crate) fn bson_equal(a: &Bson, b: &Bson) -> bool {
    if is_num(a) && is_num(b) {
        return match (a, b) {
            (Bson::Int32(x), Bson::Int64(y)) | (Bson::Int64(y), Bson::Int32(x)) => i64::from(*x) == *y,
            (Bson::Int64(x), Bson::Int64(y)) => x == y,
            _ => as_f64(a) == as_f64(b),
        };
    }
    a == b
}

fn is_in_set(v: &Bson, set: &[Bson]) -> bool {
    set.iter().any(|x| bson_equal(x, v))
}

/// Resolves a dotted path. Numeric segments index into arrays.
pub(crate) fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    if path.is_empty() || path.len() > 1024 {
        return None;
    }
    let mut segs = path.split('.');
    let first = segs.next()?;
    let mut cur = doc.get(first)?;
    for (depth, seg) in segs.enumerate() {
        if depth + 1 >= MAX_PATH_DEPTH {
            return None;
        }
        cur = match cur {
            Bson::Document(d) => d.get(seg)?,
            Bson::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

pub(crate) fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    if is_num(a) && is_num(b) {
        return match (a, b) {
            (Bson::Int32(x), Bson::Int32(y)) => x.cmp(y),
            (Bson::Int64(x), Bson::Int64(y)) => x.cmp(y),
            _ => as_f64(a).total_cmp(&as_f64(b)),
        };
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => (x.time, x.increment).cmp(&(y.time, y.increment)),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Cross-type ordering, following the server's BSON comparison order.
fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::DbPointer(_) => 12,
        Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => 13,
        Bson::MaxKey => 255,
    }
}

fn sort_direction(v: &Bson) -> Result<bool> {
    let n = match v {
        Bson::Int32(i) => i64::from(*i),
        Bson::Int64(i) => *i,
        #[allow(clippy::cast_possible_truncation)]
        Bson::Double(f) => *f as i64,
        _ => return Err(DbError::Driver("BadValue: sort direction must be 1 or -1".into())),
    };
    match n {
        1 => Ok(true),
        -1 => Ok(false),
        _ => Err(DbError::Driver(format!("BadValue: bad sort direction {n}"))),
    }
}

/// Validated sort key list, ascending flag per field.
pub(crate) fn sort_keys(sort: &Document) -> Result<Vec<(String, bool)>> {
    if sort.len() > MAX_SORT_FIELDS {
        log::warn!("sort spec too long: {}", sort.len());
        return Err(DbError::Driver(format!("BadValue: at most {MAX_SORT_FIELDS} sort keys, got {}", sort.len())));
    }
    sort.iter().map(|(k, v)| Ok((k.clone(), sort_direction(v)?))).collect()
}

pub(crate) fn compare_docs(a: &Document, b: &Document, keys: &[(String, bool)]) -> Ordering {
    for (field, asc) in keys {
        let ord = match (get_path(a, field), get_path(b, field)) {
            (Some(x), Some(y)) => compare_bson(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return if *asc { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

/// Inclusion or exclusion projection; `_id` stays unless explicitly excluded.
pub(crate) fn project(doc: &Document, projection: &Document) -> Result<Document> {
    let mut include_id = true;
    let mut includes = Vec::new();
    let mut excludes = Vec::new();
    for (field, flag) in projection {
        if field == "_id" {
            include_id = truthy(flag);
            continue;
        }
        if truthy(flag) { includes.push(field.as_str()) } else { excludes.push(field.as_str()) }
    }
    if !includes.is_empty() && !excludes.is_empty() {
        return Err(DbError::Driver("Projection cannot have a mix of inclusion and exclusion.".into()));
    }
    if includes.is_empty() {
        let mut out = doc.clone();
        for field in excludes {
            unset_path(&mut out, field);
        }
        if !include_id {
            out.remove("_id");
        }
        return Ok(out);
    }
    let mut out = Document::new();
    if include_id && let Some(id) = doc.get("_id") {
        out.insert("_id", id.clone());
    }
    for field in includes {
        if let Some(v) = get_path(doc, field) {
            set_path(&mut out, field, v.clone());
        }
    }
    Ok(out)
}
