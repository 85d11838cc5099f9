//! Shorthand parsers: sort and select field strings, and the operator-suffix
//! filter syntax (`"age >="`, `"status not in"`, ...).

use crate::errors::{DbError, Result};
use bson::Bson;

use super::types::{CmpOp, Clause, Condition, Order, ProjectionSpec, SortSpec, Term, Visibility};

/// Suffix markers, most specific first: `" not in"` must win over `" in"`.
const MARKERS: &[(&str, CmpOp)] = &[
    (" <=", CmpOp::Lte),
    (" <", CmpOp::Lt),
    (" >=", CmpOp::Gte),
    (" >", CmpOp::Gt),
    (" not in", CmpOp::Nin),
    (" NOT IN", CmpOp::Nin),
    (" in", CmpOp::In),
    (" IN", CmpOp::In),
    (" !=", CmpOp::Ne),
    (" <>", CmpOp::Ne),
];

/// Splits `"name <op>"` into the trimmed field name and its operator.
#[must_use]
pub fn split_operator(key: &str) -> (&str, CmpOp) {
    for (marker, op) in MARKERS {
        if let Some(field) = key.strip_suffix(marker) {
            return (field.trim(), *op);
        }
    }
    (key.trim(), CmpOp::Eq)
}

/// `"age"` / `"age asc"` sort ascending, `"age desc"` (any case) descending.
///
/// # Errors
/// `DbError::EmptyFieldName` when the field part is empty.
pub fn parse_sort_field(spec: &str) -> Result<SortSpec> {
    let parts: Vec<&str> = spec.split(' ').collect();
    let order = match parts.as_slice() {
        [_, dir] if dir.eq_ignore_ascii_case("desc") => Order::Desc,
        _ => Order::Asc,
    };
    let field = parts.first().copied().unwrap_or_default();
    if field.is_empty() {
        return Err(DbError::EmptyFieldName("sort"));
    }
    Ok(SortSpec { field: field.to_string(), order })
}

/// `"name"` includes the field, `"!name"` excludes it.
/// Only one leading `!` is stripped, so `"!!name"` excludes the field `!name`.
///
/// # Errors
/// `DbError::EmptyFieldName` when nothing is left after the optional `!`.
pub fn parse_select_field(spec: &str) -> Result<ProjectionSpec> {
    let (field, visibility) = match spec.strip_prefix('!') {
        Some(rest) => (rest, Visibility::Exclude),
        None => (spec, Visibility::Include),
    };
    if field.is_empty() {
        return Err(DbError::EmptyFieldName("select"));
    }
    Ok(ProjectionSpec { field: field.to_string(), visibility })
}

/// Compiles `(key, value)` pairs into a flat clause, one condition per pair, in
/// the order given.
pub fn compile_filter<I, K, V>(conditions: I) -> Clause
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<Bson>,
{
    let terms = conditions
        .into_iter()
        .map(|(key, value)| {
            let (field, op) = split_operator(key.as_ref());
            Term::Cond(Condition { field: field.to_string(), op, value: value.into() })
        })
        .collect();
    Clause { terms }
}
