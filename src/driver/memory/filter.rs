use crate::errors::{DbError, Result};
use bson::{Bson, Document};

pub(crate) const MAX_PATH_DEPTH: usize = 32;
const MAX_IN_SET: usize = 1000;
const MAX_FILTER_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cmp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Parsed form of a filter document.
#[derive(Debug, Clone)]
pub(crate) enum Predicate {
    True,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Exists { path: String, exists: bool },
    In { path: String, values: Vec<Bson> },
    Cmp { path: String, op: Cmp, value: Bson },
    #[cfg(feature = "regex")]
    Regex { path: String, pattern: String, case_insensitive: bool },
}

fn invalid(msg: impl Into<String>) -> DbError {
    DbError::Driver(format!("BadValue: {}", msg.into()))
}

/// # Errors
/// `DbError::Driver` for unknown operators or malformed operands.
pub(crate) fn parse_filter(doc: &Document) -> Result<Predicate> {
    parse_doc(doc, 0)
}

fn parse_doc(doc: &Document, depth: usize) -> Result<Predicate> {
    if depth > MAX_FILTER_DEPTH {
        return Err(invalid("filter nested too deeply"));
    }
    let mut parts = Vec::with_capacity(doc.len());
    for (key, value) in doc {
        match key.as_str() {
            "$and" => parts.push(Predicate::And(parse_list(key, value, depth)?)),
            "$or" => parts.push(Predicate::Or(parse_list(key, value, depth)?)),
            "$nor" => parts.push(Predicate::Not(Box::new(Predicate::Or(parse_list(key, value, depth)?)))),
            k if k.starts_with('$') => return Err(invalid(format!("unknown top level operator: {k}"))),
            path => parts.push(parse_field(path, value)?),
        }
    }
    Ok(collapse(parts))
}

fn collapse(mut parts: Vec<Predicate>) -> Predicate {
    match parts.len() {
        0 => Predicate::True,
        1 => parts.pop().unwrap_or(Predicate::True),
        _ => Predicate::And(parts),
    }
}

fn parse_list(op: &str, value: &Bson, depth: usize) -> Result<Vec<Predicate>> {
    let Bson::Array(items) = value else {
        return Err(invalid(format!("{op} must be an array")));
    };
    if items.is_empty() {
        return Err(invalid(format!("{op} must be a nonempty array")));
    }
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => parse_doc(d, depth + 1),
            _ => Err(invalid(format!("{op} entries must be objects"))),
        })
        .collect()
}

fn is_operator_doc(value: &Bson) -> bool {
    matches!(value, Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')))
}

fn parse_field(path: &str, value: &Bson) -> Result<Predicate> {
    let Bson::Document(ops) = value else {
        return Ok(Predicate::Cmp { path: path.to_string(), op: Cmp::Eq, value: value.clone() });
    };
    if !is_operator_doc(value) {
        return Ok(Predicate::Cmp { path: path.to_string(), op: Cmp::Eq, value: value.clone() });
    }
    let mut parts = Vec::with_capacity(ops.len());
    for (op, arg) in ops {
        let p = path.to_string();
        let pred = match op.as_str() {
            "$eq" => Predicate::Cmp { path: p, op: Cmp::Eq, value: arg.clone() },
            "$ne" => Predicate::Not(Box::new(Predicate::Cmp { path: p, op: Cmp::Eq, value: arg.clone() })),
            "$gt" => Predicate::Cmp { path: p, op: Cmp::Gt, value: arg.clone() },
            "$gte" => Predicate::Cmp { path: p, op: Cmp::Gte, value: arg.clone() },
            "$lt" => Predicate::Cmp { path: p, op: Cmp::Lt, value: arg.clone() },
            "$lte" => Predicate::Cmp { path: p, op: Cmp::Lte, value: arg.clone() },
            "$in" => Predicate::In { path: p, values: in_values(op, arg)? },
            "$nin" => Predicate::Not(Box::new(Predicate::In { path: p, values: in_values(op, arg)? })),
            "$exists" => Predicate::Exists { path: p, exists: truthy(arg) },
            "$not" => Predicate::Not(Box::new(parse_field(path, arg)?)),
            "$regex" => regex_predicate(p, arg, ops.get("$options"))?,
            "$options" if ops.contains_key("$regex") => continue,
            other => return Err(invalid(format!("unknown operator: {other}"))),
        };
        parts.push(pred);
    }
    Ok(collapse(parts))
}

fn in_values(op: &str, arg: &Bson) -> Result<Vec<Bson>> {
    match arg {
        Bson::Array(values) if values.len() > MAX_IN_SET => {
            log::warn!("{op} set too long: {}", values.len());
            Err(invalid(format!("{op} accepts at most {MAX_IN_SET} values, got {}", values.len())))
        }
        Bson::Array(values) => Ok(values.clone()),
        _ => Err(invalid(format!("{op} needs an array"))),
    }
}

/// Mongo-style truthiness for flag operands (`$exists`, projection values).
pub(crate) fn truthy(v: &Bson) -> bool {
    match v {
        Bson::Boolean(b) => *b,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

#[cfg(feature = "regex")]
fn regex_predicate(path: String, arg: &Bson, options: Option<&Bson>) -> Result<Predicate> {
    let Bson::String(pattern) = arg else {
        return Err(invalid("$regex has to be a string"));
    };
    let case_insensitive = matches!(options, Some(Bson::String(o)) if o.contains('i'));
    Ok(Predicate::Regex { path, pattern: pattern.clone(), case_insensitive })
}

#[cfg(not(feature = "regex"))]
fn regex_predicate(_path: String, _arg: &Bson, _options: Option<&Bson>) -> Result<Predicate> {
    Err(invalid("$regex requires the `regex` cargo feature"))
}
