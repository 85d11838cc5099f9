//! Struct validation, the third built-in middleware callback.

use crate::errors::Result;
use crate::model::Model;
use crate::types::{Context, OpType};
use std::any::Any;

pub trait Validate {
    /// # Errors
    /// Usually `DbError::Validation` describing the first rule that failed.
    fn validate(&self) -> Result<()>;
}

/// Validates documents about to be written whole: insert, upsert and replace.
pub fn dispatch(_ctx: &Context, doc: &mut dyn Model, op: OpType, _opts: &[&dyn Any]) -> Result<()> {
    match op {
        OpType::BeforeInsert | OpType::BeforeUpsert | OpType::BeforeReplace => match doc.validator() {
            Some(v) => v.validate(),
            None => Ok(()),
        },
        _ => Ok(()),
    }
}
