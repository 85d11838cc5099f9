//! Automatic population of identifier and timestamp fields, the second
//! built-in middleware callback.
//!
//! On insert and upsert a zero id and a zero create time are filled and the
//! update time is set; on update and replace only the update time is set. Both
//! the standard block (`DefaultFieldHook`) and named custom fields
//! (`CustomFieldHook`) are handled, standard first.

mod custom;
mod default_field;

pub use custom::{CustomFieldHook, CustomFields, FieldAccess, FieldMut};
pub use default_field::{DefaultField, DefaultFieldHook};

use crate::errors::Result;
use crate::model::Model;
use crate::types::{Context, OpType};
use crate::util;
use std::any::Any;

/// Runs the defaulting rules for `op` on one document. Non-write phases are no-ops.
///
/// # Errors
/// `FieldNotFound` / `FieldTypeMismatch` from a custom field mapping, or a
/// serialization failure while rewriting the document.
pub fn apply_defaults(doc: &mut dyn Model, op: OpType) -> Result<()> {
    let with_id_and_create = match op {
        OpType::BeforeInsert | OpType::BeforeUpsert => true,
        OpType::BeforeUpdate | OpType::BeforeReplace => false,
        _ => return Ok(()),
    };
    let now = util::now();
    if let Some(hook) = doc.default_field_hook() {
        if with_id_and_create {
            hook.set_default_id();
            hook.set_default_create_time(now);
        }
        hook.set_default_update_time(now);
    }
    if let Some(hook) = doc.custom_field_hook() {
        custom::apply(hook, now, with_id_and_create)?;
    }
    Ok(())
}

/// Middleware callback wrapper around [`apply_defaults`].
pub fn dispatch(_ctx: &Context, doc: &mut dyn Model, op: OpType, _opts: &[&dyn Any]) -> Result<()> {
    apply_defaults(doc, op)
}
