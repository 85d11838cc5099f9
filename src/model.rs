//! Capability surface a document type exposes to the middleware pipeline.
//!
//! Every accessor defaults to "not implemented", so a plain struct only needs
//! `impl Model for Foo {}`. Types opt into a capability by returning `Some(self)`
//! (or `Some(&mut self.embedded)`) from the matching accessor.

use crate::field::{CustomFieldHook, DefaultFieldHook};
use crate::hook::OperationHook;
use crate::validator::Validate;

pub trait Model {
    fn default_field_hook(&mut self) -> Option<&mut dyn DefaultFieldHook> {
        None
    }

    fn custom_field_hook(&mut self) -> Option<&mut dyn CustomFieldHook> {
        None
    }

    fn operation_hook(&mut self) -> Option<&mut dyn OperationHook> {
        None
    }

    fn validator(&self) -> Option<&dyn Validate> {
        None
    }
}

/// Which capabilities a document answered to, resolved once per dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub default_fields: bool,
    pub custom_fields: bool,
    pub operation_hook: bool,
    pub validator: bool,
}

impl Capabilities {
    pub fn of(doc: &mut dyn Model) -> Self {
        Self {
            default_fields: doc.default_field_hook().is_some(),
            custom_fields: doc.custom_field_hook().is_some(),
            operation_hook: doc.operation_hook().is_some(),
            validator: doc.validator().is_some(),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !(self.default_fields || self.custom_fields || self.operation_hook || self.validator)
    }
}

impl Model for bson::Document {}
