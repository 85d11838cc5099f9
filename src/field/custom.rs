use crate::errors::{DbError, Result};
use bson::DateTime;
use bson::oid::ObjectId;

/// Names (as serialized) of the fields a model wants treated as id, create time
/// and update time. Unset roles are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomFields {
    id: Option<String>,
    create_at: Option<String>,
    update_at: Option<String>,
}

impl CustomFields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set_id(mut self, field: impl Into<String>) -> Self {
        self.id = Some(field.into());
        self
    }

    #[must_use]
    pub fn set_create_at(mut self, field: impl Into<String>) -> Self {
        self.create_at = Some(field.into());
        self
    }

    #[must_use]
    pub fn set_update_at(mut self, field: impl Into<String>) -> Self {
        self.update_at = Some(field.into());
        self
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[must_use]
    pub fn create_at(&self) -> Option<&str> {
        self.create_at.as_deref()
    }

    #[must_use]
    pub fn update_at(&self) -> Option<&str> {
        self.update_at.as_deref()
    }
}

/// Mutable view of one bookkeeping field, as handed out by [`FieldAccess::field_mut`].
pub enum FieldMut<'a> {
    ObjectId(&'a mut ObjectId),
    OptionalObjectId(&'a mut Option<ObjectId>),
    /// Hex form of an id; empty means unset.
    String(&'a mut String),
    DateTime(&'a mut DateTime),
    OptionalDateTime(&'a mut Option<DateTime>),
    /// Unix milliseconds; zero means unset.
    Millis(&'a mut i64),
    /// A field of some other type, named for the error message.
    Unsupported(&'static str),
}

impl FieldMut<'_> {
    const fn type_name(&self) -> &'static str {
        match self {
            Self::ObjectId(_) => "ObjectId",
            Self::OptionalObjectId(_) => "Option<ObjectId>",
            Self::String(_) => "String",
            Self::DateTime(_) => "DateTime",
            Self::OptionalDateTime(_) => "Option<DateTime>",
            Self::Millis(_) => "Int64",
            Self::Unsupported(name) => *name,
        }
    }
}

/// Name-addressed access to a model's own fields. Only the named field is
/// read or written; the rest of the value is left alone.
pub trait FieldAccess {
    /// `None` when the model has no field called `name`.
    fn field_mut(&mut self, name: &str) -> Option<FieldMut<'_>>;
}

/// Models whose bookkeeping fields live under their own names.
pub trait CustomFieldHook: FieldAccess {
    fn custom_fields(&self) -> CustomFields;
}

fn lookup<'a>(hook: &'a mut dyn CustomFieldHook, name: &str) -> Result<FieldMut<'a>> {
    hook.field_mut(name).ok_or_else(|| DbError::FieldNotFound { field: name.to_string() })
}

fn mismatch(name: &str, expected: &'static str, found: &FieldMut<'_>) -> DbError {
    DbError::FieldTypeMismatch { field: name.to_string(), expected, found: found.type_name().to_string() }
}

/// Id role: ObjectId (zero is empty), optional ObjectId, or a hex String (empty is empty).
fn fill_id(hook: &mut dyn CustomFieldHook, name: &str) -> Result<()> {
    match lookup(hook, name)? {
        FieldMut::ObjectId(id) if *id == super::default_field::ZERO_ID => *id = ObjectId::new(),
        FieldMut::OptionalObjectId(id) if id.is_none_or(|v| v == super::default_field::ZERO_ID) => {
            *id = Some(ObjectId::new());
        }
        FieldMut::String(s) if s.is_empty() => *s = ObjectId::new().to_hex(),
        FieldMut::ObjectId(_) | FieldMut::OptionalObjectId(_) | FieldMut::String(_) => {}
        other => return Err(mismatch(name, "ObjectId or String", &other)),
    }
    Ok(())
}

/// Time roles: DateTime, optional DateTime or Int64 unix millis. `only_if_zero`
/// guards the create role.
fn fill_time(hook: &mut dyn CustomFieldHook, name: &str, now: DateTime, only_if_zero: bool) -> Result<()> {
    match lookup(hook, name)? {
        FieldMut::DateTime(dt) => {
            if !only_if_zero || dt.timestamp_millis() == 0 {
                *dt = now;
            }
        }
        FieldMut::OptionalDateTime(dt) => {
            if !only_if_zero || dt.is_none_or(|v| v.timestamp_millis() == 0) {
                *dt = Some(now);
            }
        }
        FieldMut::Millis(ms) => {
            if !only_if_zero || *ms == 0 {
                *ms = now.timestamp_millis();
            }
        }
        other => return Err(mismatch(name, "DateTime or Int64", &other)),
    }
    Ok(())
}

/// Applies the custom roles in place. `with_id_and_create` is true for
/// insert/upsert; update and replace only refresh the update role.
pub(crate) fn apply(hook: &mut dyn CustomFieldHook, now: DateTime, with_id_and_create: bool) -> Result<()> {
    let roles = hook.custom_fields();
    if with_id_and_create {
        if let Some(name) = roles.id() {
            fill_id(hook, name)?;
        }
        if let Some(name) = roles.create_at() {
            fill_time(hook, name, now, true)?;
        }
    }
    if let Some(name) = roles.update_at() {
        fill_time(hook, name, now, false)?;
    }
    Ok(())
}
