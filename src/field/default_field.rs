use bson::DateTime;
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Receiver for the three standard bookkeeping fields.
///
/// `now` is computed once per document by the engine so create and update
/// timestamps set in the same call are identical.
pub trait DefaultFieldHook {
    /// Assigns a fresh identifier when the current one is zero.
    fn set_default_id(&mut self);
    /// Assigns `now` when the creation time is zero.
    fn set_default_create_time(&mut self, now: DateTime);
    /// Always assigns `now`.
    fn set_default_update_time(&mut self, now: DateTime);
}

/// Embeddable `_id` / `createAt` / `updateAt` block. Flatten it into a model and
/// forward `Model::default_field_hook` to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultField {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(rename = "createAt")]
    pub create_at: DateTime,
    #[serde(rename = "updateAt")]
    pub update_at: DateTime,
}

pub(crate) const ZERO_ID: ObjectId = ObjectId::from_bytes([0; 12]);
pub(crate) const ZERO_TIME: DateTime = DateTime::from_millis(0);

impl Default for DefaultField {
    fn default() -> Self {
        Self { id: ZERO_ID, create_at: ZERO_TIME, update_at: ZERO_TIME }
    }
}

impl DefaultField {
    #[must_use]
    pub fn id_is_zero(&self) -> bool {
        self.id == ZERO_ID
    }
}

impl DefaultFieldHook for DefaultField {
    fn set_default_id(&mut self) {
        if self.id == ZERO_ID {
            self.id = ObjectId::new();
        }
    }

    fn set_default_create_time(&mut self, now: DateTime) {
        if self.create_at == ZERO_TIME {
            self.create_at = now;
        }
    }

    fn set_default_update_time(&mut self, now: DateTime) {
        self.update_at = now;
    }
}
