use crate::errors::{DbError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Point in a document's operation lifecycle handed to every middleware callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpType {
    BeforeInsert,
    AfterInsert,
    BeforeUpdate,
    AfterUpdate,
    BeforeReplace,
    AfterReplace,
    BeforeRemove,
    AfterRemove,
    BeforeUpsert,
    AfterUpsert,
    BeforeQuery,
    AfterQuery,
}

impl OpType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeInsert => "beforeInsert",
            Self::AfterInsert => "afterInsert",
            Self::BeforeUpdate => "beforeUpdate",
            Self::AfterUpdate => "afterUpdate",
            Self::BeforeReplace => "beforeReplace",
            Self::AfterReplace => "afterReplace",
            Self::BeforeRemove => "beforeRemove",
            Self::AfterRemove => "afterRemove",
            Self::BeforeUpsert => "beforeUpsert",
            Self::AfterUpsert => "afterUpsert",
            Self::BeforeQuery => "beforeQuery",
            Self::AfterQuery => "afterQuery",
        }
    }

    #[must_use]
    pub const fn is_before(self) -> bool {
        matches!(
            self,
            Self::BeforeInsert
                | Self::BeforeUpdate
                | Self::BeforeReplace
                | Self::BeforeRemove
                | Self::BeforeUpsert
                | Self::BeforeQuery
        )
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a driver-level session used to scope a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation token threaded through every operation-shaped call.
///
/// Clones share the cancelled flag, so cancelling any clone cancels them all.
/// A derived context (`with_timeout`, `with_session`) keeps the parent's flag.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
    session: Option<SessionId>,
}

impl Context {
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Derives a context whose deadline is the earlier of the parent's and `now + timeout`.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(cur) if cur < deadline => cur,
            _ => deadline,
        };
        Self { deadline: Some(deadline), cancelled: Arc::clone(&self.cancelled), session: self.session }
    }

    #[must_use]
    pub fn with_session(&self, session: SessionId) -> Self {
        Self { deadline: self.deadline, cancelled: Arc::clone(&self.cancelled), session: Some(session) }
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub const fn session(&self) -> Option<SessionId> {
        self.session
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// # Errors
    /// `Cancelled` after `cancel()`, `DeadlineExceeded` once the deadline has passed.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        if let Some(dl) = self.deadline
            && Instant::now() > dl
        {
            return Err(DbError::DeadlineExceeded);
        }
        Ok(())
    }
}
