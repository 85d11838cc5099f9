use crate::driver::RawCursor;
use crate::errors::{DbError, Result};
use crate::types::Context;
use serde::de::DeserializeOwned;

/// Typed iteration over a driver result stream.
///
/// A cursor built from a failed call starts out holding that error: `next`
/// returns `false`, `err` reports it and `all` returns it.
pub struct Cursor {
    ctx: Context,
    inner: Option<Box<dyn RawCursor>>,
    err: Option<DbError>,
}

impl Cursor {
    pub(crate) fn new(ctx: Context, opened: Result<Box<dyn RawCursor>>) -> Self {
        match opened {
            Ok(inner) => Self { ctx, inner: Some(inner), err: None },
            Err(e) => Self { ctx, inner: None, err: Some(e) },
        }
    }

    /// Decodes the next document into `result`. Returns `false` when the stream is
    /// exhausted or an error occurred; check [`Cursor::err`] to tell them apart.
    pub fn next<T: DeserializeOwned>(&mut self, result: &mut T) -> bool {
        if self.err.is_some() {
            return false;
        }
        match self.try_next() {
            Ok(Some(v)) => {
                *result = v;
                true
            }
            Ok(None) | Err(_) => false,
        }
    }

    /// Like [`Cursor::next`] but returns the decoded value or the error.
    ///
    /// # Errors
    /// A stored error (which stays in the cursor), a driver error or a decode
    /// error. New errors are stored too, so [`Cursor::err`] reports them.
    pub fn try_next<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        if let Some(e) = &self.err {
            return Err(e.clone());
        }
        self.advance().inspect_err(|e| self.err = Some(e.clone()))
    }

    fn advance<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(None);
        };
        match inner.next_document(&self.ctx)? {
            Some(doc) => Ok(Some(bson::deserialize_from_document(doc)?)),
            None => Ok(None),
        }
    }

    /// Replaces `results` with every remaining document, then closes the cursor.
    ///
    /// # Errors
    /// The first iteration or decode error, else any close error.
    pub fn all<T: DeserializeOwned>(&mut self, results: &mut Vec<T>) -> Result<()> {
        results.clear();
        let drained = loop {
            match self.try_next() {
                Ok(Some(v)) => results.push(v),
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        let closed = self.close();
        drained?;
        closed
    }

    /// # Errors
    /// The driver failed to release the cursor.
    pub fn close(&mut self) -> Result<()> {
        match self.inner.take() {
            Some(mut inner) => inner.close(),
            None => Ok(()),
        }
    }

    #[must_use]
    pub const fn err(&self) -> Option<&DbError> {
        self.err.as_ref()
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::debug!("cursor close on drop failed: {e}");
        }
    }
}
