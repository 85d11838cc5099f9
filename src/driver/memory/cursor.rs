use crate::driver::RawCursor;
use crate::errors::Result;
use crate::types::Context;
use bson::Document;
use std::collections::VecDeque;

/// Cursor over a materialized result set.
#[derive(Debug, Default)]
pub struct MemoryCursor {
    docs: VecDeque<Document>,
    closed: bool,
}

impl MemoryCursor {
    pub(crate) fn new(docs: Vec<Document>) -> Self {
        Self { docs: docs.into(), closed: false }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.docs.len()
    }
}

impl RawCursor for MemoryCursor {
    fn next_document(&mut self, ctx: &Context) -> Result<Option<Document>> {
        ctx.check()?;
        if self.closed {
            return Ok(None);
        }
        Ok(self.docs.pop_front())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.docs.clear();
        Ok(())
    }
}

impl Iterator for MemoryCursor {
    type Item = Document;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed { None } else { self.docs.pop_front() }
    }
}
