//! Ordered callback pipeline run before and after every database operation.
//!
//! A `Pipeline` starts with three built-ins (operation hooks, field defaulting,
//! validation) and accepts further callbacks through `register`. A process-wide
//! default instance backs the free functions `register` and `run`; connections
//! may also carry their own pipeline.

use crate::errors::Result;
use crate::model::{Capabilities, Model};
use crate::types::{Context, OpType};
use crate::{field, hook, validator};
use parking_lot::RwLock;
use std::any::Any;
use std::sync::{Arc, LazyLock};

/// A middleware callback. Receives the operation context, one document, the
/// phase and any caller-supplied options; an error aborts the operation.
pub type Callback = Arc<dyn Fn(&Context, &mut dyn Model, OpType, &[&dyn Any]) -> Result<()> + Send + Sync>;

/// Documents handed to a pipeline run.
pub enum Docs<'a> {
    /// Filter-only operation without a hook object: callbacks are skipped.
    Empty,
    One(&'a mut dyn Model),
    /// Ordered sequence; each callback visits every element before the next callback runs.
    Many(Vec<&'a mut dyn Model>),
}

impl<'a> Docs<'a> {
    pub fn one<T: Model>(doc: &'a mut T) -> Self {
        Docs::One(doc)
    }

    pub fn many<T: Model>(docs: &'a mut [T]) -> Self {
        Docs::Many(docs.iter_mut().map(|d| d as &mut dyn Model).collect())
    }

    pub fn optional(doc: Option<&'a mut dyn Model>) -> Self {
        match doc {
            Some(d) => Docs::One(d),
            None => Docs::Empty,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Docs::Empty => 0,
            Docs::One(_) => 1,
            Docs::Many(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct Pipeline {
    callbacks: RwLock<Vec<Callback>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Pipeline pre-loaded with hook dispatch, field defaulting and validation, in that order.
    #[must_use]
    pub fn new() -> Self {
        let builtins: Vec<Callback> = vec![
            Arc::new(hook::dispatch) as Callback,
            Arc::new(field::dispatch) as Callback,
            Arc::new(validator::dispatch) as Callback,
        ];
        Self { callbacks: RwLock::new(builtins) }
    }

    /// Pipeline with no callbacks at all.
    #[must_use]
    pub fn empty() -> Self {
        Self { callbacks: RwLock::new(Vec::new()) }
    }

    /// Appends a callback after all existing ones.
    pub fn register<F>(&self, cb: F)
    where
        F: Fn(&Context, &mut dyn Model, OpType, &[&dyn Any]) -> Result<()> + Send + Sync + 'static,
    {
        let mut list = self.callbacks.write();
        list.push(Arc::new(cb));
        log::debug!("middleware: registered callback #{}", list.len());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }

    /// Runs every callback, in registration order, over `docs`. Stops at the
    /// first error and returns it.
    ///
    /// # Errors
    /// The context's cancellation error, or the first callback error.
    pub fn run(&self, ctx: &Context, docs: &mut Docs<'_>, op: OpType, opts: &[&dyn Any]) -> Result<()> {
        ctx.check()?;
        if docs.is_empty() {
            return Ok(());
        }
        // Snapshot so callbacks can register without deadlocking.
        let callbacks: Vec<Callback> = self.callbacks.read().clone();
        if log::log_enabled!(log::Level::Trace)
            && let Docs::One(d) = docs
        {
            log::trace!("middleware: {op} on {:?}", Capabilities::of(&mut **d));
        }
        for cb in &callbacks {
            match docs {
                Docs::Empty => {}
                Docs::One(d) => cb(ctx, &mut **d, op, opts)?,
                Docs::Many(list) => {
                    for d in list.iter_mut() {
                        cb(ctx, &mut **d, op, opts)?;
                    }
                }
            }
        }
        Ok(())
    }
}

static DEFAULT_PIPELINE: LazyLock<Arc<Pipeline>> = LazyLock::new(|| Arc::new(Pipeline::new()));

/// Process-wide pipeline used by connections that were not given their own.
#[must_use]
pub fn default_pipeline() -> Arc<Pipeline> {
    Arc::clone(&DEFAULT_PIPELINE)
}

/// Appends a callback to the process-wide pipeline.
pub fn register<F>(cb: F)
where
    F: Fn(&Context, &mut dyn Model, OpType, &[&dyn Any]) -> Result<()> + Send + Sync + 'static,
{
    DEFAULT_PIPELINE.register(cb);
}

/// Runs the process-wide pipeline.
///
/// # Errors
/// See [`Pipeline::run`].
pub fn run(ctx: &Context, docs: &mut Docs<'_>, op: OpType, opts: &[&dyn Any]) -> Result<()> {
    DEFAULT_PIPELINE.run(ctx, docs, op, opts)
}
