use crate::aggregate::Aggregate;
use crate::driver::{Driver, Namespace};
use crate::errors::Result;
use crate::middleware::{Docs, Pipeline};
use crate::model::Model;
use crate::query::Query;
use crate::types::{Context, OpType};
use bson::Document;
use std::any::Any;
use std::sync::Arc;

/// Handle to one collection. Cheap to clone; clones share the driver and pipeline.
#[derive(Clone)]
pub struct Collection {
    driver: Arc<dyn Driver>,
    ns: Namespace,
    pipeline: Arc<Pipeline>,
}

impl Collection {
    pub(crate) fn new(driver: Arc<dyn Driver>, ns: Namespace, pipeline: Arc<Pipeline>) -> Self {
        Self { driver, ns, pipeline }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.ns.collection
    }

    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.ns
    }

    pub(crate) fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub(crate) fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Starts a query; chain `where_` / `sort` / ... and finish with an executor.
    #[must_use]
    pub fn find(&self, ctx: &Context) -> Query {
        Query::new(ctx.clone(), self.clone())
    }

    #[must_use]
    pub fn aggregate(&self, ctx: &Context, pipeline: Vec<Document>) -> Aggregate {
        Aggregate::new(ctx.clone(), self.clone(), pipeline)
    }

    /// # Errors
    /// Driver errors.
    pub fn drop(&self, ctx: &Context) -> Result<()> {
        log::debug!("drop collection {}", self.ns);
        self.driver.drop_collection(ctx, &self.ns)
    }

    /// Runs one phase on an optional hook object (filter-only operations).
    pub(crate) fn run_hook(
        &self,
        ctx: &Context,
        hook: &mut Option<&mut dyn Model>,
        op: OpType,
        opts: &[&dyn Any],
    ) -> Result<()> {
        let mut docs = match hook {
            Some(h) => Docs::One(&mut **h),
            None => Docs::Empty,
        };
        self.pipeline.run(ctx, &mut docs, op, opts)
    }
}
