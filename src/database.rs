use crate::collection::Collection;
use crate::driver::{Driver, Namespace};
use crate::errors::Result;
use crate::middleware::Pipeline;
use crate::types::Context;
use bson::Document;
use std::sync::Arc;

/// Handle to one database on a connection.
#[derive(Clone)]
pub struct Database {
    name: String,
    driver: Arc<dyn Driver>,
    pipeline: Arc<Pipeline>,
}

impl Database {
    pub(crate) fn new(name: impl Into<String>, driver: Arc<dyn Driver>, pipeline: Arc<Pipeline>) -> Self {
        Self { name: name.into(), driver, pipeline }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Collection handle. Nothing is created server-side until the first write.
    #[must_use]
    pub fn collection(&self, name: &str) -> Collection {
        Collection::new(Arc::clone(&self.driver), Namespace::new(&self.name, name), Arc::clone(&self.pipeline))
    }

    /// Creates the collection explicitly and returns its handle.
    ///
    /// # Errors
    /// Driver errors.
    pub fn create_collection(&self, ctx: &Context, name: &str) -> Result<Collection> {
        let coll = self.collection(name);
        self.driver.create_collection(ctx, coll.namespace())?;
        log::debug!("created collection {}", coll.namespace());
        Ok(coll)
    }

    /// Runs a raw command such as `{"ping": 1}` or `{"buildInfo": 1}` and returns
    /// the server's reply. The first key names the command, so `command` must keep
    /// its key order.
    ///
    /// # Errors
    /// Unknown commands, bad arguments or other driver errors.
    pub fn run_command(&self, ctx: &Context, command: &Document) -> Result<Document> {
        log::debug!("run command {:?} on {}", command.keys().next(), self.name);
        self.driver.run_command(ctx, &self.name, command)
    }

    /// # Errors
    /// Driver errors.
    pub fn drop_database(&self, ctx: &Context) -> Result<()> {
        log::debug!("drop database {}", self.name);
        self.driver.drop_database(ctx, &self.name)
    }
}
