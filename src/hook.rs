//! Before/after operation hooks, the first built-in middleware callback.

use crate::errors::Result;
use crate::model::Model;
use crate::types::{Context, OpType};
use std::any::Any;

/// Phase-named side effects a document (or a hook object passed to a filter-only
/// operation) may run around each database call. Returning an error aborts the operation.
#[allow(unused_variables)]
pub trait OperationHook {
    fn before_insert(&mut self, ctx: &Context) -> Result<()> {
        Ok(())
    }
    fn after_insert(&mut self, ctx: &Context) -> Result<()> {
        Ok(())
    }
    fn before_update(&mut self, ctx: &Context) -> Result<()> {
        Ok(())
    }
    fn after_update(&mut self, ctx: &Context) -> Result<()> {
        Ok(())
    }
    fn before_replace(&mut self, ctx: &Context) -> Result<()> {
        Ok(())
    }
    fn after_replace(&mut self, ctx: &Context) -> Result<()> {
        Ok(())
    }
    fn before_remove(&mut self, ctx: &Context) -> Result<()> {
        Ok(())
    }
    fn after_remove(&mut self, ctx: &Context) -> Result<()> {
        Ok(())
    }
    fn before_upsert(&mut self, ctx: &Context) -> Result<()> {
        Ok(())
    }
    fn after_upsert(&mut self, ctx: &Context) -> Result<()> {
        Ok(())
    }
    fn before_query(&mut self, ctx: &Context) -> Result<()> {
        Ok(())
    }
    fn after_query(&mut self, ctx: &Context) -> Result<()> {
        Ok(())
    }
}

/// Middleware callback: routes the phase to the matching `OperationHook` method.
pub fn dispatch(ctx: &Context, doc: &mut dyn Model, op: OpType, _opts: &[&dyn Any]) -> Result<()> {
    let Some(hook) = doc.operation_hook() else {
        return Ok(());
    };
    match op {
        OpType::BeforeInsert => hook.before_insert(ctx),
        OpType::AfterInsert => hook.after_insert(ctx),
        OpType::BeforeUpdate => hook.before_update(ctx),
        OpType::AfterUpdate => hook.after_update(ctx),
        OpType::BeforeReplace => hook.before_replace(ctx),
        OpType::AfterReplace => hook.after_replace(ctx),
        OpType::BeforeRemove => hook.before_remove(ctx),
        OpType::AfterRemove => hook.after_remove(ctx),
        OpType::BeforeUpsert => hook.before_upsert(ctx),
        OpType::AfterUpsert => hook.after_upsert(ctx),
        OpType::BeforeQuery => hook.before_query(ctx),
        OpType::AfterQuery => hook.after_query(ctx),
    }
}
