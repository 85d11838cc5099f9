//! In-process `Driver` backed by plain vectors of documents.
//!
//! Filters, sorts, projections and update operators are evaluated locally, so
//! the whole ODM layer runs without a server. Transactions are coarse: starting
//! one snapshots every database, aborting restores that snapshot.

mod cursor;
mod eval;
mod filter;
mod index;
mod update;

pub use cursor::MemoryCursor;

use crate::connection::ClientOptions;
use crate::driver::{
    Connector, CountOptions, DeleteReport, Driver, FindAndModifyOptions, FindOptions, IndexModel,
    InsertManyResult, InsertOneResult, Namespace, RawCursor, UpdateOptions, UpdateReport,
};
use crate::errors::{DbError, Result};
use crate::types::{Context, SessionId};
use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use eval::{bson_equal, compare_docs, eval_filter, get_path, project, sort_keys};
use filter::{Predicate, parse_filter};
use index::{IndexSpec, merge};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use update::{UpdateDoc, apply_update, set_path};

pub const DEFAULT_SERVER_VERSION: &str = "7.0.0";

type Collections = BTreeMap<String, Vec<Document>>;

#[derive(Debug, Clone, Default)]
struct Store {
    databases: BTreeMap<String, Collections>,
}

impl Store {
    fn docs(&self, ns: &Namespace) -> &[Document] {
        self.databases
            .get(&ns.database)
            .and_then(|c| c.get(&ns.collection))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn docs_mut(&mut self, ns: &Namespace) -> &mut Vec<Document> {
        self.databases.entry(ns.database.clone()).or_default().entry(ns.collection.clone()).or_default()
    }
}

pub struct MemoryDriver {
    store: RwLock<Store>,
    indexes: RwLock<HashMap<Namespace, Vec<IndexSpec>>>,
    snapshots: Mutex<HashMap<SessionId, Store>>,
    version: RwLock<String>,
    operations: Mutex<Vec<String>>,
    connected: AtomicBool,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::with_version(DEFAULT_SERVER_VERSION)
    }

    #[must_use]
    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            store: RwLock::new(Store::default()),
            indexes: RwLock::new(HashMap::new()),
            snapshots: Mutex::new(HashMap::new()),
            version: RwLock::new(version.into()),
            operations: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }

    pub fn set_server_version(&self, version: impl Into<String>) {
        *self.version.write() = version.into();
    }

    /// Names of the driver calls made so far, oldest first.
    #[must_use]
    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().clone()
    }

    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    /// Copy of every document currently stored under `ns`, in insertion order.
    #[must_use]
    pub fn documents(&self, ns: &Namespace) -> Vec<Document> {
        self.store.read().docs(ns).to_vec()
    }

    fn enter(&self, ctx: &Context, op: &str) -> Result<()> {
        ctx.check()?;
        if !self.connected.load(Ordering::SeqCst) {
            return Err(DbError::Driver("client is disconnected".into()));
        }
        self.operations.lock().push(op.to_string());
        log::trace!("memory driver: {op}");
        Ok(())
    }

    /// Unique secondary indexes on `ns`. Taken before the store lock.
    fn unique_indexes(&self, ns: &Namespace) -> Vec<IndexSpec> {
        self.indexes.read().get(ns).map(|all| all.iter().filter(|i| i.unique).cloned().collect()).unwrap_or_default()
    }

    fn select(&self, ctx: &Context, ns: &Namespace, filter: &Document, sort: Option<&Document>) -> Result<Vec<Document>> {
        let pred = parse_filter(filter)?;
        let keys = sort.map(sort_keys).transpose()?;
        let store = self.store.read();
        let mut out = Vec::new();
        for d in store.docs(ns) {
            ctx.check()?;
            if eval_filter(d, &pred) {
                out.push(d.clone());
            }
        }
        if let Some(keys) = keys {
            out.sort_by(|a, b| compare_docs(a, b, &keys));
        }
        Ok(out)
    }

    fn find_and_modify<F>(
        &self,
        ctx: &Context,
        ns: &Namespace,
        filter: &Document,
        opts: &FindAndModifyOptions,
        modify: F,
    ) -> Result<Option<Document>>
    where
        F: FnOnce(&mut Vec<Document>, Option<usize>) -> Result<(Option<Document>, Option<Document>)>,
    {
        let pred = parse_filter(filter)?;
        let keys = opts.sort.as_ref().map(sort_keys).transpose()?;
        let mut store = self.store.write();
        let docs = store.docs_mut(ns);
        let pos = first_match(docs, &pred, keys.as_deref());
        let (before, after) = modify(docs, pos)?;
        let out = if opts.return_new { after } else { before };
        match (out, &opts.projection) {
            (Some(d), Some(p)) => Ok(Some(project(&d, p)?)),
            (out, _) => Ok(out),
        }
    }
}

fn first_match(docs: &[Document], pred: &Predicate, keys: Option<&[(String, bool)]>) -> Option<usize> {
    let mut hits = docs.iter().enumerate().filter(|(_, d)| eval_filter(d, pred));
    match keys {
        None => hits.next().map(|(i, _)| i),
        Some(keys) => hits.min_by(|(_, a), (_, b)| compare_docs(a, b, keys)).map(|(i, _)| i),
    }
}

fn page(mut docs: Vec<Document>, skip: Option<u64>, limit: Option<i64>) -> Vec<Document> {
    let skip = usize::try_from(skip.unwrap_or(0)).unwrap_or(usize::MAX);
    if skip >= docs.len() {
        return Vec::new();
    }
    docs.drain(..skip);
    if let Some(limit) = limit.filter(|l| *l != 0) {
        docs.truncate(usize::try_from(limit.unsigned_abs()).unwrap_or(usize::MAX));
    }
    docs
}

/// Puts an `_id` first, generating an ObjectId when the document has none.
fn ensure_id(doc: Document) -> (Document, Bson) {
    if let Some(id) = doc.get("_id") {
        let id = id.clone();
        return (doc, id);
    }
    let id = Bson::ObjectId(ObjectId::new());
    let mut out = Document::new();
    out.insert("_id", id.clone());
    for (k, v) in doc {
        out.insert(k, v);
    }
    (out, id)
}

fn check_unique(docs: &[Document], ns: &Namespace, doc: &Document, id: &Bson, unique: &[IndexSpec]) -> Result<()> {
    if docs.iter().any(|d| d.get("_id").is_some_and(|x| bson_equal(x, id))) {
        return Err(DbError::Driver(format!(
            "E11000 duplicate key error collection: {ns} index: _id_ dup key: {{ _id: {id} }}"
        )));
    }
    unique.iter().try_for_each(|index| index.admit(docs, ns, doc))
}

fn check_replacement(doc: &Document) -> Result<()> {
    if doc.keys().any(|k| k.starts_with('$')) {
        return Err(DbError::ReplacementContainUpdateOperators);
    }
    Ok(())
}

/// New document for an upsert miss: the filter's equality conditions.
fn seed_from_filter(filter: &Document) -> Document {
    let mut out = Document::new();
    for (k, v) in filter {
        if k == "$and" {
            if let Bson::Array(items) = v {
                for item in items {
                    if let Bson::Document(d) = item {
                        for (k2, v2) in seed_from_filter(d) {
                            set_path(&mut out, &k2, v2);
                        }
                    }
                }
            }
            continue;
        }
        if k.starts_with('$') {
            continue;
        }
        match v {
            Bson::Document(d) if d.keys().next().is_some_and(|x| x.starts_with('$')) => {
                if let Some(eq) = d.get("$eq") {
                    set_path(&mut out, k, eq.clone());
                }
            }
            other => {
                set_path(&mut out, k, other.clone());
            }
        }
    }
    out
}

/// Replacement keeping the stored `_id`; a differing `_id` is rejected.
fn replaced(existing: &Document, replacement: Document) -> Result<Document> {
    let id = existing.get("_id").cloned();
    if let (Some(old), Some(new)) = (&id, replacement.get("_id"))
        && !bson_equal(old, new)
    {
        return Err(DbError::Driver(
            "ImmutableField: the (immutable) field '_id' was found to have been altered".into(),
        ));
    }
    let mut out = Document::new();
    if let Some(id) = id {
        out.insert("_id", id);
    }
    for (k, v) in replacement {
        if k != "_id" {
            out.insert(k, v);
        }
    }
    Ok(out)
}

fn upsert_replacement(filter: &Document, replacement: Document) -> Document {
    if replacement.contains_key("_id") {
        return replacement;
    }
    match seed_from_filter(filter).get("_id") {
        Some(id) => {
            let mut out = Document::new();
            out.insert("_id", id.clone());
            for (k, v) in replacement {
                out.insert(k, v);
            }
            out
        }
        None => replacement,
    }
}

/// Stage-by-stage evaluation of the supported aggregation stages.
fn run_pipeline(ctx: &Context, mut docs: Vec<Document>, pipeline: &[Document]) -> Result<Vec<Document>> {
    for stage in pipeline {
        ctx.check()?;
        let mut it = stage.iter();
        let (Some((name, arg)), None) = (it.next(), it.next()) else {
            return Err(DbError::Driver("A pipeline stage specification object must contain exactly one field.".into()));
        };
        docs = match (name.as_str(), arg) {
            ("$match", Bson::Document(f)) => {
                let pred = parse_filter(f)?;
                docs.into_iter().filter(|d| eval_filter(d, &pred)).collect()
            }
            ("$sort", Bson::Document(s)) => {
                let keys = sort_keys(s)?;
                docs.sort_by(|a, b| compare_docs(a, b, &keys));
                docs
            }
            ("$skip", n) => page(docs, Some(as_count(name, n)?), None),
            ("$limit", n) => {
                let limit = as_count(name, n)?;
                docs.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
                docs
            }
            ("$project", Bson::Document(p)) => docs.iter().map(|d| project(d, p)).collect::<Result<_>>()?,
            ("$count", Bson::String(field)) => {
                let n = i64::try_from(docs.len()).unwrap_or(i64::MAX);
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let mut out = Document::new();
                    out.insert(field.clone(), n);
                    vec![out]
                }
            }
            (other, _) => {
                return Err(DbError::Driver(format!("Unrecognized pipeline stage name: '{other}'")));
            }
        };
    }
    Ok(docs)
}

fn as_count(stage: &str, v: &Bson) -> Result<u64> {
    let n = match v {
        Bson::Int32(i) => i64::from(*i),
        Bson::Int64(i) => *i,
        _ => -1,
    };
    u64::try_from(n).map_err(|_| DbError::Driver(format!("{stage} requires a non-negative integer")))
}

impl Driver for MemoryDriver {
    fn ping(&self, ctx: &Context) -> Result<()> {
        self.enter(ctx, "ping")
    }

    fn disconnect(&self, ctx: &Context) -> Result<()> {
        self.enter(ctx, "disconnect")?;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn server_version(&self, ctx: &Context) -> Result<String> {
        self.enter(ctx, "server_version")?;
        Ok(self.version.read().clone())
    }

    fn insert_one(&self, ctx: &Context, ns: &Namespace, doc: Document) -> Result<InsertOneResult> {
        self.enter(ctx, "insert_one")?;
        let (doc, id) = ensure_id(doc);
        let unique = self.unique_indexes(ns);
        let mut store = self.store.write();
        let docs = store.docs_mut(ns);
        check_unique(docs, ns, &doc, &id, &unique)?;
        docs.push(doc);
        Ok(InsertOneResult { inserted_id: id })
    }

    fn insert_many(&self, ctx: &Context, ns: &Namespace, docs: Vec<Document>) -> Result<InsertManyResult> {
        self.enter(ctx, "insert_many")?;
        let unique = self.unique_indexes(ns);
        let mut store = self.store.write();
        let stored = store.docs_mut(ns);
        let mut inserted_ids = Vec::with_capacity(docs.len());
        // Ordered semantics: documents before a failure stay inserted.
        for doc in docs {
            let (doc, id) = ensure_id(doc);
            check_unique(stored, ns, &doc, &id, &unique)?;
            stored.push(doc);
            inserted_ids.push(id);
        }
        Ok(InsertManyResult { inserted_ids })
    }

    fn update(
        &self,
        ctx: &Context,
        ns: &Namespace,
        filter: &Document,
        update: &Document,
        opts: &UpdateOptions,
    ) -> Result<UpdateReport> {
        self.enter(ctx, "update")?;
        let upd = UpdateDoc::parse(update)?;
        let pred = parse_filter(filter)?;
        let unique = self.unique_indexes(ns);
        let mut store = self.store.write();
        let docs = store.docs_mut(ns);
        let mut report = UpdateReport::default();
        for d in docs.iter_mut() {
            if !eval_filter(d, &pred) {
                continue;
            }
            report.matched += 1;
            if apply_update(d, &upd)? {
                report.modified += 1;
            }
            if !opts.multi {
                break;
            }
        }
        if report.matched == 0 && opts.upsert {
            let mut seeded = seed_from_filter(filter);
            apply_update(&mut seeded, &upd)?;
            let (seeded, id) = ensure_id(seeded);
            check_unique(docs, ns, &seeded, &id, &unique)?;
            docs.push(seeded);
            report.upserted_id = Some(id);
        }
        Ok(report)
    }

    fn replace_one(
        &self,
        ctx: &Context,
        ns: &Namespace,
        filter: &Document,
        replacement: Document,
        opts: &UpdateOptions,
    ) -> Result<UpdateReport> {
        self.enter(ctx, "replace_one")?;
        check_replacement(&replacement)?;
        let pred = parse_filter(filter)?;
        let unique = self.unique_indexes(ns);
        let mut store = self.store.write();
        let docs = store.docs_mut(ns);
        if let Some(i) = first_match(docs, &pred, None) {
            let next = replaced(&docs[i], replacement)?;
            let modified = u64::from(docs[i] != next);
            docs[i] = next;
            return Ok(UpdateReport { matched: 1, modified, upserted_id: None });
        }
        if !opts.upsert {
            return Ok(UpdateReport::default());
        }
        let (doc, id) = ensure_id(upsert_replacement(filter, replacement));
        check_unique(docs, ns, &doc, &id, &unique)?;
        docs.push(doc);
        Ok(UpdateReport { matched: 0, modified: 0, upserted_id: Some(id) })
    }

    fn delete(&self, ctx: &Context, ns: &Namespace, filter: &Document, multi: bool) -> Result<DeleteReport> {
        self.enter(ctx, "delete")?;
        let pred = parse_filter(filter)?;
        let mut store = self.store.write();
        let docs = store.docs_mut(ns);
        let before = docs.len();
        if multi {
            docs.retain(|d| !eval_filter(d, &pred));
        } else if let Some(i) = first_match(docs, &pred, None) {
            docs.remove(i);
        }
        Ok(DeleteReport { deleted: (before - docs.len()) as u64 })
    }

    fn find(&self, ctx: &Context, ns: &Namespace, filter: &Document, opts: &FindOptions) -> Result<Box<dyn RawCursor>> {
        self.enter(ctx, "find")?;
        let docs = page(self.select(ctx, ns, filter, opts.sort.as_ref())?, opts.skip, opts.limit);
        let docs = match &opts.projection {
            Some(p) => docs.iter().map(|d| project(d, p)).collect::<Result<Vec<_>>>()?,
            None => docs,
        };
        Ok(Box::new(MemoryCursor::new(docs)))
    }

    fn find_one(&self, ctx: &Context, ns: &Namespace, filter: &Document, opts: &FindOptions) -> Result<Option<Document>> {
        self.enter(ctx, "find_one")?;
        let docs = page(self.select(ctx, ns, filter, opts.sort.as_ref())?, opts.skip, Some(1));
        match (docs.into_iter().next(), &opts.projection) {
            (Some(d), Some(p)) => Ok(Some(project(&d, p)?)),
            (d, _) => Ok(d),
        }
    }

    fn count(&self, ctx: &Context, ns: &Namespace, filter: &Document, opts: &CountOptions) -> Result<u64> {
        self.enter(ctx, "count")?;
        let docs = page(self.select(ctx, ns, filter, None)?, opts.skip, opts.limit);
        Ok(docs.len() as u64)
    }

    fn distinct(&self, ctx: &Context, ns: &Namespace, key: &str, filter: &Document) -> Result<Vec<Bson>> {
        self.enter(ctx, "distinct")?;
        let mut out: Vec<Bson> = Vec::new();
        let mut push = |v: &Bson| {
            if !out.iter().any(|x| bson_equal(x, v)) {
                out.push(v.clone());
            }
        };
        for d in self.select(ctx, ns, filter, None)? {
            match get_path(&d, key) {
                Some(Bson::Array(items)) => items.iter().for_each(&mut push),
                Some(v) => push(v),
                None => {}
            }
        }
        Ok(out)
    }

    fn find_one_and_delete(
        &self,
        ctx: &Context,
        ns: &Namespace,
        filter: &Document,
        opts: &FindAndModifyOptions,
    ) -> Result<Option<Document>> {
        self.enter(ctx, "find_one_and_delete")?;
        // The removed document is always the one returned.
        let opts = FindAndModifyOptions { return_new: false, upsert: false, ..opts.clone() };
        self.find_and_modify(ctx, ns, filter, &opts, |docs, pos| {
            Ok((pos.map(|i| docs.remove(i)), None))
        })
    }

    fn find_one_and_replace(
        &self,
        ctx: &Context,
        ns: &Namespace,
        filter: &Document,
        replacement: Document,
        opts: &FindAndModifyOptions,
    ) -> Result<Option<Document>> {
        self.enter(ctx, "find_one_and_replace")?;
        check_replacement(&replacement)?;
        let upsert = opts.upsert;
        let unique = self.unique_indexes(ns);
        self.find_and_modify(ctx, ns, filter, opts, |docs, pos| match pos {
            Some(i) => {
                let next = replaced(&docs[i], replacement)?;
                let before = std::mem::replace(&mut docs[i], next.clone());
                Ok((Some(before), Some(next)))
            }
            None if upsert => {
                let (doc, id) = ensure_id(upsert_replacement(filter, replacement));
                check_unique(docs, ns, &doc, &id, &unique)?;
                docs.push(doc.clone());
                Ok((None, Some(doc)))
            }
            None => Ok((None, None)),
        })
    }

    fn find_one_and_update(
        &self,
        ctx: &Context,
        ns: &Namespace,
        filter: &Document,
        update: &Document,
        opts: &FindAndModifyOptions,
    ) -> Result<Option<Document>> {
        self.enter(ctx, "find_one_and_update")?;
        let upd = UpdateDoc::parse(update)?;
        let upsert = opts.upsert;
        let unique = self.unique_indexes(ns);
        self.find_and_modify(ctx, ns, filter, opts, |docs, pos| match pos {
            Some(i) => {
                let before = docs[i].clone();
                apply_update(&mut docs[i], &upd)?;
                Ok((Some(before), Some(docs[i].clone())))
            }
            None if upsert => {
                let mut seeded = seed_from_filter(filter);
                apply_update(&mut seeded, &upd)?;
                let (doc, id) = ensure_id(seeded);
                check_unique(docs, ns, &doc, &id, &unique)?;
                docs.push(doc.clone());
                Ok((None, Some(doc)))
            }
            None => Ok((None, None)),
        })
    }

    fn aggregate(&self, ctx: &Context, ns: &Namespace, pipeline: &[Document]) -> Result<Box<dyn RawCursor>> {
        self.enter(ctx, "aggregate")?;
        let docs = self.store.read().docs(ns).to_vec();
        Ok(Box::new(MemoryCursor::new(run_pipeline(ctx, docs, pipeline)?)))
    }

    fn run_command(&self, ctx: &Context, database: &str, command: &Document) -> Result<Document> {
        self.enter(ctx, "run_command")?;
        let Some((name, arg)) = command.iter().next() else {
            return Err(DbError::Driver("BadValue: empty command document".into()));
        };
        log::trace!("memory driver: command {name} on {database}");
        match name.as_str() {
            "ping" => Ok(doc! {"ok": 1.0}),
            "buildInfo" | "buildinfo" => Ok(doc! {"version": self.version.read().as_str(), "ok": 1.0}),
            "listCollections" => {
                let names: Vec<Bson> = self
                    .store
                    .read()
                    .databases
                    .get(database)
                    .map(|colls| colls.keys().map(|c| Bson::Document(doc! {"name": c.as_str(), "type": "collection"})).collect())
                    .unwrap_or_default();
                Ok(doc! {
                    "cursor": {"id": 0_i64, "ns": format!("{database}.$cmd.listCollections"), "firstBatch": names},
                    "ok": 1.0,
                })
            }
            "count" => {
                let Bson::String(coll) = arg else {
                    return Err(DbError::Driver(format!("BadValue: count expects a collection name, got {arg}")));
                };
                let query = match command.get("query") {
                    Some(Bson::Document(q)) => q.clone(),
                    Some(other) => return Err(DbError::Driver(format!("BadValue: count query must be a document, got {other}"))),
                    None => Document::new(),
                };
                let n = self.select(ctx, &Namespace::new(database, coll), &query, None)?.len();
                Ok(doc! {"n": i64::try_from(n).unwrap_or(i64::MAX), "ok": 1.0})
            }
            other => Err(DbError::Driver(format!("CommandNotFound: no such command: '{other}'"))),
        }
    }

    fn create_indexes(&self, ctx: &Context, ns: &Namespace, models: &[IndexModel]) -> Result<Vec<String>> {
        self.enter(ctx, "create_indexes")?;
        if models.is_empty() {
            return Err(DbError::Driver("BadValue: must specify at least one index".into()));
        }
        let specs = models.iter().map(IndexSpec::from_model).collect::<Result<Vec<_>>>()?;
        let mut indexes = self.indexes.write();
        let mut next = indexes.get(ns).cloned().unwrap_or_else(|| vec![IndexSpec::primary()]);
        let mut store = self.store.write();
        let docs = store.docs_mut(ns);
        let mut names = Vec::with_capacity(specs.len());
        for spec in specs {
            spec.admit_all(docs, ns)?;
            names.push(spec.name.clone());
            merge(&mut next, spec)?;
        }
        indexes.insert(ns.clone(), next);
        Ok(names)
    }

    fn list_indexes(&self, ctx: &Context, ns: &Namespace) -> Result<Vec<Document>> {
        self.enter(ctx, "list_indexes")?;
        if let Some(all) = self.indexes.read().get(ns) {
            return Ok(all.iter().map(IndexSpec::describe).collect());
        }
        let exists = self.store.read().databases.get(&ns.database).is_some_and(|c| c.contains_key(&ns.collection));
        if !exists {
            return Err(DbError::Driver(format!("NamespaceNotFound: ns does not exist: {ns}")));
        }
        Ok(vec![IndexSpec::primary().describe()])
    }

    fn create_collection(&self, ctx: &Context, ns: &Namespace) -> Result<()> {
        self.enter(ctx, "create_collection")?;
        let mut store = self.store.write();
        let colls = store.databases.entry(ns.database.clone()).or_default();
        if colls.contains_key(&ns.collection) {
            return Err(DbError::Driver(format!("NamespaceExists: Collection {ns} already exists.")));
        }
        colls.insert(ns.collection.clone(), Vec::new());
        Ok(())
    }

    fn drop_collection(&self, ctx: &Context, ns: &Namespace) -> Result<()> {
        self.enter(ctx, "drop_collection")?;
        self.indexes.write().remove(ns);
        if let Some(colls) = self.store.write().databases.get_mut(&ns.database) {
            colls.remove(&ns.collection);
        }
        Ok(())
    }

    fn drop_database(&self, ctx: &Context, database: &str) -> Result<()> {
        self.enter(ctx, "drop_database")?;
        self.indexes.write().retain(|ns, _| ns.database != database);
        self.store.write().databases.remove(database);
        Ok(())
    }

    fn start_transaction(&self, ctx: &Context, session: SessionId) -> Result<()> {
        self.enter(ctx, "start_transaction")?;
        let mut snaps = self.snapshots.lock();
        if snaps.contains_key(&session) {
            return Err(DbError::Driver("Transaction already in progress".into()));
        }
        snaps.insert(session, self.store.read().clone());
        Ok(())
    }

    fn commit_transaction(&self, ctx: &Context, session: SessionId) -> Result<()> {
        self.enter(ctx, "commit_transaction")?;
        match self.snapshots.lock().remove(&session) {
            Some(_) => Ok(()),
            None => Err(DbError::Driver("No transaction started".into())),
        }
    }

    fn abort_transaction(&self, ctx: &Context, session: SessionId) -> Result<()> {
        self.enter(ctx, "abort_transaction")?;
        match self.snapshots.lock().remove(&session) {
            Some(snapshot) => {
                *self.store.write() = snapshot;
                Ok(())
            }
            None => Err(DbError::Driver("No transaction started".into())),
        }
    }
}

/// Hands out one shared `MemoryDriver`, so tests can inspect what a connection did.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    driver: Arc<MemoryDriver>,
}

impl MemoryConnector {
    #[must_use]
    pub fn new(driver: Arc<MemoryDriver>) -> Self {
        Self { driver }
    }

    #[must_use]
    pub fn driver(&self) -> Arc<MemoryDriver> {
        Arc::clone(&self.driver)
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, ctx: &Context, opts: &ClientOptions) -> Result<Arc<dyn Driver>> {
        ctx.check()?;
        log::debug!("memory connector: connecting to {}", opts.uri);
        self.driver.connected.store(true, Ordering::SeqCst);
        Ok(Arc::clone(&self.driver) as Arc<dyn Driver>)
    }
}
