use bson::{Document, doc};
use odmlite::driver::memory::MemoryDriver;
use odmlite::{
    Collection, Config, Connection, Context, DbError, DefaultField, DefaultFieldHook, IndexModel, Model,
    OperationHook, Pipeline, Validate,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Book {
    #[serde(flatten)]
    fields: DefaultField,
    title: String,
    pages: i32,
}

impl Book {
    fn new(title: &str, pages: i32) -> Self {
        Self { title: title.into(), pages, ..Self::default() }
    }
}

impl Validate for Book {
    fn validate(&self) -> odmlite::Result<()> {
        if self.title.is_empty() {
            return Err(DbError::Validation("title is required".into()));
        }
        Ok(())
    }
}

impl Model for Book {
    fn default_field_hook(&mut self) -> Option<&mut dyn DefaultFieldHook> {
        Some(&mut self.fields)
    }

    fn validator(&self) -> Option<&dyn Validate> {
        Some(self)
    }
}

fn setup() -> (Arc<MemoryDriver>, Collection) {
    let driver = Arc::new(MemoryDriver::new());
    let conn = Connection::with_driver(driver.clone(), Config::default()).with_pipeline(Arc::new(Pipeline::new()));
    (driver, conn.database("library").collection("books"))
}

#[test]
fn insert_one_fills_defaults_before_encoding() {
    let (driver, coll) = setup();
    let mut book = Book::new("Dune", 412);
    coll.insert_one(&Context::background(), &mut book).unwrap();
    let stored = driver.documents(coll.namespace());
    assert_eq!(stored[0].get_object_id("_id").unwrap(), book.fields.id);
    assert_eq!(stored[0].get_datetime("createAt").unwrap(), &book.fields.create_at);
}

#[test]
fn invalid_document_never_reaches_the_driver() {
    let (driver, coll) = setup();
    driver.clear_operations();
    let err = coll.insert_one(&Context::background(), &mut Book::new("", 1)).unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));
    assert!(driver.operations().is_empty());
}

#[test]
fn insert_many_rejects_empty_slices_and_validates_each() {
    let (driver, coll) = setup();
    let ctx = Context::background();
    let mut none: Vec<Book> = Vec::new();
    assert!(matches!(coll.insert_many(&ctx, &mut none), Err(DbError::NotValidSliceToInsert)));

    let mut books = vec![Book::new("A", 1), Book::new("", 2), Book::new("C", 3)];
    assert!(coll.insert_many(&ctx, &mut books).is_err());
    assert!(driver.documents(coll.namespace()).is_empty());

    let mut books = vec![Book::new("A", 1), Book::new("B", 2)];
    let res = coll.insert_many(&ctx, &mut books).unwrap();
    assert_eq!(res.inserted_ids.len(), 2);
    assert!(books.iter().all(|b| !b.fields.id_is_zero()));
    assert_ne!(books[0].fields.id, books[1].fields.id);
}

#[test]
fn duplicate_id_is_reported_as_dup() {
    let (_, coll) = setup();
    let ctx = Context::background();
    let mut book = Book::new("Dune", 412);
    coll.insert_one(&ctx, &mut book).unwrap();
    let mut again = book.clone();
    assert!(coll.insert_one(&ctx, &mut again).unwrap_err().is_dup());
}

#[test]
fn upsert_inserts_then_replaces() {
    let (driver, coll) = setup();
    let ctx = Context::background();
    let mut book = Book::new("Emma", 300);
    let res = coll.upsert(&ctx, &doc! {"title": "Emma"}, &mut book).unwrap();
    assert_eq!(res.upserted_count(), 1);

    let mut loaded: Book = coll.find(&ctx).where_(doc! {"title": "Emma"}).one().unwrap();
    loaded.pages = 320;
    let res = coll.upsert_id(&ctx, loaded.fields.id, &mut loaded).unwrap();
    assert_eq!((res.matched, res.upserted_count()), (1, 0));
    assert_eq!(driver.documents(coll.namespace()).len(), 1);
    let reread: Book = coll.find(&ctx).one().unwrap();
    assert_eq!(reread.pages, 320);
    assert_eq!(reread.fields.create_at, book.fields.create_at);
}

#[test]
fn replace_one_requires_a_match() {
    let (_, coll) = setup();
    let ctx = Context::background();
    let err = coll.replace_one(&ctx, &doc! {"title": "nope"}, &mut Book::new("x", 1)).unwrap_err();
    assert!(err.is_no_documents());

    let mut book = Book::new("Ulysses", 730);
    coll.insert_one(&ctx, &mut book).unwrap();
    book.pages = 732;
    coll.replace_one(&ctx, &doc! {"_id": book.fields.id}, &mut book).unwrap();
    let got: Book = coll.find(&ctx).one().unwrap();
    assert_eq!(got.pages, 732);
    assert!(got.fields.update_at >= got.fields.create_at);
}

#[test]
fn replacement_with_operator_keys_is_rejected() {
    let (_, coll) = setup();
    let ctx = Context::background();
    let mut raw = doc! {"$set": {"a": 1}};
    let err = coll.upsert(&ctx, &doc! {}, &mut raw).unwrap_err();
    assert!(matches!(err, DbError::ReplacementContainUpdateOperators));
}

#[derive(Default)]
struct Tracker {
    phases: Vec<&'static str>,
}

impl OperationHook for Tracker {
    fn before_update(&mut self, _ctx: &Context) -> odmlite::Result<()> {
        self.phases.push("before_update");
        Ok(())
    }
    fn after_update(&mut self, _ctx: &Context) -> odmlite::Result<()> {
        self.phases.push("after_update");
        Ok(())
    }
    fn before_remove(&mut self, _ctx: &Context) -> odmlite::Result<()> {
        self.phases.push("before_remove");
        Ok(())
    }
    fn after_remove(&mut self, _ctx: &Context) -> odmlite::Result<()> {
        self.phases.push("after_remove");
        Ok(())
    }
}

impl Model for Tracker {
    fn operation_hook(&mut self) -> Option<&mut dyn OperationHook> {
        Some(self)
    }
}

fn shelf(coll: &Collection) {
    let mut docs: Vec<Document> = (1..=4).map(|i| doc! {"_id": i, "genre": if i % 2 == 0 { "sf" } else { "crime" }, "stock": 0}).collect();
    coll.insert_many(&Context::background(), &mut docs).unwrap();
}

#[test]
fn update_one_runs_hooks_and_reports_misses() {
    let (_, coll) = setup();
    shelf(&coll);
    let ctx = Context::background();
    let mut tracker = Tracker::default();
    coll.update_one(&ctx, &doc! {"_id": 2}, &doc! {"$inc": {"stock": 5}}, Some(&mut tracker)).unwrap();
    assert_eq!(tracker.phases, ["before_update", "after_update"]);
    let d: Document = coll.find(&ctx).where_(doc! {"_id": 2}).one().unwrap();
    assert_eq!(d.get_i32("stock").unwrap(), 5);

    let err = coll.update_id(&ctx, 99, &doc! {"$set": {"stock": 1}}, None).unwrap_err();
    assert!(err.is_no_documents());
    let err = coll.update_one(&ctx, &doc! {}, &doc! {"stock": 1}, None).unwrap_err();
    assert!(matches!(err, DbError::UpdateRequiresOperators));
}

#[test]
fn update_all_counts_matches() {
    let (_, coll) = setup();
    shelf(&coll);
    let ctx = Context::background();
    let res = coll.update_all(&ctx, &doc! {"genre": "sf"}, &doc! {"$set": {"stock": 2}}, None).unwrap();
    assert_eq!((res.matched, res.modified), (2, 2));
    let res = coll.update_all(&ctx, &doc! {"genre": "poetry"}, &doc! {"$set": {"stock": 2}}, None).unwrap();
    assert_eq!(res.matched, 0);
}

#[test]
fn remove_and_remove_all() {
    let (_, coll) = setup();
    shelf(&coll);
    let ctx = Context::background();
    let mut tracker = Tracker::default();
    coll.remove_id(&ctx, 1, Some(&mut tracker)).unwrap();
    assert_eq!(tracker.phases, ["before_remove", "after_remove"]);
    assert!(coll.remove(&ctx, &doc! {"_id": 1}, None).unwrap_err().is_no_documents());

    let res = coll.remove_all(&ctx, &doc! {"genre": "sf"}, None).unwrap();
    assert_eq!(res.deleted, 2);
    assert_eq!(coll.find(&ctx).count().unwrap(), 1);
}

#[test]
fn aggregate_all_one_and_iter() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Count {
        n: i64,
    }
    let (_, coll) = setup();
    shelf(&coll);
    let ctx = Context::background();
    let agg = coll.aggregate(&ctx, vec![doc! {"$match": {"genre": "crime"}}, doc! {"$sort": {"_id": -1}}]);
    assert_eq!(agg.stages().len(), 2);
    let docs: Vec<Document> = agg.all().unwrap();
    assert_eq!(docs.iter().map(|d| d.get_i32("_id").unwrap()).collect::<Vec<_>>(), [3, 1]);

    let counted: Count = coll.aggregate(&ctx, vec![doc! {"$count": "n"}]).one().unwrap();
    assert_eq!(counted, Count { n: 4 });

    let empty = coll.aggregate(&ctx, vec![doc! {"$match": {"genre": "poetry"}}]);
    assert!(empty.one::<Document>().unwrap_err().is_no_documents());

    let mut cursor = coll.aggregate(&ctx, vec![doc! {"$limit": 1}]).iter();
    let mut d = Document::new();
    assert!(cursor.next(&mut d));
    assert!(!cursor.next(&mut d));
    assert!(cursor.err().is_none());
}

#[test]
fn drop_and_create_collection() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = Connection::with_driver(driver.clone(), Config::default()).with_pipeline(Arc::new(Pipeline::new()));
    let db = conn.database("library");
    let ctx = Context::background();
    let coll = db.create_collection(&ctx, "loans").unwrap();
    assert_eq!(coll.name(), "loans");
    assert!(db.create_collection(&ctx, "loans").is_err());
    shelf(&coll);
    coll.drop(&ctx).unwrap();
    assert!(driver.documents(coll.namespace()).is_empty());
    shelf(&coll);
    db.drop_database(&ctx).unwrap();
    assert_eq!(coll.find(&ctx).count().unwrap(), 0);
}

#[test]
fn oversized_in_set_is_rejected_not_truncated() {
    let (_, coll) = setup();
    let ctx = Context::background();
    coll.insert_one(&ctx, &mut doc! {"_id": 1, "n": 999}).unwrap();
    let fits: Vec<i32> = (0..1000).collect();
    assert_eq!(coll.find(&ctx).where_([("n in", fits)]).count().unwrap(), 1);

    let long: Vec<i32> = (0..2000).collect();
    let err = coll.find(&ctx).where_([("n in", long.clone())]).count().unwrap_err();
    assert!(matches!(err, DbError::Driver(ref m) if m.contains("$in")));
    let err = coll.find(&ctx).where_([("n not in", long)]).count().unwrap_err();
    assert!(matches!(err, DbError::Driver(ref m) if m.contains("$nin")));
}

#[test]
fn oversized_update_is_rejected_and_leaves_the_document() {
    let (driver, coll) = setup();
    let ctx = Context::background();
    coll.insert_one(&ctx, &mut doc! {"_id": 1}).unwrap();
    let mut fields = Document::new();
    for i in 0..200 {
        fields.insert(format!("f{i}"), i);
    }
    let err = coll.update_id(&ctx, 1, &doc! {"$set": fields}, None).unwrap_err();
    assert!(matches!(err, DbError::Driver(_)));
    assert_eq!(driver.documents(coll.namespace()), vec![doc! {"_id": 1}]);
}

#[test]
fn oversized_sort_is_rejected() {
    let (_, coll) = setup();
    shelf(&coll);
    let ctx = Context::background();
    let keys: Vec<String> = (0..33).map(|i| format!("k{i}")).collect();
    let err = coll.find(&ctx).sort(&keys).all::<Document>().unwrap_err();
    assert!(matches!(err, DbError::Driver(ref m) if m.contains("sort keys")));
    let ok: Vec<Document> = coll.find(&ctx).sort(&keys[..32]).all().unwrap();
    assert_eq!(ok.len(), 4);
}

#[test]
fn run_command_reaches_the_database() {
    let driver = Arc::new(MemoryDriver::with_version("6.0.4"));
    let conn = Connection::with_driver(driver.clone(), Config::default()).with_pipeline(Arc::new(Pipeline::new()));
    let db = conn.database("library");
    let ctx = Context::background();
    assert_eq!(db.run_command(&ctx, &doc! {"ping": 1}).unwrap().get_f64("ok").unwrap(), 1.0);
    let info = db.run_command(&ctx, &doc! {"buildInfo": 1}).unwrap();
    assert_eq!(info.get_str("version").unwrap(), "6.0.4");
    shelf(&db.collection("books"));
    let n = db.run_command(&ctx, &doc! {"count": "books", "query": {"genre": "sf"}}).unwrap();
    assert_eq!(n.get_i64("n").unwrap(), 2);
    assert!(db.run_command(&ctx, &doc! {"noSuchCommand": 1}).is_err());
    assert!(driver.operations().contains(&"run_command".to_string()));
}

#[test]
fn indexes_are_created_listed_and_enforced() {
    let (_, coll) = setup();
    let ctx = Context::background();
    let names = coll
        .create_indexes(&ctx, &[IndexModel::new(["title"]).unique(), IndexModel::new(["-pages", "title"])])
        .unwrap();
    assert_eq!(names, ["title_1", "pages_-1_title_1"]);
    assert_eq!(coll.ensure_indexes(&ctx, &["-createAt"], false).unwrap(), ["createAt_-1"]);
    assert_eq!(coll.create_one_index(&ctx, IndexModel::new(["title"]).unique()).unwrap(), "title_1");

    let listed = coll.list_indexes(&ctx).unwrap();
    let keys: Vec<&Document> = listed.iter().map(|i| i.get_document("key").unwrap()).collect();
    assert_eq!(keys, [&doc! {"_id": 1}, &doc! {"title": 1}, &doc! {"pages": -1, "title": 1}, &doc! {"createAt": -1}]);
    assert!(listed[1].get_bool("unique").unwrap());

    coll.insert_one(&ctx, &mut Book::new("Dune", 412)).unwrap();
    let err = coll.insert_one(&ctx, &mut Book::new("Dune", 500)).unwrap_err();
    assert!(err.is_dup());
    assert_eq!(coll.find(&ctx).count().unwrap(), 1);

    let err = coll.create_one_index(&ctx, IndexModel::new(["title"])).unwrap_err();
    assert!(matches!(err, DbError::Driver(ref m) if m.contains("IndexOptionsConflict")));
    assert!(matches!(coll.create_indexes(&ctx, &[IndexModel::new(["-"])]), Err(DbError::EmptyFieldName(_))));
}

#[derive(Default)]
struct InsertAudit {
    fields: DefaultField,
    phases: Vec<&'static str>,
}

impl OperationHook for InsertAudit {
    fn before_insert(&mut self, _ctx: &Context) -> odmlite::Result<()> {
        self.phases.push("before_insert");
        Ok(())
    }
    fn after_insert(&mut self, _ctx: &Context) -> odmlite::Result<()> {
        self.phases.push("after_insert");
        Ok(())
    }
}

impl Model for InsertAudit {
    fn default_field_hook(&mut self) -> Option<&mut dyn DefaultFieldHook> {
        Some(&mut self.fields)
    }

    fn operation_hook(&mut self) -> Option<&mut dyn OperationHook> {
        Some(self)
    }
}

#[derive(Serialize)]
struct Plain {
    title: &'static str,
}

#[test]
fn insert_hook_receives_the_middleware_instead_of_the_document() {
    let (driver, coll) = setup();
    let ctx = Context::background();
    let mut audit = InsertAudit::default();
    coll.insert_one_with_hook(&ctx, &Plain { title: "Dune" }, &mut audit).unwrap();
    assert_eq!(audit.phases, ["before_insert", "after_insert"]);
    assert!(!audit.fields.id_is_zero());
    let stored = driver.documents(coll.namespace());
    assert_eq!(stored[0].get_str("title").unwrap(), "Dune");
    assert!(!stored[0].contains_key("createAt"));

    let mut audit = InsertAudit::default();
    let res = coll.insert_many_with_hook(&ctx, &[Plain { title: "A" }, Plain { title: "B" }], &mut audit).unwrap();
    assert_eq!(res.inserted_ids.len(), 2);
    assert_eq!(audit.phases, ["before_insert", "after_insert"]);
    let none: [Plain; 0] = [];
    assert!(matches!(coll.insert_many_with_hook(&ctx, &none, &mut audit), Err(DbError::NotValidSliceToInsert)));

    driver.clear_operations();
    let mut invalid = Book::new("", 1);
    let err = coll.insert_one_with_hook(&ctx, &Plain { title: "x" }, &mut invalid).unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));
    assert!(driver.operations().is_empty());
}
