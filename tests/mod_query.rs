use bson::{Bson, Document, doc};
use odmlite::driver::memory::MemoryDriver;
use odmlite::query::{Change, CmpOp, Combinator, compile_filter};
use odmlite::{Collection, Config, Connection, Context, DbError, Model, OperationHook, Pipeline};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct User {
    name: String,
    age: i32,
}

fn setup() -> (Arc<MemoryDriver>, Collection) {
    let driver = Arc::new(MemoryDriver::new());
    let conn = Connection::with_driver(driver.clone(), Config::default()).with_pipeline(Arc::new(Pipeline::new()));
    (driver, conn.database("app").collection("users"))
}

fn seeded() -> (Arc<MemoryDriver>, Collection) {
    let (driver, coll) = setup();
    let mut docs = vec![
        doc! {"_id": 1, "name": "Alice", "age": 30, "role": "admin"},
        doc! {"_id": 2, "name": "Bob", "age": 17, "role": "guest"},
        doc! {"_id": 3, "name": "Carol", "age": 45, "role": "dev"},
        doc! {"_id": 4, "name": "Dan", "age": 30, "role": "dev"},
        doc! {"_id": 5, "name": "Eve", "age": 22, "role": "guest"},
    ];
    coll.insert_many(&Context::background(), &mut docs).unwrap();
    (driver, coll)
}

#[test]
fn suffix_keys_render_as_operator_documents() {
    let (_, coll) = setup();
    let q = coll.find(&Context::background()).where_(doc! {"age >=": 18, "name !=": "Bob", "role": "dev"});
    assert_eq!(
        q.filter_document(),
        doc! {"age": {"$gte": 18}, "name": {"$ne": "Bob"}, "role": {"$eq": "dev"}}
    );
}

#[test]
fn single_condition_is_a_plain_leaf() {
    let clause = compile_filter(doc! {"age >=": 18});
    assert_eq!(clause.len(), 1);
    let leaf = clause.conditions().next().unwrap();
    assert_eq!(leaf.field, "age");
    assert_eq!(leaf.op, CmpOp::Gte);
    assert_eq!(leaf.value, Bson::Int32(18));
    assert!(clause.as_group().is_none());
}

#[test]
fn and_where_wraps_previous_filter_on_the_left() {
    let (_, coll) = setup();
    let c1 = doc! {"age >": 20};
    let c2 = doc! {"role in": ["admin", "dev"]};
    let q = coll.find(&Context::background()).where_(c1.clone()).and_where(c2.clone());
    let (combinator, left, right) = q.clause().unwrap().as_group().unwrap();
    assert_eq!(combinator, Combinator::And);
    assert_eq!(left, &compile_filter(c1));
    assert_eq!(right, &compile_filter(c2));
}

#[test]
fn each_combine_adds_one_level() {
    let (_, coll) = setup();
    let mut q = coll.find(&Context::background()).where_(doc! {"a": 1});
    assert_eq!(q.clause().unwrap().depth(), 1);
    for i in 0..4 {
        q = q.and_where(doc! {"b": i});
        assert_eq!(q.clause().unwrap().depth(), 2 + i as usize);
    }
}

#[test]
fn mixed_and_or_follow_call_order() {
    let (_, coll) = seeded();
    let ctx = Context::background();
    // (age > 25 AND role = dev) OR name = Bob
    let users: Vec<User> = coll
        .find(&ctx)
        .where_(doc! {"age >": 25})
        .and_where(doc! {"role": "dev"})
        .or_where(doc! {"name": "Bob"})
        .sort(["name"])
        .all()
        .unwrap();
    let names: Vec<_> = users.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, ["Bob", "Carol", "Dan"]);
}

#[test]
fn sort_select_skip_limit() {
    #[derive(Debug, Deserialize)]
    struct Named {
        #[serde(rename = "_id")]
        id: i32,
        name: String,
        age: Option<i32>,
    }
    let (_, coll) = seeded();
    let got: Vec<Named> = coll
        .find(&Context::background())
        .sort(["age desc", "name"])
        .select(["name"])
        .skip(1)
        .limit(2)
        .all()
        .unwrap();
    assert_eq!(got.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(), ["Alice", "Dan"]);
    assert_eq!(got[0].id, 1);
    assert!(got.iter().all(|n| n.age.is_none()));
}

#[test]
fn excluded_fields_are_dropped() {
    let (_, coll) = seeded();
    let d: Document = coll.find(&Context::background()).where_(doc! {"_id": 2}).select(["!role", "!age"]).one().unwrap();
    assert_eq!(d, doc! {"_id": 2, "name": "Bob"});
}

#[test]
fn one_reports_no_documents() {
    let (_, coll) = seeded();
    let err = coll.find(&Context::background()).where_(doc! {"age >": 100}).one::<User>().unwrap_err();
    assert!(err.is_no_documents());
}

#[test]
fn in_and_not_in() {
    let (_, coll) = seeded();
    let ctx = Context::background();
    let n = coll.find(&ctx).where_(doc! {"role in": ["admin", "dev"]}).count().unwrap();
    assert_eq!(n, 3);
    let n = coll.find(&ctx).where_(doc! {"role not in": ["admin", "dev"]}).count().unwrap();
    assert_eq!(n, 2);
}

#[test]
fn count_honours_skip_and_limit() {
    let (_, coll) = seeded();
    let ctx = Context::background();
    assert_eq!(coll.find(&ctx).count().unwrap(), 5);
    assert_eq!(coll.find(&ctx).skip(2).count().unwrap(), 3);
    assert_eq!(coll.find(&ctx).skip(1).limit(2).count().unwrap(), 2);
}

#[test]
fn distinct_decodes_or_reports_inconsistent_type() {
    let (_, coll) = seeded();
    let ctx = Context::background();
    let mut ages: Vec<i32> = coll.find(&ctx).distinct("age").unwrap();
    ages.sort_unstable();
    assert_eq!(ages, [17, 22, 30, 45]);
    let err = coll.find(&ctx).distinct::<String>("age").unwrap_err();
    assert!(matches!(err, DbError::QueryResultTypeInconsistent));
}

#[test]
fn distinct_into_rejects_non_sequence_target_without_calling_driver() {
    let (driver, coll) = seeded();
    driver.clear_operations();
    let mut target = Bson::Int32(0);
    let err = coll.find(&Context::background()).distinct_into("age", &mut target).unwrap_err();
    assert!(matches!(err, DbError::QueryNotSlicePointer));
    assert!(driver.operations().is_empty());

    let mut target = Bson::Array(Vec::new());
    coll.find(&Context::background()).where_(doc! {"role": "guest"}).distinct_into("name", &mut target).unwrap();
    assert_eq!(target, Bson::Array(vec!["Bob".into(), "Eve".into()]));
    assert_eq!(driver.operations(), ["distinct"]);
}

#[test]
fn cursor_walks_and_separates_exhaustion_from_failure() {
    let (_, coll) = seeded();
    let mut cursor = coll.find(&Context::background()).where_(doc! {"role": "dev"}).sort(["_id"]).cursor();
    let mut u = User::default();
    let mut seen = Vec::new();
    while cursor.next(&mut u) {
        seen.push(u.name.clone());
    }
    assert!(cursor.err().is_none());
    assert_eq!(seen, ["Carol", "Dan"]);
    cursor.close().unwrap();

    #[derive(Default, Deserialize)]
    struct Wrong {
        #[allow(dead_code)]
        name: i64,
    }
    let mut cursor = coll.find(&Context::background()).cursor();
    assert!(!cursor.next(&mut Wrong::default()));
    assert!(cursor.err().is_some());
}

#[test]
fn cancelled_context_fails_the_cursor() {
    let (_, coll) = seeded();
    let ctx = Context::background();
    ctx.cancel();
    let mut cursor = coll.find(&ctx).cursor();
    let mut out: Vec<User> = Vec::new();
    assert!(matches!(cursor.all(&mut out), Err(DbError::Cancelled)));
}

#[test]
fn replace_upsert_without_return_new_suppresses_not_found() {
    let (driver, coll) = seeded();
    let ctx = Context::background();
    let change = Change::replace(doc! {"name": "Zed", "age": 60}).upsert(true);
    let out = coll.find(&ctx).where_(doc! {"name": "Zed"}).apply::<User>(change).unwrap();
    assert!(out.is_none());
    assert_eq!(coll.find(&ctx).where_(doc! {"name": "Zed"}).count().unwrap(), 1);

    let err = coll
        .find(&ctx)
        .where_(doc! {"name": "Nobody"})
        .apply::<User>(Change::replace(doc! {"name": "Nobody"}))
        .unwrap_err();
    assert!(err.is_no_documents());
    assert_eq!(driver.documents(coll.namespace()).len(), 6);
}

#[test]
fn upsert_with_return_new_hands_back_the_document() {
    let (_, coll) = seeded();
    let ctx = Context::background();
    let change = Change::update(doc! {"$set": {"age": 1}}).upsert(true).return_new(true);
    let got = coll.find(&ctx).where_(doc! {"name": "Newt"}).apply::<User>(change).unwrap();
    assert_eq!(got, Some(User { name: "Newt".into(), age: 1 }));
}

#[test]
fn update_returns_old_or_new() {
    let (_, coll) = seeded();
    let ctx = Context::background();
    let old = coll
        .find(&ctx)
        .where_(doc! {"_id": 2})
        .apply::<User>(Change::update(doc! {"$inc": {"age": 1}}))
        .unwrap()
        .unwrap();
    assert_eq!(old.age, 17);
    let new = coll
        .find(&ctx)
        .where_(doc! {"_id": 2})
        .apply::<User>(Change::update(doc! {"$inc": {"age": 1}}).return_new(true))
        .unwrap()
        .unwrap();
    assert_eq!(new.age, 19);
    let err = coll.find(&ctx).where_(doc! {"_id": 99}).apply::<User>(Change::update(doc! {"$set": {"a": 1}}));
    assert!(err.unwrap_err().is_no_documents());
}

#[test]
fn remove_takes_the_first_in_sort_order() {
    let (_, coll) = seeded();
    let ctx = Context::background();
    let removed = coll
        .find(&ctx)
        .where_(doc! {"role": "guest"})
        .sort(["age desc"])
        .apply::<User>(Change::remove())
        .unwrap()
        .unwrap();
    assert_eq!(removed.name, "Eve");
    assert_eq!(coll.find(&ctx).count().unwrap(), 4);
    let err = coll.find(&ctx).where_(doc! {"_id": 99}).apply::<User>(Change::remove().upsert(true));
    assert!(err.unwrap_err().is_no_documents());
}

#[test]
fn apply_checks_payload_shape_before_the_driver() {
    let (driver, coll) = seeded();
    let ctx = Context::background();
    driver.clear_operations();
    let err = coll.find(&ctx).apply::<User>(Change::replace(doc! {"$set": {"a": 1}})).unwrap_err();
    assert!(matches!(err, DbError::ReplacementContainUpdateOperators));
    let err = coll.find(&ctx).apply::<User>(Change::update(doc! {"name": "x"})).unwrap_err();
    assert!(matches!(err, DbError::UpdateRequiresOperators));
    let err = coll.find(&ctx).apply::<User>(Change::update(Document::new())).unwrap_err();
    assert!(matches!(err, DbError::UpdateRequiresOperators));
    assert!(driver.operations().is_empty());
}

#[derive(Clone, Default)]
struct QueryAudit {
    before: Arc<AtomicUsize>,
    after: Arc<AtomicUsize>,
}

impl OperationHook for QueryAudit {
    fn before_query(&mut self, _ctx: &Context) -> odmlite::Result<()> {
        self.before.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn after_query(&mut self, _ctx: &Context) -> odmlite::Result<()> {
        self.after.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Model for QueryAudit {
    fn operation_hook(&mut self) -> Option<&mut dyn OperationHook> {
        Some(self)
    }
}

#[test]
fn query_hooks_wrap_one_and_all_but_not_cursor() {
    let (_, coll) = seeded();
    let ctx = Context::background();
    let audit = QueryAudit::default();
    let mut q = coll.find(&ctx).hook(audit.clone());
    let _: Vec<User> = q.all().unwrap();
    let _: User = q.one().unwrap();
    let _ = q.cursor();
    assert_eq!(audit.before.load(Ordering::SeqCst), 2);
    assert_eq!(audit.after.load(Ordering::SeqCst), 2);
}

#[test]
fn failing_before_query_hook_stops_the_call() {
    struct Deny;
    impl OperationHook for Deny {
        fn before_query(&mut self, _ctx: &Context) -> odmlite::Result<()> {
            Err(DbError::Hook("denied".into()))
        }
    }
    impl Model for Deny {
        fn operation_hook(&mut self) -> Option<&mut dyn OperationHook> {
            Some(self)
        }
    }
    let (driver, coll) = seeded();
    driver.clear_operations();
    let err = coll.find(&Context::background()).hook(Deny).all::<User>().unwrap_err();
    assert!(matches!(err, DbError::Hook(_)));
    assert!(driver.operations().is_empty());
}

#[test]
#[should_panic(expected = "empty field name")]
fn empty_sort_field_panics() {
    let (_, coll) = setup();
    let _ = coll.find(&Context::background()).sort([""]);
}

#[test]
#[should_panic(expected = "empty field name")]
fn bare_bang_select_panics() {
    let (_, coll) = setup();
    let _ = coll.find(&Context::background()).select(["!"]);
}
