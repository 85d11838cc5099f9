use bson::{Document, doc};
use odmlite::connection::ReadMode;
use odmlite::driver::memory::{MemoryConnector, MemoryDriver};
use odmlite::{Config, Connection, Context, DbError, Pipeline};
use std::cell::Cell;
use std::io::Write;
use std::sync::Arc;

fn config() -> Config {
    Config { uri: "mongodb://memory:27017".into(), database: "shop".into(), coll: "orders".into(), ..Config::default() }
}

fn connect(driver: &Arc<MemoryDriver>) -> Connection {
    let connector = MemoryConnector::new(Arc::clone(driver));
    Connection::connect(&Context::background(), &config(), &connector)
        .unwrap()
        .with_pipeline(Arc::new(Pipeline::new()))
}

#[test]
fn connect_pings_the_server() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = connect(&driver);
    assert_eq!(driver.operations(), ["ping"]);
    assert_eq!(conn.config().database, "shop");
    let coll = conn.default_collection();
    assert_eq!(coll.name(), "orders");
    assert_eq!(coll.namespace().database, "shop");
}

#[test]
fn connect_without_uri_or_host_fails() {
    let connector = MemoryConnector::default();
    let err = Connection::connect(&Context::background(), &Config::default(), &connector).unwrap_err();
    assert!(matches!(err, DbError::Config(_)));
}

#[test]
fn cancelled_context_fails_the_connect() {
    let ctx = Context::background();
    ctx.cancel();
    let err = Connection::connect(&ctx, &config(), &MemoryConnector::default()).unwrap_err();
    assert!(matches!(err, DbError::Cancelled));
}

#[test]
fn closed_connection_stops_answering() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = connect(&driver);
    conn.ping(1).unwrap();
    conn.close(&Context::background()).unwrap();
    assert!(conn.ping(1).is_err());
}

#[test]
fn config_files_load_by_extension() {
    let dir = tempfile::tempdir().unwrap();

    let json = dir.path().join("odm.json");
    let mut f = std::fs::File::create(&json).unwrap();
    write!(f, r#"{{"uri":"mongodb://j","database":"db","readPreference":{{"mode":"nearest","maxStalenessMS":500}}}}"#).unwrap();
    let cfg = Config::from_file(&json).unwrap();
    assert_eq!(cfg.uri, "mongodb://j");
    assert_eq!(cfg.read_preference.unwrap().mode, ReadMode::Nearest);

    let toml_path = dir.path().join("odm.toml");
    std::fs::write(&toml_path, "host = \"localhost\"\nport = 27018\ndatabase = \"db\"\ncoll = \"c\"\nsocketTimeoutMS = 1000\n").unwrap();
    let cfg = Config::from_file(&toml_path).unwrap();
    assert_eq!((cfg.host.as_deref(), cfg.port), (Some("localhost"), Some(27018)));
    assert_eq!(cfg.socket_timeout_ms, Some(1000));

    let yaml = dir.path().join("odm.yaml");
    std::fs::write(&yaml, "uri: x").unwrap();
    assert!(matches!(Config::from_file(&yaml), Err(DbError::Config(_))));
    assert!(matches!(Config::from_file(dir.path().join("missing.json")), Err(DbError::Io(_))));
}

struct Order;
struct Customer;

#[test]
fn model_registry_keeps_the_first_registration() {
    let conn = connect(&Arc::new(MemoryDriver::new()));
    conn.register_model::<Order>("orders");
    conn.register_model::<Order>("orders_v2");
    assert_eq!(conn.model("Order").unwrap().name(), "orders");
    assert_eq!(conn.model_of::<Order>().unwrap().name(), "orders");
    match conn.model_of::<Customer>() {
        Err(DbError::ModelNotRegistered(name)) => assert_eq!(name, "customer"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("customer should not be registered"),
    }
}

#[test]
fn transaction_commits_on_success() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = connect(&driver);
    let coll = conn.default_collection();
    let n = conn
        .do_transaction(&Context::background(), |ctx| {
            assert!(ctx.session().is_some());
            coll.insert_one(ctx, &mut doc! {"_id": 1, "total": 10})?;
            Ok(1)
        })
        .unwrap();
    assert_eq!(n, 1);
    assert_eq!(driver.documents(coll.namespace()).len(), 1);
    assert!(driver.operations().contains(&"commit_transaction".to_string()));
}

#[test]
fn failed_transaction_is_rolled_back() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = connect(&driver);
    let coll = conn.default_collection();
    let err = conn
        .do_transaction(&Context::background(), |ctx| -> odmlite::Result<()> {
            coll.insert_one(ctx, &mut doc! {"_id": 1})?;
            Err(DbError::Hook("out of stock".into()))
        })
        .unwrap_err();
    assert!(matches!(err, DbError::Hook(_)));
    assert!(driver.documents(coll.namespace()).is_empty());
}

#[test]
fn retry_reruns_the_callback_from_scratch() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = connect(&driver);
    let coll = conn.default_collection();
    let attempts = Cell::new(0);
    conn.do_transaction(&Context::background(), |ctx| {
        attempts.set(attempts.get() + 1);
        coll.insert_one(ctx, &mut doc! {"_id": 7})?;
        if attempts.get() < 3 {
            return Err(DbError::TransactionRetry);
        }
        Ok(())
    })
    .unwrap();
    assert_eq!(attempts.get(), 3);
    let stored: Vec<Document> = driver.documents(coll.namespace());
    assert_eq!(stored, vec![doc! {"_id": 7}]);
}

#[test]
fn retry_gives_up_after_the_attempt_limit() {
    let conn = connect(&Arc::new(MemoryDriver::new()));
    let attempts = Cell::new(0);
    let err = conn
        .do_transaction(&Context::background(), |_| -> odmlite::Result<()> {
            attempts.set(attempts.get() + 1);
            Err(DbError::TransactionRetry)
        })
        .unwrap_err();
    assert!(matches!(err, DbError::TransactionRetry));
    assert_eq!(attempts.get(), 10);
}

#[test]
fn old_servers_refuse_transactions() {
    let driver = Arc::new(MemoryDriver::with_version("3.6.8"));
    let conn = connect(&driver);
    assert!(!conn.transaction_allowed(&Context::background()).unwrap());
    let err = conn.do_transaction(&Context::background(), |_| Ok(())).unwrap_err();
    assert!(matches!(err, DbError::TransactionNotSupported));

    driver.set_server_version("4.0");
    assert!(conn.transaction_allowed(&Context::background()).unwrap());
}
