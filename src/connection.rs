//! Client configuration, connection lifecycle, model registry and transactions.

use crate::collection::Collection;
use crate::database::Database;
use crate::driver::{Connector, Driver};
use crate::errors::{DbError, Result};
use crate::middleware::{Pipeline, default_pipeline};
use crate::types::{Context, SessionId};
use crate::util::{compare_versions, query_unescape};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(300);
pub const CONNECT_PING_TIMEOUT: Duration = Duration::from_secs(15);
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 10;
pub const TRANSACTION_TIMEOUT: Duration = Duration::from_secs(120);
/// Oldest server version that runs multi-document transactions.
pub const MIN_TRANSACTION_VERSION: &str = "4.0";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadMode {
    #[default]
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadPref {
    #[serde(rename = "maxStalenessMS")]
    pub max_staleness_ms: i64,
    pub mode: ReadMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Credential {
    pub auth_mechanism: String,
    pub auth_source: String,
    pub username: String,
    pub password: String,
    pub password_set: bool,
}

/// User-facing configuration, loadable from JSON or TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Full connection string; wins over `host` / `port`.
    pub uri: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: String,
    pub coll: String,
    #[serde(rename = "connectTimeoutMS")]
    pub connect_timeout_ms: Option<u64>,
    pub max_pool_size: Option<u64>,
    pub min_pool_size: Option<u64>,
    #[serde(rename = "socketTimeoutMS")]
    pub socket_timeout_ms: Option<u64>,
    pub read_preference: Option<ReadPref>,
    pub auth: Option<Credential>,
}

impl Config {
    /// # Errors
    /// Malformed JSON.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// # Errors
    /// Malformed TOML.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Loads `.json` or `.toml` by extension.
    ///
    /// # Errors
    /// I/O, parse errors, or `Config` for any other extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("toml") => Self::from_toml_str(&text),
            other => Err(DbError::Config(format!("unsupported config extension {other:?} for {}", path.display()))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadPreference {
    pub mode: ReadMode,
    pub max_staleness: Option<Duration>,
}

/// Driver-neutral client options derived from a [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub uri: String,
    pub connect_timeout: Option<Duration>,
    pub socket_timeout: Duration,
    pub max_pool_size: Option<u64>,
    pub min_pool_size: Option<u64>,
    pub read_preference: ReadPreference,
    /// Unescaped credential, when `auth` was configured.
    pub credential: Option<Credential>,
}

impl ClientOptions {
    /// # Errors
    /// `NotSupportedUsername` / `NotSupportedPassword` for credentials that
    /// contain reserved characters or bad percent escapes; `Config` when no
    /// address is configured.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let uri = if !cfg.uri.is_empty() {
            cfg.uri.clone()
        } else if let Some(host) = cfg.host.as_deref().filter(|h| !h.is_empty()) {
            format!("mongodb://{host}:{}", cfg.port.unwrap_or(27017))
        } else {
            return Err(DbError::Config("either uri or host must be set".into()));
        };
        let read_preference = cfg
            .read_preference
            .as_ref()
            .map(|rp| ReadPreference {
                mode: rp.mode,
                max_staleness: u64::try_from(rp.max_staleness_ms)
                    .ok()
                    .filter(|ms| *ms > 0)
                    .map(Duration::from_millis),
            })
            .unwrap_or_default();
        let credential = cfg.auth.as_ref().map(new_auth).transpose()?;
        Ok(Self {
            uri,
            connect_timeout: cfg.connect_timeout_ms.map(Duration::from_millis),
            socket_timeout: cfg.socket_timeout_ms.map_or(DEFAULT_SOCKET_TIMEOUT, Duration::from_millis),
            max_pool_size: cfg.max_pool_size,
            min_pool_size: cfg.min_pool_size,
            read_preference,
            credential,
        })
    }
}

fn new_auth(auth: &Credential) -> Result<Credential> {
    let mut out = Credential {
        auth_mechanism: auth.auth_mechanism.clone(),
        auth_source: auth.auth_source.clone(),
        password_set: auth.password_set,
        ..Credential::default()
    };
    if !auth.username.is_empty() {
        if auth.username.contains('/') {
            return Err(DbError::NotSupportedUsername);
        }
        out.username = query_unescape(&auth.username).ok_or(DbError::NotSupportedUsername)?;
    }
    if !auth.password.is_empty() {
        if auth.password.contains(':') || auth.password.contains('/') {
            return Err(DbError::NotSupportedPassword);
        }
        out.password = query_unescape(&auth.password).ok_or(DbError::NotSupportedPassword)?;
    }
    Ok(out)
}

/// Lowercased final path segment of a type name, generics stripped.
fn model_key<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_lowercase()
}

/// A connected client plus the middleware pipeline its collections use.
pub struct Connection {
    driver: Arc<dyn Driver>,
    config: Config,
    pipeline: Arc<Pipeline>,
    models: RwLock<HashMap<String, String>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Connection {
    /// Builds client options from `cfg`, connects through `connector` and pings
    /// the server with a 15 second budget.
    ///
    /// # Errors
    /// Option, connect or ping errors.
    pub fn connect(ctx: &Context, cfg: &Config, connector: &dyn Connector) -> Result<Self> {
        let opts = ClientOptions::from_config(cfg)?;
        let driver = connector.connect(ctx, &opts)?;
        if let Err(e) = driver.ping(&ctx.with_timeout(CONNECT_PING_TIMEOUT)) {
            log::error!("ping {} failed: {e}", opts.uri);
            return Err(e);
        }
        log::info!("connected to {}", opts.uri);
        Ok(Self::with_driver(driver, cfg.clone()))
    }

    /// Wraps an already connected driver.
    #[must_use]
    pub fn with_driver(driver: Arc<dyn Driver>, config: Config) -> Self {
        Self { driver, config, pipeline: default_pipeline(), models: RwLock::new(HashMap::new()) }
    }

    /// Replaces the process-wide pipeline with `pipeline` for this connection.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: Arc<Pipeline>) -> Self {
        self.pipeline = pipeline;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// # Errors
    /// Driver errors.
    pub fn close(&self, ctx: &Context) -> Result<()> {
        log::debug!("closing connection");
        self.driver.disconnect(ctx)
    }

    /// # Errors
    /// The server did not answer within `timeout_secs`.
    pub fn ping(&self, timeout_secs: u64) -> Result<()> {
        let ctx = Context::background().with_timeout(Duration::from_secs(timeout_secs));
        self.driver.ping(&ctx)
    }

    #[must_use]
    pub fn database(&self, name: &str) -> Database {
        Database::new(name, Arc::clone(&self.driver), Arc::clone(&self.pipeline))
    }

    /// Database named in the configuration.
    #[must_use]
    pub fn default_database(&self) -> Database {
        self.database(&self.config.database)
    }

    /// Collection named in the configuration.
    #[must_use]
    pub fn default_collection(&self) -> Collection {
        self.default_database().collection(&self.config.coll)
    }

    /// # Errors
    /// Driver errors.
    pub fn server_version(&self, ctx: &Context) -> Result<String> {
        self.driver.server_version(ctx)
    }

    /// True when the server version supports multi-document transactions.
    ///
    /// # Errors
    /// Driver errors or an unparsable version string.
    pub fn transaction_allowed(&self, ctx: &Context) -> Result<bool> {
        let version = self.server_version(ctx)?;
        Ok(compare_versions(&version, MIN_TRANSACTION_VERSION)? >= 0)
    }

    #[must_use]
    pub fn session(&self) -> Session {
        Session { driver: Arc::clone(&self.driver), id: SessionId::new() }
    }

    /// Runs `callback` inside a transaction on a fresh session.
    ///
    /// # Errors
    /// `TransactionNotSupported` below server 4.0; otherwise as [`Session::start_transaction`].
    pub fn do_transaction<F, R>(&self, ctx: &Context, callback: F) -> Result<R>
    where
        F: FnMut(&Context) -> Result<R>,
    {
        if !self.transaction_allowed(ctx)? {
            return Err(DbError::TransactionNotSupported);
        }
        let session = self.session();
        let out = session.start_transaction(ctx, callback);
        session.end_session();
        out
    }

    /// Associates model type `T` with a collection of the configured database.
    /// A second registration of the same type is ignored with a warning.
    pub fn register_model<T: ?Sized>(&self, collection: &str) {
        let key = model_key::<T>();
        let mut models = self.models.write();
        if let Some(existing) = models.get(&key) {
            log::warn!("model {key} already registered to {existing}, keeping it");
            return;
        }
        log::debug!("model {key} -> {collection}");
        models.insert(key, collection.to_string());
    }

    /// Collection registered under the lowercased model name.
    ///
    /// # Errors
    /// `ModelNotRegistered`.
    pub fn model(&self, name: &str) -> Result<Collection> {
        let key = name.to_lowercase();
        let coll = self.models.read().get(&key).cloned().ok_or(DbError::ModelNotRegistered(key))?;
        Ok(self.default_database().collection(&coll))
    }

    /// # Errors
    /// `ModelNotRegistered`.
    pub fn model_of<T: ?Sized>(&self) -> Result<Collection> {
        self.model(&model_key::<T>())
    }
}

/// Driver session that scopes transactions.
pub struct Session {
    driver: Arc<dyn Driver>,
    id: SessionId,
}

impl Session {
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Runs `callback` in a transaction: commits when it succeeds, aborts when it
    /// fails, and re-runs it from the start when it returns `TransactionRetry`
    /// (up to [`MAX_TRANSACTION_ATTEMPTS`] attempts within [`TRANSACTION_TIMEOUT`]).
    /// The callback receives a context carrying this session and must be idempotent.
    ///
    /// # Errors
    /// The callback's error, or a driver error from start/commit.
    pub fn start_transaction<F, R>(&self, ctx: &Context, mut callback: F) -> Result<R>
    where
        F: FnMut(&Context) -> Result<R>,
    {
        let started = Instant::now();
        let tx_ctx = ctx.with_session(self.id);
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.driver.start_transaction(ctx, self.id)?;
            match callback(&tx_ctx) {
                Ok(out) => {
                    self.driver.commit_transaction(ctx, self.id)?;
                    return Ok(out);
                }
                Err(e) => {
                    if let Err(abort) = self.abort_transaction(ctx) {
                        log::warn!("abort after failed transaction: {abort}");
                    }
                    let retry = matches!(e, DbError::TransactionRetry)
                        && attempt < MAX_TRANSACTION_ATTEMPTS
                        && started.elapsed() < TRANSACTION_TIMEOUT;
                    if !retry {
                        return Err(e);
                    }
                    log::debug!("retrying transaction, attempt {}", attempt + 1);
                }
            }
        }
    }

    /// # Errors
    /// Driver errors, including "no transaction started".
    pub fn abort_transaction(&self, ctx: &Context) -> Result<()> {
        self.driver.abort_transaction(ctx, self.id)
    }

    pub fn end_session(&self) {
        log::debug!("session {} ended", self.id.0);
    }
}
