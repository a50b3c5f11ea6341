//! SQLite connection: prepare / bind / execute / fetch over one session.
//!
//! [`Connection`] keeps at most one prepared statement. Binding and
//! executing always refer to the statement of the latest
//! [`Connection::prepare`] call, the way a PDO-style handle works. The
//! compiled statement itself lives in the driver's statement cache, so
//! preparing the same text repeatedly is cheap.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use rusqlite::OpenFlags;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::entity::Model;
use crate::error::{MapperError, Result};
use crate::executor::{Execution, Executor};
use crate::query::{check_identifier, SqlQuery};
use crate::value::{ParamType, Row, Value};

/// Path SQLite understands as a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Default busy timeout.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// SQLite connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Path to the SQLite database file, or `:memory:`
    pub db_path: String,
    /// How long a blocked statement waits for a lock before failing
    pub busy_timeout_ms: u64,
    /// Enforce foreign key constraints
    pub foreign_keys: bool,
    /// Create the database file when it does not exist
    pub create_if_missing: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            db_path: MEMORY_PATH.to_string(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: true,
            create_if_missing: true,
        }
    }
}

impl SqliteConfig {
    /// Create a new SQLite config for the given path
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Parse a connection URL whose scheme names the engine.
    ///
    /// Accepted forms: `sqlite:path/to.db`, `sqlite://path/to.db`,
    /// `sqlite::memory:`.
    pub fn from_url(url: &str) -> Result<Self> {
        let (engine, rest) = url
            .split_once(':')
            .ok_or_else(|| MapperError::Config(format!("`{url}` does not name an engine")))?;
        if !engine.eq_ignore_ascii_case("sqlite") {
            return Err(MapperError::Config(format!("unsupported engine `{engine}`")));
        }

        let path = rest.strip_prefix("//").unwrap_or(rest);
        if path.is_empty() {
            return Err(MapperError::Config(format!("`{url}` has no database path")));
        }
        Ok(Self::new(path))
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn is_memory(&self) -> bool {
        self.db_path == MEMORY_PATH
    }

    fn validate(&self) -> Result<()> {
        if self.db_path.trim().is_empty() {
            return Err(MapperError::Config("db_path must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Active,
    InTransaction,
}

/// The statement of the latest `prepare` call and its bindings.
struct PreparedStatement {
    sql: String,
    /// Placeholder names by position; anonymous `?` placeholders are `?<n>`.
    parameters: Vec<String>,
    bindings: Vec<Option<Value>>,
}

/// One live SQLite session.
pub struct Connection {
    inner: rusqlite::Connection,
    statement: Option<PreparedStatement>,
    results: VecDeque<Row>,
    rows_affected: usize,
    state: ConnectionState,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("statement", &self.prepared_sql())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Open a connection. Failure is returned to the caller, never ignored.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        config.validate()?;

        let inner = if config.is_memory() {
            rusqlite::Connection::open_in_memory()
        } else {
            let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            if config.create_if_missing {
                flags |= OpenFlags::SQLITE_OPEN_CREATE;
            }
            rusqlite::Connection::open_with_flags(&config.db_path, flags)
        }
        .map_err(|err| {
            MapperError::Connection(format!("cannot open `{}`: {err}", config.db_path))
        })?;

        inner
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(|err| MapperError::Connection(err.to_string()))?;
        inner
            .pragma_update(None, "foreign_keys", config.foreign_keys)
            .map_err(|err| MapperError::Connection(err.to_string()))?;

        info!(path = %config.db_path, "opened sqlite connection");
        Ok(Self {
            inner,
            statement: None,
            results: VecDeque::new(),
            rows_affected: 0,
            state: ConnectionState::Active,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(&SqliteConfig::in_memory())
    }

    /// Compile `sql` and make it the current statement, dropping the
    /// previous one along with any unread results.
    pub fn prepare(&mut self, sql: &str) -> Result<()> {
        self.statement = None;
        self.results.clear();

        let stmt = self
            .inner
            .prepare_cached(sql)
            .map_err(|err| MapperError::statement(sql, err))?;
        let parameters: Vec<String> = (1..=stmt.parameter_count())
            .map(|i| {
                stmt.parameter_name(i)
                    .map_or_else(|| format!("?{i}"), str::to_string)
            })
            .collect();
        drop(stmt);

        debug!(sql, params = parameters.len(), "prepared statement");
        self.statement = Some(PreparedStatement {
            sql: sql.to_string(),
            bindings: vec![None; parameters.len()],
            parameters,
        });
        Ok(())
    }

    /// Bind a value, typed by its runtime kind. `name` may omit the `:`
    /// prefix.
    pub fn bind(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let statement = self
            .statement
            .as_mut()
            .ok_or_else(|| MapperError::Bind("no statement has been prepared".into()))?;

        let name = placeholder(name);
        let index = statement
            .parameters
            .iter()
            .position(|p| *p == name)
            .ok_or_else(|| {
                MapperError::Bind(format!("`{}` has no placeholder `{name}`", statement.sql))
            })?;
        statement.bindings[index] = Some(value);
        Ok(())
    }

    /// Bind a value converted to an explicit type.
    pub fn bind_as(&mut self, name: &str, value: impl Into<Value>, ty: ParamType) -> Result<()> {
        let value = value.into().coerce(ty)?;
        self.bind(name, value)
    }

    /// Run the current statement. Rows it returns are buffered for
    /// [`Connection::fetch_one`] and [`Connection::fetch_all`].
    pub fn execute(&mut self) -> Result<()> {
        let prepared = self
            .statement
            .as_ref()
            .ok_or_else(|| MapperError::Execution("no statement has been prepared".into()))?;
        let sql = prepared.sql.as_str();

        let mut stmt = self
            .inner
            .prepare_cached(sql)
            .map_err(|err| MapperError::statement(sql, err))?;
        for (i, (name, value)) in prepared
            .parameters
            .iter()
            .zip(&prepared.bindings)
            .enumerate()
        {
            let value = value
                .as_ref()
                .ok_or_else(|| MapperError::Bind(format!("no value bound for `{name}`")))?;
            stmt.raw_bind_parameter(i + 1, value)
                .map_err(|err| MapperError::Bind(format!("`{name}`: {err}")))?;
        }

        if stmt.column_count() == 0 {
            let changed = stmt
                .raw_execute()
                .map_err(|err| MapperError::execution(sql, err))?;
            self.results.clear();
            self.rows_affected = changed;
            debug!(sql, rows_affected = changed, "executed statement");
            return Ok(());
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let mut buffered = VecDeque::new();
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next().map_err(|err| MapperError::execution(sql, err))? {
            let mut values = Row::new();
            for (i, column) in columns.iter().enumerate() {
                let value = row
                    .get_ref(i)
                    .map_err(|err| MapperError::execution(sql, err))?;
                values.insert(column, Value::from(value));
            }
            buffered.push_back(values);
        }

        debug!(sql, rows = buffered.len(), "executed query");
        self.results = buffered;
        self.rows_affected = 0;
        Ok(())
    }

    /// Next buffered row of the last executed query.
    pub fn fetch_one(&mut self) -> Option<Row> {
        self.results.pop_front()
    }

    /// All remaining buffered rows of the last executed query.
    pub fn fetch_all(&mut self) -> Vec<Row> {
        self.results.drain(..).collect()
    }

    pub fn fetch_one_as<M: Model>(&mut self) -> Result<Option<M>> {
        self.fetch_one().map(|row| M::from_row(&row)).transpose()
    }

    pub fn fetch_all_as<M: Model>(&mut self) -> Result<Vec<M>> {
        self.fetch_all().iter().map(M::from_row).collect()
    }

    /// Rowid of the most recent successful insert on this connection.
    pub fn last_insert_id(&self) -> i64 {
        self.inner.last_insert_rowid()
    }

    /// Rows changed by the last executed statement; 0 for queries.
    pub fn rows_affected(&self) -> usize {
        self.rows_affected
    }

    /// Prepare, bind every parameter and execute a built query.
    pub fn run(&mut self, query: &SqlQuery) -> Result<Execution> {
        self.prepare(&query.statement)?;
        for (name, value) in &query.params.values {
            self.bind(name, value.clone())?;
        }
        self.execute()?;
        Ok(Execution {
            rows_affected: self.rows_affected,
            last_insert_id: self.last_insert_id(),
        })
    }

    /// Like [`Connection::run`], returning the result rows.
    pub fn query(&mut self, query: &SqlQuery) -> Result<Vec<Row>> {
        self.run(query)?;
        Ok(self.fetch_all())
    }

    /// Run a script of `;`-separated statements without parameters, e.g.
    /// schema setup.
    pub fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.inner
            .execute_batch(sql)
            .map_err(|err| MapperError::execution(sql, err))
    }

    pub fn prepared_sql(&self) -> Option<&str> {
        self.statement.as_ref().map(|s| s.sql.as_str())
    }

    /// Human readable dump of the current statement and its bindings.
    pub fn debug_params(&self) -> Option<String> {
        let statement = self.statement.as_ref()?;
        let mut out = format!(
            "SQL: [{}] {}\nParams: {}",
            statement.sql.len(),
            statement.sql,
            statement.parameters.len()
        );
        for (name, value) in statement.parameters.iter().zip(&statement.bindings) {
            match value {
                Some(value) => out.push_str(&format!("\n{name} = {value}")),
                None => out.push_str(&format!("\n{name} (unbound)")),
            }
        }
        Some(out)
    }

    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.state == ConnectionState::InTransaction {
            return Err(MapperError::Transaction("transaction already active".into()));
        }
        // IMMEDIATE takes the write lock up front, so two writers wait on
        // the busy timeout instead of deadlocking on lock upgrade.
        self.inner
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|err| MapperError::Transaction(err.to_string()))?;
        self.state = ConnectionState::InTransaction;
        debug!("began transaction");
        Ok(())
    }

    pub fn commit_transaction(&mut self) -> Result<()> {
        if self.state != ConnectionState::InTransaction {
            return Err(MapperError::Transaction("no active transaction".into()));
        }
        let outcome = self.inner.execute_batch("COMMIT");
        // A failed COMMIT can leave the transaction open; trust SQLite.
        if self.inner.is_autocommit() {
            self.state = ConnectionState::Active;
        }
        outcome.map_err(|err| MapperError::Transaction(err.to_string()))?;
        debug!("committed transaction");
        Ok(())
    }

    pub fn rollback_transaction(&mut self) -> Result<()> {
        if self.state != ConnectionState::InTransaction {
            return Err(MapperError::Transaction("no active transaction".into()));
        }
        // Some errors make SQLite roll back on its own.
        if self.inner.is_autocommit() {
            self.state = ConnectionState::Active;
            debug!("transaction already rolled back by sqlite");
            return Ok(());
        }
        let outcome = self.inner.execute_batch("ROLLBACK");
        if self.inner.is_autocommit() {
            self.state = ConnectionState::Active;
        }
        outcome.map_err(|err| MapperError::Transaction(err.to_string()))?;
        debug!("rolled back transaction");
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.state == ConnectionState::InTransaction
    }

    pub fn savepoint(&mut self, name: &str) -> Result<()> {
        self.savepoint_command("SAVEPOINT", name)
    }

    pub fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.savepoint_command("RELEASE", name)
    }

    /// `ROLLBACK TO` keeps the savepoint on the stack, so it is released
    /// afterwards.
    pub fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.savepoint_command("ROLLBACK TO", name)?;
        self.savepoint_command("RELEASE", name)
    }

    fn savepoint_command(&mut self, command: &str, name: &str) -> Result<()> {
        if self.state != ConnectionState::InTransaction {
            return Err(MapperError::Transaction(format!(
                "{command} `{name}` needs an active transaction"
            )));
        }
        check_identifier(name)?;
        self.inner
            .execute_batch(&format!("{command} {name}"))
            .map_err(|err| MapperError::Transaction(err.to_string()))?;
        debug!(savepoint = name, command, "savepoint");
        Ok(())
    }
}

impl Executor for Connection {
    fn run(&mut self, query: &SqlQuery) -> Result<Execution> {
        Connection::run(self, query)
    }

    fn begin_transaction(&mut self) -> Result<()> {
        Connection::begin_transaction(self)
    }

    fn commit_transaction(&mut self) -> Result<()> {
        Connection::commit_transaction(self)
    }

    fn rollback_transaction(&mut self) -> Result<()> {
        Connection::rollback_transaction(self)
    }

    fn in_transaction(&self) -> bool {
        Connection::in_transaction(self)
    }

    fn savepoint(&mut self, name: &str) -> Result<()> {
        Connection::savepoint(self, name)
    }

    fn release_savepoint(&mut self, name: &str) -> Result<()> {
        Connection::release_savepoint(self, name)
    }

    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        Connection::rollback_to_savepoint(self, name)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.in_transaction() {
            warn!("connection dropped with an open transaction; rolling back");
            if let Err(err) = self.rollback_transaction() {
                warn!(error = %err, "rollback on drop failed");
            }
        }
    }
}

fn placeholder(name: &str) -> String {
    if name.starts_with([':', '@', '$', '?']) {
        name.to_string()
    } else {
        format!(":{name}")
    }
}
