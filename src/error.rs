//! Mapper error types.
//!
//! Every fallible operation returns [`MapperError`]. Driver failures are
//! converted at the connection boundary so callers can match on the kind
//! of failure (statement, bind, execution, ...) without depending on
//! `rusqlite` directly.

use thiserror::Error;

use crate::entity::EntityState;

/// Errors raised by the connection, the query builder and the unit of work.
#[derive(Debug, Error)]
pub enum MapperError {
    /// Configuration could not be used to open a connection.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The session to the store could not be established or maintained.
    #[error("connection error: {0}")]
    Connection(String),

    /// The store rejected the statement text while compiling it.
    #[error("statement error: {0}")]
    Statement(String),

    /// The query builder refused to produce a statement.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A value could not be attached to a placeholder.
    #[error("bind error: {0}")]
    Bind(String),

    /// The store rejected the statement while running it.
    #[error("execution error: {0}")]
    Execution(String),

    /// Transaction control was used out of order.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// An update had no assignments left after dropping null fields.
    #[error("update of `{0}` has no non-null fields to set")]
    EmptyUpdate(String),

    /// An entity scheduled for update or delete has no value for a key.
    #[error("entity `{table}` has no value for primary key `{field}`")]
    MissingPrimaryKey { table: String, field: String },

    /// A stored value could not be turned into the requested Rust type.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// A tracked entity failed while the unit of work was replaying.
    #[error("commit failed at entity #{index} ({state} `{table}`): {source}")]
    Commit {
        index: usize,
        table: String,
        state: EntityState,
        #[source]
        source: Box<MapperError>,
    },
}

pub type Result<T> = std::result::Result<T, MapperError>;

impl MapperError {
    pub(crate) fn statement(sql: &str, err: rusqlite::Error) -> Self {
        Self::Statement(format!("{err} (in `{sql}`)"))
    }

    pub(crate) fn execution(sql: &str, err: rusqlite::Error) -> Self {
        Self::Execution(format!("{err} (in `{sql}`)"))
    }
}
