//! Entity descriptors and tracked entities.
//!
//! [`Entity`] is the object-safe contract the unit of work stores and
//! replays. Concrete types usually implement [`Model`] instead, which adds
//! the static metadata and row materialization the read path needs, and
//! get [`Entity`] for free.

use std::fmt;

use crate::error::Result;
use crate::value::{Row, Value};

/// A domain value that knows where and how it is persisted.
pub trait Entity {
    fn table_name(&self) -> &str;

    /// Persisted field names, in declaration order.
    fn persisted_fields(&self) -> &[&str];

    /// Primary-key field names; a subset of [`Entity::persisted_fields`].
    fn primary_key_fields(&self) -> &[&str];

    /// Current value of a field. `None` and `Some(Value::Null)` both mean
    /// SQL NULL.
    fn field_value(&self, field: &str) -> Option<Value>;
}

/// Static descriptor of a concrete entity type.
///
/// # Example
///
/// ```
/// use rust_sqlite_mapper::{Model, Result, Row, Value};
///
/// struct Tag {
///     id: Option<i64>,
///     label: String,
/// }
///
/// impl Model for Tag {
///     const TABLE: &'static str = "Tag";
///     const FIELDS: &'static [&'static str] = &["ID", "Label"];
///     const PRIMARY_KEYS: &'static [&'static str] = &["ID"];
///
///     fn column(&self, field: &str) -> Option<Value> {
///         match field {
///             "ID" => self.id.map(Value::from),
///             "Label" => Some(self.label.as_str().into()),
///             _ => None,
///         }
///     }
///
///     fn from_row(row: &Row) -> Result<Self> {
///         Ok(Self {
///             id: row.get("ID")?,
///             label: row.get("Label")?,
///         })
///     }
/// }
/// ```
pub trait Model: Sized {
    const TABLE: &'static str;
    const FIELDS: &'static [&'static str];
    const PRIMARY_KEYS: &'static [&'static str];

    fn column(&self, field: &str) -> Option<Value>;

    /// Build an instance from a result row, matching columns to field
    /// names exactly.
    fn from_row(row: &Row) -> Result<Self>;
}

impl<M: Model> Entity for M {
    fn table_name(&self) -> &str {
        M::TABLE
    }

    fn persisted_fields(&self) -> &[&str] {
        M::FIELDS
    }

    fn primary_key_fields(&self) -> &[&str] {
        M::PRIMARY_KEYS
    }

    fn field_value(&self, field: &str) -> Option<Value> {
        self.column(field)
    }
}

/// Pending persistence action of a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    Created,
    Modified,
    Deleted,
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityState::Created => "created",
            EntityState::Modified => "modified",
            EntityState::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// An entity paired with the action to replay on commit.
pub struct TrackedEntity<'e> {
    entity: Box<dyn Entity + 'e>,
    state: EntityState,
}

impl<'e> TrackedEntity<'e> {
    pub fn new(entity: impl Entity + 'e, state: EntityState) -> Self {
        Self {
            entity: Box::new(entity),
            state,
        }
    }

    pub fn entity(&self) -> &dyn Entity {
        self.entity.as_ref()
    }

    pub fn state(&self) -> EntityState {
        self.state
    }
}

impl fmt::Debug for TrackedEntity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedEntity")
            .field("table", &self.entity.table_name())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
