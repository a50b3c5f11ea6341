//! Entity to statement translation, the read path and immediate writes.

use std::collections::BTreeMap;

use tracing::debug;

use crate::entity::{Entity, EntityState, Model};
use crate::error::{MapperError, Result};
use crate::executor::Execution;
use crate::query::{
    Conditions, CreateOperation, CrudOperation, DeleteOperation, Order, ReadOperation, SqlQuery,
    UpdateOperation, DEFAULT_DELETE_LIMIT,
};
use crate::sqlite::Connection;
use crate::value::Value;

/// The operation replayed for an entity in the given state.
pub fn operation(entity: &dyn Entity, state: EntityState) -> Result<CrudOperation> {
    let table = entity.table_name().to_string();
    let op = match state {
        EntityState::Created => CrudOperation::Create(CreateOperation {
            table,
            data: entity
                .persisted_fields()
                .iter()
                .map(|field| {
                    let value = entity.field_value(field).unwrap_or(Value::Null);
                    (field.to_string(), value)
                })
                .collect(),
        }),
        EntityState::Modified => {
            let conditions = key_conditions(entity)?;
            let keys = entity.primary_key_fields();
            let updates: BTreeMap<String, Value> = entity
                .persisted_fields()
                .iter()
                .filter(|field| !keys.contains(*field))
                .filter_map(|field| {
                    entity
                        .field_value(field)
                        .filter(|value| !value.is_null())
                        .map(|value| (field.to_string(), value))
                })
                .collect();
            CrudOperation::Update(UpdateOperation {
                table,
                conditions,
                updates,
            })
        }
        EntityState::Deleted => CrudOperation::Delete(DeleteOperation {
            table,
            conditions: key_conditions(entity)?,
            limit: Some(DEFAULT_DELETE_LIMIT),
        }),
    };
    Ok(op)
}

/// Insert every declared field; absent values are inserted as NULL.
pub fn insert_query(entity: &dyn Entity) -> Result<SqlQuery> {
    operation(entity, EntityState::Created)?.to_sql()
}

/// Partial update: only non-null, non-key fields are set, matched by the
/// primary key.
pub fn update_query(entity: &dyn Entity) -> Result<SqlQuery> {
    operation(entity, EntityState::Modified)?.to_sql()
}

/// Delete by primary key, bounded to a single row.
pub fn delete_query(entity: &dyn Entity) -> Result<SqlQuery> {
    operation(entity, EntityState::Deleted)?.to_sql()
}

fn key_conditions(entity: &dyn Entity) -> Result<Conditions> {
    let table = entity.table_name();
    let keys = entity.primary_key_fields();
    if keys.is_empty() {
        return Err(MapperError::InvalidQuery(format!(
            "`{table}` declares no primary key"
        )));
    }

    let fields = entity.persisted_fields();
    let mut conditions = Conditions::new();
    for key in keys {
        if !fields.contains(key) {
            return Err(MapperError::InvalidQuery(format!(
                "primary key `{key}` is not a persisted field of `{table}`"
            )));
        }
        let value = entity
            .field_value(key)
            .filter(|value| !value.is_null())
            .ok_or_else(|| MapperError::MissingPrimaryKey {
                table: table.to_string(),
                field: key.to_string(),
            })?;
        conditions = conditions.equal(key, value);
    }
    Ok(conditions)
}

/// Projection, ordering and paging for [`Connection::find`] and
/// [`Connection::find_all`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub fields: Option<Vec<String>>,
    pub order_by: Vec<(String, Order)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn order_by(mut self, field: &str, order: Order) -> Self {
        self.order_by.push((field.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

fn read_query<M: Model>(conditions: &Conditions, options: &FindOptions) -> Result<SqlQuery> {
    CrudOperation::Read(ReadOperation {
        table: M::TABLE.to_string(),
        conditions: conditions.clone(),
        fields: options.fields.clone(),
        order_by: options.order_by.clone(),
        limit: options.limit,
        offset: options.offset,
    })
    .to_sql()
}

impl Connection {
    /// First row matching `conditions` as a model, or `None` when nothing
    /// matches.
    pub fn find<M: Model>(
        &mut self,
        conditions: &Conditions,
        options: &FindOptions,
    ) -> Result<Option<M>> {
        let mut options = options.clone();
        options.limit = options.limit.or(Some(1));
        let query = read_query::<M>(conditions, &options)?;
        self.run(&query)?;
        self.fetch_one_as()
    }

    /// Every row matching `conditions`, in result order.
    pub fn find_all<M: Model>(
        &mut self,
        conditions: &Conditions,
        options: &FindOptions,
    ) -> Result<Vec<M>> {
        let query = read_query::<M>(conditions, options)?;
        self.run(&query)?;
        let found = self.fetch_all_as()?;
        debug!(table = M::TABLE, found = found.len(), "find_all");
        Ok(found)
    }

    /// Insert one entity right away, outside any unit of work.
    pub fn insert_entity(&mut self, entity: &dyn Entity) -> Result<Execution> {
        self.run(&insert_query(entity)?)
    }

    /// Update one entity right away, outside any unit of work.
    pub fn update_entity(&mut self, entity: &dyn Entity) -> Result<Execution> {
        self.run(&update_query(entity)?)
    }

    /// Delete one entity right away, outside any unit of work.
    pub fn delete_entity(&mut self, entity: &dyn Entity) -> Result<Execution> {
        self.run(&delete_query(entity)?)
    }
}
