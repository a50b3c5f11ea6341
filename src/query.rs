//! Query descriptors and the statement builder.
//!
//! Every builder is a pure function from a descriptor to a [`SqlQuery`]:
//! statement text plus the ordered list of values to bind. Values never
//! end up in the statement text; only validated identifiers do.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::{MapperError, Result};
use crate::value::Value;

/// Parameter bindings for SQL queries, in placeholder order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Params {
    pub values: Vec<(String, Value)>,
}

impl Params {
    /// Create a new Params object
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named value
    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: &str, value: impl Into<Value>) {
        self.values.push((name.to_string(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn extend(&mut self, other: Params) {
        self.values.extend(other.values);
    }
}

/// SQL Query with typed parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub statement: String,
    pub params: Params,
}

impl SqlQuery {
    pub fn new(statement: &str) -> Self {
        Self {
            statement: statement.to_string(),
            params: Params::new(),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

/// Query operators for building conditions
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperator {
    Equal(Value),
    NotEqual(Value),
    GreaterThan(Value),
    GreaterThanOrEqual(Value),
    LessThan(Value),
    LessThanOrEqual(Value),
    Like(String),
    In(Vec<Value>),
    IsNull,
    IsNotNull,
}

/// Conjunction of per-field conditions, rendered in insertion order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Conditions {
    pub conditions: Vec<(String, QueryOperator)>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition(mut self, field: &str, op: QueryOperator) -> Self {
        self.conditions.push((field.to_string(), op));
        self
    }

    /// `field = value`, or `field IS NULL` when the value is null.
    pub fn equal(self, field: &str, value: impl Into<Value>) -> Self {
        match value.into() {
            Value::Null => self.with_condition(field, QueryOperator::IsNull),
            value => self.with_condition(field, QueryOperator::Equal(value)),
        }
    }

    /// Equality conditions from a field-value map. Keys are sorted so the
    /// statement does not depend on the map's iteration order.
    pub fn from_map<K, V, I>(map: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let sorted: BTreeMap<String, Value> = map
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        sorted
            .into_iter()
            .fold(Self::new(), |conds, (field, value)| conds.equal(&field, value))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Render the WHERE body (without the keyword) and its bind list.
    ///
    /// Placeholders are `@w<i>` (and `@w<i>_<k>` for `IN` items). The `@`
    /// prefix keeps them apart from the `:<field>` placeholders of the
    /// write builders, so both can appear in one statement.
    pub fn to_sql(&self) -> Result<(String, Params)> {
        let mut terms = Vec::with_capacity(self.conditions.len());
        let mut params = Params::new();

        for (i, (field, op)) in self.conditions.iter().enumerate() {
            check_identifier(field)?;
            let name = format!("@w{i}");
            let term = match op {
                QueryOperator::Equal(v) => binary(field, "=", &name, v, &mut params),
                QueryOperator::NotEqual(v) => binary(field, "<>", &name, v, &mut params),
                QueryOperator::GreaterThan(v) => binary(field, ">", &name, v, &mut params),
                QueryOperator::GreaterThanOrEqual(v) => {
                    binary(field, ">=", &name, v, &mut params)
                }
                QueryOperator::LessThan(v) => binary(field, "<", &name, v, &mut params),
                QueryOperator::LessThanOrEqual(v) => binary(field, "<=", &name, v, &mut params),
                QueryOperator::Like(pattern) => {
                    params.push(&name, pattern.as_str());
                    format!("{field} LIKE {name}")
                }
                QueryOperator::In(values) if values.is_empty() => "0 = 1".to_string(),
                QueryOperator::In(values) => {
                    let mut placeholders = Vec::with_capacity(values.len());
                    for (k, v) in values.iter().enumerate() {
                        let item = format!("{name}_{k}");
                        params.push(&item, v.clone());
                        placeholders.push(item);
                    }
                    format!("{field} IN ({})", placeholders.join(", "))
                }
                QueryOperator::IsNull => format!("{field} IS NULL"),
                QueryOperator::IsNotNull => format!("{field} IS NOT NULL"),
            };
            terms.push(term);
        }

        Ok((terms.join(" AND "), params))
    }
}

fn binary(field: &str, op: &str, name: &str, value: &Value, params: &mut Params) -> String {
    params.push(name, value.clone());
    format!("{field} {op} {name}")
}

/// Sort direction for ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    fn as_sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// CRUD operation types
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOperation {
    pub table: String,
    pub data: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadOperation {
    pub table: String,
    pub conditions: Conditions,
    pub fields: Option<Vec<String>>,
    pub order_by: Vec<(String, Order)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOperation {
    pub table: String,
    pub conditions: Conditions,
    pub updates: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOperation {
    pub table: String,
    pub conditions: Conditions,
    /// Maximum number of rows removed; `None` removes every match.
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrudOperation {
    Create(CreateOperation),
    Read(ReadOperation),
    Update(UpdateOperation),
    Delete(DeleteOperation),
}

impl CrudOperation {
    pub fn to_sql(&self) -> Result<SqlQuery> {
        match self {
            CrudOperation::Create(op) => insert(&op.table, op.data.clone()),
            CrudOperation::Read(op) => select(op),
            CrudOperation::Update(op) => update(&op.table, op.updates.clone(), &op.conditions),
            CrudOperation::Delete(op) => delete(&op.table, &op.conditions, op.limit),
        }
    }
}

impl ReadOperation {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Self::default()
        }
    }
}

/// Default row bound for [`delete`] callers that do not pick one.
pub const DEFAULT_DELETE_LIMIT: u64 = 1;

/// `SELECT <fields|*> FROM <table> [WHERE ..] [ORDER BY ..] [LIMIT n [OFFSET m]]`
pub fn select(op: &ReadOperation) -> Result<SqlQuery> {
    check_table(&op.table)?;

    let fields = match &op.fields {
        Some(fields) if !fields.is_empty() => {
            for field in fields {
                check_identifier(field)?;
            }
            fields.join(", ")
        }
        _ => "*".to_string(),
    };

    let mut sql = format!("SELECT {fields} FROM {}", op.table);
    let (where_sql, params) = op.conditions.to_sql()?;
    if !where_sql.is_empty() {
        let _ = write!(sql, " WHERE {where_sql}");
    }

    if !op.order_by.is_empty() {
        let mut terms = Vec::with_capacity(op.order_by.len());
        for (field, order) in &op.order_by {
            check_identifier(field)?;
            terms.push(format!("{field} {}", order.as_sql()));
        }
        let _ = write!(sql, " ORDER BY {}", terms.join(", "));
    }

    if let Some(limit) = op.limit {
        let _ = write!(sql, " LIMIT {limit}");
        if let Some(offset) = op.offset {
            let _ = write!(sql, " OFFSET {offset}");
        }
    }

    Ok(SqlQuery::new(&sql).with_params(params))
}

/// `INSERT INTO <table> (f1, f2) VALUES (:f1, :f2)` with fields in
/// lexicographic order.
pub fn insert<K, V, I>(table: &str, data: I) -> Result<SqlQuery>
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    check_table(table)?;
    let data = sorted(data)?;

    if data.is_empty() {
        return Ok(SqlQuery::new(&format!("INSERT INTO {table} DEFAULT VALUES")));
    }

    let columns: Vec<&str> = data.keys().map(String::as_str).collect();
    let placeholders: Vec<String> = columns.iter().map(|c| format!(":{c}")).collect();
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    );

    Ok(SqlQuery::new(&sql).with_params(write_params(data)))
}

/// `UPDATE <table> SET f1 = :f1, f2 = :f2 [WHERE ..]` with assignments in
/// lexicographic order. An update with nothing to set is rejected.
pub fn update<K, V, I>(table: &str, data: I, conditions: &Conditions) -> Result<SqlQuery>
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    check_table(table)?;
    let data = sorted(data)?;
    if data.is_empty() {
        return Err(MapperError::EmptyUpdate(table.to_string()));
    }

    let assignments: Vec<String> = data.keys().map(|c| format!("{c} = :{c}")).collect();
    let mut sql = format!("UPDATE {table} SET {}", assignments.join(", "));

    let mut params = write_params(data);
    let (where_sql, where_params) = conditions.to_sql()?;
    if !where_sql.is_empty() {
        let _ = write!(sql, " WHERE {where_sql}");
        params.extend(where_params);
    }

    Ok(SqlQuery::new(&sql).with_params(params))
}

/// Delete rows matching `conditions`, at most `limit` of them.
///
/// SQLite only accepts `DELETE .. LIMIT` when built with a special flag,
/// so the bound goes through a rowid subquery instead.
///
/// `WITHOUT ROWID` tables have no `rowid`, so a bounded delete on them
/// fails when the statement is prepared. Pass `limit: None` for those and
/// make the conditions select the rows exactly (e.g. by primary key).
pub fn delete(table: &str, conditions: &Conditions, limit: Option<u64>) -> Result<SqlQuery> {
    check_table(table)?;
    if conditions.is_empty() {
        return Err(MapperError::InvalidQuery(format!(
            "delete from `{table}` needs at least one condition"
        )));
    }

    let (where_sql, params) = conditions.to_sql()?;
    let sql = match limit {
        Some(limit) => format!(
            "DELETE FROM {table} WHERE rowid IN (SELECT rowid FROM {table} WHERE {where_sql} LIMIT {limit})"
        ),
        None => format!("DELETE FROM {table} WHERE {where_sql}"),
    };

    Ok(SqlQuery::new(&sql).with_params(params))
}

fn sorted<K, V, I>(data: I) -> Result<BTreeMap<String, Value>>
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    let mut map = BTreeMap::new();
    for (k, v) in data {
        let k = k.into();
        check_identifier(&k)?;
        map.insert(k, v.into());
    }
    Ok(map)
}

fn write_params(data: BTreeMap<String, Value>) -> Params {
    Params {
        values: data
            .into_iter()
            .map(|(k, v)| (format!(":{k}"), v))
            .collect(),
    }
}

/// Identifiers are spliced into statement text, so only plain names pass.
pub(crate) fn check_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(MapperError::InvalidQuery(format!(
            "`{name}` is not a valid identifier"
        )))
    }
}

fn check_table(table: &str) -> Result<()> {
    match table.split_once('.') {
        Some((schema, name)) => {
            check_identifier(schema)?;
            check_identifier(name)
        }
        None => check_identifier(table),
    }
}
