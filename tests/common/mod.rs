// Shared fixtures for the integration tests.
#![allow(dead_code)]

use rust_sqlite_mapper::{Connection, Model, Result, Row, SqlQuery, SqliteConfig, Value};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Person {
    pub id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<String>,
}

impl Person {
    pub fn new(first_name: &str, last_name: &str, age: i64, gender: &str) -> Self {
        Self {
            id: None,
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
            age: Some(age),
            gender: Some(gender.to_string()),
        }
    }

    pub fn with_id(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }
}

impl Model for Person {
    const TABLE: &'static str = "Person";
    const FIELDS: &'static [&'static str] = &["ID", "FirstName", "LastName", "Age", "Gender"];
    const PRIMARY_KEYS: &'static [&'static str] = &["ID"];

    fn column(&self, field: &str) -> Option<Value> {
        match field {
            "ID" => self.id.map(Value::from),
            "FirstName" => self.first_name.clone().map(Value::from),
            "LastName" => self.last_name.clone().map(Value::from),
            "Age" => self.age.map(Value::from),
            "Gender" => self.gender.clone().map(Value::from),
            _ => None,
        }
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get("ID")?,
            first_name: row.get("FirstName")?,
            last_name: row.get("LastName")?,
            age: row.get("Age")?,
            gender: row.get("Gender")?,
        })
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Initialize the database schema
pub fn initialize_schema(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE Person (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            FirstName TEXT NOT NULL,
            LastName TEXT,
            Age INTEGER CHECK (Age >= 0),
            Gender TEXT
        );
        CREATE INDEX idx_person_last_name ON Person(LastName);
        "#,
    )
}

// Helper function to create an in-memory database for testing
pub fn create_test_db() -> Result<Connection> {
    init_tracing();
    let mut conn = Connection::open_in_memory()?;
    initialize_schema(&mut conn)?;
    Ok(conn)
}

// Helper function to create a temporary file-based database
pub fn create_temp_db() -> Result<(Connection, NamedTempFile)> {
    init_tracing();
    let temp_file = NamedTempFile::new().expect("create temp file");
    let mut conn = Connection::open(&SqliteConfig::new(temp_file.path().to_string_lossy()))?;
    initialize_schema(&mut conn)?;
    Ok((conn, temp_file))
}

/// Insert people directly and return their assigned ids.
pub fn seed(conn: &mut Connection, people: &[Person]) -> Result<Vec<i64>> {
    people
        .iter()
        .map(|p| conn.insert_entity(p).map(|outcome| outcome.last_insert_id))
        .collect()
}

pub fn count_people(conn: &mut Connection) -> Result<i64> {
    let rows = conn.query(&SqlQuery::new("SELECT COUNT(*) AS n FROM Person"))?;
    rows[0].get("n")
}
